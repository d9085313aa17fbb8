use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow, PgSslMode};
use sqlx::{PgPool, Row};
use tracing::info;

use crate::config::Config;
use crate::error::{Result, ServiceError};
use crate::models::{Facility, StoreStats};

/// A point-radius query against the spatial index. All predicates are
/// great-circle ("within `radius_m` metres of the centre").
#[derive(Debug, Clone)]
pub struct SpatialQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f64,
    /// Admission gate on `data_quality`; rows below it are excluded.
    pub min_quality: f64,
    /// Pass-1 specialty filter; `None` relaxes it.
    pub specialty: Option<String>,
    /// Pass-1 emergency filter; rows without `emergency_available` drop out.
    pub emergency_only: bool,
    /// Diagnostic AYUSH filter.
    pub ayush: Option<bool>,
    /// Surface emergency-capable rows first, before the distance order.
    /// Used by the relaxed emergency pass.
    pub emergency_first: bool,
    pub limit: i64,
}

impl SpatialQuery {
    pub fn new(latitude: f64, longitude: f64, radius_m: f64, min_quality: f64) -> Self {
        SpatialQuery {
            latitude,
            longitude,
            radius_m,
            min_quality,
            specialty: None,
            emergency_only: false,
            ayush: None,
            emergency_first: false,
            limit: ROUTING_ROW_CAP,
        }
    }
}

/// Routing queries return at most 20 rows; diagnostics 50.
pub const ROUTING_ROW_CAP: i64 = 20;
pub const DIAGNOSTIC_ROW_CAP: i64 = 50;

/// Median centroid of the facilities sharing a pincode.
#[derive(Debug, Clone)]
pub struct PincodeCentroid {
    pub latitude: f64,
    pub longitude: f64,
    pub state: Option<String>,
    pub district: Option<String>,
    pub count: i64,
}

/// Median centroid of all facilities in a district.
#[derive(Debug, Clone)]
pub struct DistrictCentroid {
    pub latitude: f64,
    pub longitude: f64,
    pub count: i64,
}

/// The operations the resolver and the severity router need from the
/// geospatial facility store. `FacilityStore` is the PostGIS-backed
/// implementation; tests substitute an in-memory double.
#[async_trait]
pub trait FacilityIndex: Send + Sync {
    async fn nearest_within(&self, query: &SpatialQuery) -> Result<Vec<Facility>>;
    async fn centroid_by_pincode(&self, pincode: &str) -> Result<Option<PincodeCentroid>>;
    async fn district_for_pincode(&self, pincode: &str) -> Result<Option<(String, String)>>;
    async fn centroid_by_district(&self, state: &str, district: &str)
        -> Result<Option<DistrictCentroid>>;
}

const FACILITY_COLUMNS: &str = "sr_no::bigint AS sr_no, hospital_name, latitude, longitude, \
     hospital_care_type, hospital_category, ayush, discipline, \
     specialties_array, facilities_array, emergency_available, \
     emergency_num, ambulance_phone, bloodbank_phone, telephone, \
     total_beds, pincode, district, state, address, data_quality_norm";

/// Read-only adapter over the `hospitals` table. The only place that
/// knows about spatial SQL; every query acquires a pooled connection and
/// releases it when the row stream ends (no long-held transactions).
pub struct FacilityStore {
    pool: PgPool,
    query_timeout: Duration,
    quality_threshold: f64,
    bbox: crate::config::BoundingBox,
}

impl FacilityStore {
    pub async fn connect(config: &Config) -> Result<Self> {
        let mut options: PgConnectOptions = config
            .db_dsn
            .parse()
            .map_err(|e: sqlx::Error| ServiceError::Unavailable(e.to_string()))?;
        if config.db_ssl {
            options = options.ssl_mode(PgSslMode::Require);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        info!(pool_size = config.pool_size, "connected to facility store");
        Ok(FacilityStore {
            pool,
            query_timeout: config.query_timeout,
            quality_threshold: config.quality_threshold,
            bbox: config.country_bbox,
        })
    }

    /// Liveness probe for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        self.timed(sqlx::query("SELECT 1").fetch_one(&self.pool))
            .await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let row = self
            .timed(
                sqlx::query(
                    "SELECT COUNT(*) AS total, \
                            COUNT(*) FILTER (WHERE location IS NOT NULL) AS with_coordinates, \
                            COUNT(*) FILTER (WHERE emergency_available) AS emergency, \
                            COUNT(*) FILTER (WHERE ayush) AS ayush, \
                            COUNT(*) FILTER (WHERE lower(hospital_category) LIKE '%gov%' \
                                OR lower(hospital_category) LIKE '%public%') AS government, \
                            COUNT(*) FILTER (WHERE data_quality_norm >= $1) AS quality_passed \
                     FROM hospitals",
                )
                .bind(self.quality_threshold)
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(StoreStats {
            total: row.try_get("total")?,
            with_coordinates: row.try_get("with_coordinates")?,
            emergency: row.try_get("emergency")?,
            ayush: row.try_get("ayush")?,
            government: row.try_get("government")?,
            quality_passed: row.try_get("quality_passed")?,
        })
    }

    /// Diagnostic name lookup: exact > prefix > substring, then name.
    pub async fn fuzzy_name_search(&self, q: &str, state: Option<&str>) -> Result<Vec<Facility>> {
        let mut sql = format!(
            "SELECT {FACILITY_COLUMNS}, 0.0::float8 AS distance_km, \
                    CASE WHEN lower(hospital_name) = lower($1) THEN 0 \
                         WHEN lower(hospital_name) LIKE lower($1) || '%' THEN 1 \
                         ELSE 2 END AS relevance \
             FROM hospitals \
             WHERE hospital_name ILIKE '%' || $1 || '%'"
        );
        if state.is_some() {
            sql.push_str(" AND lower(state) = lower($2)");
        }
        sql.push_str(" ORDER BY relevance, hospital_name LIMIT ");
        sql.push_str(&DIAGNOSTIC_ROW_CAP.to_string());

        let mut query = sqlx::query(&sql).bind(q);
        if let Some(state) = state {
            query = query.bind(state);
        }
        let rows = self.timed(query.fetch_all(&self.pool)).await?;
        rows.iter().map(facility_from_row).collect()
    }

    async fn timed<T>(
        &self,
        fut: impl std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(sqlx::Error::PoolTimedOut)) => Err(ServiceError::Unavailable(
                "facility store connection pool saturated".to_string(),
            )),
            Ok(Err(e)) => Err(ServiceError::Store(e)),
            Err(_) => Err(ServiceError::StoreTimeout),
        }
    }
}

#[async_trait]
impl FacilityIndex for FacilityStore {
    async fn nearest_within(&self, q: &SpatialQuery) -> Result<Vec<Facility>> {
        let (sql, specialty, ayush) = build_nearest_sql(q);

        let mut query = sqlx::query(&sql)
            .bind(q.longitude)
            .bind(q.latitude)
            .bind(q.radius_m)
            .bind(q.min_quality);
        if let Some(specialty) = &specialty {
            query = query.bind(specialty.clone());
        }
        if let Some(ayush) = ayush {
            query = query.bind(ayush);
        }
        query = query.bind(q.limit);

        let rows = self.timed(query.fetch_all(&self.pool)).await?;
        rows.iter().map(facility_from_row).collect()
    }

    async fn centroid_by_pincode(&self, pincode: &str) -> Result<Option<PincodeCentroid>> {
        // Median, not mean: a single mis-geocoded record must not drag the
        // centroid out of the city. Out-of-box coordinates are excluded
        // before aggregation.
        let row = self
            .timed(
                sqlx::query(
                    "SELECT percentile_cont(0.5) WITHIN GROUP (ORDER BY latitude) AS lat, \
                            percentile_cont(0.5) WITHIN GROUP (ORDER BY longitude) AS lng, \
                            MIN(state) AS state, MIN(district) AS district, \
                            COUNT(*) AS count \
                     FROM hospitals \
                     WHERE pincode = $1 AND location IS NOT NULL \
                       AND latitude BETWEEN $2 AND $3 \
                       AND longitude BETWEEN $4 AND $5",
                )
                .bind(pincode)
                .bind(self.bbox.min_lat)
                .bind(self.bbox.max_lat)
                .bind(self.bbox.min_lng)
                .bind(self.bbox.max_lng)
                .fetch_one(&self.pool),
            )
            .await?;

        let count: i64 = row.try_get("count")?;
        if count == 0 {
            return Ok(None);
        }
        Ok(Some(PincodeCentroid {
            latitude: row.try_get("lat")?,
            longitude: row.try_get("lng")?,
            state: row.try_get("state")?,
            district: row.try_get("district")?,
            count,
        }))
    }

    async fn district_for_pincode(&self, pincode: &str) -> Result<Option<(String, String)>> {
        let row = self
            .timed(
                sqlx::query(
                    "SELECT state, district FROM hospitals \
                     WHERE pincode = $1 AND state IS NOT NULL AND district IS NOT NULL \
                     LIMIT 1",
                )
                .bind(pincode)
                .fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => Ok(Some((row.try_get("state")?, row.try_get("district")?))),
            None => Ok(None),
        }
    }

    async fn centroid_by_district(
        &self,
        state: &str,
        district: &str,
    ) -> Result<Option<DistrictCentroid>> {
        let row = self
            .timed(
                sqlx::query(
                    "SELECT percentile_cont(0.5) WITHIN GROUP (ORDER BY latitude) AS lat, \
                            percentile_cont(0.5) WITHIN GROUP (ORDER BY longitude) AS lng, \
                            COUNT(*) AS count \
                     FROM hospitals \
                     WHERE state = $1 AND district = $2 AND location IS NOT NULL \
                       AND latitude BETWEEN $3 AND $4 \
                       AND longitude BETWEEN $5 AND $6",
                )
                .bind(state)
                .bind(district)
                .bind(self.bbox.min_lat)
                .bind(self.bbox.max_lat)
                .bind(self.bbox.min_lng)
                .bind(self.bbox.max_lng)
                .fetch_one(&self.pool),
            )
            .await?;

        let count: i64 = row.try_get("count")?;
        if count == 0 {
            return Ok(None);
        }
        Ok(Some(DistrictCentroid {
            latitude: row.try_get("lat")?,
            longitude: row.try_get("lng")?,
            count,
        }))
    }
}

/// Assemble the point-radius SQL. Bind order: $1 lng, $2 lat, $3 radius_m,
/// $4 quality, then optional specialty, optional ayush, then the limit.
fn build_nearest_sql(q: &SpatialQuery) -> (String, Option<String>, Option<bool>) {
    let mut sql = format!(
        "SELECT {FACILITY_COLUMNS}, \
                ROUND((ST_Distance(location, ST_MakePoint($1, $2)::geography) / 1000.0)::numeric, 2)::float8 AS distance_km \
         FROM hospitals \
         WHERE ST_DWithin(location, ST_MakePoint($1, $2)::geography, $3) \
           AND location IS NOT NULL \
           AND data_quality_norm >= $4"
    );

    let mut next_bind = 5;
    let specialty = q.specialty.clone();
    if specialty.is_some() {
        sql.push_str(&format!(" AND ${next_bind} = ANY(specialties_array)"));
        next_bind += 1;
    }
    let ayush = q.ayush;
    if ayush.is_some() {
        sql.push_str(&format!(" AND COALESCE(ayush, FALSE) = ${next_bind}"));
        next_bind += 1;
    }
    if q.emergency_only {
        sql.push_str(" AND COALESCE(emergency_available, FALSE)");
    }

    if q.emergency_first {
        sql.push_str(
            " ORDER BY COALESCE(emergency_available, FALSE) DESC, \
              distance_km ASC, data_quality_norm DESC, sr_no ASC",
        );
    } else {
        sql.push_str(" ORDER BY distance_km ASC, data_quality_norm DESC, sr_no ASC");
    }
    sql.push_str(&format!(" LIMIT ${next_bind}"));

    (sql, specialty, ayush)
}

fn facility_from_row(row: &PgRow) -> Result<Facility> {
    Ok(Facility {
        id: row.try_get("sr_no")?,
        name: row.try_get("hospital_name")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        care_type: row.try_get("hospital_care_type")?,
        category: row.try_get("hospital_category")?,
        ayush: row.try_get::<Option<bool>, _>("ayush")?.unwrap_or(false),
        discipline: row.try_get("discipline")?,
        specialties: row
            .try_get::<Option<Vec<String>>, _>("specialties_array")?
            .unwrap_or_default(),
        facilities: row
            .try_get::<Option<Vec<String>>, _>("facilities_array")?
            .unwrap_or_default(),
        emergency_available: row
            .try_get::<Option<bool>, _>("emergency_available")?
            .unwrap_or(false),
        emergency_phone: row.try_get("emergency_num")?,
        ambulance_phone: row.try_get("ambulance_phone")?,
        bloodbank_phone: row.try_get("bloodbank_phone")?,
        general_phone: row.try_get("telephone")?,
        total_beds: row.try_get("total_beds")?,
        pincode: row.try_get("pincode")?,
        district: row.try_get("district")?,
        state: row.try_get("state")?,
        address: row.try_get("address")?,
        data_quality: row
            .try_get::<Option<f64>, _>("data_quality_norm")?
            .unwrap_or(0.0),
        distance_km: row.try_get("distance_km")?,
    })
}
