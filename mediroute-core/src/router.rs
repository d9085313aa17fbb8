//! Severity-aware progressive-radius search. Severity tiers differ by
//! starting radius and emergency preference, not by hard care-type
//! exclusion: the care-type column is too sparse in the backing data to
//! filter on. Each radius runs a strict pass and, when that comes up
//! short, a relaxed pass without the specialty / emergency filters.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, ServiceError};
use crate::models::{Facility, SeverityLevel};
use crate::store::{FacilityIndex, SpatialQuery};

/// The fixed radius walk, in kilometres. Every response's `radius_used`
/// is one of these values.
pub const RADIUS_SCHEDULE_KM: [f64; 4] = [5.0, 8.0, 12.0, 20.0];

#[derive(Debug, Clone)]
pub struct RoutedFacilities {
    pub facilities: Vec<Facility>,
    pub radius_used_km: f64,
    pub was_expanded: bool,
    /// True iff the returned set came from a strict pass with a caller
    /// supplied specialty filter.
    pub specialty_filtered: bool,
}

pub struct SeverityRouter {
    index: Arc<dyn FacilityIndex>,
    quality_threshold: f64,
    min_results: usize,
    max_radius_km: f64,
}

impl SeverityRouter {
    pub fn new(config: &Config, index: Arc<dyn FacilityIndex>) -> Self {
        SeverityRouter {
            index,
            quality_threshold: config.quality_threshold,
            min_results: config.min_results_before_relax,
            max_radius_km: config.max_radius_km,
        }
    }

    /// Walk the radius schedule from the level's initial radius until a
    /// pass reaches `min_results`. A store failure at one radius logs and
    /// advances; only when every radius failed does the search error.
    /// Returns the first non-empty set seen when no radius ever reached
    /// the threshold, and an empty set at the maximum radius otherwise.
    pub async fn search(
        &self,
        latitude: f64,
        longitude: f64,
        level: SeverityLevel,
        specialty: Option<&str>,
    ) -> Result<RoutedFacilities> {
        let initial = level.initial_radius_km();
        let schedule: Vec<f64> = RADIUS_SCHEDULE_KM
            .iter()
            .copied()
            .filter(|r| *r >= initial && *r <= self.max_radius_km)
            .collect();

        let emergency = level == SeverityLevel::Emergency;
        let mut first_hit: Option<RoutedFacilities> = None;
        let mut any_radius_completed = false;
        let mut last_error: Option<ServiceError> = None;

        for &radius_km in &schedule {
            let strict = self.strict_query(latitude, longitude, radius_km, specialty, emergency);
            let strict_result = match self.index.nearest_within(&strict).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(radius_km, error = %e, "strict pass failed, advancing radius");
                    last_error = Some(e);
                    continue;
                }
            };

            debug!(radius_km, count = strict_result.len(), "strict pass");
            if strict_result.len() >= self.min_results {
                return Ok(RoutedFacilities {
                    facilities: strict_result,
                    radius_used_km: radius_km,
                    was_expanded: radius_km > initial,
                    specialty_filtered: specialty.is_some(),
                });
            }
            if !strict_result.is_empty() && first_hit.is_none() {
                first_hit = Some(RoutedFacilities {
                    facilities: strict_result.clone(),
                    radius_used_km: radius_km,
                    was_expanded: radius_km > initial,
                    specialty_filtered: specialty.is_some(),
                });
            }

            // Relaxation only changes the query when there is a filter to
            // drop; otherwise the strict result already is the relaxed one.
            if specialty.is_none() && !emergency {
                any_radius_completed = true;
                continue;
            }

            let relaxed = self.relaxed_query(latitude, longitude, radius_km, emergency);
            let relaxed_result = match self.index.nearest_within(&relaxed).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(radius_km, error = %e, "relaxed pass failed, advancing radius");
                    last_error = Some(e);
                    continue;
                }
            };
            any_radius_completed = true;

            debug!(radius_km, count = relaxed_result.len(), "relaxed pass");
            if relaxed_result.len() >= self.min_results {
                return Ok(RoutedFacilities {
                    facilities: relaxed_result,
                    radius_used_km: radius_km,
                    was_expanded: radius_km > initial,
                    specialty_filtered: false,
                });
            }
            if !relaxed_result.is_empty() && first_hit.is_none() {
                first_hit = Some(RoutedFacilities {
                    facilities: relaxed_result,
                    radius_used_km: radius_km,
                    was_expanded: radius_km > initial,
                    specialty_filtered: false,
                });
            }
        }

        if let Some(hit) = first_hit {
            return Ok(hit);
        }
        if !any_radius_completed {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let max_walked = schedule.last().copied().unwrap_or(initial);
        Ok(RoutedFacilities {
            facilities: vec![],
            radius_used_km: max_walked,
            was_expanded: max_walked > initial,
            specialty_filtered: false,
        })
    }

    fn strict_query(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        specialty: Option<&str>,
        emergency: bool,
    ) -> SpatialQuery {
        let mut q = SpatialQuery::new(latitude, longitude, radius_km * 1000.0, self.quality_threshold);
        q.specialty = specialty.map(str::to_string);
        q.emergency_only = emergency;
        q
    }

    fn relaxed_query(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        emergency: bool,
    ) -> SpatialQuery {
        let mut q = SpatialQuery::new(latitude, longitude, radius_km * 1000.0, self.quality_threshold);
        // Specialty and the emergency admission filter are dropped, but
        // emergency-capable rows still surface first for emergencies.
        q.emergency_first = emergency;
        q
    }
}

/// Great-circle distance in kilometres (mean earth radius 6371 km).
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * 6371.0 * a.sqrt().atan2((1.0 - a).sqrt())
}
