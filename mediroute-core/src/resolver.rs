use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{info, warn};

use crate::config::{BoundingBox, Config};
use crate::error::{Result, ServiceError};
use crate::geocode::GeocodeClient;
use crate::models::{PincodeResolution, ResolutionSource};
use crate::store::FacilityIndex;

/// Six-digit Indian PIN code, no leading/trailing noise.
pub fn valid_pincode(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

struct CachedResolution {
    resolution: PincodeResolution,
    inserted: Instant,
}

/// Resolves a PIN code to a coordinate through a three-strategy chain:
/// external geocoder, then the median centroid of facilities sharing the
/// code, then the district centroid. First success wins; successes are
/// cached per code for `cache_ttl`.
pub struct PincodeResolver {
    geocoder: Option<GeocodeClient>,
    index: Arc<dyn FacilityIndex>,
    cache: DashMap<String, CachedResolution>,
    cache_ttl: Duration,
    bbox: BoundingBox,
}

impl PincodeResolver {
    pub fn new(config: &Config, index: Arc<dyn FacilityIndex>) -> Self {
        let geocoder = GeocodeClient::from_config(config);
        if geocoder.is_none() {
            info!("external geocoder not configured; pincode resolution is store-only");
        }
        PincodeResolver {
            geocoder,
            index,
            cache: DashMap::new(),
            cache_ttl: config.cache_ttl,
            bbox: config.country_bbox,
        }
    }

    pub async fn resolve(&self, pincode: &str) -> Result<PincodeResolution> {
        if !valid_pincode(pincode) {
            return Err(ServiceError::InvalidInput(format!(
                "pincode must be exactly six digits, got {pincode:?}"
            )));
        }

        if let Some(entry) = self.cache.get(pincode) {
            if entry.inserted.elapsed() < self.cache_ttl {
                return Ok(entry.resolution.clone());
            }
        }

        let resolution = self.resolve_uncached(pincode).await?;
        self.cache.insert(
            pincode.to_string(),
            CachedResolution {
                resolution: resolution.clone(),
                inserted: Instant::now(),
            },
        );
        Ok(resolution)
    }

    async fn resolve_uncached(&self, pincode: &str) -> Result<PincodeResolution> {
        let mut store_error: Option<ServiceError> = None;

        // Strategy 1: external geocoder. Failures are logged, never surfaced.
        if let Some(geocoder) = &self.geocoder {
            match geocoder.search_pincode(pincode).await {
                Ok(hit) => {
                    let (state, district, count) = self.labels_for(pincode).await;
                    return Ok(PincodeResolution {
                        pincode: pincode.to_string(),
                        latitude: hit.latitude,
                        longitude: hit.longitude,
                        state,
                        district,
                        hospital_count: count,
                        source: ResolutionSource::ExternalGeocode,
                    });
                }
                Err(e) => {
                    warn!(pincode, error = %e, "geocoder failed, falling back to local centroid");
                }
            }
        }

        // Strategy 2: median centroid of facilities sharing the code.
        match self.index.centroid_by_pincode(pincode).await {
            Ok(Some(centroid)) if self.bbox.contains(centroid.latitude, centroid.longitude) => {
                return Ok(PincodeResolution {
                    pincode: pincode.to_string(),
                    latitude: centroid.latitude,
                    longitude: centroid.longitude,
                    state: centroid.state,
                    district: centroid.district,
                    hospital_count: centroid.count,
                    source: ResolutionSource::LocalExactCentroid,
                });
            }
            Ok(_) => {}
            Err(e) => {
                warn!(pincode, error = %e, "exact centroid query failed");
                store_error = Some(e);
            }
        }

        // Strategy 3: centroid of the district this code belongs to.
        match self.district_centroid(pincode).await {
            Ok(Some(resolution)) => return Ok(resolution),
            Ok(None) => {}
            Err(e) => {
                warn!(pincode, error = %e, "district centroid query failed");
                store_error = Some(e);
            }
        }

        // Unresolvable code vs. broken store: surface the store error when
        // the local strategies never got a clean answer.
        match store_error {
            Some(e) => Err(e),
            None => Err(ServiceError::CodeNotFound(pincode.to_string())),
        }
    }

    async fn district_centroid(&self, pincode: &str) -> Result<Option<PincodeResolution>> {
        let Some((state, district)) = self.index.district_for_pincode(pincode).await? else {
            return Ok(None);
        };
        let Some(centroid) = self.index.centroid_by_district(&state, &district).await? else {
            return Ok(None);
        };
        if !self.bbox.contains(centroid.latitude, centroid.longitude) {
            return Ok(None);
        }
        Ok(Some(PincodeResolution {
            pincode: pincode.to_string(),
            latitude: centroid.latitude,
            longitude: centroid.longitude,
            state: Some(state),
            district: Some(district),
            hospital_count: centroid.count,
            source: ResolutionSource::LocalDistrictCentroid,
        }))
    }

    /// Best-effort administrative labels for an externally geocoded hit.
    async fn labels_for(&self, pincode: &str) -> (Option<String>, Option<String>, i64) {
        match self.index.centroid_by_pincode(pincode).await {
            Ok(Some(centroid)) => (centroid.state, centroid.district, centroid.count),
            _ => (None, None, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DistrictCentroid, PincodeCentroid, SpatialQuery};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeIndex {
        exact: Option<PincodeCentroid>,
        district: Option<(String, String)>,
        district_centroid: Option<DistrictCentroid>,
        exact_calls: AtomicUsize,
        fail_exact: bool,
        fail_district: bool,
    }

    #[async_trait]
    impl FacilityIndex for FakeIndex {
        async fn nearest_within(&self, _q: &SpatialQuery) -> Result<Vec<crate::models::Facility>> {
            Ok(vec![])
        }

        async fn centroid_by_pincode(&self, _p: &str) -> Result<Option<PincodeCentroid>> {
            self.exact_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_exact {
                return Err(ServiceError::StoreTimeout);
            }
            Ok(self.exact.clone())
        }

        async fn district_for_pincode(&self, _p: &str) -> Result<Option<(String, String)>> {
            if self.fail_district {
                return Err(ServiceError::StoreTimeout);
            }
            Ok(self.district.clone())
        }

        async fn centroid_by_district(
            &self,
            _s: &str,
            _d: &str,
        ) -> Result<Option<DistrictCentroid>> {
            Ok(self.district_centroid.clone())
        }
    }

    fn resolver_with(index: FakeIndex) -> PincodeResolver {
        PincodeResolver::new(
            &Config::for_tests("postgres://localhost/x"),
            Arc::new(index),
        )
    }

    fn bengaluru_centroid() -> PincodeCentroid {
        PincodeCentroid {
            latitude: 12.9716,
            longitude: 77.5946,
            state: Some("Karnataka".into()),
            district: Some("Bengaluru Urban".into()),
            count: 42,
        }
    }

    #[test]
    fn pincode_format() {
        assert!(valid_pincode("560001"));
        assert!(valid_pincode("110001"));
        assert!(!valid_pincode("56001"));
        assert!(!valid_pincode("5600011"));
        assert!(!valid_pincode("56000a"));
        assert!(!valid_pincode(" 560001"));
        assert!(!valid_pincode(""));
    }

    #[tokio::test]
    async fn exact_centroid_wins_without_geocoder() {
        let resolver = resolver_with(FakeIndex {
            exact: Some(bengaluru_centroid()),
            ..Default::default()
        });
        let r = resolver.resolve("560001").await.unwrap();
        assert_eq!(r.source, ResolutionSource::LocalExactCentroid);
        assert_eq!(r.hospital_count, 42);
        assert_eq!(r.state.as_deref(), Some("Karnataka"));
        assert!(BoundingBox::INDIA.contains(r.latitude, r.longitude));
    }

    #[tokio::test]
    async fn falls_through_to_district_centroid() {
        let resolver = resolver_with(FakeIndex {
            exact: None,
            district: Some(("Karnataka".into(), "Bengaluru Urban".into())),
            district_centroid: Some(DistrictCentroid {
                latitude: 13.0,
                longitude: 77.6,
                count: 310,
            }),
            ..Default::default()
        });
        let r = resolver.resolve("560099").await.unwrap();
        assert_eq!(r.source, ResolutionSource::LocalDistrictCentroid);
        assert_eq!(r.hospital_count, 310);
        assert_eq!(r.district.as_deref(), Some("Bengaluru Urban"));
    }

    #[tokio::test]
    async fn unresolvable_code_is_not_found() {
        let resolver = resolver_with(FakeIndex::default());
        let err = resolver.resolve("000000").await.unwrap_err();
        assert_eq!(err.kind(), "CodeNotFound");
    }

    #[tokio::test]
    async fn invalid_format_rejected_before_any_lookup() {
        let resolver = resolver_with(FakeIndex::default());
        let err = resolver.resolve("12345").await.unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_store_error() {
        let resolver = resolver_with(FakeIndex {
            fail_exact: true,
            fail_district: true,
            ..Default::default()
        });
        let err = resolver.resolve("560001").await.unwrap_err();
        assert_eq!(err.kind(), "StoreError");
    }

    #[tokio::test]
    async fn out_of_box_exact_centroid_is_skipped() {
        let resolver = resolver_with(FakeIndex {
            exact: Some(PincodeCentroid {
                latitude: 51.5,
                longitude: -0.12,
                state: None,
                district: None,
                count: 3,
            }),
            ..Default::default()
        });
        let err = resolver.resolve("560001").await.unwrap_err();
        assert_eq!(err.kind(), "CodeNotFound");
    }

    #[tokio::test]
    async fn successful_resolutions_are_cached() {
        let index = FakeIndex {
            exact: Some(bengaluru_centroid()),
            ..Default::default()
        };
        let index = Arc::new(index);
        let resolver = PincodeResolver::new(
            &Config::for_tests("postgres://localhost/x"),
            index.clone() as Arc<dyn FacilityIndex>,
        );

        resolver.resolve("560001").await.unwrap();
        resolver.resolve("560001").await.unwrap();
        assert_eq!(index.exact_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_entries_expire() {
        let index = Arc::new(FakeIndex {
            exact: Some(bengaluru_centroid()),
            ..Default::default()
        });
        let mut config = Config::for_tests("postgres://localhost/x");
        config.cache_ttl = Duration::from_millis(20);
        let resolver = PincodeResolver::new(&config, index.clone() as Arc<dyn FacilityIndex>);

        resolver.resolve("560001").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        resolver.resolve("560001").await.unwrap();
        assert_eq!(index.exact_calls.load(Ordering::SeqCst), 2);
    }
}
