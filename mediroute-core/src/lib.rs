//! Core of the healthcare-facility routing service: symptom
//! classification, pincode resolution, and severity-aware geospatial
//! search over a facility store. The HTTP surface lives in
//! `mediroute-service`; everything here is transport-agnostic.

pub mod classifier;
pub mod config;
pub mod error;
pub mod geocode;
pub mod models;
pub mod resolver;
pub mod router;
pub mod store;

// Re-export commonly used types
pub use classifier::{ClassifyInput, SymptomClassifier};
pub use config::{BoundingBox, Config};
pub use error::{Result, ServiceError};
pub use models::{
    Assessment, Facility, PincodeResolution, ResolutionSource, SeverityLevel, StoreStats,
};
pub use resolver::{valid_pincode, PincodeResolver};
pub use router::{RoutedFacilities, SeverityRouter, RADIUS_SCHEDULE_KM};
pub use store::{
    FacilityIndex, FacilityStore, SpatialQuery, DIAGNOSTIC_ROW_CAP, ROUTING_ROW_CAP,
};
