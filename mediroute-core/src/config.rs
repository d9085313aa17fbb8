use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Geographic admissibility box. Coordinates outside it are treated as
/// data errors everywhere in the core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// India: covers the mainland plus island territories.
    pub const INDIA: BoundingBox = BoundingBox {
        min_lat: 6.0,
        max_lat: 37.5,
        min_lng: 68.0,
        max_lng: 97.5,
    };

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat.is_finite()
            && lng.is_finite()
            && lat >= self.min_lat
            && lat <= self.max_lat
            && lng >= self.min_lng
            && lng <= self.max_lng
    }
}

/// Process-wide configuration, read once at startup. Mutation requires a
/// restart; components receive it by reference at construction and never
/// reach into the environment at request time.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_port: u16,
    pub allowed_origin: String,

    pub db_dsn: String,
    pub db_ssl: bool,
    pub pool_size: u32,
    pub acquire_timeout: Duration,
    pub query_timeout: Duration,

    pub geocode_provider_region: String,
    pub geocode_index_name: Option<String>,
    pub geocode_api_key: Option<String>,
    pub geocode_timeout: Duration,
    pub geocode_min_relevance: f64,

    pub country_bbox: BoundingBox,
    pub quality_threshold: f64,
    pub min_results_before_relax: usize,
    pub max_radius_km: f64,

    pub ai_classifier_url: Option<String>,
    pub ai_classifier_timeout: Duration,
    pub clarify_ttl: Duration,

    pub cache_ttl: Duration,
    pub request_deadline: Duration,
}

impl Config {
    /// Read configuration from the environment. `DATABASE_URL` is the only
    /// required variable; everything else has a default.
    pub fn from_env() -> Result<Self> {
        let db_dsn = std::env::var("DATABASE_URL")
            .context("DATABASE_URL environment variable must be set")?;

        Ok(Config {
            listen_port: env_parse("PORT", 5000)?,
            allowed_origin: env_or("ALLOWED_ORIGIN", "http://localhost:3001"),
            db_dsn,
            db_ssl: env_parse("DB_SSL", false)?,
            pool_size: env_parse("DB_POOL_SIZE", 10)?,
            acquire_timeout: Duration::from_millis(env_parse("DB_ACQUIRE_TIMEOUT_MS", 500u64)?),
            query_timeout: Duration::from_millis(env_parse("DB_QUERY_TIMEOUT_MS", 3000u64)?),
            geocode_provider_region: env_or("GEOCODE_REGION", "ap-south-1"),
            geocode_index_name: std::env::var("GEOCODE_INDEX").ok().filter(|s| !s.is_empty()),
            geocode_api_key: std::env::var("GEOCODE_API_KEY").ok().filter(|s| !s.is_empty()),
            geocode_timeout: Duration::from_millis(env_parse("GEOCODE_TIMEOUT_MS", 2000u64)?),
            geocode_min_relevance: env_parse("GEOCODE_MIN_RELEVANCE", 0.5)?,
            country_bbox: parse_bbox()?,
            quality_threshold: env_parse("QUALITY_THRESHOLD", 0.3)?,
            min_results_before_relax: env_parse("MIN_RESULTS_BEFORE_RELAX", 3usize)?,
            max_radius_km: env_parse("MAX_RADIUS_KM", 20.0)?,
            ai_classifier_url: std::env::var("AI_CLASSIFIER_URL").ok().filter(|s| !s.is_empty()),
            ai_classifier_timeout: Duration::from_millis(env_parse("AI_CLASSIFIER_TIMEOUT_MS", 8000u64)?),
            clarify_ttl: Duration::from_secs(env_parse("CLARIFY_TTL_S", 600u64)?),
            cache_ttl: Duration::from_secs(env_parse("CACHE_TTL_S", 86400u64)?),
            request_deadline: Duration::from_millis(env_parse("REQUEST_DEADLINE_MS", 15000u64)?),
        })
    }

    /// A config with every default filled in, for tests and local tooling.
    pub fn for_tests(db_dsn: impl Into<String>) -> Self {
        Config {
            listen_port: 5000,
            allowed_origin: "http://localhost:3001".to_string(),
            db_dsn: db_dsn.into(),
            db_ssl: false,
            pool_size: 10,
            acquire_timeout: Duration::from_millis(500),
            query_timeout: Duration::from_millis(3000),
            geocode_provider_region: "ap-south-1".to_string(),
            geocode_index_name: None,
            geocode_api_key: None,
            geocode_timeout: Duration::from_millis(2000),
            geocode_min_relevance: 0.5,
            country_bbox: BoundingBox::INDIA,
            quality_threshold: 0.3,
            min_results_before_relax: 3,
            max_radius_km: 20.0,
            ai_classifier_url: None,
            ai_classifier_timeout: Duration::from_millis(8000),
            clarify_ttl: Duration::from_secs(600),
            cache_ttl: Duration::from_secs(86400),
            request_deadline: Duration::from_millis(15000),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

/// `BBOX=min_lat,max_lat,min_lng,max_lng`; defaults to India.
fn parse_bbox() -> Result<BoundingBox> {
    let raw = match std::env::var("BBOX") {
        Ok(raw) => raw,
        Err(_) => return Ok(BoundingBox::INDIA),
    };
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("BBOX must be four comma-separated numbers, got {raw:?}"))?;
    if parts.len() != 4 || parts[0] >= parts[1] || parts[2] >= parts[3] {
        anyhow::bail!("BBOX must be min_lat,max_lat,min_lng,max_lng with min < max");
    }
    Ok(BoundingBox {
        min_lat: parts[0],
        max_lat: parts[1],
        min_lng: parts[2],
        max_lng: parts[3],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn india_bbox_bounds() {
        let bbox = BoundingBox::INDIA;
        assert!(bbox.contains(12.9716, 77.5946)); // Bengaluru
        assert!(bbox.contains(28.6139, 77.2090)); // Delhi
        assert!(!bbox.contains(51.5072, -0.1276)); // London
        assert!(!bbox.contains(f64::NAN, 77.0));
        assert!(!bbox.contains(12.0, f64::INFINITY));
    }

    #[test]
    fn defaults_without_env() {
        let cfg = Config::for_tests("postgres://localhost/x");
        assert_eq!(cfg.listen_port, 5000);
        assert_eq!(cfg.quality_threshold, 0.3);
        assert_eq!(cfg.min_results_before_relax, 3);
        assert_eq!(cfg.max_radius_km, 20.0);
        assert_eq!(cfg.geocode_timeout, Duration::from_secs(2));
        assert_eq!(cfg.ai_classifier_timeout, Duration::from_secs(8));
        assert_eq!(cfg.request_deadline, Duration::from_secs(15));
        assert!(cfg.ai_classifier_url.is_none());
    }
}
