use serde::Deserialize;
use tracing::debug;

use crate::config::{BoundingBox, Config};
use crate::error::{Result, ServiceError};

/// A geocoder hit that passed the relevance and bounding-box gates.
#[derive(Debug, Clone, Copy)]
pub struct GeocodeHit {
    pub latitude: f64,
    pub longitude: f64,
    pub relevance: f64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "Results", default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "Place")]
    place: Place,
    #[serde(rename = "Relevance", default)]
    relevance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Place {
    #[serde(rename = "Geometry")]
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// AWS order: [longitude, latitude].
    #[serde(rename = "Point")]
    point: [f64; 2],
}

/// Client for the external place index (AWS Location Service
/// `SearchPlaceIndexForText`, API-key auth). Strategy 1 of the pincode
/// resolver; constructed only when an index name and key are configured.
pub struct GeocodeClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    min_relevance: f64,
    bbox: BoundingBox,
}

impl GeocodeClient {
    /// Returns `None` when strategy 1 is not configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let index = config.geocode_index_name.as_deref()?;
        let api_key = config.geocode_api_key.as_deref()?;

        let client = reqwest::Client::builder()
            .timeout(config.geocode_timeout)
            .build()
            .ok()?;

        Some(GeocodeClient {
            client,
            url: format!(
                "https://places.geo.{}.amazonaws.com/places/v0/indexes/{}/search/text",
                config.geocode_provider_region,
                urlencoding::encode(index),
            ),
            api_key: api_key.to_string(),
            min_relevance: config.geocode_min_relevance,
            bbox: config.country_bbox,
        })
    }

    /// Resolve `"<code>, India"` against the country-filtered index.
    /// Low-relevance and out-of-box hits are rejected here so callers see
    /// either a usable coordinate or `GeocoderUnavailable`.
    pub async fn search_pincode(&self, pincode: &str) -> Result<GeocodeHit> {
        let body = serde_json::json!({
            "Text": format!("{pincode}, India"),
            "FilterCountries": ["IND"],
            "MaxResults": 1,
        });

        let response = self
            .client
            .post(&self.url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::GeocoderUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::GeocoderUnavailable(format!(
                "place index returned {}",
                response.status()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GeocoderUnavailable(e.to_string()))?;

        let hit = parsed
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::GeocoderUnavailable("no results".to_string()))?;

        let [longitude, latitude] = hit.place.geometry.point;
        let relevance = hit.relevance.unwrap_or(1.0);
        debug!(pincode, latitude, longitude, relevance, "geocoder hit");

        if relevance < self.min_relevance {
            return Err(ServiceError::GeocoderUnavailable(format!(
                "relevance {relevance} below minimum {}",
                self.min_relevance
            )));
        }
        if !self.bbox.contains(latitude, longitude) {
            return Err(ServiceError::GeocoderUnavailable(format!(
                "coordinate ({latitude}, {longitude}) outside country bounding box"
            )));
        }

        Ok(GeocodeHit {
            latitude,
            longitude,
            relevance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_place_index_response() {
        let raw = r#"{
            "Results": [{
                "Place": {"Geometry": {"Point": [77.5946, 12.9716]}, "Label": "560001, Bengaluru, IND"},
                "Relevance": 0.96
            }],
            "Summary": {"Text": "560001, India"}
        }"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        let hit = &parsed.results[0];
        assert_eq!(hit.place.geometry.point, [77.5946, 12.9716]);
        assert_eq!(hit.relevance, Some(0.96));
    }

    #[test]
    fn empty_results_decode_cleanly() {
        let parsed: SearchResponse = serde_json::from_str(r#"{"Results": []}"#).unwrap();
        assert!(parsed.results.is_empty());
    }

    #[test]
    fn not_constructed_without_index_or_key() {
        let mut cfg = Config::for_tests("postgres://localhost/x");
        assert!(GeocodeClient::from_config(&cfg).is_none());
        cfg.geocode_index_name = Some("mediroute-places".to_string());
        assert!(GeocodeClient::from_config(&cfg).is_none());
        cfg.geocode_api_key = Some("v1.public.test".to_string());
        assert!(GeocodeClient::from_config(&cfg).is_some());
    }
}
