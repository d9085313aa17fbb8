use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Four-tier ordinal severity bucket derived from the 1-10 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Mild,
    Moderate,
    High,
    Emergency,
}

impl SeverityLevel {
    /// Deterministic score → level derivation: 1-3 mild, 4-6 moderate,
    /// 7-8 high, 9-10 emergency. Scores are clamped into 1..=10 first.
    pub fn from_score(score: u8) -> Self {
        match score.clamp(1, 10) {
            1..=3 => SeverityLevel::Mild,
            4..=6 => SeverityLevel::Moderate,
            7..=8 => SeverityLevel::High,
            _ => SeverityLevel::Emergency,
        }
    }

    /// Starting radius of the progressive expansion, in kilometres.
    pub fn initial_radius_km(&self) -> f64 {
        match self {
            SeverityLevel::Mild => 5.0,
            SeverityLevel::Moderate => 8.0,
            SeverityLevel::High | SeverityLevel::Emergency => 12.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Mild => "mild",
            SeverityLevel::Moderate => "moderate",
            SeverityLevel::High => "high",
            SeverityLevel::Emergency => "emergency",
        }
    }

    /// Display label used in the response `config` block.
    pub fn label(&self) -> &'static str {
        match self {
            SeverityLevel::Mild => "Mild",
            SeverityLevel::Moderate => "Moderate",
            SeverityLevel::High => "High",
            SeverityLevel::Emergency => "Emergency",
        }
    }
}

impl std::str::FromStr for SeverityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mild" => Ok(SeverityLevel::Mild),
            "moderate" => Ok(SeverityLevel::Moderate),
            "high" => Ok(SeverityLevel::High),
            "emergency" => Ok(SeverityLevel::Emergency),
            other => Err(format!(
                "severityLevel must be one of mild|moderate|high|emergency, got {other:?}"
            )),
        }
    }
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A facility record as returned to clients: the canonical store fields
/// plus the computed `distance_km` and flattened coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub care_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub ayush: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discipline: Option<String>,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub facilities: Vec<String>,
    pub emergency_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambulance_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bloodbank_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_beds: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub data_quality: f64,
    /// Great-circle distance from the query point, 0.01 km precision.
    pub distance_km: f64,
}

impl Facility {
    /// Government-tagged facilities are preferred for mild/moderate
    /// routing. The tag lives in the free-form category string.
    pub fn is_government(&self) -> bool {
        self.category
            .as_deref()
            .map(|c| {
                let c = c.to_ascii_lowercase();
                c.contains("gov") || c.contains("public")
            })
            .unwrap_or(false)
    }
}

/// Transient per-request classifier output. Wire casing matches the
/// assessment API consumed by the frontend (camelCase).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub severity: u8,
    pub severity_level: SeverityLevel,
    pub specialties: Vec<String>,
    pub primary_department: String,
    pub recommended_action: String,
    pub reasoning: String,

    pub is_auto_emergency: bool,
    pub detected_keywords: Vec<String>,
    pub requires_trauma: bool,
    pub requires_maternity_ward: bool,
    #[serde(rename = "requiresNICU")]
    pub requires_nicu: bool,

    pub needs_clarification: bool,
    pub clarifying_questions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage1_cache: Option<Value>,

    pub red_flags: Vec<String>,
    pub disclaimer: String,
    pub assessment_mode: String,
}

pub const DISCLAIMER: &str = "This is not a medical diagnosis. Please consult a doctor.";

/// Which strategy produced a pincode resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    ExternalGeocode,
    LocalExactCentroid,
    LocalDistrictCentroid,
}

/// Transient pincode → coordinate resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PincodeResolution {
    pub pincode: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    pub hospital_count: i64,
    pub source: ResolutionSource,
}

/// Aggregate store counters for the stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: i64,
    pub with_coordinates: i64,
    pub emergency: i64,
    pub ayush: i64,
    pub government: i64,
    pub quality_passed: i64,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn severity_tier_derivation() {
        assert_eq!(SeverityLevel::from_score(1), SeverityLevel::Mild);
        assert_eq!(SeverityLevel::from_score(3), SeverityLevel::Mild);
        assert_eq!(SeverityLevel::from_score(4), SeverityLevel::Moderate);
        assert_eq!(SeverityLevel::from_score(6), SeverityLevel::Moderate);
        assert_eq!(SeverityLevel::from_score(7), SeverityLevel::High);
        assert_eq!(SeverityLevel::from_score(8), SeverityLevel::High);
        assert_eq!(SeverityLevel::from_score(9), SeverityLevel::Emergency);
        assert_eq!(SeverityLevel::from_score(10), SeverityLevel::Emergency);
        // out-of-range scores clamp rather than panic
        assert_eq!(SeverityLevel::from_score(0), SeverityLevel::Mild);
        assert_eq!(SeverityLevel::from_score(200), SeverityLevel::Emergency);
    }

    #[test]
    fn initial_radii_match_level_table() {
        assert_eq!(SeverityLevel::Mild.initial_radius_km(), 5.0);
        assert_eq!(SeverityLevel::Moderate.initial_radius_km(), 8.0);
        assert_eq!(SeverityLevel::High.initial_radius_km(), 12.0);
        assert_eq!(SeverityLevel::Emergency.initial_radius_km(), 12.0);
    }

    #[test]
    fn severity_level_round_trips_through_serde() {
        let json = serde_json::to_string(&SeverityLevel::Emergency).unwrap();
        assert_eq!(json, "\"emergency\"");
        let back: SeverityLevel = serde_json::from_str("\"mild\"").unwrap();
        assert_eq!(back, SeverityLevel::Mild);
        assert!(serde_json::from_str::<SeverityLevel>("\"critical\"").is_err());
    }

    #[test]
    fn government_tag_is_substring_match() {
        let mut f = sample_facility();
        f.category = Some("State Govt. Hospital".to_string());
        assert!(f.is_government());
        f.category = Some("Public Health Centre".to_string());
        assert!(f.is_government());
        f.category = Some("Private Trust".to_string());
        assert!(!f.is_government());
        f.category = None;
        assert!(!f.is_government());
    }

    #[test]
    fn assessment_serializes_camel_case() {
        let assessment = Assessment {
            severity: 10,
            severity_level: SeverityLevel::Emergency,
            specialties: vec!["Cardiology".into()],
            primary_department: "Cardiology".into(),
            recommended_action: "Call 108 immediately.".into(),
            reasoning: String::new(),
            is_auto_emergency: true,
            detected_keywords: vec!["chest pain".into()],
            requires_trauma: false,
            requires_maternity_ward: false,
            requires_nicu: false,
            needs_clarification: false,
            clarifying_questions: vec![],
            stage1_cache: None,
            red_flags: vec![],
            disclaimer: DISCLAIMER.into(),
            assessment_mode: "emergency-fast-track".into(),
        };
        let v = serde_json::to_value(&assessment).unwrap();
        assert_eq!(v["severityLevel"], "emergency");
        assert_eq!(v["isAutoEmergency"], true);
        assert_eq!(v["requiresNICU"], false);
        assert_eq!(v["assessmentMode"], "emergency-fast-track");
        assert!(v.get("stage1Cache").is_none());
    }

    pub(crate) fn sample_facility() -> Facility {
        Facility {
            id: 1,
            name: "Test Hospital".into(),
            latitude: 12.97,
            longitude: 77.59,
            care_type: Some("Hospital".into()),
            category: None,
            ayush: false,
            discipline: None,
            specialties: vec![],
            facilities: vec![],
            emergency_available: false,
            emergency_phone: None,
            ambulance_phone: None,
            bloodbank_phone: None,
            general_phone: None,
            total_beds: None,
            pincode: Some("560001".into()),
            district: Some("Bengaluru Urban".into()),
            state: Some("Karnataka".into()),
            address: None,
            data_quality: 0.8,
            distance_km: 1.25,
        }
    }
}
