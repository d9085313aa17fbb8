//! External AI branch: forwards the two-round protocol to a configured
//! classifier endpoint and validates the response against the Assessment
//! shape. Any deviation — timeout, non-2xx, schema mismatch, inconsistent
//! severity — is an error the orchestrator turns into a rule-based
//! fallback; this module never invents an Assessment of its own.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::models::{Assessment, SeverityLevel, DISCLAIMER};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalRequest<'a> {
    pub symptoms: &'a str,
    pub clarifying_answers: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage1_cache: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<&'a str>,
}

pub struct ExternalClassifier {
    client: reqwest::Client,
    url: String,
}

impl ExternalClassifier {
    /// Returns `None` when no classifier URL is configured (branch 2 off).
    pub fn from_config(config: &Config) -> Option<Self> {
        let url = config.ai_classifier_url.clone()?;
        let client = reqwest::Client::builder()
            .timeout(config.ai_classifier_timeout)
            .build()
            .ok()?;
        Some(ExternalClassifier { client, url })
    }

    pub async fn assess(&self, request: &ExternalRequest<'_>) -> Result<Assessment> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .context("classifier request failed")?;

        if !response.status().is_success() {
            bail!("classifier returned {}", response.status());
        }

        let assessment: Assessment = response
            .json()
            .await
            .context("classifier response did not match the assessment shape")?;

        validate(assessment)
    }
}

/// Enforce the invariants the rest of the service relies on. The severity
/// level is recomputed from the score so the tier derivation stays
/// deterministic no matter what the remote model said.
fn validate(mut assessment: Assessment) -> Result<Assessment> {
    if !(1..=10).contains(&assessment.severity) {
        bail!("severity {} out of range 1..=10", assessment.severity);
    }
    assessment.severity_level = SeverityLevel::from_score(assessment.severity);

    if assessment.needs_clarification {
        let n = assessment.clarifying_questions.len();
        if !(2..=5).contains(&n) {
            bail!("clarifying response carried {n} questions, expected 2..=5");
        }
        if assessment.stage1_cache.is_none() {
            bail!("clarifying response is missing the stage-1 cache");
        }
    }

    if assessment.specialties.is_empty() {
        assessment.specialties = vec!["General Medicine".to_string()];
    }
    if assessment.primary_department.trim().is_empty() {
        assessment.primary_department = assessment.specialties[0].clone();
    }
    if assessment.disclaimer.trim().is_empty() {
        assessment.disclaimer = DISCLAIMER.to_string();
    }

    Ok(assessment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn external_json(severity: u8, needs_clarification: bool, questions: usize) -> Value {
        json!({
            "severity": severity,
            "severityLevel": "moderate",
            "specialties": ["General Medicine"],
            "primaryDepartment": "General Medicine",
            "recommendedAction": "Visit a doctor.",
            "reasoning": "",
            "isAutoEmergency": false,
            "detectedKeywords": [],
            "requiresTrauma": false,
            "requiresMaternityWard": false,
            "requiresNICU": false,
            "needsClarification": needs_clarification,
            "clarifyingQuestions": (0..questions).map(|i| format!("Q{i}")).collect::<Vec<_>>(),
            "stage1Cache": if needs_clarification { json!({"bodySystem": "General Medicine"}) } else { Value::Null },
            "redFlags": [],
            "disclaimer": "This is not a medical diagnosis.",
            "assessmentMode": "ai"
        })
    }

    #[test]
    fn level_is_recomputed_from_score() {
        let raw = external_json(8, false, 0);
        let assessment: Assessment = serde_json::from_value(raw).unwrap();
        // wire said "moderate" but score 8 derives to high
        let validated = validate(assessment).unwrap();
        assert_eq!(validated.severity_level, SeverityLevel::High);
    }

    #[test]
    fn out_of_range_severity_is_rejected() {
        let mut raw = external_json(5, false, 0);
        raw["severity"] = json!(0);
        let assessment: Assessment = serde_json::from_value(raw).unwrap();
        assert!(validate(assessment).is_err());
    }

    #[test]
    fn clarifying_question_count_is_bounded() {
        for (n, ok) in [(1, false), (2, true), (5, true), (6, false)] {
            let assessment: Assessment =
                serde_json::from_value(external_json(5, true, n)).unwrap();
            assert_eq!(validate(assessment).is_ok(), ok, "n = {n}");
        }
    }

    #[test]
    fn clarifying_without_cache_is_rejected() {
        let mut raw = external_json(5, true, 2);
        raw.as_object_mut().unwrap().remove("stage1Cache");
        let assessment: Assessment = serde_json::from_value(raw).unwrap();
        assert!(validate(assessment).is_err());
    }

    #[test]
    fn missing_required_field_fails_deserialization() {
        let mut raw = external_json(5, false, 0);
        raw.as_object_mut().unwrap().remove("severity");
        assert!(serde_json::from_value::<Assessment>(raw).is_err());
    }

    #[test]
    fn empty_specialties_default_to_general_medicine() {
        let mut raw = external_json(4, false, 0);
        raw["specialties"] = json!([]);
        raw["primaryDepartment"] = json!("");
        let validated = validate(serde_json::from_value(raw).unwrap()).unwrap();
        assert_eq!(validated.specialties, vec!["General Medicine".to_string()]);
        assert_eq!(validated.primary_department, "General Medicine");
    }
}
