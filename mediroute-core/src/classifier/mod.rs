//! Symptom classification: three branches tried in order, all producing
//! the same Assessment shape so downstream code is branch-agnostic.
//!
//! 1. Instant emergency — substring scan, short-circuits everything.
//! 2. External AI — optional, two-round clarifying protocol.
//! 3. Rule-based fallback — deterministic keyword tables.
//!
//! The classifier never fails: the worst case is a mild General-Medicine
//! assessment from branch 3.

pub mod emergency;
pub mod external;
pub mod rules;

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::models::Assessment;
use external::{ExternalClassifier, ExternalRequest};

/// Classifier input. `clarifying_answers` and `stage1_cache` are empty /
/// absent in round 1 of the clarifying protocol.
#[derive(Debug, Clone, Default)]
pub struct ClassifyInput {
    pub symptoms: String,
    pub clarifying_answers: Vec<String>,
    pub stage1_cache: Option<Value>,
    pub age: Option<String>,
    pub duration: Option<String>,
}

pub struct SymptomClassifier {
    external: Option<ExternalClassifier>,
    clarify_ttl: Duration,
}

impl SymptomClassifier {
    pub fn new(config: &Config) -> Self {
        let external = ExternalClassifier::from_config(config);
        if external.is_none() {
            info!("external classifier not configured; using rule-based classification");
        }
        SymptomClassifier {
            external,
            clarify_ttl: config.clarify_ttl,
        }
    }

    /// Total over all non-empty inputs: always returns an Assessment,
    /// never an error.
    pub async fn classify(&self, input: &ClassifyInput) -> Assessment {
        let symptoms = input.symptoms.trim();

        // Branch 1: emergency terms short-circuit both other branches.
        let matches = emergency::scan(symptoms);
        if !matches.is_empty() {
            info!(keywords = ?matches.iter().map(|t| t.term).collect::<Vec<_>>(),
                  "instant emergency detected");
            return emergency::emergency_assessment(&matches);
        }

        // Branch 2: external AI, when configured.
        if let Some(external) = &self.external {
            match self.classify_external(external, input, symptoms).await {
                Ok(assessment) => return assessment,
                Err(e) => {
                    warn!(error = %e, "external classifier failed, degrading to rules");
                    return rules::rule_assessment(symptoms, "client-fallback");
                }
            }
        }

        // Branch 3 by configuration.
        rules::rule_assessment(symptoms, "rule-based")
    }

    async fn classify_external(
        &self,
        external: &ExternalClassifier,
        input: &ClassifyInput,
        symptoms: &str,
    ) -> anyhow::Result<Assessment> {
        // A round-2 submission whose cache envelope has expired restarts
        // the protocol: answers without fresh stage-1 state are unusable.
        let inner_cache = input
            .stage1_cache
            .as_ref()
            .and_then(|envelope| unwrap_stage1(envelope, self.clarify_ttl));
        let round2 = inner_cache.is_some() && !input.clarifying_answers.is_empty();
        if input.stage1_cache.is_some() && inner_cache.is_none() {
            info!("stage-1 cache expired or unreadable; restarting clarification");
        }

        let answers: &[String] = if round2 { &input.clarifying_answers } else { &[] };
        let request = ExternalRequest {
            symptoms,
            clarifying_answers: answers,
            stage1_cache: inner_cache.as_ref(),
            age: input.age.as_deref(),
            duration: input.duration.as_deref(),
        };

        let mut assessment = external.assess(&request).await?;

        if assessment.needs_clarification {
            // Wrap the remote payload so round 2 can be age-checked
            // without any server-side session state.
            assessment.stage1_cache = assessment.stage1_cache.take().map(wrap_stage1);
            assessment.assessment_mode = "ai-clarifying".to_string();
        } else {
            assessment.stage1_cache = None;
            assessment.assessment_mode = if round2 {
                "ai-stage2".to_string()
            } else {
                "ai-full".to_string()
            };
        }
        Ok(assessment)
    }
}

/// Envelope the opaque stage-1 payload with its issue time (unix seconds).
fn wrap_stage1(inner: Value) -> Value {
    json!({ "iat": chrono::Utc::now().timestamp(), "inner": inner })
}

/// Recover the payload from an envelope younger than `ttl`. Foreign or
/// malformed envelopes count as expired.
fn unwrap_stage1(envelope: &Value, ttl: Duration) -> Option<Value> {
    let iat = envelope.get("iat")?.as_i64()?;
    let inner = envelope.get("inner")?;
    let age = chrono::Utc::now().timestamp().saturating_sub(iat);
    if age < 0 || age as u64 > ttl.as_secs() {
        return None;
    }
    Some(inner.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeverityLevel;

    fn classifier() -> SymptomClassifier {
        SymptomClassifier::new(&Config::for_tests("postgres://localhost/x"))
    }

    fn input(symptoms: &str) -> ClassifyInput {
        ClassifyInput {
            symptoms: symptoms.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn emergency_terms_always_win() {
        let a = classifier().classify(&input("chest pain and cannot breathe")).await;
        assert_eq!(a.severity, 10);
        assert_eq!(a.severity_level, SeverityLevel::Emergency);
        assert!(a.is_auto_emergency);
        assert!(a.detected_keywords.contains(&"chest pain".to_string()));
        assert!(a.detected_keywords.contains(&"cannot breathe".to_string()));
        assert!(!a.needs_clarification);
    }

    #[tokio::test]
    async fn rule_branch_used_when_external_unset() {
        let a = classifier().classify(&input("tooth pain since morning")).await;
        assert_eq!(a.assessment_mode, "rule-based");
        assert_eq!(a.primary_department, "Dental");
        assert_eq!(a.severity_level, SeverityLevel::Mild);
    }

    #[tokio::test]
    async fn identical_input_yields_identical_assessment() {
        let c = classifier();
        let a = c.classify(&input("severe headache since 3 days")).await;
        let b = c.classify(&input("severe headache since 3 days")).await;
        assert_eq!(serde_json::to_value(&a).unwrap(), serde_json::to_value(&b).unwrap());
    }

    #[tokio::test]
    async fn classifier_is_total_over_odd_inputs() {
        let c = classifier();
        for text in ["x", "????", "1234567890", "बुखार और खांसी", "   padded   "] {
            let a = c.classify(&input(text)).await;
            assert!((1..=10).contains(&a.severity));
            assert!(!a.primary_department.is_empty());
            assert!(!a.disclaimer.is_empty());
        }
    }

    #[test]
    fn stage1_envelope_round_trips_while_fresh() {
        let inner = json!({"bodySystem": "Gastro-enterology"});
        let envelope = wrap_stage1(inner.clone());
        let out = unwrap_stage1(&envelope, Duration::from_secs(600)).unwrap();
        assert_eq!(out, inner);
    }

    #[test]
    fn stale_or_foreign_envelopes_are_rejected() {
        let stale = json!({"iat": chrono::Utc::now().timestamp() - 3600, "inner": {}});
        assert!(unwrap_stage1(&stale, Duration::from_secs(600)).is_none());

        let foreign = json!({"bodySystem": "General Medicine"});
        assert!(unwrap_stage1(&foreign, Duration::from_secs(600)).is_none());

        let future = json!({"iat": chrono::Utc::now().timestamp() + 3600, "inner": {}});
        assert!(unwrap_stage1(&future, Duration::from_secs(600)).is_none());
    }
}
