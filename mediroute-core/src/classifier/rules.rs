//! Rule-based fallback classification: a department keyword table and a
//! high-severity term set. Deterministic — identical text always yields
//! the identical Assessment.

use crate::models::{Assessment, SeverityLevel, DISCLAIMER};

/// First match wins; entries are ordered from most specific to the
/// general-medicine catch-alls. Specialty strings are the exact names
/// stored in the facility database.
const DEPARTMENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("Dental", &["tooth", "teeth", "daant", "cavity", "gum pain"]),
    ("Ophthalmology", &["eye", "aankh", "vision", "conjunctivitis"]),
    ("ENT", &["ear", "kaan", "throat", "gala", "tonsil", "sinus"]),
    ("Dermatology", &["skin", "rash", "itch", "khujli", "acne"]),
    (
        "Orthopaedics",
        &["bone", "joint", "knee", "back pain", "haddi", "kamar dard", "sprain"],
    ),
    (
        "Cardiology",
        &["heart", "dil", "blood pressure", "palpitation"],
    ),
    (
        "Gastro-enterology",
        &[
            "stomach",
            "pet dard",
            "abdomen",
            "acidity",
            "vomit",
            "diarrhoea",
            "diarrhea",
            "loose motion",
            "constipation",
        ],
    ),
    ("Pulmonology", &["cough", "khansi", "asthma", "wheez"]),
    (
        "Neurology",
        &["headache", "sar dard", "migraine", "dizzy", "chakkar", "numbness"],
    ),
    (
        "Obstetrics and Gynaecology",
        &["pregnan", "period pain", "menstrual", "garbh"],
    ),
    ("Paediatrics", &["child", "baby", "bachcha", "bachhe", "infant"]),
    ("Urology", &["urine", "peshab", "kidney stone", "urinary"]),
    ("Psychiatry", &["anxiety", "depression", "stress", "cannot sleep"]),
    ("Diabetology", &["diabetes", "sugar level"]),
    (
        "General Medicine",
        &["fever", "bukhar", "cold", "flu", "weakness", "thakan", "body ache"],
    ),
];

/// Any of these elevates the rule-based score from mild (3) to high (7).
const HIGH_SEVERITY_TERMS: &[&str] = &[
    "severe",
    "high fever",
    "tez bukhar",
    "blood",
    "khoon",
    "confusion",
    "dengue",
    "malaria",
    "typhoid",
    "unbearable",
    "intense pain",
];

pub fn match_department(text: &str) -> &'static str {
    let folded = text.to_lowercase();
    for (department, keywords) in DEPARTMENT_KEYWORDS {
        if keywords.iter().any(|k| folded.contains(k)) {
            return department;
        }
    }
    "General Medicine"
}

fn matched_high_severity(text: &str) -> Vec<String> {
    let folded = text.to_lowercase();
    HIGH_SEVERITY_TERMS
        .iter()
        .filter(|t| folded.contains(**t))
        .map(|t| t.to_string())
        .collect()
}

/// Branch-3 classification. `mode` distinguishes a configured rule-based
/// run from a degradation after an external-branch failure.
pub fn rule_assessment(text: &str, mode: &str) -> Assessment {
    let department = match_department(text);
    let red_flags = matched_high_severity(text);
    let (severity, action) = if red_flags.is_empty() {
        (3, "Visit a nearby clinic or primary health centre.")
    } else {
        (7, "Visit a hospital soon; do not wait for symptoms to worsen.")
    };

    Assessment {
        severity,
        severity_level: SeverityLevel::from_score(severity),
        specialties: vec![department.to_string()],
        primary_department: department.to_string(),
        recommended_action: action.to_string(),
        reasoning: format!("Keyword-matched to {department}."),
        is_auto_emergency: false,
        detected_keywords: vec![],
        requires_trauma: false,
        requires_maternity_ward: false,
        requires_nicu: false,
        needs_clarification: false,
        clarifying_questions: vec![],
        stage1_cache: None,
        red_flags,
        disclaimer: DISCLAIMER.to_string(),
        assessment_mode: mode.to_string(),
    }
}
