//! Instant emergency detection: fixed, case-folded substring matching
//! against a curated term list. Substring matching is intentional —
//! a false positive costs a wider search radius, a false negative costs
//! a life. Hindi transliterations sit next to their English forms.

use crate::models::{Assessment, SeverityLevel, DISCLAIMER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyCategory {
    Cardiac,
    Respiratory,
    Bleeding,
    Neurological,
    Trauma,
    Obstetric,
    Poisoning,
}

#[derive(Debug, Clone, Copy)]
pub struct EmergencyTerm {
    pub term: &'static str,
    pub category: EmergencyCategory,
    /// Newborn-critical obstetric terms additionally flag a NICU need.
    pub nicu: bool,
}

const fn term(term: &'static str, category: EmergencyCategory) -> EmergencyTerm {
    EmergencyTerm {
        term,
        category,
        nicu: false,
    }
}

const fn nicu_term(term: &'static str) -> EmergencyTerm {
    EmergencyTerm {
        term,
        category: EmergencyCategory::Obstetric,
        nicu: true,
    }
}

/// Union of the emergency lists that existed across the assessment
/// prompts and the rule files; kept as data so clinical review can edit
/// it without touching logic.
pub const EMERGENCY_TERMS: &[EmergencyTerm] = &[
    // cardiac
    term("chest pain", EmergencyCategory::Cardiac),
    term("chest tightness", EmergencyCategory::Cardiac),
    term("seena dard", EmergencyCategory::Cardiac),
    term("seene mein dard", EmergencyCategory::Cardiac),
    term("heart attack", EmergencyCategory::Cardiac),
    term("dil ka daura", EmergencyCategory::Cardiac),
    // respiratory
    term("cannot breathe", EmergencyCategory::Respiratory),
    term("can not breathe", EmergencyCategory::Respiratory),
    term("can't breathe", EmergencyCategory::Respiratory),
    term("difficulty breathing", EmergencyCategory::Respiratory),
    term("shortness of breath", EmergencyCategory::Respiratory),
    term("breathless", EmergencyCategory::Respiratory),
    term("saans nahi", EmergencyCategory::Respiratory),
    term("saans lene mein", EmergencyCategory::Respiratory),
    term("choking", EmergencyCategory::Respiratory),
    // bleeding
    term("severe bleeding", EmergencyCategory::Bleeding),
    term("bleeding heavily", EmergencyCategory::Bleeding),
    term("tez khoon", EmergencyCategory::Bleeding),
    term("khoon beh", EmergencyCategory::Bleeding),
    term("vomiting blood", EmergencyCategory::Bleeding),
    term("coughing blood", EmergencyCategory::Bleeding),
    // neurological
    term("unconscious", EmergencyCategory::Neurological),
    term("behosh", EmergencyCategory::Neurological),
    term("passed out", EmergencyCategory::Neurological),
    term("fainted", EmergencyCategory::Neurological),
    term("seizure", EmergencyCategory::Neurological),
    term("convulsion", EmergencyCategory::Neurological),
    term("fits", EmergencyCategory::Neurological),
    term("daura", EmergencyCategory::Neurological),
    term("stroke", EmergencyCategory::Neurological),
    term("paralysis", EmergencyCategory::Neurological),
    term("face drooping", EmergencyCategory::Neurological),
    term("sudden numbness", EmergencyCategory::Neurological),
    term("trouble speaking", EmergencyCategory::Neurological),
    // trauma
    term("road accident", EmergencyCategory::Trauma),
    term("accident", EmergencyCategory::Trauma),
    term("head injury", EmergencyCategory::Trauma),
    term("severe burn", EmergencyCategory::Trauma),
    term("deep cut", EmergencyCategory::Trauma),
    term("open fracture", EmergencyCategory::Trauma),
    term("fell from height", EmergencyCategory::Trauma),
    // obstetric
    term("labour pain", EmergencyCategory::Obstetric),
    term("labor pain", EmergencyCategory::Obstetric),
    term("prasav dard", EmergencyCategory::Obstetric),
    nicu_term("water broke"),
    nicu_term("baby not moving"),
    term("pregnancy bleeding", EmergencyCategory::Obstetric),
    // poisoning
    term("poisoning", EmergencyCategory::Poisoning),
    term("overdose", EmergencyCategory::Poisoning),
    term("snake bite", EmergencyCategory::Poisoning),
    term("saanp", EmergencyCategory::Poisoning),
    term("anaphylaxis", EmergencyCategory::Poisoning),
    term("severe allergic", EmergencyCategory::Poisoning),
];

/// All terms contained in `text` (case-insensitive substring match).
pub fn scan(text: &str) -> Vec<&'static EmergencyTerm> {
    let folded = text.to_lowercase();
    EMERGENCY_TERMS
        .iter()
        .filter(|t| folded.contains(t.term))
        .collect()
}

fn specialties_for(categories: &[EmergencyCategory]) -> Vec<String> {
    let mut specialties: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        if !specialties.iter().any(|existing| existing == s) {
            specialties.push(s.to_string());
        }
    };
    for category in categories {
        match category {
            EmergencyCategory::Cardiac => push("Cardiology"),
            EmergencyCategory::Respiratory => push("Pulmonology"),
            EmergencyCategory::Neurological => push("Neurology"),
            EmergencyCategory::Trauma => push("Trauma care"),
            EmergencyCategory::Obstetric => push("Obstetrics and Gynaecology"),
            EmergencyCategory::Bleeding | EmergencyCategory::Poisoning => {}
        }
    }
    push("24 hours emergency care");
    specialties
}

/// Short-circuit Assessment for matched emergency terms. Severity is
/// pinned at 10 so every downstream decision treats it as the top tier.
pub fn emergency_assessment(matches: &[&'static EmergencyTerm]) -> Assessment {
    let keywords: Vec<String> = matches.iter().map(|t| t.term.to_string()).collect();
    let categories: Vec<EmergencyCategory> = matches.iter().map(|t| t.category).collect();
    let specialties = specialties_for(&categories);

    Assessment {
        severity: 10,
        severity_level: SeverityLevel::Emergency,
        primary_department: specialties[0].clone(),
        specialties,
        recommended_action: "Call 108 immediately or go to the nearest emergency department."
            .to_string(),
        reasoning: format!("Emergency indicators detected: {}", keywords.join(", ")),
        is_auto_emergency: true,
        detected_keywords: keywords.clone(),
        requires_trauma: categories.contains(&EmergencyCategory::Trauma),
        requires_maternity_ward: categories.contains(&EmergencyCategory::Obstetric),
        requires_nicu: matches.iter().any(|t| t.nicu),
        needs_clarification: false,
        clarifying_questions: vec![],
        stage1_cache: None,
        red_flags: keywords,
        disclaimer: DISCLAIMER.to_string(),
        assessment_mode: "emergency-fast-track".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_are_case_insensitive_substrings() {
        let matches = scan("I have CHEST PAIN and cannot breathe");
        let terms: Vec<&str> = matches.iter().map(|t| t.term).collect();
        assert!(terms.contains(&"chest pain"));
        assert!(terms.contains(&"cannot breathe"));
    }

    #[test]
    fn hindi_transliterations_match() {
        assert!(!scan("seena dard ho raha hai").is_empty());
        assert!(!scan("woh behosh ho gaya").is_empty());
        assert!(!scan("prasav dard shuru").is_empty());
    }

    #[test]
    fn benign_text_does_not_match() {
        assert!(scan("mild skin rash since yesterday").is_empty());
        assert!(scan("tooth pain").is_empty());
    }

    #[test]
    fn emergency_assessment_is_pinned_to_top_tier() {
        let matches = scan("chest pain and cannot breathe");
        let a = emergency_assessment(&matches);
        assert_eq!(a.severity, 10);
        assert_eq!(a.severity_level, SeverityLevel::Emergency);
        assert!(a.is_auto_emergency);
        assert!(!a.needs_clarification);
        assert!(a.detected_keywords.contains(&"chest pain".to_string()));
        assert!(a.specialties.contains(&"Cardiology".to_string()));
        assert!(a.specialties.contains(&"24 hours emergency care".to_string()));
    }

    #[test]
    fn obstetric_terms_flag_maternity_and_nicu() {
        let a = emergency_assessment(&scan("water broke at home"));
        assert!(a.requires_maternity_ward);
        assert!(a.requires_nicu);

        let a = emergency_assessment(&scan("labour pain started"));
        assert!(a.requires_maternity_ward);
        assert!(!a.requires_nicu);
    }

    #[test]
    fn trauma_terms_flag_trauma() {
        let a = emergency_assessment(&scan("road accident, head injury"));
        assert!(a.requires_trauma);
        assert!(a.specialties.contains(&"Trauma care".to_string()));
    }
}
