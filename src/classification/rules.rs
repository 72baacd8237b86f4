// src/classification/rules.rs - Ordered evidence rules for stage classification
use log::warn;
use serde::{Deserialize, Serialize};

use crate::classification::keywords::{
    contains_any_keyword, count_keywords, explicit_phase, PLATFORM_KEYWORDS, THERAPEUTIC_KEYWORDS,
};
use crate::classification::known_companies::KnownCompanyTable;
use crate::models::core::Stage;
use crate::models::evidence::{SecStatus, StageEvidence};

pub const PRECEDENCE_KNOWN_COMPANY: u8 = 1;
pub const PRECEDENCE_SEC: u8 = 2;
pub const PRECEDENCE_TRIALS: u8 = 3;
pub const PRECEDENCE_TEXT: u8 = 4;
pub const PRECEDENCE_NAME: u8 = 5;
pub const PRECEDENCE_DEFAULT: u8 = 6;

/// Trial count at or above which a company is treated as late-stage.
const LATE_STAGE_TRIAL_COUNT: usize = 5;
/// Net keyword majority needed for a text verdict when both categories appear.
const TEXT_MAJORITY: i64 = 2;

/// What a rule decided. Lower `precedence` is stronger evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub confidence: f64,
    pub method: String,
    pub precedence: u8,
}

impl StageResult {
    pub fn new(stage: Stage, confidence: f64, method: &str, precedence: u8) -> Self {
        Self {
            stage,
            confidence: confidence.clamp(0.0, 1.0),
            method: method.to_string(),
            precedence,
        }
    }
}

/// One step of the classification waterfall.
pub trait StageRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn precedence(&self) -> u8;
    fn evaluate(&self, evidence: &StageEvidence) -> Option<StageResult>;
}

/// Maps a stored `stage_method` back to the precedence of the rule family
/// that writes it. `None` for methods this classifier never produces.
pub fn precedence_for_method(method: &str) -> Option<u8> {
    let method = method.trim();
    if method == "known_company" {
        Some(PRECEDENCE_KNOWN_COMPANY)
    } else if method.starts_with("sec_") {
        Some(PRECEDENCE_SEC)
    } else if method.starts_with("clinical_trials") {
        Some(PRECEDENCE_TRIALS)
    } else if method.starts_with("text_") {
        Some(PRECEDENCE_TEXT)
    } else if method.starts_with("name_pattern") {
        Some(PRECEDENCE_NAME)
    } else if method.starts_with("default_") {
        Some(PRECEDENCE_DEFAULT)
    } else {
        None
    }
}

pub struct KnownCompanyRule {
    table: KnownCompanyTable,
}

impl KnownCompanyRule {
    pub fn new(table: KnownCompanyTable) -> Self {
        Self { table }
    }
}

impl StageRule for KnownCompanyRule {
    fn name(&self) -> &'static str {
        "known_company"
    }

    fn precedence(&self) -> u8 {
        PRECEDENCE_KNOWN_COMPANY
    }

    fn evaluate(&self, evidence: &StageEvidence) -> Option<StageResult> {
        self.table
            .lookup(&evidence.company_name)
            .map(|known| StageResult::new(known.stage, known.confidence, "known_company", PRECEDENCE_KNOWN_COMPANY))
    }
}

pub struct SecFilingRule;

impl StageRule for SecFilingRule {
    fn name(&self) -> &'static str {
        "sec_filing"
    }

    fn precedence(&self) -> u8 {
        PRECEDENCE_SEC
    }

    fn evaluate(&self, evidence: &StageEvidence) -> Option<StageResult> {
        let sec = evidence.sec.as_ref()?;
        if !sec.has_ticker() && sec.filing_count == 0 {
            return None;
        }
        let result = match (sec.has_ticker(), sec.status()) {
            (true, SecStatus::Active) => StageResult::new(Stage::Public, 0.95, "sec_active_ticker", PRECEDENCE_SEC),
            (_, SecStatus::Acquired) => {
                StageResult::new(Stage::PrivateWithSecFilings, 0.90, "sec_acquired", PRECEDENCE_SEC)
            }
            (_, SecStatus::FormerlyPublic) => {
                StageResult::new(Stage::PrivateWithSecFilings, 0.85, "sec_formerly_public", PRECEDENCE_SEC)
            }
            (_, SecStatus::Subsidiary) => {
                StageResult::new(Stage::PrivateWithSecFilings, 0.85, "sec_subsidiary", PRECEDENCE_SEC)
            }
            (true, SecStatus::Ambiguous) => {
                StageResult::new(Stage::PrivateWithSecFilings, 0.80, "sec_ticker_ambiguous", PRECEDENCE_SEC)
            }
            (false, _) => {
                StageResult::new(Stage::PrivateWithSecFilings, 0.75, "sec_filings_ambiguous", PRECEDENCE_SEC)
            }
        };
        Some(result)
    }
}

pub struct ClinicalTrialsRule;

impl StageRule for ClinicalTrialsRule {
    fn name(&self) -> &'static str {
        "clinical_trials"
    }

    fn precedence(&self) -> u8 {
        PRECEDENCE_TRIALS
    }

    fn evaluate(&self, evidence: &StageEvidence) -> Option<StageResult> {
        if evidence.trials.is_empty() {
            return None;
        }
        let count = evidence.trials.len();
        let max_phase = evidence.max_trial_phase();
        let active = evidence.active_trial_count();

        // 0.65 base, rising with volume, phase and ongoing studies
        let confidence = (0.65
            + 0.03 * count.min(5) as f64
            + 0.03 * max_phase.min(3) as f64
            + if active > 0 { 0.03 } else { 0.0 })
        .min(0.90);

        if count >= LATE_STAGE_TRIAL_COUNT || max_phase >= 2 {
            Some(StageResult::new(Stage::LateStage, confidence, "clinical_trials_late", PRECEDENCE_TRIALS))
        } else {
            Some(StageResult::new(Stage::ClinicalStage, confidence, "clinical_trials", PRECEDENCE_TRIALS))
        }
    }
}

pub struct FreeTextRule;

impl StageRule for FreeTextRule {
    fn name(&self) -> &'static str {
        "free_text"
    }

    fn precedence(&self) -> u8 {
        PRECEDENCE_TEXT
    }

    fn evaluate(&self, evidence: &StageEvidence) -> Option<StageResult> {
        let text = evidence.combined_text();
        if text.is_empty() {
            return None;
        }

        if let Some(phase) = explicit_phase(&text) {
            let confidence = match phase {
                Stage::PhaseIII => 0.75,
                Stage::PhaseII => 0.70,
                _ => 0.65,
            };
            return Some(StageResult::new(phase, confidence, "text_phase_keyword", PRECEDENCE_TEXT));
        }

        let platform = count_keywords(&text, PLATFORM_KEYWORDS) as i64;
        let therapeutic = count_keywords(&text, THERAPEUTIC_KEYWORDS) as i64;
        if platform == 0 && therapeutic == 0 {
            return None;
        }

        let net = platform - therapeutic;
        let strength = |n: i64| 0.60 + 0.05 * n.abs().min(3) as f64;
        if net >= TEXT_MAJORITY || (therapeutic == 0 && platform > 0) {
            return Some(StageResult::new(Stage::Platform, strength(net), "text_platform_keywords", PRECEDENCE_TEXT));
        }
        if -net >= TEXT_MAJORITY || (platform == 0 && therapeutic > 0) {
            return Some(StageResult::new(
                Stage::Preclinical,
                strength(net),
                "text_therapeutic_keywords",
                PRECEDENCE_TEXT,
            ));
        }

        let stage = if evidence.company_name.to_lowercase().contains("therapeutics") {
            Stage::Preclinical
        } else {
            Stage::Platform
        };
        warn!(
            "[STAGE] mixed text signals for '{}' ({} platform vs {} therapeutic); name tie-break gives {}",
            evidence.company_name, platform, therapeutic, stage
        );
        Some(StageResult::new(stage, 0.55, "text_mixed_name_tiebreak", PRECEDENCE_TEXT))
    }
}

/// (substring, stage, confidence, method) in the order they are tried.
const NAME_PATTERNS: &[(&str, Stage, f64, &str)] = &[
    ("diagnostic", Stage::Diagnostics, 0.70, "name_pattern_diagnostics"),
    ("clinical", Stage::ClinicalStage, 0.50, "name_pattern_clinical"),
    ("therapeutics", Stage::Preclinical, 0.55, "name_pattern_therapeutics"),
    ("pharma", Stage::Preclinical, 0.50, "name_pattern_pharma"),
    ("medicines", Stage::Preclinical, 0.50, "name_pattern_medicines"),
    ("biosciences", Stage::Platform, 0.40, "name_pattern_biosciences"),
    ("bioscience", Stage::Platform, 0.40, "name_pattern_biosciences"),
    ("biotech", Stage::Platform, 0.40, "name_pattern_biotech"),
    ("genomics", Stage::Platform, 0.45, "name_pattern_genomics"),
];

pub struct NamePatternRule;

impl StageRule for NamePatternRule {
    fn name(&self) -> &'static str {
        "name_pattern"
    }

    fn precedence(&self) -> u8 {
        PRECEDENCE_NAME
    }

    fn evaluate(&self, evidence: &StageEvidence) -> Option<StageResult> {
        let name = evidence.company_name.to_lowercase();
        NAME_PATTERNS
            .iter()
            .find(|(needle, ..)| name.contains(needle))
            .map(|(_, stage, confidence, method)| StageResult::new(*stage, *confidence, method, PRECEDENCE_NAME))
    }
}

/// Always fires.
pub struct DefaultRule;

impl StageRule for DefaultRule {
    fn name(&self) -> &'static str {
        "default"
    }

    fn precedence(&self) -> u8 {
        PRECEDENCE_DEFAULT
    }

    fn evaluate(&self, evidence: &StageEvidence) -> Option<StageResult> {
        let text = format!("{} {}", evidence.company_name, evidence.combined_text());
        if contains_any_keyword(&text, THERAPEUTIC_KEYWORDS) {
            Some(StageResult::new(Stage::Preclinical, 0.30, "default_therapeutic", PRECEDENCE_DEFAULT))
        } else {
            Some(StageResult::new(Stage::Unknown, 0.0, "default_unknown", PRECEDENCE_DEFAULT))
        }
    }
}

/// The standard waterfall, strongest first.
pub fn default_rules(known: KnownCompanyTable) -> Vec<Box<dyn StageRule>> {
    vec![
        Box::new(KnownCompanyRule::new(known)),
        Box::new(SecFilingRule),
        Box::new(ClinicalTrialsRule),
        Box::new(FreeTextRule),
        Box::new(NamePatternRule),
        Box::new(DefaultRule),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::evidence::{ClinicalTrial, SecFilingSummary, TrialPhase};

    fn trial(phase: TrialPhase, status: &str) -> ClinicalTrial {
        ClinicalTrial {
            phase,
            trial_status: Some(status.to_string()),
            start_date: None,
            completion_date: None,
            sponsor_name: None,
        }
    }

    fn sec(ticker: Option<&str>, status: &str, filings: u32) -> SecFilingSummary {
        SecFilingSummary {
            ticker: ticker.map(|t| t.to_string()),
            company_status: Some(status.to_string()),
            filing_count: filings,
            ..Default::default()
        }
    }

    #[test]
    fn test_sec_public_outranks_deregistered() {
        let mut ev = StageEvidence::for_name("Acme Bio");
        ev.sec = Some(sec(Some("ACME"), "active", 40));
        let public = SecFilingRule.evaluate(&ev).unwrap();
        assert_eq!(public.stage, Stage::Public);

        ev.sec = Some(sec(Some("ACME"), "deregistered", 40));
        let former = SecFilingRule.evaluate(&ev).unwrap();
        assert_eq!(former.stage, Stage::PrivateWithSecFilings);
        assert!(public.confidence >= former.confidence);
        assert!((0.75..=0.90).contains(&former.confidence));
    }

    #[test]
    fn test_sec_without_filings_or_ticker_does_not_fire() {
        let mut ev = StageEvidence::for_name("Acme Bio");
        ev.sec = Some(sec(None, "active", 0));
        assert!(SecFilingRule.evaluate(&ev).is_none());
        ev.sec = Some(sec(None, "", 3));
        assert_eq!(SecFilingRule.evaluate(&ev).unwrap().method, "sec_filings_ambiguous");
    }

    #[test]
    fn test_trials_escalate_to_late_stage() {
        let mut ev = StageEvidence::for_name("Acme Bio");
        ev.trials = vec![trial(TrialPhase::Phase1, "COMPLETED")];
        let early = ClinicalTrialsRule.evaluate(&ev).unwrap();
        assert_eq!(early.stage, Stage::ClinicalStage);

        ev.trials.push(trial(TrialPhase::Phase2, "RECRUITING"));
        let late = ClinicalTrialsRule.evaluate(&ev).unwrap();
        assert_eq!(late.stage, Stage::LateStage);
        assert!(late.confidence > early.confidence);

        ev.trials = (0..5).map(|_| trial(TrialPhase::Phase1, "COMPLETED")).collect();
        assert_eq!(ClinicalTrialsRule.evaluate(&ev).unwrap().stage, Stage::LateStage);
        assert!(ClinicalTrialsRule.evaluate(&ev).unwrap().confidence <= 0.90);
    }

    #[test]
    fn test_free_text_categories() {
        let mut ev = StageEvidence::for_name("Acme Bio");
        ev.focus_area = Some("Sequencing instruments and analytics software".into());
        assert_eq!(FreeTextRule.evaluate(&ev).unwrap().stage, Stage::Platform);

        ev.focus_area = Some("Small molecule oncology drugs".into());
        assert_eq!(FreeTextRule.evaluate(&ev).unwrap().stage, Stage::Preclinical);

        ev.description = Some("Lead program entering Phase 2".into());
        let phase = FreeTextRule.evaluate(&ev).unwrap();
        assert_eq!(phase.stage, Stage::PhaseII);
        assert_eq!(phase.method, "text_phase_keyword");
    }

    #[test]
    fn test_free_text_mixed_uses_name_tiebreak() {
        let mut ev = StageEvidence::for_name("Acme Therapeutics");
        ev.focus_area = Some("drug discovery platform".into());
        let result = FreeTextRule.evaluate(&ev).unwrap();
        assert_eq!(result.stage, Stage::Preclinical);
        assert_eq!(result.confidence, 0.55);

        ev.company_name = "Acme Labs".into();
        assert_eq!(FreeTextRule.evaluate(&ev).unwrap().stage, Stage::Platform);
    }

    #[test]
    fn test_name_patterns_and_default() {
        let ev = StageEvidence::for_name("Acme Diagnostics");
        assert_eq!(NamePatternRule.evaluate(&ev).unwrap().stage, Stage::Diagnostics);
        assert!(NamePatternRule.evaluate(&StageEvidence::for_name("Acme")).is_none());

        let oncology = DefaultRule.evaluate(&StageEvidence::for_name("Acme Oncology")).unwrap();
        assert_eq!((oncology.stage, oncology.confidence), (Stage::Preclinical, 0.30));
        let nothing = DefaultRule.evaluate(&StageEvidence::for_name("Acme")).unwrap();
        assert_eq!((nothing.stage, nothing.confidence), (Stage::Unknown, 0.0));
    }

    #[test]
    fn test_precedence_for_method() {
        assert_eq!(precedence_for_method("known_company"), Some(PRECEDENCE_KNOWN_COMPANY));
        assert_eq!(precedence_for_method("sec_active_ticker"), Some(PRECEDENCE_SEC));
        assert_eq!(precedence_for_method("clinical_trials_late"), Some(PRECEDENCE_TRIALS));
        assert_eq!(precedence_for_method("text_platform_keywords"), Some(PRECEDENCE_TEXT));
        assert_eq!(precedence_for_method("hand curated"), None);
    }
}
