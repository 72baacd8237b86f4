// src/models/evidence.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-company summary returned by the SEC EDGAR collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecFilingSummary {
    #[serde(default)]
    pub ticker: Option<String>,
    /// Free-text status such as "active", "formerly public", "acquired".
    #[serde(default)]
    pub company_status: Option<String>,
    #[serde(default)]
    pub filing_count: u32,
    #[serde(default)]
    pub latest_filing_date: Option<NaiveDate>,
    #[serde(default)]
    pub latest_filing_type: Option<String>,
}

/// Interpreted form of `company_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecStatus {
    Active,
    FormerlyPublic,
    Acquired,
    Subsidiary,
    Ambiguous,
}

impl SecFilingSummary {
    pub fn status(&self) -> SecStatus {
        let status = self
            .company_status
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_lowercase();
        if status.contains("acquired") || status.contains("merged") {
            SecStatus::Acquired
        } else if status.contains("subsidiary") {
            SecStatus::Subsidiary
        } else if status.contains("formerly")
            || status.contains("deregistered")
            || status.contains("delisted")
            || status.contains("inactive")
        {
            SecStatus::FormerlyPublic
        } else if status == "active" || status == "public" || status == "listed" {
            SecStatus::Active
        } else {
            SecStatus::Ambiguous
        }
    }

    pub fn has_ticker(&self) -> bool {
        self.ticker.as_deref().map_or(false, |t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TrialPhase {
    EarlyPhase1,
    Phase1,
    Phase2,
    Phase3,
    Phase4,
    NotApplicable,
}

impl From<String> for TrialPhase {
    fn from(raw: String) -> Self {
        let key: String = raw
            .to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match key.as_str() {
            "EARLYPHASE1" => TrialPhase::EarlyPhase1,
            "PHASE1" | "PHASEI" | "PHASE1PHASE2" | "PHASE12" => TrialPhase::Phase1,
            "PHASE2" | "PHASEII" | "PHASE2PHASE3" | "PHASE23" => TrialPhase::Phase2,
            "PHASE3" | "PHASEIII" => TrialPhase::Phase3,
            "PHASE4" | "PHASEIV" => TrialPhase::Phase4,
            _ => TrialPhase::NotApplicable,
        }
    }
}

impl From<TrialPhase> for String {
    fn from(phase: TrialPhase) -> Self {
        match phase {
            TrialPhase::EarlyPhase1 => "EARLY_PHASE1",
            TrialPhase::Phase1 => "PHASE1",
            TrialPhase::Phase2 => "PHASE2",
            TrialPhase::Phase3 => "PHASE3",
            TrialPhase::Phase4 => "PHASE4",
            TrialPhase::NotApplicable => "NA",
        }
        .to_string()
    }
}

impl TrialPhase {
    /// Numeric phase; early phase 1 counts as 1, N/A as 0.
    pub fn number(&self) -> u8 {
        match self {
            TrialPhase::NotApplicable => 0,
            TrialPhase::EarlyPhase1 | TrialPhase::Phase1 => 1,
            TrialPhase::Phase2 => 2,
            TrialPhase::Phase3 => 3,
            TrialPhase::Phase4 => 4,
        }
    }
}

/// One study returned by the ClinicalTrials.gov collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalTrial {
    pub phase: TrialPhase,
    #[serde(default)]
    pub trial_status: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
    #[serde(default)]
    pub sponsor_name: Option<String>,
}

impl ClinicalTrial {
    pub fn is_active(&self) -> bool {
        let status = self.trial_status.as_deref().unwrap_or("").to_uppercase();
        matches!(
            status.replace(' ', "_").as_str(),
            "RECRUITING" | "ACTIVE_NOT_RECRUITING" | "ENROLLING_BY_INVITATION" | "NOT_YET_RECRUITING"
        )
    }
}

/// Everything the stage classifier may look at for one company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageEvidence {
    pub company_name: String,
    #[serde(default)]
    pub sec: Option<SecFilingSummary>,
    #[serde(default)]
    pub trials: Vec<ClinicalTrial>,
    #[serde(default)]
    pub focus_area: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl StageEvidence {
    pub fn for_name(name: impl Into<String>) -> Self {
        Self {
            company_name: name.into(),
            ..Default::default()
        }
    }

    /// Focus area and description joined, lower-cased.
    pub fn combined_text(&self) -> String {
        let parts: Vec<&str> = [self.focus_area.as_deref(), self.description.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect();
        parts.join(" ").to_lowercase()
    }

    pub fn max_trial_phase(&self) -> u8 {
        self.trials.iter().map(|t| t.phase.number()).max().unwrap_or(0)
    }

    pub fn active_trial_count(&self) -> usize {
        self.trials.iter().filter(|t| t.is_active()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sec_status_parsing() {
        let mut sec = SecFilingSummary {
            company_status: Some("Active".into()),
            ..Default::default()
        };
        assert_eq!(sec.status(), SecStatus::Active);
        sec.company_status = Some("Formerly public (deregistered)".into());
        assert_eq!(sec.status(), SecStatus::FormerlyPublic);
        sec.company_status = Some("acquired by Roche".into());
        assert_eq!(sec.status(), SecStatus::Acquired);
        sec.company_status = None;
        assert_eq!(sec.status(), SecStatus::Ambiguous);
    }

    #[test]
    fn test_trial_phase_aliases() {
        let trial: ClinicalTrial =
            serde_json::from_str(r#"{"phase":"PHASE2","trial_status":"RECRUITING"}"#).unwrap();
        assert_eq!(trial.phase, TrialPhase::Phase2);
        assert!(trial.is_active());
        let odd: ClinicalTrial = serde_json::from_str(r#"{"phase":"whatever"}"#).unwrap();
        assert_eq!(odd.phase, TrialPhase::NotApplicable);
    }

    #[test]
    fn test_combined_text_skips_blank() {
        let ev = StageEvidence {
            company_name: "X".into(),
            focus_area: Some("Gene Therapy".into()),
            description: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(ev.combined_text(), "gene therapy");
    }
}
