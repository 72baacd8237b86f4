// src/models/core.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream source that supplied or confirmed a record.
///
/// Declaration order is the merge priority: earlier variants win. `Ord` is
/// derived so `a < b` means "a outranks b".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValidationSource {
    /// Curated / ground-truth list maintained by hand.
    #[serde(rename = "Manual", alias = "manual", alias = "Curated", alias = "ground_truth")]
    Manual,
    /// BioPharmGuy directory, the primary listing.
    #[serde(rename = "BPG", alias = "bpg", alias = "BioPharmGuy")]
    Bpg,
    /// Wikipedia company lists.
    #[serde(rename = "Wikipedia", alias = "Wiki", alias = "wiki", alias = "wikipedia")]
    Wikipedia,
    /// Third-party API (Places, SEC, trials).
    #[serde(rename = "API", alias = "api", alias = "Api")]
    Api,
    /// Anything scraped from the open web.
    #[serde(rename = "Web", alias = "web", alias = "Other")]
    Web,
}

impl ValidationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationSource::Manual => "Manual",
            ValidationSource::Bpg => "BPG",
            ValidationSource::Wikipedia => "Wikipedia",
            ValidationSource::Api => "API",
            ValidationSource::Web => "Web",
        }
    }

    /// Numeric rank, higher is more trusted.
    pub fn priority(&self) -> u8 {
        match self {
            ValidationSource::Manual => 4,
            ValidationSource::Bpg => 3,
            ValidationSource::Wikipedia => 2,
            ValidationSource::Api => 1,
            ValidationSource::Web => 0,
        }
    }
}

impl Default for ValidationSource {
    fn default() -> Self {
        ValidationSource::Web
    }
}

impl fmt::Display for ValidationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed development-stage vocabulary. `Display` gives the canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "Public")]
    Public,
    #[serde(rename = "Private")]
    Private,
    #[serde(rename = "Private with SEC Filings")]
    PrivateWithSecFilings,
    #[serde(rename = "Clinical Stage")]
    ClinicalStage,
    #[serde(rename = "Public/Late-Stage")]
    LateStage,
    #[serde(rename = "Acquired")]
    Acquired,
    #[serde(rename = "Platform")]
    Platform,
    #[serde(rename = "Preclinical")]
    Preclinical,
    #[serde(rename = "Phase I")]
    PhaseI,
    #[serde(rename = "Phase II")]
    PhaseII,
    #[serde(rename = "Phase III")]
    PhaseIII,
    #[serde(rename = "Commercial")]
    Commercial,
    #[serde(rename = "Diagnostics")]
    Diagnostics,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl Stage {
    pub const ALL: [Stage; 14] = [
        Stage::Public,
        Stage::Private,
        Stage::PrivateWithSecFilings,
        Stage::ClinicalStage,
        Stage::LateStage,
        Stage::Acquired,
        Stage::Platform,
        Stage::Preclinical,
        Stage::PhaseI,
        Stage::PhaseII,
        Stage::PhaseIII,
        Stage::Commercial,
        Stage::Diagnostics,
        Stage::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Public => "Public",
            Stage::Private => "Private",
            Stage::PrivateWithSecFilings => "Private with SEC Filings",
            Stage::ClinicalStage => "Clinical Stage",
            Stage::LateStage => "Public/Late-Stage",
            Stage::Acquired => "Acquired",
            Stage::Platform => "Platform",
            Stage::Preclinical => "Preclinical",
            Stage::PhaseI => "Phase I",
            Stage::PhaseII => "Phase II",
            Stage::PhaseIII => "Phase III",
            Stage::Commercial => "Commercial",
            Stage::Diagnostics => "Diagnostics",
            Stage::Unknown => "Unknown",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Stage::Unknown)
    }

    /// Exact match against the canonical display form.
    pub fn from_canonical(s: &str) -> Option<Stage> {
        Stage::ALL.iter().copied().find(|stage| stage.as_str() == s)
    }

    /// Translation table for free-text stage values found in older sources.
    /// Anything unrecognised becomes `Unknown`.
    pub fn from_legacy(raw: &str) -> Stage {
        if let Some(stage) = Stage::from_canonical(raw.trim()) {
            return stage;
        }
        let key: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        match key.as_str() {
            "public" | "public company" | "publicly traded" | "nasdaq" | "nyse" => Stage::Public,
            "private" | "privately held" | "private company" => Stage::Private,
            "private with sec filings" | "private sec filings" | "sec filer" | "formerly public" => {
                Stage::PrivateWithSecFilings
            }
            "clinical" | "clinical stage" | "clinical stage company" => Stage::ClinicalStage,
            "late stage" | "public late stage" | "late stage clinical" => Stage::LateStage,
            "acquired" | "subsidiary" => Stage::Acquired,
            "platform" | "platform technology" | "tools" | "research tools" => Stage::Platform,
            "preclinical" | "pre clinical" | "discovery" | "research" => Stage::Preclinical,
            "phase 1" | "phase i" | "phase1" | "phase 1 2" | "phase i ii" => Stage::PhaseI,
            "phase 2" | "phase ii" | "phase2" | "phase 2 3" | "phase ii iii" => Stage::PhaseII,
            "phase 3" | "phase iii" | "phase3" => Stage::PhaseIII,
            "commercial" | "commercial stage" | "marketed" | "approved" => Stage::Commercial,
            "diagnostics" | "diagnostic" => Stage::Diagnostics,
            _ => Stage::Unknown,
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Unknown
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One company as known at a point in the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    #[serde(alias = "company_name", alias = "Company Name")]
    pub name: String,
    #[serde(default)]
    pub normalized_name: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub location_confidence: Option<f64>,
    #[serde(default)]
    pub focus_area: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stage: Stage,
    #[serde(default)]
    pub stage_confidence: f64,
    #[serde(default)]
    pub stage_method: String,
    #[serde(default, alias = "source")]
    pub validation_source: ValidationSource,
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default = "default_data_sources", rename = "Data_Sources", alias = "data_sources")]
    pub data_sources: u32,
    /// Known out-of-region company kept on purpose (e.g. an HQ list entry).
    #[serde(default, skip_serializing_if = "is_false")]
    pub geofence_exempt: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn default_data_sources() -> u32 {
    1
}

impl CompanyRecord {
    pub fn new(name: impl Into<String>, source: ValidationSource) -> Self {
        Self {
            name: name.into(),
            normalized_name: String::new(),
            website: None,
            domain: None,
            city: None,
            address: None,
            latitude: None,
            longitude: None,
            place_id: None,
            location_confidence: None,
            focus_area: None,
            description: None,
            stage: Stage::Unknown,
            stage_confidence: 0.0,
            stage_method: String::new(),
            validation_source: source,
            quality_score: 0.0,
            data_sources: 1,
            geofence_exempt: false,
        }
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }

    pub fn has_address(&self) -> bool {
        has_text(&self.address)
    }

    /// Completeness score in 0..=100.
    pub fn compute_quality_score(&self) -> f64 {
        let mut score = 0.0;
        if !self.name.trim().is_empty() {
            score += 10.0;
        }
        if has_text(&self.website) {
            score += 15.0;
        }
        if has_text(&self.city) {
            score += 15.0;
        }
        if has_text(&self.address) {
            score += 20.0;
        }
        if self.coordinates().is_some() {
            score += 20.0;
        }
        if !self.stage.is_unknown() {
            score += 20.0;
        }
        score
    }

    pub fn refresh_quality_score(&mut self) {
        self.quality_score = self.compute_quality_score();
    }
}

/// `Some` and not blank.
pub fn has_text(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

/// Copies `source` into `target` only when `target` is blank. Returns whether
/// anything was written.
pub fn fill_if_empty(target: &mut Option<String>, source: &Option<String>) -> bool {
    if !has_text(target) && has_text(source) {
        *target = source.clone();
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_priority_order() {
        assert!(ValidationSource::Manual < ValidationSource::Bpg);
        assert!(ValidationSource::Bpg < ValidationSource::Wikipedia);
        assert!(ValidationSource::Wikipedia.priority() > ValidationSource::Web.priority());
    }

    #[test]
    fn test_legacy_stage_translation() {
        assert_eq!(Stage::from_legacy("PRECLINICAL"), Stage::Preclinical);
        assert_eq!(Stage::from_legacy("Preclinical"), Stage::Preclinical);
        assert_eq!(Stage::from_legacy("Private with SEC Filings"), Stage::PrivateWithSecFilings);
        assert_eq!(Stage::from_legacy("phase-2"), Stage::PhaseII);
        assert_eq!(Stage::from_legacy("something odd"), Stage::Unknown);
    }

    #[test]
    fn test_stage_serde_uses_canonical_form() {
        let json = serde_json::to_string(&Stage::PrivateWithSecFilings).unwrap();
        assert_eq!(json, "\"Private with SEC Filings\"");
        let back: Stage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Stage::PrivateWithSecFilings);
    }

    #[test]
    fn test_record_deserializes_with_source_alias() {
        let rec: CompanyRecord =
            serde_json::from_str(r#"{"name":"Acme Bio","source":"Wiki","city":"Berkeley"}"#).unwrap();
        assert_eq!(rec.validation_source, ValidationSource::Wikipedia);
        assert_eq!(rec.data_sources, 1);
        assert_eq!(rec.stage, Stage::Unknown);
    }

    #[test]
    fn test_quality_score() {
        let mut rec = CompanyRecord::new("Acme", ValidationSource::Bpg)
            .with_website("https://acme.com")
            .with_city("Berkeley");
        assert_eq!(rec.compute_quality_score(), 40.0);
        rec.latitude = Some(37.87);
        rec.longitude = Some(-122.27);
        rec.stage = Stage::Platform;
        rec.refresh_quality_score();
        assert_eq!(rec.quality_score, 80.0);
    }
}
