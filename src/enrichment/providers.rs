// src/enrichment/providers.rs - Collaborator seams for Places, SEC EDGAR and ClinicalTrials.gov
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

use crate::matching::name::normalize_name;
use crate::models::evidence::{ClinicalTrial, SecFilingSummary};
use crate::models::matching::PlaceResult;
use crate::utils::io::read_json;

/// Ranked place results for a text query.
#[async_trait]
pub trait PlacesProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<PlaceResult>>;
}

/// Filing summary for a company, `None` if EDGAR knows nothing about it.
#[async_trait]
pub trait SecProvider: Send + Sync {
    async fn filing_summary(&self, company_name: &str) -> Result<Option<SecFilingSummary>>;
}

/// Studies sponsored by a company.
#[async_trait]
pub trait TrialsProvider: Send + Sync {
    async fn trials(&self, company_name: &str) -> Result<Vec<ClinicalTrial>>;
}

/// Places responses captured ahead of time, keyed by query text
/// (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct RecordedPlaces {
    by_query: HashMap<String, Vec<PlaceResult>>,
}

impl RecordedPlaces {
    pub fn new(responses: HashMap<String, Vec<PlaceResult>>) -> Self {
        let by_query = responses
            .into_iter()
            .map(|(query, places)| (query.trim().to_lowercase(), places))
            .collect();
        Self { by_query }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(read_json(path)?))
    }
}

#[async_trait]
impl PlacesProvider for RecordedPlaces {
    async fn search(&self, query: &str) -> Result<Vec<PlaceResult>> {
        Ok(self
            .by_query
            .get(&query.trim().to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

/// SEC summaries captured ahead of time, keyed by normalized company name.
#[derive(Debug, Clone, Default)]
pub struct RecordedSec {
    by_company: HashMap<String, SecFilingSummary>,
}

impl RecordedSec {
    pub fn new(summaries: HashMap<String, SecFilingSummary>) -> Self {
        let by_company = summaries
            .into_iter()
            .map(|(name, summary)| (normalize_name(&name), summary))
            .collect();
        Self { by_company }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(read_json(path)?))
    }
}

#[async_trait]
impl SecProvider for RecordedSec {
    async fn filing_summary(&self, company_name: &str) -> Result<Option<SecFilingSummary>> {
        Ok(self.by_company.get(&normalize_name(company_name)).cloned())
    }
}

/// Trial lists captured ahead of time, keyed by normalized sponsor name.
#[derive(Debug, Clone, Default)]
pub struct RecordedTrials {
    by_company: HashMap<String, Vec<ClinicalTrial>>,
}

impl RecordedTrials {
    pub fn new(trials: HashMap<String, Vec<ClinicalTrial>>) -> Self {
        let by_company = trials
            .into_iter()
            .map(|(name, list)| (normalize_name(&name), list))
            .collect();
        Self { by_company }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(read_json(path)?))
    }
}

#[async_trait]
impl TrialsProvider for RecordedTrials {
    async fn trials(&self, company_name: &str) -> Result<Vec<ClinicalTrial>> {
        Ok(self
            .by_company
            .get(&normalize_name(company_name))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::evidence::TrialPhase;

    #[tokio::test]
    async fn test_recorded_places_ignore_query_case() {
        let mut responses = HashMap::new();
        responses.insert(
            "Acme Bio Berkeley CA".to_string(),
            vec![PlaceResult {
                name: "Acme Bio".into(),
                formatted_address: None,
                website: None,
                geometry: None,
                business_status: None,
                place_id: None,
            }],
        );
        let places = RecordedPlaces::new(responses);
        assert_eq!(places.search("acme bio berkeley ca").await.unwrap().len(), 1);
        assert!(places.search("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recorded_sec_and_trials_match_normalized_names() {
        let mut sec = HashMap::new();
        sec.insert(
            "Acme Bio, Inc.".to_string(),
            SecFilingSummary {
                ticker: Some("ACME".into()),
                ..Default::default()
            },
        );
        let sec = RecordedSec::new(sec);
        assert!(sec.filing_summary("ACME BIO").await.unwrap().is_some());
        assert!(sec.filing_summary("Zenith").await.unwrap().is_none());

        let mut trials = HashMap::new();
        trials.insert(
            "Acme Bio".to_string(),
            vec![ClinicalTrial {
                phase: TrialPhase::Phase2,
                trial_status: None,
                start_date: None,
                completion_date: None,
                sponsor_name: Some("Acme Bio".into()),
            }],
        );
        let trials = RecordedTrials::new(trials);
        assert_eq!(trials.trials("Acme Bio Inc").await.unwrap().len(), 1);
    }
}
