// src/models/stats_models.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Counters from one run of the merge engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeStats {
    pub input_records: usize,
    pub dropped_blank_names: usize,
    pub output_records: usize,
    pub groups_merged: usize,
    pub domain_conflicts: usize,
    pub name_collisions: usize,
}

/// Counters from one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentStats {
    pub companies_processed: usize,
    pub companies_skipped_complete: usize,
    pub places_accepted: usize,
    pub places_no_confident_match: usize,
    pub stages_assigned: usize,
    pub stages_kept: usize,
    pub provider_failures: usize,
}

impl EnrichmentStats {
    pub fn absorb(&mut self, other: &EnrichmentStats) {
        self.companies_processed += other.companies_processed;
        self.companies_skipped_complete += other.companies_skipped_complete;
        self.places_accepted += other.places_accepted;
        self.places_no_confident_match += other.places_no_confident_match;
        self.stages_assigned += other.stages_assigned;
        self.stages_kept += other.stages_kept;
        self.provider_failures += other.provider_failures;
    }
}

/// Summary of a whole pipeline run, logged at the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub run_id: String,
    pub run_timestamp: NaiveDateTime,
    pub description: Option<String>,
    pub merge: MergeStats,
    pub enrichment: EnrichmentStats,
    pub merge_time: f64,
    pub enrichment_time: f64,
    pub classification_time: f64,
    pub validation_time: f64,
    pub total_processing_time: f64,
}

impl PipelineStats {
    pub fn new(run_id: &str, run_timestamp: NaiveDateTime, description: Option<&str>) -> Self {
        Self {
            run_id: run_id.to_string(),
            run_timestamp,
            description: description.map(|s| s.to_string()),
            merge: MergeStats::default(),
            enrichment: EnrichmentStats::default(),
            merge_time: 0.0,
            enrichment_time: 0.0,
            classification_time: 0.0,
            validation_time: 0.0,
            total_processing_time: 0.0,
        }
    }
}
