// src/enrichment/worker.rs - Sharded, rate-limited, checkpointed enrichment pass
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::classification::classifier::{
    company_key, current_standing, may_replace, ClassificationHistory, ClassificationRecord, ReclassOutcome,
    StageClassifier,
};
use crate::classification::rules::{PRECEDENCE_SEC, PRECEDENCE_TRIALS};
use crate::enrichment::apply::apply_place_match;
use crate::enrichment::providers::{PlacesProvider, SecProvider, TrialsProvider};
use crate::matching::name::normalize_name;
use crate::matching::places::{build_search_queries, CandidateScorer};
use crate::matching::tag_record;
use crate::models::core::{fill_if_empty, CompanyRecord};
use crate::models::evidence::StageEvidence;
use crate::models::matching::MatchDecision;
use crate::models::stats_models::EnrichmentStats;
use crate::utils::checkpoint::{record_signature, ShardCheckpoint};
use crate::utils::config::WorkerConfig;
use crate::utils::progress_bars::logging::{PipelineLogger, PipelineStage};
use crate::utils::progress_bars::progress_config::add_bar;
use crate::utils::rate_limit::{retry_with_backoff, RateLimiter};

/// What one pass did to one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassOutcome {
    Enriched { place_accepted: bool, stage_changed: bool },
    /// Already completed by an earlier, interrupted run of this pass.
    SkippedComplete,
    /// A provider kept failing after retries. The record is returned as it
    /// came in and will be retried by the next pass.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEntry {
    pub index: usize,
    pub record: CompanyRecord,
    pub outcome: PassOutcome,
    /// History entry this pass wrote for the record, replayed on resume.
    #[serde(default)]
    pub classification: Option<ClassificationRecord>,
}

/// The three collaborators a pass talks to.
#[derive(Clone)]
pub struct Providers {
    pub places: Arc<dyn PlacesProvider>,
    pub sec: Arc<dyn SecProvider>,
    pub trials: Arc<dyn TrialsProvider>,
}

/// Classifier and its audit trail, shared by every shard of a pass.
pub struct ClassifierState {
    pub classifier: StageClassifier,
    pub history: ClassificationHistory,
}

struct ShardLimiters {
    places: RateLimiter,
    sec: RateLimiter,
    trials: RateLimiter,
}

impl ShardLimiters {
    fn new(min_delay: Duration) -> Self {
        Self {
            places: RateLimiter::new("places", min_delay),
            sec: RateLimiter::new("sec", min_delay),
            trials: RateLimiter::new("trials", min_delay),
        }
    }
}

struct ShardOutput {
    entries: Vec<EnrichedEntry>,
    stats: EnrichmentStats,
}

/// Contiguous index ranges covering `0..total`, at most `workers` of them.
pub fn shard_ranges(total: usize, workers: usize) -> Vec<Range<usize>> {
    if total == 0 {
        return Vec::new();
    }
    let chunk = (total + workers.max(1) - 1) / workers.max(1);
    (0..total)
        .step_by(chunk)
        .map(|start| start..(start + chunk).min(total))
        .collect()
}

#[derive(Clone)]
pub struct EnrichmentWorker {
    config: WorkerConfig,
    providers: Providers,
    scorer: Arc<CandidateScorer>,
    state: Arc<Mutex<ClassifierState>>,
    evidence: Arc<HashMap<String, StageEvidence>>,
}

impl EnrichmentWorker {
    pub fn new(
        config: WorkerConfig,
        providers: Providers,
        scorer: CandidateScorer,
        classifier: StageClassifier,
        history: ClassificationHistory,
    ) -> Self {
        Self {
            config,
            providers,
            scorer: Arc::new(scorer),
            state: Arc::new(Mutex::new(ClassifierState { classifier, history })),
            evidence: Arc::new(HashMap::new()),
        }
    }

    /// Pre-fetched evidence keyed by normalized company name, merged with
    /// whatever the providers return.
    pub fn with_evidence(mut self, evidence: HashMap<String, StageEvidence>) -> Self {
        self.evidence = Arc::new(evidence);
        self
    }

    pub async fn history(&self) -> ClassificationHistory {
        self.state.lock().await.history.clone()
    }

    pub async fn cache_stats(&self) -> (usize, usize) {
        self.state.lock().await.classifier.cache_stats()
    }

    /// Runs one enrichment pass over `records`. Entries come back in input
    /// order, one per record, whatever happened to it.
    pub async fn run_pass(
        &self,
        records: Vec<CompanyRecord>,
        classified_at: NaiveDateTime,
        multi_progress: Option<&MultiProgress>,
    ) -> Result<(Vec<EnrichedEntry>, EnrichmentStats)> {
        let logger = PipelineLogger::new(PipelineStage::Worker);
        let total = records.len();
        let ranges = shard_ranges(total, self.config.worker_count);
        logger.log_phase(
            "Sharding",
            Some(&format!("{} companies across {} shards", total, ranges.len())),
        );

        let records = Arc::new(records);
        let mut tasks: Vec<JoinHandle<Result<ShardOutput>>> = Vec::with_capacity(ranges.len());
        for (shard_id, range) in ranges.into_iter().enumerate() {
            let worker = self.clone();
            let records = Arc::clone(&records);
            let pb = add_bar(multi_progress, range.len() as u64, &format!("Shard {}", shard_id));
            tasks.push(tokio::spawn(async move {
                worker.run_shard(shard_id, range, &records, classified_at, pb).await
            }));
        }

        let mut entries = Vec::with_capacity(total);
        let mut stats = EnrichmentStats::default();
        let mut failed_shards = 0;
        for (shard_id, joined) in join_all(tasks).await.into_iter().enumerate() {
            match joined {
                Ok(Ok(output)) => {
                    stats.absorb(&output.stats);
                    entries.extend(output.entries);
                }
                Ok(Err(e)) => {
                    failed_shards += 1;
                    error!("❌ Shard {} returned an error: {:?}", shard_id, e);
                }
                Err(e) => {
                    failed_shards += 1;
                    error!("💥 Shard {} panicked or failed to join: {:?}", shard_id, e);
                }
            }
        }
        if failed_shards > 0 {
            return Err(anyhow!(
                "{} shard(s) did not finish; completed companies are checkpointed, rerun to resume",
                failed_shards
            ));
        }

        PipelineLogger::new(PipelineStage::Places).log_phase(
            "Matching",
            Some(&format!(
                "{} accepted, {} without a confident match",
                stats.places_accepted, stats.places_no_confident_match
            )),
        );
        logger.log_failures(stats.provider_failures);
        logger.log_completion(total, entries.len());
        Ok((entries, stats))
    }

    async fn run_shard(
        &self,
        shard_id: usize,
        range: Range<usize>,
        records: &[CompanyRecord],
        classified_at: NaiveDateTime,
        pb: Option<ProgressBar>,
    ) -> Result<ShardOutput> {
        let dir = self.config.checkpoint_dir.clone();
        let mut checkpoint: ShardCheckpoint<EnrichedEntry> = ShardCheckpoint::load_or_new(&dir, shard_id, range.clone())
            .with_context(|| format!("Failed to open checkpoint for shard {}", shard_id))?;
        let limiters = ShardLimiters::new(Duration::from_millis(self.config.provider_min_delay_ms));
        let mut stats = EnrichmentStats::default();
        let mut entries = Vec::with_capacity(range.len());
        let start = Instant::now();

        for index in range.clone() {
            let input = &records[index];
            let signature = record_signature(input)?;

            if let Some(done) = checkpoint.completed_value(index, &signature) {
                debug!("Shard {} skipping completed index {}", shard_id, index);
                stats.companies_skipped_complete += 1;
                if let Some(entry) = &done.classification {
                    let mut state = self.state.lock().await;
                    if state.history.replay(&company_key(&done.record), entry) {
                        debug!("Shard {} replayed history entry {} for '{}'", shard_id, entry.id, done.record.name);
                    }
                }
                entries.push(EnrichedEntry {
                    index,
                    record: done.record.clone(),
                    outcome: PassOutcome::SkippedComplete,
                    classification: done.classification.clone(),
                });
                if let Some(pb) = &pb {
                    pb.inc(1);
                }
                continue;
            }

            let entry = match self.enrich_one(index, input, &limiters, classified_at, &mut stats).await {
                Ok(entry) => {
                    checkpoint.mark_complete(index, signature, entry.clone());
                    checkpoint.save(&dir)?;
                    entry
                }
                Err(e) => {
                    stats.provider_failures += 1;
                    warn!("Company '{}' failed for this pass: {:#}", input.name, e);
                    EnrichedEntry {
                        index,
                        record: input.clone(),
                        outcome: PassOutcome::Failed { reason: format!("{:#}", e) },
                        classification: None,
                    }
                }
            };
            stats.companies_processed += 1;
            entries.push(entry);
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }

        if let Some(pb) = &pb {
            pb.finish_with_message(format!("Shard {} done", shard_id));
        }
        info!(
            "Shard {} finished {}..{} in {:.2}s ({} processed, {} resumed, {} failed)",
            shard_id,
            range.start,
            range.end,
            start.elapsed().as_secs_f64(),
            stats.companies_processed,
            stats.companies_skipped_complete,
            stats.provider_failures
        );
        Ok(ShardOutput { entries, stats })
    }

    async fn enrich_one(
        &self,
        index: usize,
        input: &CompanyRecord,
        limiters: &ShardLimiters,
        classified_at: NaiveDateTime,
        stats: &mut EnrichmentStats,
    ) -> Result<EnrichedEntry> {
        let mut record = input.clone();
        tag_record(&mut record);

        let place_accepted = self.places_pass(&mut record, limiters, stats).await?;

        let mut evidence = self
            .evidence
            .get(&normalize_name(&record.name))
            .cloned()
            .unwrap_or_else(|| StageEvidence::for_name(record.name.clone()));
        fill_if_empty(&mut evidence.focus_area, &record.focus_area);
        fill_if_empty(&mut evidence.description, &record.description);

        // A known-company entry outranks anything SEC or trials could return.
        let (standing, settled) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let standing = current_standing(&record, &state.history);
            let settled = state.classifier.classify(&evidence).precedence < PRECEDENCE_SEC;
            (standing, settled)
        };
        if settled {
            debug!("[STAGE] '{}' settled before provider lookups", record.name);
        }

        if !settled && may_replace(standing, PRECEDENCE_SEC) && evidence.sec.is_none() {
            let sec = self.providers.sec.as_ref();
            let name = record.name.as_str();
            evidence.sec = retry_with_backoff(
                name,
                &limiters.sec,
                self.config.max_retries,
                self.config.backoff_base_ms,
                move || sec.filing_summary(name),
            )
            .await
            .context("SEC lookup failed")?;
        }
        let sec_decisive = evidence
            .sec
            .as_ref()
            .map_or(false, |s| s.has_ticker() || s.filing_count > 0);
        if !settled && may_replace(standing, PRECEDENCE_TRIALS) && !sec_decisive && evidence.trials.is_empty() {
            let trials = self.providers.trials.as_ref();
            let name = record.name.as_str();
            evidence.trials = retry_with_backoff(
                name,
                &limiters.trials,
                self.config.max_retries,
                self.config.backoff_base_ms,
                move || trials.trials(name),
            )
            .await
            .context("ClinicalTrials lookup failed")?;
        }

        let (outcome, classification) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let outcome = state
                .classifier
                .classify_record(&mut record, &evidence, &mut state.history, classified_at);
            let classification = if outcome.changed() {
                state.history.current(&company_key(&record)).cloned()
            } else {
                None
            };
            (outcome, classification)
        };
        let stage_changed = outcome.changed();
        match &outcome {
            ReclassOutcome::Kept { .. } => stats.stages_kept += 1,
            ReclassOutcome::Assigned(_) | ReclassOutcome::Replaced { .. } => stats.stages_assigned += 1,
        }

        Ok(EnrichedEntry {
            index,
            record,
            outcome: PassOutcome::Enriched {
                place_accepted,
                stage_changed,
            },
            classification,
        })
    }

    /// Tries each search query in turn until one yields an accepted
    /// candidate. Records that already carry a place id and coordinates are
    /// left alone.
    async fn places_pass(
        &self,
        record: &mut CompanyRecord,
        limiters: &ShardLimiters,
        stats: &mut EnrichmentStats,
    ) -> Result<bool> {
        if record.place_id.is_some() && record.coordinates().is_some() {
            return Ok(false);
        }

        let mut best_rejected: Option<f64> = None;
        for query in build_search_queries(record) {
            let places = self.providers.places.as_ref();
            let q = query.as_str();
            let results = retry_with_backoff(
                q,
                &limiters.places,
                self.config.max_retries,
                self.config.backoff_base_ms,
                move || places.search(q),
            )
            .await
            .with_context(|| format!("Places search '{}' failed", query))?;

            match self.scorer.select_best(record, &results) {
                MatchDecision::Accepted(candidate) => {
                    apply_place_match(record, &candidate);
                    stats.places_accepted += 1;
                    return Ok(true);
                }
                MatchDecision::NoConfidentMatch { best_score, .. } => {
                    if let Some(score) = best_score {
                        best_rejected = Some(best_rejected.map_or(score, |b: f64| b.max(score)));
                    }
                }
            }
        }

        stats.places_no_confident_match += 1;
        debug!(
            "[PLACES] No confident match for '{}' (best {:?})",
            record.name, best_rejected
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::classifier::StageResultCache;
    use crate::classification::known_companies::KnownCompanyTable;
    use crate::classification::rules::{StageResult, PRECEDENCE_TEXT};
    use crate::enrichment::providers::{RecordedPlaces, RecordedSec, RecordedTrials};
    use crate::matching::geofence::{Geofence, GeofencePolicy};
    use crate::matching::places::ACCEPT_THRESHOLD;
    use crate::models::core::{Stage, ValidationSource};
    use crate::models::evidence::{ClinicalTrial, SecFilingSummary, TrialPhase};
    use crate::models::matching::{Geometry, LatLng, PlaceResult};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .unwrap()
    }

    fn test_config(dir: &std::path::Path, workers: usize) -> WorkerConfig {
        WorkerConfig {
            worker_count: workers,
            provider_min_delay_ms: 0,
            max_retries: 1,
            backoff_base_ms: 1,
            checkpoint_dir: dir.to_path_buf(),
        }
    }

    fn place(name: &str, website: &str) -> PlaceResult {
        PlaceResult {
            name: name.into(),
            formatted_address: Some("1 Main St, Berkeley, CA 94710, USA".into()),
            website: Some(website.into()),
            geometry: Some(Geometry { location: LatLng { lat: 37.87, lng: -122.27 } }),
            business_status: Some("OPERATIONAL".into()),
            place_id: Some(format!("pid-{}", name)),
        }
    }

    fn classifier() -> StageClassifier {
        StageClassifier::new(KnownCompanyTable::new(), StageResultCache::new(16))
    }

    fn scorer() -> CandidateScorer {
        CandidateScorer::new(Geofence::bay_area(), GeofencePolicy::Neutral, ACCEPT_THRESHOLD)
    }

    fn providers(places: RecordedPlaces) -> Providers {
        let mut sec = HashMap::new();
        sec.insert(
            "Acme Bio".to_string(),
            SecFilingSummary {
                ticker: Some("ACME".into()),
                company_status: Some("active".into()),
                filing_count: 12,
                ..Default::default()
            },
        );
        let mut trials = HashMap::new();
        trials.insert(
            "Zenith Therapeutics".to_string(),
            vec![ClinicalTrial {
                phase: TrialPhase::Phase1,
                trial_status: Some("RECRUITING".into()),
                start_date: None,
                completion_date: None,
                sponsor_name: Some("Zenith Therapeutics".into()),
            }],
        );
        Providers {
            places: Arc::new(places),
            sec: Arc::new(RecordedSec::new(sec)),
            trials: Arc::new(RecordedTrials::new(trials)),
        }
    }

    fn inputs() -> Vec<CompanyRecord> {
        vec![
            CompanyRecord::new("Acme Bio", ValidationSource::Bpg)
                .with_website("https://acme.com")
                .with_city("Berkeley"),
            CompanyRecord::new("Zenith Therapeutics", ValidationSource::Wikipedia),
            CompanyRecord::new("Quiet Labs", ValidationSource::Web),
        ]
    }

    fn recorded_places() -> RecordedPlaces {
        let mut responses = HashMap::new();
        responses.insert(
            "Acme Bio Berkeley CA".to_string(),
            vec![place("Acme Bio", "https://acme.com")],
        );
        RecordedPlaces::new(responses)
    }

    #[test]
    fn test_shard_ranges_cover_input() {
        assert!(shard_ranges(0, 4).is_empty());
        assert_eq!(shard_ranges(10, 3), vec![0..4, 4..8, 8..10]);
        assert_eq!(shard_ranges(2, 8), vec![0..1, 1..2]);
        assert_eq!(shard_ranges(5, 0), vec![0..5]);
    }

    #[tokio::test]
    async fn test_pass_enriches_and_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let worker = EnrichmentWorker::new(
            test_config(dir.path(), 2),
            providers(recorded_places()),
            scorer(),
            classifier(),
            ClassificationHistory::new(),
        );

        let (entries, stats) = worker.run_pass(inputs(), at(), None).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.record.name.as_str()).collect();
        assert_eq!(names, vec!["Acme Bio", "Zenith Therapeutics", "Quiet Labs"]);
        assert_eq!(entries.iter().map(|e| e.index).collect::<Vec<_>>(), vec![0, 1, 2]);

        let acme = &entries[0];
        assert_eq!(
            acme.outcome,
            PassOutcome::Enriched { place_accepted: true, stage_changed: true }
        );
        assert_eq!(acme.record.stage, Stage::Public);
        assert_eq!(acme.record.place_id.as_deref(), Some("pid-Acme Bio"));
        assert_eq!(entries[1].record.stage, Stage::ClinicalStage);

        assert_eq!(stats.companies_processed, 3);
        assert_eq!(stats.places_accepted, 1);
        assert_eq!(stats.places_no_confident_match, 2);
        assert_eq!(stats.provider_failures, 0);
        assert_eq!(entries[2].record.stage, Stage::Unknown);
        assert_eq!(entries[2].record.stage_method, "default_unknown");
        assert_eq!(worker.history().await.company_count(), 3);
    }

    #[tokio::test]
    async fn test_resume_skips_completed_indices() {
        let dir = tempfile::tempdir().unwrap();
        let make = || {
            EnrichmentWorker::new(
                test_config(dir.path(), 1),
                providers(recorded_places()),
                scorer(),
                classifier(),
                ClassificationHistory::new(),
            )
        };

        let (first, _) = make().run_pass(inputs(), at(), None).await.unwrap();
        let (second, stats) = make().run_pass(inputs(), at(), None).await.unwrap();

        assert_eq!(second.len(), 3);
        assert!(second.iter().all(|e| e.outcome == PassOutcome::SkippedComplete));
        assert_eq!(stats.companies_skipped_complete, 3);
        assert_eq!(stats.companies_processed, 0);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.record, b.record);
        }
    }

    struct FlakyPlaces {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PlacesProvider for FlakyPlaces {
        async fn search(&self, query: &str) -> Result<Vec<PlaceResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query.starts_with("Zenith") {
                Err(anyhow!("connection reset"))
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[tokio::test]
    async fn test_provider_failure_is_isolated_and_not_checkpointed() {
        let dir = tempfile::tempdir().unwrap();
        let flaky = Arc::new(FlakyPlaces { calls: AtomicUsize::new(0) });
        let places: Arc<dyn PlacesProvider> = flaky.clone();
        let mut set = providers(RecordedPlaces::default());
        set.places = places;
        let worker = EnrichmentWorker::new(
            test_config(dir.path(), 1),
            set,
            scorer(),
            classifier(),
            ClassificationHistory::new(),
        );

        let input = inputs();
        let (entries, stats) = worker.run_pass(input.clone(), at(), None).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[1].outcome, PassOutcome::Failed { .. }));
        assert_eq!(entries[1].record, input[1]);
        assert!(matches!(entries[2].outcome, PassOutcome::Enriched { .. }));
        assert_eq!(stats.provider_failures, 1);
        // first query plus one retry
        assert!(flaky.calls.load(Ordering::SeqCst) >= 2);

        let checkpoint: ShardCheckpoint<EnrichedEntry> =
            ShardCheckpoint::load_or_new(dir.path(), 0, 0..3).unwrap();
        assert_eq!(checkpoint.completed_count(), 2);
        let zenith_sig = record_signature(&input[1]).unwrap();
        assert!(!checkpoint.is_complete(1, &zenith_sig));
    }

    fn stale_text_history() -> ClassificationHistory {
        let mut history = ClassificationHistory::new();
        history.record(
            "acme bio",
            &StageResult::new(Stage::Platform, 0.6, "text_platform_keywords", PRECEDENCE_TEXT),
            at(),
        );
        history
    }

    fn platform_acme() -> CompanyRecord {
        let mut rec = CompanyRecord::new("Acme Bio", ValidationSource::Bpg);
        rec.stage = Stage::Platform;
        rec.stage_confidence = 0.6;
        rec.stage_method = "text_platform_keywords".into();
        rec
    }

    #[tokio::test]
    async fn test_resume_replays_history_and_keeps_sec_stage() {
        let dir = tempfile::tempdir().unwrap();
        let make = |history: ClassificationHistory| {
            EnrichmentWorker::new(
                test_config(dir.path(), 1),
                providers(RecordedPlaces::default()),
                scorer(),
                classifier(),
                history,
            )
        };

        // first run finishes the record but its history is never saved
        let (first, _) = make(stale_text_history()).run_pass(vec![platform_acme()], at(), None).await.unwrap();
        assert_eq!(first[0].record.stage, Stage::Public);
        assert!(first[0].classification.is_some());

        let resumed = make(stale_text_history());
        let (second, _) = resumed.run_pass(vec![platform_acme()], at(), None).await.unwrap();
        assert_eq!(second[0].outcome, PassOutcome::SkippedComplete);
        let history = resumed.history().await;
        let current = history.current("acme bio").unwrap();
        assert_eq!(current.stage, Stage::Public);
        assert_eq!(current.method, "sec_active_ticker");
        assert_eq!(history.history("acme bio").len(), 2);

        // a later pass with no SEC data and early-phase trials keeps Public
        let next_dir = tempfile::tempdir().unwrap();
        let mut trials = HashMap::new();
        trials.insert(
            "Acme Bio".to_string(),
            vec![ClinicalTrial {
                phase: TrialPhase::Phase1,
                trial_status: Some("RECRUITING".into()),
                start_date: None,
                completion_date: None,
                sponsor_name: Some("Acme Bio".into()),
            }],
        );
        let later = EnrichmentWorker::new(
            test_config(next_dir.path(), 1),
            Providers {
                places: Arc::new(RecordedPlaces::default()),
                sec: Arc::new(RecordedSec::default()),
                trials: Arc::new(RecordedTrials::new(trials)),
            },
            scorer(),
            classifier(),
            stale_text_history(),
        );
        let (third, _) = later
            .run_pass(vec![second[0].record.clone()], at(), None)
            .await
            .unwrap();
        assert_eq!(third[0].record.stage, Stage::Public);
        assert_eq!(third[0].record.stage_method, "sec_active_ticker");
        assert_eq!(
            third[0].outcome,
            PassOutcome::Enriched { place_accepted: false, stage_changed: false }
        );
    }

    struct CountingSec {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SecProvider for CountingSec {
        async fn filing_summary(&self, _company_name: &str) -> Result<Option<SecFilingSummary>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    struct CountingTrials {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TrialsProvider for CountingTrials {
        async fn trials(&self, _company_name: &str) -> Result<Vec<ClinicalTrial>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_known_company_skips_provider_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let sec = Arc::new(CountingSec { calls: AtomicUsize::new(0) });
        let trials = Arc::new(CountingTrials { calls: AtomicUsize::new(0) });
        let sec_dyn: Arc<dyn SecProvider> = sec.clone();
        let trials_dyn: Arc<dyn TrialsProvider> = trials.clone();
        let worker = EnrichmentWorker::new(
            test_config(dir.path(), 1),
            Providers {
                places: Arc::new(RecordedPlaces::default()),
                sec: sec_dyn,
                trials: trials_dyn,
            },
            scorer(),
            StageClassifier::new(KnownCompanyTable::with_defaults(), StageResultCache::new(16)),
            ClassificationHistory::new(),
        );

        let input = vec![
            CompanyRecord::new("Genentech, Inc.", ValidationSource::Bpg),
            CompanyRecord::new("Quiet Labs", ValidationSource::Web),
        ];
        let (entries, _) = worker.run_pass(input, at(), None).await.unwrap();
        assert_eq!(entries[0].record.stage, Stage::Acquired);
        assert_eq!(entries[0].record.stage_method, "known_company");
        // only the unknown company reached the providers
        assert_eq!(sec.calls.load(Ordering::SeqCst), 1);
        assert_eq!(trials.calls.load(Ordering::SeqCst), 1);
    }
}
