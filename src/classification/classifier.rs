// src/classification/classifier.rs - Waterfall driver, result cache and classification history
use chrono::NaiveDateTime;
use log::{debug, info};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use uuid::Uuid;

use crate::classification::known_companies::KnownCompanyTable;
use crate::classification::rules::{default_rules, precedence_for_method, StageResult, StageRule, PRECEDENCE_DEFAULT};
use crate::matching::name::normalize_name;
use crate::models::core::{CompanyRecord, Stage};
use crate::models::evidence::StageEvidence;

const DEFAULT_CACHE_SIZE: usize = 5000;

/// Stored precedence for a stage whose method this classifier does not
/// recognise. Such stages are treated as curated and never overwritten.
const UNRECOGNISED_METHOD_PRECEDENCE: u8 = 0;

/// Evidence-hash keyed LRU of classifier results, owned by one classifier.
pub struct StageResultCache {
    cache: LruCache<String, StageResult>,
    pub hits: usize,
    pub misses: usize,
}

impl StageResultCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Capacity from `STAGE_CACHE_SIZE`, falling back to the default.
    pub fn from_env() -> Self {
        let cache_size = std::env::var("STAGE_CACHE_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_CACHE_SIZE);
        info!("Initializing StageResultCache with cache size: {}", cache_size);
        Self::new(cache_size)
    }

    /// Stable key for a piece of evidence. `None` if it cannot be serialized.
    pub fn key_for(evidence: &StageEvidence) -> Option<String> {
        let json = serde_json::to_vec(evidence).ok()?;
        Some(hex::encode(Sha256::digest(&json)))
    }

    pub fn get(&mut self, key: &str) -> Option<StageResult> {
        match self.cache.get(key) {
            Some(result) => {
                self.hits += 1;
                Some(result.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, key: String, result: StageResult) {
        self.cache.put(key, result);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

/// One classification ever applied to a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub id: Uuid,
    pub stage: Stage,
    pub confidence: f64,
    pub method: String,
    pub precedence: u8,
    pub classified_at: NaiveDateTime,
    pub superseded: bool,
}

/// Per-company audit trail keyed by normalized name. Older entries are
/// marked superseded, never removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationHistory {
    entries: BTreeMap<String, Vec<ClassificationRecord>>,
}

impl ClassificationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, company_key: &str) -> Option<&ClassificationRecord> {
        self.entries
            .get(company_key)
            .and_then(|records| records.iter().rev().find(|r| !r.superseded))
    }

    pub fn history(&self, company_key: &str) -> &[ClassificationRecord] {
        self.entries.get(company_key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Appends `result` as the current classification, superseding the old one.
    pub fn record(&mut self, company_key: &str, result: &StageResult, classified_at: NaiveDateTime) -> Uuid {
        let records = self.entries.entry(company_key.to_string()).or_default();
        for previous in records.iter_mut().filter(|r| !r.superseded) {
            previous.superseded = true;
        }
        let id = Uuid::new_v4();
        records.push(ClassificationRecord {
            id,
            stage: result.stage,
            confidence: result.confidence,
            method: result.method.clone(),
            precedence: result.precedence,
            classified_at,
            superseded: false,
        });
        id
    }

    /// Re-applies an entry written by an earlier run that never reached
    /// `record`'s caller. No-op if the entry id is already present.
    pub fn replay(&mut self, company_key: &str, entry: &ClassificationRecord) -> bool {
        let records = self.entries.entry(company_key.to_string()).or_default();
        if records.iter().any(|r| r.id == entry.id) {
            return false;
        }
        for previous in records.iter_mut().filter(|r| !r.superseded) {
            previous.superseded = true;
        }
        records.push(ClassificationRecord {
            superseded: false,
            ..entry.clone()
        });
        true
    }

    pub fn company_count(&self) -> usize {
        self.entries.len()
    }
}

/// What happened to a record's stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ReclassOutcome {
    /// First classification or an `Unknown` stage filled in.
    Assigned(StageResult),
    /// A weaker classification replaced by stronger evidence.
    Replaced { previous: Stage, result: StageResult },
    /// The current stage stands.
    Kept { current: Stage, candidate: StageResult },
}

impl ReclassOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, ReclassOutcome::Kept { .. })
    }
}

/// Whether a new classification of `new_precedence` may replace the current
/// one. `Unknown` or absent stages are always open.
pub fn may_replace(current: Option<(Stage, u8)>, new_precedence: u8) -> bool {
    match current {
        None => true,
        Some((stage, _)) if stage.is_unknown() => true,
        Some((_, precedence)) => new_precedence < precedence,
    }
}

/// History key for a record: its normalized name.
pub fn company_key(record: &CompanyRecord) -> String {
    if record.normalized_name.is_empty() {
        normalize_name(&record.name)
    } else {
        record.normalized_name.clone()
    }
}

/// The record's current stage and the precedence it was assigned at. The
/// record's own `stage_method` and the current history entry are both
/// consulted and the stronger one wins, so a history that lags the record
/// never lowers its protection. `None` for a record that was never
/// classified.
pub fn current_standing(record: &CompanyRecord, history: &ClassificationHistory) -> Option<(Stage, u8)> {
    let from_record = if record.stage.is_unknown() && record.stage_method.trim().is_empty() {
        None
    } else {
        Some((
            record.stage,
            precedence_for_method(&record.stage_method).unwrap_or(UNRECOGNISED_METHOD_PRECEDENCE),
        ))
    };
    let from_history = history
        .current(&company_key(record))
        .map(|existing| (existing.stage, existing.precedence));

    match (from_record, from_history) {
        (Some(rec), Some(hist)) if hist.1 < rec.1 && !hist.0.is_unknown() => Some(hist),
        (Some(rec), _) => Some(rec),
        (None, hist) => hist,
    }
}

pub struct StageClassifier {
    rules: Vec<Box<dyn StageRule>>,
    cache: StageResultCache,
}

impl StageClassifier {
    pub fn new(known: KnownCompanyTable, cache: StageResultCache) -> Self {
        Self::with_rules(default_rules(known), cache)
    }

    /// Rules run strongest first; equal precedence keeps the given order.
    pub fn with_rules(mut rules: Vec<Box<dyn StageRule>>, cache: StageResultCache) -> Self {
        rules.sort_by_key(|r| r.precedence());
        Self { rules, cache }
    }

    /// First rule that fires wins. Falls back to `Unknown` at 0.0 if no rule
    /// fires.
    pub fn classify(&mut self, evidence: &StageEvidence) -> StageResult {
        let key = StageResultCache::key_for(evidence);
        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(key) {
                return hit;
            }
        }

        let result = self
            .rules
            .iter()
            .find_map(|rule| {
                let result = rule.evaluate(evidence);
                if let Some(r) = &result {
                    debug!(
                        "[STAGE] '{}' -> {} ({:.2}) via rule {}",
                        evidence.company_name,
                        r.stage,
                        r.confidence,
                        rule.name()
                    );
                }
                result
            })
            .unwrap_or_else(|| StageResult::new(Stage::Unknown, 0.0, "default_unknown", PRECEDENCE_DEFAULT));

        if let Some(key) = key {
            self.cache.put(key, result.clone());
        }
        result
    }

    /// Classifies `record` and applies the result if the re-classification
    /// rule allows it, recording the change in `history`.
    pub fn classify_record(
        &mut self,
        record: &mut CompanyRecord,
        evidence: &StageEvidence,
        history: &mut ClassificationHistory,
        classified_at: NaiveDateTime,
    ) -> ReclassOutcome {
        let candidate = self.classify(evidence);
        let key = company_key(record);
        let current = current_standing(record, history);

        let unknown_over_unknown = candidate.stage.is_unknown() && current.map_or(false, |(s, _)| s.is_unknown());
        if unknown_over_unknown || !may_replace(current, candidate.precedence) {
            return ReclassOutcome::Kept {
                current: record.stage,
                candidate,
            };
        }

        let previous = record.stage;
        record.stage = candidate.stage;
        record.stage_confidence = candidate.confidence;
        record.stage_method = candidate.method.clone();
        record.refresh_quality_score();
        history.record(&key, &candidate, classified_at);

        match current {
            Some((stage, _)) if !stage.is_unknown() => ReclassOutcome::Replaced {
                previous,
                result: candidate,
            },
            _ => ReclassOutcome::Assigned(candidate),
        }
    }

    pub fn cache_stats(&self) -> (usize, usize) {
        (self.cache.hits, self.cache.misses)
    }
}
