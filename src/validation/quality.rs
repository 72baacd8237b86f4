// src/validation/quality.rs - Promotion gate over a candidate dataset
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use crate::matching::geofence::{is_valid_coordinate, Geofence};
use crate::matching::name::normalize_name;
use crate::models::core::{has_text, CompanyRecord, Stage};
use crate::models::matching::LatLng;
use crate::utils::config::ValidationConfig;
use crate::utils::constants::VALIDATION_EXAMPLE_LIMIT;
use crate::utils::io::{read_json, write_json};
use crate::utils::progress_bars::logging::{PipelineLogger, PipelineStage};

pub const CHECK_UNIQUE_NAMES: &str = "unique_names";
pub const CHECK_REQUIRED_FIELDS: &str = "required_fields";
pub const CHECK_COORDINATES: &str = "coordinates";
pub const CHECK_CONFIDENCE_BOUNDS: &str = "confidence_bounds";
pub const CHECK_STAGE_VOCABULARY: &str = "stage_vocabulary";
pub const CHECK_GEOFENCE: &str = "geofence";
pub const CHECK_TOTAL_COMPANIES: &str = "total_companies";
pub const CHECK_ADDRESS_COVERAGE: &str = "address_coverage";
pub const CHECK_CLASSIFICATION_RATE: &str = "classification_rate";
pub const CHECK_GROUND_TRUTH: &str = "ground_truth";

/// Outcome of one invariant over the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: String,
    pub passed: bool,
    pub violations: usize,
    pub detail: String,
    pub examples: Vec<String>,
}

impl CheckResult {
    fn from_violations(check: &str, checked: usize, violations: Vec<String>) -> Self {
        let count = violations.len();
        Self {
            check: check.to_string(),
            passed: count == 0,
            violations: count,
            detail: format!("{} of {} records violate", count, checked),
            examples: violations.into_iter().take(VALIDATION_EXAMPLE_LIMIT).collect(),
        }
    }

    fn threshold(check: &str, passed: bool, detail: String) -> Self {
        Self {
            check: check.to_string(),
            passed,
            violations: usize::from(!passed),
            detail,
            examples: Vec::new(),
        }
    }
}

/// Aggregates compared between a candidate batch and the last accepted one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetrics {
    pub total_companies: usize,
    pub address_coverage: f64,
    pub classification_rate: f64,
}

impl SnapshotMetrics {
    pub fn from_records(records: &[CompanyRecord]) -> Self {
        let total = records.len();
        let ratio = |n: usize| if total == 0 { 0.0 } else { n as f64 / total as f64 };
        Self {
            total_companies: total,
            address_coverage: ratio(records.iter().filter(|r| r.has_address()).count()),
            classification_rate: ratio(records.iter().filter(|r| !r.stage.is_unknown()).count()),
        }
    }
}

/// Reference company -> stage pairs that must come out exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundTruth {
    expected: BTreeMap<String, (String, Stage)>,
}

impl GroundTruth {
    pub fn new(pairs: impl IntoIterator<Item = (String, Stage)>) -> Self {
        let expected = pairs
            .into_iter()
            .map(|(name, stage)| (normalize_name(&name), (name, stage)))
            .collect();
        Self { expected }
    }

    /// A JSON object of company name to canonical stage.
    pub fn from_file(path: &Path) -> Result<Self> {
        let pairs: BTreeMap<String, Stage> =
            read_json(path).with_context(|| format!("Failed to load ground truth from {}", path.display()))?;
        Ok(Self::new(pairs))
    }

    pub fn len(&self) -> usize {
        self.expected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }
}

/// A problem found in a raw row before it could become a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RowIssue {
    pub row: usize,
    pub check: &'static str,
    pub detail: String,
}

/// Candidate records plus any rows that failed to parse.
#[derive(Debug, Clone, Default)]
pub struct CandidateBatch {
    pub records: Vec<CompanyRecord>,
    pub row_issues: Vec<RowIssue>,
}

impl CandidateBatch {
    pub fn from_records(records: Vec<CompanyRecord>) -> Self {
        Self {
            records,
            row_issues: Vec::new(),
        }
    }

    /// Parses raw JSON rows. A row with a missing or unknown stage, or with
    /// coordinates that are not numbers, is reported and kept out of
    /// `records` instead of being coerced to a default.
    pub fn from_rows(rows: Vec<Value>) -> Self {
        let mut batch = Self::default();
        for (row, value) in rows.into_iter().enumerate() {
            let label = value
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("row {}", row));
            let before = batch.row_issues.len();

            match value.get("stage") {
                None | Some(Value::Null) => batch.row_issues.push(RowIssue {
                    row,
                    check: CHECK_REQUIRED_FIELDS,
                    detail: format!("{}: stage is missing", label),
                }),
                Some(Value::String(s)) if Stage::from_canonical(s).is_some() => {}
                Some(other) => batch.row_issues.push(RowIssue {
                    row,
                    check: CHECK_STAGE_VOCABULARY,
                    detail: format!("{}: stage {} is not in the vocabulary", label, other),
                }),
            }
            for field in ["latitude", "longitude"] {
                match value.get(field) {
                    None | Some(Value::Null) | Some(Value::Number(_)) => {}
                    Some(other) => batch.row_issues.push(RowIssue {
                        row,
                        check: CHECK_COORDINATES,
                        detail: format!("{}: {} {} is not a number", label, field, other),
                    }),
                }
            }

            if batch.row_issues.len() > before {
                continue;
            }
            match serde_json::from_value::<CompanyRecord>(value) {
                Ok(record) => batch.records.push(record),
                Err(e) => batch.row_issues.push(RowIssue {
                    row,
                    check: CHECK_REQUIRED_FIELDS,
                    detail: format!("{}: {}", label, e),
                }),
            }
        }
        batch
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let rows: Vec<Value> = read_json(path)?;
        Ok(Self::from_rows(rows))
    }

    fn issues_for(&self, check: &str) -> Vec<String> {
        self.row_issues
            .iter()
            .filter(|issue| issue.check == check)
            .map(|issue| issue.detail.clone())
            .collect()
    }

    fn row_count(&self) -> usize {
        self.records.len() + self.row_issues.iter().map(|i| i.row).collect::<BTreeSet<_>>().len()
    }
}

/// Per-check results for one candidate batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub validated_at: NaiveDateTime,
    pub metrics: SnapshotMetrics,
    pub previous: Option<SnapshotMetrics>,
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn failed_check_names(&self) -> Vec<&str> {
        self.failures().into_iter().map(|c| c.check.as_str()).collect()
    }

    /// Every failing check with its counts and examples.
    pub fn failure_summary(&self) -> String {
        let mut lines = vec![format!(
            "{} of {} checks failed",
            self.failures().len(),
            self.checks.len()
        )];
        for check in self.failures() {
            let mut line = format!("  - {}: {} ({} violations)", check.check, check.detail, check.violations);
            if !check.examples.is_empty() {
                line.push_str(&format!("; e.g. {}", check.examples.join(" | ")));
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(anyhow!("Promotion refused: {}", self.failure_summary()))
        }
    }

    pub fn log(&self) {
        for check in &self.checks {
            if check.passed {
                info!("[VALIDATE] ✅ {}: {}", check.check, check.detail);
            } else {
                error!(
                    "[VALIDATE] ❌ {}: {} ({} violations) {:?}",
                    check.check, check.detail, check.violations, check.examples
                );
            }
        }
    }
}

pub struct QualityValidator {
    config: ValidationConfig,
    geofence: Geofence,
    ground_truth: Option<GroundTruth>,
}

impl QualityValidator {
    /// Location sanity is checked against the whole state.
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            geofence: Geofence::california(),
            ground_truth: None,
        }
    }

    pub fn with_geofence(mut self, geofence: Geofence) -> Self {
        self.geofence = geofence;
        self
    }

    pub fn with_ground_truth(mut self, ground_truth: GroundTruth) -> Self {
        self.ground_truth = Some(ground_truth);
        self
    }

    /// Runs every check; none short-circuits another.
    pub fn validate(&self, batch: &CandidateBatch, previous: Option<&[CompanyRecord]>) -> ValidationReport {
        let logger = PipelineLogger::new(PipelineStage::Validate);
        let records = &batch.records;
        let rows = batch.row_count();
        logger.log_phase("Record checks", Some(&format!("{} rows", rows)));

        let mut checks = vec![
            CheckResult::from_violations(CHECK_UNIQUE_NAMES, rows, duplicate_names(records)),
            CheckResult::from_violations(
                CHECK_REQUIRED_FIELDS,
                rows,
                [batch.issues_for(CHECK_REQUIRED_FIELDS), missing_fields(records)].concat(),
            ),
            CheckResult::from_violations(
                CHECK_COORDINATES,
                rows,
                [batch.issues_for(CHECK_COORDINATES), bad_coordinates(records)].concat(),
            ),
            CheckResult::from_violations(CHECK_CONFIDENCE_BOUNDS, rows, bad_confidences(records)),
            CheckResult::from_violations(CHECK_STAGE_VOCABULARY, rows, batch.issues_for(CHECK_STAGE_VOCABULARY)),
            CheckResult::from_violations(CHECK_GEOFENCE, rows, self.outside_geofence(records)),
        ];

        logger.log_phase("Aggregate checks", None);
        let metrics = SnapshotMetrics::from_records(records);
        let previous_metrics = previous.map(SnapshotMetrics::from_records);
        if let Some(prev) = previous_metrics {
            checks.push(self.total_companies_check(&metrics, &prev));
            checks.push(self.address_coverage_check(&metrics, &prev));
        }
        checks.push(CheckResult::threshold(
            CHECK_CLASSIFICATION_RATE,
            metrics.classification_rate >= self.config.min_classification_rate,
            format!(
                "{:.1}% classified (floor {:.1}%)",
                metrics.classification_rate * 100.0,
                self.config.min_classification_rate * 100.0
            ),
        ));
        if let Some(truth) = &self.ground_truth {
            checks.push(CheckResult::from_violations(
                CHECK_GROUND_TRUTH,
                truth.len(),
                ground_truth_mismatches(truth, records),
            ));
        }

        let report = ValidationReport {
            validated_at: Utc::now().naive_utc(),
            metrics,
            previous: previous_metrics,
            checks,
        };
        report.log();
        logger.log_completion(rows, report.checks.iter().filter(|c| c.passed).count());
        report
    }

    fn total_companies_check(&self, current: &SnapshotMetrics, prev: &SnapshotMetrics) -> CheckResult {
        let drop = relative_drop(prev.total_companies as f64, current.total_companies as f64);
        CheckResult::threshold(
            CHECK_TOTAL_COMPANIES,
            drop <= self.config.max_company_drop,
            format!(
                "{} -> {} companies ({:.1}% drop, limit {:.1}%)",
                prev.total_companies,
                current.total_companies,
                drop * 100.0,
                self.config.max_company_drop * 100.0
            ),
        )
    }

    fn address_coverage_check(&self, current: &SnapshotMetrics, prev: &SnapshotMetrics) -> CheckResult {
        let drop = relative_drop(prev.address_coverage, current.address_coverage);
        CheckResult::threshold(
            CHECK_ADDRESS_COVERAGE,
            drop <= self.config.max_address_coverage_drop,
            format!(
                "{:.2}% -> {:.2}% with address ({:.2}% drop, limit {:.2}%)",
                prev.address_coverage * 100.0,
                current.address_coverage * 100.0,
                drop * 100.0,
                self.config.max_address_coverage_drop * 100.0
            ),
        )
    }

    fn outside_geofence(&self, records: &[CompanyRecord]) -> Vec<String> {
        records
            .iter()
            .filter(|r| !r.geofence_exempt)
            .filter_map(|r| {
                let location = r
                    .coordinates()
                    .filter(|(lat, lng)| is_valid_coordinate(*lat, *lng))
                    .map(|(lat, lng)| LatLng { lat, lng });
                if location.is_none() && !r.has_address() {
                    return None;
                }
                if self.geofence.contains(location, r.address.as_deref()) {
                    None
                } else {
                    Some(format!("{} ({})", r.name, r.address.as_deref().unwrap_or("no address")))
                }
            })
            .collect()
    }
}

/// Fractional decrease from `before` to `after`; growth counts as zero.
fn relative_drop(before: f64, after: f64) -> f64 {
    if before <= 0.0 {
        0.0
    } else {
        ((before - after) / before).max(0.0)
    }
}

fn duplicate_names(records: &[CompanyRecord]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut duplicates = Vec::new();
    for record in records {
        let key = record.name.trim().to_lowercase();
        let count = seen.entry(key).or_insert(0);
        *count += 1;
        if *count > 1 {
            duplicates.push(record.name.clone());
        }
    }
    duplicates
}

fn missing_fields(records: &[CompanyRecord]) -> Vec<String> {
    records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            let mut missing = Vec::new();
            if r.name.trim().is_empty() {
                missing.push("name");
            }
            if !has_text(&r.city) {
                missing.push("city");
            }
            if missing.is_empty() {
                None
            } else {
                let label = if r.name.trim().is_empty() { format!("record {}", i) } else { r.name.clone() };
                Some(format!("{}: missing {}", label, missing.join(", ")))
            }
        })
        .collect()
}

fn bad_coordinates(records: &[CompanyRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| match (r.latitude, r.longitude) {
            (None, None) => None,
            (Some(lat), Some(lng)) if is_valid_coordinate(lat, lng) => None,
            (lat, lng) => Some(format!("{}: ({:?}, {:?})", r.name, lat, lng)),
        })
        .collect()
}

fn bad_confidences(records: &[CompanyRecord]) -> Vec<String> {
    let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
    records
        .iter()
        .filter_map(|r| {
            if !in_unit(r.stage_confidence) {
                Some(format!("{}: stage_confidence {}", r.name, r.stage_confidence))
            } else {
                match r.location_confidence {
                    Some(v) if !in_unit(v) => Some(format!("{}: location_confidence {}", r.name, v)),
                    _ => None,
                }
            }
        })
        .collect()
}

fn ground_truth_mismatches(truth: &GroundTruth, records: &[CompanyRecord]) -> Vec<String> {
    let by_name: HashMap<String, Stage> = records
        .iter()
        .map(|r| (normalize_name(&r.name), r.stage))
        .collect();
    truth
        .expected
        .iter()
        .filter_map(|(key, (name, expected))| match by_name.get(key) {
            Some(actual) if actual == expected => None,
            Some(actual) => Some(format!("{}: expected {}, got {}", name, expected, actual)),
            None => Some(format!("{}: expected {}, company missing", name, expected)),
        })
        .collect()
}

/// Writes `records` to `output` only if `report` passed. Nothing is written
/// otherwise.
pub fn promote(report: &ValidationReport, records: &[CompanyRecord], output: &Path) -> Result<()> {
    if !report.passed() {
        return Err(anyhow!("Promotion refused: {}", report.failure_summary()));
    }
    write_json(output, records)?;
    info!("[VALIDATE] 🛡️ Promoted {} companies to {}", records.len(), output.display());
    Ok(())
}
