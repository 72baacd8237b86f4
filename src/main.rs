use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use directory_lib::classification::classifier::{ClassificationHistory, StageClassifier, StageResultCache};
use directory_lib::classification::known_companies::KnownCompanyTable;
use directory_lib::clustering::merge::merge_records;
use directory_lib::enrichment::providers::{RecordedPlaces, RecordedSec, RecordedTrials};
use directory_lib::enrichment::worker::{EnrichmentWorker, Providers};
use directory_lib::matching::address::MultiTenantRegistry;
use directory_lib::matching::name::normalize_name;
use directory_lib::matching::places::CandidateScorer;
use directory_lib::matching::tag_record;
use directory_lib::models::core::{fill_if_empty, CompanyRecord};
use directory_lib::models::evidence::StageEvidence;
use directory_lib::models::stats_models::PipelineStats;
use directory_lib::utils::config::{MatchConfig, ValidationConfig, WorkerConfig};
use directory_lib::utils::env::load_env;
use directory_lib::utils::get_memory_usage;
use directory_lib::utils::io::{read_evidence, read_json, read_records, read_records_from_all, write_json};
use directory_lib::utils::progress_bars::logging::{PipelineLogger, PipelineStage};
use directory_lib::utils::progress_bars::progress_config::ProgressConfig;
use directory_lib::validation::quality::{promote, CandidateBatch, GroundTruth, QualityValidator, ValidationReport};
use log::info;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deduplicate and merge raw source rows into canonical companies
    Merge {
        #[arg(long, num_args = 1.., required = true)]
        input: Vec<PathBuf>,
        #[arg(long)]
        output: PathBuf,
        /// Where to write the conflict report
        #[arg(long)]
        conflicts: Option<PathBuf>,
    },
    /// Classify development stage from pre-fetched evidence
    Classify {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        evidence: Option<PathBuf>,
        #[arg(long)]
        output: PathBuf,
        /// Extra known-company entries layered over the built-in table
        #[arg(long)]
        known_companies: Option<PathBuf>,
        /// Classification history, read if present and written back
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Run one sharded enrichment pass against captured provider responses
    Enrich {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        places: PathBuf,
        #[arg(long)]
        sec: PathBuf,
        #[arg(long)]
        trials: PathBuf,
        #[arg(long)]
        evidence: Option<PathBuf>,
        #[arg(long)]
        known_companies: Option<PathBuf>,
        #[arg(long)]
        history: Option<PathBuf>,
        /// Per-company outcomes of the pass
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Run the promotion gate and print every failing check
    Validate {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        previous: Option<PathBuf>,
        #[arg(long)]
        ground_truth: Option<PathBuf>,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Validate, then publish only if every check passed
    Promote {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        previous: Option<PathBuf>,
        #[arg(long)]
        ground_truth: Option<PathBuf>,
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn load_known_companies(path: Option<&Path>) -> Result<KnownCompanyTable> {
    match path {
        Some(path) => KnownCompanyTable::with_overrides_from_file(path),
        None => Ok(KnownCompanyTable::with_defaults()),
    }
}

fn load_history(path: Option<&Path>) -> Result<ClassificationHistory> {
    match path {
        Some(path) if path.exists() => read_json(path).context("Failed to load classification history"),
        _ => Ok(ClassificationHistory::new()),
    }
}

fn run_validation(
    input: &Path,
    previous: Option<&Path>,
    ground_truth: Option<&Path>,
    report_path: Option<&Path>,
) -> Result<(CandidateBatch, ValidationReport)> {
    let config = ValidationConfig::from_env();
    config.log_config();

    let batch = CandidateBatch::from_file(input)?;
    let previous = previous.map(read_records).transpose()?;
    let mut validator = QualityValidator::new(config);
    if let Some(path) = ground_truth {
        validator = validator.with_ground_truth(GroundTruth::from_file(path)?);
    }
    let report = validator.validate(&batch, previous.as_deref());
    if let Some(path) = report_path {
        write_json(path, &report)?;
    }
    Ok((batch, report))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting biotech directory pipeline");
    load_env();
    let cli = Cli::parse();

    let progress_config = Arc::new(ProgressConfig::from_env());
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );
    let multi_progress = progress_config.create_multi_progress();

    let run_id = Uuid::new_v4().to_string();
    let run_timestamp = Utc::now().naive_utc();
    let mut stats = PipelineStats::new(&run_id, run_timestamp, None);
    let total_start = Instant::now();

    match cli.command {
        Command::Merge { input, output, conflicts } => {
            stats.description = Some(format!("merge of {} source files", input.len()));
            let records = read_records_from_all(input.as_slice())?;
            let start = Instant::now();
            let outcome = merge_records(records, multi_progress.as_ref());
            stats.merge_time = start.elapsed().as_secs_f64();
            stats.merge = outcome.stats.clone();

            write_json(&output, &outcome.records)?;
            if let Some(path) = conflicts {
                write_json(&path, &outcome.conflicts)?;
                info!("Wrote {} conflicts to {}", outcome.conflicts.len(), path.display());
            }
        }
        Command::Classify {
            input,
            evidence,
            output,
            known_companies,
            history,
        } => {
            stats.description = Some("offline stage classification".to_string());
            let logger = PipelineLogger::new(PipelineStage::Stage);
            let mut records = read_records(&input)?;
            logger.log_start(&run_id, records.len());
            let evidence = match &evidence {
                Some(path) => read_evidence(path)?,
                None => HashMap::new(),
            };
            let mut classifier = StageClassifier::new(
                load_known_companies(known_companies.as_deref())?,
                StageResultCache::from_env(),
            );
            let mut audit = load_history(history.as_deref())?;

            let start = Instant::now();
            let mut changed = 0;
            for record in records.iter_mut() {
                tag_record(record);
                let mut facts = evidence
                    .get(&normalize_name(&record.name))
                    .cloned()
                    .unwrap_or_else(|| StageEvidence::for_name(record.name.clone()));
                fill_if_empty(&mut facts.focus_area, &record.focus_area);
                fill_if_empty(&mut facts.description, &record.description);
                if classifier
                    .classify_record(record, &facts, &mut audit, run_timestamp)
                    .changed()
                {
                    changed += 1;
                }
            }
            stats.classification_time = start.elapsed().as_secs_f64();
            let (hits, misses) = classifier.cache_stats();
            logger.log_cache_results(hits, misses);
            logger.log_phase("Classified", Some(&format!("{} stages assigned or replaced", changed)));

            write_json(&output, &records)?;
            if let Some(path) = &history {
                write_json(path, &audit)?;
            }
            logger.log_completion(records.len(), records.len());
        }
        Command::Enrich {
            input,
            output,
            places,
            sec,
            trials,
            evidence,
            known_companies,
            history,
            report,
        } => {
            stats.description = Some("enrichment pass".to_string());
            let match_config = MatchConfig::from_env();
            match_config.log_config();
            let worker_config = WorkerConfig::from_env();
            worker_config.log_config();

            let records: Vec<CompanyRecord> = read_records(&input)?;
            let tenants = MultiTenantRegistry::from_addresses(
                records
                    .iter()
                    .filter_map(|r| r.address.as_deref().map(|a| (r.name.as_str(), a))),
                match_config.min_tenants,
            );
            let scorer = CandidateScorer::from_config(&match_config).with_tenant_registry(tenants);
            let providers = Providers {
                places: Arc::new(RecordedPlaces::from_file(&places)?),
                sec: Arc::new(RecordedSec::from_file(&sec)?),
                trials: Arc::new(RecordedTrials::from_file(&trials)?),
            };
            let classifier = StageClassifier::new(
                load_known_companies(known_companies.as_deref())?,
                StageResultCache::from_env(),
            );
            let mut worker = EnrichmentWorker::new(
                worker_config,
                providers,
                scorer,
                classifier,
                load_history(history.as_deref())?,
            );
            if let Some(path) = &evidence {
                worker = worker.with_evidence(read_evidence(path)?);
            }

            let start = Instant::now();
            let pass = worker
                .run_pass(
                    records,
                    run_timestamp,
                    multi_progress.as_ref().filter(|_| progress_config.should_show_detailed()),
                )
                .await;
            // Completed shards already changed stages; keep their history even if the pass failed.
            if let Some(path) = &history {
                write_json(path, &worker.history().await)?;
            }
            let (entries, pass_stats) = pass?;
            stats.enrichment_time = start.elapsed().as_secs_f64();
            stats.enrichment = pass_stats;

            if let Some(path) = &report {
                write_json(path, &entries)?;
            }
            let enriched: Vec<CompanyRecord> = entries.into_iter().map(|e| e.record).collect();
            write_json(&output, &enriched)?;
            let (hits, misses) = worker.cache_stats().await;
            PipelineLogger::new(PipelineStage::Stage).log_cache_results(hits, misses);
        }
        Command::Validate {
            input,
            previous,
            ground_truth,
            report,
        } => {
            stats.description = Some("validation".to_string());
            let start = Instant::now();
            let (_, result) = run_validation(&input, previous.as_deref(), ground_truth.as_deref(), report.as_deref())?;
            stats.validation_time = start.elapsed().as_secs_f64();
            result.into_result()?;
            info!("All checks passed for {}", input.display());
        }
        Command::Promote {
            input,
            output,
            previous,
            ground_truth,
            report,
        } => {
            stats.description = Some("validate and promote".to_string());
            let start = Instant::now();
            let (batch, result) =
                run_validation(&input, previous.as_deref(), ground_truth.as_deref(), report.as_deref())?;
            stats.validation_time = start.elapsed().as_secs_f64();
            promote(&result, &batch.records, &output)?;
        }
    }

    stats.total_processing_time = total_start.elapsed().as_secs_f64();

    info!("=== Pipeline Summary ===");
    info!("Run ID: {}", stats.run_id);
    if let Some(description) = &stats.description {
        info!("Run: {}", description);
    }
    if stats.merge.input_records > 0 {
        info!(
            "Merge: {} rows -> {} companies ({} dropped, {} domain conflicts, {} name collisions)",
            stats.merge.input_records,
            stats.merge.output_records,
            stats.merge.dropped_blank_names,
            stats.merge.domain_conflicts,
            stats.merge.name_collisions
        );
    }
    if stats.enrichment.companies_processed + stats.enrichment.companies_skipped_complete > 0 {
        info!(
            "Enrichment: {} processed, {} resumed, {} places accepted, {} stages assigned, {} failed",
            stats.enrichment.companies_processed,
            stats.enrichment.companies_skipped_complete,
            stats.enrichment.places_accepted,
            stats.enrichment.stages_assigned,
            stats.enrichment.provider_failures
        );
    }
    info!("=== Timing Breakdown ===");
    info!("Merge: {:.2}s", stats.merge_time);
    info!("Enrichment: {:.2}s", stats.enrichment_time);
    info!("Classification: {:.2}s", stats.classification_time);
    info!("Validation: {:.2}s", stats.validation_time);
    info!("Total execution time: {:.2}s", stats.total_processing_time);

    if progress_config.should_show_memory() {
        let final_memory_mb = get_memory_usage().await;
        info!("Final memory usage: {} MB", final_memory_mb);
    }

    info!("Pipeline completed successfully!");
    Ok(())
}
