// src/utils/progress_bars/logging.rs - Tagged logging helpers for pipeline stages
use log::{info, warn};
use std::time::Instant;

/// The stage a log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Merge,
    Places,
    Stage,
    Validate,
    Worker,
}

#[derive(Clone)]
pub struct PipelineLogger {
    stage_name: &'static str,
    stage_emoji: &'static str,
    start_time: Instant,
}

impl PipelineLogger {
    pub fn new(stage: PipelineStage) -> Self {
        let (stage_name, stage_emoji) = match stage {
            PipelineStage::Merge => ("MERGE", "🔗"),
            PipelineStage::Places => ("PLACES", "📍"),
            PipelineStage::Stage => ("STAGE", "🧪"),
            PipelineStage::Validate => ("VALIDATE", "🛡️"),
            PipelineStage::Worker => ("WORKER", "⚙️"),
        };
        Self {
            stage_name,
            stage_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, run_id: &str, input_count: usize) {
        info!(
            "[{}] {} 🚀 Starting {} (run ID: {}) over {} records",
            self.stage_name,
            self.stage_emoji,
            self.stage_name.to_lowercase(),
            run_id,
            input_count
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        let msg = match details {
            Some(details) => format!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, details, elapsed.as_secs_f32()
            ),
            None => format!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, elapsed.as_secs_f32()
            ),
        };
        info!("{}", msg);
    }

    pub fn log_dropped(&self, count: usize, reason: &str) {
        if count > 0 {
            warn!(
                "[{}] {} 🚫 Dropped {} records: {}",
                self.stage_name, self.stage_emoji, count, reason
            );
        }
    }

    pub fn log_conflicts(&self, domain_conflicts: usize, name_collisions: usize) {
        if domain_conflicts + name_collisions == 0 {
            info!("[{}] {} ✨ No conflicts to review", self.stage_name, self.stage_emoji);
        } else {
            warn!(
                "[{}] {} ⚠️  {} domain-reuse conflicts, {} name collisions queued for review",
                self.stage_name, self.stage_emoji, domain_conflicts, name_collisions
            );
        }
    }

    pub fn log_cache_results(&self, cache_hits: usize, cache_misses: usize) {
        let total = cache_hits + cache_misses;
        if total > 0 {
            let hit_rate = (cache_hits as f64 / total as f64) * 100.0;
            info!(
                "[{}] {} 💾 Cache results: {} hits, {} misses ({:.1}% hit rate)",
                self.stage_name, self.stage_emoji, cache_hits, cache_misses, hit_rate
            );
        }
    }

    pub fn log_completion(&self, input_count: usize, output_count: usize) {
        info!(
            "[{}] {} 🎉 COMPLETED: {} in → {} out in {:.2?}",
            self.stage_name,
            self.stage_emoji,
            input_count,
            output_count,
            self.start_time.elapsed()
        );
    }

    pub fn log_failures(&self, failures: usize) {
        if failures > 0 {
            warn!(
                "[{}] {} ⚠️  {} companies failed for this pass",
                self.stage_name, self.stage_emoji, failures
            );
        }
    }
}
