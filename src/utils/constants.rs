// src/utils/constants.rs

/// File name pattern for per-shard checkpoints inside the checkpoint directory.
pub const CHECKPOINT_FILE_PREFIX: &str = "enrichment_shard";

/// Default directory for shard checkpoints.
pub const DEFAULT_CHECKPOINT_DIR: &str = "checkpoints";

/// Upper bound on any single backoff sleep, whatever the attempt number.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Examples listed per failing validation check.
pub const VALIDATION_EXAMPLE_LIMIT: usize = 5;
