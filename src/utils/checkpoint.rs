// src/utils/checkpoint.rs - Per-shard resume state for enrichment passes
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::models::core::CompanyRecord;
use crate::utils::constants::CHECKPOINT_FILE_PREFIX;

/// Hash of a record's serialized form. A completed index only counts as done
/// while its input still hashes the same.
pub fn record_signature(record: &CompanyRecord) -> Result<String> {
    let json = serde_json::to_vec(record).context("Failed to serialize record for signature")?;
    Ok(hex::encode(Sha256::digest(&json)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry<T> {
    pub signature: String,
    pub value: T,
}

/// Completed input indices of one shard, with their results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardCheckpoint<T> {
    pub shard_id: usize,
    pub range_start: usize,
    pub range_end: usize,
    pub updated_at: Option<NaiveDateTime>,
    completed: BTreeMap<usize, CheckpointEntry<T>>,
}

impl<T> ShardCheckpoint<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn new(shard_id: usize, range: Range<usize>) -> Self {
        Self {
            shard_id,
            range_start: range.start,
            range_end: range.end,
            updated_at: None,
            completed: BTreeMap::new(),
        }
    }

    pub fn path_for(dir: &Path, shard_id: usize) -> PathBuf {
        dir.join(format!("{}_{:03}.json", CHECKPOINT_FILE_PREFIX, shard_id))
    }

    /// Loads the shard's checkpoint, or starts empty if there is none or it
    /// was written for a different index range.
    pub fn load_or_new(dir: &Path, shard_id: usize, range: Range<usize>) -> Result<Self> {
        let path = Self::path_for(dir, shard_id);
        if !path.exists() {
            return Ok(Self::new(shard_id, range));
        }
        let raw = fs::read(&path).with_context(|| format!("Failed to read checkpoint {}", path.display()))?;
        let loaded: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("Failed to parse checkpoint {}", path.display()))?;
        if loaded.range_start != range.start || loaded.range_end != range.end {
            warn!(
                "Checkpoint {} covers {}..{}, shard now covers {}..{}; starting fresh",
                path.display(),
                loaded.range_start,
                loaded.range_end,
                range.start,
                range.end
            );
            return Ok(Self::new(shard_id, range));
        }
        info!(
            "Resuming shard {} from checkpoint: {} of {} indices complete",
            shard_id,
            loaded.completed.len(),
            range.len()
        );
        Ok(loaded)
    }

    /// Result stored for `index`, if it was completed for this exact input.
    pub fn completed_value(&self, index: usize, signature: &str) -> Option<&T> {
        self.completed
            .get(&index)
            .filter(|entry| entry.signature == signature)
            .map(|entry| &entry.value)
    }

    pub fn is_complete(&self, index: usize, signature: &str) -> bool {
        self.completed_value(index, signature).is_some()
    }

    /// Records `index` as done. A second call for the same index replaces the
    /// entry rather than adding another.
    pub fn mark_complete(&mut self, index: usize, signature: String, value: T) {
        self.completed.insert(index, CheckpointEntry { signature, value });
        self.updated_at = Some(Utc::now().naive_utc());
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Writes through a temporary file so a crash never leaves a torn checkpoint.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create checkpoint dir {}", dir.display()))?;
        let path = Self::path_for(dir, self.shard_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize checkpoint")?;
        fs::write(&tmp, json).with_context(|| format!("Failed to write checkpoint {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Failed to move checkpoint into {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::ValidationSource;

    #[test]
    fn test_signature_tracks_content() {
        let a = CompanyRecord::new("Acme Bio", ValidationSource::Bpg);
        let b = CompanyRecord::new("Acme Bio", ValidationSource::Bpg).with_city("Berkeley");
        assert_eq!(record_signature(&a).unwrap(), record_signature(&a.clone()).unwrap());
        assert_ne!(record_signature(&a).unwrap(), record_signature(&b).unwrap());
    }

    #[test]
    fn test_save_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp: ShardCheckpoint<String> = ShardCheckpoint::new(2, 10..20);
        cp.mark_complete(10, "sig-a".into(), "done-a".into());
        cp.mark_complete(11, "sig-b".into(), "done-b".into());
        cp.mark_complete(11, "sig-b".into(), "done-b2".into());
        cp.save(dir.path()).unwrap();

        let resumed: ShardCheckpoint<String> = ShardCheckpoint::load_or_new(dir.path(), 2, 10..20).unwrap();
        assert_eq!(resumed.completed_count(), 2);
        assert!(resumed.is_complete(10, "sig-a"));
        assert!(!resumed.is_complete(10, "changed-input"));
        assert_eq!(resumed.completed_value(11, "sig-b").map(String::as_str), Some("done-b2"));
    }

    #[test]
    fn test_range_mismatch_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp: ShardCheckpoint<u32> = ShardCheckpoint::new(0, 0..5);
        cp.mark_complete(0, "s".into(), 1);
        cp.save(dir.path()).unwrap();

        let fresh: ShardCheckpoint<u32> = ShardCheckpoint::load_or_new(dir.path(), 0, 0..8).unwrap();
        assert_eq!(fresh.completed_count(), 0);
        let missing: ShardCheckpoint<u32> = ShardCheckpoint::load_or_new(dir.path(), 7, 0..8).unwrap();
        assert_eq!(missing.completed_count(), 0);
    }
}
