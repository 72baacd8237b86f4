// src/utils/io.rs - JSON file boundary for records, evidence and reports
use anyhow::{Context, Result};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::matching::name::normalize_name;
use crate::models::core::CompanyRecord;
use crate::models::evidence::StageEvidence;

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse JSON in {}", path.display()))
}

/// Pretty-printed, creating parent directories as needed.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn read_records(path: &Path) -> Result<Vec<CompanyRecord>> {
    let records: Vec<CompanyRecord> = read_json(path)?;
    info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Concatenates several source files in the order given.
pub fn read_records_from_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<CompanyRecord>> {
    let mut all = Vec::new();
    for path in paths {
        all.extend(read_records(path.as_ref())?);
    }
    Ok(all)
}

/// Evidence keyed by normalized company name. Later duplicates win.
pub fn index_evidence(evidence: Vec<StageEvidence>) -> HashMap<String, StageEvidence> {
    let mut index = HashMap::with_capacity(evidence.len());
    for item in evidence {
        let key = normalize_name(&item.company_name);
        if key.is_empty() {
            warn!("Skipping evidence with blank company name");
            continue;
        }
        index.insert(key, item);
    }
    index
}

pub fn read_evidence(path: &Path) -> Result<HashMap<String, StageEvidence>> {
    let evidence: Vec<StageEvidence> = read_json(path)?;
    Ok(index_evidence(evidence))
}
