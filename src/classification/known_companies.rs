// src/classification/known_companies.rs - Curated stage table for well-known companies
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::matching::name::normalize_name;
use crate::models::core::Stage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownCompany {
    pub name: String,
    pub stage: Stage,
    pub confidence: f64,
    #[serde(default)]
    pub ticker: Option<String>,
}

/// Stage lookup keyed by normalized name. Populated at construction; no
/// process-wide state.
#[derive(Debug, Clone, Default)]
pub struct KnownCompanyTable {
    entries: HashMap<String, KnownCompany>,
}

const DEFAULT_ENTRIES: &[(&str, Stage, f64, Option<&str>)] = &[
    ("Gilead Sciences", Stage::Public, 0.98, Some("GILD")),
    ("Amgen", Stage::Public, 0.98, Some("AMGN")),
    ("BioMarin Pharmaceutical", Stage::Public, 0.97, Some("BMRN")),
    ("Exelixis", Stage::Public, 0.97, Some("EXEL")),
    ("Cytokinetics", Stage::Public, 0.97, Some("CYTK")),
    ("Denali Therapeutics", Stage::Public, 0.97, Some("DNLI")),
    ("Revolution Medicines", Stage::Public, 0.97, Some("RVMD")),
    ("Nektar Therapeutics", Stage::Public, 0.95, Some("NKTR")),
    ("Ultragenyx Pharmaceutical", Stage::Public, 0.95, Some("RARE")),
    ("Arcus Biosciences", Stage::Public, 0.95, Some("RCUS")),
    ("Twist Bioscience", Stage::Public, 0.95, Some("TWST")),
    ("10x Genomics", Stage::Public, 0.95, Some("TXG")),
    ("Bio-Rad Laboratories", Stage::Public, 0.95, Some("BIO")),
    ("Guardant Health", Stage::Public, 0.95, Some("GH")),
    ("Natera", Stage::Public, 0.95, Some("NTRA")),
    ("Pacific Biosciences of California", Stage::Public, 0.95, Some("PACB")),
    ("Genentech", Stage::Acquired, 0.95, None),
    ("Kite Pharma", Stage::Acquired, 0.95, None),
    ("Onyx Pharmaceuticals", Stage::Acquired, 0.92, None),
    ("Stemcentrx", Stage::Acquired, 0.90, None),
    ("Zymergen", Stage::Acquired, 0.90, None),
    ("Calico Life Sciences", Stage::Private, 0.90, None),
    ("Altos Labs", Stage::Private, 0.88, None),
    ("Arc Institute", Stage::Platform, 0.85, None),
];

impl KnownCompanyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in Bay Area table.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        for (name, stage, confidence, ticker) in DEFAULT_ENTRIES {
            table.insert(KnownCompany {
                name: name.to_string(),
                stage: *stage,
                confidence: *confidence,
                ticker: ticker.map(|t| t.to_string()),
            });
        }
        table
    }

    /// Defaults plus the entries in a JSON array file, later entries winning.
    pub fn with_overrides_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read known-company table {}", path.display()))?;
        let extra: Vec<KnownCompany> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse known-company table {}", path.display()))?;
        let mut table = Self::with_defaults();
        let count = extra.len();
        for company in extra {
            table.insert(company);
        }
        info!("Loaded {} known-company overrides from {}", count, path.display());
        Ok(table)
    }

    pub fn insert(&mut self, company: KnownCompany) {
        let key = normalize_name(&company.name);
        if !key.is_empty() {
            self.entries.insert(key, company);
        }
    }

    /// Looks up by raw or normalized name.
    pub fn lookup(&self, name: &str) -> Option<&KnownCompany> {
        self.entries.get(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_lookup_is_name_normalized() {
        let table = KnownCompanyTable::with_defaults();
        let hit = table.lookup("GILEAD SCIENCES, INC.").unwrap();
        assert_eq!(hit.stage, Stage::Public);
        assert!(hit.confidence >= 0.85);
        assert!(table.lookup("Unheard Of Bio").is_none());
    }

    #[test]
    fn test_tables_are_independent() {
        let mut custom = KnownCompanyTable::new();
        custom.insert(KnownCompany {
            name: "Acme Bio".into(),
            stage: Stage::Platform,
            confidence: 0.9,
            ticker: None,
        });
        assert!(custom.lookup("acme bio").is_some());
        assert!(KnownCompanyTable::with_defaults().lookup("acme bio").is_none());
    }

    #[test]
    fn test_overrides_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name":"Genentech","stage":"Public","confidence":0.99}},{{"name":"Acme Bio","stage":"Preclinical","confidence":0.86}}]"#
        )
        .unwrap();
        let table = KnownCompanyTable::with_overrides_from_file(file.path()).unwrap();
        assert_eq!(table.lookup("Genentech").unwrap().stage, Stage::Public);
        assert_eq!(table.lookup("Acme Bio").unwrap().stage, Stage::Preclinical);
        assert_eq!(table.len(), DEFAULT_ENTRIES.len() + 1);
    }
}
