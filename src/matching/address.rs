// src/matching/address.rs - Address normalization and shared-facility detection
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::models::matching::DomainComparison;

/// Default number of distinct companies at one address before it counts as
/// shared.
pub const DEFAULT_MIN_TENANTS: usize = 3;

const PENALTY_UNCONFIRMED: f64 = 0.15;
const PENALTY_NAME_ONLY: f64 = 0.05;
const STRONG_NAME_SIMILARITY: f64 = 0.90;

/// Name fragments of incubators, accelerators and co-working operators.
const SHARED_FACILITY_INDICATORS: &[&str] = &[
    "incubator",
    "accelerator",
    "biolabs",
    "jlabs",
    "qb3",
    "colaborator",
    "wework",
    "regus",
    "cowork",
    "co work",
    "innovation center",
    "innovation hub",
    "shared lab",
    "startup space",
    " c o ",
];

/// Street-level (unit stripped) forms of well-known Bay Area shared lab
/// buildings.
const KNOWN_SHARED_ADDRESSES: &[&str] = &[
    "329 oyster point boulevard",
    "455 mission bay boulevard south",
    "953 indiana street",
    "930 brittan avenue",
    "2625 durant avenue",
    "5858 horton street",
    "1700 owens street",
    "3000 el camino real",
];

static UNIT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(apt|apartment|suite|ste|unit|bldg|building|fl|floor|room|rm)\b\.?\s*#?\s*[a-z0-9-]+|#\s*[a-z0-9-]+")
        .expect("unit regex is valid")
});

static STREET_ABBREVIATIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\bst\b", "street"),
        (r"\bstr\b", "street"),
        (r"\brd\b", "road"),
        (r"\bave?\b", "avenue"),
        (r"\bblvd\b", "boulevard"),
        (r"\bdr\b", "drive"),
        (r"\bln\b", "lane"),
        (r"\bct\b", "court"),
        (r"\bpl\b", "place"),
        (r"\bpkwy\b", "parkway"),
        (r"\bhwy\b", "highway"),
        (r"\bcir\b", "circle"),
        (r"\bs\b", "south"),
        (r"\bn\b", "north"),
    ]
    .into_iter()
    .map(|(p, r)| (Regex::new(p).expect("street abbreviation regex is valid"), r))
    .collect()
});

/// Lower-cases, strips unit designators and punctuation, and expands street
/// abbreviations so two tenants of one building normalize identically.
pub fn normalize_address(address: &str) -> String {
    let lower = address.to_lowercase();
    let without_units = UNIT_PATTERN.replace_all(&lower, " ");
    let mut normalized: String = without_units
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    for (re, replacement) in STREET_ABBREVIATIONS.iter() {
        normalized = re.replace_all(&normalized, *replacement).into_owned();
    }
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Street line only: the part before the first comma, normalized.
pub fn street_line(address: &str) -> String {
    normalize_address(address.split(',').next().unwrap_or(""))
}

/// True if the address is a known incubator/co-working location.
pub fn is_multi_tenant(address: &str) -> bool {
    let normalized = normalize_address(address);
    if normalized.is_empty() {
        return false;
    }
    let padded = format!(" {} ", normalized);
    SHARED_FACILITY_INDICATORS.iter().any(|ind| padded.contains(ind))
        || KNOWN_SHARED_ADDRESSES.iter().any(|known| normalized.contains(known))
}

/// Shared-address registry built from the built-in list plus any street
/// line used by several distinct companies in the current batch.
#[derive(Debug, Clone, Default)]
pub struct MultiTenantRegistry {
    observed_shared: HashSet<String>,
}

impl MultiTenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts distinct normalized company names per street line.
    pub fn from_addresses<'a, I>(entries: I, min_tenants: usize) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut tenants: HashMap<String, HashSet<String>> = HashMap::new();
        for (company, address) in entries {
            let street = street_line(address);
            if street.is_empty() {
                continue;
            }
            tenants
                .entry(street)
                .or_default()
                .insert(crate::matching::name::normalize_name(company));
        }
        let observed_shared: HashSet<String> = tenants
            .into_iter()
            .filter(|(_, names)| names.len() >= min_tenants.max(2))
            .map(|(street, _)| street)
            .collect();
        debug!("MultiTenantRegistry: {} shared street lines observed", observed_shared.len());
        Self { observed_shared }
    }

    pub fn is_multi_tenant(&self, address: &str) -> bool {
        is_multi_tenant(address) || self.observed_shared.contains(&street_line(address))
    }

    pub fn observed_count(&self) -> usize {
        self.observed_shared.len()
    }
}

/// Result of checking a match that leans on a shared address.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiTenantCheck {
    pub multi_tenant: bool,
    /// Amount to subtract from the match score.
    pub penalty: f64,
}

/// A shared address does not prove identity. No penalty when the website
/// confirms the company, a small one when only the name is strong, the full
/// penalty otherwise.
pub fn validate_multi_tenant_match(
    registry: &MultiTenantRegistry,
    candidate_address: Option<&str>,
    name_similarity: f64,
    domain: DomainComparison,
) -> MultiTenantCheck {
    let multi_tenant = candidate_address.map_or(false, |a| registry.is_multi_tenant(a));
    if !multi_tenant {
        return MultiTenantCheck { multi_tenant, penalty: 0.0 };
    }
    let penalty = match domain {
        DomainComparison::ExactMatch | DomainComparison::SameBaseDifferentTld => 0.0,
        _ if name_similarity >= STRONG_NAME_SIMILARITY => PENALTY_NAME_ONLY,
        _ => PENALTY_UNCONFIRMED,
    };
    MultiTenantCheck { multi_tenant, penalty }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address_strips_units_and_abbreviations() {
        assert_eq!(
            normalize_address("329 Oyster Point Blvd., Suite 300"),
            "329 oyster point boulevard"
        );
        assert_eq!(
            normalize_address("329 Oyster Point Boulevard #410"),
            "329 oyster point boulevard"
        );
    }

    #[test]
    fn test_known_shared_address() {
        assert!(is_multi_tenant("329 Oyster Point Blvd, South San Francisco, CA 94080"));
        assert!(is_multi_tenant("MBC BioLabs, 930 Brittan Ave, San Carlos"));
        assert!(!is_multi_tenant("1 DNA Way, South San Francisco, CA 94080"));
        assert!(!is_multi_tenant(""));
    }

    #[test]
    fn test_registry_observes_shared_street_lines() {
        let entries = vec![
            ("Acme Bio", "100 Industrial Rd, Suite 1, San Carlos, CA"),
            ("Zenith Pharma", "100 Industrial Road Ste 2, San Carlos, CA"),
            ("Nova Tx", "100 Industrial Rd #3, San Carlos, CA"),
            ("Solo Labs", "7 Elm St, Palo Alto, CA"),
        ];
        let registry = MultiTenantRegistry::from_addresses(entries, 3);
        assert_eq!(registry.observed_count(), 1);
        assert!(registry.is_multi_tenant("100 Industrial Rd, Suite 9, San Carlos"));
        assert!(!registry.is_multi_tenant("7 Elm St, Palo Alto, CA"));
    }

    #[test]
    fn test_validate_multi_tenant_penalties() {
        let registry = MultiTenantRegistry::new();
        let shared = Some("329 Oyster Point Blvd, South San Francisco");
        let confirmed = validate_multi_tenant_match(&registry, shared, 0.5, DomainComparison::ExactMatch);
        assert!(confirmed.multi_tenant);
        assert_eq!(confirmed.penalty, 0.0);

        let name_only = validate_multi_tenant_match(&registry, shared, 0.95, DomainComparison::CandidateMissing);
        assert_eq!(name_only.penalty, PENALTY_NAME_ONLY);

        let weak = validate_multi_tenant_match(&registry, shared, 0.6, DomainComparison::NeitherPresent);
        assert_eq!(weak.penalty, PENALTY_UNCONFIRMED);

        let elsewhere = validate_multi_tenant_match(&registry, Some("1 DNA Way"), 0.6, DomainComparison::Unrelated);
        assert!(!elsewhere.multi_tenant);
        assert_eq!(elsewhere.penalty, 0.0);
    }
}
