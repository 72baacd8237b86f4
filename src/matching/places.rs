// src/matching/places.rs - Scoring Places candidates against a canonical company
use log::debug;

use crate::matching::address::{validate_multi_tenant_match, MultiTenantRegistry};
use crate::matching::geofence::{Geofence, GeofencePolicy};
use crate::matching::name::name_similarity;
use crate::matching::url::{brand_token, compare_domains};
use crate::models::core::{has_text, CompanyRecord};
use crate::models::matching::{DomainComparison, MatchCandidate, MatchDecision, PlaceResult, ScoreReason};
use crate::utils::config::MatchConfig;

pub const ACCEPT_THRESHOLD: f64 = 0.75;

const NAME_WEIGHT: f64 = 0.4;
const DOMAIN_EXACT: f64 = 0.3;
const DOMAIN_SAME_BASE: f64 = 0.2;
const DOMAIN_SUBSTRING_STRONG: f64 = 0.2;
const DOMAIN_SUBSTRING_WEAK: f64 = -0.1;
const DOMAIN_UNRELATED: f64 = -0.2;
const DOMAIN_CANDIDATE_MISSING: f64 = 0.1;
const GEOFENCE_BONUS: f64 = 0.2;
const OPERATIONAL_BONUS: f64 = 0.1;

/// Scores are rounded to this many decimal places so threshold comparisons
/// are not at the mercy of float summation order.
const SCORE_PRECISION: f64 = 1_000_000.0;

pub fn domain_contribution(comparison: DomainComparison) -> f64 {
    match comparison {
        DomainComparison::ExactMatch => DOMAIN_EXACT,
        DomainComparison::SameBaseDifferentTld => DOMAIN_SAME_BASE,
        DomainComparison::SubstringStrongName => DOMAIN_SUBSTRING_STRONG,
        DomainComparison::SubstringWeakName => DOMAIN_SUBSTRING_WEAK,
        DomainComparison::Unrelated => DOMAIN_UNRELATED,
        DomainComparison::CandidateMissing => DOMAIN_CANDIDATE_MISSING,
        DomainComparison::NeitherPresent | DomainComparison::QueryMissing => 0.0,
    }
}

/// Deterministic scorer for Places results. Holds no mutable state.
#[derive(Debug, Clone)]
pub struct CandidateScorer {
    geofence: Geofence,
    policy: GeofencePolicy,
    threshold: f64,
    tenants: MultiTenantRegistry,
}

impl CandidateScorer {
    pub fn new(geofence: Geofence, policy: GeofencePolicy, threshold: f64) -> Self {
        Self {
            geofence,
            policy,
            threshold,
            tenants: MultiTenantRegistry::new(),
        }
    }

    pub fn from_config(config: &MatchConfig) -> Self {
        Self::new(config.geofence(), config.geofence_policy, config.accept_threshold)
    }

    pub fn with_tenant_registry(mut self, tenants: MultiTenantRegistry) -> Self {
        self.tenants = tenants;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn passes_threshold(&self, score: f64) -> bool {
        score >= self.threshold
    }

    /// Scores one place. `rank` is its position in the upstream results.
    pub fn score_candidate(&self, query: &CompanyRecord, place: &PlaceResult, rank: usize) -> MatchCandidate {
        let mut reasons = Vec::with_capacity(5);

        let similarity = name_similarity(&query.name, &place.name);
        reasons.push(ScoreReason::NameSimilarity {
            similarity,
            contribution: similarity * NAME_WEIGHT,
        });

        let comparison = compare_domains(query.website.as_deref(), place.website.as_deref(), similarity);
        reasons.push(ScoreReason::Domain {
            comparison,
            contribution: domain_contribution(comparison),
        });

        let inside = self
            .geofence
            .contains(place.location(), place.formatted_address.as_deref());
        if inside {
            reasons.push(ScoreReason::InsideGeofence { contribution: GEOFENCE_BONUS });
        } else {
            reasons.push(ScoreReason::OutsideGeofence);
        }

        if place.is_operational() {
            reasons.push(ScoreReason::Operational { contribution: OPERATIONAL_BONUS });
        }

        let tenant_check =
            validate_multi_tenant_match(&self.tenants, place.formatted_address.as_deref(), similarity, comparison);
        if tenant_check.multi_tenant && tenant_check.penalty > 0.0 {
            reasons.push(ScoreReason::MultiTenantAddress { penalty: tenant_check.penalty });
        }

        let raw: f64 = reasons.iter().map(|r| r.contribution()).sum();
        let score = (raw * SCORE_PRECISION).round() / SCORE_PRECISION;
        let hard_rejected = !inside && self.policy == GeofencePolicy::Reject;

        debug!(
            "PLACES: '{}' vs candidate #{} '{}' -> score {:.3}{}",
            query.name,
            rank,
            place.name,
            score,
            if hard_rejected { " (outside geofence, rejected)" } else { "" }
        );

        MatchCandidate {
            place: place.clone(),
            rank,
            score,
            reasons,
            hard_rejected,
        }
    }

    /// Best candidate at or above the threshold. Equal scores keep the
    /// earlier-ranked candidate.
    pub fn select_best(&self, query: &CompanyRecord, places: &[PlaceResult]) -> MatchDecision {
        let mut best: Option<MatchCandidate> = None;
        let mut best_score: Option<f64> = None;

        for (rank, place) in places.iter().enumerate() {
            let candidate = self.score_candidate(query, place, rank);
            if best_score.map_or(true, |s| candidate.score > s) {
                best_score = Some(candidate.score);
            }
            if !candidate.accepted(self.threshold) {
                continue;
            }
            let replace = match &best {
                Some(current) => candidate.score > current.score,
                None => true,
            };
            if replace {
                best = Some(candidate);
            }
        }

        match best {
            Some(candidate) => MatchDecision::Accepted(candidate),
            None => MatchDecision::NoConfidentMatch {
                best_score,
                candidates_seen: places.len(),
            },
        }
    }
}

/// Ordered query strategies for the Places collaborator. Later entries are
/// fallbacks for a pass where earlier ones found nothing confident.
pub fn build_search_queries(record: &CompanyRecord) -> Vec<String> {
    let name = record.name.trim();
    let mut queries = Vec::new();
    if name.is_empty() {
        return queries;
    }

    let city = record.city.as_deref().map(str::trim).filter(|c| !c.is_empty());
    match city {
        Some(city) => queries.push(format!("{} {} CA", name, city)),
        None => queries.push(format!("{} California", name)),
    }
    queries.push(format!("{} biotech California", name));

    if has_text(&record.website) {
        if let Some(token) = record.website.as_deref().and_then(brand_token) {
            match city {
                Some(city) => queries.push(format!("{} {}", token, city)),
                None => queries.push(format!("{} biotech", token)),
            }
        }
    }
    queries.push(name.to_string());

    let mut seen = std::collections::HashSet::new();
    queries.retain(|q| seen.insert(q.to_lowercase()));
    queries
}
