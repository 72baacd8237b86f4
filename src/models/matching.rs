// src/models/matching.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

/// One result row from the Places collaborator, shaped like the Places API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceResult {
    pub name: String,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub business_status: Option<String>,
    #[serde(default)]
    pub place_id: Option<String>,
}

impl PlaceResult {
    pub fn location(&self) -> Option<LatLng> {
        self.geometry.as_ref().map(|g| g.location)
    }

    pub fn is_operational(&self) -> bool {
        self.business_status
            .as_deref()
            .map_or(false, |s| s.eq_ignore_ascii_case("OPERATIONAL"))
    }
}

/// How the two websites compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainComparison {
    ExactMatch,
    SameBaseDifferentTld,
    SubstringStrongName,
    SubstringWeakName,
    Unrelated,
    CandidateMissing,
    NeitherPresent,
    /// The query has no website but the candidate does.
    QueryMissing,
}

/// One component of a candidate's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScoreReason {
    NameSimilarity { similarity: f64, contribution: f64 },
    Domain { comparison: DomainComparison, contribution: f64 },
    InsideGeofence { contribution: f64 },
    OutsideGeofence,
    Operational { contribution: f64 },
    MultiTenantAddress { penalty: f64 },
}

impl ScoreReason {
    pub fn contribution(&self) -> f64 {
        match self {
            ScoreReason::NameSimilarity { contribution, .. }
            | ScoreReason::Domain { contribution, .. }
            | ScoreReason::InsideGeofence { contribution }
            | ScoreReason::Operational { contribution } => *contribution,
            ScoreReason::OutsideGeofence => 0.0,
            ScoreReason::MultiTenantAddress { penalty } => -*penalty,
        }
    }
}

/// A place scored against one company. Transient; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub place: PlaceResult,
    /// Position in the upstream ranking, 0 = first.
    pub rank: usize,
    pub score: f64,
    pub reasons: Vec<ScoreReason>,
    /// Set when the geofence policy rejects the candidate outright.
    pub hard_rejected: bool,
}

impl MatchCandidate {
    pub fn accepted(&self, threshold: f64) -> bool {
        !self.hard_rejected && self.score >= threshold
    }
}

/// Outcome of scoring a full candidate list.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    Accepted(MatchCandidate),
    NoConfidentMatch { best_score: Option<f64>, candidates_seen: usize },
}

impl MatchDecision {
    pub fn accepted(&self) -> Option<&MatchCandidate> {
        match self {
            MatchDecision::Accepted(c) => Some(c),
            MatchDecision::NoConfidentMatch { .. } => None,
        }
    }
}
