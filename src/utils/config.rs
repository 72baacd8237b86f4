// src/utils/config.rs - Typed pipeline configuration read from the environment
use log::info;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::matching::address::DEFAULT_MIN_TENANTS;
use crate::matching::geofence::{Geofence, GeofencePolicy, GeofenceRegion};
use crate::matching::places::ACCEPT_THRESHOLD;
use crate::utils::constants::DEFAULT_CHECKPOINT_DIR;

/// `key` parsed as `T`, or `default` when unset or unparseable.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Candidate-scoring settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    pub accept_threshold: f64,
    pub geofence_policy: GeofencePolicy,
    pub geofence_region: GeofenceRegion,
    /// Backstop radius around the region centre. `None` disables it.
    pub geofence_radius_km: Option<f64>,
    pub min_tenants: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            accept_threshold: ACCEPT_THRESHOLD,
            geofence_policy: GeofencePolicy::Neutral,
            geofence_region: GeofenceRegion::BayArea,
            geofence_radius_km: None,
            min_tenants: DEFAULT_MIN_TENANTS,
        }
    }
}

impl MatchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            accept_threshold: env_or("MATCH_ACCEPT_THRESHOLD", defaults.accept_threshold),
            geofence_policy: env_or("GEOFENCE_POLICY", defaults.geofence_policy),
            geofence_region: env_or("GEOFENCE_REGION", defaults.geofence_region),
            geofence_radius_km: env::var("GEOFENCE_RADIUS_KM")
                .ok()
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|r| *r > 0.0),
            min_tenants: env_or("MULTI_TENANT_MIN_COMPANIES", defaults.min_tenants),
        }
    }

    pub fn geofence(&self) -> Geofence {
        Geofence::for_region(self.geofence_region).with_radius_km(self.geofence_radius_km)
    }

    pub fn log_config(&self) {
        info!("📍 Match configuration:");
        info!("   Accept threshold: {:.2}", self.accept_threshold);
        info!(
            "   Geofence: {:?} region, {:?} policy, radius backstop {}",
            self.geofence_region,
            self.geofence_policy,
            self.geofence_radius_km
                .map(|r| format!("{:.0} km", r))
                .unwrap_or_else(|| "disabled".to_string())
        );
        info!("   Shared address after {} tenants", self.min_tenants);
    }
}

/// Promotion-gate thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    /// Largest allowed fractional drop in company count.
    pub max_company_drop: f64,
    /// Largest allowed drop in address coverage, as a fraction of the previous ratio.
    pub max_address_coverage_drop: f64,
    /// Minimum non-`Unknown` share of stages.
    pub min_classification_rate: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_company_drop: 0.05,
            max_address_coverage_drop: 0.01,
            min_classification_rate: 0.75,
        }
    }
}

impl ValidationConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_company_drop: env_or("MAX_COMPANY_DROP", defaults.max_company_drop),
            max_address_coverage_drop: env_or("MAX_ADDRESS_COVERAGE_DROP", defaults.max_address_coverage_drop),
            min_classification_rate: env_or("MIN_CLASSIFICATION_RATE", defaults.min_classification_rate),
        }
    }

    pub fn log_config(&self) {
        info!("🛡️ Validation configuration:");
        info!("   Max company drop: {:.1}%", self.max_company_drop * 100.0);
        info!("   Max address coverage drop: {:.1}%", self.max_address_coverage_drop * 100.0);
        info!("   Min classification rate: {:.1}%", self.min_classification_rate * 100.0);
    }
}

/// Enrichment worker settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub worker_count: usize,
    /// Minimum gap between two calls to the same provider.
    pub provider_min_delay_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub checkpoint_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            provider_min_delay_ms: 200,
            max_retries: 3,
            backoff_base_ms: 500,
            checkpoint_dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_count: env_or("WORKER_COUNT", defaults.worker_count).max(1),
            provider_min_delay_ms: env_or("PROVIDER_MIN_DELAY_MS", defaults.provider_min_delay_ms),
            max_retries: env_or("PROVIDER_MAX_RETRIES", defaults.max_retries),
            backoff_base_ms: env_or("PROVIDER_BACKOFF_BASE_MS", defaults.backoff_base_ms),
            checkpoint_dir: env::var("CHECKPOINT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.checkpoint_dir),
        }
    }

    pub fn log_config(&self) {
        info!("⚙️ Worker configuration:");
        info!("   Workers: {}", self.worker_count);
        info!(
            "   Provider pacing: {}ms min delay, {} retries, {}ms backoff base",
            self.provider_min_delay_ms, self.max_retries, self.backoff_base_ms
        );
        info!("   Checkpoints in {}", self.checkpoint_dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let m = MatchConfig::default();
        assert_eq!(m.accept_threshold, 0.75);
        assert_eq!(m.geofence_policy, GeofencePolicy::Neutral);
        assert_eq!(m.geofence_radius_km, None);

        let v = ValidationConfig::default();
        assert_eq!(v.max_company_drop, 0.05);
        assert_eq!(v.max_address_coverage_drop, 0.01);
        assert_eq!(v.min_classification_rate, 0.75);

        let w = WorkerConfig::default();
        assert!(w.worker_count >= 1);
        assert_eq!(w.max_retries, 3);
    }

    #[test]
    fn test_match_config_from_env() {
        env::set_var("MATCH_ACCEPT_THRESHOLD", "0.8");
        env::set_var("GEOFENCE_POLICY", "reject");
        env::set_var("GEOFENCE_REGION", "california");
        env::set_var("GEOFENCE_RADIUS_KM", "not-a-number");

        let config = MatchConfig::from_env();
        assert_eq!(config.accept_threshold, 0.8);
        assert_eq!(config.geofence_policy, GeofencePolicy::Reject);
        assert_eq!(config.geofence_region, GeofenceRegion::California);
        assert_eq!(config.geofence_radius_km, None);
        assert_eq!(config.geofence().region, GeofenceRegion::California);

        env::remove_var("MATCH_ACCEPT_THRESHOLD");
        env::remove_var("GEOFENCE_POLICY");
        env::remove_var("GEOFENCE_REGION");
        env::remove_var("GEOFENCE_RADIUS_KM");
    }

    #[test]
    fn test_worker_config_from_env() {
        env::set_var("WORKER_COUNT", "0");
        env::set_var("PROVIDER_MAX_RETRIES", "5");
        env::set_var("CHECKPOINT_DIR", "/tmp/biotech-checkpoints");

        let config = WorkerConfig::from_env();
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.checkpoint_dir, PathBuf::from("/tmp/biotech-checkpoints"));

        env::remove_var("WORKER_COUNT");
        env::remove_var("PROVIDER_MAX_RETRIES");
        env::remove_var("CHECKPOINT_DIR");
    }
}
