use config::{Config, ConfigError, Environment, File};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::{Lamports, Tier, LAMPORTS_PER_SOL};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub quota: QuotaConfig,
    pub pricing: PricingConfig,
    pub cache: CacheConfig,
    pub coordinator: CoordinatorConfig,
    pub drain: DrainConfig,
    pub storage: StorageConfig,
    pub analysis: AnalysisConfig,
    pub publisher: PublisherConfig,
    pub logging: LoggingConfig,
}

/// Per-tier admission limits.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    pub hourly: u32,
    pub daily: u32,
    /// Rolling 30-day limit.
    pub monthly: u32,
    /// Spend ceiling for the current calendar month.
    pub monthly_budget_lamports: Lamports,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QuotaConfig {
    pub free: TierLimits,
    pub subscriber: TierLimits,
    pub premium: TierLimits,
    /// System-wide admissions allowed in any trailing minute.
    pub global_per_minute: u32,
}

impl QuotaConfig {
    pub fn limits(&self, tier: Tier) -> &TierLimits {
        match tier {
            Tier::Free => &self.free,
            Tier::Subscriber => &self.subscriber,
            Tier::Premium => &self.premium,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free: TierLimits {
                hourly: 2,
                daily: 5,
                monthly: 20,
                monthly_budget_lamports: LAMPORTS_PER_SOL / 10,
            },
            subscriber: TierLimits {
                hourly: 10,
                daily: 50,
                monthly: 999,
                monthly_budget_lamports: 10 * LAMPORTS_PER_SOL,
            },
            premium: TierLimits {
                hourly: 20,
                daily: 100,
                monthly: 9999,
                monthly_budget_lamports: 100 * LAMPORTS_PER_SOL,
            },
            global_per_minute: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PricingConfig {
    pub base_fee_lamports: Lamports,
    pub unit_rate_lamports: Lamports,
    /// Multiplier per risk bucket 1..=10, in basis points. Must be non-decreasing.
    pub risk_multiplier_bps: [u32; 10],
    pub subscriber_discount_bps: u32,
    pub premium_discount_bps: u32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_fee_lamports: LAMPORTS_PER_SOL / 20,
            unit_rate_lamports: 1_000,
            risk_multiplier_bps: [
                10_000, 10_000, 11_000, 11_000, 12_000, 15_000, 18_000, 20_000, 25_000, 30_000,
            ],
            subscriber_discount_bps: 2_000,
            premium_discount_bps: 2_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    /// Entries older than this are hidden from identity history.
    pub ttl_secs: u64,
    /// Freshness window used by the coordinator for dedup lookups.
    pub dedup_window_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            ttl_secs: 72 * 3600,
            dedup_window_secs: 24 * 3600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub analysis_timeout_ms: u64,
    pub side_effect_timeout_ms: u64,
    /// Admission-time spend estimate for paid tiers. Free analysis costs nothing.
    pub paid_cost_estimate_lamports: Lamports,
}

impl CoordinatorConfig {
    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }

    pub fn side_effect_timeout(&self) -> Duration {
        Duration::from_millis(self.side_effect_timeout_ms)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            analysis_timeout_ms: 120_000,
            side_effect_timeout_ms: 10_000,
            paid_cost_estimate_lamports: 5_000_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DrainConfig {
    pub interval_secs: u64,
    pub max_concurrent: usize,
    /// Finished or cancelled job records kept for status queries.
    pub retained_jobs: usize,
}

impl DrainConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            max_concurrent: 3,
            retained_jobs: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub s3_bucket: Option<String>,
    pub s3_endpoint: Option<String>,
    /// Base URL prepended to object keys in returned links.
    pub public_base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    pub remote_endpoint: Option<String>,
    pub remote_api_key: Option<Secret<String>>,
    pub max_payload_bytes: usize,
    /// Provider cost charged per workload unit by the remote analyzer.
    pub remote_cost_per_unit_lamports: Lamports,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            remote_endpoint: None,
            remote_api_key: None,
            max_payload_bytes: 50_000,
            remote_cost_per_unit_lamports: 180,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PublisherConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
}

impl AppConfig {
    /// Load `config/default`, `config/{AUDIT_GATE_ENV}`, `config/local`, then
    /// `APP__*` environment overrides. Every file is optional.
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("AUDIT_GATE_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map APP__QUOTA__GLOBAL_PER_MINUTE=50 to quota.global_per_minute
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Load a single config file, without environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_tier_table() {
        let config = AppConfig::default();
        assert_eq!(config.quota.limits(Tier::Free).hourly, 2);
        assert_eq!(config.quota.limits(Tier::Subscriber).daily, 50);
        assert_eq!(config.quota.limits(Tier::Premium).monthly, 9999);
        assert_eq!(config.quota.global_per_minute, 100);
        assert_eq!(config.pricing.base_fee_lamports, 50_000_000);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[quota]\nglobal_per_minute = 7\n\n[cache]\ncapacity = 2\n\n[drain]\nmax_concurrent = 5"
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.quota.global_per_minute, 7);
        assert_eq!(config.cache.capacity, 2);
        assert_eq!(config.drain.max_concurrent, 5);
        // Untouched sections keep their defaults.
        assert_eq!(config.quota.free.hourly, 2);
        assert_eq!(config.coordinator.analysis_timeout_ms, 120_000);
    }
}
