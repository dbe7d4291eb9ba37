//! Builder for AuditCoordinator.

use std::sync::Arc;

use audit_gate_analysis::{FeeCalculator, PatternAnalyzer};
use audit_gate_core::{
    config::{AppConfig, CoordinatorConfig},
    Analyzer, ArtifactStore, Clock, Notarizer, Publisher, Result, SystemClock,
};
use audit_gate_governance::QuotaLedger;
use audit_gate_store::DeduplicationCache;

use crate::coordinator::AuditCoordinator;
use crate::lanes::SubjectLanes;
use crate::side_effects::SideEffects;

/// Builder for constructing an AuditCoordinator.
pub struct AuditCoordinatorBuilder {
    config: AppConfig,
    clock: Arc<dyn Clock>,
    ledger: Option<Arc<QuotaLedger>>,
    cache: Option<Arc<DeduplicationCache>>,
    free_analyzer: Option<Arc<dyn Analyzer>>,
    paid_analyzer: Option<Arc<dyn Analyzer>>,
    store: Option<Arc<dyn ArtifactStore>>,
    notarizer: Option<Arc<dyn Notarizer>>,
    publisher: Option<Arc<dyn Publisher>>,
}

impl AuditCoordinatorBuilder {
    /// Create a new builder with default configuration and the system clock.
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            clock: Arc::new(SystemClock),
            ledger: None,
            cache: None,
            free_analyzer: None,
            paid_analyzer: None,
            store: None,
            notarizer: None,
            publisher: None,
        }
    }

    /// Set the configuration. Quota, pricing, cache and coordinator sections
    /// are used.
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_coordinator_config(mut self, config: CoordinatorConfig) -> Self {
        self.config.coordinator = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing ledger instead of creating one from config.
    pub fn with_ledger(mut self, ledger: Arc<QuotaLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Share an existing cache instead of creating one from config.
    pub fn with_cache(mut self, cache: Arc<DeduplicationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Analyzer for the Free tier. Defaults to [`PatternAnalyzer`].
    pub fn with_free_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.free_analyzer = Some(analyzer);
        self
    }

    /// Analyzer for paid tiers.
    pub fn with_paid_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.paid_analyzer = Some(analyzer);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_notarizer(mut self, notarizer: Arc<dyn Notarizer>) -> Self {
        self.notarizer = Some(notarizer);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Build the AuditCoordinator.
    pub fn build(self) -> Result<AuditCoordinator> {
        let fees = FeeCalculator::new(self.config.pricing.clone())?;
        let free_analyzer: Arc<dyn Analyzer> = match self.free_analyzer {
            Some(analyzer) => analyzer,
            None => Arc::new(PatternAnalyzer::new()?),
        };
        let ledger = self.ledger.unwrap_or_else(|| {
            Arc::new(QuotaLedger::new(self.config.quota.clone(), self.clock.clone()))
        });
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(DeduplicationCache::from_config(&self.config.cache, self.clock.clone()))
        });

        let mut side_effects = SideEffects::new(self.config.coordinator.side_effect_timeout());
        if let Some(store) = self.store {
            side_effects = side_effects.with_store(store);
        }
        if let Some(notarizer) = self.notarizer {
            side_effects = side_effects.with_notarizer(notarizer);
        }
        if let Some(publisher) = self.publisher {
            side_effects = side_effects.with_publisher(publisher);
        }

        Ok(AuditCoordinator {
            ledger,
            cache,
            fees,
            free_analyzer,
            paid_analyzer: self.paid_analyzer,
            side_effects,
            lanes: SubjectLanes::new(),
            clock: self.clock,
            dedup_window: self.config.cache.dedup_window(),
            config: self.config.coordinator,
        })
    }
}

impl Default for AuditCoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
