//! Quota ledger.
//!
//! Tracks, per identity, the requests settled in rolling hour/day/30-day
//! windows and the spend of the current calendar month, plus a system-wide
//! trailing-minute throttle shared by every identity.
//!
//! Admission and usage recording form one check-then-act transaction. A
//! successful [`QuotaLedger::check_admission`] returns a [`Reservation`]
//! that occupies a slot in every window until it is either settled with
//! [`Reservation::record_usage`] or released (explicitly or on drop). This
//! lets the slow analysis step run outside any lock while concurrent
//! requests still see the slot as taken.
//!
//! Lock order is always identity entry, then system window.

use chrono::{DateTime, Datelike, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use audit_gate_core::{
    config::{QuotaConfig, TierLimits},
    Clock, DenialReason, Error, Identity, IdentityId, Lamports, Result, Tier,
};

fn minute() -> Duration {
    Duration::minutes(1)
}

fn hour() -> Duration {
    Duration::hours(1)
}

fn day() -> Duration {
    Duration::days(1)
}

fn month() -> Duration {
    Duration::days(30)
}

fn month_key(at: DateTime<Utc>) -> (i32, u32) {
    (at.year(), at.month())
}

fn count_within(stamps: &VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> u32 {
    stamps
        .iter()
        .filter(|ts| now.signed_duration_since(**ts) < window)
        .count() as u32
}

fn prune(stamps: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, horizon: Duration) {
    while let Some(front) = stamps.front() {
        if now.signed_duration_since(*front) >= horizon {
            stamps.pop_front();
        } else {
            break;
        }
    }
}

/// Usage window for one identity.
#[derive(Debug)]
struct UsageWindow {
    identity: Identity,
    /// Settlement times, oldest first, kept for 30 days.
    settled: VecDeque<DateTime<Utc>>,
    /// Admitted requests not yet settled or released.
    in_flight: u32,
    /// Estimated cost held by in-flight requests.
    reserved_spend: Lamports,
    spend_month: (i32, u32),
    spent: Lamports,
}

impl UsageWindow {
    fn new(identity: Identity, now: DateTime<Utc>) -> Self {
        Self {
            identity,
            settled: VecDeque::new(),
            in_flight: 0,
            reserved_spend: 0,
            spend_month: month_key(now),
            spent: 0,
        }
    }

    fn spent_this_month(&self, now: DateTime<Utc>) -> Lamports {
        if self.spend_month == month_key(now) {
            self.spent
        } else {
            0
        }
    }

    /// Settled plus in-flight requests within `window`.
    fn occupied(&self, now: DateTime<Utc>, window: Duration) -> u32 {
        count_within(&self.settled, now, window).saturating_add(self.in_flight)
    }
}

/// System-wide trailing window.
#[derive(Debug, Default)]
struct SystemWindow {
    settled: VecDeque<DateTime<Utc>>,
    in_flight: u32,
}

/// Per-identity quota ledger with a system-wide throttle.
pub struct QuotaLedger {
    windows: DashMap<IdentityId, UsageWindow>,
    system: Mutex<SystemWindow>,
    config: QuotaConfig,
    clock: Arc<dyn Clock>,
}

impl QuotaLedger {
    /// Create a new ledger.
    pub fn new(config: QuotaConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            system: Mutex::new(SystemWindow::default()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Decide whether `identity` may run one more request on `tier`.
    ///
    /// Constraints are checked in a fixed order and the first violation is
    /// returned. Any internal error denies the request.
    pub fn check_admission(
        &self,
        identity: &IdentityId,
        tier: Tier,
        estimated_cost: Lamports,
    ) -> std::result::Result<Reservation<'_>, DenialReason> {
        match self.evaluate(identity, tier, estimated_cost) {
            Ok(None) => {
                tracing::debug!(
                    identity = %identity,
                    tier = %tier,
                    estimated_cost = estimated_cost,
                    "Admission granted"
                );
                Ok(Reservation {
                    ledger: self,
                    identity: identity.clone(),
                    estimated_cost,
                    active: true,
                })
            }
            Ok(Some(reason)) => {
                tracing::info!(identity = %identity, tier = %tier, reason = %reason, "Admission denied");
                Err(reason)
            }
            Err(e) => {
                tracing::error!(identity = %identity, error = %e, "Quota check failed, denying request");
                Err(DenialReason::Internal(e.to_string()))
            }
        }
    }

    /// Returns `None` when admitted; the reservation is already booked.
    fn evaluate(
        &self,
        identity: &IdentityId,
        tier: Tier,
        estimated_cost: Lamports,
    ) -> Result<Option<DenialReason>> {
        let now = self.clock.now();
        let mut window = self
            .windows
            .entry(identity.clone())
            .or_insert_with(|| UsageWindow::new(Identity::new(identity.clone(), tier, now), now));

        if window.identity.tier != tier {
            tracing::info!(
                identity = %identity,
                from = %window.identity.tier,
                to = %tier,
                "Identity tier changed"
            );
            window.identity.tier = tier;
        }
        prune(&mut window.settled, now, month());

        let limits = self.config.limits(tier);
        if window.occupied(now, hour()) >= limits.hourly {
            return Ok(Some(DenialReason::HourlyLimit));
        }
        if window.occupied(now, day()) >= limits.daily {
            return Ok(Some(DenialReason::DailyLimit));
        }
        if window.occupied(now, month()) >= limits.monthly {
            return Ok(Some(DenialReason::MonthlyLimit));
        }

        let committed = window
            .spent_this_month(now)
            .checked_add(window.reserved_spend)
            .and_then(|spend| spend.checked_add(estimated_cost))
            .ok_or_else(|| Error::ledger(format!("spend overflow for {identity}")))?;
        if committed > limits.monthly_budget_lamports {
            return Ok(Some(DenialReason::BudgetLimit));
        }

        // A poisoned lock denies this request only; the poison is cleared
        // so the next admission sees the recovered window.
        let mut system = self.system.lock().map_err(|poisoned| {
            drop(poisoned.into_inner());
            self.system.clear_poison();
            Error::ledger("system window lock poisoned")
        })?;
        prune(&mut system.settled, now, minute());
        let recent = count_within(&system.settled, now, minute()).saturating_add(system.in_flight);
        if recent >= self.config.global_per_minute {
            return Ok(Some(DenialReason::SystemThrottle));
        }

        system.in_flight += 1;
        window.in_flight += 1;
        window.reserved_spend += estimated_cost;
        Ok(None)
    }

    fn settle(&self, identity: &IdentityId, estimated_cost: Lamports, actual_cost: Lamports) -> Result<()> {
        let now = self.clock.now();
        let mut window = self.windows.get_mut(identity).ok_or_else(|| {
            Error::inconsistency(format!("reservation for unknown identity {identity}"))
        })?;
        if window.in_flight == 0 {
            tracing::error!(identity = %identity, "Settling with no reservation in flight");
            return Err(Error::inconsistency(format!(
                "no reservation in flight for {identity}"
            )));
        }

        window.in_flight -= 1;
        window.reserved_spend = window.reserved_spend.saturating_sub(estimated_cost);
        window.settled.push_back(now);
        let key = month_key(now);
        if window.spend_month != key {
            window.spend_month = key;
            window.spent = 0;
        }
        window.spent = window.spent.saturating_add(actual_cost);

        // Settlement must complete even if another thread panicked.
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.in_flight = system.in_flight.saturating_sub(1);
        system.settled.push_back(now);
        prune(&mut system.settled, now, minute());

        tracing::debug!(
            identity = %identity,
            actual_cost = actual_cost,
            spent_this_month = window.spent,
            "Usage recorded"
        );
        Ok(())
    }

    fn release(&self, identity: &IdentityId, estimated_cost: Lamports) {
        if let Some(mut window) = self.windows.get_mut(identity) {
            window.in_flight = window.in_flight.saturating_sub(1);
            window.reserved_spend = window.reserved_spend.saturating_sub(estimated_cost);
        }
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.in_flight = system.in_flight.saturating_sub(1);
        tracing::debug!(identity = %identity, "Reservation released");
    }

    /// Record the tier of an identity, creating it if needed.
    ///
    /// The tier carried by each request is authoritative: the next
    /// [`check_admission`](Self::check_admission) applies its own tier and
    /// overwrites this one. Use this to provision an identity ahead of its
    /// first request so [`snapshot`](Self::snapshot) reports the right
    /// limits.
    pub fn set_tier(&self, identity: &IdentityId, tier: Tier) {
        let now = self.clock.now();
        self.windows
            .entry(identity.clone())
            .or_insert_with(|| UsageWindow::new(Identity::new(identity.clone(), tier, now), now))
            .identity
            .tier = tier;
        tracing::info!(identity = %identity, tier = %tier, "Identity tier set");
    }

    /// Tier of an identity; unknown identities are Free.
    pub fn tier_of(&self, identity: &IdentityId) -> Tier {
        self.windows
            .get(identity)
            .map(|w| w.identity.tier)
            .unwrap_or_default()
    }

    /// Forget settled usage and spend for an identity. In-flight
    /// reservations are kept.
    pub fn reset_identity(&self, identity: &IdentityId) {
        if let Some(mut window) = self.windows.get_mut(identity) {
            window.settled.clear();
            window.spent = 0;
            tracing::info!(identity = %identity, "Quota usage reset");
        }
    }

    /// Number of identities seen so far.
    pub fn identity_count(&self) -> usize {
        self.windows.len()
    }

    /// Current usage for an identity. Does not create the identity.
    pub fn snapshot(&self, identity: &IdentityId) -> QuotaSnapshot {
        let now = self.clock.now();
        match self.windows.get(identity) {
            Some(window) => {
                let limits = *self.config.limits(window.identity.tier);
                QuotaSnapshot::new(
                    identity.clone(),
                    window.identity.tier,
                    Some(window.identity.created_at),
                    [
                        count_within(&window.settled, now, hour()),
                        count_within(&window.settled, now, day()),
                        count_within(&window.settled, now, month()),
                    ],
                    window.in_flight,
                    window.spent_this_month(now),
                    limits,
                )
            }
            None => QuotaSnapshot::new(
                identity.clone(),
                Tier::Free,
                None,
                [0, 0, 0],
                0,
                0,
                *self.config.limits(Tier::Free),
            ),
        }
    }
}

/// An admitted request holding one slot in every quota window.
///
/// Consumed by [`record_usage`](Self::record_usage) or
/// [`release`](Self::release); dropping it releases the slot.
#[must_use = "dropping a reservation releases it without recording usage"]
pub struct Reservation<'a> {
    ledger: &'a QuotaLedger,
    identity: IdentityId,
    estimated_cost: Lamports,
    active: bool,
}

impl std::fmt::Debug for Reservation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("identity", &self.identity)
            .field("estimated_cost", &self.estimated_cost)
            .field("active", &self.active)
            .finish()
    }
}

impl Reservation<'_> {
    pub fn identity(&self) -> &IdentityId {
        &self.identity
    }

    pub fn estimated_cost(&self) -> Lamports {
        self.estimated_cost
    }

    /// Settle the request: count it in every window and add `actual_cost`
    /// to the monthly spend.
    pub fn record_usage(mut self, actual_cost: Lamports) -> Result<()> {
        self.active = false;
        self.ledger
            .settle(&self.identity, self.estimated_cost, actual_cost)
    }

    /// Give the slot back without recording anything.
    pub fn release(mut self) {
        self.active = false;
        self.ledger.release(&self.identity, self.estimated_cost);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.active {
            self.ledger.release(&self.identity, self.estimated_cost);
        }
    }
}

/// Point-in-time view of an identity's quota usage.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaSnapshot {
    pub identity: IdentityId,
    pub tier: Tier,
    pub created_at: Option<DateTime<Utc>>,
    pub used_hour: u32,
    pub used_day: u32,
    pub used_month: u32,
    pub in_flight: u32,
    pub spent_this_month: Lamports,
    pub limits: TierLimits,
    pub remaining_hour: u32,
    pub remaining_day: u32,
    pub remaining_month: u32,
    pub remaining_budget: Lamports,
}

impl QuotaSnapshot {
    fn new(
        identity: IdentityId,
        tier: Tier,
        created_at: Option<DateTime<Utc>>,
        [used_hour, used_day, used_month]: [u32; 3],
        in_flight: u32,
        spent_this_month: Lamports,
        limits: TierLimits,
    ) -> Self {
        Self {
            identity,
            tier,
            created_at,
            used_hour,
            used_day,
            used_month,
            in_flight,
            spent_this_month,
            limits,
            remaining_hour: limits.hourly.saturating_sub(used_hour + in_flight),
            remaining_day: limits.daily.saturating_sub(used_day + in_flight),
            remaining_month: limits.monthly.saturating_sub(used_month + in_flight),
            remaining_budget: limits.monthly_budget_lamports.saturating_sub(spent_this_month),
        }
    }
}
