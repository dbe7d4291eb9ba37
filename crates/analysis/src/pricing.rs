//! Fee calculation.
//!
//! `total = round((base + units * unit_rate) * risk_multiplier) - tier discount`
//!
//! All arithmetic is integer lamports; multipliers and discounts are basis
//! points. Intermediate products are computed in `u128` and each division
//! rounds half up.

use audit_gate_core::{
    clamp_risk_bucket, config::PricingConfig, Error, FeeQuote, Lamports, Result, Tier,
    BPS_DENOMINATOR,
};

fn mul_bps(amount: u128, bps: u32) -> u128 {
    let denom = BPS_DENOMINATOR as u128;
    amount.saturating_mul(bps as u128).saturating_add(denom / 2) / denom
}

fn to_lamports(amount: u128) -> Lamports {
    Lamports::try_from(amount).unwrap_or(Lamports::MAX)
}

/// Pure price calculator.
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    config: PricingConfig,
}

impl FeeCalculator {
    /// Validate the pricing table.
    ///
    /// The risk multiplier table must be non-decreasing and discounts may not
    /// exceed 100%.
    pub fn new(config: PricingConfig) -> Result<Self> {
        if let Some(pair) = config
            .risk_multiplier_bps
            .windows(2)
            .find(|pair| pair[1] < pair[0])
        {
            return Err(Error::config(format!(
                "risk multiplier table must be non-decreasing, found {} after {}",
                pair[1], pair[0]
            )));
        }
        for (tier, bps) in [
            (Tier::Subscriber, config.subscriber_discount_bps),
            (Tier::Premium, config.premium_discount_bps),
        ] {
            if bps as u64 > BPS_DENOMINATOR {
                return Err(Error::config(format!(
                    "{tier} discount of {bps} bps exceeds 100%"
                )));
            }
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Discount applied to `tier`, in basis points.
    pub fn discount_bps(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Free => 0,
            Tier::Subscriber => self.config.subscriber_discount_bps,
            Tier::Premium => self.config.premium_discount_bps,
        }
    }

    /// Quote one audit. Risk buckets outside `1..=10` are clamped.
    pub fn quote(&self, workload_units: u64, risk_bucket: u8, tier: Tier) -> FeeQuote {
        let risk_bucket = clamp_risk_bucket(risk_bucket as i64);
        let multiplier = self.config.risk_multiplier_bps[(risk_bucket - 1) as usize];
        let discount_bps = self.discount_bps(tier);

        let base = self.config.base_fee_lamports as u128;
        let workload = workload_units as u128 * self.config.unit_rate_lamports as u128;
        let subtotal = mul_bps(base.saturating_add(workload), multiplier);
        let discount = mul_bps(subtotal, discount_bps);

        FeeQuote {
            base_lamports: self.config.base_fee_lamports,
            workload_lamports: to_lamports(workload),
            risk_bucket,
            risk_multiplier_bps: multiplier,
            subtotal_lamports: to_lamports(subtotal),
            discount_bps,
            discount_lamports: to_lamports(discount),
            total_lamports: to_lamports(subtotal - discount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> FeeCalculator {
        FeeCalculator::new(PricingConfig::default()).unwrap()
    }

    #[test]
    fn test_subscriber_discount_is_exact() {
        let fees = calculator();
        let free = fees.quote(1000, 8, Tier::Free);
        let sub = fees.quote(1000, 8, Tier::Subscriber);

        // (0.05 SOL + 1000 * 1000) * 2.0
        assert_eq!(free.subtotal_lamports, 102_000_000);
        assert_eq!(free.total_lamports, 102_000_000);
        assert_eq!(free.discount_lamports, 0);

        assert_eq!(sub.subtotal_lamports, free.subtotal_lamports);
        assert_eq!(sub.discount_bps, 2_000);
        assert_eq!(sub.discount_lamports, 20_400_000);
        assert_eq!(free.total_lamports - sub.total_lamports, 20_400_000);
    }

    #[test]
    fn test_quote_is_deterministic() {
        let fees = calculator();
        assert_eq!(
            fees.quote(4242, 5, Tier::Premium),
            fees.quote(4242, 5, Tier::Premium)
        );
    }

    #[test]
    fn test_monotonic_in_workload_and_risk() {
        let fees = calculator();
        for tier in [Tier::Free, Tier::Subscriber, Tier::Premium] {
            let mut last = 0;
            for risk in 1..=10 {
                let total = fees.quote(500, risk, tier).total_lamports;
                assert!(total >= last, "risk {risk} on {tier} went down");
                last = total;
            }
            let mut last = 0;
            for units in [0, 1, 10, 999, 1_000_000] {
                let total = fees.quote(units, 6, tier).total_lamports;
                assert!(total >= last, "{units} units on {tier} went down");
                last = total;
            }
        }
    }

    #[test]
    fn test_paid_tiers_never_exceed_free() {
        let fees = calculator();
        for risk in 1..=10 {
            for units in [0, 7, 12_345] {
                let free = fees.quote(units, risk, Tier::Free).total_lamports;
                assert!(fees.quote(units, risk, Tier::Subscriber).total_lamports <= free);
                assert!(fees.quote(units, risk, Tier::Premium).total_lamports <= free);
            }
        }
    }

    #[test]
    fn test_risk_bucket_is_clamped() {
        let fees = calculator();
        assert_eq!(fees.quote(10, 0, Tier::Free), fees.quote(10, 1, Tier::Free));
        assert_eq!(fees.quote(10, 200, Tier::Free), fees.quote(10, 10, Tier::Free));
        assert_eq!(fees.quote(10, 200, Tier::Free).risk_bucket, 10);
    }

    #[test]
    fn test_rounds_half_up() {
        let fees = FeeCalculator::new(PricingConfig {
            base_fee_lamports: 1,
            unit_rate_lamports: 0,
            risk_multiplier_bps: [15_000; 10],
            subscriber_discount_bps: 5_000,
            premium_discount_bps: 0,
        })
        .unwrap();

        // 1 * 1.5 = 1.5 -> 2, then 2 * 0.5 = 1 off
        let quote = fees.quote(0, 3, Tier::Subscriber);
        assert_eq!(quote.subtotal_lamports, 2);
        assert_eq!(quote.discount_lamports, 1);
        assert_eq!(quote.total_lamports, 1);
    }

    #[test]
    fn test_huge_workload_saturates() {
        let quote = calculator().quote(u64::MAX, 10, Tier::Free);
        assert_eq!(quote.total_lamports, Lamports::MAX);
    }

    #[test]
    fn test_rejects_bad_tables() {
        let mut config = PricingConfig::default();
        config.risk_multiplier_bps[4] = 9_000;
        assert!(FeeCalculator::new(config).is_err());

        let config = PricingConfig {
            premium_discount_bps: 10_001,
            ..Default::default()
        };
        assert!(FeeCalculator::new(config).is_err());
    }
}
