use serde::{Deserialize, Serialize};

// =============================================================================
// Monetary Types
// =============================================================================

/// Canonical minor unit for every monetary amount (1 SOL = 10^9 lamports).
pub type Lamports = u64;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: Lamports = 1_000_000_000;

/// Denominator for multipliers and discounts expressed in basis points.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Price quote for one completed audit.
///
/// All amounts are integer lamports; `total_lamports` equals
/// `subtotal_lamports - discount_lamports`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeeQuote {
    /// Flat base fee.
    pub base_lamports: Lamports,
    /// Workload-proportional component before the risk multiplier.
    pub workload_lamports: Lamports,
    /// Risk bucket the multiplier was taken from (after clamping).
    pub risk_bucket: u8,
    /// Applied risk multiplier in basis points (10_000 = 1.0x).
    pub risk_multiplier_bps: u32,
    /// `(base + workload) * multiplier`, rounded.
    pub subtotal_lamports: Lamports,
    /// Applied tier discount in basis points.
    pub discount_bps: u32,
    /// Discount amount subtracted from the subtotal.
    pub discount_lamports: Lamports,
    /// Amount charged.
    pub total_lamports: Lamports,
}

impl FeeQuote {
    /// Total expressed in SOL, for display only.
    pub fn total_sol(&self) -> f64 {
        self.total_lamports as f64 / LAMPORTS_PER_SOL as f64
    }
}
