//! # Tax Rule Tables
//!
//! Static rate data for the regimes the engine models.
//!
//! ## Simples Nacional, Anexo III (services)
//! ```text
//! ┌───────┬──────────────────────────────┬──────────┬───────────────────┐
//! │ Faixa │ Gross revenue, last 12 months│ Combined │ ISS share (info)  │
//! ├───────┼──────────────────────────────┼──────────┼───────────────────┤
//! │   1   │ up to R$ 180.000             │   6.00%  │   2.00%           │
//! │   2   │ up to R$ 360.000             │  11.20%  │   2.79%           │
//! │   3   │ up to R$ 720.000             │  13.50%  │   3.50%           │
//! │   4   │ up to R$ 1.800.000           │  16.00%  │   3.84%           │
//! │   5   │ up to R$ 3.600.000           │  21.00%  │   4.23%           │
//! │   6   │ up to R$ 4.800.000           │  33.00%  │   5.00%           │
//! └───────┴──────────────────────────────┴──────────┴───────────────────┘
//! ```
//! Above R$ 4.800.000 a company must leave the Simples.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::{Money, Rate};

/// Combined Simples rate per bracket, in bps.
pub const SIMPLES_COMBINED_BPS: [u32; 6] = [600, 1120, 1350, 1600, 2100, 3300];

/// ISS share inside the Simples rate per bracket, in bps.
pub const SIMPLES_ISS_BPS: [u32; 6] = [200, 279, 350, 384, 423, 500];

/// Upper revenue bound per bracket, in centavos.
pub const SIMPLES_REVENUE_CEILING_CENTS: [i64; 6] = [
    18_000_000,
    36_000_000,
    72_000_000,
    180_000_000,
    360_000_000,
    480_000_000,
];

/// MEI annual revenue limit, in centavos.
pub const MEI_REVENUE_LIMIT_CENTS: i64 = 8_100_000;

/// MEI may employ at most one person.
pub const MEI_MAX_EMPLOYEES: u32 = 1;

/// Default service list item (LC 116/2003) for maintenance of machines
/// and equipment.
pub const DEFAULT_SERVICE_CODE: &str = "14.01";

// =============================================================================
// Default rate sets
// =============================================================================

/// The six taxes a service invoice can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RateSet {
    pub iss: Rate,
    pub pis: Rate,
    pub cofins: Rate,
    pub csll: Rate,
    pub irpj: Rate,
    pub inss: Rate,
}

impl RateSet {
    pub const ZERO: RateSet = RateSet {
        iss: Rate::zero(),
        pis: Rate::zero(),
        cofins: Rate::zero(),
        csll: Rate::zero(),
        irpj: Rate::zero(),
        inss: Rate::zero(),
    };

    pub fn is_all_zero(&self) -> bool {
        [self.iss, self.pis, self.cofins, self.csll, self.irpj, self.inss]
            .iter()
            .all(Rate::is_zero)
    }
}

/// Usual rates for a Lucro Presumido service provider.
pub const LUCRO_PRESUMIDO_RATES: RateSet = RateSet {
    iss: Rate::from_bps(500),
    pis: Rate::from_bps(65),
    cofins: Rate::from_bps(300),
    csll: Rate::from_bps(900),
    irpj: Rate::from_bps(1500),
    inss: Rate::from_bps(1100),
};

/// Usual rates for a Lucro Real service provider (non-cumulative PIS/COFINS).
pub const LUCRO_REAL_RATES: RateSet = RateSet {
    iss: Rate::from_bps(500),
    pis: Rate::from_bps(165),
    cofins: Rate::from_bps(760),
    csll: Rate::from_bps(900),
    irpj: Rate::from_bps(1500),
    inss: Rate::from_bps(1100),
};

// =============================================================================
// Revenue helpers
// =============================================================================

/// Whether a company qualifies as MEI.
pub fn is_mei_eligible(annual_revenue: Money, employees: u32) -> bool {
    annual_revenue.cents() <= MEI_REVENUE_LIMIT_CENTS && employees <= MEI_MAX_EMPLOYEES
}

// =============================================================================
// Cancellation reasons
// =============================================================================

/// Standard NFS-e cancellation reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    IssuanceError,
    ServiceNotRendered,
    Duplicate,
    FillingError,
}

impl CancellationReason {
    pub const ALL: [CancellationReason; 4] = [
        CancellationReason::IssuanceError,
        CancellationReason::ServiceNotRendered,
        CancellationReason::Duplicate,
        CancellationReason::FillingError,
    ];

    pub fn code(&self) -> u8 {
        match self {
            CancellationReason::IssuanceError => 1,
            CancellationReason::ServiceNotRendered => 2,
            CancellationReason::Duplicate => 3,
            CancellationReason::FillingError => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }

    pub fn description(&self) -> &'static str {
        match self {
            CancellationReason::IssuanceError => "Erro na emissão",
            CancellationReason::ServiceNotRendered => "Serviço não prestado",
            CancellationReason::Duplicate => "Duplicidade da nota",
            CancellationReason::FillingError => "Erro de preenchimento",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_monotonic() {
        assert!(SIMPLES_COMBINED_BPS.windows(2).all(|w| w[0] < w[1]));
        assert!(SIMPLES_ISS_BPS.windows(2).all(|w| w[0] < w[1]));
        assert!(SIMPLES_REVENUE_CEILING_CENTS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_mei_eligibility() {
        assert!(is_mei_eligible(Money::from_cents(8_100_000), 1));
        assert!(!is_mei_eligible(Money::from_cents(8_100_001), 1));
        assert!(!is_mei_eligible(Money::from_cents(5_000_000), 2));
    }

    #[test]
    fn test_cancellation_codes() {
        assert_eq!(CancellationReason::from_code(3), Some(CancellationReason::Duplicate));
        assert_eq!(CancellationReason::from_code(9), None);
        assert_eq!(CancellationReason::ServiceNotRendered.code(), 2);
    }

    #[test]
    fn test_default_sets() {
        assert!(!LUCRO_PRESUMIDO_RATES.is_all_zero());
        assert!(RateSet::ZERO.is_all_zero());
        assert_eq!(LUCRO_REAL_RATES.cofins.bps(), 760);
    }
}
