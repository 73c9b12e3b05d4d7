//! # Tax Module
//!
//! Fiscal configuration, rule tables and the tax calculation engine.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   FiscalConfiguration (this file)    tables.rs                         │
//! │   ├── regime: TaxRegime              ├── Simples brackets              │
//! │   ├── simples_bracket                ├── Lucro Presumido / Real rates  │
//! │   └── iss / pis / ... : TaxLine      └── cancellation reasons          │
//! │              │                               │                          │
//! │              └──────────────┬────────────────┘                          │
//! │                             ▼                                           │
//! │                   engine::calculate(gross, deductions, &config)        │
//! │                             │                                           │
//! │                             ▼                                           │
//! │                       TaxBreakdown                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod tables;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{Money, Rate};
use crate::validation::{validate_rate, ValidationResult};

pub use engine::{calculate, SimplesShare, TaxAmount, TaxBreakdown};
pub use tables::{is_mei_eligible, CancellationReason, RateSet};

// =============================================================================
// Tax Regime
// =============================================================================

/// Brazilian tax regime of the service provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TaxRegime {
    /// Microempreendedor Individual: taxes paid as a fixed monthly DAS.
    Mei,
    /// Unified regime: one combined rate per revenue bracket, paid via DAS.
    SimplesNacional,
    LucroPresumido,
    LucroReal,
    /// Constitutional immunity.
    Imune,
    /// Exempt by law.
    Isento,
}

impl TaxRegime {
    pub const ALL: [TaxRegime; 6] = [
        TaxRegime::Mei,
        TaxRegime::SimplesNacional,
        TaxRegime::LucroPresumido,
        TaxRegime::LucroReal,
        TaxRegime::Imune,
        TaxRegime::Isento,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxRegime::Mei => "mei",
            TaxRegime::SimplesNacional => "simples_nacional",
            TaxRegime::LucroPresumido => "lucro_presumido",
            TaxRegime::LucroReal => "lucro_real",
            TaxRegime::Imune => "imune",
            TaxRegime::Isento => "isento",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaxRegime::Mei => "MEI",
            TaxRegime::SimplesNacional => "Simples Nacional",
            TaxRegime::LucroPresumido => "Lucro Presumido",
            TaxRegime::LucroReal => "Lucro Real",
            TaxRegime::Imune => "Imune",
            TaxRegime::Isento => "Isento",
        }
    }

    /// Parses a regime name, falling back to Lucro Presumido.
    ///
    /// An unknown or empty regime must never produce a zero-tax invoice, so
    /// the fallback is the fully taxed path.
    pub fn parse_or_default(value: &str) -> TaxRegime {
        value.parse().unwrap_or_else(|_| {
            warn!(regime = %value, "Unknown tax regime, falling back to lucro_presumido");
            TaxRegime::LucroPresumido
        })
    }
}

impl Default for TaxRegime {
    fn default() -> Self {
        TaxRegime::LucroPresumido
    }
}

impl fmt::Display for TaxRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaxRegime {
    type Err = ValidationError;

    /// Accepts both `simples_nacional` and the upper-case `SIMPLES_NACIONAL`
    /// spelling used by municipal integrations.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        TaxRegime::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "regime".to_string(),
                allowed: TaxRegime::ALL.iter().map(|r| r.to_string()).collect(),
            })
    }
}

/// Entry of the regime picker shown during fiscal setup.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct RegimeInfo {
    pub regime: TaxRegime,
    pub label: String,
    pub description: String,
}

/// All regimes with a short description.
pub fn regime_catalog() -> Vec<RegimeInfo> {
    TaxRegime::ALL
        .into_iter()
        .map(|regime| RegimeInfo {
            regime,
            label: regime.label().to_string(),
            description: match regime {
                TaxRegime::Mei => "Revenue up to R$ 81.000/year, taxes paid via fixed DAS",
                TaxRegime::SimplesNacional => "Unified rate by revenue bracket, paid via DAS",
                TaxRegime::LucroPresumido => "Taxes on presumed profit, usual withholdings apply",
                TaxRegime::LucroReal => "Taxes on actual profit, non-cumulative PIS/COFINS",
                TaxRegime::Imune => "Constitutionally immune from taxes on services",
                TaxRegime::Isento => "Exempt from taxes on services",
            }
            .to_string(),
        })
        .collect()
}

// =============================================================================
// Simples Bracket
// =============================================================================

/// Simples Nacional revenue bracket ("faixa"), 1 through 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SimplesBracket(u8);

impl SimplesBracket {
    pub const FIRST: SimplesBracket = SimplesBracket(1);

    pub fn new(bracket: u8) -> ValidationResult<Self> {
        if (1..=6).contains(&bracket) {
            Ok(SimplesBracket(bracket))
        } else {
            Err(ValidationError::OutOfRange {
                field: "simples_bracket".to_string(),
                min: 1,
                max: 6,
            })
        }
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    fn index(&self) -> usize {
        (self.0 - 1) as usize
    }

    /// Combined Simples rate (all federal, state and municipal taxes).
    pub fn combined_rate(&self) -> Rate {
        Rate::from_bps(tables::SIMPLES_COMBINED_BPS[self.index()])
    }

    /// ISS share within the combined rate, for display on the invoice.
    pub fn iss_rate(&self) -> Rate {
        Rate::from_bps(tables::SIMPLES_ISS_BPS[self.index()])
    }

    pub fn revenue_ceiling(&self) -> Money {
        Money::from_cents(tables::SIMPLES_REVENUE_CEILING_CENTS[self.index()])
    }

    /// Bracket for the gross revenue of the last 12 months.
    ///
    /// `None` when the revenue exceeds the Simples limit.
    pub fn for_annual_revenue(revenue: Money) -> Option<SimplesBracket> {
        tables::SIMPLES_REVENUE_CEILING_CENTS
            .iter()
            .position(|&ceiling| revenue.cents() <= ceiling)
            .map(|i| SimplesBracket(i as u8 + 1))
    }

    pub fn description(&self) -> String {
        let floor = match self.0 {
            1 => Money::zero(),
            n => SimplesBracket(n - 1).revenue_ceiling(),
        };
        format!(
            "Faixa {} ({} a {})",
            self.0,
            floor,
            self.revenue_ceiling()
        )
    }
}

impl Default for SimplesBracket {
    fn default() -> Self {
        SimplesBracket::FIRST
    }
}

impl TryFrom<u8> for SimplesBracket {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SimplesBracket::new(value)
    }
}

impl From<SimplesBracket> for u8 {
    fn from(bracket: SimplesBracket) -> u8 {
        bracket.0
    }
}

// =============================================================================
// Fiscal Environment
// =============================================================================

/// Which authority endpoint invoices go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FiscalEnvironment {
    Production,
    /// Test endpoint; documents have no legal value.
    Homologation,
}

impl Default for FiscalEnvironment {
    fn default() -> Self {
        FiscalEnvironment::Homologation
    }
}

// =============================================================================
// Fiscal Configuration
// =============================================================================

/// One tax of the configuration: its rate and whether the recipient
/// withholds it at source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxLine {
    pub rate: Rate,
    pub withheld: bool,
}

impl TaxLine {
    pub const fn new(rate: Rate, withheld: bool) -> Self {
        TaxLine { rate, withheld }
    }
}

/// Per-provider tax settings. At most one exists per provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FiscalConfiguration {
    pub provider_id: String,
    pub regime: TaxRegime,
    #[serde(default)]
    #[ts(as = "u8")]
    pub simples_bracket: SimplesBracket,

    /// Default ISS rate; `withheld` means the recipient retains it.
    pub iss: TaxLine,
    pub pis: TaxLine,
    pub cofins: TaxLine,
    pub csll: TaxLine,
    pub irpj: TaxLine,
    pub inss: TaxLine,

    /// Municipal service code printed on the invoice.
    pub service_code: Option<String>,
    /// LC 116/2003 service list item.
    pub service_list_item: Option<String>,
    pub cnae: Option<String>,
    pub municipal_registration: Option<String>,
    /// IBGE municipality code.
    pub municipality_code: Option<String>,
    #[serde(default)]
    pub environment: FiscalEnvironment,
}

impl FiscalConfiguration {
    /// A configuration pre-filled with the usual values for `regime`.
    pub fn suggested(provider_id: impl Into<String>, regime: TaxRegime) -> Self {
        let (rates, withheld) = match regime {
            TaxRegime::LucroPresumido => (tables::LUCRO_PRESUMIDO_RATES, true),
            TaxRegime::LucroReal => (tables::LUCRO_REAL_RATES, true),
            _ => (RateSet::ZERO, false),
        };

        FiscalConfiguration {
            provider_id: provider_id.into(),
            regime,
            simples_bracket: SimplesBracket::FIRST,
            iss: TaxLine::new(rates.iss, false),
            pis: TaxLine::new(rates.pis, withheld),
            cofins: TaxLine::new(rates.cofins, withheld),
            csll: TaxLine::new(rates.csll, withheld),
            irpj: TaxLine::new(rates.irpj, withheld),
            inss: TaxLine::new(rates.inss, withheld),
            service_code: Some(tables::DEFAULT_SERVICE_CODE.to_string()),
            service_list_item: Some(tables::DEFAULT_SERVICE_CODE.to_string()),
            cnae: None,
            municipal_registration: None,
            municipality_code: None,
            environment: FiscalEnvironment::Homologation,
        }
    }

    pub fn rates(&self) -> RateSet {
        RateSet {
            iss: self.iss.rate,
            pis: self.pis.rate,
            cofins: self.cofins.rate,
            csll: self.csll.rate,
            irpj: self.irpj.rate,
            inss: self.inss.rate,
        }
    }

    /// Checks every rate is within 0..=100%.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.provider_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "provider_id".to_string(),
            });
        }

        let lines = [
            ("iss_rate", self.iss),
            ("pis_rate", self.pis),
            ("cofins_rate", self.cofins),
            ("csll_rate", self.csll),
            ("irpj_rate", self.irpj),
            ("inss_rate", self.inss),
        ];
        for (field, line) in lines {
            validate_rate(field, line.rate)?;
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regime_parsing() {
        assert_eq!("SIMPLES_NACIONAL".parse::<TaxRegime>().unwrap(), TaxRegime::SimplesNacional);
        assert_eq!("mei".parse::<TaxRegime>().unwrap(), TaxRegime::Mei);
        assert!("".parse::<TaxRegime>().is_err());
    }

    #[test]
    fn test_unknown_regime_falls_back_to_presumido() {
        assert_eq!(TaxRegime::parse_or_default("LUCRO_FICTICIO"), TaxRegime::LucroPresumido);
        assert_eq!(TaxRegime::parse_or_default(""), TaxRegime::LucroPresumido);
        assert_eq!(TaxRegime::parse_or_default("imune"), TaxRegime::Imune);
    }

    #[test]
    fn test_bracket_rates() {
        let first = SimplesBracket::new(1).unwrap();
        assert_eq!(first.combined_rate().bps(), 600);
        assert_eq!(first.iss_rate().bps(), 200);

        let sixth = SimplesBracket::new(6).unwrap();
        assert_eq!(sixth.combined_rate().bps(), 3300);
        assert_eq!(sixth.iss_rate().bps(), 500);

        assert!(SimplesBracket::new(0).is_err());
        assert!(SimplesBracket::new(7).is_err());
    }

    #[test]
    fn test_bracket_from_revenue() {
        let bracket = |reais: i64| {
            SimplesBracket::for_annual_revenue(Money::from_cents(reais * 100)).map(|b| b.number())
        };
        assert_eq!(bracket(120_000), Some(1));
        assert_eq!(bracket(180_000), Some(1));
        assert_eq!(bracket(180_001), Some(2));
        assert_eq!(bracket(1_000_000), Some(4));
        assert_eq!(bracket(4_800_000), Some(6));
        assert_eq!(bracket(4_800_001), None);
    }

    #[test]
    fn test_bracket_description() {
        let d = SimplesBracket::new(2).unwrap().description();
        assert_eq!(d, "Faixa 2 (R$ 180000,00 a R$ 360000,00)");
    }

    #[test]
    fn test_bracket_serde() {
        let bracket: SimplesBracket = serde_json::from_str("3").unwrap();
        assert_eq!(bracket.number(), 3);
        assert!(serde_json::from_str::<SimplesBracket>("9").is_err());
    }

    #[test]
    fn test_suggested_presumido() {
        let config = FiscalConfiguration::suggested("p1", TaxRegime::LucroPresumido);
        assert_eq!(config.iss.rate.bps(), 500);
        assert_eq!(config.pis.rate.bps(), 65);
        assert!(config.inss.withheld);
        assert!(!config.iss.withheld);
        assert_eq!(config.environment, FiscalEnvironment::Homologation);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_suggested_simples_has_no_rates() {
        let config = FiscalConfiguration::suggested("p1", TaxRegime::SimplesNacional);
        assert!(config.rates().is_all_zero());
    }

    #[test]
    fn test_validate_rejects_rate_above_100_percent() {
        let mut config = FiscalConfiguration::suggested("p1", TaxRegime::LucroReal);
        config.irpj.rate = Rate::from_bps(10_001);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_catalog_lists_every_regime() {
        assert_eq!(regime_catalog().len(), TaxRegime::ALL.len());
    }
}
