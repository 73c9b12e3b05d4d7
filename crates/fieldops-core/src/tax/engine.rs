//! # Tax Calculation Engine
//!
//! Maps (gross, deductions, fiscal configuration) to an itemized breakdown.
//! Pure and deterministic: the same inputs always give the same centavos.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. gross <= 0 → ValidationError                                        │
//! │     base = gross - deductions                                           │
//! │                                                                         │
//! │  2. match regime                                                        │
//! │     ├── Mei              → all zero, DAS-inclusive                     │
//! │     ├── SimplesNacional  → all zero, report bracket combined + ISS     │
//! │     │                      share (informational, paid via DAS)         │
//! │     ├── LucroPresumido   ┐                                              │
//! │     ├── LucroReal        ┴→ ISS always, others only when withheld      │
//! │     └── Imune / Isento   → all zero + note                             │
//! │                                                                         │
//! │  3. total_taxes = Σ included amounts                                    │
//! │     net         = base - total_taxes                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tax is rounded half-up to the centavo on its own before summing, so
//! the total always equals the sum of the printed lines.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{FiscalConfiguration, TaxLine, TaxRegime};
use crate::error::ValidationError;
use crate::money::{Money, Rate};
use crate::validation::ValidationResult;

// =============================================================================
// Breakdown Types
// =============================================================================

/// One computed tax line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxAmount {
    pub rate: Rate,
    /// Amount that counts towards `total_taxes`. Zero when the tax is not
    /// charged on this invoice.
    pub amount: Money,
    pub withheld: bool,
}

impl TaxAmount {
    fn charged(base: Money, line: TaxLine) -> Self {
        TaxAmount {
            rate: line.rate,
            amount: base.apply_rate(line.rate),
            withheld: line.withheld,
        }
    }

    /// Reported rate, nothing charged.
    fn informational(line: TaxLine) -> Self {
        TaxAmount {
            rate: line.rate,
            amount: Money::zero(),
            withheld: line.withheld,
        }
    }

    fn only_if_withheld(base: Money, line: TaxLine) -> Self {
        if line.withheld {
            TaxAmount::charged(base, line)
        } else {
            TaxAmount::informational(line)
        }
    }
}

/// Simples Nacional figures for the invoice footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SimplesShare {
    pub bracket: u8,
    pub combined_rate: Rate,
    pub iss_rate: Rate,
    /// `base × combined_rate`. Paid through the DAS, not part of the total.
    pub amount: Money,
}

/// Itemized result of a tax calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxBreakdown {
    pub regime: TaxRegime,
    pub gross: Money,
    pub deductions: Money,
    pub base: Money,

    pub iss: TaxAmount,
    pub pis: TaxAmount,
    pub cofins: TaxAmount,
    pub csll: TaxAmount,
    pub irpj: TaxAmount,
    pub inss: TaxAmount,

    pub simples: Option<SimplesShare>,
    /// Taxes are collected through the unified DAS payment.
    pub das_inclusive: bool,

    pub total_taxes: Money,
    pub net: Money,
    pub notes: Vec<String>,
}

impl TaxBreakdown {
    fn zeroed(regime: TaxRegime, gross: Money, deductions: Money) -> Self {
        TaxBreakdown {
            regime,
            gross,
            deductions,
            base: gross - deductions,
            iss: TaxAmount::default(),
            pis: TaxAmount::default(),
            cofins: TaxAmount::default(),
            csll: TaxAmount::default(),
            irpj: TaxAmount::default(),
            inss: TaxAmount::default(),
            simples: None,
            das_inclusive: false,
            total_taxes: Money::zero(),
            net: gross - deductions,
            notes: Vec::new(),
        }
    }

    fn lines(&self) -> [TaxAmount; 6] {
        [self.iss, self.pis, self.cofins, self.csll, self.irpj, self.inss]
    }

    fn finish(mut self) -> Self {
        self.total_taxes = self.lines().iter().map(|t| t.amount).sum();
        self.net = self.base - self.total_taxes;
        self
    }

    /// One-line summary for audit messages.
    pub fn summary(&self) -> String {
        format!(
            "regime {}, ISS {}, total taxes {}",
            self.regime.label(),
            self.iss.rate,
            self.total_taxes
        )
    }
}

// =============================================================================
// Calculation
// =============================================================================

/// Calculates the taxes of a service invoice.
///
/// ## Errors
/// - `gross <= 0`
/// - `deductions < 0` or `deductions > gross`
///
/// ## Example
/// ```rust
/// use fieldops_core::money::Money;
/// use fieldops_core::tax::{calculate, FiscalConfiguration, TaxRegime};
///
/// let config = FiscalConfiguration::suggested("provider-1", TaxRegime::LucroPresumido);
/// let breakdown = calculate(Money::from_cents(100_000), Money::zero(), &config).unwrap();
/// assert_eq!(breakdown.total_taxes.cents(), 43_650);
/// assert_eq!(breakdown.net.cents(), 56_350);
/// ```
pub fn calculate(
    gross: Money,
    deductions: Money,
    config: &FiscalConfiguration,
) -> ValidationResult<TaxBreakdown> {
    if !gross.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "gross".to_string(),
        });
    }
    if deductions.is_negative() || deductions > gross {
        return Err(ValidationError::OutOfRange {
            field: "deductions".to_string(),
            min: 0,
            max: gross.cents(),
        });
    }

    let breakdown = TaxBreakdown::zeroed(config.regime, gross, deductions);

    let breakdown = match config.regime {
        TaxRegime::Mei => mei(breakdown),
        TaxRegime::SimplesNacional => simples_nacional(breakdown, config),
        TaxRegime::LucroPresumido | TaxRegime::LucroReal => lucro(breakdown, config),
        TaxRegime::Imune | TaxRegime::Isento => exempt(breakdown),
    };

    Ok(breakdown.finish())
}

fn mei(mut b: TaxBreakdown) -> TaxBreakdown {
    b.das_inclusive = true;
    b.notes
        .push("MEI: taxes are paid through the fixed monthly DAS".to_string());
    b
}

fn simples_nacional(mut b: TaxBreakdown, config: &FiscalConfiguration) -> TaxBreakdown {
    let bracket = config.simples_bracket;
    let combined_rate = bracket.combined_rate();

    b.iss = TaxAmount {
        rate: bracket.iss_rate(),
        amount: Money::zero(),
        withheld: config.iss.withheld,
    };
    b.simples = Some(SimplesShare {
        bracket: bracket.number(),
        combined_rate,
        iss_rate: bracket.iss_rate(),
        amount: b.base.apply_rate(combined_rate),
    });
    b.das_inclusive = true;
    b.notes.push(format!(
        "Simples Nacional {}: combined rate {} paid through DAS",
        bracket.description(),
        combined_rate
    ));
    b
}

fn lucro(mut b: TaxBreakdown, config: &FiscalConfiguration) -> TaxBreakdown {
    let defaulted;
    let config = if config.rates().is_all_zero() {
        defaulted = FiscalConfiguration::suggested(config.provider_id.clone(), config.regime);
        b.notes.push(format!(
            "No rates configured; usual {} rates applied",
            config.regime.label()
        ));
        &defaulted
    } else {
        config
    };

    b.iss = TaxAmount::charged(b.base, config.iss);
    b.pis = TaxAmount::only_if_withheld(b.base, config.pis);
    b.cofins = TaxAmount::only_if_withheld(b.base, config.cofins);
    b.csll = TaxAmount::only_if_withheld(b.base, config.csll);
    b.irpj = TaxAmount::only_if_withheld(b.base, config.irpj);
    b.inss = TaxAmount::only_if_withheld(b.base, config.inss);
    b
}

fn exempt(mut b: TaxBreakdown) -> TaxBreakdown {
    let note = match b.regime {
        TaxRegime::Imune => "Imune: service not subject to taxation (constitutional immunity)",
        _ => "Isento: service exempt from taxation",
    };
    b.notes.push(note.to_string());
    b
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::SimplesBracket;

    fn reais(value: i64) -> Money {
        Money::from_cents(value * 100)
    }

    fn config(regime: TaxRegime) -> FiscalConfiguration {
        FiscalConfiguration::suggested("provider-1", regime)
    }

    #[test]
    fn test_gross_must_be_positive() {
        let cfg = config(TaxRegime::LucroPresumido);
        assert!(calculate(Money::zero(), Money::zero(), &cfg).is_err());
        assert!(calculate(reais(-10), Money::zero(), &cfg).is_err());
    }

    #[test]
    fn test_deductions_bounds() {
        let cfg = config(TaxRegime::LucroPresumido);
        assert!(calculate(reais(100), reais(101), &cfg).is_err());
        assert!(calculate(reais(100), Money::from_cents(-1), &cfg).is_err());
        assert!(calculate(reais(100), reais(100), &cfg).is_ok());
    }

    #[test]
    fn test_lucro_presumido_with_default_rates() {
        let b = calculate(reais(1000), Money::zero(), &config(TaxRegime::LucroPresumido)).unwrap();

        assert_eq!(b.iss.amount, reais(50));
        assert_eq!(b.pis.amount.cents(), 650);
        assert_eq!(b.cofins.amount, reais(30));
        assert_eq!(b.csll.amount, reais(90));
        assert_eq!(b.irpj.amount, reais(150));
        assert_eq!(b.inss.amount, reais(110));
        assert_eq!(b.total_taxes.cents(), 43_650);
        assert_eq!(b.net.cents(), 56_350);
        assert!(!b.das_inclusive);
    }

    #[test]
    fn test_lucro_presumido_only_withheld_taxes_count() {
        let mut cfg = config(TaxRegime::LucroPresumido);
        cfg.pis.withheld = false;
        cfg.cofins.withheld = false;
        cfg.csll.withheld = false;
        cfg.irpj.withheld = false;
        cfg.inss.withheld = false;

        let b = calculate(reais(1000), Money::zero(), &cfg).unwrap();
        // ISS is always charged
        assert_eq!(b.total_taxes, reais(50));
        assert_eq!(b.net, reais(950));
        assert_eq!(b.pis.rate.bps(), 65);
        assert!(b.pis.amount.is_zero());
    }

    #[test]
    fn test_lucro_real_rates() {
        let b = calculate(reais(1000), Money::zero(), &config(TaxRegime::LucroReal)).unwrap();
        assert_eq!(b.pis.amount.cents(), 1_650);
        assert_eq!(b.cofins.amount.cents(), 7_600);
        // 50 + 16.50 + 76 + 90 + 150 + 110
        assert_eq!(b.total_taxes.cents(), 49_250);
    }

    #[test]
    fn test_unconfigured_lucro_never_zero() {
        let mut cfg = config(TaxRegime::Mei);
        cfg.regime = TaxRegime::LucroPresumido;

        let b = calculate(reais(1000), Money::zero(), &cfg).unwrap();
        assert_eq!(b.total_taxes.cents(), 43_650);
        assert_eq!(b.notes.len(), 1);
    }

    #[test]
    fn test_deductions_reduce_base() {
        let b = calculate(reais(1000), reais(200), &config(TaxRegime::LucroPresumido)).unwrap();
        assert_eq!(b.base, reais(800));
        assert_eq!(b.iss.amount, reais(40));
        assert_eq!(b.net, b.base - b.total_taxes);
    }

    #[test]
    fn test_simples_first_bracket() {
        let b = calculate(reais(1000), Money::zero(), &config(TaxRegime::SimplesNacional)).unwrap();

        let simples = b.simples.unwrap();
        assert_eq!(simples.combined_rate.bps(), 600);
        assert_eq!(simples.iss_rate.bps(), 200);
        assert_eq!(simples.amount, reais(60));

        for line in [b.iss, b.pis, b.cofins, b.csll, b.irpj] {
            assert!(line.amount.is_zero());
        }
        assert!(b.total_taxes.is_zero());
        assert_eq!(b.net, reais(1000));
        assert!(b.das_inclusive);
    }

    #[test]
    fn test_simples_higher_bracket() {
        let mut cfg = config(TaxRegime::SimplesNacional);
        cfg.simples_bracket = SimplesBracket::new(2).unwrap();

        let b = calculate(reais(1000), Money::zero(), &cfg).unwrap();
        let simples = b.simples.unwrap();
        assert_eq!(simples.combined_rate.bps(), 1120);
        assert_eq!(simples.iss_rate.bps(), 279);
        assert_eq!(b.iss.rate.bps(), 279);
    }

    #[test]
    fn test_mei_is_das_inclusive() {
        let b = calculate(reais(500), Money::zero(), &config(TaxRegime::Mei)).unwrap();
        assert!(b.das_inclusive);
        assert!(b.total_taxes.is_zero());
        assert_eq!(b.net, reais(500));
    }

    #[test]
    fn test_exempt_regimes_carry_note() {
        for regime in [TaxRegime::Imune, TaxRegime::Isento] {
            let b = calculate(reais(500), Money::zero(), &config(regime)).unwrap();
            assert!(b.total_taxes.is_zero());
            assert_eq!(b.notes.len(), 1);
        }
    }

    #[test]
    fn test_per_tax_rounding() {
        // 0,65% of 10,01 = 0,065065 → 0,07
        let b = calculate(Money::from_cents(1_001), Money::zero(), &config(TaxRegime::LucroPresumido))
            .unwrap();
        assert_eq!(b.pis.amount.cents(), 7);
        let sum: Money = [b.iss, b.pis, b.cofins, b.csll, b.irpj, b.inss]
            .iter()
            .map(|t| t.amount)
            .sum();
        assert_eq!(sum, b.total_taxes);
    }

    #[test]
    fn test_summary() {
        let b = calculate(reais(1000), Money::zero(), &config(TaxRegime::LucroPresumido)).unwrap();
        assert_eq!(b.summary(), "regime Lucro Presumido, ISS 5.00%, total taxes R$ 436,50");
    }
}
