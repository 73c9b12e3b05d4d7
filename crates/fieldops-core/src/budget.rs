//! # Budget Rules
//!
//! Line totals, budget sums and the invoicing precondition, plus the
//! catalog of suggested items offered when a technician builds a budget.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, Quantity};
use crate::types::{BudgetCategory, BudgetLineItem, RequestStatus};

/// `quantity × unit_price` rounded half-up to the cent, or an error on
/// overflow.
pub fn line_total(quantity: Quantity, unit_price: Money) -> CoreResult<Money> {
    unit_price
        .checked_times(quantity)
        .ok_or_else(|| {
            CoreError::Validation(ValidationError::OutOfRange {
                field: "line_total".to_string(),
                min: 0,
                max: i64::MAX,
            })
        })
}

/// Sum of the line totals.
pub fn budget_total(items: &[BudgetLineItem]) -> Money {
    items.iter().map(BudgetLineItem::total).sum()
}

/// A request can be invoiced once the work is done and there is
/// something to charge.
pub fn ensure_invoiceable(status: RequestStatus, total: Money) -> CoreResult<()> {
    if !status.is_completed() {
        return Err(CoreError::InvalidState {
            entity: "Request".to_string(),
            status: status.to_string(),
            operation: "issue an invoice".to_string(),
        });
    }
    if !total.is_positive() {
        return Err(CoreError::BudgetNotPositive {
            total: total.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Suggestions
// =============================================================================

/// A ready-made budget line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BudgetSuggestion {
    pub description: String,
    pub category: BudgetCategory,
    pub suggested_price: Money,
}

const SUGGESTIONS: &[(&str, BudgetCategory, i64)] = &[
    // preventive
    ("Limpeza completa do ar-condicionado (evaporadora + condensadora)", BudgetCategory::Service, 15_000),
    ("Higienização com produtos antibacterianos", BudgetCategory::Service, 8_000),
    ("Limpeza de filtros e serpentina", BudgetCategory::Service, 10_000),
    ("Verificação e reaperto de conexões elétricas", BudgetCategory::Service, 5_000),
    ("Medição de temperatura e pressão do gás", BudgetCategory::Service, 6_000),
    // corrective
    ("Recarga de gás refrigerante R410A (por kg)", BudgetCategory::Service, 20_000),
    ("Recarga de gás refrigerante R22 (por kg)", BudgetCategory::Service, 18_000),
    ("Correção de vazamento de gás", BudgetCategory::Service, 25_000),
    ("Troca de capacitor", BudgetCategory::Service, 12_000),
    ("Troca de motor do ventilador", BudgetCategory::Service, 35_000),
    ("Troca de compressor", BudgetCategory::Service, 80_000),
    ("Troca de placa eletrônica", BudgetCategory::Service, 45_000),
    ("Desobstrução de dreno", BudgetCategory::Service, 8_000),
    // installation
    ("Instalação completa de split (até 12000 BTUs)", BudgetCategory::Service, 40_000),
    ("Instalação completa de split (18000-24000 BTUs)", BudgetCategory::Service, 50_000),
    ("Instalação completa de split (acima de 24000 BTUs)", BudgetCategory::Service, 65_000),
    ("Desinstalação de ar-condicionado", BudgetCategory::Service, 20_000),
    ("Reinstalação de ar-condicionado", BudgetCategory::Service, 30_000),
    ("Instalação de ponto elétrico dedicado", BudgetCategory::Service, 25_000),
    // materials
    ("Tubulação de cobre (metro)", BudgetCategory::Material, 4_500),
    ("Suporte para condensadora", BudgetCategory::Material, 12_000),
    ("Filtro de ar novo", BudgetCategory::Material, 6_000),
    ("Capacitor de partida", BudgetCategory::Material, 8_000),
    ("Isolamento térmico (metro)", BudgetCategory::Material, 2_500),
    ("Canaleta plástica (metro)", BudgetCategory::Material, 1_500),
    ("Disjuntor dedicado", BudgetCategory::Material, 4_500),
    // labor
    ("Hora técnica adicional", BudgetCategory::Labor, 8_000),
    ("Deslocamento extra (por km)", BudgetCategory::Labor, 300),
    ("Atendimento emergencial (adicional)", BudgetCategory::Labor, 10_000),
    ("Trabalho em altura (adicional)", BudgetCategory::Labor, 15_000),
];

/// The suggestion catalog, in display order.
pub fn suggestions() -> Vec<BudgetSuggestion> {
    SUGGESTIONS
        .iter()
        .map(|&(description, category, cents)| BudgetSuggestion {
            description: description.to_string(),
            category,
            suggested_price: Money::from_cents(cents),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(quantity: i64, unit_price_cents: i64) -> BudgetLineItem {
        BudgetLineItem {
            id: "item".into(),
            request_id: "req".into(),
            description: "Troca de capacitor".into(),
            quantity: Quantity::units(quantity),
            unit_price_cents,
            total_cents: quantity * unit_price_cents,
            category: BudgetCategory::Service,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_line_total() {
        let total = line_total(Quantity::units(3), Money::from_cents(1_250)).unwrap();
        assert_eq!(total.cents(), 3_750);
        assert!(line_total(Quantity::units(2), Money::from_cents(i64::MAX)).is_err());
    }

    #[test]
    fn test_fractional_line_total() {
        // 2,5 m of copper tubing at R$ 45,00 the metre
        let tubing = line_total(Quantity::from_milli(2_500), Money::from_cents(4_500)).unwrap();
        assert_eq!(tubing.cents(), 11_250);

        // 1,333 kg of R410A at R$ 200,00 the kg = 266,60
        let gas = line_total(Quantity::from_milli(1_333), Money::from_cents(20_000)).unwrap();
        assert_eq!(gas.cents(), 26_660);

        // 0,005 × R$ 1,00 = 0,005 → 0,01
        let tiny = line_total(Quantity::from_milli(5), Money::from_cents(100)).unwrap();
        assert_eq!(tiny.cents(), 1);
    }

    #[test]
    fn test_budget_total() {
        let items = [item(2, 4_500), item(1, 12_000)];
        assert_eq!(budget_total(&items).cents(), 21_000);
        assert!(budget_total(&[]).is_zero());
    }

    #[test]
    fn test_invoiceable_requires_completed_set() {
        let total = Money::from_cents(100);
        assert!(ensure_invoiceable(RequestStatus::Completed, total).is_ok());
        assert!(ensure_invoiceable(RequestStatus::Confirmed, total).is_ok());
        assert!(ensure_invoiceable(RequestStatus::InProgress, total).is_err());
    }

    #[test]
    fn test_invoiceable_requires_positive_total() {
        assert!(matches!(
            ensure_invoiceable(RequestStatus::Completed, Money::zero()),
            Err(CoreError::BudgetNotPositive { .. })
        ));
    }

    #[test]
    fn test_suggestions_cover_every_category() {
        let list = suggestions();
        assert_eq!(list.len(), SUGGESTIONS.len());
        for category in [BudgetCategory::Service, BudgetCategory::Material, BudgetCategory::Labor] {
            assert!(list.iter().any(|s| s.category == category));
        }
        assert!(list.iter().all(|s| s.suggested_price.is_positive()));
    }
}
