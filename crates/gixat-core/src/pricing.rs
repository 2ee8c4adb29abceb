//! Money, stock and labor arithmetic

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{JobItem, LaborEntry, LaborSummary};
use crate::{Error, Result};

/// Card-level totals rolled up from its items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardTotals {
    pub estimated_labor: Decimal,
    pub estimated_parts: Decimal,
    pub estimated_cost: Decimal,
    pub actual_labor: Decimal,
    pub actual_parts: Decimal,
    pub actual_cost: Decimal,
}

pub fn card_totals(items: &[JobItem]) -> CardTotals {
    let mut totals = items.iter().fold(CardTotals::default(), |mut t, item| {
        t.estimated_labor += item.estimated_labor_cost;
        t.estimated_parts += item.estimated_parts_cost;
        t.actual_labor += item.actual_labor_cost;
        t.actual_parts += item.actual_parts_cost;
        t
    });
    totals.estimated_cost = totals.estimated_labor + totals.estimated_parts;
    totals.actual_cost = totals.actual_labor + totals.actual_parts;
    totals
}

/// `(total, final)` price of a part line
pub fn part_prices(quantity: Decimal, unit_price: Decimal, discount: Decimal) -> (Decimal, Decimal) {
    let total = quantity * unit_price;
    (total, total - discount)
}

/// Stock-relevant state of a part line: whether it is actual, and its quantity
pub type PartState = (bool, Decimal);

/// Quantity to take out of stock when a part line moves from `before` to
/// `after`. Negative values are returned to stock. `None` means the line does
/// not exist on that side (added or removed).
pub fn part_stock_delta(before: Option<PartState>, after: Option<PartState>) -> Decimal {
    let held = |state: Option<PartState>| match state {
        Some((true, quantity)) => quantity,
        _ => Decimal::ZERO,
    };
    held(after) - held(before)
}

/// # Errors
/// - `Error::BusinessRule` (`InsufficientStock`) when `required` exceeds `available`
pub fn ensure_stock(name: &str, available: Decimal, required: Decimal) -> Result<()> {
    if required > available {
        return Err(Error::rule(
            "InsufficientStock",
            format!(
                "Insufficient stock for '{}'. Available: {}, Required: {}",
                name,
                available.normalize(),
                required.normalize()
            ),
        ));
    }
    Ok(())
}

/// New stock level after a manual adjustment
pub fn adjusted_quantity(current: Decimal, adjustment: Decimal) -> Result<Decimal> {
    let next = current + adjustment;
    if next.is_sign_negative() && !next.is_zero() {
        return Err(Error::rule(
            "NegativeStock",
            format!(
                "Cannot adjust inventory. Resulting quantity would be negative ({}).",
                next.normalize()
            ),
        ));
    }
    Ok(next)
}

/// Hours between two instants, rounded to two decimals. Zero while open.
pub fn hours_between(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Decimal {
    let Some(end) = end else {
        return Decimal::ZERO;
    };
    let seconds = (end - start).num_seconds();
    (Decimal::from(seconds) / Decimal::from(3600))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn labor_cost(hours: Decimal, rate: Decimal) -> Decimal {
    hours * rate
}

/// Roll up labor entries into estimated and actual buckets
pub fn labor_summary(entries: &[LaborEntry]) -> LaborSummary {
    let mut summary = LaborSummary {
        entry_count: entries.len() as i64,
        ..Default::default()
    };
    for entry in entries {
        if entry.is_actual {
            summary.total_actual_hours += entry.hours_worked;
            summary.total_actual_cost += entry.total_cost;
        } else {
            summary.total_estimated_hours += entry.hours_worked;
            summary.total_estimated_cost += entry.total_cost;
        }
    }
    summary
}
