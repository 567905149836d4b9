//! Quotation lines and totals.

use serde::{Deserialize, Serialize};

use quoteflow_core::DomainError;
use quoteflow_inventory::InventoryItemId;

/// A line as submitted by the caller (totals not yet computed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuotationItem {
    pub inventory_item_id: InventoryItemId,
    pub description: String,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: i64,
}

/// A priced quotation line. `total == quantity * unit_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationItem {
    pub line_no: u32,
    pub inventory_item_id: InventoryItemId,
    pub description: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub total: i64,
}

impl QuotationItem {
    /// Price and number submitted lines. Zero-quantity lines are kept (they
    /// are dropped only when a sale is materialized).
    pub fn price_lines(items: &[NewQuotationItem]) -> Result<Vec<QuotationItem>, DomainError> {
        items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                if item.quantity < 0 {
                    return Err(DomainError::validation(format!(
                        "line {}: quantity cannot be negative",
                        idx + 1
                    )));
                }
                if item.unit_price < 0 {
                    return Err(DomainError::validation(format!(
                        "line {}: unit price cannot be negative",
                        idx + 1
                    )));
                }
                let total = item.quantity.checked_mul(item.unit_price).ok_or_else(|| {
                    DomainError::validation(format!("line {}: total overflows", idx + 1))
                })?;

                Ok(QuotationItem {
                    line_no: idx as u32 + 1,
                    inventory_item_id: item.inventory_item_id,
                    description: item.description.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    total,
                })
            })
            .collect()
    }
}

/// Document totals: `total == subtotal + tax_amount - discount_amount`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: i64,
    pub tax_amount: i64,
    pub discount_amount: i64,
    pub total: i64,
}

impl Totals {
    pub fn compute<'a>(
        items: impl IntoIterator<Item = &'a QuotationItem>,
        tax_amount: i64,
        discount_amount: i64,
    ) -> Result<Self, DomainError> {
        if tax_amount < 0 || discount_amount < 0 {
            return Err(DomainError::validation(
                "tax and discount amounts cannot be negative",
            ));
        }

        let subtotal = items
            .into_iter()
            .try_fold(0i64, |acc, item| acc.checked_add(item.total))
            .ok_or_else(|| DomainError::validation("subtotal overflows"))?;

        let total = subtotal
            .checked_add(tax_amount)
            .and_then(|t| t.checked_sub(discount_amount))
            .ok_or_else(|| DomainError::validation("total overflows"))?;
        if total < 0 {
            return Err(DomainError::validation("discount exceeds subtotal plus tax"));
        }

        Ok(Self {
            subtotal,
            tax_amount,
            discount_amount,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i64, unit_price: i64) -> NewQuotationItem {
        NewQuotationItem {
            inventory_item_id: InventoryItemId::for_code("X", None),
            description: "x".to_string(),
            quantity,
            unit_price,
        }
    }

    #[test]
    fn totals_follow_line_prices() {
        let items = QuotationItem::price_lines(&[line(3, 1_000), line(2, 500)]).unwrap();
        let totals = Totals::compute(&items, 200, 100).unwrap();

        assert_eq!(items[0].total, 3_000);
        assert_eq!(items[1].line_no, 2);
        assert_eq!(totals.subtotal, 4_000);
        assert_eq!(totals.total, 4_100);
    }

    #[test]
    fn negative_values_are_rejected() {
        assert!(QuotationItem::price_lines(&[line(-1, 10)]).is_err());
        assert!(QuotationItem::price_lines(&[line(1, -10)]).is_err());
        assert!(Totals::compute(std::iter::empty(), -1, 0).is_err());
    }

    #[test]
    fn discount_cannot_push_total_below_zero() {
        let items = QuotationItem::price_lines(&[line(1, 100)]).unwrap();
        assert!(Totals::compute(&items, 0, 101).is_err());
        assert_eq!(Totals::compute(&items, 0, 100).unwrap().total, 0);
    }

    #[test]
    fn overflowing_total_is_rejected() {
        let items = QuotationItem::price_lines(&[line(1, i64::MAX)]).unwrap();
        let err = Totals::compute(&items, 1, 0).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
