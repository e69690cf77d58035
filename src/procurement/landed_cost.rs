//! Landed cost of imported goods.
//!
//! The landed cost of an order is its value converted to the home currency
//! plus every import expense. Expenses are spread over the order lines in
//! proportion to quantity, and the resulting per-unit cost is written back
//! to each item.

use bigdecimal::BigDecimal;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::procurement::purchase_order::PurchaseOrder;
use crate::tax::gst::round_money;
use crate::traits::ErpStorage;
use crate::types::*;
use crate::utils::validation::{validate_non_negative, validate_positive_amount};

/// Import expenses in the home currency
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportCharges {
    pub freight: BigDecimal,
    pub customs_duty: BigDecimal,
    /// Customs house agent fees
    pub cha: BigDecimal,
    /// Container freight station fees
    pub cfs: BigDecimal,
    pub insurance: BigDecimal,
    pub local_transport: BigDecimal,
    pub commission: BigDecimal,
    pub misc: BigDecimal,
}

impl ImportCharges {
    pub fn total(&self) -> BigDecimal {
        &self.freight
            + &self.customs_duty
            + &self.cha
            + &self.cfs
            + &self.insurance
            + &self.local_transport
            + &self.commission
            + &self.misc
    }

    fn validate(&self) -> ErpResult<()> {
        validate_non_negative("Freight", &self.freight)?;
        validate_non_negative("Customs duty", &self.customs_duty)?;
        validate_non_negative("CHA charges", &self.cha)?;
        validate_non_negative("CFS charges", &self.cfs)?;
        validate_non_negative("Insurance", &self.insurance)?;
        validate_non_negative("Local transport", &self.local_transport)?;
        validate_non_negative("Commission", &self.commission)?;
        validate_non_negative("Miscellaneous charges", &self.misc)
    }
}

/// Per-unit landed cost of one order line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemLandedCost {
    pub item_id: Option<String>,
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub landed_cost_per_unit: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandedCost {
    pub id: String,
    pub po_id: String,
    pub po_number: String,
    pub exchange_rate: BigDecimal,
    pub charges: ImportCharges,
    pub total_expenses: BigDecimal,
    /// Order subtotal converted to the home currency
    pub inr_value: BigDecimal,
    pub total_landed_cost: BigDecimal,
    pub total_quantity: BigDecimal,
    pub average_cost_per_unit: BigDecimal,
    pub items: Vec<ItemLandedCost>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

/// Compute the landed cost of an order without touching storage
pub fn compute_landed_cost(
    order: &PurchaseOrder,
    exchange_rate: &BigDecimal,
    charges: &ImportCharges,
    actor: &Actor,
) -> ErpResult<LandedCost> {
    validate_positive_amount(exchange_rate)?;
    charges.validate()?;

    let total_quantity: BigDecimal = order.totals.items.iter().map(|line| &line.quantity).sum();
    if total_quantity <= BigDecimal::from(0) {
        return Err(ErpError::Validation(format!(
            "Purchase order {} has no quantity to spread costs over",
            order.po_number
        )));
    }

    let total_expenses = round_money(&charges.total());
    let inr_value = round_money(&(&order.totals.subtotal * exchange_rate));
    let total_landed_cost = &inr_value + &total_expenses;
    let average_cost_per_unit = round_money(&(&total_landed_cost / &total_quantity));

    let mut items = Vec::with_capacity(order.totals.items.len());
    for line in &order.totals.items {
        if line.quantity <= BigDecimal::from(0) {
            continue;
        }
        let line_value = &line.quantity * &line.unit_price * exchange_rate;
        let expense_share = &total_expenses * &line.quantity / &total_quantity;
        items.push(ItemLandedCost {
            item_id: line.item_id.clone(),
            description: line.description.clone(),
            quantity: line.quantity.clone(),
            unit_price: line.unit_price.clone(),
            landed_cost_per_unit: round_money(&((line_value + expense_share) / &line.quantity)),
        });
    }

    Ok(LandedCost {
        id: uuid::Uuid::new_v4().to_string(),
        po_id: order.id.clone(),
        po_number: order.po_number.clone(),
        exchange_rate: exchange_rate.clone(),
        charges: charges.clone(),
        total_expenses,
        inr_value,
        total_landed_cost,
        total_quantity,
        average_cost_per_unit,
        items,
        created_by: actor.id.clone(),
        created_at: Utc::now().naive_utc(),
    })
}

/// Records landed costs and updates item costs from them
#[derive(Debug, Clone)]
pub struct LandedCostManager<S: ErpStorage> {
    storage: S,
}

impl<S: ErpStorage> LandedCostManager<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub async fn calculate(
        &mut self,
        actor: &Actor,
        po_id: &str,
        exchange_rate: BigDecimal,
        charges: ImportCharges,
    ) -> ErpResult<LandedCost> {
        let mut order = self
            .storage
            .get_purchase_order(po_id)
            .await?
            .ok_or_else(|| ErpError::not_found("purchase order", po_id))?;

        let landed = compute_landed_cost(&order, &exchange_rate, &charges, actor)?;
        self.storage.save_landed_cost(&landed).await?;

        for line in &landed.items {
            let Some(ref item_id) = line.item_id else {
                continue;
            };
            let mut item = self
                .storage
                .get_item(item_id)
                .await?
                .ok_or_else(|| ErpError::not_found("item", item_id))?;
            item.landed_cost = Some(line.landed_cost_per_unit.clone());
            item.last_cost_update = Some(landed.created_at);
            self.storage.update_item(&item).await?;
        }

        order.landed_cost_id = Some(landed.id.clone());
        self.storage.update_purchase_order(&order).await?;

        info!(
            po_number = %landed.po_number,
            total_landed_cost = %landed.total_landed_cost,
            average_cost_per_unit = %landed.average_cost_per_unit,
            "landed cost calculated"
        );
        Ok(landed)
    }

    /// The most recent landed cost of an order
    pub async fn for_purchase_order(&self, po_id: &str) -> ErpResult<LandedCost> {
        let order = self
            .storage
            .get_purchase_order(po_id)
            .await?
            .ok_or_else(|| ErpError::not_found("purchase order", po_id))?;
        let landed_cost_id = order
            .landed_cost_id
            .ok_or_else(|| ErpError::not_found("landed cost", po_id))?;
        self.storage
            .get_landed_cost(&landed_cost_id)
            .await?
            .ok_or_else(|| ErpError::not_found("landed cost", landed_cost_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procurement::purchase_order::{
        NewPurchaseOrder, PurchaseOrderManager, PurchaseOrderType,
    };
    use crate::tax::gst::TaxCalculator;
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_landed_cost_spreads_expenses_by_quantity() {
        let mut storage = MemoryStorage::new();
        let actor = Actor::new("buyer", Role::User);
        let supplier = Account::new("Shanghai Films".to_string(), AccountType::Supplier, None);
        storage.save_account(&supplier).await.unwrap();

        let film = Item::new(
            "FILM-1".to_string(),
            "Film".to_string(),
            "raw".to_string(),
            "kg".to_string(),
            BigDecimal::from(0),
            BigDecimal::from(0),
        );
        let core = Item::new(
            "CORE-1".to_string(),
            "Paper core".to_string(),
            "raw".to_string(),
            "pc".to_string(),
            BigDecimal::from(0),
            BigDecimal::from(0),
        );
        storage.save_item(&film).await.unwrap();
        storage.save_item(&core).await.unwrap();

        let calculator = TaxCalculator::new("27", BigDecimal::from(18));
        let mut orders = PurchaseOrderManager::new(storage.clone(), calculator);
        let po = orders
            .create_purchase_order(
                &actor,
                NewPurchaseOrder {
                    po_type: PurchaseOrderType::Import,
                    supplier_id: supplier.id.clone(),
                    currency: "USD".to_string(),
                    order_date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
                    delivery_location: "PORT".to_string(),
                    payment_terms: "60 days".to_string(),
                    items: vec![
                        LineItemInput::new("Film", BigDecimal::from(300), BigDecimal::from(2))
                            .item(&film.id),
                        LineItemInput::new("Core", BigDecimal::from(100), BigDecimal::from(1))
                            .item(&core.id),
                    ],
                    notes: None,
                },
            )
            .await
            .unwrap();

        let charges = ImportCharges {
            freight: BigDecimal::from(4000),
            customs_duty: BigDecimal::from(3000),
            insurance: BigDecimal::from(1000),
            ..ImportCharges::default()
        };
        let mut manager = LandedCostManager::new(storage.clone());
        let landed = manager
            .calculate(&actor, &po.id, BigDecimal::from(80), charges)
            .await
            .unwrap();

        // 700 USD at 80 plus 8000 of expenses over 400 units
        assert_eq!(landed.inr_value, BigDecimal::from(56000));
        assert_eq!(landed.total_expenses, BigDecimal::from(8000));
        assert_eq!(landed.total_landed_cost, BigDecimal::from(64000));
        assert_eq!(landed.average_cost_per_unit, BigDecimal::from(160));

        // Film: (300 * 2 * 80 + 8000 * 300 / 400) / 300 = 180
        let film_cost = storage.get_item(&film.id).await.unwrap().unwrap();
        assert_eq!(film_cost.landed_cost, Some(dec("180")));
        assert!(film_cost.last_cost_update.is_some());
        // Core: (100 * 1 * 80 + 2000) / 100 = 100
        let core_cost = storage.get_item(&core.id).await.unwrap().unwrap();
        assert_eq!(core_cost.landed_cost, Some(dec("100")));

        let fetched = manager.for_purchase_order(&po.id).await.unwrap();
        assert_eq!(fetched.id, landed.id);
    }

    #[test]
    fn test_zero_quantity_order_is_rejected() {
        let calculator = TaxCalculator::new("27", BigDecimal::from(18));
        let totals = calculator.calculate_untaxed(&[]).unwrap();
        let order = PurchaseOrder {
            id: "po".to_string(),
            po_number: "IPO-X-1".to_string(),
            po_type: PurchaseOrderType::Import,
            supplier_id: "s".to_string(),
            supplier_name: "S".to_string(),
            currency: "USD".to_string(),
            order_date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            delivery_location: "PORT".to_string(),
            payment_terms: String::new(),
            totals,
            status: crate::procurement::purchase_order::PurchaseOrderStatus::Pending,
            landed_cost_id: None,
            notes: None,
            created_by: "b".to_string(),
            created_at: Utc::now().naive_utc(),
        };

        let result = compute_landed_cost(
            &order,
            &BigDecimal::from(80),
            &ImportCharges::default(),
            &Actor::new("b", Role::User),
        );
        assert!(matches!(result, Err(ErpError::Validation(_))));
    }
}
