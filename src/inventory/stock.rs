//! Item master and stock ledger

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::tax::gst::round_money;
use crate::traits::ErpStorage;
use crate::types::*;
use crate::utils::validation::{
    validate_item_code, validate_non_negative, validate_positive_amount, validate_required,
};

/// One requested change to a stock balance; the quantity is always positive
#[derive(Debug, Clone, PartialEq)]
pub struct StockMovement {
    pub item_id: String,
    pub location: String,
    pub quantity: BigDecimal,
    pub direction: StockDirection,
    pub batch_number: Option<String>,
}

impl StockMovement {
    pub fn inbound(
        item_id: impl Into<String>,
        location: impl Into<String>,
        quantity: BigDecimal,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            location: location.into(),
            quantity,
            direction: StockDirection::In,
            batch_number: None,
        }
    }

    pub fn outbound(
        item_id: impl Into<String>,
        location: impl Into<String>,
        quantity: BigDecimal,
    ) -> Self {
        Self {
            direction: StockDirection::Out,
            ..Self::inbound(item_id, location, quantity)
        }
    }

    pub fn with_batch(mut self, batch_number: impl Into<String>) -> Self {
        self.batch_number = Some(batch_number.into());
        self
    }

    /// Quantity with the direction applied
    pub fn signed_quantity(&self) -> BigDecimal {
        match self.direction {
            StockDirection::In => self.quantity.clone(),
            StockDirection::Out => -self.quantity.clone(),
        }
    }
}

/// A balance that has fallen below its item's reorder level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub item_id: String,
    pub item_code: String,
    pub item_name: String,
    pub location: String,
    pub quantity: BigDecimal,
    pub reorder_level: BigDecimal,
    pub shortfall: BigDecimal,
}

/// Keeps the item master and applies stock movements to balances
#[derive(Debug, Clone)]
pub struct StockLedger<S: ErpStorage> {
    pub(crate) storage: S,
}

impl<S: ErpStorage> StockLedger<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Create an item; the item code must be unique
    pub async fn create_item(
        &mut self,
        item_code: &str,
        item_name: &str,
        category: &str,
        uom: &str,
        reorder_level: BigDecimal,
        safety_stock: BigDecimal,
    ) -> ErpResult<Item> {
        validate_item_code(item_code)?;
        validate_required("Item name", item_name, 200)?;
        validate_required("Unit of measure", uom, 20)?;
        validate_non_negative("Reorder level", &reorder_level)?;
        validate_non_negative("Safety stock", &safety_stock)?;

        let item = Item::new(
            item_code.trim().to_ascii_uppercase(),
            item_name.trim().to_string(),
            category.trim().to_string(),
            uom.trim().to_string(),
            reorder_level,
            safety_stock,
        );
        self.storage.save_item(&item).await?;

        info!(item_id = %item.id, item_code = %item.item_code, "item created");
        Ok(item)
    }

    /// Get an item by ID, returning an error if not found
    pub async fn get_item(&self, item_id: &str) -> ErpResult<Item> {
        self.storage
            .get_item(item_id)
            .await?
            .ok_or_else(|| ErpError::not_found("item", item_id))
    }

    pub async fn list_items(&self) -> ErpResult<Vec<Item>> {
        self.storage.list_items().await
    }

    /// Set the per-unit standard cost used for stock valuation
    pub async fn set_standard_cost(&mut self, item_id: &str, cost: BigDecimal) -> ErpResult<Item> {
        validate_non_negative("Standard cost", &cost)?;
        let mut item = self.get_item(item_id).await?;
        item.standard_cost = round_money(&cost);
        item.last_cost_update = Some(Utc::now().naive_utc());
        self.storage.update_item(&item).await?;

        info!(
            item_code = %item.item_code,
            standard_cost = %item.standard_cost,
            "standard cost set"
        );
        Ok(item)
    }

    /// Append ledger records for the movements and update the balances.
    ///
    /// All movements are applied together; if any balance would go negative
    /// none of them are.
    #[instrument(skip(self, actor, movements), fields(count = movements.len()))]
    pub async fn post(
        &mut self,
        actor: &Actor,
        kind: StockTransactionKind,
        reference_no: &str,
        movements: &[StockMovement],
    ) -> ErpResult<Vec<StockBalance>> {
        if movements.is_empty() {
            return Err(ErpError::Validation(
                "At least one stock movement is required".to_string(),
            ));
        }
        validate_required("Reference number", reference_no, 100)?;

        let now = Utc::now().naive_utc();
        let mut transactions = Vec::with_capacity(movements.len());
        for movement in movements {
            validate_positive_amount(&movement.quantity)?;
            validate_required("Location", &movement.location, 100)?;
            let item = self.get_item(&movement.item_id).await?;

            transactions.push(StockTransaction {
                id: uuid::Uuid::new_v4().to_string(),
                item_id: item.id,
                location: movement.location.clone(),
                quantity: movement.signed_quantity(),
                uom: item.uom,
                direction: movement.direction,
                kind,
                reference_no: reference_no.to_string(),
                batch_number: movement.batch_number.clone(),
                created_by: actor.id.clone(),
                created_at: now,
            });
        }

        let balances = self.storage.apply_stock_movements(&transactions).await?;
        info!(kind = %kind, reference_no, "stock movements posted");
        Ok(balances)
    }

    /// Correct a balance by a signed quantity, e.g. after a physical count
    pub async fn adjust(
        &mut self,
        actor: &Actor,
        item_id: &str,
        location: &str,
        delta: BigDecimal,
        reason: &str,
    ) -> ErpResult<StockBalance> {
        validate_required("Adjustment reason", reason, 200)?;
        let zero = BigDecimal::from(0);
        let movement = if delta > zero {
            StockMovement::inbound(item_id, location, delta)
        } else if delta < zero {
            StockMovement::outbound(item_id, location, -delta)
        } else {
            return Err(ErpError::Validation(
                "Adjustment quantity cannot be zero".to_string(),
            ));
        };

        let reference = format!("ADJ-{}", reason.trim());
        let mut balances = self
            .post(actor, StockTransactionKind::Adjustment, &reference, &[movement])
            .await?;
        balances
            .pop()
            .ok_or_else(|| ErpError::Storage("adjustment returned no balance".to_string()))
    }

    /// Quantity on hand; zero when the item was never stocked at the location
    pub async fn quantity(&self, item_id: &str, location: &str) -> ErpResult<BigDecimal> {
        Ok(self
            .storage
            .get_stock_balance(item_id, location)
            .await?
            .map(|balance| balance.quantity)
            .unwrap_or_else(|| BigDecimal::from(0)))
    }

    pub async fn balances(&self, item_id: Option<&str>) -> ErpResult<Vec<StockBalance>> {
        self.storage.list_stock_balances(item_id).await
    }

    pub async fn transactions(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ErpResult<Vec<StockTransaction>> {
        self.storage.list_stock_transactions(start_date, end_date).await
    }

    /// Balances below their item's reorder level, largest shortfall first
    pub async fn low_stock(&self) -> ErpResult<Vec<LowStockAlert>> {
        let mut alerts = Vec::new();
        for item in self.storage.list_items().await? {
            if item.reorder_level <= BigDecimal::from(0) {
                continue;
            }
            for balance in self.storage.list_stock_balances(Some(&item.id)).await? {
                if balance.quantity < item.reorder_level {
                    alerts.push(LowStockAlert {
                        item_id: item.id.clone(),
                        item_code: item.item_code.clone(),
                        item_name: item.item_name.clone(),
                        location: balance.location,
                        shortfall: &item.reorder_level - &balance.quantity,
                        quantity: balance.quantity,
                        reorder_level: item.reorder_level.clone(),
                    });
                }
            }
        }

        alerts.sort_by(|a, b| {
            b.shortfall
                .cmp(&a.shortfall)
                .then_with(|| a.item_code.cmp(&b.item_code))
                .then_with(|| a.location.cmp(&b.location))
        });
        Ok(alerts)
    }
}
