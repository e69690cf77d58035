//! Purchase orders and goods receipts

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{info, instrument};

use crate::inventory::stock::{StockLedger, StockMovement};
use crate::numbering::{document_number, import_po_number, DocumentKind};
use crate::tax::gst::{TaxCalculator, TaxTotals};
use crate::traits::ErpStorage;
use crate::types::*;
use crate::utils::validation::{validate_positive_amount, validate_required};

/// Currency whose purchases carry GST
pub const HOME_CURRENCY: &str = "INR";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PurchaseOrderType {
    Domestic,
    Import,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Pending,
    Received,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: String,
    pub po_number: String,
    pub po_type: PurchaseOrderType,
    pub supplier_id: String,
    pub supplier_name: String,
    pub currency: String,
    pub order_date: NaiveDate,
    pub delivery_location: String,
    pub payment_terms: String,
    /// Amounts are in the order currency
    pub totals: TaxTotals,
    pub status: PurchaseOrderStatus,
    pub landed_cost_id: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

impl PurchaseOrder {
    /// Ordered quantity of one item across all lines
    pub fn ordered_quantity(&self, item_id: &str) -> BigDecimal {
        self.totals
            .items
            .iter()
            .filter(|line| line.item_id.as_deref() == Some(item_id))
            .map(|line| &line.quantity)
            .sum()
    }
}

/// Input for a new purchase order
#[derive(Debug, Clone)]
pub struct NewPurchaseOrder {
    pub po_type: PurchaseOrderType,
    pub supplier_id: String,
    pub currency: String,
    pub order_date: NaiveDate,
    pub delivery_location: String,
    pub payment_terms: String,
    pub items: Vec<LineItemInput>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrnLine {
    pub item_id: String,
    pub quantity: BigDecimal,
}

impl GrnLine {
    pub fn new(item_id: impl Into<String>, quantity: BigDecimal) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

/// Goods receipt note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsReceipt {
    pub id: String,
    pub grn_number: String,
    pub po_id: String,
    pub location: String,
    pub lines: Vec<GrnLine>,
    /// Supplier's invoice number, when it arrives with the goods
    pub supplier_invoice_no: Option<String>,
    pub notes: Option<String>,
    pub received_by: String,
    pub created_at: NaiveDateTime,
}

/// Purchase order manager; receiving goods posts them to the stock ledger
pub struct PurchaseOrderManager<S: ErpStorage> {
    storage: S,
    stock: StockLedger<S>,
    calculator: TaxCalculator,
}

impl<S: ErpStorage + Clone> PurchaseOrderManager<S> {
    pub fn new(storage: S, calculator: TaxCalculator) -> Self {
        Self {
            stock: StockLedger::new(storage.clone()),
            storage,
            calculator,
        }
    }

    /// Create a pending purchase order.
    ///
    /// Orders in a foreign currency carry no GST; home currency orders are
    /// taxed against the supplier's GSTIN.
    #[instrument(skip(self, actor, input), fields(supplier_id = %input.supplier_id))]
    pub async fn create_purchase_order(
        &mut self,
        actor: &Actor,
        input: NewPurchaseOrder,
    ) -> ErpResult<PurchaseOrder> {
        let supplier = self
            .storage
            .get_account(&input.supplier_id)
            .await?
            .ok_or_else(|| ErpError::not_found("supplier", &input.supplier_id))?;
        if supplier.account_type != AccountType::Supplier {
            return Err(ErpError::Validation(format!(
                "Account '{}' is not a supplier",
                supplier.name
            )));
        }
        validate_required("Delivery location", &input.delivery_location, 100)?;
        if input.items.is_empty() {
            return Err(ErpError::Validation(
                "Purchase order must have at least one line item".to_string(),
            ));
        }

        let currency = input.currency.trim().to_ascii_uppercase();
        let totals = if currency == HOME_CURRENCY {
            self.calculator
                .calculate(&input.items, supplier.gstin.as_deref())?
        } else {
            self.calculator.calculate_untaxed(&input.items)?
        };

        let now = Utc::now();
        let po_number = match input.po_type {
            PurchaseOrderType::Import => import_po_number(&supplier.name, now),
            PurchaseOrderType::Domestic => document_number(DocumentKind::PurchaseOrder, now),
        };

        let order = PurchaseOrder {
            id: uuid::Uuid::new_v4().to_string(),
            po_number,
            po_type: input.po_type,
            supplier_id: supplier.id,
            supplier_name: supplier.name,
            currency,
            order_date: input.order_date,
            delivery_location: input.delivery_location,
            payment_terms: input.payment_terms,
            totals,
            status: PurchaseOrderStatus::Pending,
            landed_cost_id: None,
            notes: input.notes,
            created_by: actor.id.clone(),
            created_at: now.naive_utc(),
        };
        self.storage.save_purchase_order(&order).await?;

        info!(
            po_number = %order.po_number,
            currency = %order.currency,
            grand_total = %order.totals.grand_total,
            "purchase order created"
        );
        Ok(order)
    }

    /// Get a purchase order by ID, returning an error if not found
    pub async fn get_purchase_order(&self, po_id: &str) -> ErpResult<PurchaseOrder> {
        self.storage
            .get_purchase_order(po_id)
            .await?
            .ok_or_else(|| ErpError::not_found("purchase order", po_id))
    }

    pub async fn list_purchase_orders(&self) -> ErpResult<Vec<PurchaseOrder>> {
        self.storage.list_purchase_orders().await
    }

    /// Receive goods against a pending order into `location`
    #[instrument(skip(self, actor, lines))]
    pub async fn receive_goods(
        &mut self,
        actor: &Actor,
        po_id: &str,
        location: &str,
        lines: Vec<GrnLine>,
        supplier_invoice_no: Option<String>,
    ) -> ErpResult<GoodsReceipt> {
        let mut order = self.get_purchase_order(po_id).await?;
        if order.status != PurchaseOrderStatus::Pending {
            return Err(ErpError::Validation(format!(
                "Purchase order {} is {} and cannot be received",
                order.po_number, order.status
            )));
        }
        validate_required("Location", location, 100)?;
        if lines.is_empty() {
            return Err(ErpError::Validation(
                "Goods receipt must have at least one line".to_string(),
            ));
        }
        for line in &lines {
            validate_positive_amount(&line.quantity)?;
            if order.ordered_quantity(&line.item_id) <= BigDecimal::from(0) {
                return Err(ErpError::Validation(format!(
                    "Item {} is not on purchase order {}",
                    line.item_id, order.po_number
                )));
            }
        }

        let now = Utc::now();
        let receipt = GoodsReceipt {
            id: uuid::Uuid::new_v4().to_string(),
            grn_number: document_number(DocumentKind::GoodsReceipt, now),
            po_id: order.id.clone(),
            location: location.to_string(),
            lines,
            supplier_invoice_no,
            notes: None,
            received_by: actor.id.clone(),
            created_at: now.naive_utc(),
        };

        let movements: Vec<StockMovement> = receipt
            .lines
            .iter()
            .map(|line| StockMovement::inbound(&line.item_id, location, line.quantity.clone()))
            .collect();
        self.stock
            .post(
                actor,
                StockTransactionKind::GoodsReceipt,
                &receipt.grn_number,
                &movements,
            )
            .await?;
        self.storage.save_goods_receipt(&receipt).await?;

        order.status = PurchaseOrderStatus::Received;
        self.storage.update_purchase_order(&order).await?;

        info!(
            grn_number = %receipt.grn_number,
            po_number = %order.po_number,
            location,
            "goods received"
        );
        Ok(receipt)
    }

    pub async fn list_goods_receipts(&self, po_id: Option<&str>) -> ErpResult<Vec<GoodsReceipt>> {
        self.storage.list_goods_receipts(po_id).await
    }

    pub async fn cancel_purchase_order(&mut self, po_id: &str) -> ErpResult<PurchaseOrder> {
        let mut order = self.get_purchase_order(po_id).await?;
        if order.status != PurchaseOrderStatus::Pending {
            return Err(ErpError::Validation(format!(
                "Purchase order {} is {} and cannot be cancelled",
                order.po_number, order.status
            )));
        }
        order.status = PurchaseOrderStatus::Cancelled;
        self.storage.update_purchase_order(&order).await?;

        info!(po_number = %order.po_number, "purchase order cancelled");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;

    fn buyer() -> Actor {
        Actor::new("buyer", Role::User)
    }

    struct Fixture {
        orders: PurchaseOrderManager<MemoryStorage>,
        stock: StockLedger<MemoryStorage>,
        supplier: Account,
        item: Item,
    }

    async fn fixture() -> Fixture {
        let mut storage = MemoryStorage::new();
        let supplier = Account::new(
            "Acme Polymers".to_string(),
            AccountType::Supplier,
            Some("27AAPFU0939F1ZV".to_string()),
        );
        storage.save_account(&supplier).await.unwrap();
        let mut stock = StockLedger::new(storage.clone());
        let item = stock
            .create_item(
                "RESIN-A",
                "Resin A",
                "raw",
                "kg",
                BigDecimal::from(0),
                BigDecimal::from(0),
            )
            .await
            .unwrap();
        Fixture {
            orders: PurchaseOrderManager::new(
                storage,
                TaxCalculator::new("27", BigDecimal::from(18)),
            ),
            stock,
            supplier,
            item,
        }
    }

    fn order(fx: &Fixture, po_type: PurchaseOrderType, currency: &str) -> NewPurchaseOrder {
        NewPurchaseOrder {
            po_type,
            supplier_id: fx.supplier.id.clone(),
            currency: currency.to_string(),
            order_date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            delivery_location: "MAIN".to_string(),
            payment_terms: "30 days".to_string(),
            items: vec![LineItemInput::new("Resin A", BigDecimal::from(100), BigDecimal::from(10))
                .item(&fx.item.id)],
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_domestic_order_is_taxed() {
        let mut fx = fixture().await;
        let input = order(&fx, PurchaseOrderType::Domestic, "inr");
        let po = fx.orders.create_purchase_order(&buyer(), input).await.unwrap();

        assert!(po.po_number.starts_with("PO-"));
        assert_eq!(po.currency, "INR");
        assert_eq!(po.totals.total_tax, BigDecimal::from(180));
        assert_eq!(po.totals.grand_total, BigDecimal::from(1180));
        assert_eq!(po.status, PurchaseOrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_import_order_is_untaxed() {
        let mut fx = fixture().await;
        let input = order(&fx, PurchaseOrderType::Import, "USD");
        let po = fx.orders.create_purchase_order(&buyer(), input).await.unwrap();

        assert!(po.po_number.starts_with("IPO-ACM-"));
        assert_eq!(po.totals.total_tax, BigDecimal::from(0));
        assert_eq!(po.totals.grand_total, BigDecimal::from(1000));
    }

    #[tokio::test]
    async fn test_receiving_goods_posts_stock() {
        let mut fx = fixture().await;
        let input = order(&fx, PurchaseOrderType::Domestic, "INR");
        let po = fx.orders.create_purchase_order(&buyer(), input).await.unwrap();

        let grn = fx
            .orders
            .receive_goods(
                &buyer(),
                &po.id,
                "MAIN",
                vec![GrnLine::new(&fx.item.id, BigDecimal::from(95))],
                Some("SUP-INV-7".to_string()),
            )
            .await
            .unwrap();

        assert!(grn.grn_number.starts_with("GRN-"));
        assert_eq!(
            fx.stock.quantity(&fx.item.id, "MAIN").await.unwrap(),
            BigDecimal::from(95)
        );
        let transactions = fx.stock.transactions(None, None).await.unwrap();
        assert_eq!(transactions[0].reference_no, grn.grn_number);

        let po = fx.orders.get_purchase_order(&po.id).await.unwrap();
        assert_eq!(po.status, PurchaseOrderStatus::Received);
        assert!(fx
            .orders
            .receive_goods(
                &buyer(),
                &po.id,
                "MAIN",
                vec![GrnLine::new(&fx.item.id, BigDecimal::from(5))],
                None,
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_customer_cannot_supply() {
        let mut fx = fixture().await;
        let customer = Account::new("Retail".to_string(), AccountType::Customer, None);
        fx.orders.storage.save_account(&customer).await.unwrap();
        let mut input = order(&fx, PurchaseOrderType::Domestic, "INR");
        input.supplier_id = customer.id.clone();

        assert!(matches!(
            fx.orders.create_purchase_order(&buyer(), input).await,
            Err(ErpError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_foreign_item_on_grn_is_rejected() {
        let mut fx = fixture().await;
        let input = order(&fx, PurchaseOrderType::Domestic, "INR");
        let po = fx.orders.create_purchase_order(&buyer(), input).await.unwrap();

        assert!(matches!(
            fx.orders
                .receive_goods(
                    &buyer(),
                    &po.id,
                    "MAIN",
                    vec![GrnLine::new("other", BigDecimal::from(1))],
                    None,
                )
                .await,
            Err(ErpError::Validation(_))
        ));
    }
}
