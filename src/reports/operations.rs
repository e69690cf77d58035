//! Operational snapshots: stock valuation, purchasing and dashboard KPIs

use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::procurement::purchase_order::{PurchaseOrder, PurchaseOrderStatus};
use crate::tax::gst::round_money;
use crate::types::*;

use super::{is_booked, window_start};

/// Sales invoices dated within this many days make a customer active
pub const ACTIVE_CUSTOMER_DAYS: u64 = 90;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStock {
    pub item_count: usize,
    pub stock_value: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub total_items: usize,
    pub total_stock_value: BigDecimal,
    /// Items whose stock across all locations is below their reorder level
    pub low_stock_items: usize,
    pub out_of_stock_items: usize,
    pub by_category: BTreeMap<String, CategoryStock>,
}

/// Value stock on hand at each item's unit cost, summed over locations
pub fn inventory_summary(items: &[Item], balances: &[StockBalance]) -> InventorySummary {
    let mut on_hand: HashMap<&str, BigDecimal> = HashMap::new();
    for balance in balances {
        *on_hand
            .entry(balance.item_id.as_str())
            .or_insert_with(|| BigDecimal::from(0)) += &balance.quantity;
    }

    let zero = BigDecimal::from(0);
    let mut total_stock_value = BigDecimal::from(0);
    let mut low_stock_items = 0;
    let mut out_of_stock_items = 0;
    let mut by_category: BTreeMap<String, CategoryStock> = BTreeMap::new();

    for item in items {
        let quantity = on_hand.get(item.id.as_str()).unwrap_or(&zero);
        let value = quantity * item.unit_cost();

        if item.reorder_level > zero && *quantity < item.reorder_level {
            low_stock_items += 1;
        }
        if *quantity <= zero {
            out_of_stock_items += 1;
        }

        let category = by_category
            .entry(item.category.clone())
            .or_insert_with(|| CategoryStock {
                item_count: 0,
                stock_value: BigDecimal::from(0),
            });
        category.item_count += 1;
        category.stock_value += &value;
        total_stock_value += value;
    }

    for category in by_category.values_mut() {
        category.stock_value = round_money(&category.stock_value);
    }

    InventorySummary {
        total_items: items.len(),
        total_stock_value: round_money(&total_stock_value),
        low_stock_items,
        out_of_stock_items,
        by_category,
    }
}

/// Purchase order values in one currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseValues {
    pub order_count: usize,
    /// Pending and received orders; cancellations are reported separately
    pub total_value: BigDecimal,
    pub received_value: BigDecimal,
    pub pending_value: BigDecimal,
    pub cancelled_value: BigDecimal,
}

impl Default for PurchaseValues {
    fn default() -> Self {
        Self {
            order_count: 0,
            total_value: BigDecimal::from(0),
            received_value: BigDecimal::from(0),
            pending_value: BigDecimal::from(0),
            cancelled_value: BigDecimal::from(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseSummary {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_orders: usize,
    pub by_status: BTreeMap<PurchaseOrderStatus, usize>,
    /// Order totals are kept apart per currency since import orders are
    /// not converted until costed
    pub by_currency: BTreeMap<String, PurchaseValues>,
}

/// Summarize the purchase orders dated `start_date..=end_date`
pub fn purchase_summary(
    orders: &[PurchaseOrder],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> PurchaseSummary {
    let mut total_orders = 0;
    let mut by_status: BTreeMap<PurchaseOrderStatus, usize> = BTreeMap::new();
    let mut by_currency: BTreeMap<String, PurchaseValues> = BTreeMap::new();

    let in_window = |order: &&PurchaseOrder| {
        order.order_date >= start_date && order.order_date <= end_date
    };
    for order in orders.iter().filter(in_window) {
        total_orders += 1;
        *by_status.entry(order.status).or_default() += 1;

        let values = by_currency.entry(order.currency.clone()).or_default();
        let amount = &order.totals.grand_total;
        values.order_count += 1;
        match order.status {
            PurchaseOrderStatus::Pending => {
                values.pending_value += amount;
                values.total_value += amount;
            }
            PurchaseOrderStatus::Received => {
                values.received_value += amount;
                values.total_value += amount;
            }
            PurchaseOrderStatus::Cancelled => values.cancelled_value += amount,
        }
    }

    PurchaseSummary {
        start_date,
        end_date,
        total_orders,
        by_status,
        by_currency,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardKpis {
    pub as_of: NaiveDate,
    pub today_sales: BigDecimal,
    pub today_orders: usize,
    /// From the first of the month up to and including `as_of`
    pub month_sales: BigDecimal,
    pub month_orders: usize,
    pub pending_purchase_orders: usize,
    pub low_stock_items: usize,
    /// Open sales and purchase invoices past their due date
    pub overdue_invoices: usize,
    pub active_customers: usize,
}

/// Headline figures for `as_of`.
///
/// `invoices` may hold every invoice; drafts and cancellations never count
/// as sales.
pub fn dashboard_kpis(
    invoices: &[Invoice],
    orders: &[PurchaseOrder],
    inventory: &InventorySummary,
    as_of: NaiveDate,
) -> DashboardKpis {
    let month_start = as_of.with_day(1).unwrap_or(as_of);
    let active_since = window_start(as_of, ACTIVE_CUSTOMER_DAYS);

    let mut today_sales = BigDecimal::from(0);
    let mut today_orders = 0;
    let mut month_sales = BigDecimal::from(0);
    let mut month_orders = 0;
    let mut active: BTreeSet<&str> = BTreeSet::new();

    let sales = invoices
        .iter()
        .filter(|invoice| invoice.invoice_type == InvoiceType::Sales && is_booked(invoice))
        .filter(|invoice| invoice.invoice_date <= as_of);
    for invoice in sales {
        if invoice.invoice_date == as_of {
            today_sales += invoice.grand_total();
            today_orders += 1;
        }
        if invoice.invoice_date >= month_start {
            month_sales += invoice.grand_total();
            month_orders += 1;
        }
        if invoice.invoice_date >= active_since {
            active.insert(invoice.account_id.as_str());
        }
    }

    let overdue_invoices = invoices
        .iter()
        .filter(|invoice| invoice.status.is_open() && invoice.due_date < as_of)
        .count();
    let pending_purchase_orders = orders
        .iter()
        .filter(|order| order.status == PurchaseOrderStatus::Pending)
        .count();

    DashboardKpis {
        as_of,
        today_sales: round_money(&today_sales),
        today_orders,
        month_sales: round_money(&month_sales),
        month_orders,
        pending_purchase_orders,
        low_stock_items: inventory.low_stock_items,
        overdue_invoices,
        active_customers: active.len(),
    }
}
