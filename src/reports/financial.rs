//! Profit and loss, cash flow and inventory movement summaries

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::accounts::expense::Expense;
use crate::tax::gst::round_money;
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitAndLoss {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Taxable value of sales invoices
    pub revenue: BigDecimal,
    pub sales_invoice_count: usize,
    /// Taxable value of purchase invoices
    pub cost_of_goods_sold: BigDecimal,
    pub gross_profit: BigDecimal,
    pub gross_margin_percent: BigDecimal,
    pub operating_expenses: BigDecimal,
    pub expense_breakdown: BTreeMap<String, BigDecimal>,
    pub net_profit: BigDecimal,
    pub net_margin_percent: BigDecimal,
}

fn margin(profit: &BigDecimal, revenue: &BigDecimal) -> BigDecimal {
    let zero = BigDecimal::from(0);
    if *revenue <= zero {
        return zero;
    }
    round_money(&(profit * BigDecimal::from(100) / revenue))
}

/// Build a profit and loss statement.
///
/// `sales` and `purchases` should already be limited to the period; draft
/// and cancelled invoices are skipped here.
pub fn profit_and_loss(
    sales: &[Invoice],
    purchases: &[Invoice],
    expenses: &[Expense],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> ProfitAndLoss {
    let booked = |invoice: &&Invoice| {
        !matches!(
            invoice.status,
            InvoiceStatus::Draft | InvoiceStatus::Cancelled
        )
    };
    let booked_sales: Vec<&Invoice> = sales.iter().filter(booked).collect();
    let revenue: BigDecimal = booked_sales
        .iter()
        .map(|invoice| &invoice.totals.taxable_amount)
        .sum();
    let cost_of_goods_sold: BigDecimal = purchases
        .iter()
        .filter(booked)
        .map(|invoice| &invoice.totals.taxable_amount)
        .sum();

    let mut expense_breakdown: BTreeMap<String, BigDecimal> = BTreeMap::new();
    for expense in expenses {
        *expense_breakdown
            .entry(expense.category.clone())
            .or_insert_with(|| BigDecimal::from(0)) += &expense.amount;
    }
    let operating_expenses: BigDecimal = expense_breakdown.values().sum();

    let gross_profit = &revenue - &cost_of_goods_sold;
    let net_profit = &gross_profit - &operating_expenses;

    ProfitAndLoss {
        start_date,
        end_date,
        sales_invoice_count: booked_sales.len(),
        gross_margin_percent: margin(&gross_profit, &revenue),
        net_margin_percent: margin(&net_profit, &revenue),
        revenue: round_money(&revenue),
        cost_of_goods_sold: round_money(&cost_of_goods_sold),
        gross_profit: round_money(&gross_profit),
        operating_expenses: round_money(&operating_expenses),
        expense_breakdown: expense_breakdown
            .into_iter()
            .map(|(category, amount)| (category, round_money(&amount)))
            .collect(),
        net_profit: round_money(&net_profit),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cash_inflow: BigDecimal,
    pub cash_outflow: BigDecimal,
    pub net_cash_flow: BigDecimal,
    pub outstanding_receivables: BigDecimal,
    pub outstanding_payables: BigDecimal,
    pub net_working_capital: BigDecimal,
}

/// Cleared receipts and payments dated within the period, plus the current
/// open balances of the given sales and purchase invoices
pub fn cash_flow(
    payments: &[Payment],
    sales: &[Invoice],
    purchases: &[Invoice],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> CashFlow {
    let cleared = |payment_type: PaymentType| -> BigDecimal {
        payments
            .iter()
            .filter(|p| p.payment_type == payment_type && p.status == PaymentStatus::Cleared)
            .filter(|p| p.payment_date >= start_date && p.payment_date <= end_date)
            .map(|p| &p.amount)
            .sum()
    };
    let outstanding = |invoices: &[Invoice]| -> BigDecimal {
        invoices
            .iter()
            .filter(|invoice| invoice.status.is_open())
            .map(|invoice| &invoice.balance_amount)
            .sum()
    };

    let cash_inflow = cleared(PaymentType::Receipt);
    let cash_outflow = cleared(PaymentType::Payment);
    let outstanding_receivables = outstanding(sales);
    let outstanding_payables = outstanding(purchases);

    CashFlow {
        start_date,
        end_date,
        net_cash_flow: round_money(&(&cash_inflow - &cash_outflow)),
        net_working_capital: round_money(&(&outstanding_receivables - &outstanding_payables)),
        cash_inflow: round_money(&cash_inflow),
        cash_outflow: round_money(&cash_outflow),
        outstanding_receivables: round_money(&outstanding_receivables),
        outstanding_payables: round_money(&outstanding_payables),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementTotals {
    pub quantity_in: BigDecimal,
    pub quantity_out: BigDecimal,
    pub transaction_count: usize,
}

impl Default for MovementTotals {
    fn default() -> Self {
        Self {
            quantity_in: BigDecimal::from(0),
            quantity_out: BigDecimal::from(0),
            transaction_count: 0,
        }
    }
}

impl MovementTotals {
    fn add(&mut self, txn: &StockTransaction) {
        match txn.direction {
            StockDirection::In => self.quantity_in += txn.quantity.abs(),
            StockDirection::Out => self.quantity_out += txn.quantity.abs(),
        }
        self.transaction_count += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub totals: MovementTotals,
    pub net_movement: BigDecimal,
    pub by_kind: BTreeMap<StockTransactionKind, MovementTotals>,
}

pub fn inventory_movement(transactions: &[StockTransaction]) -> InventoryMovement {
    let mut totals = MovementTotals::default();
    let mut by_kind: BTreeMap<StockTransactionKind, MovementTotals> = BTreeMap::new();
    for txn in transactions {
        totals.add(txn);
        by_kind.entry(txn.kind).or_default().add(txn);
    }

    InventoryMovement {
        net_movement: &totals.quantity_in - &totals.quantity_out,
        totals,
        by_kind,
    }
}
