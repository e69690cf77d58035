//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::accounts::expense::Expense;
use crate::approval::{ApprovalRequest, ApprovalStatus};
use crate::config::BusinessSettings;
use crate::crm::{Lead, LeadStatus, Quotation, QuotationStatus, Sample};
use crate::hrms::PayrollRun;
use crate::inventory::transfer::StockTransfer;
use crate::procurement::landed_cost::LandedCost;
use crate::procurement::purchase_order::{GoodsReceipt, PurchaseOrder};
use crate::production::{Machine, ProductionEntry, WorkOrder};
use crate::tax::gst::round_money;
use crate::types::*;

/// Criteria for listing invoices; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceFilter {
    pub invoice_type: Option<InvoiceType>,
    pub status: Option<InvoiceStatus>,
    pub account_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl InvoiceFilter {
    pub fn of_type(invoice_type: InvoiceType) -> Self {
        Self {
            invoice_type: Some(invoice_type),
            ..Self::default()
        }
    }

    pub fn between(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.invoice_type.is_none_or(|t| invoice.invoice_type == t)
            && self.status.is_none_or(|s| invoice.status == s)
            && self
                .account_id
                .as_deref()
                .is_none_or(|id| invoice.account_id == id)
            && self.start_date.is_none_or(|d| invoice.invoice_date >= d)
            && self.end_date.is_none_or(|d| invoice.invoice_date <= d)
    }
}

/// Storage abstraction for the ERP core
///
/// Any document store can back the managers by implementing these methods.
/// Besides plain save/get/list per collection, the trait carries the atomic
/// primitives the balance and approval logic rely on:
/// [`update_invoice_versioned`](Self::update_invoice_versioned),
/// [`apply_stock_movements`](Self::apply_stock_movements),
/// [`insert_approval_if_absent`](Self::insert_approval_if_absent) and
/// [`claim_approval`](Self::claim_approval).
#[async_trait]
pub trait ErpStorage: Send + Sync {
    // Accounts
    async fn save_account(&mut self, account: &Account) -> ErpResult<()>;
    async fn get_account(&self, account_id: &str) -> ErpResult<Option<Account>>;
    async fn list_accounts(&self, account_type: Option<AccountType>) -> ErpResult<Vec<Account>>;

    // Items
    /// Save a new item; fails with `Conflict` if the item code is taken
    async fn save_item(&mut self, item: &Item) -> ErpResult<()>;
    async fn get_item(&self, item_id: &str) -> ErpResult<Option<Item>>;
    async fn find_item_by_code(&self, item_code: &str) -> ErpResult<Option<Item>>;
    async fn update_item(&mut self, item: &Item) -> ErpResult<()>;
    async fn list_items(&self) -> ErpResult<Vec<Item>>;

    // Invoices
    async fn save_invoice(&mut self, invoice: &Invoice) -> ErpResult<()>;
    async fn get_invoice(&self, invoice_id: &str) -> ErpResult<Option<Invoice>>;
    async fn list_invoices(&self, filter: &InvoiceFilter) -> ErpResult<Vec<Invoice>>;

    /// Replace the stored invoice only if its version still equals
    /// `expected_version`. On success the stored version becomes
    /// `expected_version + 1` and `true` is returned; a stale version returns
    /// `false` and leaves the store untouched.
    async fn update_invoice_versioned(
        &mut self,
        invoice: &Invoice,
        expected_version: u64,
    ) -> ErpResult<bool>;

    // Payments
    async fn save_payment(&mut self, payment: &Payment) -> ErpResult<()>;
    async fn get_payment(&self, payment_id: &str) -> ErpResult<Option<Payment>>;
    async fn update_payment(&mut self, payment: &Payment) -> ErpResult<()>;
    async fn list_payments(&self, payment_type: Option<PaymentType>) -> ErpResult<Vec<Payment>>;

    // Stock
    /// Append the transactions and apply their signed quantities to the
    /// (item, location) balances as one atomic step. Fails with `Validation`
    /// and changes nothing if any balance would become negative.
    async fn apply_stock_movements(
        &mut self,
        transactions: &[StockTransaction],
    ) -> ErpResult<Vec<StockBalance>>;
    async fn get_stock_balance(
        &self,
        item_id: &str,
        location: &str,
    ) -> ErpResult<Option<StockBalance>>;
    async fn list_stock_balances(&self, item_id: Option<&str>) -> ErpResult<Vec<StockBalance>>;
    async fn list_stock_transactions(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ErpResult<Vec<StockTransaction>>;

    // Stock transfers
    async fn save_transfer(&mut self, transfer: &StockTransfer) -> ErpResult<()>;
    async fn get_transfer(&self, transfer_id: &str) -> ErpResult<Option<StockTransfer>>;
    async fn update_transfer(&mut self, transfer: &StockTransfer) -> ErpResult<()>;

    // Procurement
    async fn save_purchase_order(&mut self, order: &PurchaseOrder) -> ErpResult<()>;
    async fn get_purchase_order(&self, po_id: &str) -> ErpResult<Option<PurchaseOrder>>;
    async fn update_purchase_order(&mut self, order: &PurchaseOrder) -> ErpResult<()>;
    async fn list_purchase_orders(&self) -> ErpResult<Vec<PurchaseOrder>>;
    async fn save_goods_receipt(&mut self, receipt: &GoodsReceipt) -> ErpResult<()>;
    async fn list_goods_receipts(&self, po_id: Option<&str>) -> ErpResult<Vec<GoodsReceipt>>;
    async fn save_landed_cost(&mut self, landed_cost: &LandedCost) -> ErpResult<()>;
    async fn get_landed_cost(&self, landed_cost_id: &str) -> ErpResult<Option<LandedCost>>;

    // Production
    async fn save_machine(&mut self, machine: &Machine) -> ErpResult<()>;
    async fn get_machine(&self, machine_id: &str) -> ErpResult<Option<Machine>>;
    async fn save_work_order(&mut self, order: &WorkOrder) -> ErpResult<()>;
    async fn get_work_order(&self, work_order_id: &str) -> ErpResult<Option<WorkOrder>>;
    async fn update_work_order(&mut self, order: &WorkOrder) -> ErpResult<()>;
    async fn list_work_orders(&self) -> ErpResult<Vec<WorkOrder>>;
    async fn save_production_entry(&mut self, entry: &ProductionEntry) -> ErpResult<()>;
    async fn list_production_entries(
        &self,
        work_order_id: Option<&str>,
    ) -> ErpResult<Vec<ProductionEntry>>;

    // Approvals
    /// Return the live request for the same (entity_type, entity_id, action)
    /// key if one exists (pending, rejected, or approved and not yet
    /// consumed); otherwise store `request` and return it.
    async fn insert_approval_if_absent(
        &mut self,
        request: &ApprovalRequest,
    ) -> ErpResult<ApprovalRequest>;
    async fn get_approval(&self, request_id: &str) -> ErpResult<Option<ApprovalRequest>>;
    async fn update_approval(&mut self, request: &ApprovalRequest) -> ErpResult<()>;

    /// Mark an approved, unconsumed request as consumed. Returns `false` if
    /// the request is not approved or was already consumed.
    async fn claim_approval(&mut self, request_id: &str) -> ErpResult<bool>;

    /// Undo a claim whose action did not complete, so the approval can be
    /// used again. Unclaimed requests are left as they are.
    async fn release_approval(&mut self, request_id: &str) -> ErpResult<()>;
    async fn list_approvals(
        &self,
        status: Option<ApprovalStatus>,
    ) -> ErpResult<Vec<ApprovalRequest>>;

    // CRM
    async fn save_lead(&mut self, lead: &Lead) -> ErpResult<()>;
    async fn get_lead(&self, lead_id: &str) -> ErpResult<Option<Lead>>;
    async fn update_lead(&mut self, lead: &Lead) -> ErpResult<()>;
    /// Leads newest first, optionally filtered by source and status
    async fn list_leads(
        &self,
        source: Option<&str>,
        status: Option<LeadStatus>,
    ) -> ErpResult<Vec<Lead>>;
    /// Atomically mark a lead converted into `account_id`. Fails with
    /// `Conflict` when the lead has already been converted.
    async fn mark_lead_converted(&mut self, lead_id: &str, account_id: &str) -> ErpResult<Lead>;
    async fn save_quotation(&mut self, quotation: &Quotation) -> ErpResult<()>;
    async fn get_quotation(&self, quotation_id: &str) -> ErpResult<Option<Quotation>>;
    async fn update_quotation(&mut self, quotation: &Quotation) -> ErpResult<()>;
    async fn list_quotations(
        &self,
        account_id: Option<&str>,
        status: Option<QuotationStatus>,
    ) -> ErpResult<Vec<Quotation>>;
    async fn save_sample(&mut self, sample: &Sample) -> ErpResult<()>;
    async fn get_sample(&self, sample_id: &str) -> ErpResult<Option<Sample>>;
    async fn update_sample(&mut self, sample: &Sample) -> ErpResult<()>;
    async fn list_samples(&self, account_id: Option<&str>) -> ErpResult<Vec<Sample>>;

    // Payroll
    /// Save a payroll run; fails with `Conflict` if the period already has one
    async fn save_payroll_run(&mut self, run: &PayrollRun) -> ErpResult<()>;
    async fn get_payroll_run(&self, period: &str) -> ErpResult<Option<PayrollRun>>;

    // Expenses
    async fn save_expense(&mut self, expense: &Expense) -> ErpResult<()>;
    async fn list_expenses(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ErpResult<Vec<Expense>>;

    // Settings
    async fn get_settings(&self) -> ErpResult<Option<BusinessSettings>>;
    async fn save_settings(&mut self, settings: &BusinessSettings) -> ErpResult<()>;
}

/// Trait for implementing custom invoice validation rules
pub trait InvoiceValidator: Send + Sync {
    /// Validate an invoice before it is first saved
    fn validate_invoice(&self, invoice: &Invoice) -> ErpResult<()>;
}

/// Default invoice validator with basic rules
pub struct DefaultInvoiceValidator;

impl InvoiceValidator for DefaultInvoiceValidator {
    fn validate_invoice(&self, invoice: &Invoice) -> ErpResult<()> {
        if invoice.totals.items.is_empty() {
            return Err(ErpError::Validation(
                "Invoice must have at least one line item".to_string(),
            ));
        }

        if invoice.due_date < invoice.invoice_date {
            return Err(ErpError::Validation(format!(
                "Due date {} is before invoice date {}",
                invoice.due_date, invoice.invoice_date
            )));
        }

        let settled = &invoice.paid_amount + &invoice.balance_amount;
        if round_money(&settled) != round_money(invoice.grand_total()) {
            return Err(ErpError::Validation(format!(
                "Paid {} and balance {} do not add up to grand total {}",
                invoice.paid_amount,
                invoice.balance_amount,
                invoice.grand_total()
            )));
        }

        Ok(())
    }
}
