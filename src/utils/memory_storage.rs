//! In-memory storage implementation for testing

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::accounts::expense::Expense;
use crate::approval::{ApprovalRequest, ApprovalStatus};
use crate::config::BusinessSettings;
use crate::crm::{Lead, LeadStatus, Quotation, QuotationStatus, Sample};
use crate::hrms::PayrollRun;
use crate::inventory::transfer::StockTransfer;
use crate::procurement::landed_cost::LandedCost;
use crate::procurement::purchase_order::{GoodsReceipt, PurchaseOrder};
use crate::production::{Machine, ProductionEntry, WorkOrder};
use crate::traits::*;
use crate::types::*;

type Table<T> = Arc<RwLock<HashMap<String, T>>>;

fn read<T>(lock: &RwLock<T>) -> ErpResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| ErpError::Storage("storage lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> ErpResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| ErpError::Storage("storage lock poisoned".to_string()))
}

fn in_range(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
}

fn balance_key(item_id: &str, location: &str) -> String {
    format!("{}@{}", item_id, location)
}

/// Stock balances and the append-only ledger share one lock so a batch of
/// movements is applied atomically
#[derive(Debug, Default)]
struct StockState {
    balances: HashMap<String, StockBalance>,
    transactions: Vec<StockTransaction>,
}

/// In-memory storage implementation for testing and development
///
/// Clones share the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    accounts: Table<Account>,
    items: Table<Item>,
    invoices: Table<Invoice>,
    payments: Table<Payment>,
    stock: Arc<RwLock<StockState>>,
    transfers: Table<StockTransfer>,
    purchase_orders: Table<PurchaseOrder>,
    goods_receipts: Table<GoodsReceipt>,
    landed_costs: Table<LandedCost>,
    machines: Table<Machine>,
    work_orders: Table<WorkOrder>,
    production_entries: Table<ProductionEntry>,
    approvals: Table<ApprovalRequest>,
    leads: Table<Lead>,
    quotations: Table<Quotation>,
    samples: Table<Sample>,
    payroll_runs: Table<PayrollRun>,
    expenses: Table<Expense>,
    settings: Arc<RwLock<Option<BusinessSettings>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }
}

fn insert<T: Clone>(table: &Table<T>, id: &str, value: &T) -> ErpResult<()> {
    write(table)?.insert(id.to_string(), value.clone());
    Ok(())
}

fn get<T: Clone>(table: &Table<T>, id: &str) -> ErpResult<Option<T>> {
    Ok(read(table)?.get(id).cloned())
}

fn replace<T: Clone>(table: &Table<T>, entity: &'static str, id: &str, value: &T) -> ErpResult<()> {
    let mut rows = write(table)?;
    match rows.get_mut(id) {
        Some(row) => {
            *row = value.clone();
            Ok(())
        }
        None => Err(ErpError::not_found(entity, id)),
    }
}

#[async_trait]
impl ErpStorage for MemoryStorage {
    async fn save_account(&mut self, account: &Account) -> ErpResult<()> {
        insert(&self.accounts, &account.id, account)
    }

    async fn get_account(&self, account_id: &str) -> ErpResult<Option<Account>> {
        get(&self.accounts, account_id)
    }

    async fn list_accounts(&self, account_type: Option<AccountType>) -> ErpResult<Vec<Account>> {
        let mut accounts: Vec<Account> = read(&self.accounts)?
            .values()
            .filter(|account| account_type.is_none_or(|t| account.account_type == t))
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(accounts)
    }

    async fn save_item(&mut self, item: &Item) -> ErpResult<()> {
        let mut items = write(&self.items)?;
        if items
            .values()
            .any(|existing| existing.item_code == item.item_code && existing.id != item.id)
        {
            return Err(ErpError::Conflict(format!(
                "Item code {} already exists",
                item.item_code
            )));
        }
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_item(&self, item_id: &str) -> ErpResult<Option<Item>> {
        get(&self.items, item_id)
    }

    async fn find_item_by_code(&self, item_code: &str) -> ErpResult<Option<Item>> {
        Ok(read(&self.items)?
            .values()
            .find(|item| item.item_code == item_code)
            .cloned())
    }

    async fn update_item(&mut self, item: &Item) -> ErpResult<()> {
        replace(&self.items, "item", &item.id, item)
    }

    async fn list_items(&self) -> ErpResult<Vec<Item>> {
        let mut items: Vec<Item> = read(&self.items)?.values().cloned().collect();
        items.sort_by(|a, b| a.item_code.cmp(&b.item_code));
        Ok(items)
    }

    async fn save_invoice(&mut self, invoice: &Invoice) -> ErpResult<()> {
        insert(&self.invoices, &invoice.id, invoice)
    }

    async fn get_invoice(&self, invoice_id: &str) -> ErpResult<Option<Invoice>> {
        get(&self.invoices, invoice_id)
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> ErpResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = read(&self.invoices)?
            .values()
            .filter(|invoice| filter.matches(invoice))
            .cloned()
            .collect();
        invoices.sort_by(|a, b| {
            a.invoice_date
                .cmp(&b.invoice_date)
                .then_with(|| a.invoice_number.cmp(&b.invoice_number))
        });
        Ok(invoices)
    }

    async fn update_invoice_versioned(
        &mut self,
        invoice: &Invoice,
        expected_version: u64,
    ) -> ErpResult<bool> {
        let mut invoices = write(&self.invoices)?;
        let stored = invoices
            .get_mut(&invoice.id)
            .ok_or_else(|| ErpError::not_found("invoice", &invoice.id))?;
        if stored.version != expected_version {
            return Ok(false);
        }
        *stored = invoice.clone();
        stored.version = expected_version + 1;
        Ok(true)
    }

    async fn save_payment(&mut self, payment: &Payment) -> ErpResult<()> {
        insert(&self.payments, &payment.id, payment)
    }

    async fn get_payment(&self, payment_id: &str) -> ErpResult<Option<Payment>> {
        get(&self.payments, payment_id)
    }

    async fn update_payment(&mut self, payment: &Payment) -> ErpResult<()> {
        replace(&self.payments, "payment", &payment.id, payment)
    }

    async fn list_payments(&self, payment_type: Option<PaymentType>) -> ErpResult<Vec<Payment>> {
        let mut payments: Vec<Payment> = read(&self.payments)?
            .values()
            .filter(|payment| payment_type.is_none_or(|t| payment.payment_type == t))
            .cloned()
            .collect();
        payments.sort_by(|a, b| {
            a.payment_date
                .cmp(&b.payment_date)
                .then_with(|| a.payment_number.cmp(&b.payment_number))
        });
        Ok(payments)
    }

    async fn apply_stock_movements(
        &mut self,
        transactions: &[StockTransaction],
    ) -> ErpResult<Vec<StockBalance>> {
        let mut stock = write(&self.stock)?;
        let now = Utc::now().naive_utc();

        // Work on copies of the touched balances; nothing is committed until
        // every movement has been checked.
        let mut pending: HashMap<String, StockBalance> = HashMap::new();
        let mut touched = Vec::with_capacity(transactions.len());
        for txn in transactions {
            let key = balance_key(&txn.item_id, &txn.location);
            let balance = match pending.remove(&key) {
                Some(balance) => balance,
                None => stock.balances.get(&key).cloned().unwrap_or_else(|| StockBalance {
                    id: uuid::Uuid::new_v4().to_string(),
                    item_id: txn.item_id.clone(),
                    location: txn.location.clone(),
                    quantity: BigDecimal::from(0),
                    uom: txn.uom.clone(),
                    last_updated: now,
                }),
            };
            let quantity = &balance.quantity + &txn.quantity;
            if quantity < BigDecimal::from(0) {
                return Err(ErpError::Validation(format!(
                    "Insufficient stock for item {} at {}: available {}, requested {}",
                    txn.item_id,
                    txn.location,
                    balance.quantity,
                    -txn.quantity.clone()
                )));
            }
            let balance = StockBalance {
                quantity,
                last_updated: now,
                ..balance
            };
            touched.push(balance.clone());
            pending.insert(key, balance);
        }

        stock.balances.extend(pending);
        stock.transactions.extend_from_slice(transactions);
        Ok(touched)
    }

    async fn get_stock_balance(
        &self,
        item_id: &str,
        location: &str,
    ) -> ErpResult<Option<StockBalance>> {
        Ok(read(&self.stock)?
            .balances
            .get(&balance_key(item_id, location))
            .cloned())
    }

    async fn list_stock_balances(&self, item_id: Option<&str>) -> ErpResult<Vec<StockBalance>> {
        let mut balances: Vec<StockBalance> = read(&self.stock)?
            .balances
            .values()
            .filter(|balance| item_id.is_none_or(|id| balance.item_id == id))
            .cloned()
            .collect();
        balances.sort_by(|a, b| {
            a.item_id
                .cmp(&b.item_id)
                .then_with(|| a.location.cmp(&b.location))
        });
        Ok(balances)
    }

    async fn list_stock_transactions(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ErpResult<Vec<StockTransaction>> {
        Ok(read(&self.stock)?
            .transactions
            .iter()
            .filter(|txn| in_range(txn.created_at.date(), start_date, end_date))
            .cloned()
            .collect())
    }

    async fn save_transfer(&mut self, transfer: &StockTransfer) -> ErpResult<()> {
        insert(&self.transfers, &transfer.id, transfer)
    }

    async fn get_transfer(&self, transfer_id: &str) -> ErpResult<Option<StockTransfer>> {
        get(&self.transfers, transfer_id)
    }

    async fn update_transfer(&mut self, transfer: &StockTransfer) -> ErpResult<()> {
        replace(&self.transfers, "stock transfer", &transfer.id, transfer)
    }

    async fn save_purchase_order(&mut self, order: &PurchaseOrder) -> ErpResult<()> {
        insert(&self.purchase_orders, &order.id, order)
    }

    async fn get_purchase_order(&self, po_id: &str) -> ErpResult<Option<PurchaseOrder>> {
        get(&self.purchase_orders, po_id)
    }

    async fn update_purchase_order(&mut self, order: &PurchaseOrder) -> ErpResult<()> {
        replace(&self.purchase_orders, "purchase order", &order.id, order)
    }

    async fn list_purchase_orders(&self) -> ErpResult<Vec<PurchaseOrder>> {
        let mut orders: Vec<PurchaseOrder> =
            read(&self.purchase_orders)?.values().cloned().collect();
        orders.sort_by(|a, b| {
            a.order_date
                .cmp(&b.order_date)
                .then_with(|| a.po_number.cmp(&b.po_number))
        });
        Ok(orders)
    }

    async fn save_goods_receipt(&mut self, receipt: &GoodsReceipt) -> ErpResult<()> {
        insert(&self.goods_receipts, &receipt.id, receipt)
    }

    async fn list_goods_receipts(&self, po_id: Option<&str>) -> ErpResult<Vec<GoodsReceipt>> {
        let mut receipts: Vec<GoodsReceipt> = read(&self.goods_receipts)?
            .values()
            .filter(|receipt| po_id.is_none_or(|id| receipt.po_id == id))
            .cloned()
            .collect();
        receipts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(receipts)
    }

    async fn save_landed_cost(&mut self, landed_cost: &LandedCost) -> ErpResult<()> {
        insert(&self.landed_costs, &landed_cost.id, landed_cost)
    }

    async fn get_landed_cost(&self, landed_cost_id: &str) -> ErpResult<Option<LandedCost>> {
        get(&self.landed_costs, landed_cost_id)
    }

    async fn save_machine(&mut self, machine: &Machine) -> ErpResult<()> {
        insert(&self.machines, &machine.id, machine)
    }

    async fn get_machine(&self, machine_id: &str) -> ErpResult<Option<Machine>> {
        get(&self.machines, machine_id)
    }

    async fn save_work_order(&mut self, order: &WorkOrder) -> ErpResult<()> {
        insert(&self.work_orders, &order.id, order)
    }

    async fn get_work_order(&self, work_order_id: &str) -> ErpResult<Option<WorkOrder>> {
        get(&self.work_orders, work_order_id)
    }

    async fn update_work_order(&mut self, order: &WorkOrder) -> ErpResult<()> {
        replace(&self.work_orders, "work order", &order.id, order)
    }

    async fn list_work_orders(&self) -> ErpResult<Vec<WorkOrder>> {
        let mut orders: Vec<WorkOrder> = read(&self.work_orders)?.values().cloned().collect();
        orders.sort_by(|a, b| a.wo_number.cmp(&b.wo_number));
        Ok(orders)
    }

    async fn save_production_entry(&mut self, entry: &ProductionEntry) -> ErpResult<()> {
        insert(&self.production_entries, &entry.id, entry)
    }

    async fn list_production_entries(
        &self,
        work_order_id: Option<&str>,
    ) -> ErpResult<Vec<ProductionEntry>> {
        let mut entries: Vec<ProductionEntry> = read(&self.production_entries)?
            .values()
            .filter(|entry| work_order_id.is_none_or(|id| entry.work_order_id == id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            a.production_date
                .cmp(&b.production_date)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(entries)
    }

    async fn insert_approval_if_absent(
        &mut self,
        request: &ApprovalRequest,
    ) -> ErpResult<ApprovalRequest> {
        let mut approvals = write(&self.approvals)?;
        let live = approvals.values().find(|existing| {
            existing.is_live()
                && existing.matches(&request.entity_type, &request.entity_id, request.action)
        });
        if let Some(existing) = live {
            return Ok(existing.clone());
        }
        approvals.insert(request.id.clone(), request.clone());
        Ok(request.clone())
    }

    async fn get_approval(&self, request_id: &str) -> ErpResult<Option<ApprovalRequest>> {
        get(&self.approvals, request_id)
    }

    async fn update_approval(&mut self, request: &ApprovalRequest) -> ErpResult<()> {
        replace(&self.approvals, "approval request", &request.id, request)
    }

    async fn claim_approval(&mut self, request_id: &str) -> ErpResult<bool> {
        let mut approvals = write(&self.approvals)?;
        let request = approvals
            .get_mut(request_id)
            .ok_or_else(|| ErpError::not_found("approval request", request_id))?;
        if request.status != ApprovalStatus::Approved || request.consumed {
            return Ok(false);
        }
        request.consumed = true;
        request.consumed_at = Some(Utc::now().naive_utc());
        Ok(true)
    }

    async fn release_approval(&mut self, request_id: &str) -> ErpResult<()> {
        let mut approvals = write(&self.approvals)?;
        let request = approvals
            .get_mut(request_id)
            .ok_or_else(|| ErpError::not_found("approval request", request_id))?;
        request.consumed = false;
        request.consumed_at = None;
        Ok(())
    }

    async fn list_approvals(
        &self,
        status: Option<ApprovalStatus>,
    ) -> ErpResult<Vec<ApprovalRequest>> {
        let mut approvals: Vec<ApprovalRequest> = read(&self.approvals)?
            .values()
            .filter(|request| status.is_none_or(|s| request.status == s))
            .cloned()
            .collect();
        approvals.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(approvals)
    }

    async fn save_lead(&mut self, lead: &Lead) -> ErpResult<()> {
        insert(&self.leads, &lead.id, lead)
    }

    async fn get_lead(&self, lead_id: &str) -> ErpResult<Option<Lead>> {
        get(&self.leads, lead_id)
    }

    async fn update_lead(&mut self, lead: &Lead) -> ErpResult<()> {
        replace(&self.leads, "lead", &lead.id, lead)
    }

    async fn list_leads(
        &self,
        source: Option<&str>,
        status: Option<LeadStatus>,
    ) -> ErpResult<Vec<Lead>> {
        let mut leads: Vec<Lead> = read(&self.leads)?
            .values()
            .filter(|lead| source.is_none_or(|s| lead.source == s))
            .filter(|lead| status.is_none_or(|s| lead.status == s))
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }

    async fn mark_lead_converted(&mut self, lead_id: &str, account_id: &str) -> ErpResult<Lead> {
        let mut leads = write(&self.leads)?;
        let lead = leads
            .get_mut(lead_id)
            .ok_or_else(|| ErpError::not_found("lead", lead_id))?;
        if lead.status == LeadStatus::Converted {
            return Err(ErpError::Conflict(format!(
                "Lead {} has already been converted",
                lead.company_name
            )));
        }
        lead.status = LeadStatus::Converted;
        lead.account_id = Some(account_id.to_string());
        lead.updated_at = Utc::now().naive_utc();
        Ok(lead.clone())
    }

    async fn save_quotation(&mut self, quotation: &Quotation) -> ErpResult<()> {
        insert(&self.quotations, &quotation.id, quotation)
    }

    async fn get_quotation(&self, quotation_id: &str) -> ErpResult<Option<Quotation>> {
        get(&self.quotations, quotation_id)
    }

    async fn update_quotation(&mut self, quotation: &Quotation) -> ErpResult<()> {
        replace(&self.quotations, "quotation", &quotation.id, quotation)
    }

    async fn list_quotations(
        &self,
        account_id: Option<&str>,
        status: Option<QuotationStatus>,
    ) -> ErpResult<Vec<Quotation>> {
        let mut quotations: Vec<Quotation> = read(&self.quotations)?
            .values()
            .filter(|quote| account_id.is_none_or(|id| quote.account_id == id))
            .filter(|quote| status.is_none_or(|s| quote.status == s))
            .cloned()
            .collect();
        quotations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(quotations)
    }

    async fn save_sample(&mut self, sample: &Sample) -> ErpResult<()> {
        insert(&self.samples, &sample.id, sample)
    }

    async fn get_sample(&self, sample_id: &str) -> ErpResult<Option<Sample>> {
        get(&self.samples, sample_id)
    }

    async fn update_sample(&mut self, sample: &Sample) -> ErpResult<()> {
        replace(&self.samples, "sample", &sample.id, sample)
    }

    async fn list_samples(&self, account_id: Option<&str>) -> ErpResult<Vec<Sample>> {
        let mut samples: Vec<Sample> = read(&self.samples)?
            .values()
            .filter(|sample| account_id.is_none_or(|id| sample.account_id == id))
            .cloned()
            .collect();
        samples.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(samples)
    }

    async fn save_payroll_run(&mut self, run: &PayrollRun) -> ErpResult<()> {
        let mut runs = write(&self.payroll_runs)?;
        if runs.contains_key(&run.period) {
            return Err(ErpError::Conflict(format!(
                "Payroll for {} has already been run",
                run.period
            )));
        }
        runs.insert(run.period.clone(), run.clone());
        Ok(())
    }

    async fn get_payroll_run(&self, period: &str) -> ErpResult<Option<PayrollRun>> {
        get(&self.payroll_runs, period)
    }

    async fn save_expense(&mut self, expense: &Expense) -> ErpResult<()> {
        insert(&self.expenses, &expense.id, expense)
    }

    async fn list_expenses(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ErpResult<Vec<Expense>> {
        let mut expenses: Vec<Expense> = read(&self.expenses)?
            .values()
            .filter(|expense| in_range(expense.expense_date, start_date, end_date))
            .cloned()
            .collect();
        expenses.sort_by(|a, b| a.expense_date.cmp(&b.expense_date));
        Ok(expenses)
    }

    async fn get_settings(&self) -> ErpResult<Option<BusinessSettings>> {
        Ok(read(&self.settings)?.clone())
    }

    async fn save_settings(&mut self, settings: &BusinessSettings) -> ErpResult<()> {
        *write(&self.settings)? = Some(settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(item: &str, location: &str, quantity: i64) -> StockTransaction {
        StockTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            item_id: item.to_string(),
            location: location.to_string(),
            quantity: BigDecimal::from(quantity),
            uom: "kg".to_string(),
            direction: if quantity >= 0 {
                StockDirection::In
            } else {
                StockDirection::Out
            },
            kind: StockTransactionKind::Adjustment,
            reference_no: "ADJ-test".to_string(),
            batch_number: None,
            created_by: "tester".to_string(),
            created_at: Utc::now().naive_utc(),
        }
    }

    #[tokio::test]
    async fn test_stock_batch_checks_cumulative_quantity() {
        let mut storage = MemoryStorage::new();
        storage.apply_stock_movements(&[txn("i", "WH", 10)]).await.unwrap();

        let result = storage
            .apply_stock_movements(&[txn("i", "WH", -5), txn("i", "WH", -6)])
            .await;
        assert!(matches!(result, Err(ErpError::Validation(_))));

        let balance = storage.get_stock_balance("i", "WH").await.unwrap().unwrap();
        assert_eq!(balance.quantity, BigDecimal::from(10));
        assert_eq!(storage.list_stock_transactions(None, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stock_batch_returns_balance_per_movement() {
        let mut storage = MemoryStorage::new();
        let balances = storage
            .apply_stock_movements(&[txn("i", "A", 7), txn("i", "B", 3), txn("i", "A", -2)])
            .await
            .unwrap();
        let quantities: Vec<BigDecimal> = balances.into_iter().map(|b| b.quantity).collect();
        assert_eq!(
            quantities,
            vec![BigDecimal::from(7), BigDecimal::from(3), BigDecimal::from(5)]
        );
    }

    #[tokio::test]
    async fn test_duplicate_item_code_conflicts() {
        let mut storage = MemoryStorage::new();
        let first = Item::new(
            "RM-1".to_string(),
            "Resin".to_string(),
            "raw".to_string(),
            "kg".to_string(),
            BigDecimal::from(0),
            BigDecimal::from(0),
        );
        storage.save_item(&first).await.unwrap();
        let second = Item::new(
            "RM-1".to_string(),
            "Other".to_string(),
            "raw".to_string(),
            "kg".to_string(),
            BigDecimal::from(0),
            BigDecimal::from(0),
        );
        assert!(matches!(
            storage.save_item(&second).await,
            Err(ErpError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let mut storage = MemoryStorage::new();
        let view = storage.clone();
        let account = Account::new("Acme".to_string(), AccountType::Customer, None);
        storage.save_account(&account).await.unwrap();
        assert_eq!(view.get_account(&account.id).await.unwrap(), Some(account));
    }
}
