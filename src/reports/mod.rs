//! Read-only reports over invoices, payments, expenses and stock

pub mod aging;
pub mod financial;
pub mod operations;
pub mod sales;

pub use aging::*;
pub use financial::*;
pub use operations::*;
pub use sales::*;

use chrono::{Days, NaiveDate};
use tracing::instrument;

use crate::traits::{ErpStorage, InvoiceFilter};
use crate::types::*;

/// Booked invoices exclude drafts and cancellations
fn is_booked(invoice: &Invoice) -> bool {
    !matches!(
        invoice.status,
        InvoiceStatus::Draft | InvoiceStatus::Cancelled
    )
}

fn window_start(as_of: NaiveDate, lookback_days: u64) -> NaiveDate {
    as_of
        .checked_sub_days(Days::new(lookback_days))
        .unwrap_or(NaiveDate::MIN)
}

/// Produces the aging, sales and financial reports from stored documents
#[derive(Debug, Clone)]
pub struct ReportManager<S: ErpStorage> {
    storage: S,
}

impl<S: ErpStorage> ReportManager<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    async fn booked_invoices(
        &self,
        invoice_type: InvoiceType,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ErpResult<Vec<Invoice>> {
        let filter = InvoiceFilter::of_type(invoice_type).between(start_date, end_date);
        let mut invoices = self.storage.list_invoices(&filter).await?;
        invoices.retain(is_booked);
        Ok(invoices)
    }

    async fn aging(&self, invoice_type: InvoiceType, as_of: NaiveDate) -> ErpResult<AgingReport> {
        let invoices = self
            .storage
            .list_invoices(&InvoiceFilter::of_type(invoice_type))
            .await?;
        Ok(age_invoices(&invoices, as_of))
    }

    /// Receivables aging over open sales invoices
    #[instrument(skip(self))]
    pub async fn ar_aging(&self, as_of: NaiveDate) -> ErpResult<AgingReport> {
        self.aging(InvoiceType::Sales, as_of).await
    }

    /// Payables aging over open purchase invoices
    #[instrument(skip(self))]
    pub async fn ap_aging(&self, as_of: NaiveDate) -> ErpResult<AgingReport> {
        self.aging(InvoiceType::Purchase, as_of).await
    }

    pub async fn sales_trend(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        period: TrendPeriod,
    ) -> ErpResult<Vec<TrendPoint>> {
        let invoices = self
            .booked_invoices(InvoiceType::Sales, start_date, end_date)
            .await?;
        Ok(trend(&invoices, period))
    }

    pub async fn purchase_trend(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        period: TrendPeriod,
    ) -> ErpResult<Vec<TrendPoint>> {
        let invoices = self
            .booked_invoices(InvoiceType::Purchase, start_date, end_date)
            .await?;
        Ok(trend(&invoices, period))
    }

    /// Sales for `start_date..=end_date` compared with the equally long
    /// period immediately before it
    pub async fn sales_summary(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ErpResult<SalesSummary> {
        if end_date < start_date {
            return Err(ErpError::Validation(format!(
                "Report end {} is before start {}",
                end_date, start_date
            )));
        }
        let length = (end_date - start_date).num_days() as u64;
        let previous_end = window_start(start_date, 1);
        let previous_start = window_start(previous_end, length);

        let current = self
            .booked_invoices(InvoiceType::Sales, start_date, end_date)
            .await?;
        let previous = self
            .booked_invoices(InvoiceType::Sales, previous_start, previous_end)
            .await?;
        Ok(summarize_period(&current, &previous, start_date, end_date))
    }

    /// Best-selling products over the `lookback_days` up to `as_of`
    pub async fn top_products(
        &self,
        as_of: NaiveDate,
        lookback_days: u64,
        limit: usize,
    ) -> ErpResult<Vec<RankedEntry>> {
        let invoices = self
            .booked_invoices(InvoiceType::Sales, window_start(as_of, lookback_days), as_of)
            .await?;
        Ok(top_products(&invoices, limit))
    }

    pub async fn top_customers(
        &self,
        as_of: NaiveDate,
        lookback_days: u64,
        limit: usize,
    ) -> ErpResult<Vec<RankedEntry>> {
        let invoices = self
            .booked_invoices(InvoiceType::Sales, window_start(as_of, lookback_days), as_of)
            .await?;
        Ok(top_accounts(&invoices, limit))
    }

    /// Suppliers ranked by booked purchase invoice totals, which are in the
    /// home currency unlike import purchase orders
    pub async fn top_suppliers(
        &self,
        as_of: NaiveDate,
        lookback_days: u64,
        limit: usize,
    ) -> ErpResult<Vec<RankedEntry>> {
        let invoices = self
            .booked_invoices(InvoiceType::Purchase, window_start(as_of, lookback_days), as_of)
            .await?;
        Ok(top_accounts(&invoices, limit))
    }

    #[instrument(skip(self))]
    pub async fn profit_and_loss(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ErpResult<ProfitAndLoss> {
        let sales = self
            .booked_invoices(InvoiceType::Sales, start_date, end_date)
            .await?;
        let purchases = self
            .booked_invoices(InvoiceType::Purchase, start_date, end_date)
            .await?;
        let expenses = self
            .storage
            .list_expenses(Some(start_date), Some(end_date))
            .await?;
        Ok(profit_and_loss(
            &sales, &purchases, &expenses, start_date, end_date,
        ))
    }

    #[instrument(skip(self))]
    pub async fn cash_flow(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ErpResult<CashFlow> {
        let payments = self.storage.list_payments(None).await?;
        let sales = self
            .storage
            .list_invoices(&InvoiceFilter::of_type(InvoiceType::Sales))
            .await?;
        let purchases = self
            .storage
            .list_invoices(&InvoiceFilter::of_type(InvoiceType::Purchase))
            .await?;
        Ok(cash_flow(&payments, &sales, &purchases, start_date, end_date))
    }

    pub async fn inventory_movement(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ErpResult<InventoryMovement> {
        let transactions = self
            .storage
            .list_stock_transactions(Some(start_date), Some(end_date))
            .await?;
        Ok(inventory_movement(&transactions))
    }

    /// Current stock valuation with low and out-of-stock counts
    #[instrument(skip(self))]
    pub async fn inventory_summary(&self) -> ErpResult<InventorySummary> {
        let items = self.storage.list_items().await?;
        let balances = self.storage.list_stock_balances(None).await?;
        Ok(inventory_summary(&items, &balances))
    }

    pub async fn purchase_summary(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ErpResult<PurchaseSummary> {
        if end_date < start_date {
            return Err(ErpError::Validation(format!(
                "Report end {} is before start {}",
                end_date, start_date
            )));
        }
        let orders = self.storage.list_purchase_orders().await?;
        Ok(purchase_summary(&orders, start_date, end_date))
    }

    #[instrument(skip(self))]
    pub async fn dashboard_kpis(&self, as_of: NaiveDate) -> ErpResult<DashboardKpis> {
        let invoices = self
            .storage
            .list_invoices(&InvoiceFilter::default())
            .await?;
        let orders = self.storage.list_purchase_orders().await?;
        let inventory = self.inventory_summary().await?;
        Ok(dashboard_kpis(&invoices, &orders, &inventory, as_of))
    }
}
