//! Top-level orchestrator that wires every manager to one storage backend

use tracing::info;

use crate::accounts::{AccountManager, ExpenseManager, InvoiceManager, PaymentManager};
use crate::approval::{ApprovalGuard, ApprovalRequest, PolicyRegistry};
use crate::config::{BusinessSettings, ErpConfig};
use crate::crm::{LeadManager, QuotationManager, SampleManager};
use crate::hrms::PayrollManager;
use crate::inventory::{StockLedger, TransferManager};
use crate::procurement::{LandedCostManager, PurchaseOrderManager};
use crate::production::ProductionManager;
use crate::reports::ReportManager;
use crate::settings::SettingsManager;
use crate::tax::gst::TaxCalculator;
use crate::traits::ErpStorage;
use crate::types::*;

/// Main ERP system that owns one manager per module.
///
/// Managers that depend on business settings (tax calculation, payment
/// terms, the wastage approval threshold) are rebuilt whenever the settings
/// change through [`Erp::update_settings`].
pub struct Erp<S: ErpStorage + Clone> {
    storage: S,
    config: ErpConfig,
    business: BusinessSettings,
    settings: SettingsManager<S>,
    guard: ApprovalGuard<S>,
    accounts: AccountManager<S>,
    invoices: InvoiceManager<S>,
    payments: PaymentManager<S>,
    expenses: ExpenseManager<S>,
    leads: LeadManager<S>,
    quotations: QuotationManager<S>,
    samples: SampleManager<S>,
    stock: StockLedger<S>,
    transfers: TransferManager<S>,
    purchase_orders: PurchaseOrderManager<S>,
    landed_costs: LandedCostManager<S>,
    production: ProductionManager<S>,
    payroll: PayrollManager<S>,
    reports: ReportManager<S>,
}

impl<S: ErpStorage + Clone> Erp<S> {
    /// Create the system over `storage`, using persisted business settings
    /// when present and `config.business` otherwise
    pub async fn new(storage: S, config: ErpConfig) -> ErpResult<Self> {
        config.validate()?;
        let business = SettingsManager::new(storage.clone(), config.business.clone())
            .get()
            .await?;
        Self::assemble(storage, config, business)
    }

    fn assemble(storage: S, config: ErpConfig, business: BusinessSettings) -> ErpResult<Self> {
        let calculator = TaxCalculator::new(
            business.home_state_code.clone(),
            business.default_tax_decimal()?,
        );
        let guard = ApprovalGuard::new(
            storage.clone(),
            PolicyRegistry::standard(business.wastage_threshold_decimal()?),
        );
        let retries = config.max_update_retries;

        Ok(Self {
            settings: SettingsManager::new(storage.clone(), config.business.clone()),
            accounts: AccountManager::new(storage.clone()),
            invoices: InvoiceManager::new(
                storage.clone(),
                calculator.clone(),
                business.default_payment_terms_days,
                retries,
            ),
            payments: PaymentManager::new(storage.clone(), retries),
            expenses: ExpenseManager::new(storage.clone()),
            leads: LeadManager::new(storage.clone()),
            quotations: QuotationManager::new(storage.clone(), calculator.clone()),
            samples: SampleManager::new(storage.clone()),
            stock: StockLedger::new(storage.clone()),
            transfers: TransferManager::new(storage.clone(), guard.clone()),
            purchase_orders: PurchaseOrderManager::new(storage.clone(), calculator),
            landed_costs: LandedCostManager::new(storage.clone()),
            production: ProductionManager::new(storage.clone(), guard.clone()),
            payroll: PayrollManager::new(storage.clone(), guard.clone()),
            reports: ReportManager::new(storage.clone()),
            guard,
            storage,
            config,
            business,
        })
    }

    /// Business settings currently in effect
    pub fn business_settings(&self) -> &BusinessSettings {
        &self.business
    }

    /// Persist new business settings and rebuild the managers that use them.
    /// Only admins and directors may change settings.
    pub async fn update_settings(
        &mut self,
        actor: &Actor,
        settings: BusinessSettings,
    ) -> ErpResult<BusinessSettings> {
        let saved = self.settings.update(actor, settings).await?;
        *self = Self::assemble(self.storage.clone(), self.config.clone(), saved.clone())?;
        info!(home_state_code = %saved.home_state_code, "managers rebuilt for new settings");
        Ok(saved)
    }

    // Approvals
    /// Approve a pending request; the guarded action may then be retried once
    pub async fn approve(
        &mut self,
        approver: &Actor,
        request_id: &str,
        remarks: Option<String>,
    ) -> ErpResult<ApprovalRequest> {
        self.guard.approve(approver, request_id, remarks).await
    }

    pub async fn reject(
        &mut self,
        approver: &Actor,
        request_id: &str,
        remarks: Option<String>,
    ) -> ErpResult<ApprovalRequest> {
        self.guard.reject(approver, request_id, remarks).await
    }

    pub async fn pending_approvals(&self) -> ErpResult<Vec<ApprovalRequest>> {
        self.guard.list_pending().await
    }

    // Module managers
    pub fn accounts(&mut self) -> &mut AccountManager<S> {
        &mut self.accounts
    }

    pub fn invoices(&mut self) -> &mut InvoiceManager<S> {
        &mut self.invoices
    }

    pub fn payments(&mut self) -> &mut PaymentManager<S> {
        &mut self.payments
    }

    pub fn expenses(&mut self) -> &mut ExpenseManager<S> {
        &mut self.expenses
    }

    pub fn leads(&mut self) -> &mut LeadManager<S> {
        &mut self.leads
    }

    pub fn quotations(&mut self) -> &mut QuotationManager<S> {
        &mut self.quotations
    }

    pub fn samples(&mut self) -> &mut SampleManager<S> {
        &mut self.samples
    }

    pub fn stock(&mut self) -> &mut StockLedger<S> {
        &mut self.stock
    }

    pub fn transfers(&mut self) -> &mut TransferManager<S> {
        &mut self.transfers
    }

    pub fn purchase_orders(&mut self) -> &mut PurchaseOrderManager<S> {
        &mut self.purchase_orders
    }

    pub fn landed_costs(&mut self) -> &mut LandedCostManager<S> {
        &mut self.landed_costs
    }

    pub fn production(&mut self) -> &mut ProductionManager<S> {
        &mut self.production
    }

    pub fn payroll(&mut self) -> &mut PayrollManager<S> {
        &mut self.payroll
    }

    pub fn reports(&self) -> &ReportManager<S> {
        &self.reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::NewInvoice;
    use crate::utils::memory_storage::MemoryStorage;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn admin() -> Actor {
        Actor::new("admin", Role::Admin)
    }

    #[tokio::test]
    async fn test_settings_change_rebuilds_tax_calculation() {
        let storage = MemoryStorage::new();
        let mut erp = Erp::new(storage.clone(), ErpConfig::default()).await.unwrap();
        let customer = erp
            .accounts()
            .create_account(
                "Deccan Plastics".to_string(),
                AccountType::Customer,
                Some("29ABCDE1234F1Z5".to_string()),
            )
            .await
            .unwrap();
        let lines = || {
            vec![LineItemInput::new("crate", BigDecimal::from(10), BigDecimal::from(100))]
        };
        let date = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();

        let before = erp
            .invoices()
            .create_invoice(
                &admin(),
                NewInvoice::new(InvoiceType::Sales, &customer.id, date, lines()),
            )
            .await
            .unwrap();
        assert!(before.totals.igst > BigDecimal::from(0));

        let karnataka = BusinessSettings {
            home_state_code: "29".to_string(),
            ..erp.business_settings().clone()
        };
        erp.update_settings(&admin(), karnataka).await.unwrap();

        let after = erp
            .invoices()
            .create_invoice(
                &admin(),
                NewInvoice::new(InvoiceType::Sales, &customer.id, date, lines()),
            )
            .await
            .unwrap();
        assert_eq!(after.totals.igst, BigDecimal::from(0));
        assert!(after.totals.cgst > BigDecimal::from(0));

        // a fresh instance picks up the persisted settings
        let reopened = Erp::new(storage, ErpConfig::default()).await.unwrap();
        assert_eq!(reopened.business_settings().home_state_code, "29");
    }

    #[tokio::test]
    async fn test_settings_update_requires_admin_or_director() {
        let mut erp = Erp::new(MemoryStorage::new(), ErpConfig::default()).await.unwrap();
        let settings = erp.business_settings().clone();
        assert!(matches!(
            erp.update_settings(&Actor::new("m", Role::Manager), settings).await,
            Err(ErpError::Forbidden(_))
        ));
    }
}
