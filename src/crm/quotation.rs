//! Price quotations issued to customers before an invoice

use chrono::{Days, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use tracing::{info, instrument};

use crate::numbering::{document_number, DocumentKind};
use crate::tax::gst::{TaxCalculator, TaxTotals};
use crate::traits::ErpStorage;
use crate::types::*;
use crate::utils::validation::validate_required;

/// Days a quotation stays open when no validity is given
pub const DEFAULT_VALIDITY_DAYS: u32 = 15;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuotationStatus {
    Pending,
    Accepted,
    Rejected,
    /// Passed its expiry date while still pending
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: String,
    pub quote_number: String,
    pub account_id: String,
    pub account_name: String,
    pub quote_date: NaiveDate,
    pub validity_days: u32,
    /// Last day the quoted prices hold
    pub expiry_date: NaiveDate,
    pub totals: TaxTotals,
    pub transport: String,
    pub credit_period: String,
    pub supply_location: String,
    pub status: QuotationStatus,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

impl Quotation {
    /// Whether an invoice may still be raised against this quotation
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            QuotationStatus::Pending | QuotationStatus::Accepted
        )
    }
}

/// Input for a new quotation
#[derive(Debug, Clone)]
pub struct NewQuotation {
    pub account_id: String,
    pub quote_date: NaiveDate,
    pub items: Vec<LineItemInput>,
    pub transport: String,
    pub credit_period: String,
    pub validity_days: u32,
    pub supply_location: String,
    pub notes: Option<String>,
}

impl NewQuotation {
    pub fn new(
        account_id: impl Into<String>,
        quote_date: NaiveDate,
        supply_location: impl Into<String>,
        items: Vec<LineItemInput>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            quote_date,
            items,
            transport: String::new(),
            credit_period: String::new(),
            validity_days: DEFAULT_VALIDITY_DAYS,
            supply_location: supply_location.into(),
            notes: None,
        }
    }

    pub fn valid_for(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }
}

pub struct QuotationManager<S: ErpStorage> {
    storage: S,
    calculator: TaxCalculator,
}

impl<S: ErpStorage> QuotationManager<S> {
    pub fn new(storage: S, calculator: TaxCalculator) -> Self {
        Self {
            storage,
            calculator,
        }
    }

    /// Create a pending quotation, taxed the same way an invoice to the
    /// customer would be
    #[instrument(skip(self, actor, input), fields(account_id = %input.account_id))]
    pub async fn create_quotation(
        &mut self,
        actor: &Actor,
        input: NewQuotation,
    ) -> ErpResult<Quotation> {
        let account = self
            .storage
            .get_account(&input.account_id)
            .await?
            .ok_or_else(|| ErpError::not_found("account", &input.account_id))?;
        if account.account_type != AccountType::Customer {
            return Err(ErpError::Validation(format!(
                "Account '{}' is not a customer",
                account.name
            )));
        }
        validate_required("Supply location", &input.supply_location, 100)?;
        if input.items.is_empty() {
            return Err(ErpError::Validation(
                "Quotation must have at least one line item".to_string(),
            ));
        }
        if input.validity_days == 0 {
            return Err(ErpError::Validation(
                "Quotation validity must be at least one day".to_string(),
            ));
        }

        let totals = self
            .calculator
            .calculate(&input.items, account.gstin.as_deref())?;
        let expiry_date = input
            .quote_date
            .checked_add_days(Days::new(u64::from(input.validity_days)))
            .ok_or_else(|| {
                ErpError::Validation(format!(
                    "Validity of {} days overflows the calendar",
                    input.validity_days
                ))
            })?;

        let now = Utc::now();
        let quotation = Quotation {
            id: uuid::Uuid::new_v4().to_string(),
            quote_number: document_number(DocumentKind::Quotation, now),
            account_id: account.id,
            account_name: account.name,
            quote_date: input.quote_date,
            validity_days: input.validity_days,
            expiry_date,
            totals,
            transport: input.transport,
            credit_period: input.credit_period,
            supply_location: input.supply_location,
            status: QuotationStatus::Pending,
            notes: input.notes,
            created_by: actor.id.clone(),
            created_at: now.naive_utc(),
        };
        self.storage.save_quotation(&quotation).await?;

        info!(
            quote_number = %quotation.quote_number,
            grand_total = %quotation.totals.grand_total,
            expiry_date = %quotation.expiry_date,
            "quotation created"
        );
        Ok(quotation)
    }

    pub async fn get_quotation(&self, quotation_id: &str) -> ErpResult<Quotation> {
        self.storage
            .get_quotation(quotation_id)
            .await?
            .ok_or_else(|| ErpError::not_found("quotation", quotation_id))
    }

    pub async fn list_quotations(
        &self,
        account_id: Option<&str>,
        status: Option<QuotationStatus>,
    ) -> ErpResult<Vec<Quotation>> {
        self.storage.list_quotations(account_id, status).await
    }

    /// Record the customer's answer to a pending quotation
    pub async fn update_status(
        &mut self,
        quotation_id: &str,
        status: &str,
    ) -> ErpResult<Quotation> {
        let status = QuotationStatus::from_str(status.trim()).map_err(|_| {
            ErpError::Validation(format!("Unknown quotation status '{}'", status))
        })?;
        if !matches!(
            status,
            QuotationStatus::Accepted | QuotationStatus::Rejected
        ) {
            return Err(ErpError::Validation(format!(
                "Quotation status cannot be set to '{}'",
                status
            )));
        }

        let mut quotation = self.get_quotation(quotation_id).await?;
        if quotation.status != QuotationStatus::Pending {
            return Err(ErpError::Validation(format!(
                "Quotation {} is already {}",
                quotation.quote_number, quotation.status
            )));
        }
        quotation.status = status;
        self.storage.update_quotation(&quotation).await?;

        info!(
            quote_number = %quotation.quote_number,
            status = %quotation.status,
            "quotation updated"
        );
        Ok(quotation)
    }

    /// Expire every pending quotation whose expiry date is before `today`
    pub async fn expire_quotations(&mut self, today: NaiveDate) -> ErpResult<Vec<Quotation>> {
        let mut expired = Vec::new();
        let pending = self
            .storage
            .list_quotations(None, Some(QuotationStatus::Pending))
            .await?;
        for mut quotation in pending {
            if quotation.expiry_date >= today {
                continue;
            }
            quotation.status = QuotationStatus::Expired;
            self.storage.update_quotation(&quotation).await?;
            expired.push(quotation);
        }

        info!(count = expired.len(), %today, "quotations expired");
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountManager;
    use crate::utils::memory_storage::MemoryStorage;
    use bigdecimal::BigDecimal;

    fn actor() -> Actor {
        Actor::new("sales", Role::User)
    }

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    fn lines() -> Vec<LineItemInput> {
        vec![LineItemInput::new("Crate 20L", BigDecimal::from(10), BigDecimal::from(90))]
    }

    async fn setup() -> (QuotationManager<MemoryStorage>, Account) {
        let storage = MemoryStorage::new();
        let customer = AccountManager::new(storage.clone())
            .create_account(
                "Krishna Agro".to_string(),
                AccountType::Customer,
                Some("27AAGCB7383J1Z4".to_string()),
            )
            .await
            .unwrap();
        let calculator = TaxCalculator::new("27", BigDecimal::from(18));
        (QuotationManager::new(storage, calculator), customer)
    }

    #[tokio::test]
    async fn test_quotation_totals_and_expiry() {
        let (mut quotations, customer) = setup().await;
        let input = NewQuotation::new(&customer.id, date(3, 1), "Pune", lines());
        let quote = quotations.create_quotation(&actor(), input).await.unwrap();

        assert!(quote.quote_number.starts_with("QT-"));
        assert_eq!(quote.status, QuotationStatus::Pending);
        assert_eq!(quote.validity_days, DEFAULT_VALIDITY_DAYS);
        assert_eq!(quote.expiry_date, date(3, 16));
        assert_eq!(quote.totals.grand_total, BigDecimal::from(1062));
        assert_eq!(quote.totals.cgst, BigDecimal::from(81));
        assert_eq!(quote.account_name, "Krishna Agro");
    }

    #[tokio::test]
    async fn test_quotation_requires_customer_and_validity() {
        let (mut quotations, customer) = setup().await;
        let zero_days = NewQuotation::new(&customer.id, date(3, 1), "Pune", lines()).valid_for(0);
        assert!(matches!(
            quotations.create_quotation(&actor(), zero_days).await,
            Err(ErpError::Validation(_))
        ));

        let no_lines = NewQuotation::new(&customer.id, date(3, 1), "Pune", vec![]);
        assert!(quotations.create_quotation(&actor(), no_lines).await.is_err());

        let unknown = NewQuotation::new("missing", date(3, 1), "Pune", lines());
        assert!(matches!(
            quotations.create_quotation(&actor(), unknown).await,
            Err(ErpError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_only_pending_quotations_take_an_answer() {
        let (mut quotations, customer) = setup().await;
        let input = NewQuotation::new(&customer.id, date(3, 1), "Pune", lines());
        let quote = quotations.create_quotation(&actor(), input).await.unwrap();

        assert!(matches!(
            quotations.update_status(&quote.id, "expired").await,
            Err(ErpError::Validation(_))
        ));
        let accepted = quotations.update_status(&quote.id, "accepted").await.unwrap();
        assert_eq!(accepted.status, QuotationStatus::Accepted);
        assert!(quotations.update_status(&quote.id, "rejected").await.is_err());
    }

    #[tokio::test]
    async fn test_expiry_sweep_skips_quotes_still_valid() {
        let (mut quotations, customer) = setup().await;
        let short = NewQuotation::new(&customer.id, date(3, 1), "Pune", lines()).valid_for(5);
        let short = quotations.create_quotation(&actor(), short).await.unwrap();
        let long = NewQuotation::new(&customer.id, date(3, 1), "Pune", lines()).valid_for(30);
        quotations.create_quotation(&actor(), long).await.unwrap();

        // the last valid day is the expiry date itself
        assert!(quotations.expire_quotations(date(3, 6)).await.unwrap().is_empty());

        let expired = quotations.expire_quotations(date(3, 7)).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, short.id);
        let open = quotations
            .list_quotations(Some(&customer.id), Some(QuotationStatus::Pending))
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
    }
}
