//! Invoice creation and lifecycle management

use bigdecimal::BigDecimal;
use chrono::{Days, NaiveDate, Utc};
use std::str::FromStr;
use tracing::{info, instrument};

use crate::crm::{Quotation, QuotationStatus};
use crate::numbering::{document_number, DocumentKind};
use crate::reconciliation::update_invoice_with_retry;
use crate::tax::gst::TaxCalculator;
use crate::traits::*;
use crate::types::*;

/// Input for a new invoice
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub invoice_type: InvoiceType,
    pub account_id: String,
    pub quotation_id: Option<String>,
    pub location: Option<String>,
    pub invoice_date: NaiveDate,
    /// Free text such as "45 days"; the leading number is the credit period
    pub payment_terms: String,
    pub items: Vec<LineItemInput>,
    pub notes: Option<String>,
}

impl NewInvoice {
    pub fn new(
        invoice_type: InvoiceType,
        account_id: impl Into<String>,
        invoice_date: NaiveDate,
        items: Vec<LineItemInput>,
    ) -> Self {
        Self {
            invoice_type,
            account_id: account_id.into(),
            quotation_id: None,
            location: None,
            invoice_date,
            payment_terms: String::new(),
            items,
            notes: None,
        }
    }

    pub fn terms(mut self, payment_terms: impl Into<String>) -> Self {
        self.payment_terms = payment_terms.into();
        self
    }

    /// Raise the invoice against an open quotation to the same customer
    pub fn quotation(mut self, quotation_id: impl Into<String>) -> Self {
        self.quotation_id = Some(quotation_id.into());
        self
    }
}

/// Credit period in days from payment terms like "45 days", else the default
pub fn payment_days(payment_terms: &str, default_days: i64) -> i64 {
    payment_terms
        .split_whitespace()
        .next()
        .and_then(|token| token.parse::<i64>().ok())
        .filter(|days| *days >= 0)
        .unwrap_or(default_days)
}

/// Invoice manager for creating invoices and driving their status
pub struct InvoiceManager<S: ErpStorage> {
    pub(crate) storage: S,
    calculator: TaxCalculator,
    default_terms_days: i64,
    max_attempts: u32,
    validator: Box<dyn InvoiceValidator>,
}

impl<S: ErpStorage> InvoiceManager<S> {
    pub fn new(
        storage: S,
        calculator: TaxCalculator,
        default_terms_days: i64,
        max_attempts: u32,
    ) -> Self {
        Self {
            storage,
            calculator,
            default_terms_days,
            max_attempts: max_attempts.max(1),
            validator: Box::new(DefaultInvoiceValidator),
        }
    }

    /// Replace the validator run before an invoice is first saved
    pub fn with_validator(mut self, validator: Box<dyn InvoiceValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Create a draft invoice with computed totals and due date
    #[instrument(skip(self, input), fields(account_id = %input.account_id))]
    pub async fn create_invoice(&mut self, actor: &Actor, input: NewInvoice) -> ErpResult<Invoice> {
        let account = self
            .storage
            .get_account(&input.account_id)
            .await?
            .ok_or_else(|| ErpError::not_found("account", &input.account_id))?;

        let quotation = match input.quotation_id {
            Some(ref quotation_id) => Some(self.open_quotation(quotation_id, &account).await?),
            None => None,
        };

        let totals = self
            .calculator
            .calculate(&input.items, account.gstin.as_deref())?;

        let days = payment_days(&input.payment_terms, self.default_terms_days);
        let due_date = input
            .invoice_date
            .checked_add_days(Days::new(days.max(0) as u64))
            .ok_or_else(|| {
                ErpError::Validation(format!(
                    "payment terms of {} days overflow the calendar",
                    days
                ))
            })?;

        let now = Utc::now();
        let invoice = Invoice {
            id: uuid::Uuid::new_v4().to_string(),
            invoice_number: document_number(DocumentKind::from(input.invoice_type), now),
            invoice_type: input.invoice_type,
            account_id: account.id.clone(),
            account_name: account.name.clone(),
            quotation_id: input.quotation_id,
            location: input.location,
            invoice_date: input.invoice_date,
            due_date,
            payment_terms: input.payment_terms,
            paid_amount: BigDecimal::from(0),
            balance_amount: totals.grand_total.clone(),
            totals,
            status: InvoiceStatus::Draft,
            notes: input.notes,
            version: 0,
            created_by: actor.id.clone(),
            created_at: now.naive_utc(),
            updated_at: now.naive_utc(),
        };

        self.validator.validate_invoice(&invoice)?;
        self.storage.save_invoice(&invoice).await?;

        if let Some(mut quotation) = quotation.filter(|q| q.status == QuotationStatus::Pending) {
            quotation.status = QuotationStatus::Accepted;
            self.storage.update_quotation(&quotation).await?;
            info!(quote_number = %quotation.quote_number, "quotation accepted by invoice");
        }

        info!(
            invoice_number = %invoice.invoice_number,
            invoice_type = %invoice.invoice_type,
            grand_total = %invoice.totals.grand_total,
            due_date = %invoice.due_date,
            "invoice created"
        );
        Ok(invoice)
    }

    async fn open_quotation(&self, quotation_id: &str, account: &Account) -> ErpResult<Quotation> {
        let quotation = self
            .storage
            .get_quotation(quotation_id)
            .await?
            .ok_or_else(|| ErpError::not_found("quotation", quotation_id))?;
        if quotation.account_id != account.id {
            return Err(ErpError::Validation(format!(
                "Quotation {} was issued to another account",
                quotation.quote_number
            )));
        }
        if !quotation.is_open() {
            return Err(ErpError::Validation(format!(
                "Quotation {} is {}",
                quotation.quote_number, quotation.status
            )));
        }
        Ok(quotation)
    }

    /// Get an invoice by ID, returning an error if not found
    pub async fn get_invoice(&self, invoice_id: &str) -> ErpResult<Invoice> {
        self.storage
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| ErpError::not_found("invoice", invoice_id))
    }

    pub async fn list_invoices(&self, filter: &InvoiceFilter) -> ErpResult<Vec<Invoice>> {
        self.storage.list_invoices(filter).await
    }

    /// Move a draft invoice to sent
    pub async fn issue_invoice(&mut self, invoice_id: &str) -> ErpResult<Invoice> {
        let invoice = update_invoice_with_retry(
            &mut self.storage,
            self.max_attempts,
            invoice_id,
            |invoice| {
                if invoice.status != InvoiceStatus::Draft {
                    return Err(ErpError::Validation(format!(
                        "Only draft invoices can be issued; {} is {}",
                        invoice.invoice_number, invoice.status
                    )));
                }
                invoice.status = InvoiceStatus::Sent;
                Ok(())
            },
        )
        .await?;

        info!(invoice_number = %invoice.invoice_number, "invoice issued");
        Ok(invoice)
    }

    /// Set an invoice status from its label.
    ///
    /// Only `draft`, `sent`, `overdue` and `cancelled` may be set directly;
    /// `partial` and `paid` follow from payments. Settled invoices are closed,
    /// and an invoice that has taken payments cannot go back to draft or sent.
    pub async fn update_status(&mut self, invoice_id: &str, status: &str) -> ErpResult<Invoice> {
        let status = InvoiceStatus::from_str(status.trim())
            .map_err(|_| ErpError::Validation(format!("Unknown invoice status '{}'", status)))?;

        if matches!(status, InvoiceStatus::Partial | InvoiceStatus::Paid) {
            return Err(ErpError::Validation(format!(
                "Status '{}' is derived from payments and cannot be set directly",
                status
            )));
        }

        let invoice = update_invoice_with_retry(
            &mut self.storage,
            self.max_attempts,
            invoice_id,
            |invoice| {
                if invoice.status == InvoiceStatus::Paid {
                    return Err(ErpError::Validation(format!(
                        "Invoice {} is settled",
                        invoice.invoice_number
                    )));
                }
                let has_payments = invoice.paid_amount > BigDecimal::from(0);
                if has_payments && matches!(status, InvoiceStatus::Draft | InvoiceStatus::Sent) {
                    return Err(ErpError::Validation(format!(
                        "Invoice {} has payments and cannot return to {}",
                        invoice.invoice_number, status
                    )));
                }
                invoice.status = status;
                Ok(())
            },
        )
        .await?;

        info!(
            invoice_number = %invoice.invoice_number,
            status = %invoice.status,
            "invoice status updated"
        );
        Ok(invoice)
    }

    /// Mark every sent or partially paid invoice due before `today` as overdue
    pub async fn mark_overdue(&mut self, today: NaiveDate) -> ErpResult<Vec<Invoice>> {
        let candidates: Vec<String> = self
            .storage
            .list_invoices(&InvoiceFilter::default())
            .await?
            .into_iter()
            .filter(|invoice| is_overdue_candidate(invoice, today))
            .map(|invoice| invoice.id)
            .collect();

        let mut updated = Vec::with_capacity(candidates.len());
        for invoice_id in candidates {
            let invoice = update_invoice_with_retry(
                &mut self.storage,
                self.max_attempts,
                &invoice_id,
                |invoice| {
                    if is_overdue_candidate(invoice, today) {
                        invoice.status = InvoiceStatus::Overdue;
                    }
                    Ok(())
                },
            )
            .await?;
            if invoice.status == InvoiceStatus::Overdue {
                updated.push(invoice);
            }
        }

        info!(count = updated.len(), as_of = %today, "invoices marked overdue");
        Ok(updated)
    }
}

fn is_overdue_candidate(invoice: &Invoice, today: NaiveDate) -> bool {
    matches!(invoice.status, InvoiceStatus::Sent | InvoiceStatus::Partial)
        && invoice.due_date < today
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn actor() -> Actor {
        Actor::new("clerk", Role::User)
    }

    async fn setup(gstin: Option<&str>) -> (InvoiceManager<MemoryStorage>, Account) {
        let mut storage = MemoryStorage::new();
        let account = Account::new(
            "Acme".to_string(),
            AccountType::Customer,
            gstin.map(str::to_string),
        );
        storage.save_account(&account).await.unwrap();
        let calculator = TaxCalculator::new("27", BigDecimal::from(18));
        (InvoiceManager::new(storage, calculator, 30, 3), account)
    }

    fn widget_line() -> LineItemInput {
        LineItemInput::new("Widget", BigDecimal::from(10), BigDecimal::from(100))
            .discount(BigDecimal::from(10))
    }

    #[test]
    fn test_payment_days() {
        assert_eq!(payment_days("45 days", 30), 45);
        assert_eq!(payment_days("", 30), 30);
        assert_eq!(payment_days("Net thirty", 30), 30);
        assert_eq!(payment_days("0 days", 30), 0);
    }

    #[tokio::test]
    async fn test_create_invoice() {
        let (mut manager, account) = setup(Some("27AAPFU0939F1ZV")).await;
        let input = NewInvoice::new(
            InvoiceType::Sales,
            &account.id,
            date(2025, 1, 10),
            vec![widget_line()],
        )
        .terms("45 days");

        let invoice = manager.create_invoice(&actor(), input).await.unwrap();

        assert!(invoice.invoice_number.starts_with("INV-"));
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert_eq!(invoice.due_date, date(2025, 2, 24));
        assert_eq!(invoice.totals.grand_total, BigDecimal::from(1062));
        assert_eq!(invoice.totals.cgst, BigDecimal::from(81));
        assert_eq!(invoice.balance_amount, BigDecimal::from(1062));
        assert_eq!(invoice.account_name, "Acme");
    }

    #[tokio::test]
    async fn test_purchase_invoice_from_other_state() {
        let (mut manager, account) = setup(Some("29AAGCB7383J1Z4")).await;
        let input = NewInvoice::new(
            InvoiceType::Purchase,
            &account.id,
            date(2025, 1, 10),
            vec![widget_line()],
        );

        let invoice = manager.create_invoice(&actor(), input).await.unwrap();
        assert!(invoice.invoice_number.starts_with("PINV-"));
        assert_eq!(invoice.totals.igst, BigDecimal::from(162));
        assert_eq!(invoice.due_date, date(2025, 2, 9));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let (mut manager, _) = setup(None).await;
        let input = NewInvoice::new(
            InvoiceType::Sales,
            "missing",
            date(2025, 1, 10),
            vec![widget_line()],
        );
        assert!(matches!(
            manager.create_invoice(&actor(), input).await,
            Err(ErpError::NotFound { entity: "account", .. })
        ));
    }

    #[tokio::test]
    async fn test_status_labels_are_checked() {
        let (mut manager, account) = setup(None).await;
        let input = NewInvoice::new(
            InvoiceType::Sales,
            &account.id,
            date(2025, 1, 10),
            vec![widget_line()],
        );
        let invoice = manager.create_invoice(&actor(), input).await.unwrap();

        assert!(matches!(
            manager.update_status(&invoice.id, "unpaid").await,
            Err(ErpError::Validation(_))
        ));
        assert!(matches!(
            manager.update_status(&invoice.id, "paid").await,
            Err(ErpError::Validation(_))
        ));

        let cancelled = manager.update_status(&invoice.id, "cancelled").await.unwrap();
        assert_eq!(cancelled.status, InvoiceStatus::Cancelled);
        assert_eq!(cancelled.version, 1);
    }

    #[tokio::test]
    async fn test_issue_and_mark_overdue() {
        let (mut manager, account) = setup(None).await;
        let input = NewInvoice::new(
            InvoiceType::Sales,
            &account.id,
            date(2025, 1, 10),
            vec![widget_line()],
        );
        let invoice = manager.create_invoice(&actor(), input).await.unwrap();

        // Drafts are never swept
        assert!(manager.mark_overdue(date(2025, 6, 1)).await.unwrap().is_empty());

        manager.issue_invoice(&invoice.id).await.unwrap();
        assert!(manager.issue_invoice(&invoice.id).await.is_err());

        assert!(manager.mark_overdue(date(2025, 2, 9)).await.unwrap().is_empty());
        let overdue = manager.mark_overdue(date(2025, 2, 10)).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].status, InvoiceStatus::Overdue);
    }

    #[tokio::test]
    async fn test_invoice_against_quotation_accepts_it() {
        use crate::crm::{NewQuotation, QuotationManager};

        let (mut manager, account) = setup(Some("27AAPFU0939F1ZV")).await;
        let calculator = TaxCalculator::new("27", BigDecimal::from(18));
        let mut quotations = QuotationManager::new(manager.storage.clone(), calculator);
        let quote_date = date(2025, 1, 10);
        let quote = quotations
            .create_quotation(
                &actor(),
                NewQuotation::new(&account.id, quote_date, "Nashik", vec![widget_line()]),
            )
            .await
            .unwrap();

        let input = NewInvoice::new(
            InvoiceType::Sales,
            &account.id,
            quote_date,
            vec![widget_line()],
        )
        .quotation(&quote.id);
        let invoice = manager.create_invoice(&actor(), input).await.unwrap();
        assert_eq!(invoice.quotation_id.as_deref(), Some(quote.id.as_str()));
        assert_eq!(
            quotations.get_quotation(&quote.id).await.unwrap().status,
            QuotationStatus::Accepted
        );
    }

    #[tokio::test]
    async fn test_invoice_rejects_closed_or_foreign_quotation() {
        use crate::crm::{NewQuotation, QuotationManager};

        let (mut manager, account) = setup(None).await;
        let other = Account::new("Other".to_string(), AccountType::Customer, None);
        manager.storage.save_account(&other).await.unwrap();
        let calculator = TaxCalculator::new("27", BigDecimal::from(18));
        let mut quotations = QuotationManager::new(manager.storage.clone(), calculator);
        let quote_date = date(2025, 1, 10);
        let quote = quotations
            .create_quotation(
                &actor(),
                NewQuotation::new(&account.id, quote_date, "Nashik", vec![widget_line()]),
            )
            .await
            .unwrap();

        let foreign = NewInvoice::new(
            InvoiceType::Sales,
            &other.id,
            quote_date,
            vec![widget_line()],
        )
        .quotation(&quote.id);
        assert!(matches!(
            manager.create_invoice(&actor(), foreign).await,
            Err(ErpError::Validation(_))
        ));

        quotations.update_status(&quote.id, "rejected").await.unwrap();
        let rejected =
            NewInvoice::new(InvoiceType::Sales, &account.id, quote_date, vec![widget_line()])
                .quotation(&quote.id);
        assert!(matches!(
            manager.create_invoice(&actor(), rejected).await,
            Err(ErpError::Validation(_))
        ));
    }
}
