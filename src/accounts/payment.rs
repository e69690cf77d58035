//! Payment and receipt recording

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use tracing::{info, instrument};

use crate::numbering::{document_number, DocumentKind};
use crate::reconciliation::{validate_allocations, ReconciliationEngine};
use crate::tax::gst::round_money;
use crate::traits::ErpStorage;
use crate::types::*;
use crate::utils::validation::{validate_non_negative, validate_positive_amount};

/// Input for a new payment or receipt
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payment_type: PaymentType,
    pub account_id: Option<String>,
    pub amount: BigDecimal,
    pub mode: String,
    pub reference_no: Option<String>,
    pub payment_date: NaiveDate,
    pub allocations: Vec<Allocation>,
    /// Tax deducted at source, as a percentage of the amount
    pub tds_percent: BigDecimal,
    pub notes: Option<String>,
}

impl NewPayment {
    pub fn new(
        payment_type: PaymentType,
        amount: BigDecimal,
        mode: impl Into<String>,
        payment_date: NaiveDate,
    ) -> Self {
        Self {
            payment_type,
            account_id: None,
            amount,
            mode: mode.into(),
            reference_no: None,
            payment_date,
            allocations: Vec::new(),
            tds_percent: BigDecimal::from(0),
            notes: None,
        }
    }

    pub fn allocate(mut self, invoice_id: impl Into<String>, amount: BigDecimal) -> Self {
        self.allocations.push(Allocation::new(invoice_id, amount));
        self
    }

    pub fn tds(mut self, percent: BigDecimal) -> Self {
        self.tds_percent = percent;
        self
    }
}

/// Records payments and keeps invoice balances in step with them
pub struct PaymentManager<S: ErpStorage> {
    storage: S,
    engine: ReconciliationEngine<S>,
}

impl<S: ErpStorage + Clone> PaymentManager<S> {
    pub fn new(storage: S, max_attempts: u32) -> Self {
        Self {
            engine: ReconciliationEngine::new(storage.clone(), max_attempts),
            storage,
        }
    }

    /// Record a cleared payment and apply its allocations to the invoices.
    ///
    /// Allocations are applied at their gross value; TDS only affects the
    /// payment's net amount.
    #[instrument(skip(self, input), fields(amount = %input.amount))]
    pub async fn record_payment(&mut self, actor: &Actor, input: NewPayment) -> ErpResult<Payment> {
        validate_positive_amount(&input.amount)?;
        validate_non_negative("TDS percent", &input.tds_percent)?;
        if input.tds_percent > BigDecimal::from(100) {
            return Err(ErpError::Validation(
                "TDS percent cannot exceed 100".to_string(),
            ));
        }
        validate_allocations(&input.amount, &input.allocations)?;
        self.engine.precheck(&input.allocations).await?;

        if let Some(ref account_id) = input.account_id {
            if self.storage.get_account(account_id).await?.is_none() {
                return Err(ErpError::not_found("account", account_id));
            }
        }

        let tds_amount = round_money(&(&input.amount * &input.tds_percent / BigDecimal::from(100)));
        let net_amount = &input.amount - &tds_amount;
        let now = Utc::now();

        let payment = Payment {
            id: uuid::Uuid::new_v4().to_string(),
            payment_number: document_number(DocumentKind::Payment, now),
            payment_type: input.payment_type,
            account_id: input.account_id,
            amount: input.amount,
            mode: input.mode,
            reference_no: input.reference_no,
            payment_date: input.payment_date,
            allocations: input.allocations,
            tds_percent: input.tds_percent,
            tds_amount,
            net_amount,
            status: PaymentStatus::Cleared,
            notes: input.notes,
            created_by: actor.id.clone(),
            created_at: now.naive_utc(),
        };

        self.storage.save_payment(&payment).await?;
        self.engine.apply_allocations(&payment.allocations).await?;

        info!(
            payment_number = %payment.payment_number,
            payment_type = %payment.payment_type,
            amount = %payment.amount,
            allocations = payment.allocations.len(),
            "payment recorded"
        );
        Ok(payment)
    }

    /// Get a payment by ID, returning an error if not found
    pub async fn get_payment(&self, payment_id: &str) -> ErpResult<Payment> {
        self.storage
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| ErpError::not_found("payment", payment_id))
    }

    pub async fn list_payments(
        &self,
        payment_type: Option<PaymentType>,
    ) -> ErpResult<Vec<Payment>> {
        self.storage.list_payments(payment_type).await
    }

    /// Change a payment's status.
    ///
    /// Bouncing or cancelling a payment takes its allocations back off the
    /// invoices. Bounced and cancelled payments are final.
    pub async fn update_payment_status(
        &mut self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> ErpResult<Payment> {
        let mut payment = self.get_payment(payment_id).await?;

        if payment.status == status {
            return Ok(payment);
        }
        if matches!(payment.status, PaymentStatus::Bounced | PaymentStatus::Cancelled) {
            return Err(ErpError::Validation(format!(
                "Payment {} is already {}",
                payment.payment_number, payment.status
            )));
        }

        let reverses = matches!(status, PaymentStatus::Bounced | PaymentStatus::Cancelled);
        payment.status = status;
        self.storage.update_payment(&payment).await?;

        if reverses {
            self.engine.reverse_allocations(&payment.allocations).await?;
        }

        info!(
            payment_number = %payment.payment_number,
            status = %payment.status,
            reversed = reverses,
            "payment status updated"
        );
        Ok(payment)
    }
}
