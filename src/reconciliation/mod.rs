//! Balance and status reconciliation between payments and invoices.
//!
//! Every invoice write goes through a versioned compare-and-swap, retried a
//! bounded number of times, so concurrent payments against one invoice
//! cannot lose each other's updates.

use bigdecimal::BigDecimal;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::tax::gst::round_money;
use crate::traits::ErpStorage;
use crate::types::*;
use crate::utils::validation::validate_positive_amount;

/// Recompute `balance_amount` and the settlement status from `paid_amount`.
///
/// The balance is clamped at zero; an invoice with nothing outstanding is
/// `Paid`, one with something paid is `Partial`. An unpaid invoice keeps its
/// status, except that a `Partial` or `Paid` one falls back to `Sent`.
pub fn settle(invoice: &mut Invoice) {
    let zero = BigDecimal::from(0);
    recompute_balance(invoice);

    invoice.status = if invoice.balance_amount <= zero {
        InvoiceStatus::Paid
    } else if invoice.paid_amount > zero {
        InvoiceStatus::Partial
    } else {
        match invoice.status {
            InvoiceStatus::Partial | InvoiceStatus::Paid => InvoiceStatus::Sent,
            other => other,
        }
    };
}

/// `balance_amount = max(0, grand_total - paid_amount)`, status untouched
fn recompute_balance(invoice: &mut Invoice) {
    let zero = BigDecimal::from(0);
    let outstanding = round_money(&(invoice.grand_total() - &invoice.paid_amount));
    invoice.balance_amount = if outstanding < zero { zero } else { outstanding };
}

/// Add a payment to an invoice
pub fn apply_payment(invoice: &mut Invoice, amount: &BigDecimal) -> ErpResult<()> {
    validate_positive_amount(amount)?;
    if invoice.status == InvoiceStatus::Cancelled {
        return Err(ErpError::Validation(format!(
            "Invoice {} is cancelled and cannot take payments",
            invoice.invoice_number
        )));
    }

    invoice.paid_amount = round_money(&(&invoice.paid_amount + amount));
    settle(invoice);
    Ok(())
}

/// Take a previously applied payment back off an invoice.
///
/// The balance is always recomputed; a cancelled invoice keeps its status.
pub fn reverse_payment(invoice: &mut Invoice, amount: &BigDecimal) -> ErpResult<()> {
    validate_positive_amount(amount)?;

    let zero = BigDecimal::from(0);
    let remaining = round_money(&(&invoice.paid_amount - amount));
    invoice.paid_amount = if remaining < zero { zero } else { remaining };

    if invoice.status == InvoiceStatus::Cancelled {
        recompute_balance(invoice);
    } else {
        settle(invoice);
    }
    Ok(())
}

/// Check payment allocations against the payment amount.
///
/// Each allocation must be positive and together they may not exceed the
/// amount paid. Unallocated remainder is allowed (on-account payments).
pub fn validate_allocations(amount: &BigDecimal, allocations: &[Allocation]) -> ErpResult<()> {
    for allocation in allocations {
        if allocation.invoice_id.trim().is_empty() {
            return Err(ErpError::Validation(
                "Allocation must reference an invoice".to_string(),
            ));
        }
        validate_positive_amount(&allocation.amount)?;
    }

    let allocated: BigDecimal = allocations.iter().map(|a| &a.amount).sum();
    if allocated > *amount {
        return Err(ErpError::Validation(format!(
            "Allocations total {} exceeds payment amount {}",
            allocated, amount
        )));
    }
    Ok(())
}

/// Load an invoice, mutate it and write it back with a version check,
/// retrying on a stale version up to `max_attempts` times.
pub(crate) async fn update_invoice_with_retry<S, F>(
    storage: &mut S,
    max_attempts: u32,
    invoice_id: &str,
    mut mutate: F,
) -> ErpResult<Invoice>
where
    S: ErpStorage,
    F: FnMut(&mut Invoice) -> ErpResult<()> + Send,
{
    for attempt in 1..=max_attempts {
        let mut invoice = storage
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| ErpError::not_found("invoice", invoice_id))?;
        let expected_version = invoice.version;

        mutate(&mut invoice)?;
        invoice.updated_at = Utc::now().naive_utc();

        if storage
            .update_invoice_versioned(&invoice, expected_version)
            .await?
        {
            invoice.version = expected_version + 1;
            return Ok(invoice);
        }
        warn!(invoice_id, attempt, "stale invoice version, retrying");
    }

    Err(ErpError::Conflict(format!(
        "invoice {} was modified concurrently {} times",
        invoice_id, max_attempts
    )))
}

/// Applies and reverses payment allocations against invoices
#[derive(Debug, Clone)]
pub struct ReconciliationEngine<S: ErpStorage> {
    storage: S,
    max_attempts: u32,
}

impl<S: ErpStorage> ReconciliationEngine<S> {
    pub fn new(storage: S, max_attempts: u32) -> Self {
        Self {
            storage,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Check that every allocated invoice exists and can take a payment
    pub async fn precheck(&self, allocations: &[Allocation]) -> ErpResult<()> {
        for allocation in allocations {
            let invoice = self
                .storage
                .get_invoice(&allocation.invoice_id)
                .await?
                .ok_or_else(|| ErpError::not_found("invoice", &allocation.invoice_id))?;
            if invoice.status == InvoiceStatus::Cancelled {
                return Err(ErpError::Validation(format!(
                    "Invoice {} is cancelled and cannot take payments",
                    invoice.invoice_number
                )));
            }
        }
        Ok(())
    }

    /// Apply each allocation to its invoice
    pub async fn apply_allocations(
        &mut self,
        allocations: &[Allocation],
    ) -> ErpResult<Vec<Invoice>> {
        let mut updated = Vec::with_capacity(allocations.len());
        for allocation in allocations {
            let invoice = update_invoice_with_retry(
                &mut self.storage,
                self.max_attempts,
                &allocation.invoice_id,
                |invoice| apply_payment(invoice, &allocation.amount),
            )
            .await?;

            info!(
                invoice_number = %invoice.invoice_number,
                amount = %allocation.amount,
                paid = %invoice.paid_amount,
                balance = %invoice.balance_amount,
                status = %invoice.status,
                "payment applied"
            );
            updated.push(invoice);
        }
        Ok(updated)
    }

    /// Undo each allocation on its invoice
    pub async fn reverse_allocations(
        &mut self,
        allocations: &[Allocation],
    ) -> ErpResult<Vec<Invoice>> {
        let mut updated = Vec::with_capacity(allocations.len());
        for allocation in allocations {
            let invoice = update_invoice_with_retry(
                &mut self.storage,
                self.max_attempts,
                &allocation.invoice_id,
                |invoice| reverse_payment(invoice, &allocation.amount),
            )
            .await?;

            debug!(
                invoice_number = %invoice.invoice_number,
                amount = %allocation.amount,
                balance = %invoice.balance_amount,
                "payment reversed"
            );
            updated.push(invoice);
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::gst::TaxCalculator;
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::NaiveDate;

    fn invoice_for(total_qty: i64, price: i64) -> Invoice {
        let calculator = TaxCalculator::new("27", BigDecimal::from(18));
        let totals = calculator
            .calculate(
                &[LineItemInput::new(
                    "Widget",
                    BigDecimal::from(total_qty),
                    BigDecimal::from(price),
                )
                .discount(BigDecimal::from(10))],
                None,
            )
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let now = Utc::now().naive_utc();
        Invoice {
            id: uuid::Uuid::new_v4().to_string(),
            invoice_number: "INV-20250101-TEST01".to_string(),
            invoice_type: InvoiceType::Sales,
            account_id: "acc-1".to_string(),
            account_name: "Acme".to_string(),
            quotation_id: None,
            location: None,
            invoice_date: date,
            due_date: date,
            payment_terms: "30 days".to_string(),
            paid_amount: BigDecimal::from(0),
            balance_amount: totals.grand_total.clone(),
            totals,
            status: InvoiceStatus::Sent,
            notes: None,
            version: 0,
            created_by: "tester".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn assert_balanced(invoice: &Invoice) {
        let zero = BigDecimal::from(0);
        assert!(invoice.balance_amount >= zero);
        if invoice.paid_amount <= *invoice.grand_total() {
            assert_eq!(
                &invoice.paid_amount + &invoice.balance_amount,
                *invoice.grand_total()
            );
        }
        assert_eq!(
            invoice.status == InvoiceStatus::Paid,
            invoice.balance_amount <= zero
        );
    }

    #[test]
    fn test_partial_then_full_payment() {
        let mut invoice = invoice_for(10, 100);
        assert_eq!(*invoice.grand_total(), BigDecimal::from(1062));

        apply_payment(&mut invoice, &BigDecimal::from(500)).unwrap();
        assert_eq!(invoice.paid_amount, BigDecimal::from(500));
        assert_eq!(invoice.balance_amount, BigDecimal::from(562));
        assert_eq!(invoice.status, InvoiceStatus::Partial);
        assert_balanced(&invoice);

        apply_payment(&mut invoice, &BigDecimal::from(562)).unwrap();
        assert_eq!(invoice.balance_amount, BigDecimal::from(0));
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_balanced(&invoice);
    }

    #[test]
    fn test_overpayment_clamps_balance() {
        let mut invoice = invoice_for(1, 100);
        apply_payment(&mut invoice, &BigDecimal::from(500)).unwrap();
        assert_eq!(invoice.balance_amount, BigDecimal::from(0));
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }

    #[test]
    fn test_reversal_restores_status() {
        let mut invoice = invoice_for(10, 100);
        apply_payment(&mut invoice, &BigDecimal::from(1062)).unwrap();
        reverse_payment(&mut invoice, &BigDecimal::from(562)).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Partial);
        assert_balanced(&invoice);

        reverse_payment(&mut invoice, &BigDecimal::from(500)).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert_eq!(invoice.balance_amount, BigDecimal::from(1062));
    }

    #[test]
    fn test_reversal_on_cancelled_invoice_restores_balance() {
        let mut invoice = invoice_for(10, 100);
        apply_payment(&mut invoice, &BigDecimal::from(500)).unwrap();
        invoice.status = InvoiceStatus::Cancelled;

        reverse_payment(&mut invoice, &BigDecimal::from(500)).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Cancelled);
        assert_eq!(invoice.paid_amount, BigDecimal::from(0));
        assert_eq!(invoice.balance_amount, BigDecimal::from(1062));
        assert_eq!(
            &invoice.paid_amount + &invoice.balance_amount,
            *invoice.grand_total()
        );
    }

    #[test]
    fn test_cancelled_invoice_rejects_payment() {
        let mut invoice = invoice_for(1, 100);
        invoice.status = InvoiceStatus::Cancelled;
        assert!(matches!(
            apply_payment(&mut invoice, &BigDecimal::from(10)),
            Err(ErpError::Validation(_))
        ));
    }

    #[test]
    fn test_allocations_cannot_exceed_payment() {
        let allocations = vec![
            Allocation::new("a", BigDecimal::from(300)),
            Allocation::new("b", BigDecimal::from(300)),
        ];
        assert!(validate_allocations(&BigDecimal::from(500), &allocations).is_err());
        assert!(validate_allocations(&BigDecimal::from(600), &allocations).is_ok());
        assert!(validate_allocations(
            &BigDecimal::from(600),
            &[Allocation::new("a", BigDecimal::from(0))]
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_engine_bumps_version() {
        let mut storage = MemoryStorage::new();
        let invoice = invoice_for(10, 100);
        storage.save_invoice(&invoice).await.unwrap();

        let mut engine = ReconciliationEngine::new(storage.clone(), 3);
        let updated = engine
            .apply_allocations(&[Allocation::new(&invoice.id, BigDecimal::from(500))])
            .await
            .unwrap();

        assert_eq!(updated[0].version, 1);
        let stored = storage.get_invoice(&invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.balance_amount, BigDecimal::from(562));
    }

    #[tokio::test]
    async fn test_stale_version_is_refused() {
        let mut storage = MemoryStorage::new();
        let mut invoice = invoice_for(10, 100);
        storage.save_invoice(&invoice).await.unwrap();

        apply_payment(&mut invoice, &BigDecimal::from(100)).unwrap();
        assert!(storage.update_invoice_versioned(&invoice, 0).await.unwrap());
        assert!(!storage.update_invoice_versioned(&invoice, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_allocations_do_not_lose_updates() {
        let mut storage = MemoryStorage::new();
        let invoice = invoice_for(10, 100);
        storage.save_invoice(&invoice).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let mut engine = ReconciliationEngine::new(storage.clone(), 50);
            let allocation = Allocation::new(&invoice.id, BigDecimal::from(100));
            handles.push(tokio::spawn(async move {
                engine.apply_allocations(&[allocation]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = storage.get_invoice(&invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.paid_amount, BigDecimal::from(500));
        assert_eq!(stored.balance_amount, BigDecimal::from(562));
        assert_eq!(stored.version, 5);
    }
}
