//! Validation utilities

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::traits::*;
use crate::types::*;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> ErpResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(ErpError::Validation(format!(
            "Amount must be positive, got {}",
            amount
        )))
    } else {
        Ok(())
    }
}

/// Validate that a named quantity or amount is zero or more
pub fn validate_non_negative(field: &str, value: &BigDecimal) -> ErpResult<()> {
    if *value < BigDecimal::from(0) {
        Err(ErpError::Validation(format!(
            "{} cannot be negative, got {}",
            field, value
        )))
    } else {
        Ok(())
    }
}

/// Validate a required free-text field such as a name or location
pub fn validate_required(field: &str, value: &str, max_len: usize) -> ErpResult<()> {
    if value.trim().is_empty() {
        return Err(ErpError::Validation(format!("{} cannot be empty", field)));
    }

    if value.len() > max_len {
        return Err(ErpError::Validation(format!(
            "{} cannot exceed {} characters",
            field, max_len
        )));
    }

    Ok(())
}

/// Validate an item code
pub fn validate_item_code(item_code: &str) -> ErpResult<()> {
    validate_required("Item code", item_code, 50)?;

    // Check for valid characters (alphanumeric, dashes, underscores)
    if !item_code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ErpError::Validation(
            "Item code can only contain alphanumeric characters, dashes, and underscores"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validate the shape of a GSTIN: 15 characters, a two digit state code,
/// then uppercase alphanumerics
pub fn validate_gstin(gstin: &str) -> ErpResult<()> {
    if !gstin.is_ascii() || gstin.len() != 15 {
        return Err(ErpError::Validation(format!(
            "GSTIN must be 15 ASCII characters: {}",
            gstin
        )));
    }

    let (state, rest) = gstin.split_at(2);
    if !state.chars().all(|c| c.is_ascii_digit()) {
        return Err(ErpError::Validation(format!(
            "GSTIN must start with a two digit state code: {}",
            gstin
        )));
    }

    if !rest
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    {
        return Err(ErpError::Validation(format!(
            "GSTIN may only contain digits and uppercase letters: {}",
            gstin
        )));
    }

    Ok(())
}

/// Parse a `YYYY-MM` period into its first day
pub fn parse_period(period: &str) -> ErpResult<NaiveDate> {
    if period.len() != 7 {
        return Err(ErpError::Validation(format!(
            "Period must be formatted YYYY-MM, got '{}'",
            period
        )));
    }
    NaiveDate::parse_from_str(&format!("{}-01", period), "%Y-%m-%d").map_err(|_| {
        ErpError::Validation(format!("Period must be formatted YYYY-MM, got '{}'", period))
    })
}

/// Enhanced invoice validator with detailed checks
pub struct EnhancedInvoiceValidator;

impl InvoiceValidator for EnhancedInvoiceValidator {
    fn validate_invoice(&self, invoice: &Invoice) -> ErpResult<()> {
        // Basic validation
        DefaultInvoiceValidator.validate_invoice(invoice)?;

        validate_required("Account name", &invoice.account_name, 200)?;

        for line in &invoice.totals.items {
            validate_required("Line description", &line.description, 500)?;
            validate_positive_amount(&line.quantity)?;
        }

        // The same item should be invoiced on one line
        let mut seen_items = std::collections::HashSet::new();
        for item_id in invoice
            .totals
            .items
            .iter()
            .filter_map(|line| line.item_id.as_deref())
        {
            if !seen_items.insert(item_id) {
                return Err(ErpError::Validation(format!(
                    "Item '{}' appears on more than one line",
                    item_id
                )));
            }
        }

        Ok(())
    }
}
