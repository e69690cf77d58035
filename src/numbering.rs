//! Human-readable document numbers.
//!
//! Numbers have the form `{PREFIX}-{DATE}-{RANDOM}`. They are for display and
//! cross-referencing only; every entity keeps its own UUID primary key, so
//! uniqueness here is best effort.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::types::InvoiceType;

const SUFFIX_LEN: usize = 6;
const IMPORT_SUFFIX_LEN: usize = 4;

/// Document families that carry a display number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    SalesInvoice,
    PurchaseInvoice,
    CreditNote,
    DebitNote,
    PurchaseOrder,
    ImportPurchaseOrder,
    GoodsReceipt,
    StockTransfer,
    WorkOrder,
    Sample,
    Quotation,
    Payment,
    PayrollRun,
}

impl DocumentKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::SalesInvoice => "INV",
            DocumentKind::PurchaseInvoice => "PINV",
            DocumentKind::CreditNote => "CN",
            DocumentKind::DebitNote => "DN",
            DocumentKind::PurchaseOrder => "PO",
            DocumentKind::ImportPurchaseOrder => "IPO",
            DocumentKind::GoodsReceipt => "GRN",
            DocumentKind::StockTransfer => "STR",
            DocumentKind::WorkOrder => "WO",
            DocumentKind::Sample => "SMP",
            DocumentKind::Quotation => "QT",
            DocumentKind::Payment => "PAY",
            DocumentKind::PayrollRun => "PRL",
        }
    }

    /// chrono format string for the date segment
    fn date_format(&self) -> &'static str {
        match self {
            DocumentKind::PayrollRun => "%Y%m",
            _ => "%Y%m%d",
        }
    }
}

impl From<InvoiceType> for DocumentKind {
    fn from(invoice_type: InvoiceType) -> Self {
        match invoice_type {
            InvoiceType::Sales => DocumentKind::SalesInvoice,
            InvoiceType::Purchase => DocumentKind::PurchaseInvoice,
            InvoiceType::CreditNote => DocumentKind::CreditNote,
            InvoiceType::DebitNote => DocumentKind::DebitNote,
        }
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

/// Generate a document number stamped with the given UTC instant
pub fn document_number(kind: DocumentKind, now: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        kind.prefix(),
        now.format(kind.date_format()),
        random_token(SUFFIX_LEN)
    )
}

/// Generate an import purchase order number tagged with the supplier, e.g. `IPO-ACM-20250104-7QX2`
pub fn import_po_number(supplier_name: &str, now: DateTime<Utc>) -> String {
    let mut tag: String = supplier_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_ascii_uppercase();
    if tag.is_empty() {
        tag.push('X');
    }

    format!(
        "{}-{}-{}-{}",
        DocumentKind::ImportPurchaseOrder.prefix(),
        tag,
        now.format("%Y%m%d"),
        random_token(IMPORT_SUFFIX_LEN)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_invoice_number_layout() {
        let number = document_number(DocumentKind::SalesInvoice, instant());
        let parts: Vec<&str> = number.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "INV");
        assert_eq!(parts[1], "20250307");
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_prefix_follows_invoice_type() {
        assert_eq!(DocumentKind::from(InvoiceType::Purchase).prefix(), "PINV");
        assert_eq!(DocumentKind::from(InvoiceType::CreditNote).prefix(), "CN");
        assert_eq!(DocumentKind::from(InvoiceType::DebitNote).prefix(), "DN");
    }

    #[test]
    fn test_payroll_numbers_use_month_stamp() {
        let number = document_number(DocumentKind::PayrollRun, instant());
        assert!(number.starts_with("PRL-202503-"));
    }

    #[test]
    fn test_import_po_number_carries_supplier_tag() {
        let number = import_po_number("acme polymers", instant());
        assert!(number.starts_with("IPO-ACM-20250307-"));
        assert_eq!(number.rsplit('-').next().unwrap().len(), 4);
    }

    #[test]
    fn test_same_instant_numbers_differ() {
        let a = document_number(DocumentKind::GoodsReceipt, instant());
        let b = document_number(DocumentKind::GoodsReceipt, instant());
        assert_ne!(a, b);
    }
}
