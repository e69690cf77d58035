//! # ERP Core
//!
//! Business core of a manufacturing ERP: GST invoicing, payment
//! reconciliation, stock keeping, approval-gated workflows and reporting.
//!
//! ## Features
//!
//! - **Tax and totals**: line-level rounding with CGST/SGST or IGST split by place of supply
//! - **Document numbering**: prefixed, date-stamped numbers for every document kind
//! - **Reconciliation**: payment allocation with versioned, retried invoice updates
//! - **Stock ledger**: atomic multi-line movements that never drive a balance negative
//! - **CRM**: leads converted into customers, quotations with expiry, sample feedback
//! - **Approvals**: transfers, payroll, high-wastage production and cancellations wait for sign-off
//! - **Reporting**: AR/AP aging, sales trends, top-N rankings, P&L, cash flow and KPIs
//! - **Storage abstraction**: database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use erp_core::{LineItemInput, TaxCalculator};
//! use bigdecimal::BigDecimal;
//!
//! let calculator = TaxCalculator::new("27", BigDecimal::from(18));
//! let totals = calculator
//!     .calculate(
//!         &[LineItemInput::new("Crate", BigDecimal::from(10), BigDecimal::from(90))],
//!         Some("27ABCDE1234F1Z5"),
//!     )
//!     .unwrap();
//! assert_eq!(totals.grand_total, BigDecimal::from(1062));
//!
//! // Managers need a storage backend, see `utils::MemoryStorage`:
//! // let mut erp = Erp::new(MemoryStorage::new(), ErpConfig::default()).await?;
//! ```

pub mod accounts;
pub mod approval;
pub mod config;
pub mod crm;
pub mod erp;
pub mod hrms;
pub mod inventory;
pub mod numbering;
pub mod procurement;
pub mod production;
pub mod reconciliation;
pub mod reports;
pub mod settings;
pub mod tax;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use approval::{ApprovalGuard, ApprovalRequest, ApprovalStatus, GuardedAction, PolicyRegistry};
pub use config::{init_tracing, BusinessSettings, ErpConfig};
pub use erp::Erp;
pub use numbering::{document_number, DocumentKind};
pub use tax::gst::*;
pub use traits::*;
pub use types::*;
