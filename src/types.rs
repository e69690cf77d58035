//! Core types shared by every ERP module: parties, items, invoices, payments,
//! stock records and the crate-wide error type.

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::approval::GuardedAction;
use crate::tax::gst::{GstError, TaxTotals};

/// User roles recognised by the permission checks
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin,
    Director,
    Manager,
    User,
}

impl Role {
    /// Whether this role may change business configuration
    pub fn can_configure(&self) -> bool {
        matches!(self, Role::Admin | Role::Director)
    }

    /// Whether this role may approve or reject guarded actions
    pub fn can_approve(&self) -> bool {
        matches!(self, Role::Admin | Role::Director | Role::Manager)
    }
}

/// Authenticated identity performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// Kind of trading party
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountType {
    Customer,
    Supplier,
}

/// A customer or supplier that documents are raised against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub account_type: AccountType,
    /// GST registration number; the first two characters are the state code
    pub gstin: Option<String>,
    /// Lead this account was converted from
    #[serde(default)]
    pub lead_id: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Account {
    pub fn new(name: String, account_type: AccountType, gstin: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            account_type,
            gstin,
            lead_id: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// Stock keeping item master record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub item_code: String,
    pub item_name: String,
    pub category: String,
    pub uom: String,
    /// Balances below this level are reported as low stock
    pub reorder_level: BigDecimal,
    pub safety_stock: BigDecimal,
    /// Per-unit cost used to value stock when no landed cost is known
    #[serde(default)]
    pub standard_cost: BigDecimal,
    /// Per-unit landed cost from the most recent import costing
    pub landed_cost: Option<BigDecimal>,
    pub last_cost_update: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl Item {
    pub fn new(
        item_code: String,
        item_name: String,
        category: String,
        uom: String,
        reorder_level: BigDecimal,
        safety_stock: BigDecimal,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_code,
            item_name,
            category,
            uom,
            reorder_level,
            safety_stock,
            standard_cost: BigDecimal::from(0),
            landed_cost: None,
            last_cost_update: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Cost used to value stock: the landed cost when known, else the standard cost
    pub fn unit_cost(&self) -> &BigDecimal {
        self.landed_cost.as_ref().unwrap_or(&self.standard_cost)
    }
}

/// Invoice document type
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum InvoiceType {
    Sales,
    Purchase,
    CreditNote,
    DebitNote,
}

/// Invoice lifecycle status
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Partial,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    /// Open invoices carry a receivable or payable balance
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Sent | InvoiceStatus::Partial | InvoiceStatus::Overdue
        )
    }
}

/// Invoice line as entered by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemInput {
    pub item_id: Option<String>,
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    /// Discount percentage, 0 to 100
    pub discount_percent: BigDecimal,
    /// Tax percentage; the configured default applies when absent
    pub tax_percent: Option<BigDecimal>,
}

impl LineItemInput {
    pub fn new(
        description: impl Into<String>,
        quantity: BigDecimal,
        unit_price: BigDecimal,
    ) -> Self {
        Self {
            item_id: None,
            description: description.into(),
            quantity,
            unit_price,
            discount_percent: BigDecimal::from(0),
            tax_percent: None,
        }
    }

    pub fn item(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }

    pub fn discount(mut self, percent: BigDecimal) -> Self {
        self.discount_percent = percent;
        self
    }

    pub fn tax(mut self, percent: BigDecimal) -> Self {
        self.tax_percent = Some(percent);
        self
    }
}

/// Invoice header plus computed totals and settlement state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub invoice_type: InvoiceType,
    pub account_id: String,
    pub account_name: String,
    pub quotation_id: Option<String>,
    pub location: Option<String>,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub payment_terms: String,
    pub totals: TaxTotals,
    pub paid_amount: BigDecimal,
    pub balance_amount: BigDecimal,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
    /// Bumped by the store on every versioned update
    pub version: u64,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Invoice {
    pub fn grand_total(&self) -> &BigDecimal {
        &self.totals.grand_total
    }
}

/// Direction of a payment relative to the business
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentType {
    /// Money received from a customer
    Receipt,
    /// Money paid to a supplier
    Payment,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Cleared,
    Bounced,
    Cancelled,
}

/// Portion of a payment applied to one invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub invoice_id: String,
    pub amount: BigDecimal,
}

impl Allocation {
    pub fn new(invoice_id: impl Into<String>, amount: BigDecimal) -> Self {
        Self {
            invoice_id: invoice_id.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub payment_number: String,
    pub payment_type: PaymentType,
    pub account_id: Option<String>,
    pub amount: BigDecimal,
    /// Cash, cheque, NEFT, UPI and similar
    pub mode: String,
    pub reference_no: Option<String>,
    pub payment_date: NaiveDate,
    pub allocations: Vec<Allocation>,
    pub tds_percent: BigDecimal,
    pub tds_amount: BigDecimal,
    pub net_amount: BigDecimal,
    pub status: PaymentStatus,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

/// Whether a stock transaction adds to or removes from a balance
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StockDirection {
    In,
    Out,
}

/// Business event that produced a stock transaction
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StockTransactionKind {
    GoodsReceipt,
    TransferIssue,
    TransferReceipt,
    Production,
    Adjustment,
}

/// Immutable stock ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: String,
    pub item_id: String,
    pub location: String,
    /// Positive for inbound, negative for outbound
    pub quantity: BigDecimal,
    pub uom: String,
    pub direction: StockDirection,
    pub kind: StockTransactionKind,
    pub reference_no: String,
    pub batch_number: Option<String>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

/// Current quantity of one item at one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockBalance {
    pub id: String,
    pub item_id: String,
    pub location: String,
    pub quantity: BigDecimal,
    pub uom: String,
    pub last_updated: NaiveDateTime,
}

/// Errors that can occur in the ERP core
#[derive(Debug, thiserror::Error)]
pub enum ErpError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("'{action}' requires approval (request {request_id} is pending)")]
    ApprovalRequired {
        action: GuardedAction,
        request_id: String,
    },
    #[error("'{action}' was rejected (request {request_id})")]
    ApprovalRejected {
        action: GuardedAction,
        request_id: String,
    },
    #[error(transparent)]
    Tax(#[from] GstError),
}

impl ErpError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ErpError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// True when the action was blocked pending an approver's decision
    pub fn is_approval_required(&self) -> bool {
        matches!(self, ErpError::ApprovalRequired { .. })
    }
}

/// Result type for ERP operations
pub type ErpResult<T> = Result<T, ErpError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_invoice_status_rejects_unknown_labels() {
        assert_eq!(InvoiceStatus::from_str("overdue").unwrap(), InvoiceStatus::Overdue);
        assert_eq!(InvoiceStatus::Partial.to_string(), "partial");
        assert!(InvoiceStatus::from_str("unpaid").is_err());
    }

    #[test]
    fn test_role_permissions() {
        assert!(Role::Director.can_configure());
        assert!(!Role::Manager.can_configure());
        assert!(Role::Manager.can_approve());
        assert!(!Role::User.can_approve());
        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
    }

    #[test]
    fn test_approval_required_is_distinguishable() {
        let blocked = ErpError::ApprovalRequired {
            action: GuardedAction::PayrollRun,
            request_id: "req-1".to_string(),
        };
        assert!(blocked.is_approval_required());
        assert!(!ErpError::Validation("bad".to_string()).is_approval_required());
    }
}
