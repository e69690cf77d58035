//! Stock transfers between locations

use bigdecimal::BigDecimal;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use tracing::{info, instrument};

use crate::approval::{ApprovalGuard, Clearance, GuardedAction, GuardedAttempt};
use crate::inventory::stock::{StockLedger, StockMovement};
use crate::numbering::{document_number, DocumentKind};
use crate::traits::ErpStorage;
use crate::types::*;
use crate::utils::validation::{validate_positive_amount, validate_required};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Issued,
    Received,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferLine {
    pub item_id: String,
    pub quantity: BigDecimal,
}

impl TransferLine {
    pub fn new(item_id: impl Into<String>, quantity: BigDecimal) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockTransfer {
    pub id: String,
    pub transfer_number: String,
    pub from_location: String,
    pub to_location: String,
    pub lines: Vec<TransferLine>,
    pub status: TransferStatus,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub issued_by: Option<String>,
    pub issued_at: Option<NaiveDateTime>,
    pub received_by: Option<String>,
    pub received_at: Option<NaiveDateTime>,
}

/// Drives transfers through pending, issued and received.
///
/// Issuing is an approval-gated action; it moves stock out of the source
/// location. Receiving moves it into the destination.
pub struct TransferManager<S: ErpStorage> {
    storage: S,
    stock: StockLedger<S>,
    guard: ApprovalGuard<S>,
}

impl<S: ErpStorage + Clone> TransferManager<S> {
    pub fn new(storage: S, guard: ApprovalGuard<S>) -> Self {
        Self {
            stock: StockLedger::new(storage.clone()),
            storage,
            guard,
        }
    }

    pub async fn create_transfer(
        &mut self,
        actor: &Actor,
        from_location: &str,
        to_location: &str,
        lines: Vec<TransferLine>,
    ) -> ErpResult<StockTransfer> {
        validate_required("Source location", from_location, 100)?;
        validate_required("Destination location", to_location, 100)?;
        if from_location == to_location {
            return Err(ErpError::Validation(
                "Source and destination locations must differ".to_string(),
            ));
        }
        if lines.is_empty() {
            return Err(ErpError::Validation(
                "Transfer must have at least one line".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for line in &lines {
            validate_positive_amount(&line.quantity)?;
            self.stock.get_item(&line.item_id).await?;
            if !seen.insert(line.item_id.as_str()) {
                return Err(ErpError::Validation(format!(
                    "Item {} appears on more than one transfer line",
                    line.item_id
                )));
            }
        }

        let now = Utc::now();
        let transfer = StockTransfer {
            id: uuid::Uuid::new_v4().to_string(),
            transfer_number: document_number(DocumentKind::StockTransfer, now),
            from_location: from_location.to_string(),
            to_location: to_location.to_string(),
            lines,
            status: TransferStatus::Pending,
            created_by: actor.id.clone(),
            created_at: now.naive_utc(),
            issued_by: None,
            issued_at: None,
            received_by: None,
            received_at: None,
        };
        self.storage.save_transfer(&transfer).await?;

        info!(
            transfer_number = %transfer.transfer_number,
            from = %transfer.from_location,
            to = %transfer.to_location,
            "stock transfer created"
        );
        Ok(transfer)
    }

    /// Get a transfer by ID, returning an error if not found
    pub async fn get_transfer(&self, transfer_id: &str) -> ErpResult<StockTransfer> {
        self.storage
            .get_transfer(transfer_id)
            .await?
            .ok_or_else(|| ErpError::not_found("stock transfer", transfer_id))
    }

    /// Issue a pending transfer, moving its stock out of the source location
    #[instrument(skip(self, actor))]
    pub async fn issue_transfer(
        &mut self,
        actor: &Actor,
        transfer_id: &str,
    ) -> ErpResult<StockTransfer> {
        let transfer = self.get_transfer(transfer_id).await?;
        if transfer.status != TransferStatus::Pending {
            return Err(ErpError::Validation(format!(
                "Transfer {} is {} and cannot be issued",
                transfer.transfer_number, transfer.status
            )));
        }

        let mut requested: BTreeMap<&str, BigDecimal> = BTreeMap::new();
        for line in &transfer.lines {
            *requested
                .entry(line.item_id.as_str())
                .or_insert_with(|| BigDecimal::from(0)) += &line.quantity;
        }
        for (item_id, quantity) in &requested {
            let on_hand = self.stock.quantity(item_id, &transfer.from_location).await?;
            if on_hand < *quantity {
                return Err(ErpError::Validation(format!(
                    "Insufficient stock of {} at {}: {} on hand, {} requested",
                    item_id, transfer.from_location, on_hand, quantity
                )));
            }
        }

        let clearance = self
            .guard
            .check(&GuardedAttempt::new(
                GuardedAction::IssueStockTransfer,
                &transfer.id,
                actor,
            ))
            .await?;
        let outcome = self.dispatch(actor, transfer, &clearance).await;
        self.guard.settle(&clearance, outcome).await
    }

    async fn dispatch(
        &mut self,
        actor: &Actor,
        mut transfer: StockTransfer,
        clearance: &Clearance,
    ) -> ErpResult<StockTransfer> {
        let movements: Vec<StockMovement> = transfer
            .lines
            .iter()
            .map(|line| {
                StockMovement::outbound(
                    &line.item_id,
                    &transfer.from_location,
                    line.quantity.clone(),
                )
            })
            .collect();
        self.stock
            .post(
                actor,
                StockTransactionKind::TransferIssue,
                &transfer.transfer_number,
                &movements,
            )
            .await?;

        transfer.status = TransferStatus::Issued;
        transfer.issued_by = Some(actor.id.clone());
        transfer.issued_at = Some(Utc::now().naive_utc());
        self.storage.update_transfer(&transfer).await?;

        info!(
            transfer_number = %transfer.transfer_number,
            approved = matches!(clearance, Clearance::Approved { .. }),
            "stock transfer issued"
        );
        Ok(transfer)
    }

    /// Receive an issued transfer into the destination location
    pub async fn receive_transfer(
        &mut self,
        actor: &Actor,
        transfer_id: &str,
    ) -> ErpResult<StockTransfer> {
        let mut transfer = self.get_transfer(transfer_id).await?;
        if transfer.status != TransferStatus::Issued {
            return Err(ErpError::Validation(format!(
                "Transfer {} is {} and cannot be received",
                transfer.transfer_number, transfer.status
            )));
        }

        let movements: Vec<StockMovement> = transfer
            .lines
            .iter()
            .map(|line| {
                StockMovement::inbound(
                    &line.item_id,
                    &transfer.to_location,
                    line.quantity.clone(),
                )
            })
            .collect();
        self.stock
            .post(
                actor,
                StockTransactionKind::TransferReceipt,
                &transfer.transfer_number,
                &movements,
            )
            .await?;

        transfer.status = TransferStatus::Received;
        transfer.received_by = Some(actor.id.clone());
        transfer.received_at = Some(Utc::now().naive_utc());
        self.storage.update_transfer(&transfer).await?;

        info!(transfer_number = %transfer.transfer_number, "stock transfer received");
        Ok(transfer)
    }
}
