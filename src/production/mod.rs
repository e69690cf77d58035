//! Production: machines, work orders, production entries and wastage analytics

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use tracing::{info, instrument};

use crate::approval::{wastage_ratio, ApprovalGuard, GuardedAction, GuardedAttempt};
use crate::inventory::stock::{StockLedger, StockMovement};
use crate::numbering::{document_number, DocumentKind};
use crate::tax::gst::round_money;
use crate::traits::ErpStorage;
use crate::types::*;
use crate::utils::validation::{
    validate_item_code, validate_non_negative, validate_positive_amount, validate_required,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub machine_code: String,
    pub machine_name: String,
    /// Stock location that receives the machine's output
    pub location: String,
    pub created_at: NaiveDateTime,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkOrderStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: String,
    pub wo_number: String,
    pub item_id: String,
    pub machine_id: String,
    pub quantity_to_make: BigDecimal,
    pub quantity_made: BigDecimal,
    pub total_wastage: BigDecimal,
    pub status: WorkOrderStatus,
    pub planned_date: Option<NaiveDate>,
    pub cancel_reason: Option<String>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionEntry {
    pub id: String,
    pub work_order_id: String,
    pub wo_number: String,
    pub item_id: String,
    pub machine_id: String,
    pub location: String,
    pub quantity_produced: BigDecimal,
    pub wastage: BigDecimal,
    pub batch_number: String,
    pub production_date: NaiveDate,
    pub recorded_by: String,
    pub created_at: NaiveDateTime,
}

/// Produced and wasted totals of one work order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WastageSummary {
    pub work_order_id: String,
    pub wo_number: String,
    pub total_produced: BigDecimal,
    pub total_wastage: BigDecimal,
    pub wastage_percent: BigDecimal,
}

/// Batch number of a production entry: `{item}-{YYYYMMDD}-{machine}-{wo_number}`
pub fn batch_number(
    item_code: &str,
    date: NaiveDate,
    machine_code: &str,
    wo_number: &str,
) -> String {
    format!(
        "{}-{}-{}-{}",
        item_code,
        date.format("%Y%m%d"),
        machine_code,
        wo_number
    )
}

/// Runs work orders on machines and posts their output to stock
pub struct ProductionManager<S: ErpStorage> {
    storage: S,
    stock: StockLedger<S>,
    guard: ApprovalGuard<S>,
}

impl<S: ErpStorage + Clone> ProductionManager<S> {
    pub fn new(storage: S, guard: ApprovalGuard<S>) -> Self {
        Self {
            stock: StockLedger::new(storage.clone()),
            storage,
            guard,
        }
    }

    pub async fn create_machine(
        &mut self,
        machine_code: &str,
        machine_name: &str,
        location: &str,
    ) -> ErpResult<Machine> {
        validate_item_code(machine_code)?;
        validate_required("Machine name", machine_name, 100)?;
        validate_required("Machine location", location, 100)?;

        let machine = Machine {
            id: uuid::Uuid::new_v4().to_string(),
            machine_code: machine_code.trim().to_ascii_uppercase(),
            machine_name: machine_name.trim().to_string(),
            location: location.trim().to_string(),
            created_at: Utc::now().naive_utc(),
        };
        self.storage.save_machine(&machine).await?;

        info!(
            machine_code = %machine.machine_code,
            location = %machine.location,
            "machine created"
        );
        Ok(machine)
    }

    pub async fn get_machine(&self, machine_id: &str) -> ErpResult<Machine> {
        self.storage
            .get_machine(machine_id)
            .await?
            .ok_or_else(|| ErpError::not_found("machine", machine_id))
    }

    pub async fn create_work_order(
        &mut self,
        actor: &Actor,
        item_id: &str,
        machine_id: &str,
        quantity_to_make: BigDecimal,
        planned_date: Option<NaiveDate>,
    ) -> ErpResult<WorkOrder> {
        validate_positive_amount(&quantity_to_make)?;
        let item = self.stock.get_item(item_id).await?;
        let machine = self.get_machine(machine_id).await?;

        let now = Utc::now();
        let order = WorkOrder {
            id: uuid::Uuid::new_v4().to_string(),
            wo_number: document_number(DocumentKind::WorkOrder, now),
            item_id: item.id,
            machine_id: machine.id,
            quantity_to_make,
            quantity_made: BigDecimal::from(0),
            total_wastage: BigDecimal::from(0),
            status: WorkOrderStatus::Planned,
            planned_date,
            cancel_reason: None,
            created_by: actor.id.clone(),
            created_at: now.naive_utc(),
            started_at: None,
            completed_at: None,
        };
        self.storage.save_work_order(&order).await?;

        info!(
            wo_number = %order.wo_number,
            quantity_to_make = %order.quantity_to_make,
            "work order created"
        );
        Ok(order)
    }

    /// Get a work order by ID, returning an error if not found
    pub async fn get_work_order(&self, work_order_id: &str) -> ErpResult<WorkOrder> {
        self.storage
            .get_work_order(work_order_id)
            .await?
            .ok_or_else(|| ErpError::not_found("work order", work_order_id))
    }

    pub async fn start_work_order(&mut self, work_order_id: &str) -> ErpResult<WorkOrder> {
        let mut order = self.get_work_order(work_order_id).await?;
        if order.status != WorkOrderStatus::Planned {
            return Err(ErpError::Validation(format!(
                "Work order {} is {} and cannot be started",
                order.wo_number, order.status
            )));
        }

        order.status = WorkOrderStatus::InProgress;
        order.started_at = Some(Utc::now().naive_utc());
        self.storage.update_work_order(&order).await?;

        info!(wo_number = %order.wo_number, "work order started");
        Ok(order)
    }

    /// Record output and wastage against a work order.
    ///
    /// Entries whose wastage ratio is above the configured threshold need
    /// approval. Output goes into stock at the machine's location and the
    /// order completes once the target quantity is made.
    #[instrument(skip(self, actor))]
    pub async fn record_production(
        &mut self,
        actor: &Actor,
        work_order_id: &str,
        quantity_produced: BigDecimal,
        wastage: BigDecimal,
        production_date: NaiveDate,
    ) -> ErpResult<ProductionEntry> {
        validate_non_negative("Quantity produced", &quantity_produced)?;
        validate_non_negative("Wastage", &wastage)?;
        if wastage_ratio(&quantity_produced, &wastage).is_none() {
            return Err(ErpError::Validation(
                "Production entry must record output or wastage".to_string(),
            ));
        }

        let order = self.get_work_order(work_order_id).await?;
        if !matches!(
            order.status,
            WorkOrderStatus::Planned | WorkOrderStatus::InProgress
        ) {
            return Err(ErpError::Validation(format!(
                "Work order {} is {} and cannot take production entries",
                order.wo_number, order.status
            )));
        }
        let item = self.stock.get_item(&order.item_id).await?;
        let machine = self.get_machine(&order.machine_id).await?;

        let attempt = GuardedAttempt::new(GuardedAction::ProductionScrap, &order.id, actor)
            .with_output(quantity_produced.clone(), wastage.clone());
        let clearance = self.guard.check(&attempt).await?;
        let output = ProductionOutput {
            item,
            machine,
            quantity_produced,
            wastage,
            production_date,
        };
        let outcome = self.book_output(actor, order, output).await;
        self.guard.settle(&clearance, outcome).await
    }

    async fn book_output(
        &mut self,
        actor: &Actor,
        mut order: WorkOrder,
        output: ProductionOutput,
    ) -> ErpResult<ProductionEntry> {
        let ProductionOutput {
            item,
            machine,
            quantity_produced,
            wastage,
            production_date,
        } = output;
        let batch = batch_number(
            &item.item_code,
            production_date,
            &machine.machine_code,
            &order.wo_number,
        );
        if quantity_produced > BigDecimal::from(0) {
            self.stock
                .post(
                    actor,
                    StockTransactionKind::Production,
                    &order.wo_number,
                    &[StockMovement::inbound(
                        &item.id,
                        &machine.location,
                        quantity_produced.clone(),
                    )
                    .with_batch(&batch)],
                )
                .await?;
        }

        let now = Utc::now().naive_utc();
        let entry = ProductionEntry {
            id: uuid::Uuid::new_v4().to_string(),
            work_order_id: order.id.clone(),
            wo_number: order.wo_number.clone(),
            item_id: item.id.clone(),
            machine_id: machine.id.clone(),
            location: machine.location.clone(),
            quantity_produced,
            wastage,
            batch_number: batch,
            production_date,
            recorded_by: actor.id.clone(),
            created_at: now,
        };
        self.storage.save_production_entry(&entry).await?;

        order.quantity_made += &entry.quantity_produced;
        order.total_wastage += &entry.wastage;
        if order.started_at.is_none() {
            order.started_at = Some(now);
        }
        if order.quantity_made >= order.quantity_to_make {
            order.status = WorkOrderStatus::Completed;
            order.completed_at = Some(now);
        } else {
            order.status = WorkOrderStatus::InProgress;
        }
        self.storage.update_work_order(&order).await?;

        info!(
            wo_number = %order.wo_number,
            batch_number = %entry.batch_number,
            produced = %entry.quantity_produced,
            wastage = %entry.wastage,
            status = %order.status,
            "production recorded"
        );
        Ok(entry)
    }

    /// Cancel a work order that has not completed; needs approval
    pub async fn cancel_work_order(
        &mut self,
        actor: &Actor,
        work_order_id: &str,
        reason: &str,
    ) -> ErpResult<WorkOrder> {
        validate_required("Cancellation reason", reason, 500)?;
        let mut order = self.get_work_order(work_order_id).await?;
        if matches!(
            order.status,
            WorkOrderStatus::Completed | WorkOrderStatus::Cancelled
        ) {
            return Err(ErpError::Validation(format!(
                "Work order {} is {} and cannot be cancelled",
                order.wo_number, order.status
            )));
        }

        let clearance = self
            .guard
            .check(&GuardedAttempt::new(
                GuardedAction::CancelProductionOrder,
                &order.id,
                actor,
            ))
            .await?;

        order.status = WorkOrderStatus::Cancelled;
        order.cancel_reason = Some(reason.trim().to_string());
        let updated = self.storage.update_work_order(&order).await;
        self.guard.settle(&clearance, updated).await?;

        info!(wo_number = %order.wo_number, "work order cancelled");
        Ok(order)
    }

    pub async fn list_production_entries(
        &self,
        work_order_id: Option<&str>,
    ) -> ErpResult<Vec<ProductionEntry>> {
        self.storage.list_production_entries(work_order_id).await
    }

    /// Wastage per work order across all production entries
    pub async fn wastage_analytics(&self) -> ErpResult<Vec<WastageSummary>> {
        let entries = self.storage.list_production_entries(None).await?;
        Ok(summarize_wastage(&entries))
    }
}

/// A cleared production entry waiting to be booked
struct ProductionOutput {
    item: Item,
    machine: Machine,
    quantity_produced: BigDecimal,
    wastage: BigDecimal,
    production_date: NaiveDate,
}

/// Group entries by work order; the percentage is `wastage / (produced + wastage) * 100`
pub fn summarize_wastage(entries: &[ProductionEntry]) -> Vec<WastageSummary> {
    let mut by_order: BTreeMap<&str, (&str, BigDecimal, BigDecimal)> = BTreeMap::new();
    for entry in entries {
        let totals = by_order
            .entry(entry.work_order_id.as_str())
            .or_insert_with(|| {
                (
                    entry.wo_number.as_str(),
                    BigDecimal::from(0),
                    BigDecimal::from(0),
                )
            });
        totals.1 += &entry.quantity_produced;
        totals.2 += &entry.wastage;
    }

    by_order
        .into_iter()
        .map(|(work_order_id, (wo_number, produced, wasted))| {
            let wastage_percent = wastage_ratio(&produced, &wasted)
                .map(|ratio| round_money(&(ratio * BigDecimal::from(100))))
                .unwrap_or_else(|| BigDecimal::from(0));
            WastageSummary {
                work_order_id: work_order_id.to_string(),
                wo_number: wo_number.to_string(),
                total_produced: produced,
                total_wastage: wasted,
                wastage_percent,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::PolicyRegistry;
    use crate::utils::memory_storage::MemoryStorage;
    use std::str::FromStr;

    fn operator() -> Actor {
        Actor::new("operator", Role::User)
    }

    fn supervisor() -> Actor {
        Actor::new("supervisor", Role::Manager)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()
    }

    struct Fixture {
        production: ProductionManager<MemoryStorage>,
        guard: ApprovalGuard<MemoryStorage>,
        stock: StockLedger<MemoryStorage>,
        order: WorkOrder,
    }

    async fn fixture(target: i64) -> Fixture {
        let storage = MemoryStorage::new();
        let guard = ApprovalGuard::new(
            storage.clone(),
            PolicyRegistry::standard(BigDecimal::from_str("0.07").unwrap()),
        );
        let mut stock = StockLedger::new(storage.clone());
        let item = stock
            .create_item(
                "TAPE-48",
                "Tape",
                "finished",
                "roll",
                BigDecimal::from(0),
                BigDecimal::from(0),
            )
            .await
            .unwrap();
        let mut production = ProductionManager::new(storage, guard.clone());
        let machine = production
            .create_machine("SLT-01", "Slitter 1", "PLANT-1")
            .await
            .unwrap();
        let order = production
            .create_work_order(&operator(), &item.id, &machine.id, BigDecimal::from(target), None)
            .await
            .unwrap();
        Fixture {
            production,
            guard,
            stock,
            order,
        }
    }

    #[tokio::test]
    async fn test_low_wastage_entry_posts_stock() {
        let mut fx = fixture(200).await;
        let entry = fx
            .production
            .record_production(
                &operator(),
                &fx.order.id,
                BigDecimal::from(95),
                BigDecimal::from(5),
                today(),
            )
            .await
            .unwrap();

        assert_eq!(
            entry.batch_number,
            format!("TAPE-48-20250307-SLT-01-{}", fx.order.wo_number)
        );
        assert_eq!(
            fx.stock.quantity(&entry.item_id, "PLANT-1").await.unwrap(),
            BigDecimal::from(95)
        );
        let order = fx.production.get_work_order(&fx.order.id).await.unwrap();
        assert_eq!(order.status, WorkOrderStatus::InProgress);
        assert_eq!(order.quantity_made, BigDecimal::from(95));
    }

    #[tokio::test]
    async fn test_high_wastage_needs_approval() {
        let mut fx = fixture(100).await;
        let blocked = fx
            .production
            .record_production(
                &operator(),
                &fx.order.id,
                BigDecimal::from(92),
                BigDecimal::from(8),
                today(),
            )
            .await;
        let request_id = match blocked {
            Err(ErpError::ApprovalRequired { action, request_id }) => {
                assert_eq!(action, GuardedAction::ProductionScrap);
                request_id
            }
            other => panic!("unexpected {:?}", other),
        };
        let request = fx.guard.get_request(&request_id).await.unwrap();
        assert_eq!(request.entity_type, "work_order");
        assert_eq!(request.entity_id, fx.order.id);
        assert!(fx.production.list_production_entries(None).await.unwrap().is_empty());

        fx.guard.approve(&supervisor(), &request_id, None).await.unwrap();
        let entry = fx
            .production
            .record_production(
                &operator(),
                &fx.order.id,
                BigDecimal::from(92),
                BigDecimal::from(8),
                today(),
            )
            .await
            .unwrap();
        assert_eq!(
            fx.stock.quantity(&entry.item_id, "PLANT-1").await.unwrap(),
            BigDecimal::from(92)
        );
    }

    #[tokio::test]
    async fn test_work_order_completes_at_target() {
        let mut fx = fixture(100).await;
        fx.production.start_work_order(&fx.order.id).await.unwrap();
        fx.production
            .record_production(
                &operator(),
                &fx.order.id,
                BigDecimal::from(60),
                BigDecimal::from(1),
                today(),
            )
            .await
            .unwrap();
        fx.production
            .record_production(
                &operator(),
                &fx.order.id,
                BigDecimal::from(40),
                BigDecimal::from(1),
                today(),
            )
            .await
            .unwrap();

        let order = fx.production.get_work_order(&fx.order.id).await.unwrap();
        assert_eq!(order.status, WorkOrderStatus::Completed);
        assert!(order.completed_at.is_some());
        assert!(fx
            .production
            .record_production(
                &operator(),
                &fx.order.id,
                BigDecimal::from(1),
                BigDecimal::from(0),
                today(),
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_cancel_is_guarded() {
        let mut fx = fixture(100).await;
        let request_id = match fx
            .production
            .cancel_work_order(&operator(), &fx.order.id, "customer withdrew")
            .await
        {
            Err(ErpError::ApprovalRequired { request_id, .. }) => request_id,
            other => panic!("unexpected {:?}", other),
        };
        fx.guard.approve(&supervisor(), &request_id, None).await.unwrap();

        let order = fx
            .production
            .cancel_work_order(&operator(), &fx.order.id, "customer withdrew")
            .await
            .unwrap();
        assert_eq!(order.status, WorkOrderStatus::Cancelled);
        assert!(fx.production.start_work_order(&fx.order.id).await.is_err());
    }

    #[test]
    fn test_wastage_summary() {
        let entry = |wo: &str, produced: i64, wasted: i64| ProductionEntry {
            id: uuid::Uuid::new_v4().to_string(),
            work_order_id: wo.to_string(),
            wo_number: format!("WO-{}", wo),
            item_id: "i".to_string(),
            machine_id: "m".to_string(),
            location: "PLANT-1".to_string(),
            quantity_produced: BigDecimal::from(produced),
            wastage: BigDecimal::from(wasted),
            batch_number: "b".to_string(),
            production_date: today(),
            recorded_by: "op".to_string(),
            created_at: Utc::now().naive_utc(),
        };
        let summary = summarize_wastage(&[entry("a", 90, 5), entry("a", 100, 5), entry("b", 0, 0)]);

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].total_produced, BigDecimal::from(190));
        assert_eq!(summary[0].total_wastage, BigDecimal::from(10));
        assert_eq!(summary[0].wastage_percent, BigDecimal::from(5));
        assert_eq!(summary[1].wastage_percent, BigDecimal::from(0));
    }
}
