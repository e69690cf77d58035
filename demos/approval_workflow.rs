//! Approval-gated production and stock transfer walkthrough

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use erp_core::{
    init_tracing, inventory::TransferLine, production::ProductionEntry, utils::MemoryStorage,
    Actor, Erp, ErpConfig, ErpError, Role,
};

async fn record_output(
    erp: &mut Erp<MemoryStorage>,
    operator: &Actor,
    work_order_id: &str,
    date: NaiveDate,
) -> Result<ProductionEntry, ErpError> {
    erp.production()
        .record_production(
            operator,
            work_order_id,
            BigDecimal::from(92),
            BigDecimal::from(8),
            date,
        )
        .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ErpConfig::load(None)?;
    init_tracing(&config.log_level, config.log_json);

    println!("✅ ERP Core - Approval Workflow\n");
    let mut erp = Erp::new(MemoryStorage::new(), config).await?;
    let operator = Actor::new("line-operator", Role::User);
    let supervisor = Actor::new("plant-manager", Role::Manager);
    let date = NaiveDate::from_ymd_opt(2025, 5, 2).ok_or("invalid date")?;

    let resin = erp
        .stock()
        .create_item(
            "RM-PP",
            "Polypropylene",
            "raw",
            "kg",
            BigDecimal::from(100),
            BigDecimal::from(50),
        )
        .await?;
    let crate_item = erp
        .stock()
        .create_item(
            "FG-CRATE",
            "Crate 20L",
            "finished",
            "nos",
            BigDecimal::from(0),
            BigDecimal::from(0),
        )
        .await?;
    erp.stock()
        .adjust(&operator, &resin.id, "STORE", BigDecimal::from(500), "opening")
        .await?;

    println!("🚚 Stock transfer STORE → PLANT-1");
    let transfer = erp
        .transfers()
        .create_transfer(
            &operator,
            "STORE",
            "PLANT-1",
            vec![TransferLine::new(&resin.id, BigDecimal::from(420))],
        )
        .await?;
    match erp.transfers().issue_transfer(&operator, &transfer.id).await {
        Err(ErpError::ApprovalRequired { action, request_id }) => {
            println!("  '{}' is waiting on request {}", action, request_id);
            erp.approve(&supervisor, &request_id, Some("monthly replenishment".to_string()))
                .await?;
        }
        other => println!("  unexpected: {:?}", other.map(|t| t.status)),
    }
    erp.transfers().issue_transfer(&operator, &transfer.id).await?;
    erp.transfers().receive_transfer(&operator, &transfer.id).await?;
    println!(
        "  STORE now {} kg, PLANT-1 {} kg\n",
        erp.stock().quantity(&resin.id, "STORE").await?,
        erp.stock().quantity(&resin.id, "PLANT-1").await?
    );

    for alert in erp.stock().low_stock().await? {
        println!("⚠️  {} at {} is {} short", alert.item_code, alert.location, alert.shortfall);
    }

    println!("\n🏭 Production with 8% wastage");
    let machine = erp
        .production()
        .create_machine("IM-01", "Injection moulder", "PLANT-1")
        .await?;
    let order = erp
        .production()
        .create_work_order(
            &operator,
            &crate_item.id,
            &machine.id,
            BigDecimal::from(200),
            Some(date),
        )
        .await?;

    if let Err(ErpError::ApprovalRequired { request_id, .. }) =
        record_output(&mut erp, &operator, &order.id, date).await
    {
        println!("  entry blocked, request {} raised", request_id);
        erp.approve(&supervisor, &request_id, None).await?;
    }
    let entry = record_output(&mut erp, &operator, &order.id, date).await?;
    println!("  batch {} recorded", entry.batch_number);
    println!(
        "  PLANT-1 holds {} crates",
        erp.stock().quantity(&crate_item.id, "PLANT-1").await?
    );

    for summary in erp.production().wastage_analytics().await? {
        println!(
            "  {}: produced {} wasted {} ({}%)",
            summary.wo_number,
            summary.total_produced,
            summary.total_wastage,
            summary.wastage_percent
        );
    }

    Ok(())
}
