//! GST invoicing and payment reconciliation walkthrough

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use erp_core::{
    accounts::{NewInvoice, NewPayment},
    init_tracing,
    utils::MemoryStorage,
    AccountType, Actor, Erp, ErpConfig, GstCategory, InvoiceType, LineItemInput, PaymentType,
    Role,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ErpConfig::load(None)?;
    init_tracing(&config.log_level, config.log_json);

    println!("🧾 ERP Core - GST Invoicing\n");
    let mut erp = Erp::new(MemoryStorage::new(), config).await?;
    let clerk = Actor::new("accounts-clerk", Role::User);
    let date = NaiveDate::from_ymd_opt(2025, 4, 1).ok_or("invalid date")?;

    println!("📊 GST slabs:");
    for category in [
        GstCategory::Essential,
        GstCategory::Reduced,
        GstCategory::Standard,
        GstCategory::Higher,
        GstCategory::Luxury,
    ] {
        println!("  {:?}: {}%", category, category.rate());
    }
    println!();

    let local = erp
        .accounts()
        .create_account(
            "Sahyadri Foods".to_string(),
            AccountType::Customer,
            Some("27AAACS1234K1Z2".to_string()),
        )
        .await?;
    let outstation = erp
        .accounts()
        .create_account(
            "Deccan Plastics".to_string(),
            AccountType::Customer,
            Some("29ABCDE1234F1Z5".to_string()),
        )
        .await?;

    let lines = vec![
        LineItemInput::new("Plastic crate 20L", BigDecimal::from(10), BigDecimal::from(90)),
        LineItemInput::new("Pallet", BigDecimal::from(2), BigDecimal::from(1200))
            .discount(BigDecimal::from(5))
            .tax(BigDecimal::from(12)),
    ];

    for customer in [&local, &outstation] {
        let invoice = erp
            .invoices()
            .create_invoice(
                &clerk,
                NewInvoice::new(InvoiceType::Sales, &customer.id, date, lines.clone())
                    .terms("45 days"),
            )
            .await?;
        println!(
            "🏢 {} for {} ({:?})",
            invoice.invoice_number,
            customer.name,
            invoice.totals.supply_type
        );
        for slab in &invoice.totals.slabs {
            println!(
                "  {}% slab: taxable ₹{} CGST ₹{} SGST ₹{} IGST ₹{}",
                slab.rate.total_rate, slab.taxable_amount, slab.cgst, slab.sgst, slab.igst
            );
        }
        println!("  Grand total: ₹{}  due {}", invoice.totals.grand_total, invoice.due_date);
        erp.invoices().issue_invoice(&invoice.id).await?;

        let half = invoice.totals.grand_total.clone() / BigDecimal::from(2);
        let payment = erp
            .payments()
            .record_payment(
                &clerk,
                NewPayment::new(PaymentType::Receipt, half.clone(), "NEFT", date)
                    .allocate(&invoice.id, half),
            )
            .await?;
        let settled = erp.invoices().get_invoice(&invoice.id).await?;
        println!(
            "  {} received ₹{}: status {}, balance ₹{}\n",
            payment.payment_number, payment.amount, settled.status, settled.balance_amount
        );
    }

    let aging = erp
        .reports()
        .ar_aging(NaiveDate::from_ymd_opt(2025, 6, 30).ok_or("invalid date")?)
        .await?;
    println!("📅 Receivables aging as of {}:", aging.as_of);
    for row in &aging.accounts {
        println!(
            "  {}: current ₹{} 1-30 ₹{} 31-60 ₹{} total ₹{}",
            row.account_name,
            row.amounts.current,
            row.amounts.days_1_30,
            row.amounts.days_31_60,
            row.total
        );
    }

    Ok(())
}
