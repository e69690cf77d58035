//! Sales and purchase trends, period summaries and top-N rankings

use bigdecimal::BigDecimal;
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use strum::{Display, EnumString};

use crate::tax::gst::round_money;
use crate::types::Invoice;

/// Grouping for trend reports
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrendPeriod {
    Daily,
    /// Weeks start on Monday
    Weekly,
    Monthly,
}

impl TrendPeriod {
    /// Bucket key for a date: `YYYY-MM-DD` for days and weeks, `YYYY-MM` for months
    pub fn key(&self, date: NaiveDate) -> String {
        match self {
            TrendPeriod::Daily => date.format("%Y-%m-%d").to_string(),
            TrendPeriod::Weekly => {
                let offset = u64::from(date.weekday().num_days_from_monday());
                date.checked_sub_days(Days::new(offset))
                    .unwrap_or(date)
                    .format("%Y-%m-%d")
                    .to_string()
            }
            TrendPeriod::Monthly => date.format("%Y-%m").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub period: String,
    pub total: BigDecimal,
    pub count: usize,
    pub average: BigDecimal,
}

/// Per-period totals of invoice grand totals, in period order
pub fn trend(invoices: &[Invoice], period: TrendPeriod) -> Vec<TrendPoint> {
    let mut buckets: BTreeMap<String, (BigDecimal, usize)> = BTreeMap::new();
    for invoice in invoices {
        let bucket = buckets
            .entry(period.key(invoice.invoice_date))
            .or_insert_with(|| (BigDecimal::from(0), 0));
        bucket.0 += invoice.grand_total();
        bucket.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(period, (total, count))| TrendPoint {
            average: round_money(&(&total / BigDecimal::from(count as u64))),
            total: round_money(&total),
            period,
            count,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total: BigDecimal,
    pub invoice_count: usize,
    pub average_invoice: BigDecimal,
    pub previous_total: BigDecimal,
    pub previous_count: usize,
    pub growth_amount: BigDecimal,
    /// Zero when the previous period had no sales
    pub growth_percent: BigDecimal,
    pub count_growth_percent: BigDecimal,
}

/// Percentage change from `previous` to `current`; 0 when `previous` is 0
pub fn growth_percent(current: &BigDecimal, previous: &BigDecimal) -> BigDecimal {
    let zero = BigDecimal::from(0);
    if *previous <= zero {
        return zero;
    }
    round_money(&((current - previous) * BigDecimal::from(100) / previous))
}

/// Compare a period's invoices with the period before it
pub fn summarize_period(
    current: &[Invoice],
    previous: &[Invoice],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> SalesSummary {
    let total: BigDecimal = current.iter().map(|invoice| invoice.grand_total()).sum();
    let previous_total: BigDecimal = previous.iter().map(|invoice| invoice.grand_total()).sum();
    let average_invoice = if current.is_empty() {
        BigDecimal::from(0)
    } else {
        round_money(&(&total / BigDecimal::from(current.len() as u64)))
    };

    SalesSummary {
        start_date,
        end_date,
        invoice_count: current.len(),
        average_invoice,
        previous_count: previous.len(),
        growth_amount: round_money(&(&total - &previous_total)),
        growth_percent: growth_percent(&total, &previous_total),
        count_growth_percent: growth_percent(
            &BigDecimal::from(current.len() as u64),
            &BigDecimal::from(previous.len() as u64),
        ),
        total: round_money(&total),
        previous_total: round_money(&previous_total),
    }
}

/// One row of a top-N ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub key: String,
    pub label: String,
    pub value: BigDecimal,
    pub quantity: BigDecimal,
    /// Invoices (or invoice lines, for products) contributing to the value
    pub count: usize,
}

#[derive(Default)]
struct Ranking {
    entries: HashMap<String, RankedEntry>,
}

impl Ranking {
    fn add(&mut self, key: &str, label: &str, value: &BigDecimal, quantity: &BigDecimal) {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| RankedEntry {
                key: key.to_string(),
                label: label.to_string(),
                value: BigDecimal::from(0),
                quantity: BigDecimal::from(0),
                count: 0,
            });
        entry.value += value;
        entry.quantity += quantity;
        entry.count += 1;
    }

    /// Highest value first; equal values fall back to ascending key
    fn top(self, limit: usize) -> Vec<RankedEntry> {
        let mut entries: Vec<RankedEntry> = self.entries.into_values().collect();
        entries.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.key.cmp(&b.key)));
        entries.truncate(limit);
        for entry in &mut entries {
            entry.value = round_money(&entry.value);
        }
        entries
    }
}

/// Rank invoice lines by revenue. Lines without an item are keyed by
/// their description.
pub fn top_products(invoices: &[Invoice], limit: usize) -> Vec<RankedEntry> {
    let mut ranking = Ranking::default();
    for line in invoices.iter().flat_map(|invoice| &invoice.totals.items) {
        let key = line.item_id.as_deref().unwrap_or(&line.description);
        ranking.add(key, &line.description, &line.line_total, &line.quantity);
    }
    ranking.top(limit)
}

/// Rank the accounts (customers or suppliers) of the invoices by grand total
pub fn top_accounts(invoices: &[Invoice], limit: usize) -> Vec<RankedEntry> {
    let mut ranking = Ranking::default();
    let zero = BigDecimal::from(0);
    for invoice in invoices {
        ranking.add(
            &invoice.account_id,
            &invoice.account_name,
            invoice.grand_total(),
            &zero,
        );
    }
    ranking.top(limit)
}
