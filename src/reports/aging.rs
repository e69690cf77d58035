//! Receivable and payable aging

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

use crate::types::Invoice;

/// Days-overdue band; the labels are persisted keys
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString,
)]
pub enum AgingBucket {
    #[serde(rename = "Current")]
    #[strum(serialize = "Current")]
    Current,
    #[serde(rename = "1-30")]
    #[strum(serialize = "1-30")]
    Days1To30,
    #[serde(rename = "31-60")]
    #[strum(serialize = "31-60")]
    Days31To60,
    #[serde(rename = "61-90")]
    #[strum(serialize = "61-90")]
    Days61To90,
    #[serde(rename = "90+")]
    #[strum(serialize = "90+")]
    Over90,
}

impl AgingBucket {
    pub const ALL: [AgingBucket; 5] = [
        AgingBucket::Current,
        AgingBucket::Days1To30,
        AgingBucket::Days31To60,
        AgingBucket::Days61To90,
        AgingBucket::Over90,
    ];

    pub fn for_days_overdue(days: i64) -> Self {
        match days {
            i64::MIN..=0 => AgingBucket::Current,
            1..=30 => AgingBucket::Days1To30,
            31..=60 => AgingBucket::Days31To60,
            61..=90 => AgingBucket::Days61To90,
            _ => AgingBucket::Over90,
        }
    }

    /// Bucket of an invoice due on `due_date`, seen from `as_of`
    pub fn classify(due_date: NaiveDate, as_of: NaiveDate) -> Self {
        Self::for_days_overdue((as_of - due_date).num_days())
    }
}

/// Outstanding balance per bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgingAmounts {
    #[serde(rename = "Current")]
    pub current: BigDecimal,
    #[serde(rename = "1-30")]
    pub days_1_30: BigDecimal,
    #[serde(rename = "31-60")]
    pub days_31_60: BigDecimal,
    #[serde(rename = "61-90")]
    pub days_61_90: BigDecimal,
    #[serde(rename = "90+")]
    pub over_90: BigDecimal,
}

impl AgingAmounts {
    fn slot(&mut self, bucket: AgingBucket) -> &mut BigDecimal {
        match bucket {
            AgingBucket::Current => &mut self.current,
            AgingBucket::Days1To30 => &mut self.days_1_30,
            AgingBucket::Days31To60 => &mut self.days_31_60,
            AgingBucket::Days61To90 => &mut self.days_61_90,
            AgingBucket::Over90 => &mut self.over_90,
        }
    }

    pub fn add(&mut self, bucket: AgingBucket, amount: &BigDecimal) {
        *self.slot(bucket) += amount;
    }

    pub fn get(&self, bucket: AgingBucket) -> &BigDecimal {
        match bucket {
            AgingBucket::Current => &self.current,
            AgingBucket::Days1To30 => &self.days_1_30,
            AgingBucket::Days31To60 => &self.days_31_60,
            AgingBucket::Days61To90 => &self.days_61_90,
            AgingBucket::Over90 => &self.over_90,
        }
    }

    pub fn total(&self) -> BigDecimal {
        AgingBucket::ALL.iter().map(|bucket| self.get(*bucket)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountAging {
    pub account_id: String,
    pub account_name: String,
    pub amounts: AgingAmounts,
    pub total: BigDecimal,
    pub invoice_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingReport {
    pub as_of: NaiveDate,
    pub accounts: Vec<AccountAging>,
    pub totals: AgingAmounts,
    pub grand_total: BigDecimal,
    pub invoice_count: usize,
}

/// Bucket the open invoices by days overdue, per account and overall.
///
/// Invoices that are not open (draft, paid, cancelled) are ignored.
pub fn age_invoices(invoices: &[Invoice], as_of: NaiveDate) -> AgingReport {
    let mut accounts: BTreeMap<&str, AccountAging> = BTreeMap::new();
    let mut totals = AgingAmounts::default();
    let mut invoice_count = 0;

    for invoice in invoices.iter().filter(|invoice| invoice.status.is_open()) {
        let bucket = AgingBucket::classify(invoice.due_date, as_of);
        let row = accounts
            .entry(invoice.account_id.as_str())
            .or_insert_with(|| AccountAging {
                account_id: invoice.account_id.clone(),
                account_name: invoice.account_name.clone(),
                amounts: AgingAmounts::default(),
                total: BigDecimal::from(0),
                invoice_count: 0,
            });
        row.amounts.add(bucket, &invoice.balance_amount);
        row.total += &invoice.balance_amount;
        row.invoice_count += 1;

        totals.add(bucket, &invoice.balance_amount);
        invoice_count += 1;
    }

    let mut accounts: Vec<AccountAging> = accounts.into_values().collect();
    accounts.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.account_name.cmp(&b.account_name))
    });

    AgingReport {
        as_of,
        grand_total: totals.total(),
        accounts,
        totals,
        invoice_count,
    }
}
