//! Operating expenses recorded for profit and loss

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::tax::gst::round_money;
use crate::traits::ErpStorage;
use crate::types::*;
use crate::utils::validation::{validate_positive_amount, validate_required};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    /// Grouping key in the profit and loss breakdown, e.g. "rent" or "power"
    pub category: String,
    pub amount: BigDecimal,
    pub expense_date: NaiveDate,
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct ExpenseManager<S: ErpStorage> {
    storage: S,
}

impl<S: ErpStorage> ExpenseManager<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub async fn record_expense(
        &mut self,
        actor: &Actor,
        category: &str,
        amount: BigDecimal,
        expense_date: NaiveDate,
        description: Option<String>,
    ) -> ErpResult<Expense> {
        validate_required("Expense category", category, 100)?;
        validate_positive_amount(&amount)?;

        let expense = Expense {
            id: uuid::Uuid::new_v4().to_string(),
            category: category.trim().to_lowercase(),
            amount: round_money(&amount),
            expense_date,
            description,
            created_by: actor.id.clone(),
            created_at: Utc::now().naive_utc(),
        };
        self.storage.save_expense(&expense).await?;

        info!(category = %expense.category, amount = %expense.amount, "expense recorded");
        Ok(expense)
    }

    pub async fn list_expenses(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ErpResult<Vec<Expense>> {
        self.storage.list_expenses(start_date, end_date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;

    #[tokio::test]
    async fn test_expenses_filter_by_date() {
        let mut manager = ExpenseManager::new(MemoryStorage::new());
        let actor = Actor::new("acct", Role::User);
        let jan = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let feb = NaiveDate::from_ymd_opt(2025, 2, 15).unwrap();

        manager
            .record_expense(&actor, "Rent", BigDecimal::from(20000), jan, None)
            .await
            .unwrap();
        manager
            .record_expense(&actor, "power", BigDecimal::from(4500), feb, None)
            .await
            .unwrap();

        let february = manager
            .list_expenses(NaiveDate::from_ymd_opt(2025, 2, 1), None)
            .await
            .unwrap();
        assert_eq!(february.len(), 1);
        assert_eq!(february[0].category, "power");
    }

    #[tokio::test]
    async fn test_rejects_zero_amount() {
        let mut manager = ExpenseManager::new(MemoryStorage::new());
        let actor = Actor::new("acct", Role::User);
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert!(manager
            .record_expense(&actor, "rent", BigDecimal::from(0), date, None)
            .await
            .is_err());
    }
}
