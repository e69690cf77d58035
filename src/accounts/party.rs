//! Customer and supplier management

use tracing::info;

use crate::traits::ErpStorage;
use crate::types::*;
use crate::utils::validation::{validate_gstin, validate_required};

/// Trim and uppercase a GSTIN, treating blank input as absent
pub(crate) fn normalize_gstin(gstin: Option<String>) -> ErpResult<Option<String>> {
    let gstin = gstin
        .map(|g| g.trim().to_ascii_uppercase())
        .filter(|g| !g.is_empty());
    if let Some(ref gstin) = gstin {
        validate_gstin(gstin)?;
    }
    Ok(gstin)
}

/// Manager for the customers and suppliers documents are raised against
#[derive(Debug, Clone)]
pub struct AccountManager<S: ErpStorage> {
    pub(crate) storage: S,
}

impl<S: ErpStorage> AccountManager<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Create a new customer or supplier
    pub async fn create_account(
        &mut self,
        name: String,
        account_type: AccountType,
        gstin: Option<String>,
    ) -> ErpResult<Account> {
        validate_required("Account name", &name, 200)?;

        let gstin = normalize_gstin(gstin)?;

        let account = Account::new(name, account_type, gstin);
        self.storage.save_account(&account).await?;

        info!(
            account_id = %account.id,
            name = %account.name,
            account_type = %account.account_type,
            "account created"
        );
        Ok(account)
    }

    /// Get an account by ID, returning an error if not found
    pub async fn get_account(&self, account_id: &str) -> ErpResult<Account> {
        self.storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| ErpError::not_found("account", account_id))
    }

    pub async fn list_accounts(
        &self,
        account_type: Option<AccountType>,
    ) -> ErpResult<Vec<Account>> {
        self.storage.list_accounts(account_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;

    #[tokio::test]
    async fn test_create_and_fetch_account() {
        let mut manager = AccountManager::new(MemoryStorage::new());
        let account = manager
            .create_account(
                "Acme Polymers".to_string(),
                AccountType::Customer,
                Some(" 29aagcb7383j1z4 ".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(account.gstin.as_deref(), Some("29AAGCB7383J1Z4"));
        let fetched = manager.get_account(&account.id).await.unwrap();
        assert_eq!(fetched, account);
    }

    #[tokio::test]
    async fn test_rejects_malformed_gstin() {
        let mut manager = AccountManager::new(MemoryStorage::new());
        let result = manager
            .create_account(
                "Acme".to_string(),
                AccountType::Supplier,
                Some("123".to_string()),
            )
            .await;
        assert!(matches!(result, Err(ErpError::Validation(_))));
    }

    #[tokio::test]
    async fn test_missing_account_is_not_found() {
        let manager = AccountManager::new(MemoryStorage::new());
        assert!(matches!(
            manager.get_account("nope").await,
            Err(ErpError::NotFound { entity: "account", .. })
        ));
    }

    #[tokio::test]
    async fn test_list_by_type() {
        let mut manager = AccountManager::new(MemoryStorage::new());
        manager
            .create_account("A".to_string(), AccountType::Customer, None)
            .await
            .unwrap();
        manager
            .create_account("B".to_string(), AccountType::Supplier, None)
            .await
            .unwrap();

        let suppliers = manager
            .list_accounts(Some(AccountType::Supplier))
            .await
            .unwrap();
        assert_eq!(suppliers.len(), 1);
        assert_eq!(suppliers[0].name, "B");
    }
}
