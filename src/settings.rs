//! Persisted business settings, changeable by administrators only

use tracing::info;

use crate::config::BusinessSettings;
use crate::traits::ErpStorage;
use crate::types::*;

#[derive(Debug, Clone)]
pub struct SettingsManager<S: ErpStorage> {
    storage: S,
    defaults: BusinessSettings,
}

impl<S: ErpStorage> SettingsManager<S> {
    /// `defaults` apply until settings have been saved
    pub fn new(storage: S, defaults: BusinessSettings) -> Self {
        Self { storage, defaults }
    }

    pub async fn get(&self) -> ErpResult<BusinessSettings> {
        Ok(self
            .storage
            .get_settings()
            .await?
            .unwrap_or_else(|| self.defaults.clone()))
    }

    /// Replace the settings; only admins and directors may do this
    pub async fn update(
        &mut self,
        actor: &Actor,
        settings: BusinessSettings,
    ) -> ErpResult<BusinessSettings> {
        if !actor.role.can_configure() {
            return Err(ErpError::Forbidden(format!(
                "role '{}' cannot change business settings",
                actor.role
            )));
        }
        settings.validate()?;

        self.storage.save_settings(&settings).await?;
        info!(
            actor = %actor.id,
            home_state_code = %settings.home_state_code,
            wastage_approval_threshold = settings.wastage_approval_threshold,
            "business settings updated"
        );
        Ok(settings)
    }
}
