//! Sales leads and their conversion into customer accounts

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use tracing::{info, instrument, warn};

use crate::accounts::party::normalize_gstin;
use crate::traits::ErpStorage;
use crate::types::*;
use crate::utils::validation::validate_required;

/// Sales pipeline stage of a lead
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Proposal,
    Negotiation,
    /// Set only by conversion into an account
    Converted,
    Lost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub company_name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    /// Where the lead came from, e.g. "trade fair" or "website"
    pub source: String,
    pub status: LeadStatus,
    pub product_interest: Option<String>,
    pub notes: Option<String>,
    /// Customer account created on conversion
    pub account_id: Option<String>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Input for a new lead
#[derive(Debug, Clone, Default)]
pub struct NewLead {
    pub company_name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub source: String,
    pub product_interest: Option<String>,
    pub notes: Option<String>,
}

impl NewLead {
    pub fn new(
        company_name: impl Into<String>,
        contact_person: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            company_name: company_name.into(),
            contact_person: contact_person.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn contact(mut self, email: impl Into<String>, phone: impl Into<String>) -> Self {
        self.email = email.into();
        self.phone = phone.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct LeadManager<S: ErpStorage> {
    storage: S,
}

impl<S: ErpStorage> LeadManager<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub async fn create_lead(&mut self, actor: &Actor, input: NewLead) -> ErpResult<Lead> {
        validate_required("Company name", &input.company_name, 200)?;
        validate_required("Contact person", &input.contact_person, 100)?;
        validate_required("Lead source", &input.source, 50)?;
        let email = input.email.trim().to_lowercase();
        if !email.is_empty() && !email.contains('@') {
            return Err(ErpError::Validation(format!(
                "Invalid email address '{}'",
                input.email
            )));
        }

        let now = Utc::now().naive_utc();
        let lead = Lead {
            id: uuid::Uuid::new_v4().to_string(),
            company_name: input.company_name.trim().to_string(),
            contact_person: input.contact_person.trim().to_string(),
            email,
            phone: input.phone.trim().to_string(),
            source: input.source.trim().to_lowercase(),
            status: LeadStatus::New,
            product_interest: input.product_interest,
            notes: input.notes,
            account_id: None,
            created_by: actor.id.clone(),
            created_at: now,
            updated_at: now,
        };
        self.storage.save_lead(&lead).await?;

        info!(
            lead_id = %lead.id,
            company = %lead.company_name,
            source = %lead.source,
            "lead created"
        );
        Ok(lead)
    }

    pub async fn get_lead(&self, lead_id: &str) -> ErpResult<Lead> {
        self.storage
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| ErpError::not_found("lead", lead_id))
    }

    /// Leads newest first; the source filter is case-insensitive
    pub async fn list_leads(
        &self,
        source: Option<&str>,
        status: Option<LeadStatus>,
    ) -> ErpResult<Vec<Lead>> {
        let source = source.map(|s| s.trim().to_lowercase());
        self.storage.list_leads(source.as_deref(), status).await
    }

    /// Move a lead along the pipeline. Converted leads are final and the
    /// converted stage is reached only through [`Self::convert_lead`].
    pub async fn update_status(&mut self, lead_id: &str, status: &str) -> ErpResult<Lead> {
        let status = LeadStatus::from_str(status.trim())
            .map_err(|_| ErpError::Validation(format!("Unknown lead status '{}'", status)))?;
        if status == LeadStatus::Converted {
            return Err(ErpError::Validation(
                "Leads are converted by creating their account".to_string(),
            ));
        }

        let mut lead = self.get_lead(lead_id).await?;
        if lead.status == LeadStatus::Converted {
            return Err(ErpError::Validation(format!(
                "Lead {} has been converted",
                lead.company_name
            )));
        }
        lead.status = status;
        lead.updated_at = Utc::now().naive_utc();
        self.storage.update_lead(&lead).await?;

        info!(lead_id = %lead.id, status = %lead.status, "lead status updated");
        Ok(lead)
    }

    /// Create a customer account from a lead and mark the lead converted.
    ///
    /// The lead is claimed first so two conversions cannot both create an
    /// account; if saving the account fails the claim is undone.
    #[instrument(skip(self, actor, gstin))]
    pub async fn convert_lead(
        &mut self,
        actor: &Actor,
        lead_id: &str,
        gstin: Option<String>,
    ) -> ErpResult<Account> {
        let lead = self.get_lead(lead_id).await?;
        let gstin = normalize_gstin(gstin)?;

        let mut account = Account::new(lead.company_name.clone(), AccountType::Customer, gstin);
        account.lead_id = Some(lead.id.clone());

        self.storage
            .mark_lead_converted(&lead.id, &account.id)
            .await?;
        if let Err(err) = self.storage.save_account(&account).await {
            if let Err(restore_err) = self.storage.update_lead(&lead).await {
                warn!(lead_id = %lead.id, error = %restore_err, "failed to restore lead");
            }
            return Err(err);
        }

        info!(
            lead_id = %lead.id,
            account_id = %account.id,
            converted_by = %actor.id,
            "lead converted"
        );
        Ok(account)
    }
}
