//! Product samples sent to prospective customers, and their feedback

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use tracing::info;

use crate::numbering::{document_number, DocumentKind};
use crate::tax::gst::round_money;
use crate::traits::ErpStorage;
use crate::types::*;
use crate::utils::validation::{validate_positive_amount, validate_required};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SampleStatus {
    Sent,
    FeedbackReceived,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeedbackStatus {
    Pending,
    Positive,
    Negative,
    NoResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    pub sample_number: String,
    pub account_id: String,
    pub quotation_id: Option<String>,
    pub product_specs: String,
    pub quantity: BigDecimal,
    pub from_location: String,
    pub courier: String,
    /// Date by which the customer is expected to respond
    pub feedback_date: NaiveDate,
    pub feedback_status: FeedbackStatus,
    pub feedback_notes: Option<String>,
    pub cost: BigDecimal,
    pub status: SampleStatus,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Input for a new sample dispatch
#[derive(Debug, Clone)]
pub struct NewSample {
    pub account_id: String,
    pub quotation_id: Option<String>,
    pub product_specs: String,
    pub quantity: BigDecimal,
    pub from_location: String,
    pub courier: String,
    pub feedback_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct SampleManager<S: ErpStorage> {
    storage: S,
}

impl<S: ErpStorage> SampleManager<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Record a sample sent to a customer; feedback starts out pending
    pub async fn create_sample(&mut self, actor: &Actor, input: NewSample) -> ErpResult<Sample> {
        let account = self
            .storage
            .get_account(&input.account_id)
            .await?
            .ok_or_else(|| ErpError::not_found("account", &input.account_id))?;
        if let Some(ref quotation_id) = input.quotation_id {
            let quotation = self
                .storage
                .get_quotation(quotation_id)
                .await?
                .ok_or_else(|| ErpError::not_found("quotation", quotation_id))?;
            if quotation.account_id != account.id {
                return Err(ErpError::Validation(format!(
                    "Quotation {} was issued to another account",
                    quotation.quote_number
                )));
            }
        }
        validate_required("Product specs", &input.product_specs, 500)?;
        validate_required("Dispatch location", &input.from_location, 100)?;
        validate_positive_amount(&input.quantity)?;

        let now = Utc::now();
        let sample = Sample {
            id: uuid::Uuid::new_v4().to_string(),
            sample_number: document_number(DocumentKind::Sample, now),
            account_id: account.id,
            quotation_id: input.quotation_id,
            product_specs: input.product_specs,
            quantity: input.quantity,
            from_location: input.from_location,
            courier: input.courier,
            feedback_date: input.feedback_date,
            feedback_status: FeedbackStatus::Pending,
            feedback_notes: None,
            cost: BigDecimal::from(0),
            status: SampleStatus::Sent,
            created_by: actor.id.clone(),
            created_at: now.naive_utc(),
            updated_at: now.naive_utc(),
        };
        self.storage.save_sample(&sample).await?;

        info!(
            sample_number = %sample.sample_number,
            account_id = %sample.account_id,
            "sample sent"
        );
        Ok(sample)
    }

    pub async fn get_sample(&self, sample_id: &str) -> ErpResult<Sample> {
        self.storage
            .get_sample(sample_id)
            .await?
            .ok_or_else(|| ErpError::not_found("sample", sample_id))
    }

    pub async fn list_samples(&self, account_id: Option<&str>) -> ErpResult<Vec<Sample>> {
        self.storage.list_samples(account_id).await
    }

    /// Samples still awaiting feedback whose response date is on or before `as_of`
    pub async fn feedback_due(&self, as_of: NaiveDate) -> ErpResult<Vec<Sample>> {
        let mut due = self.storage.list_samples(None).await?;
        due.retain(|s| s.feedback_status == FeedbackStatus::Pending && s.feedback_date <= as_of);
        due.sort_by(|a, b| a.feedback_date.cmp(&b.feedback_date));
        Ok(due)
    }

    /// Record the customer's verdict on a sample, with the sample's cost
    /// when it is known
    pub async fn record_feedback(
        &mut self,
        sample_id: &str,
        feedback_status: &str,
        notes: Option<String>,
        cost: Option<BigDecimal>,
    ) -> ErpResult<Sample> {
        let feedback = FeedbackStatus::from_str(feedback_status.trim()).map_err(|_| {
            ErpError::Validation(format!("Unknown feedback status '{}'", feedback_status))
        })?;
        if feedback == FeedbackStatus::Pending {
            return Err(ErpError::Validation(
                "Feedback cannot be reset to pending".to_string(),
            ));
        }

        let mut sample = self.get_sample(sample_id).await?;
        if let Some(cost) = cost {
            if cost < BigDecimal::from(0) {
                return Err(ErpError::Validation(
                    "Sample cost cannot be negative".to_string(),
                ));
            }
            sample.cost = round_money(&cost);
        }
        sample.feedback_status = feedback;
        sample.feedback_notes = notes;
        sample.status = SampleStatus::FeedbackReceived;
        sample.updated_at = Utc::now().naive_utc();
        self.storage.update_sample(&sample).await?;

        info!(
            sample_number = %sample.sample_number,
            feedback = %sample.feedback_status,
            "sample feedback recorded"
        );
        Ok(sample)
    }
}
