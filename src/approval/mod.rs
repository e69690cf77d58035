//! Approval-gated workflow guard.
//!
//! Certain state-mutating actions must be approved before they run. The
//! guard looks the action up in a [`PolicyRegistry`], evaluates the policy
//! predicate against the attempt and, when approval is needed, either raises
//! a pending [`ApprovalRequest`] or claims an approved one. Callers hand the
//! outcome of the action to [`ApprovalGuard::settle`]; a failed action
//! returns its claim, so the approval stays usable.
//!
//! Lifecycle of a request for one (entity, action) pair:
//!
//! ```text
//! no request --attempt--> pending --approve--> approved --successful attempt--> consumed
//!                            |                    ^            |
//!                            |                    +---failed---+
//!                            +------reject---> rejected (blocks every attempt)
//! ```

use bigdecimal::BigDecimal;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{debug, info, instrument, warn};

use crate::traits::ErpStorage;
use crate::types::{Actor, ErpError, ErpResult};

/// Actions that may require an approver's sign-off.
///
/// The labels are persisted and shared with the approver side as matching keys.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString,
)]
pub enum GuardedAction {
    #[serde(rename = "Issue Stock Transfer")]
    #[strum(serialize = "Issue Stock Transfer")]
    IssueStockTransfer,
    #[serde(rename = "Payroll Run")]
    #[strum(serialize = "Payroll Run")]
    PayrollRun,
    #[serde(rename = "Production Scrap")]
    #[strum(serialize = "Production Scrap")]
    ProductionScrap,
    #[serde(rename = "Cancel Production Order")]
    #[strum(serialize = "Cancel Production Order")]
    CancelProductionOrder,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// A request for approval of one guarded action on one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action: GuardedAction,
    pub module: String,
    pub status: ApprovalStatus,
    pub requested_by: String,
    pub requested_at: NaiveDateTime,
    pub decided_by: Option<String>,
    pub decided_at: Option<NaiveDateTime>,
    pub remarks: Option<String>,
    /// Set once an approved request has permitted its action
    pub consumed: bool,
    pub consumed_at: Option<NaiveDateTime>,
}

impl ApprovalRequest {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        action: GuardedAction,
        module: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            action,
            module: module.into(),
            status: ApprovalStatus::Pending,
            requested_by: requested_by.into(),
            requested_at: Utc::now().naive_utc(),
            decided_by: None,
            decided_at: None,
            remarks: None,
            consumed: false,
            consumed_at: None,
        }
    }

    /// Whether this request blocks or permits a new attempt for the same key
    pub fn is_live(&self) -> bool {
        match self.status {
            ApprovalStatus::Pending | ApprovalStatus::Rejected => true,
            ApprovalStatus::Approved => !self.consumed,
        }
    }

    pub fn matches(&self, entity_type: &str, entity_id: &str, action: GuardedAction) -> bool {
        self.entity_type == entity_type && self.entity_id == entity_id && self.action == action
    }
}

/// An attempt to perform a guarded action, with the facts policies inspect
#[derive(Debug, Clone)]
pub struct GuardedAttempt {
    pub action: GuardedAction,
    pub entity_id: String,
    pub requested_by: String,
    /// Output and wastage of a production entry
    pub output: Option<(BigDecimal, BigDecimal)>,
}

impl GuardedAttempt {
    pub fn new(action: GuardedAction, entity_id: impl Into<String>, actor: &Actor) -> Self {
        Self {
            action,
            entity_id: entity_id.into(),
            requested_by: actor.id.clone(),
            output: None,
        }
    }

    pub fn with_output(mut self, produced: BigDecimal, wastage: BigDecimal) -> Self {
        self.output = Some((produced, wastage));
        self
    }
}

/// `wastage / (produced + wastage)`, or `None` when nothing was processed
pub fn wastage_ratio(produced: &BigDecimal, wastage: &BigDecimal) -> Option<BigDecimal> {
    let total = produced + wastage;
    if total <= BigDecimal::from(0) {
        None
    } else {
        Some(wastage / total)
    }
}

pub type ApprovalPredicate = Box<dyn Fn(&GuardedAttempt) -> bool + Send + Sync>;

/// How one guarded action is matched and when it needs approval
pub struct ApprovalPolicy {
    pub entity_type: &'static str,
    pub module: &'static str,
    requires_approval: ApprovalPredicate,
}

impl ApprovalPolicy {
    pub fn new(
        entity_type: &'static str,
        module: &'static str,
        requires_approval: impl Fn(&GuardedAttempt) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            entity_type,
            module,
            requires_approval: Box::new(requires_approval),
        }
    }

    /// Policy that gates every attempt
    pub fn always(entity_type: &'static str, module: &'static str) -> Self {
        Self::new(entity_type, module, |_| true)
    }

    pub fn applies_to(&self, attempt: &GuardedAttempt) -> bool {
        (self.requires_approval)(attempt)
    }
}

impl std::fmt::Debug for ApprovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalPolicy")
            .field("entity_type", &self.entity_type)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// Registry mapping each guarded action to its policy
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    policies: HashMap<GuardedAction, ApprovalPolicy>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard policies; production entries are gated above `wastage_threshold`
    pub fn standard(wastage_threshold: BigDecimal) -> Self {
        let mut registry = Self::new();
        registry.register(
            GuardedAction::IssueStockTransfer,
            ApprovalPolicy::always("stock_transfer", "inventory"),
        );
        registry.register(
            GuardedAction::PayrollRun,
            ApprovalPolicy::always("payroll", "hrms"),
        );
        registry.register(
            GuardedAction::ProductionScrap,
            ApprovalPolicy::new("work_order", "production", move |attempt| {
                attempt
                    .output
                    .as_ref()
                    .and_then(|(produced, wastage)| wastage_ratio(produced, wastage))
                    .is_some_and(|ratio| ratio > wastage_threshold)
            }),
        );
        registry.register(
            GuardedAction::CancelProductionOrder,
            ApprovalPolicy::always("work_order", "production"),
        );
        registry
    }

    pub fn register(&mut self, action: GuardedAction, policy: ApprovalPolicy) {
        self.policies.insert(action, policy);
    }

    pub fn policy(&self, action: GuardedAction) -> Option<&ApprovalPolicy> {
        self.policies.get(&action)
    }
}

/// Result of a guard check that lets the action proceed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clearance {
    /// The policy did not require approval for this attempt
    NotRequired,
    /// An approved request was claimed for this attempt
    Approved { request_id: String },
}

fn blocked(request: &ApprovalRequest) -> ErpError {
    match request.status {
        ApprovalStatus::Rejected => ErpError::ApprovalRejected {
            action: request.action,
            request_id: request.id.clone(),
        },
        _ => ErpError::ApprovalRequired {
            action: request.action,
            request_id: request.id.clone(),
        },
    }
}

/// Evaluates guarded actions and records approver decisions
#[derive(Clone)]
pub struct ApprovalGuard<S: ErpStorage> {
    pub(crate) storage: S,
    registry: Arc<PolicyRegistry>,
}

impl<S: ErpStorage> ApprovalGuard<S> {
    pub fn new(storage: S, registry: PolicyRegistry) -> Self {
        Self {
            storage,
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Check whether an attempt may proceed.
    ///
    /// Returns `ApprovalRequired` while the request is pending (creating it on
    /// the first attempt) and `ApprovalRejected` once it has been rejected. An
    /// approved request is claimed for this attempt only; pass the action's
    /// outcome to [`settle`](Self::settle).
    #[instrument(
        skip(self, attempt),
        fields(action = %attempt.action, entity_id = %attempt.entity_id)
    )]
    pub async fn check(&mut self, attempt: &GuardedAttempt) -> ErpResult<Clearance> {
        let (entity_type, module) = match self.registry.policy(attempt.action) {
            Some(policy) if policy.applies_to(attempt) => (policy.entity_type, policy.module),
            _ => {
                debug!("no approval required");
                return Ok(Clearance::NotRequired);
            }
        };

        let candidate = ApprovalRequest::new(
            entity_type,
            attempt.entity_id.clone(),
            attempt.action,
            module,
            attempt.requested_by.clone(),
        );
        let request = self.storage.insert_approval_if_absent(&candidate).await?;

        if request.status != ApprovalStatus::Approved {
            if request.id == candidate.id {
                info!(request_id = %request.id, "approval request raised");
            }
            return Err(blocked(&request));
        }

        if self.storage.claim_approval(&request.id).await? {
            info!(request_id = %request.id, "approval claimed");
            return Ok(Clearance::Approved {
                request_id: request.id,
            });
        }

        // Another attempt consumed it first; this one starts a new request.
        let retry = ApprovalRequest::new(
            entity_type,
            attempt.entity_id.clone(),
            attempt.action,
            module,
            attempt.requested_by.clone(),
        );
        let request = self.storage.insert_approval_if_absent(&retry).await?;
        Err(blocked(&request))
    }

    /// Finish a cleared attempt. A successful action keeps the claim; a
    /// failed one releases it and the action's error is returned unchanged.
    pub async fn settle<T>(
        &mut self,
        clearance: &Clearance,
        outcome: ErpResult<T>,
    ) -> ErpResult<T> {
        if let (Clearance::Approved { request_id }, Err(err)) = (clearance, &outcome) {
            match self.storage.release_approval(request_id).await {
                Ok(()) => info!(request_id = %request_id, error = %err, "approval released"),
                Err(release_err) => warn!(
                    request_id = %request_id,
                    error = %release_err,
                    "failed to release approval"
                ),
            }
        }
        outcome
    }

    pub async fn approve(
        &mut self,
        approver: &Actor,
        request_id: &str,
        remarks: Option<String>,
    ) -> ErpResult<ApprovalRequest> {
        self.decide(approver, request_id, ApprovalStatus::Approved, remarks)
            .await
    }

    pub async fn reject(
        &mut self,
        approver: &Actor,
        request_id: &str,
        remarks: Option<String>,
    ) -> ErpResult<ApprovalRequest> {
        self.decide(approver, request_id, ApprovalStatus::Rejected, remarks)
            .await
    }

    async fn decide(
        &mut self,
        approver: &Actor,
        request_id: &str,
        decision: ApprovalStatus,
        remarks: Option<String>,
    ) -> ErpResult<ApprovalRequest> {
        if !approver.role.can_approve() {
            return Err(ErpError::Forbidden(format!(
                "role '{}' cannot decide approval requests",
                approver.role
            )));
        }

        let mut request = self
            .storage
            .get_approval(request_id)
            .await?
            .ok_or_else(|| ErpError::not_found("approval request", request_id))?;

        if request.status != ApprovalStatus::Pending {
            return Err(ErpError::Validation(format!(
                "approval request {} is already {}",
                request.id, request.status
            )));
        }

        request.status = decision;
        request.decided_by = Some(approver.id.clone());
        request.decided_at = Some(Utc::now().naive_utc());
        request.remarks = remarks;
        self.storage.update_approval(&request).await?;

        info!(
            request_id = %request.id,
            action = %request.action,
            decision = %decision,
            approver = %approver.id,
            "approval request decided"
        );
        Ok(request)
    }

    pub async fn get_request(&self, request_id: &str) -> ErpResult<ApprovalRequest> {
        self.storage
            .get_approval(request_id)
            .await?
            .ok_or_else(|| ErpError::not_found("approval request", request_id))
    }

    pub async fn list_pending(&self) -> ErpResult<Vec<ApprovalRequest>> {
        self.storage
            .list_approvals(Some(ApprovalStatus::Pending))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use crate::utils::memory_storage::MemoryStorage;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn guard() -> ApprovalGuard<MemoryStorage> {
        ApprovalGuard::new(MemoryStorage::new(), PolicyRegistry::standard(dec("0.07")))
    }

    fn operator() -> Actor {
        Actor::new("op-1", Role::User)
    }

    fn manager() -> Actor {
        Actor::new("mgr-1", Role::Manager)
    }

    #[test]
    fn test_action_labels() {
        assert_eq!(GuardedAction::PayrollRun.to_string(), "Payroll Run");
        assert_eq!(GuardedAction::ProductionScrap.to_string(), "Production Scrap");
        assert_eq!(
            GuardedAction::from_str("Cancel Production Order").unwrap(),
            GuardedAction::CancelProductionOrder
        );
        assert_eq!(
            serde_json::to_string(&GuardedAction::IssueStockTransfer).unwrap(),
            "\"Issue Stock Transfer\""
        );
    }

    #[test]
    fn test_wastage_policy_threshold() {
        let registry = PolicyRegistry::standard(dec("0.07"));
        let policy = registry.policy(GuardedAction::ProductionScrap).unwrap();

        let high = GuardedAttempt::new(GuardedAction::ProductionScrap, "wo-1", &operator())
            .with_output(BigDecimal::from(92), BigDecimal::from(8));
        let low = GuardedAttempt::new(GuardedAction::ProductionScrap, "wo-1", &operator())
            .with_output(BigDecimal::from(93), BigDecimal::from(7));
        let nothing = GuardedAttempt::new(GuardedAction::ProductionScrap, "wo-1", &operator())
            .with_output(BigDecimal::from(0), BigDecimal::from(0));

        assert!(policy.applies_to(&high));
        assert!(!policy.applies_to(&low));
        assert!(!policy.applies_to(&nothing));
    }

    #[tokio::test]
    async fn test_pending_request_is_not_duplicated() {
        let mut guard = guard();
        let attempt = GuardedAttempt::new(GuardedAction::PayrollRun, "2025-03", &operator());

        let first = guard.check(&attempt).await.unwrap_err();
        let second = guard.check(&attempt).await.unwrap_err();

        let (
            ErpError::ApprovalRequired { request_id: a, .. },
            ErpError::ApprovalRequired { request_id: b, .. },
        ) = (first, second)
        else {
            panic!("expected approval required");
        };
        assert_eq!(a, b);
        assert_eq!(guard.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_one_approval_permits_one_attempt() {
        let mut guard = guard();
        let attempt = GuardedAttempt::new(GuardedAction::PayrollRun, "2025-03", &operator());

        let request_id = match guard.check(&attempt).await {
            Err(ErpError::ApprovalRequired { request_id, .. }) => request_id,
            other => panic!("unexpected {:?}", other),
        };
        guard.approve(&manager(), &request_id, None).await.unwrap();

        assert_eq!(
            guard.check(&attempt).await.unwrap(),
            Clearance::Approved {
                request_id: request_id.clone()
            }
        );

        let again = guard.check(&attempt).await.unwrap_err();
        match again {
            ErpError::ApprovalRequired { request_id: next, .. } => assert_ne!(next, request_id),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_action_keeps_approval_usable() {
        let mut guard = guard();
        let attempt = GuardedAttempt::new(GuardedAction::PayrollRun, "2025-05", &operator());
        let request_id = match guard.check(&attempt).await {
            Err(ErpError::ApprovalRequired { request_id, .. }) => request_id,
            other => panic!("unexpected {:?}", other),
        };
        guard.approve(&manager(), &request_id, None).await.unwrap();

        let clearance = guard.check(&attempt).await.unwrap();
        let failed: ErpResult<()> = Err(ErpError::Validation("disk full".to_string()));
        assert!(matches!(
            guard.settle(&clearance, failed).await,
            Err(ErpError::Validation(_))
        ));
        assert!(!guard.get_request(&request_id).await.unwrap().consumed);

        let clearance = guard.check(&attempt).await.unwrap();
        assert_eq!(
            clearance,
            Clearance::Approved {
                request_id: request_id.clone()
            }
        );
        guard.settle(&clearance, Ok(())).await.unwrap();
        assert!(guard.get_request(&request_id).await.unwrap().consumed);
        assert!(guard.check(&attempt).await.unwrap_err().is_approval_required());
    }

    #[tokio::test]
    async fn test_rejected_request_blocks_attempts() {
        let mut guard = guard();
        let attempt = GuardedAttempt::new(GuardedAction::IssueStockTransfer, "tr-1", &operator());

        let request_id = match guard.check(&attempt).await {
            Err(ErpError::ApprovalRequired { request_id, .. }) => request_id,
            other => panic!("unexpected {:?}", other),
        };
        guard
            .reject(&manager(), &request_id, Some("not needed".to_string()))
            .await
            .unwrap();

        assert!(matches!(
            guard.check(&attempt).await,
            Err(ErpError::ApprovalRejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_plain_user_cannot_approve() {
        let mut guard = guard();
        let attempt = GuardedAttempt::new(GuardedAction::PayrollRun, "2025-04", &operator());
        let request_id = match guard.check(&attempt).await {
            Err(ErpError::ApprovalRequired { request_id, .. }) => request_id,
            other => panic!("unexpected {:?}", other),
        };

        assert!(matches!(
            guard.approve(&operator(), &request_id, None).await,
            Err(ErpError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_low_wastage_passes_without_request() {
        let mut guard = guard();
        let attempt = GuardedAttempt::new(GuardedAction::ProductionScrap, "wo-9", &operator())
            .with_output(BigDecimal::from(99), BigDecimal::from(1));

        assert_eq!(guard.check(&attempt).await.unwrap(), Clearance::NotRequired);
        assert!(guard.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decided_request_cannot_be_decided_again() {
        let mut guard = guard();
        let attempt = GuardedAttempt::new(
            GuardedAction::CancelProductionOrder,
            "wo-2",
            &operator(),
        );
        let request_id = match guard.check(&attempt).await {
            Err(ErpError::ApprovalRequired { request_id, .. }) => request_id,
            other => panic!("unexpected {:?}", other),
        };
        guard.approve(&manager(), &request_id, None).await.unwrap();

        assert!(matches!(
            guard.reject(&manager(), &request_id, None).await,
            Err(ErpError::Validation(_))
        ));
    }
}
