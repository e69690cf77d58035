//! HRMS: monthly payroll runs

use bigdecimal::BigDecimal;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::approval::{ApprovalGuard, GuardedAction, GuardedAttempt};
use crate::numbering::{document_number, DocumentKind};
use crate::tax::gst::round_money;
use crate::traits::ErpStorage;
use crate::types::*;
use crate::utils::validation::{parse_period, validate_non_negative, validate_required};

/// Pay components of one employee for a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollLine {
    pub employee_id: String,
    pub basic: BigDecimal,
    pub allowances: BigDecimal,
    pub deductions: BigDecimal,
}

impl PayrollLine {
    pub fn new(
        employee_id: impl Into<String>,
        basic: BigDecimal,
        allowances: BigDecimal,
        deductions: BigDecimal,
    ) -> Self {
        Self {
            employee_id: employee_id.into(),
            basic,
            allowances,
            deductions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payslip {
    pub employee_id: String,
    pub basic: BigDecimal,
    pub allowances: BigDecimal,
    pub deductions: BigDecimal,
    pub gross_pay: BigDecimal,
    pub net_pay: BigDecimal,
}

impl Payslip {
    fn compute(line: &PayrollLine) -> ErpResult<Self> {
        validate_required("Employee id", &line.employee_id, 50)?;
        validate_non_negative("Basic pay", &line.basic)?;
        validate_non_negative("Allowances", &line.allowances)?;
        validate_non_negative("Deductions", &line.deductions)?;

        let gross_pay = round_money(&(&line.basic + &line.allowances));
        let net_pay = round_money(&(&gross_pay - &line.deductions));
        if net_pay < BigDecimal::from(0) {
            return Err(ErpError::Validation(format!(
                "Deductions exceed gross pay for employee {}",
                line.employee_id
            )));
        }

        Ok(Self {
            employee_id: line.employee_id.clone(),
            basic: line.basic.clone(),
            allowances: line.allowances.clone(),
            deductions: line.deductions.clone(),
            gross_pay,
            net_pay,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollRun {
    pub id: String,
    pub run_number: String,
    /// `YYYY-MM`
    pub period: String,
    pub payslips: Vec<Payslip>,
    pub total_gross: BigDecimal,
    pub total_deductions: BigDecimal,
    pub total_net: BigDecimal,
    pub processed_by: String,
    pub created_at: NaiveDateTime,
}

/// Processes payroll; every run needs approval
pub struct PayrollManager<S: ErpStorage> {
    storage: S,
    guard: ApprovalGuard<S>,
}

impl<S: ErpStorage> PayrollManager<S> {
    pub fn new(storage: S, guard: ApprovalGuard<S>) -> Self {
        Self { storage, guard }
    }

    /// Process payroll for a `YYYY-MM` period; a period is paid once
    #[instrument(skip(self, actor, lines), fields(employees = lines.len()))]
    pub async fn run_payroll(
        &mut self,
        actor: &Actor,
        period: &str,
        lines: &[PayrollLine],
    ) -> ErpResult<PayrollRun> {
        let period_start = parse_period(period)?;
        if lines.is_empty() {
            return Err(ErpError::Validation(
                "Payroll run needs at least one employee".to_string(),
            ));
        }
        let payslips = lines
            .iter()
            .map(Payslip::compute)
            .collect::<ErpResult<Vec<_>>>()?;

        if self.storage.get_payroll_run(period).await?.is_some() {
            return Err(ErpError::Conflict(format!(
                "Payroll for {} has already been run",
                period
            )));
        }

        let clearance = self
            .guard
            .check(&GuardedAttempt::new(GuardedAction::PayrollRun, period, actor))
            .await?;

        let stamp = period_start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        let run = PayrollRun {
            id: uuid::Uuid::new_v4().to_string(),
            run_number: document_number(DocumentKind::PayrollRun, stamp),
            period: period.to_string(),
            total_gross: payslips.iter().map(|p| &p.gross_pay).sum(),
            total_deductions: payslips.iter().map(|p| &p.deductions).sum(),
            total_net: payslips.iter().map(|p| &p.net_pay).sum(),
            payslips,
            processed_by: actor.id.clone(),
            created_at: Utc::now().naive_utc(),
        };
        let saved = self.storage.save_payroll_run(&run).await;
        self.guard.settle(&clearance, saved).await?;

        info!(
            run_number = %run.run_number,
            period = %run.period,
            total_net = %run.total_net,
            "payroll processed"
        );
        Ok(run)
    }

    pub async fn get_payroll_run(&self, period: &str) -> ErpResult<PayrollRun> {
        self.storage
            .get_payroll_run(period)
            .await?
            .ok_or_else(|| ErpError::not_found("payroll run", period))
    }
}
