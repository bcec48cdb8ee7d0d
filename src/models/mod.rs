// src/models/mod.rs

use chrono::{DateTime, Months, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

// ─── Period ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid period '{0}', expected YYYY-MM")]
pub struct InvalidPeriod(pub String);

/// A settlement period: one calendar month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "2026-09")]
pub struct PeriodKey(NaiveDate);

impl PeriodKey {
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.0.and_time(NaiveTime::MIN).and_utc()
    }

    /// Exclusive upper bound; `None` only at the end of the calendar range.
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.0
            .checked_add_months(Months::new(1))
            .map(|d| d.and_time(NaiveTime::MIN).and_utc())
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.starts_at() && self.ends_at().is_none_or(|end| at < end)
    }
}

impl FromStr for PeriodKey {
    type Err = InvalidPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 7 || s.as_bytes()[4] != b'-' {
            return Err(InvalidPeriod(s.to_string()));
        }
        NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
            .map(PeriodKey)
            .map_err(|_| InvalidPeriod(s.to_string()))
    }
}

impl TryFrom<String> for PeriodKey {
    type Error = InvalidPeriod;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeriodKey> for String {
    fn from(period: PeriodKey) -> Self {
        period.to_string()
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m"))
    }
}

// ─── Worker ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Worker {
    pub id: Uuid,
    pub name: String,
    pub job_title: String,
    pub base_salary: Decimal,
    pub balance: Decimal,
    pub is_active: bool,
}

/// Which workers the settlement board is showing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct WorkerFilter {
    /// Job title to restrict to; `None` shows every active worker.
    pub role: Option<String>,
}

impl WorkerFilter {
    pub fn role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
        }
    }

    pub fn matches(&self, worker: &Worker) -> bool {
        worker.is_active
            && self
                .role
                .as_deref()
                .is_none_or(|role| worker.job_title.trim() == role.trim())
    }
}

// ─── Work Items ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, ToSchema, PartialEq, Eq)]
#[sqlx(type_name = "work_item_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Todo,
    InProgress,
    Review,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WorkItem {
    pub id: Uuid,
    pub item_type: String,
    pub assignee_id: Option<Uuid>,
    pub status: WorkItemStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub project_id: Option<Uuid>,
    pub estimated_hours: Decimal,
    /// Manually-set payout that replaces `hours × rate` for this item.
    pub kpi_value: Option<Decimal>,
}

impl WorkItem {
    /// Completed and closed inside `period`.
    pub fn completed_in(&self, period: &PeriodKey) -> bool {
        self.status == WorkItemStatus::Done && self.completed_at.is_some_and(|at| period.contains(at))
    }
}

// ─── Projects ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContentDeliverable {
    pub content_type: String,
    pub quantity: Decimal,
}

/// Explicit attribution of a content type's output to one worker.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContentContribution {
    pub worker_id: Uuid,
    pub content_type: String,
    pub share_percent: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub content_scope: Vec<ContentDeliverable>,
    #[serde(default)]
    pub contributions: Vec<ContentContribution>,
}

// ─── Salary Schemes & Bonus Rules ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SalaryScheme {
    pub id: Uuid,
    pub name: String,
    /// Job title this scheme applies to; `None` marks the default scheme.
    pub role: Option<String>,
    /// Hourly rate per work item type.
    pub task_rates: BTreeMap<String, Decimal>,
    /// Unit rate per content deliverable type.
    pub content_rates: BTreeMap<String, Decimal>,
    /// Percentage applied to the worker's base salary, e.g. 10 means +10%.
    pub base_adjustment_percent: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BonusMetric {
    CompletedItems,
    CompletedHours,
    TaskKpi,
    ContentKpi,
    TotalKpi,
    ContentUnits,
    #[serde(other)]
    Unknown,
}

impl FromStr for BonusMetric {
    type Err = std::convert::Infallible;

    /// Unrecognised sources map to `Unknown`, which evaluates to zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "completed_items" => BonusMetric::CompletedItems,
            "completed_hours" => BonusMetric::CompletedHours,
            "task_kpi" => BonusMetric::TaskKpi,
            "content_kpi" => BonusMetric::ContentKpi,
            "total_kpi" => BonusMetric::TotalKpi,
            "content_units" => BonusMetric::ContentUnits,
            _ => BonusMetric::Unknown,
        })
    }
}

/// Threshold comparison; `Gte` is inclusive at the boundary.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub enum Comparator {
    #[default]
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "==")]
    Eq,
}

impl Comparator {
    pub fn test(&self, value: Decimal, threshold: Decimal) -> bool {
        match self {
            Comparator::Gte => value >= threshold,
            Comparator::Gt => value > threshold,
            Comparator::Lte => value <= threshold,
            Comparator::Lt => value < threshold,
            Comparator::Eq => value == threshold,
        }
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">=" | "gte" => Ok(Comparator::Gte),
            ">" | "gt" => Ok(Comparator::Gt),
            "<=" | "lte" => Ok(Comparator::Lte),
            "<" | "lt" => Ok(Comparator::Lt),
            "==" | "=" | "eq" => Ok(Comparator::Eq),
            other => Err(format!("unknown comparator '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BonusRule {
    pub id: Uuid,
    pub name: String,
    pub metric: BonusMetric,
    #[serde(default)]
    pub comparator: Comparator,
    pub threshold: Decimal,
    pub reward: Decimal,
    pub description: String,
    /// Restricts the rule to one job title.
    pub role: Option<String>,
    pub is_active: bool,
}

/// Salary schemes and bonus rules, read together for one computation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PayConfig {
    pub schemes: Vec<SalaryScheme>,
    pub bonus_rules: Vec<BonusRule>,
}

// ─── Earnings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskDetail {
    pub item_type: String,
    pub count: u32,
    /// Items paid from their manually-set KPI value.
    pub manual_count: u32,
    pub hours: Decimal,
    pub rate: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContentDetail {
    pub project_id: Uuid,
    pub project_name: String,
    pub content_type: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub share_percent: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BonusCalculationDetail {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub metric: BonusMetric,
    pub base_value: Decimal,
    pub comparator: Comparator,
    pub threshold: Decimal,
    pub condition_met: bool,
    /// The would-be reward; it only counts toward totals when `condition_met`.
    pub reward: Decimal,
    pub description: String,
}

/// Output of one earnings computation for a worker and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EarningsStats {
    pub worker_id: Uuid,
    pub period: PeriodKey,
    pub base_salary: Decimal,
    pub task_kpi: Decimal,
    pub content_kpi: Decimal,
    /// `task_kpi + content_kpi`
    pub kpi_earned: Decimal,
    pub bonuses_earned: Decimal,
    pub details: Vec<TaskDetail>,
    pub content_details: Vec<ContentDetail>,
    pub bonus_details: Vec<BonusCalculationDetail>,
    /// Configuration problems that were resolved to zero.
    pub issues: Vec<String>,
}

impl EarningsStats {
    /// Zeroed figures shown in place of a failed computation.
    pub fn zeroed(worker_id: Uuid, period: PeriodKey) -> Self {
        Self {
            worker_id,
            period,
            base_salary: Decimal::ZERO,
            task_kpi: Decimal::ZERO,
            content_kpi: Decimal::ZERO,
            kpi_earned: Decimal::ZERO,
            bonuses_earned: Decimal::ZERO,
            details: Vec::new(),
            content_details: Vec::new(),
            bonus_details: Vec::new(),
            issues: Vec::new(),
        }
    }

    /// The amount stored as a record's calculated KPI.
    pub fn calculated_kpi(&self) -> Decimal {
        self.kpi_earned + self.bonuses_earned
    }
}

// ─── Settlement Records ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, ToSchema, PartialEq, Eq)]
#[sqlx(type_name = "settlement_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Draft,
    Frozen,
    Paid,
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SettlementStatus::Draft => "draft",
            SettlementStatus::Frozen => "frozen",
            SettlementStatus::Paid => "paid",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ManualField {
    ManualBonus,
    ManualPenalty,
    Advance,
}

/// A sparse set of manual-field values; `None` leaves a field untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ManualFields {
    pub manual_bonus: Option<Decimal>,
    pub manual_penalty: Option<Decimal>,
    pub advance: Option<Decimal>,
}

impl ManualFields {
    pub fn single(field: ManualField, value: Decimal) -> Self {
        let mut fields = Self::default();
        fields.set(field, value);
        fields
    }

    pub fn set(&mut self, field: ManualField, value: Decimal) {
        match field {
            ManualField::ManualBonus => self.manual_bonus = Some(value),
            ManualField::ManualPenalty => self.manual_penalty = Some(value),
            ManualField::Advance => self.advance = Some(value),
        }
    }

    /// Fields set in `newer` replace the ones here.
    pub fn merge(&mut self, newer: ManualFields) {
        self.manual_bonus = newer.manual_bonus.or(self.manual_bonus);
        self.manual_penalty = newer.manual_penalty.or(self.manual_penalty);
        self.advance = newer.advance.or(self.advance);
    }

    pub fn len(&self) -> usize {
        [self.manual_bonus, self.manual_penalty, self.advance]
            .iter()
            .filter(|v| v.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SettlementRecord {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub period: PeriodKey,
    pub fixed_salary: Decimal,
    /// KPI plus bonus total from the last applied computation.
    pub calculated_kpi: Decimal,
    pub manual_bonus: Decimal,
    pub manual_penalty: Decimal,
    pub advance: Decimal,
    pub task_payments: Vec<TaskDetail>,
    pub starting_balance: Decimal,
    pub status: SettlementStatus,
    pub frozen_at: Option<DateTime<Utc>>,
    pub frozen_by: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementRecord {
    pub fn total(&self) -> Decimal {
        self.fixed_salary + self.calculated_kpi + self.manual_bonus
            - self.manual_penalty
            - self.advance
    }

    /// Overlays unsaved manual values on a copy of the record.
    pub fn with_manual(&self, fields: ManualFields) -> Self {
        let mut record = self.clone();
        record.manual_bonus = fields.manual_bonus.unwrap_or(record.manual_bonus);
        record.manual_penalty = fields.manual_penalty.unwrap_or(record.manual_penalty);
        record.advance = fields.advance.unwrap_or(record.advance);
        record
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SettlementView {
    pub record: SettlementRecord,
    pub total: Decimal,
}

impl From<SettlementRecord> for SettlementView {
    fn from(record: SettlementRecord) -> Self {
        let total = record.total();
        SettlementView { record, total }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SettlementRow {
    pub worker_id: Uuid,
    pub worker_name: String,
    pub job_title: String,
    pub settlement: SettlementView,
    /// Freshly computed figures; informational once the record is locked.
    pub live: Option<EarningsStats>,
    /// Why the computation for this worker is unavailable, if it failed.
    pub unavailable: Option<String>,
    /// Edits are waiting for, or retrying, their commit.
    pub unsaved: bool,
    /// The last failed commit attempt for those edits.
    pub commit_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PassState {
    Idle,
    Computing { generation: u64 },
    Ready { generation: u64, workers: usize, failures: usize },
    /// The pass could not load its inputs; only stored settlements are shown.
    Failed { generation: u64, reason: String },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SettlementBoard {
    pub period: PeriodKey,
    pub filter: WorkerFilter,
    pub state: PassState,
    pub rows: Vec<SettlementRow>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DrillDown {
    pub worker_id: Uuid,
    pub period: PeriodKey,
    pub task_details: Vec<TaskDetail>,
    pub content_details: Vec<ContentDetail>,
    pub bonus_details: Vec<BonusCalculationDetail>,
    pub unavailable: Option<String>,
}

// ─── Requests ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct BoardQuery {
    /// Format: "YYYY-MM"
    pub period: String,
    pub role: Option<String>,
}

/// One field goes through the single-field window, several through the batch window.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ManualEditRequest {
    pub manual_bonus: Option<Decimal>,
    pub manual_penalty: Option<Decimal>,
    pub advance: Option<Decimal>,
}

impl From<ManualEditRequest> for ManualFields {
    fn from(req: ManualEditRequest) -> Self {
        ManualFields {
            manual_bonus: req.manual_bonus,
            manual_penalty: req.manual_penalty,
            advance: req.advance,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ManualFieldValue {
    pub value: Decimal,
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
pub struct FreezeRequest {
    pub manual_bonus: Decimal,
    pub manual_penalty: Decimal,
    pub advance: Decimal,
}

// ─── JWT Claims ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub exp: usize,
    pub iat: usize,
}
