// src/repository/postgres.rs

use crate::{
    errors::{AppError, AppResult},
    models::{
        BonusMetric, BonusRule, Comparator, ContentContribution, ContentDeliverable, PayConfig,
        PeriodKey, Project, SalaryScheme, SettlementRecord, SettlementStatus, TaskDetail, Worker,
        WorkItem, WorkerFilter,
    },
    repository::{SettlementStore, SourceRepository},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, types::Json};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgRepository {
    db: PgPool,
}

impl PgRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

// ─── Rows ─────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    content_scope: Json<Vec<ContentDeliverable>>,
    contributions: Json<Vec<ContentContribution>>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            name: row.name,
            content_scope: row.content_scope.0,
            contributions: row.contributions.0,
        }
    }
}

#[derive(FromRow)]
struct SchemeRow {
    id: Uuid,
    name: String,
    role: Option<String>,
    task_rates: Json<BTreeMap<String, Decimal>>,
    content_rates: Json<BTreeMap<String, Decimal>>,
    base_adjustment_percent: Decimal,
}

impl From<SchemeRow> for SalaryScheme {
    fn from(row: SchemeRow) -> Self {
        SalaryScheme {
            id: row.id,
            name: row.name,
            role: row.role,
            task_rates: row.task_rates.0,
            content_rates: row.content_rates.0,
            base_adjustment_percent: row.base_adjustment_percent,
        }
    }
}

#[derive(FromRow)]
struct BonusRuleRow {
    id: Uuid,
    name: String,
    metric: String,
    comparator: String,
    threshold: Decimal,
    reward: Decimal,
    description: String,
    role: Option<String>,
    is_active: bool,
}

impl From<BonusRuleRow> for BonusRule {
    fn from(row: BonusRuleRow) -> Self {
        let comparator = row.comparator.parse().unwrap_or_else(|e| {
            warn!("Bonus rule '{}': {}; falling back to >=", row.name, e);
            Comparator::default()
        });
        let metric = row
            .metric
            .parse()
            .unwrap_or(BonusMetric::Unknown);

        BonusRule {
            id: row.id,
            name: row.name,
            metric,
            comparator,
            threshold: row.threshold,
            reward: row.reward,
            description: row.description,
            role: row.role,
            is_active: row.is_active,
        }
    }
}

#[derive(FromRow)]
struct RecordRow {
    id: Uuid,
    worker_id: Uuid,
    period: String,
    fixed_salary: Decimal,
    calculated_kpi: Decimal,
    manual_bonus: Decimal,
    manual_penalty: Decimal,
    advance: Decimal,
    task_payments: Json<Vec<TaskDetail>>,
    starting_balance: Decimal,
    status: SettlementStatus,
    frozen_at: Option<DateTime<Utc>>,
    frozen_by: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    paid_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for SettlementRecord {
    type Error = AppError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let period = row
            .period
            .parse()
            .map_err(|e| AppError::Internal(format!("settlement {}: {}", row.id, e)))?;

        Ok(SettlementRecord {
            id: row.id,
            worker_id: row.worker_id,
            period,
            fixed_salary: row.fixed_salary,
            calculated_kpi: row.calculated_kpi,
            manual_bonus: row.manual_bonus,
            manual_penalty: row.manual_penalty,
            advance: row.advance,
            task_payments: row.task_payments.0,
            starting_balance: row.starting_balance,
            status: row.status,
            frozen_at: row.frozen_at,
            frozen_by: row.frozen_by,
            paid_at: row.paid_at,
            paid_by: row.paid_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const RECORD_COLUMNS: &str = r#"
    id, worker_id, period, fixed_salary, calculated_kpi,
    manual_bonus, manual_penalty, advance, task_payments, starting_balance,
    status, frozen_at, frozen_by, paid_at, paid_by, created_at, updated_at"#;

// ─── Source data ──────────────────────────────────────────────────────────────

#[async_trait]
impl SourceRepository for PgRepository {
    async fn list_workers(&self, filter: &WorkerFilter) -> AppResult<Vec<Worker>> {
        let workers = sqlx::query_as::<_, Worker>(
            r#"SELECT id, name, job_title, base_salary, balance, is_active
               FROM workers
               WHERE is_active = true AND ($1::text IS NULL OR job_title = $1)
               ORDER BY name, id"#,
        )
        .bind(filter.role.as_deref())
        .fetch_all(&self.db)
        .await?;

        Ok(workers)
    }

    async fn get_worker(&self, worker_id: Uuid) -> AppResult<Option<Worker>> {
        let worker = sqlx::query_as::<_, Worker>(
            "SELECT id, name, job_title, base_salary, balance, is_active FROM workers WHERE id = $1",
        )
        .bind(worker_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(worker)
    }

    async fn list_work_items(&self, period: PeriodKey) -> AppResult<Vec<WorkItem>> {
        // All assignees, not just one worker: content shares need the whole team.
        let items = sqlx::query_as::<_, WorkItem>(
            r#"SELECT id, item_type, assignee_id, status, completed_at, project_id,
                      estimated_hours, kpi_value
               FROM work_items
               WHERE status = 'done'
                 AND completed_at >= $1
                 AND ($2::timestamptz IS NULL OR completed_at < $2)"#,
        )
        .bind(period.starts_at())
        .bind(period.ends_at())
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    async fn list_projects(&self) -> AppResult<Vec<Project>> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, content_scope, contributions FROM projects",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Project::from).collect())
    }

    async fn load_pay_config(&self) -> AppResult<PayConfig> {
        let schemes = sqlx::query_as::<_, SchemeRow>(
            r#"SELECT id, name, role, task_rates, content_rates, base_adjustment_percent
               FROM salary_schemes"#,
        )
        .fetch_all(&self.db)
        .await?;

        let rules = sqlx::query_as::<_, BonusRuleRow>(
            r#"SELECT id, name, metric, comparator, threshold, reward, description, role, is_active
               FROM bonus_rules
               ORDER BY created_at, id"#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(PayConfig {
            schemes: schemes.into_iter().map(SalaryScheme::from).collect(),
            bonus_rules: rules.into_iter().map(BonusRule::from).collect(),
        })
    }
}

// ─── Settlement records ───────────────────────────────────────────────────────

#[async_trait]
impl SettlementStore for PgRepository {
    async fn find(&self, worker_id: Uuid, period: PeriodKey) -> AppResult<Option<SettlementRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM settlement_records WHERE worker_id = $1 AND period = $2"
        ))
        .bind(worker_id)
        .bind(period.to_string())
        .fetch_optional(&self.db)
        .await?;

        row.map(SettlementRecord::try_from).transpose()
    }

    async fn list_for_period(&self, period: PeriodKey) -> AppResult<Vec<SettlementRecord>> {
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM settlement_records WHERE period = $1"
        ))
        .bind(period.to_string())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(SettlementRecord::try_from).collect()
    }

    async fn insert_if_absent(&self, record: &SettlementRecord) -> AppResult<SettlementRecord> {
        sqlx::query(
            r#"INSERT INTO settlement_records (
                id, worker_id, period, fixed_salary, calculated_kpi,
                manual_bonus, manual_penalty, advance, task_payments, starting_balance,
                status, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
            ON CONFLICT (worker_id, period) DO NOTHING"#,
        )
        .bind(record.id)
        .bind(record.worker_id)
        .bind(record.period.to_string())
        .bind(record.fixed_salary)
        .bind(record.calculated_kpi)
        .bind(record.manual_bonus)
        .bind(record.manual_penalty)
        .bind(record.advance)
        .bind(Json(&record.task_payments))
        .bind(record.starting_balance)
        .bind(record.status)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.db)
        .await?;

        self.find(record.worker_id, record.period)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "settlement for worker {} in {} vanished after insert",
                    record.worker_id, record.period
                ))
            })
    }

    async fn update(&self, next: &SettlementRecord, current: &SettlementRecord) -> AppResult<bool> {
        let result = sqlx::query(
            r#"UPDATE settlement_records
               SET fixed_salary = $4,
                   calculated_kpi = $5,
                   manual_bonus = $6,
                   manual_penalty = $7,
                   advance = $8,
                   task_payments = $9,
                   status = $10,
                   frozen_at = $11,
                   frozen_by = $12,
                   paid_at = $13,
                   paid_by = $14,
                   updated_at = $15
               WHERE id = $1 AND status = $2 AND updated_at = $3"#,
        )
        .bind(next.id)
        .bind(current.status)
        .bind(current.updated_at)
        .bind(next.fixed_salary)
        .bind(next.calculated_kpi)
        .bind(next.manual_bonus)
        .bind(next.manual_penalty)
        .bind(next.advance)
        .bind(Json(&next.task_payments))
        .bind(next.status)
        .bind(next.frozen_at)
        .bind(next.frozen_by.as_deref())
        .bind(next.paid_at)
        .bind(next.paid_by.as_deref())
        .bind(next.updated_at)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
