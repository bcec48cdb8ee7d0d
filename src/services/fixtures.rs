// Shared builders for service tests.

use crate::models::{
    BonusMetric, BonusRule, Comparator, ContentContribution, ContentDeliverable, PeriodKey,
    Project, SalaryScheme, Worker, WorkItem, WorkItemStatus,
};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

pub fn period() -> PeriodKey {
    "2026-09".parse().expect("valid period")
}

pub fn next_period() -> PeriodKey {
    "2026-10".parse().expect("valid period")
}

pub fn in_period() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 15, 12, 0, 0).unwrap()
}

pub fn worker(name: &str, role: &str, base_salary: Decimal) -> Worker {
    Worker {
        id: Uuid::new_v4(),
        name: name.to_string(),
        job_title: role.to_string(),
        base_salary,
        balance: Decimal::ZERO,
        is_active: true,
    }
}

pub fn done_item(
    assignee: Uuid,
    item_type: &str,
    hours: Decimal,
    project_id: Option<Uuid>,
) -> WorkItem {
    WorkItem {
        id: Uuid::new_v4(),
        item_type: item_type.to_string(),
        assignee_id: Some(assignee),
        status: WorkItemStatus::Done,
        completed_at: Some(in_period()),
        project_id,
        estimated_hours: hours,
        kpi_value: None,
    }
}

pub fn scheme(
    role: Option<&str>,
    task_rates: &[(&str, Decimal)],
    content_rates: &[(&str, Decimal)],
) -> SalaryScheme {
    SalaryScheme {
        id: Uuid::new_v4(),
        name: format!("{} scheme", role.unwrap_or("default")),
        role: role.map(str::to_string),
        task_rates: task_rates
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect(),
        content_rates: content_rates
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect(),
        base_adjustment_percent: Decimal::ZERO,
    }
}

pub fn project(name: &str, scope: &[(&str, Decimal)]) -> Project {
    Project {
        id: Uuid::new_v4(),
        name: name.to_string(),
        content_scope: scope
            .iter()
            .map(|(content_type, quantity)| ContentDeliverable {
                content_type: content_type.to_string(),
                quantity: *quantity,
            })
            .collect(),
        contributions: Vec::new(),
    }
}

pub fn contribution(worker_id: Uuid, content_type: &str, share_percent: Decimal) -> ContentContribution {
    ContentContribution {
        worker_id,
        content_type: content_type.to_string(),
        share_percent,
    }
}

pub fn rule(
    name: &str,
    metric: BonusMetric,
    comparator: Comparator,
    threshold: Decimal,
    reward: Decimal,
) -> BonusRule {
    BonusRule {
        id: Uuid::new_v4(),
        name: name.to_string(),
        metric,
        comparator,
        threshold,
        reward,
        description: format!("{name} bonus"),
        role: None,
        is_active: true,
    }
}
