// src/services/bonus.rs

use crate::{
    errors::StatsError,
    models::{BonusCalculationDetail, BonusMetric, BonusRule, Worker},
};
use rust_decimal::Decimal;

/// Metric values a bonus rule can be tested against, computed once per
/// worker and period and shared read-only by every rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSnapshot {
    pub completed_items: Decimal,
    pub completed_hours: Decimal,
    pub task_kpi: Decimal,
    pub content_kpi: Decimal,
    pub total_kpi: Decimal,
    pub content_units: Decimal,
}

impl MetricSnapshot {
    pub fn value(&self, metric: BonusMetric) -> Option<Decimal> {
        match metric {
            BonusMetric::CompletedItems => Some(self.completed_items),
            BonusMetric::CompletedHours => Some(self.completed_hours),
            BonusMetric::TaskKpi => Some(self.task_kpi),
            BonusMetric::ContentKpi => Some(self.content_kpi),
            BonusMetric::TotalKpi => Some(self.total_kpi),
            BonusMetric::ContentUnits => Some(self.content_units),
            BonusMetric::Unknown => None,
        }
    }
}

pub struct BonusRuleEngine;

impl BonusRuleEngine {
    /// Active rules with no role, or with the worker's role, apply.
    pub fn applies(rule: &BonusRule, worker: &Worker) -> bool {
        rule.is_active
            && rule
                .role
                .as_deref()
                .is_none_or(|role| role.trim() == worker.job_title.trim())
    }

    /// Evaluates one rule. The detail always carries the would-be reward.
    pub fn evaluate(
        rule: &BonusRule,
        metrics: &MetricSnapshot,
        issues: &mut Vec<String>,
    ) -> BonusCalculationDetail {
        let base_value = metrics.value(rule.metric).unwrap_or_else(|| {
            issues.push(format!(
                "bonus rule '{}' uses an unknown metric source; evaluated as zero",
                rule.name
            ));
            Decimal::ZERO
        });

        let reward = if rule.reward < Decimal::ZERO {
            issues.push(format!(
                "bonus rule '{}' has negative reward {}; treated as zero",
                rule.name, rule.reward
            ));
            Decimal::ZERO
        } else {
            rule.reward
        };

        BonusCalculationDetail {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            metric: rule.metric,
            base_value,
            comparator: rule.comparator,
            threshold: rule.threshold,
            condition_met: rule.comparator.test(base_value, rule.threshold),
            reward,
            description: rule.description.clone(),
        }
    }

    /// Rules are independent: each one sees the same snapshot and none
    /// can influence another's outcome.
    pub fn evaluate_all(
        worker: &Worker,
        rules: &[BonusRule],
        metrics: &MetricSnapshot,
        issues: &mut Vec<String>,
    ) -> Vec<BonusCalculationDetail> {
        rules
            .iter()
            .filter(|rule| Self::applies(rule, worker))
            .map(|rule| Self::evaluate(rule, metrics, issues))
            .collect()
    }

    pub fn earned(details: &[BonusCalculationDetail]) -> Result<Decimal, StatsError> {
        details
            .iter()
            .filter(|d| d.condition_met)
            .try_fold(Decimal::ZERO, |acc, d| {
                acc.checked_add(d.reward).ok_or_else(|| StatsError::Overflow {
                    context: "bonus total".to_string(),
                })
            })
    }
}
