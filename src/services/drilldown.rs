// src/services/drilldown.rs

use crate::{
    models::{DrillDown, PeriodKey},
    services::cache::CachedStats,
};
use uuid::Uuid;

pub struct DrillDownAggregator;

impl DrillDownAggregator {
    /// Itemised view of one computation. Empty lists are a valid answer.
    pub fn assemble(worker_id: Uuid, period: PeriodKey, computed: &CachedStats) -> DrillDown {
        match computed {
            CachedStats::Ready(stats) => DrillDown {
                worker_id,
                period,
                task_details: stats.details.clone(),
                content_details: stats.content_details.clone(),
                bonus_details: stats.bonus_details.clone(),
                unavailable: None,
            },
            CachedStats::Failed(reason) => DrillDown {
                worker_id,
                period,
                task_details: Vec::new(),
                content_details: Vec::new(),
                bonus_details: Vec::new(),
                unavailable: Some(reason.clone()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BonusMetric, Comparator, PayConfig};
    use crate::services::{fixtures::*, stats::StatsCalculator};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn fixed_salary_only_worker_has_empty_lists() {
        let ana = worker("Ana", "editor", dec!(3000));
        let stats = StatsCalculator::compute(&ana, &[], &[], &PayConfig::default(), period()).unwrap();

        let drill = DrillDownAggregator::assemble(ana.id, period(), &CachedStats::Ready(stats));

        assert!(drill.task_details.is_empty());
        assert!(drill.content_details.is_empty());
        assert!(drill.bonus_details.is_empty());
        assert_eq!(drill.unavailable, None);
    }

    #[test]
    fn details_add_up_to_the_computed_amounts() {
        let ana = worker("Ana", "editor", dec!(3000));
        let bo = worker("Bo", "editor", dec!(3000));
        let campaign = project("Campaign", &[("post", dec!(6))]);
        let items = vec![
            done_item(ana.id, "article", dec!(4), Some(campaign.id)),
            done_item(ana.id, "review", dec!(2), None),
            done_item(bo.id, "article", dec!(1), Some(campaign.id)),
        ];
        let cfg = PayConfig {
            schemes: vec![scheme(
                Some("editor"),
                &[("article", dec!(25)), ("review", dec!(10))],
                &[("post", dec!(30))],
            )],
            bonus_rules: vec![
                rule("Six hours", BonusMetric::CompletedHours, Comparator::Gte, dec!(6), dec!(80)),
                rule("Ten hours", BonusMetric::CompletedHours, Comparator::Gte, dec!(10), dec!(200)),
            ],
        };
        let stats = StatsCalculator::compute(&ana, &items, &[campaign], &cfg, period()).unwrap();
        let computed = CachedStats::Ready(stats.clone());

        let drill = DrillDownAggregator::assemble(ana.id, period(), &computed);

        let tasks: Decimal = drill.task_details.iter().map(|d| d.subtotal).sum();
        let content: Decimal = drill.content_details.iter().map(|d| d.subtotal).sum();
        let bonuses: Decimal = drill
            .bonus_details
            .iter()
            .filter(|d| d.condition_met)
            .map(|d| d.reward)
            .sum();
        assert_eq!(tasks, dec!(120));
        assert_eq!(content, dec!(90));
        assert_eq!(tasks + content, stats.kpi_earned);
        assert_eq!(bonuses, stats.bonuses_earned);
        assert_eq!(drill.bonus_details.len(), 2);
    }

    #[test]
    fn failed_computation_reports_why() {
        let worker_id = Uuid::new_v4();
        let drill = DrillDownAggregator::assemble(
            worker_id,
            period(),
            &CachedStats::Failed("arithmetic overflow".to_string()),
        );
        assert!(drill.task_details.is_empty());
        assert_eq!(drill.unavailable.as_deref(), Some("arithmetic overflow"));
    }
}
