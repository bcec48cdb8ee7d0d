// src/services/stats.rs

use crate::{
    errors::StatsError,
    models::{
        ContentDetail, EarningsStats, PayConfig, PeriodKey, Project, SalaryScheme, TaskDetail,
        Worker, WorkItem,
    },
    services::bonus::{BonusRuleEngine, MetricSnapshot},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

pub struct StatsCalculator;

#[derive(Default)]
struct TaskGroup {
    count: u32,
    manual_count: u32,
    hours: Decimal,
    billable_hours: Decimal,
    manual_amount: Decimal,
}

impl StatsCalculator {
    /// Computes a worker's earnings for one period.
    ///
    /// The result depends only on the arguments. Configuration problems
    /// (missing or negative rates, ambiguous schemes, dangling project
    /// references) resolve to zero and are listed in `issues`; only
    /// arithmetic overflow fails the computation.
    pub fn compute(
        worker: &Worker,
        work_items: &[WorkItem],
        projects: &[Project],
        config: &PayConfig,
        period: PeriodKey,
    ) -> Result<EarningsStats, StatsError> {
        let mut issues = Vec::new();
        let scheme = select_scheme(worker, &config.schemes, &mut issues);

        let qualifying: Vec<&WorkItem> = work_items
            .iter()
            .filter(|item| item.assignee_id == Some(worker.id) && item.completed_in(&period))
            .collect();

        // ─── Individually attributed work ────────────────────────────────
        let mut groups: BTreeMap<&str, TaskGroup> = BTreeMap::new();
        for item in &qualifying {
            let hours = if item.estimated_hours < Decimal::ZERO {
                issues.push(format!(
                    "work item {} has negative hours; counted as zero",
                    item.id
                ));
                Decimal::ZERO
            } else {
                item.estimated_hours
            };

            let group = groups.entry(item.item_type.as_str()).or_default();
            group.count += 1;
            group.hours = add(group.hours, hours, "task hours")?;
            match item.kpi_value {
                Some(value) => {
                    group.manual_count += 1;
                    group.manual_amount = add(group.manual_amount, value, "manual KPI values")?;
                }
                None => group.billable_hours = add(group.billable_hours, hours, "task hours")?,
            }
        }

        let task_rates = scheme.map(|s| &s.task_rates);
        let mut details = Vec::with_capacity(groups.len());
        let mut task_kpi = Decimal::ZERO;
        let mut completed_hours = Decimal::ZERO;
        for (item_type, group) in groups {
            let rate = if group.billable_hours.is_zero() {
                lookup_rate(task_rates, item_type, "task", &mut Vec::new())
            } else {
                lookup_rate(task_rates, item_type, "task", &mut issues)
            };
            let subtotal = add(
                mul(group.billable_hours, rate, item_type)?,
                group.manual_amount,
                item_type,
            )?;
            task_kpi = add(task_kpi, subtotal, "task KPI")?;
            completed_hours = add(completed_hours, group.hours, "task hours")?;
            details.push(TaskDetail {
                item_type: item_type.to_string(),
                count: group.count,
                manual_count: group.manual_count,
                hours: group.hours,
                rate,
                subtotal,
            });
        }

        // ─── Project content output ──────────────────────────────────────
        let by_id: HashMap<Uuid, &Project> = projects.iter().map(|p| (p.id, p)).collect();
        let mut project_ids: BTreeSet<Uuid> = qualifying.iter().filter_map(|i| i.project_id).collect();
        // An explicit contribution entry makes the project count even without an item this period.
        project_ids.extend(
            projects
                .iter()
                .filter(|p| p.contributions.iter().any(|c| c.worker_id == worker.id))
                .map(|p| p.id),
        );
        let content_rates = scheme.map(|s| &s.content_rates);

        let mut content_details = Vec::new();
        let mut content_kpi = Decimal::ZERO;
        let mut content_units = Decimal::ZERO;
        for project_id in project_ids {
            let Some(project) = by_id.get(&project_id) else {
                issues.push(format!(
                    "project {project_id} no longer exists; excluded from content attribution"
                ));
                continue;
            };

            for deliverable in &project.content_scope {
                let share = share_percent(
                    project,
                    &deliverable.content_type,
                    worker.id,
                    work_items,
                    period,
                    &mut issues,
                )?;
                if share.is_zero() {
                    continue;
                }
                let quantity = if deliverable.quantity < Decimal::ZERO {
                    issues.push(format!(
                        "project '{}' has negative {} quantity; counted as zero",
                        project.name, deliverable.content_type
                    ));
                    Decimal::ZERO
                } else {
                    deliverable.quantity
                };
                let rate = lookup_rate(content_rates, &deliverable.content_type, "content", &mut issues);

                let units = mul(quantity, share, &deliverable.content_type)? / dec!(100);
                let subtotal = mul(units, rate, &deliverable.content_type)?;
                content_units = add(content_units, units, "content units")?;
                content_kpi = add(content_kpi, subtotal, "content KPI")?;
                content_details.push(ContentDetail {
                    project_id: project.id,
                    project_name: project.name.clone(),
                    content_type: deliverable.content_type.clone(),
                    quantity,
                    rate,
                    share_percent: share,
                    subtotal,
                });
            }
        }

        let kpi_earned = add(task_kpi, content_kpi, "KPI total")?;

        // ─── Bonus rules ─────────────────────────────────────────────────
        let metrics = MetricSnapshot {
            completed_items: Decimal::from(qualifying.len()),
            completed_hours,
            task_kpi,
            content_kpi,
            total_kpi: kpi_earned,
            content_units,
        };
        let bonus_details =
            BonusRuleEngine::evaluate_all(worker, &config.bonus_rules, &metrics, &mut issues);
        let bonuses_earned = BonusRuleEngine::earned(&bonus_details)?;

        Ok(EarningsStats {
            worker_id: worker.id,
            period,
            base_salary: base_salary(worker, scheme)?,
            task_kpi,
            content_kpi,
            kpi_earned,
            bonuses_earned,
            details,
            content_details,
            bonus_details,
            issues,
        })
    }
}

fn select_scheme<'a>(
    worker: &Worker,
    schemes: &'a [SalaryScheme],
    issues: &mut Vec<String>,
) -> Option<&'a SalaryScheme> {
    let role = worker.job_title.trim();
    let mut matching: Vec<&SalaryScheme> = schemes
        .iter()
        .filter(|s| s.role.as_deref().map(str::trim) == Some(role))
        .collect();
    if matching.is_empty() {
        matching = schemes.iter().filter(|s| s.role.is_none()).collect();
    }
    matching.sort_by_key(|s| s.id);

    match matching.as_slice() {
        [] => {
            issues.push(format!(
                "no salary scheme for role '{role}'; rates default to zero"
            ));
            None
        }
        [only] => Some(*only),
        [first, ..] => {
            issues.push(format!(
                "{} salary schemes match role '{role}'; using '{}'",
                matching.len(),
                first.name
            ));
            Some(*first)
        }
    }
}

fn lookup_rate(
    table: Option<&BTreeMap<String, Decimal>>,
    key: &str,
    kind: &str,
    issues: &mut Vec<String>,
) -> Decimal {
    match table.and_then(|t| t.get(key)) {
        Some(rate) if *rate >= Decimal::ZERO => *rate,
        Some(rate) => {
            issues.push(format!("negative {kind} rate {rate} for '{key}' treated as zero"));
            Decimal::ZERO
        }
        None => {
            issues.push(format!("missing {kind} rate for '{key}' treated as zero"));
            Decimal::ZERO
        }
    }
}

/// Explicit contribution entries win; without them the content type is
/// split evenly among everyone who completed work on the project in the period.
fn share_percent(
    project: &Project,
    content_type: &str,
    worker_id: Uuid,
    work_items: &[WorkItem],
    period: PeriodKey,
    issues: &mut Vec<String>,
) -> Result<Decimal, StatsError> {
    let explicit: Vec<_> = project
        .contributions
        .iter()
        .filter(|c| c.content_type == content_type)
        .collect();
    if !explicit.is_empty() {
        let total = explicit
            .iter()
            .filter(|c| c.worker_id == worker_id)
            .map(|c| c.share_percent.clamp(Decimal::ZERO, dec!(100)))
            .try_fold(Decimal::ZERO, |sum, share| add(sum, share, "content share"))?;
        if total > dec!(100) {
            issues.push(format!(
                "project '{}' attributes {}% of {} to one worker; capped at 100%",
                project.name, total, content_type
            ));
            return Ok(dec!(100));
        }
        return Ok(total);
    }

    let contributors: BTreeSet<Uuid> = work_items
        .iter()
        .filter(|i| i.project_id == Some(project.id) && i.completed_in(&period))
        .filter_map(|i| i.assignee_id)
        .collect();
    if !contributors.contains(&worker_id) {
        return Ok(Decimal::ZERO);
    }
    Ok(dec!(100) / Decimal::from(contributors.len()))
}

fn base_salary(worker: &Worker, scheme: Option<&SalaryScheme>) -> Result<Decimal, StatsError> {
    let base = worker.base_salary.max(Decimal::ZERO);
    let pct = scheme.map_or(Decimal::ZERO, |s| s.base_adjustment_percent);
    let factor = add(dec!(1), pct / dec!(100), "base salary adjustment")?;
    Ok(mul(base, factor, "base salary")?.max(Decimal::ZERO))
}

fn add(a: Decimal, b: Decimal, context: &str) -> Result<Decimal, StatsError> {
    a.checked_add(b).ok_or_else(|| overflow(context))
}

fn mul(a: Decimal, b: Decimal, context: &str) -> Result<Decimal, StatsError> {
    a.checked_mul(b).ok_or_else(|| overflow(context))
}

fn overflow(context: &str) -> StatsError {
    StatsError::Overflow {
        context: context.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BonusMetric, Comparator, WorkItemStatus};
    use crate::services::fixtures::*;
    use chrono::{TimeZone, Utc};

    fn config(schemes: Vec<SalaryScheme>) -> PayConfig {
        PayConfig {
            schemes,
            bonus_rules: Vec::new(),
        }
    }

    #[test]
    fn zero_activity_yields_base_salary_only() {
        let ana = worker("Ana", "editor", dec!(3000));
        let cfg = config(vec![scheme(Some("editor"), &[("article", dec!(20))], &[])]);

        let stats = StatsCalculator::compute(&ana, &[], &[], &cfg, period()).unwrap();

        assert_eq!(stats.base_salary, dec!(3000));
        assert_eq!(stats.kpi_earned, Decimal::ZERO);
        assert_eq!(stats.bonuses_earned, Decimal::ZERO);
        assert!(stats.details.is_empty());
        assert!(stats.content_details.is_empty());
        assert!(stats.bonus_details.is_empty());
    }

    #[test]
    fn groups_items_by_type_and_prices_hours() {
        let ana = worker("Ana", "editor", dec!(3000));
        let items = vec![
            done_item(ana.id, "article", dec!(3), None),
            done_item(ana.id, "article", dec!(2.5), None),
            done_item(ana.id, "review", dec!(1), None),
        ];
        let cfg = config(vec![scheme(
            Some("editor"),
            &[("article", dec!(20)), ("review", dec!(15))],
            &[],
        )]);

        let stats = StatsCalculator::compute(&ana, &items, &[], &cfg, period()).unwrap();

        assert_eq!(stats.details.len(), 2);
        let article = &stats.details[0];
        assert_eq!(article.item_type, "article");
        assert_eq!(article.count, 2);
        assert_eq!(article.hours, dec!(5.5));
        assert_eq!(article.rate, dec!(20));
        assert_eq!(article.subtotal, dec!(110));
        assert_eq!(stats.details[1].subtotal, dec!(15));
        assert_eq!(stats.kpi_earned, dec!(125));
    }

    #[test]
    fn only_completed_items_in_period_for_the_worker_count() {
        let ana = worker("Ana", "editor", dec!(3000));
        let other = worker("Bo", "editor", dec!(3000));

        let mut open = done_item(ana.id, "article", dec!(4), None);
        open.status = WorkItemStatus::InProgress;
        let mut last_month = done_item(ana.id, "article", dec!(4), None);
        last_month.completed_at = Some(Utc.with_ymd_and_hms(2026, 8, 31, 23, 59, 0).unwrap());
        let items = vec![
            open,
            last_month,
            done_item(other.id, "article", dec!(4), None),
            done_item(ana.id, "article", dec!(1), None),
        ];
        let cfg = config(vec![scheme(Some("editor"), &[("article", dec!(20))], &[])]);

        let stats = StatsCalculator::compute(&ana, &items, &[], &cfg, period()).unwrap();

        assert_eq!(stats.details.len(), 1);
        assert_eq!(stats.details[0].count, 1);
        assert_eq!(stats.kpi_earned, dec!(20));
    }

    #[test]
    fn manual_kpi_value_replaces_hourly_pay() {
        let ana = worker("Ana", "editor", dec!(3000));
        let mut special = done_item(ana.id, "article", dec!(10), None);
        special.kpi_value = Some(dec!(75));
        let items = vec![special, done_item(ana.id, "article", dec!(2), None)];
        let cfg = config(vec![scheme(Some("editor"), &[("article", dec!(20))], &[])]);

        let stats = StatsCalculator::compute(&ana, &items, &[], &cfg, period()).unwrap();

        assert_eq!(stats.details[0].manual_count, 1);
        assert_eq!(stats.details[0].hours, dec!(12));
        assert_eq!(stats.details[0].subtotal, dec!(115));
    }

    #[test]
    fn missing_and_negative_rates_count_as_zero() {
        let ana = worker("Ana", "editor", dec!(3000));
        let items = vec![
            done_item(ana.id, "article", dec!(3), None),
            done_item(ana.id, "podcast", dec!(2), None),
        ];
        let cfg = config(vec![scheme(Some("editor"), &[("article", dec!(-5))], &[])]);

        let stats = StatsCalculator::compute(&ana, &items, &[], &cfg, period()).unwrap();

        assert_eq!(stats.kpi_earned, Decimal::ZERO);
        assert_eq!(stats.details.len(), 2);
        assert!(stats.issues.iter().any(|i| i.contains("negative task rate")));
        assert!(stats.issues.iter().any(|i| i.contains("missing task rate for 'podcast'")));
    }

    #[test]
    fn falls_back_to_default_scheme_and_applies_base_adjustment() {
        let ana = worker("Ana", "photographer", dec!(2000));
        let mut default = scheme(None, &[("shoot", dec!(30))], &[]);
        default.base_adjustment_percent = dec!(10);
        let cfg = config(vec![scheme(Some("editor"), &[("shoot", dec!(99))], &[]), default]);
        let items = vec![done_item(ana.id, "shoot", dec!(2), None)];

        let stats = StatsCalculator::compute(&ana, &items, &[], &cfg, period()).unwrap();

        assert_eq!(stats.base_salary, dec!(2200));
        assert_eq!(stats.kpi_earned, dec!(60));
    }

    #[test]
    fn split_content_between_two_contributors_sums_to_whole() {
        let ana = worker("Ana", "editor", dec!(3000));
        let bo = worker("Bo", "editor", dec!(3000));
        let campaign = project("Autumn campaign", &[("post", dec!(10))]);
        let items = vec![
            done_item(ana.id, "article", dec!(1), Some(campaign.id)),
            done_item(bo.id, "article", dec!(1), Some(campaign.id)),
        ];
        let rate = dec!(12.5);
        let cfg = config(vec![scheme(Some("editor"), &[("article", dec!(0))], &[("post", rate)])]);
        let projects = vec![campaign];

        let a = StatsCalculator::compute(&ana, &items, &projects, &cfg, period()).unwrap();
        let b = StatsCalculator::compute(&bo, &items, &projects, &cfg, period()).unwrap();

        assert_eq!(a.content_kpi, dec!(10) * rate * dec!(0.5));
        assert_eq!(a.content_details[0].share_percent, dec!(50));
        assert_eq!(b.content_kpi, dec!(10) * rate * dec!(0.5));
        assert_eq!(a.content_kpi + b.content_kpi, dec!(10) * rate);
    }

    #[test]
    fn explicit_contributions_override_even_split() {
        let ana = worker("Ana", "editor", dec!(3000));
        let bo = worker("Bo", "editor", dec!(3000));
        let mut campaign = project("Launch", &[("video", dec!(4)), ("post", dec!(10))]);
        campaign.contributions = vec![
            contribution(ana.id, "video", dec!(75)),
            contribution(bo.id, "video", dec!(25)),
        ];
        let items = vec![
            done_item(ana.id, "edit", dec!(1), Some(campaign.id)),
            done_item(bo.id, "edit", dec!(1), Some(campaign.id)),
        ];
        let cfg = config(vec![scheme(
            Some("editor"),
            &[("edit", dec!(0))],
            &[("video", dec!(100)), ("post", dec!(10))],
        )]);

        let stats = StatsCalculator::compute(&ana, &items, &[campaign], &cfg, period()).unwrap();

        let video = stats
            .content_details
            .iter()
            .find(|d| d.content_type == "video")
            .expect("video detail");
        assert_eq!(video.share_percent, dec!(75));
        assert_eq!(video.subtotal, dec!(300));
        let post = stats
            .content_details
            .iter()
            .find(|d| d.content_type == "post")
            .expect("post detail");
        assert_eq!(post.share_percent, dec!(50));
        assert_eq!(stats.content_kpi, dec!(350));
    }

    #[test]
    fn explicit_share_pays_without_an_item_on_the_project() {
        let ana = worker("Ana", "editor", dec!(3000));
        let bo = worker("Bo", "editor", dec!(3000));
        let mut campaign = project("Launch", &[("video", dec!(4))]);
        campaign.contributions = vec![
            contribution(ana.id, "video", dec!(60)),
            contribution(bo.id, "video", dec!(40)),
        ];
        // Only Ana logged work on the project this month.
        let items = vec![done_item(ana.id, "edit", dec!(1), Some(campaign.id))];
        let cfg = config(vec![scheme(Some("editor"), &[("edit", dec!(0))], &[("video", dec!(100))])]);
        let projects = vec![campaign];

        let a = StatsCalculator::compute(&ana, &items, &projects, &cfg, period()).unwrap();
        let b = StatsCalculator::compute(&bo, &items, &projects, &cfg, period()).unwrap();

        assert_eq!(a.content_kpi, dec!(240));
        assert_eq!(b.content_kpi, dec!(160));
        assert_eq!(a.content_kpi + b.content_kpi, dec!(400));
    }

    #[test]
    fn oversized_explicit_shares_are_capped() {
        let ana = worker("Ana", "editor", dec!(3000));
        let mut campaign = project("Launch", &[("video", dec!(2))]);
        campaign.contributions = vec![
            contribution(ana.id, "video", Decimal::MAX),
            contribution(ana.id, "video", Decimal::MAX),
        ];
        let items = vec![done_item(ana.id, "edit", dec!(1), Some(campaign.id))];
        let cfg = config(vec![scheme(Some("editor"), &[("edit", dec!(0))], &[("video", dec!(50))])]);

        let stats = StatsCalculator::compute(&ana, &items, &[campaign], &cfg, period()).unwrap();

        assert_eq!(stats.content_details[0].share_percent, dec!(100));
        assert_eq!(stats.content_kpi, dec!(100));
        assert!(stats.issues.iter().any(|i| i.contains("capped at 100%")));
    }

    #[test]
    fn dangling_project_reference_is_skipped() {
        let ana = worker("Ana", "editor", dec!(3000));
        let items = vec![done_item(ana.id, "article", dec!(2), Some(Uuid::new_v4()))];
        let cfg = config(vec![scheme(Some("editor"), &[("article", dec!(20))], &[])]);

        let stats = StatsCalculator::compute(&ana, &items, &[], &cfg, period()).unwrap();

        assert_eq!(stats.kpi_earned, dec!(40));
        assert!(stats.content_details.is_empty());
        assert!(stats.issues.iter().any(|i| i.contains("no longer exists")));
    }

    #[test]
    fn bonuses_are_evaluated_against_computed_metrics() {
        let ana = worker("Ana", "editor", dec!(3000));
        let items: Vec<_> = (0..10)
            .map(|_| done_item(ana.id, "article", dec!(1), None))
            .collect();
        let cfg = PayConfig {
            schemes: vec![scheme(Some("editor"), &[("article", dec!(20))], &[])],
            bonus_rules: vec![
                rule("Ten pieces", BonusMetric::CompletedItems, Comparator::Gte, dec!(10), dec!(150)),
                rule("Big earner", BonusMetric::TotalKpi, Comparator::Gte, dec!(500), dec!(400)),
            ],
        };

        let stats = StatsCalculator::compute(&ana, &items, &[], &cfg, period()).unwrap();

        assert_eq!(stats.kpi_earned, dec!(200));
        assert_eq!(stats.bonus_details.len(), 2);
        assert!(stats.bonus_details[0].condition_met);
        assert!(!stats.bonus_details[1].condition_met);
        assert_eq!(stats.bonuses_earned, dec!(150));
        assert_eq!(stats.calculated_kpi(), dec!(350));
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let ana = worker("Ana", "editor", dec!(3000));
        let bo = worker("Bo", "editor", dec!(3000));
        let campaign = project("Series", &[("post", dec!(7)), ("video", dec!(1))]);
        let items = vec![
            done_item(ana.id, "article", dec!(3), Some(campaign.id)),
            done_item(ana.id, "review", dec!(1), None),
            done_item(bo.id, "article", dec!(2), Some(campaign.id)),
        ];
        let cfg = PayConfig {
            schemes: vec![scheme(
                Some("editor"),
                &[("article", dec!(20)), ("review", dec!(10))],
                &[("post", dec!(5)), ("video", dec!(40))],
            )],
            bonus_rules: vec![rule("Hours", BonusMetric::CompletedHours, Comparator::Gte, dec!(4), dec!(50))],
        };
        let projects = vec![campaign];

        let first = StatsCalculator::compute(&ana, &items, &projects, &cfg, period()).unwrap();
        let second = StatsCalculator::compute(&ana, &items, &projects, &cfg, period()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn overflow_fails_the_computation() {
        let ana = worker("Ana", "editor", dec!(3000));
        let items = vec![done_item(ana.id, "article", dec!(1000), None)];
        let cfg = config(vec![scheme(Some("editor"), &[("article", Decimal::MAX)], &[])]);

        let err = StatsCalculator::compute(&ana, &items, &[], &cfg, period()).unwrap_err();
        assert!(matches!(err, StatsError::Overflow { .. }));
    }
}
