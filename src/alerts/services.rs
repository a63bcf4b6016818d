use super::models::{
    self as alerts, AlertDraft, AlertQuery, AlertSeverity, AlertThresholds, ThresholdMetric,
};
use crate::measurements::services::MeasurementStats;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, sea_query::Expr,
};
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: u64 = 50;
const MAX_LIST_LIMIT: u64 = 500;
const CRITICAL_FACTOR: f64 = 1.5;

/// `None` at or below the threshold, `High` above it, `Critical` above 1.5x
pub fn severity_for(value: f64, threshold: f64) -> Option<AlertSeverity> {
    if value > threshold * CRITICAL_FACTOR {
        Some(AlertSeverity::Critical)
    } else if value > threshold {
        Some(AlertSeverity::High)
    } else {
        None
    }
}

pub fn alert_message(metric: ThresholdMetric, actual: f64, threshold: f64) -> String {
    let unit = metric.unit();
    format!(
        "{}超过阈值: 实际 {actual:.3} {unit}, 阈值 {threshold:.3} {unit}",
        metric.label()
    )
}

/// Evaluate the maximum of each metric against its threshold.
///
/// Yields at most one draft per metric; an empty measurement set yields none.
pub fn evaluate_thresholds(
    experiment_id: Option<Uuid>,
    stats: &MeasurementStats,
    thresholds: &AlertThresholds,
) -> Vec<AlertDraft> {
    if stats.count == 0 {
        return Vec::new();
    }

    ThresholdMetric::ALL
        .into_iter()
        .filter_map(|metric| {
            let actual = stats.metric(metric).max;
            let threshold = thresholds.get(metric);
            severity_for(actual, threshold).map(|severity| AlertDraft {
                experiment_id,
                metric,
                severity,
                message: alert_message(metric, actual, threshold),
                threshold_value: threshold,
                actual_value: actual,
            })
        })
        .collect()
}

pub async fn create_alerts(
    db: &DatabaseConnection,
    drafts: Vec<AlertDraft>,
) -> Result<Vec<alerts::Model>, DbErr> {
    let mut created = Vec::with_capacity(drafts.len());
    for draft in drafts {
        created.push(draft.into_active_model().insert(db).await?);
    }
    Ok(created)
}

pub async fn list_alerts(
    db: &DatabaseConnection,
    query: &AlertQuery,
) -> Result<Vec<alerts::Model>, DbErr> {
    let mut select = alerts::Entity::find();
    if let Some(is_resolved) = query.is_resolved {
        select = select.filter(alerts::Column::IsResolved.eq(is_resolved));
    }
    if let Some(experiment_id) = query.experiment_id {
        select = select.filter(alerts::Column::ExperimentId.eq(experiment_id));
    }

    select
        .order_by_desc(alerts::Column::CreatedAt)
        .limit(
            query
                .limit
                .unwrap_or(DEFAULT_LIST_LIMIT)
                .clamp(1, MAX_LIST_LIMIT),
        )
        .all(db)
        .await
}

pub async fn recent_alerts(
    db: &DatabaseConnection,
    limit: u64,
) -> Result<Vec<alerts::Model>, DbErr> {
    alerts::Entity::find()
        .order_by_desc(alerts::Column::CreatedAt)
        .limit(limit)
        .all(db)
        .await
}

/// Mark an alert resolved. Returns the alert and whether this call changed it;
/// an already resolved alert keeps its original `resolved_at`.
///
/// The unresolved check is part of the update, so of several concurrent calls
/// only one reports a change.
pub async fn resolve_alert(
    db: &DatabaseConnection,
    id: Uuid,
) -> Result<(alerts::Model, bool), DbErr> {
    let result = alerts::Entity::update_many()
        .col_expr(alerts::Column::IsResolved, Expr::value(true))
        .col_expr(alerts::Column::ResolvedAt, Expr::value(Utc::now()))
        .filter(alerts::Column::Id.eq(id))
        .filter(alerts::Column::IsResolved.eq(false))
        .exec(db)
        .await?;

    let alert = alerts::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("Alert with id '{id}' not found")))?;

    Ok((alert, result.rows_affected > 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_helpers::setup_test_db;
    use crate::measurements::services::calculate_measurement_stats;
    use rstest::rstest;

    async fn stored_alert(db: &DatabaseConnection) -> alerts::Model {
        let stats = calculate_measurement_stats(&[(50.0, 0.5)]);
        let drafts = evaluate_thresholds(None, &stats, &AlertThresholds::default());
        create_alerts(db, drafts).await.unwrap().remove(0)
    }

    #[rstest]
    #[case(30.0, 30.0, None)]
    #[case(29.9, 30.0, None)]
    #[case(30.01, 30.0, Some(AlertSeverity::High))]
    #[case(45.0, 30.0, Some(AlertSeverity::High))]
    #[case(45.01, 30.0, Some(AlertSeverity::Critical))]
    #[case(2.5, 2.0, Some(AlertSeverity::High))]
    #[case(3.5, 2.0, Some(AlertSeverity::Critical))]
    #[case(0.0, 50.0, None)]
    fn test_severity_for(
        #[case] value: f64,
        #[case] threshold: f64,
        #[case] expected: Option<AlertSeverity>,
    ) {
        assert_eq!(severity_for(value, threshold), expected);
    }

    #[test]
    fn test_no_alerts_for_empty_measurements() {
        let stats = calculate_measurement_stats(&[]);
        assert!(evaluate_thresholds(None, &stats, &AlertThresholds::default()).is_empty());
    }

    #[test]
    fn test_no_alerts_within_thresholds() {
        let stats = calculate_measurement_stats(&[(20.355, 0.11), (20.681, 0.26)]);
        assert!(evaluate_thresholds(None, &stats, &AlertThresholds::default()).is_empty());
    }

    #[test]
    fn test_evaluation_uses_maximum_per_metric() {
        let experiment_id = Uuid::new_v4();
        // Max voltage 35.5 (high), max current 2.5 (high), max power 62.5 (high)
        let stats = calculate_measurement_stats(&[(35.5, 0.5), (25.0, 2.5), (10.0, 0.1)]);

        let drafts = evaluate_thresholds(Some(experiment_id), &stats, &AlertThresholds::default());

        assert_eq!(drafts.len(), 3);
        assert!(drafts.iter().all(|d| d.experiment_id == Some(experiment_id)));
        assert!(drafts.iter().all(|d| d.severity == AlertSeverity::High));

        let voltage = drafts
            .iter()
            .find(|d| d.metric == ThresholdMetric::Voltage)
            .unwrap();
        assert!((voltage.actual_value - 35.5).abs() < 1e-9);
        assert!((voltage.threshold_value - 30.0).abs() < 1e-9);
        assert_eq!(
            voltage.message,
            "电压超过阈值: 实际 35.500 V, 阈值 30.000 V"
        );
    }

    #[test]
    fn test_critical_escalation_only_for_breaching_metric() {
        let stats = calculate_measurement_stats(&[(50.0, 0.5)]);
        let drafts = evaluate_thresholds(None, &stats, &AlertThresholds::default());

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].metric, ThresholdMetric::Voltage);
        assert_eq!(drafts[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_custom_thresholds_are_respected() {
        let stats = calculate_measurement_stats(&[(20.0, 1.0)]);
        let thresholds = AlertThresholds {
            voltage: 10.0,
            current: 5.0,
            power: 100.0,
        };

        let drafts = evaluate_thresholds(None, &stats, &thresholds);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(AlertThresholds::default().validate().is_ok());

        let negative = AlertThresholds {
            current: -1.0,
            ..AlertThresholds::default()
        };
        assert!(negative.validate().unwrap_err().contains("current"));

        let infinite = AlertThresholds {
            power: f64::INFINITY,
            ..AlertThresholds::default()
        };
        assert!(infinite.validate().is_err());

        let zero = AlertThresholds {
            voltage: 0.0,
            ..AlertThresholds::default()
        };
        assert!(zero.validate().is_err());
    }

    #[tokio::test]
    async fn test_resolve_reports_change_once() {
        let db = setup_test_db().await;
        let alert = stored_alert(&db).await;

        let (first, changed) = resolve_alert(&db, alert.id).await.unwrap();
        assert!(changed);
        assert!(first.is_resolved);
        let resolved_at = first.resolved_at.unwrap();

        let (second, changed) = resolve_alert(&db, alert.id).await.unwrap();
        assert!(!changed);
        assert_eq!(second.resolved_at, Some(resolved_at));
    }

    #[tokio::test]
    async fn test_concurrent_resolves_change_the_alert_once() {
        let db = setup_test_db().await;
        let alert = stored_alert(&db).await;

        let (a, b) = tokio::join!(resolve_alert(&db, alert.id), resolve_alert(&db, alert.id));
        let (a, a_changed) = a.unwrap();
        let (b, b_changed) = b.unwrap();

        assert!(a_changed ^ b_changed, "exactly one call resolves the alert");
        assert_eq!(a.resolved_at, b.resolved_at);
        assert!(a.is_resolved && b.is_resolved);
    }

    #[tokio::test]
    async fn test_resolve_unknown_alert() {
        let db = setup_test_db().await;
        let err = resolve_alert(&db, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DbErr::RecordNotFound(_)));
    }
}
