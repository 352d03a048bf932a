use std::ops::RangeInclusive;

use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::MetricsStore;
use crate::models::{ActivityType, NewNotification, Team, TeamMetrics};

pub const BURNOUT_THRESHOLD: i32 = 70;

pub const BURNOUT_RECOMMENDATIONS: [&str; 4] = [
    "Review workload distribution",
    "Check for overdue time off",
    "Schedule a wellness check-in",
    "Consider protocol adjustments",
];

const LOW_ENERGY: i32 = 50;
const LOW_PROTOCOL_COMPLETION: i32 = 40;
const LOW_CHECK_INS: i32 = 3;
const ENGAGEMENT_MIN_ACTIVE: i32 = 2;
const LOW_CCI: i32 = 60;

pub const MORNING_WINDOW: RangeInclusive<u32> = 9..=11;
pub const AFTERNOON_WINDOW: RangeInclusive<u32> = 14..=16;
const MORNING_RECOVERY_FLOOR: i32 = 60;
const AFTERNOON_ENERGY_FLOOR: i32 = 55;

/// A message before it is addressed to anyone.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub activity_type: ActivityType,
    pub title: String,
    pub description: String,
    pub metadata: Value,
}

impl Alert {
    pub fn address_to(&self, recipients: &[Uuid]) -> Vec<NewNotification> {
        recipients
            .iter()
            .map(|user_id| NewNotification {
                user_id: *user_id,
                activity_type: self.activity_type,
                title: self.title.clone(),
                description: self.description.clone(),
                metadata: self.metadata.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightKind {
    EnergyDecline,
    ProtocolAdherence,
    EngagementDrop,
    CognitiveLoad,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnergyDecline => "energy_decline",
            Self::ProtocolAdherence => "protocol_adherence",
            Self::EngagementDrop => "engagement_drop",
            Self::CognitiveLoad => "cognitive_load",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeKind {
    LowStakesStart,
    MovementBreak,
}

impl NudgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowStakesStart => "low_stakes_start",
            Self::MovementBreak => "movement_break",
        }
    }
}

fn base_metadata(team: &Team, metric_date: NaiveDate) -> Value {
    json!({
        "team_id": team.id,
        "team_name": team.name,
        "metric_date": metric_date.to_string(),
    })
}

fn with_fields(mut metadata: Value, fields: Value) -> Value {
    if let (Some(target), Value::Object(extra)) = (metadata.as_object_mut(), fields) {
        target.extend(extra);
    }
    metadata
}

pub fn burnout_alert(team: &Team, metrics: &TeamMetrics, metric_date: NaiveDate) -> Option<Alert> {
    let risk = metrics.burnout_risk_score?;
    if risk < BURNOUT_THRESHOLD {
        return None;
    }

    Some(Alert {
        activity_type: ActivityType::BurnoutAlert,
        title: format!("Burnout risk alert: {} at {}%", team.name, risk),
        description: format!(
            "Team burnout risk has crossed the {}% threshold. Recommended actions: {}.",
            BURNOUT_THRESHOLD,
            BURNOUT_RECOMMENDATIONS.join("; ")
        ),
        metadata: with_fields(
            base_metadata(team, metric_date),
            json!({
                "burnout_risk_score": risk,
                "threshold": BURNOUT_THRESHOLD,
                "cognitive_capacity_index": metrics.cognitive_capacity_index,
                "recommendations": BURNOUT_RECOMMENDATIONS,
            }),
        ),
    })
}

fn insight(
    team: &Team,
    metric_date: NaiveDate,
    kind: InsightKind,
    title: &str,
    description: String,
    confidence: f64,
    metric_value: i32,
) -> Alert {
    Alert {
        activity_type: ActivityType::PredictiveInsight,
        title: title.to_string(),
        description,
        metadata: with_fields(
            base_metadata(team, metric_date),
            json!({
                "insight": kind.as_str(),
                "confidence": confidence,
                "metric_value": metric_value,
            }),
        ),
    }
}

/// Each rule is independent; any subset may fire.
pub fn predictive_insights(team: &Team, metrics: &TeamMetrics, metric_date: NaiveDate) -> Vec<Alert> {
    let mut insights = Vec::new();

    if let Some(energy) = metrics.avg_energy_score.filter(|value| *value < LOW_ENERGY) {
        insights.push(insight(
            team,
            metric_date,
            InsightKind::EnergyDecline,
            "Energy decline predicted",
            format!(
                "{} is averaging {} energy. Expect a ~15% productivity drop within 3 days.",
                team.name, energy
            ),
            0.78,
            energy,
        ));
    }

    if let Some(rate) = metrics
        .protocol_completion_rate
        .filter(|value| *value < LOW_PROTOCOL_COMPLETION)
    {
        insights.push(insight(
            team,
            metric_date,
            InsightKind::ProtocolAdherence,
            "Protocol adherence warning",
            format!(
                "Protocol completion is at {}%. Increased stress markers are likely within 1 week.",
                rate
            ),
            0.72,
            rate,
        ));
    }

    if metrics.check_ins_count < LOW_CHECK_INS && metrics.active_members > ENGAGEMENT_MIN_ACTIVE {
        insights.push(insight(
            team,
            metric_date,
            InsightKind::EngagementDrop,
            "Engagement drop detected",
            format!(
                "Only {} check-ins this week across {} active members.",
                metrics.check_ins_count, metrics.active_members
            ),
            0.65,
            metrics.check_ins_count,
        ));
    }

    if let Some(cci) = metrics
        .cognitive_capacity_index
        .filter(|value| *value < LOW_CCI)
    {
        insights.push(insight(
            team,
            metric_date,
            InsightKind::CognitiveLoad,
            "Cognitive load alert",
            format!(
                "Cognitive capacity index is {}. Recommend reducing meeting load by 20%.",
                cci
            ),
            0.81,
            cci,
        ));
    }

    insights
}

/// Nudges keyed off the wall-clock hour of the run, not the metric date.
pub fn nudges(team: &Team, metrics: &TeamMetrics, metric_date: NaiveDate, hour: u32) -> Vec<Alert> {
    let mut nudges = Vec::new();

    if MORNING_WINDOW.contains(&hour) {
        if let Some(recovery) = metrics
            .avg_recovery_score
            .filter(|value| *value < MORNING_RECOVERY_FLOOR)
        {
            nudges.push(Alert {
                activity_type: ActivityType::Nudge,
                title: "Start with low-stakes tasks".to_string(),
                description: format!(
                    "Team recovery is averaging {}. Ease in with lighter work before deep focus blocks.",
                    recovery
                ),
                metadata: with_fields(
                    base_metadata(team, metric_date),
                    json!({ "nudge": NudgeKind::LowStakesStart.as_str(), "metric_value": recovery }),
                ),
            });
        }
    }

    if AFTERNOON_WINDOW.contains(&hour) {
        if let Some(energy) = metrics
            .avg_energy_score
            .filter(|value| *value < AFTERNOON_ENERGY_FLOOR)
        {
            nudges.push(Alert {
                activity_type: ActivityType::Nudge,
                title: "Time for a movement break".to_string(),
                description: format!(
                    "Team energy is averaging {}. A short walk or stretch can lift the afternoon dip.",
                    energy
                ),
                metadata: with_fields(
                    base_metadata(team, metric_date),
                    json!({ "nudge": NudgeKind::MovementBreak.as_str(), "metric_value": energy }),
                ),
            });
        }
    }

    nudges
}

/// Returns true when at least one admin was notified.
pub async fn dispatch_burnout_alert(
    store: &dyn MetricsStore,
    team: &Team,
    metrics: &TeamMetrics,
    metric_date: NaiveDate,
) -> bool {
    let Some(alert) = burnout_alert(team, metrics, metric_date) else {
        return false;
    };

    let admins = match store.organization_admin_ids(team.organization_id).await {
        Ok(admins) => admins,
        Err(err) => {
            warn!(team = %team.name, error = %err, "failed to fetch admins for burnout alert");
            return false;
        }
    };

    if admins.is_empty() {
        info!(team = %team.name, "burnout threshold crossed but no admins to notify");
        return false;
    }

    match store.insert_notifications(&alert.address_to(&admins)).await {
        Ok(_) => {
            info!(
                team = %team.name,
                risk = metrics.burnout_risk_score,
                recipients = admins.len(),
                "burnout alert sent"
            );
            true
        }
        Err(err) => {
            warn!(team = %team.name, error = %err, "failed to insert burnout alert");
            false
        }
    }
}

/// Returns the number of insights delivered.
pub async fn dispatch_predictive_insights(
    store: &dyn MetricsStore,
    team: &Team,
    metrics: &TeamMetrics,
    metric_date: NaiveDate,
) -> usize {
    let insights = predictive_insights(team, metrics, metric_date);
    if insights.is_empty() {
        return 0;
    }

    let admins = match store.organization_admin_ids(team.organization_id).await {
        Ok(admins) if !admins.is_empty() => admins,
        Ok(_) => {
            debug!(team = %team.name, "no admins to receive predictive insights");
            return 0;
        }
        Err(err) => {
            warn!(team = %team.name, error = %err, "failed to fetch admins for predictive insights");
            return 0;
        }
    };

    let mut delivered = 0;
    for insight in &insights {
        match store.insert_notifications(&insight.address_to(&admins)).await {
            Ok(_) => delivered += 1,
            Err(err) => warn!(
                team = %team.name,
                insight = %insight.title,
                error = %err,
                "failed to insert predictive insight"
            ),
        }
    }

    delivered
}

/// Nudges go to every team member, not just admins.
pub async fn dispatch_nudges(
    store: &dyn MetricsStore,
    team: &Team,
    member_ids: &[Uuid],
    metrics: &TeamMetrics,
    metric_date: NaiveDate,
    hour: u32,
) -> usize {
    let mut delivered = 0;

    for nudge in nudges(team, metrics, metric_date, hour) {
        match store.insert_notifications(&nudge.address_to(member_ids)).await {
            Ok(_) => delivered += 1,
            Err(err) => warn!(
                team = %team.name,
                nudge = %nudge.title,
                error = %err,
                "failed to insert nudge"
            ),
        }
    }

    delivered
}
