use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Team {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct MemberAnalyticsSnapshot {
    pub user_id: Uuid,
    pub last_active_at: Option<DateTime<Utc>>,
    pub protocols_completed: i32,
}

#[derive(Debug, Clone)]
pub struct RawMetricSample {
    pub user_id: Uuid,
    pub metric_type: MetricType,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CheckIn {
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Known telemetry tags. Anything else lands in `Other` so a typo upstream
/// shows up as its own bucket instead of silently feeding a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetricType {
    Readiness,
    Focus,
    Energy,
    Recovery,
    SleepQuality,
    Strain,
    Concentration,
    Other(String),
}

impl MetricType {
    pub fn from_tag(tag: &str) -> Self {
        let normalized = tag.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "readiness" => Self::Readiness,
            "focus" => Self::Focus,
            "energy" => Self::Energy,
            "recovery" => Self::Recovery,
            "sleep_quality" => Self::SleepQuality,
            "strain" => Self::Strain,
            "concentration" => Self::Concentration,
            _ => Self::Other(normalized),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            Self::Readiness => "readiness",
            Self::Focus => "focus",
            Self::Energy => "energy",
            Self::Recovery => "recovery",
            Self::SleepQuality => "sleep_quality",
            Self::Strain => "strain",
            Self::Concentration => "concentration",
            Self::Other(tag) => tag,
        }
    }
}

/// Reduced scores for one team. `None` means "no data", never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamMetrics {
    pub member_count: usize,
    pub avg_readiness_score: Option<i32>,
    pub avg_focus_score: Option<i32>,
    pub avg_energy_score: Option<i32>,
    pub avg_recovery_score: Option<i32>,
    pub cognitive_capacity_index: Option<i32>,
    pub burnout_risk_score: Option<i32>,
    pub active_members: i32,
    pub protocol_completion_rate: Option<i32>,
    pub check_ins_count: i32,
    pub revenue_exposure: i64,
}

/// One row of `team_metrics`, unique per `(team_id, metric_date)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamMetricsRecord {
    pub team_id: Uuid,
    pub metric_date: NaiveDate,
    pub avg_readiness_score: Option<i32>,
    pub avg_focus_score: Option<i32>,
    pub avg_energy_score: Option<i32>,
    pub avg_recovery_score: Option<i32>,
    pub burnout_risk_score: Option<i32>,
    pub cognitive_capacity_index: Option<i32>,
    pub active_members: i32,
    pub protocol_completion_rate: Option<i32>,
    pub check_ins_count: i32,
    pub revenue_exposure: i64,
}

impl TeamMetricsRecord {
    pub fn new(team_id: Uuid, metric_date: NaiveDate, metrics: &TeamMetrics) -> Self {
        Self {
            team_id,
            metric_date,
            avg_readiness_score: metrics.avg_readiness_score,
            avg_focus_score: metrics.avg_focus_score,
            avg_energy_score: metrics.avg_energy_score,
            avg_recovery_score: metrics.avg_recovery_score,
            burnout_risk_score: metrics.burnout_risk_score,
            cognitive_capacity_index: metrics.cognitive_capacity_index,
            active_members: metrics.active_members,
            protocol_completion_rate: metrics.protocol_completion_rate,
            check_ins_count: metrics.check_ins_count,
            revenue_exposure: metrics.revenue_exposure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    BurnoutAlert,
    PredictiveInsight,
    Nudge,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BurnoutAlert => "burnout_alert",
            Self::PredictiveInsight => "predictive_insight",
            Self::Nudge => "nudge",
        }
    }
}

/// A row for the activity feed. Always inserted unread.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub activity_type: ActivityType,
    pub title: String,
    pub description: String,
    pub metadata: Value,
}

/// Persisted metrics joined with the team name, for reporting.
#[derive(Debug, Clone)]
pub struct TeamMetricsRow {
    pub team_name: String,
    pub record: TeamMetricsRecord,
}
