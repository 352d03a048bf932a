use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use crate::db::MetricsStore;
use crate::error::StoreResult;
use crate::models::{CheckIn, MemberAnalyticsSnapshot, MetricType, RawMetricSample, TeamMetrics};

pub const WINDOW_DAYS: i64 = 7;
pub const REVENUE_PER_INACTIVE_MEMBER: i64 = 2500;
pub const JITTER_SPAN: f64 = 5.0;

const READINESS_ALIASES: &[MetricType] = &[MetricType::Readiness, MetricType::Recovery];
const FOCUS_ALIASES: &[MetricType] = &[MetricType::Focus, MetricType::Concentration];
const ENERGY_ALIASES: &[MetricType] = &[MetricType::Energy, MetricType::Strain];
const RECOVERY_ALIASES: &[MetricType] = &[MetricType::Recovery, MetricType::SleepQuality];

/// The four inputs of the cognitive capacity index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Readiness,
    Focus,
    Energy,
    Recovery,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Readiness,
        Component::Focus,
        Component::Energy,
        Component::Recovery,
    ];

    pub fn weight(self) -> f64 {
        match self {
            Component::Readiness => 0.30,
            Component::Focus => 0.25,
            Component::Energy => 0.25,
            Component::Recovery => 0.20,
        }
    }

    /// Metric tags consulted in order; the first one with samples wins.
    pub fn aliases(self) -> &'static [MetricType] {
        match self {
            Component::Readiness => READINESS_ALIASES,
            Component::Focus => FOCUS_ALIASES,
            Component::Energy => ENERGY_ALIASES,
            Component::Recovery => RECOVERY_ALIASES,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentScores {
    pub readiness: Option<i32>,
    pub focus: Option<i32>,
    pub energy: Option<i32>,
    pub recovery: Option<i32>,
}

impl ComponentScores {
    pub fn resolve(averages: &HashMap<MetricType, i32>) -> Self {
        Self {
            readiness: resolve_component(averages, Component::Readiness),
            focus: resolve_component(averages, Component::Focus),
            energy: resolve_component(averages, Component::Energy),
            recovery: resolve_component(averages, Component::Recovery),
        }
    }

    pub fn get(&self, component: Component) -> Option<i32> {
        match component {
            Component::Readiness => self.readiness,
            Component::Focus => self.focus,
            Component::Energy => self.energy,
            Component::Recovery => self.recovery,
        }
    }
}

/// Source of the perturbation added to burnout risk.
pub trait RiskJitter: Send + Sync {
    fn sample(&self) -> f64;
}

/// Uniform noise in `[-JITTER_SPAN, JITTER_SPAN]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformJitter;

impl RiskJitter for UniformJitter {
    fn sample(&self) -> f64 {
        rand::rng().random_range(-JITTER_SPAN..=JITTER_SPAN)
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedJitter(pub f64);

#[cfg(test)]
impl RiskJitter for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}

pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(WINDOW_DAYS)
}

pub fn round_half_up(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}

pub fn average_by_type(samples: &[RawMetricSample]) -> HashMap<MetricType, i32> {
    let mut totals: HashMap<&MetricType, (f64, usize)> = HashMap::new();

    for sample in samples {
        let entry = totals.entry(&sample.metric_type).or_insert((0.0, 0));
        entry.0 += sample.value;
        entry.1 += 1;
    }

    totals
        .into_iter()
        .map(|(metric_type, (sum, count))| {
            if let MetricType::Other(tag) = metric_type {
                debug!(tag = %tag, samples = count, "grouping unrecognised metric tag");
            }
            (metric_type.clone(), round_half_up(sum / count as f64))
        })
        .collect()
}

pub fn resolve_component(averages: &HashMap<MetricType, i32>, component: Component) -> Option<i32> {
    component
        .aliases()
        .iter()
        .find_map(|metric_type| averages.get(metric_type).copied())
}

/// Weighted mean over the components that have data, renormalised by the
/// weights actually present.
pub fn cognitive_capacity_index(scores: &ComponentScores) -> Option<i32> {
    let (weighted, total_weight) = Component::ALL
        .iter()
        .filter_map(|component| {
            scores
                .get(*component)
                .map(|value| (value as f64 * component.weight(), component.weight()))
        })
        .fold((0.0, 0.0), |(sum, weights), (value, weight)| {
            (sum + value, weights + weight)
        });

    if total_weight <= 0.0 {
        return None;
    }

    Some(round_half_up(weighted / total_weight))
}

/// Placeholder burnout signal: inverse of the index plus noise, clamped to 0..=100.
pub fn inject_risk_jitter(cci: i32, jitter: f64) -> i32 {
    let raw = 100.0 - cci as f64 + jitter;
    round_half_up(raw.clamp(0.0, 100.0))
}

pub fn count_active_members(snapshots: &[MemberAnalyticsSnapshot], now: DateTime<Utc>) -> i32 {
    let since = window_start(now);
    snapshots
        .iter()
        .filter(|snapshot| snapshot.last_active_at.is_some_and(|at| at >= since))
        .count() as i32
}

/// Heuristic scaling of completed protocols per member, capped at 100.
pub fn protocol_completion_rate(
    snapshots: &[MemberAnalyticsSnapshot],
    member_count: usize,
) -> Option<i32> {
    if member_count == 0 {
        return None;
    }

    let completed: i64 = snapshots
        .iter()
        .map(|snapshot| snapshot.protocols_completed as i64)
        .sum();
    let scaled = round_half_up(completed as f64 / member_count as f64 * 10.0);
    Some(scaled.min(100))
}

pub fn revenue_exposure(member_count: usize, active_members: i32) -> i64 {
    let inactive = (member_count as i64 - active_members as i64).max(0);
    inactive * REVENUE_PER_INACTIVE_MEMBER
}

/// Reduces telemetry for `member_ids`; rows for other users or outside the
/// window are ignored.
pub fn reduce(
    member_ids: &[Uuid],
    snapshots: &[MemberAnalyticsSnapshot],
    samples: &[RawMetricSample],
    check_ins: &[CheckIn],
    now: DateTime<Utc>,
    jitter: &dyn RiskJitter,
) -> TeamMetrics {
    let members: HashSet<&Uuid> = member_ids.iter().collect();
    let member_count = members.len();
    let since = window_start(now);

    let snapshots: Vec<MemberAnalyticsSnapshot> = snapshots
        .iter()
        .filter(|snapshot| members.contains(&snapshot.user_id))
        .cloned()
        .collect();
    let samples: Vec<RawMetricSample> = samples
        .iter()
        .filter(|sample| members.contains(&sample.user_id) && sample.recorded_at >= since)
        .cloned()
        .collect();
    let check_ins = check_ins
        .iter()
        .filter(|check_in| members.contains(&check_in.user_id) && check_in.created_at >= since)
        .count();

    let averages = average_by_type(&samples);
    let scores = ComponentScores::resolve(&averages);
    let cognitive_capacity_index = cognitive_capacity_index(&scores);
    let burnout_risk_score =
        cognitive_capacity_index.map(|cci| inject_risk_jitter(cci, jitter.sample()));
    let active_members = count_active_members(&snapshots, now);

    TeamMetrics {
        member_count,
        avg_readiness_score: scores.readiness,
        avg_focus_score: scores.focus,
        avg_energy_score: scores.energy,
        avg_recovery_score: scores.recovery,
        cognitive_capacity_index,
        burnout_risk_score,
        active_members,
        protocol_completion_rate: protocol_completion_rate(&snapshots, member_count),
        check_ins_count: check_ins as i32,
        revenue_exposure: revenue_exposure(member_count, active_members),
    }
}

/// Pulls a team's trailing-window telemetry and reduces it.
pub async fn build_team_metrics(
    store: &dyn MetricsStore,
    organization_id: Uuid,
    member_ids: &[Uuid],
    now: DateTime<Utc>,
    jitter: &dyn RiskJitter,
) -> StoreResult<TeamMetrics> {
    let since = window_start(now);
    let snapshots = store.analytics_snapshots(organization_id, member_ids).await?;
    let samples = store.metric_samples(member_ids, since).await?;
    let check_ins = store.check_ins(member_ids, since).await?;

    Ok(reduce(
        member_ids,
        &snapshots,
        &samples,
        &check_ins,
        now,
        jitter,
    ))
}
