use chrono::{DateTime, NaiveDate, Timelike, Utc};
use tracing::{debug, info, warn};

use crate::alerts;
use crate::db::MetricsStore;
use crate::error::{JobError, StoreResult};
use crate::metrics::{self, RiskJitter};
use crate::models::{Team, TeamMetricsRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub teams_processed: usize,
    pub burnout_alerts_sent: usize,
    pub insights_sent: usize,
    pub nudges_sent: usize,
    pub teams_skipped: usize,
    pub teams_failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    NoTeams,
    Completed(RunSummary),
}

/// Per-invocation state; nothing outlives a run.
#[derive(Debug, Default)]
struct Batch {
    records: Vec<TeamMetricsRecord>,
    burnout_alerts_sent: usize,
    insights_sent: usize,
    nudges_sent: usize,
    teams_skipped: usize,
    teams_failed: usize,
}

enum TeamResult {
    Aggregated(TeamMetricsRecord),
    Empty,
}

/// Aggregates every team for the UTC date of `now` and upserts the batch.
///
/// Team-level failures are logged and the team is left out of the batch.
/// Only listing teams and the final upsert abort the run. Notifications are
/// sent as each team is reduced, so they can precede (or outlive a failed)
/// metrics write.
pub async fn run(
    store: &dyn MetricsStore,
    jitter: &dyn RiskJitter,
    now: DateTime<Utc>,
) -> Result<RunOutcome, JobError> {
    let metric_date = now.date_naive();
    let teams = store.list_teams().await.map_err(JobError::ListTeams)?;

    if teams.is_empty() {
        info!("no teams to process");
        return Ok(RunOutcome::NoTeams);
    }

    info!(teams = teams.len(), date = %metric_date, "aggregating team metrics");
    let mut batch = Batch::default();

    for team in &teams {
        match process_team(store, jitter, team, now, &mut batch).await {
            Ok(TeamResult::Aggregated(record)) => batch.records.push(record),
            Ok(TeamResult::Empty) => {
                debug!(team = %team.name, "skipping team without members");
                batch.teams_skipped += 1;
            }
            Err(err) => {
                warn!(team = %team.name, team_id = %team.id, error = %err, "skipping team");
                batch.teams_failed += 1;
            }
        }
    }

    if !batch.records.is_empty() {
        store
            .upsert_team_metrics(&batch.records)
            .await
            .map_err(JobError::Persist)?;
    }

    let summary = RunSummary {
        date: metric_date,
        teams_processed: batch.records.len(),
        burnout_alerts_sent: batch.burnout_alerts_sent,
        insights_sent: batch.insights_sent,
        nudges_sent: batch.nudges_sent,
        teams_skipped: batch.teams_skipped,
        teams_failed: batch.teams_failed,
    };
    info!(
        processed = summary.teams_processed,
        skipped = summary.teams_skipped,
        failed = summary.teams_failed,
        burnout_alerts = summary.burnout_alerts_sent,
        insights = summary.insights_sent,
        nudges = summary.nudges_sent,
        "team metrics aggregated"
    );

    Ok(RunOutcome::Completed(summary))
}

async fn process_team(
    store: &dyn MetricsStore,
    jitter: &dyn RiskJitter,
    team: &Team,
    now: DateTime<Utc>,
    batch: &mut Batch,
) -> StoreResult<TeamResult> {
    let member_ids = store.team_member_ids(team.id).await?;
    if member_ids.is_empty() {
        return Ok(TeamResult::Empty);
    }

    let team_metrics =
        metrics::build_team_metrics(store, team.organization_id, &member_ids, now, jitter).await?;
    let metric_date = now.date_naive();

    if alerts::dispatch_burnout_alert(store, team, &team_metrics, metric_date).await {
        batch.burnout_alerts_sent += 1;
    }
    batch.insights_sent +=
        alerts::dispatch_predictive_insights(store, team, &team_metrics, metric_date).await;
    batch.nudges_sent += alerts::dispatch_nudges(
        store,
        team,
        &member_ids,
        &team_metrics,
        metric_date,
        now.hour(),
    )
    .await;

    debug!(
        team = %team.name,
        members = team_metrics.member_count,
        cci = ?team_metrics.cognitive_capacity_index,
        burnout_risk = ?team_metrics.burnout_risk_score,
        "team reduced"
    );

    Ok(TeamResult::Aggregated(TeamMetricsRecord::new(
        team.id,
        metric_date,
        &team_metrics,
    )))
}
