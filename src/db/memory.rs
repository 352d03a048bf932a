//! In-memory `MetricsStore` with failure injection, for exercising the job.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::MetricsStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    CheckIn, MemberAnalyticsSnapshot, NewNotification, RawMetricSample, Team, TeamMetricsRecord,
};

#[derive(Default)]
pub struct MemoryStore {
    pub teams: Vec<Team>,
    pub memberships: HashMap<Uuid, Vec<Uuid>>,
    /// organisation -> (user, role)
    pub roles: HashMap<Uuid, Vec<(Uuid, String)>>,
    /// (organisation, user) -> snapshot
    pub analytics: HashMap<(Uuid, Uuid), MemberAnalyticsSnapshot>,
    pub samples: Vec<RawMetricSample>,
    pub check_ins: Vec<CheckIn>,

    pub fail_list_teams: bool,
    pub fail_upsert: bool,
    pub fail_notifications: bool,
    pub fail_admin_lookup_for: HashSet<Uuid>,
    pub fail_samples_for_users: HashSet<Uuid>,

    pub notifications: Mutex<Vec<NewNotification>>,
    pub team_metrics: Mutex<BTreeMap<(Uuid, NaiveDate), TeamMetricsRecord>>,
    pub upsert_calls: Mutex<usize>,
}

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

impl MemoryStore {
    pub fn add_team(&mut self, organization_id: Uuid, name: &str, members: &[Uuid]) -> Uuid {
        let id = Uuid::new_v4();
        self.teams.push(Team {
            id,
            organization_id,
            name: name.to_string(),
        });
        self.memberships.insert(id, members.to_vec());
        id
    }

    pub fn add_role(&mut self, organization_id: Uuid, user_id: Uuid, role: &str) {
        self.roles
            .entry(organization_id)
            .or_default()
            .push((user_id, role.to_string()));
    }

    pub fn add_snapshot(
        &mut self,
        organization_id: Uuid,
        user_id: Uuid,
        last_active_at: Option<DateTime<Utc>>,
        protocols_completed: i32,
    ) {
        self.analytics.insert(
            (organization_id, user_id),
            MemberAnalyticsSnapshot {
                user_id,
                last_active_at,
                protocols_completed,
            },
        );
    }

    pub fn add_sample(&mut self, user_id: Uuid, tag: &str, value: f64, recorded_at: DateTime<Utc>) {
        self.samples.push(RawMetricSample {
            user_id,
            metric_type: crate::models::MetricType::from_tag(tag),
            value,
            recorded_at,
        });
    }

    pub fn add_check_in(&mut self, user_id: Uuid, created_at: DateTime<Utc>) {
        self.check_ins.push(CheckIn {
            user_id,
            created_at,
        });
    }

    pub fn sent(&self) -> Vec<NewNotification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn stored(&self) -> Vec<TeamMetricsRecord> {
        self.team_metrics.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        if self.fail_list_teams {
            return Err(unavailable());
        }
        Ok(self.teams.clone())
    }

    async fn team_member_ids(&self, team_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(self.memberships.get(&team_id).cloned().unwrap_or_default())
    }

    async fn organization_admin_ids(&self, organization_id: Uuid) -> StoreResult<Vec<Uuid>> {
        if self.fail_admin_lookup_for.contains(&organization_id) {
            return Err(unavailable());
        }
        Ok(self
            .roles
            .get(&organization_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|(_, role)| role == "admin" || role == "owner")
                    .map(|(user_id, _)| *user_id)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn analytics_snapshots(
        &self,
        organization_id: Uuid,
        user_ids: &[Uuid],
    ) -> StoreResult<Vec<MemberAnalyticsSnapshot>> {
        Ok(user_ids
            .iter()
            .filter_map(|user_id| self.analytics.get(&(organization_id, *user_id)).cloned())
            .collect())
    }

    async fn metric_samples(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<RawMetricSample>> {
        if user_ids
            .iter()
            .any(|user_id| self.fail_samples_for_users.contains(user_id))
        {
            return Err(unavailable());
        }
        Ok(self
            .samples
            .iter()
            .filter(|sample| user_ids.contains(&sample.user_id) && sample.recorded_at >= since)
            .cloned()
            .collect())
    }

    async fn check_ins(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<CheckIn>> {
        Ok(self
            .check_ins
            .iter()
            .filter(|check_in| user_ids.contains(&check_in.user_id) && check_in.created_at >= since)
            .cloned()
            .collect())
    }

    async fn insert_notifications(&self, notifications: &[NewNotification]) -> StoreResult<u64> {
        if self.fail_notifications {
            return Err(unavailable());
        }
        self.notifications
            .lock()
            .unwrap()
            .extend(notifications.iter().cloned());
        Ok(notifications.len() as u64)
    }

    async fn upsert_team_metrics(&self, records: &[TeamMetricsRecord]) -> StoreResult<u64> {
        *self.upsert_calls.lock().unwrap() += 1;
        if self.fail_upsert {
            return Err(unavailable());
        }
        let mut stored = self.team_metrics.lock().unwrap();
        for record in records {
            stored.insert((record.team_id, record.metric_date), record.clone());
        }
        Ok(records.len() as u64)
    }
}
