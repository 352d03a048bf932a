use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{
    CheckIn, MemberAnalyticsSnapshot, MetricType, NewNotification, RawMetricSample, Team,
    TeamMetricsRecord, TeamMetricsRow,
};

#[cfg(test)]
pub mod memory;

const UPSERT_CHUNK: usize = 1000;
const NOTIFICATION_CHUNK: usize = 1000;

/// Everything the aggregation job reads and writes.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn list_teams(&self) -> StoreResult<Vec<Team>>;

    async fn team_member_ids(&self, team_id: Uuid) -> StoreResult<Vec<Uuid>>;

    /// Users holding the `admin` or `owner` role in the organisation.
    async fn organization_admin_ids(&self, organization_id: Uuid) -> StoreResult<Vec<Uuid>>;

    async fn analytics_snapshots(
        &self,
        organization_id: Uuid,
        user_ids: &[Uuid],
    ) -> StoreResult<Vec<MemberAnalyticsSnapshot>>;

    async fn metric_samples(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<RawMetricSample>>;

    async fn check_ins(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<CheckIn>>;

    async fn insert_notifications(&self, notifications: &[NewNotification]) -> StoreResult<u64>;

    /// Insert or replace one row per `(team_id, metric_date)`.
    async fn upsert_team_metrics(&self, records: &[TeamMetricsRecord]) -> StoreResult<u64>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MetricsStore for PgStore {
    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        let rows = sqlx::query("SELECT id, organization_id, name FROM teams ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Team {
                id: row.get("id"),
                organization_id: row.get("organization_id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn team_member_ids(&self, team_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query("SELECT user_id FROM team_members WHERE team_id = $1")
            .bind(team_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| row.get("user_id")).collect())
    }

    async fn organization_admin_ids(&self, organization_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT user_id FROM organization_members \
             WHERE organization_id = $1 AND role IN ('admin', 'owner')",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("user_id")).collect())
    }

    async fn analytics_snapshots(
        &self,
        organization_id: Uuid,
        user_ids: &[Uuid],
    ) -> StoreResult<Vec<MemberAnalyticsSnapshot>> {
        let rows = sqlx::query(
            "SELECT user_id, last_active_at, protocols_completed FROM user_analytics \
             WHERE organization_id = $1 AND user_id = ANY($2)",
        )
        .bind(organization_id)
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MemberAnalyticsSnapshot {
                user_id: row.get("user_id"),
                last_active_at: row.get("last_active_at"),
                protocols_completed: row.get("protocols_completed"),
            })
            .collect())
    }

    async fn metric_samples(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<RawMetricSample>> {
        let rows = sqlx::query(
            "SELECT user_id, metric_type, value, recorded_at FROM user_metrics \
             WHERE user_id = ANY($1) AND recorded_at >= $2",
        )
        .bind(user_ids)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let tag: String = row.get("metric_type");
                RawMetricSample {
                    user_id: row.get("user_id"),
                    metric_type: MetricType::from_tag(&tag),
                    value: row.get("value"),
                    recorded_at: row.get("recorded_at"),
                }
            })
            .collect())
    }

    async fn check_ins(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<CheckIn>> {
        let rows = sqlx::query(
            "SELECT user_id, created_at FROM protocol_checkins \
             WHERE user_id = ANY($1) AND created_at >= $2",
        )
        .bind(user_ids)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CheckIn {
                user_id: row.get("user_id"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn insert_notifications(&self, notifications: &[NewNotification]) -> StoreResult<u64> {
        let mut inserted = 0u64;

        for chunk in notifications.chunks(NOTIFICATION_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO activity_feed \
                 (id, user_id, activity_type, title, description, metadata, is_read) ",
            );
            builder.push_values(chunk, |mut row, notification| {
                row.push_bind(Uuid::new_v4())
                    .push_bind(notification.user_id)
                    .push_bind(notification.activity_type.as_str())
                    .push_bind(notification.title.clone())
                    .push_bind(notification.description.clone())
                    .push_bind(notification.metadata.clone())
                    .push_bind(false);
            });

            inserted += builder.build().execute(&self.pool).await?.rows_affected();
        }

        Ok(inserted)
    }

    async fn upsert_team_metrics(&self, records: &[TeamMetricsRecord]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for chunk in records.chunks(UPSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO team_metrics \
                 (team_id, metric_date, avg_readiness_score, avg_focus_score, \
                 avg_energy_score, avg_recovery_score, burnout_risk_score, \
                 cognitive_capacity_index, active_members, protocol_completion_rate, \
                 check_ins_count, revenue_exposure) ",
            );
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.team_id)
                    .push_bind(record.metric_date)
                    .push_bind(record.avg_readiness_score)
                    .push_bind(record.avg_focus_score)
                    .push_bind(record.avg_energy_score)
                    .push_bind(record.avg_recovery_score)
                    .push_bind(record.burnout_risk_score)
                    .push_bind(record.cognitive_capacity_index)
                    .push_bind(record.active_members)
                    .push_bind(record.protocol_completion_rate)
                    .push_bind(record.check_ins_count)
                    .push_bind(record.revenue_exposure);
            });
            builder.push(
                " ON CONFLICT (team_id, metric_date) DO UPDATE SET \
                 avg_readiness_score = EXCLUDED.avg_readiness_score, \
                 avg_focus_score = EXCLUDED.avg_focus_score, \
                 avg_energy_score = EXCLUDED.avg_energy_score, \
                 avg_recovery_score = EXCLUDED.avg_recovery_score, \
                 burnout_risk_score = EXCLUDED.burnout_risk_score, \
                 cognitive_capacity_index = EXCLUDED.cognitive_capacity_index, \
                 active_members = EXCLUDED.active_members, \
                 protocol_completion_rate = EXCLUDED.protocol_completion_rate, \
                 check_ins_count = EXCLUDED.check_ins_count, \
                 revenue_exposure = EXCLUDED.revenue_exposure, \
                 updated_at = now()",
            );

            written += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }
}

pub async fn init_db(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn fetch_team_metrics(pool: &PgPool, date: NaiveDate) -> StoreResult<Vec<TeamMetricsRow>> {
    let rows = sqlx::query(
        "SELECT t.name AS team_name, m.team_id, m.metric_date, m.avg_readiness_score, \
         m.avg_focus_score, m.avg_energy_score, m.avg_recovery_score, m.burnout_risk_score, \
         m.cognitive_capacity_index, m.active_members, m.protocol_completion_rate, \
         m.check_ins_count, m.revenue_exposure \
         FROM team_metrics m \
         JOIN teams t ON t.id = m.team_id \
         WHERE m.metric_date = $1",
    )
    .bind(date)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| TeamMetricsRow {
            team_name: row.get("team_name"),
            record: TeamMetricsRecord {
                team_id: row.get("team_id"),
                metric_date: row.get("metric_date"),
                avg_readiness_score: row.get("avg_readiness_score"),
                avg_focus_score: row.get("avg_focus_score"),
                avg_energy_score: row.get("avg_energy_score"),
                avg_recovery_score: row.get("avg_recovery_score"),
                burnout_risk_score: row.get("burnout_risk_score"),
                cognitive_capacity_index: row.get("cognitive_capacity_index"),
                active_members: row.get("active_members"),
                protocol_completion_rate: row.get("protocol_completion_rate"),
                check_ins_count: row.get("check_ins_count"),
                revenue_exposure: row.get("revenue_exposure"),
            },
        })
        .collect())
}

const SEED_ORG: Uuid = Uuid::from_u128(0x6b1f_2a70_0000_4000_8000_0000_0000_0001);
const SEED_METRIC_TAGS: [&str; 4] = ["readiness", "focus", "energy", "recovery"];

/// Loads a demo organisation: two staffed teams, one empty team, a week of telemetry.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let teams = [
        (Uuid::from_u128(0x7e40_0000_0000_4000_8000_0000_0000_0001), "Platform Engineering"),
        (Uuid::from_u128(0x7e40_0000_0000_4000_8000_0000_0000_0002), "Customer Success"),
        (Uuid::from_u128(0x7e40_0000_0000_4000_8000_0000_0000_0003), "Research"),
    ];
    // (user, role, team index, days since active, protocols completed, baseline score)
    let members: [(u128, &str, usize, Option<i64>, i32, f64); 6] = [
        (1, "owner", 0, Some(0), 6, 72.0),
        (2, "admin", 0, Some(1), 4, 58.0),
        (3, "member", 0, Some(12), 0, 41.0),
        (4, "member", 0, Some(3), 2, 47.0),
        (5, "member", 1, Some(2), 9, 81.0),
        (6, "member", 1, None, 0, 76.0),
    ];

    for (team_id, name) in teams {
        sqlx::query(
            r#"
            INSERT INTO teams (id, organization_id, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(team_id)
        .bind(SEED_ORG)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let now = Utc::now();
    for (index, role, team_index, days_active, protocols, baseline) in members {
        let user_id = Uuid::from_u128(0x05e4_0000_0000_4000_8000_0000_0000_0000 + index);
        let (team_id, _) = teams
            .get(team_index)
            .context("seed member references an unknown team")?;

        sqlx::query(
            r#"
            INSERT INTO organization_members (organization_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (organization_id, user_id) DO UPDATE SET role = EXCLUDED.role
            "#,
        )
        .bind(SEED_ORG)
        .bind(user_id)
        .bind(role)
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT INTO team_members (team_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(*team_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO user_analytics (user_id, organization_id, last_active_at, protocols_completed)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, organization_id) DO UPDATE
            SET last_active_at = EXCLUDED.last_active_at,
                protocols_completed = EXCLUDED.protocols_completed
            "#,
        )
        .bind(user_id)
        .bind(SEED_ORG)
        .bind(days_active.map(|days| now - Duration::days(days)))
        .bind(protocols)
        .execute(pool)
        .await?;

        for day in 0..7i64 {
            let recorded_at = now - Duration::days(day) - Duration::hours(2);
            for (offset, tag) in SEED_METRIC_TAGS.iter().enumerate() {
                let value =
                    (baseline + (offset as f64 * 3.0) - (day as f64 * 1.5)).clamp(0.0, 100.0);
                sqlx::query(
                    r#"
                    INSERT INTO user_metrics (id, user_id, metric_type, value, recorded_at, source_key)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (source_key) DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(*tag)
                .bind(value)
                .bind(recorded_at)
                .bind(format!("seed-{index}-{tag}-{}", (now - Duration::days(day)).date_naive()))
                .execute(pool)
                .await?;
            }
        }

        if protocols > 0 {
            let check_in_id = Uuid::from_u128(0xc4ec_0000_0000_4000_8000_0000_0000_0000 + index);
            sqlx::query(
                "INSERT INTO protocol_checkins (id, user_id, created_at) VALUES ($1, $2, $3) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(check_in_id)
            .bind(user_id)
            .bind(now - Duration::hours(5))
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

#[derive(Debug, serde::Deserialize)]
pub struct CsvSample {
    pub user_id: Uuid,
    pub metric_type: String,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
    pub source_key: Option<String>,
}

pub fn read_samples_csv(csv_path: &std::path::Path) -> anyhow::Result<Vec<CsvSample>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut samples = Vec::new();

    for (line, result) in reader.deserialize::<CsvSample>().enumerate() {
        let sample = result.with_context(|| format!("invalid sample on data row {}", line + 1))?;
        samples.push(sample);
    }

    Ok(samples)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let samples = read_samples_csv(csv_path)?;
    let mut inserted = 0usize;

    for sample in samples {
        let metric_type = MetricType::from_tag(&sample.metric_type);
        let source_key = sample
            .source_key
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO user_metrics (id, user_id, metric_type, value, recorded_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(sample.user_id)
        .bind(metric_type.as_tag())
        .bind(sample.value)
        .bind(sample.recorded_at)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
