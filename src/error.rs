use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Failures that abort a whole aggregation run.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to fetch teams: {0}")]
    ListTeams(#[source] StoreError),
    #[error("failed to upsert team metrics: {0}")]
    Persist(#[source] StoreError),
}

pub type StoreResult<T> = Result<T, StoreError>;
