use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::db::MetricsStore;
use crate::error::JobError;
use crate::job::{self, RunOutcome};
use crate::metrics::RiskJitter;

const ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetricsStore>,
    pub jitter: Arc<dyn RiskJitter>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(trigger))
        .route("/{*path}", any(trigger))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("aggregation endpoint listening on {}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}

/// Any method other than `OPTIONS` triggers a run.
async fn trigger(State(state): State<AppState>, method: Method) -> Response {
    if method == Method::OPTIONS {
        return with_cors(StatusCode::NO_CONTENT.into_response());
    }

    let outcome = job::run(state.store.as_ref(), state.jitter.as_ref(), Utc::now()).await;
    let (status, body) = outcome_body(&outcome);
    with_cors((status, Json(body)).into_response())
}

pub fn outcome_body(outcome: &Result<RunOutcome, JobError>) -> (StatusCode, Value) {
    match outcome {
        Ok(RunOutcome::NoTeams) => (StatusCode::OK, json!({ "message": "No teams to process" })),
        Ok(RunOutcome::Completed(summary)) => (
            StatusCode::OK,
            json!({
                "success": true,
                "message": format!("Aggregated metrics for {} teams", summary.teams_processed),
                "date": summary.date.format("%Y-%m-%d").to_string(),
                "teams_processed": summary.teams_processed,
                "burnout_alerts_sent": summary.burnout_alerts_sent,
            }),
        ),
        Err(err) => {
            error!(error = %err, "aggregation run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": err.to_string() }),
            )
        }
    }
}

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::error::StoreError;
    use crate::job::RunSummary;
    use crate::metrics::FixedJitter;
    use chrono::NaiveDate;

    fn state(store: MemoryStore) -> AppState {
        AppState {
            store: Arc::new(store),
            jitter: Arc::new(FixedJitter(0.0)),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn preflight_returns_no_content_with_cors() {
        let response = trigger(State(state(MemoryStore::default())), Method::OPTIONS).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
            ALLOW_HEADERS
        );
    }

    #[tokio::test]
    async fn empty_store_reports_no_teams() {
        let response = trigger(State(state(MemoryStore::default())), Method::POST).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "message": "No teams to process" })
        );
    }

    #[tokio::test]
    async fn listing_failure_is_a_500() {
        let store = MemoryStore {
            fail_list_teams: true,
            ..MemoryStore::default()
        };
        let response = trigger(State(state(store)), Method::GET).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body = body_json(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("failed to fetch teams"));
    }

    #[test]
    fn summary_shape_matches_contract() {
        let outcome = Ok(RunOutcome::Completed(RunSummary {
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            teams_processed: 4,
            burnout_alerts_sent: 1,
            insights_sent: 3,
            nudges_sent: 0,
            teams_skipped: 1,
            teams_failed: 0,
        }));
        let (status, body) = outcome_body(&outcome);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "success": true,
                "message": "Aggregated metrics for 4 teams",
                "date": "2026-03-02",
                "teams_processed": 4,
                "burnout_alerts_sent": 1,
            })
        );
    }

    #[test]
    fn persistence_failure_is_reported() {
        let outcome = Err(JobError::Persist(StoreError::Database(
            sqlx::Error::PoolClosed,
        )));
        let (status, body) = outcome_body(&outcome);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("failed to upsert team metrics"));
    }
}
