use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::db;
use crate::error::AppError;
use crate::ingest;
use crate::models::{AggregationResult, DateRange, Group, SimilarityPair};
use crate::protocol::Verdict;
use crate::session::{Session, SessionError, Step};

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<Session>>,
    pub conn: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(session: Session, conn: Connection) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    pub start: Option<String>, // YYYY-MM-DD, empty means open
    pub end: Option<String>,
}

#[derive(Serialize)]
pub struct LoadResponse {
    pub rows: usize,
    pub cohort_rows: usize,
}

#[derive(Serialize)]
pub struct Pending {
    pub index: usize,
    pub pair: SimilarityPair,
}

#[derive(Serialize)]
pub struct StepResponse {
    #[serde(flatten)]
    pub step: Step,
    pub report_id: Option<i64>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Wallet dedup API running" }))
        .route("/records", post(load_records))
        .route("/process", post(process))
        .route("/pending", get(pending))
        .route("/confirm", post(confirm))
        .route("/reject", post(reject))
        .route("/report", get(report))
        .route("/groups", get(groups))
        .route("/reports/:id", get(stored_report))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(cfg: Config, state: AppState) -> eyre::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], cfg.port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn parse_date(raw: Option<String>) -> Result<Option<NaiveDate>, AppError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::InvalidDate(s.to_string())),
    }
}

/// Persists the report when a step finalizes a run.
async fn persist(state: &AppState, step: &Step, range: Option<DateRange>) -> Result<Option<i64>, AppError> {
    let Step::Resolved { report } = step else {
        return Ok(None);
    };
    let mut conn = state.conn.lock().await;
    let id = db::save_report(&mut conn, &range.unwrap_or_else(DateRange::all), report)?;
    info!("Stored report {} ({} rows)", id, report.len());
    Ok(Some(id))
}

// ---------- handlers ----------

async fn load_records(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<LoadResponse>, AppError> {
    let records = ingest::parse_records(&body)?;
    let rows = records.len();

    let mut session = state.session.lock().await;
    // an upload without cohort rows leaves the loaded set untouched
    if session.count_cohort(&records) == 0 {
        return Err(SessionError::NoRecords.into());
    }
    let cohort_rows = session.load_records(records)?;
    Ok(Json(LoadResponse { rows, cohort_rows }))
}

async fn process(
    State(state): State<AppState>,
    body: Option<Json<ProcessRequest>>,
) -> Result<Json<StepResponse>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let range = DateRange::from_dates(parse_date(req.start)?, parse_date(req.end)?);

    let step = state.session.lock().await.process(range)?;
    let report_id = persist(&state, &step, Some(range)).await?;
    Ok(Json(StepResponse { step, report_id }))
}

async fn pending(State(state): State<AppState>) -> Json<Option<Pending>> {
    let session = state.session.lock().await;
    Json(session.current().map(|(index, pair)| Pending {
        index,
        pair: pair.clone(),
    }))
}

async fn decide(state: AppState, verdict: Verdict) -> Result<Json<StepResponse>, AppError> {
    let (pending, step, range) = {
        let mut session = state.session.lock().await;
        let pending = session.current().map(|(index, pair)| (index, pair.clone()));
        let step = match verdict {
            Verdict::Confirm => session.confirm(),
            Verdict::Reject => session.reject(),
        };
        (pending, step, session.range())
    };

    // audit only: the verdict already stands
    if let Some((index, pair)) = &pending {
        let conn = state.conn.lock().await;
        if let Err(e) = db::record_decision(&conn, *index, pair, verdict) {
            error!("Failed to log {:?} for pair {}: {:?}", verdict, index, e);
        }
    }

    let report_id = persist(&state, &step, range).await?;
    Ok(Json(StepResponse { step, report_id }))
}

async fn confirm(State(state): State<AppState>) -> Result<Json<StepResponse>, AppError> {
    decide(state, Verdict::Confirm).await
}

async fn reject(State(state): State<AppState>) -> Result<Json<StepResponse>, AppError> {
    decide(state, Verdict::Reject).await
}

async fn report(State(state): State<AppState>) -> Result<Json<Vec<AggregationResult>>, AppError> {
    let session = state.session.lock().await;
    session
        .report()
        .map(|r| Json(r.to_vec()))
        .ok_or(AppError::NoReport)
}

async fn groups(State(state): State<AppState>) -> Json<Vec<Group>> {
    Json(state.session.lock().await.groups().to_vec())
}

async fn stored_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<db::StoredReport>, AppError> {
    let conn = state.conn.lock().await;
    db::load_report(&conn, id)?
        .map(Json)
        .ok_or(AppError::ReportNotFound(id))
}
