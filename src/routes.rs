//! HTTP surface for the lead intake engine.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::directory::EntityId;
use crate::dispatch::{
    AssignmentDecision, DispatchError, ExecutiveId, ExecutivePool, LeadType, PoolError,
};
use crate::engine::LeadEngine;
use crate::stats::SnapshotStore;

#[derive(Debug, Deserialize)]
pub(crate) struct AssignLeadRequest {
    pub(crate) lead_type: LeadType,
    pub(crate) lead_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecideAssignmentRequest {
    pub(crate) executive_id: String,
    pub(crate) decision: AssignmentDecision,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveReferrerQuery {
    pub(crate) phone: String,
}

/// Router builder exposing the engine's operations.
pub fn engine_router<P, S>(engine: Arc<LeadEngine<P, S>>) -> Router
where
    P: ExecutivePool + 'static,
    S: SnapshotStore + 'static,
{
    Router::new()
        .route("/api/v1/leads/assign", post(assign_lead_handler::<P, S>))
        .route(
            "/api/v1/agents/:agent_id/assignment-request",
            post(request_agent_handler::<P, S>),
        )
        .route(
            "/api/v1/agents/:agent_id/assignment-decision",
            post(decide_agent_handler::<P, S>),
        )
        .route(
            "/api/v1/referrers/resolve",
            get(resolve_referrer_handler::<P, S>),
        )
        .route("/api/v1/agents/:agent_id/stats", get(stats_handler::<P, S>))
        .route(
            "/api/v1/stats/recompute",
            post(recompute_handler::<P, S>),
        )
        .with_state(engine)
}

pub(crate) async fn assign_lead_handler<P, S>(
    State(engine): State<Arc<LeadEngine<P, S>>>,
    Json(request): Json<AssignLeadRequest>,
) -> Response
where
    P: ExecutivePool + 'static,
    S: SnapshotStore + 'static,
{
    match engine.assign_lead(request.lead_type, EntityId(request.lead_id)) {
        Ok(Some(outcome)) => {
            let payload = json!({
                "assigned": true,
                "executive_id": outcome.executive_id.0,
                "executive_name": outcome.executive_name,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        // No capacity is a legitimate outcome: the lead awaits manual
        // triage and the registrant never sees a failure.
        Ok(None) => {
            let payload = json!({ "assigned": false });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => internal_error(err),
    }
}

pub(crate) async fn request_agent_handler<P, S>(
    State(engine): State<Arc<LeadEngine<P, S>>>,
    Path(agent_id): Path<String>,
) -> Response
where
    P: ExecutivePool + 'static,
    S: SnapshotStore + 'static,
{
    let triage = engine.request_agent_assignment(EntityId(agent_id));
    (StatusCode::ACCEPTED, Json(triage)).into_response()
}

pub(crate) async fn decide_agent_handler<P, S>(
    State(engine): State<Arc<LeadEngine<P, S>>>,
    Path(agent_id): Path<String>,
    Json(request): Json<DecideAssignmentRequest>,
) -> Response
where
    P: ExecutivePool + 'static,
    S: SnapshotStore + 'static,
{
    let agent_id = EntityId(agent_id);
    let executive_id = ExecutiveId(request.executive_id);
    match engine.decide_agent_assignment(&agent_id, &executive_id, request.decision) {
        Ok(triage) => (StatusCode::OK, Json(triage)).into_response(),
        Err(err @ DispatchError::UnknownAgent(_))
        | Err(err @ DispatchError::UnknownExecutive(_))
        | Err(err @ DispatchError::Pool(PoolError::NotFound)) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(err @ DispatchError::AlreadyDecided(_)) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        Err(err @ DispatchError::InactiveExecutive(_)) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn resolve_referrer_handler<P, S>(
    State(engine): State<Arc<LeadEngine<P, S>>>,
    Query(query): Query<ResolveReferrerQuery>,
) -> Response
where
    P: ExecutivePool + 'static,
    S: SnapshotStore + 'static,
{
    let resolved = engine.resolve_referrer(&query.phone);
    (StatusCode::OK, Json(resolved)).into_response()
}

pub(crate) async fn stats_handler<P, S>(
    State(engine): State<Arc<LeadEngine<P, S>>>,
    Path(agent_id): Path<String>,
) -> Response
where
    P: ExecutivePool + 'static,
    S: SnapshotStore + 'static,
{
    let agent_id = EntityId(agent_id);
    match engine.stats_snapshot(&agent_id) {
        Ok(Some(snapshot)) => (StatusCode::OK, Json(snapshot)).into_response(),
        Ok(None) => {
            let payload = json!({
                "agent_id": agent_id.0,
                "error": "no snapshot computed for agent",
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(err) => internal_error(err),
    }
}

pub(crate) async fn recompute_handler<P, S>(
    State(engine): State<Arc<LeadEngine<P, S>>>,
) -> Response
where
    P: ExecutivePool + 'static,
    S: SnapshotStore + 'static,
{
    match engine.trigger_recompute() {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => internal_error(err),
    }
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    let payload = json!({ "error": err.to_string() });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
