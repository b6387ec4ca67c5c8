use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::assignment::AssignmentRequest;
use super::consensus::{DissentInput, VoteKind};
use super::domain::{ArtifactKind, Case, CaseId, CaseIntake, PhysicianId};
use super::error::WorkflowError;
use super::lifecycle::{self, CaseTransition, TransitionKind};
use super::repository::{EventPublisher, Store};
use super::service::SecondOpinionService;

/// Router builder exposing case, assignment, and consensus endpoints.
pub fn second_opinion_router<S, P>(service: Arc<SecondOpinionService<S, P>>) -> Router
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    Router::new()
        .route("/api/v1/cases", post(open_case_handler::<S, P>))
        .route("/api/v1/cases/:case_id", get(case_handler::<S, P>))
        .route(
            "/api/v1/cases/:case_id/transitions",
            get(transition_log_handler::<S, P>),
        )
        .route(
            "/api/v1/cases/:case_id/transitions/:transition",
            post(transition_handler::<S, P>),
        )
        .route(
            "/api/v1/cases/:case_id/assignment",
            post(assignment_handler::<S, P>),
        )
        .route(
            "/api/v1/cases/:case_id/assignment/audit",
            get(assignment_audit_handler::<S, P>),
        )
        .route(
            "/api/v1/cases/:case_id/artifacts",
            post(artifact_handler::<S, P>),
        )
        .route(
            "/api/v1/cases/:case_id/consensus",
            get(voting_summary_handler::<S, P>),
        )
        .route(
            "/api/v1/cases/:case_id/consensus/versions",
            get(versions_handler::<S, P>),
        )
        .route(
            "/api/v1/cases/:case_id/consensus/proposals",
            post(proposal_handler::<S, P>),
        )
        .route(
            "/api/v1/cases/:case_id/consensus/voting",
            post(open_voting_handler::<S, P>),
        )
        .route(
            "/api/v1/cases/:case_id/consensus/votes",
            post(vote_handler::<S, P>),
        )
        .route(
            "/api/v1/cases/:case_id/consensus/close",
            post(close_voting_handler::<S, P>),
        )
        .route(
            "/api/v1/cases/:case_id/consensus/more-info",
            post(more_info_handler::<S, P>),
        )
        .route(
            "/api/v1/cases/:case_id/consensus/resume",
            post(resume_handler::<S, P>),
        )
        .with_state(service)
}

type SharedService<S, P> = State<Arc<SecondOpinionService<S, P>>>;

#[derive(Debug, Serialize)]
struct CaseView {
    #[serde(flatten)]
    case: Case,
    available_transitions: Vec<TransitionKind>,
}

impl From<Case> for CaseView {
    fn from(case: Case) -> Self {
        let available_transitions = lifecycle::available_transitions(case.status);
        Self {
            case,
            available_transitions,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TransitionBody {
    #[serde(default)]
    actor: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArtifactBody {
    kind: ArtifactKind,
    reference: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProposalBody {
    author: PhysicianId,
    text: String,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VoteBody {
    physician_id: PhysicianId,
    vote: VoteKind,
    #[serde(default)]
    justification: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CloseVotingBody {
    is_consensus: bool,
    #[serde(default)]
    dissenting_opinions: Vec<DissentInput>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoreInfoBody {
    description: String,
}

fn status_for(error: &WorkflowError) -> StatusCode {
    match error {
        WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::InvalidTransition { .. }
        | WorkflowError::GuardRejected { .. }
        | WorkflowError::WorkflowLocked { .. }
        | WorkflowError::PhaseMismatch { .. }
        | WorkflowError::CaseNotInDeliberation { .. }
        | WorkflowError::ArtifactOutOfPhase { .. } => StatusCode::CONFLICT,
        WorkflowError::NoCandidate { .. } | WorkflowError::NoCommittee { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WorkflowError::OverrideNotAllowed { .. }
        | WorkflowError::VoterNotEligible { .. }
        | WorkflowError::NotCommitteeMember { .. } => StatusCode::FORBIDDEN,
        WorkflowError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        WorkflowError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(error: WorkflowError) -> Response {
    let payload = json!({
        "error": error.to_string(),
        "retryable": error.is_retryable(),
    });
    (status_for(&error), Json(payload)).into_response()
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, WorkflowError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn open_case_handler<S, P>(
    State(service): SharedService<S, P>,
    Json(intake): Json<CaseIntake>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    respond(
        StatusCode::CREATED,
        service.open_case(intake).map(CaseView::from),
    )
}

pub(crate) async fn case_handler<S, P>(
    State(service): SharedService<S, P>,
    Path(case_id): Path<String>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.case(&CaseId(case_id)).map(CaseView::from),
    )
}

pub(crate) async fn transition_log_handler<S, P>(
    State(service): SharedService<S, P>,
    Path(case_id): Path<String>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    respond(StatusCode::OK, service.transition_log(&CaseId(case_id)))
}

pub(crate) async fn transition_handler<S, P>(
    State(service): SharedService<S, P>,
    Path((case_id, transition)): Path<(String, String)>,
    body: Option<Json<TransitionBody>>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    let Some(kind) = TransitionKind::parse(&transition) else {
        let payload = json!({
            "error": format!("unknown transition `{transition}`"),
        });
        return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
    };

    let Json(body) = body.unwrap_or_default();
    let request = match kind {
        TransitionKind::Cancel => CaseTransition::Cancel {
            reason: body.reason,
        },
        other => CaseTransition::from_kind(other),
    };

    respond(
        StatusCode::OK,
        service.transition(&CaseId(case_id), request, body.actor.as_deref()),
    )
}

pub(crate) async fn assignment_handler<S, P>(
    State(service): SharedService<S, P>,
    Path(case_id): Path<String>,
    body: Option<Json<AssignmentRequest>>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    let Json(request) = body.unwrap_or_default();
    respond(StatusCode::OK, service.assign(&CaseId(case_id), request))
}

pub(crate) async fn assignment_audit_handler<S, P>(
    State(service): SharedService<S, P>,
    Path(case_id): Path<String>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    respond(StatusCode::OK, service.assignment_audit(&CaseId(case_id)))
}

pub(crate) async fn artifact_handler<S, P>(
    State(service): SharedService<S, P>,
    Path(case_id): Path<String>,
    Json(body): Json<ArtifactBody>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service
            .record_artifact(&CaseId(case_id), body.kind, &body.reference)
            .map(CaseView::from),
    )
}

pub(crate) async fn voting_summary_handler<S, P>(
    State(service): SharedService<S, P>,
    Path(case_id): Path<String>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    respond(StatusCode::OK, service.voting_summary(&CaseId(case_id)))
}

pub(crate) async fn versions_handler<S, P>(
    State(service): SharedService<S, P>,
    Path(case_id): Path<String>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    respond(StatusCode::OK, service.consensus_versions(&CaseId(case_id)))
}

pub(crate) async fn proposal_handler<S, P>(
    State(service): SharedService<S, P>,
    Path(case_id): Path<String>,
    Json(body): Json<ProposalBody>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    respond(
        StatusCode::CREATED,
        service.draft_proposal(
            &CaseId(case_id),
            &body.author,
            &body.text,
            body.note.as_deref(),
        ),
    )
}

pub(crate) async fn open_voting_handler<S, P>(
    State(service): SharedService<S, P>,
    Path(case_id): Path<String>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    respond(StatusCode::OK, service.open_voting(&CaseId(case_id)))
}

pub(crate) async fn vote_handler<S, P>(
    State(service): SharedService<S, P>,
    Path(case_id): Path<String>,
    Json(body): Json<VoteBody>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.cast_vote(
            &CaseId(case_id),
            &body.physician_id,
            body.vote,
            &body.justification,
        ),
    )
}

pub(crate) async fn close_voting_handler<S, P>(
    State(service): SharedService<S, P>,
    Path(case_id): Path<String>,
    Json(body): Json<CloseVotingBody>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.close_voting(
            &CaseId(case_id),
            body.is_consensus,
            &body.dissenting_opinions,
        ),
    )
}

pub(crate) async fn more_info_handler<S, P>(
    State(service): SharedService<S, P>,
    Path(case_id): Path<String>,
    Json(body): Json<MoreInfoBody>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.request_more_info(&CaseId(case_id), &body.description),
    )
}

pub(crate) async fn resume_handler<S, P>(
    State(service): SharedService<S, P>,
    Path(case_id): Path<String>,
) -> Response
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    respond(StatusCode::OK, service.resume_deliberation(&CaseId(case_id)))
}
