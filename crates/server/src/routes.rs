use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use gemba_core::domain::grant::PersonId;
use gemba_core::domain::scope::UnitScope;
use gemba_core::domain::ticket::{StatusHistoryEntry, Ticket, TicketId, WorkOrderLink};
use gemba_core::workflow::{ActionPayload, ActionType, TransitionError};
use gemba_db::repositories::{TicketRepository, WorkOrderLinkRepository};
use gemba_engine::{CreateTicketRequest, WorkflowError, WorkflowOrchestrator};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<WorkflowOrchestrator>,
    pub tickets: Arc<dyn TicketRepository>,
    pub links: Arc<dyn WorkOrderLinkRepository>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/tickets", post(create_ticket))
        .route("/api/v1/tickets/{id}", get(get_ticket))
        .route("/api/v1/tickets/{id}/actions/{action}", post(perform_action))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketBody {
    pub plant: String,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub line: Option<String>,
    #[serde(default)]
    pub machine: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Deserialize)]
pub struct ActionBody {
    pub actor: String,
    #[serde(default)]
    pub escalate_to_l3: bool,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub schedule_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub schedule_finish: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TicketDetailResponse {
    pub ticket: Ticket,
    pub history: Vec<StatusHistoryEntry>,
    pub work_order: Option<WorkOrderLink>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn reject(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { error: message.into() }))
}

async fn create_ticket(
    State(state): State<AppState>,
    Json(body): Json<CreateTicketBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.created_by.trim().is_empty() {
        return Err(reject(StatusCode::UNPROCESSABLE_ENTITY, "created_by must not be empty"));
    }

    let unit_scope = UnitScope::new(body.plant, body.area, body.line, body.machine);
    unit_scope
        .validate()
        .map_err(|error| reject(StatusCode::UNPROCESSABLE_ENTITY, error.to_string()))?;

    let request = CreateTicketRequest {
        unit_scope,
        created_by: PersonId(body.created_by),
        description: body.description,
    };

    let ticket = state.orchestrator.create_ticket(request).await.map_err(workflow_error)?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TicketDetailResponse>, ApiError> {
    let ticket_id = TicketId(id.clone());
    let ticket = state
        .tickets
        .find_by_id(&ticket_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, format!("ticket `{id}` does not exist")))?;

    let history = state.tickets.list_history(&ticket_id).await.map_err(storage_error)?;
    let work_order = state.links.find_by_ticket(&ticket_id).await.map_err(storage_error)?;

    Ok(Json(TicketDetailResponse { ticket, history, work_order }))
}

async fn perform_action(
    State(state): State<AppState>,
    Path((id, action)): Path<(String, String)>,
    Json(body): Json<ActionBody>,
) -> Result<Json<Ticket>, ApiError> {
    let action = ActionType::parse(&action).ok_or_else(|| {
        reject(StatusCode::UNPROCESSABLE_ENTITY, format!("unknown action `{action}`"))
    })?;
    if body.actor.trim().is_empty() {
        return Err(reject(StatusCode::UNPROCESSABLE_ENTITY, "actor must not be empty"));
    }

    let payload = ActionPayload {
        escalate_to_l3: body.escalate_to_l3,
        assignee: body.assignee.map(PersonId),
        schedule_start: body.schedule_start,
        schedule_finish: body.schedule_finish,
        notes: body.notes,
    };

    let ticket = state
        .orchestrator
        .perform_action(&TicketId(id), action, &PersonId(body.actor), payload)
        .await
        .map_err(workflow_error)?;

    Ok(Json(ticket))
}

fn workflow_error(error: WorkflowError) -> ApiError {
    let status = match &error {
        WorkflowError::TicketNotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::Transition(TransitionError::InvalidTransition { .. }) => {
            StatusCode::CONFLICT
        }
        WorkflowError::Transition(
            TransitionError::InsufficientApprovalLevel { .. } | TransitionError::NotAssignee { .. },
        ) => StatusCode::FORBIDDEN,
        WorkflowError::Transition(TransitionError::MissingAssignee) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WorkflowError::Persistence(inner) => {
            error!(event_name = "api.persistence_error", error = %inner, "request failed");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    };
    reject(status, error.to_string())
}

fn storage_error(error: gemba_db::repositories::RepositoryError) -> ApiError {
    error!(event_name = "api.persistence_error", error = %error, "request failed");
    reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use gemba_cmms::{InMemoryWorkOrderSystem, SyncAdapter};
    use gemba_core::domain::grant::{ApprovalGrant, ApprovalLevel, GrantId, PersonId};
    use gemba_core::domain::scope::UnitScope;
    use gemba_db::repositories::{
        GrantRepository, InMemoryContactRepository, InMemoryGrantRepository,
        InMemoryTicketNumberRepository, InMemoryTicketRepository, InMemoryWorkOrderLinkRepository,
    };
    use gemba_engine::{ApprovalRegistry, RecipientResolver, WorkflowOrchestrator};
    use gemba_notify::{NoopNotifier, NotificationDispatcher, TaskQueue};

    use super::{router, AppState};

    async fn test_router() -> Router {
        let tickets = Arc::new(InMemoryTicketRepository::default());
        let links = Arc::new(InMemoryWorkOrderLinkRepository::default());
        let grants = Arc::new(InMemoryGrantRepository::default());

        let seeds = [
            ("g1", "u-l2-kim", ApprovalLevel::L2),
            ("g2", "u-l3-lee", ApprovalLevel::L3),
            ("g3", "u-l4-choi", ApprovalLevel::L4),
        ];
        for (id, person, level) in seeds {
            grants
                .save(ApprovalGrant {
                    id: GrantId(id.to_string()),
                    person_id: PersonId(person.to_string()),
                    level,
                    scope: UnitScope::plant("DJ"),
                })
                .await
                .expect("seed grant");
        }

        let registry = Arc::new(ApprovalRegistry::new(grants));
        let resolver = Arc::new(RecipientResolver::new(
            registry.clone(),
            Arc::new(InMemoryContactRepository::default()),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(NoopNotifier),
            Duration::from_millis(0),
        ));
        let sync = Arc::new(SyncAdapter::new(
            Arc::new(InMemoryWorkOrderSystem::default()),
            links.clone(),
        ));
        let orchestrator = Arc::new(WorkflowOrchestrator::new(
            tickets.clone(),
            Arc::new(InMemoryTicketNumberRepository::default()),
            registry,
            resolver,
            dispatcher,
            sync,
            Arc::new(TaskQueue::default()),
        ));

        router(AppState { orchestrator, tickets, links })
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn create_ticket(app: &Router) -> Value {
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/tickets",
                json!({
                    "plant": "DJ",
                    "area": "DMH",
                    "description": "hydraulic leak at press 3",
                    "created_by": "u-creator-park"
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    #[tokio::test]
    async fn create_returns_created_with_an_open_ticket() {
        let app = test_router().await;
        let ticket = create_ticket(&app).await;

        assert_eq!(ticket["status"], "open");
        assert_eq!(ticket["version"], 0);
        assert!(ticket["ticket_number"].as_str().expect("number").contains('-'));
    }

    #[tokio::test]
    async fn create_rejects_blank_plant() {
        let app = test_router().await;
        let response = app
            .oneshot(post_json(
                "/api/v1/tickets",
                json!({ "plant": "  ", "created_by": "u-creator-park" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn action_endpoint_applies_a_valid_transition() {
        let app = test_router().await;
        let ticket = create_ticket(&app).await;
        let id = ticket["id"].as_str().expect("id");

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/api/v1/tickets/{id}/actions/accept"),
                json!({ "actor": "u-l2-kim" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let updated = body_json(response).await;
        assert_eq!(updated["status"], "accepted");
        assert_eq!(updated["version"], 1);
    }

    #[tokio::test]
    async fn action_endpoint_rejects_insufficient_authority() {
        let app = test_router().await;
        let ticket = create_ticket(&app).await;
        let id = ticket["id"].as_str().expect("id");

        let response = app
            .oneshot(post_json(
                &format!("/api/v1/tickets/{id}/actions/accept"),
                json!({ "actor": "u-nobody" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn replayed_action_reports_a_conflict() {
        let app = test_router().await;
        let ticket = create_ticket(&app).await;
        let id = ticket["id"].as_str().expect("id");

        let accept = post_json(
            &format!("/api/v1/tickets/{id}/actions/accept"),
            json!({ "actor": "u-l2-kim" }),
        );
        let first = app.clone().oneshot(accept).await.expect("response");
        assert_eq!(first.status(), StatusCode::OK);

        let replay = post_json(
            &format!("/api/v1/tickets/{id}/actions/accept"),
            json!({ "actor": "u-l2-kim" }),
        );
        let second = app.clone().oneshot(replay).await.expect("response");
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_action_name_is_rejected() {
        let app = test_router().await;
        let ticket = create_ticket(&app).await;
        let id = ticket["id"].as_str().expect("id");

        let response = app
            .oneshot(post_json(
                &format!("/api/v1/tickets/{id}/actions/frobnicate"),
                json!({ "actor": "u-l2-kim" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn unknown_ticket_returns_not_found() {
        let app = test_router().await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/tickets/no-such-id/actions/accept",
                json!({ "actor": "u-l2-kim" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let get = Request::builder()
            .uri("/api/v1/tickets/no-such-id")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(get).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn detail_endpoint_returns_history_after_a_transition() {
        let app = test_router().await;
        let ticket = create_ticket(&app).await;
        let id = ticket["id"].as_str().expect("id");

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/api/v1/tickets/{id}/actions/accept"),
                json!({ "actor": "u-l2-kim", "notes": "taking this one" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let get = Request::builder()
            .uri(format!("/api/v1/tickets/{id}"))
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(get).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let detail = body_json(response).await;
        assert_eq!(detail["ticket"]["status"], "accepted");
        let history = detail["history"].as_array().expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["old_status"], "open");
        assert_eq!(history[0]["new_status"], "accepted");
        assert_eq!(history[0]["notes"], "taking this one");
    }
}
