//! Workflow history handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{ApiError, ApiResult},
    helpers::{run_store, run_store_once, validate_payload},
    models::{NewWorkflow, Workflow, WorkflowChanges, WorkflowStatus},
    pagination::{PaginationMeta, PaginationParams},
    store::{workflows, DeleteReport},
    AppState,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateWorkflowRequest {
    pub employee_id: Uuid,
    #[validate(length(min = 1, max = 64, message = "is required"))]
    #[schema(example = "Onboarding")]
    pub workflow_type: String,
    /// Free-form JSON; defaults to `{}`.
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
    pub status: Option<WorkflowStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateWorkflowRequest {
    #[validate(length(min = 1, max = 64, message = "must not be empty"))]
    pub workflow_type: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    pub status: Option<WorkflowStatus>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WorkflowQuery {
    pub employee_id: Option<Uuid>,
    pub workflow_type: Option<String>,
    pub status: Option<WorkflowStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WorkflowListResponse {
    pub data: Vec<Workflow>,
    pub pagination: PaginationMeta,
}

#[utoipa::path(
    post,
    path = "/workflows",
    tag = "Workflows",
    request_body = CreateWorkflowRequest,
    responses(
        (status = 201, description = "Workflow recorded", body = Workflow),
        (status = 400, description = "Invalid payload", body = ApiError),
        (status = 422, description = "Employee does not exist", body = ApiError)
    )
)]
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> ApiResult<(StatusCode, Json<Workflow>)> {
    validate_payload(&payload)?;

    let new = NewWorkflow {
        employee_id: payload.employee_id,
        workflow_type: payload.workflow_type.trim().to_string(),
        details: payload.details.unwrap_or_else(|| serde_json::json!({})),
        status: payload.status.map(|s| s.to_string()),
    };

    let workflow = run_store_once(&state, "workflows.create", move |store| {
        workflows::create(store, new)
    })
    .await?;

    info!(
        workflow_id = %workflow.id,
        employee_id = %workflow.employee_id,
        workflow_type = %workflow.workflow_type,
        "Recorded workflow"
    );

    Ok((StatusCode::CREATED, Json(workflow)))
}

#[utoipa::path(
    get,
    path = "/workflows",
    tag = "Workflows",
    params(PaginationParams, WorkflowQuery),
    responses(
        (status = 200, description = "Paginated list of workflows", body = WorkflowListResponse)
    )
)]
pub async fn list_workflows(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<WorkflowQuery>,
) -> ApiResult<Json<WorkflowListResponse>> {
    let filter = workflows::WorkflowFilter {
        employee_id: query.employee_id,
        workflow_type: query.workflow_type,
        status: query.status.map(|s| s.to_string()),
    };
    let (limit, offset) = pagination.limit_offset();

    let page = run_store(&state, "workflows.find", move |store| {
        workflows::find(store, &filter, limit, offset)
    })
    .await?;

    Ok(Json(WorkflowListResponse {
        data: page.items,
        pagination: pagination.into_metadata(page.total),
    }))
}

#[utoipa::path(
    get,
    path = "/workflows/{id}",
    tag = "Workflows",
    params(("id" = Uuid, Path, description = "Workflow id")),
    responses(
        (status = 200, description = "Workflow", body = Workflow),
        (status = 404, description = "Workflow not found", body = ApiError)
    )
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Workflow>> {
    let workflow = run_store(&state, "workflows.find_by_id", move |store| {
        workflows::find_by_id(store, id)
    })
    .await?;
    Ok(Json(workflow))
}

#[utoipa::path(
    put,
    path = "/workflows/{id}",
    tag = "Workflows",
    params(("id" = Uuid, Path, description = "Workflow id")),
    request_body = UpdateWorkflowRequest,
    responses(
        (status = 200, description = "Workflow updated", body = Workflow),
        (status = 400, description = "Invalid or empty patch", body = ApiError),
        (status = 404, description = "Workflow not found", body = ApiError)
    )
)]
pub async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateWorkflowRequest>,
) -> ApiResult<Json<Workflow>> {
    validate_payload(&payload)?;

    let changes = WorkflowChanges {
        workflow_type: payload.workflow_type.map(|t| t.trim().to_string()),
        details: payload.details,
        status: payload.status.map(|s| s.to_string()),
        updated_at: None,
    };

    let workflow = run_store(&state, "workflows.update", move |store| {
        workflows::update(store, id, changes.clone())
    })
    .await?;

    info!(workflow_id = %id, status = %workflow.status, "Updated workflow");

    Ok(Json(workflow))
}

#[utoipa::path(
    delete,
    path = "/workflows/{id}",
    tag = "Workflows",
    params(("id" = Uuid, Path, description = "Workflow id")),
    responses(
        (status = 200, description = "Workflow deleted", body = DeleteReport),
        (status = 404, description = "Workflow not found", body = ApiError)
    )
)]
pub async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteReport>> {
    let report = run_store(&state, "workflows.delete", move |store| {
        workflows::delete(store, id)
    })
    .await?;

    info!(workflow_id = %id, "Deleted workflow");

    Ok(Json(report))
}
