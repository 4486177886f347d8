//! Request handlers, including the items of a request.

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
    helpers::{nullable, run_store, run_store_once, validate_payload},
    models::{
        Account, Employee, NewRequest, Request, RequestChanges, RequestItem, RequestItemChanges,
        RequestStatus, Workflow,
    },
    pagination::{PaginationMeta, PaginationParams},
    store::{
        requests::{self, ItemInput, RequestDetail},
        DeleteReport,
    },
    AppState,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ItemPayload {
    #[validate(length(min = 1, max = 255, message = "is required"))]
    #[schema(example = "Laptop")]
    pub name: String,
    #[validate(range(min = 1, message = "must be at least 1"))]
    #[serde(default = "default_quantity")]
    #[schema(example = 1, minimum = 1)]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

impl From<ItemPayload> for ItemInput {
    fn from(item: ItemPayload) -> Self {
        ItemInput {
            name: item.name.trim().to_string(),
            quantity: item.quantity,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateRequestRequest {
    pub employee_id: Uuid,
    pub approver_id: Option<Uuid>,
    #[validate(length(min = 1, max = 64, message = "is required"))]
    #[schema(example = "Equipment")]
    pub request_type: String,
    #[schema(example = "New laptop for onboarding")]
    pub description: Option<String>,
    /// At least one item.
    #[serde(default)]
    pub items: Vec<ItemPayload>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateRequestRequest {
    #[validate(length(min = 1, max = 64, message = "must not be empty"))]
    pub request_type: Option<String>,
    pub status: Option<RequestStatus>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    /// `null` clears the approver.
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Uuid>)]
    pub approver_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, max = 255, message = "must not be empty"))]
    pub name: Option<String>,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub quantity: Option<i32>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RequestQuery {
    pub employee_id: Option<Uuid>,
    pub approver_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
    pub request_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestResponse {
    #[serde(flatten)]
    pub request: Request,
    pub items: Vec<RequestItem>,
}

impl From<RequestDetail> for RequestResponse {
    fn from(detail: RequestDetail) -> Self {
        Self {
            request: detail.request,
            items: detail.items,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedRequestResponse {
    #[serde(flatten)]
    pub request: RequestResponse,
    /// The approval workflow opened for the request.
    pub workflow: Workflow,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestListResponse {
    pub data: Vec<Request>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestApproverResponse {
    pub approver: Option<Account>,
}

#[utoipa::path(
    post,
    path = "/requests",
    tag = "Requests",
    request_body = CreateRequestRequest,
    responses(
        (status = 201, description = "Request created with its items and approval workflow", body = CreatedRequestResponse),
        (status = 400, description = "Invalid payload or no items", body = ApiError),
        (status = 422, description = "Employee or approver does not exist", body = ApiError)
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    Json(payload): Json<CreateRequestRequest>,
) -> ApiResult<(StatusCode, Json<CreatedRequestResponse>)> {
    validate_payload(&payload)?;

    let new = NewRequest {
        request_type: payload.request_type.trim().to_string(),
        description: payload.description,
        employee_id: payload.employee_id,
        approver_id: payload.approver_id,
    };
    let items: Vec<ItemInput> = payload.items.into_iter().map(ItemInput::from).collect();

    let (detail, workflow) = run_store_once(&state, "requests.create", move |store| {
        requests::create(store, new, items)
    })
    .await?;

    info!(
        request_id = %detail.request.id,
        employee_id = %detail.request.employee_id,
        items = detail.items.len(),
        "Created request"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreatedRequestResponse {
            request: detail.into(),
            workflow,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/requests",
    tag = "Requests",
    params(PaginationParams, RequestQuery),
    responses(
        (status = 200, description = "Paginated list of requests", body = RequestListResponse)
    )
)]
pub async fn list_requests(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<RequestQuery>,
) -> ApiResult<Json<RequestListResponse>> {
    let filter = requests::RequestFilter {
        employee_id: query.employee_id,
        approver_id: query.approver_id,
        status: query.status.map(|s| s.to_string()),
        request_type: query.request_type,
    };
    let (limit, offset) = pagination.limit_offset();

    let page = run_store(&state, "requests.find", move |store| {
        requests::find(store, &filter, limit, offset)
    })
    .await?;

    Ok(Json(RequestListResponse {
        data: page.items,
        pagination: pagination.into_metadata(page.total),
    }))
}

#[utoipa::path(
    get,
    path = "/requests/{id}",
    tag = "Requests",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request with its items", body = RequestResponse),
        (status = 404, description = "Request not found", body = ApiError)
    )
)]
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RequestResponse>> {
    let detail = run_store(&state, "requests.find_by_id", move |store| {
        requests::find_by_id(store, id)
    })
    .await?;
    Ok(Json(detail.into()))
}

#[utoipa::path(
    put,
    path = "/requests/{id}",
    tag = "Requests",
    params(("id" = Uuid, Path, description = "Request id")),
    request_body = UpdateRequestRequest,
    responses(
        (status = 200, description = "Request updated; a status change is recorded as a workflow", body = RequestResponse),
        (status = 400, description = "Invalid or empty patch", body = ApiError),
        (status = 404, description = "Request not found", body = ApiError),
        (status = 422, description = "Approver does not exist", body = ApiError)
    )
)]
pub async fn update_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRequestRequest>,
) -> ApiResult<Json<RequestResponse>> {
    validate_payload(&payload)?;

    let changes = RequestChanges {
        request_type: payload.request_type.map(|t| t.trim().to_string()),
        status: payload.status.map(|s| s.to_string()),
        description: payload.description,
        approver_id: payload.approver_id,
        updated_at: None,
    };

    let detail = run_store(&state, "requests.update", move |store| {
        requests::update(store, id, changes.clone())
    })
    .await?;

    info!(request_id = %id, status = %detail.request.status, "Updated request");

    Ok(Json(detail.into()))
}

#[utoipa::path(
    delete,
    path = "/requests/{id}",
    tag = "Requests",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request deleted with its items", body = DeleteReport),
        (status = 404, description = "Request not found", body = ApiError)
    )
)]
pub async fn delete_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteReport>> {
    let report = run_store(&state, "requests.delete", move |store| {
        requests::delete(store, id)
    })
    .await?;

    info!(request_id = %id, removed = report.removed_total(), "Deleted request");

    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/requests/{id}/approver",
    tag = "Requests",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Designated approver, if any", body = RequestApproverResponse),
        (status = 404, description = "Request not found", body = ApiError)
    )
)]
pub async fn get_request_approver(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RequestApproverResponse>> {
    let approver = run_store(&state, "requests.approver", move |store| {
        requests::approver(store, id)
    })
    .await?;
    Ok(Json(RequestApproverResponse { approver }))
}

#[utoipa::path(
    get,
    path = "/requests/{id}/employee",
    tag = "Requests",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Employee who submitted the request", body = Employee),
        (status = 404, description = "Request not found", body = ApiError)
    )
)]
pub async fn get_request_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Employee>> {
    let employee = run_store(&state, "requests.submitter", move |store| {
        requests::submitter(store, id)
    })
    .await?;
    Ok(Json(employee))
}

#[utoipa::path(
    get,
    path = "/requests/{id}/items",
    tag = "Requests",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Items of the request", body = Vec<RequestItem>),
        (status = 404, description = "Request not found", body = ApiError)
    )
)]
pub async fn list_request_items(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<RequestItem>>> {
    let items = run_store(&state, "requests.items", move |store| {
        requests::items(store, id)
    })
    .await?;
    Ok(Json(items))
}

#[utoipa::path(
    post,
    path = "/requests/{id}/items",
    tag = "Requests",
    params(("id" = Uuid, Path, description = "Request id")),
    request_body = ItemPayload,
    responses(
        (status = 201, description = "Item added", body = RequestItem),
        (status = 400, description = "Invalid item", body = ApiError),
        (status = 422, description = "Request does not exist", body = ApiError)
    )
)]
pub async fn add_request_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ItemPayload>,
) -> ApiResult<(StatusCode, Json<RequestItem>)> {
    validate_payload(&payload)?;
    let item = ItemInput::from(payload);

    let item = run_store_once(&state, "requests.add_item", move |store| {
        requests::add_item(store, id, item)
    })
    .await?;

    info!(request_id = %id, item_id = %item.id, "Added request item");

    Ok((StatusCode::CREATED, Json(item)))
}

#[utoipa::path(
    put,
    path = "/requests/{id}/items/{item_id}",
    tag = "Requests",
    params(
        ("id" = Uuid, Path, description = "Request id"),
        ("item_id" = Uuid, Path, description = "Item id")
    ),
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Item updated", body = RequestItem),
        (status = 400, description = "Invalid or empty patch", body = ApiError),
        (status = 404, description = "Item not found on this request", body = ApiError)
    )
)]
pub async fn update_request_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateItemRequest>,
) -> ApiResult<Json<RequestItem>> {
    validate_payload(&payload)?;

    let changes = RequestItemChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        quantity: payload.quantity,
    };

    let item = run_store(&state, "requests.update_item", move |store| {
        requests::update_item(store, id, item_id, changes.clone())
    })
    .await?;

    Ok(Json(item))
}

#[utoipa::path(
    delete,
    path = "/requests/{id}/items/{item_id}",
    tag = "Requests",
    params(
        ("id" = Uuid, Path, description = "Request id"),
        ("item_id" = Uuid, Path, description = "Item id")
    ),
    responses(
        (status = 200, description = "Item removed", body = DeleteReport),
        (status = 400, description = "Item is the last one on the request", body = ApiError),
        (status = 404, description = "Request or item not found", body = ApiError)
    )
)]
pub async fn remove_request_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<DeleteReport>> {
    let report = run_store(&state, "requests.remove_item", move |store| {
        requests::remove_item(store, id, item_id)
    })
    .await?;

    info!(request_id = %id, item_id = %item_id, "Removed request item");

    Ok(Json(report))
}
