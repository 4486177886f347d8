//! Employee handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{ApiError, ApiResult},
    helpers::{nullable, run_store, run_store_once, validate_payload},
    models::{
        Account, Department, Employee, EmployeeChanges, NewEmployee, RecordStatus, Request,
        Workflow,
    },
    pagination::{PaginationMeta, PaginationParams},
    store::{employees, DeleteReport},
    AppState,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateEmployeeRequest {
    #[validate(length(min = 1, max = 64, message = "is required"))]
    #[schema(example = "EMP-0001")]
    pub employee_code: String,
    pub account_id: Uuid,
    pub department_id: Option<Uuid>,
    #[validate(length(min = 1, message = "is required"))]
    #[schema(example = "Backend Engineer")]
    pub position: String,
    /// Defaults to now.
    pub hire_date: Option<NaiveDateTime>,
    pub status: Option<RecordStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateEmployeeRequest {
    #[validate(length(min = 1, max = 64, message = "must not be empty"))]
    pub employee_code: Option<String>,
    /// `null` removes the employee from their department.
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Uuid>)]
    pub department_id: Option<Option<Uuid>>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub position: Option<String>,
    pub hire_date: Option<NaiveDateTime>,
    pub status: Option<RecordStatus>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransferRequest {
    /// Target department; `null` leaves the employee without one.
    pub department_id: Option<Uuid>,
    #[schema(example = "Team reorganisation")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransferResponse {
    pub employee: Employee,
    pub workflow: Workflow,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    pub department_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
    pub status: Option<RecordStatus>,
    /// Substring of the position title.
    pub position: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<Employee>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmployeeDepartmentResponse {
    pub department: Option<Department>,
}

#[utoipa::path(
    post,
    path = "/employees",
    tag = "Employees",
    request_body = CreateEmployeeRequest,
    responses(
        (status = 201, description = "Employee created", body = Employee),
        (status = 400, description = "Invalid payload, duplicate code or account already has an employee", body = ApiError),
        (status = 422, description = "Account or department does not exist", body = ApiError)
    )
)]
pub async fn create_employee(
    State(state): State<AppState>,
    Json(payload): Json<CreateEmployeeRequest>,
) -> ApiResult<(StatusCode, Json<Employee>)> {
    validate_payload(&payload)?;

    let new = NewEmployee {
        employee_code: payload.employee_code.trim().to_string(),
        position: payload.position,
        hire_date: payload
            .hire_date
            .unwrap_or_else(|| chrono::Utc::now().naive_utc()),
        status: payload.status.map(|s| s.to_string()),
        account_id: payload.account_id,
        department_id: payload.department_id,
    };

    let employee = run_store(&state, "employees.create", move |store| {
        employees::create(store, new.clone())
    })
    .await?;

    info!(
        employee_id = %employee.id,
        account_id = %employee.account_id,
        "Created employee"
    );

    Ok((StatusCode::CREATED, Json(employee)))
}

#[utoipa::path(
    get,
    path = "/employees",
    tag = "Employees",
    params(PaginationParams, EmployeeQuery),
    responses(
        (status = 200, description = "Paginated list of employees", body = EmployeeListResponse)
    )
)]
pub async fn list_employees(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<EmployeeQuery>,
) -> ApiResult<Json<EmployeeListResponse>> {
    let filter = employees::EmployeeFilter {
        department_id: query.department_id,
        account_id: query.account_id,
        status: query.status.map(|s| s.to_string()),
        position: query.position,
    };
    let (limit, offset) = pagination.limit_offset();

    let page = run_store(&state, "employees.find", move |store| {
        employees::find(store, &filter, limit, offset)
    })
    .await?;

    Ok(Json(EmployeeListResponse {
        data: page.items,
        pagination: pagination.into_metadata(page.total),
    }))
}

#[utoipa::path(
    get,
    path = "/employees/{id}",
    tag = "Employees",
    params(("id" = Uuid, Path, description = "Employee id")),
    responses(
        (status = 200, description = "Employee", body = Employee),
        (status = 404, description = "Employee not found", body = ApiError)
    )
)]
pub async fn get_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Employee>> {
    let employee = run_store(&state, "employees.find_by_id", move |store| {
        employees::find_by_id(store, id)
    })
    .await?;
    Ok(Json(employee))
}

#[utoipa::path(
    put,
    path = "/employees/{id}",
    tag = "Employees",
    params(("id" = Uuid, Path, description = "Employee id")),
    request_body = UpdateEmployeeRequest,
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 400, description = "Invalid or empty patch", body = ApiError),
        (status = 404, description = "Employee not found", body = ApiError),
        (status = 422, description = "Department does not exist", body = ApiError)
    )
)]
pub async fn update_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateEmployeeRequest>,
) -> ApiResult<Json<Employee>> {
    validate_payload(&payload)?;

    let changes = EmployeeChanges {
        employee_code: payload.employee_code.map(|c| c.trim().to_string()),
        position: payload.position,
        hire_date: payload.hire_date,
        status: payload.status.map(|s| s.to_string()),
        department_id: payload.department_id,
        updated_at: None,
    };

    let employee = run_store(&state, "employees.update", move |store| {
        employees::update(store, id, changes.clone())
    })
    .await?;

    info!(employee_id = %id, "Updated employee");

    Ok(Json(employee))
}

#[utoipa::path(
    post,
    path = "/employees/{id}/transfer",
    tag = "Employees",
    params(("id" = Uuid, Path, description = "Employee id")),
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Employee moved and transfer recorded", body = TransferResponse),
        (status = 400, description = "Employee is already in that department", body = ApiError),
        (status = 404, description = "Employee not found", body = ApiError),
        (status = 422, description = "Department does not exist", body = ApiError)
    )
)]
pub async fn transfer_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransferRequest>,
) -> ApiResult<Json<TransferResponse>> {
    let (employee, workflow) = run_store_once(&state, "employees.transfer", move |store| {
        employees::transfer(store, id, payload.department_id, payload.reason)
    })
    .await?;

    info!(
        employee_id = %id,
        department_id = ?employee.department_id,
        workflow_id = %workflow.id,
        "Transferred employee"
    );

    Ok(Json(TransferResponse { employee, workflow }))
}

#[utoipa::path(
    delete,
    path = "/employees/{id}",
    tag = "Employees",
    params(("id" = Uuid, Path, description = "Employee id")),
    responses(
        (status = 200, description = "Employee deleted with their requests and workflows", body = DeleteReport),
        (status = 404, description = "Employee not found", body = ApiError)
    )
)]
pub async fn delete_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteReport>> {
    let report = run_store(&state, "employees.delete", move |store| {
        employees::delete(store, id)
    })
    .await?;

    info!(employee_id = %id, removed = report.removed_total(), "Deleted employee");

    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/employees/{id}/account",
    tag = "Employees",
    params(("id" = Uuid, Path, description = "Employee id")),
    responses(
        (status = 200, description = "Account the employee belongs to", body = Account),
        (status = 404, description = "Employee not found", body = ApiError)
    )
)]
pub async fn get_employee_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Account>> {
    let account = run_store(&state, "employees.account", move |store| {
        employees::account(store, id)
    })
    .await?;
    Ok(Json(account))
}

#[utoipa::path(
    get,
    path = "/employees/{id}/department",
    tag = "Employees",
    params(("id" = Uuid, Path, description = "Employee id")),
    responses(
        (status = 200, description = "Department of the employee, if any", body = EmployeeDepartmentResponse),
        (status = 404, description = "Employee not found", body = ApiError)
    )
)]
pub async fn get_employee_department(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EmployeeDepartmentResponse>> {
    let department = run_store(&state, "employees.department", move |store| {
        employees::department(store, id)
    })
    .await?;
    Ok(Json(EmployeeDepartmentResponse { department }))
}

#[utoipa::path(
    get,
    path = "/employees/{id}/requests",
    tag = "Employees",
    params(("id" = Uuid, Path, description = "Employee id")),
    responses(
        (status = 200, description = "Requests submitted by the employee", body = Vec<Request>),
        (status = 404, description = "Employee not found", body = ApiError)
    )
)]
pub async fn list_employee_requests(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Request>>> {
    let requests = run_store(&state, "employees.requests", move |store| {
        employees::requests(store, id)
    })
    .await?;
    Ok(Json(requests))
}

#[utoipa::path(
    get,
    path = "/employees/{id}/workflows",
    tag = "Employees",
    params(("id" = Uuid, Path, description = "Employee id")),
    responses(
        (status = 200, description = "Workflow history of the employee, oldest first", body = Vec<Workflow>),
        (status = 404, description = "Employee not found", body = ApiError)
    )
)]
pub async fn list_employee_workflows(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Workflow>>> {
    let workflows = run_store(&state, "employees.workflows", move |store| {
        employees::workflows(store, id)
    })
    .await?;
    Ok(Json(workflows))
}
