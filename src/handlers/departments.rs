//! Department handlers.

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
    helpers::{nullable, run_store, validate_payload},
    models::{Department, DepartmentChanges, Employee, NewDepartment},
    pagination::{PaginationMeta, PaginationParams},
    store::{departments, DeleteReport},
    AppState,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateDepartmentRequest {
    #[validate(length(min = 1, max = 255, message = "is required"))]
    #[schema(example = "Engineering")]
    pub name: String,
    #[schema(example = "Builds and runs the product")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateDepartmentRequest {
    #[validate(length(min = 1, max = 255, message = "must not be empty"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DepartmentQuery {
    /// Substring of the department name.
    pub name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DepartmentWithCount {
    #[serde(flatten)]
    pub department: Department,
    #[schema(example = 12)]
    pub employee_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DepartmentListResponse {
    pub data: Vec<DepartmentWithCount>,
    pub pagination: PaginationMeta,
}

#[utoipa::path(
    post,
    path = "/departments",
    tag = "Departments",
    request_body = CreateDepartmentRequest,
    responses(
        (status = 201, description = "Department created", body = Department),
        (status = 400, description = "Invalid payload or name already taken", body = ApiError)
    )
)]
pub async fn create_department(
    State(state): State<AppState>,
    Json(payload): Json<CreateDepartmentRequest>,
) -> ApiResult<(StatusCode, Json<Department>)> {
    validate_payload(&payload)?;

    let new = NewDepartment {
        name: payload.name.trim().to_string(),
        description: payload.description,
    };

    let department = run_store(&state, "departments.create", move |store| {
        departments::create(store, new.clone())
    })
    .await?;

    info!(department_id = %department.id, name = %department.name, "Created department");

    Ok((StatusCode::CREATED, Json(department)))
}

#[utoipa::path(
    get,
    path = "/departments",
    tag = "Departments",
    params(PaginationParams, DepartmentQuery),
    responses(
        (status = 200, description = "Departments with employee counts", body = DepartmentListResponse)
    )
)]
pub async fn list_departments(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<DepartmentQuery>,
) -> ApiResult<Json<DepartmentListResponse>> {
    let (limit, offset) = pagination.limit_offset();
    let name = query.name;

    let page = run_store(&state, "departments.find", move |store| {
        departments::find(store, name.as_deref(), limit, offset)
    })
    .await?;

    let data = page
        .items
        .into_iter()
        .map(|summary| DepartmentWithCount {
            department: summary.department,
            employee_count: summary.employee_count,
        })
        .collect();

    Ok(Json(DepartmentListResponse {
        data,
        pagination: pagination.into_metadata(page.total),
    }))
}

#[utoipa::path(
    get,
    path = "/departments/{id}",
    tag = "Departments",
    params(("id" = Uuid, Path, description = "Department id")),
    responses(
        (status = 200, description = "Department", body = Department),
        (status = 404, description = "Department not found", body = ApiError)
    )
)]
pub async fn get_department(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Department>> {
    let department = run_store(&state, "departments.find_by_id", move |store| {
        departments::find_by_id(store, id)
    })
    .await?;
    Ok(Json(department))
}

#[utoipa::path(
    put,
    path = "/departments/{id}",
    tag = "Departments",
    params(("id" = Uuid, Path, description = "Department id")),
    request_body = UpdateDepartmentRequest,
    responses(
        (status = 200, description = "Department updated", body = Department),
        (status = 400, description = "Invalid or empty patch", body = ApiError),
        (status = 404, description = "Department not found", body = ApiError)
    )
)]
pub async fn update_department(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDepartmentRequest>,
) -> ApiResult<Json<Department>> {
    validate_payload(&payload)?;

    let changes = DepartmentChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        description: payload.description,
        updated_at: None,
    };

    let department = run_store(&state, "departments.update", move |store| {
        departments::update(store, id, changes.clone())
    })
    .await?;

    info!(department_id = %id, "Updated department");

    Ok(Json(department))
}

#[utoipa::path(
    delete,
    path = "/departments/{id}",
    tag = "Departments",
    params(("id" = Uuid, Path, description = "Department id")),
    responses(
        (status = 200, description = "Department deleted; its employees are kept without a department", body = DeleteReport),
        (status = 404, description = "Department not found", body = ApiError)
    )
)]
pub async fn delete_department(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteReport>> {
    let report = run_store(&state, "departments.delete", move |store| {
        departments::delete(store, id)
    })
    .await?;

    info!(
        department_id = %id,
        detached = report.nullified.values().sum::<u64>(),
        "Deleted department"
    );

    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/departments/{id}/employees",
    tag = "Departments",
    params(("id" = Uuid, Path, description = "Department id")),
    responses(
        (status = 200, description = "Employees in the department", body = Vec<Employee>),
        (status = 404, description = "Department not found", body = ApiError)
    )
)]
pub async fn list_department_employees(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Employee>>> {
    let employees = run_store(&state, "departments.employees", move |store| {
        departments::employees(store, id)
    })
    .await?;
    Ok(Json(employees))
}
