//! Account handlers.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{ApiError, ApiResult},
    helpers::{hash_password, nullable, run_store, run_store_once, validate_payload},
    models::{
        Account, AccountChanges, AccountRole, Employee, NewAccount, RecordStatus, RefreshToken,
        Request,
    },
    pagination::{PaginationMeta, PaginationParams},
    store::{accounts, refresh_tokens, DeleteReport},
    AppState,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateAccountRequest {
    #[validate(email(message = "must be a valid email address"))]
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[schema(example = "correct-horse")]
    pub password: String,
    #[schema(example = "Ms")]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "is required"))]
    #[schema(example = "Alice")]
    pub first_name: String,
    #[validate(length(min = 1, message = "is required"))]
    #[schema(example = "Smith")]
    pub last_name: String,
    pub role: Option<AccountRole>,
    pub status: Option<RecordStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateAccountRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    pub password: Option<String>,
    /// `null` clears the title.
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub title: Option<Option<String>>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub last_name: Option<String>,
    pub role: Option<AccountRole>,
    pub status: Option<RecordStatus>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AccountQuery {
    /// Exact email match, case-insensitive.
    pub email: Option<String>,
    pub role: Option<AccountRole>,
    pub status: Option<RecordStatus>,
    /// Substring of first or last name.
    pub name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccountListResponse {
    pub data: Vec<Account>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccountEmployeeResponse {
    /// The employee profile bound to the account, if one exists.
    pub employee: Option<Employee>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IssuedTokenResponse {
    /// Raw token value. It is returned only once; only its hash is stored.
    #[schema(example = "9f2c0e...")]
    pub token: String,
    pub refresh_token: RefreshToken,
}

#[utoipa::path(
    post,
    path = "/accounts",
    tag = "Accounts",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = Account),
        (status = 400, description = "Invalid payload or email already registered", body = ApiError),
        (status = 503, description = "Database unavailable", body = ApiError)
    )
)]
pub async fn create_account(
    State(state): State<AppState>,
    Json(payload): Json<CreateAccountRequest>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    validate_payload(&payload)?;
    let password_hash = hash_password(&state, &payload.password)?;

    let new = NewAccount {
        email: payload.email,
        password_hash,
        title: payload.title,
        first_name: payload.first_name,
        last_name: payload.last_name,
        role: payload.role.map(|r| r.to_string()),
        status: payload.status.map(|s| s.to_string()),
    };

    let account = run_store(&state, "accounts.create", move |store| {
        accounts::create(store, new.clone())
    })
    .await?;

    info!(account_id = %account.id, role = %account.role, "Created account");

    Ok((StatusCode::CREATED, Json(account)))
}

#[utoipa::path(
    get,
    path = "/accounts",
    tag = "Accounts",
    params(PaginationParams, AccountQuery),
    responses(
        (status = 200, description = "Paginated list of accounts", body = AccountListResponse)
    )
)]
pub async fn list_accounts(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<AccountListResponse>> {
    let filter = accounts::AccountFilter {
        email: query.email,
        role: query.role.map(|r| r.to_string()),
        status: query.status.map(|s| s.to_string()),
        name: query.name,
    };
    let (limit, offset) = pagination.limit_offset();

    let page = run_store(&state, "accounts.find", move |store| {
        accounts::find(store, &filter, limit, offset)
    })
    .await?;

    Ok(Json(AccountListResponse {
        data: page.items,
        pagination: pagination.into_metadata(page.total),
    }))
}

#[utoipa::path(
    get,
    path = "/accounts/{id}",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account", body = Account),
        (status = 404, description = "Account not found", body = ApiError)
    )
)]
pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Account>> {
    let account = run_store(&state, "accounts.find_by_id", move |store| {
        accounts::find_by_id(store, id)
    })
    .await?;
    Ok(Json(account))
}

#[utoipa::path(
    put,
    path = "/accounts/{id}",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    request_body = UpdateAccountRequest,
    responses(
        (status = 200, description = "Account updated", body = Account),
        (status = 400, description = "Invalid or empty patch", body = ApiError),
        (status = 404, description = "Account not found", body = ApiError)
    )
)]
pub async fn update_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAccountRequest>,
) -> ApiResult<Json<Account>> {
    validate_payload(&payload)?;
    let password_hash = payload
        .password
        .as_deref()
        .map(|p| hash_password(&state, p))
        .transpose()?;

    let changes = AccountChanges {
        email: payload.email,
        password_hash,
        title: payload.title,
        first_name: payload.first_name,
        last_name: payload.last_name,
        role: payload.role.map(|r| r.to_string()),
        status: payload.status.map(|s| s.to_string()),
        updated_at: None,
    };

    let account = run_store(&state, "accounts.update", move |store| {
        accounts::update(store, id, changes.clone())
    })
    .await?;

    info!(account_id = %id, "Updated account");

    Ok(Json(account))
}

#[utoipa::path(
    delete,
    path = "/accounts/{id}",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account deleted with its refresh tokens and employee profile; approvals are detached", body = DeleteReport),
        (status = 404, description = "Account not found", body = ApiError)
    )
)]
pub async fn delete_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteReport>> {
    let report = run_store(&state, "accounts.delete", move |store| {
        accounts::delete(store, id)
    })
    .await?;

    info!(
        account_id = %id,
        removed = report.removed_total(),
        "Deleted account"
    );

    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/accounts/{id}/employee",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Employee profile of the account", body = AccountEmployeeResponse),
        (status = 404, description = "Account not found", body = ApiError)
    )
)]
pub async fn get_account_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AccountEmployeeResponse>> {
    let employee = run_store(&state, "accounts.employee", move |store| {
        accounts::employee(store, id)
    })
    .await?;
    Ok(Json(AccountEmployeeResponse { employee }))
}

#[utoipa::path(
    get,
    path = "/accounts/{id}/approved-requests",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Requests this account is the approver of", body = Vec<Request>),
        (status = 404, description = "Account not found", body = ApiError)
    )
)]
pub async fn list_approved_requests(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Request>>> {
    let requests = run_store(&state, "accounts.approved_requests", move |store| {
        accounts::approved_requests(store, id)
    })
    .await?;
    Ok(Json(requests))
}

#[utoipa::path(
    get,
    path = "/accounts/{id}/refresh-tokens",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Refresh tokens issued to the account", body = Vec<RefreshToken>),
        (status = 404, description = "Account not found", body = ApiError)
    )
)]
pub async fn list_account_refresh_tokens(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<RefreshToken>>> {
    let tokens = run_store(&state, "accounts.refresh_tokens", move |store| {
        accounts::refresh_tokens(store, id)
    })
    .await?;
    Ok(Json(tokens))
}

#[utoipa::path(
    post,
    path = "/accounts/{id}/refresh-tokens",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 201, description = "Token issued", body = IssuedTokenResponse),
        (status = 422, description = "Account does not exist", body = ApiError)
    )
)]
pub async fn issue_refresh_token(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    connect_info: Option<Extension<ConnectInfo<SocketAddr>>>,
) -> ApiResult<(StatusCode, Json<IssuedTokenResponse>)> {
    let ip = connect_info.map(|Extension(ConnectInfo(addr))| addr.ip().to_string());
    let ttl = state.refresh_token_ttl;

    let issued = run_store_once(&state, "refresh_tokens.issue", move |store| {
        refresh_tokens::issue(store, id, ttl, ip)
    })
    .await?;

    info!(account_id = %id, token_id = %issued.record.id, "Issued refresh token");

    Ok((
        StatusCode::CREATED,
        Json(IssuedTokenResponse {
            token: issued.token,
            refresh_token: issued.record,
        }),
    ))
}
