//! Refresh token handlers. Tokens are issued under `/accounts/{id}/refresh-tokens`.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    helpers::run_store,
    models::RefreshToken,
    pagination::{PaginationMeta, PaginationParams},
    store::{refresh_tokens, DeleteReport},
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RefreshTokenQuery {
    pub account_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshTokenListResponse {
    pub data: Vec<RefreshToken>,
    pub pagination: PaginationMeta,
}

#[utoipa::path(
    get,
    path = "/refresh-tokens",
    tag = "Refresh Tokens",
    params(PaginationParams, RefreshTokenQuery),
    responses(
        (status = 200, description = "Paginated list of refresh tokens", body = RefreshTokenListResponse)
    )
)]
pub async fn list_refresh_tokens(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<RefreshTokenQuery>,
) -> ApiResult<Json<RefreshTokenListResponse>> {
    let (limit, offset) = pagination.limit_offset();
    let account_id = query.account_id;

    let page = run_store(&state, "refresh_tokens.find", move |store| {
        refresh_tokens::find(store, account_id, limit, offset)
    })
    .await?;

    Ok(Json(RefreshTokenListResponse {
        data: page.items,
        pagination: pagination.into_metadata(page.total),
    }))
}

#[utoipa::path(
    get,
    path = "/refresh-tokens/{id}",
    tag = "Refresh Tokens",
    params(("id" = Uuid, Path, description = "Refresh token id")),
    responses(
        (status = 200, description = "Refresh token", body = RefreshToken),
        (status = 404, description = "Refresh token not found", body = ApiError)
    )
)]
pub async fn get_refresh_token(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RefreshToken>> {
    let token = run_store(&state, "refresh_tokens.find_by_id", move |store| {
        refresh_tokens::find_by_id(store, id)
    })
    .await?;
    Ok(Json(token))
}

#[utoipa::path(
    post,
    path = "/refresh-tokens/{id}/revoke",
    tag = "Refresh Tokens",
    params(("id" = Uuid, Path, description = "Refresh token id")),
    responses(
        (status = 200, description = "Token revoked", body = RefreshToken),
        (status = 404, description = "Refresh token not found", body = ApiError)
    )
)]
pub async fn revoke_refresh_token(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RefreshToken>> {
    let token = run_store(&state, "refresh_tokens.revoke", move |store| {
        refresh_tokens::revoke(store, id)
    })
    .await?;

    info!(token_id = %id, account_id = %token.account_id, "Revoked refresh token");

    Ok(Json(token))
}

#[utoipa::path(
    delete,
    path = "/refresh-tokens/{id}",
    tag = "Refresh Tokens",
    params(("id" = Uuid, Path, description = "Refresh token id")),
    responses(
        (status = 200, description = "Refresh token deleted", body = DeleteReport),
        (status = 404, description = "Refresh token not found", body = ApiError)
    )
)]
pub async fn delete_refresh_token(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteReport>> {
    let report = run_store(&state, "refresh_tokens.delete", move |store| {
        refresh_tokens::delete(store, id)
    })
    .await?;

    info!(token_id = %id, "Deleted refresh token");

    Ok(Json(report))
}
