//! Refresh token accessors. Only the SHA-256 hash of a token is stored.

use chrono::Duration;
use diesel::pg::Pg;
use diesel::prelude::*;
use uuid::Uuid;

use super::{now, DeleteReport, Page, Store, StoreError};
use crate::credentials;
use crate::models::{NewRefreshToken, RefreshToken};
use crate::registry::Entity;
use crate::schema::refresh_tokens;

/// A freshly issued token. `token` is the only copy of the raw value.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub record: RefreshToken,
    pub token: String,
}

pub fn issue(
    store: &Store,
    account_id: Uuid,
    ttl: Duration,
    created_by_ip: Option<String>,
) -> Result<IssuedToken, StoreError> {
    let token = credentials::generate_refresh_token();
    let new = NewRefreshToken {
        account_id,
        token_hash: credentials::hash_token(&token),
        expires_at: now() + ttl,
        created_by_ip,
    };

    let record = store.transaction(|conn| {
        store.ensure_reference(conn, Entity::RefreshToken, "account_id", account_id)?;
        Ok(diesel::insert_into(refresh_tokens::table)
            .values(&new)
            .returning(RefreshToken::as_returning())
            .get_result(conn)?)
    })?;

    Ok(IssuedToken { record, token })
}

pub fn find_by_id(store: &Store, id: Uuid) -> Result<RefreshToken, StoreError> {
    store.with_conn(|conn| {
        refresh_tokens::table
            .find(id)
            .select(RefreshToken::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found(Entity::RefreshToken.name(), id))
    })
}

fn owned_by(account_id: Option<Uuid>) -> refresh_tokens::BoxedQuery<'static, Pg> {
    let mut query = refresh_tokens::table.into_boxed();
    if let Some(account_id) = account_id {
        query = query.filter(refresh_tokens::account_id.eq(account_id));
    }
    query
}

pub fn find(
    store: &Store,
    account_id: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> Result<Page<RefreshToken>, StoreError> {
    store.with_conn(|conn| {
        let total = owned_by(account_id).count().get_result(conn)?;
        let items = owned_by(account_id)
            .order(refresh_tokens::created_at.desc())
            .limit(limit)
            .offset(offset)
            .select(RefreshToken::as_select())
            .load(conn)?;
        Ok(Page { items, total })
    })
}

pub fn revoke(store: &Store, id: Uuid) -> Result<RefreshToken, StoreError> {
    store.with_conn(|conn| {
        diesel::update(refresh_tokens::table.find(id))
            .set(refresh_tokens::revoked_at.eq(Some(now())))
            .returning(RefreshToken::as_returning())
            .get_result(conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found(Entity::RefreshToken.name(), id))
    })
}

pub fn delete(store: &Store, id: Uuid) -> Result<DeleteReport, StoreError> {
    store.delete(Entity::RefreshToken, id)
}
