//! Account accessors.

use diesel::pg::Pg;
use diesel::prelude::*;
use uuid::Uuid;

use super::{now, DeleteReport, Page, Store, StoreError, ValidationError};
use crate::models::{Account, AccountChanges, Employee, NewAccount, RefreshToken, Request};
use crate::registry::Entity;
use crate::schema::{accounts, employees, refresh_tokens, requests};

#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub email: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    /// Case-insensitive match on first or last name.
    pub name: Option<String>,
}

fn filtered(filter: &AccountFilter) -> accounts::BoxedQuery<'_, Pg> {
    let mut query = accounts::table.into_boxed();
    if let Some(email) = &filter.email {
        query = query.filter(accounts::email.eq(email.to_lowercase()));
    }
    if let Some(role) = &filter.role {
        query = query.filter(accounts::role.eq(role));
    }
    if let Some(status) = &filter.status {
        query = query.filter(accounts::status.eq(status));
    }
    if let Some(name) = &filter.name {
        let pattern = format!("%{}%", name);
        query = query.filter(
            accounts::first_name
                .ilike(pattern.clone())
                .or(accounts::last_name.ilike(pattern)),
        );
    }
    query
}

pub fn create(store: &Store, mut new: NewAccount) -> Result<Account, StoreError> {
    new.email = new.email.trim().to_lowercase();
    store.with_conn(|conn| {
        Ok(diesel::insert_into(accounts::table)
            .values(&new)
            .returning(Account::as_returning())
            .get_result(conn)?)
    })
}

pub fn find_by_id(store: &Store, id: Uuid) -> Result<Account, StoreError> {
    store.with_conn(|conn| {
        accounts::table
            .find(id)
            .select(Account::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found(Entity::Account.name(), id))
    })
}

pub fn find(
    store: &Store,
    filter: &AccountFilter,
    limit: i64,
    offset: i64,
) -> Result<Page<Account>, StoreError> {
    store.with_conn(|conn| {
        let total = filtered(filter).count().get_result(conn)?;
        let items = filtered(filter)
            .order(accounts::created_at.desc())
            .limit(limit)
            .offset(offset)
            .select(Account::as_select())
            .load(conn)?;
        Ok(Page { items, total })
    })
}

pub fn update(store: &Store, id: Uuid, mut changes: AccountChanges) -> Result<Account, StoreError> {
    if changes.is_empty() {
        return Err(ValidationError::field("patch", "must change at least one field").into());
    }
    if let Some(email) = changes.email.as_mut() {
        *email = email.trim().to_lowercase();
    }
    changes.updated_at = Some(now());

    store.with_conn(|conn| {
        diesel::update(accounts::table.find(id))
            .set(&changes)
            .returning(Account::as_returning())
            .get_result(conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found(Entity::Account.name(), id))
    })
}

/// Removes the account with its refresh tokens and employee record, and
/// clears it as approver on any request.
pub fn delete(store: &Store, id: Uuid) -> Result<DeleteReport, StoreError> {
    store.delete(Entity::Account, id)
}

/// Requests this account is designated to approve.
pub fn approved_requests(store: &Store, id: Uuid) -> Result<Vec<Request>, StoreError> {
    let related = store.related(Entity::Account, id, "ApprovedRequests")?;
    store.with_conn(|conn| {
        Ok(requests::table
            .filter(requests::id.eq_any(&related.ids))
            .order(requests::created_at.desc())
            .select(Request::as_select())
            .load(conn)?)
    })
}

pub fn employee(store: &Store, id: Uuid) -> Result<Option<Employee>, StoreError> {
    let related = store.related(Entity::Account, id, Entity::Employee.name())?;
    let Some(employee_id) = related.ids.first().copied() else {
        return Ok(None);
    };
    store.with_conn(|conn| {
        Ok(employees::table
            .find(employee_id)
            .select(Employee::as_select())
            .first(conn)
            .optional()?)
    })
}

pub fn refresh_tokens(store: &Store, id: Uuid) -> Result<Vec<RefreshToken>, StoreError> {
    let related = store.related(Entity::Account, id, Entity::RefreshToken.name())?;
    store.with_conn(|conn| {
        Ok(refresh_tokens::table
            .filter(refresh_tokens::id.eq_any(&related.ids))
            .order(refresh_tokens::created_at.desc())
            .select(RefreshToken::as_select())
            .load(conn)?)
    })
}
