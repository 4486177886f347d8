//! Request and request item accessors.
//!
//! A request always carries at least one item. Creating a request and changing
//! its status each append a workflow record for the owning employee inside the
//! same transaction.

use diesel::pg::Pg;
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use super::{now, workflows, DeleteReport, Page, Store, StoreError, ValidationError};
use crate::models::{
    Account, Employee, NewRequest, NewRequestItem, NewWorkflow, Request, RequestChanges,
    RequestItem, RequestItemChanges, Workflow, WorkflowKind, WorkflowStatus,
};
use crate::registry::Entity;
use crate::schema::{accounts, employees, request_items, requests};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInput {
    pub name: String,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct RequestDetail {
    pub request: Request,
    pub items: Vec<RequestItem>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub employee_id: Option<Uuid>,
    pub approver_id: Option<Uuid>,
    pub status: Option<String>,
    pub request_type: Option<String>,
}

fn filtered(filter: &RequestFilter) -> requests::BoxedQuery<'_, Pg> {
    let mut query = requests::table.into_boxed();
    if let Some(employee_id) = filter.employee_id {
        query = query.filter(requests::employee_id.eq(employee_id));
    }
    if let Some(approver_id) = filter.approver_id {
        query = query.filter(requests::approver_id.eq(approver_id));
    }
    if let Some(status) = &filter.status {
        query = query.filter(requests::status.eq(status));
    }
    if let Some(request_type) = &filter.request_type {
        query = query.filter(requests::request_type.eq(request_type));
    }
    query
}

fn validate_items(items: &[ItemInput]) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::field("items", "must contain at least one item"));
    }

    let mut err = ValidationError::new();
    for (i, item) in items.iter().enumerate() {
        err = check_item(err, &format!("items[{}].", i), Some(&item.name), Some(item.quantity));
    }
    if err.is_empty() {
        Ok(())
    } else {
        Err(err)
    }
}

fn check_item(
    mut err: ValidationError,
    prefix: &str,
    name: Option<&str>,
    quantity: Option<i32>,
) -> ValidationError {
    if name.is_some_and(|n| n.trim().is_empty()) {
        err = err.with(format!("{}name", prefix), "must not be empty");
    }
    if quantity.is_some_and(|q| q < 1) {
        err = err.with(format!("{}quantity", prefix), "must be at least 1");
    }
    err
}

fn load(conn: &mut PgConnection, id: Uuid) -> Result<Request, StoreError> {
    requests::table
        .find(id)
        .select(Request::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found(Entity::Request.name(), id))
}

fn load_items(conn: &mut PgConnection, request_id: Uuid) -> Result<Vec<RequestItem>, StoreError> {
    Ok(request_items::table
        .filter(request_items::request_id.eq(request_id))
        .order((request_items::created_at.asc(), request_items::id.asc()))
        .select(RequestItem::as_select())
        .load(conn)?)
}

/// Inserts the request, its items and a `RequestApproval` workflow atomically.
pub fn create(
    store: &Store,
    new: NewRequest,
    items: Vec<ItemInput>,
) -> Result<(RequestDetail, Workflow), StoreError> {
    validate_items(&items)?;

    store.transaction(|conn| {
        store.ensure_reference(conn, Entity::Request, "employee_id", new.employee_id)?;
        if let Some(approver_id) = new.approver_id {
            store.ensure_reference(conn, Entity::Request, "approver_id", approver_id)?;
        }

        let request: Request = diesel::insert_into(requests::table)
            .values(&new)
            .returning(Request::as_returning())
            .get_result(conn)?;

        let rows: Vec<NewRequestItem> = items
            .iter()
            .map(|item| NewRequestItem {
                request_id: request.id,
                name: item.name.clone(),
                quantity: item.quantity,
            })
            .collect();
        diesel::insert_into(request_items::table)
            .values(&rows)
            .execute(conn)?;

        let workflow = workflows::insert(
            conn,
            NewWorkflow {
                employee_id: request.employee_id,
                workflow_type: WorkflowKind::RequestApproval.to_string(),
                details: json!({
                    "request_id": request.id,
                    "request_type": request.request_type,
                    "approver_id": request.approver_id,
                    "item_count": rows.len(),
                }),
                status: Some(WorkflowStatus::Pending.to_string()),
            },
        )?;

        let items = load_items(conn, request.id)?;
        Ok((RequestDetail { request, items }, workflow))
    })
}

pub fn find_by_id(store: &Store, id: Uuid) -> Result<RequestDetail, StoreError> {
    store.with_conn(|conn| {
        let request = load(conn, id)?;
        let items = load_items(conn, id)?;
        Ok(RequestDetail { request, items })
    })
}

pub fn find(
    store: &Store,
    filter: &RequestFilter,
    limit: i64,
    offset: i64,
) -> Result<Page<Request>, StoreError> {
    store.with_conn(|conn| {
        let total = filtered(filter).count().get_result(conn)?;
        let items = filtered(filter)
            .order(requests::created_at.desc())
            .limit(limit)
            .offset(offset)
            .select(Request::as_select())
            .load(conn)?;
        Ok(Page { items, total })
    })
}

/// Applies a patch. A status change is recorded as a `RequestStatusChange`
/// workflow in the same transaction.
pub fn update(
    store: &Store,
    id: Uuid,
    mut changes: RequestChanges,
) -> Result<RequestDetail, StoreError> {
    if changes.is_empty() {
        return Err(ValidationError::field("patch", "must change at least one field").into());
    }
    changes.updated_at = Some(now());

    store.transaction(|conn| {
        let current = load(conn, id)?;
        if let Some(Some(approver_id)) = changes.approver_id {
            store.ensure_reference(conn, Entity::Request, "approver_id", approver_id)?;
        }

        let request: Request = diesel::update(requests::table.find(id))
            .set(&changes)
            .returning(Request::as_returning())
            .get_result(conn)?;

        if request.status != current.status {
            workflows::insert(
                conn,
                NewWorkflow {
                    employee_id: request.employee_id,
                    workflow_type: WorkflowKind::RequestStatusChange.to_string(),
                    details: json!({
                        "request_id": request.id,
                        "from": current.status,
                        "to": request.status,
                        "approver_id": request.approver_id,
                    }),
                    status: Some(WorkflowStatus::Completed.to_string()),
                },
            )?;
        }

        let items = load_items(conn, id)?;
        Ok(RequestDetail { request, items })
    })
}

/// Removes the request and its items.
pub fn delete(store: &Store, id: Uuid) -> Result<DeleteReport, StoreError> {
    store.delete(Entity::Request, id)
}

pub fn items(store: &Store, id: Uuid) -> Result<Vec<RequestItem>, StoreError> {
    let related = store.related(Entity::Request, id, Entity::RequestItem.name())?;
    store.with_conn(|conn| {
        Ok(request_items::table
            .filter(request_items::id.eq_any(&related.ids))
            .order((request_items::created_at.asc(), request_items::id.asc()))
            .select(RequestItem::as_select())
            .load(conn)?)
    })
}

/// The account designated to approve the request, if any.
pub fn approver(store: &Store, id: Uuid) -> Result<Option<Account>, StoreError> {
    let related = store.related(Entity::Request, id, "Approver")?;
    let Some(account_id) = related.ids.first().copied() else {
        return Ok(None);
    };
    store.with_conn(|conn| {
        Ok(accounts::table
            .find(account_id)
            .select(Account::as_select())
            .first(conn)
            .optional()?)
    })
}

/// The employee who submitted the request.
pub fn submitter(store: &Store, id: Uuid) -> Result<Employee, StoreError> {
    let related = store.related(Entity::Request, id, Entity::Employee.name())?;
    let employee_id = related
        .ids
        .first()
        .copied()
        .ok_or_else(|| StoreError::Internal(format!("request {} has no employee", id)))?;
    store.with_conn(|conn| {
        Ok(employees::table
            .find(employee_id)
            .select(Employee::as_select())
            .first(conn)?)
    })
}

pub fn add_item(store: &Store, request_id: Uuid, item: ItemInput) -> Result<RequestItem, StoreError> {
    validate_items(std::slice::from_ref(&item))?;

    store.transaction(|conn| {
        store.ensure_reference(conn, Entity::RequestItem, "request_id", request_id)?;
        Ok(diesel::insert_into(request_items::table)
            .values(&NewRequestItem {
                request_id,
                name: item.name,
                quantity: item.quantity,
            })
            .returning(RequestItem::as_returning())
            .get_result(conn)?)
    })
}

pub fn update_item(
    store: &Store,
    request_id: Uuid,
    item_id: Uuid,
    changes: RequestItemChanges,
) -> Result<RequestItem, StoreError> {
    if changes.is_empty() {
        return Err(ValidationError::field("patch", "must change at least one field").into());
    }
    let err = check_item(
        ValidationError::new(),
        "",
        changes.name.as_deref(),
        changes.quantity,
    );
    if !err.is_empty() {
        return Err(err.into());
    }

    store.with_conn(|conn| {
        diesel::update(
            request_items::table
                .filter(request_items::id.eq(item_id))
                .filter(request_items::request_id.eq(request_id)),
        )
        .set(&changes)
        .returning(RequestItem::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found(Entity::RequestItem.name(), item_id))
    })
}

/// Removes one item. The last remaining item of a request cannot be removed.
pub fn remove_item(
    store: &Store,
    request_id: Uuid,
    item_id: Uuid,
) -> Result<DeleteReport, StoreError> {
    let registry = store.registry();
    let entity = store.entity_id(Entity::RequestItem)?;

    store.transaction(|conn| {
        // Lock the parent so concurrent removals see each other.
        requests::table
            .find(request_id)
            .select(requests::id)
            .for_update()
            .first::<Uuid>(conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found(Entity::Request.name(), request_id))?;

        let siblings: Vec<Uuid> = request_items::table
            .filter(request_items::request_id.eq(request_id))
            .select(request_items::id)
            .load(conn)?;

        if !siblings.contains(&item_id) {
            return Err(StoreError::not_found(Entity::RequestItem.name(), item_id));
        }
        if siblings.len() == 1 {
            return Err(ValidationError::field(
                "items",
                "a request must keep at least one item",
            )
            .into());
        }

        super::integrity::delete(conn, registry, entity, item_id)
    })
}
