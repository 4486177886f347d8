//! Workflow history accessors.

use diesel::pg::Pg;
use diesel::prelude::*;
use uuid::Uuid;

use super::{now, DeleteReport, Page, Store, StoreError, ValidationError};
use crate::models::{NewWorkflow, Workflow, WorkflowChanges};
use crate::registry::Entity;
use crate::schema::workflows;

#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    pub employee_id: Option<Uuid>,
    pub workflow_type: Option<String>,
    pub status: Option<String>,
}

fn filtered(filter: &WorkflowFilter) -> workflows::BoxedQuery<'_, Pg> {
    let mut query = workflows::table.into_boxed();
    if let Some(employee_id) = filter.employee_id {
        query = query.filter(workflows::employee_id.eq(employee_id));
    }
    if let Some(workflow_type) = &filter.workflow_type {
        query = query.filter(workflows::workflow_type.eq(workflow_type));
    }
    if let Some(status) = &filter.status {
        query = query.filter(workflows::status.eq(status));
    }
    query
}

/// Inserts on an existing connection so callers can record history inside
/// their own transaction.
pub(crate) fn insert(conn: &mut PgConnection, new: NewWorkflow) -> Result<Workflow, StoreError> {
    Ok(diesel::insert_into(workflows::table)
        .values(&new)
        .returning(Workflow::as_returning())
        .get_result(conn)?)
}

pub(crate) fn load_many(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Workflow>, StoreError> {
    Ok(workflows::table
        .filter(workflows::id.eq_any(ids))
        .order(workflows::created_at.asc())
        .select(Workflow::as_select())
        .load(conn)?)
}

pub fn create(store: &Store, new: NewWorkflow) -> Result<Workflow, StoreError> {
    store.transaction(|conn| {
        store.ensure_reference(conn, Entity::Workflow, "employee_id", new.employee_id)?;
        insert(conn, new)
    })
}

pub fn find_by_id(store: &Store, id: Uuid) -> Result<Workflow, StoreError> {
    store.with_conn(|conn| {
        workflows::table
            .find(id)
            .select(Workflow::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found(Entity::Workflow.name(), id))
    })
}

pub fn find(
    store: &Store,
    filter: &WorkflowFilter,
    limit: i64,
    offset: i64,
) -> Result<Page<Workflow>, StoreError> {
    store.with_conn(|conn| {
        let total = filtered(filter).count().get_result(conn)?;
        let items = filtered(filter)
            .order(workflows::created_at.desc())
            .limit(limit)
            .offset(offset)
            .select(Workflow::as_select())
            .load(conn)?;
        Ok(Page { items, total })
    })
}

pub fn update(store: &Store, id: Uuid, mut changes: WorkflowChanges) -> Result<Workflow, StoreError> {
    if changes.is_empty() {
        return Err(ValidationError::field("patch", "must change at least one field").into());
    }
    changes.updated_at = Some(now());

    store.with_conn(|conn| {
        diesel::update(workflows::table.find(id))
            .set(&changes)
            .returning(Workflow::as_returning())
            .get_result(conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found(Entity::Workflow.name(), id))
    })
}

pub fn delete(store: &Store, id: Uuid) -> Result<DeleteReport, StoreError> {
    store.delete(Entity::Workflow, id)
}
