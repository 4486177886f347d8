//! Employee accessors.

use diesel::pg::Pg;
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use super::{now, workflows, DeleteReport, Page, Store, StoreError, ValidationError};
use crate::models::{
    Account, Department, Employee, EmployeeChanges, NewEmployee, NewWorkflow, Request, Workflow,
    WorkflowKind, WorkflowStatus,
};
use crate::registry::Entity;
use crate::schema::{accounts, departments, employees, requests};

#[derive(Debug, Clone, Default)]
pub struct EmployeeFilter {
    pub department_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
    pub status: Option<String>,
    pub position: Option<String>,
}

fn filtered(filter: &EmployeeFilter) -> employees::BoxedQuery<'_, Pg> {
    let mut query = employees::table.into_boxed();
    if let Some(department_id) = filter.department_id {
        query = query.filter(employees::department_id.eq(department_id));
    }
    if let Some(account_id) = filter.account_id {
        query = query.filter(employees::account_id.eq(account_id));
    }
    if let Some(status) = &filter.status {
        query = query.filter(employees::status.eq(status));
    }
    if let Some(position) = &filter.position {
        query = query.filter(employees::position.ilike(format!("%{}%", position)));
    }
    query
}

pub fn create(store: &Store, new: NewEmployee) -> Result<Employee, StoreError> {
    store.transaction(|conn| {
        store.ensure_reference(conn, Entity::Employee, "account_id", new.account_id)?;
        if let Some(department_id) = new.department_id {
            store.ensure_reference(conn, Entity::Employee, "department_id", department_id)?;
        }

        Ok(diesel::insert_into(employees::table)
            .values(&new)
            .returning(Employee::as_returning())
            .get_result(conn)?)
    })
}

pub fn find_by_id(store: &Store, id: Uuid) -> Result<Employee, StoreError> {
    store.with_conn(|conn| load(conn, id))
}

fn load(conn: &mut PgConnection, id: Uuid) -> Result<Employee, StoreError> {
    employees::table
        .find(id)
        .select(Employee::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found(Entity::Employee.name(), id))
}

pub fn find(
    store: &Store,
    filter: &EmployeeFilter,
    limit: i64,
    offset: i64,
) -> Result<Page<Employee>, StoreError> {
    store.with_conn(|conn| {
        let total = filtered(filter).count().get_result(conn)?;
        let items = filtered(filter)
            .order(employees::created_at.desc())
            .limit(limit)
            .offset(offset)
            .select(Employee::as_select())
            .load(conn)?;
        Ok(Page { items, total })
    })
}

pub fn update(store: &Store, id: Uuid, mut changes: EmployeeChanges) -> Result<Employee, StoreError> {
    if changes.is_empty() {
        return Err(ValidationError::field("patch", "must change at least one field").into());
    }
    changes.updated_at = Some(now());

    store.transaction(|conn| {
        if let Some(Some(department_id)) = changes.department_id {
            store.ensure_reference(conn, Entity::Employee, "department_id", department_id)?;
        }

        diesel::update(employees::table.find(id))
            .set(&changes)
            .returning(Employee::as_returning())
            .get_result(conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found(Entity::Employee.name(), id))
    })
}

/// Moves the employee to another department (or none) and records the move
/// as a `DepartmentTransfer` workflow in the same transaction.
pub fn transfer(
    store: &Store,
    id: Uuid,
    department_id: Option<Uuid>,
    reason: Option<String>,
) -> Result<(Employee, Workflow), StoreError> {
    store.transaction(|conn| {
        let current = load(conn, id)?;
        if let Some(department_id) = department_id {
            store.ensure_reference(conn, Entity::Employee, "department_id", department_id)?;
        }
        if current.department_id == department_id {
            return Err(ValidationError::field(
                "department_id",
                "employee is already in this department",
            )
            .into());
        }

        let employee = diesel::update(employees::table.find(id))
            .set((
                employees::department_id.eq(department_id),
                employees::updated_at.eq(now()),
            ))
            .returning(Employee::as_returning())
            .get_result(conn)?;

        let workflow = workflows::insert(
            conn,
            NewWorkflow {
                employee_id: id,
                workflow_type: WorkflowKind::DepartmentTransfer.to_string(),
                details: json!({
                    "from_department_id": current.department_id,
                    "to_department_id": department_id,
                    "reason": reason,
                }),
                status: Some(WorkflowStatus::Completed.to_string()),
            },
        )?;

        Ok((employee, workflow))
    })
}

/// Removes the employee with its requests, their items and its workflows.
/// The account and department are untouched.
pub fn delete(store: &Store, id: Uuid) -> Result<DeleteReport, StoreError> {
    store.delete(Entity::Employee, id)
}

pub fn requests(store: &Store, id: Uuid) -> Result<Vec<Request>, StoreError> {
    let related = store.related(Entity::Employee, id, Entity::Request.name())?;
    store.with_conn(|conn| {
        Ok(requests::table
            .filter(requests::id.eq_any(&related.ids))
            .order(requests::created_at.desc())
            .select(Request::as_select())
            .load(conn)?)
    })
}

pub fn workflows(store: &Store, id: Uuid) -> Result<Vec<Workflow>, StoreError> {
    let related = store.related(Entity::Employee, id, Entity::Workflow.name())?;
    store.with_conn(|conn| workflows::load_many(conn, &related.ids))
}

pub fn account(store: &Store, id: Uuid) -> Result<Account, StoreError> {
    let related = store.related(Entity::Employee, id, Entity::Account.name())?;
    let account_id = related.ids.first().copied().ok_or_else(|| {
        StoreError::Internal(format!("employee {} has no account", id))
    })?;
    store.with_conn(|conn| {
        Ok(accounts::table
            .find(account_id)
            .select(Account::as_select())
            .first(conn)?)
    })
}

pub fn department(store: &Store, id: Uuid) -> Result<Option<Department>, StoreError> {
    let related = store.related(Entity::Employee, id, Entity::Department.name())?;
    let Some(department_id) = related.ids.first().copied() else {
        return Ok(None);
    };
    store.with_conn(|conn| {
        Ok(departments::table
            .find(department_id)
            .select(Department::as_select())
            .first(conn)
            .optional()?)
    })
}
