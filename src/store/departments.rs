//! Department accessors.

use std::collections::HashMap;

use diesel::dsl::count_star;
use diesel::prelude::*;
use uuid::Uuid;

use super::{now, DeleteReport, Page, Store, StoreError, ValidationError};
use crate::models::{Department, DepartmentChanges, Employee, NewDepartment};
use crate::registry::Entity;
use crate::schema::{departments, employees};

#[derive(Debug, Clone)]
pub struct DepartmentSummary {
    pub department: Department,
    pub employee_count: i64,
}

pub fn create(store: &Store, new: NewDepartment) -> Result<Department, StoreError> {
    store.with_conn(|conn| {
        Ok(diesel::insert_into(departments::table)
            .values(&new)
            .returning(Department::as_returning())
            .get_result(conn)?)
    })
}

pub fn find_by_id(store: &Store, id: Uuid) -> Result<Department, StoreError> {
    store.with_conn(|conn| {
        departments::table
            .find(id)
            .select(Department::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found(Entity::Department.name(), id))
    })
}

/// Lists departments by name, each with the number of employees it holds.
pub fn find(
    store: &Store,
    name: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Page<DepartmentSummary>, StoreError> {
    let pattern = name.map(|n| format!("%{}%", n));

    store.with_conn(|conn| {
        let mut count_query = departments::table.into_boxed();
        let mut page_query = departments::table.into_boxed();
        if let Some(pattern) = &pattern {
            count_query = count_query.filter(departments::name.ilike(pattern.clone()));
            page_query = page_query.filter(departments::name.ilike(pattern.clone()));
        }

        let total = count_query.count().get_result(conn)?;
        let page: Vec<Department> = page_query
            .order(departments::name.asc())
            .limit(limit)
            .offset(offset)
            .select(Department::as_select())
            .load(conn)?;

        let ids: Vec<Uuid> = page.iter().map(|d| d.id).collect();
        let counts: HashMap<Uuid, i64> = employees::table
            .filter(employees::department_id.eq_any(&ids))
            .group_by(employees::department_id)
            .select((employees::department_id, count_star()))
            .load::<(Option<Uuid>, i64)>(conn)?
            .into_iter()
            .filter_map(|(id, count)| id.map(|id| (id, count)))
            .collect();

        let items = page
            .into_iter()
            .map(|department| DepartmentSummary {
                employee_count: counts.get(&department.id).copied().unwrap_or(0),
                department,
            })
            .collect();

        Ok(Page { items, total })
    })
}

pub fn update(
    store: &Store,
    id: Uuid,
    mut changes: DepartmentChanges,
) -> Result<Department, StoreError> {
    if changes.is_empty() {
        return Err(ValidationError::field("patch", "must change at least one field").into());
    }
    changes.updated_at = Some(now());

    store.with_conn(|conn| {
        diesel::update(departments::table.find(id))
            .set(&changes)
            .returning(Department::as_returning())
            .get_result(conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found(Entity::Department.name(), id))
    })
}

/// Removes the department; its employees stay, detached.
pub fn delete(store: &Store, id: Uuid) -> Result<DeleteReport, StoreError> {
    store.delete(Entity::Department, id)
}

pub fn employees(store: &Store, id: Uuid) -> Result<Vec<Employee>, StoreError> {
    let related = store.related(Entity::Department, id, Entity::Employee.name())?;
    store.with_conn(|conn| {
        Ok(employees::table
            .filter(employees::id.eq_any(&related.ids))
            .order(employees::employee_code.asc())
            .select(Employee::as_select())
            .load(conn)?)
    })
}
