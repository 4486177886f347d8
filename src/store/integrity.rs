//! Delete policies, reference checks and named traversal, driven entirely by
//! the registry.
//!
//! Every function here expects to run inside the caller's transaction: a
//! delete that fails half way must leave no partial cascade behind.

use std::collections::BTreeMap;

use diesel::prelude::*;
use diesel::sql_types::{Array, Bool, Nullable, Uuid as SqlUuid};
use diesel::PgConnection;
use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{ReferentialError, StoreError};
use crate::registry::{quote_ident, EntityId, OnDelete, SchemaRegistry};

#[derive(Debug, QueryableByName)]
struct IdRow {
    #[diesel(sql_type = SqlUuid)]
    id: Uuid,
}

#[derive(Debug, QueryableByName)]
struct NullableIdRow {
    #[diesel(sql_type = Nullable<SqlUuid>)]
    id: Option<Uuid>,
}

#[derive(Debug, QueryableByName)]
struct FoundRow {
    #[diesel(sql_type = Bool)]
    found: bool,
}

/// What a single delete touched, beyond the row itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeleteReport {
    #[schema(example = "Employee")]
    pub entity: String,
    pub id: Uuid,
    /// Rows removed per dependent entity.
    pub removed: BTreeMap<String, u64>,
    /// Foreign keys set to null, keyed `Entity.column`.
    pub nullified: BTreeMap<String, u64>,
}

impl DeleteReport {
    pub fn removed_total(&self) -> u64 {
        self.removed.values().sum()
    }
}

/// Rows reached from one row through a named relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Related {
    pub entity: EntityId,
    pub ids: Vec<Uuid>,
}

pub fn exists(
    conn: &mut PgConnection,
    registry: &SchemaRegistry,
    entity: EntityId,
    id: Uuid,
) -> Result<bool, StoreError> {
    let table = quote_ident(registry.entity(entity).table());
    let row: FoundRow = diesel::sql_query(format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE \"id\" = $1) AS found",
        table
    ))
    .bind::<SqlUuid, _>(id)
    .get_result(conn)?;
    Ok(row.found)
}

/// Checks that `dependent.foreign_key = id` would point at an existing owner row.
pub fn ensure_reference(
    conn: &mut PgConnection,
    registry: &SchemaRegistry,
    dependent: EntityId,
    foreign_key: &str,
    id: Uuid,
) -> Result<(), StoreError> {
    let relation = registry.foreign_key(dependent, foreign_key).ok_or_else(|| {
        StoreError::Internal(format!(
            "{} declares no foreign key '{}'",
            registry.entity(dependent).name(),
            foreign_key
        ))
    })?;

    if exists(conn, registry, relation.owner, id)? {
        return Ok(());
    }

    Err(ReferentialError {
        entity: registry.entity(dependent).name().to_string(),
        foreign_key: relation.foreign_key.to_string(),
        target: registry.entity(relation.owner).name().to_string(),
        id: Some(id),
    }
    .into())
}

/// Deletes one row, applying the delete policy of every relationship the
/// entity owns, transitively.
pub fn delete(
    conn: &mut PgConnection,
    registry: &SchemaRegistry,
    entity: EntityId,
    id: Uuid,
) -> Result<DeleteReport, StoreError> {
    let def = registry.entity(entity);
    let table = quote_ident(def.table());

    let locked: Vec<IdRow> =
        diesel::sql_query(format!("SELECT \"id\" FROM {} WHERE \"id\" = $1 FOR UPDATE", table))
            .bind::<SqlUuid, _>(id)
            .load(conn)?;
    if locked.is_empty() {
        return Err(StoreError::not_found(def.name(), id));
    }

    let mut report = DeleteReport {
        entity: def.name().to_string(),
        id,
        ..Default::default()
    };

    apply_policies(conn, registry, entity, &[id], &mut report)?;

    diesel::sql_query(format!("DELETE FROM {} WHERE \"id\" = $1", table))
        .bind::<SqlUuid, _>(id)
        .execute(conn)?;

    debug!(
        entity = def.name(),
        id = %id,
        removed = report.removed_total(),
        "Deleted row with dependents"
    );

    Ok(report)
}

fn apply_policies(
    conn: &mut PgConnection,
    registry: &SchemaRegistry,
    owner: EntityId,
    owner_ids: &[Uuid],
    report: &mut DeleteReport,
) -> Result<(), StoreError> {
    for relation in registry.owned_by(owner) {
        let dependent = registry.entity(relation.dependent);
        let table = quote_ident(dependent.table());
        let column = quote_ident(relation.foreign_key);

        match relation.on_delete {
            OnDelete::Nullify => {
                let count = diesel::sql_query(format!(
                    "UPDATE {table} SET {column} = NULL WHERE {column} = ANY($1)"
                ))
                .bind::<Array<SqlUuid>, _>(owner_ids)
                .execute(conn)?;

                if count > 0 {
                    *report
                        .nullified
                        .entry(format!("{}.{}", dependent.name(), relation.foreign_key))
                        .or_default() += count as u64;
                }
            }
            OnDelete::Cascade => {
                let children: Vec<Uuid> = diesel::sql_query(format!(
                    "SELECT \"id\" FROM {table} WHERE {column} = ANY($1) FOR UPDATE"
                ))
                .bind::<Array<SqlUuid>, _>(owner_ids)
                .load::<IdRow>(conn)?
                .into_iter()
                .map(|row| row.id)
                .collect();

                if children.is_empty() {
                    continue;
                }

                apply_policies(conn, registry, relation.dependent, &children, report)?;

                let count = diesel::sql_query(format!(
                    "DELETE FROM {table} WHERE \"id\" = ANY($1)"
                ))
                .bind::<Array<SqlUuid>, _>(&children)
                .execute(conn)?;

                *report
                    .removed
                    .entry(dependent.name().to_string())
                    .or_default() += count as u64;
            }
        }
    }

    Ok(())
}

/// Follows the relationship called `name` from row `id` of `entity`.
///
/// From the owner side this yields every dependent row; from the dependent
/// side it yields the owner, or nothing when an optional link is unset.
pub fn related(
    conn: &mut PgConnection,
    registry: &SchemaRegistry,
    entity: EntityId,
    id: Uuid,
    name: &str,
) -> Result<Related, StoreError> {
    let def = registry.entity(entity);
    let relation = registry.relation_named(entity, name).ok_or_else(|| {
        StoreError::Internal(format!("{} has no relationship named '{}'", def.name(), name))
    })?;

    if !exists(conn, registry, entity, id)? {
        return Err(StoreError::not_found(def.name(), id));
    }

    let column = quote_ident(relation.foreign_key);

    if relation.owner == entity && relation.owner_side == name {
        let table = quote_ident(registry.entity(relation.dependent).table());
        let ids = diesel::sql_query(format!(
            "SELECT \"id\" FROM {table} WHERE {column} = $1 ORDER BY \"id\""
        ))
        .bind::<SqlUuid, _>(id)
        .load::<IdRow>(conn)?
        .into_iter()
        .map(|row| row.id)
        .collect();

        Ok(Related {
            entity: relation.dependent,
            ids,
        })
    } else {
        let table = quote_ident(def.table());
        let owner: NullableIdRow = diesel::sql_query(format!(
            "SELECT {column} AS id FROM {table} WHERE \"id\" = $1"
        ))
        .bind::<SqlUuid, _>(id)
        .get_result(conn)?;

        Ok(Related {
            entity: relation.owner,
            ids: owner.id.into_iter().collect(),
        })
    }
}
