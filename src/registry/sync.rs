//! Reconciliation of declared tables with a live database structure.
//!
//! Planning is pure: [`plan`] diffs the registry against a [`LiveSchema`]
//! snapshot and yields the statements to run. In non-destructive mode no
//! action ever drops a table or a column.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use super::ddl::{self, ColumnDef, ForeignKeyDef, TableDef, UniqueDef};
use super::SchemaRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub destructive: bool,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("schema conflicts cannot be resolved without destructive sync: {}", .0.join("; "))]
    Conflicts(Vec<String>),

    #[error("failed to read live schema: {0}")]
    Introspection(String),

    #[error("statement failed ({sql}): {message}")]
    Statement { sql: String, message: String },

    #[error("storage unavailable during sync: {0}")]
    Connection(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveForeignKey {
    pub column: String,
    pub references: String,
    /// As reported by `information_schema.referential_constraints.delete_rule`.
    pub delete_rule: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveTable {
    pub columns: BTreeMap<String, LiveColumn>,
    pub uniques: BTreeSet<String>,
    pub foreign_keys: BTreeMap<String, LiveForeignKey>,
}

/// Snapshot of the tables, columns and constraints present in storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSchema {
    pub tables: BTreeMap<String, LiveTable>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    CreateTable(TableDef),
    AddColumn { table: String, column: ColumnDef },
    DropColumn { table: String, column: String },
    SetNotNull { table: String, column: String },
    DropNotNull { table: String, column: String },
    AddUnique { table: String, unique: UniqueDef },
    AddForeignKey { table: String, foreign_key: ForeignKeyDef },
    DropConstraint { table: String, constraint: String },
}

impl SyncAction {
    pub fn to_sql(&self) -> String {
        match self {
            SyncAction::CreateTable(table) => table.create_sql(),
            SyncAction::AddColumn { table, column } => ddl::add_column_sql(table, column),
            SyncAction::DropColumn { table, column } => ddl::drop_column_sql(table, column),
            SyncAction::SetNotNull { table, column } => ddl::set_not_null_sql(table, column, true),
            SyncAction::DropNotNull { table, column } => {
                ddl::set_not_null_sql(table, column, false)
            }
            SyncAction::AddUnique { table, unique } => ddl::add_unique_sql(table, unique),
            SyncAction::AddForeignKey { table, foreign_key } => {
                ddl::add_foreign_key_sql(table, foreign_key)
            }
            SyncAction::DropConstraint { table, constraint } => {
                ddl::drop_constraint_sql(table, constraint)
            }
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, SyncAction::DropColumn { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub actions: Vec<SyncAction>,
    /// Live columns left in place because they are not declared.
    pub retained: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

pub fn plan(
    registry: &SchemaRegistry,
    live: &LiveSchema,
    options: SyncOptions,
) -> Result<SyncPlan, SyncError> {
    let declared = ddl::declared_tables(registry);
    let mut plan = SyncPlan::default();
    let mut conflicts = Vec::new();

    for table in &declared {
        let Some(live_table) = live.tables.get(&table.name) else {
            plan.actions.push(SyncAction::CreateTable(table.clone()));
            for unique in &table.uniques {
                plan.actions.push(SyncAction::AddUnique {
                    table: table.name.clone(),
                    unique: unique.clone(),
                });
            }
            continue;
        };

        for column in &table.columns {
            match live_table.columns.get(&column.name) {
                None => plan.actions.push(SyncAction::AddColumn {
                    table: table.name.clone(),
                    column: column.clone(),
                }),
                Some(existing) if !column.ty.accepts(&existing.data_type) => {
                    if options.destructive {
                        plan.actions.push(SyncAction::DropColumn {
                            table: table.name.clone(),
                            column: column.name.clone(),
                        });
                        plan.actions.push(SyncAction::AddColumn {
                            table: table.name.clone(),
                            column: column.clone(),
                        });
                    } else {
                        conflicts.push(format!(
                            "{}.{} is {} but {} is declared",
                            table.name,
                            column.name,
                            existing.data_type,
                            column.ty.reported_name()
                        ));
                    }
                }
                Some(existing) if existing.nullable && !column.nullable => {
                    plan.actions.push(SyncAction::SetNotNull {
                        table: table.name.clone(),
                        column: column.name.clone(),
                    })
                }
                Some(existing) if !existing.nullable && column.nullable => {
                    plan.actions.push(SyncAction::DropNotNull {
                        table: table.name.clone(),
                        column: column.name.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        for name in live_table.columns.keys() {
            if table.column(name).is_some() {
                continue;
            }
            if options.destructive {
                plan.actions.push(SyncAction::DropColumn {
                    table: table.name.clone(),
                    column: name.clone(),
                });
            } else {
                plan.retained.push(format!("{}.{}", table.name, name));
            }
        }

        for unique in &table.uniques {
            if !live_table.uniques.contains(&unique.constraint) {
                plan.actions.push(SyncAction::AddUnique {
                    table: table.name.clone(),
                    unique: unique.clone(),
                });
            }
        }
    }

    // Foreign keys go last so that every referenced table exists.
    for table in &declared {
        let live_fks = live.tables.get(&table.name).map(|t| &t.foreign_keys);

        for fk in &table.foreign_keys {
            match live_fks.and_then(|fks| fks.get(&fk.constraint)) {
                None => plan.actions.push(SyncAction::AddForeignKey {
                    table: table.name.clone(),
                    foreign_key: fk.clone(),
                }),
                Some(existing) if !matches_foreign_key(existing, fk) => {
                    plan.actions.push(SyncAction::DropConstraint {
                        table: table.name.clone(),
                        constraint: fk.constraint.clone(),
                    });
                    plan.actions.push(SyncAction::AddForeignKey {
                        table: table.name.clone(),
                        foreign_key: fk.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        if options.destructive {
            if let Some(fks) = live_fks {
                for name in fks.keys() {
                    if !table.foreign_keys.iter().any(|fk| &fk.constraint == name) {
                        plan.actions.push(SyncAction::DropConstraint {
                            table: table.name.clone(),
                            constraint: name.clone(),
                        });
                    }
                }
            }
        }
    }

    if !conflicts.is_empty() {
        return Err(SyncError::Conflicts(conflicts));
    }

    debug_assert!(options.destructive || plan.actions.iter().all(|a| !a.is_destructive()));

    Ok(plan)
}

fn matches_foreign_key(live: &LiveForeignKey, declared: &ForeignKeyDef) -> bool {
    live.column == declared.column
        && live.references == declared.references
        && live.delete_rule.eq_ignore_ascii_case(declared.on_delete.sql())
}

impl LiveSchema {
    /// Mirrors a planned action onto the snapshot, as if it had been executed.
    pub fn apply(&mut self, action: &SyncAction) {
        match action {
            SyncAction::CreateTable(table) => {
                let live = self.tables.entry(table.name.clone()).or_default();
                for column in &table.columns {
                    live.columns.insert(column.name.clone(), live_column(column));
                }
            }
            SyncAction::AddColumn { table, column } => {
                self.table_mut(table)
                    .columns
                    .insert(column.name.clone(), live_column(column));
            }
            SyncAction::DropColumn { table, column } => {
                let live = self.table_mut(table);
                live.columns.remove(column);
                live.foreign_keys.retain(|_, fk| &fk.column != column);
            }
            SyncAction::SetNotNull { table, column } => {
                if let Some(c) = self.table_mut(table).columns.get_mut(column) {
                    c.nullable = false;
                }
            }
            SyncAction::DropNotNull { table, column } => {
                if let Some(c) = self.table_mut(table).columns.get_mut(column) {
                    c.nullable = true;
                }
            }
            SyncAction::AddUnique { table, unique } => {
                self.table_mut(table)
                    .uniques
                    .insert(unique.constraint.clone());
            }
            SyncAction::AddForeignKey { table, foreign_key } => {
                self.table_mut(table).foreign_keys.insert(
                    foreign_key.constraint.clone(),
                    LiveForeignKey {
                        column: foreign_key.column.clone(),
                        references: foreign_key.references.clone(),
                        delete_rule: foreign_key.on_delete.sql().to_string(),
                    },
                );
            }
            SyncAction::DropConstraint { table, constraint } => {
                let live = self.table_mut(table);
                live.uniques.remove(constraint);
                live.foreign_keys.remove(constraint);
            }
        }
    }

    fn table_mut(&mut self, table: &str) -> &mut LiveTable {
        self.tables.entry(table.to_string()).or_default()
    }
}

fn live_column(column: &ColumnDef) -> LiveColumn {
    LiveColumn {
        data_type: column.ty.reported_name().to_string(),
        nullable: column.nullable && !column.primary_key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{catalog, OnDelete};

    const SAFE: SyncOptions = SyncOptions { destructive: false };
    const DESTRUCTIVE: SyncOptions = SyncOptions { destructive: true };

    fn synchronized(registry: &SchemaRegistry) -> LiveSchema {
        let mut live = LiveSchema::default();
        for action in plan(registry, &live, SAFE).unwrap().actions {
            live.apply(&action);
        }
        live
    }

    #[test]
    fn test_empty_database_creates_everything() {
        let registry = catalog::build().unwrap();
        let plan = plan(&registry, &LiveSchema::default(), SAFE).unwrap();

        let created = plan
            .actions
            .iter()
            .filter(|a| matches!(a, SyncAction::CreateTable(_)))
            .count();
        let fks = plan
            .actions
            .iter()
            .filter(|a| matches!(a, SyncAction::AddForeignKey { .. }))
            .count();
        assert_eq!(created, 7);
        assert_eq!(fks, 7);

        let first_fk = plan
            .actions
            .iter()
            .position(|a| matches!(a, SyncAction::AddForeignKey { .. }))
            .unwrap();
        let last_create = plan
            .actions
            .iter()
            .rposition(|a| matches!(a, SyncAction::CreateTable(_)))
            .unwrap();
        assert!(last_create < first_fk);
    }

    #[test]
    fn test_second_sync_is_idempotent() {
        let registry = catalog::build().unwrap();
        let live = synchronized(&registry);

        let second = plan(&registry, &live, SAFE).unwrap();
        assert!(second.is_empty(), "unexpected actions: {:?}", second.actions);
        assert!(second.retained.is_empty());
    }

    #[test]
    fn test_missing_column_is_added() {
        let registry = catalog::build().unwrap();
        let mut live = synchronized(&registry);
        live.tables
            .get_mut("requests")
            .unwrap()
            .columns
            .remove("description");

        let plan = plan(&registry, &live, SAFE).unwrap();
        assert_eq!(plan.actions.len(), 1);
        match &plan.actions[0] {
            SyncAction::AddColumn { table, column } => {
                assert_eq!(table, "requests");
                assert_eq!(column.name, "description");
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_undeclared_columns_survive_safe_sync() {
        let registry = catalog::build().unwrap();
        let mut live = synchronized(&registry);
        live.tables.get_mut("accounts").unwrap().columns.insert(
            "legacy_token".to_string(),
            LiveColumn {
                data_type: "character varying".to_string(),
                nullable: true,
            },
        );

        let safe = plan(&registry, &live, SAFE).unwrap();
        assert!(safe.is_empty());
        assert_eq!(safe.retained, vec!["accounts.legacy_token".to_string()]);

        let destructive = plan(&registry, &live, DESTRUCTIVE).unwrap();
        assert_eq!(
            destructive.actions,
            vec![SyncAction::DropColumn {
                table: "accounts".to_string(),
                column: "legacy_token".to_string()
            }]
        );
    }

    #[test]
    fn test_type_conflict_fails_safe_sync() {
        let registry = catalog::build().unwrap();
        let mut live = synchronized(&registry);
        live.tables
            .get_mut("request_items")
            .unwrap()
            .columns
            .get_mut("quantity")
            .unwrap()
            .data_type = "character varying".to_string();

        let err = plan(&registry, &live, SAFE).unwrap_err();
        match err {
            SyncError::Conflicts(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert!(conflicts[0].contains("request_items.quantity"));
            }
            other => panic!("unexpected error {:?}", other),
        }

        let destructive = plan(&registry, &live, DESTRUCTIVE).unwrap();
        assert_eq!(destructive.actions.len(), 2);
        assert!(destructive.actions[0].is_destructive());
    }

    #[test]
    fn test_wrong_delete_rule_is_replaced() {
        let registry = catalog::build().unwrap();
        let mut live = synchronized(&registry);
        live.tables
            .get_mut("employees")
            .unwrap()
            .foreign_keys
            .get_mut("fk_employees_department_id")
            .unwrap()
            .delete_rule = "CASCADE".to_string();

        let plan = plan(&registry, &live, SAFE).unwrap();
        assert_eq!(plan.actions.len(), 2);
        assert!(matches!(&plan.actions[0], SyncAction::DropConstraint { constraint, .. }
            if constraint == "fk_employees_department_id"));
        assert!(matches!(&plan.actions[1], SyncAction::AddForeignKey { foreign_key, .. }
            if foreign_key.on_delete == OnDelete::Nullify));
        assert!(plan.actions.iter().all(|a| !a.is_destructive()));
    }

    #[test]
    fn test_nullability_drift() {
        let registry = catalog::build().unwrap();
        let mut live = synchronized(&registry);
        let employees = live.tables.get_mut("employees").unwrap();
        employees.columns.get_mut("department_id").unwrap().nullable = false;
        employees.columns.get_mut("position").unwrap().nullable = true;

        let plan = plan(&registry, &live, SAFE).unwrap();
        assert!(plan.actions.contains(&SyncAction::DropNotNull {
            table: "employees".to_string(),
            column: "department_id".to_string()
        }));
        assert!(plan.actions.contains(&SyncAction::SetNotNull {
            table: "employees".to_string(),
            column: "position".to_string()
        }));
    }

    #[test]
    fn test_unrelated_tables_are_ignored() {
        let registry = catalog::build().unwrap();
        let mut live = synchronized(&registry);
        live.tables
            .insert("__diesel_schema_migrations".to_string(), LiveTable::default());

        assert!(plan(&registry, &live, DESTRUCTIVE).unwrap().is_empty());
    }
}
