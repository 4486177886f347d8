//! Table layout derived from the registry, and its SQL rendering.

use super::{
    foreign_key_constraint_name, quote_ident, unique_constraint_name, Cardinality, FieldType,
    OnDelete, SchemaRegistry,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: FieldType,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

impl ColumnDef {
    fn primary_key() -> Self {
        Self {
            name: "id".to_string(),
            ty: FieldType::Uuid,
            nullable: false,
            default: Some("gen_random_uuid()".to_string()),
            primary_key: true,
        }
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.ty.sql_type());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueDef {
    pub constraint: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub constraint: String,
    pub column: String,
    pub references: String,
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub uniques: Vec<UniqueDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(ColumnDef::to_sql).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            columns.join(", ")
        )
    }
}

/// Every table the registry declares, with foreign-key columns appended after
/// the declared fields.
pub fn declared_tables(registry: &SchemaRegistry) -> Vec<TableDef> {
    registry
        .entities()
        .map(|(id, entity)| {
            let mut columns = vec![ColumnDef::primary_key()];
            let mut uniques = Vec::new();
            let mut foreign_keys = Vec::new();

            for field in entity.fields() {
                columns.push(ColumnDef {
                    name: field.name.to_string(),
                    ty: field.ty,
                    nullable: field.nullable,
                    default: field.default.map(str::to_string),
                    primary_key: false,
                });
                if field.unique {
                    uniques.push(UniqueDef {
                        constraint: unique_constraint_name(entity.table(), field.name),
                        column: field.name.to_string(),
                    });
                }
            }

            for relation in registry.references_of(id) {
                columns.push(ColumnDef {
                    name: relation.foreign_key.to_string(),
                    ty: FieldType::Uuid,
                    nullable: relation.is_optional(),
                    default: None,
                    primary_key: false,
                });
                if relation.cardinality == Cardinality::OneToOne {
                    uniques.push(UniqueDef {
                        constraint: unique_constraint_name(entity.table(), relation.foreign_key),
                        column: relation.foreign_key.to_string(),
                    });
                }
                foreign_keys.push(ForeignKeyDef {
                    constraint: foreign_key_constraint_name(entity.table(), relation.foreign_key),
                    column: relation.foreign_key.to_string(),
                    references: registry.entity(relation.owner).table().to_string(),
                    on_delete: relation.on_delete,
                });
            }

            TableDef {
                name: entity.table().to_string(),
                columns,
                uniques,
                foreign_keys,
            }
        })
        .collect()
}

pub fn add_column_sql(table: &str, column: &ColumnDef) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
        quote_ident(table),
        column.to_sql()
    )
}

pub fn drop_column_sql(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
        quote_ident(table),
        quote_ident(column)
    )
}

pub fn set_not_null_sql(table: &str, column: &str, not_null: bool) -> String {
    format!(
        "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL",
        quote_ident(table),
        quote_ident(column),
        if not_null { "SET" } else { "DROP" }
    )
}

pub fn add_unique_sql(table: &str, unique: &UniqueDef) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
        quote_ident(table),
        quote_ident(&unique.constraint),
        quote_ident(&unique.column)
    )
}

pub fn add_foreign_key_sql(table: &str, fk: &ForeignKeyDef) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} (\"id\") ON DELETE {}",
        quote_ident(table),
        quote_ident(&fk.constraint),
        quote_ident(&fk.column),
        quote_ident(&fk.references),
        fk.on_delete.sql()
    )
}

pub fn drop_constraint_sql(table: &str, constraint: &str) -> String {
    format!(
        "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
        quote_ident(table),
        quote_ident(constraint)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::catalog;

    fn table<'a>(tables: &'a [TableDef], name: &str) -> &'a TableDef {
        tables.iter().find(|t| t.name == name).unwrap()
    }

    #[test]
    fn test_foreign_key_columns_follow_delete_policy() {
        let registry = catalog::build().unwrap();
        let tables = declared_tables(&registry);

        let employees = table(&tables, "employees");
        assert!(!employees.column("account_id").unwrap().nullable);
        assert!(employees.column("department_id").unwrap().nullable);

        let requests = table(&tables, "requests");
        assert!(!requests.column("employee_id").unwrap().nullable);
        assert!(requests.column("approver_id").unwrap().nullable);

        for owned in ["refresh_tokens", "request_items", "workflows"] {
            let t = table(&tables, owned);
            assert!(t.foreign_keys.iter().all(|fk| fk.on_delete == OnDelete::Cascade));
            assert!(t
                .columns
                .iter()
                .filter(|c| c.name.ends_with("_id"))
                .all(|c| !c.nullable));
        }
    }

    #[test]
    fn test_one_to_one_adds_unique_constraint() {
        let registry = catalog::build().unwrap();
        let tables = declared_tables(&registry);
        let employees = table(&tables, "employees");

        assert!(employees
            .uniques
            .iter()
            .any(|u| u.constraint == "uq_employees_account_id"));
        assert!(employees
            .uniques
            .iter()
            .any(|u| u.constraint == "uq_employees_employee_code"));
    }

    #[test]
    fn test_create_sql() {
        let registry = catalog::build().unwrap();
        let tables = declared_tables(&registry);
        let sql = table(&tables, "request_items").create_sql();

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"request_items\""));
        assert!(sql.contains("\"id\" UUID PRIMARY KEY DEFAULT gen_random_uuid()"));
        assert!(sql.contains("\"quantity\" INTEGER NOT NULL DEFAULT 1"));
        assert!(sql.contains("\"request_id\" UUID NOT NULL"));
    }

    #[test]
    fn test_foreign_key_sql() {
        let fk = ForeignKeyDef {
            constraint: "fk_requests_approver_id".to_string(),
            column: "approver_id".to_string(),
            references: "accounts".to_string(),
            on_delete: OnDelete::Nullify,
        };
        assert_eq!(
            add_foreign_key_sql("requests", &fk),
            "ALTER TABLE \"requests\" ADD CONSTRAINT \"fk_requests_approver_id\" \
             FOREIGN KEY (\"approver_id\") REFERENCES \"accounts\" (\"id\") ON DELETE SET NULL"
        );
    }
}
