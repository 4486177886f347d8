//! Reads the live table structure from `information_schema`.

use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::PgConnection;

use crate::registry::sync::{LiveColumn, LiveForeignKey, LiveSchema};

#[derive(Debug, QueryableByName)]
struct ColumnRow {
    #[diesel(sql_type = Text)]
    table_name: String,
    #[diesel(sql_type = Text)]
    column_name: String,
    #[diesel(sql_type = Text)]
    data_type: String,
    #[diesel(sql_type = Text)]
    is_nullable: String,
}

#[derive(Debug, QueryableByName)]
struct UniqueRow {
    #[diesel(sql_type = Text)]
    table_name: String,
    #[diesel(sql_type = Text)]
    constraint_name: String,
}

#[derive(Debug, QueryableByName)]
struct ForeignKeyRow {
    #[diesel(sql_type = Text)]
    table_name: String,
    #[diesel(sql_type = Text)]
    constraint_name: String,
    #[diesel(sql_type = Text)]
    column_name: String,
    #[diesel(sql_type = Text)]
    referenced_table: String,
    #[diesel(sql_type = Text)]
    delete_rule: String,
}

const COLUMNS_SQL: &str = "\
    SELECT c.table_name::text AS table_name, c.column_name::text AS column_name, \
           c.data_type::text AS data_type, c.is_nullable::text AS is_nullable \
    FROM information_schema.columns c \
    JOIN information_schema.tables t \
      ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
    WHERE c.table_schema = current_schema() AND t.table_type = 'BASE TABLE' \
    ORDER BY c.table_name, c.ordinal_position";

const UNIQUES_SQL: &str = "\
    SELECT tc.table_name::text AS table_name, tc.constraint_name::text AS constraint_name \
    FROM information_schema.table_constraints tc \
    WHERE tc.table_schema = current_schema() AND tc.constraint_type = 'UNIQUE'";

const FOREIGN_KEYS_SQL: &str = "\
    SELECT tc.table_name::text AS table_name, tc.constraint_name::text AS constraint_name, \
           kcu.column_name::text AS column_name, ccu.table_name::text AS referenced_table, \
           rc.delete_rule::text AS delete_rule \
    FROM information_schema.table_constraints tc \
    JOIN information_schema.key_column_usage kcu \
      ON kcu.constraint_schema = tc.constraint_schema AND kcu.constraint_name = tc.constraint_name \
    JOIN information_schema.referential_constraints rc \
      ON rc.constraint_schema = tc.constraint_schema AND rc.constraint_name = tc.constraint_name \
    JOIN information_schema.constraint_column_usage ccu \
      ON ccu.constraint_schema = tc.constraint_schema AND ccu.constraint_name = tc.constraint_name \
    WHERE tc.table_schema = current_schema() AND tc.constraint_type = 'FOREIGN KEY'";

pub fn live_schema(conn: &mut PgConnection) -> QueryResult<LiveSchema> {
    let mut live = LiveSchema::default();

    for row in diesel::sql_query(COLUMNS_SQL).load::<ColumnRow>(conn)? {
        live.tables.entry(row.table_name).or_default().columns.insert(
            row.column_name,
            LiveColumn {
                data_type: row.data_type,
                nullable: row.is_nullable.eq_ignore_ascii_case("YES"),
            },
        );
    }

    for row in diesel::sql_query(UNIQUES_SQL).load::<UniqueRow>(conn)? {
        if let Some(table) = live.tables.get_mut(&row.table_name) {
            table.uniques.insert(row.constraint_name);
        }
    }

    for row in diesel::sql_query(FOREIGN_KEYS_SQL).load::<ForeignKeyRow>(conn)? {
        if let Some(table) = live.tables.get_mut(&row.table_name) {
            table.foreign_keys.insert(
                row.constraint_name,
                LiveForeignKey {
                    column: row.column_name,
                    references: row.referenced_table,
                    delete_rule: row.delete_rule,
                },
            );
        }
    }

    Ok(live)
}
