//! Catalog inspection - read the live schema back from the database.
//!
//! Queries `information_schema` and `pg_indexes` to rebuild [`Table`]
//! values from whatever the database currently holds. Inspection is
//! read-only and parametrized throughout; identifiers only ever come from
//! the static declarations in [`crate::tables`].

use std::collections::BTreeSet;
use std::future::Future;

use tokio_postgres::Client;

use crate::schema::{Column, ForeignKey, Index, OnDelete, SqlType, Table};
use crate::{Error, Result};

/// Read access to the database catalog.
///
/// A table that does not exist is `Ok(None)`, never an error; errors mean
/// the catalog itself could not be read (connection lost, bad credentials).
/// Implemented for [`tokio_postgres::Client`] and, in tests, for an
/// in-memory fake.
pub trait Inspect: Send + Sync {
    /// All base tables under the given schema. An empty database yields an
    /// empty set.
    fn list_tables(&self, schema: &str) -> impl Future<Output = Result<BTreeSet<String>>> + Send;

    /// Columns, foreign keys, and indices of one table, or `None` if the
    /// table does not exist.
    fn describe_table(
        &self,
        schema: &str,
        table: &str,
    ) -> impl Future<Output = Result<Option<Table>>> + Send;
}

impl Inspect for Client {
    async fn list_tables(&self, schema: &str) -> Result<BTreeSet<String>> {
        let rows = self
            .query(
                r#"
                SELECT table_name::text
                FROM information_schema.tables
                WHERE table_schema = $1
                  AND table_type = 'BASE TABLE'
                ORDER BY table_name
                "#,
                &[&schema],
            )
            .await
            .map_err(catalog_err)?;

        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn describe_table(&self, schema: &str, table: &str) -> Result<Option<Table>> {
        let exists = self
            .query_opt(
                "SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2",
                &[&schema, &table],
            )
            .await
            .map_err(catalog_err)?;
        if exists.is_none() {
            return Ok(None);
        }

        let mut columns = introspect_columns(self, schema, table).await?;
        let primary_keys = introspect_primary_keys(self, schema, table).await?;
        let foreign_keys = introspect_foreign_keys(self, schema, table).await?;
        let indices = introspect_indices(self, schema, table).await?;

        for col in &mut columns {
            col.primary_key = primary_keys.contains(&col.name);
        }

        Ok(Some(Table {
            name: table.to_string(),
            columns,
            foreign_keys,
            indices,
        }))
    }
}

fn catalog_err(e: tokio_postgres::Error) -> Error {
    Error::CatalogUnavailable(e.to_string())
}

async fn introspect_columns(client: &Client, schema: &str, table: &str) -> Result<Vec<Column>> {
    // The information_schema views type their columns with domains
    // (sql_identifier, cardinal_number, ...); cast everything to plain
    // types so the driver can decode the rows.
    let rows = client
        .query(
            r#"
            SELECT
                column_name::text,
                data_type::text,
                udt_name::text,
                character_maximum_length::int,
                numeric_precision::int,
                numeric_scale::int,
                is_nullable::text,
                column_default::text,
                is_identity::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
            &[&schema, &table],
        )
        .await
        .map_err(catalog_err)?;

    let mut columns = Vec::new();
    for row in rows {
        let name: String = row.get(0);
        let data_type: String = row.get(1);
        let udt_name: String = row.get(2);
        let char_len: Option<i32> = row.get(3);
        let precision: Option<i32> = row.get(4);
        let scale: Option<i32> = row.get(5);
        let is_nullable: String = row.get(6);
        let column_default: Option<String> = row.get(7);
        let is_identity: String = row.get(8);

        let sql_type = sql_type_from_info_schema(&data_type, &udt_name, char_len, precision, scale);
        let default = column_default.map(|d| clean_default_value(&d));
        let identity =
            is_identity == "YES" || default.as_deref().is_some_and(|d| d.contains("nextval("));

        columns.push(Column {
            name,
            sql_type,
            nullable: is_nullable == "YES",
            default,
            primary_key: false, // set by the caller
            unique: false,      // shows up as a constraint index instead
            identity,
        });
    }

    Ok(columns)
}

async fn introspect_primary_keys(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Vec<String>> {
    let rows = client
        .query(
            r#"
            SELECT kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.constraint_type = 'PRIMARY KEY'
                AND tc.table_schema = $1
                AND tc.table_name = $2
            ORDER BY kcu.ordinal_position
            "#,
            &[&schema, &table],
        )
        .await
        .map_err(catalog_err)?;

    Ok(rows.iter().map(|r| r.get(0)).collect())
}

async fn introspect_foreign_keys(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKey>> {
    let rows = client
        .query(
            r#"
            SELECT
                kcu.column_name::text,
                ccu.table_name::text AS foreign_table,
                ccu.column_name::text AS foreign_column,
                rc.delete_rule::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON tc.constraint_name = ccu.constraint_name
                AND tc.table_schema = ccu.table_schema
            JOIN information_schema.referential_constraints rc
                ON tc.constraint_name = rc.constraint_name
                AND tc.table_schema = rc.constraint_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
                AND tc.table_schema = $1
                AND tc.table_name = $2
            ORDER BY tc.constraint_name
            "#,
            &[&schema, &table],
        )
        .await
        .map_err(catalog_err)?;

    Ok(rows
        .iter()
        .map(|row| {
            let delete_rule: String = row.get(3);
            ForeignKey {
                column: row.get(0),
                references_table: row.get(1),
                references_column: row.get(2),
                on_delete: on_delete_from_rule(&delete_rule),
            }
        })
        .collect())
}

async fn introspect_indices(client: &Client, schema: &str, table: &str) -> Result<Vec<Index>> {
    // Skip constraint-backed indexes (primary keys, UNIQUE constraints);
    // those are reconciled through the column definitions, not as indices.
    let rows = client
        .query(
            r#"
            SELECT
                i.indexname::text,
                i.indexdef::text
            FROM pg_indexes i
            WHERE i.schemaname = $1
              AND i.tablename = $2
              AND NOT EXISTS (
                  SELECT 1 FROM information_schema.table_constraints tc
                  WHERE tc.constraint_name = i.indexname
                    AND tc.table_schema = $1
              )
            "#,
            &[&schema, &table],
        )
        .await
        .map_err(catalog_err)?;

    let mut indices = Vec::new();
    for row in rows {
        let name: String = row.get(0);
        let indexdef: String = row.get(1);

        let unique = indexdef.to_uppercase().contains("UNIQUE INDEX");
        let columns = parse_index_columns(&indexdef);

        indices.push(Index {
            name,
            columns,
            unique,
        });
    }

    Ok(indices)
}

/// Parse column names from an index definition.
///
/// Example: `CREATE INDEX "idx_requests_userId" ON public.requests USING btree ("userId")`
fn parse_index_columns(indexdef: &str) -> Vec<String> {
    let (Some(start), Some(end)) = (indexdef.rfind('('), indexdef.rfind(')')) else {
        return Vec::new();
    };
    indexdef[start + 1..end]
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect()
}

fn on_delete_from_rule(rule: &str) -> OnDelete {
    match rule {
        "CASCADE" => OnDelete::Cascade,
        "RESTRICT" => OnDelete::Restrict,
        _ => OnDelete::NoAction,
    }
}

/// Map information_schema type descriptions back to [`SqlType`].
fn sql_type_from_info_schema(
    data_type: &str,
    udt_name: &str,
    char_len: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
) -> SqlType {
    match data_type.to_uppercase().as_str() {
        "SMALLINT" | "INTEGER" | "BIGINT" => SqlType::Integer,
        "CHARACTER VARYING" | "VARCHAR" | "CHARACTER" | "CHAR" => match char_len {
            Some(len) if len > 0 => SqlType::VarChar(len as u32),
            _ => SqlType::Text,
        },
        "TEXT" => SqlType::Text,
        "NUMERIC" | "DECIMAL" => SqlType::Decimal {
            precision: precision.unwrap_or(0) as u8,
            scale: scale.unwrap_or(0) as u8,
        },
        "BOOLEAN" => SqlType::Boolean,
        "DATE" => SqlType::Date,
        "TIMESTAMP WITH TIME ZONE" | "TIMESTAMP WITHOUT TIME ZONE" | "TIMESTAMP" => {
            SqlType::Timestamp
        }
        _ => match udt_name {
            "int2" | "int4" | "int8" => SqlType::Integer,
            "numeric" => SqlType::Decimal {
                precision: precision.unwrap_or(0) as u8,
                scale: scale.unwrap_or(0) as u8,
            },
            "bool" => SqlType::Boolean,
            "date" => SqlType::Date,
            "timestamptz" | "timestamp" => SqlType::Timestamp,
            _ => SqlType::Text,
        },
    }
}

/// Clean up a default value from information_schema.
///
/// Defaults come back with type casts like `'pending'::text` or
/// `0::integer`; strip those so the stored expression reads like the
/// declared one.
fn clean_default_value(default: &str) -> String {
    let s = default.trim();

    if let Some(idx) = s.find("::") {
        return s[..idx].to_string();
    }

    s.to_string()
}
