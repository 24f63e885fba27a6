//! Schema model and DDL rendering.
//!
//! The desired schema is a fixed, hand-declared list of [`Table`]s (see
//! [`crate::tables`]); the same types carry the observed state read back
//! from the database catalog. All rendering here is additive:
//! `CREATE TABLE IF NOT EXISTS`, `ADD COLUMN IF NOT EXISTS`,
//! `CREATE INDEX IF NOT EXISTS`, `ADD CONSTRAINT`.

use crate::quote_ident;

/// Column types used by the tyre-management tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// INTEGER (4 bytes)
    Integer,
    /// VARCHAR with a length bound
    VarChar(u32),
    /// TEXT
    Text,
    /// NUMERIC with fixed precision and scale
    Decimal { precision: u8, scale: u8 },
    /// BOOLEAN
    Boolean,
    /// A fixed set of string literals, stored as TEXT with a CHECK
    Enum(&'static [&'static str]),
    /// DATE
    Date,
    /// TIMESTAMPTZ
    Timestamp,
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::VarChar(len) => write!(f, "VARCHAR({})", len),
            SqlType::Text => write!(f, "TEXT"),
            SqlType::Decimal { precision, scale } => write!(f, "NUMERIC({}, {})", precision, scale),
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::Enum(_) => write!(f, "TEXT"),
            SqlType::Date => write!(f, "DATE"),
            SqlType::Timestamp => write!(f, "TIMESTAMPTZ"),
        }
    }
}

/// A database column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// SQL type
    pub sql_type: SqlType,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Default value expression (if any)
    pub default: Option<String>,
    /// Whether this is a primary key
    pub primary_key: bool,
    /// Whether this has a unique constraint
    pub unique: bool,
    /// Whether the value is generated by the database (identity column)
    pub identity: bool,
}

impl Column {
    /// A nullable column with no default. Refine with the builder methods.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            default: None,
            primary_key: false,
            unique: false,
            identity: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Primary key columns are implicitly NOT NULL.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn default_expr(mut self, expr: &str) -> Self {
        self.default = Some(expr.to_string());
        self
    }

    /// Render the column definition as it appears inside CREATE TABLE or
    /// ADD COLUMN.
    pub fn to_sql_def(&self) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), self.sql_type);

        if self.identity {
            def.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        }

        if self.primary_key {
            def.push_str(" PRIMARY KEY");
        }

        if !self.nullable && !self.primary_key {
            def.push_str(" NOT NULL");
        }

        if self.unique && !self.primary_key {
            def.push_str(" UNIQUE");
        }

        if let Some(default) = &self.default {
            def.push_str(&format!(" DEFAULT {}", default));
        }

        // Enumerated columns carry their literal set as a CHECK so bad
        // status strings are rejected by the engine, not just the app.
        if let SqlType::Enum(variants) = self.sql_type {
            let list: Vec<String> = variants.iter().map(|v| format!("'{}'", v)).collect();
            def.push_str(&format!(
                " CHECK ({} IN ({}))",
                quote_ident(&self.name),
                list.join(", ")
            ));
        }

        def
    }
}

/// The referential action taken when a referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    NoAction,
    Cascade,
    Restrict,
}

/// A single-column foreign key constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    /// Column in this table
    pub column: String,
    /// Referenced table
    pub references_table: String,
    /// Referenced column
    pub references_column: String,
    /// Delete rule
    pub on_delete: OnDelete,
}

/// A database index.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    /// Index name
    pub name: String,
    /// Column(s) in the index, in order
    pub columns: Vec<String>,
    /// Whether this is a unique index
    pub unique: bool,
}

/// A database table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Columns, in declared order
    pub columns: Vec<Column>,
    /// Foreign keys
    pub foreign_keys: Vec<ForeignKey>,
    /// Indices
    pub indices: Vec<Index>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = columns;
        self
    }

    /// Declare a non-unique index. The name is derived from the table and
    /// column names; the planner matches indices by column list, never by
    /// name, so the derived name only has to be unique per schema.
    pub fn index(mut self, columns: &[&str]) -> Self {
        let name = format!("idx_{}_{}", self.name, columns.join("_"));
        self.indices.push(Index {
            name,
            columns: columns.iter().map(|s| s.to_string()).collect(),
            unique: false,
        });
        self
    }

    pub fn foreign_key(
        mut self,
        column: &str,
        references_table: &str,
        references_column: &str,
        on_delete: OnDelete,
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.to_string(),
            references_table: references_table.to_string(),
            references_column: references_column.to_string(),
            on_delete,
        });
        self
    }

    /// Generate the CREATE TABLE statement.
    ///
    /// Does not include foreign keys or indices; those are applied as
    /// separate units of work so table creation order stays simple.
    pub fn to_create_table_sql(&self) -> String {
        let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", quote_ident(&self.name));

        let col_defs: Vec<String> = self
            .columns
            .iter()
            .map(|col| format!("    {}", col.to_sql_def()))
            .collect();

        sql.push_str(&col_defs.join(",\n"));
        sql.push_str("\n);");

        sql
    }
}

/// Generate the ADD COLUMN statement for a missing column.
pub fn add_column_sql(table: &str, column: &Column) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {};",
        quote_ident(table),
        column.to_sql_def()
    )
}

/// Generate the CREATE INDEX statement for a missing index.
pub fn create_index_sql(table: &str, index: &Index) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    let cols: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({});",
        unique,
        quote_ident(&index.name),
        quote_ident(table),
        cols.join(", ")
    )
}

/// Generate the ADD CONSTRAINT statement for a missing foreign key.
pub fn add_foreign_key_sql(table: &str, fk: &ForeignKey) -> String {
    let constraint_name = format!("{}_{}_fkey", table, fk.column);
    let mut sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        quote_ident(table),
        quote_ident(&constraint_name),
        quote_ident(&fk.column),
        quote_ident(&fk.references_table),
        quote_ident(&fk.references_column)
    );
    match fk.on_delete {
        OnDelete::Cascade => sql.push_str(" ON DELETE CASCADE"),
        OnDelete::Restrict => sql.push_str(" ON DELETE RESTRICT"),
        OnDelete::NoAction => {}
    }
    sql.push(';');
    sql
}

/// A complete database schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Tables, in an order that already respects foreign-key dependencies
    pub tables: Vec<Table>,
}

impl Schema {
    /// Generate SQL to create all tables, foreign keys, and indices.
    ///
    /// Tables come first (without foreign keys, to avoid dependency
    /// issues), then foreign keys, then indices.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();

        for table in &self.tables {
            sql.push_str(&table.to_create_table_sql());
            sql.push_str("\n\n");
        }

        for table in &self.tables {
            for fk in &table.foreign_keys {
                sql.push_str(&add_foreign_key_sql(&table.name, fk));
                sql.push('\n');
            }
        }

        if self.tables.iter().any(|t| !t.foreign_keys.is_empty()) {
            sql.push('\n');
        }

        for table in &self.tables {
            for idx in &table.indices {
                sql.push_str(&create_index_sql(&table.name, idx));
                sql.push('\n');
            }
        }

        sql.trim_end().to_string()
    }
}
