use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("foreign key cycle involving table {0}")]
    DependencyCycle(String),

    #[error("table {table} references undeclared table {references}")]
    MissingReference { table: String, references: String },

    #[error("ddl failed: {0}")]
    Ddl(String),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("tls setup failed: {0}")]
    Tls(#[from] native_tls::Error),
}
