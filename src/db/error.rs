use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Pool error: {0}")]
    PoolError(#[from] deadpool_postgres::PoolError),

    #[error("{}", format_pg_error(.0))]
    PostgresError(#[from] tokio_postgres::Error),

    #[error("Build error: {0}")]
    BuildError(#[from] deadpool_postgres::BuildError),

    #[error("Constraint violation on {table}: {message}")]
    ConstraintViolation { table: String, message: String },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown procedure: {0}")]
    UnknownProcedure(String),

    #[error("Procedure {procedure} failed: {message}")]
    ProcedureError { procedure: String, message: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Transaction scope {0} is already closed")]
    ScopeClosed(u64),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),
}

fn format_pg_error(e: &tokio_postgres::Error) -> String {
    if let Some(db_err) = e.as_db_error() {
        let mut msg = format!(
            "PostgreSQL error [{}]: {}",
            db_err.code().code(),
            db_err.message()
        );
        if let Some(detail) = db_err.detail() {
            msg.push_str(&format!("\n  Detail: {}", detail));
        }
        if let Some(table) = db_err.table() {
            msg.push_str(&format!("\n  Table: {}", table));
        }
        if let Some(constraint) = db_err.constraint() {
            msg.push_str(&format!("\n  Constraint: {}", constraint));
        }
        if let Some(routine) = db_err.routine() {
            msg.push_str(&format!("\n  Routine: {}", routine));
        }
        msg
    } else {
        format!("PostgreSQL error: {}", e)
    }
}
