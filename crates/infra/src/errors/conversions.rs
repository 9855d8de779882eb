//! Conversions from external infrastructure errors into domain errors.

use metasync_domain::MetaSyncError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub MetaSyncError);

impl From<InfraError> for MetaSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<MetaSyncError> for InfraError {
    fn from(value: MetaSyncError) -> Self {
        InfraError(value)
    }
}

trait IntoMetaSyncError {
    fn into_metasync(self) -> MetaSyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → MetaSyncError */
/* -------------------------------------------------------------------------- */

// Extended result codes for constraint failures.
const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;
const SQLITE_CONSTRAINT_FOREIGNKEY: i32 = 787;

impl IntoMetaSyncError for SqlError {
    fn into_metasync(self) -> MetaSyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        MetaSyncError::Unavailable("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        MetaSyncError::Unavailable("database is locked".into())
                    }
                    (ErrorCode::CannotOpen, _) => {
                        MetaSyncError::Unavailable(format!("unable to open database: {message}"))
                    }
                    (
                        ErrorCode::ConstraintViolation,
                        SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY,
                    ) => MetaSyncError::Conflict(format!("unique constraint violation: {message}")),
                    (ErrorCode::ConstraintViolation, SQLITE_CONSTRAINT_FOREIGNKEY) => {
                        MetaSyncError::InvalidInput("foreign key constraint violation".into())
                    }
                    _ => MetaSyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => MetaSyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                MetaSyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                MetaSyncError::Database(format!("invalid column type for `{name}`: {ty}"))
            }
            RE::InvalidPath(path) => MetaSyncError::Config(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => MetaSyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_metasync())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → MetaSyncError */
/* -------------------------------------------------------------------------- */

// r2d2 only reports checkout timeouts, so every pool error means the
// database could not be reached in time.
impl IntoMetaSyncError for r2d2::Error {
    fn into_metasync(self) -> MetaSyncError {
        MetaSyncError::Unavailable(format!("connection pool: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(value.into_metasync())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
