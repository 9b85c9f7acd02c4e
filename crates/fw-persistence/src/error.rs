//! Errores de persistencia.
//! Mapea errores de Diesel / pool a variantes semánticas y, en la frontera con
//! el core, a `LaunchPadError::Integrity` (violaciones de restricciones, filas
//! corruptas) o `LaunchPadError::StoreUnavailable` (el resto).

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use fw_core::LaunchPadError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl PersistenceError {
    /// Errores transitorios: conviene reintentar con backoff.
    ///
    /// Los mensajes de desconexión/deadlock a veces llegan como `Unknown`; se
    /// detectan por texto sin acoplarse a SQLSTATE.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SerializationConflict | Self::TransientIo(_) => true,
            Self::Unknown(msg) => {
                let m = msg.to_lowercase();
                m.contains("deadlock detected")
                || m.contains("could not serialize access due to concurrent update")
                || m.contains("terminating connection due to administrator command")
                || m.contains("connection closed")
                || m.contains("connection refused")
                || m.contains("timeout")
            }
            _ => false,
        }
    }
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::CorruptRow(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::RollbackErrorOnCommit { rollback_error, commit_error } => {
                Self::Unknown(format!("rollback={rollback_error}; commit={commit_error}"))
            }
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::CorruptRow(format!("json: {err}"))
    }
}

impl From<PersistenceError> for LaunchPadError {
    fn from(err: PersistenceError) -> Self {
        match &err {
            PersistenceError::UniqueViolation(_)
            | PersistenceError::CheckViolation(_)
            | PersistenceError::ForeignKeyViolation(_)
            | PersistenceError::CorruptRow(_) => LaunchPadError::Integrity(err.to_string()),
            _ => LaunchPadError::StoreUnavailable(err.to_string()),
        }
    }
}
