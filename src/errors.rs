use fw_core::LaunchPadError;
use fw_persistence::PersistenceError;
use thiserror::Error;

/// Error de la aplicación: envuelve los errores de cada crate del workspace.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error de LaunchPad: {0}")]
    LaunchPad(#[from] LaunchPadError),
    #[error("Error de persistencia: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Escenario inconsistente: {0}")]
    Scenario(String),
}
