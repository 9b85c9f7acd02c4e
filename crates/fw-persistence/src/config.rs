//! Carga de configuración desde variables de entorno (con `.env` opcional).
//!
//! - Conexión: `DATABASE_URL`, `DATABASE_MIN_CONNECTIONS`,
//!   `DATABASE_MAX_CONNECTIONS`.
//! - Motor: `FW_RESERVATION_EXPIRATION_SECS`, `FW_RUN_EXPIRATION_SECS`,
//!   `FW_MAINTAIN_INTERVAL_SECS` (ausentes -> defaults de `LaunchPadConfig`).

use std::env;
use std::str::FromStr;

use dotenvy::dotenv;
use fw_core::LaunchPadConfig;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, PersistenceError> {
        init_dotenv();
        let url = env::var("DATABASE_URL").map_err(|_| PersistenceError::Config("DATABASE_URL no definido".into()))?;
        Ok(Self { url,
                  min_connections: parse_var("DATABASE_MIN_CONNECTIONS", 2)?,
                  max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 16)? })
    }
}

/// Configuración del motor desde el entorno.
pub fn load_launchpad_config() -> Result<LaunchPadConfig, PersistenceError> {
    init_dotenv();
    let defaults = LaunchPadConfig::default();
    Ok(LaunchPadConfig { reservation_expiration_secs: parse_var("FW_RESERVATION_EXPIRATION_SECS",
                                                                defaults.reservation_expiration_secs)?,
                         run_expiration_secs: parse_var("FW_RUN_EXPIRATION_SECS", defaults.run_expiration_secs)?,
                         maintain_interval_secs: parse_var("FW_MAINTAIN_INTERVAL_SECS",
                                                           defaults.maintain_interval_secs)? })
}

/// Variable ausente -> `default`; presente pero inválida -> error.
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, PersistenceError> {
    match env::var(name) {
        Ok(raw) => raw.trim()
                      .parse()
                      .map_err(|_| PersistenceError::Config(format!("{name}={raw:?} no es un valor válido"))),
        Err(_) => Ok(default),
    }
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
