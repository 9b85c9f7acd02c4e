//! fireworks-rust
//!
//! Punto de entrada del workspace:
//! - `open_launchpad_from_env`: LaunchPad sobre Postgres configurada desde
//!   `.env` / variables de entorno.
//! - `scenario`: escenario de referencia usado por el binario `lpad-demo`.
//! - `errors`: error de aplicación que envuelve los de cada crate.

pub mod errors;
pub mod scenario;

use std::sync::Arc;

use fw_core::{Clock, LaunchPad, SystemClock};
use fw_persistence::pg::build_pool_from_config;
use fw_persistence::{load_launchpad_config, DbConfig, PgLaunchPadStore, PoolProvider};

pub use errors::AppError;
pub use scenario::{reference_scenario, ScenarioReport};

pub type PgLaunchPad = LaunchPad<PgLaunchPadStore<PoolProvider>>;

/// Construye una LaunchPad durable: pool migrado + configuración del motor.
pub fn open_launchpad_from_env() -> Result<PgLaunchPad, AppError> {
    open_launchpad_with_clock(Arc::new(SystemClock))
}

pub fn open_launchpad_with_clock(clock: Arc<dyn Clock>) -> Result<PgLaunchPad, AppError> {
    let db = DbConfig::from_env()?;
    let config = load_launchpad_config()?;
    let pool = build_pool_from_config(&db)?;
    Ok(LaunchPad::with_clock(PgLaunchPadStore::from_pool(pool), config, clock))
}
