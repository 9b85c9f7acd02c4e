//! fw-persistence
//!
//! Backend durable (Postgres vía Diesel) de la LaunchPad, más utilidades de
//! conexión, migraciones y carga de configuración.
//!
//! Módulos:
//! - `pg`: `PgLaunchPadStore` (paridad 1:1 con `InMemoryStore`) y pool r2d2.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de `.env` / variables de entorno.
//! - `schema`: tablas Diesel.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, load_launchpad_config, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgLaunchPadStore, PgPool, PoolProvider};
