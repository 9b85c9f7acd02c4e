//! Backend Postgres (Diesel + r2d2) de `LaunchPadStore`.
//!
//! Paridad con `InMemoryStore`:
//! - La lógica de precondición/actualización es la del core
//!   (`Precondition::holds`, `FireworkUpdate::apply_to`); aquí sólo se aporta
//!   la atomicidad.
//! - `update_if` es optimista: lee la fila, evalúa la precondición y escribe
//!   con `UPDATE ... WHERE revision = $leida`. Si otra escritura ganó, la
//!   transacción no toca nada más y se reintenta desde la lectura.
//! - El cambio de launch viaja en la misma transacción que el job.
//! - `snapshot` usa una transacción REPEATABLE READ de sólo lectura.
//! - Errores transitorios (pool, serialización, desconexión) se reintentan
//!   con backoff corto (`with_retry`).

mod rows;

pub use rows::{FireworkRow, LaunchRow, WorkflowRow};

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use fw_core::constants::MAX_CAS_ATTEMPTS;
use fw_core::{Firework, FireworkUpdate, FwId, FwState, IdAllocator, IdKind, Launch, LaunchChange, LaunchId,
              LaunchPadError, LaunchPadResult, LaunchPadStore, LaunchState, Precondition, RecordKind, StoreSnapshot,
              WfId, Workflow};
use log::{debug, info, warn};

use crate::config::DbConfig;
use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{fireworks, fw_id_counters, launches, workflows};

/// Pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real o uno de test sin acoplar el store a r2d2.
/// Debe devolver una conexión válida o `PersistenceError::TransientIo`.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError>;
}

/// `ConnectionProvider` respaldado por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Retry simple con backoff lineal muy pequeño (hasta 3 reintentos: 15ms,
/// 30ms, 45ms). Sólo repite la unidad de trabajo de `f`.
pub(crate) fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if e.is_retryable() && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms",
                      attempts + 1,
                      e,
                      delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Resultado de una ronda de compare-and-set dentro de una transacción.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CasOutcome {
    Applied,
    Rejected,
    /// Otra escritura cambió `revision` entre la lectura y el UPDATE.
    Conflict,
    MissingFirework,
    MissingLaunch(LaunchId),
}

/// Implementación Postgres de `LaunchPadStore`.
pub struct PgLaunchPadStore<P: ConnectionProvider> {
    provider: P,
}

impl PgLaunchPadStore<PoolProvider> {
    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(PoolProvider { pool })
    }
}

impl<P: ConnectionProvider> PgLaunchPadStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Ejecuta `f` en una transacción read-write, con reintentos.
    fn write_tx<T, F>(&self, mut f: F) -> Result<T, PersistenceError>
        where F: FnMut(&mut PgConnection) -> Result<T, PersistenceError>
    {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction().read_write().run(|tx| f(tx))
        })
    }

    /// Lectura simple fuera de transacción explícita, con reintentos.
    fn read<T, F>(&self, mut f: F) -> Result<T, PersistenceError>
        where F: FnMut(&mut PgConnection) -> Result<T, PersistenceError>
    {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            f(&mut conn)
        })
    }
}

fn load_fireworks(conn: &mut PgConnection, state: Option<FwState>) -> Result<Vec<Firework>, PersistenceError> {
    let rows = match state {
        Some(state) => fireworks::table.filter(fireworks::state.eq(state.as_str()))
                                       .order(fireworks::fw_id.asc())
                                       .load::<FireworkRow>(conn)?,
        None => fireworks::table.order(fireworks::fw_id.asc()).load::<FireworkRow>(conn)?,
    };
    rows.into_iter().map(FireworkRow::into_model).collect()
}

fn try_update(tx: &mut PgConnection,
              fw_id: FwId,
              precondition: Precondition,
              update: &FireworkUpdate)
              -> Result<CasOutcome, PersistenceError> {
    let Some(row) = fireworks::table.find(fw_id).first::<FireworkRow>(tx).optional()? else {
        return Ok(CasOutcome::MissingFirework);
    };
    let mut fw = row.into_model()?;
    if !precondition.holds(&fw) {
        return Ok(CasOutcome::Rejected);
    }

    // Validar referencias a launches antes de escribir.
    let mut target: Option<Launch> = None;
    if let Some(change @ (LaunchChange::Transition { .. } | LaunchChange::Heartbeat { .. })) = &update.launch {
        match launches::table.find(change.launch_id()).first::<LaunchRow>(tx).optional()? {
            Some(row) => target = Some(row.into_model()?),
            None => return Ok(CasOutcome::MissingLaunch(change.launch_id())),
        }
    }
    if !update.supersede.is_empty() {
        let present: Vec<LaunchId> = launches::table.select(launches::launch_id)
                                                    .filter(launches::launch_id.eq_any(update.supersede.clone()))
                                                    .load(tx)?;
        if let Some(missing) = update.supersede.iter().find(|id| !present.contains(id)) {
            return Ok(CasOutcome::MissingLaunch(*missing));
        }
    }

    let read_revision = fw.revision;
    update.apply_to(&mut fw);
    let written = diesel::update(fireworks::table.filter(fireworks::fw_id.eq(fw_id))
                                                 .filter(fireworks::revision.eq(read_revision)))
                  .set(&FireworkRow::from(&fw))
                  .execute(tx)?;
    if written == 0 {
        return Ok(CasOutcome::Conflict);
    }

    match (&update.launch, target) {
        (Some(LaunchChange::Insert(launch)), _) => {
            diesel::insert_into(launches::table).values(&LaunchRow::from_model(launch)?)
                                                .execute(tx)?;
        }
        (Some(change), Some(mut launch)) => {
            change.apply_to(&mut launch);
            diesel::update(launches::table.find(launch.launch_id)).set(&LaunchRow::from_model(&launch)?)
                                                                  .execute(tx)?;
        }
        _ => {}
    }
    if !update.supersede.is_empty() {
        diesel::update(launches::table.filter(launches::launch_id.eq_any(update.supersede.clone())))
            .set(launches::superseded.eq(true))
            .execute(tx)?;
    }
    Ok(CasOutcome::Applied)
}

impl<P: ConnectionProvider> IdAllocator for PgLaunchPadStore<P> {
    /// Un único `INSERT ... ON CONFLICT DO UPDATE ... RETURNING`: atómico entre
    /// procesos y sin huecos de lectura-escritura.
    fn next_id(&self, kind: IdKind) -> LaunchPadResult<i64> {
        let key = kind.as_str();
        let id = self.read(|conn| {
                         diesel::insert_into(fw_id_counters::table)
                             .values((fw_id_counters::kind.eq(key), fw_id_counters::value.eq(1_i64)))
                             .on_conflict(fw_id_counters::kind)
                             .do_update()
                             .set(fw_id_counters::value.eq(fw_id_counters::value + 1_i64))
                             .returning(fw_id_counters::value)
                             .get_result::<i64>(conn)
                             .map_err(PersistenceError::from)
                     })?;
        Ok(id)
    }
}

impl<P: ConnectionProvider> LaunchPadStore for PgLaunchPadStore<P> {
    fn insert_workflow(&self, workflow: &Workflow, jobs: &[Firework]) -> LaunchPadResult<()> {
        let wf_row = WorkflowRow::from_model(workflow)?;
        let fw_rows: Vec<FireworkRow> = jobs.iter().map(FireworkRow::from).collect();
        let inserted = self.write_tx(|tx| {
                               diesel::insert_into(workflows::table).values(&wf_row).execute(tx)?;
                               diesel::insert_into(fireworks::table).values(&fw_rows).execute(tx)?;
                               Ok(())
                           });
        match inserted {
            Ok(()) => {
                debug!("insert_workflow:done wf_id={} fireworks={}", workflow.wf_id, fw_rows.len());
                Ok(())
            }
            Err(PersistenceError::UniqueViolation(msg)) => {
                Err(LaunchPadError::InvalidWorkflow(format!("id already exists: {msg}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn firework(&self, fw_id: FwId) -> LaunchPadResult<Option<Firework>> {
        let row = self.read(|conn| Ok(fireworks::table.find(fw_id).first::<FireworkRow>(conn).optional()?))?;
        Ok(row.map(FireworkRow::into_model).transpose()?)
    }

    fn workflow(&self, wf_id: WfId) -> LaunchPadResult<Option<Workflow>> {
        let row = self.read(|conn| Ok(workflows::table.find(wf_id).first::<WorkflowRow>(conn).optional()?))?;
        Ok(row.map(WorkflowRow::into_model).transpose()?)
    }

    fn launch(&self, launch_id: LaunchId) -> LaunchPadResult<Option<Launch>> {
        let row = self.read(|conn| Ok(launches::table.find(launch_id).first::<LaunchRow>(conn).optional()?))?;
        Ok(row.map(LaunchRow::into_model).transpose()?)
    }

    fn update_if(&self, fw_id: FwId, precondition: Precondition, update: &FireworkUpdate) -> LaunchPadResult<bool> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            match self.write_tx(|tx| try_update(tx, fw_id, precondition, update))? {
                CasOutcome::Applied => return Ok(true),
                CasOutcome::Rejected => return Ok(false),
                CasOutcome::MissingFirework => return Err(LaunchPadError::not_found(RecordKind::Firework, fw_id)),
                CasOutcome::MissingLaunch(id) => return Err(LaunchPadError::not_found(RecordKind::Launch, id)),
                CasOutcome::Conflict => debug!("update_if:revision-mismatch fw_id={fw_id} attempt={attempt}"),
            }
        }
        Err(LaunchPadError::ContentionExceeded { fw_id,
                                                 attempts: MAX_CAS_ATTEMPTS })
    }

    fn fireworks_in_state(&self, state: FwState) -> LaunchPadResult<Vec<Firework>> {
        Ok(self.read(|conn| load_fireworks(conn, Some(state)))?)
    }

    fn launches_in_state(&self, state: LaunchState) -> LaunchPadResult<Vec<Launch>> {
        let rows = self.read(|conn| {
                           Ok(launches::table.filter(launches::state.eq(state.as_str()))
                                             .order(launches::launch_id.asc())
                                             .load::<LaunchRow>(conn)?)
                       })?;
        Ok(rows.into_iter().map(LaunchRow::into_model).collect::<Result<Vec<_>, _>>()?)
    }

    fn launches_of(&self, fw_id: FwId) -> LaunchPadResult<Vec<Launch>> {
        let rows = self.read(|conn| {
                           Ok(launches::table.filter(launches::fw_id.eq(fw_id))
                                             .order(launches::launch_id.asc())
                                             .load::<LaunchRow>(conn)?)
                       })?;
        Ok(rows.into_iter().map(LaunchRow::into_model).collect::<Result<Vec<_>, _>>()?)
    }

    fn snapshot(&self) -> LaunchPadResult<StoreSnapshot> {
        let snapshot = with_retry(|| {
                           let mut conn = self.provider.connection()?;
                           conn.build_transaction().repeatable_read().read_only().run(|tx| {
                               let wf_rows = workflows::table.order(workflows::wf_id.asc()).load::<WorkflowRow>(tx)?;
                               let wfs = wf_rows.into_iter()
                                                .map(WorkflowRow::into_model)
                                                .collect::<Result<Vec<_>, _>>()?;
                               let jobs = load_fireworks(tx, None)?;
                               Ok::<_, PersistenceError>(StoreSnapshot { workflows: wfs,
                                                                         fireworks: jobs })
                           })
                       })?;
        Ok(snapshot)
    }

    fn reset(&self) -> LaunchPadResult<()> {
        self.write_tx(|tx| {
                diesel::delete(launches::table).execute(tx)?;
                diesel::delete(fireworks::table).execute(tx)?;
                diesel::delete(workflows::table).execute(tx)?;
                diesel::delete(fw_id_counters::table).execute(tx)?;
                Ok(())
            })?;
        info!("reset: all launchpad tables cleared");
        Ok(())
    }

    fn tuneup(&self) -> LaunchPadResult<()> {
        self.read(|conn| {
                conn.batch_execute("REINDEX TABLE fireworks; REINDEX TABLE launches; REINDEX TABLE workflows; \
                                    ANALYZE fireworks; ANALYZE launches; ANALYZE workflows;")
                    .map_err(PersistenceError::from)
            })?;
        debug!("tuneup: reindex + analyze done");
        Ok(())
    }
}

/// Construye un pool Postgres r2d2 y ejecuta las migraciones pendientes.
///
/// Ajusta tamaños inválidos (0 -> 1, `min > max` -> `min = max`).
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = min_size.max(1);
    let validated_max = max_size.max(1);
    if validated_min > validated_max {
        warn!("min_size > max_size ({validated_min} > {validated_max}), ajustando min=max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(validated_min.min(validated_max)))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

pub fn build_pool_from_config(cfg: &DbConfig) -> Result<PgPool, PersistenceError> {
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

/// Carga `.env`, lee `DbConfig` y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    let cfg = DbConfig::from_env()?;
    build_pool_from_config(&cfg)
}
