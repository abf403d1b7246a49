//! Implementación Postgres (Diesel) de `WorkflowStore`.
//!
//! - `workflow_positions`: una fila por identidad con el fingerprint actual.
//! - `workflow_step_logs`: último step log guardado por `finish()`,
//!   reemplazado completo (delete + insert) dentro de una transacción.
//! - `run_exclusive`: abre una transacción en una conexión del pool y toma
//!   `pg_advisory_xact_lock` dentro de ella. Todas las lecturas/escrituras de
//!   la unidad de trabajo usan esa misma conexión, así que quien tiene el
//!   lock nunca compite por el pool con quienes esperan. El lock vive lo que
//!   vive la transacción: commit o rollback lo sueltan siempre.
//! - Errores transitorios: reintento con backoff corto (3 intentos), salvo
//!   dentro de la transacción exclusiva (una sentencia fallida la aborta).

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use branch_core::{StepRecord, StoreError, WorkflowStore};
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sql_types::BigInt;
use log::{debug, error, warn};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{workflow_positions, workflow_step_logs};

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones (pool real o sustituto en tests).
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError>;
}

/// `ConnectionProvider` respaldado por un `PgPool`.
#[derive(Clone)]
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

// Filas por batch al insertar el step log (límite de parámetros de Postgres).
const STEP_INSERT_CHUNK: usize = 1000;

#[derive(Insertable, Debug)]
#[diesel(table_name = workflow_step_logs)]
struct NewStepRow<'a> {
    flow_id: &'a Uuid,
    position: i32,
    kind: &'a str,
    detail: &'a str,
}

fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("connection closed")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Backoff: 15ms, 30ms, 45ms; luego se devuelve el error.
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Clave del advisory lock para una identidad.
pub fn advisory_key(flow_id: Uuid) -> i64 {
    let (hi, lo) = flow_id.as_u64_pair();
    (hi ^ lo) as i64
}

/// Registro de identidades sobre un mismo proveedor de conexiones.
pub struct PgBackend<P: ConnectionProvider> {
    provider: Arc<P>,
}

impl<P: ConnectionProvider> Clone for PgBackend<P> {
    fn clone(&self) -> Self {
        Self { provider: Arc::clone(&self.provider) }
    }
}

impl<P: ConnectionProvider> PgBackend<P> {
    pub fn new(provider: P) -> Self {
        Self { provider: Arc::new(provider) }
    }

    /// Handle acotado a `flow_id`.
    pub fn store(&self, flow_id: Uuid) -> PgWorkflowStore<P> {
        PgWorkflowStore::new(Arc::clone(&self.provider), flow_id)
    }

    /// Identidades con posición guardada, más recientes primero.
    pub fn identities(&self) -> Result<Vec<Uuid>, PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            workflow_positions::table.select(workflow_positions::flow_id)
                                     .order(workflow_positions::updated_at.desc())
                                     .load(&mut conn)
                                     .map_err(PersistenceError::from)
        })
    }
}

/// Conexión con la transacción exclusiva abierta. Sólo el hilo que la abrió
/// la usa; cualquier otro hilo sobre el mismo handle sale al pool.
struct HeldConnection {
    owner: ThreadId,
    conn: PgPooledConnection,
}

/// Handle de una identidad de workflow sobre Postgres.
pub struct PgWorkflowStore<P: ConnectionProvider> {
    provider: Arc<P>,
    flow_id: Uuid,
    held: Mutex<Option<HeldConnection>>,
}

impl<P: ConnectionProvider> Clone for PgWorkflowStore<P> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.provider), self.flow_id)
    }
}

/// Cierra la transacción exclusiva si `run_exclusive` no llega a hacerlo
/// (pánico dentro de la unidad de trabajo). Un rollback fallido deja el
/// transaction manager en error y el pool descarta la conexión al recibirla.
struct ExclusiveGuard<'s, P: ConnectionProvider> {
    store: &'s PgWorkflowStore<P>,
}

impl<P: ConnectionProvider> ExclusiveGuard<'_, P> {
    /// Commit y devolución de la conexión al pool. Tras tomar la conexión,
    /// el `Drop` del guard ya no encuentra nada que deshacer.
    fn commit(self) -> Result<(), PersistenceError> {
        let Some(mut held) = self.store.take_held() else {
            return Ok(());
        };
        let committed = <AnsiTransactionManager as TransactionManager<PgConnection>>::commit_transaction(&mut *held.conn);
        if let Err(e) = &committed {
            warn!("run_exclusive:commit failed flow_id={} err={:?}, rolling back", self.store.flow_id, e);
            if let Err(e) =
                <AnsiTransactionManager as TransactionManager<PgConnection>>::rollback_transaction(&mut *held.conn)
            {
                debug!("run_exclusive:rollback after failed commit flow_id={} err={:?}", self.store.flow_id, e);
            }
        }
        committed.map_err(PersistenceError::from)
    }
}

impl<P: ConnectionProvider> Drop for ExclusiveGuard<'_, P> {
    fn drop(&mut self) {
        if let Some(mut held) = self.store.take_held() {
            warn!("run_exclusive:aborted flow_id={}, rolling back", self.store.flow_id);
            if let Err(e) =
                <AnsiTransactionManager as TransactionManager<PgConnection>>::rollback_transaction(&mut *held.conn)
            {
                error!("run_exclusive:rollback failed flow_id={} err={:?}", self.store.flow_id, e);
            }
        }
    }
}

impl<P: ConnectionProvider> PgWorkflowStore<P> {
    fn new(provider: Arc<P>, flow_id: Uuid) -> Self {
        Self { provider,
               flow_id,
               held: Mutex::new(None) }
    }

    pub fn flow_id(&self) -> Uuid {
        self.flow_id
    }

    fn take_held(&self) -> Option<HeldConnection> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Ejecuta `f` sobre la conexión exclusiva de este hilo si existe; si no,
    /// sobre una conexión del pool con reintentos.
    fn with_conn<T, F>(&self, mut f: F) -> Result<T, PersistenceError>
        where F: FnMut(&mut PgConnection) -> Result<T, PersistenceError>
    {
        {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(h) = held.as_mut().filter(|h| h.owner == thread::current().id()) {
                return f(&mut *h.conn);
            }
        }
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            f(&mut *conn)
        })
    }

    /// Borra posición y step log de esta identidad.
    pub fn reset(&self) -> Result<(), PersistenceError> {
        debug!("reset flow_id={}", self.flow_id);
        self.with_conn(|conn| {
                conn.transaction(|tx| {
                        diesel::delete(workflow_step_logs::table.filter(workflow_step_logs::flow_id.eq(self.flow_id)))
                            .execute(tx)?;
                        diesel::delete(workflow_positions::table.find(self.flow_id)).execute(tx)?;
                        Ok::<(), diesel::result::Error>(())
                    })
                    .map_err(PersistenceError::from)
            })
    }

    /// Abre la transacción exclusiva en `conn` y espera el lock de la
    /// identidad. Si el lock falla la transacción se deshace aquí mismo.
    fn lock(&self, conn: &mut PgConnection) -> Result<(), PersistenceError> {
        <AnsiTransactionManager as TransactionManager<PgConnection>>::begin_transaction(conn)?;
        let locked = diesel::sql_query("SELECT pg_advisory_xact_lock($1)").bind::<BigInt, _>(advisory_key(self.flow_id))
                                                                         .execute(conn)
                                                                         .map(|_| ())
                                                                         .map_err(PersistenceError::from);
        if locked.is_err() {
            if let Err(e) = <AnsiTransactionManager as TransactionManager<PgConnection>>::rollback_transaction(conn) {
                error!("lock:rollback failed flow_id={} err={:?}", self.flow_id, e);
            }
        }
        locked
    }

    fn load_position(&self) -> Result<Option<String>, PersistenceError> {
        self.with_conn(|conn| {
                workflow_positions::table.find(self.flow_id)
                                         .select(workflow_positions::fingerprint)
                                         .first::<String>(conn)
                                         .optional()
                                         .map_err(PersistenceError::from)
            })
    }

    fn save_position(&self, fingerprint: &str) -> Result<(), PersistenceError> {
        self.with_conn(|conn| {
            diesel::insert_into(workflow_positions::table)
                .values((workflow_positions::flow_id.eq(self.flow_id),
                         workflow_positions::fingerprint.eq(fingerprint)))
                .on_conflict(workflow_positions::flow_id)
                .do_update()
                .set((workflow_positions::fingerprint.eq(fingerprint),
                      workflow_positions::updated_at.eq(diesel::dsl::now)))
                .execute(conn)
                .map(|_| ())
                .map_err(PersistenceError::from)
        })
    }

    fn replace_steps(&self, steps: &[StepRecord]) -> Result<(), PersistenceError> {
        let rows = steps.iter()
                        .enumerate()
                        .map(|(i, s)| {
                            let position = i32::try_from(i).map_err(|_| {
                                                               PersistenceError::CheckViolation(format!("step position {i} out of range"))
                                                           })?;
                            Ok(NewStepRow { flow_id: &self.flow_id,
                                            position,
                                            kind: s.kind(),
                                            detail: s.detail() })
                        })
                        .collect::<Result<Vec<_>, PersistenceError>>()?;
        // Dentro de `run_exclusive` la transacción pasa a ser un savepoint.
        self.with_conn(|conn| {
                conn.transaction(|tx| {
                        diesel::delete(workflow_step_logs::table.filter(workflow_step_logs::flow_id.eq(self.flow_id)))
                            .execute(tx)?;
                        for chunk in rows.chunks(STEP_INSERT_CHUNK) {
                            diesel::insert_into(workflow_step_logs::table).values(chunk).execute(tx)?;
                        }
                        Ok::<(), diesel::result::Error>(())
                    })
                    .map_err(PersistenceError::from)
            })
    }

    fn load_steps(&self) -> Result<Vec<StepRecord>, PersistenceError> {
        let rows: Vec<(String, String)> = self.with_conn(|conn| {
                                                  workflow_step_logs::table.filter(workflow_step_logs::flow_id.eq(self.flow_id))
                                                                           .order(workflow_step_logs::position.asc())
                                                                           .select((workflow_step_logs::kind, workflow_step_logs::detail))
                                                                           .load(conn)
                                                                           .map_err(PersistenceError::from)
                                              })?;
        Ok(rows.into_iter().map(|(kind, detail)| StepRecord::new(kind, detail)).collect())
    }
}

impl<P: ConnectionProvider> WorkflowStore for PgWorkflowStore<P> {
    fn run_exclusive<T, E, F>(&self, work: F) -> Result<T, E>
        where F: FnOnce() -> Result<T, E>,
              E: From<StoreError>
    {
        let to_store = |e: PersistenceError| E::from(StoreError::from(e));
        let conn = with_retry(|| {
                       let mut conn = self.provider.connection()?;
                       self.lock(&mut *conn)?;
                       Ok(conn)
                   }).map_err(to_store)?;
        debug!("run_exclusive:locked flow_id={}", self.flow_id);
        *self.held.lock().unwrap_or_else(PoisonError::into_inner) = Some(HeldConnection { owner: thread::current().id(),
                                                                                         conn });
        let guard = ExclusiveGuard { store: self };
        let out = work();
        // Se confirma también si `work` falló: lo persistido hasta el fallo
        // se conserva, igual que con el store en memoria.
        let committed = guard.commit();
        debug!("run_exclusive:released flow_id={}", self.flow_id);
        match (out, committed) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(to_store(e)),
            (Ok(v), Ok(())) => Ok(v),
        }
    }

    fn load_fingerprint(&self) -> Result<Option<String>, StoreError> {
        Ok(self.load_position()?)
    }

    fn save_fingerprint(&self, fingerprint: &str) -> Result<(), StoreError> {
        debug!("save_fingerprint flow_id={} fingerprint='{}'", self.flow_id, fingerprint);
        Ok(self.save_position(fingerprint)?)
    }

    fn save_step_log(&self, steps: &[StepRecord]) -> Result<(), StoreError> {
        debug!("save_step_log flow_id={} count={}", self.flow_id, steps.len());
        Ok(self.replace_steps(steps)?)
    }

    fn load_step_log(&self) -> Result<Vec<StepRecord>, StoreError> {
        Ok(self.load_steps()?)
    }
}

/// Construye un pool Postgres r2d2 y corre las migraciones pendientes.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    if validated_min > validated_max {
        warn!("min_size > max_size ({} > {}), ajustando min=max", validated_min, validated_max);
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
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

/// Helper de desarrollo: carga `.env`, lee configuración y construye un pool
/// ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
