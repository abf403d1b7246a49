//! Demo: el mismo workflow lógico se abre una vez por evento entrante y
//! continúa donde quedó.
//!
//! Con el feature `pg_demo` y `DATABASE_URL` definido usa Postgres; en otro
//! caso, el store en memoria.
use branch_core::{MemoryBackend, MemoryStore, Workflow, WorkflowStore};
use branchflow_rust::config::{AppConfig, CONFIG};
use branchflow_rust::errors::AppError;
use branchflow_rust::workflows::{age_gate, document_review, Applicant, Submission};

fn print_instance<W, S: WorkflowStore>(label: &str, wf: &Workflow<W, S>) -> Result<(), AppError> {
    println!("[{label}] fingerprint='{}' finished={}", wf.fingerprint()?, wf.is_finished());
    for step in wf.steps() {
        println!("    {step}");
    }
    Ok(())
}

/// Recorre los eventos de la demo. `store_for` devuelve un handle nuevo de
/// la misma identidad en cada llamada (como haría un proceso distinto).
fn demo<S, F>(store_for: F) -> Result<(), AppError>
    where S: WorkflowStore,
          F: Fn() -> S
{
    let review = document_review()?;

    // Evento 1: llega el envío.
    let wf = Workflow::open(review.clone(), store_for(), Submission::new(4))?;
    print_instance("submitted", &wf)?;
    println!("    outbox={:?}", wf.data().outbox);

    // Evento 2: el revisor pide cambios.
    let mut wf = Workflow::open(review.clone(), store_for(), Submission::new(4))?;
    wf.data_mut().reviewer_approves = false;
    wf.invoke("review_received")?;
    print_instance("changes requested", &wf)?;
    println!("    outbox={:?}", wf.data().outbox);

    // Evento 3: reenvío.
    let mut wf = Workflow::open(review.clone(), store_for(), Submission::new(5))?;
    wf.invoke("resubmitted")?;
    print_instance("resubmitted", &wf)?;
    println!("    outbox={:?}", wf.data().outbox);

    // Evento 4: aprobación. El replay de `review_received` ya ve la
    // aprobación y termina el workflow.
    let approved = Submission { reviewer_approves: true,
                                ..Submission::new(5) };
    let mut wf = Workflow::open(review.clone(), store_for(), approved)?;
    wf.invoke("review_received")?;
    print_instance("approved", &wf)?;
    println!("    outbox={:?}", wf.data().outbox);

    // Evento tardío: el workflow terminado devuelve el log guardado.
    let wf = Workflow::open(review, store_for(), Submission::new(5))?;
    print_instance("late event", &wf)?;

    let gate = age_gate()?;
    let wf = Workflow::open(gate, MemoryStore::standalone(), Applicant { age: 20,
                                                                   granted: false })?;
    print_instance("age gate", &wf)?;
    Ok(())
}

fn run_in_memory(cfg: &AppConfig) -> Result<(), AppError> {
    println!("[branchflow] store en memoria, workflow_id={}", cfg.workflow_id);
    let backend = MemoryBackend::new();
    demo(|| backend.store(cfg.workflow_id))
}

#[cfg(feature = "pg_demo")]
fn run(cfg: &AppConfig) -> Result<(), AppError> {
    use branch_persistence::{build_pool, DbConfig, PgBackend, PoolProvider};

    let Some(url) = cfg.database_url.as_deref() else {
        return run_in_memory(cfg);
    };
    let db = DbConfig::with_url(url);
    let pool = build_pool(&db.url, db.min_connections, db.max_connections)?;
    let backend = PgBackend::new(PoolProvider { pool });
    println!("[branchflow] store Postgres, workflow_id={}", cfg.workflow_id);
    let store = backend.store(cfg.workflow_id);
    store.reset()?;
    demo(|| store.clone())
}

#[cfg(not(feature = "pg_demo"))]
fn run(cfg: &AppConfig) -> Result<(), AppError> {
    run_in_memory(cfg)
}

fn main() {
    let cfg = match &*CONFIG {
        Ok(cfg) => cfg.clone(),
        Err(e) => {
            eprintln!("[branchflow] {e}");
            std::process::exit(2);
        }
    };
    if let Err(e) = run(&cfg) {
        eprintln!("[branchflow] {e}");
        std::process::exit(1);
    }
}
