use std::collections::BTreeSet;
use std::process::exit;

use branch_core::{codec, StepRecord, WorkflowState, WorkflowStore};
use branch_persistence::{PgBackend, PoolProvider};
use indexmap::IndexSet;
use serde::Serialize;
use uuid::Uuid;

const USAGE: &str = "Uso:
  branch-cli decode --fingerprint '<FP>'
  branch-cli encode [--entries a,b] [--calls x,y]
  branch-cli inspect --flow <UUID>
  branch-cli reset --flow <UUID>
  branch-cli list";

/// Resumen imprimible de una posición.
#[derive(Serialize)]
struct PositionReport<'a> {
    flow_id: Option<Uuid>,
    fingerprint: Option<&'a str>,
    reached_entry_points: Vec<&'a str>,
    executed_calls: Vec<&'a str>,
    finished: bool,
    steps: &'a [StepRecord],
}

fn report<'a>(flow_id: Option<Uuid>, fingerprint: Option<&'a str>, state: &'a WorkflowState) -> PositionReport<'a> {
    PositionReport { flow_id,
                     fingerprint,
                     reached_entry_points: state.reached_entry_points().iter().map(|s| s.as_str()).collect(),
                     executed_calls: state.executed_calls().iter().map(|s| s.as_str()).collect(),
                     finished: state.is_finished(),
                     steps: state.steps() }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            eprintln!("[branch-cli] serialization error: {e}");
            exit(5);
        }
    }
}

/// Valor de `--flag <valor>` si está presente.
fn flag(args: &[String], name: &str) -> Option<String> {
    args.iter().position(|a| a == name).and_then(|i| args.get(i + 1)).cloned()
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|r| r.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
       .unwrap_or_default()
}

fn backend_or_exit(cmd: &str) -> PgBackend<PoolProvider> {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("[branch-cli {cmd}] requiere DATABASE_URL para operar contra backend persistente");
        exit(4);
    }
    match branch_persistence::build_dev_pool_from_env() {
        Ok(pool) => PgBackend::new(PoolProvider { pool }),
        Err(e) => {
            eprintln!("[branch-cli {cmd}] pool error: {e}");
            exit(5);
        }
    }
}

fn flow_or_exit(args: &[String]) -> Uuid {
    match flag(args, "--flow").and_then(|f| Uuid::parse_str(&f).ok()) {
        Some(id) => id,
        None => {
            eprintln!("{USAGE}");
            exit(2);
        }
    }
}

fn main() {
    let _ = dotenvy::dotenv();
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("");
    match cmd {
        "decode" => {
            let Some(fp) = flag(&args, "--fingerprint") else {
                eprintln!("{USAGE}");
                exit(2);
            };
            match WorkflowState::from_fingerprint(Some(&fp)) {
                Ok(state) => print_json(&report(None, Some(&fp), &state)),
                Err(e) => {
                    eprintln!("[branch-cli decode] {e}");
                    exit(3);
                }
            }
        }
        "encode" => {
            let entries: IndexSet<String> = split_list(flag(&args, "--entries")).into_iter().collect();
            let calls: BTreeSet<String> = split_list(flag(&args, "--calls")).into_iter().collect();
            match codec::encode(&entries, &calls) {
                Ok(fp) => println!("{fp}"),
                Err(e) => {
                    eprintln!("[branch-cli encode] {e}");
                    exit(3);
                }
            }
        }
        "inspect" => {
            let flow_id = flow_or_exit(&args);
            let store = backend_or_exit("inspect").store(flow_id);
            let fingerprint = match store.load_fingerprint() {
                Ok(Some(fp)) => fp,
                Ok(None) => {
                    eprintln!("[branch-cli inspect] flow no encontrado: {flow_id}");
                    exit(4);
                }
                Err(e) => {
                    eprintln!("[branch-cli inspect] error: {e}");
                    exit(5);
                }
            };
            let mut state = match WorkflowState::from_fingerprint(Some(&fingerprint)) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("[branch-cli inspect] fingerprint corrupto: {e}");
                    exit(3);
                }
            };
            match store.load_step_log() {
                Ok(steps) => state.replace_steps(steps),
                Err(e) => {
                    eprintln!("[branch-cli inspect] error: {e}");
                    exit(5);
                }
            }
            print_json(&report(Some(flow_id), Some(&fingerprint), &state));
        }
        "reset" => {
            let flow_id = flow_or_exit(&args);
            match backend_or_exit("reset").store(flow_id).reset() {
                Ok(()) => println!("reset: flow={flow_id}"),
                Err(e) => {
                    eprintln!("[branch-cli reset] error: {e}");
                    exit(5);
                }
            }
        }
        "list" => match backend_or_exit("list").identities() {
            Ok(ids) => ids.iter().for_each(|id| println!("{id}")),
            Err(e) => {
                eprintln!("[branch-cli list] error: {e}");
                exit(5);
            }
        },
        _ => println!("{USAGE}"),
    }
}
