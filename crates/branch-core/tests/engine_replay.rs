use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use branch_core::constants::FINISHED_SENTINEL;
use branch_core::{Branches, CodecError, EngineError, MemoryStore, StepRecord, Workflow, WorkflowBuilder, WorkflowDefinition,
                  WorkflowStore};

#[derive(Default)]
struct Ticket {
    approved: bool,
    reviews: u32,
    archived: u32,
}

fn review_flow() -> Arc<WorkflowDefinition<Ticket>> {
    WorkflowBuilder::<Ticket>::new("ticket_review").predicate("approved", |t| t.approved)
                                                   .setup("review", |t| t.reviews += 1)
                                                   .setup("close", |_| {})
                                                   .start(|_| Ok(()))
                                                   .entry("review", |t| t.decision("approved"))
                                                   .decision("approved",
                                                             Branches::<Ticket>::new().yes(|t| t.entry("close"))
                                                                            .no(|_| Ok(())))
                                                   .entry("close", |t| {
                                                       t.call_once("archive", |ticket| ticket.archived += 1)?;
                                                       t.finish()
                                                   })
                                                   .build()
                                                   .expect("valid definition")
}

fn count_kind(steps: &[StepRecord], kind: &str) -> usize {
    steps.iter().filter(|s| s.kind() == kind).count()
}

#[test]
fn fresh_workflow_runs_start_and_persists_empty_position() {
    let store = MemoryStore::standalone();
    let wf = Workflow::open(review_flow(), store.clone(), Ticket::default()).unwrap();
    assert!(wf.reached_entry_points().is_empty());
    assert!(wf.steps().is_empty());
    assert_eq!(store.load_fingerprint().unwrap().as_deref(), Some(":"));
}

#[test]
fn invoking_same_entry_twice_keeps_single_membership() {
    let store = MemoryStore::standalone();
    let mut wf = Workflow::open(review_flow(), store.clone(), Ticket::default()).unwrap();
    wf.invoke("review").unwrap().invoke("review").unwrap();

    assert_eq!(wf.reached_entry_points().len(), 1);
    assert_eq!(count_kind(wf.steps(), "Entry Point"), 2);
    assert_eq!(wf.data().reviews, 2);
    assert_eq!(wf.steps()[1], StepRecord::new("approved", "NO"));
    assert_eq!(store.load_fingerprint().unwrap().as_deref(), Some("review:"));
}

#[test]
fn finish_is_absorbing_for_this_and_future_instances() {
    let store = MemoryStore::standalone();
    let mut wf = Workflow::open(review_flow(), store.clone(), Ticket::default()).unwrap();
    wf.invoke("review").unwrap();
    wf.data_mut().approved = true;
    wf.invoke("review").unwrap();
    assert!(wf.is_finished());
    assert_eq!(wf.data().archived, 1);
    assert!(wf.executed_calls().contains(FINISHED_SENTINEL));

    let steps_before = wf.steps().len();
    let fp_before = wf.fingerprint().unwrap();
    wf.invoke("review").unwrap().invoke("close").unwrap();
    assert_eq!(wf.steps().len(), steps_before);
    assert_eq!(wf.fingerprint().unwrap(), fp_before);
    assert_eq!(wf.data().reviews, 2);

    let stored_log = store.load_step_log().unwrap();
    assert_eq!(stored_log.last(), Some(&StepRecord::new("Workflow Finished", FINISHED_SENTINEL)));

    let reopened = Workflow::open(review_flow(), store.clone(), Ticket { approved: true, ..Ticket::default() }).unwrap();
    assert!(reopened.is_finished());
    assert_eq!(reopened.steps(), stored_log.as_slice());
    assert_eq!(reopened.data().reviews, 0, "no setup may run once finished");
    assert_eq!(reopened.data().archived, 0);
}

#[test]
fn replay_invokes_reached_entries_in_order() {
    #[derive(Default)]
    struct Trace(Vec<String>);

    let def = WorkflowBuilder::<Trace>::new("trace").setup("a", |t| t.0.push("setup a".into()))
                                                    .setup("b", |t| t.0.push("setup b".into()))
                                                    .start(|t| {
                                                        t.data_mut().0.push("start".into());
                                                        Ok(())
                                                    })
                                                    .entry("a", |t| {
                                                        t.data_mut().0.push("body a".into());
                                                        Ok(())
                                                    })
                                                    .entry("b", |t| {
                                                        t.data_mut().0.push("body b".into());
                                                        Ok(())
                                                    })
                                                    .build()
                                                    .unwrap();

    let store = MemoryStore::standalone();
    store.save_fingerprint("a/b:").unwrap();
    let wf = Workflow::open(def, store.clone(), Trace::default()).unwrap();

    assert_eq!(wf.data().0, vec!["setup a", "body a", "setup b", "body b"]);
    let order: Vec<&str> = wf.reached_entry_points().iter().map(|s| s.as_str()).collect();
    assert_eq!(order, vec!["a", "b"]);
    assert_eq!(store.load_fingerprint().unwrap().as_deref(), Some("a/b:"));
}

#[test]
fn undeclared_persisted_entry_is_skipped_and_kept() {
    let store = MemoryStore::standalone();
    store.save_fingerprint("retired/review:").unwrap();
    let wf = Workflow::open(review_flow(), store.clone(), Ticket::default()).unwrap();
    assert_eq!(wf.data().reviews, 1);
    assert_eq!(count_kind(wf.steps(), "Entry Point"), 1);
    assert_eq!(store.load_fingerprint().unwrap().as_deref(), Some("retired/review:"));
}

#[test]
fn stop_ends_traversal_but_position_is_persisted() {
    let def = WorkflowBuilder::<()>::new("stopper").setup("gate", |_| {})
                                                   .start(|t| {
                                                       t.record_call("first")?;
                                                       t.stop()?;
                                                       t.record_call("never")?;
                                                       Ok(())
                                                   })
                                                   .entry("gate", |t| {
                                                       t.record_call("opened")?;
                                                       t.stop()?;
                                                       t.record_call("unreachable")?;
                                                       Ok(())
                                                   })
                                                   .build()
                                                   .unwrap();
    let store = MemoryStore::standalone();
    let mut wf = Workflow::open(def, store.clone(), ()).unwrap();
    assert_eq!(store.load_fingerprint().unwrap().as_deref(), Some(":first"));

    wf.invoke("gate").unwrap();
    assert_eq!(store.load_fingerprint().unwrap().as_deref(), Some("gate:first/opened"));
}

#[test]
fn stop_inside_replayed_entry_does_not_block_later_entries() {
    let def = WorkflowBuilder::<Vec<&'static str>>::new("partial").setup("a", |_| {})
                                                                  .setup("b", |_| {})
                                                                  .start(|_| Ok(()))
                                                                  .entry("a", |t| t.stop())
                                                                  .entry("b", |t| {
                                                                      t.data_mut().push("b ran");
                                                                      Ok(())
                                                                  })
                                                                  .build()
                                                                  .unwrap();
    let store = MemoryStore::standalone();
    store.save_fingerprint("a/b:").unwrap();
    let wf = Workflow::open(def, store, Vec::new()).unwrap();
    assert_eq!(wf.data(), &vec!["b ran"]);
}

#[test]
fn unknown_nodes_are_reported() {
    let def = WorkflowBuilder::<()>::new("broken").start(|t| t.decision("nope")).build().unwrap();
    let err = Workflow::open(def, MemoryStore::standalone(), ()).err().unwrap();
    assert_eq!(err, EngineError::UnknownNode { node: "nope".into() });

    let mut wf = Workflow::open(review_flow(), MemoryStore::standalone(), Ticket::default()).unwrap();
    let err = wf.invoke("nope").err().unwrap();
    assert_eq!(err, EngineError::UnknownNode { node: "nope".into() });
}

#[test]
fn invoke_merges_progress_from_other_instances() {
    let store = MemoryStore::standalone();
    let mut stale = Workflow::open(review_flow(), store.clone(), Ticket::default()).unwrap();

    let mut other = Workflow::open(review_flow(), store.clone(), Ticket { approved: true, ..Ticket::default() }).unwrap();
    other.invoke("review").unwrap();
    assert!(other.is_finished());

    stale.invoke("review").unwrap();
    assert!(stale.is_finished());
    assert_eq!(stale.data().reviews, 0);
    assert_eq!(stale.steps(), store.load_step_log().unwrap().as_slice());
}

#[test]
fn malformed_fingerprint_fails_open() {
    let store = MemoryStore::standalone();
    store.save_fingerprint("a//b:").unwrap();
    let err = Workflow::open(review_flow(), store, Ticket::default()).err().unwrap();
    assert!(matches!(err, EngineError::Codec(_)));
}

#[test]
fn invalid_call_name_fails_before_anything_is_saved() {
    let def = WorkflowBuilder::<()>::new("bad_call").start(|t| t.record_call("a:b"))
                                                    .build()
                                                    .unwrap();
    let store = MemoryStore::standalone();
    let err = Workflow::open(def, store.clone(), ()).err().unwrap();
    assert_eq!(err, EngineError::Codec(CodecError::InvalidIdentifier("a:b".into())));
    assert_eq!(store.load_fingerprint().unwrap(), None);
}

#[test]
fn guarded_action_with_invalid_name_never_runs() {
    let def = WorkflowBuilder::<Arc<AtomicUsize>>::new("bad_guard").start(|t| {
                                                                       t.call_once("send/mail", |sent| {
                                                                            sent.fetch_add(1, Ordering::SeqCst)
                                                                        })?;
                                                                       Ok(())
                                                                   })
                                                                   .build()
                                                                   .unwrap();
    let store = MemoryStore::standalone();
    let sent = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let err = Workflow::open(Arc::clone(&def), store.clone(), Arc::clone(&sent)).err().unwrap();
        assert_eq!(err, EngineError::Codec(CodecError::InvalidIdentifier("send/mail".into())));
    }
    assert_eq!(sent.load(Ordering::SeqCst), 0);
    assert_eq!(store.load_fingerprint().unwrap(), None);
}

#[test]
fn guard_refuses_finish_sentinel() {
    let def = WorkflowBuilder::<u32>::new("sneaky").start(|t| {
                                                       t.call_once(FINISHED_SENTINEL, |runs| *runs += 1)?;
                                                       Ok(())
                                                   })
                                                   .build()
                                                   .unwrap();
    let store = MemoryStore::standalone();
    let err = Workflow::open(def, store.clone(), 0).err().unwrap();
    assert_eq!(err, EngineError::Codec(CodecError::InvalidIdentifier(FINISHED_SENTINEL.into())));
    assert_eq!(store.load_fingerprint().unwrap(), None);
}

#[test]
fn undecodable_call_in_stored_fingerprint_fails_before_traversal() {
    let def = WorkflowBuilder::<Arc<AtomicUsize>>::new("welcome").start(|t| {
                                                                     t.call_once("welcome", |sent| {
                                                                          sent.fetch_add(1, Ordering::SeqCst)
                                                                      })?;
                                                                     Ok(())
                                                                 })
                                                                 .build()
                                                                 .unwrap();
    let store = MemoryStore::standalone();
    store.save_fingerprint(":b:c").unwrap();
    let sent = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let err = Workflow::open(Arc::clone(&def), store.clone(), Arc::clone(&sent)).err().unwrap();
        assert_eq!(err, EngineError::Codec(CodecError::InvalidIdentifier("b:c".into())));
    }
    assert_eq!(sent.load(Ordering::SeqCst), 0);
    assert_eq!(store.load_fingerprint().unwrap().as_deref(), Some(":b:c"));
}

#[test]
fn nodes_after_finish_in_same_body_log_nothing() {
    use std::cell::Cell;

    #[derive(Default)]
    struct Counters {
        predicate: Cell<u32>,
        setup: u32,
    }

    let def = WorkflowBuilder::<Counters>::new("late_nodes").predicate("check", |c: &Counters| {
                                                                 c.predicate.set(c.predicate.get() + 1);
                                                                 true
                                                             })
                                                             .setup("after", |c| c.setup += 1)
                                                             .start(|t| {
                                                                 t.finish()?;
                                                                 t.decision("check")?;
                                                                 t.entry("after")?;
                                                                 Ok(())
                                                             })
                                                             .decision("check",
                                                                       Branches::<Counters>::new().yes(|_| Ok(()))
                                                                                                  .no(|_| Ok(())))
                                                             .entry("after", |_| Ok(()))
                                                             .build()
                                                             .unwrap();
    let store = MemoryStore::standalone();
    let wf = Workflow::open(def, store.clone(), Counters::default()).unwrap();
    assert!(wf.is_finished());
    assert_eq!(wf.steps(), &[StepRecord::new("Workflow Finished", FINISHED_SENTINEL)]);
    assert_eq!(wf.data().predicate.get(), 0);
    assert_eq!(wf.data().setup, 0);
    assert!(wf.reached_entry_points().is_empty());
    assert_eq!(store.load_fingerprint().unwrap().as_deref(), Some(":__workflow_finished__"));
}
