use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use branch_core::{MemoryBackend, Workflow, WorkflowBuilder, WorkflowStore};
use uuid::Uuid;

struct Event {
    welcome_mails: Arc<AtomicUsize>,
}

#[test]
fn concurrent_instantiations_of_one_identity_serialize() {
    let def = WorkflowBuilder::<Event>::new("onboarding").start(|t| {
                                                             if !t.already_called("welcome_mail")? {
                                                                 t.data().welcome_mails.fetch_add(1, Ordering::SeqCst);
                                                                 thread::yield_now();
                                                                 t.record_call("welcome_mail")?;
                                                             }
                                                             Ok(())
                                                         })
                                                         .build()
                                                         .unwrap();
    let backend = MemoryBackend::new();
    let flow_id = Uuid::new_v4();
    let mails = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8).map(|_| {
                                     let def = Arc::clone(&def);
                                     let store = backend.store(flow_id);
                                     let mails = Arc::clone(&mails);
                                     thread::spawn(move || {
                                         Workflow::open(def, store, Event { welcome_mails: mails }).map(|_| ())
                                     })
                                 })
                                 .collect();
    for h in handles {
        h.join().expect("thread").expect("open");
    }

    assert_eq!(mails.load(Ordering::SeqCst), 1);
    assert_eq!(backend.store(flow_id).load_fingerprint().unwrap().as_deref(), Some(":welcome_mail"));
}
