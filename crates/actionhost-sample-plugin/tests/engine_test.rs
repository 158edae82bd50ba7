//! Engine behaviour exercised through the `rlib`, without the binary contract.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use actionhost_plugin_sdk::abi::PayloadValue;
use actionhost_plugin_sdk::{ConfigStatus, PluginError};
use actionhost_sample_plugin::engine::{
    Action, ActionInfo, ActionRegistry, EngineOptions, ExecutionLog, IdGenerator, Notifications,
    PluginInstance, PluginSettings,
};
use parking_lot::Mutex;

/// In-memory sink for the text written by executed actions.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Added(u64),
    Removed(u64),
}

fn recording_notifications() -> (Notifications, Arc<Mutex<Vec<Event>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let added = Arc::clone(&events);
    let removed = Arc::clone(&events);
    let notifications = Notifications {
        on_added: Some(Box::new(move |id| added.lock().push(Event::Added(id)))),
        on_modified: None,
        on_removed: Some(Box::new(move |id| removed.lock().push(Event::Removed(id)))),
    };
    (notifications, events)
}

fn start(
    dir: &tempfile::TempDir,
    notifications: Notifications,
    options: EngineOptions,
) -> PluginInstance {
    PluginInstance::new(
        PluginSettings {
            persistence_path: dir.path().to_path_buf(),
            notifications,
        },
        Arc::new(IdGenerator::new()),
        &options,
    )
    .unwrap()
}

fn options(log: &Captured) -> EngineOptions {
    EngineOptions {
        configure_delay: Duration::from_millis(50),
        scripted_mutations: false,
        log: ExecutionLog::new(log.clone()),
    }
}

#[test]
fn test_scripted_mutations_leave_last_five_actions() {
    let dir = tempfile::tempdir().unwrap();
    let (notifications, events) = recording_notifications();
    let instance = start(
        &dir,
        notifications,
        EngineOptions {
            scripted_mutations: true,
            ..options(&Captured::default())
        },
    );

    instance.wait_scripted_mutations();
    assert_eq!(instance.registry().snapshot(), vec![6, 7, 8, 9, 10]);

    let expected: Vec<Event> = (1..=10)
        .map(Event::Added)
        .chain((1..=5).map(Event::Removed))
        .collect();
    assert_eq!(*events.lock(), expected);

    let action = instance.registry().retrieve(6).unwrap();
    assert_eq!(action.info(), ActionInfo::new("action5", "prints value"));
}

#[test]
fn test_execute_writes_classification() {
    let dir = tempfile::tempdir().unwrap();
    let log = Captured::default();
    let instance = start(&dir, Notifications::default(), options(&log));
    instance
        .registry()
        .insert(Action::new(42, ActionInfo::new("a", "b")))
        .unwrap();

    instance.execute(42, PayloadValue::Int32(7)).unwrap();
    instance.execute(42, PayloadValue::Int32(0)).unwrap();
    let err = instance.execute(42, PayloadValue::Int32(-5)).unwrap_err();
    assert_eq!(err.to_string(), "execution error of action 42");
    assert_eq!(log.text(), "positive value 7\nzero 0\n");

    assert!(matches!(
        instance.execute(42, PayloadValue::Double(1.0)),
        Err(PluginError::InvalidPayload(_))
    ));
    assert!(matches!(
        instance.execute(43, PayloadValue::Int32(1)),
        Err(PluginError::ActionNotFound(43))
    ));
}

#[test]
fn test_execute_async_invokes_callback_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = Captured::default();
    let instance = start(&dir, Notifications::default(), options(&log));
    instance
        .registry()
        .insert(Action::new(1, ActionInfo::new("a", "b")))
        .unwrap();

    let (tx, rx) = mpsc::channel();
    for value in [3, -3] {
        let tx = tx.clone();
        instance
            .execute_async(
                1,
                PayloadValue::Int32(value),
                Box::new(move |outcome| tx.send(outcome.is_ok()).unwrap()),
            )
            .unwrap();
    }
    drop(tx);

    let mut outcomes: Vec<bool> = rx.iter().collect();
    outcomes.sort_unstable();
    assert_eq!(outcomes, vec![false, true]);
    assert_eq!(log.text(), "positive value 3\n");
}

#[test]
fn test_execute_async_rejection_drops_callback() {
    let dir = tempfile::tempdir().unwrap();
    let instance = start(&dir, Notifications::default(), options(&Captured::default()));
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let result = instance.execute_async(
        99,
        PayloadValue::Int32(1),
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert!(matches!(result, Err(PluginError::ActionNotFound(99))));

    drop(instance);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_configure_is_single_flight() {
    let dir = tempfile::tempdir().unwrap();
    let instance = start(&dir, Notifications::default(), options(&Captured::default()));

    let (tx, rx) = mpsc::channel();
    let first = tx.clone();
    instance
        .configure(Box::new(move |outcome| first.send(outcome.unwrap()).unwrap()))
        .unwrap();

    let second = instance.configure(Box::new(|_| panic!("must not run")));
    assert!(matches!(second, Err(PluginError::Unavailable(_))));

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        ConfigStatus::Success
    );

    // The session slot is free again shortly after the callback has run.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let tx = tx.clone();
        match instance.configure(Box::new(move |outcome| tx.send(outcome.unwrap()).unwrap())) {
            Ok(()) => break,
            Err(PluginError::Unavailable(_)) if std::time::Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => panic!("reconfiguration failed: {e}"),
        }
    }
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        ConfigStatus::Success
    );
}

#[test]
fn test_configure_rejected_while_callback_runs() {
    let dir = tempfile::tempdir().unwrap();
    let instance = start(&dir, Notifications::default(), options(&Captured::default()));

    let (entered_tx, entered_rx) = mpsc::channel();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    instance
        .configure(Box::new(move |outcome| {
            entered_tx.send(outcome.unwrap()).unwrap();
            let _ = gate_rx.recv_timeout(Duration::from_secs(5));
        }))
        .unwrap();

    assert_eq!(
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        ConfigStatus::Success
    );
    // The first session has not returned from its callback yet.
    let second = instance.configure(Box::new(|_| panic!("must not run")));
    assert!(matches!(second, Err(PluginError::Unavailable(_))));

    gate_tx.send(()).unwrap();
}

#[test]
fn test_drop_finishes_pending_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let instance = start(&dir, Notifications::default(), options(&Captured::default()));
    let calls = Arc::new(Mutex::new(Vec::new()));

    let record = Arc::clone(&calls);
    instance
        .configure(Box::new(move |outcome| record.lock().push(outcome.unwrap())))
        .unwrap();
    drop(instance);

    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0], ConfigStatus::Success | ConfigStatus::Cancel));
}

#[test]
fn test_concurrent_mutations_notify_each_change() {
    let (notifications, events) = recording_notifications();
    let registry = Arc::new(ActionRegistry::new(notifications));
    let ids = Arc::new(IdGenerator::new());

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let ids = Arc::clone(&ids);
            thread::spawn(move || {
                for _ in 0..50 {
                    let id = registry
                        .insert(Action::new(ids.next_id(), ActionInfo::default()))
                        .unwrap();
                    if id % 2 == 0 {
                        registry.remove(id).unwrap();
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let events = events.lock();
    let added = events.iter().filter(|e| matches!(e, Event::Added(_))).count();
    let removed = events.iter().filter(|e| matches!(e, Event::Removed(_))).count();
    assert_eq!(added, 400);
    assert_eq!(removed, 200);
    assert_eq!(registry.len(), 200);

    // Every removal is observed after the matching addition.
    for (position, event) in events.iter().enumerate() {
        if let Event::Removed(id) = event {
            assert!(events[..position].contains(&Event::Added(*id)));
        }
    }
}
