//! End-to-end capture pipeline tests.
//!
//! A host handler wrapped in a `CaptureInterceptor`, an `Operator` driven by
//! that handler, and the persisted units on disk:
//!
//! A. Cross-actor dedup with reporter sanitization
//! B. Attribution excludes the capture system's own component
//! C. Operator `cause` flows through the interceptor and is recorded
//! D. Archive and restart round-trip through the data directory
//! E. Concurrent captures racing operator save/list/show/remove

use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;

use faultline_core::operator::{NO_ERRORS, NOT_INTERACTIVE, TEST_FAILURE_KIND};
use faultline_core::{
    Actor, CaptureInterceptor, CommandSender, ComponentLabel, Config, Engine, Failure,
    FailureInfo, FailureReport, InboundMessage, MessageHandler, Operator, Redispatch,
};

// =============================================================================
// Host fixtures
// =============================================================================

struct Player {
    name: String,
    messages: RefCell<Vec<String>>,
}

impl Player {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            messages: RefCell::new(Vec::new()),
        }
    }
}

impl Actor for Player {
    fn identity(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        true
    }
}

impl CommandSender for Player {
    fn send_message(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }

    fn is_interactive(&self) -> bool {
        true
    }

    fn has_permission(&self, _permission: &str) -> bool {
        true
    }
}

/// Non-interactive sender collecting replies.
#[derive(Default)]
struct Console(RefCell<Vec<String>>);

impl Console {
    fn output(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

impl CommandSender for Console {
    fn send_message(&self, message: &str) {
        self.0.borrow_mut().push(message.to_string());
    }

    fn is_interactive(&self) -> bool {
        false
    }

    fn has_permission(&self, _permission: &str) -> bool {
        true
    }
}

/// Host-side error type: wraps either a game failure or an operator failure.
#[derive(Debug)]
enum HostError {
    Game(FailureInfo),
    Operator(Failure),
}

impl FailureReport for HostError {
    fn failure_info(&self) -> FailureInfo {
        match self {
            Self::Game(info) => info.clone(),
            Self::Operator(failure) => failure.failure_info(),
        }
    }
}

enum Packet {
    NullRef,
    Command(Vec<&'static str>),
}

impl InboundMessage for Packet {
    fn name(&self) -> &str {
        match self {
            Self::NullRef => "null_ref",
            Self::Command(_) => "command",
        }
    }
}

struct Host {
    operator: Operator,
}

impl MessageHandler for Host {
    type Actor = Player;
    type Message = Packet;
    type Error = HostError;

    fn handle(
        &self,
        actor: &Player,
        message: &Packet,
        _dispatch: &dyn Redispatch<Player, Packet, HostError>,
    ) -> Result<(), HostError> {
        match message {
            Packet::NullRef => Err(HostError::Game(FailureInfo {
                kind: "NullRef".to_string(),
                message: format!("npe at X (actor={})", actor.name),
                file: "a.src".to_string(),
                line: 10,
                trace: format!(
                    "0: minigames::arena::join({})\n1: faultline::interceptor::dispatch",
                    actor.name
                ),
            })),
            Packet::Command(args) => self
                .operator
                .execute(actor, args)
                .map_err(HostError::Operator),
        }
    }
}

fn labels() -> Vec<ComponentLabel> {
    vec![
        ComponentLabel::new("minigames::arena", "Arena", "2.0", ["kit"]),
        ComponentLabel::new("faultline", "faultline", "0.1.0", ["ops"]),
    ]
}

fn start(dir: &Path) -> Arc<Engine> {
    let mut config = Config::default();
    config.storage.data_dir = dir.to_path_buf();
    let engine = Engine::start(config, Arc::new(labels())).unwrap();
    engine.refresh_registry();
    engine
}

fn interceptor(engine: &Arc<Engine>) -> CaptureInterceptor<Host> {
    let host = Host {
        operator: Operator::new(Arc::clone(engine)),
    };
    CaptureInterceptor::new(Arc::clone(engine), host)
}

// =============================================================================
// A. Cross-actor dedup
// =============================================================================

#[test]
fn same_failure_from_two_actors_is_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let engine = start(dir.path());
    let interceptor = interceptor(&engine);

    assert!(interceptor.dispatch(&Player::new("Alice"), &Packet::NullRef).is_err());
    let record = engine.store().show(0).unwrap();
    assert_eq!(record.duplicates, 0);
    assert_eq!(record.error.message, "npe at X (actor=%actor%)");
    assert!(!record.error.trace.contains("Alice"));

    assert!(interceptor.dispatch(&Player::new("Bob"), &Packet::NullRef).is_err());
    let record = engine.store().show(0).unwrap();
    assert_eq!(engine.store().len(), 1);
    assert_eq!(record.duplicates, 1);
    assert_eq!(record.reporter, "Alice");
}

// =============================================================================
// B. Attribution
// =============================================================================

#[test]
fn attribution_skips_own_component() {
    let dir = tempfile::tempdir().unwrap();
    let engine = start(dir.path());
    let interceptor = interceptor(&engine);

    let _ = interceptor.dispatch(&Player::new("Alice"), &Packet::NullRef);
    let record = engine.store().show(0).unwrap();
    assert_eq!(record.involved_components, vec!["Arena_v2.0 by kit"]);
    assert_eq!(
        record.loaded_components,
        "Arena_v2.0 by kit; faultline_v0.1.0 by ops"
    );
}

// =============================================================================
// C. Operator cause
// =============================================================================

#[test]
fn cause_from_player_is_captured() {
    let dir = tempfile::tempdir().unwrap();
    let engine = start(dir.path());
    let interceptor = interceptor(&engine);
    let alice = Player::new("Alice");

    let err = interceptor
        .dispatch(&alice, &Packet::Command(vec!["cause"]))
        .unwrap_err();
    assert!(matches!(err, HostError::Operator(_)));

    let record = engine.store().show(0).unwrap();
    assert_eq!(record.error.kind, TEST_FAILURE_KIND);
    assert!(record.error.file.ends_with("operator.rs"));
}

#[test]
fn cause_from_console_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let engine = start(dir.path());
    let operator = Operator::new(Arc::clone(&engine));
    let console = Console::default();

    operator.execute(&console, &["cause"]).unwrap();
    operator.execute(&console, &["list"]).unwrap();
    assert_eq!(console.output(), vec![NOT_INTERACTIVE, NO_ERRORS]);
}

// =============================================================================
// D. Archive and restart
// =============================================================================

#[test]
fn archive_then_restart() {
    let dir = tempfile::tempdir().unwrap();
    let engine = start(dir.path());
    let interceptor = interceptor(&engine);
    let alice = Player::new("Alice");

    let _ = interceptor.dispatch(&alice, &Packet::NullRef);
    let _ = interceptor.dispatch(&alice, &Packet::Command(vec!["cause"]));
    assert_eq!(engine.shutdown().written, 2);

    let _ = interceptor.dispatch(&alice, &Packet::Command(vec!["remove", "0"]));
    assert_eq!(alice.messages.borrow().last().unwrap(), "Error 0 archived.");
    let archived = std::fs::read_dir(engine.store().archive_dir()).unwrap().count();
    assert_eq!(archived, 1);

    let restarted = start(dir.path());
    assert_eq!(restarted.store().len(), 1);
    assert_eq!(
        restarted.store().show(0).unwrap().error.kind,
        TEST_FAILURE_KIND
    );
}

// =============================================================================
// E. Concurrency
// =============================================================================

#[test]
fn concurrent_captures_survive_operator_commands() {
    const WORKERS: u64 = 8;
    const CAPTURES: u64 = 200;

    let dir = tempfile::tempdir().unwrap();
    let engine = start(dir.path());
    let operator = Operator::new(Arc::clone(&engine));

    let doomed = FailureInfo {
        kind: "Timeout".to_string(),
        message: "lobby heartbeat lost".to_string(),
        file: "b.src".to_string(),
        line: 3,
        trace: String::new(),
    };
    engine.record_failure("Carol", &doomed);

    let hot = FailureInfo {
        kind: "NullRef".to_string(),
        message: "npe at X".to_string(),
        file: "a.src".to_string(),
        line: 10,
        trace: "0: minigames::arena::join".to_string(),
    };

    std::thread::scope(|scope| {
        for worker in 0..WORKERS {
            let (engine, hot) = (&engine, &hot);
            scope.spawn(move || {
                let reporter = format!("worker-{worker}");
                for _ in 0..CAPTURES {
                    engine.record_failure(&reporter, hot);
                }
            });
        }

        scope.spawn(|| {
            let console = Console::default();
            for _ in 0..50 {
                operator.execute(&console, &["save"]).unwrap();
                operator.execute(&console, &["list"]).unwrap();
                operator.execute(&console, &["show", "0"]).unwrap();
            }
            assert!(console.output().iter().all(|line| !line.contains("failed")));
        });

        scope.spawn(|| {
            let console = Console::default();
            let index = engine
                .store()
                .list()
                .into_iter()
                .find(|summary| summary.message == doomed.message)
                .unwrap()
                .index;
            operator
                .execute(&console, &["remove", &index.to_string()])
                .unwrap();
            assert_eq!(console.output(), vec![format!("Error {index} archived.")]);
        });
    });

    let expected = WORKERS * CAPTURES - 1;
    assert_eq!(engine.store().len(), 1);
    let record = engine.store().show(0).unwrap();
    assert_eq!(record.duplicates, expected);
    assert_eq!(record.involved_components, vec!["Arena_v2.0 by kit"]);
    assert_eq!(std::fs::read_dir(engine.store().archive_dir()).unwrap().count(), 1);

    assert_eq!(engine.shutdown().written, 1);
    let restarted = start(dir.path());
    assert_eq!(restarted.store().len(), 1);
    assert_eq!(restarted.store().show(0).unwrap().duplicates, expected);
}
