#![cfg(unix)]

use std::thread;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use session_manager::{
    ExpiryPolicy, RegistryConfig, Session, SessionCommand, SessionError, SessionOptions,
    SessionRegistry, SessionState,
};

fn registry() -> SessionRegistry {
    SessionRegistry::new(RegistryConfig::default()).expect("registry")
}

fn registry_with(configure: impl FnOnce(&mut RegistryConfig)) -> SessionRegistry {
    let mut config = RegistryConfig::default();
    configure(&mut config);
    SessionRegistry::new(config).expect("registry")
}

/// Reads until `len` bytes arrived or EOF, failing after `within`.
fn read_at_least(registry: &SessionRegistry, id: &str, len: usize, within: Duration) -> Vec<u8> {
    let deadline = Instant::now() + within;
    let mut collected = Vec::new();
    while collected.len() < len {
        assert!(
            Instant::now() < deadline,
            "timed out with {} of {len} bytes",
            collected.len()
        );
        let output = registry
            .read(id, Some(Duration::from_millis(500)))
            .expect("read");
        collected.extend(output.bytes);
        if output.eof {
            break;
        }
    }
    collected
}

#[test]
fn cat_echoes_sent_lines() {
    let registry = registry();
    let id = registry.create("cat", false).expect("create");

    registry.send(&id, "hello").expect("send");
    let output = read_at_least(&registry, &id, 6, Duration::from_secs(5));

    assert_eq!(output, b"hello\n");
}

#[test]
fn read_returns_as_soon_as_output_arrives() {
    let registry = registry();
    let id = registry.create("cat", false).expect("create");
    registry.send(&id, "ping").expect("send");

    let started = Instant::now();
    let output = registry
        .read(&id, Some(Duration::from_secs(10)))
        .expect("read");

    assert!(!output.is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn silent_process_read_times_out_empty() {
    let registry = registry();
    let id = registry.create("cat", false).expect("create");

    let started = Instant::now();
    let output = registry
        .read(&id, Some(Duration::from_millis(200)))
        .expect("read");

    assert!(output.is_empty());
    assert!(!output.eof);
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[test]
fn reads_are_capped_per_call_and_lose_nothing() {
    let registry = registry();
    let id = registry
        .create("head -c 10000 /dev/zero | tr '\\0' a", true)
        .expect("create");

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut total = 0;
    loop {
        assert!(Instant::now() < deadline, "never reached eof");
        let output = registry
            .read(&id, Some(Duration::from_millis(500)))
            .expect("read");
        assert!(output.bytes.len() <= 4096);
        assert!(output.bytes.iter().all(|byte| *byte == b'a'));
        total += output.bytes.len();
        if output.eof {
            break;
        }
    }

    assert_eq!(total, 10_000);
}

#[test]
fn full_buffer_back_pressures_instead_of_dropping() {
    let registry = registry_with(|config| config.session.output_buffer_cap = 64);
    let id = registry
        .create("head -c 20000 /dev/zero | tr '\\0' x", true)
        .expect("create");

    thread::sleep(Duration::from_millis(300));
    assert!(registry.get(&id).expect("snapshot").buffered_bytes <= 64);

    let output = read_at_least(&registry, &id, 20_000, Duration::from_secs(20));
    assert_eq!(output.len(), 20_000);
}

#[test]
fn send_appends_missing_newline_only() {
    let registry = registry();
    let id = registry.create("cat", false).expect("create");

    registry.send(&id, "a").expect("send");
    registry.send(&id, "b\n").expect("send");

    let output = read_at_least(&registry, &id, 4, Duration::from_secs(5));
    assert_eq!(output, b"a\nb\n");
}

#[test]
fn stderr_is_captured_with_stdout() {
    let registry = registry();
    let id = registry.create("echo oops 1>&2", true).expect("create");

    let output = read_at_least(&registry, &id, 5, Duration::from_secs(5));
    assert_eq!(output, b"oops\n");
}

#[test]
fn exited_process_reports_eof_after_output() {
    let registry = registry();
    let id = registry.create("echo done", false).expect("create");

    let output = read_at_least(&registry, &id, 5, Duration::from_secs(5));
    assert_eq!(output, b"done\n");

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let output = registry
            .read(&id, Some(Duration::from_millis(200)))
            .expect("read");
        assert!(output.is_empty());
        if output.eof {
            break;
        }
        assert!(Instant::now() < deadline, "eof never reported");
    }
}

#[test]
fn concurrent_creates_respect_the_cap() {
    let registry = registry_with(|config| config.max_sessions = 3);

    let results: Vec<Result<String, SessionError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| registry.create("cat", false)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("create thread"))
            .collect()
    });

    let created = results.iter().filter(|result| result.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|result| matches!(result, Err(error) if error.is_capacity()))
        .count();
    assert_eq!(created, 3);
    assert_eq!(rejected, 1);
    assert_eq!(registry.len(), 3);
}

#[test]
fn failed_spawn_releases_its_slot() {
    let registry = registry_with(|config| config.max_sessions = 1);

    let error = registry
        .create("tricode-definitely-missing-binary", false)
        .expect_err("spawn should fail");
    assert_matches!(error, SessionError::Spawn { .. });

    registry.create("cat", false).expect("slot was released");
}

#[test]
fn idle_sessions_are_reaped() {
    let registry = registry_with(|config| {
        config.reaper_interval = Duration::from_millis(50);
        config.session.expiry = ExpiryPolicy {
            idle_timeout: Duration::from_millis(200),
            max_lifetime: Duration::from_secs(60),
        };
    });
    let id = registry.create("cat", false).expect("create");

    thread::sleep(Duration::from_millis(800));

    assert_matches!(registry.read(&id, None), Err(SessionError::NotFound { .. }));
    assert!(registry.is_empty());
}

#[test]
fn empty_reads_keep_a_silent_session_alive() {
    let registry = registry_with(|config| {
        config.reaper_interval = Duration::from_millis(50);
        config.session.expiry = ExpiryPolicy {
            idle_timeout: Duration::from_millis(300),
            max_lifetime: Duration::from_secs(60),
        };
    });
    let id = registry.create("cat", false).expect("create");

    let started = Instant::now();
    while started.elapsed() < Duration::from_millis(1200) {
        let output = registry
            .read(&id, Some(Duration::from_millis(100)))
            .expect("polled session stays live");
        assert!(output.is_empty());
        thread::sleep(Duration::from_millis(20));
    }

    registry.send(&id, "still here").expect("send");
    assert_eq!(
        read_at_least(&registry, &id, 11, Duration::from_secs(5)),
        b"still here\n"
    );
}

#[test]
fn max_lifetime_expires_busy_sessions() {
    let registry = registry_with(|config| {
        config.reaper_interval = Duration::from_millis(50);
        config.session.expiry = ExpiryPolicy {
            idle_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_millis(300),
        };
    });
    let id = registry.create("cat", false).expect("create");

    let deadline = Instant::now() + Duration::from_secs(5);
    let error = loop {
        assert!(Instant::now() < deadline, "session never expired");
        match registry.send(&id, "still here") {
            Ok(()) => thread::sleep(Duration::from_millis(50)),
            Err(error) => break error,
        }
    };

    assert_matches!(
        error,
        SessionError::NotFound { .. } | SessionError::Closed { .. }
    );
}

#[test]
fn close_interrupts_an_in_flight_read() {
    let registry = registry();
    let id = registry.create("cat", false).expect("create");

    thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let started = Instant::now();
            let result = registry.read(&id, Some(Duration::from_secs(10)));
            (result, started.elapsed())
        });

        thread::sleep(Duration::from_millis(100));
        registry.close(&id).expect("close");

        let (result, elapsed) = reader.join().expect("reader thread");
        assert_matches!(result, Err(SessionError::Closed { .. }));
        assert!(elapsed < Duration::from_secs(5));
    });
}

#[test]
fn closing_twice_reports_not_found() {
    let registry = registry();
    let id = registry.create("cat", false).expect("create");

    registry.close(&id).expect("first close");
    assert_matches!(registry.close(&id), Err(SessionError::NotFound { .. }));
    assert_matches!(registry.send(&id, "x"), Err(SessionError::NotFound { .. }));
}

#[test]
fn session_close_is_idempotent() {
    let command = SessionCommand::parse("cat", false).expect("parse");
    let session = Session::start("direct", &command, SessionOptions::default()).expect("start");

    session.close();
    session.close();

    assert_eq!(session.state(), SessionState::Closed);
    assert_matches!(session.send("x"), Err(SessionError::Closed { .. }));
    assert_matches!(session.read(None), Err(SessionError::Closed { .. }));
}

#[test]
fn close_terminates_processes_ignoring_sigterm() {
    let command = SessionCommand::parse("trap '' TERM; sleep 30", true).expect("parse");
    let session = Session::start("stubborn", &command, SessionOptions::default()).expect("start");
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    session.close();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(session.snapshot().exited);
}

#[test]
fn list_reports_live_sessions() {
    let registry = registry();
    let first = registry.create("cat", false).expect("create");
    let second = registry.create("sleep 30", false).expect("create");

    let listed = registry.list();
    let ids: Vec<&str> = listed.iter().map(|snapshot| snapshot.id.as_str()).collect();

    assert_eq!(listed.len(), 2);
    assert!(ids.contains(&first.as_str()));
    assert!(ids.contains(&second.as_str()));
    assert!(listed
        .iter()
        .all(|snapshot| snapshot.state == SessionState::Active && !snapshot.exited));
    assert!(listed.iter().any(|snapshot| snapshot.command == "sleep 30"));

    registry.close_all();
    assert!(registry.list().is_empty());
}
