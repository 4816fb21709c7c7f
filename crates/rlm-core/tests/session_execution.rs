//! Integration tests for process-isolated snippet execution.
//!
//! These run real Python workers. When no interpreter can be found each test
//! prints a note and returns early.

use std::time::{Duration, Instant};

use rlm_core::ipc::find_interpreter;
use rlm_core::session::CONTEXT_KEY;
use rlm_core::{EngineConfig, FailureKind, Namespace, SessionRegistry, Value};

fn have_python() -> bool {
    let found = find_interpreter(None).is_ok();
    if !found {
        eprintln!("skipping: no python interpreter");
    }
    found
}

fn seed(content: &str) -> Namespace {
    let mut seed = Namespace::new();
    seed.insert(CONTEXT_KEY.to_string(), Value::from(content));
    seed
}

fn config() -> EngineConfig {
    let mut config = EngineConfig::default().with_timeout(Duration::from_secs(5));
    config.terminate_grace = Duration::from_millis(500);
    config.kill_grace = Duration::from_millis(500);
    config
}

/// A binding made in one call is visible in the next.
#[tokio::test]
async fn test_variables_persist_between_calls() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config());
    registry.get_or_create("s", Some(seed("ERROR a\nINFO b\nERROR c\n"))).await;

    let first = registry
        .execute("s", "errors = [l for l in context.splitlines() if l.startswith('ERROR')]\nx = 42")
        .await;
    assert!(first.success, "first run failed: {:?}", first.error);
    assert_eq!(first.output, "");

    let second = registry.execute("s", "print(x, len(errors))").await;
    assert!(second.success, "second run failed: {:?}", second.error);
    assert_eq!(second.output, "42 2\n");

    assert_eq!(registry.variable("s", "x").await.unwrap(), Some(Value::Int(42)));
    assert_eq!(
        registry.variable("s", "errors").await.unwrap(),
        Some(Value::List(vec![Value::from("ERROR a"), Value::from("ERROR c")]))
    );
}

/// The quota admits exactly N runs and refuses the next without side effects.
#[tokio::test]
async fn test_execution_quota() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config().with_max_executions(3));

    for i in 0..3 {
        let result = registry.execute("s", &format!("n = {i}")).await;
        assert!(result.success, "run {i} failed: {:?}", result.error);
    }
    assert_eq!(registry.info("s").await.unwrap().execution_count, 3);

    let refused = registry.execute("s", "n = 99").await;
    assert!(!refused.success);
    assert_eq!(refused.failure, Some(FailureKind::QuotaExceeded));
    assert!(refused.error.unwrap().contains("STOP"));

    let info = registry.info("s").await.unwrap();
    assert_eq!(info.execution_count, 3);
    assert_eq!(info.remaining, 0);
    assert_eq!(registry.variable("s", "n").await.unwrap(), Some(Value::Int(2)));
}

/// An infinite loop is killed at the deadline and nothing is merged.
#[tokio::test]
async fn test_timeout_kills_worker_and_keeps_namespace() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config().with_timeout(Duration::from_millis(750)));
    registry.get_or_create("s", Some(seed("data"))).await;
    assert!(registry.execute("s", "kept = 'before'").await.success);

    let before = registry.get("s").await.unwrap().lock().await.namespace().clone();

    let start = Instant::now();
    let result = registry
        .execute("s", "kept = 'after'\nleaked = 1\nwhile True:\n    pass")
        .await;
    let elapsed = start.elapsed();

    assert!(!result.success);
    assert!(result.is_timeout());
    assert!(result.error.unwrap().starts_with("TIMEOUT after 0.8s"));
    assert!(
        elapsed < Duration::from_secs(3),
        "timeout handling took too long ({:?})",
        elapsed
    );

    let after = registry.get("s").await.unwrap().lock().await.namespace().clone();
    assert_eq!(before, after);

    // The session is still usable.
    let next = registry.execute("s", "print(kept)").await;
    assert!(next.success);
    assert_eq!(next.output, "before\n");
}

/// A snippet that raises reports the error and merges nothing.
#[tokio::test]
async fn test_runtime_error_discards_partial_state() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config());

    let result = registry
        .execute("s", "partial = 1\nprint('reached')\nraise ValueError('bad input')")
        .await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::Runtime));
    assert_eq!(result.error.as_deref(), Some("ValueError: bad input"));
    assert_eq!(result.output, "reached\n");
    assert_eq!(registry.variable("s", "partial").await.unwrap(), None);

    let syntax = registry.execute("s", "def broken(:\n    pass").await;
    assert!(!syntax.success);
    assert!(syntax.error.unwrap().starts_with("SyntaxError"));
}

/// Oversized output is capped with a marker carrying the true length.
#[tokio::test]
async fn test_output_is_truncated() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config().with_max_output_chars(1_000));

    let result = registry.execute("s", "print('x' * 4999)").await;

    assert!(result.success);
    assert!(result.output.chars().count() <= 1_000);
    assert!(result.output.ends_with("[OUTPUT TRUNCATED - 5,000 chars total]"));
}

/// Snippet stderr follows stdout under a label.
#[tokio::test]
async fn test_stderr_is_labelled() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config());

    let result = registry
        .execute("s", "import sys\nprint('out')\nprint('warn', file=sys.stderr)")
        .await;

    assert!(result.success);
    assert_eq!(result.output, "out\n\n[stderr]\nwarn\n");
}

/// Untransferable results are dropped without failing the run.
#[tokio::test]
async fn test_untransferable_values_are_dropped() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config());

    let result = registry
        .execute(
            "s",
            "import os\nseen = {1, 2}\nhuge = 2 ** 80\nf = lambda: 1\npair = (1, 'a')\nnan = float('nan')",
        )
        .await;
    assert!(result.success, "run failed: {:?}", result.error);

    for name in ["os", "seen", "huge", "f", "nan"] {
        assert_eq!(registry.variable("s", name).await.unwrap(), None, "{name}");
    }
    assert_eq!(
        registry.variable("s", "pair").await.unwrap(),
        Some(Value::List(vec![Value::Int(1), Value::from("a")]))
    );
}

/// Values set directly on the session that cannot cross the boundary stay
/// behind, and the run still succeeds.
#[tokio::test]
async fn test_untransferable_session_values_stay_home() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config());
    let handle = registry.get_or_create("s", None).await;
    handle.lock().await.insert("ratio", Value::Float(f64::NAN));

    let result = registry.execute("s", "print('ratio' in globals())").await;
    assert!(result.success);
    assert_eq!(result.output, "False\n");
}

/// A worker that dies without reporting yields a no-result failure.
#[tokio::test]
async fn test_worker_crash_is_no_result() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config());

    let result = registry.execute("s", "import os\nos._exit(3)").await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::NoResult));
    assert_eq!(result.error.as_deref(), Some("No result from execution"));
    assert_eq!(registry.info("s").await.unwrap().execution_count, 1);
}

/// Loading new content discards everything but the new seed.
#[tokio::test]
async fn test_replace_discards_prior_variables() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config());
    registry.replace("s", seed("first file")).await.unwrap();
    assert!(registry.execute("s", "words = context.split()").await.success);

    registry.replace("s", seed("second")).await.unwrap();

    let result = registry.execute("s", "print(context, 'words' in globals())").await;
    assert!(result.success);
    assert_eq!(result.output, "second False\n");
    assert_eq!(registry.info("s").await.unwrap().execution_count, 1);
}

/// Calls for one session are serialized; other sessions are unaffected.
#[tokio::test]
async fn test_same_session_calls_are_serialized() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config());
    registry.get_or_create("s", None).await;
    assert!(registry.execute("s", "n = 0").await.success);

    let (a, b) = tokio::join!(
        registry.execute("s", "n = n + 1"),
        registry.execute("s", "n = n + 1"),
    );
    assert!(a.success && b.success);

    assert_eq!(registry.variable("s", "n").await.unwrap(), Some(Value::Int(2)));
    assert_eq!(registry.info("s").await.unwrap().execution_count, 3);
}

/// Whether `pid` names a live (non-zombie) process.
#[cfg(target_os = "linux")]
fn process_running(pid: i64) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // State is the first field after the parenthesized command name.
    let state = stat
        .rsplit_once(')')
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .unwrap_or("X");
    !matches!(state, "Z" | "X" | "x")
}

/// Processes forked by a successful snippet do not outlive the call.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_forked_children_die_with_the_worker() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config());

    let result = registry
        .execute(
            "s",
            "import subprocess, sys\n\
             p = subprocess.Popen([sys.executable, '-c', 'import time; time.sleep(30)'])\n\
             child = p.pid",
        )
        .await;
    assert!(result.success, "run failed: {:?}", result.error);

    let child = registry
        .variable("s", "child")
        .await
        .unwrap()
        .and_then(|v| v.as_i64())
        .expect("child pid recorded");

    let deadline = Instant::now() + Duration::from_secs(2);
    while process_running(child) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!process_running(child), "forked child {child} still running");
}

/// Raw writes to fd 1 cannot corrupt the result channel.
#[tokio::test]
async fn test_raw_stdout_writes_do_not_corrupt_results() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config());

    let result = registry
        .execute("s", "import os\nos.write(1, b'\\x00\\x00garbage\\n')\nprint('ok')\nx = 1")
        .await;

    assert!(result.success, "run failed: {:?}", result.error);
    assert_eq!(result.output, "ok\n");
    assert_eq!(registry.variable("s", "x").await.unwrap(), Some(Value::Int(1)));
}

/// Stdin is closed once the request is sent, so reading input fails fast.
#[tokio::test]
async fn test_reading_stdin_hits_eof() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config());

    let start = Instant::now();
    let result = registry.execute("s", "answer = input()").await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::Runtime));
    assert!(result.error.unwrap().starts_with("EOFError"));
    assert!(start.elapsed() < Duration::from_secs(4));
    assert_eq!(registry.variable("s", "answer").await.unwrap(), None);
}

/// `SystemExit` is a snippet failure, not a worker crash.
#[tokio::test]
async fn test_system_exit_is_a_runtime_failure() {
    if !have_python() {
        return;
    }
    let registry = SessionRegistry::new(config());

    let result = registry.execute("s", "z = 1\nraise SystemExit(2)").await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::Runtime));
    assert!(result.error.unwrap().starts_with("SystemExit"));
    assert_eq!(registry.variable("s", "z").await.unwrap(), None);
}
