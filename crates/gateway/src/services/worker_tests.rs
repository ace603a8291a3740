// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;

fn test_worker(bootloader: &str, main_path: &str, auto_restart: bool) -> std::sync::Arc<Worker> {
    Worker::new(WorkerOptions {
        id: "alpha".to_owned(),
        main_path: main_path.into(),
        cwd: "/tmp".into(),
        env: HashMap::from([("PATH".to_owned(), "/usr/bin:/bin".to_owned())]),
        bootloader: bootloader.into(),
        auto_restart,
        cancel: CancellationToken::new(),
    })
}

// ── crash back-off ────────────────────────────────────────────────────────

#[test]
fn backoff_doubles_and_saturates() {
    assert_eq!(crash_backoff(0), Duration::from_secs(1));
    assert_eq!(crash_backoff(1), Duration::from_secs(2));
    assert_eq!(crash_backoff(2), Duration::from_secs(4));
    assert_eq!(crash_backoff(3), Duration::from_secs(8));
    assert_eq!(crash_backoff(4), Duration::from_secs(16));
    assert_eq!(crash_backoff(5), Duration::from_secs(30));
    assert_eq!(crash_backoff(6), Duration::from_secs(30));
    assert_eq!(crash_backoff(u32::MAX), Duration::from_secs(30));
}

// ── colour selection ──────────────────────────────────────────────────────

#[test]
fn color_is_deterministic() {
    assert_eq!(color_for("users"), color_for("users"));
    assert!(color_for("users").starts_with("\x1b["));
}

// ── lifecycle ─────────────────────────────────────────────────────────────

async fn wait_for_state(worker: &Worker, wanted: WorkerState, limit: Duration) -> WorkerState {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let state = worker.state().await;
        if state == wanted || tokio::time::Instant::now() >= deadline {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn clean_exit_returns_to_idle() -> anyhow::Result<()> {
    let worker = test_worker("/bin/echo", "hello", false);
    worker.start().await?;
    let state = wait_for_state(&worker, WorkerState::Idle, Duration::from_secs(5)).await;
    assert_eq!(state, WorkerState::Idle);
    assert_eq!(worker.crash_count().await, 0);
    assert_eq!(worker.pid().await, None);
    Ok(())
}

#[tokio::test]
async fn failing_child_is_marked_crashed_without_auto_restart() -> anyhow::Result<()> {
    let worker = test_worker("/bin/false", "unused", false);
    worker.start().await?;
    let state = wait_for_state(&worker, WorkerState::Crashed, Duration::from_secs(5)).await;
    assert_eq!(state, WorkerState::Crashed);
    Ok(())
}

#[tokio::test]
async fn missing_bootloader_fails_spawn() {
    let worker = test_worker("/nonexistent/bootloader", "main.js", false);
    assert!(worker.start().await.is_err());
    assert_eq!(worker.state().await, WorkerState::Idle);
}

#[tokio::test]
async fn stop_interrupts_a_running_child() -> anyhow::Result<()> {
    let worker = test_worker("/bin/sleep", "30", true);
    worker.start().await?;
    assert_eq!(worker.state().await, WorkerState::Running);
    assert!(worker.pid().await.is_some());

    worker.stop().await;
    let state = wait_for_state(&worker, WorkerState::Idle, Duration::from_secs(5)).await;
    assert_eq!(state, WorkerState::Idle);
    // Intentional stop never schedules a restart.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(worker.state().await, WorkerState::Idle);
    Ok(())
}

#[tokio::test]
async fn restart_respawns_the_child() -> anyhow::Result<()> {
    let worker = test_worker("/bin/sleep", "30", false);
    worker.start().await?;
    let first_pid = worker.pid().await;
    assert!(first_pid.is_some());

    worker.restart().await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let pid = worker.pid().await;
        if (pid.is_some() && pid != first_pid) || tokio::time::Instant::now() >= deadline {
            assert!(pid.is_some() && pid != first_pid, "expected a new child pid");
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(worker.state().await, WorkerState::Running);
    assert_eq!(worker.crash_count().await, 0);
    worker.stop().await;
    Ok(())
}

#[tokio::test]
async fn start_is_idempotent_while_running() -> anyhow::Result<()> {
    let worker = test_worker("/bin/sleep", "30", false);
    worker.start().await?;
    let pid = worker.pid().await;
    worker.start().await?;
    assert_eq!(worker.pid().await, pid);
    worker.stop().await;
    Ok(())
}

#[tokio::test]
async fn listen_socket_opens_a_client_pool_once() -> anyhow::Result<()> {
    let worker = test_worker("/bin/echo", "hi", false);
    assert!(worker.socket_client().await.is_none());

    worker.set_listen_socket("/tmp/alpha.sock".into()).await;
    let first = worker.socket_client().await;
    assert!(first.is_some());
    assert_eq!(worker.listen_socket().await, Some("/tmp/alpha.sock".into()));

    // Re-registering the same socket keeps the existing pool.
    worker.set_listen_socket("/tmp/alpha.sock".into()).await;
    let second = worker.socket_client().await;
    match (first, second) {
        (Some(a), Some(b)) => assert!(std::sync::Arc::ptr_eq(&a, &b)),
        _ => anyhow::bail!("expected client pools"),
    }
    Ok(())
}
