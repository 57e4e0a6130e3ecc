//! Command gateway tests, run against `sh`

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::Span;

use farmctl::errors::CommandError;
use farmctl::gateway::{CommandGateway, Options};

fn shell_gateway(max_concurrent: usize) -> CommandGateway {
    CommandGateway::new(
        Options {
            tool: "sh".to_string(),
            max_concurrent,
            ..Default::default()
        },
        Span::none(),
    )
}

#[tokio::test]
async fn test_returns_stdout() {
    let gateway = shell_gateway(1);
    let out = gateway.execute_default(["-c", "echo hello"]).await.unwrap();
    assert_eq!(out, "hello\n");
}

#[tokio::test]
async fn test_never_exceeds_concurrency_limit() {
    let gateway = Arc::new(shell_gateway(2));

    let calls = (0..6).map(|_| {
        let gateway = gateway.clone();
        async move { gateway.execute(["-c", "sleep 0.2"], Duration::from_secs(5)).await }
    });
    let results = join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(gateway.peak_in_flight(), 2);
    assert_eq!(gateway.in_flight(), 0);
}

#[tokio::test]
async fn test_waiting_calls_are_admitted_in_arrival_order() {
    let gateway = Arc::new(shell_gateway(1));
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("order.log");

    // Holds the only slot while the others line up behind it
    let holder = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.execute(["-c", "sleep 0.3"], Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut waiting = Vec::new();
    for i in 0..5 {
        let gateway = gateway.clone();
        let script = format!("echo {i} >> '{}'", log.display());
        waiting.push(tokio::spawn(async move {
            gateway.execute(["-c", script.as_str()], Duration::from_secs(5)).await
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    holder.await.unwrap().unwrap();
    for call in join_all(waiting).await {
        call.unwrap().unwrap();
    }

    let order: Vec<String> = std::fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(order, ["0", "1", "2", "3", "4"]);
    assert_eq!(gateway.peak_in_flight(), 1);
}

#[tokio::test]
async fn test_timeout_kills_process_and_frees_slot() {
    let gateway = shell_gateway(1);

    let started = Instant::now();
    let result = gateway.execute(["-c", "sleep 5"], Duration::from_millis(100)).await;
    assert!(matches!(result, Err(CommandError::Timeout { after }) if after == Duration::from_millis(100)));
    assert!(started.elapsed() < Duration::from_secs(3));

    // The single slot is free again
    let out = gateway.execute(["-c", "echo again"], Duration::from_secs(5)).await.unwrap();
    assert_eq!(out.trim(), "again");
}

#[tokio::test]
async fn test_nonzero_exit_carries_stderr() {
    let gateway = shell_gateway(1);
    let result = gateway.execute_default(["-c", "echo oops >&2; exit 3"]).await;
    match result {
        Err(CommandError::Exit { code, stderr }) => {
            assert_eq!(code, Some(3));
            assert_eq!(stderr, "oops");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_tool_is_spawn_error() {
    let gateway = CommandGateway::new(
        Options {
            tool: "/nonexistent/farm-tool".to_string(),
            ..Default::default()
        },
        Span::none(),
    );
    let result = gateway.execute_default(["devices"]).await;
    assert!(matches!(result, Err(CommandError::Spawn(_))));
    assert_eq!(gateway.in_flight(), 0);
}
