//! Isolated execution against the mock container runtime.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use enclave_executor::{ErrorKind, ExecError, LAUNCHER_FILE_NAME, MANAGED_LABEL, SandboxLimits};
use enclave_test::{
    ECHO_PLUGIN_SOURCE, MockBehavior, MockRuntime, mock_runner, setup_test_logging,
    staging_entries, test_dir, test_limits, test_params, write_artifact,
};

#[tokio::test]
async fn echo_returns_params_and_cleans_up() {
    setup_test_logging();
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Echo));
    let (runner, staging) = mock_runner(runtime.clone());
    let dir = test_dir();
    let artifact = write_artifact(&dir, "a1_echo.py", ECHO_PLUGIN_SOURCE);

    let value = runner
        .run(
            &artifact,
            "echo",
            &test_params(json!({"text": "hi"})),
            &test_limits(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(value, json!({"text": "hi"}));
    assert_eq!(runtime.created_count(), 1);
    assert_eq!(runtime.live_count(), 0);
    assert_eq!(staging_entries(&staging), 0);

    let requests = runtime.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "echo");
}

#[tokio::test]
async fn container_is_confined() {
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Echo));
    let (runner, _staging) = mock_runner(runtime.clone());
    let dir = test_dir();
    let artifact = write_artifact(&dir, "a1_echo.py", ECHO_PLUGIN_SOURCE);

    runner
        .run(
            &artifact,
            "echo",
            &test_params(json!({})),
            &test_limits(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let created = runtime.created();
    let container = &created[0];
    let spec = &container.spec;
    assert!(spec.limits.network.is_disabled());
    assert_eq!(spec.limits.memory_bytes, 256 * 1024 * 1024);
    assert_eq!(spec.mounts.len(), 1);
    assert!(spec.mounts[0].read_only);
    assert!(spec.labels.iter().any(|(k, v)| k == MANAGED_LABEL && v == "true"));
    assert_eq!(
        container.staged_files,
        vec![LAUNCHER_FILE_NAME.to_string(), "plugin.py".to_string()]
    );
    assert!(spec.command.iter().any(|a| a.ends_with("/plugin.py")));
}

#[tokio::test]
async fn plugin_error_message_is_preserved() {
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Raise("bad input".into())));
    let (runner, _staging) = mock_runner(runtime.clone());
    let dir = test_dir();
    let artifact = write_artifact(&dir, "raise.py", "");

    let err = runner
        .run(
            &artifact,
            "run",
            &test_params(json!({})),
            &test_limits(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::PluginRaised(ref m) if m == "bad input"));
    assert_eq!(runtime.live_count(), 0);
}

#[tokio::test]
async fn hanging_plugin_times_out_and_is_torn_down() {
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Hang));
    let (runner, staging) = mock_runner(runtime.clone());
    let dir = test_dir();
    let artifact = write_artifact(&dir, "spin.py", "");
    let limits = SandboxLimits::default().with_timeout(Duration::from_millis(100));

    let started = std::time::Instant::now();
    let err = runner
        .run(
            &artifact,
            "spin",
            &test_params(json!({})),
            &limits,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::PluginTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(runtime.created_count(), 1);
    assert_eq!(runtime.removed_count(), 1);
    assert_eq!(staging_entries(&staging), 0);
}

#[tokio::test]
async fn cancellation_stops_and_tears_down() {
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Hang));
    let (runner, staging) = mock_runner(runtime.clone());
    let dir = test_dir();
    let artifact = write_artifact(&dir, "spin.py", "");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = runner
        .run(
            &artifact,
            "spin",
            &test_params(json!({})),
            &test_limits(),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::Cancelled));
    assert_eq!(err.kind(), ErrorKind::PluginTimeout);
    assert_eq!(runtime.live_count(), 0);
    assert_eq!(staging_entries(&staging), 0);
}

#[tokio::test]
async fn deadline_covers_container_creation() {
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Echo).with_stalled_create());
    let (runner, staging) = mock_runner(runtime.clone());
    let dir = test_dir();
    let artifact = write_artifact(&dir, "a1_echo.py", ECHO_PLUGIN_SOURCE);
    let limits = SandboxLimits::default().with_timeout(Duration::from_millis(100));

    let started = std::time::Instant::now();
    let err = runner
        .run(
            &artifact,
            "echo",
            &test_params(json!({})),
            &limits,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::PluginTimeout { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(runtime.created_count(), 0);
    assert_eq!(staging_entries(&staging), 0);
}

#[tokio::test]
async fn cancellation_covers_container_creation() {
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Echo).with_stalled_create());
    let (runner, staging) = mock_runner(runtime.clone());
    let dir = test_dir();
    let artifact = write_artifact(&dir, "a1_echo.py", ECHO_PLUGIN_SOURCE);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = runner
        .run(
            &artifact,
            "echo",
            &test_params(json!({})),
            &test_limits(),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::Cancelled), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(staging_entries(&staging), 0);
}

#[tokio::test]
async fn cancelled_before_start_stages_nothing() {
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Echo));
    let (runner, staging) = mock_runner(runtime.clone());
    let dir = test_dir();
    let artifact = write_artifact(&dir, "a1_echo.py", ECHO_PLUGIN_SOURCE);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = runner
        .run(
            &artifact,
            "echo",
            &test_params(json!({})),
            &test_limits(),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::Cancelled));
    assert_eq!(runtime.created_count(), 0);
    assert_eq!(staging_entries(&staging), 0);
}

#[tokio::test]
async fn flood_is_rejected_without_buffering() {
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Flood(10 * 1024 * 1024)));
    let (runner, _staging) = mock_runner(runtime.clone());
    let dir = test_dir();
    let artifact = write_artifact(&dir, "flood.py", "");
    let limits = test_limits().with_max_output_bytes(1024);

    let err = runner
        .run(
            &artifact,
            "flood",
            &test_params(json!({})),
            &limits,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecError::PayloadTooLarge {
            size: 1025,
            limit: 1024
        }
    ));
    assert_eq!(runtime.log_caps(), vec![1025]);
    assert_eq!(runtime.live_count(), 0);
}

#[tokio::test]
async fn crash_without_envelope() {
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Crash {
        exit_code: 1,
        output: "Traceback (most recent call last):\nImportError: no module\n".into(),
    }));
    let (runner, _staging) = mock_runner(runtime.clone());
    let dir = test_dir();
    let artifact = write_artifact(&dir, "broken.py", "");

    let err = runner
        .run(
            &artifact,
            "go",
            &test_params(json!({})),
            &test_limits(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PluginCrashed);
    assert!(err.to_string().contains("ImportError"));
}

#[tokio::test]
async fn clean_exit_with_garbage_is_malformed() {
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Malformed(
        "{\"status\": \"success\", \"result\": ".into(),
    )));
    let (runner, _staging) = mock_runner(runtime.clone());
    let dir = test_dir();
    let artifact = write_artifact(&dir, "half.py", "");

    let err = runner
        .run(
            &artifact,
            "go",
            &test_params(json!({})),
            &test_limits(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedOutput);
}

#[tokio::test]
async fn missing_artifact_never_creates_a_container() {
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Echo));
    let (runner, staging) = mock_runner(runtime.clone());
    let dir = test_dir();

    let err = runner
        .run(
            &dir.path().join("gone.py"),
            "echo",
            &test_params(json!({})),
            &test_limits(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ArtifactNotFound);
    assert_eq!(runtime.created_count(), 0);
    assert_eq!(staging_entries(&staging), 0);
}

#[tokio::test]
async fn zero_deadline_is_refused_up_front() {
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Echo));
    let (runner, _staging) = mock_runner(runtime.clone());
    let dir = test_dir();
    let artifact = write_artifact(&dir, "a.py", "");

    let err = runner
        .run(
            &artifact,
            "echo",
            &test_params(json!({})),
            &test_limits().with_timeout(Duration::ZERO),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::InvalidLimits(_)));
    assert_eq!(runtime.created_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_are_independent() {
    let runtime =
        Arc::new(MockRuntime::new(MockBehavior::Echo).with_latency(Duration::from_millis(50)));
    let (runner, staging) = mock_runner(runtime.clone());
    let runner = Arc::new(runner);
    let dir = test_dir();
    let artifact = write_artifact(&dir, "echo.py", ECHO_PLUGIN_SOURCE);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let runner = Arc::clone(&runner);
            let artifact = artifact.clone();
            tokio::spawn(async move {
                runner
                    .run(
                        &artifact,
                        "echo",
                        &test_params(json!({"n": i})),
                        &test_limits(),
                        &CancellationToken::new(),
                    )
                    .await
            })
        })
        .collect();

    let results = futures::future::join_all(tasks).await;
    for (i, joined) in results.into_iter().enumerate() {
        let value = joined.unwrap().unwrap();
        assert_eq!(value, json!({"n": i}));
    }

    assert_eq!(runtime.created_count(), 16);
    assert_eq!(runtime.live_count(), 0);
    assert!(runtime.peak_live() > 1);
    assert_eq!(staging_entries(&staging), 0);

    let mut names: Vec<String> = runtime.created().into_iter().map(|c| c.spec.name).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 16);
}

#[tokio::test]
async fn dropped_run_still_removes_container() {
    let runtime = Arc::new(MockRuntime::new(MockBehavior::Hang));
    let (runner, _staging) = mock_runner(runtime.clone());
    let runner = Arc::new(runner);
    let dir = test_dir();
    let artifact = write_artifact(&dir, "spin.py", "");

    let task = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move {
            runner
                .run(
                    &artifact,
                    "spin",
                    &test_params(json!({})),
                    &test_limits(),
                    &CancellationToken::new(),
                )
                .await
        })
    };

    // Let it reach the wait, then abandon it.
    while runtime.created_count() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    task.abort();
    let _ = task.await;

    for _ in 0..100 {
        if runtime.live_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(runtime.live_count(), 0);
}
