//! End-to-end lifecycle scenarios over a mock container runtime.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use enclave_core::{Caller, ExecutionStatus, PluginId, PluginState};
use enclave_executor::{ErrorKind, ExecutionResult, Executor, PluginLoader, TrustedCatalog};
use enclave_registry::{
    FsArtifactStore, MemoryPluginStore, PluginRegistry, RegistryError, UploadRequest,
};
use enclave_test::{
    ECHO_PLUGIN_SOURCE, MockBehavior, MockRuntime, RAISING_PLUGIN_SOURCE, mock_runner,
    setup_test_logging, test_admin, test_dir, test_limits, test_params, test_user,
};

struct Fixture {
    registry: PluginRegistry,
    runtime: Arc<MockRuntime>,
    artifacts: TempDir,
    _staging: TempDir,
    _trusted: TempDir,
}

fn fixture(behavior: MockBehavior) -> Fixture {
    setup_test_logging();
    let runtime = Arc::new(MockRuntime::new(behavior));
    let (runner, staging) = mock_runner(Arc::clone(&runtime));
    let trusted = test_dir();
    let loader = PluginLoader::new(trusted.path(), TrustedCatalog::new());
    let executor = Executor::new(runner, loader, test_limits()).unwrap();

    let artifacts = test_dir();
    let registry = PluginRegistry::new(
        Arc::new(MemoryPluginStore::new()),
        Arc::new(FsArtifactStore::new(artifacts.path()).with_max_bytes(1024)),
        Arc::new(executor),
    );
    Fixture {
        registry,
        runtime,
        artifacts,
        _staging: staging,
        _trusted: trusted,
    }
}

fn echo_upload(name: &str) -> UploadRequest {
    UploadRequest {
        name: name.to_string(),
        description: "echoes its arguments".to_string(),
        version: "1.0.0".to_string(),
        repository_url: None,
        file_name: "echo.py".to_string(),
        content: ECHO_PLUGIN_SOURCE.as_bytes().to_vec(),
    }
}

async fn run(registry: &PluginRegistry, caller: &Caller, id: PluginId) -> ExecutionResult {
    registry
        .execute(caller, id, "echo", test_params(json!({"x": 1})), &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn plugin_runs_only_once_approved_and_active() {
    let fx = fixture(MockBehavior::Echo);
    let author = test_user();
    let admin = test_admin();

    let plugin = fx.registry.upload(&author, echo_upload("echo")).await.unwrap();
    assert_eq!(plugin.state(), PluginState::Uploaded);
    assert_eq!(plugin.author_id, author.user_id);

    let result = run(&fx.registry, &author, plugin.id).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::LifecycleViolation));
    assert_eq!(fx.runtime.created_count(), 0);

    fx.registry.approve(&admin, plugin.id).await.unwrap();
    let result = run(&fx.registry, &author, plugin.id).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::LifecycleViolation));
    assert_eq!(fx.runtime.created_count(), 0);

    let active = fx.registry.activate(&admin, plugin.id).await.unwrap();
    assert!(active.is_executable());
    let result = run(&fx.registry, &author, plugin.id).await;
    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.result(), Some(&json!({"x": 1})));
    assert_eq!(fx.runtime.created_count(), 1);
    assert_eq!(fx.runtime.live_count(), 0);
}

#[tokio::test]
async fn every_attempt_is_logged() {
    let fx = fixture(MockBehavior::Echo);
    let author = test_user();
    let admin = test_admin();
    let plugin = fx.registry.upload(&author, echo_upload("echo")).await.unwrap();

    run(&fx.registry, &author, plugin.id).await;
    fx.registry.approve(&admin, plugin.id).await.unwrap();
    fx.registry.activate(&admin, plugin.id).await.unwrap();
    run(&fx.registry, &author, plugin.id).await;

    let logs = fx.registry.executions(plugin.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].status, ExecutionStatus::Error);
    assert_eq!(logs[1].status, ExecutionStatus::Success);
    assert_eq!(logs[1].method, "echo");
    assert_eq!(logs[1].user_id, author.user_id);
    assert_eq!(logs[1].input, r#"{"x":1}"#);
    assert!(logs.iter().all(|l| l.tool_id.is_none()));
}

#[tokio::test]
async fn plugin_errors_are_results_not_failures() {
    let fx = fixture(MockBehavior::Raise("bad input".into()));
    let admin = test_admin();
    let mut request = echo_upload("raiser");
    request.file_name = "raiser.py".into();
    request.content = RAISING_PLUGIN_SOURCE.as_bytes().to_vec();
    let plugin = fx.registry.upload(&admin, request).await.unwrap();
    fx.registry.approve(&admin, plugin.id).await.unwrap();
    fx.registry.activate(&admin, plugin.id).await.unwrap();

    let result = fx
        .registry
        .execute(&admin, plugin.id, "run", test_params(json!({})), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.error_kind(), Some(ErrorKind::PluginRaised));
    assert_eq!(result.error_message(), Some("bad input"));
    assert_eq!(fx.runtime.removed_count(), 1);
}

#[tokio::test]
async fn only_admins_approve_and_activate() {
    let fx = fixture(MockBehavior::Echo);
    let author = test_user();
    let plugin = fx.registry.upload(&author, echo_upload("echo")).await.unwrap();

    let err = fx.registry.approve(&author, plugin.id).await.unwrap_err();
    assert!(matches!(err, RegistryError::Forbidden(_)));
    let err = fx.registry.activate(&author, plugin.id).await.unwrap_err();
    assert!(matches!(err, RegistryError::Forbidden(_)));

    let stored = fx.registry.get_plugin(plugin.id).await.unwrap();
    assert_eq!(stored.state(), PluginState::Uploaded);
}

#[tokio::test]
async fn activation_requires_approval() {
    let fx = fixture(MockBehavior::Echo);
    let admin = test_admin();
    let plugin = fx.registry.upload(&admin, echo_upload("echo")).await.unwrap();

    let err = fx.registry.activate(&admin, plugin.id).await.unwrap_err();
    assert!(matches!(err, RegistryError::Lifecycle(_)), "{err:?}");
    assert_eq!(
        fx.registry.get_plugin(plugin.id).await.unwrap().state(),
        PluginState::Uploaded
    );

    // Repeated transitions are no-ops.
    fx.registry.approve(&admin, plugin.id).await.unwrap();
    fx.registry.approve(&admin, plugin.id).await.unwrap();
    fx.registry.activate(&admin, plugin.id).await.unwrap();
    let again = fx.registry.activate(&admin, plugin.id).await.unwrap();
    assert_eq!(again.state(), PluginState::Active);
}

#[tokio::test]
async fn names_are_unique() {
    let fx = fixture(MockBehavior::Echo);
    let author = test_user();
    fx.registry.upload(&author, echo_upload("echo")).await.unwrap();

    let err = fx.registry.upload(&test_user(), echo_upload("echo")).await.unwrap_err();
    assert!(matches!(err, RegistryError::PluginNameTaken(ref n) if n == "echo"));
    assert_eq!(std::fs::read_dir(fx.artifacts.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn uploads_are_validated() {
    let fx = fixture(MockBehavior::Echo);
    let author = test_user();

    let mut request = echo_upload("shell");
    request.file_name = "run.sh".into();
    let err = fx.registry.upload(&author, request).await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidUpload(_)));

    let mut request = echo_upload("huge");
    request.content = vec![b'#'; 2048];
    let err = fx.registry.upload(&author, request).await.unwrap_err();
    assert!(matches!(err, RegistryError::ArtifactTooLarge { size: 2048, limit: 1024 }));

    let mut request = echo_upload("");
    request.name = "  ".into();
    let err = fx.registry.upload(&author, request).await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidUpload(_)));

    assert!(fx.registry.list_plugins(0, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_cascades_to_tools_and_artifact() {
    let fx = fixture(MockBehavior::Echo);
    let author = test_user();
    let admin = test_admin();
    let plugin = fx.registry.upload(&author, echo_upload("echo")).await.unwrap();
    let tool = fx
        .registry
        .register_tool(&admin, plugin.id, "echo-tool", "echo as a tool", "utility")
        .await
        .unwrap();
    assert!(plugin.artifact_path.exists());

    fx.registry.delete(&author, plugin.id).await.unwrap();

    assert!(!plugin.artifact_path.exists());
    assert!(matches!(
        fx.registry.get_tool(tool.id).await.unwrap_err(),
        RegistryError::ToolNotFound(_)
    ));
    let err = fx
        .registry
        .execute(&author, plugin.id, "echo", test_params(json!({})), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::PluginNotFound(id) if id == plugin.id));
}

#[tokio::test]
async fn only_author_or_admin_deletes() {
    let fx = fixture(MockBehavior::Echo);
    let author = test_user();
    let plugin = fx.registry.upload(&author, echo_upload("echo")).await.unwrap();

    let err = fx.registry.delete(&test_user(), plugin.id).await.unwrap_err();
    assert!(matches!(err, RegistryError::Forbidden(_)));
    assert!(plugin.artifact_path.exists());

    fx.registry.delete(&test_admin(), plugin.id).await.unwrap();
    assert!(matches!(
        fx.registry.delete(&author, plugin.id).await.unwrap_err(),
        RegistryError::PluginNotFound(_)
    ));
}

#[tokio::test]
async fn core_tools_cannot_be_deleted_or_executed() {
    let fx = fixture(MockBehavior::Echo);
    let admin = test_admin();
    let core = fx
        .registry
        .register_core_tool("search", "built-in search", "core")
        .await
        .unwrap();

    let err = fx.registry.delete_tool(&admin, core.id).await.unwrap_err();
    assert!(matches!(err, RegistryError::CoreToolProtected(_)));

    let err = fx
        .registry
        .execute_tool(&admin, core.id, "echo", test_params(json!({})), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotPluginBacked(_)));
    assert_eq!(fx.registry.list_tools(0, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn tools_route_through_the_lifecycle_gate() {
    let fx = fixture(MockBehavior::Echo);
    let admin = test_admin();
    let plugin = fx.registry.upload(&admin, echo_upload("echo")).await.unwrap();
    let tool = fx
        .registry
        .register_tool(&admin, plugin.id, "echo-tool", "echo as a tool", "utility")
        .await
        .unwrap();

    let params = || test_params(json!({"word": "hi"}));
    let cancel = CancellationToken::new();
    let result = fx
        .registry
        .execute_tool(&admin, tool.id, "echo", params(), &cancel)
        .await
        .unwrap();
    assert_eq!(result.error_kind(), Some(ErrorKind::LifecycleViolation));

    fx.registry.approve(&admin, plugin.id).await.unwrap();
    fx.registry.activate(&admin, plugin.id).await.unwrap();
    let result = fx
        .registry
        .execute_tool(&admin, tool.id, "echo", params(), &cancel)
        .await
        .unwrap();
    assert_eq!(result.result(), Some(&json!({"word": "hi"})));

    let logs = fx.registry.executions(plugin.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l.tool_id == Some(tool.id)));

    let err = fx.registry.delete_tool(&test_user(), tool.id).await.unwrap_err();
    assert!(matches!(err, RegistryError::Forbidden(_)));
    fx.registry.delete_tool(&admin, tool.id).await.unwrap();
    assert!(fx.registry.get_plugin(plugin.id).await.is_ok());
}
