//! In-memory container runtime for testing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use enclave_executor::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ExecError, ExecResult, WireCodec,
    WireRequest, WireResponse,
};

/// What a mock container "prints" and how it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockReply {
    /// Exit code reported by `wait`.
    pub exit_code: i64,
    /// Captured output returned by `logs`.
    pub output: Vec<u8>,
}

impl MockReply {
    /// A clean exit with a response envelope, preceded by some chatter.
    #[must_use]
    pub fn envelope(response: &WireResponse) -> Self {
        let mut output = b"plugin: starting\n".to_vec();
        let line = WireCodec::default()
            .encode_response(response)
            .unwrap_or_default();
        output.extend_from_slice(&line);
        output.push(b'\n');
        Self {
            exit_code: 0,
            output,
        }
    }
}

/// Scripted responder for [`MockBehavior::Respond`].
pub type Responder = Arc<dyn Fn(&WireRequest) -> MockReply + Send + Sync>;

/// How every container created by a [`MockRuntime`] behaves.
#[derive(Clone)]
pub enum MockBehavior {
    /// Return the request parameters as the result.
    Echo,
    /// Report a plugin error with this message.
    Raise(String),
    /// Exit non-zero with this output.
    Crash {
        /// Exit code.
        exit_code: i64,
        /// Captured output.
        output: String,
    },
    /// Never exit.
    Hang,
    /// Write this many bytes of output.
    Flood(usize),
    /// Exit cleanly with this non-envelope output.
    Malformed(String),
    /// Compute the reply from the request.
    Respond(Responder),
}

impl std::fmt::Debug for MockBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Echo => f.write_str("Echo"),
            Self::Raise(m) => f.debug_tuple("Raise").field(m).finish(),
            Self::Crash { exit_code, .. } => {
                f.debug_struct("Crash").field("exit_code", exit_code).finish()
            },
            Self::Hang => f.write_str("Hang"),
            Self::Flood(n) => f.debug_tuple("Flood").field(n).finish(),
            Self::Malformed(m) => f.debug_tuple("Malformed").field(m).finish(),
            Self::Respond(_) => f.write_str("Respond(..)"),
        }
    }
}

/// A container as observed at creation time.
#[derive(Debug, Clone)]
pub struct CreatedContainer {
    /// Assigned handle.
    pub handle: ContainerHandle,
    /// The requested spec.
    pub spec: ContainerSpec,
    /// File names present in the first mount when the container was created.
    pub staged_files: Vec<String>,
}

#[derive(Debug, Default)]
struct ContainerState {
    request: Option<WireRequest>,
    removed: bool,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    containers: HashMap<ContainerHandle, ContainerState>,
    created: Vec<CreatedContainer>,
    removed: Vec<ContainerHandle>,
    log_caps: Vec<usize>,
    live: usize,
    peak_live: usize,
}

/// Mock [`ContainerRuntime`] with scripted behavior and full bookkeeping.
#[derive(Debug)]
pub struct MockRuntime {
    behavior: MockBehavior,
    latency: Duration,
    stall_create: bool,
    state: Mutex<State>,
}

impl MockRuntime {
    /// Create a runtime where every container behaves as `behavior`.
    #[must_use]
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            latency: Duration::ZERO,
            stall_create: false,
            state: Mutex::new(State::default()),
        }
    }

    /// Delay every `wait` by `latency` before the container "exits".
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Never finish `create`, like a daemon stuck pulling an image.
    #[must_use]
    pub fn with_stalled_create(mut self) -> Self {
        self.stall_create = true;
        self
    }

    /// Every container created so far.
    #[must_use]
    pub fn created(&self) -> Vec<CreatedContainer> {
        self.state().created.clone()
    }

    /// Number of containers created.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.state().created.len()
    }

    /// Number of containers removed.
    #[must_use]
    pub fn removed_count(&self) -> usize {
        self.state().removed.len()
    }

    /// Containers created but not yet removed.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.state().live
    }

    /// Highest number of simultaneously live containers.
    #[must_use]
    pub fn peak_live(&self) -> usize {
        self.state().peak_live
    }

    /// The `max_bytes` passed to each `logs` call.
    #[must_use]
    pub fn log_caps(&self) -> Vec<usize> {
        self.state().log_caps.clone()
    }

    /// Requests received on stdin, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<WireRequest> {
        let state = self.state();
        state
            .created
            .iter()
            .filter_map(|c| state.containers.get(&c.handle))
            .filter_map(|c| c.request.clone())
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_for(&self, handle: &ContainerHandle) -> ExecResult<WireRequest> {
        let state = self.state();
        let container = state
            .containers
            .get(handle)
            .filter(|c| !c.removed)
            .ok_or_else(|| ExecError::Runtime(format!("no such container: {handle}")))?;
        container
            .request
            .clone()
            .ok_or_else(|| ExecError::Runtime(format!("container {handle} was never started")))
    }

    fn reply(&self, request: &WireRequest) -> MockReply {
        match &self.behavior {
            MockBehavior::Echo => MockReply::envelope(&WireResponse::Success {
                result: Value::Object(request.params.clone()),
            }),
            MockBehavior::Raise(message) => MockReply::envelope(&WireResponse::Error {
                error: message.clone(),
            }),
            MockBehavior::Crash { exit_code, output } => MockReply {
                exit_code: *exit_code,
                output: output.clone().into_bytes(),
            },
            MockBehavior::Malformed(output) => MockReply {
                exit_code: 0,
                output: output.clone().into_bytes(),
            },
            // Flood output is produced lazily in `logs`; Hang never gets here.
            MockBehavior::Flood(_) | MockBehavior::Hang => MockReply {
                exit_code: 0,
                output: Vec::new(),
            },
            MockBehavior::Respond(responder) => responder(request),
        }
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create(&self, spec: &ContainerSpec) -> ExecResult<ContainerHandle> {
        if self.stall_create {
            std::future::pending::<()>().await;
        }
        let staged_files = spec
            .mounts
            .first()
            .and_then(|m| std::fs::read_dir(&m.host_path).ok())
            .map(|entries| {
                let mut names: Vec<String> = entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                names
            })
            .unwrap_or_default();

        let mut state = self.state();
        state.next_id = state.next_id.saturating_add(1);
        let handle = ContainerHandle::new(format!("mock-{}", state.next_id));
        state
            .containers
            .insert(handle.clone(), ContainerState::default());
        state.created.push(CreatedContainer {
            handle: handle.clone(),
            spec: spec.clone(),
            staged_files,
        });
        state.live = state.live.saturating_add(1);
        state.peak_live = state.peak_live.max(state.live);
        Ok(handle)
    }

    async fn attach_stdin(&self, handle: &ContainerHandle, input: &[u8]) -> ExecResult<()> {
        let request = WireCodec::default().decode_request(input)?;
        let mut state = self.state();
        let container = state
            .containers
            .get_mut(handle)
            .filter(|c| !c.removed)
            .ok_or_else(|| ExecError::Runtime(format!("no such container: {handle}")))?;
        if container.request.is_some() {
            return Err(ExecError::Runtime(format!(
                "stdin of {handle} already attached"
            )));
        }
        container.request = Some(request);
        Ok(())
    }

    async fn wait(&self, handle: &ContainerHandle) -> ExecResult<i64> {
        let request = self.request_for(handle)?;
        if matches!(self.behavior, MockBehavior::Hang) {
            std::future::pending::<()>().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.reply(&request).exit_code)
    }

    async fn logs(&self, handle: &ContainerHandle, max_bytes: usize) -> ExecResult<Vec<u8>> {
        self.state().log_caps.push(max_bytes);
        let request = self.request_for(handle)?;
        let mut output = match self.behavior {
            MockBehavior::Flood(bytes) => vec![b'x'; bytes.min(max_bytes)],
            _ => self.reply(&request).output,
        };
        output.truncate(max_bytes);
        Ok(output)
    }

    async fn remove(&self, handle: &ContainerHandle) -> ExecResult<()> {
        let mut state = self.state();
        let newly_removed = match state.containers.get_mut(handle) {
            Some(c) if !c.removed => {
                c.removed = true;
                true
            },
            _ => false,
        };
        if newly_removed {
            state.removed.push(handle.clone());
            state.live = state.live.saturating_sub(1);
        }
        Ok(())
    }
}
