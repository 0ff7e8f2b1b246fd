//! Scoped ownership of one container.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::ExecResult;
use crate::sandbox::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec};

/// Owns a created container until it is removed.
///
/// Call [`release`](Self::release) to remove it and observe the outcome. If
/// the guard is dropped first (early return, panic, or the owning future
/// being cancelled), removal is scheduled on the current Tokio runtime.
pub struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    handle: ContainerHandle,
    released: bool,
}

impl std::fmt::Debug for ContainerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerGuard")
            .field("handle", &self.handle)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl ContainerGuard {
    /// Create a container from `spec`.
    ///
    /// # Errors
    ///
    /// Propagates the runtime's creation error; nothing is left to clean up.
    pub async fn create(
        runtime: Arc<dyn ContainerRuntime>,
        spec: &ContainerSpec,
    ) -> ExecResult<Self> {
        let handle = runtime.create(spec).await?;
        Ok(Self {
            runtime,
            handle,
            released: false,
        })
    }

    /// The guarded container.
    #[must_use]
    pub fn handle(&self) -> &ContainerHandle {
        &self.handle
    }

    /// Forcibly remove the container.
    ///
    /// # Errors
    ///
    /// Propagates the runtime's removal error.
    pub async fn release(mut self) -> ExecResult<()> {
        // Dropped mid-removal, the guard must still schedule its own.
        let removed = self.runtime.remove(&self.handle).await;
        self.released = true;
        removed
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let runtime = Arc::clone(&self.runtime);
        let handle = self.handle.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                debug!(container = %handle, "Container guard dropped; scheduling removal");
                rt.spawn(async move {
                    if let Err(e) = runtime.remove(&handle).await {
                        warn!(container = %handle, error = %e, "Deferred container removal failed");
                    }
                });
            },
            Err(_) => {
                error!(
                    container = %handle,
                    "No async runtime to remove container; it will be reaped at next startup"
                );
            },
        }
    }
}
