//! [`ContainerRuntime`] backed by the `docker` command-line client.
//!
//! Each primitive shells out to one CLI subcommand. Output is captured by
//! the daemon's log driver and read back with `docker logs`, so nothing the
//! container writes is buffered host-side beyond the requested cap.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{ExecError, ExecResult};
use crate::sandbox::limits::NetworkPolicy;
use crate::sandbox::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec};

/// Label set on every container this engine creates.
pub const MANAGED_LABEL: &str = "enclave.managed";

/// Scratch space for interpreters that insist on a writable `/tmp`.
const TMPFS_MOUNT: &str = "/tmp:rw,noexec,nosuid,size=16m";

/// Docker (or Docker-compatible) CLI runtime.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl DockerCli {
    /// Use the given client binary (e.g. `podman`).
    #[must_use]
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Locate the client named `name` (e.g. `docker`) on `PATH`. A name
    /// containing a path separator is used as-is.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Runtime`] if no such client is installed.
    pub fn discover(name: &str) -> ExecResult<Self> {
        let binary = which::which(name)
            .map_err(|e| ExecError::Runtime(format!("container client '{name}' not found: {e}")))?;
        debug!(binary = %binary.display(), "Using docker client");
        Ok(Self::with_binary(binary))
    }

    /// The client binary.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Remove containers left behind by a previous process.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Runtime`] if listing fails. Individual removal
    /// failures are logged and skipped.
    pub async fn reap_orphans(&self) -> ExecResult<usize> {
        let filter = format!("label={MANAGED_LABEL}=true");
        let output = self
            .run(&["ps", "--all", "--quiet", "--filter", filter.as_str()])
            .await?;
        let ids = String::from_utf8_lossy(&output.stdout);
        let mut removed = 0usize;
        for id in ids.split_whitespace() {
            match self.remove(&ContainerHandle::new(id)).await {
                Ok(()) => removed = removed.saturating_add(1),
                Err(e) => warn!(container = id, error = %e, "Failed to reap orphaned container"),
            }
        }
        if removed > 0 {
            info!(count = removed, "Reaped orphaned sandbox containers");
        }
        Ok(removed)
    }

    /// Arguments for `docker create`.
    #[must_use]
    pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
        let limits = &spec.limits;
        let network = match &limits.network {
            NetworkPolicy::Disabled => "none".to_string(),
            NetworkPolicy::Named(name) => name.clone(),
        };

        let mut args: Vec<String> = vec![
            "create".into(),
            "--name".into(),
            spec.name.clone(),
            "--interactive".into(),
            "--network".into(),
            network,
            "--memory".into(),
            limits.memory_bytes.to_string(),
            "--memory-swap".into(),
            limits.memory_bytes.to_string(),
            "--read-only".into(),
            "--cap-drop".into(),
            "ALL".into(),
            "--security-opt".into(),
            "no-new-privileges".into(),
            "--tmpfs".into(),
            TMPFS_MOUNT.into(),
            "--workdir".into(),
            spec.workdir.clone(),
        ];

        if let Some(cpus) = limits.cpu_quota {
            args.push("--cpus".into());
            args.push(cpus.to_string());
        }
        if let Some(pids) = limits.pids_limit {
            args.push("--pids-limit".into());
            args.push(pids.to_string());
        }
        for mount in &spec.mounts {
            let mode = if mount.read_only { "ro" } else { "rw" };
            args.push("--volume".into());
            args.push(format!(
                "{}:{}:{mode}",
                mount.host_path.display(),
                mount.container_path
            ));
        }
        for (key, value) in &spec.env {
            args.push("--env".into());
            args.push(format!("{key}={value}"));
        }
        for (key, value) in &spec.labels {
            args.push("--label".into());
            args.push(format!("{key}={value}"));
        }

        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    async fn run<S: AsRef<str>>(&self, args: &[S]) -> ExecResult<Output> {
        let output = self
            .command()
            .args(args.iter().map(AsRef::as_ref))
            .output()
            .await
            .map_err(|e| ExecError::Runtime(format!("failed to run docker client: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let subcommand = args.first().map_or("", AsRef::as_ref);
            return Err(ExecError::Runtime(format!(
                "docker {subcommand} failed: {}",
                stderr.trim()
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn create(&self, spec: &ContainerSpec) -> ExecResult<ContainerHandle> {
        let args = Self::create_args(spec);
        let output = self.run(&args).await?;
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(ExecError::Runtime(
                "docker create returned no container id".into(),
            ));
        }
        debug!(
            container = %id,
            name = %spec.name,
            image = %spec.image,
            "Created sandbox container"
        );
        Ok(ContainerHandle::new(id))
    }

    async fn attach_stdin(&self, handle: &ContainerHandle, input: &[u8]) -> ExecResult<()> {
        let mut child = self
            .command()
            .args(["start", "--attach", "--interactive", handle.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExecError::Runtime(format!("failed to start container: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecError::Runtime("container stdin unavailable".into()))?;
        stdin
            .write_all(input)
            .await
            .map_err(|e| ExecError::Runtime(format!("failed to write container stdin: {e}")))?;
        // Closing stdin is what tells the launcher the request is complete.
        drop(stdin);

        // The attach client lives until the container exits or is removed.
        let container = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = child.wait().await {
                debug!(%container, error = %e, "Attach client exited with error");
            }
        });
        Ok(())
    }

    async fn wait(&self, handle: &ContainerHandle) -> ExecResult<i64> {
        let output = self.run(&["wait", handle.as_str()]).await?;
        let text = String::from_utf8_lossy(&output.stdout);
        let text = text.trim();
        text.parse::<i64>().map_err(|e| {
            ExecError::Runtime(format!("unexpected docker wait output '{text}': {e}"))
        })
    }

    async fn logs(&self, handle: &ContainerHandle, max_bytes: usize) -> ExecResult<Vec<u8>> {
        let mut child = self
            .command()
            .args(["logs", handle.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecError::Runtime(format!("failed to read container logs: {e}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (out, err) = tokio::try_join!(
            read_capped(stdout, max_bytes),
            read_capped(stderr, max_bytes)
        )
        .map_err(|e| ExecError::Runtime(format!("failed to read container logs: {e}")))?;

        // Stop the client if either stream hit the cap.
        if let Err(e) = child.start_kill() {
            debug!(container = %handle, error = %e, "Log client already exited");
        }
        let _ = child.wait().await;

        // Diagnostics first, so the response envelope stays last.
        let mut combined = err;
        combined.extend_from_slice(&out);
        combined.truncate(max_bytes);
        Ok(combined)
    }

    async fn remove(&self, handle: &ContainerHandle) -> ExecResult<()> {
        match self
            .run(&["rm", "--force", "--volumes", handle.as_str()])
            .await
        {
            Ok(_) => {
                debug!(container = %handle, "Removed sandbox container");
                Ok(())
            },
            Err(ExecError::Runtime(msg)) if msg.contains("No such container") => Ok(()),
            Err(e) => Err(e),
        }
    }
}

async fn read_capped<R>(reader: Option<R>, max_bytes: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(reader) = reader {
        let cap = u64::try_from(max_bytes).unwrap_or(u64::MAX);
        reader.take(cap).read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sandbox::limits::SandboxLimits;
    use crate::sandbox::runtime::Mount;

    fn spec(limits: SandboxLimits) -> ContainerSpec {
        ContainerSpec {
            name: "enclave-run-1".into(),
            image: "python:3.11-slim".into(),
            command: vec!["python".into(), "/app/launcher.py".into()],
            workdir: "/app".into(),
            mounts: vec![Mount {
                host_path: PathBuf::from("/tmp/enclave-run-abc"),
                container_path: "/app".into(),
                read_only: true,
            }],
            env: vec![("PYTHONDONTWRITEBYTECODE".into(), "1".into())],
            labels: vec![(MANAGED_LABEL.into(), "true".into())],
            limits,
        }
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn create_args_apply_limits() {
        let limits = SandboxLimits::new(Duration::from_secs(5))
            .unwrap()
            .with_cpu_quota(0.5)
            .with_pids_limit(64);
        let args = DockerCli::create_args(&spec(limits));

        assert_eq!(args[0], "create");
        assert!(has_pair(&args, "--network", "none"));
        assert!(has_pair(&args, "--memory", "268435456"));
        assert!(has_pair(&args, "--memory-swap", "268435456"));
        assert!(has_pair(&args, "--cpus", "0.5"));
        assert!(has_pair(&args, "--pids-limit", "64"));
        assert!(has_pair(&args, "--volume", "/tmp/enclave-run-abc:/app:ro"));
        assert!(has_pair(&args, "--label", "enclave.managed=true"));
        assert!(args.iter().any(|a| a == "--read-only"));
        assert!(args.iter().any(|a| a == "--interactive"));

        // Image precedes the command, which comes last.
        let image_at = args.iter().position(|a| a == "python:3.11-slim").unwrap();
        assert_eq!(
            &args[image_at..],
            ["python:3.11-slim", "python", "/app/launcher.py"]
        );
    }

    #[test]
    fn named_network_is_passed_through() {
        let limits =
            SandboxLimits::default().with_network(NetworkPolicy::Named("egress-proxy".into()));
        let args = DockerCli::create_args(&spec(limits));
        assert!(has_pair(&args, "--network", "egress-proxy"));
        assert!(!args.iter().any(|a| a == "--cpus"));
    }

    #[tokio::test]
    async fn read_capped_stops_at_cap() {
        let data: &[u8] = &[b'x'; 4096];
        let buf = read_capped(Some(data), 100).await.unwrap();
        assert_eq!(buf.len(), 100);
    }
}
