use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::backend::{NrmBackend, NrmCallParams};
use crate::error::NrmError;

/// Shells out to an operator-supplied script over SSH for every NRM call —
/// the script owns the actual device session (e.g. via netmiko or similar)
/// and this backend only manages the subprocess.
///
/// The script is invoked as:
///   `<script_path> <call> --connection-id <id> --bandwidth-mbps <n>
///      --src-port <port> --src-vlan <vlan> --dst-port <port> --dst-vlan <vlan>
///      [--circuit-id <id>]`
/// and is expected to print a circuit id to stdout (or nothing) and exit 0
/// on success; a non-zero exit is treated as `NrmError::GenericRmError`.
pub struct CliSshBackend {
    pub script_path: String,
    pub call_timeout: Duration,
    pub ssh_hostname: String,
    pub ssh_username: String,
}

impl CliSshBackend {
    pub fn new(script_path: impl Into<String>, ssh_hostname: impl Into<String>, ssh_username: impl Into<String>) -> Self {
        Self {
            script_path: script_path.into(),
            call_timeout: Duration::from_secs(30),
            ssh_hostname: ssh_hostname.into(),
            ssh_username: ssh_username.into(),
        }
    }

    async fn invoke(&self, call: &str, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        let mut args = vec![
            call.to_string(),
            "--connection-id".to_string(),
            params.connection_id.to_string(),
            "--bandwidth-mbps".to_string(),
            params.bandwidth_mbps.to_string(),
            "--src-port".to_string(),
            params.src_port_id.clone(),
            "--src-vlan".to_string(),
            params.src_vlan.to_string(),
            "--dst-port".to_string(),
            params.dst_port_id.clone(),
            "--dst-vlan".to_string(),
            params.dst_vlan.to_string(),
        ];
        if let Some(circuit_id) = &params.circuit_id {
            args.push("--circuit-id".to_string());
            args.push(circuit_id.clone());
        }

        debug!(script = %self.script_path, call, "invoking NRM CLI-over-SSH script");

        let mut cmd = Command::new(&self.script_path);
        cmd.args(&args)
            .env("SSH_HOSTNAME", &self.ssh_hostname)
            .env("SSH_USERNAME", &self.ssh_username)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| NrmError::Internal(format!("spawn {}: {e}", self.script_path)))?;
        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let read_stdout = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut last = None;
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    last = Some(line.trim().to_string());
                }
            }
            last
        };
        let read_stderr = async {
            let mut lines = BufReader::new(stderr).lines();
            let mut combined = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                combined.push_str(&line);
                combined.push('\n');
            }
            combined
        };

        let wait = async {
            let (stdout_result, stderr_result) = tokio::join!(read_stdout, read_stderr);
            let status = child.wait().await.map_err(|e| NrmError::Internal(e.to_string()))?;
            Ok::<_, NrmError>((status, stdout_result, stderr_result))
        };

        let (status, stdout_result, stderr_result) = match tokio::time::timeout(self.call_timeout, wait).await {
            Ok(result) => result?,
            Err(_) => return Err(NrmError::Timeout(self.call_timeout)),
        };

        if !status.success() {
            warn!(call, code = status.code(), stderr = %stderr_result, "NRM script exited non-zero");
            return Err(NrmError::GenericRmError(format!("{} exited with {:?}: {}", call, status.code(), stderr_result)));
        }

        Ok(stdout_result)
    }
}

#[async_trait]
impl NrmBackend for CliSshBackend {
    fn name(&self) -> &'static str {
        "cli-ssh"
    }

    async fn reserve(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        self.invoke("reserve", params).await
    }

    async fn reserve_commit(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        self.invoke("reserve-commit", params).await
    }

    async fn reserve_abort(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        self.invoke("reserve-abort", params).await
    }

    async fn reserve_timeout(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        self.invoke("reserve-timeout", params).await
    }

    async fn provision(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        self.invoke("provision", params).await
    }

    async fn release(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        self.invoke("release", params).await
    }

    async fn activate(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        self.invoke("activate", params).await
    }

    async fn deactivate(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        self.invoke("deactivate", params).await
    }

    async fn terminate(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        self.invoke("terminate", params).await
    }

    async fn topology(&self) -> Result<String, NrmError> {
        let mut cmd = Command::new(&self.script_path);
        cmd.arg("topology").stdin(std::process::Stdio::null()).stdout(std::process::Stdio::piped()).stderr(std::process::Stdio::piped());
        let output = cmd.output().await.map_err(|e| NrmError::Internal(format!("spawn {}: {e}", self.script_path)))?;
        if !output.status.success() {
            return Err(NrmError::GenericRmError(format!("topology exited with {:?}", output.status.code())));
        }
        String::from_utf8(output.stdout).map_err(|e| NrmError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsi_domain::ConnectionId;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::NamedTempFile;

    fn script(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "#!/bin/sh\n{body}").unwrap();
        let mut perms = file.as_file().metadata().unwrap().permissions();
        perms.set_mode(0o755);
        file.as_file().set_permissions(perms).unwrap();
        file
    }

    fn params() -> NrmCallParams {
        NrmCallParams {
            connection_id: ConnectionId::new(),
            bandwidth_mbps: 1000,
            src_port_id: "Eth1".to_string(),
            src_vlan: 1780,
            dst_port_id: "Eth2".to_string(),
            dst_vlan: 1780,
            circuit_id: None,
        }
    }

    #[tokio::test]
    async fn successful_script_returns_stdout() {
        let file = script("echo circuit-123");
        let backend = CliSshBackend::new(file.path().to_str().unwrap(), "switch1", "admin");
        let result = backend.activate(&params()).await.unwrap();
        assert_eq!(result.as_deref(), Some("circuit-123"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_generic_rm_error() {
        let file = script("echo failed 1>&2; exit 1");
        let backend = CliSshBackend::new(file.path().to_str().unwrap(), "switch1", "admin");
        let err = backend.activate(&params()).await.unwrap_err();
        assert!(matches!(err, NrmError::GenericRmError(_)));
    }
}
