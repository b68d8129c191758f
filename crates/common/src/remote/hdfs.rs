/*
 * HDFS access through the `hdfs dfs` command line client.
 *
 * Runs either on this host or, when an SSH hop is configured, on an edge node
 * reached with `ssh`/`scp`. The identity is passed as HADOOP_USER_NAME.
 */

use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;

use super::{Identity, RemoteEntry, RemoteStore};
use crate::{ConsolidationError, Result};

const HADOOP_USER_ENV: &str = "HADOOP_USER_NAME";

/// Edge node used to reach a cluster that is not directly accessible.
#[derive(Debug, Clone)]
pub struct SshHop {
    /// `user@host` passed to ssh/scp
    pub host: String,
    /// Scratch directory on the edge node for staged transfers
    pub scratch_dir: String,
}

/// Remote store backed by `hdfs dfs` shell-outs.
#[derive(Debug, Clone)]
pub struct HdfsCliStore {
    fs_uri: Option<String>,
    ssh: Option<SshHop>,
}

impl HdfsCliStore {
    /// Runs `hdfs dfs` on this host, optionally against an explicit namenode URI.
    pub fn local(fs_uri: Option<String>) -> Self {
        Self { fs_uri, ssh: None }
    }

    /// Runs `hdfs dfs` on an edge node over SSH.
    pub fn over_ssh(hop: SshHop) -> Self {
        Self {
            fs_uri: None,
            ssh: Some(hop),
        }
    }

    fn dfs_args(&self, args: &[&str]) -> Vec<String> {
        let mut full = vec!["dfs".to_string()];
        if let Some(uri) = &self.fs_uri {
            full.push("-fs".to_string());
            full.push(uri.clone());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    /// Runs an `hdfs dfs` subcommand and returns its stdout.
    async fn run_dfs(&self, args: &[&str], identity: &Identity) -> Result<String> {
        let dfs_args = self.dfs_args(args);

        let output = match &self.ssh {
            None => {
                let mut cmd = Command::new("hdfs");
                cmd.args(&dfs_args).kill_on_drop(true);
                if let Some(user) = identity.user() {
                    cmd.env(HADOOP_USER_ENV, user);
                }
                run(cmd, "hdfs").await?
            }
            Some(hop) => {
                let mut remote = String::new();
                if let Some(user) = identity.user() {
                    remote.push_str(&format!("{}={} ", HADOOP_USER_ENV, shell_quote(user)));
                }
                remote.push_str("hdfs");
                for arg in &dfs_args {
                    remote.push(' ');
                    remote.push_str(&shell_quote(arg));
                }
                self.ssh_command(hop, &remote).await?
            }
        };

        check_status(output, &format!("hdfs {}", args.join(" ")))
    }

    async fn ssh_command(&self, hop: &SshHop, remote_cmd: &str) -> Result<Output> {
        let mut cmd = Command::new("ssh");
        cmd.arg(&hop.host).arg(remote_cmd).kill_on_drop(true);
        run(cmd, "ssh").await
    }

    async fn scp(&self, from: &str, to: &str) -> Result<()> {
        let mut cmd = Command::new("scp");
        cmd.arg("-q").arg(from).arg(to).kill_on_drop(true);
        let output = run(cmd, "scp").await?;
        check_status(output, &format!("scp {} {}", from, to)).map(|_| ())
    }

    fn scratch_path(hop: &SshHop, remote_path: &str) -> String {
        let name = remote_path.rsplit('/').next().unwrap_or(remote_path);
        format!(
            "{}/consolidation-{}-{}",
            hop.scratch_dir.trim_end_matches('/'),
            std::process::id(),
            name
        )
    }

    async fn remove_scratch(&self, hop: &SshHop, scratch: &str) {
        let cmd = format!("rm -f {}", shell_quote(scratch));
        match self.ssh_command(hop, &cmd).await {
            Ok(output) if output.status.success() => {}
            Ok(output) => tracing::warn!(
                scratch,
                "Could not remove remote scratch file: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => tracing::warn!(scratch, "Could not remove remote scratch file: {}", e),
        }
    }
}

#[async_trait]
impl RemoteStore for HdfsCliStore {
    fn name(&self) -> &str {
        if self.ssh.is_some() {
            "hdfs-ssh"
        } else {
            "hdfs-cli"
        }
    }

    async fn list(&self, dir: &str, identity: &Identity) -> Result<Vec<RemoteEntry>> {
        let stdout = self
            .run_dfs(&["-ls", dir], identity)
            .await
            .map_err(|e| ConsolidationError::RemoteList {
                path: dir.to_string(),
                reason: e.to_string(),
            })?;
        Ok(parse_ls_output(&stdout))
    }

    async fn get(&self, path: &str, local_dest: &Path, identity: &Identity) -> Result<()> {
        let local = local_dest.to_string_lossy().into_owned();

        match &self.ssh {
            None => {
                self.run_dfs(&["-get", path, local.as_str()], identity).await?;
            }
            Some(hop) => {
                let scratch = Self::scratch_path(hop, path);
                self.run_dfs(&["-get", "-f", path, scratch.as_str()], identity).await?;
                let copied = self.scp(&format!("{}:{}", hop.host, scratch), &local).await;
                self.remove_scratch(hop, &scratch).await;
                copied?;
            }
        }

        tracing::debug!(path, local = %local, "Downloaded");
        Ok(())
    }

    async fn put(&self, local_src: &Path, path: &str, identity: &Identity) -> Result<()> {
        let local = local_src.to_string_lossy().into_owned();

        // No -f: hdfs refuses to overwrite an existing destination
        match &self.ssh {
            None => {
                self.run_dfs(&["-put", local.as_str(), path], identity).await?;
            }
            Some(hop) => {
                let scratch = Self::scratch_path(hop, path);
                self.scp(&local, &format!("{}:{}", hop.host, scratch)).await?;
                let uploaded = self.run_dfs(&["-put", scratch.as_str(), path], identity).await;
                self.remove_scratch(hop, &scratch).await;
                uploaded?;
            }
        }

        tracing::debug!(path, identity = %identity, "Uploaded");
        Ok(())
    }

    async fn delete(&self, path: &str, identity: &Identity) -> Result<()> {
        self.run_dfs(&["-rm", "-f", path], identity).await?;
        Ok(())
    }
}

async fn run(mut cmd: Command, program: &str) -> Result<Output> {
    cmd.output()
        .await
        .map_err(|e| ConsolidationError::RemoteIo(format!("failed to run {}: {}", program, e)))
}

fn check_status(output: Output, what: &str) -> Result<String> {
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(ConsolidationError::RemoteIo(format!(
            "`{}` exited with {}: {}",
            what,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Quotes a single argument for a POSIX shell.
fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Parses `hdfs dfs -ls` output into file entries.
///
/// Line format: `permissions replication owner group size date time path`.
/// The "Found N items" header, directories, and malformed lines are skipped.
pub fn parse_ls_output(stdout: &str) -> Vec<RemoteEntry> {
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with("Found ") || line.starts_with('d') {
                return None;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 8 {
                return None;
            }
            let size_bytes = parts[4].parse::<u64>().ok()?;
            Some(RemoteEntry {
                path: parts[parts.len() - 1].to_string(),
                size_bytes,
            })
        })
        .collect()
}
