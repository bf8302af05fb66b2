//! The external program that produces backup archives.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;

use keeper_common::types::BackupComponent;

use crate::error::BackupError;

/// What to back up and where the tool should put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    pub components: Vec<BackupComponent>,
    pub filename: String,
    pub disk: String,
}

impl BackupRequest {
    /// Component flags followed by the filename and target disk.
    pub fn flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        match components_scope(&self.components) {
            Scope::DatabaseOnly => flags.push("--only-db".to_string()),
            Scope::FilesOnly => flags.push("--only-files".to_string()),
            Scope::Everything => {}
        }
        flags.push(format!("--filename={}", self.filename));
        flags.push(format!("--only-to-disk={}", self.disk));
        flags
    }
}

/// Exit status and combined stdout/stderr of one tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub output: String,
}

impl ToolOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait BackupTool: Send + Sync {
    async fn run(&self, request: &BackupRequest) -> Result<ToolOutput, BackupError>;
}

/// Spawns a configured program, e.g. `php artisan backup:run`.
pub struct CommandBackupTool {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandBackupTool {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl BackupTool for CommandBackupTool {
    async fn run(&self, request: &BackupRequest) -> Result<ToolOutput, BackupError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(request.flags())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(
            program = %self.program,
            filename = %request.filename,
            disk = %request.disk,
            "Running backup tool"
        );

        let child = command
            .spawn()
            .map_err(|e| BackupError::ToolUnavailable(format!("{}: {}", self.program, e)))?;

        // Dropping the future on timeout drops the child, which kills it
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| BackupError::TimedOut(self.timeout.as_secs()))?
            .map_err(|e| BackupError::ToolUnavailable(format!("{}: {}", self.program, e)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        Ok(ToolOutput {
            // Killed by a signal: no exit code
            exit_code: output.status.code().unwrap_or(-1),
            output: combined.trim_end().to_string(),
        })
    }
}

enum Scope {
    DatabaseOnly,
    FilesOnly,
    Everything,
}

fn components_scope(components: &[BackupComponent]) -> Scope {
    let database = components.contains(&BackupComponent::Database);
    let files = components.contains(&BackupComponent::Files);
    match (database, files) {
        (true, false) => Scope::DatabaseOnly,
        (false, true) => Scope::FilesOnly,
        _ => Scope::Everything,
    }
}

/// `backup{_database|_files|}_{YYYY-mm-dd_HH-MM-SS}.zip`
pub fn artifact_name(components: &[BackupComponent], at: DateTime<Utc>) -> String {
    let suffix = match components_scope(components) {
        Scope::DatabaseOnly => "_database",
        Scope::FilesOnly => "_files",
        Scope::Everything => "",
    };
    format!("backup{}_{}.zip", suffix, at.format("%Y-%m-%d_%H-%M-%S"))
}
