//! Backup jobs: persistence, execution, queueing and retention.

pub mod disk;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod orchestrator;
pub mod queue;
pub mod repository;
pub mod retention;
pub mod scheduler;
pub mod service;
pub mod tool;

use std::sync::Arc;
use std::time::Duration;

use keeper_common::config::AppConfig;

use disk::{DiskRegistry, LocalDisk};
use tool::CommandBackupTool;

/// Disks known from configuration.
pub fn disk_registry(config: &AppConfig) -> DiskRegistry {
    DiskRegistry::new().with_disk(
        config.backup_disk.clone(),
        Arc::new(LocalDisk::new(&config.backup_disk_root)),
    )
}

pub fn command_tool(config: &AppConfig) -> CommandBackupTool {
    CommandBackupTool::new(
        config.backup_tool_program.clone(),
        config.backup_tool_args.clone(),
        Duration::from_secs(config.backup_job_timeout_secs),
    )
}
