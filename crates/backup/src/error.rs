use thiserror::Error;
use uuid::Uuid;

use keeper_common::error::AppError;

/// Why a backup attempt did not complete.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Backup {0} not found")]
    NotFound(Uuid),

    #[error("Backup command failed with exit code: {exit_code}. Output: {output}")]
    ToolFailed { exit_code: i32, output: String },

    #[error("Backup command could not be run: {0}")]
    ToolUnavailable(String),

    #[error("Backup command timed out after {0}s")]
    TimedOut(u64),

    #[error("Backup file was not created at expected location: {0}")]
    ArtifactMissing(String),

    #[error("Unknown disk: {0}")]
    UnknownDisk(String),

    #[error(transparent)]
    App(#[from] AppError),

    /// A store or disk error hit after the job was claimed.
    #[error(transparent)]
    Interrupted(AppError),
}

impl BackupError {
    /// Store or queue trouble before the job was claimed. The job is still
    /// pending, so another attempt can run it.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, BackupError::App(_))
    }

    /// Reclassify an error raised while a claimed job was running.
    pub(crate) fn after_claim(self) -> Self {
        match self {
            BackupError::App(inner) => BackupError::Interrupted(inner),
            other => other,
        }
    }
}

impl From<sqlx::Error> for BackupError {
    fn from(e: sqlx::Error) -> Self {
        BackupError::App(AppError::Database(e))
    }
}

impl From<BackupError> for AppError {
    fn from(e: BackupError) -> Self {
        match e {
            BackupError::App(inner) | BackupError::Interrupted(inner) => inner,
            BackupError::NotFound(id) => AppError::NotFound(format!("Backup {} not found", id)),
            BackupError::UnknownDisk(name) => AppError::Config(format!("Unknown disk: {}", name)),
            other => AppError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failure_message_carries_output() {
        let err = BackupError::ToolFailed {
            exit_code: 1,
            output: "mysqldump: access denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Backup command failed with exit code: 1. Output: mysqldump: access denied"
        );
        assert!(!err.is_infrastructure());
    }

    #[test]
    fn test_errors_after_claim_are_not_retryable() {
        let outage = BackupError::from(AppError::Storage("disk offline".to_string()));
        assert!(outage.is_infrastructure());

        let interrupted = outage.after_claim();
        assert!(!interrupted.is_infrastructure());
        assert_eq!(interrupted.to_string(), "Storage error: disk offline");
        assert!(!BackupError::UnknownDisk("s3".to_string()).is_infrastructure());
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let app: AppError = BackupError::NotFound(Uuid::nil()).into();
        assert_eq!(app.status_code().as_u16(), 404);
    }
}
