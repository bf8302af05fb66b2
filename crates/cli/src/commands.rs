//! Argument validation and output formatting for the maintenance commands.

use std::fmt::Write;

use keeper_backup::repository::{BackupListing, BackupStats};
use keeper_backup::service::{DEFAULT_CLEANUP_DAYS, components_for};
use keeper_common::types::{BackupComponent, BackupJob};
use keeper_notifier::dispatcher::DispatchResult;

/// A validated `backup:manage` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupAction {
    Status,
    Create {
        selection: String,
        components: Vec<BackupComponent>,
    },
    Cleanup {
        days: i64,
    },
    List,
}

pub fn parse_backup_action(
    action: &str,
    backup_type: &str,
    days: Option<i64>,
) -> Result<BackupAction, String> {
    match action {
        "status" => Ok(BackupAction::Status),
        "create" => {
            let components = components_for(backup_type)
                .map_err(|_| "Invalid backup type. Use: database, files, or both".to_string())?;
            Ok(BackupAction::Create {
                selection: backup_type.to_string(),
                components,
            })
        }
        "cleanup" => {
            let days = days.unwrap_or(DEFAULT_CLEANUP_DAYS);
            if days < 1 {
                return Err("Days must be greater than 0".to_string());
            }
            Ok(BackupAction::Cleanup { days })
        }
        "list" => Ok(BackupAction::List),
        _ => Err("Invalid action. Use: status, create, cleanup, or list".to_string()),
    }
}

pub fn format_status(stats: &BackupStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Backup System Status");
    let _ = writeln!(out, "====================");
    let _ = writeln!(out, "Total backups:    {}", stats.total);
    let _ = writeln!(out, "Completed:        {}", stats.completed);
    let _ = writeln!(out, "Failed:           {}", stats.failed);
    let _ = writeln!(out, "Running:          {}", stats.running);
    let _ = writeln!(out, "Recent (7 days):  {}", stats.recent);
    let _ = writeln!(out, "Total size:       {}", stats.formatted_total_size());

    if !stats.recent_failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Recent failures:");
        for job in &stats.recent_failures {
            let _ = writeln!(
                out,
                "  - {} ({}): {}",
                job.display_name(),
                job.created_at.format("%b %-d, %H:%M"),
                job.error_message.as_deref().unwrap_or("Unknown error")
            );
        }
    }
    out
}

pub fn format_created(job: &BackupJob, selection: &str) -> String {
    format!(
        "Backup job dispatched\n  Type:   {}\n  ID:     {}\n  Status: {}\n",
        selection, job.id, job.status
    )
}

pub fn format_listing(listing: &[BackupListing]) -> String {
    if listing.is_empty() {
        return "No backups found.\n".to_string();
    }

    let headers = ["ID", "Name", "Type", "Status", "Size", "Created", "Creator"];
    let rows: Vec<[String; 7]> = listing
        .iter()
        .map(|row| {
            [
                row.job.id.to_string(),
                row.job.display_name(),
                row.job.backup_type.to_string(),
                row.job.status.to_string(),
                row.job.formatted_file_size(),
                row.job.created_at.format("%Y-%m-%d %H:%M").to_string(),
                row.creator_label().to_string(),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    write_row(&mut out, &headers, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_row(&mut out, &rule, &widths);
    for row in &rows {
        write_row(&mut out, row, &widths);
    }
    out
}

fn write_row<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell.as_ref(), width = *width))
        .collect();
    let _ = writeln!(out, "{}", padded.join("  ").trim_end());
}

pub fn format_activities_cleaned(deleted: u64, days: i64) -> String {
    format!("Deleted {} activities older than {} days.", deleted, days)
}

pub fn format_push_sent(result: &DispatchResult) -> String {
    format!(
        "Notification sent to {} user(s): {} delivered, {} failed.",
        result.recipients.len(),
        result.delivered_count(),
        result.failed_count()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use keeper_backup::memory::job;
    use keeper_common::types::{BackupStatus, BackupType, Channel};
    use keeper_notifier::dispatcher::{DeliveryOutcome, RecipientReport};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            parse_backup_action("status", "both", None),
            Ok(BackupAction::Status)
        );
        assert_eq!(
            parse_backup_action("cleanup", "both", None),
            Ok(BackupAction::Cleanup { days: 30 })
        );
        assert_eq!(
            parse_backup_action("create", "files", None),
            Ok(BackupAction::Create {
                selection: "files".to_string(),
                components: vec![BackupComponent::Files],
            })
        );
    }

    #[test]
    fn test_parse_rejects_invalid_input() {
        assert_eq!(
            parse_backup_action("restore", "both", None),
            Err("Invalid action. Use: status, create, cleanup, or list".to_string())
        );
        assert_eq!(
            parse_backup_action("create", "logs", None),
            Err("Invalid backup type. Use: database, files, or both".to_string())
        );
        assert_eq!(
            parse_backup_action("cleanup", "both", Some(0)),
            Err("Days must be greater than 0".to_string())
        );
        assert!(parse_backup_action("cleanup", "both", Some(-3)).is_err());
    }

    #[test]
    fn test_type_is_only_checked_for_create() {
        assert_eq!(
            parse_backup_action("list", "logs", None),
            Ok(BackupAction::List)
        );
    }

    #[test]
    fn test_status_lists_recent_failures() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 0).unwrap();
        let mut failed = job(BackupType::Scheduled, BackupStatus::Failed, at);
        failed.error_message = Some("disk full".to_string());
        let stats = BackupStats {
            total: 3,
            completed: 2,
            failed: 1,
            running: 0,
            recent: 3,
            total_size: 1536,
            recent_failures: vec![failed.clone()],
        };

        let out = format_status(&stats);

        assert!(out.contains("Total size:       1.5 KB"));
        assert!(out.contains(&format!("Backup #{} (Mar 9, 14:05): disk full", failed.id)));
    }

    #[test]
    fn test_empty_listing() {
        assert_eq!(format_listing(&[]), "No backups found.\n");
    }

    #[test]
    fn test_listing_columns() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 0).unwrap();
        let mut done = job(BackupType::Manual, BackupStatus::Completed, at);
        done.name = Some("backup_2025-03-09_14-05-00.zip".to_string());
        done.file_size = Some(2048);
        let listing = vec![
            BackupListing {
                job: done,
                creator_name: Some("Ada".to_string()),
            },
            BackupListing {
                job: job(BackupType::Scheduled, BackupStatus::Pending, at),
                creator_name: None,
            },
        ];

        let out = format_listing(&listing);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[2].contains("backup_2025-03-09_14-05-00.zip"));
        assert!(lines[2].contains("2 KB"));
        assert!(lines[2].ends_with("Ada"));
        assert!(lines[3].contains("Unknown"));
        assert!(lines[3].ends_with("System"));
    }

    #[test]
    fn test_activities_message() {
        assert_eq!(
            format_activities_cleaned(12, 90),
            "Deleted 12 activities older than 90 days."
        );
    }

    #[test]
    fn test_push_sent_summary() {
        let report = |push: DeliveryOutcome| RecipientReport {
            user_id: Uuid::new_v4(),
            outcomes: BTreeMap::from([
                (Channel::Push, push),
                (Channel::Database, DeliveryOutcome::Delivered),
            ]),
        };
        let result = DispatchResult {
            recipients: vec![
                report(DeliveryOutcome::Delivered),
                report(DeliveryOutcome::Failed("gone".to_string())),
            ],
        };

        assert_eq!(
            format_push_sent(&result),
            "Notification sent to 2 user(s): 3 delivered, 1 failed."
        );
    }
}
