//! Logs command - inspect the event log of policy commands

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use serde_json::json;

use ledgerguard_core::services::{LogEntry, LogFilter};
use ledgerguard_core::{EntryPoint, LoggingService, RecordKind};

use super::get_data_dir;
use crate::output;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent log entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only errors
        #[arg(long)]
        errors: bool,
        /// Only entries for one command, e.g. "policy update"
        #[arg(long)]
        command: Option<String>,
        /// Only entries touching one record kind
        #[arg(long)]
        kind: Option<RecordKind>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete old log entries
    Clear {
        /// Delete entries older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show entry and error counts per record kind
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn open_log() -> Result<LoggingService> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// Cutoff for `logs clear`, rejecting ages chrono can't represent
fn cutoff_ms(now: DateTime<Utc>, older_than_days: u64) -> Result<i64> {
    let out_of_range = || anyhow!("--older-than-days {} is out of range", older_than_days);
    let days = i64::try_from(older_than_days).map_err(|_| out_of_range())?;
    let age = Duration::try_days(days).ok_or_else(out_of_range)?;
    let cutoff = now.checked_sub_signed(age).ok_or_else(out_of_range)?;
    Ok(cutoff.timestamp_millis())
}

pub fn run(command: LogsCommands) -> Result<()> {
    match command {
        LogsCommands::List {
            limit,
            errors,
            command,
            kind,
            json,
        } => {
            let filter = LogFilter {
                errors_only: errors,
                command,
                record_kind: kind,
            };
            run_list(&filter, limit, json)
        }
        LogsCommands::Clear {
            older_than_days,
            force,
            json,
        } => run_clear(older_than_days, force, json),
        LogsCommands::Stats { json } => run_stats(json),
    }
}

fn run_list(filter: &LogFilter, limit: usize, json: bool) -> Result<()> {
    let entries = open_log()?.query(filter, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No log entries found.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Command", "Kind", "Event", "Error"]);
    for entry in &entries {
        table.add_row(vec![
            format_timestamp(entry.timestamp),
            entry.command.clone().unwrap_or_default(),
            entry.record_kind.clone().unwrap_or_default(),
            entry.event.clone(),
            entry
                .error_message
                .as_deref()
                .map(|msg| msg.red().to_string())
                .unwrap_or_default(),
        ]);
    }
    println!("{}", table);

    if !filter.errors_only {
        print_error_details(&entries);
    }
    Ok(())
}

/// Full error chains for the failures already shown in the table
fn print_error_details(entries: &[LogEntry]) {
    let failures: Vec<_> = entries
        .iter()
        .filter(|e| e.error_details.is_some())
        .take(3)
        .collect();
    if failures.is_empty() {
        return;
    }
    println!();
    println!("{}", "Recent failures:".red().bold());
    for entry in failures {
        println!(
            "  {} [{}]: {}",
            format_timestamp(entry.timestamp).dimmed(),
            entry.command.as_deref().unwrap_or(&entry.event),
            entry.error_details.as_deref().unwrap_or_default()
        );
    }
}

fn run_clear(older_than_days: u64, force: bool, json: bool) -> Result<()> {
    let cutoff = cutoff_ms(Utc::now(), older_than_days)?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete log entries older than {} days?", older_than_days))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let deleted = open_log()?.delete_before(cutoff)?;
    if json {
        println!("{}", json!({ "deleted": deleted }));
    } else {
        output::success(&format!("Deleted {} log entries", deleted));
    }
    Ok(())
}

fn run_stats(json: bool) -> Result<()> {
    let service = open_log()?;
    let counts = service.counts_by_kind()?;
    let total: u64 = counts.iter().map(|c| c.total).sum();
    let errors: u64 = counts.iter().map(|c| c.errors).sum();

    if json {
        let document = json!({
            "total_entries": total,
            "error_count": errors,
            "by_kind": counts,
            "database_path": service.db_path().to_string_lossy(),
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!("{}", "Log Statistics".bold());
    println!("  Entries: {} ({} errors)", total, errors);
    println!("  Database: {}", service.db_path().display());

    if !counts.is_empty() {
        let mut table = output::create_table();
        table.set_header(vec!["Kind", "Entries", "Errors"]);
        for count in &counts {
            table.add_row(vec![
                count.record_kind.clone().unwrap_or_else(|| "-".to_string()),
                count.total.to_string(),
                count.errors.to_string(),
            ]);
        }
        println!("{}", table);
    }
    Ok(())
}
