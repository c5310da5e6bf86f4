//! Payload commands - format, normalize and validate policy JSON
//!
//! These never touch the record store. Input that cannot be read as a
//! policy is treated the way stored payloads are: it becomes the seed policy.

use std::collections::HashMap;
use std::io::{self, Read};
use std::path::Path;
use std::process;

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;

use ledgerguard_core::domain::{format_policy, parse_policy_str, to_policy_json, validate_policy};
use ledgerguard_core::{LogEvent, OperationResult, Policy};

use super::{get_logger, load_catalogs, load_config, log_event};
use crate::output;

/// Get the payload from: argument, file, or stdin
fn read_payload(payload: Option<&str>, file: Option<&Path>) -> Result<String> {
    if let Some(payload) = payload {
        Ok(payload.to_string())
    } else if let Some(file_path) = file {
        std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read policy file: {:?}", file_path))
    } else if atty::isnt(atty::Stream::Stdin) {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read policy from stdin")?;
        Ok(buffer)
    } else {
        anyhow::bail!("No policy provided. Use positional argument, --file, or pipe from stdin.");
    }
}

fn read_policy(payload: Option<&str>, file: Option<&Path>) -> Result<Policy> {
    let content = read_payload(payload, file)?;
    Ok(parse_policy_str(&content))
}

pub fn run_format(payload: Option<&str>, file: Option<&Path>, json: bool) -> Result<()> {
    let policy = read_policy(payload, file)?;
    let catalogs = load_catalogs()?;
    let summary = format_policy(&policy, &catalogs);
    log_event(&get_logger(), LogEvent::new("command").with_command("format"));

    if json {
        let mut context = HashMap::new();
        context.insert(
            "condition_count".to_string(),
            json!(policy.conditions.len()),
        );
        let result = OperationResult::ok_with_context(summary, context);
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", summary);
    }
    Ok(())
}

pub fn run_normalize(payload: Option<&str>, file: Option<&Path>, json: bool) -> Result<()> {
    let policy = read_policy(payload, file)?;
    let canonical = to_policy_json(&policy);
    log_event(&get_logger(), LogEvent::new("command").with_command("normalize"));

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&OperationResult::ok(canonical))?
        );
    } else {
        println!("{}", serde_json::to_string_pretty(&canonical)?);
    }
    Ok(())
}

pub fn run_validate(
    payload: Option<&str>,
    file: Option<&Path>,
    min_conditions: Option<usize>,
    json: bool,
) -> Result<()> {
    let logger = get_logger();
    let policy = read_policy(payload, file)?;
    let config = load_config()?;
    let catalogs = config.catalogs()?;
    let min_conditions = min_conditions.unwrap_or(config.min_conditions);

    let issues = validate_policy(&policy, &catalogs, min_conditions);
    let summary = format_policy(&policy, &catalogs);

    if issues.is_empty() {
        log_event(&logger, LogEvent::new("policy_validated").with_command("validate"));
        if json {
            println!("{}", serde_json::to_string_pretty(&OperationResult::ok(summary))?);
        } else {
            output::success("Policy is valid");
            println!("  {}", summary.dimmed());
        }
        return Ok(());
    }

    let message = format!("Policy has {} issue(s)", issues.len());
    log_event(
        &logger,
        LogEvent::new("policy_rejected")
            .with_command("validate")
            .with_error(&message),
    );

    if json {
        let mut context = HashMap::new();
        context.insert("issues".to_string(), serde_json::to_value(&issues)?);
        let result: OperationResult<String> = OperationResult::fail_with_context(message, context);
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        output::error(&message);
        output::issues(&issues);
    }
    process::exit(1);
}
