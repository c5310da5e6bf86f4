//! Policy command - create, inspect and edit policy-bearing records

use std::cell::Cell;
use std::process;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::{Confirm, Input, Select};
use uuid::Uuid;

use ledgerguard_core::domain::{
    format_condition, parse_policy_str, ConditionPatch, ConditionValue, ValueEditor,
};
use ledgerguard_core::services::{PolicyService, RecordChanges};
use ledgerguard_core::{
    Catalogs, Error, LogEvent, LoggingService, LogicalOperator, OperationResult, Policy,
    PolicyBuilder, PolicyRecord, RecordKind,
};

use super::{get_context, get_logger, log_event};
use crate::output;

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Create a record (opens the interactive builder without --policy)
    New {
        /// automation_rule, sla or permission_policy
        kind: RecordKind,
        /// Record name
        name: String,
        /// Policy JSON
        #[arg(long)]
        policy: Option<String>,
        /// Kind-specific metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List records
    List {
        /// Only show one kind
        #[arg(long)]
        kind: Option<RecordKind>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a record and its policy
    Show {
        id: Uuid,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a record's name, policy or metadata
    Update {
        id: Uuid,
        /// Version you last read (see `lg policy show`)
        #[arg(long)]
        version: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New policy JSON
        #[arg(long)]
        policy: Option<String>,
        /// New metadata JSON object
        #[arg(long)]
        metadata: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Enable a record (its policy must be valid)
    Enable {
        id: Uuid,
        #[arg(long)]
        version: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Disable a record
    Disable {
        id: Uuid,
        #[arg(long)]
        version: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a record
    Remove {
        id: Uuid,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
    /// Edit a record's policy with the interactive builder
    Edit { id: Uuid },
}

/// Event log context for one `lg policy` invocation
///
/// The record kind is filled in once the command knows it.
struct CommandLog {
    logger: Option<LoggingService>,
    command: &'static str,
    kind: Cell<Option<RecordKind>>,
}

impl CommandLog {
    fn new(command: &'static str) -> Self {
        Self {
            logger: get_logger(),
            command,
            kind: Cell::new(None),
        }
    }

    fn set_kind(&self, kind: RecordKind) {
        self.kind.set(Some(kind));
    }

    fn event(&self, name: &str) -> LogEvent {
        let event = LogEvent::new(name).with_command(self.command);
        match self.kind.get() {
            Some(kind) => event.with_record_kind(kind),
            None => event,
        }
    }

    fn succeeded(&self) {
        log_event(&self.logger, self.event("command"));
    }

    fn failed(&self, err: &anyhow::Error) {
        log_event(
            &self.logger,
            self.event("command_failed")
                .with_error(err.to_string())
                .with_error_details(format!("{:#}", err)),
        );
    }
}

pub fn run(command: PolicyCommands) -> Result<()> {
    let log = CommandLog::new(command_name(&command));

    let result = dispatch(command, &log);
    match &result {
        Ok(()) => log.succeeded(),
        Err(e) => log.failed(e),
    }
    result
}

fn command_name(command: &PolicyCommands) -> &'static str {
    match command {
        PolicyCommands::New { .. } => "policy new",
        PolicyCommands::List { .. } => "policy list",
        PolicyCommands::Show { .. } => "policy show",
        PolicyCommands::Update { .. } => "policy update",
        PolicyCommands::Enable { .. } => "policy enable",
        PolicyCommands::Disable { .. } => "policy disable",
        PolicyCommands::Remove { .. } => "policy remove",
        PolicyCommands::Edit { .. } => "policy edit",
    }
}

fn dispatch(command: PolicyCommands, log: &CommandLog) -> Result<()> {
    match command {
        PolicyCommands::New {
            kind,
            name,
            policy,
            metadata,
            json,
        } => {
            log.set_kind(kind);
            run_new(kind, &name, policy.as_deref(), metadata.as_deref(), json, log)
        }
        PolicyCommands::List { kind, json } => {
            if let Some(kind) = kind {
                log.set_kind(kind);
            }
            run_list(kind, json)
        }
        PolicyCommands::Show { id, json } => run_show(id, json, log),
        PolicyCommands::Update {
            id,
            version,
            name,
            policy,
            metadata,
            json,
        } => {
            let changes = RecordChanges {
                name,
                policy: policy.as_deref().map(parse_policy_str),
                metadata: metadata.as_deref().map(parse_metadata).transpose()?,
            };
            let ctx = get_context()?;
            log.set_kind(ctx.policy_service.get(id)?.kind);
            let record = ctx.policy_service.update(id, version, changes);
            report_saved(&ctx.policy_service, record, "Record updated", json, log)
        }
        PolicyCommands::Enable { id, version, json } => {
            let ctx = get_context()?;
            log.set_kind(ctx.policy_service.get(id)?.kind);
            let record = ctx.policy_service.set_enabled(id, version, true);
            report_saved(&ctx.policy_service, record, "Record enabled", json, log)
        }
        PolicyCommands::Disable { id, version, json } => {
            let ctx = get_context()?;
            log.set_kind(ctx.policy_service.get(id)?.kind);
            let record = ctx.policy_service.set_enabled(id, version, false);
            report_saved(&ctx.policy_service, record, "Record disabled", json, log)
        }
        PolicyCommands::Remove { id, force } => run_remove(id, force, log),
        PolicyCommands::Edit { id } => run_edit(id, log),
    }
}

fn parse_metadata(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).context("Metadata must be valid JSON")
}

fn run_new(
    kind: RecordKind,
    name: &str,
    policy: Option<&str>,
    metadata: Option<&str>,
    json: bool,
    log: &CommandLog,
) -> Result<()> {
    let ctx = get_context()?;
    let service = &ctx.policy_service;
    let metadata = metadata.map(parse_metadata).transpose()?;

    let policy = match policy {
        Some(raw) => parse_policy_str(raw),
        None => {
            output::info(&format!("Building policy for {} '{}'", kind, name));
            match build_interactively(PolicyBuilder::new(Some(Policy::seed())), service)? {
                Some(policy) => policy,
                None => {
                    println!("{}", "Cancelled".dimmed());
                    return Ok(());
                }
            }
        }
    };

    let record = service.create(kind, name, policy, metadata);
    report_saved(service, record, "Record created", json, log)
}

fn run_list(kind: Option<RecordKind>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let service = &ctx.policy_service;
    let summaries: Vec<_> = service
        .list(kind)?
        .iter()
        .map(|record| service.describe(record))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No records found.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["ID", "Kind", "Name", "Enabled", "Version", "Policy"]);
    for summary in &summaries {
        table.add_row(vec![
            summary.id.clone(),
            summary.kind.to_string(),
            summary.name.clone(),
            output::flag(summary.enabled),
            summary.version.to_string(),
            summary.summary.clone(),
        ]);
    }
    println!("{}", table);
    println!();
    println!("{} record(s)", summaries.len());
    Ok(())
}

fn run_show(id: Uuid, json: bool, log: &CommandLog) -> Result<()> {
    let ctx = get_context()?;
    let service = &ctx.policy_service;
    let record = service.get(id)?;
    log.set_kind(record.kind);

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    print_record(service, &record);
    Ok(())
}

fn print_record(service: &PolicyService, record: &PolicyRecord) {
    println!("{}", record.name.bold());
    println!("  ID: {}", record.id);
    println!("  Kind: {}", record.kind);
    println!("  Enabled: {}", output::flag(record.enabled));
    println!("  Version: {}", record.version);
    println!("  Updated: {}", record.updated_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Policy: {}", service.format(&record.policy));
    if record.metadata.as_object().is_some_and(|m| !m.is_empty()) {
        println!("  Metadata: {}", record.metadata);
    }

    let issues = service.check(&record.policy);
    if !issues.is_empty() {
        output::warning("  Policy would not pass validation:");
        output::issues(&issues);
    }
}

fn run_remove(id: Uuid, force: bool, log: &CommandLog) -> Result<()> {
    let ctx = get_context()?;
    let record = ctx.policy_service.get(id)?;
    log.set_kind(record.kind);

    if !force {
        println!(
            "\n{}",
            format!("This will delete {} '{}'.", record.kind, record.name).yellow()
        );
        if !Confirm::new()
            .with_prompt("Are you sure?")
            .default(false)
            .interact()?
        {
            println!("{}\n", "Cancelled".dimmed());
            return Ok(());
        }
    }

    ctx.policy_service.delete(id)?;
    output::success(&format!("Record '{}' removed", record.name));
    Ok(())
}

fn run_edit(id: Uuid, log: &CommandLog) -> Result<()> {
    let ctx = get_context()?;
    let service = &ctx.policy_service;
    let record = service.get(id)?;
    log.set_kind(record.kind);

    output::info(&format!("Editing {} '{}' (version {})", record.kind, record.name, record.version));
    let Some(policy) = build_interactively(PolicyBuilder::new(Some(record.policy.clone())), service)?
    else {
        println!("{}", "Cancelled".dimmed());
        return Ok(());
    };

    let changes = RecordChanges {
        policy: Some(policy),
        ..Default::default()
    };
    let updated = service.update(id, record.version, changes);
    report_saved(service, updated, "Record updated", false, log)
}

/// Print the outcome of a write, exiting non-zero on validation and conflict errors
fn report_saved(
    service: &PolicyService,
    record: Result<PolicyRecord>,
    message: &str,
    json: bool,
    log: &CommandLog,
) -> Result<()> {
    let record = match record {
        Ok(record) => record,
        Err(e) => {
            let expected = matches!(
                e.downcast_ref::<Error>(),
                Some(Error::Validation(_) | Error::Conflict(_) | Error::NotFound(_))
            );
            if !expected {
                return Err(e);
            }
            log.failed(&e);
            if json {
                let result: OperationResult<()> = OperationResult::fail(e.to_string());
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                output::error(&e.to_string());
                if matches!(e.downcast_ref::<Error>(), Some(Error::Conflict(_))) {
                    println!(
                        "{}",
                        "Someone else changed this record. Run `lg policy show` for the latest version."
                            .dimmed()
                    );
                }
            }
            process::exit(1);
        }
    };

    if json {
        let result = OperationResult::ok(service.describe(&record));
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        output::success(message);
        print_record(service, &record);
    }
    Ok(())
}

const ACTION_ADD: &str = "Add condition";
const ACTION_EDIT: &str = "Edit condition";
const ACTION_REMOVE: &str = "Remove condition";
const ACTION_SAVE: &str = "Save";
const ACTION_CANCEL: &str = "Cancel";

/// Prompt loop over a `PolicyBuilder`
///
/// Returns `None` when the user cancels.
fn build_interactively(builder: PolicyBuilder, service: &PolicyService) -> Result<Option<Policy>> {
    let catalogs = service.catalogs();
    let edits = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&edits);
    let mut builder = builder.with_listener(move |_| counter.set(counter.get() + 1));

    loop {
        print_draft(builder.policy(), catalogs);

        let policy = builder.policy();
        let toggle = format!("Match {} conditions", match policy.logical_operator {
            LogicalOperator::And => "ANY (OR)",
            LogicalOperator::Or => "ALL (AND)",
        });
        let mut actions = vec![ACTION_ADD];
        if !policy.is_empty() {
            actions.push(ACTION_EDIT);
            actions.push(ACTION_REMOVE);
        }
        actions.push(toggle.as_str());
        actions.push(ACTION_SAVE);
        actions.push(ACTION_CANCEL);

        let choice = Select::new()
            .with_prompt("Policy")
            .items(&actions)
            .default(0)
            .interact()?;

        match actions[choice] {
            ACTION_ADD => {
                builder.add_condition();
                let index = builder.policy().conditions.len() - 1;
                edit_condition(&mut builder, index, catalogs)?;
            }
            ACTION_EDIT => {
                if let Some(index) = pick_condition(&builder, catalogs, "Edit which condition?")? {
                    edit_condition(&mut builder, index, catalogs)?;
                }
            }
            ACTION_REMOVE => {
                if let Some(index) = pick_condition(&builder, catalogs, "Remove which condition?")? {
                    builder.remove_condition(index);
                }
            }
            ACTION_SAVE => {
                let issues = service.check(builder.policy());
                if issues.is_empty() {
                    return Ok(Some(builder.into_policy()));
                }
                output::warning("This policy can't be saved yet:");
                output::issues(&issues);
            }
            ACTION_CANCEL => {
                if edits.get() == 0
                    || Confirm::new()
                        .with_prompt("Discard your changes?")
                        .default(false)
                        .interact()?
                {
                    return Ok(None);
                }
            }
            _ => {
                let next = match builder.policy().logical_operator {
                    LogicalOperator::And => LogicalOperator::Or,
                    LogicalOperator::Or => LogicalOperator::And,
                };
                builder.set_logical_operator(next);
            }
        }
    }
}

fn print_draft(policy: &Policy, catalogs: &Catalogs) {
    println!();
    if policy.is_empty() {
        println!("  {}", "No conditions set".dimmed());
        return;
    }
    for (i, condition) in policy.conditions.iter().enumerate() {
        let joiner = if i == 0 {
            "    ".to_string()
        } else {
            format!("{:>4}", policy.logical_operator.as_str())
        };
        let mut line = format!("{} {}. {}", joiner.dimmed(), i + 1, format_condition(condition, catalogs));
        if !condition.is_complete() {
            line.push_str(&format!(" {}", "(incomplete)".yellow()));
        }
        println!("{}", line);
    }
    println!();
}

fn pick_condition(
    builder: &PolicyBuilder,
    catalogs: &Catalogs,
    prompt: &str,
) -> Result<Option<usize>> {
    let conditions = &builder.policy().conditions;
    if conditions.len() == 1 {
        return Ok(Some(0));
    }
    let items: Vec<String> = conditions
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, format_condition(c, catalogs)))
        .collect();
    Ok(Select::new()
        .with_prompt(prompt)
        .items(&items)
        .default(0)
        .interact_opt()?)
}

/// Entries for the field selector
///
/// A field id the catalog doesn't know (legacy rows) is offered first as
/// "keep", so accepting the default leaves the row untouched.
struct FieldOptions {
    labels: Vec<String>,
    ids: Vec<String>,
    default: usize,
}

impl FieldOptions {
    fn new(catalogs: &Catalogs, current: &str) -> Self {
        let mut labels = Vec::new();
        let mut ids = Vec::new();
        if !current.is_empty() && catalogs.field(current).is_none() {
            labels.push(format!("Keep '{}' (not in catalog)", current));
            ids.push(current.to_string());
        }
        for field in catalogs.fields() {
            labels.push(field.label.clone());
            ids.push(field.id.clone());
        }
        let default = ids.iter().position(|id| id == current).unwrap_or(0);
        Self {
            labels,
            ids,
            default,
        }
    }
}

/// Field, then operator, then value; each step depends on the previous one
fn edit_condition(builder: &mut PolicyBuilder, index: usize, catalogs: &Catalogs) -> Result<()> {
    let Some(current) = builder.policy().conditions.get(index).cloned() else {
        return Ok(());
    };

    let options = FieldOptions::new(catalogs, &current.field);
    let choice = Select::new()
        .with_prompt("Field")
        .items(&options.labels)
        .default(options.default)
        .interact()?;
    let field_id = &options.ids[choice];
    if *field_id != current.field {
        builder.update_condition(index, ConditionPatch::field(field_id.clone()));
    }

    let Some(operators) = builder.operator_choices(index, catalogs) else {
        return Ok(());
    };
    if operators.is_empty() {
        output::warning("No operators are defined for this field");
        return Ok(());
    }
    let op_labels: Vec<&str> = operators.iter().map(|o| o.label.as_str()).collect();
    let default_op = operators
        .iter()
        .position(|o| o.id == current.operator)
        .unwrap_or(0);
    let op = Select::new()
        .with_prompt("Operator")
        .items(&op_labels)
        .default(default_op)
        .interact()?;
    let operator_id = operators[op].id.clone();
    builder.update_condition(index, ConditionPatch::operator(operator_id.clone()));

    let value = prompt_value(builder.value_editor(index, catalogs), &operator_id)?;
    builder.update_condition(index, ConditionPatch::value(value));
    Ok(())
}

fn prompt_value(editor: ValueEditor, operator: &str) -> Result<ConditionValue> {
    let value = match editor {
        ValueEditor::EnumSelect(options) if !options.is_empty() => {
            let choice = Select::new()
                .with_prompt("Value")
                .items(&options)
                .default(0)
                .interact()?;
            ConditionValue::from(options[choice].as_str())
        }
        ValueEditor::Number => {
            let raw: String = Input::new()
                .with_prompt("Value")
                .validate_with(|input: &String| -> std::result::Result<(), &'static str> {
                    input
                        .trim()
                        .parse::<f64>()
                        .map(|_| ())
                        .map_err(|_| "Enter a number")
                })
                .interact_text()?;
            number_value(raw.trim())
        }
        ValueEditor::Date if operator == "is_within_next_days" => {
            let raw: String = Input::new()
                .with_prompt("Days")
                .validate_with(|input: &String| -> std::result::Result<(), &'static str> {
                    input
                        .trim()
                        .parse::<u32>()
                        .map(|_| ())
                        .map_err(|_| "Enter a whole number of days")
                })
                .interact_text()?;
            number_value(raw.trim())
        }
        ValueEditor::Date => {
            let raw: String = Input::new()
                .with_prompt("Date (YYYY-MM-DD)")
                .validate_with(|input: &String| -> std::result::Result<(), &'static str> {
                    chrono::NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
                        .map(|_| ())
                        .map_err(|_| "Use YYYY-MM-DD")
                })
                .interact_text()?;
            ConditionValue::from(raw.trim())
        }
        ValueEditor::Text | ValueEditor::EnumSelect(_) => {
            let raw: String = Input::new().with_prompt("Value").interact_text()?;
            ConditionValue::from(raw.trim())
        }
    };
    Ok(value)
}

/// Whole numbers are stored without a fractional part
fn number_value(raw: &str) -> ConditionValue {
    match raw.parse::<i64>() {
        Ok(n) => ConditionValue::from(n),
        Err(_) => raw
            .parse::<f64>()
            .map(ConditionValue::from)
            .unwrap_or_else(|_| ConditionValue::from(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_is_kept_by_default() {
        let catalogs = Catalogs::default();
        let options = FieldOptions::new(&catalogs, "legacy_score");

        assert_eq!(options.ids.len(), catalogs.fields().len() + 1);
        assert_eq!(options.ids[options.default], "legacy_score");
        assert!(options.labels[0].contains("legacy_score"));
    }

    #[test]
    fn test_known_field_is_preselected() {
        let catalogs = Catalogs::default();
        let options = FieldOptions::new(&catalogs, "risk_level");
        assert_eq!(options.ids.len(), catalogs.fields().len());
        assert_eq!(options.ids[options.default], "risk_level");

        let blank = FieldOptions::new(&catalogs, "");
        assert_eq!(blank.default, 0);
        assert_eq!(blank.ids[0], catalogs.fields()[0].id);
    }

    #[test]
    fn test_command_log_carries_record_kind() {
        let log = CommandLog {
            logger: None,
            command: "policy show",
            kind: Cell::new(None),
        };
        assert_eq!(log.event("command").record_kind, None);

        log.set_kind(RecordKind::PermissionPolicy);
        let event = log.event("command_failed");
        assert_eq!(event.command.as_deref(), Some("policy show"));
        assert_eq!(event.record_kind.as_deref(), Some("permission_policy"));
    }

    #[test]
    fn test_whole_numbers_have_no_fraction() {
        assert_eq!(number_value("3").to_string(), "3");
        assert_eq!(number_value("12.5").to_string(), "12.5");
    }
}
