//! Catalog command - show the fields and operators policies can use

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use ledgerguard_core::domain::ValueType;
use ledgerguard_core::Catalogs;

use super::load_catalogs;
use crate::output;

pub fn run(file: Option<&Path>, json: bool) -> Result<()> {
    let catalogs = match file {
        Some(path) => Catalogs::load(path)?,
        None => load_catalogs()?,
    };

    if json {
        let operators: serde_json::Map<String, serde_json::Value> = ValueType::ALL
            .iter()
            .map(|vt| {
                (
                    vt.as_str().to_string(),
                    serde_json::to_value(catalogs.operators_for(*vt)).unwrap_or_default(),
                )
            })
            .collect();
        let document = json!({
            "fields": catalogs.fields(),
            "operators": operators,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!("{}", "Fields".bold());
    let mut table = output::create_table();
    table.set_header(vec!["ID", "Label", "Type", "Allowed values"]);
    for field in catalogs.fields() {
        table.add_row(vec![
            field.id.clone(),
            field.label.clone(),
            field.value_type.as_str().to_string(),
            field
                .enum_values
                .as_ref()
                .map(|values| values.join(", "))
                .unwrap_or_default(),
        ]);
    }
    println!("{}", table);

    println!();
    println!("{}", "Operators".bold());
    let mut table = output::create_table();
    table.set_header(vec!["Type", "ID", "Label"]);
    for vt in ValueType::ALL {
        for op in catalogs.operators_for(vt) {
            table.add_row(vec![vt.as_str().to_string(), op.id.clone(), op.label.clone()]);
        }
    }
    println!("{}", table);

    Ok(())
}
