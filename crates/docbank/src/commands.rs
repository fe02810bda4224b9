//! Command handlers for the docbank CLI.

use anyhow::{bail, Context};
use docbank_couchdb::CouchConfig;
use docbank_storage::{Criteria, Databank};
use serde_json::{json, Value};
use std::path::PathBuf;

/// Parse a value argument as JSON.
pub fn parse_value(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("invalid JSON value: {raw}"))
}

/// Parse `PATH=JSON` filters into search criteria.
///
/// A right-hand side that isn't valid JSON is taken as a plain string, so
/// `--where name=ada` works without quoting.
pub fn parse_filters(filters: &[String]) -> anyhow::Result<Criteria> {
    let mut criteria = Criteria::new();
    for filter in filters {
        let Some((path, raw)) = filter.split_once('=') else {
            bail!("invalid filter {filter:?}, expected PATH=JSON");
        };
        if path.is_empty() {
            bail!("invalid filter {filter:?}, path is empty");
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        criteria.insert(path.to_string(), value);
    }
    Ok(criteria)
}

pub fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn search(bank: &dyn Databank, kind: &str, filters: &[String]) -> anyhow::Result<()> {
    let criteria = parse_filters(filters)?;
    let mut hits = Vec::new();
    bank.search(kind, &criteria, &mut |value: Value| hits.push(value))
        .await?;
    print_json(&Value::Array(hits))
}

pub async fn read_all(bank: &dyn Databank, kind: &str, ids: &[String]) -> anyhow::Result<()> {
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    let values = bank.read_all(kind, &ids).await?;
    print_json(&serde_json::to_value(values)?)
}

/// Report a successful connection.
pub fn ping(in_memory: bool, config: &CouchConfig) -> anyhow::Result<()> {
    let report = if in_memory {
        json!({"driver": "memory", "ok": true})
    } else {
        json!({
            "driver": "couchdb",
            "location": config.location,
            "database": config.database,
            "ok": true,
        })
    };
    print_json(&report)
}

/// Show configuration sources and the effective configuration.
pub fn show_config(config: &CouchConfig, sources: &[PathBuf]) -> anyhow::Result<()> {
    println!("Configuration sources:");
    if sources.is_empty() {
        println!("  (none)");
    } else {
        for source in sources {
            println!("  {}", source.display());
        }
    }
    println!();

    println!("Current configuration:");
    println!("{}", serde_json::to_string_pretty(&redacted(config))?);

    Ok(())
}

fn redacted(config: &CouchConfig) -> CouchConfig {
    let mut config = config.clone();
    if config.password.is_some() {
        config.password = Some("********".to_string());
    }
    config
}
