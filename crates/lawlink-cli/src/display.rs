//! Terminal rendering for resolutions and catalog records.
//!
//! Resolutions print as an Arrow pretty table; single records print as a
//! vertical card grouped into sections.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use lawlink_core::{CatalogSnapshot, LawRecord};
use lawlink_resolve::ResolvedBatch;

const MAX_DESCRIPTION: usize = 72;
const LABEL_WIDTH: usize = 14;

// ── Resolutions ──

/// Print one row per reference: tier, matched key, score, description.
pub fn print_resolutions(batch: &ResolvedBatch) -> anyhow::Result<()> {
    if batch.is_empty() {
        println!("(no references)");
        return Ok(());
    }
    let table = resolutions_batch(batch)?;
    println!("{}", pretty_format_batches(&[table])?);
    println!("{} of {} references resolved", batch.matched(), batch.len());
    Ok(())
}

fn resolutions_batch(batch: &ResolvedBatch) -> anyhow::Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("reference", DataType::Utf8, false),
        Field::new("tier", DataType::Utf8, false),
        Field::new("matched", DataType::Utf8, true),
        Field::new("score", DataType::Float32, false),
        Field::new("description", DataType::Utf8, false),
    ]));

    let references: StringArray = batch.iter().map(|r| Some(r.query.as_str())).collect();
    let tiers: StringArray = batch.iter().map(|r| Some(r.tier.as_str())).collect();
    let matched: StringArray = batch.iter().map(|r| r.matched_key.as_deref()).collect();
    let scores: Float32Array = batch.iter().map(|r| Some(r.score)).collect();
    let descriptions: StringArray = batch
        .iter()
        .map(|r| Some(truncate(&r.description, MAX_DESCRIPTION)))
        .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(references),
        Arc::new(tiers),
        Arc::new(matched),
        Arc::new(scores),
        Arc::new(descriptions),
    ];
    Ok(RecordBatch::try_new(schema, columns)?)
}

// ── Records ──

/// Print a single law as a vertical card.
pub fn print_law_card(record: &LawRecord) {
    println!("=== {} ===", record.key);
    println!();

    print_section(
        "Identity",
        &[
            ("key", Some(record.key.as_str())),
            ("category", record.category.as_deref()),
            ("jurisdiction", record.jurisdiction.as_deref()),
        ],
    );

    println!("Description");
    for line in wrap(&record.description, MAX_DESCRIPTION) {
        println!("  {line}");
    }
    println!();

    let updated = record.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string();
    print_section("Timestamps", &[("updated_at", Some(updated.as_str()))]);
}

/// Print version, record count, and per-category / per-jurisdiction counts.
pub fn print_catalog_stats(snapshot: &CatalogSnapshot) {
    println!("Catalog");
    println!("  {:<LABEL_WIDTH$} {}", "version", snapshot.version());
    println!("  {:<LABEL_WIDTH$} {}", "records", snapshot.len());
    println!();

    print_counts("Categories", snapshot.records().map(|r| r.category.as_deref()));
    print_counts(
        "Jurisdictions",
        snapshot.records().map(|r| r.jurisdiction.as_deref()),
    );
}

fn print_section(header: &str, rows: &[(&str, Option<&str>)]) {
    if rows.iter().all(|(_, v)| v.is_none()) {
        return;
    }
    println!("{header}");
    for (label, value) in rows {
        if let Some(value) = value {
            println!("  {label:<LABEL_WIDTH$} {value}");
        }
    }
    println!();
}

fn print_counts<'a>(header: &str, values: impl Iterator<Item = Option<&'a str>>) {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value.unwrap_or("(none)")).or_default() += 1;
    }
    if counts.len() == 1 && counts.contains_key("(none)") {
        return;
    }
    println!("{header}");
    for (name, n) in counts {
        println!("  {name:<LABEL_WIDTH$} {n}");
    }
    println!();
}

// ── Helpers ──

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

/// Greedy word wrap; words longer than `width` get a line of their own.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}
