use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use humantime::format_duration;
use std::io::{self, Write};
use std::time::Duration;

use crate::models::{CodeFile, ExecutionResult, FileVersion, OutputKind, Project, Share};
use crate::runner::OutputSink;

/// Prints run output as it arrives: errors to stderr, everything else to
/// stdout with the console prefixes.
#[derive(Debug, Default)]
pub struct PrintSink;

impl OutputSink for PrintSink {
    fn write(&mut self, kind: OutputKind, message: &str) {
        match kind {
            OutputKind::Log => println!("{message}"),
            OutputKind::Info => println!("ℹ️ {message}"),
            OutputKind::Warn => println!("⚠️ {message}"),
            OutputKind::Error => eprintln!("{message}"),
        }
    }
}

pub fn short_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

pub fn print_projects(projects: &[Project]) {
    if projects.is_empty() {
        println!("No projects yet.");
        return;
    }
    for p in projects {
        println!(
            "{}  {:<24}  {}  {}",
            p.id,
            p.name,
            short_time(p.updated_at),
            p.description.as_deref().unwrap_or("")
        );
    }
}

pub fn print_files(files: &[CodeFile]) {
    if files.is_empty() {
        println!("No files.");
        return;
    }
    for f in files {
        println!(
            "{}  {:<24}  {:<10}  {}",
            f.id,
            f.name,
            f.language,
            short_time(f.updated_at)
        );
    }
}

pub fn print_versions(versions: &[FileVersion]) {
    if versions.is_empty() {
        println!("No versions saved yet.");
        return;
    }
    for v in versions {
        println!(
            "{}  v{:<4}  {}  {:>5} lines  {}",
            v.id,
            v.version_number,
            short_time(v.created_at),
            v.line_count(),
            v.description.as_deref().unwrap_or("")
        );
    }
}

pub fn print_shares(shares: &[Share], share_url: impl Fn(&str) -> String) {
    if shares.is_empty() {
        println!("No share links.");
        return;
    }
    for s in shares {
        let state = if s.is_active { "active" } else { "revoked" };
        println!(
            "{}  {:<4}  {:<7}  {}",
            s.id,
            s.permission,
            state,
            share_url(&s.share_token)
        );
    }
}

pub fn print_summary(result: &ExecutionResult) {
    let elapsed = result
        .execution_time_ms
        .map(|ms| format!(" in {}", format_duration(Duration::from_millis(ms))))
        .unwrap_or_default();
    eprintln!("[exit {}{elapsed}]", result.exit_code);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value).context("serialize output")?;
    writeln!(out)?;
    Ok(())
}
