//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use discovery_lib::{RunReport, Settings};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for the run summary
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

#[derive(Tabled, Serialize)]
struct ExportRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Rows")]
    rows: usize,
}

/// Print a table from a list of items
fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print the artifacts of a completed run
pub fn print_report(report: &RunReport, settings: &Settings, format: OutputFormat) {
    let rows: Vec<ExportRow> = report
        .exports
        .iter()
        .map(|e| ExportRow {
            file: e.file.clone(),
            rows: e.rows,
        })
        .collect();
    print_table(&rows, format);

    if report.containers == 0 {
        print_warning(&format!(
            "No containers found on {}; check the address and that cadvisor metrics are scraped",
            settings.cluster()
        ));
    }
    print_success(&format!(
        "Discovered {} containers on {}, {} files written to {}",
        report.containers,
        settings.cluster(),
        report.exports.len(),
        settings.output_dir.display()
    ));
}
