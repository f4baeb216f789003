//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::client::PercentChange;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a section heading
pub fn print_heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(50));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format dollars
pub fn format_currency(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", amount.abs())
    } else {
        format!("${:.2}", amount)
    }
}

/// Format a utilization or confidence ratio as a percentage
pub fn format_ratio(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Format a resource amount; memory and storage arrive in bytes
pub fn format_amount(resource: &str, amount: f64) -> String {
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    match resource {
        "cpu" => format!("{:.2} cores", amount),
        _ => format!("{:.2} GB", amount / GB),
    }
}

/// Color a period-over-period change: increases red, decreases green
pub fn color_change(change: &PercentChange) -> String {
    match change {
        PercentChange::Finite(pct) if *pct > 0.0 => format!("{:+.1}%", pct).red().to_string(),
        PercentChange::Finite(pct) if *pct < 0.0 => format!("{:+.1}%", pct).green().to_string(),
        PercentChange::Finite(pct) => format!("{:+.1}%", pct),
        PercentChange::Unbounded => "new".yellow().to_string(),
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "pending" => status.yellow().to_string(),
        "implemented" => status.green().to_string(),
        "dismissed" => status.dimmed().to_string(),
        "succeeded" | "computed" | "good" | "decreasing" => status.green().to_string(),
        "insufficient_data" | "moderate" | "stable" => status.yellow().to_string(),
        "failed" | "poor" | "increasing" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color priority based on value
pub fn color_priority(priority: &str) -> String {
    match priority.to_lowercase().as_str() {
        "high" => priority.red().bold().to_string(),
        "medium" => priority.yellow().to_string(),
        "low" => priority.blue().to_string(),
        _ => priority.to_string(),
    }
}

/// Shorten an id for table display
pub fn truncate_id(id: &str) -> String {
    if id.len() > 8 {
        format!("{}...", &id[..8])
    } else {
        id.to_string()
    }
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M").to_string()
    } else {
        ts.to_string()
    }
}

/// Format an RFC 3339 timestamp as a date
pub fn format_date(ts: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d").to_string()
    } else {
        ts.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(12.5), "$12.50");
        assert_eq!(format_currency(-3.0), "-$3.00");
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount("cpu", 2.5), "2.50 cores");
        assert_eq!(format_amount("memory", 4.0 * 1024.0 * 1024.0 * 1024.0), "4.00 GB");
    }

    #[test]
    fn test_truncate_id() {
        assert_eq!(truncate_id("0f3c9a1e-7b2d-4c55-9a61-2f0e8d7b6c41"), "0f3c9a1e...");
        assert_eq!(truncate_id("short"), "short");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp("2024-03-01T12:30:00Z"), "2024-03-01 12:30");
        assert_eq!(format_date("2024-03-01T12:30:00Z"), "2024-03-01");
        assert_eq!(format_timestamp("not a timestamp"), "not a timestamp");
    }
}
