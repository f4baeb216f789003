//! Manual job trigger command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{push_opt, ApiClient, JobReport};
use crate::output::{color_status, print_json, print_table, print_warning, OutputFormat};

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "Job")]
    job: String,
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Records")]
    records: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Run a pipeline job now. Without a cluster the service runs it for every
/// configured cluster.
pub async fn run_job(
    client: &ApiClient,
    job: &str,
    cluster: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut query = Vec::new();
    push_opt(&mut query, "cluster", cluster);

    let reports: Vec<JobReport> = client
        .post(&format!("api/v1/jobs/{}", job), &query, &serde_json::json!({}))
        .await?;

    match format {
        OutputFormat::Json => print_json(&reports)?,
        OutputFormat::Table => {
            if reports.is_empty() {
                print_warning("No clusters configured");
                return Ok(());
            }

            let failed = reports.iter().filter(|r| r.outcome == "failed").count();
            let rows: Vec<JobRow> = reports
                .iter()
                .map(|r| JobRow {
                    job: r.job.clone(),
                    cluster: r.cluster.clone(),
                    outcome: color_status(&r.outcome),
                    records: r.records.map(|n| n.to_string()).unwrap_or_default(),
                    attempts: r.attempts,
                    duration: format!("{}ms", r.duration_ms),
                    detail: r.reason.clone().or_else(|| r.error.clone()).unwrap_or_default(),
                })
                .collect();
            print_table(rows);

            if failed > 0 {
                println!("\n{}", format!("{} run(s) failed", failed).red().bold());
            }
        }
    }

    Ok(())
}
