//! Recommendation-related CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{push_opt, Analysis, ApiClient, Recommendation, RecommendationSummary, StatusUpdate};
use crate::output::{
    color_priority, color_status, format_amount, format_currency, format_ratio, format_timestamp,
    print_heading, print_json, print_success, print_table, print_warning, truncate_id,
    OutputFormat,
};

/// Row for recommendations table
#[derive(Tabled)]
struct RecommendationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Workload")]
    workload: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Action")]
    kind: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Recommended")]
    recommended: String,
    #[tabled(rename = "Savings/mo")]
    savings: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Filters accepted by `recommendations list`
#[derive(Debug, Default)]
pub struct ListFilter {
    pub namespace: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub resource: Option<String>,
    pub limit: Option<usize>,
}

/// List recommendations with optional filters
pub async fn list_recommendations(
    client: &ApiClient,
    cluster: &str,
    filter: ListFilter,
    format: OutputFormat,
) -> Result<()> {
    let mut query = vec![("cluster", cluster.to_string())];
    push_opt(&mut query, "namespace", filter.namespace);
    push_opt(&mut query, "status", filter.status.map(|s| s.to_lowercase()));
    push_opt(&mut query, "priority", filter.priority.map(|p| p.to_lowercase()));
    push_opt(&mut query, "resource", filter.resource.map(|r| r.to_lowercase()));
    push_opt(&mut query, "limit", filter.limit);

    let analysis: Analysis<Vec<Recommendation>> = client.get("api/v1/recommendations", &query).await?;

    match format {
        OutputFormat::Json => print_json(&analysis)?,
        OutputFormat::Table => {
            let recommendations = match analysis {
                Analysis::Computed { result } => result,
                Analysis::InsufficientData { reason } => {
                    print_warning(&format!("No recommendations yet: {}", reason));
                    return Ok(());
                }
            };
            if recommendations.is_empty() {
                print_warning("No recommendations found");
                return Ok(());
            }

            let rows: Vec<RecommendationRow> = recommendations
                .iter()
                .map(|r| RecommendationRow {
                    id: truncate_id(&r.id),
                    namespace: r.namespace.clone(),
                    workload: r.workload.clone(),
                    resource: r.resource.clone(),
                    kind: r.kind.clone(),
                    current: format_amount(&r.resource, r.current_value),
                    recommended: format_amount(&r.resource, r.recommended_value),
                    savings: format_currency(r.potential_savings),
                    confidence: format_ratio(r.confidence_score),
                    priority: color_priority(&r.priority),
                    status: color_status(&r.status),
                })
                .collect();

            let savings: f64 = recommendations.iter().map(|r| r.potential_savings).sum();
            print_table(rows);
            println!(
                "\nTotal: {} recommendations, {} potential monthly savings",
                recommendations.len(),
                format_currency(savings).green()
            );
        }
    }

    Ok(())
}

/// Show one recommendation in full
pub async fn show_recommendation(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let rec: Recommendation = client
        .get(&format!("api/v1/recommendations/{}", id), &[])
        .await?;

    match format {
        OutputFormat::Json => print_json(&rec)?,
        OutputFormat::Table => print_details(&rec),
    }

    Ok(())
}

fn print_details(rec: &Recommendation) {
    print_heading("Recommendation");
    println!("ID:           {}", rec.id);
    println!("Workload:     {}/{} ({})", rec.namespace.cyan(), rec.workload.cyan(), rec.cluster);
    println!("Resource:     {}", rec.resource);
    println!("Action:       {}", rec.kind);
    println!("Priority:     {}", color_priority(&rec.priority));
    println!("Status:       {}", color_status(&rec.status));
    println!("Created:      {}", format_timestamp(&rec.created_at));
    if let Some(at) = &rec.implemented_at {
        println!("Implemented:  {}", format_timestamp(at));
    }
    println!();
    println!("Current:      {}", format_amount(&rec.resource, rec.current_value));
    println!(
        "Recommended:  {}",
        format_amount(&rec.resource, rec.recommended_value).green()
    );
    println!(
        "{}  {} per month (confidence {})",
        "Savings:".bold(),
        format_currency(rec.potential_savings).green().bold(),
        format_ratio(rec.confidence_score)
    );
    println!();
    println!("{}", rec.description);

    if !rec.remediation_steps.is_empty() {
        println!();
        println!("{}", "Steps".bold());
        for (i, step) in rec.remediation_steps.iter().enumerate() {
            println!("  {}. {}", i + 1, step);
        }
    }
}

/// Show counts and savings across recommendations
pub async fn show_summary(
    client: &ApiClient,
    cluster: &str,
    namespace: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut query = vec![("cluster", cluster.to_string())];
    push_opt(&mut query, "namespace", namespace);

    let summary: RecommendationSummary = client
        .get("api/v1/recommendations/summary", &query)
        .await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_heading(&format!("Recommendation Summary: {}", cluster.cyan()));
            println!("Total:                  {}", summary.total);
            println!("Pending:                {}", summary.pending.to_string().yellow());
            println!("Implemented:            {}", summary.implemented.to_string().green());
            println!("Dismissed:              {}", summary.dismissed);
            println!();
            println!(
                "Pending by priority:    {} high, {} medium, {} low",
                summary.by_priority.high.to_string().red().bold(),
                summary.by_priority.medium,
                summary.by_priority.low
            );
            for (kind, count) in &summary.by_kind {
                println!("  {:<22}{}", kind, count);
            }
            println!();
            println!(
                "{} {}",
                "Available savings:".bold(),
                format_currency(summary.pending_savings).green().bold()
            );
            println!(
                "Realized savings:       {}",
                format_currency(summary.implemented_savings)
            );
        }
    }

    Ok(())
}

/// Move a recommendation to `status` (implemented, dismissed or pending)
pub async fn set_status(client: &ApiClient, id: &str, status: &str, format: OutputFormat) -> Result<()> {
    let update = StatusUpdate {
        status: status.to_string(),
    };
    let rec: Recommendation = client
        .put(&format!("api/v1/recommendations/{}/status", id), &update)
        .await?;

    match format {
        OutputFormat::Json => print_json(&rec)?,
        OutputFormat::Table => {
            print_success(&format!("Recommendation {} marked {}", truncate_id(&rec.id), status));
            println!("Workload: {}/{}", rec.namespace, rec.workload);
            println!("Savings:  {} per month", format_currency(rec.potential_savings));
        }
    }

    Ok(())
}
