//! Resource efficiency CLI command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{push_opt, Analysis, ApiClient, NamespaceEfficiency};
use crate::output::{
    color_status, format_ratio, print_heading, print_json, print_table, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct EfficiencyRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Avg Utilization")]
    utilization: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Samples")]
    samples: usize,
}

/// Show per-namespace utilization scores
pub async fn show_efficiency(
    client: &ApiClient,
    cluster: &str,
    namespace: Option<String>,
    days: u32,
    format: OutputFormat,
) -> Result<()> {
    let mut query = vec![("cluster", cluster.to_string()), ("days", days.to_string())];
    push_opt(&mut query, "namespace", namespace);

    let analysis: Analysis<Vec<NamespaceEfficiency>> = client.get("api/v1/efficiency", &query).await?;

    match format {
        OutputFormat::Json => print_json(&analysis)?,
        OutputFormat::Table => {
            let namespaces = match analysis {
                Analysis::Computed { result } => result,
                Analysis::InsufficientData { reason } => {
                    print_warning(&format!("No efficiency data: {}", reason));
                    return Ok(());
                }
            };

            let rows: Vec<EfficiencyRow> = namespaces
                .iter()
                .flat_map(|ns| {
                    ns.dimensions.iter().map(move |(resource, dim)| EfficiencyRow {
                        namespace: ns.namespace.clone(),
                        resource: resource.clone(),
                        utilization: format_ratio(dim.avg_utilization),
                        score: color_status(&dim.score),
                        samples: dim.sample_count,
                    })
                })
                .collect();

            print_heading(&format!("Resource Efficiency: {} (last {} days)", cluster.cyan(), days));
            print_table(rows);
        }
    }

    Ok(())
}
