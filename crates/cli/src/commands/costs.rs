//! Cost-related CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{
    push_opt, Allocation, Analysis, ApiClient, Comparison, CostOverview, CostTrendPoint, Forecast,
    TopSpenders,
};
use crate::output::{
    color_change, color_status, format_currency, format_date, print_heading, print_json,
    print_table, print_warning, OutputFormat,
};

/// Row for the allocations table
#[derive(Tabled)]
struct AllocationRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Period")]
    period: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Storage")]
    storage: String,
    #[tabled(rename = "Other")]
    other: String,
    #[tabled(rename = "Total")]
    total: String,
}

/// Row for the comparisons table
#[derive(Tabled)]
struct ComparisonRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Previous")]
    previous: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Change")]
    change: String,
    #[tabled(rename = "Delta")]
    delta: String,
}

#[derive(Tabled)]
struct ForecastRow {
    #[tabled(rename = "Month")]
    period: String,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
}

#[derive(Tabled)]
struct SpenderRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "Monthly Avg")]
    monthly: String,
    #[tabled(rename = "Records")]
    records: usize,
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Billed")]
    cost: String,
    #[tabled(rename = "Share")]
    share: String,
}

#[derive(Tabled)]
struct TrendRow {
    #[tabled(rename = "Month")]
    period: String,
    #[tabled(rename = "Total")]
    cost: String,
    #[tabled(rename = "Top Namespace")]
    top: String,
}

/// Show namespace allocations
pub async fn show_allocations(
    client: &ApiClient,
    cluster: &str,
    namespace: Option<String>,
    start: Option<String>,
    end: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut query = vec![("cluster", cluster.to_string())];
    push_opt(&mut query, "namespace", namespace);
    push_opt(&mut query, "start", start);
    push_opt(&mut query, "end", end);

    let mut allocations: Vec<Allocation> = client.get("api/v1/allocations", &query).await?;

    match format {
        OutputFormat::Json => print_json(&allocations)?,
        OutputFormat::Table => {
            if allocations.is_empty() {
                print_warning("No allocations found");
                return Ok(());
            }

            allocations.sort_by(|a, b| {
                a.period
                    .start
                    .cmp(&b.period.start)
                    .then(b.total_cost.total_cmp(&a.total_cost))
            });
            let total: f64 = allocations.iter().map(|a| a.total_cost).sum();

            let rows: Vec<AllocationRow> = allocations
                .iter()
                .map(|a| AllocationRow {
                    namespace: a.namespace.clone(),
                    period: format!("{} .. {}", format_date(&a.period.start), format_date(&a.period.end)),
                    cpu: format_currency(a.cpu_cost),
                    memory: format_currency(a.memory_cost),
                    storage: format_currency(a.storage_cost),
                    other: format_currency(a.other_cost + a.network_cost),
                    total: format_currency(a.total_cost),
                })
                .collect();

            print_heading(&format!("Cost Allocation: {}", cluster.cyan()));
            print_table(rows);
            println!("\n{} {}", "Total allocated:".bold(), format_currency(total).bold());
        }
    }

    Ok(())
}

/// Show period-over-period comparisons
pub async fn show_comparisons(
    client: &ApiClient,
    cluster: &str,
    namespace: Option<String>,
    kind: &str,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let mut query = vec![("cluster", cluster.to_string()), ("kind", kind.to_string())];
    push_opt(&mut query, "namespace", namespace);
    push_opt(&mut query, "limit", limit);

    let analysis: Analysis<Vec<Comparison>> = client.get("api/v1/comparisons", &query).await?;

    match format {
        OutputFormat::Json => print_json(&analysis)?,
        OutputFormat::Table => {
            let comparisons = match analysis {
                Analysis::Computed { result } => result,
                Analysis::InsufficientData { reason } => {
                    print_warning(&format!("No comparisons yet: {}", reason));
                    return Ok(());
                }
            };
            let latest = match comparisons.iter().map(|c| c.current_period.start.as_str()).max() {
                Some(latest) => latest.to_string(),
                None => {
                    print_warning("No comparisons match the filter");
                    return Ok(());
                }
            };
            // one row per namespace, newest window only
            let mut current: Vec<&Comparison> = comparisons
                .iter()
                .filter(|c| c.current_period.start == latest)
                .collect();
            current.sort_by(|a, b| b.absolute_change.total_cmp(&a.absolute_change));

            let first = current[0];
            print_heading(&format!("{} Comparison: {}", kind, cluster.cyan()));
            println!(
                "Current:  {} .. {}",
                format_date(&first.current_period.start),
                format_date(&first.current_period.end)
            );
            println!(
                "Previous: {} .. {}\n",
                format_date(&first.previous_period.start),
                format_date(&first.previous_period.end)
            );

            let rows: Vec<ComparisonRow> = current
                .iter()
                .map(|c| ComparisonRow {
                    namespace: c.namespace.clone(),
                    previous: format_currency(c.previous_cost),
                    current: format_currency(c.current_cost),
                    change: color_change(&c.percentage_change),
                    delta: format_currency(c.absolute_change),
                })
                .collect();
            print_table(rows);
        }
    }

    Ok(())
}

/// Show the cost trend and projection
pub async fn show_forecast(
    client: &ApiClient,
    cluster: &str,
    namespace: Option<String>,
    months: usize,
    horizon: usize,
    format: OutputFormat,
) -> Result<()> {
    let mut query = vec![
        ("cluster", cluster.to_string()),
        ("months", months.to_string()),
        ("horizon", horizon.to_string()),
    ];
    push_opt(&mut query, "namespace", namespace);

    let analysis: Analysis<Forecast> = client.get("api/v1/forecast", &query).await?;

    match format {
        OutputFormat::Json => print_json(&analysis)?,
        OutputFormat::Table => {
            let forecast = match analysis {
                Analysis::Computed { result } => result,
                Analysis::InsufficientData { reason } => {
                    print_warning(&format!("Not enough history to forecast: {}", reason));
                    return Ok(());
                }
            };

            let scope = forecast.namespace.as_deref().unwrap_or("all namespaces");
            print_heading(&format!("Cost Forecast: {} ({})", cluster.cyan(), scope));
            println!(
                "Trend: {} ({}/month)\n",
                color_status(&forecast.trend),
                format_currency(forecast.slope)
            );

            let mut rows: Vec<ForecastRow> = forecast
                .historical
                .iter()
                .map(|h| ForecastRow {
                    period: h.period.clone(),
                    cost: format_currency(h.cost),
                    kind: "actual".to_string(),
                    confidence: String::new(),
                })
                .collect();
            rows.extend(forecast.forecast.iter().map(|f| ForecastRow {
                period: f.period.clone(),
                cost: format_currency(f.predicted_cost).cyan().to_string(),
                kind: "forecast".to_string(),
                confidence: f.confidence.clone(),
            }));
            print_table(rows);
        }
    }

    Ok(())
}

/// Show the top spending namespaces and bill services
pub async fn show_top_spenders(
    client: &ApiClient,
    cluster: &str,
    months: u32,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let query = vec![
        ("cluster", cluster.to_string()),
        ("months", months.to_string()),
        ("limit", limit.to_string()),
    ];
    let result: TopSpenders = client.get("api/v1/top-spenders", &query).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            print_heading(&format!("Top Spenders: last {} months", result.months));

            for (title, spenders) in [("Namespaces", &result.namespaces), ("Services", &result.services)] {
                println!("{}", title.bold());
                if spenders.is_empty() {
                    print_warning("No cost data");
                } else {
                    print_table(
                        spenders
                            .iter()
                            .map(|s| SpenderRow {
                                name: s.name.clone(),
                                total: format_currency(s.total_cost),
                                monthly: format_currency(s.average_monthly_cost),
                                records: s.record_count,
                            })
                            .collect(),
                    );
                }
                println!();
            }
        }
    }

    Ok(())
}

/// Show the bill against allocated cost for a window
pub async fn show_overview(
    client: &ApiClient,
    cluster: &str,
    start: Option<String>,
    end: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut query = vec![("cluster", cluster.to_string())];
    push_opt(&mut query, "start", start);
    push_opt(&mut query, "end", end);

    let analysis: Analysis<CostOverview> = client.get("api/v1/overview", &query).await?;

    match format {
        OutputFormat::Json => print_json(&analysis)?,
        OutputFormat::Table => {
            let overview = match analysis {
                Analysis::Computed { result } => result,
                Analysis::InsufficientData { reason } => {
                    print_warning(&format!("No cost data: {}", reason));
                    return Ok(());
                }
            };

            print_heading(&format!("Cost Overview: {}", cluster.cyan()));
            println!(
                "Period:       {} .. {}",
                format_date(&overview.period.start),
                format_date(&overview.period.end)
            );
            println!("Billed:       {}", format_currency(overview.total_bill).bold());
            println!(
                "Allocated:    {} across {} namespaces",
                format_currency(overview.allocated_cost),
                overview.namespace_count
            );
            let gap = format_currency(overview.unallocated_cost);
            if overview.unallocated_cost.abs() < 0.005 {
                println!("Unallocated:  {}", gap.green());
            } else {
                println!("Unallocated:  {}", gap.yellow());
            }

            if !overview.by_service.is_empty() {
                println!();
                let mut services: Vec<(&String, &f64)> = overview.by_service.iter().collect();
                services.sort_by(|a, b| b.1.total_cmp(a.1));
                print_table(
                    services
                        .into_iter()
                        .map(|(service, cost)| ServiceRow {
                            service: service.clone(),
                            cost: format_currency(*cost),
                            share: if overview.total_bill > 0.0 {
                                format!("{:.1}%", cost / overview.total_bill * 100.0)
                            } else {
                                "-".to_string()
                            },
                        })
                        .collect(),
                );
            }
        }
    }

    Ok(())
}

/// Show allocated cost per month
pub async fn show_trends(
    client: &ApiClient,
    cluster: &str,
    namespace: Option<String>,
    months: usize,
    format: OutputFormat,
) -> Result<()> {
    let mut query = vec![("cluster", cluster.to_string()), ("months", months.to_string())];
    push_opt(&mut query, "namespace", namespace);

    let analysis: Analysis<Vec<CostTrendPoint>> = client.get("api/v1/trends", &query).await?;

    match format {
        OutputFormat::Json => print_json(&analysis)?,
        OutputFormat::Table => {
            let trends = match analysis {
                Analysis::Computed { result } => result,
                Analysis::InsufficientData { reason } => {
                    print_warning(&format!("No cost history: {}", reason));
                    return Ok(());
                }
            };

            print_heading(&format!("Monthly Cost: {}", cluster.cyan()));
            let rows: Vec<TrendRow> = trends
                .iter()
                .map(|t| TrendRow {
                    period: t.period.clone(),
                    cost: format_currency(t.cost),
                    top: t
                        .namespace_costs
                        .iter()
                        .max_by(|a, b| a.1.total_cmp(b.1))
                        .map(|(ns, cost)| format!("{} ({})", ns, format_currency(*cost)))
                        .unwrap_or_default(),
                })
                .collect();
            print_table(rows);
        }
    }

    Ok(())
}
