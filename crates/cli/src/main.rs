//! CostGuard CLI
//!
//! A command-line tool for viewing namespace cost allocations, comparisons
//! and forecasts, and for working through cost-optimization recommendations.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{costs, efficiency, jobs, recommendations};

/// CostGuard CLI
#[derive(Parser)]
#[command(name = "ccg")]
#[command(author, version, about = "CLI for the CostGuard cost analytics service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via CCG_API_URL env var)
    #[arg(long, env = "CCG_API_URL")]
    pub api_url: Option<String>,

    /// Cluster to query (can also be set via CCG_CLUSTER env var)
    #[arg(long, short, env = "CCG_CLUSTER", global = true)]
    pub cluster: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// View cost allocations, comparisons and forecasts
    #[command(subcommand)]
    Costs(CostsCommands),

    /// Work with cost-optimization recommendations
    #[command(subcommand)]
    Recommendations(RecommendationCommands),

    /// Show resource utilization scores per namespace
    Efficiency {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Days of usage to score
        #[arg(long, default_value_t = 7)]
        days: u32,
    },

    /// Run a pipeline job now (allocation, comparison, forecast, recommendations)
    Run {
        /// Job to run
        job: String,

        /// Run for every configured cluster instead of one
        #[arg(long)]
        all_clusters: bool,
    },

    /// Show or change CLI defaults
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum CostsCommands {
    /// Show namespace allocations (current month by default)
    Allocations {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Window start (RFC 3339, e.g. 2024-03-01T00:00:00Z)
        #[arg(long)]
        start: Option<String>,

        /// Window end (RFC 3339)
        #[arg(long)]
        end: Option<String>,
    },

    /// Show period-over-period cost changes
    Compare {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Comparison kind (month-over-month, week-over-week)
        #[arg(long, default_value = "month-over-month")]
        kind: String,

        /// Maximum rows to fetch
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show the monthly cost trend and projection
    Forecast {
        /// Forecast one namespace instead of the whole cluster
        #[arg(long, short)]
        namespace: Option<String>,

        /// Complete months of history to fit
        #[arg(long, default_value_t = 6)]
        months: usize,

        /// Months to project
        #[arg(long, default_value_t = 3)]
        horizon: usize,
    },

    /// Show the bill against allocated cost (current month by default)
    Overview {
        /// Window start (RFC 3339)
        #[arg(long)]
        start: Option<String>,

        /// Window end (RFC 3339)
        #[arg(long)]
        end: Option<String>,
    },

    /// Show allocated cost per month
    Trends {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Complete months to show
        #[arg(long, default_value_t = 12)]
        months: usize,
    },

    /// Show the highest spending namespaces and bill services
    Top {
        /// Months of history to rank
        #[arg(long, default_value_t = 3)]
        months: u32,

        /// Entries per list
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum RecommendationCommands {
    /// List recommendations
    List {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Filter by status (pending, implemented, dismissed)
        #[arg(long)]
        status: Option<String>,

        /// Filter by priority (high, medium, low)
        #[arg(long)]
        priority: Option<String>,

        /// Filter by resource (cpu, memory, storage)
        #[arg(long)]
        resource: Option<String>,

        /// Maximum rows to fetch
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one recommendation with its remediation steps
    Show {
        /// Recommendation ID
        id: String,
    },

    /// Show counts and savings by status and priority
    Summary {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Mark a recommendation as implemented
    Implement {
        /// Recommendation ID
        id: String,
    },

    /// Dismiss a recommendation so it is not raised again
    Dismiss {
        /// Recommendation ID
        id: String,
    },

    /// Move a dismissed recommendation back to pending
    Reopen {
        /// Recommendation ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Save defaults to the config file
    Set {
        /// Default API endpoint URL
        #[arg(long)]
        api_url: Option<String>,

        /// Default cluster
        #[arg(long)]
        default_cluster: Option<String>,

        /// Default namespace filter
        #[arg(long)]
        default_namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let file_config = config::Config::load()?;

    let api_url = file_config.resolve_api_url(cli.api_url.clone());
    let cluster = file_config.resolve_cluster(cli.cluster.clone());
    if cli.verbose {
        output::print_info(&format!("Using {} for cluster {}", api_url, cluster));
    }

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Costs(costs_cmd) => match costs_cmd {
            CostsCommands::Allocations { namespace, start, end } => {
                let namespace = file_config.resolve_namespace(namespace);
                costs::show_allocations(&client, &cluster, namespace, start, end, cli.format).await?;
            }
            CostsCommands::Compare { namespace, kind, limit } => {
                let namespace = file_config.resolve_namespace(namespace);
                costs::show_comparisons(&client, &cluster, namespace, &kind, limit, cli.format).await?;
            }
            CostsCommands::Forecast { namespace, months, horizon } => {
                costs::show_forecast(&client, &cluster, namespace, months, horizon, cli.format).await?;
            }
            CostsCommands::Overview { start, end } => {
                costs::show_overview(&client, &cluster, start, end, cli.format).await?;
            }
            CostsCommands::Trends { namespace, months } => {
                let namespace = file_config.resolve_namespace(namespace);
                costs::show_trends(&client, &cluster, namespace, months, cli.format).await?;
            }
            CostsCommands::Top { months, limit } => {
                costs::show_top_spenders(&client, &cluster, months, limit, cli.format).await?;
            }
        },
        Commands::Recommendations(rec_cmd) => match rec_cmd {
            RecommendationCommands::List {
                namespace,
                status,
                priority,
                resource,
                limit,
            } => {
                let filter = recommendations::ListFilter {
                    namespace: file_config.resolve_namespace(namespace),
                    status,
                    priority,
                    resource,
                    limit,
                };
                recommendations::list_recommendations(&client, &cluster, filter, cli.format).await?;
            }
            RecommendationCommands::Show { id } => {
                recommendations::show_recommendation(&client, &id, cli.format).await?;
            }
            RecommendationCommands::Summary { namespace } => {
                let namespace = file_config.resolve_namespace(namespace);
                recommendations::show_summary(&client, &cluster, namespace, cli.format).await?;
            }
            RecommendationCommands::Implement { id } => {
                recommendations::set_status(&client, &id, "implemented", cli.format).await?;
            }
            RecommendationCommands::Dismiss { id } => {
                recommendations::set_status(&client, &id, "dismissed", cli.format).await?;
            }
            RecommendationCommands::Reopen { id } => {
                recommendations::set_status(&client, &id, "pending", cli.format).await?;
            }
        },
        Commands::Efficiency { namespace, days } => {
            let namespace = file_config.resolve_namespace(namespace);
            efficiency::show_efficiency(&client, &cluster, namespace, days, cli.format).await?;
        }
        Commands::Run { job, all_clusters } => {
            let target = if all_clusters { None } else { Some(cluster) };
            jobs::run_job(&client, &job, target, cli.format).await?;
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show => {
                output::print_json(&config::Config {
                    api_url: Some(api_url),
                    default_cluster: Some(cluster),
                    default_namespace: file_config.default_namespace.clone(),
                })?;
            }
            ConfigCommands::Set {
                api_url,
                default_cluster,
                default_namespace,
            } => {
                let updated = config::Config {
                    api_url: api_url.or(file_config.api_url),
                    default_cluster: default_cluster.or(file_config.default_cluster),
                    default_namespace: default_namespace.or(file_config.default_namespace),
                };
                let path = updated.save()?;
                output::print_success(&format!("Saved {}", path.display()));
            }
        },
    }

    Ok(())
}
