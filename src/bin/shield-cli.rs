use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Operator CLI for the request-shield admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "SHIELD_ADMIN_KEY")]
    key: String,

    /// Name recorded as the actor on audited changes
    #[arg(long)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show shield status and counts
    Status,
    /// Show list state and history for an address
    Lookup { address: String },
    /// Block an address
    Block {
        address: String,
        #[arg(short, long)]
        reason: String,
        /// Omit for a permanent block
        #[arg(long)]
        hours: Option<u32>,
    },
    /// Lift an active block
    Unblock { address: String },
    /// Exempt an address from blocking
    Whitelist {
        address: String,
        #[arg(long)]
        hours: Option<u32>,
    },
    /// Remove an address from the whitelist
    Unwhitelist { address: String },
    /// List active blocks
    Blocked,
    /// List active whitelist entries
    Whitelisted,
    /// Query the audit trail
    Audit {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        risk: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 50)]
        page_size: usize,
    },
    /// Clear rate limit counters for an address
    ResetLimit {
        address: String,
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let base = cli.url.trim_end_matches('/');

    let mut actor_query: Vec<(&str, String)> = Vec::new();
    if let Some(actor) = &cli.actor {
        actor_query.push(("actor", actor.clone()));
    }

    let res = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")).send().await?,
        Commands::Lookup { address } => client.get(format!("{base}/admin/ip/{address}")).send().await?,
        Commands::Block {
            address,
            reason,
            hours,
        } => {
            client
                .post(format!("{base}/admin/ip/block"))
                .json(&json!({
                    "address": address,
                    "reason": reason,
                    "duration_hours": hours,
                    "actor": cli.actor,
                }))
                .send()
                .await?
        }
        Commands::Unblock { address } => {
            client
                .delete(format!("{base}/admin/ip/block/{address}"))
                .query(&actor_query)
                .send()
                .await?
        }
        Commands::Whitelist { address, hours } => {
            client
                .post(format!("{base}/admin/ip/whitelist"))
                .json(&json!({
                    "address": address,
                    "duration_hours": hours,
                    "actor": cli.actor,
                }))
                .send()
                .await?
        }
        Commands::Unwhitelist { address } => {
            client
                .delete(format!("{base}/admin/ip/whitelist/{address}"))
                .query(&actor_query)
                .send()
                .await?
        }
        Commands::Blocked => client.get(format!("{base}/admin/ip/blocked")).send().await?,
        Commands::Whitelisted => client.get(format!("{base}/admin/ip/whitelisted")).send().await?,
        Commands::Audit {
            category,
            action,
            risk,
            address,
            page,
            page_size,
        } => {
            let mut query: Vec<(&str, String)> = vec![
                ("page", page.to_string()),
                ("page_size", page_size.to_string()),
            ];
            if let Some(v) = category {
                query.push(("category", v));
            }
            if let Some(v) = action {
                query.push(("action", v));
            }
            if let Some(v) = risk {
                query.push(("risk_level", v));
            }
            if let Some(v) = address {
                query.push(("address", v));
            }
            client
                .get(format!("{base}/admin/audit"))
                .query(&query)
                .send()
                .await?
        }
        Commands::ResetLimit { address, endpoint } => {
            let mut query = actor_query.clone();
            if let Some(endpoint) = endpoint {
                query.push(("endpoint", endpoint));
            }
            client
                .delete(format!("{base}/admin/rate-limit/{address}"))
                .query(&query)
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: admin API returned status {status}");
        if let Ok(text) = res.text().await {
            eprintln!("Response: {text}");
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
