use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the SilkRoad proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy system status
    Status,
    /// Show the live session count
    Sessions,
    /// Expire stale sessions now
    Recycle,
    /// Show cache usage and client pool occupancy
    Cache,
    /// Remove one cached URL, or the whole cache
    ClearCache {
        /// Upstream URL to evict; omit to wipe everything
        #[arg(long)]
        url: Option<String>,
    },
    /// Run a cache sweep now
    Sweep,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder().no_proxy().build()?;

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path, query) = match &cli.command {
        Commands::Status => (Method::GET, "/admin/status", None),
        Commands::Sessions => (Method::GET, "/admin/sessions", None),
        Commands::Recycle => (Method::POST, "/admin/sessions/recycle", None),
        Commands::Cache => (Method::GET, "/admin/cache", None),
        Commands::ClearCache { url } => (Method::POST, "/admin/cache/clear", url.as_deref()),
        Commands::Sweep => (Method::POST, "/admin/cache/sweep", None),
    };

    let mut request = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers);
    if let Some(url) = query {
        request = request.query(&[("url", url)]);
    }

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
