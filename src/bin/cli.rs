//! Campus Insight CLI
//!
//! Command-line client for a running Campus Insight server:
//! - Register and remove datasets
//! - Run query files
//! - Read and submit room reviews
//! - Check status

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value as Json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "campus-insight-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query course-section and room datasets")]
#[command(long_about = "Campus Insight CLI.\nRegister section and room datasets, run JSON query trees against them, and rate rooms.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:4321", global = true)]
    pub api_url: String,

    /// Output format (table, json, csv)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List registered datasets
    Datasets,

    /// Register a dataset from a JSON array of records
    Add {
        /// Dataset id (no underscores)
        id: String,
        /// Dataset kind (sections, rooms)
        kind: String,
        /// Path to the JSON records file
        path: PathBuf,
    },

    /// Remove a dataset
    Remove {
        /// Dataset id
        id: String,
    },

    /// Run a query tree read from a JSON file
    Query {
        /// Path to the query file ("-" for stdin)
        path: PathBuf,
    },

    /// Show the review summary for a room
    Review {
        /// Room name, e.g. DMP_110
        room: String,
    },

    /// Rate a room between 0 and 5
    Rate {
        /// Room name
        room: String,
        /// Score
        score: f64,
    },

    /// Show server status
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Datasets => {
            let body = expect_success(
                client
                    .get(format!("{}/api/v1/datasets", cli.api_url))
                    .send()
                    .await?,
            )
            .await?;

            let datasets = body["result"].as_array().cloned().unwrap_or_default();
            if datasets.is_empty() {
                println!("No datasets registered yet.");
                println!();
                println!("Add one with:");
                println!("  campus-insight-cli add sections sections ./sections.json");
            } else if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&datasets)?);
            } else {
                println!("{:<20} {:<10} {:>8}  {}", "ID", "Kind", "Rows", "Created");
                println!("{}", "-".repeat(64));

                for dataset in datasets {
                    println!(
                        "{:<20} {:<10} {:>8}  {}",
                        dataset["id"].as_str().unwrap_or("-"),
                        dataset["kind"].as_str().unwrap_or("-"),
                        dataset["num_rows"].as_u64().unwrap_or(0),
                        dataset["created_at"].as_str().unwrap_or("-")
                    );
                }
            }
        }

        Commands::Add { id, kind, path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            let records: Json = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", path.display()))?;

            let body = expect_success(
                client
                    .put(format!(
                        "{}/api/v1/dataset/{}/{}",
                        cli.api_url,
                        urlencoding::encode(&id),
                        urlencoding::encode(&kind)
                    ))
                    .json(&records)
                    .send()
                    .await?,
            )
            .await?;

            let count = records.as_array().map(|r| r.len()).unwrap_or(0);
            println!("Added {} ({} {} records)", id, count, kind);
            println!("Datasets: {}", join_strings(&body["result"]));
        }

        Commands::Remove { id } => {
            expect_success(
                client
                    .delete(format!(
                        "{}/api/v1/dataset/{}",
                        cli.api_url,
                        urlencoding::encode(&id)
                    ))
                    .send()
                    .await?,
            )
            .await?;
            println!("Removed {}", id);
        }

        Commands::Query { path } => {
            let text = if path.as_os_str() == "-" {
                std::io::read_to_string(std::io::stdin())?
            } else {
                std::fs::read_to_string(&path)
                    .with_context(|| format!("Cannot read {}", path.display()))?
            };
            let query: Json = serde_json::from_str(&text).context("Query is not valid JSON")?;

            let response = client
                .post(format!("{}/api/v1/query", cli.api_url))
                .json(&query)
                .send()
                .await?;
            let data = expect_success(response).await?;

            match cli.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&data["result"])?),
                "csv" => print!("{}", to_csv(&data)?),
                _ => print_table(&data),
            }
        }

        Commands::Review { room } => {
            let body = expect_success(
                client
                    .get(format!(
                        "{}/api/v1/reviews/{}",
                        cli.api_url,
                        urlencoding::encode(&room)
                    ))
                    .send()
                    .await?,
            )
            .await?;
            print_review(&body["result"]);
        }

        Commands::Rate { room, score } => {
            let body = expect_success(
                client
                    .post(format!(
                        "{}/api/v1/reviews/{}/{}",
                        cli.api_url,
                        urlencoding::encode(&room),
                        score
                    ))
                    .send()
                    .await?,
            )
            .await?;
            println!("Rated {}: {}", room, score);
            print_review(&body["result"]);
        }

        Commands::Status => {
            let response = client.get(format!("{}/health", cli.api_url)).send().await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: Json = resp.json().await?;

                    println!("Campus Insight v{}", env!("CARGO_PKG_VERSION"));
                    println!();
                    println!(
                        "API Status: {}",
                        health["status"].as_str().unwrap_or("unknown")
                    );
                    println!("Server version: {}", health["version"].as_str().unwrap_or("-"));

                    println!();
                    println!("Storage: {}", health["storage"].as_str().unwrap_or("-"));
                    println!("  Datasets: {}", health["datasets"].as_u64().unwrap_or(0));
                    println!(
                        "  Loaded in memory: {}",
                        health["loaded_datasets"].as_u64().unwrap_or(0)
                    );
                    println!(
                        "  Reviewed rooms: {}",
                        health["reviewed_rooms"].as_u64().unwrap_or(0)
                    );

                    if let Some(uptime) = health["uptime_seconds"].as_u64() {
                        println!();
                        println!("Uptime: {}", format_duration(uptime));
                    }
                }
                Ok(resp) => bail!("API returned error: {}", resp.status()),
                Err(e) => {
                    eprintln!("Cannot connect to Campus Insight API at {}", cli.api_url);
                    eprintln!("Error: {}", e);
                    eprintln!();
                    eprintln!("Make sure the server is running:");
                    eprintln!("  cargo run --bin campus-insight");
                    std::process::exit(1);
                }
            }
        }

        Commands::Config { output } => {
            let config = campus_insight::config::generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Parse the body of a successful response, or fail with the server's error message
async fn expect_success(response: reqwest::Response) -> anyhow::Result<Json> {
    let status = response.status();
    let body: Json = response.json().await.unwrap_or(Json::Null);

    if status.is_success() {
        return Ok(body);
    }

    match body["error"]["message"].as_str() {
        Some(message) => bail!(
            "Request failed ({} {}): {}",
            status,
            body["error"]["code"].as_str().unwrap_or("ERROR"),
            message
        ),
        None => bail!("Request failed ({})", status),
    }
}

fn join_strings(list: &Json) -> String {
    list.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

fn format_cell(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn columns(data: &Json) -> Vec<String> {
    data["columns"]
        .as_array()
        .map(|cols| {
            cols.iter()
                .filter_map(|c| c.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn print_review(summary: &Json) {
    let average = summary["average"]
        .as_f64()
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{}: average {} over {} review(s)",
        summary["room"].as_str().unwrap_or("-"),
        average,
        summary["count"].as_u64().unwrap_or(0)
    );
}

fn print_table(data: &Json) {
    let rows = match data["result"].as_array() {
        Some(r) => r,
        None => {
            println!("No data");
            return;
        }
    };

    if rows.is_empty() {
        println!("No rows matched");
        return;
    }

    let columns = columns(data);
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| columns.iter().map(|c| format_cell(&row[c])).collect())
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(c.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    println!("{}", line(&columns));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1)));
    for row in &cells {
        println!("{}", line(row));
    }

    println!();
    println!("{} row(s)", rows.len());
}

fn to_csv(data: &Json) -> anyhow::Result<String> {
    let columns = columns(data);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;

    for row in data["result"].as_array().into_iter().flatten() {
        writer.write_record(columns.iter().map(|c| match &row[c] {
            Json::String(s) => s.clone(),
            Json::Null => String::new(),
            other => other.to_string(),
        }))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("CSV encoding failed: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}
