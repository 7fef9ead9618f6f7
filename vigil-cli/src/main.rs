//! vigil-cli — operator CLI for the Vigil mood-report server
//!
//! Thin frontend over the server's HTTP surface. Every subcommand maps onto
//! one endpoint and exits non-zero on failure, so the binary slots into
//! cron jobs and health checks.
//!
//! # Subcommands
//! - `health`                                   — server + database health
//! - `version`                                  — server version
//! - `run [--reason <text>]`                    — trigger a reporting tick now
//! - `reports [--project-id <uuid>] [-n <limit>] [--json]` — list recent reports

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8767";
const DEFAULT_LIMIT: i64 = 20;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "vigil-cli",
    version,
    about = "Vigil mood reports — operator CLI"
)]
struct Cli {
    /// Vigil HTTP server URL (overrides VIGIL_HTTP_URL env var)
    #[arg(long, env = "VIGIL_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show server and database health
    Health,

    /// Show the server version
    Version,

    /// Trigger a reporting tick immediately
    Run {
        /// Free-form note recorded in the server log for this run
        #[arg(long)]
        reason: Option<String>,
    },

    /// List recently generated mood reports
    Reports {
        /// Only show reports for this project UUID
        #[arg(long)]
        project_id: Option<String>,

        /// Maximum number of reports to return
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: i64,

        /// Print the raw JSON response instead of formatted text
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

/// One report row from GET /reports. Unknown fields are ignored so the CLI
/// stays compatible when the server grows new columns.
#[derive(Debug, Deserialize)]
pub struct ReportRow {
    pub report_id: String,
    pub report_type: String,
    pub user_id: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub average_emotions: serde_json::Value,
    pub mood_summary: String,
    pub processed_entries: i64,
    pub commit_count: i64,
    pub processed_user_count: Option<i64>,
    pub is_alarm: bool,
    pub alarm_message: Option<String>,
}

/// The full listing response from GET /reports
#[derive(Debug, Deserialize)]
pub struct ReportListing {
    pub reports: Vec<ReportRow>,
    pub count: usize,
}

// ============================================================================
// Text Output
// ============================================================================

/// "2024-05-10T08:20:00Z" -> "2024-05-10 08:20"; anything shorter passes
/// through untouched.
pub fn short_time(ts: &str) -> String {
    match ts.get(..16) {
        Some(head) => head.replace('T', " "),
        None => ts.to_string(),
    }
}

/// Sorted "name 0.40" pairs joined with commas, or "(none)".
pub fn render_emotions(emotions: &serde_json::Value) -> String {
    let Some(map) = emotions.as_object() else {
        return "(none)".to_string();
    };
    if map.is_empty() {
        return "(none)".to_string();
    }
    let mut pairs: Vec<(&str, f64)> = map
        .iter()
        .map(|(name, score)| (name.as_str(), score.as_f64().unwrap_or(0.0)))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .iter()
        .map(|(name, score)| format!("{} {:.2}", name, score))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Multi-line text block for one report. Alarms get their own line; the
/// summary is cut down to its first line so a listing stays scannable.
pub fn render_report(report: &ReportRow) -> String {
    let scope = if report.report_type == "group" {
        format!("group ({} members)", report.processed_user_count.unwrap_or(0))
    } else {
        "individual".to_string()
    };

    let mut out = format!(
        "[{}] {} -> {}  entries {}  commits {}\n",
        scope,
        short_time(&report.start_time),
        short_time(&report.end_time),
        report.processed_entries,
        report.commit_count,
    );
    if report.is_alarm {
        out.push_str(&format!(
            "  ALARM: {}\n",
            report.alarm_message.as_deref().unwrap_or("(no reason given)")
        ));
    }
    out.push_str(&format!(
        "  emotions: {}\n",
        render_emotions(&report.average_emotions)
    ));
    let preview: String = report
        .mood_summary
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(100)
        .collect();
    out.push_str(&format!("  {}\n", preview));
    out
}

/// Counter block for POST /reports/run. Missing counters render as 0.
pub fn render_tick(tick: &serde_json::Value) -> String {
    let n = |key: &str| tick[key].as_u64().unwrap_or(0);
    format!(
        "Tick complete\n\
         \x20 Projects processed:  {}\n\
         \x20 Members processed:   {}\n\
         \x20 Individual reports:  {}\n\
         \x20 Group reports:       {}\n\
         \x20 Alarms raised:       {}\n\
         \x20 Skipped (no data):   {}\n\
         \x20 Skipped (no email):  {}\n\
         \x20 Generation failures: {}\n\
         \x20 Errors:              {}",
        n("projects_processed"),
        n("members_processed"),
        n("individual_reports"),
        n("group_reports"),
        n("alarms_raised"),
        n("members_skipped_no_data"),
        n("members_skipped_no_email"),
        n("generation_failures"),
        n("errors"),
    )
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Unwrap a response or exit: connection failures and non-2xx statuses are
/// terminal for every subcommand.
fn check_response(
    url: &str,
    resp: reqwest::Result<reqwest::blocking::Response>,
) -> reqwest::blocking::Response {
    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            eprintln!("vigil-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("vigil-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }
    resp
}

/// Show the server health by calling GET /health.
fn do_health(server: &str) -> anyhow::Result<()> {
    let client = http_client(10)?;
    let url = format!("{}/health", server);

    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Vigil server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:      {}", body["version"].as_str().unwrap_or("?"));
            println!("PostgreSQL:   {}", body["postgresql"].as_str().unwrap_or("?"));
            println!("Chat:         {}", body["chat"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("vigil-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("vigil-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Print the server version from GET /version.
fn do_version(server: &str) -> anyhow::Result<()> {
    let client = http_client(10)?;
    let url = format!("{}/version", server);

    let resp = check_response(&url, client.get(&url).send());
    let body: serde_json::Value = resp.json().unwrap_or_default();
    println!("vigil-server {}", body["version"].as_str().unwrap_or("?"));

    Ok(())
}

/// Trigger a reporting tick via POST /reports/run and print the counters.
/// A tick may clone repositories and call the generation backend, so the
/// timeout is generous.
fn do_run(server: &str, reason: Option<String>) -> anyhow::Result<()> {
    let client = http_client(300)?;
    let url = format!("{}/reports/run", server);
    let body = serde_json::json!({ "reason": reason });

    let resp = check_response(&url, client.post(&url).json(&body).send());
    let tick: serde_json::Value = match resp.json() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("vigil-cli: failed to parse run response: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", render_tick(&tick));
    Ok(())
}

/// List recent reports via GET /reports.
fn do_reports(
    server: &str,
    project_id: Option<String>,
    limit: i64,
    json_output: bool,
) -> anyhow::Result<()> {
    let client = http_client(30)?;
    let mut url = format!("{}/reports?limit={}", server, limit);
    if let Some(id) = &project_id {
        url.push_str(&format!("&project_id={}", id));
    }

    let resp = check_response(&url, client.get(&url).send());

    if json_output {
        let body: serde_json::Value = match resp.json() {
            Ok(v) => v,
            Err(e) => {
                eprintln!("vigil-cli: failed to parse listing: {}", e);
                std::process::exit(1);
            }
        };
        match serde_json::to_string_pretty(&body) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("vigil-cli: failed to serialize listing: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let listing: ReportListing = match resp.json() {
        Ok(l) => l,
        Err(e) => {
            eprintln!("vigil-cli: failed to parse listing: {}", e);
            std::process::exit(1);
        }
    };

    if listing.reports.is_empty() {
        eprintln!("No reports yet.");
        return Ok(());
    }
    for report in &listing.reports {
        print!("{}", render_report(report));
        println!();
    }
    println!("({} reports)", listing.count);

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Health => do_health(&server),
        Commands::Version => do_version(&server),
        Commands::Run { reason } => do_run(&server, reason),
        Commands::Reports {
            project_id,
            limit,
            json,
        } => do_reports(&server, project_id, limit, json),
    };

    if let Err(e) = result {
        eprintln!("vigil-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
