//! funnel-cli: operator tool for the voice-agent webhook
//!
//! # Subcommands
//! - `sign <file> --secret <s>`: print the hex HMAC-SHA256 signature
//! - `send <file> --secret <s>`: POST a signed payload to the server
//! - `inspect <file> [--json]`: parse offline and show what would run
//! - `status`: show server health

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use funnel_core::{signature, SinkTarget, WebhookEvent};
use serde::Serialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";
const DEFAULT_SIGNATURE_HEADER: &str = "x-elevenlabs-signature";
const WEBHOOK_PATH: &str = "/api/elevenlabs-webhook";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "funnel-cli",
    version,
    about = "Sign, replay and inspect voice-agent webhook payloads"
)]
struct Cli {
    /// Funnel HTTP server URL (overrides FUNNEL_SERVER_URL env var)
    #[arg(long, env = "FUNNEL_SERVER_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the signature the server expects for a payload file
    Sign {
        file: PathBuf,

        #[arg(long, env = "ELEVENLABS_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,
    },

    /// Sign a payload file and POST it to the webhook route
    Send {
        file: PathBuf,

        #[arg(long, env = "ELEVENLABS_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,

        /// Header carrying the signature
        #[arg(long, default_value = DEFAULT_SIGNATURE_HEADER)]
        header: String,
    },

    /// Parse a payload file without sending it
    Inspect {
        file: PathBuf,

        /// Output the inspection as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show Funnel server status
    Status,
}

// ============================================================================
// Inspection
// ============================================================================

/// Offline view of how the server would route a payload.
#[derive(Debug, Serialize)]
pub struct Inspection {
    pub conversation_id: String,
    pub status: String,
    pub terminal: bool,
    pub collected_email: Option<String>,
    pub interest_level: Option<String>,
    pub transcript_turns: usize,
    pub sinks: Vec<&'static str>,
}

pub fn inspect_event(event: &WebhookEvent) -> Inspection {
    let sinks = if event.is_terminal() {
        event.sink_targets().iter().map(SinkTarget::as_str).collect()
    } else {
        Vec::new()
    };

    Inspection {
        conversation_id: event.conversation_id.clone(),
        status: event.status.to_string(),
        terminal: event.is_terminal(),
        collected_email: event.collected_email().map(str::to_string),
        interest_level: event.interest_level().map(|l| l.to_string()),
        transcript_turns: event.transcript.len(),
        sinks,
    }
}

fn print_inspection(inspection: &Inspection) {
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

    println!("Conversation: {}", inspection.conversation_id);
    println!("Status:       {} (terminal: {})", inspection.status, inspection.terminal);
    println!("Email:        {}", or_dash(&inspection.collected_email));
    println!("Interest:     {}", or_dash(&inspection.interest_level));
    println!("Transcript:   {} turns", inspection.transcript_turns);
    if inspection.sinks.is_empty() {
        println!("Sinks:        none (acknowledged only)");
    } else {
        println!("Sinks:        {}", inspection.sinks.join(", "));
        if inspection.sinks.contains(&"chat") && inspection.interest_level.as_deref() != Some("high") {
            println!("              chat will skip: interest below high");
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn read_payload(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))
}

fn do_sign(file: &Path, secret: &str) -> anyhow::Result<()> {
    let body = read_payload(file)?;
    println!("{}", signature::sign(&body, secret));
    Ok(())
}

fn do_send(server: &str, file: &Path, secret: &str, header: &str) -> anyhow::Result<()> {
    let body = read_payload(file)?;
    let sig = signature::sign(&body, secret);

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let url = format!("{}{}", server, WEBHOOK_PATH);
    let resp = match client
        .post(&url)
        .header("content-type", "application/json")
        .header(header, sig)
        .body(body)
        .send()
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("funnel-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let text = resp.text().unwrap_or_default();
    println!("HTTP {}", status);
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }

    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn do_inspect(file: &Path, json_output: bool) -> anyhow::Result<()> {
    let body = read_payload(file)?;
    let event = match WebhookEvent::parse(&body) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("funnel-cli: {}", e);
            std::process::exit(1);
        }
    };

    let inspection = inspect_event(&event);
    if json_output {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
    } else {
        print_inspection(&inspection);
    }
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);

    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            let flag = |v: &serde_json::Value| if v.as_bool() == Some(true) { "yes" } else { "no" };

            println!("Funnel server:  {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
            println!("Webhook secret: {}", flag(&body["webhook"]["secret_configured"]));
            println!(
                "Store:          {} ({})",
                flag(&body["sinks"]["store"]["configured"]),
                body["sinks"]["store"]["backend"].as_str().unwrap_or("?")
            );
            println!("Email:          {}", flag(&body["sinks"]["email"]["configured"]));
            println!("Slack:          {}", flag(&body["sinks"]["chat"]["configured"]));
            println!("OpenAI proxy:   {}", flag(&body["proxies"]["openai"]));
            println!("Gemini proxy:   {}", flag(&body["proxies"]["gemini"]));
        }
        Ok(r) => {
            eprintln!("funnel-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("funnel-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Sign { file, secret } => do_sign(&file, &secret),
        Commands::Send { file, secret, header } => do_send(&server, &file, &secret, &header),
        Commands::Inspect { file, json } => do_inspect(&file, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("funnel-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
