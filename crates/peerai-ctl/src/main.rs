//! peerai-ctl: command-line interface for the peerai server.

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_PORT: u16 = 3000;

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    online:       usize,
    capable:      usize,
    total_load:   u64,
    total_helped: u64,
    reservations: usize,
    uptime_secs:  u64,
}

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct PeerInfo {
    id:      String,
    capable: bool,
    load:    u32,
    helped:  u64,
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
    .await
    .with_context(|| format!("failed to connect to peeraid at {}, is it running?", url))?
    .error_for_status()
    .context("server returned an error")?
    .json::<T>()
    .await
    .context("failed to parse response")
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  peerai Server Status");
    println!("═══════════════════════════════════════");
    println!("  Peers online     : {}", resp.online);
    println!("  Capable peers    : {}", resp.capable);
    println!("  Tasks in flight  : {}", resp.total_load);
    println!("  Tasks completed  : {}", resp.total_helped);
    println!("  Reservations     : {}", resp.reservations);
    println!("  Uptime           : {}", format_uptime(resp.uptime_secs));

    Ok(())
}

async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers connected.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Connected Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        println!("  ┌─ {}", p.id);
        println!("  │  capable : {}", if p.capable { "yes" } else { "no" });
        println!("  │  load    : {}", p.load);
        println!("  └─ helped  : {}", p.helped);
    }

    Ok(())
}

fn format_uptime(secs: u64) -> String {
    match secs {
        s if s < 60   => format!("{}s", s),
        s if s < 3600 => format!("{}m {}s", s / 60, s % 60),
        s             => format!("{}h {}m", s / 3600, (s % 3600) / 60),
    }
}

fn print_usage() {
    println!("Usage: peerai-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status        Show presence and matchmaking totals");
    println!("  peers         List connected peers with load and help counts");
    println!();
    println!("Options:");
    println!("  --port <port>   Server port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args.get(i)
            .context("--port requires a value")?
            .parse()
            .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | []                => cmd_status(port).await,
        ["peers"]                      => cmd_peers(port).await,
        ["help"] | ["--help"] | ["-h"] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
