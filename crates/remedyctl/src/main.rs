//! remedyctl - CLI for the remedyd daemon.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod client;

use clap::{Parser, Subcommand};
use client::Client;
use remedy_core::report::CycleReport;

#[derive(Parser)]
#[command(name = "remedyctl", about = "Control the CI/CD auto-remediation daemon", version)]
struct Cli {
    /// Daemon address
    #[arg(long, env = "REMEDYD_ADDR", default_value = "http://127.0.0.1:7710")]
    addr: String,

    /// Bearer token for the daemon API
    #[arg(long, env = "REMEDYD_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show orchestrator status
    Status,
    /// Trigger a remediation cycle and wait for its report
    Trigger,
    /// Check daemon health
    Health,
}

fn print_report(report: &CycleReport) {
    println!("cycle:    {}", report.id);
    println!("outcome:  {}", report.outcome.as_str());
    println!("message:  {}", report.message);
    println!("attempts: {}", report.attempts);
    if let Some(build) = &report.build {
        let result = build.result.map_or("unknown", |r| r.as_str());
        println!("build:    #{} ({result})", build.number);
    }
    for fix in &report.fixes {
        let mark = if fix.success { "applied" } else { "failed " };
        println!("  fix [{mark}] {}: {}", fix.file, fix.message);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = Client::new(&cli.addr, cli.token.as_deref());

    let result = match cli.command {
        Commands::Status => match client.status().await {
            Ok(status) => {
                println!("processing:    {}", status.is_processing);
                println!("current retry: {}", status.current_retry);
                println!("max retries:   {}", status.max_retries);
                Ok(())
            }
            Err(e) => Err(e),
        },
        Commands::Trigger => match client.trigger().await {
            Ok(report) => {
                print_report(&report);
                if report.success {
                    Ok(())
                } else {
                    std::process::exit(2);
                }
            }
            Err(e) => Err(e),
        },
        Commands::Health => match client.check_health().await {
            Ok(true) => {
                println!("ok");
                Ok(())
            }
            Ok(false) => {
                eprintln!("daemon at {} is unhealthy", client.addr());
                std::process::exit(1);
            }
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
