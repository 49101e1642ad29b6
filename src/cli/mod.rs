mod daemon;
mod doctor;
mod serve;

use anyhow::Result;
use console::style;
use std::path::PathBuf;

use crate::core::terminal::{self, GuideSection};

const DEFAULT_CONFIG: &str = "stagehand.json5";

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Core")
        .command("serve", "Run the session daemon in the foreground")
        .print();

    GuideSection::new("Management")
        .command("gateway", "Manage the background daemon process")
        .print();

    GuideSection::new("Diagnostics")
        .command("doctor", "Check config, store and provider settings")
        .command("version", "Print the version")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("stagehand").green()
    );
}

fn run_dir() -> PathBuf {
    std::env::var("STAGEHAND_RUN_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("stagehand-run"))
}

fn parse_serve_args(args: &[String]) -> (PathBuf, Option<u16>) {
    let mut config_path = PathBuf::from(DEFAULT_CONFIG);
    let mut api_port = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-port" => {
                if i + 1 < args.len() {
                    api_port = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (config_path, api_port)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("serve") => {
            let (config_path, api_port) = parse_serve_args(&args[2..]);
            serve::run_serve(&config_path, api_port).await
        }
        Some("gateway") => {
            let run_dir = run_dir();
            let pid_file = run_dir.join("stagehand.pid");
            match args.get(2).map(String::as_str) {
                Some("start") => daemon::gateway_start(&run_dir, &pid_file, &args[3..]).await,
                Some("stop") => daemon::gateway_stop(&pid_file).await,
                Some("status") | None => daemon::gateway_status(&pid_file).await,
                Some(other) => {
                    terminal::print_error(&format!("Unknown gateway subcommand '{}'", other));
                    Ok(())
                }
            }
        }
        Some("doctor") => {
            let (config_path, _) = parse_serve_args(&args[2..]);
            doctor::run_doctor(&config_path).await
        }
        Some("version") => {
            println!("stagehand {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some("help") | None => {
            print_help();
            Ok(())
        }
        Some(other) => {
            terminal::print_error(&format!("Unknown command '{}'", other));
            print_help();
            Ok(())
        }
    }
}
