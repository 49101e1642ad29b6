use anyhow::Result;
use std::path::Path;

use crate::core::terminal::{print_error, print_info, print_status, print_success, print_warn};

pub async fn gateway_start(run_dir: &Path, pid_file: &Path, args: &[String]) -> Result<()> {
    std::fs::create_dir_all(run_dir)?;
    if pid_file.exists() && std::fs::read_to_string(pid_file).is_ok() {
        print_warn("Daemon is already running. Use 'stagehand gateway stop' first.");
        return Ok(());
    }

    let mut api_port: Option<u16> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
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

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(run_dir.join("stagehand.log"))?;

    let exe = std::env::current_exe()?;
    let mut child_cmd = std::process::Command::new(exe);
    child_cmd.arg("serve");
    if let Some(port) = api_port {
        child_cmd.arg("--api-port").arg(port.to_string());
    }
    let child = child_cmd
        .stdout(log_file.try_clone()?)
        .stderr(log_file)
        .stdin(std::process::Stdio::null())
        .spawn()?;

    std::fs::write(pid_file, child.id().to_string())?;
    print_success(&format!("Daemon started (pid {})", child.id()));
    print_status("Logs", &run_dir.join("stagehand.log").display().to_string());
    Ok(())
}

pub async fn gateway_stop(pid_file: &Path) -> Result<()> {
    let Ok(pid) = std::fs::read_to_string(pid_file) else {
        print_warn("Daemon is not running.");
        return Ok(());
    };
    let pid = pid.trim().to_string();

    let status = std::process::Command::new("kill").arg(&pid).status();
    match status {
        Ok(s) if s.success() => {
            std::fs::remove_file(pid_file).ok();
            print_success(&format!("Daemon stopped (pid {})", pid));
        }
        _ => {
            print_error(&format!("Failed to stop pid {}; removing stale pid file", pid));
            std::fs::remove_file(pid_file).ok();
        }
    }
    Ok(())
}

pub async fn gateway_status(pid_file: &Path) -> Result<()> {
    match std::fs::read_to_string(pid_file) {
        Ok(pid) => {
            let pid = pid.trim();
            let alive = std::process::Command::new("kill")
                .args(["-0", pid])
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
            if alive {
                print_info(&format!("Daemon running (pid {})", pid));
            } else {
                print_warn(&format!("Stale pid file for pid {}", pid));
            }
        }
        Err(_) => print_info("Daemon is not running."),
    }
    Ok(())
}
