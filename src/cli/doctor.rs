use anyhow::Result;
use std::path::Path;

use crate::core::config::DaemonConfig;
use crate::core::store::SessionStore;
use crate::core::terminal::{print_status, print_success, print_warn};

pub async fn run_doctor(config_path: &Path) -> Result<()> {
    let config = match DaemonConfig::load(config_path) {
        Ok(config) => {
            print_success(&format!("Config: ok ({:?})", config_path));
            config
        }
        Err(e) => {
            print_warn(&format!("Config: {}", e));
            return Ok(());
        }
    };

    print_status("API", &format!("{}:{}", config.api_host, config.api_port));
    print_status("Poll interval", &format!("{}s", config.poll_interval_secs));
    print_status("Realtime endpoint", &config.provider.realtime_url);
    print_status("Stateless endpoint", &config.provider.stateless_url);

    if config.provider.api_key.is_empty() {
        print_warn("Provider API key: missing (set STAGEHAND_API_KEY)");
    } else {
        print_success("Provider API key: present");
    }

    match SessionStore::new(&config.data_dir).await {
        Ok(store) => {
            print_success(&format!("Session store: ok ({:?})", store.db_path()));
            let sessions = store.list_active_realtime_sessions().await?;
            print_status(
                "Active realtime sessions",
                &sessions.len().to_string(),
            );
        }
        Err(e) => print_warn(&format!("Session store: {}", e)),
    }

    Ok(())
}
