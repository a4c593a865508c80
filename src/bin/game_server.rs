use std::sync::Arc;

use anyhow::{Context, Result};
use fearann::config::{ExecutionMode, ServerConfig};
use fearann::core::{self, console_loop};
use fearann::servers::game::db::{GameStore, MemoryStore, MySqlStore};
use fearann::servers::game::GameState;

#[tokio::main]
async fn main() -> Result<()> {
    let log_control = core::init_logging();

    let mut conf_file = "conf/server.yaml".to_string();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("Usage: game_server [--conf FILE]");
                return Ok(());
            }
            "--conf" => {
                if i + 1 < args.len() {
                    i += 1;
                    conf_file = args[i].clone();
                } else {
                    eprintln!("Error: --conf requires a FILE argument");
                    return Ok(());
                }
            }
            other => eprintln!("Warning: ignoring unknown argument '{}'", other),
        }
        i += 1;
    }

    let config = ServerConfig::from_file(&conf_file)
        .with_context(|| format!("Cannot load config: {}", conf_file))?;

    let store: Arc<dyn GameStore> = match &config.sql {
        Some(sql) => {
            let store = MySqlStore::connect(sql)
                .await
                .with_context(|| format!("Cannot connect to DB: {}", sql.host))?;
            store.migrate().await.context("Cannot migrate the DB schema")?;
            tracing::info!("[game] [store] kind=mysql host={} db={}", sql.host, sql.database);
            Arc::new(store)
        }
        None => {
            tracing::warn!("[game] [store] kind=memory (no sql section, nothing is persisted)");
            Arc::new(MemoryStore::new())
        }
    };

    let state = Arc::new(
        GameState::new(config, store)
            .await?
            .with_log_control(log_control),
    );
    tracing::info!("[game] [started] Game Server Started");

    if let Some(script) = state.config.runtime.startup_script.clone() {
        if let Err(e) = state.run_startup_script(&script).await {
            tracing::error!("[game] [script_failed] err={:#}", e);
        }
    }

    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            match core::wait_for_signal().await {
                Ok(sig) => tracing::info!("[game] [signal] sig={:?}, shutting down", sig),
                Err(e) => tracing::error!("[game] [signal_failed] err={:#}", e),
            }
            state.lifecycle.request_shutdown();
        });
    }

    if state.config.runtime.execution_mode == ExecutionMode::Interactive {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let console = Arc::clone(&state);
            console_loop(&state.lifecycle, |line| {
                let state = Arc::clone(&console);
                async move {
                    let out = state.execute_console_line(&line).await;
                    if !out.is_empty() {
                        println!("{}", out.as_str());
                    }
                }
            })
            .await;
        });
    }

    GameState::run(state).await?;
    tracing::info!("[game] [stopped]");
    Ok(())
}
