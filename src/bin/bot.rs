use std::sync::Arc;

use anyhow::{Context, Result};
use fearann::bot::Bot;
use fearann::config::BotConfig;
use fearann::core::{self, console_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let log_control = core::init_logging();

    let mut conf_file = "conf/bot.yaml".to_string();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("Usage: bot [--conf FILE]");
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

    let config = BotConfig::from_file(&conf_file)
        .with_context(|| format!("Cannot load config: {}", conf_file))?;
    let interactive = config.runtime.interactive;
    let bot = Arc::new(Bot::new(config)?.with_log_control(log_control));
    tracing::info!("[bot] [started]");

    {
        let bot = Arc::clone(&bot);
        tokio::spawn(async move {
            match core::wait_for_signal().await {
                Ok(sig) => tracing::info!("[bot] [signal] sig={:?}, shutting down", sig),
                Err(e) => tracing::error!("[bot] [signal_failed] err={:#}", e),
            }
            bot.lifecycle.request_shutdown();
        });
    }

    if interactive {
        let bot = Arc::clone(&bot);
        tokio::spawn(async move {
            let console = Arc::clone(&bot);
            console_loop(&bot.lifecycle, |line| {
                let bot = Arc::clone(&console);
                async move {
                    let out = Bot::execute_line(&bot, &line).await;
                    if !out.is_empty() {
                        println!("{}", out.as_str());
                    }
                }
            })
            .await;
        });
    }

    Bot::run(bot).await
}
