//! Commands of the server console and of in-game `/` lines.

use futures::future::BoxFuture;
use futures::FutureExt;

use super::GameState;
use crate::command::{ignore_extra_args, Command, CommandMgr, CommandOutput, PermLevel};
use crate::core::format_uptime;
use crate::network::msgs::MsgChat;

/// Names shown per line by `who`.
const WHO_NAMES_PER_LINE: usize = 6;
/// Names longer than this are cut in `who`.
const WHO_NAME_WIDTH: usize = 12;

pub fn register_all(mgr: &mut CommandMgr<GameState>) {
    mgr.add_command(Box::new(Quit));
    mgr.add_command(Box::new(ShowStats));
    mgr.add_command(Box::new(ChangeTime));
    mgr.add_command(Box::new(LoadArea));
    mgr.add_command(Box::new(LogLevel));
    mgr.add_command(Box::new(Who));
}

fn exactly_one_arg<'a>(args: &'a [String], out: &mut CommandOutput) -> Option<&'a str> {
    match args {
        [arg] => Some(arg.as_str()),
        _ => {
            out.append_line("This command needs exactly one argument, aborting");
            None
        }
    }
}

struct Quit;

impl Command<GameState> for Quit {
    fn name(&self) -> &'static str {
        "quit"
    }

    fn description(&self) -> &'static str {
        "Stop the server"
    }

    fn perm_needed(&self) -> PermLevel {
        PermLevel::Admin
    }

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        state: &'a GameState,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            ignore_extra_args(args, out);
            let text = "Server is shutting down by admin request";
            state.net.send_to_all_conns(&MsgChat::system(text)).await;
            out.append_line(text);
            tracing::info!("[cmd] [quit]");
            state.lifecycle.request_shutdown();
        }
        .boxed()
    }
}

struct ShowStats;

impl Command<GameState> for ShowStats {
    fn name(&self) -> &'static str {
        "show_stats"
    }

    fn description(&self) -> &'static str {
        "Show some statistics and info about the game"
    }

    fn perm_needed(&self) -> PermLevel {
        PermLevel::Admin
    }

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        state: &'a GameState,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            ignore_extra_args(args, out);
            let accounts = state.store.count_accounts().await.unwrap_or_else(|e| {
                tracing::error!("[cmd] [db_error] op=count_accounts err={}", e);
                0
            });
            let characters = state.store.count_characters().await.unwrap_or_else(|e| {
                tracing::error!("[cmd] [db_error] op=count_characters err={}", e);
                0
            });
            out.append_line(format!("Server uptime: {}", format_uptime(state.started_at.elapsed())));
            out.append_line(format!("Game time: {}", state.time.game_time().await));
            out.append_line(format!("Number of accounts: {}", accounts));
            out.append_line(format!("Number of characters: {}", characters));
            out.append_line(format!("Number of players: {}", state.login.playing_count().await));
        }
        .boxed()
    }
}

struct ChangeTime;

impl Command<GameState> for ChangeTime {
    fn name(&self) -> &'static str {
        "changetime"
    }

    fn description(&self) -> &'static str {
        "Change time by the given minutes"
    }

    fn arg_names(&self) -> &'static [&'static str] {
        &["+-minutes"]
    }

    fn perm_needed(&self) -> PermLevel {
        PermLevel::Admin
    }

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        state: &'a GameState,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            let Some(arg) = exactly_one_arg(args, out) else {
                return;
            };
            let Ok(minutes) = arg.parse::<i32>() else {
                out.append_line(format!("Not a number of minutes: '{}', aborting", arg));
                return;
            };
            let text = format!("Time changed by {} minutes", minutes);
            out.append_line(&text);
            state.change_time(minutes).await;
            state.send_to_all_players(&MsgChat::system(text)).await;
        }
        .boxed()
    }
}

struct LoadArea;

impl Command<GameState> for LoadArea {
    fn name(&self) -> &'static str {
        "load_area"
    }

    fn description(&self) -> &'static str {
        "Load an area"
    }

    fn arg_names(&self) -> &'static [&'static str] {
        &["area"]
    }

    fn perm_needed(&self) -> PermLevel {
        PermLevel::Admin
    }

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        state: &'a GameState,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            let Some(area) = exactly_one_arg(args, out) else {
                return;
            };
            if state.world.load_area(area).await {
                out.append_line(format!("Area loaded successfully: {}", area));
            } else {
                out.append_line(format!("ERROR: loading area '{}' (already exists?)", area));
            }
        }
        .boxed()
    }
}

struct LogLevel;

impl Command<GameState> for LogLevel {
    fn name(&self) -> &'static str {
        "loglevel"
    }

    fn description(&self) -> &'static str {
        "Modify the Log Message level"
    }

    fn arg_names(&self) -> &'static [&'static str] {
        &["DEBUG|INFO|WARNING|ERROR"]
    }

    fn perm_needed(&self) -> PermLevel {
        PermLevel::Admin
    }

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        state: &'a GameState,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            let Some(level) = exactly_one_arg(args, out) else {
                return;
            };
            let result = match state.log_level_setter() {
                Some(set) => set(level),
                None => Err(anyhow::anyhow!("log level is fixed for this process")),
            };
            match result {
                Ok(()) => out.append_line(format!("Log level {} succesfully set", level)),
                Err(e) => {
                    tracing::warn!("[cmd] [loglevel_failed] level={} err={:#}", level, e);
                    out.append_line(format!("ERROR: modifying log level '{}' (wrong parameter?)", level));
                }
            }
        }
        .boxed()
    }
}

struct Who;

impl Command<GameState> for Who {
    fn name(&self) -> &'static str {
        "who"
    }

    fn description(&self) -> &'static str {
        "Show the current players"
    }

    fn perm_needed(&self) -> PermLevel {
        PermLevel::Player
    }

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        state: &'a GameState,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            ignore_extra_args(args, out);
            let names = state.login.sorted_player_names().await;
            out.append_line(format!("Total number of players: {}", names.len()));
            for row in names.chunks(WHO_NAMES_PER_LINE) {
                let mut line = String::from("  ");
                for name in row {
                    let short: String = name.chars().take(WHO_NAME_WIDTH).collect();
                    line.push_str(&format!("{:<width$}", short, width = WHO_NAME_WIDTH + 1));
                }
                out.append_line(line.trim_end());
            }
        }
        .boxed()
    }
}
