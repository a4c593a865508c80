//! Console commands of the bot.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::{password_hash, AutoStep, Bot};
use crate::command::{ignore_extra_args, Command, CommandMgr, CommandOutput, PermLevel};
use crate::network::msgs::contact::{CONTACT_FRIEND, CONTACT_IGNORE};
use crate::network::msgs::{
    ChatType, MsgChat, MsgCommand, MsgContactAdd, MsgContactDel, MsgDelChar, MsgJoin, MsgLogin,
    MsgNewChar, MsgNewUser,
};

pub fn register_all(mgr: &mut CommandMgr<Arc<Bot>>) {
    mgr.add_command(Box::new(Quit));
    mgr.add_command(Box::new(Auto));
    mgr.add_command(Box::new(Connect));
    mgr.add_command(Box::new(Login));
    mgr.add_command(Box::new(NewUser));
    mgr.add_command(Box::new(NewChar));
    mgr.add_command(Box::new(DelChar));
    mgr.add_command(Box::new(Join));
    mgr.add_command(Box::new(Say));
    mgr.add_command(Box::new(PrivateMessage));
    mgr.add_command(Box::new(ContactAdd));
    mgr.add_command(Box::new(ContactDel));
    mgr.add_command(Box::new(ServerCommand));
    mgr.add_command(Box::new(LogLevel));
}

/// Declares the name, help text and permission of a bot command.
macro_rules! describe {
    ($name:literal, $desc:literal, [$($arg:literal),*], $perm:expr) => {
        fn name(&self) -> &'static str {
            $name
        }

        fn description(&self) -> &'static str {
            $desc
        }

        fn arg_names(&self) -> &'static [&'static str] {
            &[$($arg),*]
        }

        fn perm_needed(&self) -> PermLevel {
            $perm
        }
    };
}

struct Quit;

impl Command<Arc<Bot>> for Quit {
    describe!("quit", "Stop the bot", [], PermLevel::Admin);

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            ignore_extra_args(args, out);
            out.append_line("Bot shutting down...");
            bot.lifecycle.request_shutdown();
        }
        .boxed()
    }
}

struct Auto;

impl Command<Arc<Bot>> for Auto {
    describe!(
        "auto",
        "Automatic steps, usually from the startup script",
        ["connect|login|join"],
        PermLevel::Player
    );

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            let step = match args {
                [step] => step.as_str(),
                _ => {
                    out.append_line(
                        "This command needs exactly one argument: connect, login or join",
                    );
                    return;
                }
            };
            let (step, text) = match step {
                "connect" => (AutoStep::Connect, "Auto connect enabled"),
                "login" => (AutoStep::Login, "Auto login enabled"),
                "join" => (AutoStep::Join, "Auto join enabled"),
                other => {
                    out.append_line(format!("Unknown automatic step '{}'", other));
                    return;
                }
            };
            bot.set_auto(step);
            out.append_line(text);
        }
        .boxed()
    }
}

struct Connect;

impl Command<Arc<Bot>> for Connect {
    describe!("connect", "Connect to the server", ["host|config", "port"], PermLevel::Player);

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            let (host, port) = match args {
                [config] if config == "config" => {
                    let settings = &bot.config.settings;
                    (settings.hostname.clone(), settings.port)
                }
                [host, port] => match port.parse::<u16>() {
                    Ok(port) => (host.clone(), port),
                    Err(_) => {
                        out.append_line(format!("Bad port number '{}'", port));
                        return;
                    }
                },
                _ => {
                    out.append_line("/connect host port || /connect config");
                    return;
                }
            };
            out.append_line("Bot Connecting...");
            match Bot::connect_to_server(bot, &host, port).await {
                Ok(true) => {}
                Ok(false) => out.append_line("Already connected"),
                Err(e) => {
                    tracing::error!("Cannot connect to server: {:#}", e);
                    out.append_line("Cannot connect to server");
                }
            }
        }
        .boxed()
    }
}

struct Login;

impl Command<Arc<Bot>> for Login {
    describe!(
        "login",
        "Login to the server",
        ["config || username", "password"],
        PermLevel::Player
    );

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            match args {
                [config] if config == "config" => {
                    out.append_line("Bot logging in using config...");
                    bot.login_with_config().await;
                }
                [username, password] => {
                    out.append_line("Bot logging in...");
                    let login = MsgLogin {
                        username: username.clone(),
                        pw_md5sum: password_hash(password),
                    };
                    bot.send_to_server(&login).await;
                }
                _ => out.append_line("/login username password || /login config"),
            }
        }
        .boxed()
    }
}

struct NewUser;

impl Command<Arc<Bot>> for NewUser {
    describe!(
        "newuser",
        "Create a new account",
        ["username", "password", "email", "realname..."],
        PermLevel::Player
    );

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            let [username, password, rest @ ..] = args else {
                out.append_line("/newuser username password [email [realname...]]");
                return;
            };
            let (email, realname) = match rest {
                [] => (String::new(), String::new()),
                [email, name @ ..] => (email.clone(), name.join(" ")),
            };
            out.append_line(format!("Creating user '{}'...", username));
            let msg = MsgNewUser {
                username: username.clone(),
                pw_md5sum: password_hash(password),
                email,
                realname,
            };
            bot.send_to_server(&msg).await;
        }
        .boxed()
    }
}

struct NewChar;

impl Command<Arc<Bot>> for NewChar {
    describe!(
        "newchar",
        "Create a new character",
        ["name", "race", "gender", "class", "con", "str", "dex", "int", "wis", "cha"],
        PermLevel::Player
    );

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            let [name, race, gender, class, points @ ..] = args else {
                out.append_line("/newchar name race gender class con str dex int wis cha");
                return;
            };
            let parsed: Result<Vec<u8>, _> = points.iter().map(|p| p.parse::<u8>()).collect();
            let abilities = match parsed {
                Ok(v) if v.len() == 6 => v,
                _ => {
                    out.append_line(
                        "Six ability scores (0-255) are needed: con str dex int wis cha",
                    );
                    return;
                }
            };
            out.append_line(format!("Creating character '{}'...", name));
            let msg = MsgNewChar {
                charname: name.clone(),
                race: race.clone(),
                gender: gender.clone(),
                player_class: class.clone(),
                ab_con: abilities[0],
                ab_str: abilities[1],
                ab_dex: abilities[2],
                ab_int: abilities[3],
                ab_wis: abilities[4],
                ab_cha: abilities[5],
            };
            bot.send_to_server(&msg).await;
        }
        .boxed()
    }
}

struct DelChar;

impl Command<Arc<Bot>> for DelChar {
    describe!(
        "delchar",
        "Delete one of the account's characters",
        ["character"],
        PermLevel::Player
    );

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            let [charname] = args else {
                out.append_line("This command needs exactly one argument, aborting");
                return;
            };
            out.append_line(format!("Deleting character '{}'...", charname));
            bot.send_to_server(&MsgDelChar { charname: charname.clone() }).await;
        }
        .boxed()
    }
}

struct Join;

impl Command<Arc<Bot>> for Join {
    describe!("join", "Join the world", ["character"], PermLevel::Player);

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            let charname = match args {
                [] => bot.config.settings.character.clone(),
                [name] => name.clone(),
                _ => {
                    out.append_line("/join character");
                    return;
                }
            };
            if charname.is_empty() {
                out.append_line("No character given and none in the config");
                return;
            }
            out.append_line("Joining the world...");
            bot.send_to_server(&MsgJoin { charname }).await;
        }
        .boxed()
    }
}

struct Say;

impl Command<Arc<Bot>> for Say {
    describe!("say", "Send a chat message to the chat channel", ["..."], PermLevel::Player);

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            if args.is_empty() {
                out.append_line("This command requires at least one argument");
                return;
            }
            let msg = MsgChat {
                text: args.join(" "),
                chat_type: ChatType::Chat,
                ..Default::default()
            };
            bot.send_to_server(&msg).await;
        }
        .boxed()
    }
}

struct PrivateMessage;

impl Command<Arc<Bot>> for PrivateMessage {
    describe!(
        "pm",
        "Sends a private message to another player",
        ["target", "..."],
        PermLevel::Player
    );

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            let [target, words @ ..] = args else {
                out.append_line("This command requires at least two arguments");
                return;
            };
            if words.is_empty() {
                out.append_line("This command requires at least two arguments");
                return;
            }
            let msg = MsgChat {
                target: target.clone(),
                text: words.join(" "),
                chat_type: ChatType::Pm,
                ..Default::default()
            };
            bot.send_to_server(&msg).await;
        }
        .boxed()
    }
}

struct ContactAdd;

impl Command<Arc<Bot>> for ContactAdd {
    describe!(
        "contact_add",
        "Add a friend or an ignored player",
        ["character", "F|I", "comment..."],
        PermLevel::Player
    );

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            let [charname, kind, comment @ ..] = args else {
                out.append_line("/contact_add character F|I [comment...]");
                return;
            };
            let contact_type = match kind.as_str() {
                "F" | "f" => CONTACT_FRIEND,
                "I" | "i" => CONTACT_IGNORE,
                other => {
                    out.append_line(format!("Contact type must be F or I, not '{}'", other));
                    return;
                }
            };
            let msg = MsgContactAdd {
                charname: charname.clone(),
                contact_type,
                comment: comment.join(" "),
            };
            bot.send_to_server(&msg).await;
        }
        .boxed()
    }
}

struct ContactDel;

impl Command<Arc<Bot>> for ContactDel {
    describe!(
        "contact_del",
        "Remove a player from the contact list",
        ["character"],
        PermLevel::Player
    );

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            let [charname] = args else {
                out.append_line("This command needs exactly one argument, aborting");
                return;
            };
            bot.send_to_server(&MsgContactDel { charname: charname.clone() }).await;
        }
        .boxed()
    }
}

struct ServerCommand;

impl Command<Arc<Bot>> for ServerCommand {
    describe!("cmd", "Run a console command on the server", ["command..."], PermLevel::Player);

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            if args.is_empty() {
                out.append_line("This command requires at least one argument");
                return;
            }
            bot.send_to_server(&MsgCommand { command: args.join(" ") }).await;
        }
        .boxed()
    }
}

struct LogLevel;

impl Command<Arc<Bot>> for LogLevel {
    describe!(
        "loglevel",
        "Modify the Log Message level",
        ["DEBUG|INFO|WARNING|ERROR"],
        PermLevel::Admin
    );

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        bot: &'a Arc<Bot>,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()> {
        async move {
            let [level] = args else {
                out.append_line(
                    "This command needs exactly one argument ( which must be DEBUG, INFO, WARNING or ERROR ), aborting",
                );
                return;
            };
            let result = match bot.log_level_setter() {
                Some(set) => set(level),
                None => Err(anyhow::anyhow!("log level is fixed for this process")),
            };
            match result {
                Ok(()) => out.append_line(format!("Log level {} succesfully set", level)),
                Err(e) => {
                    tracing::warn!("[cmd] [loglevel_failed] level={} err={:#}", level, e);
                    out.append_line(format!(
                        "ERROR: modifying log level '{}' (wrong parameter?)",
                        level
                    ));
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;

    fn bot() -> Arc<Bot> {
        Arc::new(Bot::new(BotConfig::default()).unwrap())
    }

    async fn run(bot: &Arc<Bot>, line: &str) -> String {
        Bot::execute_line(bot, line).await.into_string()
    }

    #[tokio::test]
    async fn test_registered_commands() {
        let bot = bot();
        for name in [
            "quit",
            "auto",
            "connect",
            "login",
            "newuser",
            "newchar",
            "delchar",
            "join",
            "say",
            "pm",
            "contact_add",
            "contact_del",
            "cmd",
            "loglevel",
        ] {
            assert!(bot.commands.contains(name), "missing {}", name);
        }
        assert_eq!(bot.commands.len(), 14);
    }

    #[tokio::test]
    async fn test_auto_steps() {
        let bot = bot();
        assert_eq!(run(&bot, "/auto connect").await, "Auto connect enabled");
        assert!(bot.auto(AutoStep::Connect));
        assert_eq!(run(&bot, "auto fly").await, "Unknown automatic step 'fly'");
        assert_eq!(
            run(&bot, "auto").await,
            "This command needs exactly one argument: connect, login or join"
        );
    }

    #[tokio::test]
    async fn test_usage_lines() {
        let bot = bot();
        assert_eq!(run(&bot, "connect").await, "/connect host port || /connect config");
        assert_eq!(run(&bot, "connect localhost http").await, "Bad port number 'http'");
        assert_eq!(run(&bot, "login onlyuser").await, "/login username password || /login config");
        assert_eq!(run(&bot, "say").await, "This command requires at least one argument");
        assert_eq!(run(&bot, "pm Bob").await, "This command requires at least two arguments");
        assert_eq!(
            run(&bot, "newchar Ann elf f sorcerer 13 13 13 13 13").await,
            "Six ability scores (0-255) are needed: con str dex int wis cha"
        );
        assert_eq!(run(&bot, "contact_add Bob X").await, "Contact type must be F or I, not 'X'");
        assert_eq!(run(&bot, "join").await, "No character given and none in the config");
    }

    #[tokio::test]
    async fn test_sends_are_dropped_while_offline() {
        let bot = bot();
        assert_eq!(run(&bot, "login ann secret").await, "Bot logging in...");
        assert_eq!(run(&bot, "join Ann").await, "Joining the world...");
        assert!(!bot.is_connected().await);
    }

    #[tokio::test]
    async fn test_quit_requests_shutdown() {
        let bot = bot();
        assert_eq!(
            run(&bot, "quit now").await,
            "This command doesn't accept arguments, ignoring\nBot shutting down..."
        );
        assert!(bot.lifecycle.should_shutdown());
    }

    #[tokio::test]
    async fn test_loglevel_without_control() {
        let bot = bot();
        assert_eq!(
            run(&bot, "loglevel DEBUG").await,
            "ERROR: modifying log level 'DEBUG' (wrong parameter?)"
        );
    }
}
