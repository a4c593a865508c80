//! Console command framework shared by the server and the bot.
//!
//! A command line is split on spaces; the first word selects the command,
//! the rest are its arguments. `help` is handled here for every manager.

use std::collections::BTreeMap;

use futures::future::BoxFuture;

/// Permission levels, ordered: a command runs when its level is at or
/// below the caller's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PermLevel {
    #[default]
    NotSet = 0,
    Player = 1,
    Admin = 2,
}

impl PermLevel {
    /// Level stored in the account `roles` column.
    pub fn from_roles(roles: i32) -> Option<Self> {
        match roles {
            1 => Some(PermLevel::Player),
            2 => Some(PermLevel::Admin),
            _ => None,
        }
    }
}

/// Text produced by a command, one line at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    text: String,
}

impl CommandOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_line(&mut self, line: impl AsRef<str>) {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(line.as_ref());
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// One console command acting on a context of type `C`.
pub trait Command<C: ?Sized>: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn arg_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn perm_needed(&self) -> PermLevel;

    fn execute<'a>(
        &'a self,
        args: &'a [String],
        ctx: &'a C,
        out: &'a mut CommandOutput,
    ) -> BoxFuture<'a, ()>;
}

/// Shared check for commands that take no arguments; they still run.
pub fn ignore_extra_args(args: &[String], out: &mut CommandOutput) {
    if !args.is_empty() {
        out.append_line("This command doesn't accept arguments, ignoring");
    }
}

pub struct CommandMgr<C: ?Sized> {
    commands: BTreeMap<&'static str, Box<dyn Command<C>>>,
}

impl<C: ?Sized> Default for CommandMgr<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> CommandMgr<C> {
    pub fn new() -> Self {
        Self { commands: BTreeMap::new() }
    }

    /// Add a command. A name already present is kept and the new one dropped.
    pub fn add_command(&mut self, command: Box<dyn Command<C>>) {
        let name = command.name();
        if self.commands.contains_key(name) {
            tracing::warn!("[cmd] [duplicate] name={}", name);
            return;
        }
        self.commands.insert(name, command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Split a command line into words, collapsing runs of spaces.
    pub fn parse_command_line(line: &str) -> Vec<String> {
        line.split(' ').filter(|w| !w.is_empty()).map(str::to_string).collect()
    }

    /// Run `line` with the caller's permission `level`.
    pub async fn execute(&self, line: &str, level: PermLevel, ctx: &C) -> CommandOutput {
        let mut out = CommandOutput::new();
        let mut args = Self::parse_command_line(line.trim());
        if args.is_empty() {
            out.append_line(format!("Cannot parse: '{}' (too long?)", line));
            return out;
        }
        let name = args.remove(0);

        if name == "help" {
            match args.first() {
                None => self.show_help(level, &mut out),
                Some(cmd) => self.show_command_help(cmd, level, &mut out),
            }
            return out;
        }

        match self.commands.get(name.as_str()) {
            None => {
                out.append_line(format!("No such command '{}', try '/help' for a list.", name));
            }
            Some(cmd) if cmd.perm_needed() > level => {
                out.append_line(format!("Not allowed to execute command '{}'.", name));
            }
            Some(cmd) => {
                tracing::debug!("[cmd] [execute] name={} args={:?} level={:?}", name, args, level);
                cmd.execute(&args, ctx, &mut out).await;
            }
        }
        out
    }

    fn show_help(&self, level: PermLevel, out: &mut CommandOutput) {
        out.append_line(format!("Available commands ({} total)", self.commands.len()));
        for (name, cmd) in &self.commands {
            if cmd.perm_needed() <= level {
                self.show_command_help(name, level, out);
            }
        }
        out.append_line("Use /help <command> for more info.");
    }

    fn show_command_help(&self, name: &str, level: PermLevel, out: &mut CommandOutput) {
        let Some(cmd) = self.commands.get(name).filter(|c| c.perm_needed() <= level) else {
            out.append_line(format!("No help on '{}'. Try '/help' for a list.", name));
            return;
        };
        let mut usage = format!("  {}", cmd.name());
        for arg in cmd.arg_names() {
            usage.push_str(&format!(" <{}>", arg));
        }
        out.append_line(format!("{:<40}{}", usage, cmd.description()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;

    impl Command<AtomicUsize> for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn description(&self) -> &'static str {
            "Repeat the arguments"
        }
        fn arg_names(&self) -> &'static [&'static str] {
            &["text"]
        }
        fn perm_needed(&self) -> PermLevel {
            PermLevel::Player
        }
        fn execute<'a>(
            &'a self,
            args: &'a [String],
            ctx: &'a AtomicUsize,
            out: &'a mut CommandOutput,
        ) -> BoxFuture<'a, ()> {
            async move {
                ctx.fetch_add(1, Ordering::SeqCst);
                out.append_line(args.join(" "));
            }
            .boxed()
        }
    }

    struct Halt;

    impl Command<AtomicUsize> for Halt {
        fn name(&self) -> &'static str {
            "halt"
        }
        fn description(&self) -> &'static str {
            "Stop everything"
        }
        fn perm_needed(&self) -> PermLevel {
            PermLevel::Admin
        }
        fn execute<'a>(
            &'a self,
            _args: &'a [String],
            _ctx: &'a AtomicUsize,
            out: &'a mut CommandOutput,
        ) -> BoxFuture<'a, ()> {
            async move { out.append_line("halted") }.boxed()
        }
    }

    fn mgr() -> CommandMgr<AtomicUsize> {
        let mut m = CommandMgr::new();
        m.add_command(Box::new(Echo));
        m.add_command(Box::new(Halt));
        m
    }

    #[test]
    fn test_tokenizer_collapses_spaces() {
        let args = CommandMgr::<AtomicUsize>::parse_command_line("say   hello  world ");
        assert_eq!(args, vec!["say", "hello", "world"]);
    }

    #[tokio::test]
    async fn test_execute_with_args() {
        let ctx = AtomicUsize::new(0);
        let out = mgr().execute("  echo a   b ", PermLevel::Player, &ctx).await;
        assert_eq!(out.as_str(), "a b");
        assert_eq!(ctx.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let ctx = AtomicUsize::new(0);
        let out = mgr().execute("halt", PermLevel::Player, &ctx).await;
        assert_eq!(out.as_str(), "Not allowed to execute command 'halt'.");
    }

    #[tokio::test]
    async fn test_unknown_and_empty() {
        let ctx = AtomicUsize::new(0);
        let m = mgr();
        assert_eq!(
            m.execute("fly", PermLevel::Admin, &ctx).await.as_str(),
            "No such command 'fly', try '/help' for a list."
        );
        assert_eq!(m.execute("   ", PermLevel::Admin, &ctx).await.as_str(), "Cannot parse: '   ' (too long?)");
    }

    #[tokio::test]
    async fn test_help_lists_allowed_commands() {
        let ctx = AtomicUsize::new(0);
        let out = mgr().execute("help", PermLevel::Player, &ctx).await;
        let lines: Vec<&str> = out.as_str().lines().collect();
        assert_eq!(lines[0], "Available commands (2 total)");
        assert_eq!(lines[1], format!("{:<40}{}", "  echo <text>", "Repeat the arguments"));
        assert_eq!(lines[2], "Use /help <command> for more info.");
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn test_help_on_hidden_command() {
        let ctx = AtomicUsize::new(0);
        let out = mgr().execute("help halt", PermLevel::Player, &ctx).await;
        assert_eq!(out.as_str(), "No help on 'halt'. Try '/help' for a list.");
        let out = mgr().execute("help halt", PermLevel::Admin, &ctx).await;
        assert!(out.as_str().starts_with("  halt"));
        assert!(out.as_str().ends_with("Stop everything"));
    }

    #[test]
    fn test_duplicate_command_ignored() {
        let mut m = mgr();
        m.add_command(Box::new(Echo));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_perm_order() {
        assert!(PermLevel::NotSet < PermLevel::Player);
        assert!(PermLevel::Player < PermLevel::Admin);
        assert_eq!(PermLevel::from_roles(2), Some(PermLevel::Admin));
        assert_eq!(PermLevel::from_roles(7), None);
    }
}
