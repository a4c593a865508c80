//! Server and bot configuration
//!
//! Both programs read a YAML file into a typed struct with serde_yaml.
//! Optional values fall back to the `default_*` functions below, and
//! `validate` rejects values the programs cannot run with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::network::Vector3;

/// A position in the world, as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Position> for Vector3 {
    fn from(p: Position) -> Self {
        Vector3::new(p.x, p.y, p.z)
    }
}

/// Whether the server reads console commands from stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Interactive,
    Daemon,
}

// ============================================
// Game server
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub characters: CharactersConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// MySQL database. Without it the server keeps everything in memory.
    #[serde(default)]
    pub sql: Option<SqlConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_address")]
    pub address: String,

    /// Game port. The ping service listens on `port - 1`.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_players")]
    pub max_players: usize,

    /// Reported to clients in the connect reply.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharactersConfig {
    #[serde(default = "default_max_per_account")]
    pub max_per_account: usize,

    /// Area and position where new characters appear.
    #[serde(default = "default_new_char_area")]
    pub new_char_area: String,

    #[serde(default)]
    pub new_char_pos: Position,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Distance covered by a plain (non private) chat line.
    #[serde(default = "default_say_radius")]
    pub say_radius: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub execution_mode: ExecutionMode,

    /// Console commands run at ADMIN level right after start-up.
    #[serde(default)]
    pub startup_script: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlConfig {
    pub host: String,

    #[serde(default = "default_sql_port")]
    pub port: u16,

    pub user: String,
    pub password: String,
    pub database: String,
}

impl SqlConfig {
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

// ============================================
// Default value functions
// These are called by serde when a field is missing
// ============================================

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    20768
}

fn default_max_players() -> usize {
    64
}

fn default_protocol_version() -> String {
    "1".to_string()
}

fn default_max_per_account() -> usize {
    4
}

fn default_new_char_area() -> String {
    "tmprotoworld".to_string()
}

fn default_say_radius() -> f32 {
    20.0
}

fn default_sql_port() -> u16 {
    3306
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_reconnect_attempts() -> u32 {
    3
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            max_players: default_max_players(),
            protocol_version: default_protocol_version(),
        }
    }
}

impl Default for CharactersConfig {
    fn default() -> Self {
        Self {
            max_per_account: default_max_per_account(),
            new_char_area: default_new_char_area(),
            new_char_pos: Position::default(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { say_radius: default_say_radius() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            characters: CharactersConfig::default(),
            chat: ChatConfig::default(),
            runtime: RuntimeConfig::default(),
            sql: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Parse configuration from a YAML string
    pub fn from_str(contents: &str) -> Result<Self> {
        let config: ServerConfig = serde_yaml::from_str(contents).context("Failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.network.address.is_empty(), "network.address cannot be empty");
        anyhow::ensure!(self.network.max_players > 0, "network.max_players must be at least 1");
        anyhow::ensure!(
            !self.network.protocol_version.is_empty(),
            "network.protocol_version cannot be empty"
        );
        anyhow::ensure!(
            self.characters.max_per_account > 0,
            "characters.max_per_account must be at least 1"
        );
        anyhow::ensure!(
            !self.characters.new_char_area.is_empty(),
            "characters.new_char_area cannot be empty"
        );
        anyhow::ensure!(
            self.chat.say_radius.is_finite() && self.chat.say_radius >= 0.0,
            "chat.say_radius must be a non-negative number, got {}",
            self.chat.say_radius
        );
        if let Some(sql) = &self.sql {
            anyhow::ensure!(!sql.host.is_empty(), "sql.host cannot be empty");
            anyhow::ensure!(!sql.user.is_empty(), "sql.user cannot be empty");
            anyhow::ensure!(!sql.database.is_empty(), "sql.database cannot be empty");
        }
        Ok(())
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self).context("Failed to serialize config to YAML")?;
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config to {}", path.as_ref().display()))?;
        Ok(())
    }
}

// ============================================
// Bot
// ============================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub settings: BotSettings,

    #[serde(default)]
    pub runtime: BotRuntime,

    #[serde(default)]
    pub auto: AutoConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    #[serde(default = "default_hostname")]
    pub hostname: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub user: String,

    /// Plain password; hashed before it goes on the wire.
    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub character: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotRuntime {
    #[serde(default)]
    pub startup_script: Option<String>,

    /// Read commands from stdin.
    #[serde(default)]
    pub interactive: bool,
}

/// Steps taken on their own as soon as the previous one succeeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoConfig {
    #[serde(default)]
    pub connect: bool,
    #[serde(default)]
    pub login: bool,
    #[serde(default)]
    pub join: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_reconnect_delay")]
    pub delay_secs: u64,

    #[serde(default = "default_reconnect_attempts")]
    pub max_attempts: u32,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: default_port(),
            user: String::new(),
            password: String::new(),
            character: String::new(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_secs: default_reconnect_delay(),
            max_attempts: default_reconnect_attempts(),
        }
    }
}

impl BotConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn from_str(contents: &str) -> Result<Self> {
        let config: BotConfig = serde_yaml::from_str(contents).context("Failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.settings.hostname.is_empty(), "settings.hostname cannot be empty");
        anyhow::ensure!(self.settings.port != 0, "settings.port cannot be 0");
        if self.auto.login {
            anyhow::ensure!(!self.settings.user.is_empty(), "auto.login needs settings.user");
        }
        if self.auto.join {
            anyhow::ensure!(
                !self.settings.character.is_empty(),
                "auto.join needs settings.character"
            );
        }
        if self.reconnect.enabled {
            anyhow::ensure!(
                self.reconnect.max_attempts > 0,
                "reconnect.max_attempts must be at least 1 when reconnect is enabled"
            );
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self).context("Failed to serialize config to YAML")?;
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config to {}", path.as_ref().display()))?;
        Ok(())
    }
}
