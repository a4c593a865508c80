//! Fearann Muin - game server, bot and their shared network core
//!
//! A length-prefixed, type-tagged binary protocol over TCP, the game server
//! built on it and a headless scripted client.

// ============================================
// Shared
// ============================================

/// Server and bot configuration (YAML)
pub mod config;
/// Lifecycle, signals, logging set-up
pub mod core;
/// Console command framework
pub mod command;
/// Wire protocol, message catalogue, connection plumbing
pub mod network;

// ============================================
// Programs
// ============================================

/// Game server
pub mod servers;
/// Headless client
pub mod bot;
