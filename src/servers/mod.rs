//! Server implementations
//!
//! - game: accounts, characters, the world and its clock

pub mod game;
