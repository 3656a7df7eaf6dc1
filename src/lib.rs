//! Game-session and resource-regeneration engine for the Starcade chat-bot
//! mini-game platform.
//!
//! The embedding bot constructs an [`state::Engine`] with its storage,
//! ephemeral KV and messaging implementations, then drives everything
//! through the functions in [`services`].

pub mod config;
pub mod dao;
pub mod economy;
pub mod error;
pub mod messaging;
pub mod services;
pub mod state;
