//! Intake bot: files free-form building reports under department addresses.

pub mod admin;
pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod intake;
pub mod llm;
pub mod store;
