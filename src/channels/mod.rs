//! Channel abstraction for message I/O.

pub mod blocklist;
pub mod channel;
pub mod cli;
pub mod manager;
pub mod telegram;

pub use blocklist::Blocklist;
pub use channel::*;
pub use cli::CliChannel;
pub use manager::ChannelManager;
pub use telegram::TelegramChannel;
