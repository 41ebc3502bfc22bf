//! Report intake: matching free-form messages to departments and filing them.
//!
//! A sender describes a problem ("Hay humedad en Palermo 1584"), picks one of
//! the departments whose address shares a word with the message (or creates a
//! new one), and the report is stored under that department.

mod controller;
pub mod matcher;
pub mod replies;
pub mod session;
pub mod splitter;
pub mod triggers;

pub use controller::{DEFAULT_ORACLE_TIMEOUT, IntakeController};
pub use session::{ConversationState, IntakePhase, SessionStore, spawn_pruning_task};
