pub mod engine;
pub mod mailbox;
pub mod message;

pub use engine::IngestionEngine;
pub use mailbox::{ImapMailbox, ImapSettings};
