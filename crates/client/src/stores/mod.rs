//! Local stores fed from session events.

pub mod messages;
pub mod presence;

pub use messages::{ChannelMessages, MessageStore};
pub use presence::ChannelPresence;
