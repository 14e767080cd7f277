//! src/bot/mod.rs

pub mod channel;
pub mod multi;
pub mod shutdown;

pub use channel::{ChannelBot, ChannelSettings, ChannelState};
pub use multi::MultiChannelBot;
pub use shutdown::ShutdownHandle;
