pub mod client;
pub mod transport;

pub use transport::TwitchIrcTransport;
