// src/lib.rs

pub mod auth;
pub mod bot;
pub mod commands;
pub mod config;
pub mod cooldown;
pub mod platforms;
pub mod queue;
pub mod tasks;

pub use queuebot_common::error::{Error, QueueError};
pub use queue::QueueEngine;
pub use cooldown::CooldownTracker;
pub use bot::{ChannelBot, MultiChannelBot};
