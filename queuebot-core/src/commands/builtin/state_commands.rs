//! src/commands/builtin/state_commands.rs
//!
//! Manual backup and the two restore commands. I/O failures are reported
//! in chat rather than swallowed.

use tracing::{error, warn};

use crate::commands::CommandContext;
use crate::queue::StateKind;

pub async fn handle_save_queue(ctx: &CommandContext<'_>) -> String {
    match ctx.channel.queue.save_backup().await {
        Ok(0) => "Queue state has been saved (empty queue)".to_string(),
        Ok(n) => format!("Queue state has been saved with {n} user(s)"),
        Err(e) => {
            error!("#{}: saving backup failed: {:?}", ctx.channel.channel, e);
            format!("Error saving queue state: {}", e.user_message())
        }
    }
}

pub async fn handle_restore_queue(ctx: &CommandContext<'_>) -> String {
    match ctx.channel.queue.restore(StateKind::Backup).await {
        Ok(Some(n)) => format!("Queue state has been restored with {n} user(s)!"),
        Ok(None) => format!(
            "No backup file found. Use {}savequeue to create a backup first.",
            ctx.prefix
        ),
        Err(e) => {
            warn!("#{}: restoring backup failed: {:?}", ctx.channel.channel, e);
            format!("Error loading queue state: {}", e.user_message())
        }
    }
}

pub async fn handle_restore_auto(ctx: &CommandContext<'_>) -> String {
    match ctx.channel.queue.restore(StateKind::Auto).await {
        Ok(Some(n)) => format!("Auto-save state has been restored with {n} user(s)!"),
        Ok(None) => "No auto-save file found.".to_string(),
        Err(e) => {
            warn!("#{}: restoring auto-save failed: {:?}", ctx.channel.channel, e);
            format!("Error loading auto-save state: {}", e.user_message())
        }
    }
}
