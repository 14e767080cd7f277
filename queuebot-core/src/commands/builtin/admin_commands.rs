//! src/commands/builtin/admin_commands.rs
//!
//! Queue lifecycle: pause/unpause, start/end, clear.

use tracing::info;

use crate::commands::CommandContext;
use crate::Error;

pub fn handle_pause(ctx: &CommandContext<'_>) -> Result<String, Error> {
    ctx.channel.queue.pause()?;
    Ok("Queue is now paused. No new entries can be added until the queue is unpaused.".to_string())
}

pub fn handle_unpause(ctx: &CommandContext<'_>) -> Result<String, Error> {
    ctx.channel.queue.unpause()?;
    Ok("Queue is now open again.".to_string())
}

pub fn handle_start_queue(ctx: &CommandContext<'_>) -> String {
    let queue = &ctx.channel.queue;
    if queue.is_enabled() {
        return "Queue system is already running!".to_string();
    }
    queue.enable();
    info!("#{}: queue started by {}", ctx.channel.channel, ctx.user());
    format!("@{} has started the queue system!", ctx.user())
}

pub fn handle_end_queue(ctx: &CommandContext<'_>) -> String {
    let queue = &ctx.channel.queue;
    if !queue.is_enabled() {
        return "Queue system is already disabled!".to_string();
    }
    queue.disable();
    info!("#{}: queue ended by {}", ctx.channel.channel, ctx.user());
    format!("@{} has ended the queue system!", ctx.user())
}

pub fn handle_clear_queue(ctx: &CommandContext<'_>) -> Result<String, Error> {
    let removed = ctx.channel.queue.clear()?;
    Ok(format!("Queue cleared ({removed} users removed)"))
}

#[cfg(test)]
mod tests {
    use crate::commands::builtin::test_support::*;

    #[tokio::test]
    async fn start_and_end_refuse_repeats() {
        let bot = bot();
        assert_eq!(say(&bot, moderator("!endqueue")).await, "Queue system is already disabled!");
        assert_eq!(say(&bot, moderator("!startqueue")).await, "@SomeMod has started the queue system!");
        assert_eq!(say(&bot, moderator("!sq")).await, "Queue system is already running!");

        say(&bot, viewer("!join")).await;
        assert_eq!(say(&bot, moderator("!eq")).await, "@SomeMod has ended the queue system!");
        assert!(!bot.queue().is_enabled());
        assert_eq!(bot.queue().size(), 0);
    }

    #[tokio::test]
    async fn vips_cannot_start_the_queue() {
        let bot = bot();
        assert_eq!(
            say(&bot, vip("!startqueue")).await,
            "This command can only be used by moderators."
        );
        assert!(!bot.queue().is_enabled());
    }

    #[tokio::test]
    async fn pause_cycle() {
        let bot = bot();
        assert_eq!(say(&bot, vip("!pq")).await, "Queue system is currently disabled.");
        bot.queue().enable();

        assert_eq!(
            say(&bot, vip("!pausequeue")).await,
            "Queue is now paused. No new entries can be added until the queue is unpaused."
        );
        assert_eq!(say(&bot, vip("!pq")).await, "Queue system is already paused.");
        assert_eq!(say(&bot, vip("!unpausequeue")).await, "Queue is now open again.");
        assert_eq!(say(&bot, vip("!uq")).await, "Queue system is not paused.");
    }

    #[tokio::test]
    async fn clear_reports_removed_count() {
        let bot = bot();
        bot.queue().enable();
        say(&bot, vip("!join a b c")).await;
        assert_eq!(say(&bot, vip("!clear")).await, "Queue cleared (3 users removed)");
        assert_eq!(say(&bot, viewer("!queue")).await, "The queue is currently empty.");
        assert!(bot.queue().is_enabled());
    }
}
