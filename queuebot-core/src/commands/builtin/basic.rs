//! src/commands/builtin/basic.rs
//!
//! help, ping, uptime, auth, kill.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use tracing::info;

use crate::commands::CommandContext;
use crate::tasks::token_refresh::calculate_check_interval;
use crate::Error;

pub fn handle_help(ctx: &CommandContext<'_>, args: &[String]) -> Result<String, Error> {
    if let Some(wanted) = args.first() {
        let name = wanted.trim_start_matches(ctx.prefix);
        return Ok(match ctx.registry.resolve(name) {
            Some(cmd) => cmd.help_line(ctx.prefix),
            None => format!("Unknown command: {}{}", ctx.prefix, name),
        });
    }

    let lines: Vec<String> = ctx
        .registry
        .commands()
        .iter()
        .filter(|cmd| cmd.permission.allows(ctx.tier))
        .map(|cmd| cmd.help_line(ctx.prefix))
        .collect();

    if lines.is_empty() {
        return Ok("No commands available.".to_string());
    }
    Ok(format!("Available commands: {}", lines.join(" | ")))
}

pub fn handle_ping() -> String {
    "Pong! 🏓".to_string()
}

pub fn handle_uptime(ctx: &CommandContext<'_>) -> String {
    format_uptime(Utc::now() - ctx.channel.started_at)
}

fn format_uptime(elapsed: ChronoDuration) -> String {
    let total = elapsed.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("Bot has been running for {hours} hours, {minutes} minutes, and {seconds} seconds")
    } else if minutes > 0 {
        format!("Bot has been running for {minutes} minutes and {seconds} seconds")
    } else {
        format!("Bot has been running for {seconds} seconds")
    }
}

pub fn handle_auth(ctx: &CommandContext<'_>) -> String {
    let Some(tokens) = ctx.channel.tokens.as_ref() else {
        return "Token information is not available.".to_string();
    };
    let tz = ctx.channel.settings.timezone;
    let now = Utc::now();
    let expires = tokens.expires_at();

    let wait = ChronoDuration::from_std(calculate_check_interval(expires, now))
        .unwrap_or_else(|_| ChronoDuration::zero());

    format!(
        "Last refresh: {} | Expires: {} | Next check: {}",
        format_in_tz(tokens.last_refresh(), tz),
        format_in_tz(expires, tz),
        format_in_tz(Some(now + wait), tz),
    )
}

fn format_in_tz(when: Option<DateTime<Utc>>, tz: Tz) -> String {
    match when {
        Some(t) => t.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        None => "unknown".to_string(),
    }
}

pub fn handle_kill(ctx: &CommandContext<'_>) -> String {
    info!("#{}: shutdown requested by {}", ctx.channel.channel, ctx.user());
    ctx.channel.shutdown.trigger();
    "Bot shutdown initiated. Goodbye! 👋".to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::auth::MockTokenSource;
    use crate::bot::{ChannelBot, ChannelSettings, ShutdownHandle};
    use crate::commands::builtin::test_support::*;
    use crate::queue::QueueEngine;
    use queuebot_common::models::CooldownConfig;

    #[tokio::test]
    async fn ping_pongs() {
        let bot = bot();
        assert_eq!(say(&bot, viewer("!ping")).await, "Pong! 🏓");
    }

    #[tokio::test]
    async fn help_hides_commands_above_the_callers_tier() {
        let bot = bot();

        let regular = say(&bot, viewer("!help")).await;
        assert!(regular.starts_with("Available commands: "));
        assert!(regular.contains("!join (!j): Join the queue"));
        assert!(!regular.contains("!pop"));
        assert!(!regular.contains("[Mod Only]"));

        let vip = say(&bot, vip("!help")).await;
        assert!(vip.contains("!pop (!p): Pop users from the front of the queue [Mod/VIP]"));
        assert!(!vip.contains("!kill"));

        let moderator = say(&bot, moderator("!help")).await;
        assert!(moderator.contains("!kill (!k): Shut the bot down [Mod Only]"));
    }

    #[tokio::test]
    async fn help_for_one_command() {
        let bot = bot();
        assert_eq!(
            say(&bot, viewer("!help !mv")).await,
            "!move (!m, !mv): Move a user in the queue [Mod/VIP]"
        );
        assert_eq!(say(&bot, viewer("!help nope")).await, "Unknown command: !nope");
    }

    #[test]
    fn uptime_wording() {
        assert_eq!(
            format_uptime(ChronoDuration::seconds(42)),
            "Bot has been running for 42 seconds"
        );
        assert_eq!(
            format_uptime(ChronoDuration::seconds(125)),
            "Bot has been running for 2 minutes and 5 seconds"
        );
        assert_eq!(
            format_uptime(ChronoDuration::seconds(3 * 3600 + 61)),
            "Bot has been running for 3 hours, 1 minutes, and 1 seconds"
        );
    }

    #[tokio::test]
    async fn auth_without_tokens() {
        let bot = bot();
        assert_eq!(
            say(&bot, moderator("!auth")).await,
            "Token information is not available."
        );
    }

    #[tokio::test]
    async fn auth_reports_times_in_channel_timezone() {
        let refreshed = Utc.with_ymd_and_hms(2024, 1, 15, 17, 0, 0).unwrap();
        let expires = Utc.with_ymd_and_hms(2024, 1, 15, 21, 0, 0).unwrap();

        let mut tokens = MockTokenSource::new();
        tokens.expect_last_refresh().return_const(Some(refreshed));
        tokens.expect_expires_at().return_const(Some(expires));

        let bot = ChannelBot::with_queue(
            Arc::new(QueueEngine::new("testchan")),
            ChannelSettings::default(),
            CooldownConfig::none(),
            Some(Arc::new(tokens)),
            ShutdownHandle::new(),
        )
        .unwrap();

        let reply = say(&bot, moderator("!auth")).await;
        assert!(
            reply.starts_with("Last refresh: 2024-01-15 12:00:00 EST | Expires: 2024-01-15 16:00:00 EST | Next check: "),
            "{reply}"
        );
    }

    #[tokio::test]
    async fn kill_triggers_shutdown() {
        let bot = bot();
        assert_eq!(
            say(&bot, viewer("!kill")).await,
            "This command can only be used by moderators."
        );
        assert!(!bot.state().shutdown.is_triggered());

        assert_eq!(say(&bot, moderator("!k")).await, "Bot shutdown initiated. Goodbye! 👋");
        assert!(bot.state().shutdown.is_triggered());
    }
}
