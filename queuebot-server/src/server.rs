//! Wires config, token refresh, the IRC transport and the channel bots together.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};

use queuebot_core::bot::{ChannelBot, MultiChannelBot, ShutdownHandle};
use queuebot_core::config::BotConfig;
use queuebot_core::platforms::twitch_irc::TwitchIrcTransport;
use queuebot_core::tasks::token_refresh::spawn_token_refresh_task;

pub async fn run(config: BotConfig) -> anyhow::Result<()> {
    let tokens = config.token_source().context("building token source")?;

    // The bot stops first; the transport keeps running until the last replies are out.
    let shutdown = ShutdownHandle::new();
    let (transport_tx, transport_rx) = watch::channel(false);

    let refresh_task = spawn_token_refresh_task(tokens.clone(), transport_rx.clone());
    let (transport, incoming, transport_task) =
        TwitchIrcTransport::spawn(&config.bot_name, tokens.clone(), transport_rx);

    let bot = Arc::new(MultiChannelBot::new(Arc::new(transport), shutdown.clone()));
    for resolved in config.resolved_channels() {
        let channel = ChannelBot::start(&resolved, Some(tokens.clone()), shutdown.clone())
            .await
            .with_context(|| format!("starting channel #{}", resolved.name))?;
        bot.add_channel(channel).await?;
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received => shutting down.");
                    shutdown.trigger();
                }
                Err(e) => error!("Failed to listen for Ctrl-C: {:?}", e),
            }
        });
    }

    let result = bot.clone().run(incoming).await;
    if let Err(e) = &result {
        error!("Bot loop ended with error: {:?}", e);
    }

    let _ = transport_tx.send(true);
    if let Err(e) = transport_task.await {
        warn!("Transport task ended abnormally: {:?}", e);
    }
    if let Err(e) = refresh_task.await {
        warn!("Token refresh task ended abnormally: {:?}", e);
    }

    info!("All tasks stopped.");
    result.map_err(Into::into)
}
