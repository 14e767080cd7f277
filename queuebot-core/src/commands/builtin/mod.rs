//! src/commands/builtin/mod.rs
//!
//! The commands every channel gets. Each handler lives in a themed file;
//! `Builtin` is the single `CommandHandler` that routes to them.

pub mod admin_commands;
pub mod basic;
pub mod queue_commands;
pub mod state_commands;

use std::sync::Arc;

use async_trait::async_trait;

use queuebot_common::models::PermissionTier;
use crate::commands::{Command, CommandContext, CommandDispatcher, CommandHandler};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Help,
    Ping,
    Uptime,
    Auth,
    Kill,
    Join,
    Leave,
    Queue,
    Position,
    Pop,
    Remove,
    Move,
    MoveToEnd,
    Pause,
    Unpause,
    StartQueue,
    EndQueue,
    ClearQueue,
    SaveQueue,
    RestoreQueue,
    RestoreAuto,
}

#[async_trait]
impl CommandHandler for Builtin {
    async fn handle(&self, ctx: &CommandContext<'_>, args: &[String]) -> Result<String, Error> {
        match self {
            Builtin::Help => basic::handle_help(ctx, args),
            Builtin::Ping => Ok(basic::handle_ping()),
            Builtin::Uptime => Ok(basic::handle_uptime(ctx)),
            Builtin::Auth => Ok(basic::handle_auth(ctx)),
            Builtin::Kill => Ok(basic::handle_kill(ctx)),
            Builtin::Join => queue_commands::handle_join(ctx, args),
            Builtin::Leave => queue_commands::handle_leave(ctx, args),
            Builtin::Queue => queue_commands::handle_queue(ctx),
            Builtin::Position => queue_commands::handle_position(ctx, args),
            Builtin::Pop => queue_commands::handle_pop(ctx, args),
            Builtin::Remove => queue_commands::handle_remove(ctx, args),
            Builtin::Move => queue_commands::handle_move(ctx, args),
            Builtin::MoveToEnd => queue_commands::handle_move_to_end(ctx, args),
            Builtin::Pause => admin_commands::handle_pause(ctx),
            Builtin::Unpause => admin_commands::handle_unpause(ctx),
            Builtin::StartQueue => Ok(admin_commands::handle_start_queue(ctx)),
            Builtin::EndQueue => Ok(admin_commands::handle_end_queue(ctx)),
            Builtin::ClearQueue => admin_commands::handle_clear_queue(ctx),
            Builtin::SaveQueue => Ok(state_commands::handle_save_queue(ctx).await),
            Builtin::RestoreQueue => Ok(state_commands::handle_restore_queue(ctx).await),
            Builtin::RestoreAuto => Ok(state_commands::handle_restore_auto(ctx).await),
        }
    }
}

struct Spec {
    name: &'static str,
    aliases: &'static [&'static str],
    description: &'static str,
    permission: PermissionTier,
    handler: Builtin,
}

const BUILTINS: &[Spec] = &[
    Spec { name: "help", aliases: &[], description: "Show the list of available commands", permission: PermissionTier::Any, handler: Builtin::Help },
    Spec { name: "ping", aliases: &[], description: "Check if the bot is alive", permission: PermissionTier::Any, handler: Builtin::Ping },
    Spec { name: "uptime", aliases: &["up"], description: "Show how long the bot has been running", permission: PermissionTier::Any, handler: Builtin::Uptime },
    Spec { name: "join", aliases: &["j"], description: "Join the queue", permission: PermissionTier::Any, handler: Builtin::Join },
    Spec { name: "leave", aliases: &["l"], description: "Leave the queue", permission: PermissionTier::Any, handler: Builtin::Leave },
    Spec { name: "queue", aliases: &["q"], description: "Show the current queue", permission: PermissionTier::Any, handler: Builtin::Queue },
    Spec { name: "position", aliases: &["pos"], description: "Show your position in the queue", permission: PermissionTier::Any, handler: Builtin::Position },
    Spec { name: "pop", aliases: &["p"], description: "Pop users from the front of the queue", permission: PermissionTier::Privileged, handler: Builtin::Pop },
    Spec { name: "remove", aliases: &["r"], description: "Remove users from the queue", permission: PermissionTier::Privileged, handler: Builtin::Remove },
    Spec { name: "move", aliases: &["m", "mv"], description: "Move a user in the queue", permission: PermissionTier::Privileged, handler: Builtin::Move },
    Spec { name: "movetoend", aliases: &["mte"], description: "Move a user to the end of the queue", permission: PermissionTier::Privileged, handler: Builtin::MoveToEnd },
    Spec { name: "pausequeue", aliases: &["pq"], description: "Pause the queue", permission: PermissionTier::Privileged, handler: Builtin::Pause },
    Spec { name: "unpausequeue", aliases: &["uq"], description: "Unpause the queue", permission: PermissionTier::Privileged, handler: Builtin::Unpause },
    Spec { name: "clearqueue", aliases: &["cq", "clear"], description: "Clear all users from the queue", permission: PermissionTier::Privileged, handler: Builtin::ClearQueue },
    Spec { name: "startqueue", aliases: &["sq"], description: "Start the queue system", permission: PermissionTier::ModeratorOnly, handler: Builtin::StartQueue },
    Spec { name: "endqueue", aliases: &["eq"], description: "End the queue system", permission: PermissionTier::ModeratorOnly, handler: Builtin::EndQueue },
    Spec { name: "savequeue", aliases: &["svq"], description: "Save a backup of the queue", permission: PermissionTier::ModeratorOnly, handler: Builtin::SaveQueue },
    Spec { name: "restorequeue", aliases: &["rq"], description: "Restore the queue from the backup", permission: PermissionTier::ModeratorOnly, handler: Builtin::RestoreQueue },
    Spec { name: "restoreauto", aliases: &["ra"], description: "Restore the queue from the auto-save", permission: PermissionTier::ModeratorOnly, handler: Builtin::RestoreAuto },
    Spec { name: "auth", aliases: &[], description: "Show token refresh information", permission: PermissionTier::ModeratorOnly, handler: Builtin::Auth },
    Spec { name: "kill", aliases: &["k"], description: "Shut the bot down", permission: PermissionTier::ModeratorOnly, handler: Builtin::Kill },
];

/// Registers every builtin on `dispatcher`. Fails on the first name clash.
pub fn register_builtin_commands(dispatcher: &CommandDispatcher) -> Result<(), Error> {
    for spec in BUILTINS {
        let command = Command::new(spec.name, Arc::new(spec.handler))
            .aliases(spec.aliases)
            .description(spec.description)
            .permission(spec.permission);
        dispatcher.register(command)?;
    }
    Ok(())
}

/// Parses a chat argument as a whole number (positions, counts).
pub(crate) fn parse_number(arg: &str) -> Option<i64> {
    arg.trim().parse::<i64>().ok()
}
