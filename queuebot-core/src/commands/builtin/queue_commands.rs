//! src/commands/builtin/queue_commands.rs
//!
//! join, leave, queue, position, pop, remove, move, movetoend.

use queuebot_common::models::{QueueEntry, QueueState, Username};
use queuebot_common::QueueError;

use super::parse_number;
use crate::commands::CommandContext;
use crate::Error;

fn joined(name: &str, position: usize, total: usize) -> String {
    format!("{name} joined queue at position {position} ({total} total)")
}

/// Consistent snapshot of an enabled queue.
fn enabled_snapshot(ctx: &CommandContext<'_>) -> Result<QueueState, QueueError> {
    let state = ctx.channel.queue.snapshot();
    if !state.enabled {
        return Err(QueueError::QueueDisabled);
    }
    Ok(state)
}

/// 1-based position and entry of `name` in `entries`.
fn find<'a>(entries: &'a [QueueEntry], name: &str) -> Option<(usize, &'a QueueEntry)> {
    let wanted = Username::new(name);
    entries
        .iter()
        .enumerate()
        .find(|(_, e)| e.username == wanted)
        .map(|(i, e)| (i + 1, e))
}

fn invalid_position(len: usize) -> String {
    format!("Invalid position. Queue has {len} users.")
}

pub fn handle_join(ctx: &CommandContext<'_>, args: &[String]) -> Result<String, Error> {
    let queue = &ctx.channel.queue;

    if args.is_empty() {
        let position = queue.add(ctx.user(), ctx.is_privileged())?;
        return Ok(joined(ctx.user(), position, queue.size()));
    }

    if !ctx.is_privileged() {
        let name = Username::new(&args[0]);
        let position = queue.add(name.display(), false)?;
        return Ok(joined(name.display(), position, queue.size()));
    }

    // `!join user N` inserts at a position.
    if let [user, pos] = args {
        if let Some(target) = parse_number(pos) {
            let name = Username::new(user);
            let position = queue.add_at_position(name.display(), target, true)?;
            return Ok(joined(name.display(), position, queue.size()));
        }
    }

    if !queue.is_enabled() {
        return Err(QueueError::QueueDisabled.into());
    }
    let replies: Vec<String> = args
        .iter()
        .map(|raw| {
            let name = Username::new(raw);
            match queue.add(name.display(), true) {
                Ok(position) => joined(name.display(), position, queue.size()),
                Err(e) => format!("Error adding {}: {}", name.display(), e),
            }
        })
        .collect();
    Ok(replies.join(" "))
}

pub fn handle_leave(ctx: &CommandContext<'_>, args: &[String]) -> Result<String, Error> {
    let target = match args.first() {
        Some(name) if ctx.is_privileged() => name.as_str(),
        _ => ctx.user(),
    };

    match ctx.channel.queue.remove(target)? {
        Some(entry) => Ok(format!("{} left queue", entry.username)),
        None => Err(QueueError::NotFound(Username::new(target).display().to_string()).into()),
    }
}

pub fn handle_queue(ctx: &CommandContext<'_>) -> Result<String, Error> {
    let state = enabled_snapshot(ctx)?;
    if state.entries.is_empty() {
        return Ok("The queue is currently empty.".to_string());
    }
    Ok(format!(
        "Queue: {} ({} total)",
        state.usernames().join(", "),
        state.entries.len()
    ))
}

pub fn handle_position(ctx: &CommandContext<'_>, args: &[String]) -> Result<String, Error> {
    let state = enabled_snapshot(ctx)?;

    let Some(arg) = args.first() else {
        return Ok(match find(&state.entries, ctx.user()) {
            Some((position, entry)) => format!("{} is at position {}", entry.username, position),
            None => format!("@{}, you are not in the queue!", ctx.user()),
        });
    };

    if let Some(position) = parse_number(arg) {
        let len = state.entries.len();
        if position < 1 || position as usize > len {
            return Ok(invalid_position(len));
        }
        let entry = &state.entries[position as usize - 1];
        return Ok(format!("User at position {} is {}", position, entry.username));
    }

    match find(&state.entries, arg) {
        Some((position, entry)) => Ok(format!("{} is at position {}", entry.username, position)),
        None => Err(QueueError::NotFound(Username::new(arg).display().to_string()).into()),
    }
}

pub fn handle_pop(ctx: &CommandContext<'_>, args: &[String]) -> Result<String, Error> {
    let count = match args.first() {
        None => ctx.channel.settings.default_pop_count.max(1),
        Some(raw) => match parse_number(raw) {
            Some(n) if n >= 1 => n as usize,
            _ => {
                return Ok(
                    "Invalid number of users to pop. Please specify a positive number.".to_string(),
                )
            }
        },
    };

    let popped = ctx.channel.queue.pop_n(count)?;
    let names: Vec<String> = popped.iter().map(|e| e.username.to_string()).collect();
    Ok(format!("Popped: {}", names.join(", ")))
}

enum RemoveTarget {
    Index(usize, String),
    Name(String),
    Invalid(String),
}

pub fn handle_remove(ctx: &CommandContext<'_>, args: &[String]) -> Result<String, Error> {
    if args.is_empty() {
        return Ok(format!(
            "Usage: {p}remove <username> or {p}remove <position>",
            p = ctx.prefix
        ));
    }

    // Resolve every index against the same snapshot so earlier removals
    // don't shift later positions.
    let state = enabled_snapshot(ctx)?;
    let len = state.entries.len();
    let targets: Vec<RemoveTarget> = args
        .iter()
        .map(|arg| match parse_number(arg) {
            Some(n) if n >= 1 && n as usize <= len => {
                RemoveTarget::Index(n as usize, state.entries[n as usize - 1].username.to_string())
            }
            Some(_) => RemoveTarget::Invalid(invalid_position(len)),
            None => RemoveTarget::Name(arg.clone()),
        })
        .collect();

    let queue = &ctx.channel.queue;
    let mut replies = Vec::with_capacity(targets.len());
    for target in targets {
        let reply = match target {
            RemoveTarget::Invalid(msg) => msg,
            RemoveTarget::Index(position, name) => match queue.remove(&name)? {
                Some(entry) => format!("{} (position {}) removed from queue", entry.username, position),
                None => QueueError::NotFound(name).to_string(),
            },
            RemoveTarget::Name(name) => match queue.remove(&name)? {
                Some(entry) => format!("{} removed from queue", entry.username),
                None => QueueError::NotFound(Username::new(&name).display().to_string()).to_string(),
            },
        };
        replies.push(reply);
    }
    Ok(replies.join(" "))
}

pub fn handle_move(ctx: &CommandContext<'_>, args: &[String]) -> Result<String, Error> {
    let [from, to, ..] = args else {
        return Ok(format!("Usage: {}move <username/position> <position>", ctx.prefix));
    };

    let state = enabled_snapshot(ctx)?;
    let len = state.entries.len();
    let name = match parse_number(from) {
        Some(n) => {
            if n < 1 || n as usize > len {
                return Ok(format!("Invalid from position. Queue has {len} users."));
            }
            state.entries[n as usize - 1].username.to_string()
        }
        None => match find(&state.entries, from) {
            Some((_, entry)) => entry.username.to_string(),
            None => {
                return Err(QueueError::NotFound(Username::new(from).display().to_string()).into())
            }
        },
    };

    let Some(target) = parse_number(to) else {
        return Ok("Invalid target position. Please provide a number.".to_string());
    };

    let position = ctx.channel.queue.move_user(&name, target)?;
    Ok(format!("{name} moved to position {position}"))
}

pub fn handle_move_to_end(ctx: &CommandContext<'_>, args: &[String]) -> Result<String, Error> {
    let Some(arg) = args.first() else {
        return Ok(format!("Usage: {}movetoend <username>", ctx.prefix));
    };

    let state = enabled_snapshot(ctx)?;
    let Some((_, entry)) = find(&state.entries, arg) else {
        return Err(QueueError::NotFound(Username::new(arg).display().to_string()).into());
    };
    let name = entry.username.to_string();

    let position = ctx.channel.queue.move_to_end(&name)?;
    Ok(format!("{name} moved to the end of the queue (position {position})"))
}
