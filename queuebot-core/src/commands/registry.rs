//! src/commands/registry.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::commands::Command;
use crate::Error;

/// Case-insensitive map from every name and alias to its command.
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Arc<Command>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `command` under its name and every alias. Nothing is
    /// inserted if any of those keys is already taken.
    pub fn register(&self, command: Command) -> Result<Arc<Command>, Error> {
        let command = Arc::new(command);
        let mut map = self.commands.write();

        let mut keys = HashSet::new();
        for key in command.keys() {
            let key = key.to_lowercase();
            if key.is_empty() {
                return Err(Error::Config(format!(
                    "command '{}' has an empty name or alias",
                    command.name
                )));
            }
            if map.contains_key(&key) || !keys.insert(key.clone()) {
                return Err(Error::DuplicateCommand(key));
            }
        }

        for key in keys {
            map.insert(key, command.clone());
        }
        debug!(
            "Registered command '{}' (aliases: {:?})",
            command.name, command.aliases
        );
        Ok(command)
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<Command>> {
        self.commands.read().get(&name.to_lowercase()).cloned()
    }

    /// Distinct commands, sorted by name.
    pub fn commands(&self) -> Vec<Arc<Command>> {
        let map = self.commands.read();
        let mut seen = HashSet::new();
        let mut list: Vec<Arc<Command>> = map
            .values()
            .filter(|c| seen.insert(c.name.clone()))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    pub fn len(&self) -> usize {
        self.commands().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandContext, CommandHandler};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl CommandHandler for Echo {
        async fn handle(&self, _ctx: &CommandContext<'_>, args: &[String]) -> Result<String, Error> {
            Ok(args.join(" "))
        }
    }

    fn cmd(name: &str, aliases: &[&str]) -> Command {
        Command::new(name, Arc::new(Echo)).aliases(aliases)
    }

    #[test]
    fn resolves_names_and_aliases_case_insensitively() {
        let reg = CommandRegistry::new();
        reg.register(cmd("Move", &["m", "MV"])).unwrap();

        assert_eq!(reg.resolve("move").unwrap().name, "move");
        assert_eq!(reg.resolve("MV").unwrap().name, "move");
        assert_eq!(reg.resolve("M").unwrap().name, "move");
        assert!(reg.resolve("mvv").is_none());
    }

    #[test]
    fn duplicate_alias_is_rejected_without_partial_insert() {
        let reg = CommandRegistry::new();
        reg.register(cmd("pop", &["p"])).unwrap();

        let err = reg.register(cmd("ping", &["pi", "P"])).unwrap_err();
        assert!(matches!(err, Error::DuplicateCommand(ref k) if k == "p"));
        assert!(reg.resolve("ping").is_none());
        assert!(reg.resolve("pi").is_none());
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let reg = CommandRegistry::new();
        reg.register(cmd("queue", &[])).unwrap();
        assert!(matches!(
            reg.register(cmd("QUEUE", &["qq"])),
            Err(Error::DuplicateCommand(_))
        ));
    }

    #[test]
    fn command_list_is_deduplicated_and_sorted() {
        let reg = CommandRegistry::new();
        reg.register(cmd("queue", &["q"])).unwrap();
        reg.register(cmd("join", &["j"])).unwrap();
        reg.register(cmd("pop", &["p"])).unwrap();

        let names: Vec<String> = reg.commands().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["join", "pop", "queue"]);
        assert_eq!(reg.len(), 3);
    }
}
