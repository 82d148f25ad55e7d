//! Name lookup over registered commands.

use kb_manifest::{BuiltinTable, UnavailableManifest, attach_handler};
use std::collections::BTreeMap;

use crate::types::RegisteredCommand;

/// Active commands by id and alias.
///
/// Rebuilt from scratch on every discovery pass or snapshot reload; never
/// patched in place.
#[derive(Debug, Clone, Default)]
pub struct CommandIndex {
    commands: Vec<RegisteredCommand>,
    names: BTreeMap<String, usize>,
    unavailable: Vec<UnavailableManifest>,
    partial: bool,
}

impl CommandIndex {
    /// Index `commands`, whose shadowing has already been resolved.
    pub fn new(
        commands: Vec<RegisteredCommand>,
        unavailable: Vec<UnavailableManifest>,
        partial: bool,
    ) -> Self {
        let mut names = BTreeMap::new();
        for (idx, command) in commands.iter().enumerate() {
            for name in command.active_names() {
                names.entry(name.to_string()).or_insert(idx);
            }
        }
        Self {
            commands,
            names,
            unavailable,
            partial,
        }
    }

    /// Active command answering to `name`.
    pub fn get(&self, name: &str) -> Option<&RegisteredCommand> {
        self.names.get(name).map(|&idx| &self.commands[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// All lookup names (ids and aliases), sorted.
    pub fn names(&self) -> Vec<&str> {
        self.names.keys().map(String::as_str).collect()
    }

    /// Every registered command, shadowed ones included.
    pub fn commands(&self) -> &[RegisteredCommand] {
        &self.commands
    }

    /// Commands that are not shadowed, sorted by id.
    pub fn active(&self) -> Vec<&RegisteredCommand> {
        let mut active: Vec<_> = self.commands.iter().filter(|c| !c.shadowed).collect();
        active.sort_by(|a, b| a.id().cmp(b.id()));
        active
    }

    pub fn shadowed(&self) -> impl Iterator<Item = &RegisteredCommand> {
        self.commands.iter().filter(|c| c.shadowed)
    }

    /// Packages whose manifest could not be loaded at all.
    pub fn unavailable(&self) -> &[UnavailableManifest] {
        &self.unavailable
    }

    /// Discovery was incomplete.
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Re-attach handlers after the commands were deserialized.
    pub fn attach_handlers(&mut self, builtins: &BuiltinTable) {
        for command in &mut self.commands {
            attach_handler(&mut command.manifest, builtins);
        }
    }
}
