//! Collision resolution and requirement checks.

use kb_discovery::engine::sort_results;
use kb_discovery::{DiscoveryResult, DiscoverySource};
use kb_manifest::ManifestEntry;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{RegistrationError, Result};
use crate::index::CommandIndex;
use crate::probe::{NodeModulesProbe, RequirementProbe};
use crate::types::RegisteredCommand;

/// Builds a [`CommandIndex`] from discovery results.
pub struct Registrar {
    probe: Arc<dyn RequirementProbe>,
}

impl Registrar {
    /// Registrar probing requirements under `workspace_root`.
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            probe: Arc::new(NodeModulesProbe::new(workspace_root)),
        }
    }

    pub fn with_probe(probe: Arc<dyn RequirementProbe>) -> Self {
        Self { probe }
    }

    /// Register every loaded manifest in `results`.
    ///
    /// Results are processed in source priority order. For each id and
    /// alias the first claimant keeps the name unless a strictly
    /// higher-priority command arrives later. A losing id shadows the whole
    /// command; a losing alias is dropped from that command only. Equal
    /// priority between two workspace packages is an error.
    pub async fn register(
        &self,
        results: &[DiscoveryResult],
        partial: bool,
    ) -> Result<CommandIndex> {
        let mut ordered = results.to_vec();
        sort_results(&mut ordered);

        let workspace_packages: HashSet<&str> = results
            .iter()
            .filter(|r| r.source == DiscoverySource::Workspace)
            .map(|r| r.package_name.as_str())
            .collect();

        let mut commands: Vec<RegisteredCommand> = Vec::new();
        let mut unavailable = Vec::new();
        let mut owners: HashMap<String, usize> = HashMap::new();
        let mut workspace_claims: HashMap<String, String> = HashMap::new();

        for result in ordered {
            for entry in result.manifests {
                let manifest = match entry {
                    ManifestEntry::Loaded(manifest) => manifest,
                    ManifestEntry::Unavailable(record) => {
                        unavailable.push(record);
                        continue;
                    }
                };

                let mut command = RegisteredCommand::new(manifest, result.source);
                self.check_requirements(&mut command, &workspace_packages)
                    .await;

                let idx = commands.len();
                let names: Vec<String> = command.manifest.names().map(str::to_string).collect();
                if command.source == DiscoverySource::Workspace {
                    claim_workspace(
                        &mut workspace_claims,
                        &names,
                        &command.manifest.source_package,
                    )?;
                }
                commands.push(command);

                for name in names {
                    if commands[idx].shadowed {
                        break;
                    }
                    claim(&mut owners, &mut commands, &name, idx)?;
                }
            }
        }

        let shadowed = commands.iter().filter(|c| c.shadowed).count();
        info!(
            commands = commands.len(),
            shadowed,
            unavailable = unavailable.len(),
            "registry built"
        );
        Ok(CommandIndex::new(commands, unavailable, partial))
    }

    async fn check_requirements(
        &self,
        command: &mut RegisteredCommand,
        workspace_packages: &HashSet<&str>,
    ) {
        for requirement in &command.manifest.requires {
            if workspace_packages.contains(requirement.as_str()) {
                continue;
            }
            if self
                .probe
                .is_installed(requirement, &command.manifest.package_root)
                .await
            {
                continue;
            }
            debug!(command = %command.manifest.id, requirement = %requirement, "unmet requirement");
            let reason = format!("missing dependency {requirement}");
            let hint = Some(format!("pnpm add {requirement}"));
            command.mark_unavailable(reason, hint);
            return;
        }
    }
}

/// Record workspace ownership of `names`, independent of who holds the slot.
fn claim_workspace(
    claims: &mut HashMap<String, String>,
    names: &[String],
    package: &str,
) -> Result<()> {
    for name in names {
        match claims.get(name) {
            Some(first) if first != package => {
                return Err(RegistrationError::WorkspaceCollision {
                    name: name.clone(),
                    first: first.clone(),
                    second: package.to_string(),
                });
            }
            Some(_) => {}
            None => {
                claims.insert(name.clone(), package.to_string());
            }
        }
    }
    Ok(())
}

/// Give `name` to `challenger`, or record why it lost.
fn claim(
    owners: &mut HashMap<String, usize>,
    commands: &mut [RegisteredCommand],
    name: &str,
    challenger: usize,
) -> Result<()> {
    let Some(&holder) = owners.get(name) else {
        owners.insert(name.to_string(), challenger);
        return Ok(());
    };

    let (winner, loser) = if commands[challenger].priority > commands[holder].priority {
        (challenger, holder)
    } else {
        (holder, challenger)
    };

    if commands[winner].source == commands[loser].source {
        warn!(
            name,
            kept = %commands[winner].manifest.source_package,
            shadowed = %commands[loser].manifest.source_package,
            source = %commands[winner].source,
            "command name declared by two packages of equal priority"
        );
    } else {
        debug!(
            name,
            kept = %commands[winner].manifest.source_package,
            shadowed = %commands[loser].manifest.source_package,
            "command name shadowed"
        );
    }

    owners.insert(name.to_string(), winner);
    lose(owners, &mut commands[loser], loser, name);
    Ok(())
}

fn lose(
    owners: &mut HashMap<String, usize>,
    command: &mut RegisteredCommand,
    idx: usize,
    name: &str,
) {
    if command.manifest.id == name {
        command.shadowed = true;
        owners.retain(|_, owner| *owner != idx);
    } else if !command.shadowed_aliases.iter().any(|a| a == name) {
        command.shadowed_aliases.push(name.to_string());
    }
}
