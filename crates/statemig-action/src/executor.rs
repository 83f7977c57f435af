//! Action executor
//!
//! Applies [`Action`]s to a working copy of a [`StateSnapshot`]. The working
//! copy is taken by value and handed back on success; on failure it is
//! dropped, so a half-applied action is never observable.
//!
//! # Move rules
//! - source must be tracked, destination must not be
//! - module to module relocates everything under the module
//! - resource to resource keeps instance keys when the source has no key
//! - module to resource, resource to module, a change of resource type or
//!   mode, and moving an address into itself are invalid

use crate::action::Action;
use crate::error::ActionError;
use crate::wildcard::WildcardMove;
use statemig_state::{ResourceAddress, ResourceRecord, StateSnapshot};
use std::collections::BTreeSet;

/// Registry prefix assumed when no tracked resource shows the provider
const DEFAULT_PROVIDER_REGISTRY: &str = "registry.terraform.io/hashicorp";

/// Stateless executor for state-editing actions
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionExecutor;

impl ActionExecutor {
    /// Create new executor
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Apply one action
    ///
    /// # Errors
    /// - [`ActionError::AddressNotFound`] if the action's source is not tracked
    /// - [`ActionError::AddressAlreadyExists`] if a destination is tracked
    /// - [`ActionError::InvalidTransition`] for illegal edits
    pub fn apply(
        &self,
        mut state: StateSnapshot,
        action: &Action,
    ) -> Result<StateSnapshot, ActionError> {
        let affected = match action {
            Action::Move {
                source,
                destination,
            } => move_address(&mut state, action, source, destination)?,
            Action::Import {
                address,
                external_id,
            } => import(&mut state, action, address, external_id)?,
            Action::Remove { address } | Action::RemoveFromState { address } => {
                remove(&mut state, action, address)?
            }
            Action::MoveWildcard {
                source_pattern,
                destination_template,
            } => move_wildcard(&mut state, action, source_pattern, destination_template)?,
            Action::ReplaceProvider { from, to } => replace_provider(&mut state, from, to),
        };
        tracing::debug!(action = %action, affected, "action applied");
        Ok(state)
    }

    /// Apply actions in order, stopping at the first failure
    ///
    /// # Errors
    /// Returns the index of the failing action with its error
    pub fn replay(
        &self,
        state: StateSnapshot,
        actions: &[Action],
    ) -> Result<StateSnapshot, (usize, ActionError)> {
        actions
            .iter()
            .enumerate()
            .try_fold(state, |state, (i, action)| {
                self.apply(state, action).map_err(|e| {
                    tracing::warn!(step = i + 1, action = %action, "action failed: {e}");
                    (i, e)
                })
            })
    }
}

fn move_address(
    state: &mut StateSnapshot,
    action: &Action,
    source: &ResourceAddress,
    destination: &ResourceAddress,
) -> Result<usize, ActionError> {
    if source.is_module() != destination.is_module() {
        return Err(ActionError::invalid(
            action,
            "cannot move between a module and a resource",
        ));
    }
    if source.overlaps(destination) {
        return Err(ActionError::invalid(
            action,
            "source and destination overlap",
        ));
    }
    if let (Some(from), Some(to)) = (source.resource(), destination.resource()) {
        if from.mode != to.mode || from.type_name != to.type_name {
            return Err(ActionError::invalid(
                action,
                format!(
                    "cannot change resource type from {} to {}",
                    from.type_name, to.type_name
                ),
            ));
        }
    }

    let matched = state.matching(source);
    if matched.is_empty() {
        return Err(ActionError::not_found(action, source));
    }
    if state.contains(destination) {
        return Err(ActionError::already_exists(action, destination));
    }

    let mut moves = Vec::with_capacity(matched.len());
    for from in matched {
        let to = relocate(action, source, destination, &from)?;
        moves.push((from, to));
    }
    if let Some((_, to)) = moves.iter().find(|(_, to)| state.get(to).is_some()) {
        return Err(ActionError::already_exists(action, to));
    }
    let mut targets = BTreeSet::new();
    if let Some((_, to)) = moves.iter().find(|(_, to)| !targets.insert(to)) {
        return Err(ActionError::invalid(
            action,
            format!("more than one instance would move to {to}"),
        ));
    }

    let count = moves.len();
    for (from, to) in moves {
        if let Some(record) = state.remove(&from) {
            state.insert(to, record);
        }
    }
    Ok(count)
}

/// Destination address of one matched instance
fn relocate(
    action: &Action,
    source: &ResourceAddress,
    destination: &ResourceAddress,
    instance: &ResourceAddress,
) -> Result<ResourceAddress, ActionError> {
    if source.is_module() {
        let depth = source.module_path().len();
        let mut module = destination.module_path().to_vec();
        let source_key = source.module_path().last().and_then(|step| step.key.as_ref());
        let instance_key = instance.module_path()[depth - 1].key.clone();
        if source_key.is_none() && instance_key.is_some() {
            match module.last_mut() {
                Some(last) if last.key.is_none() => last.key = instance_key,
                _ => {
                    return Err(ActionError::invalid(
                        action,
                        format!(
                            "{instance} is in a keyed module instance; move it to a module address without a key"
                        ),
                    ))
                }
            }
        }
        module.extend_from_slice(&instance.module_path()[depth..]);
        return Ok(instance.with_module(module));
    }

    let source_key = source.resource().and_then(|r| r.key.as_ref());
    let destination_key = destination.resource().and_then(|r| r.key.as_ref());
    let instance_key = instance.resource().and_then(|r| r.key.clone());

    match (source_key, destination_key, instance_key) {
        (Some(_), _, _) | (None, Some(_), None) => Ok(destination.clone()),
        (None, None, key) => Ok(destination.with_key(key)),
        (None, Some(_), Some(_)) => Err(ActionError::invalid(
            action,
            format!("{instance} has an instance key; move it to a resource address without one"),
        )),
    }
}

fn import(
    state: &mut StateSnapshot,
    action: &Action,
    address: &ResourceAddress,
    external_id: &str,
) -> Result<usize, ActionError> {
    let Some(resource) = address.resource() else {
        return Err(ActionError::invalid(action, "cannot import into a module address"));
    };
    if address.is_data() {
        return Err(ActionError::invalid(action, "data sources cannot be imported"));
    }
    if state.contains(address) {
        return Err(ActionError::already_exists(action, address));
    }

    let provider = existing_provider(state, address).unwrap_or_else(|| {
        let provider_name = resource
            .type_name
            .split_once('_')
            .map_or(resource.type_name.as_str(), |(prefix, _)| prefix);
        format!("provider[\"{DEFAULT_PROVIDER_REGISTRY}/{provider_name}\"]")
    });
    state.insert(address.clone(), ResourceRecord::imported(provider, external_id));
    Ok(1)
}

/// Provider already used for `address`: its own block first, then any
/// resource of the same type
fn existing_provider(state: &StateSnapshot, address: &ResourceAddress) -> Option<String> {
    let resource = address.resource()?;
    let block = address.with_key(None);
    let same_type = |candidate: &ResourceAddress| {
        candidate
            .resource()
            .is_some_and(|r| r.mode == resource.mode && r.type_name == resource.type_name)
    };
    state
        .resources()
        .iter()
        .find(|(candidate, _)| block.contains(candidate))
        .or_else(|| state.resources().iter().find(|(candidate, _)| same_type(candidate)))
        .map(|(_, record)| record.provider.clone())
}

fn remove(
    state: &mut StateSnapshot,
    action: &Action,
    address: &ResourceAddress,
) -> Result<usize, ActionError> {
    let matched = state.matching(address);
    if matched.is_empty() {
        return Err(ActionError::not_found(action, address));
    }
    for instance in &matched {
        state.remove(instance);
    }
    Ok(matched.len())
}

fn move_wildcard(
    state: &mut StateSnapshot,
    action: &Action,
    pattern: &str,
    template: &str,
) -> Result<usize, ActionError> {
    let wildcard = WildcardMove::compile(pattern, template)
        .map_err(|reason| ActionError::invalid(action, reason))?;

    let mut moves = Vec::new();
    for instance in state.resources().keys() {
        let Some(target) = wildcard.expand(&instance.to_string()) else {
            continue;
        };
        let destination: ResourceAddress = target.parse().map_err(|e| {
            ActionError::invalid(action, format!("{instance} expands to {target}: {e}"))
        })?;
        moves.push(Action::Move {
            source: instance.clone(),
            destination,
        });
    }
    if moves.is_empty() {
        return Err(ActionError::not_found(action, pattern));
    }

    for step in &moves {
        if let Action::Move {
            source,
            destination,
        } = step
        {
            move_address(state, action, source, destination)?;
        }
    }
    Ok(moves.len())
}

/// Canonical `provider["..."]` form of a provider reference
fn canonical_provider(provider: &str) -> String {
    if provider.starts_with("provider[") {
        provider.to_string()
    } else {
        format!("provider[\"{provider}\"]")
    }
}

fn replace_provider(state: &mut StateSnapshot, from: &str, to: &str) -> usize {
    let from = canonical_provider(from);
    let to = canonical_provider(to);
    let mut count = 0;
    for (_, record) in state.records_mut() {
        if record.provider == from {
            record.provider.clone_from(&to);
            count += 1;
        }
    }
    if count == 0 {
        tracing::info!(from = %from, "no records use this provider; nothing replaced");
    }
    count
}
