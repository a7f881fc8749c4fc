// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// Repository subscriptions and the store that persists them.
///
/// Subscriptions live in the `subscriptions` section of the configuration
/// file. File-backed stores re-read the document on every call so a running
/// scheduler picks up edits made through the CLI without restarting.
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::{load_config, save_config},
    error::Error,
    event::EventKind,
};

/// A watched repository together with the event kinds of interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct Subscription
{
    pub owner:         String,
    pub repo:          String,
    #[serde(rename = "watch_events", default)]
    pub watched_kinds: BTreeSet<EventKind,>,
}

impl Subscription
{
    /// Creates a subscription watching `kinds`.
    pub fn new(
        owner: impl Into<String,>,
        repo: impl Into<String,>,
        kinds: impl IntoIterator<Item = EventKind,>,
    ) -> Self
    {
        Self {
            owner: owner.into(), repo: repo.into(), watched_kinds: kinds.into_iter().collect(),
        }
    }

    /// Returns `owner/repo`.
    pub fn full_name(&self,) -> String
    {
        format!("{}/{}", self.owner, self.repo)
    }

    /// `true` when `kind` is watched.
    pub fn watches(&self, kind: EventKind,) -> bool
    {
        self.watched_kinds.contains(&kind,)
    }

    /// Validates owner and repository identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when either identifier is blank or
    /// contains whitespace or a path separator.
    pub fn validate(&self,) -> Result<(), Error,>
    {
        validate_identifier(&self.owner, "owner",)?;
        validate_identifier(&self.repo, "repo",)
    }

    fn matches(&self, owner: &str, repo: &str,) -> bool
    {
        self.owner.eq_ignore_ascii_case(owner.trim(),) && self.repo.eq_ignore_ascii_case(repo.trim(),)
    }
}

fn validate_identifier(input: &str, field: &str,) -> Result<(), Error,>
{
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{field} cannot be empty"),),);
    }
    if trimmed.chars().any(char::is_whitespace,) {
        return Err(Error::validation(format!("{field} cannot contain whitespace"),),);
    }
    if trimmed.contains('/',) {
        return Err(Error::validation(format!("{field} cannot contain '/'"),),);
    }
    Ok((),)
}

enum Backing
{
    File(PathBuf,),
    Memory(Mutex<Vec<Subscription,>,>,),
}

/// Subscription list with add/remove/update operations.
pub struct SubscriptionStore
{
    backing: Backing,
}

impl SubscriptionStore
{
    /// Store persisted in the configuration file at `path`.
    pub fn file(path: impl Into<PathBuf,>,) -> Self
    {
        Self {
            backing: Backing::File(path.into(),),
        }
    }

    /// Store kept in memory only.
    pub fn in_memory(subscriptions: Vec<Subscription,>,) -> Self
    {
        Self {
            backing: Backing::Memory(Mutex::new(subscriptions,),),
        }
    }

    /// Path of the backing configuration file, if any.
    pub fn path(&self,) -> Option<&Path,>
    {
        match &self.backing {
            Backing::File(path,) => Some(path,),
            Backing::Memory(_,) => None,
        }
    }

    /// Returns all subscriptions in insertion order.
    ///
    /// # Errors
    ///
    /// Propagates configuration loading errors for file-backed stores.
    pub fn list(&self,) -> Result<Vec<Subscription,>, Error,>
    {
        match &self.backing {
            Backing::File(path,) => Ok(load_config(path,)?.subscriptions,),
            Backing::Memory(subscriptions,) => Ok(lock(subscriptions,).clone(),),
        }
    }

    /// Adds a subscription. Returns `false` when the repository is already
    /// subscribed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for invalid identifiers or an empty kind
    /// set, and propagates persistence errors.
    pub fn add(
        &self,
        owner: &str,
        repo: &str,
        kinds: impl IntoIterator<Item = EventKind,>,
    ) -> Result<bool, Error,>
    {
        let subscription = Subscription::new(owner.trim(), repo.trim(), kinds,);
        subscription.validate()?;
        if subscription.watched_kinds.is_empty() {
            return Err(Error::validation("at least one event kind must be watched",),);
        }

        self.modify(|subscriptions| {
            if subscriptions.iter().any(|existing| existing.matches(owner, repo,),) {
                debug!("Skipping duplicate subscription {}", subscription.full_name());
                return false;
            }
            info!(
                "Subscribed to {} ({})",
                subscription.full_name(),
                describe_kinds(&subscription.watched_kinds)
            );
            subscriptions.push(subscription,);
            true
        },)
    }

    /// Removes a subscription. Returns `false` when it does not exist.
    ///
    /// # Errors
    ///
    /// Propagates persistence errors.
    pub fn remove(&self, owner: &str, repo: &str,) -> Result<bool, Error,>
    {
        self.modify(|subscriptions| {
            let before = subscriptions.len();
            subscriptions.retain(|existing| !existing.matches(owner, repo,),);
            let removed = subscriptions.len() != before;
            if removed {
                info!("Unsubscribed from {}/{}", owner.trim(), repo.trim());
            }
            removed
        },)
    }

    /// Replaces the watched kinds of an existing subscription. Returns
    /// `false` when the subscription does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty kind set and propagates
    /// persistence errors.
    pub fn update_kinds(
        &self,
        owner: &str,
        repo: &str,
        kinds: impl IntoIterator<Item = EventKind,>,
    ) -> Result<bool, Error,>
    {
        let kinds: BTreeSet<EventKind,> = kinds.into_iter().collect();
        if kinds.is_empty() {
            return Err(Error::validation("at least one event kind must be watched",),);
        }

        self.modify(|subscriptions| {
            match subscriptions.iter_mut().find(|existing| existing.matches(owner, repo,),) {
                Some(existing,) => {
                    info!("Updated {} to watch {}", existing.full_name(), describe_kinds(&kinds));
                    existing.watched_kinds = kinds;
                    true
                }
                None => false,
            }
        },)
    }

    /// Applies `change` and persists the list when it reports a modification.
    fn modify<F,>(&self, change: F,) -> Result<bool, Error,>
    where
        F: FnOnce(&mut Vec<Subscription,>,) -> bool,
    {
        match &self.backing {
            Backing::File(path,) => {
                let mut config = load_config(path,)?;
                let changed = change(&mut config.subscriptions,);
                if changed {
                    save_config(path, &config,)?;
                }
                Ok(changed,)
            }
            Backing::Memory(subscriptions,) => Ok(change(&mut lock(subscriptions,),),),
        }
    }
}

fn lock(subscriptions: &Mutex<Vec<Subscription,>,>,) -> std::sync::MutexGuard<'_, Vec<Subscription,>,>
{
    subscriptions.lock().unwrap_or_else(std::sync::PoisonError::into_inner,)
}

/// Comma separated wire names, e.g. `commits, issues`.
pub fn describe_kinds(kinds: &BTreeSet<EventKind,>,) -> String
{
    kinds.iter().map(|kind| kind.wire_name(),).collect::<Vec<_,>>().join(", ",)
}
