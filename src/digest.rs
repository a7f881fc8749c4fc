// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// Per-repository activity digests and the filter that drops idle
/// repositories before rendering.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::{EventKind, NormalizedEvent};

/// Normalized activity of one repository over one check window.
///
/// A digest is empty when every event sequence is empty. Digests are built
/// fresh for every pipeline run and are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize,)]
pub struct RepositoryDigest
{
    pub owner:      String,
    pub repo:       String,
    /// Instant at which the activity was fetched.
    #[serde(rename = "update_time")]
    pub fetched_at: DateTime<Utc,>,
    /// Events per watched kind in API return order.
    pub events:     BTreeMap<EventKind, Vec<NormalizedEvent,>,>,
}

impl RepositoryDigest
{
    /// Creates a digest without any events.
    pub fn new(owner: impl Into<String,>, repo: impl Into<String,>, fetched_at: DateTime<Utc,>,)
    -> Self
    {
        Self {
            owner: owner.into(), repo: repo.into(), fetched_at, events: BTreeMap::new(),
        }
    }

    /// Returns `owner/repo`.
    pub fn full_name(&self,) -> String
    {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Events recorded for `kind`, empty when the kind was not watched.
    pub fn events_of(&self, kind: EventKind,) -> &[NormalizedEvent]
    {
        self.events.get(&kind,).map(Vec::as_slice,).unwrap_or_default()
    }

    /// Total number of events across all kinds.
    pub fn total_events(&self,) -> usize
    {
        self.events.values().map(Vec::len,).sum()
    }

    /// `true` when no kind holds any event.
    pub fn is_empty(&self,) -> bool
    {
        self.events.values().all(Vec::is_empty,)
    }
}

/// Keeps only digests with at least one event, preserving their order.
pub fn retain_active(digests: Vec<RepositoryDigest,>,) -> Vec<RepositoryDigest,>
{
    digests.into_iter().filter(|digest| !digest.is_empty(),).collect()
}
