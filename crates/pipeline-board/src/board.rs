//! Immutable board value
//!
//! A [`Board`] partitions prospects into the nine stage buckets. Boards are
//! values: every change produces a new board through [`Board::with_bucket`]
//! or [`Board::with_buckets`], so earlier snapshots stay valid for rollback
//! and structural comparison. Buckets are persistent vectors, which keeps
//! those copies cheap.
//!
//! Bucket order is UI-only. It is never sent to the persistence service and
//! [`Board::build`] recreates it from input order on every reload.

use crate::stage::{classify, StageKey, STAGE_COUNT};
use crate::types::{Prospect, ProspectId};
use serde::Serialize;
use std::sync::Arc;

/// Ordered prospects assigned to one stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket {
    items: im::Vector<Arc<Prospect>>,
}

impl Bucket {
    /// Create empty bucket
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of prospects
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Prospect at `index`
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Prospect> {
        self.items.get(index).map(AsRef::as_ref)
    }

    /// Iterate in bucket order
    pub fn iter(&self) -> impl Iterator<Item = &Prospect> + '_ {
        self.items.iter().map(AsRef::as_ref)
    }

    /// Prospect ids in bucket order
    #[must_use]
    pub fn ids(&self) -> Vec<ProspectId> {
        self.iter().map(|p| p.id.clone()).collect()
    }

    /// Index of a prospect in this bucket
    #[must_use]
    pub fn position(&self, id: &ProspectId) -> Option<usize> {
        self.iter().position(|p| &p.id == id)
    }

    /// Copy without the prospect at `index`, plus the removed prospect.
    ///
    /// Returns `None` if `index` is out of range.
    #[must_use]
    pub fn removed(&self, index: usize) -> Option<(Self, Arc<Prospect>)> {
        if index >= self.items.len() {
            return None;
        }
        let mut items = self.items.clone();
        let prospect = items.remove(index);
        Some((Self { items }, prospect))
    }

    /// Copy with `prospect` inserted before `index`.
    ///
    /// Returns `None` if `index` is greater than the length.
    #[must_use]
    pub fn inserted(&self, index: usize, prospect: Arc<Prospect>) -> Option<Self> {
        if index > self.items.len() {
            return None;
        }
        let mut items = self.items.clone();
        items.insert(index, prospect);
        Some(Self { items })
    }
}

impl FromIterator<Prospect> for Bucket {
    fn from_iter<I: IntoIterator<Item = Prospect>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(Arc::new).collect(),
        }
    }
}

/// Complete partition of prospects into the nine stage buckets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Board {
    buckets: [Bucket; STAGE_COUNT],
}

impl Board {
    /// Board with every bucket empty
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Partition prospects by their canonical stage.
    ///
    /// Each prospect is appended to its stage's bucket in input order, so
    /// relative order within a bucket matches the input.
    #[must_use]
    pub fn build<I>(prospects: I) -> Self
    where
        I: IntoIterator<Item = Prospect>,
    {
        let mut buckets: [im::Vector<Arc<Prospect>>; STAGE_COUNT] = Default::default();
        let mut fallbacks = 0usize;

        for prospect in prospects {
            let classification = classify(&prospect.status);
            if classification.fallback {
                fallbacks += 1;
                tracing::debug!(
                    prospect = %prospect.id,
                    status = %prospect.status,
                    "Unrecognized stage label, placing in new-lead"
                );
            }
            buckets[classification.key.index()].push_back(Arc::new(prospect));
        }

        if fallbacks > 0 {
            tracing::debug!(fallbacks, "Classification fallbacks during build");
        }

        Self {
            buckets: buckets.map(|items| Bucket { items }),
        }
    }

    /// Bucket for a stage
    #[inline]
    #[must_use]
    pub fn bucket(&self, key: StageKey) -> &Bucket {
        &self.buckets[key.index()]
    }

    /// New board with one bucket replaced
    #[must_use]
    pub fn with_bucket(&self, key: StageKey, bucket: Bucket) -> Self {
        let mut next = self.clone();
        next.buckets[key.index()] = bucket;
        next
    }

    /// New board with several buckets replaced in one step.
    ///
    /// A later entry for the same stage wins.
    #[must_use]
    pub fn with_buckets<I>(&self, updates: I) -> Self
    where
        I: IntoIterator<Item = (StageKey, Bucket)>,
    {
        let mut next = self.clone();
        for (key, bucket) in updates {
            next.buckets[key.index()] = bucket;
        }
        next
    }

    /// Iterate stages and buckets in board order
    pub fn iter(&self) -> impl Iterator<Item = (StageKey, &Bucket)> + '_ {
        StageKey::ALL.into_iter().zip(self.buckets.iter())
    }

    /// Total prospects across all buckets
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    /// Check if every bucket is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Bucket::is_empty)
    }

    /// Stage and index of a prospect
    #[must_use]
    pub fn position_of(&self, id: &ProspectId) -> Option<(StageKey, usize)> {
        self.iter()
            .find_map(|(key, bucket)| bucket.position(id).map(|index| (key, index)))
    }

    /// Per-stage counts
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            total: self.len(),
            counts: std::array::from_fn(|i| self.buckets[i].len()),
        }
    }

    /// Most recently created prospects, newest first.
    ///
    /// Prospects without a creation time sort after all dated ones; ties keep
    /// board order.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<&Prospect> {
        let mut all: Vec<&Prospect> = self.buckets.iter().flat_map(Bucket::iter).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        all
    }
}

/// Pipeline summary counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Prospects on the board
    pub total: usize,
    /// Count per stage, in board order
    pub counts: [usize; STAGE_COUNT],
}

impl PipelineStats {
    /// Count for one stage
    #[inline]
    #[must_use]
    pub fn count(&self, key: StageKey) -> usize {
        self.counts[key.index()]
    }
}
