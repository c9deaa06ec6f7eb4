//! Observed-Remove Set (OR-Set / add-wins set).
//!
//! Each add creates a unique tag; an element is present iff it has at least
//! one tag that hasn't been removed. Concurrent add and remove of the same
//! element results in the element staying present (add-wins).

use crate::Tag;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// An Observed-Remove Set over elements of type `T`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrSet<T>
where
    T: Eq + std::hash::Hash + Clone,
{
    elements: HashMap<T, HashSet<Tag>>,
    tombstones: HashSet<Tag>,
}

impl<T> Default for OrSet<T>
where
    T: Eq + std::hash::Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrSet<T>
where
    T: Eq + std::hash::Hash + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            elements: HashMap::new(),
            tombstones: HashSet::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, element: &T) -> bool {
        self.elements
            .get(element)
            .map(|tags| !tags.is_empty())
            .unwrap_or(false)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.values().filter(|tags| !tags.is_empty()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements
            .iter()
            .filter(|(_, tags)| !tags.is_empty())
            .map(|(elem, _)| elem)
    }

    /// Adds an element, returning the freshly minted tag for it.
    pub fn add(&mut self, element: T) -> Tag {
        let tag = Tag::new();
        self.add_with_tag(element, tag);
        tag
    }

    /// Adds an element with an explicit tag (used when replaying a remote op).
    pub fn add_with_tag(&mut self, element: T, tag: Tag) {
        if !self.tombstones.contains(&tag) {
            self.elements.entry(element).or_default().insert(tag);
        }
    }

    /// Removes an element, tombstoning every tag currently observed for it.
    /// Returns the tombstoned tags.
    pub fn remove(&mut self, element: &T) -> Vec<Tag> {
        let removed: Vec<Tag> = self
            .elements
            .get_mut(element)
            .map(|tags| tags.drain().collect())
            .unwrap_or_default();
        for tag in &removed {
            self.tombstones.insert(*tag);
        }
        removed
    }

    /// Builds a delta carrying only tombstones (no element entries), for
    /// shipping a remove without re-sending the whole set. Merging this into
    /// any replica adds `tags` to its tombstone set, which then filters
    /// those tags out of its own `elements` map on the same merge pass.
    #[must_use]
    pub fn delta_tombstones(tags: impl IntoIterator<Item = crate::Tag>) -> Self {
        let mut delta = Self::new();
        delta.tombstones.extend(tags);
        delta
    }

    /// Merges another OR-Set into this one. Commutative, associative, idempotent.
    pub fn merge(&mut self, other: &Self) {
        self.tombstones.extend(&other.tombstones);

        for (element, other_tags) in &other.elements {
            let entry = self.elements.entry(element.clone()).or_default();
            for tag in other_tags {
                if !self.tombstones.contains(tag) {
                    entry.insert(*tag);
                }
            }
        }

        for tags in self.elements.values_mut() {
            tags.retain(|tag| !self.tombstones.contains(tag));
        }
    }

    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}
