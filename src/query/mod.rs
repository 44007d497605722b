//! Structural queries over the archetype storage.
//!
//! A [`Query`] is an (includes, excludes) predicate over component ids. It
//! resolves to the set of archetypes containing every include and no
//! exclude, using the storage's inverted index: the first include seeds the
//! candidate set, each further include intersects it, and each exclude
//! subtracts its archetype set. Entities never enter the picture until
//! iteration; resolution cost scales with archetype counts, not entity
//! counts.
//!
//! The cursor protocol is `start` then repeated `next`. `start` freezes the
//! candidate archetype list; archetypes created afterwards (for example by
//! a command buffer applied between iterations) are picked up by the next
//! `start`, not by an in-flight cursor. Within one pass every matching
//! entity is yielded exactly once, in no particular order (swap-remove
//! reorders rows).
//!
//! Structural edits while a cursor is live must be recorded into a
//! [`CommandBuffer`](crate::command::CommandBuffer); mutating component
//! values between `next` calls is fine.

use std::collections::HashSet;

use crate::archetype;
use crate::component::{self, Component, Spec};
use crate::entity::Entity;
use crate::storage::ArchetypeStorage;

/// A query over entities by component set: includes and excludes, resolved
/// to matching archetypes, iterated entity by entity.
///
/// ```ignore
/// let mut query = Query::new().with::<Position>().without::<Velocity>();
/// query.start(&storage);
/// while let Some(entity) = query.next(&storage) {
///     // read or mutate component values through the storage
/// }
/// ```
#[derive(Debug, Default)]
pub struct Query {
    /// Components an archetype must contain.
    includes: Spec,

    /// Components an archetype must not contain.
    excludes: Spec,

    /// The storage's archetype count when `matches` was last computed.
    /// Archetypes are never destroyed, so an unchanged count means the
    /// resolution is still valid.
    archetypes_seen: usize,

    /// The candidate archetypes, frozen at resolution time.
    matches: Vec<archetype::Id>,

    /// Cursor position within `matches`.
    cursor_match: usize,

    /// Cursor position within the current archetype's rows.
    cursor_row: usize,
}

impl Query {
    /// Create a query matching every archetype. Narrow it with
    /// [`Query::with`] and [`Query::without`].
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the component `C`.
    pub fn with<C: Component>(mut self) -> Self {
        self.includes = self.includes.with(component::Id::of::<C>());
        self.invalidate();
        self
    }

    /// Reject archetypes containing the component `C`.
    pub fn without<C: Component>(mut self) -> Self {
        self.excludes = self.excludes.with(component::Id::of::<C>());
        self.invalidate();
        self
    }

    /// Begin (or restart) iteration.
    ///
    /// Captures the candidate archetype set. Resolution is memoised on the
    /// storage's archetype count: if no archetype was created since the
    /// last resolution the cached candidates are reused, otherwise they are
    /// recomputed.
    pub fn start(&mut self, storage: &ArchetypeStorage) {
        if storage.archetype_count() != self.archetypes_seen {
            self.resolve(storage);
        }
        self.cursor_match = 0;
        self.cursor_row = 0;
    }

    /// Yield the next matching entity, or `None` when the pass is
    /// exhausted.
    ///
    /// The candidate set is the one frozen by the last [`Query::start`].
    pub fn next(&mut self, storage: &ArchetypeStorage) -> Option<Entity> {
        while self.cursor_match < self.matches.len() {
            let id = self.matches[self.cursor_match];
            let archetype = storage
                .archetype_by_id(id)
                .expect("candidate archetype disappeared");
            if self.cursor_row < archetype.len() {
                let entity = archetype.entities()[self.cursor_row];
                self.cursor_row += 1;
                return Some(entity);
            }
            self.cursor_match += 1;
            self.cursor_row = 0;
        }
        None
    }

    /// Recompute the candidate archetypes through the inverted index.
    fn resolve(&mut self, storage: &ArchetypeStorage) {
        self.archetypes_seen = storage.archetype_count();
        self.matches.clear();

        let index = storage.index();
        if self.includes.is_empty() {
            // No includes: every indexed archetype is a candidate.
            let mut all: HashSet<archetype::Id> = HashSet::new();
            for set in index.archetype_sets() {
                all.extend(set.keys().copied());
            }
            self.matches.extend(all);
        } else {
            // Seed from the first include, intersect with the rest.
            let ids = self.includes.ids();
            let Some(seed) = index.archetypes_with(ids[0]) else {
                return;
            };
            let mut candidates: Vec<archetype::Id> = seed.keys().copied().collect();
            for id in &ids[1..] {
                match index.archetypes_with(*id) {
                    Some(set) => candidates.retain(|candidate| set.contains_key(candidate)),
                    None => candidates.clear(),
                }
                if candidates.is_empty() {
                    break;
                }
            }
            self.matches = candidates;
        }

        // Subtract each exclude's archetype set.
        for id in self.excludes.ids() {
            if self.matches.is_empty() {
                break;
            }
            if let Some(set) = index.archetypes_with(*id) {
                self.matches.retain(|candidate| !set.contains_key(candidate));
            }
        }
    }

    /// Drop any memoised resolution.
    fn invalidate(&mut self) {
        self.archetypes_seen = 0;
        self.matches.clear();
        self.cursor_match = 0;
        self.cursor_row = 0;
    }
}
