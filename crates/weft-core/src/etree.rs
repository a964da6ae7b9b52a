//! Preorder sequential entity records, two generations at a time.
//!
//! Records follow the preorder sequential representation of a tree (Knuth,
//! 2.3.3): each record carries the size of its subtree ("span", inclusive of
//! itself), which delimits children without explicit close markers.

use crate::entity::{Counter, Entity, ENTITY_LIMIT};
use crate::intent::IntentHandlers;

/// One entity that appeared in a generation.
#[derive(Clone, Default)]
pub struct EntityRecord {
    pub entity: Entity,
    pub span: usize,
    pub handlers: Option<Box<IntentHandlers>>,
}

/// A bi-generational entity index. Appends go to the current generation,
/// reads against the previous one; each turn of the crank ages the pair.
#[derive(Default)]
pub struct EntityTree {
    current: Vec<EntityRecord>,
    previous: Vec<EntityRecord>,
}

impl EntityTree {
    pub fn new() -> EntityTree {
        EntityTree::default()
    }

    /// Starts recording a new generation. [`EntityTree::ancestors_of`] must
    /// not be consulted for entities of the generation just discarded.
    pub fn age_generation(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
        // dropping the records releases the captured handlers
        self.current.clear();
    }

    /// Appends an open-scoped record for `entity` and returns its index.
    /// [`EntityTree::close_scope`] must be called once all descendants have
    /// been appended.
    pub fn add(&mut self, entity: Entity) -> usize {
        assert!(
            entity < ENTITY_LIMIT,
            "cannot index more than {ENTITY_LIMIT} entities in one generation"
        );
        self.current.push(EntityRecord {
            entity,
            span: 0,
            handlers: None,
        });
        self.current.len() - 1
    }

    /// Finalizes the subtree boundary of the record opened at `index`.
    pub fn close_scope(&mut self, index: usize) {
        debug_assert_eq!(self.current[index].span, 0, "scope closed twice");
        self.current[index].span = self.current.len() - index;
    }

    /// Associates a handler set with the most recently appended record.
    pub fn attach_handlers(&mut self, handlers: IntentHandlers) {
        let last = self
            .current
            .last_mut()
            .expect("no open record to attach handlers to");
        last.handlers = Some(Box::new(handlers));
    }

    /// Index of `entity` in the previous generation.
    pub fn locate(&self, entity: Entity) -> Option<usize> {
        self.previous.iter().position(|r| r.entity == entity)
    }

    /// The contiguous previous-generation records forming the subtree rooted
    /// at `entity`, itself included. Empty if the entity is unknown.
    pub fn subtree(&self, entity: Entity) -> &[EntityRecord] {
        match self.locate(entity) {
            Some(i) => &self.previous[i..i + self.previous[i].span],
            None => &[],
        }
    }

    /// Every previous-generation record whose span encloses `entity`,
    /// innermost first; the entity's own record leads the chain.
    ///
    /// Panics if the entity is not part of the previous generation: the
    /// caller handed over a stale or foreign entity, and the view and the
    /// model are out of sync.
    pub fn ancestors_of(&self, entity: Entity) -> Vec<EntityRecord> {
        let i = self.locate(entity).unwrap_or_else(|| {
            panic!(
                "entity {entity} does not exist in the previous generation; \
                 the view and the model are out of sync"
            )
        });

        let mut chain = Vec::new();
        for j in (0..=i).rev() {
            if j + self.previous[j].span > i {
                chain.push(self.previous[j].clone());
            }
        }
        chain
    }

    /// Carries the recorded subtree of `from` over from the previous
    /// generation, renaming every copied record to keep the new generation
    /// collision-free: the topmost copy becomes `to` (the caller may have
    /// captured that identity), every other copy gets a fresh mint.
    /// `on_rename` fires once per record whose identity actually changed.
    ///
    /// A `from` unknown to the previous generation is a benign no-op:
    /// duplicate or late-arriving reuse requests resolve to nothing rather
    /// than an error.
    pub fn reuse(
        &mut self,
        from: Entity,
        to: Entity,
        counter: &Counter,
        mut on_rename: impl FnMut(Entity, Entity),
    ) {
        let Some(i) = self.locate(from) else {
            log::debug!("reuse of entity {from} absent from the previous generation; ignoring");
            return;
        };
        let span = self.previous[i].span;

        let start = self.current.len();
        let (current, previous) = (&mut self.current, &self.previous);
        current.extend_from_slice(&previous[i..i + span]);

        for (k, record) in current[start..].iter_mut().enumerate() {
            let fresh = if k == 0 { to } else { counter.mint() };
            if fresh != record.entity {
                on_rename(record.entity, fresh);
            }
            record.entity = fresh;
        }
    }

    /// Records of the generation being built. Debug aid.
    pub fn current(&self) -> &[EntityRecord] {
        &self.current
    }

    /// Records of the last completed generation. Debug aid.
    pub fn previous(&self) -> &[EntityRecord] {
        &self.previous
    }
}
