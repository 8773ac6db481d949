#![forbid(unsafe_code)]

//! Child reconciliation: diff a parent's previous child chain against a
//! new description and produce the next chain.
//!
//! One algorithm, parameterized by a track-side-effects flag: disabled for
//! first mounts (nothing to delete, and the whole new subtree gets a
//! single placement at its root), enabled for updates (deletions and moves
//! must be emitted against the prior tree).
//!
//! The list path is a single-pass linear diff, not minimal edit distance:
//! a lockstep prefix walk while keys align positionally, exhaustion
//! handling, then a key-indexed map for the disordered remainder. Move
//! detection uses a "last placed index" high-water mark: a reused fiber
//! whose previous index falls below the greatest previous index already
//! seen has moved left and is flagged for relocation; otherwise it becomes
//! the new high-water mark. This O(n) heuristic can flag more moves than a
//! minimal-move solution would; that tradeoff is inherited deliberately.

use ahash::AHashMap;

use crate::element::{Element, ElementKind, Node};
use crate::fiber::{
    FiberArena, FiberId, FiberKind, FiberProps, create_work_in_progress, fiber_from_element,
    fiber_from_fragment, fiber_from_text,
};
use crate::flags::FiberFlags;
use crate::lanes::Lanes;

/// The new description for a parent's child position(s).
#[derive(Debug, Clone, Copy)]
pub(crate) enum ChildInput<'a> {
    One(&'a Node),
    Many(&'a [Node]),
    None,
}

impl<'a> ChildInput<'a> {
    /// Classify an element's child list into the reconciler's input shape.
    pub(crate) fn from_children(children: &'a [Node]) -> Self {
        match children {
            [] => Self::None,
            [single] => Self::One(single),
            many => Self::Many(many),
        }
    }
}

/// Lookup key for the disordered remainder: explicit key, else position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MapKey {
    Key(String),
    Index(usize),
}

pub(crate) struct ChildReconciler {
    track_side_effects: bool,
}

impl ChildReconciler {
    pub(crate) fn new(track_side_effects: bool) -> Self {
        Self {
            track_side_effects,
        }
    }

    /// Produce the next child chain for `return_fiber`, classifying each
    /// position as reuse, fresh create, or delete.
    pub(crate) fn reconcile(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        current_first: Option<FiberId>,
        input: ChildInput<'_>,
        lanes: Lanes,
    ) -> Option<FiberId> {
        // A key-less fragment at the top level is transparent: unwrap it
        // into its child sequence before matching.
        let input = match input {
            ChildInput::One(Node::Element(el))
                if matches!(el.kind, ElementKind::Fragment) && el.key.is_none() =>
            {
                ChildInput::Many(&el.props.children)
            }
            other => other,
        };

        match input {
            ChildInput::One(Node::Element(el)) => {
                let fiber =
                    self.reconcile_single_element(arena, return_fiber, current_first, el, lanes);
                Some(self.place_single_child(arena, fiber))
            }
            ChildInput::One(Node::Text(text)) => {
                let fiber =
                    self.reconcile_single_text(arena, return_fiber, current_first, text);
                Some(self.place_single_child(arena, fiber))
            }
            ChildInput::One(Node::List(list)) => {
                self.reconcile_array(arena, return_fiber, current_first, list, lanes)
            }
            ChildInput::One(Node::Empty) | ChildInput::None => {
                self.delete_remaining_children(arena, return_fiber, current_first);
                None
            }
            ChildInput::Many(list) => {
                self.reconcile_array(arena, return_fiber, current_first, list, lanes)
            }
        }
    }

    // ─── Single-child paths ──────────────────────────────────────────────

    fn reconcile_single_element(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        current_first: Option<FiberId>,
        element: &Element,
        lanes: Lanes,
    ) -> FiberId {
        let key = element.key.clone();
        let mut current = current_first;

        while let Some(cur_id) = current {
            let (cur_key, cur_ty, cur_sibling) = {
                let cur = arena.get(cur_id);
                (cur.key.clone(), cur.ty.clone(), cur.sibling)
            };
            if cur_key == key {
                let same = cur_ty
                    .as_ref()
                    .is_some_and(|ty| ty.same_type(&element.kind));
                if same {
                    // Single replacement: everything after the match goes.
                    self.delete_remaining_children(arena, return_fiber, cur_sibling);
                    let pending = pending_props_for(element);
                    let existing = self.use_fiber(arena, cur_id, pending);
                    arena.get_mut(existing).ret = Some(return_fiber);
                    return existing;
                }
                // Key match with type mismatch discards the entire
                // remaining old chain.
                self.delete_remaining_children(arena, return_fiber, Some(cur_id));
                break;
            }
            self.delete_child(arena, return_fiber, cur_id);
            current = cur_sibling;
        }

        let created = match &element.kind {
            ElementKind::Fragment => {
                fiber_from_fragment(arena, element.props.children.clone(), lanes, key)
            }
            _ => fiber_from_element(arena, element, lanes),
        };
        arena.get_mut(created).ret = Some(return_fiber);
        created
    }

    fn reconcile_single_text(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        current_first: Option<FiberId>,
        text: &str,
    ) -> FiberId {
        let mut current = current_first;
        while let Some(cur_id) = current {
            let (cur_kind, cur_sibling) = {
                let cur = arena.get(cur_id);
                (cur.kind, cur.sibling)
            };
            if cur_kind == FiberKind::HostText {
                self.delete_remaining_children(arena, return_fiber, cur_sibling);
                let existing =
                    self.use_fiber(arena, cur_id, FiberProps::Text(text.to_owned()));
                arena.get_mut(existing).ret = Some(return_fiber);
                return existing;
            }
            self.delete_child(arena, return_fiber, cur_id);
            current = cur_sibling;
        }

        let created = fiber_from_text(arena, text);
        arena.get_mut(created).ret = Some(return_fiber);
        created
    }

    // ─── List path ───────────────────────────────────────────────────────

    fn reconcile_array(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        current_first: Option<FiberId>,
        entries: &[Node],
        lanes: Lanes,
    ) -> Option<FiberId> {
        let mut first_new: Option<FiberId> = None;
        let mut prev_new: Option<FiberId> = None;
        let mut old_fiber = current_first;
        let mut last_placed_index = 0usize;
        let mut new_index = 0usize;

        // 1. Lockstep prefix: walk both sequences while keys keep aligning
        //    positionally.
        while let Some(old) = old_fiber {
            if new_index >= entries.len() {
                break;
            }
            let next_old = arena.get(old).sibling;
            let Some(new_fiber) =
                self.update_slot(arena, return_fiber, old, &entries[new_index], lanes)
            else {
                break;
            };
            if self.track_side_effects && arena.get(new_fiber).alternate.is_none() {
                // Key matched but the position was rebuilt from scratch.
                self.delete_child(arena, return_fiber, old);
            }
            last_placed_index =
                self.place_child(arena, new_fiber, last_placed_index, new_index);
            link_sibling(arena, &mut first_new, &mut prev_new, new_fiber);
            old_fiber = next_old;
            new_index += 1;
        }

        // 2. New sequence exhausted: everything left of the old chain goes.
        if new_index == entries.len() {
            self.delete_remaining_children(arena, return_fiber, old_fiber);
            return first_new;
        }

        // 3. Old sequence exhausted: the rest is fresh creation.
        if old_fiber.is_none() {
            while new_index < entries.len() {
                if let Some(created) =
                    self.create_child(arena, return_fiber, &entries[new_index], lanes)
                {
                    last_placed_index =
                        self.place_child(arena, created, last_placed_index, new_index);
                    link_sibling(arena, &mut first_new, &mut prev_new, created);
                }
                new_index += 1;
            }
            return first_new;
        }

        // 4. Disordered remainder: index the old entries and match by key.
        let mut existing = self.map_remaining_children(arena, old_fiber);
        while new_index < entries.len() {
            if let Some(new_fiber) = self.update_from_map(
                arena,
                return_fiber,
                &mut existing,
                new_index,
                &entries[new_index],
                lanes,
            ) {
                last_placed_index =
                    self.place_child(arena, new_fiber, last_placed_index, new_index);
                link_sibling(arena, &mut first_new, &mut prev_new, new_fiber);
            }
            new_index += 1;
        }

        // Unconsumed map entries have no new position.
        if self.track_side_effects {
            let leftovers: Vec<FiberId> = existing.into_values().collect();
            for fiber in leftovers {
                self.delete_child(arena, return_fiber, fiber);
            }
        }

        first_new
    }

    /// Match one new entry against the old fiber at the same position.
    /// `None` means the position no longer aligns and the caller falls to
    /// the map phase.
    fn update_slot(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        old: FiberId,
        new_child: &Node,
        lanes: Lanes,
    ) -> Option<FiberId> {
        let (old_key, old_kind, old_ty) = {
            let fiber = arena.get(old);
            (fiber.key.clone(), fiber.kind, fiber.ty.clone())
        };

        match new_child {
            Node::Text(text) => {
                if old_key.is_some() {
                    return None;
                }
                let fiber = if old_kind == FiberKind::HostText {
                    self.use_fiber(arena, old, FiberProps::Text(text.clone()))
                } else {
                    fiber_from_text(arena, text)
                };
                arena.get_mut(fiber).ret = Some(return_fiber);
                Some(fiber)
            }
            Node::Element(el) => {
                if el.key != old_key {
                    return None;
                }
                let same = old_ty.as_ref().is_some_and(|ty| ty.same_type(&el.kind));
                let fiber = if same {
                    self.use_fiber(arena, old, pending_props_for(el))
                } else {
                    match &el.kind {
                        ElementKind::Fragment => fiber_from_fragment(
                            arena,
                            el.props.children.clone(),
                            lanes,
                            el.key.clone(),
                        ),
                        _ => fiber_from_element(arena, el, lanes),
                    }
                };
                arena.get_mut(fiber).ret = Some(return_fiber);
                Some(fiber)
            }
            Node::List(list) => {
                if old_key.is_some() {
                    return None;
                }
                let fiber = if old_kind == FiberKind::Fragment {
                    self.use_fiber(arena, old, FiberProps::Children(list.clone()))
                } else {
                    fiber_from_fragment(arena, list.clone(), lanes, None)
                };
                arena.get_mut(fiber).ret = Some(return_fiber);
                Some(fiber)
            }
            Node::Empty => None,
        }
    }

    /// Match one new entry against the keyed remainder map.
    fn update_from_map(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        existing: &mut AHashMap<MapKey, FiberId>,
        index: usize,
        new_child: &Node,
        lanes: Lanes,
    ) -> Option<FiberId> {
        match new_child {
            Node::Text(text) => {
                let key = MapKey::Index(index);
                let matched = existing
                    .get(&key)
                    .copied()
                    .filter(|m| arena.get(*m).kind == FiberKind::HostText);
                let fiber = match matched {
                    Some(m) => {
                        existing.remove(&key);
                        self.use_fiber(arena, m, FiberProps::Text(text.clone()))
                    }
                    None => fiber_from_text(arena, text),
                };
                arena.get_mut(fiber).ret = Some(return_fiber);
                Some(fiber)
            }
            Node::Element(el) => {
                let key = el
                    .key
                    .clone()
                    .map(MapKey::Key)
                    .unwrap_or(MapKey::Index(index));
                let matched = existing.get(&key).copied().filter(|m| {
                    arena
                        .get(*m)
                        .ty
                        .as_ref()
                        .is_some_and(|ty| ty.same_type(&el.kind))
                });
                let fiber = match matched {
                    Some(m) => {
                        existing.remove(&key);
                        self.use_fiber(arena, m, pending_props_for(el))
                    }
                    None => match &el.kind {
                        ElementKind::Fragment => fiber_from_fragment(
                            arena,
                            el.props.children.clone(),
                            lanes,
                            el.key.clone(),
                        ),
                        _ => fiber_from_element(arena, el, lanes),
                    },
                };
                arena.get_mut(fiber).ret = Some(return_fiber);
                Some(fiber)
            }
            Node::List(list) => {
                let key = MapKey::Index(index);
                let matched = existing
                    .get(&key)
                    .copied()
                    .filter(|m| arena.get(*m).kind == FiberKind::Fragment);
                let fiber = match matched {
                    Some(m) => {
                        existing.remove(&key);
                        self.use_fiber(arena, m, FiberProps::Children(list.clone()))
                    }
                    None => fiber_from_fragment(arena, list.clone(), lanes, None),
                };
                arena.get_mut(fiber).ret = Some(return_fiber);
                Some(fiber)
            }
            Node::Empty => None,
        }
    }

    // ─── Bookkeeping ─────────────────────────────────────────────────────

    /// Clone a reusable fiber through its alternate slot and detach it
    /// from its old position.
    fn use_fiber(
        &self,
        arena: &mut FiberArena,
        fiber: FiberId,
        pending_props: FiberProps,
    ) -> FiberId {
        let clone = create_work_in_progress(arena, fiber, pending_props);
        let f = arena.get_mut(clone);
        f.index = 0;
        f.sibling = None;
        clone
    }

    fn create_child(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        new_child: &Node,
        lanes: Lanes,
    ) -> Option<FiberId> {
        let created = match new_child {
            Node::Text(text) => fiber_from_text(arena, text),
            Node::Element(el) => fiber_from_element(arena, el, lanes),
            Node::List(list) => fiber_from_fragment(arena, list.clone(), lanes, None),
            Node::Empty => return None,
        };
        arena.get_mut(created).ret = Some(return_fiber);
        Some(created)
    }

    /// Stamp the target index and decide whether a reused fiber physically
    /// moved. Returns the updated high-water mark.
    fn place_child(
        &self,
        arena: &mut FiberArena,
        new_fiber: FiberId,
        last_placed_index: usize,
        new_index: usize,
    ) -> usize {
        arena.get_mut(new_fiber).index = new_index;
        if !self.track_side_effects {
            return last_placed_index;
        }

        match arena.get(new_fiber).alternate {
            Some(current) => {
                let old_index = arena.get(current).index;
                if old_index < last_placed_index {
                    // Moved left relative to already-placed siblings.
                    arena.get_mut(new_fiber).flags |= FiberFlags::PLACEMENT;
                    last_placed_index
                } else {
                    old_index
                }
            }
            None => {
                arena.get_mut(new_fiber).flags |= FiberFlags::PLACEMENT;
                last_placed_index
            }
        }
    }

    fn place_single_child(&self, arena: &mut FiberArena, fiber: FiberId) -> FiberId {
        if self.track_side_effects && arena.get(fiber).alternate.is_none() {
            arena.get_mut(fiber).flags |= FiberFlags::PLACEMENT;
        }
        fiber
    }

    fn delete_child(&self, arena: &mut FiberArena, return_fiber: FiberId, child: FiberId) {
        if !self.track_side_effects {
            return;
        }
        let parent = arena.get_mut(return_fiber);
        parent.deletions.push(child);
        parent.flags |= FiberFlags::CHILD_DELETION;
    }

    fn delete_remaining_children(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        first: Option<FiberId>,
    ) {
        if !self.track_side_effects {
            return;
        }
        let mut child = first;
        while let Some(id) = child {
            self.delete_child(arena, return_fiber, id);
            child = arena.get(id).sibling;
        }
    }

    fn map_remaining_children(
        &self,
        arena: &FiberArena,
        first: Option<FiberId>,
    ) -> AHashMap<MapKey, FiberId> {
        let mut existing = AHashMap::new();
        let mut current = first;
        while let Some(id) = current {
            let fiber = arena.get(id);
            let key = fiber
                .key
                .clone()
                .map(MapKey::Key)
                .unwrap_or(MapKey::Index(fiber.index));
            existing.insert(key, id);
            current = fiber.sibling;
        }
        existing
    }
}

fn pending_props_for(element: &Element) -> FiberProps {
    match element.kind {
        ElementKind::Fragment => FiberProps::Children(element.props.children.clone()),
        _ => FiberProps::Element(element.props.clone()),
    }
}

fn link_sibling(
    arena: &mut FiberArena,
    first_new: &mut Option<FiberId>,
    prev_new: &mut Option<FiberId>,
    fiber: FiberId,
) {
    match prev_new {
        None => *first_new = Some(fiber),
        Some(prev) => arena.get_mut(*prev).sibling = Some(fiber),
    }
    *prev_new = Some(fiber);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::Fiber;

    fn keyed(tag: &str, key: &str) -> Node {
        Node::Element(Element::host(tag).with_key(key))
    }

    fn chain(arena: &FiberArena, first: Option<FiberId>) -> Vec<FiberId> {
        let mut out = Vec::new();
        let mut cur = first;
        while let Some(id) = cur {
            out.push(id);
            cur = arena.get(id).sibling;
        }
        out
    }

    fn keys(arena: &FiberArena, first: Option<FiberId>) -> Vec<String> {
        chain(arena, first)
            .iter()
            .map(|id| arena.get(*id).key.clone().unwrap_or_default())
            .collect()
    }

    /// Mount `entries` under a fresh parent, then return (parent, wip
    /// parent) ready for an update pass against the mounted chain.
    fn mounted(arena: &mut FiberArena, entries: &[Node]) -> (FiberId, Option<FiberId>) {
        let parent = arena.alloc(Fiber::new(FiberKind::Fragment, FiberProps::None, None));
        let first = ChildReconciler::new(false).reconcile(
            arena,
            parent,
            None,
            ChildInput::Many(entries),
            Lanes::SYNC,
        );
        arena.get_mut(parent).child = first;
        (parent, first)
    }

    fn update_pass(
        arena: &mut FiberArena,
        parent: FiberId,
        current_first: Option<FiberId>,
        entries: &[Node],
    ) -> (FiberId, Option<FiberId>) {
        let wip_parent = create_work_in_progress(arena, parent, FiberProps::None);
        let first = ChildReconciler::new(true).reconcile(
            arena,
            wip_parent,
            current_first,
            ChildInput::Many(entries),
            Lanes::SYNC,
        );
        arena.get_mut(wip_parent).child = first;
        (wip_parent, first)
    }

    #[test]
    fn mount_builds_ordered_chain_without_flags() {
        let mut arena = FiberArena::new();
        let entries = vec![keyed("li", "a"), keyed("li", "b"), keyed("li", "c")];
        let (_, first) = mounted(&mut arena, &entries);

        let ids = chain(&arena, first);
        assert_eq!(ids.len(), 3);
        for (i, id) in ids.iter().enumerate() {
            let fiber = arena.get(*id);
            assert_eq!(fiber.index, i);
            assert!(fiber.flags.is_empty());
        }
        assert_eq!(keys(&arena, first), vec!["a", "b", "c"]);
    }

    #[test]
    fn identical_update_reuses_everything_and_flags_nothing() {
        let mut arena = FiberArena::new();
        let entries = vec![keyed("li", "a"), keyed("li", "b")];
        let (parent, first) = mounted(&mut arena, &entries);

        let (wip_parent, new_first) = update_pass(&mut arena, parent, first, &entries);
        let ids = chain(&arena, new_first);
        assert_eq!(ids.len(), 2);
        for id in &ids {
            let fiber = arena.get(*id);
            assert!(fiber.alternate.is_some(), "expected reuse");
            assert!(fiber.flags.is_empty());
        }
        assert!(arena.get(wip_parent).deletions.is_empty());
    }

    #[test]
    fn reversal_flags_entries_below_the_high_water_mark() {
        // [a,b,c] -> [c,b,a]: c (old index 2) advances the mark and is the
        // pivot; b and a fall below it and are flagged for relocation.
        let mut arena = FiberArena::new();
        let entries = vec![keyed("li", "a"), keyed("li", "b"), keyed("li", "c")];
        let (parent, first) = mounted(&mut arena, &entries);

        let reversed = vec![keyed("li", "c"), keyed("li", "b"), keyed("li", "a")];
        let (wip_parent, new_first) = update_pass(&mut arena, parent, first, &reversed);

        assert_eq!(keys(&arena, new_first), vec!["c", "b", "a"]);
        let ids = chain(&arena, new_first);
        // Zero creations, zero deletions.
        assert!(ids.iter().all(|id| arena.get(*id).alternate.is_some()));
        assert!(arena.get(wip_parent).deletions.is_empty());

        let flagged: Vec<&str> = ids
            .iter()
            .filter(|id| arena.get(**id).flags.contains(FiberFlags::PLACEMENT))
            .map(|id| arena.get(*id).key.as_deref().unwrap())
            .collect();
        assert_eq!(flagged, vec!["b", "a"]);
    }

    #[test]
    fn untouched_order_yields_zero_placements() {
        let mut arena = FiberArena::new();
        let entries = vec![
            keyed("li", "a"),
            keyed("li", "b"),
            keyed("li", "c"),
            keyed("li", "d"),
        ];
        let (parent, first) = mounted(&mut arena, &entries);
        let (_, new_first) = update_pass(&mut arena, parent, first, &entries);

        for id in chain(&arena, new_first) {
            assert!(!arena.get(id).flags.contains(FiberFlags::PLACEMENT));
        }
    }

    #[test]
    fn removal_deletes_only_the_missing_entry() {
        let mut arena = FiberArena::new();
        let entries = vec![keyed("li", "a"), keyed("li", "b"), keyed("li", "c")];
        let (parent, first) = mounted(&mut arena, &entries);
        let b = chain(&arena, first)[1];

        let next = vec![keyed("li", "a"), keyed("li", "c")];
        let (wip_parent, new_first) = update_pass(&mut arena, parent, first, &next);

        assert_eq!(keys(&arena, new_first), vec!["a", "c"]);
        assert_eq!(arena.get(wip_parent).deletions, vec![b]);
        assert!(
            arena
                .get(wip_parent)
                .flags
                .contains(FiberFlags::CHILD_DELETION)
        );
    }

    #[test]
    fn prefix_truncation_deletes_the_tail() {
        let mut arena = FiberArena::new();
        let entries = vec![keyed("li", "a"), keyed("li", "b"), keyed("li", "c")];
        let (parent, first) = mounted(&mut arena, &entries);

        let next = vec![keyed("li", "a")];
        let (wip_parent, new_first) = update_pass(&mut arena, parent, first, &next);

        assert_eq!(keys(&arena, new_first), vec!["a"]);
        assert_eq!(arena.get(wip_parent).deletions.len(), 2);
    }

    #[test]
    fn appended_entries_are_created_and_placed() {
        let mut arena = FiberArena::new();
        let entries = vec![keyed("li", "a")];
        let (parent, first) = mounted(&mut arena, &entries);

        let next = vec![keyed("li", "a"), keyed("li", "b")];
        let (_, new_first) = update_pass(&mut arena, parent, first, &next);

        let ids = chain(&arena, new_first);
        assert_eq!(ids.len(), 2);
        assert!(arena.get(ids[0]).alternate.is_some());
        let appended = arena.get(ids[1]);
        assert!(appended.alternate.is_none());
        assert!(appended.flags.contains(FiberFlags::PLACEMENT));
    }

    #[test]
    fn key_match_with_type_mismatch_rebuilds_the_position() {
        let mut arena = FiberArena::new();
        let entries = vec![keyed("li", "a"), keyed("li", "b")];
        let (parent, first) = mounted(&mut arena, &entries);

        let next = vec![keyed("p", "a"), keyed("li", "b")];
        let (wip_parent, new_first) = update_pass(&mut arena, parent, first, &next);

        let ids = chain(&arena, new_first);
        assert!(arena.get(ids[0]).alternate.is_none(), "rebuilt, not reused");
        assert!(arena.get(ids[0]).flags.contains(FiberFlags::PLACEMENT));
        // The old "a" was deleted; "b" survived via the map phase.
        assert_eq!(arena.get(wip_parent).deletions.len(), 1);
        assert!(arena.get(ids[1]).alternate.is_some());
    }

    #[test]
    fn single_element_replacement_discards_whole_old_list() {
        let mut arena = FiberArena::new();
        let entries = vec![keyed("li", "a"), keyed("li", "b"), keyed("li", "c")];
        let (parent, first) = mounted(&mut arena, &entries);

        // Same key as the head but a different type: the entire remaining
        // chain is discarded and one fresh fiber replaces it.
        let replacement = Node::Element(Element::host("p").with_key("a"));
        let wip_parent = create_work_in_progress(&mut arena, parent, FiberProps::None);
        let new_first = ChildReconciler::new(true).reconcile(
            &mut arena,
            wip_parent,
            first,
            ChildInput::One(&replacement),
            Lanes::SYNC,
        );

        let new_first = new_first.expect("replacement produces a child");
        assert!(arena.get(new_first).alternate.is_none());
        assert_eq!(arena.get(wip_parent).deletions.len(), 3);
    }

    #[test]
    fn keyless_fragment_description_unwraps_into_sequence() {
        let mut arena = FiberArena::new();
        let frag = Node::Element(Element::fragment(vec![
            keyed("li", "a"),
            keyed("li", "b"),
        ]));
        let parent = arena.alloc(Fiber::new(FiberKind::Fragment, FiberProps::None, None));
        let first = ChildReconciler::new(false).reconcile(
            &mut arena,
            parent,
            None,
            ChildInput::One(&frag),
            Lanes::SYNC,
        );

        // Two host fibers, not one fragment fiber.
        assert_eq!(keys(&arena, first), vec!["a", "b"]);
        let ids = chain(&arena, first);
        assert!(ids.iter().all(|id| arena.get(*id).kind == FiberKind::HostElement));
    }

    #[test]
    fn empty_entries_render_nothing_and_shift_positions() {
        let mut arena = FiberArena::new();
        let entries = vec![Node::Empty, keyed("li", "a"), Node::Empty, keyed("li", "b")];
        let (_, first) = mounted(&mut arena, &entries);

        let ids = chain(&arena, first);
        assert_eq!(ids.len(), 2);
        // Indices reflect description positions, holes included.
        assert_eq!(arena.get(ids[0]).index, 1);
        assert_eq!(arena.get(ids[1]).index, 3);
    }

    #[test]
    fn text_to_text_update_reuses_the_instance_slot() {
        let mut arena = FiberArena::new();
        let entries = vec![Node::Text("one".into())];
        let (parent, first) = mounted(&mut arena, &entries);

        let next = vec![Node::Text("two".into())];
        let (_, new_first) = update_pass(&mut arena, parent, first, &next);
        let id = chain(&arena, new_first)[0];
        assert!(arena.get(id).alternate.is_some());
        assert_eq!(arena.get(id).pending_props.text(), Some("two"));
    }
}
