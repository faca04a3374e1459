use std::{
    collections::{hash_map, HashMap, HashSet},
    sync::Arc,
};

use crate::{
    api::{CommentId, CommentRecord},
    Visibility,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ThreadNode {
    pub record: Arc<CommentRecord>,

    /// Number of ancestors, 0 for top-level comments
    pub depth: usize,

    pub visibility: Visibility,

    /// Replies, oldest first
    pub children: Vec<ThreadNode>,
}

/// Replies nested deeper than this are shown at top level
pub const MAX_DEPTH: usize = 256;

impl ThreadNode {
    pub fn id(&self) -> CommentId {
        self.record.id
    }

    /// Number of nodes in this subtree, including self
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn find(&self, id: CommentId) -> Option<&ThreadNode> {
        self.iter().find(|n| n.id() == id)
    }

    /// Pre-order walk over this subtree, starting with self
    pub fn iter(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }
}

/// Pre-order walk over a forest
pub struct Walk<'a> {
    stack: Vec<&'a ThreadNode>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a ThreadNode;

    fn next(&mut self) -> Option<&'a ThreadNode> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

pub fn walk(forest: &[ThreadNode]) -> Walk<'_> {
    Walk {
        stack: forest.iter().rev().collect(),
    }
}

pub fn find_in(forest: &[ThreadNode], id: CommentId) -> Option<&ThreadNode> {
    walk(forest).find(|n| n.id() == id)
}

fn sort_siblings(records: &mut [Arc<CommentRecord>]) {
    records.sort_unstable_by_key(|r| r.sibling_key());
}

/// A comment whose place in the forest is decided, but whose node is not built yet
struct Slot {
    record: Arc<CommentRecord>,
    depth: usize,

    /// Index of the parent's slot, None for top-level comments
    parent: Option<usize>,
}

struct Builder {
    children: HashMap<CommentId, Vec<Arc<CommentRecord>>>,
    placed: HashSet<CommentId>,

    /// Pre-order, so every slot comes after its parent's
    slots: Vec<Slot>,
}

impl Builder {
    /// Lays out the subtree of `root`, which is shown at top level
    fn place(&mut self, root: Arc<CommentRecord>) {
        let mut too_deep = vec![root];
        while let Some(root) = too_deep.pop() {
            if !self.placed.contains(&root.id) {
                self.lay_out(root, &mut too_deep);
            }
        }
    }

    /// Places `root` and its replies down to `MAX_DEPTH`, deeper replies are
    /// pushed to `too_deep`
    fn lay_out(&mut self, root: Arc<CommentRecord>, too_deep: &mut Vec<Arc<CommentRecord>>) {
        let mut stack = vec![(root, None, 0)];
        while let Some((record, parent, depth)) = stack.pop() {
            if !self.placed.insert(record.id) {
                tracing::warn!(id = ?record.id, parent = ?record.parent_id, "reply cycle detected, not descending");
                continue;
            }
            let idx = self.slots.len();
            if let Some(kids) = self.children.get(&record.id) {
                for kid in kids.iter().rev() {
                    if depth + 1 < MAX_DEPTH {
                        stack.push((kid.clone(), Some(idx), depth + 1));
                    } else if !self.placed.contains(&kid.id) {
                        tracing::warn!(id = ?kid.id, parent = ?record.id, "reply nested too deep, showing it at top level");
                        too_deep.push(kid.clone());
                    }
                }
            }
            self.slots.push(Slot {
                record,
                depth,
                parent,
            });
        }
    }

    /// Turns the slots into nodes, children before their parents
    fn finish(self) -> Vec<ThreadNode> {
        let mut kids = (0..self.slots.len())
            .map(|_| Vec::new())
            .collect::<Vec<Vec<ThreadNode>>>();
        let mut roots = Vec::new();
        for (i, slot) in self.slots.into_iter().enumerate().rev() {
            let mut children = std::mem::take(&mut kids[i]);
            children.reverse();
            let node = ThreadNode {
                record: slot.record,
                depth: slot.depth,
                visibility: Visibility::Visible,
                children,
            };
            match slot.parent {
                Some(p) => kids[p].push(node),
                None => roots.push(node),
            }
        }
        roots.sort_by_key(|n| n.record.sibling_key());
        roots
    }
}

/// Builds the reply forest of a set of comments.
///
/// Siblings are ordered by creation date then id. Comments whose parent is
/// missing or belongs to another post, comments only reachable through a
/// reply cycle, and replies nested [`MAX_DEPTH`] levels deep are shown at top
/// level. Every input comment appears exactly once in the result.
pub fn build_tree<I>(records: I) -> Vec<ThreadNode>
where
    I: IntoIterator<Item = Arc<CommentRecord>>,
{
    let mut by_id = HashMap::new();
    for r in records {
        match by_id.entry(r.id) {
            hash_map::Entry::Occupied(_) => {
                tracing::warn!(id = ?r.id, "duplicate comment id, ignoring later copy")
            }
            hash_map::Entry::Vacant(e) => {
                e.insert(r);
            }
        }
    }

    let mut roots = Vec::new();
    let mut children: HashMap<CommentId, Vec<Arc<CommentRecord>>> = HashMap::new();
    for r in by_id.values() {
        match r.parent_id.map(|p| (p, by_id.get(&p))) {
            None => roots.push(r.clone()),
            // own parent: only reachable as an orphan, see below
            Some((p, _)) if p == r.id => (),
            Some((p, Some(parent))) if parent.post_id == r.post_id => {
                children.entry(p).or_default().push(r.clone())
            }
            Some((p, Some(parent))) => {
                tracing::warn!(id = ?r.id, post = ?r.post_id, parent = ?p, parent_post = ?parent.post_id, "parent comment belongs to another post, showing reply at top level");
                roots.push(r.clone());
            }
            Some((p, None)) => {
                tracing::warn!(id = ?r.id, parent = ?p, "parent comment is missing, showing reply at top level");
                roots.push(r.clone());
            }
        }
    }
    for kids in children.values_mut() {
        sort_siblings(kids);
    }
    sort_siblings(&mut roots);

    let mut builder = Builder {
        children,
        placed: HashSet::with_capacity(by_id.len()),
        slots: Vec::with_capacity(by_id.len()),
    };
    for r in roots {
        builder.place(r);
    }

    if builder.placed.len() < by_id.len() {
        let mut orphans = by_id
            .values()
            .filter(|r| !builder.placed.contains(&r.id))
            .cloned()
            .collect::<Vec<_>>();
        sort_siblings(&mut orphans);
        for r in orphans {
            if builder.placed.contains(&r.id) {
                continue;
            }
            tracing::warn!(id = ?r.id, parent = ?r.parent_id, "comment is part of a reply cycle, showing it at top level");
            builder.place(r);
        }
    }

    builder.finish()
}
