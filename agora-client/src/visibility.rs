use std::sync::Arc;

use crate::{api::Role, ThreadNode};

/// Shown instead of the content of a hidden comment
pub const HIDDEN_PLACEHOLDER: &str = "신고로 인해 숨김 처리된 댓글입니다.";

/// Shown instead of the content of a deleted comment
pub const DELETED_PLACEHOLDER: &str = "삭제된 댓글입니다.";

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Visibility {
    Visible,

    /// Hidden by a moderator, but shown with a badge because the viewer moderates
    HiddenBadge,

    /// Hidden by a moderator, content replaced by [`HIDDEN_PLACEHOLDER`]
    Hidden,

    /// Deleted by its author, content replaced by [`DELETED_PLACEHOLDER`]
    Deleted,
}

impl Visibility {
    pub fn is_redacted(self) -> bool {
        matches!(self, Visibility::Hidden | Visibility::Deleted)
    }
}

fn redact(node: &mut ThreadNode, placeholder: &str) {
    if node.record.content != placeholder {
        Arc::make_mut(&mut node.record).content = placeholder.to_string();
    }
}

fn apply_to_node(node: &mut ThreadNode, role: Role) {
    node.visibility = if node.record.is_deleted {
        redact(node, DELETED_PLACEHOLDER);
        Visibility::Deleted
    } else if node.record.is_hidden && role.can_moderate() {
        Visibility::HiddenBadge
    } else if node.record.is_hidden {
        redact(node, HIDDEN_PLACEHOLDER);
        Visibility::Hidden
    } else {
        Visibility::Visible
    };
}

/// Redacts hidden and deleted comments for a viewer with role `role`.
///
/// Only content changes: every node stays in place so replies to redacted
/// comments remain reachable. Records shared with the store are copied before
/// being redacted.
pub fn apply_visibility(mut forest: Vec<ThreadNode>, role: Role) -> Vec<ThreadNode> {
    let mut stack = forest.iter_mut().collect::<Vec<_>>();
    while let Some(node) = stack.pop() {
        apply_to_node(node, role);
        stack.extend(node.children.iter_mut());
    }
    forest
}
