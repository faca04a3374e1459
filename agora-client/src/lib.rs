mod controller;
pub use controller::ThreadController;

mod reaction;
pub use reaction::{PendingVote, ReactionReconciler, ReactionState, Tally};

mod store;
pub use store::CommentStore;

mod tree;
pub use tree::{build_tree, find_in, walk, ThreadNode, Walk, MAX_DEPTH};

mod visibility;
pub use visibility::{apply_visibility, Visibility, DELETED_PLACEHOLDER, HIDDEN_PLACEHOLDER};

pub mod api {
    pub use agora_api::*;
}
