use async_trait::async_trait;

use crate::{CommentId, CommentRecord, PostId, Reaction, RemoteError, Viewer, VoteOutcome};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewReport {
    pub reason: String,
    pub description: Option<String>,
}

/// The server holding the source of truth for comments.
///
/// Every call is made on behalf of an explicit viewer. Implementations never
/// retry on their own: transient failures are reported to the caller.
#[async_trait]
pub trait Remote {
    async fn fetch_comments(
        &self,
        viewer: &Viewer,
        post: PostId,
    ) -> Result<Vec<CommentRecord>, RemoteError>;

    /// The server assigns the id and timestamps of the new comment
    async fn create_comment(
        &self,
        viewer: &Viewer,
        post: PostId,
        parent: Option<CommentId>,
        content: String,
    ) -> Result<CommentRecord, RemoteError>;

    async fn update_comment(
        &self,
        viewer: &Viewer,
        comment: CommentId,
        content: String,
    ) -> Result<CommentRecord, RemoteError>;

    /// Marks the comment as deleted, its replies are kept
    async fn delete_comment(&self, viewer: &Viewer, comment: CommentId)
        -> Result<(), RemoteError>;

    /// Sets the viewer's reaction to `target`, `Reaction::None` removing it
    async fn vote_comment(
        &self,
        viewer: &Viewer,
        comment: CommentId,
        target: Reaction,
    ) -> Result<VoteOutcome, RemoteError>;

    async fn set_comment_hidden(
        &self,
        viewer: &Viewer,
        comment: CommentId,
        hidden: bool,
    ) -> Result<CommentRecord, RemoteError>;

    async fn report_comment(
        &self,
        viewer: &Viewer,
        comment: CommentId,
        report: NewReport,
    ) -> Result<(), RemoteError>;
}
