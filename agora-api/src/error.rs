use crate::{CommentId, PostId};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflicting request: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),
}

impl Error {
    /// True if the viewer has to log in before retrying
    pub fn needs_login(&self) -> bool {
        matches!(self, Error::Remote(RemoteError::Unauthorized))
    }

    /// True if retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Remote(e) => e.is_transient(),
            Error::Conflict(ConflictError::VoteInFlight(_)) => true,
            _ => false,
        }
    }
}

/// Requests rejected locally, before reaching the server
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Comment content is empty")]
    EmptyContent,

    #[error("Comment content is {len} characters long, at most {max} are allowed")]
    ContentTooLong { len: usize, max: usize },

    #[error("Comment {0:?} is its own parent")]
    SelfParent(CommentId),

    #[error("Comment {0:?} is not part of this thread")]
    UnknownComment(CommentId),

    #[error("Cannot reply to deleted comment {0:?}")]
    ReplyToDeleted(CommentId),

    #[error("Cannot reply to hidden comment {0:?}")]
    ReplyToHidden(CommentId),

    #[error("Comment {0:?} is already deleted")]
    AlreadyDeleted(CommentId),

    #[error("Comment {0:?} belongs to another user")]
    NotAuthor(CommentId),

    #[error("Only moderators can do this")]
    NotModerator,

    #[error("A report needs a reason")]
    EmptyReportReason,

    #[error("No thread is loaded")]
    NotLoaded,
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum ConflictError {
    #[error("A vote on comment {0:?} is already being processed")]
    VoteInFlight(CommentId),

    #[error("Thread for post {0:?} was closed before the response arrived")]
    ThreadClosed(PostId),
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("Not logged in")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Malformed server response: {0}")]
    Malformed(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Server(_))
    }

    /// Builds the error matching a non-success HTTP answer. The body is
    /// expected to look like `{"detail": "..."}` but anything is accepted.
    pub fn from_status(status: u16, body: &[u8]) -> RemoteError {
        let detail = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("detail")
                    .and_then(|d| d.as_str())
                    .map(|d| d.to_string())
            })
            .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
        match status {
            401 => RemoteError::Unauthorized,
            403 => RemoteError::Forbidden(detail),
            404 => RemoteError::NotFound,
            _ => RemoteError::Server(format!("{status}: {detail}")),
        }
    }
}
