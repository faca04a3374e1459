use chrono::Utc;

mod comment;
pub use comment::{CommentRecord, Direction, Reaction, VoteOutcome};

mod error;
pub use error::{ConflictError, Error, RemoteError, ValidationError};

mod remote;
pub use remote::{NewReport, Remote};

mod user;
pub use user::{display_name, AuthToken, Role, UserId, Viewer, ANONYMOUS_NAME};

pub mod wire;

pub type Time = chrono::DateTime<Utc>;

/// Longest comment body accepted by the site, in characters
pub const MAX_CONTENT_LEN: usize = 2000;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct PostId(pub i64);

impl PostId {
    pub fn stub() -> PostId {
        PostId(-1)
    }
}

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub i64);

impl CommentId {
    pub fn stub() -> CommentId {
        CommentId(-1)
    }
}

/// Checks a comment body before it is sent anywhere, returning the trimmed text
pub fn validate_content(content: &str) -> Result<&str, ValidationError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    let len = content.chars().count();
    if len > MAX_CONTENT_LEN {
        return Err(ValidationError::ContentTooLong {
            len,
            max: MAX_CONTENT_LEN,
        });
    }
    Ok(content)
}
