use crate::{CommentId, PostId, Time, UserId, ValidationError};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentRecord {
    pub id: CommentId,
    pub post_id: PostId,

    /// None for top-level comments
    pub parent_id: Option<CommentId>,

    pub author_id: UserId,
    pub author_display_name: String,

    /// Empty once the comment is deleted
    pub content: String,

    pub created_at: Time,
    pub updated_at: Time,

    pub like_count: u64,
    pub dislike_count: u64,

    /// Reaction of the viewer this record was fetched for
    pub viewer_reaction: Reaction,

    /// Set by moderators, content is redacted for regular viewers
    pub is_hidden: bool,

    /// Set when the author removed the comment, replies stay attached
    pub is_deleted: bool,
}

impl CommentRecord {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_edited(&self) -> bool {
        self.updated_at > self.created_at
    }

    /// Key that orders siblings: creation date, then id
    pub fn sibling_key(&self) -> (Time, CommentId) {
        (self.created_at, self.id)
    }

    /// Structural checks a record has to pass before being stored
    pub fn check(&self) -> Result<(), ValidationError> {
        match self.parent_id {
            Some(p) if p == self.id => Err(ValidationError::SelfParent(self.id)),
            _ => Ok(()),
        }
    }

    /// Difference between likes and dislikes, which is what a vote moves
    pub fn score(&self) -> i64 {
        self.like_count as i64 - self.dislike_count as i64
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
    bolero::generator::TypeGenerator,
    serde::Deserialize,
    serde::Serialize,
)]
pub enum Reaction {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "like")]
    Liked,
    #[serde(rename = "dislike")]
    Disliked,
}

impl Reaction {
    /// Reaction resulting from clicking `dir`: clicking the active reaction clears it
    pub fn toggled(self, dir: Direction) -> Reaction {
        match (self, dir) {
            (Reaction::Liked, Direction::Like) => Reaction::None,
            (Reaction::Disliked, Direction::Dislike) => Reaction::None,
            (_, Direction::Like) => Reaction::Liked,
            (_, Direction::Dislike) => Reaction::Disliked,
        }
    }

    /// Contribution of this reaction to a comment's score
    pub fn weight(self) -> i64 {
        match self {
            Reaction::None => 0,
            Reaction::Liked => 1,
            Reaction::Disliked => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Reaction::None => "none",
            Reaction::Liked => "like",
            Reaction::Disliked => "dislike",
        }
    }
}

/// Button clicked by the viewer
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    bolero::generator::TypeGenerator,
    serde::Deserialize,
    serde::Serialize,
)]
pub enum Direction {
    Like,
    Dislike,
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Direction, String> {
        match s {
            "like" | "up" => Ok(Direction::Like),
            "dislike" | "down" => Ok(Direction::Dislike),
            _ => Err(format!("unknown vote direction {s:?}")),
        }
    }
}

/// Authoritative counters returned by the server after a vote
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct VoteOutcome {
    pub like_count: u64,
    pub dislike_count: u64,
    pub viewer_reaction: Reaction,
}
