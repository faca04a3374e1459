//! Loose JSON shapes exchanged with the backend, and their normalization into
//! strict [`CommentRecord`]s.
//!
//! The backend sends comments with nested `replies`, optional counters, and
//! naive timestamps. Nothing past this module sees those shapes.

use chrono::{NaiveDateTime, TimeZone, Utc};

use crate::{display_name, CommentId, CommentRecord, PostId, Reaction, RemoteError, Time, UserId};

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct WireUser {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub nickname: Option<String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct WireComment {
    pub id: Option<i64>,
    pub content: Option<String>,
    pub user_id: Option<i64>,
    pub post_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub is_hidden: Option<bool>,
    pub is_deleted: Option<bool>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub like_count: Option<i64>,
    pub dislike_count: Option<i64>,
    pub liked_by_me: Option<bool>,
    pub disliked_by_me: Option<bool>,
    pub viewer_reaction: Option<String>,
    pub user: Option<WireUser>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<WireComment>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct WireNewComment {
    pub content: String,
    pub post_id: i64,
    pub parent_id: Option<i64>,
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct WireCommentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_hidden: Option<bool>,
}

fn malformed(what: impl Into<String>) -> RemoteError {
    RemoteError::Malformed(what.into())
}

/// Accepts RFC 3339 timestamps as well as the naive ones the backend emits,
/// the latter being UTC
pub fn parse_time(s: &str) -> Result<Time, RemoteError> {
    if let Ok(t) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|t| Utc.from_utc_datetime(&t))
        .map_err(|e| malformed(format!("invalid timestamp {s:?}: {e}")))
}

fn count(c: Option<i64>) -> u64 {
    c.unwrap_or(0).max(0) as u64
}

pub fn parse_reaction(s: &str) -> Result<Reaction, RemoteError> {
    match s {
        "none" | "" => Ok(Reaction::None),
        "like" | "liked" => Ok(Reaction::Liked),
        "dislike" | "disliked" => Ok(Reaction::Disliked),
        _ => Err(malformed(format!("unknown reaction {s:?}"))),
    }
}

impl WireComment {
    fn reaction(&self) -> Result<Reaction, RemoteError> {
        if let Some(r) = &self.viewer_reaction {
            return parse_reaction(r);
        }
        match (
            self.liked_by_me.unwrap_or(false),
            self.disliked_by_me.unwrap_or(false),
        ) {
            (false, false) => Ok(Reaction::None),
            (true, false) => Ok(Reaction::Liked),
            (false, true) => Ok(Reaction::Disliked),
            (true, true) => Err(malformed(format!(
                "comment {:?} is both liked and disliked by the viewer",
                self.id
            ))),
        }
    }

    fn into_record(
        self,
        parent: Option<(CommentId, PostId)>,
    ) -> Result<CommentRecord, RemoteError> {
        let id = CommentId(self.id.ok_or_else(|| malformed("comment without id"))?);
        let post_id = self
            .post_id
            .map(PostId)
            .or(parent.map(|(_, p)| p))
            .ok_or_else(|| malformed(format!("comment {id:?} without post id")))?;
        let parent_id = self.parent_id.map(CommentId).or(parent.map(|(c, _)| c));
        let author_id = self
            .user_id
            .or(self.user.as_ref().and_then(|u| u.id))
            .map(UserId)
            .ok_or_else(|| malformed(format!("comment {id:?} without author")))?;
        let author_display_name = display_name(
            self.user.as_ref().and_then(|u| u.nickname.as_deref()),
            self.user.as_ref().and_then(|u| u.username.as_deref()),
        );
        let created_at = parse_time(
            self.created_at
                .as_deref()
                .ok_or_else(|| malformed(format!("comment {id:?} without creation date")))?,
        )?;
        let updated_at = match &self.updated_at {
            Some(t) => parse_time(t)?,
            None => created_at,
        };
        let viewer_reaction = self.reaction()?;
        let is_deleted = self.is_deleted.unwrap_or(false);
        let content = match is_deleted {
            true => String::new(),
            false => self.content.unwrap_or_default(),
        };
        let record = CommentRecord {
            id,
            post_id,
            parent_id,
            author_id,
            author_display_name,
            content,
            created_at,
            updated_at,
            like_count: count(self.like_count),
            dislike_count: count(self.dislike_count),
            viewer_reaction,
            is_hidden: self.is_hidden.unwrap_or(false),
            is_deleted,
        };
        record.check().map_err(|e| malformed(e.to_string()))?;
        Ok(record)
    }
}

/// Flattens a list of possibly-nested comments into records, parents first
pub fn normalize_comments(wire: Vec<WireComment>) -> Result<Vec<CommentRecord>, RemoteError> {
    let mut out = Vec::with_capacity(wire.len());
    // comments left to normalize, with the id and post of the comment they were nested in
    let mut stack = wire.into_iter().rev().map(|c| (c, None)).collect::<Vec<_>>();
    while let Some((mut c, parent)) = stack.pop() {
        let replies = std::mem::take(&mut c.replies);
        let record = c.into_record(parent)?;
        let here = Some((record.id, record.post_id));
        stack.extend(replies.into_iter().rev().map(|r| (r, here)));
        out.push(record);
    }
    Ok(out)
}

/// Normalizes a single comment, as returned by create and update calls
pub fn normalize_comment(wire: WireComment) -> Result<CommentRecord, RemoteError> {
    if !wire.replies.is_empty() {
        tracing::debug!(id = ?wire.id, "ignoring replies nested in a single comment answer");
    }
    wire.into_record(None)
}

impl From<&CommentRecord> for WireComment {
    fn from(c: &CommentRecord) -> WireComment {
        WireComment {
            id: Some(c.id.0),
            content: Some(c.content.clone()),
            user_id: Some(c.author_id.0),
            post_id: Some(c.post_id.0),
            parent_id: c.parent_id.map(|p| p.0),
            is_hidden: Some(c.is_hidden),
            is_deleted: Some(c.is_deleted),
            created_at: Some(c.created_at.to_rfc3339()),
            updated_at: Some(c.updated_at.to_rfc3339()),
            like_count: Some(c.like_count as i64),
            dislike_count: Some(c.dislike_count as i64),
            liked_by_me: None,
            disliked_by_me: None,
            viewer_reaction: Some(c.viewer_reaction.as_str().to_string()),
            user: Some(WireUser {
                id: Some(c.author_id.0),
                username: None,
                nickname: Some(c.author_display_name.clone()),
            }),
            replies: Vec::new(),
        }
    }
}
