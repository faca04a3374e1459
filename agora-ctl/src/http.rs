use std::collections::{HashMap, HashSet};

use agora_client::api::{
    wire, CommentId, CommentRecord, NewReport, PostId, Reaction, Remote, RemoteError, UserId,
    Viewer, VoteOutcome,
};
use parking_lot::Mutex;

/// Number of top-level comments requested at once, the backend's default
const PAGE_SIZE: usize = 50;

/// [`Remote`] talking to the comment backend over HTTP.
///
/// Failed requests are reported as is, the caller decides whether to retry.
pub struct HttpRemote {
    host: String,
    client: reqwest::Client,
    seen: Mutex<Seen>,
}

/// What the server last said about the comments fetched through this remote.
///
/// The backend only offers like and dislike toggles, so voting needs the
/// viewer's current reaction and the post to reload counts from.
#[derive(Default)]
struct Seen {
    posts: HashMap<CommentId, PostId>,
    reactions: HashMap<(UserId, CommentId), Reaction>,
}

/// Toggle to post to so that the viewer's reaction goes from `current` to
/// `target`. Liking a disliked comment removes the dislike server-side.
fn toggle_for(current: Reaction, target: Reaction) -> Option<&'static str> {
    match (current, target) {
        (c, t) if c == t => None,
        (_, Reaction::Liked) | (Reaction::Liked, Reaction::None) => Some("like"),
        (_, Reaction::Disliked) | (Reaction::Disliked, Reaction::None) => Some("dislike"),
        (Reaction::None, Reaction::None) => None,
    }
}

/// Top-level comments gathered page after page
#[derive(Default)]
struct Pages {
    comments: Vec<wire::WireComment>,
    ids: HashSet<i64>,
    skip: usize,
}

impl Pages {
    /// Adds a page, returns whether the next one has to be requested
    fn add(&mut self, page: Vec<wire::WireComment>) -> bool {
        let full = page.len() >= PAGE_SIZE;
        let mut fresh = 0;
        for c in page {
            if let Some(id) = c.id {
                // comments posted meanwhile shift the pages
                if !self.ids.insert(id) {
                    tracing::debug!(id, "comment listed twice");
                    continue;
                }
            }
            fresh += 1;
            self.comments.push(c);
        }
        self.skip += PAGE_SIZE;
        full && fresh > 0
    }
}

fn network(e: reqwest::Error) -> RemoteError {
    RemoteError::Network(e.to_string())
}

impl HttpRemote {
    pub fn new(host: String) -> HttpRemote {
        HttpRemote {
            host: host.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            seen: Mutex::new(Seen::default()),
        }
    }

    fn request(
        &self,
        viewer: &Viewer,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}/comments/{}", self.host, path));
        match &viewer.token {
            Some(tok) => req.bearer_auth(&tok.0),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Vec<u8>, RemoteError> {
        let resp = req.send().await.map_err(network)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(network)?;
        tracing::debug!(%status, len = body.len(), "got answer from server");
        if !status.is_success() {
            return Err(RemoteError::from_status(status.as_u16(), &body));
        }
        Ok(body.to_vec())
    }

    async fn send_json<T>(&self, req: reqwest::RequestBuilder) -> Result<T, RemoteError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let body = self.send(req).await?;
        serde_json::from_slice(&body)
            .map_err(|e| RemoteError::Malformed(format!("parsing server answer: {e}")))
    }

    /// Fetches every comment of `post`, the listing being paginated
    async fn fetch_all(
        &self,
        viewer: &Viewer,
        post: PostId,
    ) -> Result<Vec<CommentRecord>, RemoteError> {
        let mut pages = Pages::default();
        loop {
            let req = self
                .request(viewer, reqwest::Method::GET, &format!("post/{}", post.0))
                .query(&[("skip", pages.skip), ("limit", PAGE_SIZE)]);
            if !pages.add(self.send_json(req).await?) {
                break;
            }
        }
        tracing::debug!(?post, top_level = pages.comments.len(), "fetched comments");
        let records = wire::normalize_comments(pages.comments)?;
        let mut seen = self.seen.lock();
        for c in &records {
            seen.posts.insert(c.id, c.post_id);
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl Remote for HttpRemote {
    async fn fetch_comments(
        &self,
        viewer: &Viewer,
        post: PostId,
    ) -> Result<Vec<CommentRecord>, RemoteError> {
        let records = self.fetch_all(viewer, post).await?;
        if let Some(user) = viewer.id {
            let mut seen = self.seen.lock();
            for c in &records {
                seen.reactions.insert((user, c.id), c.viewer_reaction);
            }
        }
        Ok(records)
    }

    async fn create_comment(
        &self,
        viewer: &Viewer,
        post: PostId,
        parent: Option<CommentId>,
        content: String,
    ) -> Result<CommentRecord, RemoteError> {
        let req = self
            .request(viewer, reqwest::Method::POST, "")
            .json(&wire::WireNewComment {
                content,
                post_id: post.0,
                parent_id: parent.map(|p| p.0),
            });
        wire::normalize_comment(self.send_json(req).await?)
    }

    async fn update_comment(
        &self,
        viewer: &Viewer,
        comment: CommentId,
        content: String,
    ) -> Result<CommentRecord, RemoteError> {
        let req = self
            .request(viewer, reqwest::Method::PUT, &comment.0.to_string())
            .json(&wire::WireCommentUpdate {
                content: Some(content),
                is_hidden: None,
            });
        wire::normalize_comment(self.send_json(req).await?)
    }

    async fn delete_comment(&self, viewer: &Viewer, comment: CommentId) -> Result<(), RemoteError> {
        let req = self.request(viewer, reqwest::Method::DELETE, &comment.0.to_string());
        self.send(req).await?;
        Ok(())
    }

    async fn vote_comment(
        &self,
        viewer: &Viewer,
        comment: CommentId,
        target: Reaction,
    ) -> Result<VoteOutcome, RemoteError> {
        let user = viewer.id.ok_or(RemoteError::Unauthorized)?;
        let (post, current) = {
            let seen = self.seen.lock();
            let post = *seen.posts.get(&comment).ok_or_else(|| {
                RemoteError::Server(format!("comment {} was not fetched before voting", comment.0))
            })?;
            let current = seen
                .reactions
                .get(&(user, comment))
                .copied()
                .unwrap_or_default();
            (post, current)
        };
        if let Some(toggle) = toggle_for(current, target) {
            let req = self.request(
                viewer,
                reqwest::Method::POST,
                &format!("{}/{toggle}", comment.0),
            );
            self.send(req).await?;
        }
        self.seen.lock().reactions.insert((user, comment), target);

        // toggles answer with the reaction alone, counts come from the listing
        let records = self.fetch_all(viewer, post).await?;
        let c = records
            .iter()
            .find(|c| c.id == comment)
            .ok_or(RemoteError::NotFound)?;
        Ok(VoteOutcome {
            like_count: c.like_count,
            dislike_count: c.dislike_count,
            viewer_reaction: target,
        })
    }

    async fn set_comment_hidden(
        &self,
        viewer: &Viewer,
        comment: CommentId,
        hidden: bool,
    ) -> Result<CommentRecord, RemoteError> {
        let req = self
            .request(viewer, reqwest::Method::PUT, &comment.0.to_string())
            .json(&wire::WireCommentUpdate {
                content: None,
                is_hidden: Some(hidden),
            });
        wire::normalize_comment(self.send_json(req).await?)
    }

    async fn report_comment(
        &self,
        viewer: &Viewer,
        comment: CommentId,
        report: NewReport,
    ) -> Result<(), RemoteError> {
        let req = self
            .request(viewer, reqwest::Method::POST, &format!("{}/report", comment.0))
            .json(&report);
        self.send(req).await?;
        Ok(())
    }
}
