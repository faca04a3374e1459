use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    sync::Arc,
};

use agora_client::api::{
    self, AuthToken, CommentId, CommentRecord, NewReport, PostId, Reaction, Remote, RemoteError,
    Role, Time, UserId, Viewer, VoteOutcome,
};
use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;

/// Number of reports after which a comment gets hidden automatically
pub const DEFAULT_REPORT_THRESHOLD: usize = 3;

/// In-memory stand-in for the comment backend, enforcing the same permission
/// rules
pub struct MockServer {
    users: BTreeMap<UserId, MockUser>,
    sessions: HashMap<String, UserId>,
    posts: BTreeSet<PostId>,
    comments: BTreeMap<CommentId, MockComment>,
    reactions: HashMap<(UserId, CommentId), Reaction>,
    reports: Vec<(UserId, CommentId, NewReport)>,
    report_threshold: usize,
    next_id: i64,
    now: Time,
}

#[derive(Debug)]
struct MockUser {
    username: String,
    nickname: Option<String>,
    role: Role,
}

#[derive(Clone, Debug)]
struct MockComment {
    id: CommentId,
    post_id: PostId,
    parent_id: Option<CommentId>,
    author_id: UserId,
    content: String,
    created_at: Time,
    updated_at: Time,
    is_hidden: bool,
    is_deleted: bool,
}

fn bad_request(detail: &str) -> RemoteError {
    RemoteError::Server(format!("400: {detail}"))
}

fn forbidden(detail: &str) -> RemoteError {
    RemoteError::Forbidden(String::from(detail))
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            users: BTreeMap::new(),
            sessions: HashMap::new(),
            posts: BTreeSet::new(),
            comments: BTreeMap::new(),
            reactions: HashMap::new(),
            reports: Vec::new(),
            report_threshold: DEFAULT_REPORT_THRESHOLD,
            next_id: 1,
            now: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn fresh_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn tick(&mut self) -> Time {
        self.now = self.now + Duration::seconds(1);
        self.now
    }

    /// Creates a user and returns a viewer logged in as them
    pub fn test_add_user(&mut self, username: &str, nickname: Option<&str>, role: Role) -> Viewer {
        let id = UserId(self.fresh_id());
        let token = format!("token-{}", id.0);
        self.users.insert(
            id,
            MockUser {
                username: String::from(username),
                nickname: nickname.map(String::from),
                role,
            },
        );
        self.sessions.insert(token.clone(), id);
        Viewer::user(id, AuthToken(token)).with_role(role)
    }

    pub fn test_add_post(&mut self) -> PostId {
        let id = PostId(self.fresh_id());
        self.posts.insert(id);
        id
    }

    /// Removes a post along with its comments
    pub fn test_remove_post(&mut self, post: PostId) {
        self.posts.remove(&post);
        self.comments.retain(|_, c| c.post_id != post);
    }

    /// Inserts a comment without any permission check
    pub fn test_add_comment(
        &mut self,
        post: PostId,
        parent: Option<CommentId>,
        author: &Viewer,
        content: &str,
    ) -> CommentId {
        let id = CommentId(self.fresh_id());
        let now = self.tick();
        self.comments.insert(
            id,
            MockComment {
                id,
                post_id: post,
                parent_id: parent,
                author_id: author.id.unwrap_or_else(UserId::stub),
                content: String::from(content),
                created_at: now,
                updated_at: now,
                is_hidden: false,
                is_deleted: false,
            },
        );
        id
    }

    /// Removes a comment entirely, as if it was purged by an administrator
    pub fn test_purge_comment(&mut self, id: CommentId) {
        self.comments.remove(&id);
        self.reactions.retain(|(_, c), _| *c != id);
    }

    /// Moves a comment to another post, as a data migration on the server would
    pub fn test_move_comment(&mut self, id: CommentId, post: PostId) {
        if let Some(c) = self.comments.get_mut(&id) {
            c.post_id = post;
        }
    }

    pub fn test_set_report_threshold(&mut self, threshold: usize) {
        self.report_threshold = threshold;
    }

    pub fn test_comment(&self, viewer: &Viewer, id: CommentId) -> Option<CommentRecord> {
        self.comments.get(&id).map(|c| self.record(viewer.id, c))
    }

    pub fn test_num_reports(&self, id: CommentId) -> usize {
        self.reports.iter().filter(|(_, c, _)| *c == id).count()
    }

    fn resolve(&self, viewer: &Viewer) -> Result<(UserId, Role), RemoteError> {
        let token = viewer.token.as_ref().ok_or(RemoteError::Unauthorized)?;
        let id = self
            .sessions
            .get(&token.0)
            .ok_or(RemoteError::Unauthorized)?;
        let user = self.users.get(id).ok_or(RemoteError::Unauthorized)?;
        Ok((*id, user.role))
    }

    fn record(&self, viewer: Option<UserId>, c: &MockComment) -> CommentRecord {
        let count = |r: Reaction| {
            self.reactions
                .iter()
                .filter(|((_, id), reaction)| *id == c.id && **reaction == r)
                .count() as u64
        };
        let author = self.users.get(&c.author_id);
        CommentRecord {
            id: c.id,
            post_id: c.post_id,
            parent_id: c.parent_id,
            author_id: c.author_id,
            author_display_name: api::display_name(
                author.and_then(|u| u.nickname.as_deref()),
                author.map(|u| u.username.as_str()),
            ),
            content: if c.is_deleted {
                String::new()
            } else {
                c.content.clone()
            },
            created_at: c.created_at,
            updated_at: c.updated_at,
            like_count: count(Reaction::Liked),
            dislike_count: count(Reaction::Disliked),
            viewer_reaction: viewer
                .and_then(|v| self.reactions.get(&(v, c.id)).copied())
                .unwrap_or_default(),
            is_hidden: c.is_hidden,
            is_deleted: c.is_deleted,
        }
    }

    fn comment_mut(&mut self, id: CommentId) -> Result<&mut MockComment, RemoteError> {
        self.comments.get_mut(&id).ok_or(RemoteError::NotFound)
    }

    pub fn fetch_comments(
        &self,
        viewer: &Viewer,
        post: PostId,
    ) -> Result<Vec<CommentRecord>, RemoteError> {
        if !self.posts.contains(&post) {
            return Err(RemoteError::NotFound);
        }
        let viewer = self.resolve(viewer).ok().map(|(id, _)| id);
        Ok(self
            .comments
            .values()
            .filter(|c| c.post_id == post)
            .map(|c| self.record(viewer, c))
            .collect())
    }

    pub fn create_comment(
        &mut self,
        viewer: &Viewer,
        post: PostId,
        parent: Option<CommentId>,
        content: String,
    ) -> Result<CommentRecord, RemoteError> {
        let (user, _) = self.resolve(viewer)?;
        if !self.posts.contains(&post) {
            return Err(RemoteError::NotFound);
        }
        if let Some(p) = parent {
            let p = self.comments.get(&p).ok_or(RemoteError::NotFound)?;
            if p.is_hidden {
                return Err(forbidden("Cannot reply to hidden comment"));
            }
            if p.is_deleted {
                return Err(bad_request("Cannot reply to deleted comment"));
            }
            if p.post_id != post {
                return Err(bad_request("Parent comment belongs to different post"));
            }
        }
        let content = api::validate_content(&content)
            .map_err(|e| bad_request(&e.to_string()))?
            .to_string();
        let id = CommentId(self.fresh_id());
        let now = self.tick();
        let c = MockComment {
            id,
            post_id: post,
            parent_id: parent,
            author_id: user,
            content,
            created_at: now,
            updated_at: now,
            is_hidden: false,
            is_deleted: false,
        };
        let res = self.record(Some(user), &c);
        self.comments.insert(id, c);
        tracing::trace!(?id, ?post, ?parent, "mock server created comment");
        Ok(res)
    }

    pub fn update_comment(
        &mut self,
        viewer: &Viewer,
        id: CommentId,
        content: String,
    ) -> Result<CommentRecord, RemoteError> {
        let (user, _) = self.resolve(viewer)?;
        let content = api::validate_content(&content)
            .map_err(|e| bad_request(&e.to_string()))?
            .to_string();
        let now = self.tick();
        let c = self.comment_mut(id)?;
        if c.author_id != user {
            return Err(forbidden("Not enough permissions"));
        }
        if c.is_deleted {
            return Err(bad_request("Comment is deleted"));
        }
        c.content = content;
        c.updated_at = now;
        let c = c.clone();
        Ok(self.record(Some(user), &c))
    }

    pub fn delete_comment(&mut self, viewer: &Viewer, id: CommentId) -> Result<(), RemoteError> {
        let (user, role) = self.resolve(viewer)?;
        let c = self.comment_mut(id)?;
        if c.author_id != user && !role.can_moderate() {
            return Err(forbidden("Not enough permissions"));
        }
        c.is_deleted = true;
        c.content.clear();
        Ok(())
    }

    pub fn vote_comment(
        &mut self,
        viewer: &Viewer,
        id: CommentId,
        target: Reaction,
    ) -> Result<VoteOutcome, RemoteError> {
        let (user, _) = self.resolve(viewer)?;
        let c = self.comments.get(&id).ok_or(RemoteError::NotFound)?;
        if c.is_hidden {
            return Err(forbidden("Cannot vote on hidden comment"));
        }
        match target {
            Reaction::None => self.reactions.remove(&(user, id)),
            r => self.reactions.insert((user, id), r),
        };
        let r = self.record(Some(user), c);
        Ok(VoteOutcome {
            like_count: r.like_count,
            dislike_count: r.dislike_count,
            viewer_reaction: r.viewer_reaction,
        })
    }

    pub fn set_comment_hidden(
        &mut self,
        viewer: &Viewer,
        id: CommentId,
        hidden: bool,
    ) -> Result<CommentRecord, RemoteError> {
        let (user, role) = self.resolve(viewer)?;
        if !role.can_moderate() {
            return Err(forbidden("Not enough permissions to change visibility"));
        }
        let c = self.comment_mut(id)?;
        c.is_hidden = hidden;
        let c = c.clone();
        Ok(self.record(Some(user), &c))
    }

    pub fn report_comment(
        &mut self,
        viewer: &Viewer,
        id: CommentId,
        report: NewReport,
    ) -> Result<(), RemoteError> {
        let (user, _) = self.resolve(viewer)?;
        if !self.comments.contains_key(&id) {
            return Err(RemoteError::NotFound);
        }
        if self.reports.iter().any(|(u, c, _)| *u == user && *c == id) {
            return Err(bad_request("You have already reported this comment"));
        }
        self.reports.push((user, id, report));
        if self.test_num_reports(id) >= self.report_threshold {
            tracing::debug!(?id, "report threshold reached, hiding comment");
            self.comment_mut(id)?.is_hidden = true;
        }
        Ok(())
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

/// A remote call, as seen by [`MockRemote`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    Fetch(PostId),
    Create(PostId, Option<CommentId>),
    Update(CommentId),
    Delete(CommentId),
    Vote(CommentId, Reaction),
    SetHidden(CommentId, bool),
    Report(CommentId),
}

#[derive(Default)]
struct CallLog {
    calls: Vec<Call>,
    failures: VecDeque<RemoteError>,
}

/// [`Remote`] backed by a shared [`MockServer`].
///
/// Every call yields to the executor once before reaching the server, so
/// concurrent controller operations can observe each other's pending state.
#[derive(Clone)]
pub struct MockRemote {
    server: Arc<Mutex<MockServer>>,
    log: Arc<Mutex<CallLog>>,
}

impl MockRemote {
    pub fn new(server: MockServer) -> MockRemote {
        MockRemote {
            server: Arc::new(Mutex::new(server)),
            log: Arc::new(Mutex::new(CallLog::default())),
        }
    }

    pub fn server(&self) -> parking_lot::MutexGuard<'_, MockServer> {
        self.server.lock()
    }

    /// Makes the next call fail with `err` without reaching the server.
    /// Several failures queue up.
    pub fn fail_next(&self, err: RemoteError) {
        self.log.lock().failures.push_back(err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().calls.clone()
    }

    pub fn num_calls(&self) -> usize {
        self.log.lock().calls.len()
    }

    async fn enter(&self, call: Call) -> Result<(), RemoteError> {
        let failure = {
            let mut log = self.log.lock();
            tracing::trace!(?call, "mock remote call");
            log.calls.push(call);
            log.failures.pop_front()
        };
        tokio::task::yield_now().await;
        match failure {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl Remote for MockRemote {
    async fn fetch_comments(
        &self,
        viewer: &Viewer,
        post: PostId,
    ) -> Result<Vec<CommentRecord>, RemoteError> {
        self.enter(Call::Fetch(post)).await?;
        self.server.lock().fetch_comments(viewer, post)
    }

    async fn create_comment(
        &self,
        viewer: &Viewer,
        post: PostId,
        parent: Option<CommentId>,
        content: String,
    ) -> Result<CommentRecord, RemoteError> {
        self.enter(Call::Create(post, parent)).await?;
        self.server
            .lock()
            .create_comment(viewer, post, parent, content)
    }

    async fn update_comment(
        &self,
        viewer: &Viewer,
        comment: CommentId,
        content: String,
    ) -> Result<CommentRecord, RemoteError> {
        self.enter(Call::Update(comment)).await?;
        self.server.lock().update_comment(viewer, comment, content)
    }

    async fn delete_comment(&self, viewer: &Viewer, comment: CommentId) -> Result<(), RemoteError> {
        self.enter(Call::Delete(comment)).await?;
        self.server.lock().delete_comment(viewer, comment)
    }

    async fn vote_comment(
        &self,
        viewer: &Viewer,
        comment: CommentId,
        target: Reaction,
    ) -> Result<VoteOutcome, RemoteError> {
        self.enter(Call::Vote(comment, target)).await?;
        self.server.lock().vote_comment(viewer, comment, target)
    }

    async fn set_comment_hidden(
        &self,
        viewer: &Viewer,
        comment: CommentId,
        hidden: bool,
    ) -> Result<CommentRecord, RemoteError> {
        self.enter(Call::SetHidden(comment, hidden)).await?;
        self.server
            .lock()
            .set_comment_hidden(viewer, comment, hidden)
    }

    async fn report_comment(
        &self,
        viewer: &Viewer,
        comment: CommentId,
        report: NewReport,
    ) -> Result<(), RemoteError> {
        self.enter(Call::Report(comment)).await?;
        self.server.lock().report_comment(viewer, comment, report)
    }
}
