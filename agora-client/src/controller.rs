use std::{
    cell::{Cell, RefCell, RefMut},
    collections::HashSet,
    sync::Arc,
};

use crate::{
    api::{
        self, CommentId, CommentRecord, ConflictError, Direction, Error, NewReport, PostId,
        Remote, RemoteError, UserId, ValidationError, Viewer,
    },
    apply_visibility, build_tree, CommentStore, ReactionReconciler, ReactionState, Tally,
    ThreadNode,
};

/// Local state of one visit to a thread
struct Session {
    epoch: u64,
    store: CommentStore,
    reactions: ReactionReconciler,

    /// Comments the server reported as gone, kept in the tree for their replies
    retired: HashSet<CommentId>,
}

impl Session {
    fn comment(&self, post: PostId, id: CommentId) -> Result<Arc<CommentRecord>, Error> {
        match self.store.get(id) {
            Some(c) if c.post_id == post && !self.retired.contains(&id) => Ok(c.clone()),
            _ => Err(ValidationError::UnknownComment(id).into()),
        }
    }
}

/// Drives the comments of one post for the time it is being viewed.
///
/// Every operation runs a synchronous preparation step, awaits the remote,
/// then reconciles the answer. Local state is never borrowed across the
/// remote call, so operations may overlap on a single thread. Answers that
/// arrive after [`ThreadController::leave`] are dropped.
pub struct ThreadController<R> {
    post: PostId,
    remote: R,
    session: RefCell<Option<Session>>,
    next_epoch: Cell<u64>,
}

fn author(viewer: &Viewer) -> Result<UserId, Error> {
    match viewer.id {
        Some(id) if viewer.is_authenticated() => Ok(id),
        _ => Err(RemoteError::Unauthorized.into()),
    }
}

/// Takes the content, flags and dates from the server's answer, but keeps
/// vote counters and author name: those only change through votes and loads
fn merge_answer(local: &CommentRecord, answer: CommentRecord) -> CommentRecord {
    let mut res = Tally::of(local).apply_to(&answer);
    res.author_display_name = local.author_display_name.clone();
    res
}

impl<R: Remote> ThreadController<R> {
    pub fn new(post: PostId, remote: R) -> ThreadController<R> {
        ThreadController {
            post,
            remote,
            session: RefCell::new(None),
            next_epoch: Cell::new(0),
        }
    }

    pub fn post(&self) -> PostId {
        self.post
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn is_open(&self) -> bool {
        self.session.borrow().is_some()
    }

    fn session(&self) -> Result<RefMut<'_, Session>, Error> {
        RefMut::filter_map(self.session.borrow_mut(), |s| s.as_mut())
            .map_err(|_| ValidationError::NotLoaded.into())
    }

    /// The session an answer was requested from, if it is still open
    fn session_at(&self, epoch: u64) -> Result<RefMut<'_, Session>, Error> {
        RefMut::filter_map(self.session.borrow_mut(), |s| {
            s.as_mut().filter(|s| s.epoch == epoch)
        })
        .map_err(|_| {
            tracing::warn!(post = ?self.post, "dropping answer for a closed thread");
            ConflictError::ThreadClosed(self.post).into()
        })
    }

    fn open_session(&self) -> u64 {
        let mut session = self.session.borrow_mut();
        match &*session {
            Some(s) => s.epoch,
            None => {
                let epoch = self.next_epoch.get();
                self.next_epoch.set(epoch + 1);
                *session = Some(Session {
                    epoch,
                    store: CommentStore::new(),
                    reactions: ReactionReconciler::new(),
                    retired: HashSet::new(),
                });
                epoch
            }
        }
    }

    /// Records the consequences of a failed remote call and returns the error
    /// to report. `NotFound` retires `target`, or closes the thread if the
    /// call was about the post itself.
    fn remote_failed(&self, epoch: u64, target: Option<CommentId>, err: RemoteError) -> Error {
        if err == RemoteError::NotFound {
            let mut session = self.session.borrow_mut();
            if session.as_ref().map(|s| s.epoch) == Some(epoch) {
                match target {
                    Some(id) => {
                        tracing::info!(comment = ?id, "comment no longer exists on the server");
                        if let Some(s) = session.as_mut() {
                            s.retired.insert(id);
                        }
                    }
                    None => {
                        tracing::info!(post = ?self.post, "post no longer exists on the server");
                        if let Some(mut s) = session.take() {
                            s.reactions.cancel_all();
                        }
                    }
                }
            }
        }
        err.into()
    }

    /// Fetches every comment of the post and returns the tree as `viewer`
    /// should see it
    pub async fn load_thread(&self, viewer: &Viewer) -> Result<Vec<ThreadNode>, Error> {
        let epoch = self.open_session();
        let records = match self.remote.fetch_comments(viewer, self.post).await {
            Ok(r) => r,
            Err(e) => return Err(self.remote_failed(epoch, None, e)),
        };
        {
            let mut s = self.session_at(epoch)?;
            tracing::info!(post = ?self.post, num = records.len(), "loaded thread");
            s.store.replace_post(self.post, records);
            s.retired.clear();
        }
        self.view(viewer)
    }

    /// Rebuilds the tree from local state, without contacting the server
    pub fn view(&self, viewer: &Viewer) -> Result<Vec<ThreadNode>, Error> {
        let records = self.session()?.store.all_for_post(self.post);
        Ok(apply_visibility(build_tree(records), viewer.role))
    }

    pub fn comment(&self, id: CommentId) -> Result<Arc<CommentRecord>, Error> {
        self.session()?.comment(self.post, id)
    }

    /// Raw records of the thread, as received, ordered by creation date
    pub fn records(&self) -> Result<Vec<Arc<CommentRecord>>, Error> {
        let mut res = self.session()?.store.all_for_post(self.post);
        res.sort_by_key(|c| c.sibling_key());
        Ok(res)
    }

    pub fn reaction_state(&self, viewer: &Viewer, id: CommentId) -> Result<ReactionState, Error> {
        let user = author(viewer)?;
        let s = self.session()?;
        let c = s.comment(self.post, id)?;
        Ok(s.reactions.state(user, &c))
    }

    /// Posts a new comment, as a reply to `parent` if set.
    ///
    /// Nothing is shown before the server answers, as it is the one assigning
    /// the new comment's id.
    pub async fn submit_reply(
        &self,
        viewer: &Viewer,
        parent: Option<CommentId>,
        content: &str,
    ) -> Result<CommentRecord, Error> {
        author(viewer)?;
        let content = api::validate_content(content)?;
        let epoch = {
            let s = self.session()?;
            if let Some(parent) = parent {
                let p = s.comment(self.post, parent)?;
                if p.is_deleted {
                    return Err(ValidationError::ReplyToDeleted(parent).into());
                }
                if p.is_hidden {
                    return Err(ValidationError::ReplyToHidden(parent).into());
                }
            }
            s.epoch
        };
        let created = match self
            .remote
            .create_comment(viewer, self.post, parent, content.to_string())
            .await
        {
            Ok(c) => c,
            Err(e) => return Err(self.remote_failed(epoch, parent, e)),
        };
        created
            .check()
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;
        if created.post_id != self.post || created.parent_id != parent {
            tracing::warn!(?created, expected_parent = ?parent, "server created comment elsewhere than requested");
            return Err(RemoteError::Malformed(format!(
                "comment {:?} was not created under the requested parent",
                created.id
            ))
            .into());
        }
        self.session_at(epoch)?.store.upsert(created.clone());
        tracing::debug!(comment = ?created.id, ?parent, "reply submitted");
        Ok(created)
    }

    pub async fn edit_own(
        &self,
        viewer: &Viewer,
        id: CommentId,
        content: &str,
    ) -> Result<CommentRecord, Error> {
        let user = author(viewer)?;
        let content = api::validate_content(content)?;
        let epoch = {
            let s = self.session()?;
            let c = s.comment(self.post, id)?;
            if c.author_id != user {
                return Err(ValidationError::NotAuthor(id).into());
            }
            if c.is_deleted {
                return Err(ValidationError::AlreadyDeleted(id).into());
            }
            s.epoch
        };
        let answer = match self
            .remote
            .update_comment(viewer, id, content.to_string())
            .await
        {
            Ok(c) => c,
            Err(e) => return Err(self.remote_failed(epoch, Some(id), e)),
        };
        self.store_answer(epoch, id, answer)
    }

    /// Deletes a comment written by the viewer. Moderators may delete any comment.
    pub async fn delete_own(&self, viewer: &Viewer, id: CommentId) -> Result<CommentRecord, Error> {
        let user = author(viewer)?;
        let epoch = {
            let s = self.session()?;
            let c = s.comment(self.post, id)?;
            if c.author_id != user && !viewer.can_moderate() {
                return Err(ValidationError::NotAuthor(id).into());
            }
            if c.is_deleted {
                return Err(ValidationError::AlreadyDeleted(id).into());
            }
            s.epoch
        };
        if let Err(e) = self.remote.delete_comment(viewer, id).await {
            return Err(self.remote_failed(epoch, Some(id), e));
        }
        let mut s = self.session_at(epoch)?;
        let current = s.comment(self.post, id)?;
        let deleted = CommentRecord {
            content: String::new(),
            is_deleted: true,
            ..(*current).clone()
        };
        s.store.upsert(deleted.clone());
        tracing::debug!(comment = ?id, "comment deleted");
        Ok(deleted)
    }

    /// Likes or dislikes a comment, clicking the active reaction again removing it.
    ///
    /// The new counts are visible right away. They are replaced by the
    /// server's once it answers, or rolled back if it refuses.
    pub async fn vote(
        &self,
        viewer: &Viewer,
        id: CommentId,
        dir: Direction,
    ) -> Result<CommentRecord, Error> {
        let user = author(viewer)?;
        let (epoch, target) = {
            let mut s = self.session()?;
            let c = s.comment(self.post, id)?;
            let vote = s.reactions.begin(user, &c, dir)?;
            s.store.upsert(vote.optimistic);
            (s.epoch, vote.target)
        };
        let res = self.remote.vote_comment(viewer, id, target).await;
        let mut s = self.session_at(epoch)?;
        let current = match s.store.get(id) {
            Some(c) => c.clone(),
            None => {
                s.reactions.discard(user, id);
                return Err(ValidationError::UnknownComment(id).into());
            }
        };
        match res {
            Ok(outcome) => {
                let confirmed = s
                    .reactions
                    .confirm(user, &current, outcome)
                    .ok_or(ConflictError::ThreadClosed(self.post))?;
                s.store.upsert(confirmed.clone());
                tracing::debug!(comment = ?id, reaction = ?confirmed.viewer_reaction, "vote confirmed");
                Ok(confirmed)
            }
            Err(e) => {
                if let Some(rolled_back) = s.reactions.fail(user, &current) {
                    s.store.upsert(rolled_back);
                }
                drop(s);
                Err(self.remote_failed(epoch, Some(id), e))
            }
        }
    }

    /// Hides or unhides a comment. Vote counters are left alone.
    pub async fn set_hidden(
        &self,
        viewer: &Viewer,
        id: CommentId,
        hidden: bool,
    ) -> Result<CommentRecord, Error> {
        author(viewer)?;
        if !viewer.can_moderate() {
            return Err(ValidationError::NotModerator.into());
        }
        let epoch = {
            let s = self.session()?;
            s.comment(self.post, id)?;
            s.epoch
        };
        let answer = match self.remote.set_comment_hidden(viewer, id, hidden).await {
            Ok(c) => c,
            Err(e) => return Err(self.remote_failed(epoch, Some(id), e)),
        };
        self.store_answer(epoch, id, answer)
    }

    /// Reports a comment to the moderators. The server may hide it once
    /// enough reports accumulated, which shows on the next load.
    pub async fn report(
        &self,
        viewer: &Viewer,
        id: CommentId,
        reason: &str,
        description: Option<&str>,
    ) -> Result<(), Error> {
        author(viewer)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::EmptyReportReason.into());
        }
        let epoch = {
            let s = self.session()?;
            s.comment(self.post, id)?;
            s.epoch
        };
        let report = NewReport {
            reason: reason.to_string(),
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from),
        };
        match self.remote.report_comment(viewer, id, report).await {
            Ok(()) => {
                self.session_at(epoch)?;
                Ok(())
            }
            Err(e) => Err(self.remote_failed(epoch, Some(id), e)),
        }
    }

    /// Closes the thread: local comments and votes in flight are dropped
    pub fn leave(&self) {
        if let Some(mut s) = self.session.borrow_mut().take() {
            tracing::debug!(post = ?self.post, pending = s.reactions.num_pending(), "leaving thread");
            s.reactions.cancel_all();
            s.store.clear();
        }
    }

    fn store_answer(
        &self,
        epoch: u64,
        id: CommentId,
        answer: CommentRecord,
    ) -> Result<CommentRecord, Error> {
        answer
            .check()
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;
        if answer.id != id {
            return Err(RemoteError::Malformed(format!(
                "asked to update comment {id:?}, got {:?}",
                answer.id
            ))
            .into());
        }
        if answer.post_id != self.post {
            tracing::warn!(?answer, post = ?self.post, "server answered with a comment of another post");
            return Err(RemoteError::Malformed(format!(
                "comment {id:?} now belongs to post {:?}",
                answer.post_id
            ))
            .into());
        }
        let mut s = self.session_at(epoch)?;
        let current = s.comment(self.post, id)?;
        let merged = merge_answer(&current, answer);
        s.store.upsert(merged.clone());
        Ok(merged)
    }
}
