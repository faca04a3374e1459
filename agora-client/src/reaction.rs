use std::collections::{hash_map, HashMap};

use crate::api::{
    CommentId, CommentRecord, ConflictError, Direction, Reaction, UserId, VoteOutcome,
};

/// The reaction-related fields of a comment
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Tally {
    pub like_count: u64,
    pub dislike_count: u64,
    pub viewer_reaction: Reaction,
}

impl Tally {
    pub fn of(record: &CommentRecord) -> Tally {
        Tally {
            like_count: record.like_count,
            dislike_count: record.dislike_count,
            viewer_reaction: record.viewer_reaction,
        }
    }

    /// Returns a copy of `record` carrying this tally
    pub fn apply_to(self, record: &CommentRecord) -> CommentRecord {
        CommentRecord {
            like_count: self.like_count,
            dislike_count: self.dislike_count,
            viewer_reaction: self.viewer_reaction,
            ..record.clone()
        }
    }

    /// Tally after the viewer switches from its current reaction to `target`
    pub fn moved_to(self, target: Reaction) -> Tally {
        let mut res = self;
        match self.viewer_reaction {
            Reaction::None => (),
            Reaction::Liked => res.like_count = res.like_count.saturating_sub(1),
            Reaction::Disliked => res.dislike_count = res.dislike_count.saturating_sub(1),
        }
        match target {
            Reaction::None => (),
            Reaction::Liked => res.like_count += 1,
            Reaction::Disliked => res.dislike_count += 1,
        }
        res.viewer_reaction = target;
        res
    }
}

impl From<VoteOutcome> for Tally {
    fn from(o: VoteOutcome) -> Tally {
        Tally {
            like_count: o.like_count,
            dislike_count: o.dislike_count,
            viewer_reaction: o.viewer_reaction,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReactionState {
    Settled(Reaction),
    Pending { target: Reaction },
}

impl ReactionState {
    pub fn is_pending(self) -> bool {
        matches!(self, ReactionState::Pending { .. })
    }

    /// Reaction currently displayed to the viewer
    pub fn shown(self) -> Reaction {
        match self {
            ReactionState::Settled(r) => r,
            ReactionState::Pending { target } => target,
        }
    }
}

/// A vote applied locally but not yet confirmed by the server
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingVote {
    pub comment: CommentId,

    /// What to restore if the server refuses the vote
    pub prior: Tally,

    /// Reaction to send to the server
    pub target: Reaction,

    /// The record as it should be displayed while waiting
    pub optimistic: CommentRecord,
}

/// Tracks optimistic votes, at most one in flight per user and comment.
#[derive(Clone, Debug, Default)]
pub struct ReactionReconciler {
    pending: HashMap<(UserId, CommentId), PendingVote>,
}

impl ReactionReconciler {
    pub fn new() -> ReactionReconciler {
        ReactionReconciler::default()
    }

    pub fn state(&self, user: UserId, record: &CommentRecord) -> ReactionState {
        match self.pending.get(&(user, record.id)) {
            Some(p) => ReactionState::Pending { target: p.target },
            None => ReactionState::Settled(record.viewer_reaction),
        }
    }

    pub fn is_pending(&self, user: UserId, comment: CommentId) -> bool {
        self.pending.contains_key(&(user, comment))
    }

    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    /// Starts a vote: computes the optimistic record and remembers how to undo it.
    ///
    /// Fails without side effects if a vote on this comment is still in flight.
    pub fn begin(
        &mut self,
        user: UserId,
        record: &CommentRecord,
        dir: Direction,
    ) -> Result<PendingVote, ConflictError> {
        match self.pending.entry((user, record.id)) {
            hash_map::Entry::Occupied(_) => {
                tracing::debug!(comment = ?record.id, ?user, "vote rejected, previous vote still in flight");
                Err(ConflictError::VoteInFlight(record.id))
            }
            hash_map::Entry::Vacant(e) => {
                let prior = Tally::of(record);
                let target = prior.viewer_reaction.toggled(dir);
                let optimistic = prior.moved_to(target).apply_to(record);
                tracing::trace!(comment = ?record.id, ?user, from = ?prior.viewer_reaction, to = ?target, "vote started");
                let vote = PendingVote {
                    comment: record.id,
                    prior,
                    target,
                    optimistic,
                };
                e.insert(vote.clone());
                Ok(vote)
            }
        }
    }

    /// Ends a vote the server accepted. The server's counts replace the local
    /// ones, correcting any drift.
    pub fn confirm(
        &mut self,
        user: UserId,
        current: &CommentRecord,
        outcome: VoteOutcome,
    ) -> Option<CommentRecord> {
        let vote = self.pending.remove(&(user, current.id))?;
        if outcome.viewer_reaction != vote.target {
            tracing::warn!(comment = ?current.id, expected = ?vote.target, got = ?outcome.viewer_reaction, "server settled on another reaction");
        }
        Some(Tally::from(outcome).apply_to(current))
    }

    /// Ends a vote the server refused, restoring the counts and reaction from
    /// before the vote
    pub fn fail(&mut self, user: UserId, current: &CommentRecord) -> Option<CommentRecord> {
        let vote = self.pending.remove(&(user, current.id))?;
        tracing::debug!(comment = ?current.id, ?user, "vote failed, rolling back");
        Some(vote.prior.apply_to(current))
    }

    /// Forgets a vote without touching any record
    pub fn discard(&mut self, user: UserId, comment: CommentId) -> Option<PendingVote> {
        self.pending.remove(&(user, comment))
    }

    /// Forgets every vote in flight, eg. when the thread is closed
    pub fn cancel_all(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(num = self.pending.len(), "dropping votes in flight");
        }
        self.pending.clear();
    }
}
