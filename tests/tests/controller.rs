use std::future::Future;

use agora_api::{
    CommentId, ConflictError, Direction, Error, PostId, Reaction, RemoteError, Role,
    ValidationError, Viewer, MAX_CONTENT_LEN,
};
use agora_client::{
    find_in, walk, ReactionState, ThreadController, ThreadNode, Visibility, DELETED_PLACEHOLDER,
    HIDDEN_PLACEHOLDER,
};
use agora_mock_server::{Call, MockRemote, MockServer};

fn run<F: Future>(f: F) -> F::Output {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt::try_init();
    }
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed initializing tokio runtime")
        .block_on(f)
}

struct Fixture {
    remote: MockRemote,
    post: PostId,
    alice: Viewer,
    bob: Viewer,
    moderator: Viewer,

    /// Top-level comment by alice
    a: CommentId,

    /// Reply to `a` by bob
    b: CommentId,

    /// Top-level comment by bob, posted after `a`
    c: CommentId,
}

impl Fixture {
    fn new() -> Fixture {
        let mut server = MockServer::new();
        let alice = server.test_add_user("alice", Some("앨리스"), Role::User);
        let bob = server.test_add_user("bob", None, Role::User);
        let moderator = server.test_add_user("mod", None, Role::Moderator);
        let post = server.test_add_post();
        let a = server.test_add_comment(post, None, &alice, "first");
        let b = server.test_add_comment(post, Some(a), &bob, "reply to first");
        let c = server.test_add_comment(post, None, &bob, "second");
        Fixture {
            remote: MockRemote::new(server),
            post,
            alice,
            bob,
            moderator,
            a,
            b,
            c,
        }
    }

    fn controller(&self) -> ThreadController<MockRemote> {
        ThreadController::new(self.post, self.remote.clone())
    }

    /// Sets likes and dislikes of `comment` by adding throwaway voters
    fn seed_votes(&self, comment: CommentId, likes: usize, dislikes: usize) {
        let mut server = self.remote.server();
        for i in 0..likes + dislikes {
            let voter = server.test_add_user(&format!("voter{i}"), None, Role::User);
            let reaction = match i < likes {
                true => Reaction::Liked,
                false => Reaction::Disliked,
            };
            server
                .vote_comment(&voter, comment, reaction)
                .expect("seeding votes");
        }
    }
}

fn node(forest: &[ThreadNode], id: CommentId) -> &ThreadNode {
    find_in(forest, id).unwrap_or_else(|| panic!("comment {id:?} is not in the tree"))
}

fn counts(forest: &[ThreadNode], id: CommentId) -> (u64, u64, Reaction) {
    let r = &node(forest, id).record;
    (r.like_count, r.dislike_count, r.viewer_reaction)
}

#[test]
fn load_builds_the_reply_tree() {
    let f = Fixture::new();
    let ctl = f.controller();
    let forest = run(ctl.load_thread(&f.bob)).unwrap();
    let ids = forest.iter().map(|n| n.id()).collect::<Vec<_>>();
    assert_eq!(ids, vec![f.a, f.c]);
    assert_eq!(forest[0].children.len(), 1);
    assert_eq!(forest[0].children[0].id(), f.b);
    assert_eq!(forest[0].children[0].depth, 1);
    assert_eq!(forest[0].record.author_display_name, "앨리스");
    assert_eq!(f.remote.calls(), vec![Call::Fetch(f.post)]);
}

#[test]
fn operations_need_a_loaded_thread() {
    let f = Fixture::new();
    let ctl = f.controller();
    assert_eq!(
        ctl.view(&f.bob),
        Err(Error::Validation(ValidationError::NotLoaded))
    );
    assert_eq!(
        run(ctl.vote(&f.bob, f.a, Direction::Like)),
        Err(Error::Validation(ValidationError::NotLoaded))
    );
    assert_eq!(f.remote.num_calls(), 0);
}

#[test]
fn reply_shows_up_once_confirmed() {
    let f = Fixture::new();
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.alice).await.unwrap();
        let (created, during) = futures::join!(
            ctl.submit_reply(&f.alice, Some(f.b), "  deeper  "),
            async { ctl.view(&f.alice).unwrap() },
        );
        let created = created.unwrap();
        assert_eq!(walk(&during).count(), 3, "nothing is inserted before the server answers");
        assert_eq!(created.content, "deeper");
        assert_eq!(created.parent_id, Some(f.b));

        let forest = ctl.view(&f.alice).unwrap();
        let n = node(&forest, created.id);
        assert_eq!(n.depth, 2);
        assert_eq!(node(&forest, f.b).children[0].id(), created.id);

        let top = ctl.submit_reply(&f.alice, None, "new thread").await.unwrap();
        let forest = ctl.view(&f.alice).unwrap();
        assert_eq!(forest.last().map(|n| n.id()), Some(top.id));
    });
}

#[test]
fn invalid_replies_never_reach_the_server() {
    let f = Fixture::new();
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.alice).await.unwrap();
        let calls = f.remote.num_calls();
        assert_eq!(
            ctl.submit_reply(&f.alice, None, " \n\t ").await,
            Err(Error::Validation(ValidationError::EmptyContent))
        );
        assert!(matches!(
            ctl.submit_reply(&f.alice, None, &"x".repeat(MAX_CONTENT_LEN + 1))
                .await,
            Err(Error::Validation(ValidationError::ContentTooLong { .. }))
        ));
        assert_eq!(
            ctl.submit_reply(&f.alice, Some(CommentId(9999)), "hi").await,
            Err(Error::Validation(ValidationError::UnknownComment(CommentId(
                9999
            ))))
        );
        assert_eq!(
            ctl.submit_reply(&Viewer::anonymous(), None, "hi").await,
            Err(Error::Remote(RemoteError::Unauthorized))
        );
        assert_eq!(f.remote.num_calls(), calls);
    });
}

#[test]
fn replies_to_deleted_or_hidden_comments_are_refused() {
    let f = Fixture::new();
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.moderator).await.unwrap();
        ctl.delete_own(&f.moderator, f.c).await.unwrap();
        ctl.set_hidden(&f.moderator, f.b, true).await.unwrap();
        let calls = f.remote.num_calls();
        assert_eq!(
            ctl.submit_reply(&f.moderator, Some(f.c), "hi").await,
            Err(Error::Validation(ValidationError::ReplyToDeleted(f.c)))
        );
        assert_eq!(
            ctl.submit_reply(&f.moderator, Some(f.b), "hi").await,
            Err(Error::Validation(ValidationError::ReplyToHidden(f.b)))
        );
        assert_eq!(f.remote.num_calls(), calls);
    });
}

#[test]
fn edit_is_for_the_author_only() {
    let f = Fixture::new();
    f.seed_votes(f.a, 2, 1);
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.alice).await.unwrap();
        assert_eq!(
            ctl.edit_own(&f.bob, f.a, "mine now").await,
            Err(Error::Validation(ValidationError::NotAuthor(f.a)))
        );
        let edited = ctl.edit_own(&f.alice, f.a, "first, edited").await.unwrap();
        assert_eq!(edited.content, "first, edited");
        assert!(edited.is_edited());
        let forest = ctl.view(&f.alice).unwrap();
        assert_eq!(node(&forest, f.a).record.content, "first, edited");
        assert_eq!(counts(&forest, f.a), (2, 1, Reaction::None));
    });
}

#[test]
fn answers_about_another_post_are_refused() {
    let f = Fixture::new();
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.bob).await.unwrap();
        {
            let mut server = f.remote.server();
            let elsewhere = server.test_add_post();
            server.test_move_comment(f.c, elsewhere);
        }
        assert!(matches!(
            ctl.edit_own(&f.bob, f.c, "moved away").await,
            Err(Error::Remote(RemoteError::Malformed(_)))
        ));
        let forest = ctl.view(&f.bob).unwrap();
        assert_eq!(node(&forest, f.c).record.content, "second");
        assert!(!node(&forest, f.c).record.is_edited());
    });
}

#[test]
fn deleted_comment_keeps_its_replies() {
    let f = Fixture::new();
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.alice).await.unwrap();
        assert_eq!(
            ctl.delete_own(&f.bob, f.a).await,
            Err(Error::Validation(ValidationError::NotAuthor(f.a)))
        );
        ctl.delete_own(&f.alice, f.a).await.unwrap();
        assert_eq!(
            ctl.delete_own(&f.alice, f.a).await,
            Err(Error::Validation(ValidationError::AlreadyDeleted(f.a)))
        );
        assert_eq!(
            ctl.edit_own(&f.alice, f.a, "back").await,
            Err(Error::Validation(ValidationError::AlreadyDeleted(f.a)))
        );

        for forest in [
            ctl.view(&f.bob).unwrap(),
            ctl.load_thread(&f.bob).await.unwrap(),
        ] {
            let parent = node(&forest, f.a);
            assert_eq!(parent.visibility, Visibility::Deleted);
            assert_eq!(parent.record.content, DELETED_PLACEHOLDER);
            let reply = node(&forest, f.b);
            assert_eq!(reply.visibility, Visibility::Visible);
            assert_eq!(reply.record.content, "reply to first");
            assert_eq!(reply.depth, 1);
        }
    });
}

#[test]
fn vote_is_applied_right_away() {
    let f = Fixture::new();
    f.seed_votes(f.a, 3, 1);
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.bob).await.unwrap();
        let (res, during, state) = futures::join!(
            ctl.vote(&f.bob, f.a, Direction::Like),
            async { ctl.view(&f.bob).unwrap() },
            async { ctl.reaction_state(&f.bob, f.a).unwrap() },
        );
        assert_eq!(counts(&during, f.a), (4, 1, Reaction::Liked));
        assert_eq!(
            state,
            ReactionState::Pending {
                target: Reaction::Liked
            }
        );
        let confirmed = res.unwrap();
        assert_eq!(confirmed.like_count, 4);
        assert_eq!(
            ctl.reaction_state(&f.bob, f.a).unwrap(),
            ReactionState::Settled(Reaction::Liked)
        );

        // clicking like again removes the like
        let undone = ctl.vote(&f.bob, f.a, Direction::Like).await.unwrap();
        assert_eq!(
            (undone.like_count, undone.dislike_count, undone.viewer_reaction),
            (3, 1, Reaction::None)
        );
    });
    assert_eq!(
        f.remote
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Vote(..)))
            .collect::<Vec<_>>(),
        vec![Call::Vote(f.a, Reaction::Liked), Call::Vote(f.a, Reaction::None)]
    );
}

#[test]
fn failed_vote_is_rolled_back() {
    let f = Fixture::new();
    f.seed_votes(f.a, 3, 0);
    f.remote
        .server()
        .vote_comment(&f.bob, f.a, Reaction::Disliked)
        .unwrap();
    let ctl = f.controller();
    run(async {
        let forest = ctl.load_thread(&f.bob).await.unwrap();
        assert_eq!(counts(&forest, f.a), (3, 1, Reaction::Disliked));

        f.remote.fail_next(RemoteError::Network(String::from("timed out")));
        let (res, during) = futures::join!(ctl.vote(&f.bob, f.a, Direction::Like), async {
            ctl.view(&f.bob).unwrap()
        });
        assert_eq!(counts(&during, f.a), (4, 0, Reaction::Liked));
        let err = res.unwrap_err();
        assert_eq!(
            err,
            Error::Remote(RemoteError::Network(String::from("timed out")))
        );
        assert!(err.is_transient());

        let forest = ctl.view(&f.bob).unwrap();
        assert_eq!(counts(&forest, f.a), (3, 1, Reaction::Disliked));
        assert_eq!(
            ctl.reaction_state(&f.bob, f.a).unwrap(),
            ReactionState::Settled(Reaction::Disliked)
        );
    });
}

#[test]
fn second_vote_while_pending_is_rejected() {
    let f = Fixture::new();
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.bob).await.unwrap();
        let (first, second) = futures::join!(
            ctl.vote(&f.bob, f.a, Direction::Like),
            ctl.vote(&f.bob, f.a, Direction::Dislike),
        );
        assert_eq!(first.unwrap().viewer_reaction, Reaction::Liked);
        let second = second.unwrap_err();
        assert_eq!(second, Error::Conflict(ConflictError::VoteInFlight(f.a)));
        assert!(second.is_transient());

        // other comments are not blocked
        let (on_a, on_c) = futures::join!(
            ctl.vote(&f.bob, f.a, Direction::Dislike),
            ctl.vote(&f.bob, f.c, Direction::Dislike),
        );
        assert_eq!(on_a.unwrap().viewer_reaction, Reaction::Disliked);
        assert_eq!(on_c.unwrap().viewer_reaction, Reaction::Disliked);
    });
    let votes = f
        .remote
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Vote(..)))
        .count();
    assert_eq!(votes, 3);
}

#[test]
fn server_counts_replace_the_optimistic_ones() {
    let f = Fixture::new();
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.bob).await.unwrap();
        let (res, ()) = futures::join!(ctl.vote(&f.bob, f.c, Direction::Like), async {
            // someone else likes the comment while bob's vote is in flight
            f.seed_votes(f.c, 1, 0);
        });
        let confirmed = res.unwrap();
        assert_eq!(confirmed.like_count, 2);
        let forest = ctl.view(&f.bob).unwrap();
        assert_eq!(counts(&forest, f.c), (2, 0, Reaction::Liked));
    });
}

#[test]
fn anonymous_viewers_cannot_act() {
    let f = Fixture::new();
    let ctl = f.controller();
    let anon = Viewer::anonymous();
    run(async {
        let forest = ctl.load_thread(&anon).await.unwrap();
        assert_eq!(walk(&forest).count(), 3);
        let calls = f.remote.num_calls();
        for err in [
            ctl.vote(&anon, f.a, Direction::Like).await.unwrap_err(),
            ctl.edit_own(&anon, f.a, "x").await.unwrap_err(),
            ctl.delete_own(&anon, f.a).await.unwrap_err(),
            ctl.report(&anon, f.a, "spam", None).await.unwrap_err(),
            ctl.set_hidden(&anon, f.a, true).await.unwrap_err(),
        ] {
            assert!(err.needs_login(), "{err:?}");
        }
        assert_eq!(f.remote.num_calls(), calls);
    });
}

#[test]
fn answers_after_leaving_are_dropped() {
    let f = Fixture::new();
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.bob).await.unwrap();
        let (vote, reply, ()) = futures::join!(
            ctl.vote(&f.bob, f.a, Direction::Like),
            ctl.submit_reply(&f.bob, Some(f.a), "too late"),
            async { ctl.leave() },
        );
        assert_eq!(
            vote,
            Err(Error::Conflict(ConflictError::ThreadClosed(f.post)))
        );
        assert_eq!(
            reply,
            Err(Error::Conflict(ConflictError::ThreadClosed(f.post)))
        );
        assert!(!ctl.is_open());
        assert_eq!(
            ctl.view(&f.bob),
            Err(Error::Validation(ValidationError::NotLoaded))
        );

        // the server still processed both requests
        ctl.load_thread(&f.bob).await.unwrap();

        // answers to a previous visit are not applied to the next one
        let (vote, forest) = futures::join!(ctl.vote(&f.bob, f.c, Direction::Like), async {
            ctl.leave();
            ctl.load_thread(&f.bob).await.unwrap()
        });
        assert_eq!(
            vote,
            Err(Error::Conflict(ConflictError::ThreadClosed(f.post)))
        );
        assert!(!ctl.reaction_state(&f.bob, f.c).unwrap().is_pending());
        assert_eq!(counts(&forest, f.a), (1, 0, Reaction::Liked));
        assert_eq!(counts(&forest, f.c), (1, 0, Reaction::Liked));
        assert_eq!(walk(&forest).count(), 4);
    });
}

#[test]
fn vanished_comment_is_retired() {
    let f = Fixture::new();
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.bob).await.unwrap();
        f.remote.server().test_purge_comment(f.a);
        assert_eq!(
            ctl.vote(&f.bob, f.a, Direction::Like).await,
            Err(Error::Remote(RemoteError::NotFound))
        );
        let calls = f.remote.num_calls();
        assert_eq!(
            ctl.vote(&f.bob, f.a, Direction::Like).await,
            Err(Error::Validation(ValidationError::UnknownComment(f.a)))
        );
        assert_eq!(
            ctl.submit_reply(&f.bob, Some(f.a), "hello?").await,
            Err(Error::Validation(ValidationError::UnknownComment(f.a)))
        );
        assert_eq!(f.remote.num_calls(), calls);

        // still displayed, with its vote rolled back, and its reply still usable
        let forest = ctl.view(&f.bob).unwrap();
        assert_eq!(counts(&forest, f.a), (0, 0, Reaction::None));
        assert_eq!(node(&forest, f.a).children[0].id(), f.b);
        ctl.vote(&f.bob, f.b, Direction::Like).await.unwrap();
    });
}

#[test]
fn vanished_post_closes_the_thread() {
    let f = Fixture::new();
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.bob).await.unwrap();
        f.remote.server().test_remove_post(f.post);
        assert_eq!(
            ctl.load_thread(&f.bob).await,
            Err(Error::Remote(RemoteError::NotFound))
        );
        assert!(!ctl.is_open());
    });
}

#[test]
fn hiding_depends_on_the_viewer_role() {
    let f = Fixture::new();
    f.seed_votes(f.c, 2, 2);
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.moderator).await.unwrap();
        let calls = f.remote.num_calls();
        assert_eq!(
            ctl.set_hidden(&f.bob, f.c, true).await,
            Err(Error::Validation(ValidationError::NotModerator))
        );
        assert_eq!(f.remote.num_calls(), calls);

        let hidden = ctl.set_hidden(&f.moderator, f.c, true).await.unwrap();
        assert!(hidden.is_hidden);
        assert_eq!((hidden.like_count, hidden.dislike_count), (2, 2));

        let as_moderator = ctl.view(&f.moderator).unwrap();
        assert_eq!(node(&as_moderator, f.c).visibility, Visibility::HiddenBadge);
        assert_eq!(node(&as_moderator, f.c).record.content, "second");

        let as_user = ctl.view(&f.bob).unwrap();
        assert_eq!(node(&as_user, f.c).visibility, Visibility::Hidden);
        assert_eq!(node(&as_user, f.c).record.content, HIDDEN_PLACEHOLDER);
        assert_eq!(counts(&as_user, f.c).0, 2);

        ctl.set_hidden(&f.moderator, f.c, false).await.unwrap();
        let as_user = ctl.view(&f.bob).unwrap();
        assert_eq!(node(&as_user, f.c).visibility, Visibility::Visible);
    });
}

#[test]
fn reports_hide_comments_past_the_threshold() {
    let f = Fixture::new();
    let reporters = {
        let mut server = f.remote.server();
        (0..3)
            .map(|i| server.test_add_user(&format!("reporter{i}"), None, Role::User))
            .collect::<Vec<_>>()
    };
    let ctl = f.controller();
    run(async {
        ctl.load_thread(&f.bob).await.unwrap();
        assert_eq!(
            ctl.report(&reporters[0], f.a, "   ", None).await,
            Err(Error::Validation(ValidationError::EmptyReportReason))
        );
        for r in &reporters {
            ctl.report(r, f.a, "spam", Some("selling things"))
                .await
                .unwrap();
        }
        assert!(matches!(
            ctl.report(&reporters[0], f.a, "spam", None).await,
            Err(Error::Remote(RemoteError::Server(_)))
        ));
        assert_eq!(f.remote.server().test_num_reports(f.a), 3);

        let forest = ctl.load_thread(&f.bob).await.unwrap();
        assert_eq!(node(&forest, f.a).visibility, Visibility::Hidden);
    });
}
