use std::path::PathBuf;

use agora_client::{
    api::{self, AuthToken, CommentId, Direction, PostId, Role, UserId, Viewer},
    apply_visibility, build_tree, ThreadController,
};
use anyhow::Context;

mod http;
mod render;

use http::HttpRemote;

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, default_value = "http://localhost:8000/api/v1")]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Display the comments of a post
    Show { post: i64 },

    /// Post a comment, or a reply if `--parent` is set
    Reply {
        post: i64,

        #[structopt(long)]
        parent: Option<i64>,

        content: String,
    },

    /// Edit one of your comments
    Edit {
        post: i64,
        comment: i64,
        content: String,
    },

    /// Delete one of your comments, or any comment for moderators
    Delete { post: i64, comment: i64 },

    /// Like or dislike a comment, voting the same way twice removes the vote
    Vote {
        post: i64,
        comment: i64,

        /// `like` or `dislike`
        direction: Direction,
    },

    /// Hide a comment from regular users (moderators only)
    Hide {
        post: i64,
        comment: i64,

        /// Make the comment visible again instead
        #[structopt(long)]
        undo: bool,
    },

    /// Report a comment to the moderators
    Report {
        post: i64,
        comment: i64,
        reason: String,

        #[structopt(long)]
        description: Option<String>,
    },

    /// Print the comments of a post as JSON, as the backend sends them
    Dump { post: i64 },

    /// Display comments from a JSON file, without contacting the server
    Render {
        file: PathBuf,

        /// Display as seen by a user with this role
        #[structopt(long, default_value = "user")]
        role: Role,
    },
}

/// Builds the viewer from `AGORA_TOKEN`, `AGORA_USER_ID` and `AGORA_ROLE`.
/// Without a token, the viewer is anonymous.
fn viewer() -> anyhow::Result<Viewer> {
    let token = match std::env::var("AGORA_TOKEN") {
        Ok(t) => AuthToken(t),
        Err(std::env::VarError::NotPresent) => return Ok(Viewer::anonymous()),
        Err(e) => return Err(e).context("retrieving AGORA_TOKEN environment variable"),
    };
    let id = std::env::var("AGORA_USER_ID")
        .context("retrieving AGORA_USER_ID environment variable")?
        .parse::<i64>()
        .context("parsing AGORA_USER_ID as a user id")?;
    let role = match std::env::var("AGORA_ROLE") {
        Ok(r) => r
            .parse::<Role>()
            .map_err(anyhow::Error::msg)
            .context("parsing AGORA_ROLE")?,
        Err(std::env::VarError::NotPresent) => Role::User,
        Err(e) => return Err(e).context("retrieving AGORA_ROLE environment variable"),
    };
    Ok(Viewer::user(UserId(id), token).with_role(role))
}

async fn open(
    host: &str,
    viewer: &Viewer,
    post: i64,
) -> anyhow::Result<ThreadController<HttpRemote>> {
    let ctl = ThreadController::new(PostId(post), HttpRemote::new(host.to_string()));
    ctl.load_thread(viewer)
        .await
        .with_context(|| format!("loading comments of post {post}"))?;
    Ok(ctl)
}

fn show(ctl: &ThreadController<HttpRemote>, viewer: &Viewer) -> anyhow::Result<()> {
    let forest = ctl.view(viewer)?;
    print!("{}", render::render(&forest));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();

    match opt.cmd {
        Command::Show { post } => {
            let viewer = viewer()?;
            let ctl = open(&opt.host, &viewer, post).await?;
            show(&ctl, &viewer)?;
        }
        Command::Reply {
            post,
            parent,
            content,
        } => {
            let viewer = viewer()?;
            let ctl = open(&opt.host, &viewer, post).await?;
            let c = ctl
                .submit_reply(&viewer, parent.map(CommentId), &content)
                .await
                .context("posting comment")?;
            println!("posted comment #{}", c.id.0);
        }
        Command::Edit {
            post,
            comment,
            content,
        } => {
            let viewer = viewer()?;
            let ctl = open(&opt.host, &viewer, post).await?;
            ctl.edit_own(&viewer, CommentId(comment), &content)
                .await
                .with_context(|| format!("editing comment {comment}"))?;
            show(&ctl, &viewer)?;
        }
        Command::Delete { post, comment } => {
            let viewer = viewer()?;
            let ctl = open(&opt.host, &viewer, post).await?;
            ctl.delete_own(&viewer, CommentId(comment))
                .await
                .with_context(|| format!("deleting comment {comment}"))?;
            show(&ctl, &viewer)?;
        }
        Command::Vote {
            post,
            comment,
            direction,
        } => {
            let viewer = viewer()?;
            let ctl = open(&opt.host, &viewer, post).await?;
            let c = ctl
                .vote(&viewer, CommentId(comment), direction)
                .await
                .with_context(|| format!("voting on comment {comment}"))?;
            println!(
                "comment #{}: +{} -{} ({})",
                c.id.0,
                c.like_count,
                c.dislike_count,
                c.viewer_reaction.as_str()
            );
        }
        Command::Hide {
            post,
            comment,
            undo,
        } => {
            let viewer = viewer()?;
            let ctl = open(&opt.host, &viewer, post).await?;
            ctl.set_hidden(&viewer, CommentId(comment), !undo)
                .await
                .with_context(|| format!("changing visibility of comment {comment}"))?;
            show(&ctl, &viewer)?;
        }
        Command::Report {
            post,
            comment,
            reason,
            description,
        } => {
            let viewer = viewer()?;
            let ctl = open(&opt.host, &viewer, post).await?;
            ctl.report(&viewer, CommentId(comment), &reason, description.as_deref())
                .await
                .with_context(|| format!("reporting comment {comment}"))?;
            println!("reported comment #{comment}");
        }
        Command::Dump { post } => {
            let viewer = viewer()?;
            let ctl = open(&opt.host, &viewer, post).await?;
            let comments = ctl.records()?;
            let wire = comments
                .iter()
                .map(|c| api::wire::WireComment::from(&**c))
                .collect::<Vec<_>>();
            println!("{}", serde_json::to_string_pretty(&wire)?);
        }
        Command::Render { file, role } => {
            let data = std::fs::read(&file)
                .with_context(|| format!("reading comments from {file:?}"))?;
            let wire: Vec<api::wire::WireComment> =
                serde_json::from_slice(&data).context("parsing comments")?;
            let records = api::wire::normalize_comments(wire).context("normalizing comments")?;
            let forest = apply_visibility(
                build_tree(records.into_iter().map(std::sync::Arc::new)),
                role,
            );
            print!("{}", render::render(&forest));
        }
    }

    Ok(())
}
