use std::fmt::Write;

use agora_client::{
    api::{Reaction, Time},
    walk, ThreadNode, Visibility,
};

const INDENT: &str = "    ";

fn format_time(t: &Time) -> String {
    t.format("%Y-%m-%d %H:%M").to_string()
}

fn header(node: &ThreadNode) -> String {
    let r = &node.record;
    let mut res = format!(
        "#{} {} · {}",
        r.id.0,
        r.author_display_name,
        format_time(&r.created_at)
    );
    if r.is_edited() && !r.is_deleted {
        res.push_str(" (edited)");
    }
    // writing to a String cannot fail
    let _ = write!(res, " +{} -{}", r.like_count, r.dislike_count);
    match r.viewer_reaction {
        Reaction::None => (),
        Reaction::Liked => res.push_str(" [liked]"),
        Reaction::Disliked => res.push_str(" [disliked]"),
    }
    if node.visibility == Visibility::HiddenBadge {
        res.push_str(" [hidden]");
    }
    res
}

/// Renders a filtered forest as indented text, one block per comment
pub fn render(forest: &[ThreadNode]) -> String {
    let mut out = String::new();
    for node in walk(forest) {
        let indent = INDENT.repeat(node.depth);
        let _ = writeln!(out, "{indent}{}", header(node));
        for line in node.record.content.lines() {
            let _ = writeln!(out, "{indent}  {line}");
        }
    }
    if out.is_empty() {
        out.push_str("(no comments)\n");
    }
    out
}
