//! Comment threading: dotted-id creation and forest reconstruction.

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::karma;
use crate::models::{Comment, CommentDraft, Id, VoteTarget};
use crate::rank::RankScope;
use crate::repo::Repo;
use crate::vote::{self, hash_ip};

/// A comment with its nested replies. Built at read time, never persisted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub children: Vec<CommentNode>,
}

/// Reconstructs the nested forest from a flat snapshot of rows.
///
/// Non-roots attach to the first row whose id matches their parent_id,
/// scanning roots before other non-roots, in input order; sibling order is
/// the input order, with no re-sort. A row whose parent is absent from the
/// input is silently dropped; callers that pre-filter rows (e.g. by points)
/// lose the filtered subtrees by design. Self- or cyclic references are never
/// reachable from a root and drop out the same way.
pub fn build_forest(rows: Vec<Comment>) -> Vec<CommentNode> {
    let mut roots: Vec<Comment> = Vec::new();
    let mut others: Vec<Comment> = Vec::new();
    for row in rows {
        if row.parent_id == 0 {
            roots.push(row);
        } else {
            others.push(row);
        }
    }

    // children_of_root[i] / children_of_other[i]: indices into `others`
    // attached beneath that row, in attach (input) order.
    let mut children_of_root: Vec<Vec<usize>> = vec![Vec::new(); roots.len()];
    let mut children_of_other: Vec<Vec<usize>> = vec![Vec::new(); others.len()];

    for ci in 0..others.len() {
        let parent_id = others[ci].parent_id;
        if let Some(ri) = roots.iter().position(|r| r.id == parent_id) {
            children_of_root[ri].push(ci);
        } else if let Some(oi) = others.iter().position(|o| o.id == parent_id) {
            children_of_other[oi].push(ci);
        }
        // No match: parent missing from the snapshot, row is dropped.
    }

    fn materialize(
        idx: usize,
        others: &[Comment],
        children_of_other: &[Vec<usize>],
    ) -> CommentNode {
        CommentNode {
            comment: others[idx].clone(),
            children: children_of_other[idx]
                .iter()
                .map(|&ci| materialize(ci, others, children_of_other))
                .collect(),
        }
    }

    roots
        .into_iter()
        .enumerate()
        .map(|(ri, root)| CommentNode {
            comment: root,
            children: children_of_root[ri]
                .iter()
                .map(|&ci| materialize(ci, &others, &children_of_other))
                .collect(),
        })
        .collect()
}

/// Loads a story's published comments and builds the forest. Rows below
/// `min_points` are filtered out before the build, dropping their subtrees.
pub async fn story_forest(
    repo: &dyn Repo,
    story_id: Id,
    min_points: Option<i64>,
) -> Result<Vec<CommentNode>, ApiError> {
    // Surface NotFound for a missing story rather than an empty forest.
    repo.get_story(story_id).await?;
    let mut rows = repo.list_story_comments(story_id).await?;
    if let Some(min) = min_points {
        rows.retain(|c| c.points >= min);
    }
    Ok(build_forest(rows))
}

/// Creates a comment under a story (optionally under a parent comment),
/// deriving the dotted ancestor path, and refreshes the story's comment
/// count and comment ranks.
pub async fn create_comment(
    repo: &dyn Repo,
    story_id: Id,
    parent_id: Id,
    text: String,
    user_id: Id,
    ip: &str,
) -> Result<Comment, ApiError> {
    let user = repo.get_user(user_id).await?;
    if !karma::can_comment(user.points) {
        return Err(ApiError::not_authorized(
            "Sorry",
            "You need to be registered and have more than 0 points to comment.",
        ));
    }

    if text.len() < 5 {
        return Err(ApiError::bad_request(
            "Comment too short",
            "Your comment is too short. Please try to post substantive comments which others will find useful.",
        ));
    }
    if text.len() > 5000 {
        return Err(ApiError::bad_request("Comment too long", "Your comment is too long."));
    }

    let story = repo.get_story(story_id).await?;

    // dotted_ids is always parent path + parent id + trailing dot; "" for
    // roots. Derived once at create so reads never walk ancestors.
    let dotted_ids = if parent_id > 0 {
        let parent = repo.get_comment(parent_id).await?;
        if parent.story_id != story.id {
            return Err(ApiError::NotFound);
        }
        format!("{}{}.", parent.dotted_ids, parent.id)
    } else {
        String::new()
    };

    let comment = repo
        .create_comment(CommentDraft {
            story_id: story.id,
            story_name: story.name.clone(),
            user_id: user.id,
            user_name: user.name.clone(),
            parent_id,
            dotted_ids,
            text,
        })
        .await?;

    log::info!("created comment {} on story {}", comment.id, story.id);
    metrics::counter!("rnb_comments_created_total", 1);

    // The author's own ledger row for the implicit first point.
    repo.insert_vote(VoteTarget::Comment(comment.id), user.id, &hash_ip(ip), 1)
        .await?;

    vote::refresh_comment_count(repo, story.id).await?;
    vote::rerank(repo, RankScope::StoryComments(story.id)).await;

    Ok(comment)
}
