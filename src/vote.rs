//! Vote ledger: one vote/flag per (item, user), karma flowing to the item's
//! author, rank refresh over the affected scope.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::karma;
use crate::models::{Id, VoteTarget};
use crate::rank::RankScope;
use crate::repo::{Repo, RepoError};

/// Items whose points fall below this are hidden; further negative votes are
/// rejected.
pub const HIDDEN_THRESHOLD: i64 = -5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Up,
    Down,
    Flag,
}

impl VoteKind {
    pub fn delta(self) -> i64 {
        match self {
            VoteKind::Up => 1,
            VoteKind::Down => -1,
            VoteKind::Flag => -5,
        }
    }

    fn allowed(self, voter_points: i64) -> bool {
        match self {
            VoteKind::Up => karma::can_upvote(voter_points),
            VoteKind::Down => karma::can_downvote(voter_points),
            VoteKind::Flag => karma::can_flag(voter_points),
        }
    }
}

/// Anonymised voter IP for the ledger: sha256, url-safe base64.
pub fn hash_ip(ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    URL_SAFE.encode(hasher.finalize())
}

/// Casts a vote on a story. Returns the story's new points.
///
/// Effect order: eligibility and hidden gates, ledger insert (the duplicate
/// check is a unique-constraint conflict, not a read), flag burn on the voter,
/// atomic point bump, author karma, scope rerank. The rerank is a derived
/// value; its failure is logged and the vote stands.
pub async fn cast_story_vote(
    repo: &dyn Repo,
    story_id: Id,
    voter_id: Id,
    ip: &str,
    kind: VoteKind,
) -> Result<i64, ApiError> {
    let story = repo.get_story(story_id).await?;
    let voter = repo.get_user(voter_id).await?;
    let delta = kind.delta();

    if !kind.allowed(voter.points) {
        return Err(ApiError::InsufficientKarma);
    }
    if story.points < HIDDEN_THRESHOLD && delta < 0 {
        return Err(ApiError::ItemHidden);
    }

    record_vote(repo, VoteTarget::Story(story_id), &voter, ip, kind).await?;

    let new_points = repo.bump_story_points(story_id, delta).await?;
    repo.adjust_user_points(story.user_id, delta).await?;

    metrics::counter!("rnb_votes_total", 1, "target" => "story");
    rerank(repo, RankScope::Stories).await;
    Ok(new_points)
}

/// Casts a vote on a comment. Returns the comment's new points.
pub async fn cast_comment_vote(
    repo: &dyn Repo,
    comment_id: Id,
    voter_id: Id,
    ip: &str,
    kind: VoteKind,
) -> Result<i64, ApiError> {
    let comment = repo.get_comment(comment_id).await?;
    let voter = repo.get_user(voter_id).await?;
    let delta = kind.delta();

    if !kind.allowed(voter.points) {
        return Err(ApiError::InsufficientKarma);
    }
    if comment.points < HIDDEN_THRESHOLD && delta < 0 {
        return Err(ApiError::ItemHidden);
    }

    record_vote(repo, VoteTarget::Comment(comment_id), &voter, ip, kind).await?;

    let new_points = repo.bump_comment_points(comment_id, delta).await?;
    repo.adjust_user_points(comment.user_id, delta).await?;

    // Negative votes can push a comment out of the >0 count filter.
    if delta < 0 {
        if let Err(e) = refresh_comment_count(repo, comment.story_id).await {
            log::warn!("comment count refresh failed for story {}: {e}", comment.story_id);
        }
    }

    metrics::counter!("rnb_votes_total", 1, "target" => "comment");
    rerank(repo, RankScope::StoryComments(comment.story_id)).await;
    Ok(new_points)
}

/// Ledger insert plus the flag cost. Flagging burns one of the voter's own
/// points, debited between the duplicate check and the point mutation.
async fn record_vote(
    repo: &dyn Repo,
    target: VoteTarget,
    voter: &crate::models::User,
    ip: &str,
    kind: VoteKind,
) -> Result<(), ApiError> {
    repo.insert_vote(target, voter.id, &hash_ip(ip), kind.delta())
        .await
        .map_err(|e| match e {
            RepoError::Conflict => ApiError::AlreadyVoted,
            e => e.into(),
        })?;
    if kind == VoteKind::Flag {
        repo.adjust_user_points(voter.id, -1).await?;
    }
    Ok(())
}

/// Recounts a story's comments with points > 0.
pub async fn refresh_comment_count(repo: &dyn Repo, story_id: Id) -> Result<(), ApiError> {
    let count = repo.count_positive_comments(story_id).await?;
    repo.set_story_comment_count(story_id, count).await?;
    Ok(())
}

/// Scope-wide rank refresh. Stale ranks self-heal on the next trigger, so a
/// failure here never fails the caller.
pub async fn rerank(repo: &dyn Repo, scope: RankScope) {
    if let Err(e) = repo.recompute_ranks(scope).await {
        log::warn!("rank recompute failed for {scope:?}: {e}");
    }
}
