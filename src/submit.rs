//! Story submission: validation, URL normalization, duplicate redirect.

use crate::dedup;
use crate::error::ApiError;
use crate::karma;
use crate::models::{NewStory, Story, VoteTarget};
use crate::rank::RankScope;
use crate::repo::Repo;
use crate::vote::{self, cast_story_vote, hash_ip, VoteKind};

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 100;
const URL_MIN: usize = 5;
const URL_MAX: usize = 666;

/// Submits a story. A submission whose normalized URL already exists becomes
/// an upvote on the existing story (subject to every vote rule); the existing
/// story is returned. Otherwise the story is created with points=1 and the
/// submitter's implicit self-vote is recorded in the ledger.
pub async fn submit_story(
    repo: &dyn Repo,
    new: NewStory,
    user_id: i64,
    ip: &str,
) -> Result<Story, ApiError> {
    let user = repo.get_user(user_id).await?;
    if !karma::can_submit(user.points) {
        return Err(ApiError::not_authorized(
            "Sorry",
            "You need to be registered and have more than 0 points to submit stories.",
        ));
    }

    validate(&new)?;

    let new = NewStory { url: dedup::normalize_url(&new.url), ..new };

    if let Some(existing) = dedup::find_duplicate(repo, &new.url).await? {
        return match cast_story_vote(repo, existing.id, user.id, ip, VoteKind::Up).await {
            // Submitting a link you already voted for lands you on the story.
            Ok(_) | Err(ApiError::AlreadyVoted) => Ok(repo.get_story(existing.id).await?),
            Err(e) => Err(e),
        };
    }

    let story = repo.create_story(new, &user).await?;
    log::info!("created story {}", story.id);
    metrics::counter!("rnb_stories_created_total", 1);

    // Ledger row for the implicit self-vote; points already start at 1.
    repo.insert_vote(VoteTarget::Story(story.id), user.id, &hash_ip(ip), 1)
        .await?;

    vote::rerank(repo, RankScope::Stories).await;
    Ok(story)
}

fn validate(new: &NewStory) -> Result<(), ApiError> {
    if new.name.len() < NAME_MIN {
        return Err(ApiError::bad_request(
            "Invalid Name",
            "The name must be over 2 characters",
        ));
    }
    if new.name.len() > NAME_MAX {
        return Err(ApiError::bad_request(
            "Name too long",
            "The name of your story is too long, the maximum length is 100 characters.",
        ));
    }
    // An empty URL is allowed (text/Ask posts); a present one must be sane.
    if !new.url.is_empty() {
        if new.url.len() < URL_MIN {
            return Err(ApiError::bad_request(
                "Invalid URL",
                "The URL must be over 5 characters",
            ));
        }
        if new.url.len() > URL_MAX {
            return Err(ApiError::bad_request(
                "URL too long",
                "The URL of your story is too long, the maximum is 666.",
            ));
        }
        if !new.url.starts_with("http://") && !new.url.starts_with("https://") {
            return Err(ApiError::bad_request(
                "Invalid URL",
                "The URL must have scheme https:// or http://",
            ));
        }
    }
    Ok(())
}
