//! Karma thresholds gating privileged actions.
//!
//! Karma is credited to an item's author when the item is voted on, and
//! burned by negative actions (flagging costs the flagger a point). The
//! thresholds below are the one canonical policy; earlier revisions of the
//! board drifted between several values.

pub const SUBMIT_THRESHOLD: i64 = 0;
pub const COMMENT_THRESHOLD: i64 = 0;
pub const UPVOTE_THRESHOLD: i64 = 0;
pub const DOWNVOTE_THRESHOLD: i64 = 20;
pub const FLAG_THRESHOLD: i64 = 10;

/// Points a new user starts with.
pub const STARTING_POINTS: i64 = 1;

pub fn can_submit(points: i64) -> bool {
    points > SUBMIT_THRESHOLD
}

pub fn can_comment(points: i64) -> bool {
    points > COMMENT_THRESHOLD
}

pub fn can_upvote(points: i64) -> bool {
    points > UPVOTE_THRESHOLD
}

pub fn can_downvote(points: i64) -> bool {
    points > DOWNVOTE_THRESHOLD
}

pub fn can_flag(points: i64) -> bool {
    points > FLAG_THRESHOLD
}
