//! Time-decayed popularity score.
//!
//! `rank = K * points / (max_id - id + 1)^G`, where the item id stands in
//! for age (ids are monotonic). One canonical constant pair is used for both
//! stories and comments: K = 100, G = 1.2.

use serde::{Deserialize, Serialize};

use crate::models::Id;

pub const MULTIPLIER: f64 = 100.0;
pub const GRAVITY: f64 = 1.2;

/// The set of items whose ranks move together: all stories, or all comments
/// under one story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankScope {
    Stories,
    StoryComments(Id),
}

/// Pure rank function. The denominator is clamped to >= 1 so a fresh scope
/// (or an id at max_id) never divides by zero.
pub fn rank(points: i64, id: Id, max_id: Id) -> f64 {
    let age = (max_id - id + 1).max(1) as f64;
    MULTIPLIER * points as f64 / age.powf(GRAVITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn more_points_rank_higher_at_equal_age() {
        assert!(rank(10, 100, 200) > rank(5, 100, 200));
    }

    #[test]
    fn newer_ranks_at_least_as_high_at_equal_points() {
        assert!(rank(10, 150, 200) >= rank(10, 50, 200));
    }

    #[test]
    fn fixed_points_decay_as_scope_grows() {
        // Same item, scope max id advancing: rank strictly decreases.
        assert!(rank(10, 100, 300) < rank(10, 100, 200));
    }

    #[test]
    fn denominator_clamped_at_newest_item() {
        // id == max_id gives age 1; no division blowup, rank == K * points.
        assert_eq!(rank(3, 200, 200), MULTIPLIER * 3.0);
        // Degenerate max_id below id still clamps.
        assert_eq!(rank(3, 200, 0), MULTIPLIER * 3.0);
    }

    #[test]
    fn negative_points_rank_negative() {
        assert!(rank(-4, 100, 200) < 0.0);
    }
}
