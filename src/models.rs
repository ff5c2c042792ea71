use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Always i64, assigned by the store, never reused.
pub type Id = i64;

/// Publication status values shared by stories and comments. Listing filters
/// only care about `>= PUBLISHED`; the lower values enumerate what admins may
/// write into the status column via the update DTOs.
pub mod status {
    pub const DRAFT: i64 = 1;
    pub const SUSPENDED: i64 = 50;
    pub const PUBLISHED: i64 = 100;
}

/// User role values stored on the user row. The persisted role is
/// informational only: authorization is decided by the JWT claims (see
/// `auth::Role`), never by reading this column back.
pub mod role {
    pub const READER: i64 = 10;
    pub const MEMBER: i64 = 20;
    pub const ADMIN: i64 = 100;
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Story {
    pub id: Id,
    pub name: String,
    pub summary: String,
    pub url: String,
    pub points: i64,
    pub rank: f64, // derived, recomputed scope-wide after point changes
    pub comment_count: i64,
    pub user_id: Id,
    pub user_name: String,
    pub status: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a regular user may set when submitting a story. Admin-only fields
/// live in `AdminStoryUpdate`; there is deliberately no catch-all map.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewStory {
    pub name: String,
    pub summary: String,
    pub url: String,
}

/// Admin-editable story fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminStoryUpdate {
    pub name: Option<String>,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub status: Option<i64>,
    pub points: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub story_id: Id,
    pub story_name: String,
    pub user_id: Id,
    pub user_name: String,
    /// 0 marks a root comment.
    pub parent_id: Id,
    /// Ancestor id chain joined by "." with a trailing dot; "" for roots.
    pub dotted_ids: String,
    pub text: String,
    pub points: i64,
    pub rank: f64,
    pub status: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub story_id: Id,
    /// 0 (or omitted) for a root comment.
    #[serde(default)]
    pub parent_id: Id,
    pub text: String,
}

/// Admin-editable comment fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminCommentUpdate {
    pub text: Option<String>,
    pub status: Option<i64>,
    pub points: Option<i64>,
}

/// Persisted-row draft for a comment; dotted_ids is derived by the caller
/// (see `comments::create_comment`), never by the store.
#[derive(Debug, Clone)]
pub struct CommentDraft {
    pub story_id: Id,
    pub story_name: String,
    pub user_id: Id,
    pub user_name: String,
    pub parent_id: Id,
    pub dotted_ids: String,
    pub text: String,
}

/// What a ledger row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTarget {
    Story(Id),
    Comment(Id),
}

impl VoteTarget {
    pub fn story_id(&self) -> Option<Id> {
        match self {
            VoteTarget::Story(id) => Some(*id),
            VoteTarget::Comment(_) => None,
        }
    }

    pub fn comment_id(&self) -> Option<Id> {
        match self {
            VoteTarget::Story(_) => None,
            VoteTarget::Comment(id) => Some(*id),
        }
    }
}

/// One ledger row per (item, voter). Exactly one of story_id/comment_id set.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Vote {
    pub created_at: DateTime<Utc>,
    pub story_id: Option<Id>,
    pub comment_id: Option<Id>,
    pub user_id: Id,
    pub ip_hash: String,
    pub delta: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    /// Karma. No floor or ceiling; may go negative.
    pub points: i64,
    pub role: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Option<i64>,
}
