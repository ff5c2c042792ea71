use crate::models::*;
use crate::rank::RankScope;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait StoryRepo: Send + Sync {
    /// Published stories, rank order (highest first, newest breaking ties).
    async fn list_stories(&self) -> RepoResult<Vec<Story>>;
    async fn get_story(&self, id: Id) -> RepoResult<Story>;
    /// Inserts with points=1 (implicit self-vote), rank 0, published.
    async fn create_story(&self, new: NewStory, user: &User) -> RepoResult<Story>;
    /// Exact-match lookup by (already normalized) URL.
    async fn find_story_by_url(&self, url: &str) -> RepoResult<Option<Story>>;
    /// Atomic `points += delta`; returns the new points.
    async fn bump_story_points(&self, id: Id, delta: i64) -> RepoResult<i64>;
    async fn update_story(&self, id: Id, upd: AdminStoryUpdate) -> RepoResult<Story>;
    async fn set_story_comment_count(&self, id: Id, count: i64) -> RepoResult<()>;
    /// Removes the story, its comments, and every ledger row touching them.
    async fn delete_story(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    /// Published comments of one story, ordered points desc then id desc
    /// (the order the forest builder consumes).
    async fn list_story_comments(&self, story_id: Id) -> RepoResult<Vec<Comment>>;
    async fn create_comment(&self, draft: CommentDraft) -> RepoResult<Comment>;
    /// Atomic `points += delta`; returns the new points.
    async fn bump_comment_points(&self, id: Id, delta: i64) -> RepoResult<i64>;
    /// Count of the story's comments with points > 0.
    async fn count_positive_comments(&self, story_id: Id) -> RepoResult<i64>;
    async fn update_comment(&self, id: Id, upd: AdminCommentUpdate) -> RepoResult<Comment>;
    async fn delete_comment(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait VoteRepo: Send + Sync {
    /// Inserts a ledger row; fails with `Conflict` if (target, voter) exists.
    /// This is the duplicate-vote check: there is no separate read.
    async fn insert_vote(
        &self,
        target: VoteTarget,
        user_id: Id,
        ip_hash: &str,
        delta: i64,
    ) -> RepoResult<()>;
    async fn count_item_votes(&self, target: VoteTarget) -> RepoResult<i64>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    /// Atomic `points += delta`; returns the new points. No floor or ceiling.
    async fn adjust_user_points(&self, id: Id, delta: i64) -> RepoResult<i64>;
}

#[async_trait]
pub trait RankRepo: Send + Sync {
    /// Rewrites the rank column for every item in scope. Idempotent; a pure
    /// function of the stored rows (see `rank::rank`).
    async fn recompute_ranks(&self, scope: RankScope) -> RepoResult<()>;
}

pub trait Repo: StoryRepo + CommentRepo + VoteRepo + UserRepo + RankRepo {}

impl<T> Repo for T where T: StoryRepo + CommentRepo + VoteRepo + UserRepo + RankRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        stories: HashMap<Id, Story>,
        comments: HashMap<Id, Comment>,
        votes: Vec<Vote>,
        users: HashMap<Id, User>,
        next_id: Id,
    }

    impl State {
        fn has_vote(&self, target: VoteTarget, user_id: Id) -> bool {
            self.votes.iter().any(|v| {
                v.user_id == user_id
                    && v.story_id == target.story_id()
                    && v.comment_id == target.comment_id()
            })
        }
    }

    /// Single-writer state behind one lock: every mutation (duplicate-vote
    /// check included) is serialized, so the TOCTOU races of the original
    /// design cannot occur here.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("RNB_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!(
                            "failed to parse snapshot '{}': {e}; starting empty",
                            path.display()
                        );
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::error!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl StoryRepo for InMemRepo {
        async fn list_stories(&self) -> RepoResult<Vec<Story>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .stories
                .values()
                .filter(|st| st.status >= status::PUBLISHED)
                .cloned()
                .collect();
            v.sort_by(|a, b| {
                b.rank
                    .partial_cmp(&a.rank)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.id.cmp(&a.id))
            });
            Ok(v)
        }

        async fn get_story(&self, id: Id) -> RepoResult<Story> {
            let s = self.state.read().unwrap();
            s.stories.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_story(&self, new: NewStory, user: &User) -> RepoResult<Story> {
            let mut s = self.state.write().unwrap();
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let story = Story {
                id,
                name: new.name,
                summary: new.summary,
                url: new.url,
                points: 1,
                rank: 0.0,
                comment_count: 0,
                user_id: user.id,
                user_name: user.name.clone(),
                status: status::PUBLISHED,
                created_at: now,
                updated_at: now,
            };
            s.stories.insert(id, story.clone());
            drop(s);
            self.persist();
            Ok(story)
        }

        async fn find_story_by_url(&self, url: &str) -> RepoResult<Option<Story>> {
            let s = self.state.read().unwrap();
            Ok(s.stories.values().find(|st| st.url == url).cloned())
        }

        async fn bump_story_points(&self, id: Id, delta: i64) -> RepoResult<i64> {
            let mut s = self.state.write().unwrap();
            let story = s.stories.get_mut(&id).ok_or(RepoError::NotFound)?;
            story.points += delta;
            story.updated_at = Utc::now();
            let points = story.points;
            drop(s);
            self.persist();
            Ok(points)
        }

        async fn update_story(&self, id: Id, upd: AdminStoryUpdate) -> RepoResult<Story> {
            let mut s = self.state.write().unwrap();
            let story = s.stories.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(name) = upd.name {
                story.name = name;
            }
            if let Some(summary) = upd.summary {
                story.summary = summary;
            }
            if let Some(url) = upd.url {
                story.url = url;
            }
            if let Some(st) = upd.status {
                story.status = st;
            }
            if let Some(points) = upd.points {
                story.points = points;
            }
            story.updated_at = Utc::now();
            let updated = story.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn set_story_comment_count(&self, id: Id, count: i64) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let story = s.stories.get_mut(&id).ok_or(RepoError::NotFound)?;
            story.comment_count = count;
            drop(s);
            self.persist();
            Ok(())
        }

        async fn delete_story(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if s.stories.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            let comment_ids: Vec<Id> = s
                .comments
                .values()
                .filter(|c| c.story_id == id)
                .map(|c| c.id)
                .collect();
            for cid in &comment_ids {
                s.comments.remove(cid);
            }
            s.votes.retain(|v| {
                v.story_id != Some(id)
                    && !v.comment_id.map(|c| comment_ids.contains(&c)).unwrap_or(false)
            });
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            let s = self.state.read().unwrap();
            s.comments.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_story_comments(&self, story_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .comments
                .values()
                .filter(|c| c.story_id == story_id && c.status >= status::PUBLISHED)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.points.cmp(&a.points).then(b.id.cmp(&a.id)));
            Ok(v)
        }

        async fn create_comment(&self, draft: CommentDraft) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            if !s.stories.contains_key(&draft.story_id) {
                return Err(RepoError::NotFound);
            }
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let comment = Comment {
                id,
                story_id: draft.story_id,
                story_name: draft.story_name,
                user_id: draft.user_id,
                user_name: draft.user_name,
                parent_id: draft.parent_id,
                dotted_ids: draft.dotted_ids,
                text: draft.text,
                points: 1,
                rank: 0.0,
                status: status::PUBLISHED,
                created_at: now,
                updated_at: now,
            };
            s.comments.insert(id, comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }

        async fn bump_comment_points(&self, id: Id, delta: i64) -> RepoResult<i64> {
            let mut s = self.state.write().unwrap();
            let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
            comment.points += delta;
            comment.updated_at = Utc::now();
            let points = comment.points;
            drop(s);
            self.persist();
            Ok(points)
        }

        async fn count_positive_comments(&self, story_id: Id) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.comments
                .values()
                .filter(|c| c.story_id == story_id && c.points > 0)
                .count() as i64)
        }

        async fn update_comment(&self, id: Id, upd: AdminCommentUpdate) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(text) = upd.text {
                comment.text = text;
            }
            if let Some(st) = upd.status {
                comment.status = st;
            }
            if let Some(points) = upd.points {
                comment.points = points;
            }
            comment.updated_at = Utc::now();
            let updated = comment.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if s.comments.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            s.votes.retain(|v| v.comment_id != Some(id));
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl VoteRepo for InMemRepo {
        async fn insert_vote(
            &self,
            target: VoteTarget,
            user_id: Id,
            ip_hash: &str,
            delta: i64,
        ) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            // Check and insert happen under the same writer lock.
            if s.has_vote(target, user_id) {
                return Err(RepoError::Conflict);
            }
            s.votes.push(Vote {
                created_at: Utc::now(),
                story_id: target.story_id(),
                comment_id: target.comment_id(),
                user_id,
                ip_hash: ip_hash.to_string(),
                delta,
            });
            drop(s);
            self.persist();
            Ok(())
        }

        async fn count_item_votes(&self, target: VoteTarget) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.votes
                .iter()
                .filter(|v| {
                    v.story_id == target.story_id() && v.comment_id == target.comment_id()
                })
                .count() as i64)
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users.values().any(|u| u.email == new.email) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                name: new.name,
                email: new.email,
                points: crate::karma::STARTING_POINTS,
                role: new.role.unwrap_or(role::MEMBER),
                created_at: Utc::now(),
            };
            s.users.insert(id, user.clone());
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn adjust_user_points(&self, id: Id, delta: i64) -> RepoResult<i64> {
            let mut s = self.state.write().unwrap();
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            user.points += delta;
            let points = user.points;
            drop(s);
            self.persist();
            Ok(points)
        }
    }

    #[async_trait]
    impl RankRepo for InMemRepo {
        async fn recompute_ranks(&self, scope: RankScope) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            match scope {
                RankScope::Stories => {
                    let max_id = s.stories.keys().copied().max().unwrap_or(0);
                    for story in s.stories.values_mut() {
                        story.rank = crate::rank::rank(story.points, story.id, max_id);
                    }
                }
                RankScope::StoryComments(story_id) => {
                    // Divisor uses the max id over all comments, not just this
                    // story's, matching the SQL recompute.
                    let max_id = s.comments.keys().copied().max().unwrap_or(0);
                    for comment in s
                        .comments
                        .values_mut()
                        .filter(|c| c.story_id == story_id)
                    {
                        comment.rank = crate::rank::rank(comment.points, comment.id, max_id);
                    }
                }
            }
            drop(s);
            self.persist();
            Ok(())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    const STORY_COLS: &str =
        "id, name, summary, url, points, rank, comment_count, user_id, user_name, status, created_at, updated_at";
    const COMMENT_COLS: &str =
        "id, story_id, story_name, user_id, user_name, parent_id, dotted_ids, text, points, rank, status, created_at, updated_at";

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    fn map_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            e if e
                .as_database_error()
                .map(|d| d.is_unique_violation())
                .unwrap_or(false) =>
            {
                RepoError::Conflict
            }
            e => RepoError::Internal(e.to_string()),
        }
    }

    #[async_trait]
    impl StoryRepo for PgRepo {
        async fn list_stories(&self) -> RepoResult<Vec<Story>> {
            let sql = format!(
                "SELECT {STORY_COLS} FROM stories WHERE status >= $1 ORDER BY rank DESC, id DESC"
            );
            sqlx::query_as::<_, Story>(&sql)
                .bind(status::PUBLISHED)
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn get_story(&self, id: Id) -> RepoResult<Story> {
            let sql = format!("SELECT {STORY_COLS} FROM stories WHERE id = $1");
            sqlx::query_as::<_, Story>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn create_story(&self, new: NewStory, user: &User) -> RepoResult<Story> {
            let sql = format!(
                "INSERT INTO stories (name, summary, url, points, rank, comment_count, user_id, user_name, status) \
                 VALUES ($1, $2, $3, 1, 0, 0, $4, $5, $6) RETURNING {STORY_COLS}"
            );
            sqlx::query_as::<_, Story>(&sql)
                .bind(&new.name)
                .bind(&new.summary)
                .bind(&new.url)
                .bind(user.id)
                .bind(&user.name)
                .bind(status::PUBLISHED)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn find_story_by_url(&self, url: &str) -> RepoResult<Option<Story>> {
            let sql = format!(
                "SELECT {STORY_COLS} FROM stories WHERE url = $1 ORDER BY id LIMIT 1"
            );
            sqlx::query_as::<_, Story>(&sql)
                .bind(url)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn bump_story_points(&self, id: Id, delta: i64) -> RepoResult<i64> {
            let row: Option<(i64,)> = sqlx::query_as(
                "UPDATE stories SET points = points + $2, updated_at = now() WHERE id = $1 RETURNING points",
            )
            .bind(id)
            .bind(delta)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
            row.map(|(p,)| p).ok_or(RepoError::NotFound)
        }

        async fn update_story(&self, id: Id, upd: AdminStoryUpdate) -> RepoResult<Story> {
            let sql = format!(
                "UPDATE stories SET \
                   name = COALESCE($2, name), \
                   summary = COALESCE($3, summary), \
                   url = COALESCE($4, url), \
                   status = COALESCE($5, status), \
                   points = COALESCE($6, points), \
                   updated_at = now() \
                 WHERE id = $1 RETURNING {STORY_COLS}"
            );
            sqlx::query_as::<_, Story>(&sql)
                .bind(id)
                .bind(upd.name)
                .bind(upd.summary)
                .bind(upd.url)
                .bind(upd.status)
                .bind(upd.points)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn set_story_comment_count(&self, id: Id, count: i64) -> RepoResult<()> {
            let res = sqlx::query("UPDATE stories SET comment_count = $2 WHERE id = $1")
                .bind(id)
                .bind(count)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn delete_story(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            sqlx::query(
                "DELETE FROM votes WHERE story_id = $1 \
                 OR comment_id IN (SELECT id FROM comments WHERE story_id = $1)",
            )
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
            sqlx::query("DELETE FROM comments WHERE story_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            let res = sqlx::query("DELETE FROM stories WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            tx.commit().await.map_err(map_err)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            let sql = format!("SELECT {COMMENT_COLS} FROM comments WHERE id = $1");
            sqlx::query_as::<_, Comment>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn list_story_comments(&self, story_id: Id) -> RepoResult<Vec<Comment>> {
            let sql = format!(
                "SELECT {COMMENT_COLS} FROM comments \
                 WHERE story_id = $1 AND status >= $2 \
                 ORDER BY points DESC, id DESC"
            );
            sqlx::query_as::<_, Comment>(&sql)
                .bind(story_id)
                .bind(status::PUBLISHED)
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn create_comment(&self, draft: CommentDraft) -> RepoResult<Comment> {
            let sql = format!(
                "INSERT INTO comments (story_id, story_name, user_id, user_name, parent_id, dotted_ids, text, points, rank, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, 1, 0, $8) RETURNING {COMMENT_COLS}"
            );
            sqlx::query_as::<_, Comment>(&sql)
                .bind(draft.story_id)
                .bind(&draft.story_name)
                .bind(draft.user_id)
                .bind(&draft.user_name)
                .bind(draft.parent_id)
                .bind(&draft.dotted_ids)
                .bind(&draft.text)
                .bind(status::PUBLISHED)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn bump_comment_points(&self, id: Id, delta: i64) -> RepoResult<i64> {
            let row: Option<(i64,)> = sqlx::query_as(
                "UPDATE comments SET points = points + $2, updated_at = now() WHERE id = $1 RETURNING points",
            )
            .bind(id)
            .bind(delta)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
            row.map(|(p,)| p).ok_or(RepoError::NotFound)
        }

        async fn count_positive_comments(&self, story_id: Id) -> RepoResult<i64> {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM comments WHERE story_id = $1 AND points > 0",
            )
            .bind(story_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(count)
        }

        async fn update_comment(&self, id: Id, upd: AdminCommentUpdate) -> RepoResult<Comment> {
            let sql = format!(
                "UPDATE comments SET \
                   text = COALESCE($2, text), \
                   status = COALESCE($3, status), \
                   points = COALESCE($4, points), \
                   updated_at = now() \
                 WHERE id = $1 RETURNING {COMMENT_COLS}"
            );
            sqlx::query_as::<_, Comment>(&sql)
                .bind(id)
                .bind(upd.text)
                .bind(upd.status)
                .bind(upd.points)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            sqlx::query("DELETE FROM votes WHERE comment_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            let res = sqlx::query("DELETE FROM comments WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            tx.commit().await.map_err(map_err)
        }
    }

    #[async_trait]
    impl VoteRepo for PgRepo {
        async fn insert_vote(
            &self,
            target: VoteTarget,
            user_id: Id,
            ip_hash: &str,
            delta: i64,
        ) -> RepoResult<()> {
            // Duplicate detection rides on the partial unique indexes
            // (story_id, user_id) / (comment_id, user_id); no prior read.
            sqlx::query(
                "INSERT INTO votes (created_at, story_id, comment_id, user_id, ip_hash, delta) \
                 VALUES (now(), $1, $2, $3, $4, $5)",
            )
            .bind(target.story_id())
            .bind(target.comment_id())
            .bind(user_id)
            .bind(ip_hash)
            .bind(delta)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(())
        }

        async fn count_item_votes(&self, target: VoteTarget) -> RepoResult<i64> {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM votes \
                 WHERE story_id IS NOT DISTINCT FROM $1 \
                 AND comment_id IS NOT DISTINCT FROM $2",
            )
            .bind(target.story_id())
            .bind(target.comment_id())
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(count)
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "SELECT id, name, email, points, role, created_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "INSERT INTO users (name, email, points, role) VALUES ($1, $2, $3, $4) \
                 RETURNING id, name, email, points, role, created_at",
            )
            .bind(&new.name)
            .bind(&new.email)
            .bind(crate::karma::STARTING_POINTS)
            .bind(new.role.unwrap_or(role::MEMBER))
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn adjust_user_points(&self, id: Id, delta: i64) -> RepoResult<i64> {
            let row: Option<(i64,)> = sqlx::query_as(
                "UPDATE users SET points = points + $2 WHERE id = $1 RETURNING points",
            )
            .bind(id)
            .bind(delta)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
            row.map(|(p,)| p).ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl RankRepo for PgRepo {
        async fn recompute_ranks(&self, scope: RankScope) -> RepoResult<()> {
            use crate::rank::{GRAVITY, MULTIPLIER};
            match scope {
                RankScope::Stories => {
                    let sql = format!(
                        "UPDATE stories SET rank = {MULTIPLIER} * points / \
                         POWER(GREATEST((SELECT MAX(id) FROM stories) - id + 1, 1), {GRAVITY})"
                    );
                    sqlx::query(&sql).execute(&self.pool).await.map_err(map_err)?;
                }
                RankScope::StoryComments(story_id) => {
                    let sql = format!(
                        "UPDATE comments SET rank = {MULTIPLIER} * points / \
                         POWER(GREATEST((SELECT MAX(id) FROM comments) - id + 1, 1), {GRAVITY}) \
                         WHERE story_id = $1"
                    );
                    sqlx::query(&sql)
                        .bind(story_id)
                        .execute(&self.pool)
                        .await
                        .map_err(map_err)?;
                }
            }
            Ok(())
        }
    }
}
