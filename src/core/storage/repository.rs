use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use super::models::{
    FeedFollowRecord, FeedRecord, FeedWithOwner, NewFeed, NewPost, PostView, UserRecord,
};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StorageError::Database(sqlx::Error::Database(err)) => err.is_unique_violation(),
            _ => false,
        }
    }
}

/// Outcome of a post insert. A duplicate URL is expected steady state, not
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostInsert {
    Created,
    DuplicateUrl,
}

#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn create_user(&self, name: &str) -> Result<UserRecord, StorageError> {
        sqlx::query("INSERT INTO users (name) VALUES (?1)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, created_at, updated_at, name FROM users WHERE name = ?1",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<UserRecord>, StorageError> {
        let row = sqlx::query_as::<_, UserRecord>(
            "SELECT id, created_at, updated_at, name FROM users WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, StorageError> {
        let rows = sqlx::query_as::<_, UserRecord>(
            "SELECT id, created_at, updated_at, name FROM users ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Deletes every user; feeds, follows, and posts go with them through
    /// the cascading foreign keys.
    pub async fn delete_all_users(&self) -> Result<u64, StorageError> {
        let affected = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected)
    }

    pub async fn create_feed(&self, feed: &NewFeed) -> Result<FeedRecord, StorageError> {
        sqlx::query("INSERT INTO feeds (name, url, user_id) VALUES (?1, ?2, ?3)")
            .bind(&feed.name)
            .bind(&feed.url)
            .bind(feed.user_id)
            .execute(&self.pool)
            .await?;
        let record = sqlx::query_as::<_, FeedRecord>(
            r#"
            SELECT id, created_at, updated_at, name, url, user_id, last_fetched_at
            FROM feeds
            WHERE url = ?1
            "#,
        )
        .bind(&feed.url)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<FeedRecord>, StorageError> {
        let row = sqlx::query_as::<_, FeedRecord>(
            r#"
            SELECT id, created_at, updated_at, name, url, user_id, last_fetched_at
            FROM feeds
            WHERE url = ?1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_feeds_with_owners(&self) -> Result<Vec<FeedWithOwner>, StorageError> {
        let rows = sqlx::query_as::<_, FeedWithOwner>(
            r#"
            SELECT f.id, f.name, f.url, u.name AS owner_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Claims the feed whose last successful poll is oldest; never-polled
    /// feeds (NULL timestamp) come first.
    pub async fn next_feed_to_poll(&self) -> Result<Option<FeedRecord>, StorageError> {
        let row = sqlx::query_as::<_, FeedRecord>(
            r#"
            SELECT id, created_at, updated_at, name, url, user_id, last_fetched_at
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn mark_feed_polled(
        &self,
        feed_id: i64,
        polled_at: &str,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE feeds SET last_fetched_at = ?1, updated_at = ?1 WHERE id = ?2")
            .bind(polled_at)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<FeedFollowRecord, StorageError> {
        sqlx::query("INSERT INTO feed_follows (user_id, feed_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        let record = sqlx::query_as::<_, FeedFollowRecord>(
            r#"
            SELECT id, created_at, updated_at, user_id, feed_id
            FROM feed_follows
            WHERE user_id = ?1 AND feed_id = ?2
            "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn delete_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<u64, StorageError> {
        let affected = sqlx::query("DELETE FROM feed_follows WHERE user_id = ?1 AND feed_id = ?2")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected)
    }

    pub async fn list_followed_feeds(&self, user_id: i64) -> Result<Vec<FeedRecord>, StorageError> {
        let rows = sqlx::query_as::<_, FeedRecord>(
            r#"
            SELECT f.id, f.created_at, f.updated_at, f.name, f.url, f.user_id, f.last_fetched_at
            FROM feeds f
            JOIN feed_follows ff ON ff.feed_id = f.id
            WHERE ff.user_id = ?1
            ORDER BY f.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Insert-if-absent: a URL collision reports [`PostInsert::DuplicateUrl`]
    /// instead of failing, any other database failure is a real error.
    pub async fn insert_post(&self, post: &NewPost) -> Result<PostInsert, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(&post.published_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(PostInsert::Created),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Ok(PostInsert::DuplicateUrl)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list_posts_for_user(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<PostView>, StorageError> {
        let rows = sqlx::query_as::<_, PostView>(
            r#"
            SELECT p.id, p.created_at, p.title, p.url, p.description, p.published_at,
                   f.name AS feed_name
            FROM posts p
            JOIN feeds f ON f.id = p.feed_id
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?1
            ORDER BY COALESCE(p.published_at, p.created_at) DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    async fn memory_repository() -> Repository {
        Repository::connect("sqlite::memory:")
            .await
            .expect("connect must succeed")
    }

    async fn seed_user(repository: &Repository, name: &str) -> UserRecord {
        repository
            .create_user(name)
            .await
            .expect("user create must succeed")
    }

    async fn seed_feed(repository: &Repository, user_id: i64, name: &str, url: &str) -> FeedRecord {
        repository
            .create_feed(&NewFeed {
                name: name.to_string(),
                url: url.to_string(),
                user_id,
            })
            .await
            .expect("feed create must succeed")
    }

    fn make_post(feed_id: i64, title: &str, url: &str) -> NewPost {
        NewPost {
            feed_id,
            title: title.to_string(),
            url: url.to_string(),
            description: None,
            published_at: None,
        }
    }

    #[tokio::test]
    async fn migration_creates_required_tables() {
        let repository = memory_repository().await;
        let rows = sqlx::query(
            r#"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table'
              AND name IN ('users', 'feeds', 'feed_follows', 'posts')
            ORDER BY name
            "#,
        )
        .fetch_all(&repository.pool)
        .await
        .expect("query must succeed");

        let table_names: Vec<String> = rows
            .into_iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();
        assert_eq!(
            table_names,
            vec![
                "feed_follows".to_string(),
                "feeds".to_string(),
                "posts".to_string(),
                "users".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_user_name_is_a_unique_violation() {
        let repository = memory_repository().await;
        seed_user(&repository, "ada").await;

        let err = repository
            .create_user("ada")
            .await
            .expect_err("second create must fail");

        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn never_polled_feeds_are_claimed_before_polled_ones() {
        let repository = memory_repository().await;
        let user = seed_user(&repository, "ada").await;
        let polled = seed_feed(&repository, user.id, "old", "http://old.test/rss").await;
        seed_feed(&repository, user.id, "fresh", "http://fresh.test/rss").await;
        repository
            .mark_feed_polled(polled.id, "2026-08-01T00:00:00Z")
            .await
            .expect("mark polled must succeed");

        let claimed = repository
            .next_feed_to_poll()
            .await
            .expect("claim must succeed")
            .expect("a feed must be claimed");

        assert_eq!(claimed.url, "http://fresh.test/rss");
        assert!(claimed.last_fetched_at.is_none());
    }

    #[tokio::test]
    async fn polling_rotates_the_feed_to_the_back_of_the_queue() {
        let repository = memory_repository().await;
        let user = seed_user(&repository, "ada").await;
        let first = seed_feed(&repository, user.id, "one", "http://one.test/rss").await;
        let second = seed_feed(&repository, user.id, "two", "http://two.test/rss").await;

        repository
            .mark_feed_polled(first.id, "2026-08-01T00:00:00Z")
            .await
            .expect("mark polled must succeed");
        let after_first = repository
            .next_feed_to_poll()
            .await
            .expect("claim must succeed")
            .expect("a feed must be claimed");
        repository
            .mark_feed_polled(second.id, "2026-08-01T00:01:00Z")
            .await
            .expect("mark polled must succeed");
        let after_second = repository
            .next_feed_to_poll()
            .await
            .expect("claim must succeed")
            .expect("a feed must be claimed");

        assert_eq!(after_first.id, second.id);
        assert_eq!(after_second.id, first.id);
    }

    #[tokio::test]
    async fn next_feed_to_poll_on_an_empty_store_is_none() {
        let repository = memory_repository().await;

        let claimed = repository
            .next_feed_to_poll()
            .await
            .expect("claim must succeed");

        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn duplicate_post_url_is_reported_not_inserted() {
        let repository = memory_repository().await;
        let user = seed_user(&repository, "ada").await;
        let feed = seed_feed(&repository, user.id, "blog", "http://a.test/rss").await;
        repository
            .create_feed_follow(user.id, feed.id)
            .await
            .expect("follow must succeed");

        let first = repository
            .insert_post(&make_post(feed.id, "A", "http://a.test/1"))
            .await
            .expect("first insert must succeed");
        let second = repository
            .insert_post(&make_post(feed.id, "B", "http://a.test/1"))
            .await
            .expect("second insert must not error");
        let posts = repository
            .list_posts_for_user(user.id, 10)
            .await
            .expect("list must succeed");

        assert_eq!(first, PostInsert::Created);
        assert_eq!(second, PostInsert::DuplicateUrl);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "A");
    }

    #[tokio::test]
    async fn deleting_all_users_cascades_to_feeds_and_posts() {
        let repository = memory_repository().await;
        let user = seed_user(&repository, "ada").await;
        let feed = seed_feed(&repository, user.id, "blog", "http://a.test/rss").await;
        repository
            .create_feed_follow(user.id, feed.id)
            .await
            .expect("follow must succeed");
        repository
            .insert_post(&make_post(feed.id, "A", "http://a.test/1"))
            .await
            .expect("insert must succeed");

        let deleted = repository
            .delete_all_users()
            .await
            .expect("delete must succeed");

        assert_eq!(deleted, 1);
        for table in ["users", "feeds", "feed_follows", "posts"] {
            let count: i64 = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
                .fetch_one(&repository.pool)
                .await
                .expect("count must succeed")
                .get("n");
            assert_eq!(count, 0, "{table} should be empty");
        }
    }

    #[tokio::test]
    async fn follow_twice_is_a_unique_violation_and_unfollow_removes_it() {
        let repository = memory_repository().await;
        let user = seed_user(&repository, "ada").await;
        let feed = seed_feed(&repository, user.id, "blog", "http://a.test/rss").await;
        repository
            .create_feed_follow(user.id, feed.id)
            .await
            .expect("follow must succeed");

        let err = repository
            .create_feed_follow(user.id, feed.id)
            .await
            .expect_err("second follow must fail");
        let removed = repository
            .delete_feed_follow(user.id, feed.id)
            .await
            .expect("unfollow must succeed");
        let remaining = repository
            .list_followed_feeds(user.id)
            .await
            .expect("list must succeed");

        assert!(err.is_unique_violation());
        assert_eq!(removed, 1);
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn browse_only_shows_followed_feeds_newest_first() {
        let repository = memory_repository().await;
        let ada = seed_user(&repository, "ada").await;
        let ben = seed_user(&repository, "ben").await;
        let followed = seed_feed(&repository, ada.id, "blog", "http://a.test/rss").await;
        let other = seed_feed(&repository, ben.id, "other", "http://b.test/rss").await;
        repository
            .create_feed_follow(ada.id, followed.id)
            .await
            .expect("follow must succeed");

        for (title, url, published_at) in [
            ("older", "http://a.test/1", Some("2026-08-01T00:00:00Z")),
            ("newer", "http://a.test/2", Some("2026-08-02T00:00:00Z")),
            ("unseen", "http://b.test/1", Some("2026-08-03T00:00:00Z")),
        ] {
            let feed_id = if url.starts_with("http://a.test") {
                followed.id
            } else {
                other.id
            };
            repository
                .insert_post(&NewPost {
                    feed_id,
                    title: title.to_string(),
                    url: url.to_string(),
                    description: None,
                    published_at: published_at.map(String::from),
                })
                .await
                .expect("insert must succeed");
        }

        let posts = repository
            .list_posts_for_user(ada.id, 1)
            .await
            .expect("list must succeed");

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "newer");
        assert_eq!(posts[0].feed_name, "blog");
    }
}
