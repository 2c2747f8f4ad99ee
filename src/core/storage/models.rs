use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedRecord {
    pub id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub last_fetched_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFeed {
    pub name: String,
    pub url: String,
    pub user_id: i64,
}

/// Feed row joined with its owner's name, for plain-text listing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedWithOwner {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub owner_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedFollowRecord {
    pub id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub user_id: i64,
    pub feed_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<String>,
}

/// Post row joined with its feed's name, for plain-text listing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PostView {
    pub id: i64,
    pub created_at: String,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<String>,
    pub feed_name: String,
}
