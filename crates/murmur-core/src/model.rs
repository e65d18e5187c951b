//! Row and wire types for the two persisted entity kinds.
//!
//! The feed delivers posts as JSON objects with a nested author object and,
//! for reposts, a nested copy of the original post. [`FeedPost`] and
//! [`FeedUser`] mirror that wire shape; [`Post`] and [`User`] are the flat
//! rows written to the store.

use crate::error::{Error, Result};
use chrono::DateTime;
use serde::Deserialize;

/// Timestamp layout used by the feed, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
pub const FEED_TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Parse a feed timestamp into Unix seconds.
pub fn parse_feed_timestamp(value: &str) -> Result<i64> {
    DateTime::parse_from_str(value, FEED_TIMESTAMP_FORMAT)
        .map(|dt| dt.timestamp())
        .map_err(|e| Error::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// A persisted author row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub screen_name: String,
    pub followers_count: i64,
    pub friends_count: i64,
    pub listed_count: i64,
    /// Unix seconds.
    pub created_at: i64,
    pub favourites_count: i64,
    pub verified: bool,
    pub statuses_count: i64,
    pub default_profile_image: bool,
}

/// A persisted post row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub text: String,
    /// Unix seconds.
    pub created_at: i64,
    pub in_reply_to_status_id: Option<String>,
    pub in_reply_to_user_id: Option<String>,
    /// Id of the original post when this post is a repost.
    pub reposted_post_id: Option<String>,
    pub source: String,
    pub author_id: String,
}

/// Author object as delivered by the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedUser {
    pub id_str: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub screen_name: String,
    #[serde(default)]
    pub followers_count: i64,
    #[serde(default)]
    pub friends_count: i64,
    #[serde(default)]
    pub listed_count: i64,
    pub created_at: String,
    #[serde(default)]
    pub favourites_count: i64,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub statuses_count: i64,
    #[serde(default)]
    pub default_profile_image: bool,
}

impl FeedUser {
    /// Convert to the row written to the store.
    pub fn to_row(&self) -> Result<User> {
        require_id("user.id_str", &self.id_str)?;

        Ok(User {
            id: self.id_str.clone(),
            name: self.name.clone(),
            screen_name: self.screen_name.clone(),
            followers_count: self.followers_count,
            friends_count: self.friends_count,
            listed_count: self.listed_count,
            created_at: parse_feed_timestamp(&self.created_at)?,
            favourites_count: self.favourites_count,
            verified: self.verified,
            statuses_count: self.statuses_count,
            default_profile_image: self.default_profile_image,
        })
    }
}

/// Post object as delivered by the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedPost {
    pub id_str: String,
    #[serde(default)]
    pub text: String,
    pub created_at: String,
    #[serde(default)]
    pub in_reply_to_status_id_str: Option<String>,
    #[serde(default)]
    pub in_reply_to_user_id_str: Option<String>,
    #[serde(default)]
    pub source: String,
    pub user: FeedUser,
    /// Embedded copy of the original post when this post is a repost.
    #[serde(default)]
    pub retweeted_status: Option<Box<FeedPost>>,
}

impl FeedPost {
    /// The original post this one re-shares, if any.
    pub fn original(&self) -> Option<&FeedPost> {
        self.retweeted_status.as_deref()
    }

    /// Convert to the row written to the store.
    pub fn to_row(&self) -> Result<Post> {
        require_id("id_str", &self.id_str)?;

        Ok(Post {
            id: self.id_str.clone(),
            text: self.text.clone(),
            created_at: parse_feed_timestamp(&self.created_at)?,
            in_reply_to_status_id: self.in_reply_to_status_id_str.clone(),
            in_reply_to_user_id: self.in_reply_to_user_id_str.clone(),
            reposted_post_id: self.original().map(|o| o.id_str.clone()),
            source: self.source.clone(),
            author_id: self.user.id_str.clone(),
        })
    }
}

fn require_id(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidField {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}
