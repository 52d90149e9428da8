//! Records persisted by the local store: feed posts, profiles, and
//! integration configs.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::generation::{AspectRatio, GenerationMode};

/// Store partitions. Records in different partitions never share a
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Partition {
    FeedPosts,
    Profiles,
    IntegrationConfigs,
}

impl Partition {
    pub const ALL: [Partition; 3] = [
        Partition::FeedPosts,
        Partition::Profiles,
        Partition::IntegrationConfigs,
    ];

    /// Directory / key prefix used by stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::FeedPosts => "feed-posts",
            Partition::Profiles => "profiles",
            Partition::IntegrationConfigs => "integration-configs",
        }
    }
}

/// A value that lives in exactly one store partition, keyed by id.
pub trait Record: Serialize + DeserializeOwned {
    const PARTITION: Partition;

    fn id(&self) -> &str;
}

/// Generation state of a feed post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Generating,
    Ready,
    Failed,
}

/// One entry in the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: String,
    pub prompt: String,
    pub model_id: String,
    pub aspect_ratio: AspectRatio,
    pub resolution: String,
    #[serde(default = "default_mode")]
    pub mode: GenerationMode,
    pub status: PostStatus,

    /// Where the finished (or edited) video lives.
    #[serde(default)]
    pub video_uri: Option<String>,

    /// Profile that authored the post.
    #[serde(default)]
    pub author_id: Option<String>,

    pub created_at: DateTime<Utc>,

    /// User-facing failure text when `status == Failed`.
    #[serde(default)]
    pub error: Option<String>,
}

fn default_mode() -> GenerationMode {
    GenerationMode::TextToVideo
}

impl FeedPost {
    /// A post whose generation has just been submitted.
    pub fn pending(
        prompt: impl Into<String>,
        model_id: impl Into<String>,
        aspect_ratio: AspectRatio,
        resolution: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            model_id: model_id.into(),
            aspect_ratio,
            resolution: resolution.into(),
            mode: GenerationMode::TextToVideo,
            status: PostStatus::Generating,
            video_uri: None,
            author_id: None,
            created_at: Utc::now(),
            error: None,
        }
    }

    pub fn mark_ready(&mut self, video_uri: impl Into<String>) {
        self.status = PostStatus::Ready;
        self.video_uri = Some(video_uri.into());
        self.error = None;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = PostStatus::Failed;
        self.error = Some(message.into());
    }
}

impl Record for FeedPost {
    const PARTITION: Partition = Partition::FeedPosts;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A local user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_uri: Option<String>,
}

impl Record for Profile {
    const PARTITION: Partition = Partition::Profiles;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Settings for an external integration (e.g. an API provider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub id: String,
    pub provider: String,
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl Record for IntegrationConfig {
    const PARTITION: Partition = Partition::IntegrationConfigs;

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_posts_transition() {
        let mut post = FeedPost::pending("a cat surfing", "veo-fast", AspectRatio::Portrait, "720p");
        assert_eq!(post.status, PostStatus::Generating);

        post.mark_failed("quota exceeded");
        assert_eq!(post.status, PostStatus::Failed);

        post.mark_ready("blob:123");
        assert_eq!(post.status, PostStatus::Ready);
        assert_eq!(post.video_uri.as_deref(), Some("blob:123"));
        assert!(post.error.is_none());
    }

    #[test]
    fn legacy_posts_default_optional_fields() {
        let json = serde_json::json!({
            "id": "p1",
            "prompt": "sunrise",
            "model_id": "m",
            "aspect_ratio": "16:9",
            "resolution": "1080p",
            "status": "ready",
            "created_at": "2024-01-01T00:00:00Z"
        });
        let post: FeedPost = serde_json::from_value(json).unwrap();
        assert_eq!(post.mode, GenerationMode::TextToVideo);
        assert!(post.video_uri.is_none());
        assert_eq!(post.aspect_ratio, AspectRatio::Landscape);
    }

    #[test]
    fn partitions_are_distinct() {
        assert_eq!(FeedPost::PARTITION.as_str(), "feed-posts");
        assert_eq!(Profile::PARTITION, Partition::Profiles);
        assert_eq!(IntegrationConfig::PARTITION, Partition::IntegrationConfigs);
    }
}
