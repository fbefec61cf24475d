//! Domain operations: the site-specific actions a tool delegates to.
//!
//! The core only builds a [`DomainRequest`], hands it to a
//! [`DomainOperations`] implementation together with a fresh session, and
//! forwards the resulting [`DomainOutcome`]. Feed, note and profile payloads
//! stay opaque JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::session::AutomationSession;

/// Content to publish as an image note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Note title.
    pub title: String,
    /// Body text without hashtags.
    pub content: String,
    /// Local paths or URLs of the images, at least one.
    pub images: Vec<String>,
    /// Topic tags without the leading `#`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Result of a login check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginStatus {
    /// Whether the externally persisted cookies belong to a live login.
    pub is_logged_in: bool,
    /// Nickname shown on the page, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Result of a publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Published title.
    pub title: String,
    /// Published body.
    pub content: String,
    /// Number of images uploaded.
    pub images: usize,
    /// Human readable status.
    pub status: String,
    /// Note id, when the site reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
}

/// A list of feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedsList {
    /// Feed entries as delivered by the site.
    pub feeds: Vec<Value>,
    /// Number of entries.
    pub count: usize,
}

impl FeedsList {
    /// Wrap a list of feeds, filling in the count.
    pub fn new(feeds: Vec<Value>) -> Self {
        let count = feeds.len();
        Self { feeds, count }
    }
}

/// Detail of one note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedDetail {
    /// Requested note id.
    pub feed_id: String,
    /// Note, interaction and comment data.
    pub data: Value,
}

/// A user's profile page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Basic account information.
    #[serde(rename = "userBasicInfo")]
    pub user_basic_info: Value,
    /// Follow, fan and like counters.
    pub interactions: Value,
    /// The user's notes.
    pub feeds: Vec<Value>,
}

/// Result of posting a comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostCommentResponse {
    /// Note commented on.
    pub feed_id: String,
    /// Whether the comment was submitted.
    pub success: bool,
    /// Human readable status.
    pub message: String,
}

/// Site automation, one method per tool.
#[async_trait::async_trait]
pub trait DomainOperations: Send + Sync {
    /// Check whether the persisted login is still valid.
    async fn check_login_status(&self, session: &dyn AutomationSession) -> Result<LoginStatus>;

    /// Publish an image note.
    async fn publish_content(
        &self,
        session: &dyn AutomationSession,
        request: &PublishRequest,
    ) -> Result<PublishResponse>;

    /// List the recommended feeds.
    async fn list_feeds(&self, session: &dyn AutomationSession) -> Result<FeedsList>;

    /// Search feeds by keyword.
    async fn search_feeds(
        &self,
        session: &dyn AutomationSession,
        keyword: &str,
    ) -> Result<FeedsList>;

    /// Fetch one note with its comments.
    async fn feed_detail(
        &self,
        session: &dyn AutomationSession,
        feed_id: &str,
        xsec_token: &str,
    ) -> Result<FeedDetail>;

    /// Fetch a user's profile page.
    async fn user_profile(
        &self,
        session: &dyn AutomationSession,
        user_id: &str,
        xsec_token: &str,
    ) -> Result<UserProfile>;

    /// Post a comment on a note.
    async fn post_comment(
        &self,
        session: &dyn AutomationSession,
        feed_id: &str,
        xsec_token: &str,
        content: &str,
    ) -> Result<PostCommentResponse>;
}

/// A validated, strongly typed domain call.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainRequest {
    /// `check_login_status`
    CheckLoginStatus,
    /// `publish_content`
    PublishContent(PublishRequest),
    /// `list_feeds`
    ListFeeds,
    /// `search_feeds`
    SearchFeeds {
        /// Search keyword.
        keyword: String,
    },
    /// `get_feed_detail`
    FeedDetail {
        /// Note id.
        feed_id: String,
        /// Access token from the feed list.
        xsec_token: String,
    },
    /// `user_profile`
    UserProfile {
        /// User id.
        user_id: String,
        /// Access token from the feed list.
        xsec_token: String,
    },
    /// `post_comment_to_feed`
    PostComment {
        /// Note id.
        feed_id: String,
        /// Access token from the feed list.
        xsec_token: String,
        /// Comment text.
        content: String,
    },
}

impl DomainRequest {
    /// Tool name this request belongs to.
    pub fn tool_name(&self) -> &'static str {
        match self {
            DomainRequest::CheckLoginStatus => "check_login_status",
            DomainRequest::PublishContent(_) => "publish_content",
            DomainRequest::ListFeeds => "list_feeds",
            DomainRequest::SearchFeeds { .. } => "search_feeds",
            DomainRequest::FeedDetail { .. } => "get_feed_detail",
            DomainRequest::UserProfile { .. } => "user_profile",
            DomainRequest::PostComment { .. } => "post_comment_to_feed",
        }
    }

    /// Run the request against `ops` inside `session`.
    pub async fn invoke(
        &self,
        ops: &dyn DomainOperations,
        session: &dyn AutomationSession,
    ) -> Result<DomainOutcome> {
        Ok(match self {
            DomainRequest::CheckLoginStatus => {
                DomainOutcome::LoginStatus(ops.check_login_status(session).await?)
            }
            DomainRequest::PublishContent(request) => {
                DomainOutcome::Published(ops.publish_content(session, request).await?)
            }
            DomainRequest::ListFeeds => DomainOutcome::Feeds(ops.list_feeds(session).await?),
            DomainRequest::SearchFeeds { keyword } => {
                DomainOutcome::Feeds(ops.search_feeds(session, keyword).await?)
            }
            DomainRequest::FeedDetail {
                feed_id,
                xsec_token,
            } => DomainOutcome::FeedDetail(ops.feed_detail(session, feed_id, xsec_token).await?),
            DomainRequest::UserProfile {
                user_id,
                xsec_token,
            } => DomainOutcome::UserProfile(ops.user_profile(session, user_id, xsec_token).await?),
            DomainRequest::PostComment {
                feed_id,
                xsec_token,
                content,
            } => DomainOutcome::Commented(
                ops.post_comment(session, feed_id, xsec_token, content)
                    .await?,
            ),
        })
    }
}

/// What a successful domain call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainOutcome {
    /// Login check result.
    LoginStatus(LoginStatus),
    /// Publish result.
    Published(PublishResponse),
    /// Feed list or search result.
    Feeds(FeedsList),
    /// Note detail.
    FeedDetail(FeedDetail),
    /// Profile page.
    UserProfile(UserProfile),
    /// Comment result.
    Commented(PostCommentResponse),
}

impl DomainOutcome {
    /// Serialize the payload.
    pub fn to_value(&self) -> Result<Value> {
        Ok(match self {
            DomainOutcome::LoginStatus(v) => serde_json::to_value(v)?,
            DomainOutcome::Published(v) => serde_json::to_value(v)?,
            DomainOutcome::Feeds(v) => serde_json::to_value(v)?,
            DomainOutcome::FeedDetail(v) => serde_json::to_value(v)?,
            DomainOutcome::UserProfile(v) => serde_json::to_value(v)?,
            DomainOutcome::Commented(v) => serde_json::to_value(v)?,
        })
    }
}
