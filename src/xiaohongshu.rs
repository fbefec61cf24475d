//! Xiaohongshu page automation on top of [`AutomationSession`].
//!
//! Read operations pull the page's server-rendered `__INITIAL_STATE__` and
//! hand it back unchanged. Write operations drive the site's own forms.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::operations::{
    DomainOperations, FeedDetail, FeedsList, LoginStatus, PostCommentResponse, PublishRequest,
    PublishResponse, UserProfile,
};
use crate::session::AutomationSession;

const EXPLORE_URL: &str = "https://www.xiaohongshu.com/explore";
const PUBLISH_URL: &str = "https://creator.xiaohongshu.com/publish/publish?source=official";

/// Only rendered for a logged-in visitor.
const LOGGED_IN_MARKER: &str = ".main-container .user .link-wrapper .channel";

const COMMENT_TRIGGER: &str = "div.input-box div.content-edit span";
const COMMENT_INPUT: &str = "div.input-box div.content-edit p.content-input";
const COMMENT_SUBMIT: &str = "div.bottom button.submit";

const UPLOAD_INPUT: &str = ".upload-input";
const TITLE_INPUT: &str = "div.d-input input";
const CONTENT_EDITOR: &str = "div.ql-editor";
const PUBLISH_BUTTON: &str = "div.submit div.d-button-content";

const ELEMENT_TIMEOUT: Duration = Duration::from_secs(15);
const LOGIN_MARKER_TIMEOUT: Duration = Duration::from_secs(3);

/// The Xiaohongshu web site.
#[derive(Debug, Clone)]
pub struct XiaohongshuSite {
    account: String,
    state_timeout: Duration,
}

impl XiaohongshuSite {
    /// Site automation acting for `account`.
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            state_timeout: Duration::from_secs(15),
        }
    }

    /// Read `window.__INITIAL_STATE__<path>`, unwrapping reactive refs.
    async fn initial_state(&self, session: &dyn AutomationSession, path: &str) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + self.state_timeout;
        while session
            .evaluate("window.__INITIAL_STATE__ !== undefined")
            .await?
            != Value::Bool(true)
        {
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Operation("page state did not load".into()));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        let expression = format!(
            "(() => {{ const v = window.__INITIAL_STATE__{path}; \
             if (v === undefined || v === null) return null; \
             const u = v._value !== undefined ? v._value : (v.value !== undefined ? v.value : v); \
             return JSON.stringify(u); }})()"
        );
        match session.evaluate(&expression).await? {
            Value::String(json) => Ok(serde_json::from_str(&json)?),
            _ => Err(Error::Operation(format!("page state has no `{path}`"))),
        }
    }

    async fn feeds_at(&self, session: &dyn AutomationSession, url: &str, path: &str) -> Result<FeedsList> {
        session.navigate(url).await?;
        match self.initial_state(session, path).await? {
            Value::Array(feeds) => Ok(FeedsList::new(feeds)),
            other => Err(Error::Operation(format!(
                "expected a feed list, got {}",
                short_type(&other)
            ))),
        }
    }
}

#[async_trait]
impl DomainOperations for XiaohongshuSite {
    async fn check_login_status(&self, session: &dyn AutomationSession) -> Result<LoginStatus> {
        session.navigate(EXPLORE_URL).await?;
        // The user widget renders after hydration; a browser fault is not a logout.
        let deadline = tokio::time::Instant::now() + LOGIN_MARKER_TIMEOUT;
        let is_logged_in = loop {
            if session.exists(LOGGED_IN_MARKER).await? {
                break true;
            }
            if tokio::time::Instant::now() >= deadline {
                break false;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        };
        Ok(LoginStatus {
            is_logged_in,
            username: is_logged_in.then(|| self.account.clone()),
        })
    }

    async fn publish_content(
        &self,
        session: &dyn AutomationSession,
        request: &PublishRequest,
    ) -> Result<PublishResponse> {
        let images: Vec<PathBuf> = request.images.iter().map(PathBuf::from).collect();

        session.navigate(PUBLISH_URL).await?;
        session.wait_for(UPLOAD_INPUT, ELEMENT_TIMEOUT).await?;
        session.set_files(UPLOAD_INPUT, &images).await?;

        session.wait_for(TITLE_INPUT, ELEMENT_TIMEOUT).await?;
        session.type_text(TITLE_INPUT, &request.title).await?;
        session.type_text(CONTENT_EDITOR, &request.content).await?;
        for tag in &request.tags {
            session.type_text(CONTENT_EDITOR, &format!(" #{tag}")).await?;
        }

        session.click(PUBLISH_BUTTON).await?;
        tokio::time::sleep(Duration::from_secs(3)).await;
        tracing::info!(title = %request.title, images = images.len(), "note submitted");

        Ok(PublishResponse {
            title: request.title.clone(),
            content: request.content.clone(),
            images: images.len(),
            status: "published".into(),
            post_id: None,
        })
    }

    async fn list_feeds(&self, session: &dyn AutomationSession) -> Result<FeedsList> {
        self.feeds_at(session, EXPLORE_URL, "?.feed?.feeds").await
    }

    async fn search_feeds(&self, session: &dyn AutomationSession, keyword: &str) -> Result<FeedsList> {
        self.feeds_at(session, &search_url(keyword), "?.search?.feeds")
            .await
    }

    async fn feed_detail(
        &self,
        session: &dyn AutomationSession,
        feed_id: &str,
        xsec_token: &str,
    ) -> Result<FeedDetail> {
        session.navigate(&note_url(feed_id, xsec_token)).await?;
        let notes = self.initial_state(session, "?.note?.noteDetailMap").await?;
        let data = notes
            .get(feed_id)
            .cloned()
            .ok_or_else(|| Error::Operation(format!("note {feed_id} is not available")))?;
        Ok(FeedDetail {
            feed_id: feed_id.to_string(),
            data,
        })
    }

    async fn user_profile(
        &self,
        session: &dyn AutomationSession,
        user_id: &str,
        xsec_token: &str,
    ) -> Result<UserProfile> {
        session.navigate(&profile_url(user_id, xsec_token)).await?;
        let page = self.initial_state(session, "?.user?.userPageData").await?;
        let notes = self
            .initial_state(session, "?.user?.notes")
            .await
            .unwrap_or(Value::Null);

        Ok(UserProfile {
            user_basic_info: page.get("basicInfo").cloned().unwrap_or(Value::Null),
            interactions: page.get("interactions").cloned().unwrap_or(Value::Null),
            feeds: flatten_notes(notes),
        })
    }

    async fn post_comment(
        &self,
        session: &dyn AutomationSession,
        feed_id: &str,
        xsec_token: &str,
        content: &str,
    ) -> Result<PostCommentResponse> {
        session.navigate(&note_url(feed_id, xsec_token)).await?;
        session.wait_for(COMMENT_TRIGGER, ELEMENT_TIMEOUT).await?;
        session.click(COMMENT_TRIGGER).await?;
        session.wait_for(COMMENT_INPUT, ELEMENT_TIMEOUT).await?;
        session.type_text(COMMENT_INPUT, content).await?;
        session.click(COMMENT_SUBMIT).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;

        Ok(PostCommentResponse {
            feed_id: feed_id.to_string(),
            success: true,
            message: "comment posted".into(),
        })
    }
}

fn search_url(keyword: &str) -> String {
    format!(
        "https://www.xiaohongshu.com/search_result?keyword={}&source=web_explore_feed",
        urlencoding::encode(keyword)
    )
}

fn note_url(feed_id: &str, xsec_token: &str) -> String {
    format!(
        "https://www.xiaohongshu.com/explore/{}?xsec_token={}&xsec_source=pc_feed",
        urlencoding::encode(feed_id),
        urlencoding::encode(xsec_token)
    )
}

fn profile_url(user_id: &str, xsec_token: &str) -> String {
    format!(
        "https://www.xiaohongshu.com/user/profile/{}?xsec_token={}&xsec_source=pc_note",
        urlencoding::encode(user_id),
        urlencoding::encode(xsec_token)
    )
}

/// Notes are grouped per profile tab; the first tab holds the user's own.
fn flatten_notes(notes: Value) -> Vec<Value> {
    match notes {
        Value::Array(tabs) => match tabs.into_iter().next() {
            Some(Value::Array(first)) => first,
            Some(other) => vec![other],
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn short_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
