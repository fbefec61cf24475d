//! Tool definitions and registry for MCP server.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use unicode_width::UnicodeWidthStr;

use crate::arguments::Arguments;
use crate::error::{Error, Result};
use crate::operations::{DomainRequest, PublishRequest};
use crate::protocol::ToolDefinition;

/// Maximum title width accepted by the site: CJK glyphs count 2, others 1.
pub const MAX_TITLE_WIDTH: usize = 40;

/// Tool trait for implementing MCP tools.
///
/// A tool only describes itself and turns raw arguments into a typed
/// [`DomainRequest`]; running the request is the orchestrator's job.
pub trait Tool: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Decode already schema-checked arguments into a domain request.
    fn decode(&self, arguments: Arguments<'_>) -> Result<DomainRequest>;
}

/// Immutable, ordered registry of the available tools.
pub struct ToolRegistry {
    tools: Vec<(ToolDefinition, Arc<dyn Tool>)>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create the registry with the built-in tools in declaration order.
    pub fn new() -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(CheckLoginStatusTool),
            Arc::new(PublishContentTool),
            Arc::new(ListFeedsTool),
            Arc::new(SearchFeedsTool),
            Arc::new(GetFeedDetailTool),
            Arc::new(UserProfileTool),
            Arc::new(PostCommentTool),
        ];

        let tools: Vec<(ToolDefinition, Arc<dyn Tool>)> =
            tools.into_iter().map(|t| (t.definition(), t)).collect();
        let index = tools
            .iter()
            .enumerate()
            .map(|(i, (definition, _))| (definition.name.clone(), i))
            .collect();

        Self { tools, index }
    }

    /// Get tool definitions, in declaration order.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|(d, _)| d.clone()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up a tool definition by name.
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i].0)
    }

    /// Validate `arguments` for tool `name` and build its domain request.
    pub fn prepare(&self, name: &str, arguments: &Map<String, Value>) -> Result<DomainRequest> {
        let &i = self
            .index
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        let (definition, tool) = &self.tools[i];

        let arguments = Arguments::new(arguments);
        arguments.check_required(&definition.input_schema)?;
        tool.decode(arguments)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn feed_id_property() -> Value {
    json!({
        "type": "string",
        "description": "Note ID, taken from a feed list entry"
    })
}

fn xsec_token_property() -> Value {
    json!({
        "type": "string",
        "description": "Access token, taken from the xsecToken field of a feed list entry"
    })
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// Tool for checking the account's login status.
pub struct CheckLoginStatusTool;

impl Tool for CheckLoginStatusTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "check_login_status".into(),
            description: "Check whether the Xiaohongshu account is logged in.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    fn decode(&self, _arguments: Arguments<'_>) -> Result<DomainRequest> {
        Ok(DomainRequest::CheckLoginStatus)
    }
}

/// Tool for publishing an image note.
pub struct PublishContentTool;

impl Tool for PublishContentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "publish_content".into(),
            description: "Publish an image note on Xiaohongshu.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "Note title (site limit: 20 CJK characters or 40 narrow characters)"
                    },
                    "content": {
                        "type": "string",
                        "description": "Body text. Do not include #hashtags here; pass them through `tags`."
                    },
                    "images": {
                        "type": "array",
                        "description": "Image paths, at least one. Absolute local paths are recommended, e.g. /Users/user/image.jpg",
                        "items": { "type": "string" },
                        "minItems": 1
                    },
                    "tags": {
                        "type": "array",
                        "description": "Optional topic tags, e.g. [\"food\", \"travel\"]",
                        "items": { "type": "string" }
                    }
                },
                "required": ["title", "content", "images"]
            }),
        }
    }

    fn decode(&self, arguments: Arguments<'_>) -> Result<DomainRequest> {
        let title = arguments.required_str("title")?;
        let width = title.width();
        if width > MAX_TITLE_WIDTH {
            return Err(Error::invalid_argument(
                "title",
                format!("display width {width} exceeds the limit of {MAX_TITLE_WIDTH}"),
            ));
        }

        let content = arguments.required_str("content")?;
        let images = arguments.required_str_list("images")?;
        for image in &images {
            check_local_image(image)?;
        }
        let tags = arguments
            .optional_str_list("tags")?
            .into_iter()
            .map(|tag| tag.trim().trim_start_matches('#').to_string())
            .filter(|tag| !tag.is_empty())
            .collect();

        Ok(DomainRequest::PublishContent(PublishRequest {
            title,
            content,
            images,
            tags,
        }))
    }
}

/// Images must already be on this machine; nothing is downloaded.
fn check_local_image(image: &str) -> Result<()> {
    if image.starts_with("http://") || image.starts_with("https://") {
        return Err(Error::invalid_argument(
            "images",
            format!("{image} is a URL; download it first and pass the local path"),
        ));
    }
    if !Path::new(image).is_file() {
        return Err(Error::invalid_argument(
            "images",
            format!("{image} is not an existing file"),
        ));
    }
    Ok(())
}

/// Tool for listing the recommended feeds.
pub struct ListFeedsTool;

impl Tool for ListFeedsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_feeds".into(),
            description: "List the feeds on the Xiaohongshu home page.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    fn decode(&self, _arguments: Arguments<'_>) -> Result<DomainRequest> {
        Ok(DomainRequest::ListFeeds)
    }
}

/// Tool for searching feeds.
pub struct SearchFeedsTool;

impl Tool for SearchFeedsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_feeds".into(),
            description: "Search Xiaohongshu notes by keyword (requires login).".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "keyword": {
                        "type": "string",
                        "description": "Search keyword"
                    }
                },
                "required": ["keyword"]
            }),
        }
    }

    fn decode(&self, arguments: Arguments<'_>) -> Result<DomainRequest> {
        Ok(DomainRequest::SearchFeeds {
            keyword: arguments.required_str("keyword")?,
        })
    }
}

/// Tool for fetching a note's detail.
pub struct GetFeedDetailTool;

impl Tool for GetFeedDetailTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_feed_detail".into(),
            description: "Get a note's detail: content, images, author, interaction counts (likes/collects/shares) and comments.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "feed_id": feed_id_property(),
                    "xsec_token": xsec_token_property()
                },
                "required": ["feed_id", "xsec_token"]
            }),
        }
    }

    fn decode(&self, arguments: Arguments<'_>) -> Result<DomainRequest> {
        Ok(DomainRequest::FeedDetail {
            feed_id: arguments.required_str("feed_id")?,
            xsec_token: arguments.required_str("xsec_token")?,
        })
    }
}

/// Tool for fetching a user's profile page.
pub struct UserProfileTool;

impl Tool for UserProfileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "user_profile".into(),
            description: "Get a user's profile: basic info, following/follower/like counts and their notes.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {
                        "type": "string",
                        "description": "User ID, taken from a feed list entry"
                    },
                    "xsec_token": xsec_token_property()
                },
                "required": ["user_id", "xsec_token"]
            }),
        }
    }

    fn decode(&self, arguments: Arguments<'_>) -> Result<DomainRequest> {
        Ok(DomainRequest::UserProfile {
            user_id: arguments.required_str("user_id")?,
            xsec_token: arguments.required_str("xsec_token")?,
        })
    }
}

/// Tool for commenting on a note.
pub struct PostCommentTool;

impl Tool for PostCommentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "post_comment_to_feed".into(),
            description: "Post a comment on a Xiaohongshu note.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "feed_id": feed_id_property(),
                    "xsec_token": xsec_token_property(),
                    "content": {
                        "type": "string",
                        "description": "Comment text"
                    }
                },
                "required": ["feed_id", "xsec_token", "content"]
            }),
        }
    }

    fn decode(&self, arguments: Arguments<'_>) -> Result<DomainRequest> {
        Ok(DomainRequest::PostComment {
            feed_id: arguments.required_str("feed_id")?,
            xsec_token: arguments.required_str("xsec_token")?,
            content: arguments.required_str("content")?,
        })
    }
}
