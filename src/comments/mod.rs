pub mod http;
pub mod template;

use crate::platform::types::NeighborPost;
use anyhow::Result;
use async_trait::async_trait;

pub use http::HttpComments;
pub use template::TemplateComments;

/// Produces the comment text for a post. `Ok(None)` means "like only".
#[async_trait]
pub trait CommentWriter: Send + Sync {
    async fn compose(&self, post: &NeighborPost) -> Result<Option<String>>;
}

/// Never comments.
pub struct NoComments;

#[async_trait]
impl CommentWriter for NoComments {
    async fn compose(&self, _post: &NeighborPost) -> Result<Option<String>> {
        Ok(None)
    }
}
