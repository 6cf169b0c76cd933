use super::CommentWriter;
use crate::platform::types::NeighborPost;
use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Mutex;

/// Picks one of the configured templates at random. `{nickname}` and `{title}`
/// are substituted from the post.
pub struct TemplateComments {
    templates: Vec<String>,
    rng: Mutex<StdRng>,
}

impl TemplateComments {
    pub fn new(templates: Vec<String>) -> Self {
        Self::with_rng(templates, StdRng::from_entropy())
    }

    pub fn with_seed(templates: Vec<String>, seed: u64) -> Self {
        Self::with_rng(templates, StdRng::seed_from_u64(seed))
    }

    fn with_rng(templates: Vec<String>, rng: StdRng) -> Self {
        let templates = templates
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            templates,
            rng: Mutex::new(rng),
        }
    }

    fn render(template: &str, post: &NeighborPost) -> String {
        template
            .replace("{nickname}", &post.author_nickname)
            .replace("{title}", &post.title)
    }
}

#[async_trait]
impl CommentWriter for TemplateComments {
    async fn compose(&self, post: &NeighborPost) -> Result<Option<String>> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| anyhow::anyhow!("comment rng lock poisoned"))?;
        Ok(self
            .templates
            .choose(&mut *rng)
            .map(|t| Self::render(t, post)))
    }
}
