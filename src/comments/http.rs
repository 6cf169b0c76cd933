//! Comment text from an external generation service.
//!
//! `POST {endpoint}` with `{postId, authorNickname, title}`; the service answers
//! `{"comment": "..."}` (null or empty for "don't comment").

use super::CommentWriter;
use crate::platform::types::NeighborPost;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ComposeRequest<'a> {
    post_id: &'a str,
    author_nickname: &'a str,
    title: &'a str,
}

#[derive(Deserialize)]
struct ComposeResponse {
    #[serde(default)]
    comment: Option<String>,
}

pub struct HttpComments {
    client: Client,
    endpoint: String,
}

impl HttpComments {
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build comment service client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl CommentWriter for HttpComments {
    async fn compose(&self, post: &NeighborPost) -> Result<Option<String>> {
        let body = ComposeRequest {
            post_id: &post.post_id,
            author_nickname: &post.author_nickname,
            title: &post.title,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("comment service request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("comment service failed ({}): {}", status, body);
        }
        let parsed: ComposeResponse = resp
            .json()
            .await
            .context("failed to parse comment service response")?;
        Ok(parsed
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()))
    }
}
