//! HTTP client for the browser-automation bridge.
//!
//! The bridge owns the real browser process; one bridge session is one logged-in
//! browser context. Endpoints:
//!
//! - `POST   /sessions`                           login
//! - `GET    /sessions/{id}/feed?page=n`          neighbor feed page
//! - `POST   /sessions/{id}/posts/{post}/like`    like
//! - `POST   /sessions/{id}/posts/{post}/comments` comment
//! - `DELETE /sessions/{id}`                      logout, releases the browser

use super::types::*;
use super::{Platform, PlatformError};
use crate::vault::Credentials;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use std::time::Duration;

pub struct BridgeRest {
    client: Client,
    base_url: Url,
}

impl BridgeRest {
    pub fn new(base_url: &str, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {}", e))?;
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| anyhow::anyhow!("invalid bridge base_url {:?}: {}", base_url, e))?;
        Ok(Self { client, base_url })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PlatformError::Decode("bridge base_url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Map bridge status codes onto the engine's failure classes.
    async fn check(resp: Response) -> Result<Response, PlatformError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let raw = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&raw)
            .ok()
            .map(|b| b.error)
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("{} {}", status, raw.trim()));

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::AuthRejected(message),
            StatusCode::LOCKED | StatusCode::TOO_MANY_REQUESTS => PlatformError::Locked(message),
            StatusCode::GONE => PlatformError::SessionExpired(message),
            s if s.as_u16() == 440 => PlatformError::SessionExpired(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => PlatformError::Timeout,
            _ => PlatformError::Rejected(message),
        })
    }

    async fn post_action(
        &self,
        url: Url,
        body: Option<CommentRequest<'_>>,
    ) -> Result<(), PlatformError> {
        let mut req = self.client.post(url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.map_err(transport)?;
        Self::check(resp).await?;
        Ok(())
    }
}

fn transport(e: reqwest::Error) -> PlatformError {
    if e.is_timeout() {
        PlatformError::Timeout
    } else {
        PlatformError::Http(e.to_string())
    }
}

#[async_trait]
impl Platform for BridgeRest {
    async fn login(&self, credentials: &Credentials) -> Result<SessionHandle, PlatformError> {
        let url = self.url(&["sessions"])?;
        let body = LoginRequest {
            account_id: &credentials.account_id,
            account_secret: &credentials.account_secret,
        };
        let resp = self.client.post(url).json(&body).send().await.map_err(transport)?;
        let parsed: LoginResponse = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::Decode(format!("login response: {}", e)))?;
        Ok(SessionHandle {
            session_id: parsed.session_id,
            account_id: credentials.account_id.clone(),
        })
    }

    async fn feed_page(&self, handle: &SessionHandle, page: u32) -> Result<FeedPage, PlatformError> {
        let mut url = self.url(&["sessions", &handle.session_id, "feed"])?;
        url.query_pairs_mut().append_pair("page", &page.to_string());
        let resp = self.client.get(url).send().await.map_err(transport)?;
        Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::Decode(format!("feed page {}: {}", page, e)))
    }

    async fn like(&self, handle: &SessionHandle, post: &NeighborPost) -> Result<(), PlatformError> {
        let url = self.url(&["sessions", &handle.session_id, "posts", &post.post_id, "like"])?;
        self.post_action(url, None).await
    }

    async fn comment(
        &self,
        handle: &SessionHandle,
        post: &NeighborPost,
        text: &str,
    ) -> Result<(), PlatformError> {
        let url = self.url(&["sessions", &handle.session_id, "posts", &post.post_id, "comments"])?;
        self.post_action(url, Some(CommentRequest { text })).await
    }

    async fn logout(&self, handle: &SessionHandle) -> Result<(), PlatformError> {
        let url = self.url(&["sessions", &handle.session_id])?;
        let resp = self.client.delete(url).send().await.map_err(transport)?;
        // Already gone on the bridge side counts as closed.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        match Self::check(resp).await {
            Ok(_) | Err(PlatformError::SessionExpired(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
