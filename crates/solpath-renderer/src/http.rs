//! HTTP delegate for the render capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solpath_core::{ArtifactRef, Error, Renderer, Result, SolRange};
use std::time::Duration;

/// End-to-end render timeout; plots over wide sol ranges are slow.
const RENDER_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct RenderRequest {
    lower: i64,
    upper: i64,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    artifact_ref: String,
}

/// Renderer that calls an external render service.
///
/// The service owns dataset access, plotting, and the upload to the image
/// host; this client only carries the sol bounds over and the artifact
/// reference back.
pub struct HttpRenderer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRenderer {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(RENDER_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/render", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn render(&self, range: SolRange) -> Result<ArtifactRef> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&RenderRequest {
                lower: range.lower,
                upper: range.upper,
            })
            .send()
            .await
            .map_err(|e| Error::RenderFailed(format!("render service unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RenderFailed(format!(
                "render service returned {status}: {body}"
            )));
        }

        let body: RenderResponse = response
            .json()
            .await
            .map_err(|e| Error::RenderFailed(format!("invalid render response: {e}")))?;

        Ok(ArtifactRef {
            location: body.artifact_ref,
        })
    }
}
