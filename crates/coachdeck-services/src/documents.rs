//! Document rendering service client.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use tracing::info;

use coachdeck::collaborators::{ByteStream, Document, DocumentRenderer};
use coachdeck::config::DocumentsConfig;
use coachdeck_api::{ApiError, Result};

use crate::http::{self, Upstream};

const UPSTREAM: Upstream = Upstream::Collaborator("documents");

/// Posts the document as JSON and streams the rendered bytes back.
pub struct HttpDocumentRenderer {
    client: reqwest::Client,
    render_url: String,
    bearer: Option<String>,
}

impl HttpDocumentRenderer {
    pub fn new(render_url: &str) -> Result<Self> {
        Ok(Self {
            client: http::build_client()?,
            render_url: render_url.to_string(),
            bearer: None,
        })
    }

    pub fn from_config(config: &DocumentsConfig) -> Result<Self> {
        let url = config
            .render_url
            .as_deref()
            .ok_or_else(|| ApiError::invalid_input("documents.render_url is not configured"))?;
        Self::new(url)
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

#[async_trait]
impl DocumentRenderer for HttpDocumentRenderer {
    #[tracing::instrument(name = "provider.documents.render", skip(self, document), fields(title = %document.title))]
    async fn render(&self, document: &Document) -> Result<ByteStream> {
        let url = self.render_url.clone();
        let mut request = self.client.post(&url).json(document);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UPSTREAM.error(http::format_reqwest_error(&e, &url, "render document")))?;

        let response = http::check_status(response, &url, UPSTREAM).await?;

        info!("[HttpDocumentRenderer] Streaming rendered document from {}", url);
        let stream = response
            .bytes_stream()
            .map_err(move |e| UPSTREAM.error(http::format_reqwest_error(&e, &url, "read document")))
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()));
        Ok(Box::pin(stream))
    }
}
