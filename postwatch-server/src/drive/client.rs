use std::sync::Arc;

use async_trait::async_trait;
use postwatch_core::{
    ChannelRecord, ListPage, ListQuery, RemoteError, RemoteItem, RemoteStore,
    model::{ChannelRequest, DOCX_MIME, JPEG_MIME, NATIVE_DOC_MIME},
};
use reqwest::{Method, RequestBuilder, Response};
use tracing::{debug, instrument};
use url::Url;

use super::auth::AccessTokenProvider;
use super::query::build_query;
use super::wire::{FileList, LIST_FIELDS, StopRequest, WatchRequest, WatchResponse, api_error};
use crate::infra::config::DriveConfig;

/// How a stored item is turned into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    /// `files/{id}?alt=media`
    Media,
    /// `files/{id}/export?mimeType=...`
    Export(&'static str),
}

/// Native documents are exported as DOCX; DOCX and JPEG come down as-is.
pub fn download_mode(mime_type: &str) -> Result<DownloadMode, RemoteError> {
    match mime_type {
        NATIVE_DOC_MIME => Ok(DownloadMode::Export(DOCX_MIME)),
        DOCX_MIME | JPEG_MIME => Ok(DownloadMode::Media),
        other => Err(RemoteError::UnsupportedContentType(other.to_string())),
    }
}

#[derive(Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    base: Url,
    tokens: Arc<dyn AccessTokenProvider>,
    page_size: u32,
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient")
            .field("base", &self.base.as_str())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl DriveClient {
    pub fn new(
        http: reqwest::Client,
        config: &DriveConfig,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, RemoteError> {
        let base = Url::parse(&config.api_base).map_err(|err| {
            RemoteError::Malformed(format!("invalid drive api base '{}': {err}", config.api_base))
        })?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::Malformed(format!(
                "drive api base '{}' cannot carry a path",
                config.api_base
            )));
        }
        Ok(Self {
            http,
            base,
            tokens,
            page_size: config.page_size,
        })
    }

    pub fn http_client(config: &DriveConfig) -> Result<reqwest::Client, RemoteError> {
        reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| RemoteError::Transport(err.to_string()))
    }

    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, RemoteError> {
        let token = self.tokens.access_token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let response = builder
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(api_error(status.as_u16(), &body))
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    #[instrument(skip(self), level = "debug")]
    async fn list(
        &self,
        query: &ListQuery,
        page_token: Option<String>,
    ) -> Result<ListPage, RemoteError> {
        let mut params = vec![
            ("q", build_query(query)),
            ("fields", LIST_FIELDS.to_string()),
            ("pageSize", self.page_size.to_string()),
            ("spaces", "drive".to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let builder = self
            .request(Method::GET, self.endpoint(&["files"]))
            .await?
            .query(&params);
        let list: FileList = self
            .send(builder)
            .await?
            .json()
            .await
            .map_err(|err| RemoteError::Malformed(err.to_string()))?;

        debug!(
            items = list.files.len(),
            more = list.next_page_token.is_some(),
            "listed drive items"
        );
        Ok(ListPage {
            items: list.files.into_iter().map(RemoteItem::from).collect(),
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn download(&self, item: &RemoteItem) -> Result<Vec<u8>, RemoteError> {
        let builder = match download_mode(&item.mime_type)? {
            DownloadMode::Media => self
                .request(Method::GET, self.endpoint(&["files", item.id.as_str()]))
                .await?
                .query(&[("alt", "media")]),
            DownloadMode::Export(as_mime) => self
                .request(
                    Method::GET,
                    self.endpoint(&["files", item.id.as_str(), "export"]),
                )
                .await?
                .query(&[("mimeType", as_mime)]),
        };

        let bytes = self
            .send(builder)
            .await?
            .bytes()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        debug!(item = %item.id, name = %item.name, bytes = bytes.len(), "downloaded drive item");
        Ok(bytes.to_vec())
    }

    async fn open_channel(&self, request: &ChannelRequest) -> Result<ChannelRecord, RemoteError> {
        let builder = self
            .request(
                Method::POST,
                self.endpoint(&["files", request.target.as_str(), "watch"]),
            )
            .await?
            .json(&WatchRequest::from_request(request));

        let response: WatchResponse = self
            .send(builder)
            .await?
            .json()
            .await
            .map_err(|err| RemoteError::Malformed(err.to_string()))?;
        response.into_record(request)
    }

    async fn stop_channel(&self, channel: &ChannelRecord) -> Result<(), RemoteError> {
        let resource_id = channel.remote_resource_id.as_deref().ok_or_else(|| {
            RemoteError::Malformed(format!("channel {} has no resource id", channel.id))
        })?;

        let builder = self
            .request(Method::POST, self.endpoint(&["channels", "stop"]))
            .await?
            .json(&StopRequest {
                id: channel.id.as_str(),
                resource_id,
            });
        self.send(builder).await?;
        Ok(())
    }
}
