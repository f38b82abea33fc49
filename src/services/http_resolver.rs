use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::{ImageKind, LinkMetadata, LinkResolver, PreviewImage, ResolveError};
use crate::config::model::Settings;

const USER_AGENT: &str = concat!("bmedit/", env!("CARGO_PKG_VERSION"), " (link preview)");
const MAX_REDIRECTS: usize = 8;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(4);
/// Pages larger than this are not parsed.
const MAX_HTML_BYTES: usize = 2 * 1024 * 1024;

/// Resolves link previews by fetching the page and reading its `<head>`.
pub struct HttpLinkResolver {
    client: reqwest::Client,
}

impl HttpLinkResolver {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client for link previews")?;
        Ok(Self { client })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.fetch_timeout())
    }

    async fn fetch(&self, url: &Url) -> Result<LinkMetadata, ResolveError> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(classify_request_error)?;

        let final_url = response.url().clone();
        if !is_http_or_https(&final_url) {
            return Err(ResolveError::InvalidUrl(format!(
                "redirected to unsupported url: {final_url}"
            )));
        }

        if !response.status().is_success() {
            debug!(status = %response.status(), %final_url, "no preview for page");
            return Ok(parse_metadata("", &final_url));
        }

        if response
            .content_length()
            .is_some_and(|len| len as usize > MAX_HTML_BYTES)
        {
            debug!(%final_url, "page too large for preview");
            return Ok(parse_metadata("", &final_url));
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                let value = value.to_ascii_lowercase();
                value.contains("text/html") || value.contains("application/xhtml")
            })
            .unwrap_or(true);
        if !is_html {
            return Ok(parse_metadata("", &final_url));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ResolveError::Network(e.to_string()))?;
            if body.len() + chunk.len() > MAX_HTML_BYTES {
                debug!(%final_url, "page exceeded preview size while reading");
                return Ok(parse_metadata("", &final_url));
            }
            body.extend_from_slice(&chunk);
        }

        let html = String::from_utf8_lossy(&body);
        Ok(parse_metadata(&html, &final_url))
    }
}

#[async_trait]
impl LinkResolver for HttpLinkResolver {
    async fn resolve(
        &self,
        channel_id: &str,
        url: &Url,
        cancel: CancellationToken,
    ) -> Result<LinkMetadata, ResolveError> {
        if !is_http_or_https(url) {
            return Err(ResolveError::InvalidUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ResolveError::InvalidUrl("missing host".into()));
        }

        debug!(%url, channel_id, "fetching link preview");
        tokio::select! {
            _ = cancel.cancelled() => Err(ResolveError::Cancelled),
            result = self.fetch(url) => result,
        }
    }
}

fn is_http_or_https(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

fn classify_request_error(err: reqwest::Error) -> ResolveError {
    if err.is_builder() {
        ResolveError::InvalidUrl(err.to_string())
    } else {
        ResolveError::Network(err.to_string())
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract title and preview images from a page.
///
/// The title is `<title>`, else `og:title`. Declared icons are
/// ranked `shortcut icon`, `icon`, `apple-touch-icon`, followed by
/// `/favicon.ico` as a last resort; `og:image` entries come after the icons.
pub fn parse_metadata(html: &str, base: &Url) -> LinkMetadata {
    let document = Html::parse_document(html);
    let mut title = None;
    let mut og_title = None;
    let mut og_images = Vec::new();
    let mut icons: Vec<(u8, Url)> = Vec::new();

    if let Ok(selector) = Selector::parse("title")
        && let Some(node) = document.select(&selector).next()
    {
        let text = collapse_whitespace(&node.text().collect::<String>());
        if !text.is_empty() {
            title = Some(text);
        }
    }

    if let Ok(selector) = Selector::parse("meta[content]") {
        for node in document.select(&selector) {
            let property = node
                .value()
                .attr("property")
                .or_else(|| node.value().attr("name"))
                .map(|value| value.trim().to_ascii_lowercase());
            let Some(content) = node.value().attr("content").map(str::trim) else {
                continue;
            };
            if content.is_empty() {
                continue;
            }

            match property.as_deref() {
                Some("og:title") if og_title.is_none() => {
                    og_title = Some(collapse_whitespace(content));
                }
                Some("og:image" | "og:image:url" | "twitter:image") => {
                    if let Ok(url) = base.join(content)
                        && is_http_or_https(&url)
                    {
                        og_images.push(url);
                    }
                }
                _ => {}
            }
        }
    }

    if let Ok(selector) = Selector::parse("link[href]") {
        for node in document.select(&selector) {
            let rel = node
                .value()
                .attr("rel")
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();

            let priority = if rel.contains("shortcut icon") {
                0
            } else if rel.split_whitespace().any(|t| t == "icon" || t == "shortcut") {
                1
            } else if rel.contains("apple-touch-icon") {
                2
            } else {
                continue;
            };

            let href = match node.value().attr("href").map(str::trim) {
                Some(href) if !href.is_empty() => href,
                _ => continue,
            };
            if let Ok(url) = base.join(href)
                && is_http_or_https(&url)
            {
                icons.push((priority, url));
            }
        }
    }

    icons.sort_by_key(|(priority, _)| *priority);
    let mut seen = BTreeSet::new();
    let mut images = Vec::new();
    for (_, url) in icons {
        if seen.insert(url.to_string()) {
            images.push(PreviewImage {
                url: url.into(),
                kind: ImageKind::SiteIcon,
            });
        }
    }
    if let Ok(fallback) = base.join("/favicon.ico")
        && seen.insert(fallback.to_string())
    {
        images.push(PreviewImage {
            url: fallback.into(),
            kind: ImageKind::SiteIcon,
        });
    }
    for url in og_images {
        if seen.insert(url.to_string()) {
            images.push(PreviewImage {
                url: url.into(),
                kind: ImageKind::Image,
            });
        }
    }

    LinkMetadata {
        title: title.or(og_title).unwrap_or_default(),
        images,
    }
}
