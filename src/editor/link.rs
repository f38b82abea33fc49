use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::{Host, Url};

use super::{BookmarkEditor, EditorEvent, LINK_INVALID_MESSAGE};
use crate::services::{ImageKind, LinkMetadata, PreviewImage, ResolveError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkParseError {
    #[error("link is empty")]
    Empty,

    #[error("link contains whitespace")]
    Whitespace,

    #[error("only http:// and https:// links are supported")]
    UnsupportedScheme,

    #[error("'{0}' does not look like a web address")]
    Ambiguous(String),

    #[error("invalid link: {0}")]
    Malformed(#[from] url::ParseError),
}

/// Normalize user input into an absolute http(s) URL.
///
/// Input is trimmed; a bare domain ("example.com", "localhost:3000",
/// "10.0.0.1/wiki") is read as `https://`. Without an explicit scheme the host
/// must contain a dot, be `localhost`, or be an IP address.
pub fn normalize_link(raw: &str) -> Result<Url, LinkParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LinkParseError::Empty);
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(LinkParseError::Whitespace);
    }

    let explicit_scheme = trimmed.contains("://");
    let candidate = if explicit_scheme {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LinkParseError::UnsupportedScheme);
    }

    let plausible_host = match url.host() {
        Some(Host::Domain(domain)) => {
            domain.eq_ignore_ascii_case("localhost")
                || (domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.'))
        }
        Some(Host::Ipv4(_) | Host::Ipv6(_)) => true,
        None => false,
    };
    if !plausible_host && !(explicit_scheme && url.host().is_some()) {
        return Err(LinkParseError::Ambiguous(trimmed.to_string()));
    }

    Ok(url)
}

/// Serialized URL with a single trailing slash removed.
pub fn canonical_link(url: &Url) -> String {
    let s = url.as_str();
    s.strip_suffix('/').unwrap_or(s).to_string()
}

/// Pick the preview icon: a site icon if one was offered, else the first
/// other image.
pub fn select_preview_image(images: &[PreviewImage]) -> Option<String> {
    images
        .iter()
        .find(|img| img.kind == ImageKind::SiteIcon)
        .or_else(|| images.iter().find(|img| img.kind == ImageKind::Image))
        .map(|img| img.url.clone())
}

impl BookmarkEditor {
    /// Record a keystroke; commits after the quiet period.
    pub fn on_link_input(&mut self, raw: &str) {
        if self.closed {
            return;
        }
        self.state.raw_link_input = raw.to_string();
        self.debouncer.schedule(raw.to_string(), &self.events_tx);
    }

    /// The field lost focus: commit now.
    pub fn on_link_blur(&mut self, raw: &str) {
        self.commit_now(raw);
    }

    /// A link was pasted: commit now.
    pub fn on_link_paste(&mut self, raw: &str) {
        self.commit_now(raw);
    }

    fn commit_now(&mut self, raw: &str) {
        if self.closed {
            return;
        }
        self.state.raw_link_input = raw.to_string();
        self.debouncer.cancel();
        self.commit_link(raw);
    }

    pub(super) fn commit_link(&mut self, value: &str) {
        self.state.committed_link = value.to_string();

        let original_link = self.original.as_ref().and_then(|o| o.link_url.as_deref());
        if original_link == Some(value) {
            debug!("committed link matches the saved bookmark");
            return;
        }

        self.state.link_error.clear();
        self.reset_link_preview();

        let url = match normalize_link(value) {
            Ok(url) => url,
            Err(e) => {
                debug!(error = %e, "link not resolvable, skipping metadata");
                return;
            }
        };

        if !self.options.link_previews {
            return;
        }

        self.start_resolution(value.to_string(), url);
    }

    /// Provisional preview: no icon, name is the link itself.
    fn reset_link_preview(&mut self) {
        self.state.resolved_icon.clear();
        self.state.derived_name = Some(self.state.committed_link.clone())
            .filter(|link| !link.is_empty());
    }

    fn start_resolution(&mut self, link: String, url: Url) {
        if let Some(previous) = self.resolution.take() {
            previous.cancel();
        }

        let token = CancellationToken::new();
        self.resolution = Some(token.clone());
        self.state.pending_resolution_for = Some(link.clone());

        let resolver = Arc::clone(&self.services.resolver);
        let channel_id = self.options.channel_id.clone();
        let tx = self.events_tx.clone();

        debug!(%url, "resolving link metadata");
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = resolver.resolve(&channel_id, &url, token.clone()) => result,
            };
            let _ = tx.send(EditorEvent::LinkResolved { link, result });
        });
    }

    pub(super) fn apply_resolution(
        &mut self,
        link: String,
        result: Result<LinkMetadata, ResolveError>,
    ) {
        let was_pending = self.state.pending_resolution_for.as_deref() == Some(link.as_str());
        let current = was_pending && self.state.committed_link == link;

        if was_pending {
            self.state.pending_resolution_for = None;
            self.resolution = None;
        }
        if !current {
            debug!(%link, "discarding metadata for a superseded link");
            return;
        }

        match result {
            Ok(metadata) => {
                let title = metadata.title.trim();
                self.state.derived_name = Some(if title.is_empty() {
                    link
                } else {
                    title.to_string()
                });
                self.state.resolved_icon =
                    select_preview_image(&metadata.images).unwrap_or_default();
            }
            Err(ResolveError::InvalidUrl(reason)) => {
                debug!(%link, %reason, "resolver rejected link");
                self.state.link_error = LINK_INVALID_MESSAGE.to_string();
            }
            Err(e) => {
                debug!(%link, error = %e, "metadata unavailable");
                self.reset_link_preview();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_domain() {
        let url = normalize_link("example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
        assert_eq!(canonical_link(&url), "https://example.com");
    }

    #[test]
    fn test_normalize_trims_and_keeps_scheme() {
        let url = normalize_link("  http://intranet.example.org/wiki/  ").unwrap();
        assert_eq!(url.as_str(), "http://intranet.example.org/wiki/");
        assert_eq!(canonical_link(&url), "http://intranet.example.org/wiki");
    }

    #[test]
    fn test_normalize_localhost_and_ip() {
        assert_eq!(
            normalize_link("localhost:3000/docs").unwrap().as_str(),
            "https://localhost:3000/docs"
        );
        assert_eq!(
            normalize_link("10.0.0.1/status").unwrap().as_str(),
            "https://10.0.0.1/status"
        );
    }

    #[test]
    fn test_normalize_explicit_single_label_host() {
        assert_eq!(
            normalize_link("http://wiki/start").unwrap().as_str(),
            "http://wiki/start"
        );
    }

    #[test]
    fn test_normalize_rejections() {
        assert_eq!(normalize_link("   "), Err(LinkParseError::Empty));
        assert_eq!(normalize_link("not a link"), Err(LinkParseError::Whitespace));
        assert_eq!(
            normalize_link("ftp://files.example.com"),
            Err(LinkParseError::UnsupportedScheme)
        );
        assert!(matches!(
            normalize_link("hello"),
            Err(LinkParseError::Ambiguous(_))
        ));
        assert!(matches!(
            normalize_link("example."),
            Err(LinkParseError::Ambiguous(_))
        ));
        assert!(matches!(
            normalize_link("https://"),
            Err(LinkParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_canonical_link_strips_one_slash_only() {
        let url = Url::parse("https://example.com/a//").unwrap();
        assert_eq!(canonical_link(&url), "https://example.com/a/");
        let twice = Url::parse(&canonical_link(&url)).unwrap();
        assert_eq!(canonical_link(&twice), "https://example.com/a");
    }

    #[test]
    fn test_select_preview_image_prefers_site_icon() {
        let images = vec![
            PreviewImage {
                url: "https://example.com/og.png".into(),
                kind: ImageKind::Image,
            },
            PreviewImage {
                url: "https://example.com/favicon.ico".into(),
                kind: ImageKind::SiteIcon,
            },
        ];
        assert_eq!(
            select_preview_image(&images).as_deref(),
            Some("https://example.com/favicon.ico")
        );
        assert_eq!(
            select_preview_image(&images[..1]).as_deref(),
            Some("https://example.com/og.png")
        );
        assert_eq!(select_preview_image(&[]), None);
    }
}
