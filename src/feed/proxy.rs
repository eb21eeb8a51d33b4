use std::borrow::Cow;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde_json::Value;

/// How a proxy hands the upstream body back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    /// The response body is the upstream body, unmodified.
    RawText,
    /// The body is a JSON envelope with the upstream payload in a
    /// `contents` or `data` field.
    JsonEnvelope,
}

/// One CORS relay in the fallback chain.
#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    pub name: String,
    /// Prefix the percent-encoded target URL is appended to. Some bases end
    /// in a query key, some in a bare slash; concatenation handles both.
    pub base: String,
    pub kind: ProxyKind,
}

impl ProxyEndpoint {
    pub fn new(name: &str, base: &str, kind: ProxyKind) -> Self {
        Self {
            name: name.to_string(),
            base: base.to_string(),
            kind,
        }
    }

    /// The URL to actually request for `target` through this proxy.
    pub fn proxied_url(&self, target: &str) -> String {
        format!("{}{}", self.base, urlencoding::encode(target))
    }

    /// Recovers the upstream payload from a proxy response body.
    ///
    /// Envelope proxies that return unparseable JSON, or JSON without a
    /// usable string field, fall back to the body as-is; the feed parser
    /// downstream decides whether that was XML after all.
    pub fn unwrap_payload<'a>(&self, body: &'a str) -> Cow<'a, str> {
        match self.kind {
            ProxyKind::RawText => Cow::Borrowed(body),
            ProxyKind::JsonEnvelope => {
                let Ok(envelope) = serde_json::from_str::<Value>(body) else {
                    return Cow::Borrowed(body);
                };
                let inner = envelope
                    .get("contents")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .or_else(|| {
                        envelope
                            .get("data")
                            .and_then(Value::as_str)
                            .filter(|s| !s.is_empty())
                    });
                match inner {
                    Some(payload) => Cow::Owned(payload.to_string()),
                    None => Cow::Borrowed(body),
                }
            }
        }
    }
}

/// The built-in relay chain, tried in order.
pub fn default_proxies() -> Vec<ProxyEndpoint> {
    vec![
        ProxyEndpoint::new(
            "codetabs",
            "https://api.codetabs.com/v1/proxy?quest=",
            ProxyKind::RawText,
        ),
        ProxyEndpoint::new("corsproxy.io", "https://corsproxy.io/?", ProxyKind::RawText),
        ProxyEndpoint::new(
            "allorigins",
            "https://api.allorigins.win/get?url=",
            ProxyKind::JsonEnvelope,
        ),
        ProxyEndpoint::new(
            "cors-anywhere",
            "https://cors-anywhere.herokuapp.com/",
            ProxyKind::RawText,
        ),
        ProxyEndpoint::new(
            "thingproxy",
            "https://thingproxy.freeboard.io/fetch/",
            ProxyKind::RawText,
        ),
    ]
}

/// Data-URI media types that envelope proxies use when the upstream
/// response was served with an XML content type.
const DATA_URI_PREFIXES: [&str; 3] = [
    "data:application/rss+xml",
    "data:text/xml",
    "data:application/xml",
];

/// Unpacks a base64 data URI when an envelope proxy delivered the feed
/// that way.
///
/// Payloads that do not carry a feed media type pass through untouched, as
/// does a data URI with no comma section; the parser will reject those on
/// its own. Invalid base64 is a hard error because the payload was
/// recognizably a feed and is now unrecoverable. Decoded bytes are read as
/// UTF-8 with replacement characters rather than guessing at charsets.
pub fn decode_data_uri(payload: &str) -> Result<Cow<'_, str>, base64::DecodeError> {
    if !DATA_URI_PREFIXES
        .iter()
        .any(|prefix| payload.starts_with(prefix))
    {
        return Ok(Cow::Borrowed(payload));
    }
    let Some((_, encoded)) = payload.split_once(',') else {
        return Ok(Cow::Borrowed(payload));
    };
    // Browsers strip ASCII whitespace before decoding base64
    let cleaned: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = BASE64_STANDARD.decode(cleaned)?;
    Ok(Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Routes an image URL through the image relay unless it is already local.
pub fn proxy_image_url(url: &str) -> String {
    if url.is_empty() || url.starts_with("images/") {
        return url.to_string();
    }
    format!("https://corsproxy.io/?{}", urlencoding::encode(url))
}
