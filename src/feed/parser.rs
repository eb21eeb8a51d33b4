use chrono::Utc;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use thiserror::Error;

use crate::feed::image::extract_image;
use crate::util::{clean_description, normalize_date, repair_text};

/// Only the newest articles per feed are surfaced; anything past this
/// count in document order is never examined.
pub const MAX_ARTICLES_PER_FEED: usize = 10;

/// SEC-003: Maximum allowed element nesting depth.
/// Bounds the recursion in [`XmlElement::text_content`] and friends so a
/// maliciously nested document cannot overflow the stack.
const MAX_ELEMENT_DEPTH: usize = 50;

/// Errors that can occur while parsing a feed document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The payload was an HTML page, not a feed. Proxies frequently serve
    /// their own error or challenge pages with a 200 status.
    #[error("received HTML content instead of feed XML")]
    HtmlDocument,

    /// The payload was not well-formed XML.
    #[error("failed to parse feed XML: {0}")]
    Malformed(String),
}

/// Which syndication dialect a document turned out to be.
///
/// Detection is structural: a document with `<item>` descendants is RSS,
/// otherwise `<entry>` descendants make it Atom. RSS wins when both appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss,
    Atom,
}

/// A single normalized article, ready for rendering.
///
/// All text fields have been through mojibake repair and markup stripping;
/// dates are pre-formatted. The owning source is tracked alongside the
/// article list in the fetch result, not per article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Human-readable age, e.g. "3 hours ago" or "1/15/2024".
    pub display_date: String,
    /// RFC 3339 timestamp with millisecond precision, or empty when the
    /// source date could not be parsed.
    pub iso_date: String,
    pub image_url: Option<String>,
}

/// One element of the parsed document tree.
///
/// `name` is the qualified tag name exactly as written in the document,
/// prefix included (`media:thumbnail`, not `thumbnail`). Lookups match on
/// that full string.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct XmlElement {
    pub(crate) name: String,
    pub(crate) attributes: Vec<(String, String)>,
    pub(crate) children: Vec<XmlNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    /// Returns the value of the first attribute with the given name.
    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Concatenates every descendant text node in document order.
    pub(crate) fn text_content(&self) -> String {
        let mut out = String::new();
        self.append_text(&mut out);
        out
    }

    fn append_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(text) => out.push_str(text),
                XmlNode::Element(element) => element.append_text(out),
            }
        }
    }

    pub(crate) fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// Returns the first descendant, in document order, matching the
    /// predicate. The element itself is not a candidate.
    pub(crate) fn find_descendant<F>(&self, pred: &F) -> Option<&XmlElement>
    where
        F: Fn(&XmlElement) -> bool,
    {
        for element in self.child_elements() {
            if pred(element) {
                return Some(element);
            }
            if let Some(found) = element.find_descendant(pred) {
                return Some(found);
            }
        }
        None
    }

    /// Returns the first descendant with the given qualified name.
    pub(crate) fn first_descendant(&self, name: &str) -> Option<&XmlElement> {
        self.find_descendant(&|element| element.name == name)
    }

    /// Collects descendants with the given qualified name, in document
    /// order, stopping once `limit` have been gathered.
    pub(crate) fn collect_descendants<'a>(
        &'a self,
        name: &str,
        limit: usize,
        out: &mut Vec<&'a XmlElement>,
    ) {
        for element in self.child_elements() {
            if out.len() >= limit {
                return;
            }
            if element.name == name {
                out.push(element);
            }
            element.collect_descendants(name, limit, out);
        }
    }
}

/// Parses a feed document into normalized articles.
///
/// Handles both RSS 2.0 (`<item>`) and Atom (`<entry>`) documents. At most
/// [`MAX_ARTICLES_PER_FEED`] items are examined; items lacking a non-empty
/// title or link are dropped without error. A structurally valid document
/// with zero items yields an empty list, not an error.
///
/// # Errors
///
/// Returns [`ParseError::HtmlDocument`] when the payload fails to parse and
/// looks like an HTML page, [`ParseError::Malformed`] for any other
/// well-formedness failure.
pub fn parse_feed(xml: &str) -> Result<Vec<Article>, ParseError> {
    let root = parse_document(xml).map_err(|diagnostic| classify_failure(xml, diagnostic))?;

    let mut items = Vec::new();
    root.collect_descendants("item", MAX_ARTICLES_PER_FEED, &mut items);
    let format = if items.is_empty() {
        root.collect_descendants("entry", MAX_ARTICLES_PER_FEED, &mut items);
        FeedFormat::Atom
    } else {
        FeedFormat::Rss
    };

    let now = Utc::now();
    let mut articles = Vec::new();
    for item in items {
        let title = field_text(item, "title");
        let link = match format {
            FeedFormat::Rss => field_text(item, "link"),
            FeedFormat::Atom => atom_link(item),
        };
        if title.is_empty() || link.is_empty() {
            continue;
        }

        let description = match format {
            FeedFormat::Rss => field_text(item, "description"),
            FeedFormat::Atom => {
                let summary = field_text(item, "summary");
                if summary.is_empty() {
                    field_text(item, "content")
                } else {
                    summary
                }
            }
        };
        let date_raw = match format {
            FeedFormat::Rss => field_text(item, "pubDate"),
            FeedFormat::Atom => {
                let published = field_text(item, "published");
                if published.is_empty() {
                    field_text(item, "updated")
                } else {
                    published
                }
            }
        };

        let stamp = normalize_date(&date_raw, now);
        let image_url = extract_image(item, &description, format);
        articles.push(Article {
            title: repair_text(&title).into_owned(),
            link,
            description: clean_description(&description),
            display_date: stamp.display,
            iso_date: stamp.iso,
            image_url,
        });
    }

    Ok(articles)
}

/// Trimmed text content of the first descendant with the given name, or
/// empty when the element is absent.
fn field_text(item: &XmlElement, name: &str) -> String {
    item.first_descendant(name)
        .map(|element| element.text_content().trim().to_string())
        .unwrap_or_default()
}

/// Resolves the article link for an Atom entry.
///
/// Prefers `<link rel="alternate">`, then `<link type="text/html">`, then
/// the first `<link>` in document order. The chosen element's `href`
/// attribute wins; legacy feeds that put the URL in the element body are
/// handled by falling back to text content.
fn atom_link(entry: &XmlElement) -> String {
    let chosen = entry
        .find_descendant(&|element| {
            element.name == "link" && element.attr("rel") == Some("alternate")
        })
        .or_else(|| {
            entry.find_descendant(&|element| {
                element.name == "link" && element.attr("type") == Some("text/html")
            })
        })
        .or_else(|| entry.first_descendant("link"));

    let Some(element) = chosen else {
        return String::new();
    };
    match element.attr("href") {
        Some(href) if !href.is_empty() => href.to_string(),
        _ => element.text_content().trim().to_string(),
    }
}

/// Builds the element tree for a document.
///
/// SEC-002: quick-xml (0.37) never parses `<!ENTITY>` declarations, so
/// custom entities fail unescaping instead of resolving. A feed carrying a
/// DOCTYPE payload either parses literally or fails here without touching
/// the filesystem or network.
pub(crate) fn parse_document(xml: &str) -> Result<XmlElement, String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => {
                // SEC-003: Reject excessively nested documents
                if stack.len() >= MAX_ELEMENT_DEPTH {
                    return Err(format!(
                        "element nesting exceeds maximum of {} levels",
                        MAX_ELEMENT_DEPTH
                    ));
                }
                if root.is_some() && stack.is_empty() {
                    return Err("multiple root elements".to_string());
                }
                stack.push(element_from_start(&start, &reader)?);
            }
            Ok(Event::Empty(start)) => {
                let element = element_from_start(&start, &reader)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let Some(element) = stack.pop() else {
                    return Err("closing tag without matching open tag".to_string());
                };
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(text)) => {
                if let Some(parent) = stack.last_mut() {
                    let value = text.unescape().map_err(|e| e.to_string())?;
                    parent.children.push(XmlNode::Text(value.into_owned()));
                }
            }
            Ok(Event::CData(cdata)) => {
                if let Some(parent) = stack.last_mut() {
                    let value = String::from_utf8_lossy(&cdata).into_owned();
                    parent.children.push(XmlNode::Text(value));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err("unexpected end of document inside open element".to_string());
    }
    root.ok_or_else(|| "no root element found".to_string())
}

fn element_from_start(
    start: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<XmlElement, String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr_result in start.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, element = %name, "Skipping malformed attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| e.to_string())?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut Vec<XmlElement>,
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err("multiple root elements".to_string());
    }
    *root = Some(element);
    Ok(())
}

fn classify_failure(xml: &str, diagnostic: String) -> ParseError {
    let lowered = xml.trim().to_lowercase();
    if lowered.starts_with("<!doctype html") || lowered.contains("<html") {
        ParseError::HtmlDocument
    } else {
        ParseError::Malformed(diagnostic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rss_items() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Feed</title>
    <item>
      <title>Mario&#8217;s Next Adventure</title>
      <link>https://example.com/mario</link>
      <description><![CDATA[<p>A &amp; B announced today.</p>]]></description>
      <pubDate>Mon, 15 Jan 2024 10:30:00 GMT</pubDate>
    </item>
    <item>
      <title>Second Story</title>
      <link>https://example.com/second</link>
      <description>Plain text here.</description>
      <pubDate>Tue, 16 Jan 2024 08:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

        let articles = parse_feed(xml).expect("valid RSS should parse");
        assert_eq!(articles.len(), 2);

        assert_eq!(articles[0].title, "Mario's Next Adventure");
        assert_eq!(articles[0].link, "https://example.com/mario");
        assert_eq!(articles[0].description, "A & B announced today.");
        assert_eq!(articles[0].iso_date, "2024-01-15T10:30:00.000Z");

        assert_eq!(articles[1].title, "Second Story");
        assert_eq!(articles[1].iso_date, "2024-01-16T08:00:00.000Z");
    }

    #[test]
    fn test_parse_atom_entries() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <entry>
    <title>Direct Announced</title>
    <link rel="alternate" href="https://example.com/direct"/>
    <summary>A new presentation is coming.</summary>
    <updated>2024-01-15T10:30:00Z</updated>
  </entry>
</feed>"#;

        let articles = parse_feed(xml).expect("valid Atom should parse");
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Direct Announced");
        assert_eq!(articles[0].link, "https://example.com/direct");
        assert_eq!(articles[0].description, "A new presentation is coming.");
        assert_eq!(articles[0].iso_date, "2024-01-15T10:30:00.000Z");
    }

    #[test]
    fn test_atom_link_preference() {
        let xml = r#"<feed>
  <entry>
    <title>Links</title>
    <link rel="self" href="https://example.com/self.xml"/>
    <link href="https://example.com/first"/>
    <link rel="alternate" href="https://example.com/alternate"/>
  </entry>
</feed>"#;

        let articles = parse_feed(xml).unwrap();
        assert_eq!(articles[0].link, "https://example.com/alternate");
    }

    #[test]
    fn test_atom_link_type_fallback() {
        let xml = r#"<feed>
  <entry>
    <title>Links</title>
    <link rel="self" href="https://example.com/self.xml"/>
    <link type="text/html" href="https://example.com/page"/>
  </entry>
</feed>"#;

        let articles = parse_feed(xml).unwrap();
        assert_eq!(articles[0].link, "https://example.com/page");
    }

    #[test]
    fn test_atom_link_text_fallback() {
        let xml = r#"<feed>
  <entry>
    <title>Legacy</title>
    <link>https://example.com/in-body</link>
  </entry>
</feed>"#;

        let articles = parse_feed(xml).unwrap();
        assert_eq!(articles[0].link, "https://example.com/in-body");
    }

    #[test]
    fn test_atom_description_falls_back_to_content() {
        let xml = r#"<feed>
  <entry>
    <title>No Summary</title>
    <link href="https://example.com/a"/>
    <content>Body text instead.</content>
  </entry>
</feed>"#;

        let articles = parse_feed(xml).unwrap();
        assert_eq!(articles[0].description, "Body text instead.");
    }

    #[test]
    fn test_article_cap() {
        let mut xml = String::from("<rss><channel>");
        for i in 0..15 {
            xml.push_str(&format!(
                "<item><title>Story {i}</title><link>https://example.com/{i}</link></item>"
            ));
        }
        xml.push_str("</channel></rss>");

        let articles = parse_feed(&xml).unwrap();
        assert_eq!(articles.len(), MAX_ARTICLES_PER_FEED);
        assert_eq!(articles[0].title, "Story 0");
        assert_eq!(articles[9].title, "Story 9");
    }

    #[test]
    fn test_items_missing_title_or_link_dropped() {
        let xml = r#"<rss><channel>
  <item><link>https://example.com/no-title</link></item>
  <item><title>No Link</title></item>
  <item><title>   </title><link>https://example.com/blank-title</link></item>
  <item><title>Kept</title><link>https://example.com/kept</link></item>
</channel></rss>"#;

        let articles = parse_feed(xml).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Kept");
    }

    #[test]
    fn test_rss_detection_wins_over_atom() {
        let xml = r#"<root>
  <item><title>Rss Item</title><link>https://example.com/rss</link></item>
  <entry><title>Atom Entry</title><link href="https://example.com/atom"/></entry>
</root>"#;

        let articles = parse_feed(xml).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Rss Item");
    }

    #[test]
    fn test_zero_items_is_not_an_error() {
        let xml = "<rss><channel><title>Empty</title></channel></rss>";
        let articles = parse_feed(xml).unwrap();
        assert!(articles.is_empty());
    }

    #[test]
    fn test_html_page_detected() {
        // Void elements make proxy error pages ill-formed as XML, which is
        // what routes them into the HTML sniff.
        let html = "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"></head><body>Denied</body></html>";
        let err = parse_feed(html).unwrap_err();
        assert!(matches!(err, ParseError::HtmlDocument));

        let fragment = "<div>oops</div><HTML>mixed case</HTML>";
        let err = parse_feed(fragment).unwrap_err();
        assert!(matches!(err, ParseError::HtmlDocument));
    }

    #[test]
    fn test_well_formed_xhtml_parses_to_zero_articles() {
        let xhtml = "<html><head><title>ok</title></head><body><p>hi</p></body></html>";
        let articles = parse_feed(xhtml).unwrap();
        assert!(articles.is_empty());
    }

    #[test]
    fn test_unclosed_document_is_malformed() {
        let err = parse_feed("<rss><channel><item>").unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn test_garbage_input_is_malformed() {
        let err = parse_feed("definitely not xml").unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));

        let err = parse_feed("").unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn test_undeclared_entity_is_malformed() {
        let xml = "<rss><channel><item><title>a&nbsp;b</title><link>https://example.com</link></item></channel></rss>";
        let err = parse_feed(xml).unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn test_nesting_depth_limit() {
        let mut xml = String::new();
        for _ in 0..60 {
            xml.push_str("<a>");
        }
        for _ in 0..60 {
            xml.push_str("</a>");
        }

        let err = parse_feed(&xml).unwrap_err();
        match err {
            ParseError::Malformed(diagnostic) => {
                assert!(diagnostic.contains("nesting"), "got: {diagnostic}")
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_date_passes_through() {
        let xml = r#"<rss><channel>
  <item><title>Odd Date</title><link>https://example.com/a</link><pubDate>soonish</pubDate></item>
</channel></rss>"#;

        let articles = parse_feed(xml).unwrap();
        assert_eq!(articles[0].display_date, "soonish");
        assert_eq!(articles[0].iso_date, "");
    }

    #[test]
    fn test_text_content_preserves_document_order() {
        let root = parse_document("<p>alpha <b>beta</b> gamma</p>").unwrap();
        assert_eq!(root.text_content(), "alpha beta gamma");
    }

    #[test]
    fn test_qualified_names_match_exactly() {
        let root = parse_document(
            r#"<item><media:thumbnail url="https://example.com/t.jpg"/><thumbnail url="https://example.com/p.jpg"/></item>"#,
        )
        .unwrap();
        let media = root.first_descendant("media:thumbnail").unwrap();
        assert_eq!(media.attr("url"), Some("https://example.com/t.jpg"));
        let plain = root.first_descendant("thumbnail").unwrap();
        assert_eq!(plain.attr("url"), Some("https://example.com/p.jpg"));
    }
}
