use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::feed::parser::{FeedFormat, XmlElement};

/// Selectors tried against embedded article markup, most specific first.
/// Only the first element matching each selector is considered; a rejected
/// element moves on to the next selector, not the next element.
static CONTENT_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "img.wp-post-image",
        "img.attachment-large",
        "img.featured",
        "img[width][height]",
        r#"img[src*="featured"]"#,
        r#"img[src*="banner"]"#,
        r#"img[src*="hero"]"#,
        r#"img:not([src*="avatar"]):not([src*="icon"]):not([src*="logo"])"#,
        "img",
    ]
    .into_iter()
    .map(|selector| Selector::parse(selector).unwrap())
    .collect()
});

/// The forgiving second sweep over the description, run only after the
/// strict pass found nothing. No dimension filtering here.
static RELAXED_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "img.wp-post-image",
        "img.attachment-large",
        "img.featured",
        "img[width]",
        "img",
    ]
    .into_iter()
    .map(|selector| Selector::parse(selector).unwrap())
    .collect()
});

static IMG_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>]*\.(?:jpg|jpeg|png|gif|webp)(?:\?[^\s"'<>]*)?"#).unwrap()
});

/// Attribute dimensions below this are treated as tracking pixels or
/// spacer images and skipped during the strict pass.
const MIN_DIMENSION: u32 = 100;

const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Picks a thumbnail URL for a feed item, or `None` when nothing usable
/// turns up.
///
/// Three stages run in order, stopping at the first candidate: dedicated
/// metadata elements on the item itself, an HTML scan over embedded content
/// fields, and finally a relaxed re-scan of the description. The candidate
/// then has to survive [`finalize`], which resolves root-relative paths
/// against the article link and rejects URLs that do not look like images.
/// `description` is the raw field as parsed, before markup stripping.
pub(crate) fn extract_image(
    item: &XmlElement,
    description: &str,
    format: FeedFormat,
) -> Option<String> {
    let mut candidate = match format {
        FeedFormat::Atom => atom_candidate(item),
        FeedFormat::Rss => rss_candidate(item),
    };

    if candidate.is_none() {
        let fields = [
            item.first_descendant("content:encoded")
                .map(|element| element.text_content()),
            item.first_descendant("content")
                .map(|element| element.text_content()),
            item.first_descendant("summary")
                .map(|element| element.text_content()),
            Some(description.to_string()),
        ];
        for field in fields.iter().flatten() {
            if field.is_empty() {
                continue;
            }
            if let Some(found) = scan_markup(field, false) {
                candidate = Some(found);
                break;
            }
        }
    }

    if candidate.is_none() && !description.is_empty() {
        candidate = scan_markup(description, true);
    }

    finalize(candidate?, item)
}

/// Atom items carry images either as an enclosure link or buried in HTML
/// content. The content branch hands back the raw markup string, which
/// almost never survives [`finalize`]; that keeps the behavior a strict
/// gate rather than a guess.
fn atom_candidate(item: &XmlElement) -> Option<String> {
    item.find_descendant(&|element| {
        element.name == "link" && element.attr("rel") == Some("enclosure")
    })
    .and_then(|element| element.attr("href"))
    .filter(|href| !href.is_empty())
    .map(str::to_string)
    .or_else(|| {
        item.find_descendant(&|element| {
            element.name == "content" && element.attr("type") == Some("html")
        })
        .map(|element| element.text_content())
        .filter(|text| !text.is_empty())
    })
}

/// The metadata gauntlet for RSS items. First non-empty value wins; an
/// element that exists but has an empty value falls through to the next
/// entry. The order reflects how reliable each vendor extension is in
/// practice, not any standard.
fn rss_candidate(item: &XmlElement) -> Option<String> {
    element_attr_where(item, "enclosure", "url", |element| {
        attr_starts_with(element, "type", "image")
    })
    .or_else(|| element_attr(item, "enclosure", "url"))
    .or_else(|| element_attr(item, "media:thumbnail", "url"))
    .or_else(|| element_attr(item, "thumbnail", "url"))
    .or_else(|| {
        element_attr_where(item, "media:content", "url", |element| {
            attr_starts_with(element, "type", "image")
        })
    })
    .or_else(|| element_attr(item, "media:content", "url"))
    .or_else(|| element_text(item, "image"))
    .or_else(|| grouped_thumbnail(item))
    .or_else(|| element_text(item, "wp:post_thumbnail"))
    .or_else(|| element_text(item, "wp:featuredImage"))
    .or_else(|| element_attr(item, "ign:image", "url"))
    .or_else(|| element_attr(item, "ign:thumbnail", "url"))
    .or_else(|| element_text(item, "feedburner:origEnclosureLink"))
    .or_else(|| element_attr(item, "itunes:image", "href"))
    .or_else(|| element_attr(item, "googleplay:image", "href"))
    .or_else(|| element_text(item, "yoast:image"))
    .or_else(|| element_attr(item, "og:image", "content"))
}

fn element_attr(item: &XmlElement, name: &str, attr: &str) -> Option<String> {
    item.first_descendant(name)
        .and_then(|element| element.attr(attr))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn element_attr_where<F>(item: &XmlElement, name: &str, attr: &str, pred: F) -> Option<String>
where
    F: Fn(&XmlElement) -> bool,
{
    item.find_descendant(&|element| element.name == name && pred(element))
        .and_then(|element| element.attr(attr))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn element_text(item: &XmlElement, name: &str) -> Option<String> {
    item.first_descendant(name)
        .map(|element| element.text_content())
        .filter(|text| !text.is_empty())
}

fn attr_starts_with(element: &XmlElement, attr: &str, prefix: &str) -> bool {
    element
        .attr(attr)
        .is_some_and(|value| value.starts_with(prefix))
}

/// `media:thumbnail` nested under a `media:group`, as YouTube and some
/// video-heavy feeds emit it.
fn grouped_thumbnail(item: &XmlElement) -> Option<String> {
    item.find_descendant(&|element| {
        element.name == "media:group" && element.first_descendant("media:thumbnail").is_some()
    })
    .and_then(|group| group.first_descendant("media:thumbnail"))
    .and_then(|thumbnail| thumbnail.attr("url"))
    .filter(|url| !url.is_empty())
    .map(str::to_string)
}

/// Runs the selector pass and then the regex fallback over one markup
/// field. `relaxed` switches to the reduced selector list, drops the
/// dimension filter, and loosens the regex preference.
fn scan_markup(field: &str, relaxed: bool) -> Option<String> {
    let doc = Html::parse_fragment(field);
    let selectors: &[Selector] = if relaxed {
        &RELAXED_SELECTORS
    } else {
        &CONTENT_SELECTORS
    };
    select_image(&doc, selectors, !relaxed).or_else(|| preferred_regex_match(field, relaxed))
}

fn select_image(doc: &Html, selectors: &[Selector], check_dimensions: bool) -> Option<String> {
    for selector in selectors {
        let Some(img) = doc.select(selector).next() else {
            continue;
        };
        if check_dimensions && is_too_small(&img) {
            continue;
        }
        if let Some(src) = preferred_src(&img) {
            return Some(src.to_string());
        }
    }
    None
}

/// Lazy-loading attributes carry the real URL when present; `src` is often
/// a placeholder on those images.
fn preferred_src<'a>(img: &ElementRef<'a>) -> Option<&'a str> {
    for key in ["data-src", "data-lazy-src", "src"] {
        if let Some(value) = img.value().attr(key) {
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

fn is_too_small(img: &ElementRef<'_>) -> bool {
    rejects_dimension(img.value().attr("width")) || rejects_dimension(img.value().attr("height"))
}

fn rejects_dimension(value: Option<&str>) -> bool {
    parse_dimension(value).is_some_and(|n| n < MIN_DIMENSION)
}

/// Leading digits of the attribute value, `None` when there are none.
/// `"500px"` parses as 500; `"auto"` does not parse and therefore passes
/// the size filter.
fn parse_dimension(value: Option<&str>) -> Option<u32> {
    let digits: String = value?
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

fn preferred_regex_match(text: &str, relaxed: bool) -> Option<String> {
    let matches: Vec<&str> = IMG_URL_REGEX.find_iter(text).map(|m| m.as_str()).collect();
    if matches.is_empty() {
        return None;
    }
    let preferred = matches.iter().copied().find(|url| {
        let blocked = url.contains("thumbnail")
            || url.contains("avatar")
            || url.contains("icon")
            || (!relaxed && url.contains("logo"));
        let favored = url.contains("large")
            || url.contains("medium")
            || (!relaxed && url.contains("featured"))
            || !url.contains("small");
        !blocked && favored
    });
    Some(preferred.unwrap_or(matches[0]).to_string())
}

/// Final gate for a raw candidate.
///
/// A single leading slash is resolved against the origin of the item's
/// link; an unparseable link abandons the candidate entirely, while a
/// missing link leaves the path unresolved so the scheme check below drops
/// it. The survivor must look like an image URL: http or protocol-relative,
/// and either a known extension or the substring "image" somewhere in it.
fn finalize(candidate: String, item: &XmlElement) -> Option<String> {
    let mut resolved = candidate.trim().to_string();

    if resolved.starts_with('/') && !resolved.starts_with("//") {
        let link = item
            .first_descendant("link")
            .map(|element| element.text_content().trim().to_string())
            .unwrap_or_default();
        if !link.is_empty() {
            let origin = Url::parse(&link).ok()?.origin().ascii_serialization();
            resolved = format!("{origin}{resolved}");
        }
    }

    let plausible_scheme = resolved.starts_with("http") || resolved.starts_with("//");
    let plausible_image = IMAGE_EXTENSIONS.iter().any(|ext| resolved.contains(ext))
        || resolved.contains("image");
    (plausible_scheme && plausible_image).then_some(resolved)
}
