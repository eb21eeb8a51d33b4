use std::borrow::Cow;

use scraper::Html;

/// Maximum number of characters kept in a cleaned description.
const MAX_DESCRIPTION_CHARS: usize = 200;
/// Ellipsis string appended when a description is truncated
const ELLIPSIS: &str = "...";

/// Ordered substitution table applied by [`repair_text`] after markup
/// stripping. The first group repairs literal mis-decoded byte sequences
/// (UTF-8 read through a single-byte codepage somewhere upstream); the second
/// group normalizes already-correct Unicode punctuation to ASCII. Entries run
/// sequentially over the whole string, so earlier entries can shadow later
/// ones (the bare `\u{e2}\u{20ac}` entry consumes the prefix of the
/// dash/bullet/prime sequences below it). The order is load-bearing; do not
/// sort.
const ENCODING_FIXES: &[(&str, &str)] = &[
    // Mis-decoded accented latin letters
    ("\u{c3}\u{a9}", "\u{e9}"), // é
    ("\u{c3}\u{a1}", "\u{e1}"), // á
    ("\u{c3} ", "\u{e0}"),      // à
    ("\u{c3}\u{b3}", "\u{f3}"), // ó
    ("\u{c3}\u{ad}", "\u{ed}"), // í
    ("\u{c3}\u{ba}", "\u{fa}"), // ú
    ("\u{c3}\u{b1}", "\u{f1}"), // ñ
    ("\u{c3}\u{a7}", "\u{e7}"), // ç
    // Mis-decoded smart punctuation
    ("\u{e2}\u{20ac}\u{2122}", "'"),
    ("\u{e2}\u{20ac}\u{153}", "\""),
    ("\u{e2}\u{20ac}", "\""),
    ("\u{e2}\u{20ac}\"", "\u{2013}"),
    ("\u{e2}\u{20ac}\u{a2}", "\u{2022}"),
    ("\u{e2}\u{20ac}\u{b2}", "\u{2032}"),
    ("\u{e2}\u{20ac}\u{b3}", "\u{2033}"),
    ("\u{c2}", " "),
    // Apostrophes whose trailing bytes were eaten entirely, leaving a bare
    // `\u{e2}` glued to the next word ("one\u{e2}s" for "one's")
    ("\u{e2}s", "'s"),
    ("\u{e2}ve", "'ve"),
    ("\u{e2}re", "'re"),
    ("\u{e2}ll", "'ll"),
    ("\u{e2}t", "'t"),
    ("\u{e2}d", "'d"),
    ("\u{e2}m", "'m"),
    ("\u{e2}", "'"),
    ("\u{c2}\u{b4}", "'"),
    ("\u{c2}`", "'"),
    // Correct Unicode punctuation normalized to ASCII
    ("\u{2018}", "'"),
    ("\u{2019}", "'"),
    ("\u{201c}", "\""),
    ("\u{201d}", "\""),
    ("\u{2013}", "-"),
    ("\u{2014}", "--"),
    ("\u{2026}", "..."),
];

/// Strips markup from feed text and decodes HTML entities.
///
/// Parses the input as an HTML fragment and returns the concatenated text
/// content, which is what feed consumers actually want from fields that mix
/// prose with embedded tags. Entities are decoded in the process
/// (`&amp;` -> `&`, `&rsquo;` -> `\u{2019}`, numeric references, etc.).
///
/// Returns `Cow::Borrowed` when the input contains neither tags nor entities
/// (the common case for titles), and skips fragment parsing entirely when
/// only entities are present.
pub fn strip_markup(text: &str) -> Cow<'_, str> {
    if !text.contains('<') {
        if text.contains('&') {
            return html_escape::decode_html_entities(text);
        }
        return Cow::Borrowed(text);
    }
    let fragment = Html::parse_fragment(text);
    Cow::Owned(fragment.root_element().text().collect())
}

/// Repairs mis-encoded feed text.
///
/// Feeds served through the proxy transports regularly arrive with UTF-8
/// sequences that were decoded through a single-byte codepage upstream
/// ("one\u{e2}s" instead of "one's", "caf\u{c3}\u{a9}" instead of "café").
/// This strips markup, decodes entities, then applies [`ENCODING_FIXES`] in
/// table order, each entry replacing every occurrence before the next entry
/// runs.
///
/// # Examples
///
/// ```
/// use newsrack::util::repair_text;
///
/// assert_eq!(repair_text("one\u{e2}s book"), "one's book");
/// assert_eq!(repair_text("caf\u{c3}\u{a9}"), "caf\u{e9}");
/// ```
pub fn repair_text(text: &str) -> Cow<'_, str> {
    let mut out = strip_markup(text);
    for (broken, fixed) in ENCODING_FIXES {
        if out.contains(broken) {
            out = Cow::Owned(out.replace(broken, fixed));
        }
    }
    out
}

/// Cleans a raw feed description for display.
///
/// Repairs encoding, strips markup a second time (entity decoding in the
/// first pass can reveal another layer of markup in double-escaped feeds),
/// and hard-truncates to 200 characters with a trailing `...` marker.
/// Empty input yields an empty string.
pub fn clean_description(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let repaired = repair_text(text);
    let cleaned = strip_markup(&repaired);
    match cleaned.char_indices().nth(MAX_DESCRIPTION_CHARS) {
        Some((cut, _)) => format!("{}{}", &cleaned[..cut], ELLIPSIS),
        None => cleaned.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // strip_markup tests
    // ========================================================================

    #[test]
    fn test_plain_text_returns_borrowed() {
        let input = "Just a plain headline";
        let result = strip_markup(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_entities_decoded_without_tags() {
        assert_eq!(strip_markup("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(strip_markup("1 &lt; 2"), "1 < 2");
        assert_eq!(strip_markup("it&rsquo;s"), "it\u{2019}s");
        assert_eq!(strip_markup("&#8230;"), "\u{2026}");
    }

    #[test]
    fn test_tags_stripped() {
        assert_eq!(strip_markup("<p>Hello <b>world</b></p>"), "Hello world");
        assert_eq!(
            strip_markup("before <img src=\"x.jpg\"> after"),
            "before  after"
        );
    }

    #[test]
    fn test_tags_and_entities_together() {
        assert_eq!(strip_markup("<p>Mario &amp; Luigi</p>"), "Mario & Luigi");
    }

    // ========================================================================
    // repair_text tests
    // ========================================================================

    #[test]
    fn test_repairs_eaten_apostrophes() {
        // The trailing bytes of a mis-decoded right quote can vanish entirely,
        // leaving a bare \u{e2} glued to the contraction suffix.
        assert_eq!(repair_text("one\u{e2}s book"), "one's book");
        assert_eq!(repair_text("don\u{e2}t"), "don't");
        assert_eq!(repair_text("I\u{e2}ve seen it"), "I've seen it");
        assert_eq!(repair_text("you\u{e2}re"), "you're");
        assert_eq!(repair_text("she\u{e2}ll"), "she'll");
        assert_eq!(repair_text("I\u{e2}d"), "I'd");
        assert_eq!(repair_text("I\u{e2}m"), "I'm");
    }

    #[test]
    fn test_repairs_accent_mojibake() {
        assert_eq!(repair_text("caf\u{c3}\u{a9}"), "caf\u{e9}");
        assert_eq!(repair_text("ma\u{c3}\u{b1}ana"), "ma\u{f1}ana");
        assert_eq!(repair_text("gar\u{c3}\u{a7}on"), "gar\u{e7}on");
    }

    #[test]
    fn test_repairs_smart_quote_mojibake() {
        // \u{e2}\u{20ac}\u{2122} is the fully mis-decoded right single quote
        assert_eq!(repair_text("it\u{e2}\u{20ac}\u{2122}s"), "it's");
        // opening quote survives, closing quote lost its final byte; the bare
        // \u{e2}\u{20ac} entry catches the remnant
        assert_eq!(
            repair_text("\u{e2}\u{20ac}\u{153}wow\u{e2}\u{20ac}"),
            "\"wow\""
        );
    }

    #[test]
    fn test_table_order_shadows_longer_sequences() {
        // The bare \u{e2}\u{20ac} entry runs before the bullet entry, so the
        // bullet sequence is consumed as quote + stray cent sign. Carried
        // over from the original table as documented behavior.
        assert_eq!(
            repair_text("full\u{e2}\u{20ac}\u{a2}stop"),
            "full\"\u{a2}stop"
        );
    }

    #[test]
    fn test_normalizes_unicode_punctuation() {
        assert_eq!(repair_text("\u{2018}hi\u{2019}"), "'hi'");
        assert_eq!(repair_text("\u{201c}hi\u{201d}"), "\"hi\"");
        assert_eq!(repair_text("a\u{2013}b"), "a-b");
        assert_eq!(repair_text("a\u{2014}b"), "a--b");
        assert_eq!(repair_text("wait\u{2026}"), "wait...");
    }

    #[test]
    fn test_stray_codepage_prefix_becomes_space() {
        // \u{c2} is the leftover lead byte of a mis-decoded no-break space
        assert_eq!(repair_text("100\u{c2}%"), "100 %");
    }

    #[test]
    fn test_repair_decodes_entities_first() {
        // Entity decoding happens before the substitution pass, so an escaped
        // mojibake sequence still gets repaired.
        assert_eq!(repair_text("one&#226;s book"), "one's book");
    }

    #[test]
    fn test_repair_empty() {
        assert_eq!(repair_text(""), "");
    }

    // ========================================================================
    // clean_description tests
    // ========================================================================

    #[test]
    fn test_clean_empty_description() {
        assert_eq!(clean_description(""), "");
    }

    #[test]
    fn test_clean_strips_markup_and_repairs() {
        assert_eq!(
            clean_description("<p>Mario\u{e2}s <b>new</b> adventure</p>"),
            "Mario's new adventure"
        );
    }

    #[test]
    fn test_clean_unwraps_double_escaped_markup() {
        // First pass decodes the entities into tags, second pass strips them.
        assert_eq!(
            clean_description("&lt;b&gt;Bold&lt;/b&gt; move"),
            "Bold move"
        );
    }

    #[test]
    fn test_clean_truncates_long_descriptions() {
        let long = "a".repeat(250);
        let cleaned = clean_description(&long);
        assert_eq!(cleaned.chars().count(), 203);
        assert!(cleaned.ends_with("..."));
        assert!(cleaned.starts_with("aaa"));
    }

    #[test]
    fn test_clean_keeps_exactly_200_chars() {
        let exact = "b".repeat(200);
        assert_eq!(clean_description(&exact), exact);
        let over = "b".repeat(201);
        assert_eq!(clean_description(&over), format!("{}...", "b".repeat(200)));
    }

    #[test]
    fn test_clean_truncates_on_char_boundary() {
        let cjk = "\u{65e5}".repeat(210);
        let cleaned = clean_description(&cjk);
        assert_eq!(cleaned.chars().count(), 203);
        assert!(cleaned.ends_with("..."));
    }
}
