use serde::{Deserialize, Serialize};

/// A configured news feed with display metadata.
///
/// Sources are static input to the pipeline: loaded once (from the built-in
/// list or configuration) and never discovered or mutated at runtime. Two
/// sources are the same feed iff their `feed_url` matches; `name`,
/// `homepage`, and `accent_color` exist for the rendering boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    #[serde(default)]
    pub homepage: Option<String>,
    pub feed_url: String,
    pub accent_color: String,
}

impl Source {
    pub fn new(
        name: &str,
        homepage: Option<&str>,
        feed_url: &str,
        accent_color: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            homepage: homepage.map(str::to_string),
            feed_url: feed_url.to_string(),
            accent_color: accent_color.to_string(),
        }
    }
}

/// The built-in source list, in render order.
pub fn default_sources() -> Vec<Source> {
    vec![
        Source::new(
            "Nintendo Life",
            Some("https://www.nintendolife.com/"),
            "https://www.nintendolife.com/feeds/latest",
            "#e60012",
        ),
        Source::new(
            "Nintendo World Report",
            Some("https://www.nintendoworldreport.com/"),
            "https://www.nintendoworldreport.com/rss",
            "#2399cb",
        ),
        Source::new(
            "Pure Nintendo",
            Some("https://www.purenintendo.com/"),
            "https://www.purenintendo.com/feed",
            "#d45500",
        ),
        Source::new(
            "My Nintendo News",
            Some("https://mynintendonews.com/"),
            "https://mynintendonews.com/feed/",
            "#00c2ff",
        ),
        Source::new(
            "GoNintendo",
            None,
            "https://gonintendo.com/feeds/story.xml",
            "#cb433f",
        ),
        Source::new(
            "Nintendo Everything",
            Some("https://nintendoeverything.com/"),
            "https://nintendoeverything.com/feed",
            "#00bff3",
        ),
        Source::new(
            "IGN Nintendo",
            Some("https://www.ign.com/"),
            "https://www.ign.com/rss/v2/articles/feed?channel=nintendo",
            "#FFFFFF",
        ),
        Source::new(
            "Nintendo Insider",
            Some("https://www.nintendo-insider.com/"),
            "https://nintendo-insider.com/feed",
            "#e91823",
        ),
        Source::new(
            "Nintendo Fuse",
            Some("https://nintendofuse.com/"),
            "https://nintendofuse.com/rss",
            "#78c3fb",
        ),
        Source::new(
            "Nintendo Soup",
            Some("https://nintendosoup.com/"),
            "https://nintendosoup.com/feed",
            "#ff0c0c",
        ),
        Source::new(
            "Nintendojo",
            Some("https://www.nintendojo.com/"),
            "https://www.nintendojo.com/feed",
            "#f6024a",
        ),
        Source::new(
            "Nintendo Wire",
            Some("https://nintendowire.com/"),
            "https://nintendowire.com/feed",
            "#ffcd00",
        ),
    ]
}
