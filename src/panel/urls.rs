//! OBS browser-source URLs shown in the control panel.

use crate::types::{NameTag, Slot, DEFAULT_NAME, DEFAULT_SUBTEXT};

/// Directory URL the panel is served from, always with a trailing slash.
///
/// `/` and any path ending in `/index.html` map to the origin root, so
/// a panel served from a subdirectory index still points at the site's
/// `components/`. A path ending in `/` is kept; otherwise the last segment
/// is dropped.
pub fn base_url(origin: &str, pathname: &str) -> String {
    let origin = origin.trim_end_matches('/');
    if pathname.is_empty() || pathname == "/" || pathname.ends_with("/index.html") {
        return format!("{origin}/");
    }
    if pathname.ends_with('/') {
        return format!("{origin}{pathname}");
    }
    match pathname.rfind('/') {
        Some(idx) => format!("{origin}{}", &pathname[..=idx]),
        None => format!("{origin}/"),
    }
}

/// URL builder rooted at the panel's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayUrls {
    base: String,
}

impl OverlayUrls {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self { base }
    }

    pub fn from_location(origin: &str, pathname: &str) -> Self {
        Self::new(base_url(origin, pathname))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Ticker tape URL. `cache_bust` appends `t` so OBS reloads the source.
    pub fn ticker(&self, speed: u32, cache_bust: Option<i64>) -> String {
        let mut url = format!("{}components/ticker.html?speed={speed}", self.base);
        if let Some(t) = cache_bust {
            url.push_str(&format!("&t={t}"));
        }
        url
    }

    pub fn header(&self) -> String {
        format!("{}components/header.html", self.base)
    }

    pub fn header_auto(&self) -> String {
        format!("{}components/header-auto.html", self.base)
    }

    /// Static name-tag URL carrying the text itself. Empty fields fall back
    /// to the display defaults.
    pub fn nametag(&self, index: usize, tag: &NameTag, cache_bust: i64) -> String {
        let name = if tag.name.is_empty() { DEFAULT_NAME } else { &tag.name };
        let subtext = if tag.subtext.is_empty() { DEFAULT_SUBTEXT } else { &tag.subtext };
        format!(
            "{}components/nametag.html?id={index}&name={}&subtext={}&t={cache_bust}",
            self.base,
            urlencoding::encode(name),
            urlencoding::encode(subtext)
        )
    }

    /// Polling name-tag URL for one slot; set once in OBS.
    pub fn nametag_auto(&self, slot: Slot) -> String {
        format!("{}components/nametag-auto.html?id={slot}", self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("https://obs.example", "/"), "https://obs.example/");
        assert_eq!(base_url("https://obs.example", "/index.html"), "https://obs.example/");
        assert_eq!(
            base_url("https://obs.example", "/panel/index.html"),
            "https://obs.example/"
        );
        assert_eq!(
            base_url("https://obs.example", "/panel/"),
            "https://obs.example/panel/"
        );
        assert_eq!(
            base_url("https://obs.example", "/panel/dashboard.html"),
            "https://obs.example/panel/"
        );
        assert_eq!(base_url("http://localhost:3000", ""), "http://localhost:3000/");
    }

    #[test]
    fn test_subdirectory_index_points_at_site_root() {
        let urls = OverlayUrls::from_location("https://obs.example/", "/tools/panel/index.html");
        assert_eq!(urls.base(), "https://obs.example/");
        assert_eq!(urls.header(), "https://obs.example/components/header.html");
    }

    #[test]
    fn test_ticker_url() {
        let urls = OverlayUrls::new("http://localhost:3000");
        assert_eq!(
            urls.ticker(50, None),
            "http://localhost:3000/components/ticker.html?speed=50"
        );
        assert_eq!(
            urls.ticker(80, Some(1700)),
            "http://localhost:3000/components/ticker.html?speed=80&t=1700"
        );
    }

    #[test]
    fn test_nametag_urls() {
        let urls = OverlayUrls::from_location("https://obs.example", "/index.html");
        let tag = NameTag {
            name: "Ada Lovelace".into(),
            subtext: String::new(),
            ..NameTag::default()
        };
        assert_eq!(
            urls.nametag(2, &tag, 99),
            "https://obs.example/components/nametag.html?id=2&name=Ada%20Lovelace&subtext=Subtext&t=99"
        );
        assert_eq!(
            urls.nametag_auto(Slot::new(4).unwrap()),
            "https://obs.example/components/nametag-auto.html?id=4"
        );
        assert_eq!(urls.header_auto(), "https://obs.example/components/header-auto.html");
        assert_eq!(urls.header(), "https://obs.example/components/header.html");
    }
}
