//! Browse-state persistence and the shareable URL codec.
//!
//! Two independent, best-effort sinks keep the filter state alive: each
//! dimension is mirrored to its own key in the local namespace, and the
//! whole state encodes to URL query parameters with defaults omitted (an
//! empty query string means all-defaults). On startup URL parameters win
//! and stored values fill the gaps.

use crate::kv::Kv;
use crate::query::{BrowseState, PopularityBracket, PricingTier, SortOrder, ALL_CATEGORIES};
use crate::store::keys;

/// Values decoded from one of the two sinks; `None` means "not present".
#[derive(Debug, Default, Clone)]
pub struct PartialState {
    pub search: Option<String>,
    pub category: Option<String>,
    pub pricing: Option<PricingTier>,
    pub popularity: Option<PopularityBracket>,
    pub sort: Option<SortOrder>,
    pub page: Option<u32>,
}

impl PartialState {
    /// Overlay onto `base`, keeping `base` where this is `None`.
    fn apply(self, mut base: BrowseState) -> BrowseState {
        if let Some(v) = self.search {
            base.search = v;
        }
        if let Some(v) = self.category {
            base.category = v;
        }
        if let Some(v) = self.pricing {
            base.pricing = v;
        }
        if let Some(v) = self.popularity {
            base.popularity = v;
        }
        if let Some(v) = self.sort {
            base.sort = v;
        }
        if let Some(v) = self.page {
            base.page = v.max(1);
        }
        base
    }
}

/// Handle to the preference keys in the local namespace.
#[derive(Clone)]
pub struct Prefs {
    kv: Kv,
}

impl Prefs {
    pub fn new(kv: Kv) -> Self {
        Self { kv }
    }

    /// Mirror every dimension to its key. Five independent writes, each
    /// best-effort.
    pub fn store(&self, state: &BrowseState) {
        self.put(keys::BROWSE_SEARCH, &state.search);
        self.put(keys::BROWSE_CATEGORY, &state.category);
        self.put(keys::BROWSE_PRICING, state.pricing.as_str());
        self.put(keys::BROWSE_POPULARITY, state.popularity.as_str());
        self.put(keys::BROWSE_SORT, state.sort.as_str());
    }

    fn put(&self, key: &str, value: &str) {
        if let Err(e) = self.kv.write_json(key, &value) {
            tracing::warn!(key, error = %e, "failed to persist preference");
        }
    }

    /// Drop all stored dimensions (the clear-filters action).
    pub fn clear(&self) {
        for key in [
            keys::BROWSE_SEARCH,
            keys::BROWSE_CATEGORY,
            keys::BROWSE_PRICING,
            keys::BROWSE_POPULARITY,
            keys::BROWSE_SORT,
        ] {
            if let Err(e) = self.kv.remove(key) {
                tracing::warn!(key, error = %e, "failed to clear preference");
            }
        }
    }

    pub fn load_stored(&self) -> PartialState {
        PartialState {
            search: self.kv.read_json(keys::BROWSE_SEARCH),
            category: self.kv.read_json(keys::BROWSE_CATEGORY),
            pricing: self
                .kv
                .read_json::<String>(keys::BROWSE_PRICING)
                .and_then(|s| PricingTier::parse(&s)),
            popularity: self
                .kv
                .read_json::<String>(keys::BROWSE_POPULARITY)
                .and_then(|s| PopularityBracket::parse(&s)),
            sort: self
                .kv
                .read_json::<String>(keys::BROWSE_SORT)
                .and_then(|s| SortOrder::parse(&s)),
            page: None,
        }
    }

    /// Resolve the initial state: URL parameters first, stored
    /// preferences as fallback, defaults last.
    pub fn initial_state(&self, url: Option<&str>) -> BrowseState {
        let base = self.load_stored().apply(BrowseState::default());
        match url {
            Some(url) => decode_query(url).apply(base),
            None => base,
        }
    }

    pub fn dark_mode(&self) -> bool {
        self.kv.read_json(keys::DARK_MODE).unwrap_or(false)
    }

    pub fn set_dark_mode(&self, enabled: bool) {
        if let Err(e) = self.kv.write_json(keys::DARK_MODE, &enabled) {
            tracing::warn!(error = %e, "failed to persist dark mode");
        }
    }
}

// ============ URL query codec ============

/// Encode the state as a query string, omitting defaults. All-defaults
/// encodes to the empty string.
pub fn encode_query(state: &BrowseState) -> String {
    let defaults = BrowseState::default();
    let mut pairs: Vec<(&str, String)> = Vec::new();

    if !state.search.is_empty() {
        pairs.push(("q", state.search.clone()));
    }
    if state.category != ALL_CATEGORIES {
        pairs.push(("category", state.category.clone()));
    }
    if state.pricing != defaults.pricing {
        pairs.push(("pricing", state.pricing.as_str().to_string()));
    }
    if state.popularity != defaults.popularity {
        pairs.push(("popularity", state.popularity.as_str().to_string()));
    }
    if state.sort != defaults.sort {
        pairs.push(("sort", state.sort.as_str().to_string()));
    }
    if state.page > 1 {
        pairs.push(("page", state.page.to_string()));
    }

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Decode query parameters from a query string or a full URL.
/// Unrecognized values fall back to that dimension's default by staying
/// `None`.
pub fn decode_query(input: &str) -> PartialState {
    let query = match input.split_once('?') {
        Some((_, q)) => q,
        None => input,
    };
    let query = query.trim_start_matches('?');

    partial_from_pairs(query.split('&').filter(|p| !p.is_empty()).map(|pair| {
        match pair.split_once('=') {
            Some((k, v)) => (k, percent_decode(v)),
            None => (pair, String::new()),
        }
    }))
}

/// Build a partial state from already-decoded key/value pairs (query
/// extractors, CLI flags).
pub fn partial_from_pairs<'a>(
    pairs: impl Iterator<Item = (&'a str, String)>,
) -> PartialState {
    let mut state = PartialState::default();
    for (key, value) in pairs {
        match key {
            "q" => state.search = Some(value),
            "category" => state.category = Some(value),
            "pricing" => state.pricing = PricingTier::parse(&value),
            "popularity" => state.popularity = PopularityBracket::parse(&value),
            "sort" => state.sort = SortOrder::parse(&value),
            "page" => state.page = value.parse().ok().filter(|p| *p >= 1),
            _ => {}
        }
    }
    state
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn percent_decode(value: &str) -> String {
    let mut bytes = Vec::with_capacity(value.len());
    let mut iter = value.bytes();
    while let Some(byte) = iter.next() {
        match byte {
            b'+' => bytes.push(b' '),
            b'%' => {
                let hi = iter.next();
                let lo = iter.next();
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        let hex = [hi, lo];
                        match u8::from_str_radix(std::str::from_utf8(&hex).unwrap_or("00"), 16) {
                            Ok(decoded) => bytes.push(decoded),
                            Err(_) => {
                                bytes.push(b'%');
                                bytes.extend_from_slice(&hex);
                            }
                        }
                    }
                    _ => bytes.push(b'%'),
                }
            }
            other => bytes.push(other),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_encode_to_empty() {
        assert_eq!(encode_query(&BrowseState::default()), "");
    }

    #[test]
    fn query_round_trips() {
        let mut state = BrowseState::default();
        state.search = "image upscaling".to_string();
        state.category = "Image Generation".to_string();
        state.pricing = PricingTier::Freemium;
        state.sort = SortOrder::Popular;
        state.page = 2;

        let query = encode_query(&state);
        assert!(query.contains("q=image+upscaling"));
        assert!(query.contains("category=Image%20Generation") || query.contains("category=Image+Generation"));

        let decoded = decode_query(&query).apply(BrowseState::default());
        assert_eq!(decoded, state);
    }

    #[test]
    fn full_urls_and_bad_values_are_tolerated() {
        let decoded = decode_query("https://tooldex.dev/browse?pricing=Cheap&sort=popular&page=0");
        assert!(decoded.pricing.is_none());
        assert_eq!(decoded.sort, Some(SortOrder::Popular));
        assert!(decoded.page.is_none());
    }

    #[test]
    fn url_wins_over_stored_preferences() {
        let tmp = TempDir::new().unwrap();
        let prefs = Prefs::new(Kv::open(tmp.path()).unwrap());

        let mut stored = BrowseState::default();
        stored.category = "Writing".to_string();
        stored.pricing = PricingTier::Paid;
        prefs.store(&stored);

        // URL overrides category, stored pricing survives.
        let state = prefs.initial_state(Some("category=Audio"));
        assert_eq!(state.category, "Audio");
        assert_eq!(state.pricing, PricingTier::Paid);

        // No URL at all: stored values apply.
        let state = prefs.initial_state(None);
        assert_eq!(state.category, "Writing");

        prefs.clear();
        let state = prefs.initial_state(None);
        assert_eq!(state, BrowseState::default());
    }

    #[test]
    fn dark_mode_round_trip() {
        let tmp = TempDir::new().unwrap();
        let prefs = Prefs::new(Kv::open(tmp.path()).unwrap());
        assert!(!prefs.dark_mode());
        prefs.set_dark_mode(true);
        assert!(prefs.dark_mode());
    }
}
