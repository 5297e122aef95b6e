//! Catalog browsing pipeline: filter, sort, paginate.
//!
//! Five independent filter dimensions plus a sort order and a 1-based
//! page number. A tool is shown iff every dimension matches
//! (conjunction). The pipeline is pure: it never mutates the catalog and
//! owns only the derived view.

use serde::{Deserialize, Serialize};

use crate::models::Tool;

/// Pricing bracket, matched as substring tests over the free-text label.
///
/// A label containing both "free" and "paid" satisfies only `Freemium`,
/// not `Free`. That is deliberate but makes uncurated labels surprising;
/// see `catalog::audit_pricing_labels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PricingTier {
    #[default]
    All,
    Free,
    Paid,
    Freemium,
}

impl PricingTier {
    pub fn matches(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        match self {
            PricingTier::All => true,
            PricingTier::Free => label.contains("free") && !label.contains("paid"),
            PricingTier::Paid => ["paid", "premium", "pro", "plus"]
                .iter()
                .any(|needle| label.contains(needle)),
            PricingTier::Freemium => label.contains("free") && label.contains("paid"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PricingTier::All => "All",
            PricingTier::Free => "Free",
            PricingTier::Paid => "Paid",
            PricingTier::Freemium => "Freemium",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "All" => Some(PricingTier::All),
            "Free" => Some(PricingTier::Free),
            "Paid" => Some(PricingTier::Paid),
            "Freemium" => Some(PricingTier::Freemium),
            _ => None,
        }
    }
}

/// Popularity bucket over the 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PopularityBracket {
    #[default]
    All,
    /// score >= 95
    Trending,
    /// 90 <= score < 95
    Popular,
    /// 85 <= score < 90
    Rising,
}

impl PopularityBracket {
    pub fn matches(&self, score: u8) -> bool {
        match self {
            PopularityBracket::All => true,
            PopularityBracket::Trending => score >= 95,
            PopularityBracket::Popular => (90..95).contains(&score),
            PopularityBracket::Rising => (85..90).contains(&score),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PopularityBracket::All => "All",
            PopularityBracket::Trending => "Trending",
            PopularityBracket::Popular => "Popular",
            PopularityBracket::Rising => "Rising",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "All" => Some(PopularityBracket::All),
            "Trending" => Some(PopularityBracket::Trending),
            "Popular" => Some(PopularityBracket::Popular),
            "Rising" => Some(PopularityBracket::Rising),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// `date_added` descending.
    #[default]
    Newest,
    /// Popularity score descending.
    Popular,
    /// Name ascending, case-insensitive key with a case-sensitive tiebreak.
    Alphabetical,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Newest => "newest",
            SortOrder::Popular => "popular",
            SortOrder::Alphabetical => "alphabetical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "newest" => Some(SortOrder::Newest),
            "popular" => Some(SortOrder::Popular),
            "alphabetical" => Some(SortOrder::Alphabetical),
            _ => None,
        }
    }
}

/// The full browse view state. `category` uses the `"All"` wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseState {
    pub search: String,
    pub category: String,
    pub pricing: PricingTier,
    pub popularity: PopularityBracket,
    pub sort: SortOrder,
    pub page: u32,
}

pub const ALL_CATEGORIES: &str = "All";

impl Default for BrowseState {
    fn default() -> Self {
        Self {
            search: String::new(),
            category: ALL_CATEGORIES.to_string(),
            pricing: PricingTier::All,
            popularity: PopularityBracket::All,
            sort: SortOrder::Newest,
            page: 1,
        }
    }
}

impl BrowseState {
    /// Every setter that changes what is shown resets to page 1.
    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into();
        self.page = 1;
    }

    pub fn set_category(&mut self, category: impl Into<String>) {
        self.category = category.into();
        self.page = 1;
    }

    pub fn set_pricing(&mut self, pricing: PricingTier) {
        self.pricing = pricing;
        self.page = 1;
    }

    pub fn set_popularity(&mut self, popularity: PopularityBracket) {
        self.popularity = popularity;
        self.page = 1;
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
        self.page = 1;
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// One page of the filtered, sorted catalog.
#[derive(Debug)]
pub struct ResultPage<'a> {
    pub tools: Vec<&'a Tool>,
    /// Filtered count across all pages.
    pub total: usize,
    /// `ceil(total / page_size)`; 0 when nothing matched.
    pub total_pages: u32,
    pub page: u32,
}

/// Whether a single tool satisfies every filter dimension.
pub fn matches(tool: &Tool, state: &BrowseState) -> bool {
    search_matches(tool, &state.search)
        && category_matches(tool, &state.category)
        && state.pricing.matches(&tool.pricing)
        && state.popularity.matches(tool.popularity)
}

fn search_matches(tool: &Tool, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }
    tool.name.to_lowercase().contains(&term)
        || tool.category.to_lowercase().contains(&term)
        || tool.description.to_lowercase().contains(&term)
        || tool
            .features
            .iter()
            .any(|f| f.name.to_lowercase().contains(&term))
}

fn category_matches(tool: &Tool, category: &str) -> bool {
    category == ALL_CATEGORIES || tool.category == category
}

fn sort_tools(tools: &mut [&Tool], order: SortOrder) {
    match order {
        SortOrder::Newest => {
            tools.sort_by(|a, b| b.date_added.cmp(&a.date_added).then(a.id.cmp(&b.id)))
        }
        SortOrder::Popular => {
            tools.sort_by(|a, b| b.popularity.cmp(&a.popularity).then(a.id.cmp(&b.id)))
        }
        SortOrder::Alphabetical => tools.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        }),
    }
}

/// Run the full pipeline: filter, sort, slice out the requested page.
///
/// `page` is not clamped; a page past the end yields an empty slice and
/// the caller is expected to honor `total_pages`.
pub fn run<'a>(tools: &'a [Tool], state: &BrowseState, page_size: usize) -> ResultPage<'a> {
    let mut matched: Vec<&Tool> = tools.iter().filter(|t| matches(t, state)).collect();
    sort_tools(&mut matched, state.sort);

    let total = matched.len();
    let total_pages = total.div_ceil(page_size) as u32;
    let start = (state.page.saturating_sub(1) as usize).saturating_mul(page_size);
    let page_tools = if start < total {
        matched[start..(start + page_size).min(total)].to_vec()
    } else {
        Vec::new()
    };

    ResultPage {
        tools: page_tools,
        total,
        total_pages,
        page: state.page,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tool(id: i64, name: &str, category: &str, pricing: &str, pop: u8, date: &str) -> Tool {
        Tool {
            id,
            name: name.to_string(),
            category: category.to_string(),
            description: format!("{name} description"),
            image: String::new(),
            features: vec![crate::models::Feature {
                name: format!("{name} flagship feature"),
                description: String::new(),
            }],
            pricing: pricing.to_string(),
            link: String::new(),
            date_added: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            popularity: pop,
        }
    }

    fn fixture() -> Vec<Tool> {
        vec![
            tool(1, "Alpha", "Chatbots", "Free", 96, "2024-01-10"),
            tool(2, "beta", "Writing", "Free / Paid", 92, "2024-03-05"),
            tool(3, "Gamma", "Chatbots", "Paid - $9/mo", 87, "2024-02-01"),
            tool(4, "delta", "Video", "Premium", 60, "2023-12-25"),
        ]
    }

    fn state() -> BrowseState {
        BrowseState::default()
    }

    #[test]
    fn empty_search_matches_everything() {
        let tools = fixture();
        let page = run(&tools, &state(), 12);
        assert_eq!(page.total, 4);
    }

    #[test]
    fn search_covers_name_category_description_and_features() {
        let tools = fixture();
        let mut s = state();

        s.set_search("ALPHA");
        assert_eq!(run(&tools, &s, 12).total, 1);

        s.set_search("writing");
        assert_eq!(run(&tools, &s, 12).total, 1);

        s.set_search("delta description");
        assert_eq!(run(&tools, &s, 12).total, 1);

        s.set_search("flagship feature");
        assert_eq!(run(&tools, &s, 12).total, 4);

        s.set_search("no such tool");
        assert_eq!(run(&tools, &s, 12).total, 0);
    }

    #[test]
    fn free_excludes_freemium_labels() {
        let tools = fixture();
        let mut s = state();

        s.set_pricing(PricingTier::Free);
        let free = run(&tools, &s, 12);
        assert_eq!(free.total, 1);
        assert_eq!(free.tools[0].name, "Alpha");

        s.set_pricing(PricingTier::Freemium);
        let freemium = run(&tools, &s, 12);
        assert_eq!(freemium.total, 1);
        assert_eq!(freemium.tools[0].name, "beta");
    }

    #[test]
    fn paid_matches_premium_pro_plus_synonyms() {
        for label in ["Paid", "Premium tier", "Pro plan", "Plus at $5"] {
            assert!(PricingTier::Paid.matches(label), "label: {label}");
        }
        assert!(!PricingTier::Paid.matches("Free forever"));
    }

    #[test]
    fn popularity_brackets_partition_their_range() {
        let tools = vec![
            tool(1, "A", "X", "Free", 96, "2024-01-01"),
            tool(2, "B", "X", "Free", 92, "2024-01-01"),
            tool(3, "C", "X", "Free", 87, "2024-01-01"),
        ];
        let mut s = state();

        s.set_popularity(PopularityBracket::Trending);
        assert_eq!(run(&tools, &s, 12).tools[0].id, 1);
        assert_eq!(run(&tools, &s, 12).total, 1);

        s.set_popularity(PopularityBracket::Popular);
        assert_eq!(run(&tools, &s, 12).tools[0].id, 2);
        assert_eq!(run(&tools, &s, 12).total, 1);

        s.set_popularity(PopularityBracket::Rising);
        assert_eq!(run(&tools, &s, 12).tools[0].id, 3);
        assert_eq!(run(&tools, &s, 12).total, 1);
    }

    #[test]
    fn filters_are_a_set_intersection() {
        let tools = fixture();

        let mut by_category = state();
        by_category.set_category("Chatbots");
        let category_ids: Vec<i64> = run(&tools, &by_category, 12)
            .tools
            .iter()
            .map(|t| t.id)
            .collect();

        let mut by_pricing = state();
        by_pricing.set_pricing(PricingTier::Free);
        let pricing_ids: Vec<i64> = run(&tools, &by_pricing, 12)
            .tools
            .iter()
            .map(|t| t.id)
            .collect();

        let mut both = state();
        both.set_category("Chatbots");
        both.set_pricing(PricingTier::Free);
        let mut combined_ids: Vec<i64> =
            run(&tools, &both, 12).tools.iter().map(|t| t.id).collect();
        combined_ids.sort();

        let mut expected: Vec<i64> = category_ids
            .into_iter()
            .filter(|id| pricing_ids.contains(id))
            .collect();
        expected.sort();
        assert_eq!(combined_ids, expected);
    }

    #[test]
    fn sort_orders() {
        let tools = fixture();
        let mut s = state();

        let newest: Vec<i64> = run(&tools, &s, 12).tools.iter().map(|t| t.id).collect();
        assert_eq!(newest, [2, 3, 1, 4]);

        s.set_sort(SortOrder::Popular);
        let popular: Vec<i64> = run(&tools, &s, 12).tools.iter().map(|t| t.id).collect();
        assert_eq!(popular, [1, 2, 3, 4]);

        s.set_sort(SortOrder::Alphabetical);
        let alpha: Vec<&str> = run(&tools, &s, 12)
            .tools
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(alpha, ["Alpha", "beta", "delta", "Gamma"]);
    }

    #[test]
    fn pages_concatenate_without_gaps_or_duplicates() {
        let tools: Vec<Tool> = (1..=30)
            .map(|i| tool(i, &format!("T{i:02}"), "X", "Free", 50, "2024-01-01"))
            .collect();
        let mut s = state();
        s.set_sort(SortOrder::Alphabetical);

        let first = run(&tools, &s, 12);
        assert_eq!(first.total, 30);
        assert_eq!(first.total_pages, 3);

        let mut seen = Vec::new();
        for page in 1..=first.total_pages {
            s.page = page;
            let result = run(&tools, &s, 12);
            seen.extend(result.tools.iter().map(|t| t.id));
        }
        assert_eq!(seen.len(), 30);
        let mut sorted = seen.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 30);
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let tools = fixture();
        let mut s = state();
        s.set_search("nothing matches this");
        let page = run(&tools, &s, 12);
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.tools.is_empty());
    }

    #[test]
    fn changing_any_dimension_resets_the_page() {
        let mut s = state();
        s.page = 3;
        s.set_search("x");
        assert_eq!(s.page, 1);

        s.page = 3;
        s.set_category("Chatbots");
        assert_eq!(s.page, 1);

        s.page = 3;
        s.set_pricing(PricingTier::Paid);
        assert_eq!(s.page, 1);

        s.page = 3;
        s.set_popularity(PopularityBracket::Rising);
        assert_eq!(s.page, 1);

        s.page = 3;
        s.set_sort(SortOrder::Popular);
        assert_eq!(s.page, 1);
    }

    #[test]
    fn page_past_the_end_is_empty_but_reports_totals() {
        let tools = fixture();
        let mut s = state();
        s.page = 9;
        let page = run(&tools, &s, 12);
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 1);
        assert!(page.tools.is_empty());
    }
}
