//! Interactive browse session: view state, persistence, and the
//! debounced search notification.
//!
//! [`BrowseSession`] glues the query pipeline to its two persistence
//! sinks and to analytics. Filter setters persist the changed dimension
//! and reset the page; search changes additionally schedule a
//! "search performed" event behind a debounce window so rapid typing
//! emits once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::analytics::{Analytics, SearchEvent};
use crate::catalog;
use crate::config::Config;
use crate::models::Tool;
use crate::prefs::{self, PartialState, Prefs};
use crate::query::{self, BrowseState, PopularityBracket, PricingTier, ResultPage, SortOrder};
use crate::store::Stack;

/// Quiet window after the last search keystroke.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Runs an action after a quiet window, superseding any pending one.
///
/// Each scheduled action carries a generation token; a superseded action
/// that races past its abort still sees a newer generation and drops
/// itself, so out-of-order completions never report stale state.
pub struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
            handle: None,
        }
    }

    /// Schedule `action`, cancelling any not-yet-fired predecessor.
    pub fn call<F>(&mut self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(pending) = self.handle.take() {
            pending.abort();
        }

        let generation = Arc::clone(&self.generation);
        let delay = self.delay;
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if generation.load(Ordering::SeqCst) == token {
                action();
            }
        }));
    }

    /// Wait for the pending action, if any, to run out.
    pub async fn settle(&mut self) {
        if let Some(pending) = self.handle.take() {
            let _ = pending.await;
        }
    }
}

pub struct BrowseSession {
    tools: Arc<Vec<Tool>>,
    page_size: usize,
    state: BrowseState,
    prefs: Prefs,
    analytics: Analytics,
    debouncer: Debouncer,
}

impl BrowseSession {
    /// Build a session with the initial state resolved from the URL (if
    /// given), stored preferences, and defaults, in that order.
    pub fn new(
        tools: Arc<Vec<Tool>>,
        page_size: usize,
        prefs: Prefs,
        analytics: Analytics,
        url: Option<&str>,
    ) -> Self {
        let state = prefs.initial_state(url);
        Self {
            tools,
            page_size,
            state,
            prefs,
            analytics,
            debouncer: Debouncer::new(SEARCH_DEBOUNCE),
        }
    }

    pub fn state(&self) -> &BrowseState {
        &self.state
    }

    pub fn results(&self) -> ResultPage<'_> {
        query::run(&self.tools, &self.state, self.page_size)
    }

    /// Update the search term. The analytics event fires only after the
    /// debounce window with the result count as of this change.
    pub fn set_search(&mut self, term: impl Into<String>) {
        self.state.set_search(term);
        self.prefs.store(&self.state);

        let event = SearchEvent::from_state(&self.state, self.results().total);
        let analytics = self.analytics.clone();
        self.debouncer.call(move || analytics.record_search(event));
    }

    pub fn set_category(&mut self, category: impl Into<String>) {
        self.state.set_category(category);
        self.prefs.store(&self.state);
    }

    pub fn set_pricing(&mut self, pricing: PricingTier) {
        self.state.set_pricing(pricing);
        self.prefs.store(&self.state);
    }

    pub fn set_popularity(&mut self, popularity: PopularityBracket) {
        self.state.set_popularity(popularity);
        self.prefs.store(&self.state);
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.state.set_sort(sort);
        self.prefs.store(&self.state);
    }

    /// Jump to a page. The caller is expected to stay within
    /// `total_pages`; out-of-range pages yield an empty slice.
    pub fn set_page(&mut self, page: u32) {
        self.state.page = page.max(1);
    }

    /// Reset every dimension and drop the stored preferences.
    pub fn clear_filters(&mut self) {
        self.state = BrowseState::default();
        self.prefs.clear();
    }

    /// The shareable query string for the current state.
    pub fn share_query(&self) -> String {
        prefs::encode_query(&self.state)
    }

    /// Wait for a pending debounced emission. Used by one-shot callers
    /// that would otherwise exit before the window elapses.
    pub async fn settle(&mut self) {
        self.debouncer.settle().await;
    }
}

/// CLI entry point: resolve state, print one result page.
pub async fn run_browse(
    config: &Config,
    stack: &Stack,
    overrides: PartialState,
    from_url: Option<&str>,
    share: bool,
) -> Result<()> {
    let tools = Arc::new(catalog::load(&config.catalog)?);
    let prefs = Prefs::new(stack.kv.clone());
    let analytics = Analytics::new(stack.kv.clone());
    let mut session = BrowseSession::new(
        tools,
        config.catalog.page_size,
        prefs,
        analytics,
        from_url,
    );

    // Explicit flags override whatever the URL and stored preferences
    // resolved to. Page applies last so a filter override cannot reset it.
    if let Some(term) = overrides.search {
        session.set_search(term);
    }
    if let Some(category) = overrides.category {
        session.set_category(category);
    }
    if let Some(pricing) = overrides.pricing {
        session.set_pricing(pricing);
    }
    if let Some(popularity) = overrides.popularity {
        session.set_popularity(popularity);
    }
    if let Some(sort) = overrides.sort {
        session.set_sort(sort);
    }
    if let Some(page) = overrides.page {
        session.set_page(page);
    }

    let page = session.results();
    print_page(&page, session.state());

    if share {
        let query = session.share_query();
        if query.is_empty() {
            println!("share: (all defaults)");
        } else {
            println!("share: ?{query}");
        }
    }

    session.settle().await;
    Ok(())
}

fn print_page(page: &ResultPage<'_>, state: &BrowseState) {
    if page.total == 0 {
        println!("No tools matched.");
        return;
    }

    println!(
        "{} tools, page {}/{} (sort: {})",
        page.total,
        page.page,
        page.total_pages,
        state.sort.as_str()
    );
    println!();

    for (i, tool) in page.tools.iter().enumerate() {
        println!(
            "{}. {} [{}] pop {}",
            i + 1,
            tool.name,
            tool.category,
            tool.popularity
        );
        println!("    pricing: {}", tool.pricing);
        println!("    added:   {}", tool.date_added);
        println!("    {}", tool.description);
        println!("    id: {}", tool.id);
        println!();
    }
}
