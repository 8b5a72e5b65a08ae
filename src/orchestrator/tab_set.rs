//! Tab collection state for the orchestrator.
//!
//! A pure state layer, separated from the async coordinator, poller and page
//! fetcher so the bookkeeping (generations, tab ids, the active pointer and
//! page request tokens) can be unit tested without a runtime.

use std::collections::HashMap;

use serde::Serialize;

use super::tab::{ResultTab, TabId};
use crate::backend::QueryId;

/// Identity of one `execute_query` run. Only the latest is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct Generation(u64);

impl Generation {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Marker of one `load_page` call. Only the latest per query may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageToken(u64);

/// Consistent copy of the tab collection handed to observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabsView {
    pub generation: Generation,
    pub tabs: Vec<ResultTab>,
    pub active_tab: Option<TabId>,
}

impl TabsView {
    pub fn tab(&self, tab_id: TabId) -> Option<&ResultTab> {
        self.tabs.iter().find(|t| t.id == tab_id)
    }

    pub fn tab_for_query(&self, query_id: QueryId) -> Option<&ResultTab> {
        self.tabs.iter().find(|t| t.query_id == query_id)
    }

    pub fn active(&self) -> Option<&ResultTab> {
        self.active_tab.and_then(|id| self.tab(id))
    }
}

/// Tabs of the current generation plus the counters guarding them.
#[derive(Debug)]
pub struct TabSet {
    generation: Generation,
    tabs: Vec<ResultTab>,
    active: Option<TabId>,
    next_tab_id: u64,
    page_tokens: HashMap<QueryId, u64>,
}

impl TabSet {
    pub fn new() -> Self {
        Self {
            generation: Generation::default(),
            tabs: Vec::new(),
            active: None,
            next_tab_id: 1,
            page_tokens: HashMap::new(),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation == generation
    }

    /// Starts a new generation: empties the collection, clears the active
    /// pointer and every page token, and restarts tab ids at 1.
    pub fn begin_generation(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.tabs.clear();
        self.active = None;
        self.next_tab_id = 1;
        self.page_tokens.clear();
        self.generation
    }

    /// Invalidates all outstanding work while keeping the tabs visible.
    pub fn invalidate(&mut self) {
        self.generation = self.generation.next();
        self.page_tokens.clear();
    }

    pub fn allocate_tab_id(&mut self) -> TabId {
        let id = TabId(self.next_tab_id);
        self.next_tab_id += 1;
        id
    }

    /// Appends a tab and makes it active.
    pub fn push(&mut self, tab: ResultTab) {
        self.active = Some(tab.id);
        self.tabs.push(tab);
    }

    pub fn tabs(&self) -> &[ResultTab] {
        &self.tabs
    }

    pub fn active(&self) -> Option<TabId> {
        self.active
    }

    pub fn tab_for_query(&self, query_id: QueryId) -> Option<&ResultTab> {
        self.tabs.iter().find(|t| t.query_id == query_id)
    }

    pub fn tab_for_query_mut(&mut self, query_id: QueryId) -> Option<&mut ResultTab> {
        self.tabs.iter_mut().find(|t| t.query_id == query_id)
    }

    /// Makes `tab_id` active. Returns false if no such tab exists.
    pub fn select(&mut self, tab_id: TabId) -> bool {
        if self.tabs.iter().any(|t| t.id == tab_id) {
            self.active = Some(tab_id);
            true
        } else {
            false
        }
    }

    /// Removes a tab and returns it.
    ///
    /// Closing the active tab moves the pointer to the first remaining tab,
    /// or clears it when none remain.
    pub fn close(&mut self, tab_id: TabId) -> Option<ResultTab> {
        let pos = self.tabs.iter().position(|t| t.id == tab_id)?;
        let closed = self.tabs.remove(pos);
        self.page_tokens.remove(&closed.query_id);

        if self.active == Some(tab_id) {
            self.active = self.tabs.first().map(|t| t.id);
        }

        Some(closed)
    }

    /// Issues a page token for `query_id`, superseding earlier ones.
    pub fn issue_page_token(&mut self, query_id: QueryId) -> PageToken {
        let counter = self.page_tokens.entry(query_id).or_insert(0);
        *counter += 1;
        PageToken(*counter)
    }

    pub fn is_latest_page_token(&self, query_id: QueryId, token: PageToken) -> bool {
        self.page_tokens.get(&query_id) == Some(&token.0)
    }

    pub fn view(&self) -> TabsView {
        TabsView {
            generation: self.generation,
            tabs: self.tabs.clone(),
            active_tab: self.active,
        }
    }
}

impl Default for TabSet {
    fn default() -> Self {
        Self::new()
    }
}
