//! Page walking for list endpoints.
//!
//! [`PageWalker`] holds no I/O: the caller asks it for the next request,
//! performs the fetch, and reports back how many records it kept and the
//! pagination block of the response. The walk ends on an empty page, on a
//! page without a more-pages signal, on a repeated cursor, or when a cap is
//! reached.

use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use reqwest::Url;
use serde_json::Value as JsonValue;

use crate::rows::Pagination;

/// Query key that must be present in a usable cursor.
const CURSOR_INDEX_KEY: &str = "last_index";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    /// Opaque last-seen cursor from `pagination.last_indexes`.
    Cursor,
    /// `page=N` until `pagination.pages` is reached.
    Numbered,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCaps {
    pub max_pages: Option<usize>,
    pub max_records: Option<usize>,
}

impl PageCaps {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn pages(max_pages: usize) -> Self {
        Self {
            max_pages: Some(max_pages),
            max_records: None,
        }
    }

    pub fn records(max_records: usize) -> Self {
        Self {
            max_pages: None,
            max_records: Some(max_records),
        }
    }

    pub fn with_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }
}

/// Last-seen cursor pair (index plus sort-key value), kept as query pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(BTreeMap<String, String>);

impl Cursor {
    /// Usable only when the index and at least one sort-key value are present.
    pub fn from_last_indexes(last_indexes: &BTreeMap<String, JsonValue>) -> Option<Self> {
        let pairs: BTreeMap<String, String> = last_indexes
            .iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    JsonValue::String(s) if !s.is_empty() => s.clone(),
                    JsonValue::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((key.clone(), value))
            })
            .collect();
        let has_index = pairs.contains_key(CURSOR_INDEX_KEY);
        let has_sort_key = pairs.keys().any(|k| k != CURSOR_INDEX_KEY);
        (has_index && has_sort_key).then_some(Self(pairs))
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    First,
    After(Cursor),
    Number(u32),
}

impl PageRequest {
    /// Append this request's paging parameters to a query URL.
    pub fn apply(&self, url: &mut Url) {
        match self {
            PageRequest::First => {}
            PageRequest::After(cursor) => {
                url.query_pairs_mut().extend_pairs(cursor.pairs());
            }
            PageRequest::Number(page) => {
                url.query_pairs_mut().append_pair("page", &page.to_string());
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageWalker {
    mode: PageMode,
    caps: PageCaps,
    pages: usize,
    records: usize,
    next: Option<PageRequest>,
}

impl PageWalker {
    pub fn new(mode: PageMode, caps: PageCaps) -> Self {
        let first = match mode {
            PageMode::Cursor => PageRequest::First,
            PageMode::Numbered => PageRequest::Number(1),
        };
        let next = (caps.max_pages != Some(0) && caps.max_records != Some(0)).then_some(first);
        Self {
            mode,
            caps,
            pages: 0,
            records: 0,
            next,
        }
    }

    pub fn next_request(&self) -> Option<&PageRequest> {
        self.next.as_ref()
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn records(&self) -> usize {
        self.records
    }

    /// Records still allowed under the record cap.
    pub fn remaining_records(&self) -> Option<usize> {
        self.caps
            .max_records
            .map(|max| max.saturating_sub(self.records))
    }

    /// Report a fetched page. `received` is the raw row count of the page;
    /// `kept` is how many of them the caller retained toward the record cap.
    pub fn record_page(&mut self, received: usize, kept: usize, pagination: &Pagination) {
        let current = self.next.take();
        self.pages += 1;
        self.records += kept;

        if received == 0 {
            return;
        }
        if self.caps.max_pages.is_some_and(|max| self.pages >= max) {
            return;
        }
        if self.caps.max_records.is_some_and(|max| self.records >= max) {
            return;
        }

        self.next = match (self.mode, current) {
            (PageMode::Cursor, current) => pagination
                .last_indexes
                .as_ref()
                .and_then(Cursor::from_last_indexes)
                .map(PageRequest::After)
                // A cursor the server already handed out would loop forever.
                .filter(|next| current.as_ref() != Some(next)),
            (PageMode::Numbered, Some(PageRequest::Number(page))) => pagination
                .pages
                .filter(|total| *total > page)
                .map(|_| PageRequest::Number(page + 1)),
            (PageMode::Numbered, _) => None,
        };
    }
}

/// Collects items across several queries, dropping repeats of a key and
/// keeping first-seen order.
#[derive(Debug)]
pub struct UniqueCollector<K, T> {
    seen: HashSet<K>,
    items: Vec<T>,
}

impl<K: Eq + Hash, T> Default for UniqueCollector<K, T> {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
            items: Vec::new(),
        }
    }
}

impl<K: Eq + Hash, T> UniqueCollector<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the key was already seen.
    pub fn push(&mut self, key: K, item: T) -> bool {
        if !self.seen.insert(key) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Items without a key are always kept.
    pub fn push_optional(&mut self, key: Option<K>, item: T) -> bool {
        match key {
            Some(key) => self.push(key, item),
            None => {
                self.items.push(item);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}
