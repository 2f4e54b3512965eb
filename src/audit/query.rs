//! Audit trail filtering and pagination.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::event::{AuditAction, AuditCategory, RiskLevel, SecurityEvent};

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Conjunctive filter over the audit trail. Pages are 1-based.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditFilter {
    pub category: Option<AuditCategory>,
    pub action: Option<AuditAction>,
    pub risk_level: Option<RiskLevel>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub address: Option<IpAddr>,
    pub succeeded: Option<bool>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: AuditCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn risk_level(mut self, level: RiskLevel) -> Self {
        self.risk_level = Some(level);
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn succeeded(mut self, succeeded: bool) -> Self {
        self.succeeded = Some(succeeded);
        self
    }

    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    /// Clamp paging to `1..` pages and `1..=max_page_size` items.
    pub fn clamped(mut self, max_page_size: usize) -> Self {
        let max = max_page_size.max(1);
        self.page = Some(self.page.unwrap_or(1).max(1));
        self.page_size = Some(self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, max));
        self
    }

    pub fn matches(&self, event: &SecurityEvent) -> bool {
        self.category.map_or(true, |c| event.category == c)
            && self.action.map_or(true, |a| event.action == a)
            && self.risk_level.map_or(true, |r| event.risk_level == r)
            && self.from.map_or(true, |from| event.timestamp >= from)
            && self.to.map_or(true, |to| event.timestamp <= to)
            && self.address.map_or(true, |a| event.source_address == Some(a))
            && self.succeeded.map_or(true, |s| event.succeeded == s)
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Filter events held in insertion order and return the requested page,
/// newest first with later inserts ahead of earlier ones on equal
/// timestamps.
pub fn apply_filter<'a, I>(events: I, filter: &AuditFilter) -> PagedResult<SecurityEvent>
where
    I: IntoIterator<Item = &'a SecurityEvent>,
    I::IntoIter: DoubleEndedIterator,
{
    let page = filter.page.unwrap_or(1).max(1);
    let page_size = filter.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);

    let mut matched: Vec<&SecurityEvent> = events
        .into_iter()
        .rev()
        .filter(|e| filter.matches(e))
        .collect();
    // Stable sort keeps the reversed insertion order among equal timestamps.
    matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let total = matched.len();
    let items = matched
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .cloned()
        .collect();

    PagedResult {
        items,
        total,
        page,
        page_size,
        total_pages: total.div_ceil(page_size),
    }
}
