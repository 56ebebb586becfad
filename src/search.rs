//! Read-only search projection over a page's toggles.

use crate::models::ToggleId;
use crate::registry::{GroupId, ToggleRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchEntry {
    id: ToggleId,
    group: Option<GroupId>,
    text: String,
    is_sub_row: bool,
    parent_on: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GroupHeader {
    id: GroupId,
    title: String,
    description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupFilter {
    pub id: GroupId,
    pub visible: bool,
    pub visible_rows: usize,
    pub title: String,
    /// Description to show under the title; empty while searching with
    /// headers hidden, restored once the query is cleared.
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterResult {
    /// Every indexed row with its visibility under the query.
    pub rows: Vec<(ToggleId, bool)>,
    pub groups: Vec<GroupFilter>,
    pub any_visible: bool,
}

impl FilterResult {
    pub fn is_visible(&self, id: ToggleId) -> bool {
        self.rows.iter().any(|(row, visible)| *row == id && *visible)
    }
}

/// Flattened text of every supported toggle, taken from one registry state.
/// Rows hidden for lack of support are left out entirely.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    entries: Vec<SearchEntry>,
    groups: Vec<GroupHeader>,
}

impl SearchIndex {
    pub fn build(registry: &ToggleRegistry) -> Self {
        let group_of = |id: ToggleId| {
            registry
                .groups()
                .iter()
                .find(|g| g.members.contains(&id))
                .map(|g| g.id)
        };

        let entries = registry
            .iter()
            .filter(|t| !t.is_hidden_no_support())
            .map(|t| SearchEntry {
                id: t.id,
                group: group_of(t.id),
                text: t.searchable_text.clone(),
                is_sub_row: t.is_sub_toggle(),
                parent_on: t
                    .parent
                    .and_then(|p| registry.get(p).ok())
                    .map(|p| p.display_state.is_on())
                    .unwrap_or(false),
            })
            .collect();

        SearchIndex {
            entries,
            groups: registry
                .groups()
                .iter()
                .map(|g| GroupHeader {
                    id: g.id,
                    title: g.title.clone(),
                    description: g.description.clone(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows whose text contains `query` (case-insensitive), in page order.
    pub fn matching(&self, query: &str) -> Vec<ToggleId> {
        let query = query.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.text.contains(&query))
            .map(|e| e.id)
            .collect()
    }

    /// Page filter. An empty query restores the normal layout: plain rows
    /// shown, sub-rows shown only under an active parent. A group stays
    /// visible while it has matches or the query is empty.
    pub fn filter(&self, query: &str) -> FilterResult {
        self.filter_with_headers(query, false)
    }

    /// Like `filter`; with `hide_group_headers` a non-empty query also
    /// blanks every group description so matches sit closer together.
    /// Group text is never matched against the query.
    pub fn filter_with_headers(&self, query: &str, hide_group_headers: bool) -> FilterResult {
        let query = query.to_lowercase();
        let browsing = query.is_empty();

        let rows: Vec<(ToggleId, bool)> = self
            .entries
            .iter()
            .map(|e| {
                let visible = if browsing {
                    !e.is_sub_row || e.parent_on
                } else {
                    e.text.contains(&query)
                };
                (e.id, visible)
            })
            .collect();

        let groups: Vec<GroupFilter> = self
            .groups
            .iter()
            .map(|header| {
                let members = self
                    .entries
                    .iter()
                    .zip(&rows)
                    .filter(|(e, _)| e.group == Some(header.id));
                // Browsing counts every supported row, matching the page's own tally.
                let visible_rows = if browsing {
                    members.count()
                } else {
                    members.filter(|(_, (_, visible))| *visible).count()
                };
                let description = if hide_group_headers && !browsing {
                    String::new()
                } else {
                    header.description.clone()
                };
                GroupFilter {
                    id: header.id,
                    visible: visible_rows > 0 || browsing,
                    visible_rows,
                    title: header.title.clone(),
                    description,
                }
            })
            .collect();

        let any_visible = rows.iter().any(|(_, visible)| *visible)
            || groups.iter().any(|g| g.visible_rows > 0);

        FilterResult {
            rows,
            groups,
            any_visible,
        }
    }
}
