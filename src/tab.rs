//! Tab identity and the coordinator's lightweight tab handle
//!
//! The coordinator never owns browsing sessions. It keeps a `TabRef` per tab:
//! the identity plus the handful of fields it needs for partitioning,
//! insertion and undo-close. The fields are refreshed from the tab store on
//! every mutation call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabId(Uuid);

impl TabId {
    /// Create a new unique tab ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The normal/private partition of tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyMode {
    #[default]
    Normal,
    Private,
}

impl PrivacyMode {
    pub fn from_private(is_private: bool) -> Self {
        if is_private {
            PrivacyMode::Private
        } else {
            PrivacyMode::Normal
        }
    }

    pub fn is_private(self) -> bool {
        matches!(self, PrivacyMode::Private)
    }
}

impl std::fmt::Display for PrivacyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivacyMode::Normal => write!(f, "normal"),
            PrivacyMode::Private => write!(f, "private"),
        }
    }
}

/// Coordinator-side handle to a browsing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabRef {
    /// Stable identity
    pub id: TabId,
    /// Current URL, `None` for a blank tab
    pub url: Option<String>,
    /// Page title
    #[serde(default)]
    pub title: String,
    /// Favicon location for the resolver
    #[serde(default)]
    pub favicon_url: Option<String>,
    pub is_private: bool,
    /// Search term the tab was opened from, used for grouping
    #[serde(default)]
    pub group_key: Option<String>,
    pub last_active_at: DateTime<Utc>,
    /// Opener tab
    #[serde(default)]
    pub parent_id: Option<TabId>,
    /// Whether a screenshot is available for the grid cell
    #[serde(default)]
    pub has_renderable_snapshot: bool,
}

impl TabRef {
    /// Create a blank handle stamped with `now`
    pub fn new(id: TabId, url: Option<String>, is_private: bool, now: DateTime<Utc>) -> Self {
        Self {
            id,
            url,
            title: String::new(),
            favicon_url: None,
            is_private,
            group_key: None,
            last_active_at: now,
            parent_id: None,
            has_renderable_snapshot: false,
        }
    }

    pub fn mode(&self) -> PrivacyMode {
        PrivacyMode::from_private(self.is_private)
    }

    /// Normalized grouping key: trimmed, lowercased, blank keys dropped
    pub fn normalized_group_key(&self) -> Option<String> {
        self.group_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_lowercase)
    }

    /// Whether the tab has been idle longer than `threshold` at `now`
    pub fn idle_longer_than(&self, threshold: chrono::Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_active_at) > threshold
    }
}

/// Everything a tab store needs to create a tab
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabSeed {
    pub url: Option<String>,
    pub is_private: bool,
    pub title: Option<String>,
    pub favicon_url: Option<String>,
    pub group_key: Option<String>,
    pub parent_id: Option<TabId>,
}

impl TabSeed {
    pub fn new(url: Option<String>, is_private: bool) -> Self {
        Self {
            url,
            is_private,
            ..Self::default()
        }
    }

    /// A fresh blank tab
    pub fn blank(is_private: bool) -> Self {
        Self::new(None, is_private)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_group_key(mut self, key: Option<String>) -> Self {
        self.group_key = key;
        self
    }

    pub fn with_favicon(mut self, favicon_url: Option<String>) -> Self {
        self.favicon_url = favicon_url;
        self
    }

    pub fn with_parent(mut self, parent: Option<TabId>) -> Self {
        self.parent_id = parent;
        self
    }
}
