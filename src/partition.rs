//! Display sections derived from the live tab set
//!
//! Sections are never stored. They are recomputed from tab attributes, the
//! active privacy mode and the current [`PartitionPolicy`] every time the
//! coordinator needs them.

use crate::tab::{PrivacyMode, TabId, TabRef};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default number of idle days before a tab is demoted to Inactive
pub const DEFAULT_INACTIVITY_DAYS: i64 = 14;

/// A display-time partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum Section {
    /// Not used within the inactivity threshold
    Inactive,
    /// Tabs opened from the same search term
    Grouped(String),
    /// Everything else, in backing order
    Regular,
}

impl Section {
    /// Only the Regular section has a user-defined order
    pub fn is_reorderable(&self) -> bool {
        matches!(self, Section::Regular)
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::Inactive => write!(f, "inactive"),
            Section::Grouped(key) => write!(f, "grouped({key})"),
            Section::Regular => write!(f, "regular"),
        }
    }
}

/// Policy toggles for section partitioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPolicy {
    pub grouping_enabled: bool,
    pub inactive_tabs_enabled: bool,
    pub inactivity_threshold: Duration,
}

impl Default for PartitionPolicy {
    fn default() -> Self {
        Self {
            grouping_enabled: true,
            inactive_tabs_enabled: true,
            inactivity_threshold: Duration::days(DEFAULT_INACTIVITY_DAYS),
        }
    }
}

impl PartitionPolicy {
    /// Policy with both grouping and inactive demotion switched off
    pub fn flat() -> Self {
        Self {
            grouping_enabled: false,
            inactive_tabs_enabled: false,
            ..Self::default()
        }
    }
}

/// One section with its members in display order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplaySection {
    pub section: Section,
    pub tabs: Vec<TabId>,
}

/// Ordered sections for one privacy mode
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SectionLayout {
    sections: Vec<DisplaySection>,
}

impl SectionLayout {
    pub fn sections(&self) -> &[DisplaySection] {
        &self.sections
    }

    /// Members of the Regular section
    pub fn regular(&self) -> &[TabId] {
        self.sections
            .iter()
            .find(|entry| entry.section == Section::Regular)
            .map(|entry| entry.tabs.as_slice())
            .unwrap_or(&[])
    }

    pub fn inactive(&self) -> &[TabId] {
        self.sections
            .iter()
            .find(|entry| entry.section == Section::Inactive)
            .map(|entry| entry.tabs.as_slice())
            .unwrap_or(&[])
    }

    pub fn grouped(&self) -> impl Iterator<Item = &DisplaySection> {
        self.sections
            .iter()
            .filter(|entry| matches!(entry.section, Section::Grouped(_)))
    }

    /// Section that renders `id`
    pub fn section_of(&self, id: TabId) -> Option<&Section> {
        self.sections
            .iter()
            .find(|entry| entry.tabs.contains(&id))
            .map(|entry| &entry.section)
    }

    /// The derived (non-Regular) part of the layout.
    ///
    /// Two layouts with equal derived parts differ at most in Regular's
    /// membership and order, which plain insert/delete/move ops describe.
    pub fn derived(&self) -> Vec<&DisplaySection> {
        self.sections
            .iter()
            .filter(|entry| entry.section != Section::Regular)
            .collect()
    }
}

/// Partition `tabs` (one mode's backing order) into display sections.
///
/// `selected` is never demoted to Inactive. Demotion also needs grouping
/// enabled, so turning grouping off always yields the plain backing order.
pub fn partition(
    tabs: &[TabRef],
    mode: PrivacyMode,
    policy: &PartitionPolicy,
    now: DateTime<Utc>,
    selected: Option<TabId>,
) -> SectionLayout {
    if mode.is_private() {
        let members = tabs.iter().filter(|tab| tab.is_private).map(|tab| tab.id);
        return SectionLayout {
            sections: vec![DisplaySection {
                section: Section::Regular,
                tabs: members.collect(),
            }],
        };
    }

    let candidates: Vec<&TabRef> = tabs.iter().filter(|tab| !tab.is_private).collect();

    let mut inactive = Vec::new();
    let mut active = Vec::new();
    for tab in candidates {
        let demoted = policy.inactive_tabs_enabled
            && policy.grouping_enabled
            && Some(tab.id) != selected
            && tab.idle_longer_than(policy.inactivity_threshold, now);
        if demoted {
            inactive.push(tab.id);
        } else {
            active.push(tab);
        }
    }

    let groups = if policy.grouping_enabled {
        build_groups(&active)
    } else {
        Vec::new()
    };

    let mut sections = Vec::with_capacity(groups.len() + 2);
    if !inactive.is_empty() {
        sections.push(DisplaySection {
            section: Section::Inactive,
            tabs: inactive,
        });
    }

    let grouped_ids: Vec<TabId> = groups
        .iter()
        .flat_map(|group| group.tabs.iter().copied())
        .collect();
    sections.extend(groups);

    sections.push(DisplaySection {
        section: Section::Regular,
        tabs: active
            .iter()
            .map(|tab| tab.id)
            .filter(|id| !grouped_ids.contains(id))
            .collect(),
    });

    SectionLayout { sections }
}

struct GroupBuilder<'a> {
    label: String,
    first_seen: usize,
    members: Vec<&'a TabRef>,
}

fn build_groups(active: &[&TabRef]) -> Vec<DisplaySection> {
    let mut by_key: HashMap<String, GroupBuilder<'_>> = HashMap::new();
    for (position, tab) in active.iter().enumerate() {
        let Some(key) = tab.normalized_group_key() else {
            continue;
        };
        by_key
            .entry(key)
            .or_insert_with(|| GroupBuilder {
                label: tab.group_key.as_deref().unwrap_or_default().trim().to_string(),
                first_seen: position,
                members: Vec::new(),
            })
            .members
            .push(tab);
    }

    // Singleton groups render in Regular
    let mut groups: Vec<GroupBuilder<'_>> = by_key
        .into_values()
        .filter(|group| group.members.len() >= 2)
        .collect();

    groups.sort_by(|a, b| {
        let a_recent = a.members.iter().map(|tab| tab.last_active_at).max();
        let b_recent = b.members.iter().map(|tab| tab.last_active_at).max();
        b_recent
            .cmp(&a_recent)
            .then_with(|| a.first_seen.cmp(&b.first_seen))
    });

    groups
        .into_iter()
        .map(|group| DisplaySection {
            section: Section::Grouped(group.label),
            tabs: group.members.iter().map(|tab| tab.id).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn tab(key: Option<&str>, idle_days: i64) -> TabRef {
        let mut tab = TabRef::new(TabId::new(), None, false, now() - Duration::days(idle_days));
        tab.group_key = key.map(str::to_string);
        tab
    }

    fn private_tab() -> TabRef {
        TabRef::new(TabId::new(), None, true, now() - Duration::days(30))
    }

    #[test]
    fn test_plain_tabs_are_regular() {
        let tabs = vec![tab(None, 0), tab(None, 1)];
        let layout = partition(&tabs, PrivacyMode::Normal, &PartitionPolicy::default(), now(), None);

        assert_eq!(layout.sections().len(), 1);
        assert_eq!(layout.regular(), &[tabs[0].id, tabs[1].id]);
    }

    #[test]
    fn test_private_mode_single_regular_section() {
        let mut grouped = private_tab();
        grouped.group_key = Some("cats".to_string());
        let mut grouped2 = private_tab();
        grouped2.group_key = Some("cats".to_string());
        let tabs = vec![grouped, grouped2, private_tab()];

        let layout = partition(&tabs, PrivacyMode::Private, &PartitionPolicy::default(), now(), None);

        assert_eq!(layout.sections().len(), 1);
        assert_eq!(layout.regular().len(), 3);
        assert!(layout.inactive().is_empty());
    }

    #[test]
    fn test_inactive_demotion() {
        let tabs = vec![tab(None, 20), tab(None, 0), tab(None, 15)];
        let layout = partition(&tabs, PrivacyMode::Normal, &PartitionPolicy::default(), now(), None);

        assert_eq!(layout.sections()[0].section, Section::Inactive);
        assert_eq!(layout.inactive(), &[tabs[0].id, tabs[2].id]);
        assert_eq!(layout.regular(), &[tabs[1].id]);
    }

    #[test]
    fn test_selected_tab_never_inactive() {
        let tabs = vec![tab(None, 20), tab(None, 0)];
        let layout = partition(
            &tabs,
            PrivacyMode::Normal,
            &PartitionPolicy::default(),
            now(),
            Some(tabs[0].id),
        );
        assert!(layout.inactive().is_empty());
        assert_eq!(layout.section_of(tabs[0].id), Some(&Section::Regular));
    }

    #[test]
    fn test_singleton_group_degrades_to_regular() {
        let tabs = vec![tab(Some("rust"), 0), tab(Some("go"), 0), tab(Some("Rust "), 0)];
        let layout = partition(&tabs, PrivacyMode::Normal, &PartitionPolicy::default(), now(), None);

        let groups: Vec<_> = layout.grouped().collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].section, Section::Grouped("rust".to_string()));
        assert_eq!(groups[0].tabs, vec![tabs[0].id, tabs[2].id]);
        assert_eq!(layout.regular(), &[tabs[1].id]);
    }

    #[test]
    fn test_groups_ordered_by_most_recent_member() {
        let tabs = vec![
            tab(Some("old"), 5),
            tab(Some("new"), 3),
            tab(Some("old"), 4),
            tab(Some("new"), 0),
        ];
        let layout = partition(&tabs, PrivacyMode::Normal, &PartitionPolicy::default(), now(), None);

        let keys: Vec<_> = layout.grouped().map(|group| group.section.clone()).collect();
        assert_eq!(
            keys,
            vec![
                Section::Grouped("new".to_string()),
                Section::Grouped("old".to_string())
            ]
        );
    }

    #[test]
    fn test_policy_off_restores_original_order() {
        let tabs = vec![
            tab(None, 30),
            tab(Some("x"), 0),
            tab(None, 0),
            tab(Some("x"), 0),
        ];
        let policy = PartitionPolicy::default();
        let demoted = partition(&tabs, PrivacyMode::Normal, &policy, now(), None);
        assert_eq!(demoted.regular(), &[tabs[2].id]);

        let flat = partition(&tabs, PrivacyMode::Normal, &PartitionPolicy::flat(), now(), None);
        let expected: Vec<TabId> = tabs.iter().map(|tab| tab.id).collect();
        assert_eq!(flat.regular(), expected.as_slice());
        assert!(flat.derived().is_empty());
    }

    #[test]
    fn test_grouping_off_disables_inactive_section() {
        let tabs = vec![tab(None, 0), tab(None, 30), tab(None, 0)];
        let policy = PartitionPolicy {
            grouping_enabled: false,
            ..PartitionPolicy::default()
        };
        let layout = partition(&tabs, PrivacyMode::Normal, &policy, now(), None);

        assert_eq!(layout.section_of(tabs[1].id), Some(&Section::Regular));
        let expected: Vec<TabId> = tabs.iter().map(|tab| tab.id).collect();
        assert_eq!(layout.regular(), expected.as_slice());
        assert!(layout.derived().is_empty());
    }

    #[test]
    fn test_inactive_tabs_do_not_form_groups() {
        let tabs = vec![tab(Some("x"), 30), tab(Some("x"), 0)];
        let layout = partition(&tabs, PrivacyMode::Normal, &PartitionPolicy::default(), now(), None);
        assert_eq!(layout.grouped().count(), 0);
        assert_eq!(layout.regular(), &[tabs[1].id]);
    }

    #[test]
    fn test_private_tabs_excluded_from_normal_sections() {
        let mut stray = private_tab();
        stray.group_key = Some("x".to_string());
        let tabs = vec![tab(Some("x"), 0), stray.clone()];
        let layout = partition(&tabs, PrivacyMode::Normal, &PartitionPolicy::default(), now(), None);
        assert_eq!(layout.section_of(stray.id), None);
        assert_eq!(layout.grouped().count(), 0);
    }
}
