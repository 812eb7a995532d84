//! Placement of newly created tabs

/// Index at which a new tab lands in a list of `count` tabs.
///
/// Without a parent the tab is appended. With a parent the tab goes right
/// after it, which for a parent in last position is the end again. A
/// negative `count` is treated as an empty list and a parent position past
/// the end as no parent.
pub fn compute_insertion_index(count: isize, parent_index: Option<usize>) -> usize {
    let count = usize::try_from(count).unwrap_or(0);
    match parent_index {
        Some(parent) if parent.saturating_add(1) < count => parent + 1,
        _ => count,
    }
}

/// Tab placement settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionPolicy {
    /// Open child tabs next to their opener instead of at the end
    pub place_children_after_opener: bool,
}

impl Default for InsertionPolicy {
    fn default() -> Self {
        Self {
            place_children_after_opener: true,
        }
    }
}

impl InsertionPolicy {
    pub fn insertion_index(&self, count: usize, parent_index: Option<usize>) -> usize {
        let parent_index = parent_index.filter(|_| self.place_children_after_opener);
        compute_insertion_index(isize::try_from(count).unwrap_or(isize::MAX), parent_index)
    }
}
