//! Front-page layout: which stories land in which zone of the page.

use std::ops::Range;

use crate::feed::Story;

/// A named zone of the front page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Lead,
    LeftSidebar,
    SidebarSpread,
    Bottom,
    Mini1,
    Mini2,
    Mini3,
}

impl Zone {
    /// CSS class the zone is rendered with.
    pub fn class(self) -> &'static str {
        match self {
            Zone::Lead => "center-spread",
            Zone::LeftSidebar => "left-sidebar smaller",
            Zone::SidebarSpread => "sidebar-spread smaller",
            Zone::Bottom => "bottom",
            Zone::Mini1 => "mini mini-1 smaller",
            Zone::Mini2 => "mini mini-2 smaller",
            Zone::Mini3 => "mini mini-3 smaller",
        }
    }
}

/// The fixed partition scheme, in story order.
pub const SCHEME: [(Zone, Range<usize>); 7] = [
    (Zone::Lead, 0..2),
    (Zone::LeftSidebar, 2..6),
    (Zone::SidebarSpread, 6..9),
    (Zone::Bottom, 9..12),
    (Zone::Mini1, 12..16),
    (Zone::Mini2, 16..21),
    (Zone::Mini3, 21..25),
];

/// Number of stories the scheme has room for.
pub const CAPACITY: usize = 25;

/// Stories of one zone.
#[derive(Debug, Clone, Copy)]
pub struct Bucket<'a> {
    pub zone: Zone,
    pub stories: &'a [Story],
}

/// Stories sliced into zones. Empty zones are left out.
#[derive(Debug, Clone)]
pub struct Layout<'a> {
    buckets: Vec<Bucket<'a>>,
    dropped: usize,
}

impl<'a> Layout<'a> {
    pub fn partition(stories: &'a [Story]) -> Self {
        let buckets = SCHEME
            .iter()
            .filter_map(|(zone, range)| {
                let start = range.start.min(stories.len());
                let end = range.end.min(stories.len());
                (start < end).then(|| Bucket {
                    zone: *zone,
                    stories: &stories[start..end],
                })
            })
            .collect();

        Self {
            buckets,
            dropped: stories.len().saturating_sub(CAPACITY),
        }
    }

    pub fn buckets(&self) -> &[Bucket<'a>] {
        &self.buckets
    }

    pub fn bucket(&self, zone: Zone) -> Option<&Bucket<'a>> {
        self.buckets.iter().find(|b| b.zone == zone)
    }

    /// Stories past the last zone, which the page doesn't show.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
