//! Row virtualization for the grid.
//!
//! Only rows intersecting the viewport (plus an overscan buffer above and
//! below) are mounted. Every other row is represented by reserved vertical
//! space so the scrollbar spans the full row count.
//!
//! Heights start at an estimate and are refined as rows are measured. When
//! measurement is flagged unreliable the estimate is used throughout.

use std::collections::HashMap;
use std::ops::Range;

use crate::config::GridConfig;

/// A mounted row: its index and vertical placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualItem {
    pub index: usize,
    pub start: f64,
    pub size: f64,
}

impl VirtualItem {
    pub fn end(&self) -> f64 {
        self.start + self.size
    }
}

#[derive(Debug, Clone)]
pub struct RowVirtualizer {
    count: usize,
    estimate: f64,
    overscan: usize,
    reliable_measurement: bool,
    measured: HashMap<usize, f64>,
    /// starts[i] is the top of row i; starts[count] is the total size
    starts: Vec<f64>,
}

impl RowVirtualizer {
    pub fn new(count: usize, estimate: f64, overscan: usize) -> Self {
        let mut virtualizer = RowVirtualizer {
            count,
            estimate: estimate.max(1.0),
            overscan,
            reliable_measurement: true,
            measured: HashMap::new(),
            starts: Vec::new(),
        };
        virtualizer.rebuild_from(0);
        virtualizer
    }

    pub fn from_config(count: usize, config: &GridConfig) -> Self {
        let mut v = Self::new(count, config.estimated_row_height, config.overscan);
        v.reliable_measurement = config.reliable_measurement;
        v
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn overscan(&self) -> usize {
        self.overscan
    }

    /// Change the row count, keeping measurements of rows that still exist
    pub fn set_count(&mut self, count: usize) {
        if count == self.count {
            return;
        }
        self.measured.retain(|&i, _| i < count);
        let from = self.count.min(count);
        self.count = count;
        self.rebuild_from(from);
    }

    /// Forget every measurement, e.g. after the row set is replaced
    pub fn reset_measurements(&mut self) {
        self.measured.clear();
        self.rebuild_from(0);
    }

    /// Record a rendered row's height. Ignored when measurement is unreliable
    /// or the height is not a positive finite number.
    pub fn measure(&mut self, index: usize, height: f64) -> bool {
        if !self.reliable_measurement || index >= self.count || !height.is_finite() || height <= 0.0 {
            return false;
        }
        if self.measured.get(&index) == Some(&height) {
            return false;
        }
        self.measured.insert(index, height);
        self.rebuild_from(index);
        true
    }

    pub fn size_of(&self, index: usize) -> f64 {
        self.measured.get(&index).copied().unwrap_or(self.estimate)
    }

    pub fn offset_of(&self, index: usize) -> f64 {
        self.starts[index.min(self.count)]
    }

    /// Height of all rows together, the scrollable extent
    pub fn total_size(&self) -> f64 {
        self.starts[self.count]
    }

    fn rebuild_from(&mut self, from: usize) {
        self.starts.truncate(from + 1);
        if self.starts.is_empty() {
            self.starts.push(0.0);
        }
        for i in from..self.count {
            let next = self.starts[i] + self.size_of(i);
            self.starts.push(next);
        }
    }

    /// Rows intersecting the viewport, without overscan
    pub fn visible_range(&self, scroll_top: f64, viewport_height: f64) -> Range<usize> {
        if self.count == 0 || viewport_height <= 0.0 {
            return 0..0;
        }
        let top = scroll_top.max(0.0);
        let bottom = top + viewport_height;
        let row_starts = &self.starts[..self.count];
        let start = row_starts.partition_point(|&s| s <= top).saturating_sub(1);
        let end = row_starts.partition_point(|&s| s < bottom).max(start + 1);
        start..end.min(self.count)
    }

    /// Rows to mount: the visible range widened by overscan
    pub fn render_range(&self, scroll_top: f64, viewport_height: f64) -> Range<usize> {
        let visible = self.visible_range(scroll_top, viewport_height);
        if visible.is_empty() {
            return visible;
        }
        visible.start.saturating_sub(self.overscan)..(visible.end + self.overscan).min(self.count)
    }

    pub fn virtual_items(&self, scroll_top: f64, viewport_height: f64) -> Vec<VirtualItem> {
        self.render_range(scroll_top, viewport_height)
            .map(|index| VirtualItem {
                index,
                start: self.starts[index],
                size: self.size_of(index),
            })
            .collect()
    }
}

/// Scroll position reported by the grid's scroll container
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_height: f64,
    pub scroll_top: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn distance_to_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }
}

/// Decides when scrolling near the bottom should load the next page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchTrigger {
    pub threshold: f64,
}

impl FetchTrigger {
    pub fn new(threshold: f64) -> Self {
        FetchTrigger { threshold }
    }

    pub fn should_fetch(&self, metrics: ScrollMetrics, is_fetching: bool, has_more: bool) -> bool {
        !is_fetching && has_more && metrics.distance_to_bottom() < self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimated_layout() {
        let v = RowVirtualizer::new(100, 20.0, 0);
        assert_eq!(v.total_size(), 2000.0);
        assert_eq!(v.offset_of(10), 200.0);
        assert_eq!(v.visible_range(0.0, 100.0), 0..5);
        assert_eq!(v.visible_range(210.0, 100.0), 10..16);
    }

    #[test]
    fn test_overscan_is_clamped() {
        let v = RowVirtualizer::new(100, 20.0, 3);
        assert_eq!(v.render_range(0.0, 100.0), 0..8);
        assert_eq!(v.render_range(1900.0, 100.0), 92..100);
        let items = v.virtual_items(1900.0, 100.0);
        assert_eq!(items.first().map(|i| i.index), Some(92));
        assert_eq!(items.last().map(|i| i.end()), Some(2000.0));
    }

    #[test]
    fn test_measurement_shifts_following_rows() {
        let mut v = RowVirtualizer::new(10, 20.0, 0);
        assert!(v.measure(2, 50.0));
        assert_eq!(v.offset_of(3), 90.0);
        assert_eq!(v.total_size(), 230.0);
        assert!(!v.measure(2, 50.0));
        assert!(!v.measure(3, f64::NAN));
        assert!(!v.measure(99, 10.0));
    }

    #[test]
    fn test_unreliable_measurement_falls_back_to_estimate() {
        let config = GridConfig {
            estimated_row_height: 30.0,
            reliable_measurement: false,
            ..GridConfig::default()
        };
        let mut v = RowVirtualizer::from_config(4, &config);
        assert!(!v.measure(0, 80.0));
        assert_eq!(v.total_size(), 120.0);
    }

    #[test]
    fn test_set_count_keeps_measurements() {
        let mut v = RowVirtualizer::new(2, 10.0, 0);
        v.measure(1, 40.0);
        v.set_count(5);
        assert_eq!(v.total_size(), 10.0 + 40.0 + 30.0);
        v.set_count(1);
        assert_eq!(v.total_size(), 10.0);
        v.set_count(2);
        assert_eq!(v.size_of(1), 10.0);
    }

    #[test]
    fn test_empty_grid() {
        let v = RowVirtualizer::new(0, 20.0, 5);
        assert_eq!(v.total_size(), 0.0);
        assert!(v.render_range(0.0, 500.0).is_empty());
    }

    #[test]
    fn test_fetch_trigger() {
        let trigger = FetchTrigger::new(300.0);
        let near = ScrollMetrics {
            scroll_height: 2000.0,
            scroll_top: 1500.0,
            client_height: 400.0,
        };
        let far = ScrollMetrics { scroll_top: 0.0, ..near };
        assert!(trigger.should_fetch(near, false, true));
        assert!(!trigger.should_fetch(near, true, true));
        assert!(!trigger.should_fetch(near, false, false));
        assert!(!trigger.should_fetch(far, false, true));
    }
}
