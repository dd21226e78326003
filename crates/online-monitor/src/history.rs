use serde::{Deserialize, Serialize};

/// Total player count at one sampling instant (epoch milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub time: i64,
    pub total: u64,
}

/// Samples kept in non-decreasing time order. Points stamped earlier than the
/// tail, from a clock step or a restored future point, are inserted in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    points: Vec<HistoryPoint>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a history from saved points, restoring time order.
    pub fn from_points(mut points: Vec<HistoryPoint>) -> Self {
        points.sort_by_key(|point| point.time);
        Self { points }
    }

    pub fn push(&mut self, point: HistoryPoint) {
        let at = self.points.partition_point(|existing| existing.time <= point.time);
        self.points.insert(at, point);
    }

    /// Drops every point older than `cutoff`. A point exactly at the cutoff stays.
    pub fn retain_since(&mut self, cutoff: i64) {
        self.points.retain(|point| point.time >= cutoff);
    }

    pub fn points(&self) -> &[HistoryPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{History, HistoryPoint};

    fn point(time: i64, total: u64) -> HistoryPoint {
        HistoryPoint { time, total }
    }

    #[test]
    fn retain_since_keeps_cutoff_boundary() {
        let mut history = History::new();
        for time in [100, 200, 300, 400] {
            history.push(point(time, 1));
        }

        history.retain_since(300);
        assert_eq!(history.points(), [point(300, 1), point(400, 1)]);
    }

    #[test]
    fn retain_since_can_empty_history() {
        let mut history = History::from_points(vec![point(1, 1), point(2, 2)]);
        history.retain_since(10);
        assert!(history.is_empty());
    }

    #[test]
    fn push_keeps_order_when_clock_steps_back() {
        let mut history = History::new();
        for (time, total) in [(100, 1), (300, 3), (200, 2), (300, 4)] {
            history.push(point(time, total));
        }
        assert_eq!(
            history.points(),
            [point(100, 1), point(200, 2), point(300, 3), point(300, 4)]
        );

        history.retain_since(200);
        assert_eq!(history.points(), [point(200, 2), point(300, 3), point(300, 4)]);
    }

    #[test]
    fn from_points_sorts_by_time() {
        let history = History::from_points(vec![point(30, 3), point(10, 1), point(20, 2)]);
        let times: Vec<_> = history.points().iter().map(|p| p.time).collect();
        assert_eq!(times, [10, 20, 30]);
        assert_eq!(history.len(), 3);
    }
}
