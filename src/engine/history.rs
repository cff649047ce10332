//! # engine::history
//!
//! Bounded, insertion-ordered tick history for one instrument. The oldest
//! tick is evicted when a push would exceed capacity.

use std::collections::VecDeque;

use crate::models::Tick;

#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    ticks:    VecDeque<Tick>,
    capacity: usize,
}

impl HistoryBuffer {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ticks: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a tick, evicting the oldest one first when full.
    pub fn push(&mut self, tick: Tick) {
        if self.ticks.len() >= self.capacity {
            self.ticks.pop_front();
        }
        self.ticks.push_back(tick);
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn latest(&self) -> Option<&Tick> {
        self.ticks.back()
    }

    /// Oldest first.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Tick> {
        self.ticks.iter()
    }

    /// Owned copy, oldest first, so callers can release the lock it lives under.
    pub fn snapshot(&self) -> Vec<Tick> {
        self.ticks.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;

    fn tick_at(i: usize, price: f64) -> Tick {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(i as i64);
        Tick::new("x", "x", price, ts).unwrap()
    }

    fn prices(buffer: &HistoryBuffer) -> Vec<f64> {
        buffer.iter().map(Tick::price).collect()
    }

    #[test]
    fn evicts_oldest_first() {
        let mut buffer = HistoryBuffer::new(3);
        for (i, p) in [10.0, 20.0, 30.0, 40.0].into_iter().enumerate() {
            buffer.push(tick_at(i, p));
        }

        assert_eq!(prices(&buffer), vec![20.0, 30.0, 40.0]);
        assert_eq!(buffer.latest().map(Tick::price), Some(40.0));
    }

    #[test]
    fn below_capacity_keeps_everything() {
        let mut buffer = HistoryBuffer::new(100);
        buffer.push(tick_at(0, 1.0));
        buffer.push(tick_at(1, 2.0));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.capacity(), 100);
        assert_eq!(prices(&buffer), vec![1.0, 2.0]);
    }

    proptest! {
        #[test]
        fn retains_exactly_the_most_recent(capacity in 1usize..50, extra in 1usize..80) {
            let n = capacity + extra;
            let mut buffer = HistoryBuffer::new(capacity);
            for i in 0..n {
                buffer.push(tick_at(i, (i + 1) as f64));
                prop_assert!(buffer.len() <= capacity);
            }

            let expected: Vec<f64> = ((n - capacity)..n).map(|i| (i + 1) as f64).collect();
            prop_assert_eq!(prices(&buffer), expected);
        }
    }
}
