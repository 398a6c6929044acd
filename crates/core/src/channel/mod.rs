use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A discovered output endpoint as reported by the actuator backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub id: usize,
    /// Backend specific handle; opaque to the scheduler.
    pub handle: u64,
    pub path: String,
}

impl ChannelDescriptor {
    pub fn new(id: usize, handle: u64, path: impl Into<String>) -> Self {
        Self {
            id,
            handle,
            path: path.into(),
        }
    }
}

/// One output channel plus its busy window.
///
/// A channel is busy while `now - busy_since < busy_duration_ms - tolerance_ms`.
/// No flag is stored; the state is always derived from the window.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    descriptor: ChannelDescriptor,
    busy_since: Option<Duration>,
    busy_duration_ms: f64,
    tolerance_ms: f64,
}

impl Channel {
    pub fn new(descriptor: ChannelDescriptor, tolerance_ms: f64) -> Self {
        Self {
            descriptor,
            busy_since: None,
            busy_duration_ms: 0.0,
            tolerance_ms,
        }
    }

    pub fn id(&self) -> usize {
        self.descriptor.id
    }

    pub fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    pub fn busy_since(&self) -> Option<Duration> {
        self.busy_since
    }

    pub fn busy_duration_ms(&self) -> f64 {
        self.busy_duration_ms
    }

    pub fn is_busy(&self, now: Duration) -> bool {
        match self.busy_since {
            Some(since) => {
                let elapsed_ms = now.saturating_sub(since).as_secs_f64() * 1000.0;
                elapsed_ms < self.busy_duration_ms - self.tolerance_ms
            }
            None => false,
        }
    }

    /// Opens a new busy window starting at `now`.
    pub fn occupy(&mut self, now: Duration, duration_ms: f64) {
        self.busy_since = Some(now);
        self.busy_duration_ms = duration_ms;
    }

    /// Instant at which the current window stops blocking allocation.
    pub fn free_at(&self) -> Option<Duration> {
        let since = self.busy_since?;
        let blocking_ms = (self.busy_duration_ms - self.tolerance_ms).max(0.0);
        Some(since + Duration::from_secs_f64(blocking_ms / 1000.0))
    }
}

/// First-fit allocation over channels in ascending id order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelAllocator;

impl ChannelAllocator {
    /// Returns the id of the lowest-id channel that is free at `now`, or
    /// `None` when every channel is busy. Low ids win under contention.
    pub fn allocate(channels: &[Channel], now: Duration) -> Option<usize> {
        channels
            .iter()
            .filter(|channel| !channel.is_busy(now))
            .map(Channel::id)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(count: usize, tolerance_ms: f64) -> Vec<Channel> {
        (0..count)
            .map(|id| {
                Channel::new(
                    ChannelDescriptor::new(id, id as u64, format!("/devices/{id}")),
                    tolerance_ms,
                )
            })
            .collect()
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn fresh_channel_is_free() {
        let channel = &channels(1, 40.0)[0];
        assert!(!channel.is_busy(ms(0)));
        assert_eq!(channel.free_at(), None);
    }

    #[test]
    fn busy_window_ends_at_duration_minus_tolerance() {
        let mut channel = channels(1, 40.0).remove(0);
        channel.occupy(ms(1000), 500.0);

        assert!(channel.is_busy(ms(1000)));
        assert!(channel.is_busy(ms(1459)));
        assert!(!channel.is_busy(ms(1460)));
        assert_eq!(channel.free_at(), Some(ms(1460)));
    }

    #[test]
    fn tolerance_longer_than_note_never_blocks() {
        let mut channel = channels(1, 40.0).remove(0);
        channel.occupy(ms(0), 30.0);
        assert!(!channel.is_busy(ms(0)));
    }

    #[test]
    fn allocates_lowest_free_channel() {
        let mut set = channels(3, 0.0);
        assert_eq!(ChannelAllocator::allocate(&set, ms(0)), Some(0));

        set[0].occupy(ms(0), 100.0);
        assert_eq!(ChannelAllocator::allocate(&set, ms(10)), Some(1));

        set[1].occupy(ms(10), 100.0);
        set[2].occupy(ms(10), 100.0);
        assert_eq!(ChannelAllocator::allocate(&set, ms(20)), None);

        assert_eq!(ChannelAllocator::allocate(&set, ms(100)), Some(0));
    }

    #[test]
    fn allocation_follows_ids_not_slice_order() {
        let mut set = channels(3, 0.0);
        set.reverse();
        assert_eq!(ChannelAllocator::allocate(&set, ms(0)), Some(0));

        set[2].occupy(ms(0), 100.0);
        assert_eq!(ChannelAllocator::allocate(&set, ms(10)), Some(1));
    }

    #[test]
    fn allocation_reports_sparse_ids() {
        let mut set: Vec<_> = [9, 3, 7]
            .into_iter()
            .map(|id| Channel::new(ChannelDescriptor::new(id, 0, format!("/devices/{id}")), 0.0))
            .collect();
        assert_eq!(ChannelAllocator::allocate(&set, ms(0)), Some(3));

        set[1].occupy(ms(0), 100.0);
        assert_eq!(ChannelAllocator::allocate(&set, ms(10)), Some(7));
    }

    #[test]
    fn empty_channel_set_allocates_nothing() {
        assert_eq!(ChannelAllocator::allocate(&[], ms(0)), None);
    }
}
