/// Extends 32-bit device ticks to a monotonic 64-bit timeline.
///
/// The board's tick counter wraps at the 32-bit boundary. A tick smaller
/// than the previous one observed for the same source is a wrap, not
/// time going backwards.
#[derive(Debug, Default, Clone)]
pub struct TickTracker {
    last: Option<u32>,
    high: u32,
}

impl TickTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `tick` into the extended timeline and return the 64-bit tick.
    pub fn extend(&mut self, tick: u32) -> u64 {
        if let Some(last) = self.last {
            if tick < last {
                self.high += 1;
            }
        }
        self.last = Some(tick);
        (u64::from(self.high) << 32) | u64::from(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_within_epoch() {
        let mut ticks = TickTracker::new();
        assert_eq!(ticks.extend(10), 10);
        assert_eq!(ticks.extend(11), 11);
        assert_eq!(ticks.extend(11), 11);
    }

    #[test]
    fn wraparound_extends_instead_of_reversing() {
        let mut ticks = TickTracker::new();
        let before = ticks.extend(0xFFFF_FFF5);
        let after = ticks.extend(0x0000_0005);
        assert!(after > before);
        assert_eq!(after - before, 0x10);
    }

    #[test]
    fn multiple_wraps_accumulate() {
        let mut ticks = TickTracker::new();
        ticks.extend(0xFFFF_FFFE);
        let first_wrap = ticks.extend(1);
        ticks.extend(0xFFFF_FFFF);
        let second_wrap = ticks.extend(0);
        assert_eq!(first_wrap, (1u64 << 32) | 1);
        assert_eq!(second_wrap, 2u64 << 32);
    }
}
