use foundation::time::Time;

/// Largest delta a single frame may advance the simulation by (seconds).
pub const MAX_FRAME_DT_S: f64 = 0.1;

/// Per-frame timing handed to every system in the frame loop.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// 0-based frame index.
    pub index: u64,
    /// Clamped delta time (seconds).
    pub dt_s: f64,
    /// Accumulated engine time at the end of the frame.
    pub time: Time,
}

/// Converts host timestamps (`requestAnimationFrame`) into clamped frame
/// deltas.
///
/// While suspended (hidden tab) no frames are produced, and the first frame
/// after [`FrameClock::resume`] has a zero delta so the simulation never sees
/// the time spent in the background.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last_now_s: Option<f64>,
    next_index: u64,
    time: Time,
    suspended: bool,
    max_dt_s: f64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(MAX_FRAME_DT_S)
    }
}

impl FrameClock {
    pub fn new(max_dt_s: f64) -> Self {
        Self {
            last_now_s: None,
            next_index: 0,
            time: Time::ZERO,
            suspended: false,
            max_dt_s: max_dt_s.max(0.0),
        }
    }

    pub fn tick(&mut self, now_s: f64) -> Option<Frame> {
        if self.suspended {
            return None;
        }
        let dt_s = match self.last_now_s {
            Some(last) => (now_s - last).clamp(0.0, self.max_dt_s),
            None => 0.0,
        };
        self.last_now_s = Some(now_s);
        self.time = self.time.advance(dt_s);

        let frame = Frame {
            index: self.next_index,
            dt_s,
            time: self.time,
        };
        self.next_index += 1;
        Some(frame)
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
        self.last_now_s = None;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
        self.last_now_s = None;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn time(&self) -> Time {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameClock, MAX_FRAME_DT_S};
    use foundation::time::Time;

    #[test]
    fn first_frame_has_zero_delta() {
        let mut clock = FrameClock::default();
        let f = clock.tick(12.0).unwrap();
        assert_eq!(f.index, 0);
        assert_eq!(f.dt_s, 0.0);
    }

    #[test]
    fn deltas_are_clamped() {
        let mut clock = FrameClock::default();
        clock.tick(1.0);
        assert_eq!(clock.tick(1.016).unwrap().dt_s, 1.016 - 1.0);
        assert_eq!(clock.tick(5.0).unwrap().dt_s, MAX_FRAME_DT_S);
        // Clock going backwards never yields a negative delta.
        assert_eq!(clock.tick(4.0).unwrap().dt_s, 0.0);
    }

    #[test]
    fn suspended_time_is_not_accumulated() {
        let mut clock = FrameClock::default();
        clock.tick(0.0);
        clock.tick(0.05);
        clock.suspend();
        assert!(clock.tick(0.06).is_none());
        clock.resume();
        let f = clock.tick(600.0).unwrap();
        assert_eq!(f.dt_s, 0.0);
        assert_eq!(f.index, 2);
        assert_eq!(clock.time(), Time(0.05));
    }
}
