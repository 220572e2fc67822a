// crates/framepipe-core/src/time.rs
//
// Rational time base shared by every timestamped unit. Every PTS/time-base
// pair in the system routes through here instead of an inline
// `pts * num / den` at the call site.

/// A rational `num/den` time base, e.g. `1/90000` for an MPEG-TS stream
/// or `1/48000` for 48 kHz audio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Convert a PTS expressed in this time base to seconds.
    pub fn to_seconds(self, pts: i64) -> f64 {
        pts as f64 * self.num as f64 / self.den as f64
    }

    /// Convert a timestamp in seconds to a PTS expressed in this time base.
    pub fn to_pts(self, seconds: f64) -> i64 {
        (seconds * self.den as f64 / self.num as f64) as i64
    }
}

impl Default for TimeBase {
    /// Microsecond time base, matching ffmpeg's `AV_TIME_BASE`.
    fn default() -> Self {
        Self::new(1, 1_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_stable() {
        let tb = TimeBase::new(1, 48_000);
        let pts = tb.to_pts(1.5);
        assert!((tb.to_seconds(pts) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn microsecond_default() {
        let tb = TimeBase::default();
        assert_eq!(tb.to_seconds(2_000_000), 2.0);
    }
}
