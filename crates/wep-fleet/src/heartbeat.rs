//! Connection quality tracking
//!
//! Quality is an exponential moving average over heartbeat outcomes: each
//! sweep contributes 1.0 when the device has been heard from recently and
//! 0.0 when it stayed silent. The average always stays in [0, 1].

/// Smoothing factor for the quality EMA
pub const EMA_ALPHA: f64 = 0.3;

/// Probe written to a port when no traffic arrived within one heartbeat
/// interval
pub const LIVENESS_PROBE: &[u8] = b"PING\n";

/// Fold one heartbeat outcome into the running quality average
pub fn update_quality(current: f64, success: bool) -> f64 {
    let sample = if success { 1.0 } else { 0.0 };
    let next = (1.0 - EMA_ALPHA) * current + EMA_ALPHA * sample;
    next.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quality_rises_on_success() {
        let q = update_quality(0.5, true);
        assert!(q > 0.5);
        assert!(q <= 1.0);
    }

    #[test]
    fn test_quality_falls_on_failure() {
        let q = update_quality(0.5, false);
        assert!(q < 0.5);
        assert!(q >= 0.0);
    }

    #[test]
    fn test_sustained_failure_converges_to_zero() {
        let mut q = 1.0;
        for _ in 0..50 {
            q = update_quality(q, false);
        }
        assert!(q < 0.01);
    }

    #[test]
    fn test_sustained_success_converges_to_one() {
        let mut q = 0.0;
        for _ in 0..50 {
            q = update_quality(q, true);
        }
        assert!(q > 0.99);
    }

    proptest! {
        #[test]
        fn prop_quality_stays_in_unit_interval(
            current in 0.0f64..=1.0,
            success: bool,
        ) {
            let next = update_quality(current, success);
            prop_assert!((0.0..=1.0).contains(&next));
        }
    }
}
