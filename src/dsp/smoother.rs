//! Parameter smoother: first-order exponential approach to a moving target.

/// `current += (target - current) * (1 - exp(-Δt/τ))` once per step.
///
/// The step coefficient lies in (0, 1), so the value approaches the target
/// monotonically and never overshoots it.
#[derive(Debug, Clone)]
pub struct Smoother {
    current: f64,
    target: f64,
    coef: f64,
}

impl Smoother {
    /// `tau` is the time constant in seconds, `step_rate` how many steps run
    /// per second (the sample rate for per-sample smoothing).
    pub fn new(initial: f64, tau: f64, step_rate: f64) -> Self {
        Smoother {
            current: initial,
            target: initial,
            coef: Self::coefficient(tau, step_rate),
        }
    }

    /// Per-step blend factor for time constant `tau` at `step_rate` steps/s.
    pub fn coefficient(tau: f64, step_rate: f64) -> f64 {
        let steps = (tau * step_rate).max(1e-9);
        (1.0 - (-1.0 / steps).exp()).clamp(1e-12, 1.0)
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Jump straight to `value`.
    pub fn snap(&mut self, value: f64) {
        self.current = value;
        self.target = value;
    }

    /// Advance one step and return the new current value.
    #[inline]
    pub fn next(&mut self) -> f64 {
        self.current += (self.target - self.current) * self.coef;
        self.current
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn is_settled(&self, tolerance: f64) -> bool {
        (self.target - self.current).abs() <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_time_constant_reaches_63_percent() {
        let sr = 48000.0;
        let tau = 0.05;
        let mut s = Smoother::new(0.0, tau, sr);
        s.set_target(1.0);
        let steps = (tau * sr) as usize;
        for _ in 0..steps {
            s.next();
        }
        let expected = 1.0 - (-1.0_f64).exp();
        let v = s.current();
        assert!(
            (v - expected).abs() < 0.05 * expected,
            "after τ expected ~{expected}, got {v}"
        );
    }

    #[test]
    fn never_overshoots() {
        let mut s = Smoother::new(0.0, 0.001, 48000.0);
        s.set_target(1.0);
        let mut prev = 0.0;
        for _ in 0..48000 {
            let v = s.next();
            assert!(v <= 1.0, "overshoot: {v}");
            assert!(v >= prev, "not monotonic: {prev} -> {v}");
            prev = v;
        }
        assert!(s.is_settled(1e-9));
    }

    #[test]
    fn retargeting_mid_flight_has_no_jump() {
        let mut s = Smoother::new(0.0, 0.05, 48000.0);
        s.set_target(1.0);
        for _ in 0..1000 {
            s.next();
        }
        let before = s.current();
        s.set_target(0.0);
        let after = s.next();
        assert!((after - before).abs() < 0.01, "jumped {before} -> {after}");
    }

    #[test]
    fn snap_sets_both() {
        let mut s = Smoother::new(0.2, 0.05, 100.0);
        s.snap(0.9);
        assert_eq!(s.current(), 0.9);
        assert_eq!(s.target(), 0.9);
        assert_eq!(s.next(), 0.9);
    }
}
