use std::rc::Rc;

/// Abstraction over wall-clock sources.
/// Implementations: SystemTimeProvider (production), MockTimeProvider (testing).
pub trait TimeProvider {
    /// Current time in microseconds from an arbitrary, monotonic epoch.
    fn now_us(&self) -> i64;
}

impl<T: TimeProvider + ?Sized> TimeProvider for &T {
    fn now_us(&self) -> i64 {
        (**self).now_us()
    }
}

impl<T: TimeProvider + ?Sized> TimeProvider for Rc<T> {
    fn now_us(&self) -> i64 {
        (**self).now_us()
    }
}

/// System time provider using std::time::Instant.
pub struct SystemTimeProvider {
    start: std::time::Instant,
}

impl SystemTimeProvider {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl Default for SystemTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for SystemTimeProvider {
    fn now_us(&self) -> i64 {
        self.start.elapsed().as_micros() as i64
    }
}

/// Mock time provider for deterministic tests and offline simulation.
#[derive(Debug, Default)]
pub struct MockTimeProvider {
    current_us: std::cell::Cell<i64>,
}

impl MockTimeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time(&self, us: i64) {
        self.current_us.set(us);
    }

    pub fn advance(&self, delta_us: i64) {
        self.current_us.set(self.current_us.get() + delta_us);
    }

    /// Advance by a fractional number of milliseconds.
    pub fn advance_ms(&self, delta_ms: f64) {
        self.advance((delta_ms * 1000.0).round() as i64);
    }
}

impl TimeProvider for MockTimeProvider {
    fn now_us(&self) -> i64 {
        self.current_us.get()
    }
}
