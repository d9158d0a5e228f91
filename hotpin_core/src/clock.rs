/// Source of the unix timestamps stamped on pin records.
pub trait Clock: std::fmt::Debug + Send + Sync {
    /// Current time in whole seconds since the unix epoch.
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}
