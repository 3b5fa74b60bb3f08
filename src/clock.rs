use std::sync::Arc;

pub type Clock = Arc<dyn Now + Send + Sync>;

/// Wall clock in milliseconds since the unix epoch.
pub trait Now {
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Now for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

pub fn system() -> Clock {
    Arc::new(SystemClock)
}
