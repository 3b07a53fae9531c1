use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Poll a predicate in fixed increments until it stops holding or the
/// timeout is spent.
///
/// Used by the stream validator, duration probing and playback start so all
/// three share the same timeout semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundedWait {
    /// Serialized as integer milliseconds
    #[serde(with = "millis")]
    pub timeout: Duration,
    pub steps: u32,
}

impl Default for BoundedWait {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            steps: 100,
        }
    }
}

impl BoundedWait {
    pub fn new(timeout: Duration, steps: u32) -> Self {
        Self { timeout, steps }
    }

    /// Length of one polling step
    pub fn increment(&self) -> Duration {
        self.timeout / self.steps.max(1)
    }

    /// Sleep while `predicate` holds, at most `steps` times.
    ///
    /// Returns `true` when the predicate cleared before the timeout.
    pub async fn wait_while<F>(&self, mut predicate: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let increment = self.increment();
        for _ in 0..self.steps.max(1) {
            if !predicate() {
                return true;
            }
            tokio::time::sleep(increment).await;
        }
        !predicate()
    }

    /// Blocking flavour of [`BoundedWait::wait_while`] for code running on
    /// backend threads.
    pub fn block_while<F>(&self, mut predicate: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let increment = self.increment();
        for _ in 0..self.steps.max(1) {
            if !predicate() {
                return true;
            }
            std::thread::sleep(increment);
        }
        !predicate()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
