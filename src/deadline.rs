//! Deadline Management
//!
//! Every external call made after a guard approves (subprocess, file read,
//! network probe, query) runs under one of these.

use std::future::Future;
use std::time::Duration;
use tokio::time;

/// The deadline elapsed before the operation completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation timed out after {0:?}")]
pub struct Elapsed(pub Duration);

/// A bounded duration for one external operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    duration: Duration,
}

impl Default for Deadline {
    fn default() -> Self {
        Self::from_secs(5)
    }
}

impl Deadline {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run a future, failing with [`Elapsed`] if it does not finish in time
    ///
    /// The future is dropped on expiry, which cancels it.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use warden::deadline::Deadline;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let deadline = Deadline::from_millis(100);
    ///     let value = deadline.run(async { 7 }).await.unwrap();
    ///     assert_eq!(value, 7);
    /// }
    /// ```
    pub async fn run<F, T>(&self, future: F) -> Result<T, Elapsed>
    where
        F: Future<Output = T>,
    {
        time::timeout(self.duration, future)
            .await
            .map_err(|_| Elapsed(self.duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_constructors() {
        assert_eq!(Deadline::default().duration(), Duration::from_secs(5));
        assert_eq!(Deadline::from_secs(30).duration(), Duration::from_secs(30));
        assert_eq!(Deadline::from_millis(250).duration(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_run_success() {
        let result = Deadline::from_secs(1).run(async { "done" }).await;
        assert_eq!(result, Ok("done"));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let deadline = Deadline::from_millis(50);
        let result = deadline
            .run(tokio::time::sleep(Duration::from_secs(2)))
            .await;
        assert_eq!(result, Err(Elapsed(Duration::from_millis(50))));
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_passes_inner_errors_through() {
        let result = Deadline::from_secs(1)
            .run(async { Err::<(), &str>("inner failure") })
            .await;
        assert_eq!(result, Ok(Err("inner failure")));
    }
}
