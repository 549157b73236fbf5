//! Bounded retry with backoff.
//!
//! One policy type shared by directory cleanup ([`crate::cleanup`]) and by
//! tolerant reads of files that an external editor may still hold open.

use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::encoding::decode_html;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base_delay * attempt`
    Linear,
    /// `base_delay * 2^(attempt - 1)`
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff: Backoff::Linear,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff: Backoff::Exponential,
        }
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor)
            }
        }
    }

    /// Run `op` until it succeeds, `should_retry` rejects the error, or the
    /// attempts are exhausted. The last error is returned on failure.
    ///
    /// `op` receives the 1-based attempt number. No sleep follows the final
    /// attempt.
    pub fn run<T, E, F, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_attempts || !should_retry(&err) {
                        return Err(err);
                    }
                    thread::sleep(self.delay_for(attempt));
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    /// Policy used for reading converter output: 5 attempts, linear 150 ms.
    fn default() -> Self {
        Self::linear(5, Duration::from_millis(150))
    }
}

/// Errors that may clear up on their own: sharing violations, locks and
/// interrupted calls. A missing file or bad data will not.
pub fn is_transient_io_error(err: &io::Error) -> bool {
    !matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput
    )
}

/// Read an HTML file that another process may be writing.
///
/// The bytes are decoded by [`decode_html`], so a legacy charset never
/// turns into a read error.
pub fn read_to_string_with_retry(path: &Path, policy: &RetryPolicy) -> io::Result<String> {
    let bytes = policy.run(
        |attempt| {
            std::fs::read(path).inspect_err(|e| {
                tracing::debug!(path = %path.display(), attempt, error = %e, "read failed");
            })
        },
        is_transient_io_error,
    )?;
    Ok(decode_html(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn linear_delay_grows_with_attempt() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
    }

    #[test]
    fn exponential_delay_doubles() {
        let policy = RetryPolicy::exponential(4, Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(4), Duration::from_millis(80));
    }

    #[test]
    fn run_stops_after_max_attempts() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::linear(3, Duration::ZERO);
        let result: Result<(), &str> = policy.run(
            |_| {
                calls.set(calls.get() + 1);
                Err("busy")
            },
            |_| true,
        );
        assert_eq!(result, Err("busy"));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn run_returns_first_success() {
        let policy = RetryPolicy::linear(5, Duration::ZERO);
        let result: Result<u32, &str> =
            policy.run(|attempt| if attempt < 2 { Err("busy") } else { Ok(attempt) }, |_| true);
        assert_eq!(result, Ok(2));
    }

    #[test]
    fn run_does_not_retry_rejected_errors() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::linear(5, Duration::ZERO);
        let _: Result<(), &str> = policy.run(
            |_| {
                calls.set(calls.get() + 1);
                Err("fatal")
            },
            |_| false,
        );
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn legacy_charset_file_is_decoded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("Firma.htm");
        std::fs::write(
            &path,
            b"<html><head><meta charset=windows-1252></head><body><p>Citt\xe0</p></body></html>",
        )
        .unwrap();

        let html = read_to_string_with_retry(&path, &RetryPolicy::linear(2, Duration::ZERO)).unwrap();
        assert!(html.contains("<p>Città</p>"), "{}", html);
    }

    #[test]
    fn missing_file_is_not_retried() {
        let dir = tempfile::TempDir::new().unwrap();
        let policy = RetryPolicy::linear(5, Duration::from_secs(10));
        let err = read_to_string_with_retry(&dir.path().join("absent.htm"), &policy).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
