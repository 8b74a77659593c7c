//! Retry policy: backoff schedule and transient-error classification.

use std::time::Duration;

use crate::error::FetchError;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Fixed delay between retries.
    Fixed { delay: Duration },
    /// Exponential delay: `base * factor^attempt`, capped at `max`, with
    /// optional +/- 50% jitter.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    /// 3s, 9s, 15s (capped) — tuned for providers behind slow overseas
    /// links, where sub-second retries just hit the same dead connection.
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(3),
            factor: 3.0,
            max: Duration::from_secs(15),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Delay for a 0-based retry attempt.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(attempt as i32);
                let seconds = (base.as_secs_f64() * scale).min(max.as_secs_f64());
                let mut delay = Duration::from_secs_f64(seconds);

                if jitter {
                    let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                    let offset = fastrand::u64(0..=(jitter_ms * 2));
                    let total_ms = delay.as_millis() as i64 + (offset as i64 - jitter_ms as i64);
                    delay = Duration::from_millis(total_ms.max(0) as u64);
                }

                delay
            }
        }
    }
}

/// Bounds for the automatic retry loop.
///
/// Total attempts = `max_retries + 1`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Error substrings considered transient. Collected from upstream failure
/// modes actually observed against the quote providers: reset keep-alive
/// connections, remote ends closing mid-response, plain timeouts.
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection",
    "timeout",
    "timed out",
    "remote",
    "aborted",
    "reset by peer",
    "remote end closed",
    "without response",
    "broken pipe",
    "eof",
    "refused",
];

/// Single point of truth for "is this error worth retrying".
#[derive(Debug, Clone)]
pub struct TransientClassifier {
    patterns: Vec<String>,
}

impl Default for TransientClassifier {
    fn default() -> Self {
        Self {
            patterns: TRANSIENT_PATTERNS.iter().map(|p| (*p).to_owned()).collect(),
        }
    }
}

impl TransientClassifier {
    /// Classifier with a custom pattern table; matching is case-insensitive
    /// substring containment.
    pub fn with_patterns(patterns: Vec<String>) -> Self {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_transient(&self, error: &FetchError) -> bool {
        let message = error.message().to_ascii_lowercase();
        self.patterns.iter().any(|p| message.contains(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_backoff_is_constant() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(100),
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(5), Duration::from_millis(100));
    }

    #[test]
    fn exponential_backoff_grows_and_caps() {
        let backoff = Backoff::default();

        assert_eq!(backoff.delay(0), Duration::from_secs(3));
        assert_eq!(backoff.delay(1), Duration::from_secs(9));
        assert_eq!(backoff.delay(2), Duration::from_secs(15)); // 27s capped
        assert_eq!(backoff.delay(3), Duration::from_secs(15));
    }

    #[test]
    fn jitter_stays_within_half_of_base() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..20 {
            let delay_ms = backoff.delay(0).as_millis() as f64;
            assert!((49.0..=151.0).contains(&delay_ms), "delay_ms={delay_ms}");
        }
    }

    #[test]
    fn connection_errors_are_transient() {
        let classifier = TransientClassifier::default();

        for message in [
            "Connection reset by peer",
            "Remote end closed connection without response",
            "read timed out",
            "BrokenPipeError: broken pipe",
            "unexpected EOF while reading",
        ] {
            assert!(
                classifier.is_transient(&FetchError::new(message)),
                "expected transient: {message}"
            );
        }
    }

    #[test]
    fn permanent_errors_are_not_transient() {
        let classifier = TransientClassifier::default();

        for message in [
            "403 forbidden",
            "malformed payload: missing field 'close'",
            "permission denied by provider",
        ] {
            assert!(
                !classifier.is_transient(&FetchError::new(message)),
                "expected permanent: {message}"
            );
        }
    }

    #[test]
    fn custom_pattern_table_is_respected() {
        let classifier = TransientClassifier::with_patterns(vec!["FLAKY".into()]);

        assert!(classifier.is_transient(&FetchError::new("provider was flaky today")));
        assert!(!classifier.is_transient(&FetchError::new("connection reset")));
    }
}
