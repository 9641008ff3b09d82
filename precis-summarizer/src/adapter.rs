use std::fmt;
use std::sync::Arc;

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::error::SummarizeError;
use crate::options::{SummaryOptions, SummaryResult};
use crate::text::{ratio_percent, truncate_words, word_count};
use crate::throttle::ThrottleGuard;

/// Bounds on the size of the input document, in words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummarizerLimits {
    pub min_words: usize,
    pub max_words: usize,
}

impl Default for SummarizerLimits {
    fn default() -> Self {
        Self {
            min_words: 50,
            max_words: 5000,
        }
    }
}

/// Throttled, validated, truncating wrapper around a [`CompletionClient`].
///
/// Does not cache; callers decide whether a result is reused.
#[derive(Clone)]
pub struct Summarizer {
    client: Arc<dyn CompletionClient>,
    throttle: Arc<ThrottleGuard>,
    limits: SummarizerLimits,
}

impl fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Summarizer")
            .field("limits", &self.limits)
            .field("throttle", &self.throttle.status())
            .finish()
    }
}

impl Summarizer {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        throttle: Arc<ThrottleGuard>,
        limits: SummarizerLimits,
    ) -> Self {
        Self {
            client,
            throttle,
            limits,
        }
    }

    pub fn throttle(&self) -> &Arc<ThrottleGuard> {
        &self.throttle
    }

    pub fn limits(&self) -> SummarizerLimits {
        self.limits
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_configured().is_ok()
    }

    /// Check a request without calling upstream. Returns the input word count.
    pub fn validate(&self, text: &str, options: &SummaryOptions) -> Result<usize, SummarizeError> {
        if text.trim().is_empty() {
            return Err(SummarizeError::invalid("text is required"));
        }
        if options.max_length == 0 {
            return Err(SummarizeError::invalid("maxLength must be at least 1"));
        }
        let words = word_count(text);
        if words < self.limits.min_words {
            return Err(SummarizeError::invalid(format!(
                "text is too short to summarize (minimum {} words, got {words})",
                self.limits.min_words
            )));
        }
        if words > self.limits.max_words {
            return Err(SummarizeError::invalid(format!(
                "text is too long to summarize (maximum {} words, got {words})",
                self.limits.max_words
            )));
        }
        Ok(words)
    }

    pub async fn summarize(
        &self,
        text: &str,
        options: &SummaryOptions,
    ) -> Result<SummaryResult, SummarizeError> {
        let original_words = self.validate(text, options)?;
        self.client
            .is_configured()
            .map_err(SummarizeError::Configuration)?;

        if let Err(cooling) = self.throttle.acquire().await {
            tracing::info!(
                retry_after_ms = cooling.retry_after.as_millis() as u64,
                "upstream cooling down, not calling"
            );
            return Err(SummarizeError::RateLimited {
                retry_after: cooling.retry_after,
            });
        }

        let request = CompletionRequest { text, options };
        let raw = self
            .client
            .complete(&request)
            .await
            .map_err(|err| self.classify(err))?;

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SummarizeError::Upstream {
                transient: true,
                message: "completion service returned an empty summary".into(),
            });
        }
        let summary = match truncate_words(trimmed, options.max_length as usize) {
            Some(cut) => {
                tracing::debug!(max_length = options.max_length, "truncated summary");
                cut
            }
            None => trimmed.to_string(),
        };
        let summary_words = word_count(&summary);

        Ok(SummaryResult {
            text: summary,
            original_word_count: original_words,
            summary_word_count: summary_words,
            compression_ratio: ratio_percent(summary_words, original_words),
        })
    }

    fn classify(&self, err: CompletionError) -> SummarizeError {
        tracing::warn!(error = %err, "completion call failed");
        match &err {
            CompletionError::Timeout
            | CompletionError::Transport(_)
            | CompletionError::Malformed(_) => SummarizeError::Upstream {
                transient: true,
                message: err.to_string(),
            },
            CompletionError::Unauthorized(_) | CompletionError::PaymentRequired => {
                SummarizeError::Configuration(err.to_string())
            }
            CompletionError::Overloaded { retry_after } => SummarizeError::RateLimited {
                retry_after: self.throttle.report_overload(*retry_after),
            },
            CompletionError::Status { status, .. } => SummarizeError::Upstream {
                transient: *status >= 500,
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, CompletionError>>>,
        calls: AtomicUsize,
        configured: bool,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, CompletionError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
                configured: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionClient for Scripted {
        fn is_configured(&self) -> Result<(), String> {
            if self.configured {
                Ok(())
            } else {
                Err("API key not configured".into())
            }
        }

        async fn complete(&self, _: &CompletionRequest<'_>) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("fallback summary".into()))
        }
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn summarizer(client: Arc<Scripted>) -> Summarizer {
        let throttle = Arc::new(ThrottleGuard::new(Duration::ZERO, Duration::from_secs(120)));
        Summarizer::new(client, throttle, SummarizerLimits::default())
    }

    #[tokio::test]
    async fn long_response_is_truncated_with_marker() {
        let client = Scripted::new(vec![Ok(words(80))]);
        let s = summarizer(client.clone());
        let opts = SummaryOptions::new(50, Default::default());

        let result = s.summarize(&words(100), &opts).await.unwrap();
        assert_eq!(result.summary_word_count, 50);
        assert!(result.text.ends_with("w49..."));
        assert_eq!(result.original_word_count, 100);
        assert_eq!(result.compression_ratio, 50.0);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn short_response_is_kept_verbatim() {
        let client = Scripted::new(vec![Ok("  a tidy summary.\n".into())]);
        let s = summarizer(client);
        let result = s
            .summarize(&words(60), &SummaryOptions::default())
            .await
            .unwrap();
        assert_eq!(result.text, "a tidy summary.");
        assert_eq!(result.summary_word_count, 3);
        assert_eq!(result.compression_ratio, 5.0);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_upstream() {
        let client = Scripted::new(vec![]);
        let s = summarizer(client.clone());
        let opts = SummaryOptions::default();

        let too_short = words(49);
        let too_long = words(5001);
        for text in ["", "   ", too_short.as_str(), too_long.as_str()] {
            let err = s.summarize(text, &opts).await.unwrap_err();
            assert!(matches!(err, SummarizeError::InvalidInput(_)), "{err:?}");
        }
        let zero = SummaryOptions::new(0, Default::default());
        assert!(matches!(
            s.summarize(&words(60), &zero).await,
            Err(SummarizeError::InvalidInput(_))
        ));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn unconfigured_client_is_a_configuration_error() {
        let client = Arc::new(Scripted {
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            configured: false,
        });
        let s = summarizer(client.clone());
        let err = s.summarize(&words(60), &SummaryOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(!s.is_configured());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overload_starts_cooldown_and_later_calls_fail_fast() {
        let client = Scripted::new(vec![Err(CompletionError::Overloaded {
            retry_after: Some(Duration::from_secs(60)),
        })]);
        let s = summarizer(client.clone());
        let opts = SummaryOptions::default();

        let err = s.summarize(&words(60), &opts).await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(30)).await;
        let err = s.summarize(&words(60), &opts).await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(client.calls(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(s.summarize(&words(60), &opts).await.is_ok());
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn upstream_failures_are_classified() {
        let client = Scripted::new(vec![
            Err(CompletionError::Timeout),
            Err(CompletionError::Unauthorized("bad key".into())),
            Err(CompletionError::PaymentRequired),
            Err(CompletionError::Status {
                status: 503,
                message: "unavailable".into(),
            }),
            Err(CompletionError::Status {
                status: 400,
                message: "bad request".into(),
            }),
            Ok("   ".into()),
        ]);
        let s = summarizer(client);
        let text = words(60);
        let opts = SummaryOptions::default();

        let mut got = Vec::new();
        for _ in 0..6 {
            let err = s.summarize(&text, &opts).await.unwrap_err();
            got.push((err.kind(), err.is_retryable()));
        }
        assert_eq!(
            got,
            vec![
                ("upstream", true),
                ("configuration", false),
                ("configuration", false),
                ("upstream", true),
                ("upstream", false),
                ("upstream", true),
            ]
        );
    }
}
