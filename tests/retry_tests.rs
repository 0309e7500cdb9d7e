//! # Retry Harness Tests
//!
//! Backoff, deadline and give-up behavior of `recognize_with_retry`. A
//! recording sleeper replaces the Tokio timer so no test waits in real time.

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use image::{DynamicImage, ImageFormat};
    use label_scan::ocr::{recognize_with_retry, RawImage, RetrySleeper};
    use label_scan::ocr_config::OcrConfig;
    use label_scan::ocr_errors::OcrError;
    use label_scan::preprocessing::candidate_configs;
    use label_scan::recognizer::{BoundingBox, RecognizedWord, TextRecognizer};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    impl RetrySleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().push(duration);
        }
    }

    /// Fails every pass of the first `failing_runs` pipeline runs
    struct FailThenSucceed {
        failing_calls: usize,
        calls: AtomicUsize,
    }

    impl FailThenSucceed {
        fn new(failing_runs: usize) -> Self {
            Self {
                failing_calls: failing_runs * candidate_configs().len(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TextRecognizer for FailThenSucceed {
        fn recognize_words(&self, _png: &[u8]) -> Result<Vec<RecognizedWord>, OcrError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failing_calls {
                return Err(OcrError::Processing("engine crashed".to_string()));
            }
            Ok(vec![RecognizedWord::new(
                "Calories",
                93.0,
                BoundingBox {
                    x: 1,
                    y: 2,
                    width: 30,
                    height: 9,
                },
            )])
        }
    }

    fn png_image() -> RawImage {
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::new_luma8(16, 16)
            .write_to(&mut bytes, ImageFormat::Png)
            .expect("encode png");
        RawImage::new(bytes.into_inner(), "image/png")
    }

    fn in_range(delay: Duration, low_ms: u64, high_ms: u64) -> bool {
        let ms = delay.as_millis() as u64;
        ms >= low_ms && ms < high_ms
    }

    #[tokio::test]
    async fn test_fails_twice_then_succeeds() {
        let recognizer = Arc::new(FailThenSucceed::new(2));
        let sleeper = RecordingSleeper::default();

        let result = recognize_with_retry(
            png_image(),
            Arc::clone(&recognizer),
            &OcrConfig::default(),
            &sleeper,
            None,
        )
        .await
        .expect("third attempt succeeds");

        assert_eq!(result.text, "Calories");
        assert!((result.confidence - 93.0).abs() < 1e-9);

        let delays = sleeper.delays.lock().clone();
        assert_eq!(delays.len(), 2);
        assert!(in_range(delays[0], 500, 1000), "first delay {:?}", delays[0]);
        assert!(in_range(delays[1], 1000, 2000), "second delay {:?}", delays[1]);
    }

    #[tokio::test]
    async fn test_first_success_does_not_sleep() {
        let sleeper = RecordingSleeper::default();
        let result = recognize_with_retry(
            png_image(),
            Arc::new(FailThenSucceed::new(0)),
            &OcrConfig::default(),
            &sleeper,
            None,
        )
        .await;

        assert!(result.is_ok());
        assert!(sleeper.delays.lock().is_empty());
    }

    #[tokio::test]
    async fn test_retries_exhausted_carries_last_error() {
        let sleeper = RecordingSleeper::default();
        let err = recognize_with_retry(
            png_image(),
            Arc::new(FailThenSucceed::new(10)),
            &OcrConfig::default(),
            &sleeper,
            None,
        )
        .await
        .unwrap_err();

        match err {
            OcrError::RetriesExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last_error, OcrError::Processing(_)));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        // No sleep after the final attempt
        assert_eq!(sleeper.delays.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_input_is_not_retried() {
        let recognizer = Arc::new(FailThenSucceed::new(0));
        let sleeper = RecordingSleeper::default();
        let bogus = RawImage::new(b"definitely not a png".to_vec(), "image/png");

        let err = recognize_with_retry(
            bogus,
            Arc::clone(&recognizer),
            &OcrConfig::default(),
            &sleeper,
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OcrError::InvalidInput(_)));
        assert!(sleeper.delays.lock().is_empty());
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deadline_aborts_between_attempts() {
        let recognizer = Arc::new(FailThenSucceed::new(10));
        let sleeper = RecordingSleeper::default();
        let already_passed = Instant::now();

        let err = recognize_with_retry(
            png_image(),
            Arc::clone(&recognizer),
            &OcrConfig::default(),
            &sleeper,
            Some(already_passed),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OcrError::DeadlineExceeded(_)));
        assert!(!err.is_retryable());
        // The first attempt always runs to completion
        assert_eq!(
            recognizer.calls.load(Ordering::SeqCst),
            candidate_configs().len()
        );
        assert_eq!(sleeper.delays.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_budget() {
        let mut config = OcrConfig::default();
        config.recovery.max_attempts = 1;
        let sleeper = RecordingSleeper::default();

        let err = recognize_with_retry(
            png_image(),
            Arc::new(FailThenSucceed::new(1)),
            &config,
            &sleeper,
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OcrError::RetriesExhausted { attempts: 1, .. }));
        assert!(sleeper.delays.lock().is_empty());
    }
}
