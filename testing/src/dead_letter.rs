use parksync_core::{DeadLetter, DeadLetterError, DeadLetterSink};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Recorded {
    letters: Vec<DeadLetter>,
    fault: Option<DeadLetterError>,
}

/// Dead-letter sink that keeps every letter in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingDeadLetterSink {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingDeadLetterSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Letters recorded so far
    #[must_use]
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.lock().letters.clone()
    }

    /// Make every subsequent `record` fail
    pub fn fail_with(&self, error: DeadLetterError) {
        self.lock().fault = Some(error);
    }
}

impl DeadLetterSink for RecordingDeadLetterSink {
    fn record(
        &self,
        letter: DeadLetter,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterError>> + Send + '_>> {
        let result = {
            let mut recorded = self.lock();
            match &recorded.fault {
                Some(error) => Err(error.clone()),
                None => {
                    recorded.letters.push(letter);
                    Ok(())
                },
            }
        };
        Box::pin(async move { result })
    }
}
