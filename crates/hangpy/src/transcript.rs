use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use crate::host::{BoxError, OutputSink, OutputStream};

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    Appended(String),
    Cleared,
}

struct Inner {
    text: Mutex<String>,
    events: broadcast::Sender<TranscriptEvent>,
}

/// Append-only output transcript. Text is only ever appended, or cleared
/// as a whole by an explicit user action.
#[derive(Clone)]
pub struct Transcript {
    inner: Arc<Inner>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                text: Mutex::new(String::new()),
                events,
            }),
        }
    }

    /// Append `text` followed by a newline.
    pub fn append_line(&self, text: &str) {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        self.append(line);
    }

    /// Append `text` verbatim, with no trailing separator.
    pub fn append_raw(&self, text: &str) {
        if !text.is_empty() {
            self.append(text.to_string());
        }
    }

    fn append(&self, text: String) {
        // Hold the lock while publishing so subscribers see appends in transcript order.
        let mut buf = self.inner.text.lock();
        buf.push_str(&text);
        let _ = self.inner.events.send(TranscriptEvent::Appended(text));
    }

    pub fn clear(&self) {
        let mut buf = self.inner.text.lock();
        buf.clear();
        let _ = self.inner.events.send(TranscriptEvent::Cleared);
    }

    #[must_use]
    pub fn contents(&self) -> String {
        self.inner.text.lock().clone()
    }

    /// Lines of the transcript, without separators.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.inner.text.lock().lines().map(str::to_string).collect()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.inner.events.subscribe()
    }

    /// Live events as a stream. A subscriber that falls behind skips the
    /// events it missed.
    pub fn stream(&self) -> impl tokio_stream::Stream<Item = TranscriptEvent> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(Result::ok)
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transcript")
            .field("len", &self.inner.text.lock().len())
            .finish()
    }
}

/// Routes guest stdout/stderr lines into a [`Transcript`].
pub struct TranscriptSink {
    transcript: Transcript,
    stderr_marker: String,
}

impl TranscriptSink {
    #[must_use]
    pub fn new(transcript: Transcript, stderr_marker: impl Into<String>) -> Self {
        Self {
            transcript,
            stderr_marker: stderr_marker.into(),
        }
    }
}

#[async_trait::async_trait]
impl OutputSink for TranscriptSink {
    async fn on_log(
        &self,
        stream: OutputStream,
        message: &str,
    ) -> core::result::Result<(), BoxError> {
        match stream {
            OutputStream::Stdout => self.transcript.append_line(message),
            OutputStream::Stderr => self
                .transcript
                .append_line(&format!("{}{message}", self.stderr_marker)),
        }
        Ok(())
    }

    async fn on_partial(
        &self,
        stream: OutputStream,
        text: &str,
    ) -> core::result::Result<(), BoxError> {
        match stream {
            OutputStream::Stdout => self.transcript.append_raw(text),
            OutputStream::Stderr => self
                .transcript
                .append_raw(&format!("{}{text}", self.stderr_marker)),
        }
        Ok(())
    }
}
