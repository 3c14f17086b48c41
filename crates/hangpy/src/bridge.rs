//! Single-slot rendezvous that hands one line of text from the host input
//! control to a suspended guest call.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tracing::{Instrument, debug, info_span};

use crate::{
    Error, Result, TRACE_TARGET_SCRIPT,
    host::{BoxError, HostFunction},
    transcript::Transcript,
};

/// State of the host-side line input control.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputControl {
    pub enabled: bool,
    pub focused: bool,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Other,
}

struct PendingInput {
    id: u64,
    prompt: String,
    resolver: oneshot::Sender<String>,
}

pub struct InputBridge {
    pending: Mutex<Option<PendingInput>>,
    next_id: AtomicU64,
    control: watch::Sender<InputControl>,
    transcript: Transcript,
}

impl InputBridge {
    #[must_use]
    pub fn new(transcript: Transcript) -> Self {
        let (control, _) = watch::channel(InputControl::default());
        Self {
            pending: Mutex::new(None),
            next_id: AtomicU64::new(1),
            control,
            transcript,
        }
    }

    /// Ask the host for one line and wait for it.
    ///
    /// A non-empty prompt is written to the transcript verbatim, then the
    /// input control is enabled and focused. There is no timeout. Dropping
    /// the returned future withdraws the request.
    ///
    /// # Errors
    /// Returns [`Error::InputProtocolMisuse`] if a request is already
    /// pending, [`Error::InputAbandoned`] if the bridge is dropped first.
    pub async fn request_line(&self, prompt: &str) -> Result<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = {
            let mut pending = self.pending.lock();
            if pending.is_some() {
                return Err(Error::InputProtocolMisuse);
            }
            let (resolver, rx) = oneshot::channel();
            *pending = Some(PendingInput {
                id,
                prompt: prompt.to_string(),
                resolver,
            });
            self.transcript.append_raw(prompt);
            self.control.send_modify(|control| {
                control.enabled = true;
                control.focused = true;
            });
            rx
        };

        let _withdraw = WithdrawOnDrop { bridge: self, id };
        let span = info_span!(target: TRACE_TARGET_SCRIPT, "bridge.request_line");
        async move { rx.await.map_err(|_| Error::InputAbandoned) }
            .instrument(span)
            .await
    }

    /// Submit the current control content to the pending request.
    ///
    /// Returns `false`, leaving everything untouched, when nothing is pending.
    pub fn submit(&self) -> bool {
        let mut pending = self.pending.lock();
        let Some(request) = pending.take() else {
            return false;
        };

        let mut line = String::new();
        self.control.send_modify(|control| {
            line = std::mem::take(&mut control.content);
            control.enabled = false;
            control.focused = false;
        });
        self.transcript.append_line(&line);
        debug!(target: TRACE_TARGET_SCRIPT, prompt = %request.prompt, "input submitted");
        drop(pending);

        if request.resolver.send(line).is_err() {
            debug!(target: TRACE_TARGET_SCRIPT, "input request was dropped before resolution");
        }
        true
    }

    /// Keystroke on the input control; `Enter` submits.
    pub fn accept_key(&self, key: Key) -> bool {
        match key {
            Key::Enter => self.submit(),
            Key::Other => false,
        }
    }

    /// Replace the control content, then submit it.
    pub fn submit_line(&self, text: &str) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.set_content(text);
        self.submit()
    }

    pub fn set_content(&self, text: &str) {
        self.control.send_modify(|control| {
            control.content.clear();
            control.content.push_str(text);
        });
    }

    pub fn type_text(&self, text: &str) {
        self.control
            .send_modify(|control| control.content.push_str(text));
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    #[must_use]
    pub fn pending_prompt(&self) -> Option<String> {
        self.pending.lock().as_ref().map(|p| p.prompt.clone())
    }

    #[must_use]
    pub fn control(&self) -> InputControl {
        self.control.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_control(&self) -> watch::Receiver<InputControl> {
        self.control.subscribe()
    }
}

/// Clears the slot if its request is still pending when the waiter goes away.
struct WithdrawOnDrop<'a> {
    bridge: &'a InputBridge,
    id: u64,
}

impl Drop for WithdrawOnDrop<'_> {
    fn drop(&mut self) {
        let mut pending = self.bridge.pending.lock();
        if pending.as_ref().is_some_and(|p| p.id == self.id) {
            pending.take();
            drop(pending);
            self.bridge.control.send_modify(|control| {
                control.enabled = false;
                control.focused = false;
            });
            debug!(target: TRACE_TARGET_SCRIPT, "input request withdrawn");
        }
    }
}

impl core::fmt::Debug for InputBridge {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InputBridge")
            .field("pending", &self.pending_prompt())
            .field("control", &self.control())
            .finish_non_exhaustive()
    }
}

/// Exposes [`InputBridge::request_line`] to the guest. The first argument,
/// if any, is the prompt.
pub struct BridgeFunction {
    bridge: Arc<InputBridge>,
}

impl BridgeFunction {
    #[must_use]
    pub const fn new(bridge: Arc<InputBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait::async_trait]
impl HostFunction for BridgeFunction {
    async fn call(&self, args: Vec<String>) -> core::result::Result<String, BoxError> {
        let prompt = args.into_iter().next().unwrap_or_default();
        self.bridge
            .request_line(&prompt)
            .await
            .map_err(|e| -> BoxError { Box::new(e) })
    }
}
