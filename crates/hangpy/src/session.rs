//! Process-wide session: one guest runtime, one input bridge, one transcript.
//!
//! A [`Session`] is created once, booted once, and shared by every run
//! until the process exits. Boot failure is terminal; there is no way back
//! to `Ready` short of building a new session.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::{OnceCell, watch};
use tracing::{Instrument, info, info_span, warn};

use crate::{
    Error, Result, TRACE_TARGET_SCRIPT,
    bridge::{BridgeFunction, InputBridge},
    config::{Config, Messages},
    host::{GuestRuntime, OutputSink},
    keywords::input_override_script,
    transcript::{Transcript, TranscriptSink},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStage {
    LoadingRuntime,
    FetchingKeywords,
    InjectingBridges,
    LoadingKeywords,
}

impl BootStage {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::LoadingRuntime => "Loading runtime…",
            Self::FetchingKeywords => "Fetching keywords…",
            Self::InjectingBridges => "Injecting bridges…",
            Self::LoadingKeywords => "Loading keywords…",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Idle,
    Booting(BootStage),
    Ready,
    Failed(String),
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Booting(stage) => f.write_str(stage.label()),
            Self::Ready => f.write_str("Ready"),
            Self::Failed(_) => f.write_str("Failed"),
        }
    }
}

pub struct Session<R: GuestRuntime> {
    config: Config,
    messages: Messages,
    transcript: Transcript,
    bridge: Arc<InputBridge>,
    runtime: OnceCell<R>,
    status: watch::Sender<Status>,
    booting: AtomicBool,
    running: AtomicBool,
}

impl<R: GuestRuntime> Session<R> {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let transcript = Transcript::new();
        let (status, _) = watch::channel(Status::Idle);
        Self {
            messages: config.messages(),
            config,
            bridge: Arc::new(InputBridge::new(transcript.clone())),
            transcript,
            runtime: OnceCell::new(),
            status,
            booting: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Materialize the runtime with `load` and install the bridge and
    /// keyword bindings into it.
    ///
    /// `load` receives the sink that guest stdout/stderr must be streamed
    /// to. On failure the status becomes [`Status::Failed`], one line is
    /// written to the transcript, and the session never becomes ready.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyBooted`] on a second call, [`Error::Boot`]
    /// if any boot step fails.
    pub async fn boot<F, Fut>(&self, load: F) -> Result<()>
    where
        F: FnOnce(Arc<dyn OutputSink>) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        if self.booting.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyBooted);
        }

        let span = info_span!(target: TRACE_TARGET_SCRIPT, "session.boot");
        match self.boot_steps(load).instrument(span).await {
            Ok(runtime) => {
                if self.runtime.set(runtime).is_err() {
                    return Err(Error::AlreadyBooted);
                }
                self.status.send_replace(Status::Ready);
                info!(target: TRACE_TARGET_SCRIPT, "session ready");
                Ok(())
            }
            Err(err) => {
                let message = match err {
                    Error::Boot(message) => message,
                    other => other.to_string(),
                };
                warn!(target: TRACE_TARGET_SCRIPT, error = %message, "boot failed");
                self.status.send_replace(Status::Failed(message.clone()));
                self.transcript
                    .append_line(&format!("{} {message}", self.messages.boot_error));
                Err(Error::Boot(message))
            }
        }
    }

    async fn boot_steps<F, Fut>(&self, load: F) -> Result<R>
    where
        F: FnOnce(Arc<dyn OutputSink>) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let source = self.config.keyword_source()?;

        self.set_stage(BootStage::LoadingRuntime);
        let sink: Arc<dyn OutputSink> = Arc::new(TranscriptSink::new(
            self.transcript.clone(),
            self.messages.stderr_marker.clone(),
        ));
        let runtime = load(sink).await?;

        self.set_stage(BootStage::FetchingKeywords);
        let keyword_script = source.load().await?;

        self.set_stage(BootStage::InjectingBridges);
        runtime
            .bind(
                &self.config.bridge_function,
                Arc::new(BridgeFunction::new(Arc::clone(&self.bridge))),
            )
            .await?;
        runtime
            .exec(&input_override_script(&self.config.bridge_function))
            .await?;

        self.set_stage(BootStage::LoadingKeywords);
        runtime.exec(&keyword_script).await?;

        Ok(runtime)
    }

    fn set_stage(&self, stage: BootStage) {
        self.status.send_replace(Status::Booting(stage));
    }

    /// The runtime, once boot has fully completed.
    #[must_use]
    pub fn runtime(&self) -> Option<&R> {
        self.runtime.get()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.runtime.initialized()
    }

    /// Whether the run control should be enabled: booted and idle.
    #[must_use]
    pub fn run_enabled(&self) -> bool {
        self.is_ready() && !self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn messages(&self) -> &Messages {
        &self.messages
    }

    #[must_use]
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[must_use]
    pub const fn bridge(&self) -> &Arc<InputBridge> {
        &self.bridge
    }
}

impl<R: GuestRuntime> core::fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
