use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::Mutex;
use tracing::{Instrument, debug, info_span, warn};

use crate::{
    Error, Result, TRACE_TARGET_SCRIPT, host::GuestRuntime, rewrite::SourceRewriter,
    session::Session,
};

/// Runs when the entry point exits, raised or not, so names bound by the
/// program land in the guest global scope and survive into later runs.
pub const PERSIST_LOCALS: &str = "globals().update(locals())";

/// Wrap `source` in an async entry point named `name` and await it.
///
/// Only an async function may contain suspending calls, so the program body
/// lives inside one, under a `try` whose `finally` publishes its locals.
/// Each line of `source` is indented two levels of `indent`.
#[must_use]
pub fn wrap_entry_point(source: &str, name: &str, indent: &str) -> String {
    let mut wrapped = format!("async def {name}():\n{indent}try:\n");
    for line in source.split('\n') {
        wrapped.push_str(indent);
        wrapped.push_str(indent);
        wrapped.push_str(line);
        wrapped.push('\n');
    }
    wrapped.push_str(indent);
    wrapped.push_str(indent);
    wrapped.push_str("pass\n");
    wrapped.push_str(indent);
    wrapped.push_str("finally:\n");
    wrapped.push_str(indent);
    wrapped.push_str(indent);
    wrapped.push_str(PERSIST_LOCALS);
    wrapped.push('\n');
    wrapped.push_str("await ");
    wrapped.push_str(name);
    wrapped.push_str("()\n");
    wrapped
}

/// One execution of the editor buffer.
#[derive(Debug, Clone)]
pub struct RunSession {
    pub id: u64,
    pub wrapped: String,
}

/// Drives runs of guest source against a booted [`Session`].
pub struct RunController<R: GuestRuntime> {
    session: Arc<Session<R>>,
    rewriter: SourceRewriter,
    serial: Mutex<()>,
    next_id: AtomicU64,
}

impl<R: GuestRuntime> RunController<R> {
    /// # Errors
    /// Returns [`Error::Config`] if the configured input names are invalid.
    pub fn new(session: Arc<Session<R>>) -> Result<Self> {
        let rewriter = SourceRewriter::new(&session.config().input_names)?;
        Ok(Self {
            session,
            rewriter,
            serial: Mutex::new(()),
            next_id: AtomicU64::new(1),
        })
    }

    #[must_use]
    pub const fn session(&self) -> &Arc<Session<R>> {
        &self.session
    }

    #[must_use]
    pub const fn rewriter(&self) -> &SourceRewriter {
        &self.rewriter
    }

    /// Build the wrapped entry point for a snapshot of the editor buffer.
    #[must_use]
    pub fn prepare(&self, source: &str) -> RunSession {
        let config = self.session.config();
        let rewritten = self.rewriter.rewrite(source);
        RunSession {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            wrapped: wrap_entry_point(&rewritten, &config.entry_point, &config.indent),
        }
    }

    /// Run `source` to completion, reporting failures to the transcript.
    ///
    /// Runs are serialized: a call made while another run is in flight waits
    /// for it to finish. Guest state left by a failed run is kept.
    ///
    /// # Errors
    /// Returns [`Error::NotReady`] if the session has not booted, or the
    /// run's error after it has been written to the transcript.
    pub async fn run(&self, source: &str) -> Result<()> {
        let transcript = self.session.transcript();
        let messages = self.session.messages();

        let Some(runtime) = self.session.runtime() else {
            transcript.append_line(&messages.not_ready);
            return Err(Error::NotReady);
        };

        let _serial = self.serial.lock().await;
        self.session.set_running(true);
        let _running = RunningGuard(&self.session);

        transcript.append_line(&messages.run_separator);
        let run = self.prepare(source);

        let span = info_span!(target: TRACE_TARGET_SCRIPT, "run", id = run.id);
        let result = async {
            debug!(target: TRACE_TARGET_SCRIPT, wrapped = %run.wrapped, "executing");
            runtime.exec(&run.wrapped).await
        }
        .instrument(span)
        .await;

        if let Err(err) = &result {
            warn!(target: TRACE_TARGET_SCRIPT, id = run.id, error = %err, "run failed");
            transcript.append_line(&format!("{} {err}", messages.execution_error));
        }
        result
    }
}

struct RunningGuard<'a, R: GuestRuntime>(&'a Session<R>);

impl<R: GuestRuntime> Drop for RunningGuard<'_, R> {
    fn drop(&mut self) {
        self.0.set_running(false);
    }
}
