use std::sync::Arc;

use crate::Result;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives guest output one line at a time, without the trailing newline.
#[async_trait::async_trait]
pub trait OutputSink: Send + Sync + 'static {
    async fn on_log(
        &self,
        stream: OutputStream,
        message: &str,
    ) -> core::result::Result<(), BoxError>;

    /// Receives text the guest wrote without a trailing newline, flushed
    /// before the guest suspends. Sinks that render inline should not add a
    /// line break.
    async fn on_partial(
        &self,
        stream: OutputStream,
        text: &str,
    ) -> core::result::Result<(), BoxError> {
        self.on_log(stream, text).await
    }
}

/// Host capability callable by name from guest code.
///
/// Arguments arrive already converted to strings by the guest side. The
/// returned future may stay pending for as long as the host needs; the
/// guest call stack is suspended until it resolves.
#[async_trait::async_trait]
pub trait HostFunction: Send + Sync + 'static {
    async fn call(&self, args: Vec<String>) -> core::result::Result<String, BoxError>;
}

/// One long-lived embedded interpreter instance.
///
/// Guest global state survives across `exec` calls; nothing is reset
/// between runs.
#[async_trait::async_trait]
pub trait GuestRuntime: Send + Sync + 'static {
    /// Bind `function` into the guest global scope as an awaitable named `name`.
    ///
    /// # Errors
    /// Returns an error if the binding cannot be installed.
    async fn bind(&self, name: &str, function: Arc<dyn HostFunction>) -> Result<()>;

    /// Execute guest source until it completes or raises.
    ///
    /// Top-level `await` is allowed. The returned future does not resolve
    /// until every suspension inside the guest has been resumed.
    ///
    /// # Errors
    /// Returns [`Error::Guest`](crate::Error::Guest) when guest code raises,
    /// [`Error::Runtime`](crate::Error::Runtime) for interpreter failures.
    async fn exec(&self, source: &str) -> Result<()>;
}

#[async_trait::async_trait]
impl<T: GuestRuntime + ?Sized> GuestRuntime for Arc<T> {
    async fn bind(&self, name: &str, function: Arc<dyn HostFunction>) -> Result<()> {
        (**self).bind(name, function).await
    }

    async fn exec(&self, source: &str) -> Result<()> {
        (**self).exec(source).await
    }
}

#[async_trait::async_trait]
impl<T: OutputSink + ?Sized> OutputSink for Arc<T> {
    async fn on_log(
        &self,
        stream: OutputStream,
        message: &str,
    ) -> core::result::Result<(), BoxError> {
        (**self).on_log(stream, message).await
    }

    async fn on_partial(
        &self,
        stream: OutputStream,
        text: &str,
    ) -> core::result::Result<(), BoxError> {
        (**self).on_partial(stream, text).await
    }
}
