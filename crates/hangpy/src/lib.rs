pub mod bridge;
pub mod config;
pub mod editor;
pub mod error;
pub mod host;
pub mod keywords;
pub mod kpy;
#[cfg(feature = "python")]
pub mod python;
pub mod rewrite;
pub mod run;
pub mod session;
pub mod transcript;

pub const TRACE_TARGET_SCRIPT: &str = "hangpy::script";

pub use bridge::{BridgeFunction, InputBridge, InputControl, Key};
pub use config::{Config, Lang, Messages};
pub use editor::Editor;
pub use error::{Error, Result};
pub use host::{BoxError, GuestRuntime, HostFunction, OutputSink, OutputStream};
pub use keywords::KeywordSource;
#[cfg(feature = "python")]
pub use python::PythonRuntime;
pub use rewrite::SourceRewriter;
pub use run::{RunController, RunSession, wrap_entry_point};
pub use session::{BootStage, Session, Status};
pub use transcript::{Transcript, TranscriptEvent, TranscriptSink};
