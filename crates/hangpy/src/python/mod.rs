//! CPython guest runtime.
//!
//! Guest source is compiled with top-level `await` allowed. The resulting
//! coroutine is stepped from Rust with `send`; a bound host function
//! suspends the guest by yielding a tagged request, which is answered by
//! sending the host result back in, or by throwing `RuntimeError` into the
//! guest when the host call fails. Guest stdout/stderr are queued per step
//! and delivered to the [`OutputSink`] before the next host call.

mod output;

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use pyo3::{
    exceptions::{PyRuntimeError, PyStopIteration},
    prelude::*,
    types::PyDict,
};
use tracing::{Instrument, debug, info_span, warn};

use crate::{
    Error, Result, TRACE_TARGET_SCRIPT,
    host::{GuestRuntime, HostFunction, OutputSink},
    rewrite::is_identifier_char,
};

use self::output::GuestOutput;

const HOST_CALL_TAG: &str = "__hangpy_host_call__";
const SOURCE_NAME: &str = "<hangpy>";

const PRELUDE: &str = r#"
import types

@types.coroutine
def _hangpy_host_call(name, args):
    return (yield ("__hangpy_host_call__", name, args))
"#;

fn runtime_error(context: &'static str) -> impl FnOnce(PyErr) -> Error {
    move |err| Error::Runtime(anyhow::anyhow!("{context}: {err}"))
}

fn guest_error(err: &PyErr) -> Error {
    Error::Guest {
        message: err.to_string(),
    }
}

enum Step {
    Call { name: String, args: Vec<String> },
    Unsupported,
    Done,
}

enum Resume {
    Send(Option<String>),
    Throw(String),
}

/// One CPython global scope with its own output routing and host bindings.
///
/// The interpreter is shared by the whole process; guest state lives in the
/// runtime's globals dict and persists across [`exec`](GuestRuntime::exec)
/// calls.
pub struct PythonRuntime {
    globals: Py<PyDict>,
    context: Py<PyAny>,
    output: Py<GuestOutput>,
    functions: RwLock<HashMap<String, Arc<dyn HostFunction>>>,
    sink: Arc<dyn OutputSink>,
    serial: tokio::sync::Mutex<()>,
}

impl PythonRuntime {
    /// # Errors
    /// Returns [`Error::Runtime`] if the interpreter cannot be prepared.
    pub fn new(sink: Arc<dyn OutputSink>) -> Result<Self> {
        let span = info_span!(target: TRACE_TARGET_SCRIPT, "python.new");
        let _enter = span.enter();
        Python::attach(|py| {
            let builtins = py.import("builtins").map_err(runtime_error("import builtins"))?;

            let globals = PyDict::new(py);
            globals
                .set_item("__builtins__", &builtins)
                .and_then(|()| globals.set_item("__name__", "__main__"))
                .map_err(runtime_error("prepare globals"))?;
            builtins
                .getattr("exec")
                .and_then(|exec| exec.call1((PRELUDE, &globals)))
                .map_err(runtime_error("load prelude"))?;

            let output = Py::new(py, GuestOutput::default())
                .map_err(runtime_error("create output queue"))?;
            let var = output::output_var(py).map_err(runtime_error("install output router"))?;
            let context = py
                .import("contextvars")
                .and_then(|m| m.getattr("Context"))
                .and_then(|ctor| ctor.call0())
                .map_err(runtime_error("create context"))?;
            var.getattr("set")
                .and_then(|set| context.call_method1("run", (set, &output)))
                .map_err(runtime_error("route output"))?;

            debug!(target: TRACE_TARGET_SCRIPT, "python runtime ready");
            Ok(Self {
                globals: globals.unbind(),
                context: context.unbind(),
                output,
                functions: RwLock::new(HashMap::new()),
                sink,
                serial: tokio::sync::Mutex::new(()),
            })
        })
    }

    /// Compile and evaluate `source`. Returns the coroutine to drive when
    /// the source awaits at top level.
    fn start(&self, py: Python<'_>, source: &str) -> Result<Option<Py<PyAny>>> {
        let builtins = py.import("builtins").map_err(runtime_error("import builtins"))?;
        let flags: i64 = py
            .import("ast")
            .and_then(|ast| ast.getattr("PyCF_ALLOW_TOP_LEVEL_AWAIT"))
            .and_then(|flag| flag.extract())
            .map_err(runtime_error("read compile flags"))?;
        let code = builtins
            .getattr("compile")
            .and_then(|compile| compile.call1((source, SOURCE_NAME, "exec", flags)))
            .map_err(|e| guest_error(&e))?;
        let eval = builtins.getattr("eval").map_err(runtime_error("lookup eval"))?;
        let result = self
            .context
            .bind(py)
            .call_method1("run", (eval, code, self.globals.bind(py)))
            .map_err(|e| guest_error(&e))?;

        let is_coroutine = py
            .import("inspect")
            .and_then(|inspect| inspect.call_method1("iscoroutine", (&result,)))
            .and_then(|b| b.is_truthy())
            .map_err(runtime_error("inspect result"))?;
        Ok(is_coroutine.then(|| result.unbind()))
    }

    fn step(&self, py: Python<'_>, coroutine: &Py<PyAny>, resume: Resume) -> Result<Step> {
        let coroutine = coroutine.bind(py);
        let context = self.context.bind(py);
        let outcome = match resume {
            Resume::Send(value) => coroutine
                .getattr("send")
                .and_then(|send| context.call_method1("run", (send, value))),
            Resume::Throw(message) => coroutine.getattr("throw").and_then(|throw| {
                let err = PyRuntimeError::new_err(message);
                context.call_method1("run", (throw, err.value(py)))
            }),
        };

        match outcome {
            Ok(yielded) => Ok(match yielded.extract::<(String, String, Vec<String>)>() {
                Ok((tag, name, args)) if tag == HOST_CALL_TAG => Step::Call { name, args },
                _ => Step::Unsupported,
            }),
            Err(err) if err.is_instance_of::<PyStopIteration>(py) => Ok(Step::Done),
            Err(err) => Err(guest_error(&err)),
        }
    }

    async fn dispatch(&self, name: &str, args: Vec<String>) -> Resume {
        let function = self.functions.read().get(name).cloned();
        let Some(function) = function else {
            return Resume::Throw(format!("host function {name} is not bound"));
        };
        match function.call(args).await {
            Ok(value) => Resume::Send(Some(value)),
            Err(err) => {
                warn!(target: TRACE_TARGET_SCRIPT, function = name, error = %err, "host call failed");
                Resume::Throw(err.to_string())
            }
        }
    }

    /// Deliver queued guest output to the sink.
    async fn drain(&self) -> Result<()> {
        let chunks = Python::attach(|py| self.output.borrow_mut(py).take_chunks());
        for chunk in chunks {
            let delivered = if chunk.complete {
                self.sink.on_log(chunk.stream, &chunk.text).await
            } else {
                self.sink.on_partial(chunk.stream, &chunk.text).await
            };
            delivered.map_err(Error::from_host)?;
        }
        Ok(())
    }

    async fn drive(&self, source: &str) -> Result<()> {
        let started = Python::attach(|py| self.start(py, source));
        self.drain().await?;
        let Some(coroutine) = started? else {
            return Ok(());
        };

        let mut resume = Resume::Send(None);
        loop {
            let step = Python::attach(|py| self.step(py, &coroutine, resume));
            self.drain().await?;
            resume = match step? {
                Step::Done => return Ok(()),
                Step::Call { name, args } => {
                    debug!(target: TRACE_TARGET_SCRIPT, function = %name, "host call");
                    self.dispatch(&name, args).await
                }
                Step::Unsupported => {
                    Resume::Throw("only host calls may be awaited in guest code".to_string())
                }
            };
        }
    }
}

#[async_trait::async_trait]
impl GuestRuntime for PythonRuntime {
    async fn bind(&self, name: &str, function: Arc<dyn HostFunction>) -> Result<()> {
        let valid = name.chars().next().is_some_and(|c| !c.is_numeric())
            && name.chars().all(is_identifier_char);
        if !valid {
            return Err(Error::Config(format!("invalid host function name: {name:?}")));
        }
        self.functions.write().insert(name.to_string(), function);

        let source = format!(
            "async def {name}(*args):\n    return await _hangpy_host_call(\"{name}\", [str(a) for a in args])\n"
        );
        self.exec(&source).await
    }

    async fn exec(&self, source: &str) -> Result<()> {
        let _serial = self.serial.lock().await;
        let span = info_span!(target: TRACE_TARGET_SCRIPT, "python.exec");
        self.drive(source).instrument(span).await
    }
}

impl core::fmt::Debug for PythonRuntime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PythonRuntime")
            .field("functions", &self.functions.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
