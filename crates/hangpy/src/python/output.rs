use pyo3::{exceptions::PyRuntimeError, prelude::*, sync::PyOnceLock, types::PyDict};

use crate::host::OutputStream;

/// Installs process-wide `sys.stdout`/`sys.stderr` routers. Each writes to
/// the [`GuestOutput`] held by the `contextvars` variable of whichever
/// runtime is stepping, or to the original stream outside of one.
const ROUTER_SCRIPT: &str = r#"
import sys

class _HangpyRouter:
    def __init__(self, var, index, fallback):
        self._var = var
        self._index = index
        self._fallback = fallback

    def write(self, text):
        target = self._var.get(None)
        if target is None:
            return self._fallback.write(text) if self._fallback is not None else len(text)
        return target.write(self._index, text)

    def flush(self):
        if self._var.get(None) is None and self._fallback is not None:
            self._fallback.flush()

    def isatty(self):
        return False

    @property
    def encoding(self):
        return "utf-8"

def _install(var):
    sys.stdout = _HangpyRouter(var, 0, sys.stdout)
    sys.stderr = _HangpyRouter(var, 1, sys.stderr)
"#;

static OUTPUT_VAR: PyOnceLock<Py<PyAny>> = PyOnceLock::new();

/// The `contextvars.ContextVar` selecting the current [`GuestOutput`],
/// installing the routers on first use.
pub fn output_var(py: Python<'_>) -> PyResult<Bound<'_, PyAny>> {
    let var = OUTPUT_VAR.get_or_try_init(py, || {
        let var = py
            .import("contextvars")?
            .getattr("ContextVar")?
            .call1(("hangpy_output",))?;
        let scope = PyDict::new(py);
        scope.set_item("__builtins__", py.import("builtins")?)?;
        py.import("builtins")?
            .getattr("exec")?
            .call1((ROUTER_SCRIPT, &scope))?;
        scope
            .get_item("_install")?
            .ok_or_else(|| PyRuntimeError::new_err("output router was not defined"))?
            .call1((&var,))?;
        Ok::<_, PyErr>(var.unbind())
    })?;
    Ok(var.bind(py).clone())
}

/// Text queued by the guest. `complete` is false for an unterminated tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub text: String,
    pub complete: bool,
}

impl OutputChunk {
    fn line(stream: OutputStream, text: String) -> Self {
        Self {
            stream,
            text,
            complete: true,
        }
    }
}

/// Line-buffering sink for one runtime's stdout and stderr.
#[pyclass]
#[derive(Default)]
pub struct GuestOutput {
    chunks: Vec<OutputChunk>,
    partial: [String; 2],
}

#[pymethods]
impl GuestOutput {
    fn write(&mut self, index: usize, text: &str) -> usize {
        let stream = if index == 0 {
            OutputStream::Stdout
        } else {
            OutputStream::Stderr
        };
        let partial = &mut self.partial[usize::from(index != 0)];
        let mut rest = text;
        while let Some(newline) = rest.find('\n') {
            partial.push_str(&rest[..newline]);
            self.chunks
                .push(OutputChunk::line(stream, std::mem::take(partial)));
            rest = &rest[newline + 1..];
        }
        partial.push_str(rest);
        text.chars().count()
    }
}

impl GuestOutput {
    /// Take every queued line, then any unterminated tail.
    pub fn take_chunks(&mut self) -> Vec<OutputChunk> {
        for (stream, partial) in [OutputStream::Stdout, OutputStream::Stderr]
            .into_iter()
            .zip(&mut self.partial)
        {
            if !partial.is_empty() {
                self.chunks.push(OutputChunk {
                    stream,
                    text: std::mem::take(partial),
                    complete: false,
                });
            }
        }
        std::mem::take(&mut self.chunks)
    }
}
