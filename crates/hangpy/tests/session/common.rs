use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use hangpy::{
    Config, Error, GuestRuntime, HostFunction, OutputSink, OutputStream, RunController, Session,
};
use parking_lot::Mutex;

/// In-memory guest runtime that understands just enough of the wrapped
/// entry point to drive the session: string assignments, awaited input
/// calls, prints and raises. Assignments are entry-point locals; they
/// reach the globals only through the `finally` block of the wrapper.
pub(crate) struct ScriptedRuntime {
    sink: Arc<dyn OutputSink>,
    entry_point: String,
    bridge_function: String,
    functions: Mutex<HashMap<String, Arc<dyn HostFunction>>>,
    globals: Mutex<HashMap<String, String>>,
    locals: Mutex<HashMap<String, String>>,
    boot_scripts: Mutex<Vec<String>>,
    runs: Mutex<Vec<String>>,
}

impl ScriptedRuntime {
    pub(crate) fn new(sink: Arc<dyn OutputSink>) -> Self {
        let config = Config::default();
        Self {
            sink,
            entry_point: config.entry_point,
            bridge_function: config.bridge_function,
            functions: Mutex::new(HashMap::new()),
            globals: Mutex::new(HashMap::new()),
            locals: Mutex::new(HashMap::new()),
            boot_scripts: Mutex::new(Vec::new()),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn global(&self, name: &str) -> Option<String> {
        self.globals.lock().get(name).cloned()
    }

    pub(crate) fn bound(&self) -> Vec<String> {
        self.functions.lock().keys().cloned().collect()
    }

    pub(crate) fn boot_scripts(&self) -> Vec<String> {
        self.boot_scripts.lock().clone()
    }

    pub(crate) fn runs(&self) -> Vec<String> {
        self.runs.lock().clone()
    }

    async fn request_line(&self, prompt: String) -> Result<String, Error> {
        let function = self
            .functions
            .lock()
            .get(&self.bridge_function)
            .cloned()
            .ok_or_else(|| guest("NameError", "input is not bound"))?;
        function
            .call(vec![prompt])
            .await
            .map_err(|e| guest("RuntimeError", &e.to_string()))
    }

    fn value(&self, expr: &str) -> Result<String, Error> {
        if let Some(literal) = string_literal(expr) {
            return Ok(literal.to_string());
        }
        let local = self.locals.lock().get(expr).cloned();
        local
            .or_else(|| self.global(expr))
            .ok_or_else(|| guest("NameError", &format!("name '{expr}' is not defined")))
    }

    async fn eval(&self, expr: &str) -> Result<String, Error> {
        if let Some(call) = expr.strip_prefix("await ") {
            let (name, args) = split_call(call).ok_or_else(|| guest("SyntaxError", expr))?;
            if name != "입력" && name != "input" {
                return Err(guest("TypeError", &format!("{name} is not awaitable")));
            }
            let prompt = match args.first() {
                Some(arg) => self.value(arg)?,
                None => String::new(),
            };
            return self.request_line(prompt).await;
        }
        if let Some((name, _)) = split_call(expr) {
            if name == "입력" || name == "input" {
                return Err(guest("RuntimeError", "coroutine was never awaited"));
            }
        }
        self.value(expr)
    }

    async fn statement(&self, line: &str) -> Result<(), Error> {
        if let Some(raised) = line.strip_prefix("raise ") {
            let (kind, args) = split_call(raised).ok_or_else(|| guest("SyntaxError", line))?;
            let message = args.first().map(|a| self.value(a)).transpose()?;
            return Err(guest(kind, message.as_deref().unwrap_or_default()));
        }
        let print = split_call(line).filter(|(name, _)| *name == "출력" || *name == "print");
        if let Some((_, args)) = print {
            let values = args
                .iter()
                .map(|arg| self.value(arg))
                .collect::<Result<Vec<_>, _>>()?;
            self.sink
                .on_log(OutputStream::Stdout, &values.join(" "))
                .await
                .map_err(Error::from_host)?;
            return Ok(());
        }
        if let Some((target, expr)) = line.split_once(" = ") {
            let value = self.eval(expr.trim()).await?;
            self.locals.lock().insert(target.trim().to_string(), value);
            return Ok(());
        }
        self.eval(line).await.map(drop)
    }
}

#[async_trait]
impl GuestRuntime for ScriptedRuntime {
    async fn bind(&self, name: &str, function: Arc<dyn HostFunction>) -> hangpy::Result<()> {
        self.functions.lock().insert(name.to_string(), function);
        Ok(())
    }

    async fn exec(&self, source: &str) -> hangpy::Result<()> {
        let header = format!("async def {}():\n", self.entry_point);
        let Some(wrapped) = source.strip_prefix(&header) else {
            self.boot_scripts.lock().push(source.to_string());
            return Ok(());
        };
        self.runs.lock().push(source.to_string());

        let invoke = format!("await {}()\n", self.entry_point);
        let (body, cleanup) = wrapped
            .strip_suffix(&invoke)
            .and_then(|w| w.strip_prefix("  try:\n"))
            .and_then(|w| w.split_once("  finally:\n"))
            .ok_or_else(|| guest("SyntaxError", "unexpected entry point shape"))?;

        self.locals.lock().clear();
        let mut result = Ok(());
        for line in body.lines() {
            let Some(line) = line.strip_prefix("    ") else {
                result = Err(guest("IndentationError", line));
                break;
            };
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line == "pass" {
                continue;
            }
            if let Err(err) = self.statement(line).await {
                result = Err(err);
                break;
            }
        }

        let locals = std::mem::take(&mut *self.locals.lock());
        if cleanup.trim() == "globals().update(locals())" {
            self.globals.lock().extend(locals);
        }
        result
    }
}

fn guest(kind: &str, message: &str) -> Error {
    Error::Guest {
        message: format!("{kind}: {message}"),
    }
}

fn string_literal(expr: &str) -> Option<&str> {
    expr.strip_prefix('"')?.strip_suffix('"')
}

/// `name(arg, ...)` with string-literal or bare-name arguments.
fn split_call(expr: &str) -> Option<(&str, Vec<&str>)> {
    let (name, rest) = expr.split_once('(')?;
    let inner = rest.strip_suffix(')')?;
    let mut args = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in inner.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                args.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if !inner[start..].trim().is_empty() {
        args.push(inner[start..].trim());
    }
    Some((name.trim(), args))
}

pub(crate) struct Harness {
    pub(crate) session: Arc<Session<Arc<ScriptedRuntime>>>,
    pub(crate) controller: Arc<RunController<Arc<ScriptedRuntime>>>,
}

impl Harness {
    pub(crate) fn new(config: Config) -> Result<Self> {
        let session = Arc::new(Session::new(config));
        let controller = Arc::new(RunController::new(Arc::clone(&session))?);
        Ok(Self {
            session,
            controller,
        })
    }

    pub(crate) async fn booted() -> Result<Self> {
        let harness = Self::new(Config::default())?;
        harness.boot().await?;
        Ok(harness)
    }

    pub(crate) async fn boot(&self) -> hangpy::Result<()> {
        self.session
            .boot(|sink| async move { Ok::<_, Error>(Arc::new(ScriptedRuntime::new(sink))) })
            .await
    }

    pub(crate) fn runtime(&self) -> Result<&Arc<ScriptedRuntime>> {
        self.session.runtime().context("session is not booted")
    }

    /// Wait until the guest is blocked on a line request.
    pub(crate) async fn wait_for_input(&self) -> Result<()> {
        let mut control = self.session.bridge().subscribe_control();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            control.wait_for(|c| c.enabled),
        )
        .await
        .context("timed out waiting for an input request")?
        .context("input control closed")?;
        Ok(())
    }

    pub(crate) fn spawn_run(
        &self,
        source: &str,
    ) -> tokio::task::JoinHandle<hangpy::Result<()>> {
        let controller = Arc::clone(&self.controller);
        let source = source.to_string();
        tokio::spawn(async move { controller.run(&source).await })
    }
}
