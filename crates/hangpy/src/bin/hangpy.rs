use std::{
    env::args,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::anyhow;
use hangpy::{
    Config, Editor, PythonRuntime, RunController, Session, Transcript, TranscriptEvent,
    config::ENV_CONFIG, kpy,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin},
    sync::oneshot,
};
use tokio_stream::StreamExt;
use tracing::{Level, info, warn};

type Controller = RunController<PythonRuntime>;
type Input = Lines<BufReader<Stdin>>;

const COMMANDS: &str = "commands: :run :new :help :example :clear :save [name] :load <path> :show :quit";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing()?;

    let config_path = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    let session = Arc::new(Session::new(config));

    let (shutdown, shutdown_rx) = oneshot::channel();
    let printer = tokio::spawn(print_transcript(session.transcript().clone(), shutdown_rx));
    tokio::spawn(log_status(Arc::clone(&session)));

    let booted = session
        .boot(|sink| async move { PythonRuntime::new(sink) })
        .await;
    let controller = Arc::new(RunController::new(Arc::clone(&session))?);
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let task = args().nth(1);
    let outcome = match task.as_deref() {
        Some("run") => {
            let path = args()
                .nth(2)
                .ok_or_else(|| anyhow!("usage: hangpy run <file.kpy>"))?;
            if booted.is_err() {
                Ok(ExitCode::FAILURE)
            } else {
                run_file(&controller, Path::new(&path), &mut input).await
            }
        }
        None => interactive(&controller, &mut input).await,
        Some(other) => Err(anyhow!("unknown task: {other}")),
    };

    let _ = shutdown.send(());
    printer.await??;
    outcome
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(Level::WARN.into())
        .from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!(e))
}

/// Mirror the transcript on stdout until `shutdown` fires and every
/// queued append has been written.
async fn print_transcript(
    transcript: Transcript,
    mut shutdown: oneshot::Receiver<()>,
) -> std::io::Result<()> {
    let mut events = Box::pin(transcript.stream());
    let mut stdout = tokio::io::stdout();
    loop {
        tokio::select! {
            biased;
            event = events.next() => match event {
                Some(TranscriptEvent::Appended(text)) => stdout.write_all(text.as_bytes()).await?,
                Some(TranscriptEvent::Cleared) => stdout.write_all(b"\x1b[2J\x1b[H").await?,
                None => break,
            },
            _ = &mut shutdown => break,
        }
        stdout.flush().await?;
    }
    stdout.flush().await
}

async fn log_status(session: Arc<Session<PythonRuntime>>) {
    let mut status = session.subscribe_status();
    while status.changed().await.is_ok() {
        let current = status.borrow_and_update().clone();
        info!(status = %current, "session status");
    }
}

/// Run `source`, feeding stdin lines to the input bridge whenever the
/// guest is waiting on one, until the run finishes.
async fn pump_run(
    controller: &Arc<Controller>,
    source: String,
    input: &mut Input,
) -> anyhow::Result<bool> {
    let bridge = Arc::clone(controller.session().bridge());
    let mut control = bridge.subscribe_control();
    let mut run = tokio::spawn({
        let controller = Arc::clone(controller);
        async move { controller.run(&source).await }
    });

    loop {
        tokio::select! {
            result = &mut run => return Ok(result?.is_ok()),
            requested = control.wait_for(|c| c.enabled) => {
                drop(requested?);
                match input.next_line().await? {
                    Some(line) => {
                        bridge.submit_line(&line);
                    }
                    None => {
                        warn!("stdin closed while input was requested");
                        run.abort();
                        return Ok(false);
                    }
                }
            }
        }
    }
}

async fn run_file(
    controller: &Arc<Controller>,
    path: &Path,
    input: &mut Input,
) -> anyhow::Result<ExitCode> {
    let source = kpy::load(path).await?;
    let succeeded = pump_run(controller, source, input).await?;
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn interactive(controller: &Arc<Controller>, input: &mut Input) -> anyhow::Result<ExitCode> {
    let session = controller.session();
    let transcript = session.transcript();
    let messages = session.messages();
    let mut editor = Editor::with_example();
    transcript.append_line(COMMANDS);

    while let Some(line) = input.next_line().await? {
        let (command, argument) = line
            .trim()
            .split_once(char::is_whitespace)
            .map_or((line.trim(), ""), |(c, a)| (c, a.trim()));
        match command {
            ":run" => {
                pump_run(controller, editor.text().to_string(), input).await?;
            }
            ":new" => editor.clear(),
            ":help" => editor.insert_help_call(),
            ":example" => editor.insert_example(),
            ":clear" => transcript.clear(),
            ":save" => {
                let name = if argument.is_empty() {
                    kpy::suggest_file_name(&chrono::Local::now())
                } else {
                    argument.to_string()
                };
                match kpy::save(Path::new("."), &name, editor.text()).await {
                    Ok(path) => kpy::notice_saved(transcript, messages, &path),
                    Err(err) => transcript.append_line(&err.to_string()),
                }
            }
            ":load" => match kpy::load(Path::new(argument)).await {
                Ok(text) => {
                    editor.set_text(text);
                    kpy::notice_loaded(transcript, messages, Path::new(argument));
                }
                Err(err) => transcript.append_line(&err.to_string()),
            },
            ":show" => {
                let width = editor.line_count().to_string().len();
                for (number, text) in editor.text().split('\n').enumerate() {
                    transcript.append_line(&format!("{:>width$} | {text}", number + 1));
                }
            }
            ":quit" => break,
            other if other.starts_with(':') => transcript.append_line(COMMANDS),
            _ => editor.append_snippet(&format!("{line}\n")),
        }
    }
    Ok(ExitCode::SUCCESS)
}
