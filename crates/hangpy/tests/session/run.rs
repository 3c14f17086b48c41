use anyhow::{Context, Result};
use hangpy::{Config, Error, InputControl};

use super::common::Harness;

const SEPARATOR: &str = "----- 실행 -----";

#[tokio::test]
async fn integration_session_print_only_program() -> Result<()> {
    let harness = Harness::booted().await?;
    harness.controller.run("출력(\"hi\")").await?;

    assert_eq!(
        harness.session.transcript().contents(),
        format!("\n{SEPARATOR}\nhi\n")
    );
    let runs = harness.runtime()?.runs();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].contains("\n    출력(\"hi\")\n"));
    Ok(())
}

#[tokio::test]
async fn integration_session_input_round_trip() -> Result<()> {
    let harness = Harness::booted().await?;
    let run = harness.spawn_run("이름 = 입력(\"이름: \")\n출력(\"안녕,\", 이름)");

    harness.wait_for_input().await?;
    let bridge = harness.session.bridge();
    let control = bridge.control();
    assert!(control.enabled && control.focused);
    assert!(harness.session.transcript().contents().ends_with("이름: "));
    assert!(!harness.session.run_enabled());

    assert!(bridge.submit_line("민수"));
    run.await.context("run task panicked")??;

    assert_eq!(
        harness.session.transcript().lines(),
        ["", SEPARATOR, "이름: 민수", "안녕, 민수"]
    );
    assert_eq!(harness.runtime()?.global("이름").as_deref(), Some("민수"));
    assert_eq!(bridge.control(), InputControl::default());
    assert!(harness.session.run_enabled());
    Ok(())
}

#[tokio::test]
async fn integration_session_marked_input_is_not_wrapped_twice() -> Result<()> {
    let harness = Harness::booted().await?;
    let run = harness.spawn_run("x = await 입력()");

    harness.wait_for_input().await?;
    assert!(harness.session.bridge().submit_line("ok"));
    run.await.context("run task panicked")??;

    let runs = harness.runtime()?.runs();
    assert!(runs[0].contains("  x = await 입력()\n"));
    assert!(!runs[0].contains("await await"));
    assert_eq!(harness.runtime()?.global("x").as_deref(), Some("ok"));
    Ok(())
}

#[tokio::test]
async fn integration_session_guest_error_is_reported_once() -> Result<()> {
    let harness = Harness::booted().await?;
    harness.controller.run("a = \"set\"").await?;

    let err = harness
        .controller
        .run("raise ValueError(\"boom\")")
        .await
        .unwrap_err();
    assert!(err.is_guest());

    let lines = harness.session.transcript().lines();
    let errors: Vec<_> = lines.iter().filter(|l| l.starts_with("[실행 오류]")).collect();
    assert_eq!(errors, ["[실행 오류] ValueError: boom"]);
    assert!(harness.session.run_enabled());

    harness.controller.run("출력(a)").await?;
    assert_eq!(harness.session.transcript().lines().last().map(String::as_str), Some("set"));
    Ok(())
}

#[tokio::test]
async fn integration_session_globals_persist_across_runs() -> Result<()> {
    let harness = Harness::booted().await?;
    harness.controller.run("x = \"kept\"").await?;
    harness.controller.run("출력(x)").await?;

    assert_eq!(
        harness.session.transcript().lines(),
        ["", SEPARATOR, "", SEPARATOR, "kept"]
    );
    Ok(())
}

#[tokio::test]
async fn integration_session_failed_run_keeps_partial_globals() -> Result<()> {
    let harness = Harness::booted().await?;
    let err = harness
        .controller
        .run("partial = \"kept\"\nraise ValueError(\"boom\")\nafter = \"never\"")
        .await
        .unwrap_err();
    assert!(err.is_guest());

    let runtime = harness.runtime()?;
    assert_eq!(runtime.global("partial").as_deref(), Some("kept"));
    assert_eq!(runtime.global("after"), None);

    harness.controller.run("출력(partial)").await?;
    assert_eq!(
        harness.session.transcript().lines(),
        ["", SEPARATOR, "[실행 오류] ValueError: boom", "", SEPARATOR, "kept"]
    );
    Ok(())
}

#[tokio::test]
async fn integration_session_name_error_after_failed_lookup() -> Result<()> {
    let harness = Harness::booted().await?;
    let err = harness.controller.run("출력(missing)").await.unwrap_err();
    assert!(matches!(err, Error::Guest { .. }));
    assert_eq!(
        harness.session.transcript().lines().last().map(String::as_str),
        Some("[실행 오류] NameError: name 'missing' is not defined")
    );
    Ok(())
}

#[tokio::test]
async fn integration_session_run_before_boot_is_refused() -> Result<()> {
    let harness = Harness::new(Config::default())?;
    let err = harness.controller.run("출력(\"hi\")").await.unwrap_err();

    assert!(matches!(err, Error::NotReady));
    assert_eq!(
        harness.session.transcript().contents(),
        "[실행 불가] 아직 준비되지 않았습니다\n"
    );
    Ok(())
}

#[tokio::test]
async fn integration_session_runs_are_serialized() -> Result<()> {
    let harness = Harness::booted().await?;
    let first = harness.spawn_run("a = 입력(\"a? \")");
    harness.wait_for_input().await?;

    let second = harness.spawn_run("출력(a)");
    tokio::task::yield_now().await;
    assert_eq!(harness.runtime()?.runs().len(), 1);

    assert!(harness.session.bridge().submit_line("first"));
    first.await.context("first run panicked")??;
    second.await.context("second run panicked")??;

    assert_eq!(
        harness.session.transcript().lines(),
        ["", SEPARATOR, "a? first", "", SEPARATOR, "first"]
    );
    Ok(())
}

#[tokio::test]
async fn integration_session_english_messages() -> Result<()> {
    let mut config = Config::default();
    config.apply_env(|name| (name == hangpy::config::ENV_LANG).then(|| "en".to_string()))?;
    let harness = Harness::new(config)?;
    harness.boot().await?;

    harness.controller.run("raise KeyError(\"k\")").await.unwrap_err();
    assert_eq!(
        harness.session.transcript().lines(),
        ["", "----- run -----", "[execution error] KeyError: k"]
    );
    Ok(())
}
