use anyhow::Result;
use hangpy::{
    Config, Error, Status,
    keywords::{BUILTIN_KEYWORDS, input_override_script, render_keyword_script},
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

use super::common::{Harness, ScriptedRuntime};

fn with_keywords(source: &str) -> Config {
    Config {
        keywords: Some(source.to_string()),
        ..Config::default()
    }
}

#[tokio::test]
async fn integration_session_boot_installs_bridge_then_keywords() -> Result<()> {
    let harness = Harness::booted().await?;
    let config = Config::default();

    assert_eq!(harness.session.status(), Status::Ready);
    assert!(harness.session.is_ready());
    assert!(harness.session.run_enabled());

    let runtime = harness.runtime()?;
    assert_eq!(runtime.bound(), [config.bridge_function.clone()]);
    assert_eq!(
        runtime.boot_scripts(),
        [
            input_override_script(&config.bridge_function),
            render_keyword_script(BUILTIN_KEYWORDS),
        ]
    );
    assert!(harness.session.transcript().contents().is_empty());
    Ok(())
}

#[tokio::test]
async fn integration_session_second_boot_is_rejected() -> Result<()> {
    let harness = Harness::booted().await?;
    let err = harness.boot().await.unwrap_err();
    assert!(matches!(err, Error::AlreadyBooted));
    assert_eq!(harness.session.status(), Status::Ready);
    Ok(())
}

#[tokio::test]
async fn integration_session_keywords_fetched_without_cache() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hangle.py"))
        .and(header("cache-control", "no-store"))
        .respond_with(ResponseTemplate::new(200).set_body_string("출력 = print\n"))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(with_keywords(&format!("{}/hangle.py", server.uri())))?;
    harness.boot().await?;

    let scripts = harness.runtime()?.boot_scripts();
    assert_eq!(scripts.last().map(String::as_str), Some("출력 = print\n"));
    Ok(())
}

#[tokio::test]
async fn integration_session_keyword_fetch_failure_is_terminal() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let harness = Harness::new(with_keywords(&format!("{}/hangle.py", server.uri())))?;
    let err = harness.boot().await.unwrap_err();
    assert!(matches!(err, Error::Boot(_)));

    assert!(matches!(harness.session.status(), Status::Failed(_)));
    assert!(!harness.session.is_ready());
    assert!(!harness.session.run_enabled());
    let lines = harness.session.transcript().lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("[초기화 오류] "));
    assert!(lines[0].contains("status 404"));

    let err = harness.controller.run("출력(\"hi\")").await.unwrap_err();
    assert!(matches!(err, Error::NotReady));
    Ok(())
}

#[tokio::test]
async fn integration_session_missing_keyword_file_fails_boot() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("hangle.py");
    let harness = Harness::new(with_keywords(&missing.to_string_lossy()))?;

    let err = harness.boot().await.unwrap_err();
    assert!(matches!(err, Error::Boot(_)));
    assert!(harness.session.runtime().is_none());
    Ok(())
}

#[tokio::test]
async fn integration_session_keyword_file_is_loaded() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("hangle.py");
    std::fs::write(&file, "입력 = input\n")?;

    let harness = Harness::new(with_keywords(&file.to_string_lossy()))?;
    harness.boot().await?;
    assert_eq!(
        harness.runtime()?.boot_scripts().last().map(String::as_str),
        Some("입력 = input\n")
    );
    Ok(())
}

#[tokio::test]
async fn integration_session_loader_failure_is_reported() -> Result<()> {
    let harness = Harness::new(Config::default())?;
    let err = harness
        .session
        .boot(|_sink| async {
            Err::<std::sync::Arc<ScriptedRuntime>, _>(Error::Boot("no interpreter".to_string()))
        })
        .await
        .unwrap_err();

    assert!(matches!(&err, Error::Boot(message) if message == "no interpreter"));
    assert_eq!(
        harness.session.status(),
        Status::Failed("no interpreter".to_string())
    );
    assert_eq!(
        harness.session.transcript().contents(),
        "[초기화 오류] no interpreter\n"
    );
    Ok(())
}
