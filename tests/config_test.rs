//! Integration tests for loading run configs and their sources from disk.

use std::fs;
use std::path::Path;

use bulkpost::config::{Environment, RunConfig};
use bulkpost::error::{Error, SourceKind};
use bulkpost::factory::FIRST_LINE_TITLES;

fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn config_text(titles: &str) -> String {
    format!(
        r#"
[dispatch]
concurrency = 2

[tasks]
accounts = "accs"
account_format = "lj-0"
count = 4
titles = "{titles}"
content = "content"
order = "sequential"

[operation]
kind = "dry-run"

[output]
path = "out/run"
"#
    )
}

#[test]
fn loads_sources_relative_to_config_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "accs.csv", "a@x,pw,alice,secret\nb@x,pw,bob,secret\n");
    write(dir.path(), "titles.txt", "First\nSecond\n");
    write(dir.path(), "content.d/01.txt", "one");
    write(dir.path(), "content.d/02.txt", "two");
    write(dir.path(), "run.toml", &config_text("titles"));

    let config = RunConfig::load(dir.path().join("run.toml")).unwrap();
    let tasks: Vec<_> = config.task_factory().unwrap().collect();

    assert_eq!(tasks.len(), 4);
    let targets: Vec<_> = tasks.iter().map(|t| t.payload.target().to_string()).collect();
    assert_eq!(targets, vec!["lj:alice", "lj:bob", "lj:alice", "lj:bob"]);
    let titles: Vec<_> = tasks.iter().map(|t| t.payload.title.clone().unwrap()).collect();
    assert_eq!(titles, vec!["First", "Second", "First", "Second"]);
    assert_eq!(tasks[1].payload.content, "two");

    let sink = config.output_sink().unwrap();
    assert_eq!(sink.path_for("txt"), dir.path().join("out/run.txt"));
}

#[test]
fn first_line_titles_come_from_content() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "accs.csv", "a@x,pw,alice,secret\n");
    write(dir.path(), "content.d/01.txt", "<h1>Headline</h1>\nBody text");
    write(dir.path(), "content.d/02.txt", "no body");
    write(dir.path(), "run.toml", &config_text(FIRST_LINE_TITLES));

    let config = RunConfig::load(dir.path().join("run.toml")).unwrap();
    for task in config.task_factory().unwrap() {
        assert_eq!(task.payload.title.as_deref(), Some("Headline"));
        assert_eq!(task.payload.content, "Body text");
    }
}

#[test]
fn missing_source_aborts_startup() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "accs.csv", "a@x,pw,alice,secret\n");
    write(dir.path(), "titles.txt", "T\n");
    write(dir.path(), "run.toml", &config_text("titles"));

    let config = RunConfig::load(dir.path().join("run.toml")).unwrap();
    match config.task_factory() {
        Err(Error::SourceNotFound { kind, path }) => {
            assert_eq!(kind, SourceKind::Text);
            assert!(path.ends_with("content"));
        }
        Err(other) => panic!("expected SourceNotFound, got {other}"),
        Ok(_) => panic!("expected SourceNotFound, got a factory"),
    }
}

#[test]
fn malformed_account_row_aborts_startup() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "accs.csv", "a@x,pw,alice,secret\nb@x,bob\n");
    write(dir.path(), "titles.txt", "T\n");
    write(dir.path(), "content.txt", "C\n");
    write(dir.path(), "run.toml", &config_text("titles"));

    let config = RunConfig::load(dir.path().join("run.toml")).unwrap();
    match config.task_factory() {
        Err(Error::MalformedRow {
            row,
            expected,
            found,
            ..
        }) => assert_eq!((row, expected, found), (2, 4, 2)),
        Err(other) => panic!("expected MalformedRow, got {other}"),
        Ok(_) => panic!("expected MalformedRow, got a factory"),
    }
}

#[test]
fn missing_config_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = RunConfig::load(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn unknown_keys_are_rejected() {
    let text = config_text("titles").replace("concurrency = 2", "concurency = 2");
    assert!(matches!(RunConfig::parse(&text, "."), Err(Error::Toml(_))));
}

#[test]
fn environment_treats_empty_as_unset() {
    // SAFETY: no other test in this binary reads these variables.
    unsafe {
        std::env::set_var("OTEL_ENDPOINT", "");
        std::env::set_var("LOG_LEVEL", "debug");
    }

    let env = Environment::from_env();
    assert_eq!(env.otel_endpoint, None);
    assert_eq!(env.log_level.as_deref(), Some("debug"));

    unsafe {
        std::env::remove_var("OTEL_ENDPOINT");
        std::env::remove_var("LOG_LEVEL");
    }
}
