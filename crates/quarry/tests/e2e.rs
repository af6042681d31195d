// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests from a configuration file to ranked results.
//!
//! The first group drives the engine the way the binary assembles it; the
//! second runs the `quarry` binary itself. Each test works in its own temp
//! directory and is order-insensitive.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use quarry_core::{PluginId, PluginMetadata, SearchPlugin, SearchResult};
use quarry_host::{Engine, EngineOptions, RECORDS_FILE_NAME};
use quarry_plugin::{FnFactory, JsonSettingsStore, NativeCatalog};
use quarry_test_utils::{MockPlugin, PluginFixture};

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("quarry.toml");
    let config = format!(
        "[host]\napplication_directory = \"{}\"\nnode_path = \"/bin/sh\"\nlog_level = \"warn\"\n{body}",
        dir.display()
    );
    std::fs::write(&path, config).unwrap();
    path
}

fn titles(results: &[SearchResult]) -> Vec<(&str, i32)> {
    results.iter().map(|r| (r.title.as_str(), r.score)).collect()
}

async fn start_from_config(path: &Path, mock: &Arc<MockPlugin>) -> Engine {
    let config = quarry_config::load_and_validate_path(path).unwrap();
    let mock = Arc::clone(mock);
    let natives = NativeCatalog::new().with(Box::new(FnFactory::new(
        "Mock",
        move |_: &PluginMetadata| Ok(Arc::clone(&mock) as Arc<dyn SearchPlugin>),
    )));
    Engine::builder(EngineOptions::from_config(&config))
        .natives(natives)
        .settings_store(Arc::new(JsonSettingsStore::new(config.settings_directory())))
        .start()
        .await
        .unwrap()
}

// ---- Engine assembled from a config file ----

#[tokio::test]
async fn selections_survive_a_restart() {
    let app = tempfile::tempdir().unwrap();
    let fixture = PluginFixture::new().unwrap();
    fixture.add_native("mock", "1.0.0", "Mock", &["*"]).unwrap();
    let config = write_config(
        app.path(),
        &format!("[plugins]\ndirectories = [\"{}\"]\n", fixture.root().display()),
    );
    let mock = Arc::new(MockPlugin::new().with_results([("alpha", 10), ("beta", 12)]));

    let engine = start_from_config(&config, &mock).await;
    let results = engine.query_once("a").await;
    assert_eq!(titles(&results), vec![("beta", 12), ("alpha", 10)]);
    let alpha = results.iter().find(|r| r.title == "alpha").unwrap();
    engine.execute(alpha).await.unwrap();
    engine.shutdown().await;
    assert!(app.path().join(RECORDS_FILE_NAME).exists());

    let engine = start_from_config(&config, &mock).await;
    let results = engine.query_once("a").await;
    assert_eq!(titles(&results), vec![("alpha", 15), ("beta", 12)]);
    engine.shutdown().await;
}

#[tokio::test]
async fn config_overrides_reach_the_router_and_ranking() {
    let app = tempfile::tempdir().unwrap();
    let fixture = PluginFixture::new().unwrap();
    fixture.add_native("mock", "1.0.0", "Mock", &["*"]).unwrap();
    let config = write_config(
        app.path(),
        &format!(
            "[plugins]\ndirectories = [\"{}\"]\npriorities = {{ mock = 2 }}\naction_keywords = {{ mock = [\"m\"] }}\n\n[query]\npriority_weight = 10\n",
            fixture.root().display()
        ),
    );
    let mock = Arc::new(MockPlugin::new().with_results([("hit", 1)]));
    let engine = start_from_config(&config, &mock).await;

    assert!(engine.query_once("hit").await.is_empty());
    let results = engine.query_once("m hit").await;
    assert_eq!(titles(&results), vec![("hit", 21)]);
    assert_eq!(results[0].plugin_id, Some(PluginId::new("mock")));
    assert_eq!(results[0].action_keyword_assigned.as_deref(), Some("m"));
    engine.shutdown().await;
}

// ---- The binary ----

fn quarry(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_quarry"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn config_command_prints_effective_toml() {
    let app = tempfile::tempdir().unwrap();
    let config = write_config(app.path(), "[query]\ndebounce_ms = 7\n");

    let output = quarry(&config, &["config"]);
    assert!(output.status.success());
    let rendered: toml::Value = toml::from_str(&stdout(&output)).unwrap();
    assert_eq!(rendered["query"]["debounce_ms"].as_integer(), Some(7));
    assert_eq!(rendered["host"]["node_path"].as_str(), Some("/bin/sh"));
}

#[test]
fn invalid_config_exits_with_failure() {
    let app = tempfile::tempdir().unwrap();
    let config = write_config(app.path(), "[query]\ndebounse_ms = 7\n");

    let output = quarry(&config, &["config"]);
    assert!(!output.status.success());
    assert!(stdout(&output).is_empty());
}

#[test]
fn calculator_answers_queries() {
    let app = tempfile::tempdir().unwrap();
    let config = write_config(app.path(), "");

    let output = quarry(&config, &["query", "6*7"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let text = stdout(&output);
    assert!(text.contains("1. 42"), "{text}");
    assert!(text.contains("quarry.calculator"), "{text}");
}

#[test]
fn shell_keyword_routes_past_the_calculator() {
    let app = tempfile::tempdir().unwrap();
    let config = write_config(app.path(), "");

    let output = quarry(&config, &["query", ">", "echo", "1+1"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("echo 1+1"), "{text}");
    assert!(!text.contains("quarry.calculator"), "{text}");
}

#[cfg(unix)]
#[test]
fn plugins_command_lists_builtin_and_script_plugins() {
    let app = tempfile::tempdir().unwrap();
    let fixture = PluginFixture::new().unwrap();
    fixture
        .add_script(
            "weather",
            "javascript",
            &["w"],
            r#"printf '%s' '{"result":[{"title":"sunny","subTitle":"21C","score":5}]}'"#,
        )
        .unwrap();
    let config = write_config(
        app.path(),
        &format!("[plugins]\ndirectories = [\"{}\"]\n", fixture.root().display()),
    );

    let output = quarry(&config, &["plugins", "--json"]);
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let ids: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"quarry.calculator"));
    assert!(ids.contains(&"quarry.shell"));
    assert!(ids.contains(&"weather"));

    let output = quarry(&config, &["query", "w", "today"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("sunny"), "{text}");
    assert!(text.contains("21C"), "{text}");
}
