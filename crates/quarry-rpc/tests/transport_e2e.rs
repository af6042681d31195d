// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end transport tests against shell-script plugins.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use quarry_core::types::{HostEnvironment, PluginMetadata, Query, RpcAction, Runtime};
use quarry_core::{
    HostApiTable, HostHandler, HostMethod, PluginInitContext, PluginSettings, QuarryError,
    SearchPlugin,
};
use quarry_rpc::{
    ConnectionOptions, Framing, LaunchSpec, ProcessSupervisor, V1Options, V1Plugin, V2Options,
    V2Plugin,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Line-oriented JSON-RPC worker. Answers `initialize` and `query`, pushes a
/// late `UpdateResults` before each query answer, and reports its own pid.
const NEWLINE_WORKER: &str = r#"
while IFS= read -r line; do
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$method" ] && continue
  case "$method" in
    initialize)
      printf '{"jsonrpc":"2.0","id":%s,"result":null}\n' "$id" ;;
    query)
      case "$line" in *slow*) sleep 1 ;; esac
      printf '{"jsonrpc":"2.0","id":"u1","method":"Quarry.UpdateResults","params":["late",[{"title":"Late"}]]}\n'
      printf '{"jsonrpc":"2.0","id":%s,"result":[{"title":"pid %s","score":7}]}\n' "$id" "$$" ;;
    broken)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32000,"message":"nope"}}\n' "$id" ;;
    close)
      exit 0 ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"result":null}\n' "$id" ;;
  esac
done
"#;

fn write_script(dir: &Path, body: &str) -> LaunchSpec {
    let script = dir.join("plugin.sh");
    std::fs::write(&script, body).unwrap();
    LaunchSpec {
        program: "/bin/sh".into(),
        args: vec![script.to_string_lossy().into_owned()],
        working_dir: dir.to_path_buf(),
        env: Vec::new(),
    }
}

fn metadata(dir: &Path, runtime: Runtime) -> Arc<PluginMetadata> {
    Arc::new(
        PluginMetadata::new("script", "Script", semver::Version::new(1, 0, 0), runtime)
            .with_directory(dir),
    )
}

fn context(metadata: &Arc<PluginMetadata>, host: HostApiTable) -> PluginInitContext {
    PluginInitContext {
        metadata: Arc::clone(metadata),
        host: Arc::new(host),
        settings: Arc::new(PluginSettings::empty(metadata.id.clone())),
        environment: HostEnvironment::default(),
    }
}

fn query(search: &str) -> Query {
    Query::new(
        search,
        search.split_whitespace().map(str::to_string).collect(),
        "",
        search,
    )
}

fn v1(dir: &Path, body: &str, supervisor: &Arc<ProcessSupervisor>) -> V1Plugin {
    V1Plugin::new(
        metadata(dir, Runtime::Executable),
        write_script(dir, body),
        Arc::clone(supervisor),
        V1Options::default(),
    )
}

fn v2(dir: &Path, body: &str, supervisor: &Arc<ProcessSupervisor>) -> V2Plugin {
    V2Plugin::new(
        metadata(dir, Runtime::PythonV2),
        write_script(dir, body),
        Arc::clone(supervisor),
        V2Options {
            connection: ConnectionOptions::new(Framing::Newline),
            request_timeout: Duration::from_secs(5),
            startup_timeout: Duration::from_secs(5),
        },
    )
}

#[tokio::test]
async fn v1_results_are_parsed_even_after_a_failing_exit() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Arc::new(ProcessSupervisor::new());
    let plugin = v1(
        tmp.path(),
        r#"printf '%s' '{"result":[{"Title":"Foo","SubTitle":"bar","IcoPath":"icon.png","Score":10}]}'
exit 3
"#,
        &supervisor,
    );

    let results = plugin
        .query(&query("foo"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "Foo");
    assert_eq!(results[0].subtitle, "bar");
    assert_eq!(results[0].score, 10);
    let icon = results[0].icon_path.as_deref().unwrap();
    assert_eq!(Path::new(icon), tmp.path().join("icon.png"));
    assert_eq!(supervisor.live(), 0);
}

#[tokio::test]
async fn v1_request_arrives_as_one_json_argument() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Arc::new(ProcessSupervisor::new());
    let plugin = v1(
        tmp.path(),
        r#"printf '%s' "$1" > "$(dirname "$0")/arg.txt"
printf '{"result":[]}'
"#,
        &supervisor,
    );

    plugin
        .query(&query(r#"say "hi" C:\temp"#), CancellationToken::new())
        .await
        .unwrap();

    // A plugin reads its first argument straight into a JSON parser.
    let raw = std::fs::read_to_string(tmp.path().join("arg.txt")).unwrap();
    let request: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(request["method"], "query");
    assert_eq!(request["parameters"], json!([r#"say "hi" C:\temp"#]));
}

#[tokio::test]
async fn v1_cancellation_kills_the_child_and_yields_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Arc::new(ProcessSupervisor::new());
    let plugin = v1(tmp.path(), "sleep 30\n", &supervisor);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let results = plugin.query(&query("x"), cancel).await.unwrap();
    assert!(results.is_empty());
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(supervisor.live(), 0);
}

#[tokio::test]
async fn v1_malformed_output_is_a_transport_error() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Arc::new(ProcessSupervisor::new());
    let plugin = v1(tmp.path(), "echo 'not json'\n", &supervisor);

    let err = plugin
        .query(&query("x"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QuarryError::Transport { .. }), "{err}");
}

#[tokio::test]
async fn v1_action_output_can_call_the_host() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Arc::new(ProcessSupervisor::new());
    let plugin = v1(
        tmp.path(),
        r#"printf '%s' '{"method":"Quarry.ChangeQuery","parameters":["new q",false]}'
"#,
        &supervisor,
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let host = HostApiTable::new().with(
        HostMethod::ChangeQuery,
        HostHandler::new(move |call| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(call.str_param(0)?.to_string());
                Ok(Value::Null)
            }
        }),
    );
    let meta = metadata(tmp.path(), Runtime::Executable);
    plugin.init(context(&meta, host)).await.unwrap();

    let hide = plugin
        .execute(&RpcAction {
            method: "open".into(),
            parameters: vec![json!("target")],
            dont_hide_after_action: false,
        })
        .await
        .unwrap();
    assert!(hide);
    assert_eq!(rx.recv().await.as_deref(), Some("new q"));
}

#[tokio::test]
async fn v2_query_and_late_update_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Arc::new(ProcessSupervisor::new());
    let plugin = v2(tmp.path(), NEWLINE_WORKER, &supervisor);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let host = HostApiTable::new().with(
        HostMethod::UpdateResults,
        HostHandler::new(move |call| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(call.params);
                Ok(Value::Null)
            }
        }),
    );
    let meta = metadata(tmp.path(), Runtime::PythonV2);
    plugin.init(context(&meta, host)).await.unwrap();
    let pid = plugin.current_pid().unwrap();

    let results = plugin
        .query(&query("hello"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, format!("pid {pid}"));
    assert_eq!(results[0].score, 7);

    let update = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update[0], "late");
    assert_eq!(update[1][0]["title"], "Late");

    plugin.dispose().await.unwrap();
    assert_eq!(supervisor.live(), 0);
}

#[tokio::test]
async fn v2_plugin_errors_become_empty_results() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Arc::new(ProcessSupervisor::new());
    let plugin = v2(tmp.path(), NEWLINE_WORKER, &supervisor);
    let meta = metadata(tmp.path(), Runtime::PythonV2);
    plugin.init(context(&meta, HostApiTable::new())).await.unwrap();

    let hide = plugin
        .execute(&RpcAction {
            method: "broken".into(),
            parameters: Vec::new(),
            dont_hide_after_action: true,
        })
        .await
        .unwrap();
    assert!(!hide);
    plugin.dispose().await.unwrap();
}

#[tokio::test]
async fn v2_reload_leaves_exactly_one_live_worker() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Arc::new(ProcessSupervisor::new());
    let plugin = Arc::new(v2(tmp.path(), NEWLINE_WORKER, &supervisor));
    let meta = metadata(tmp.path(), Runtime::PythonV2);
    plugin.init(context(&meta, HostApiTable::new())).await.unwrap();
    let before = plugin.current_pid().unwrap();

    let in_flight = {
        let plugin = Arc::clone(&plugin);
        tokio::spawn(async move { plugin.query(&query("slow"), CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    plugin.reload().await.unwrap();

    let after = plugin.current_pid().unwrap();
    assert_ne!(before, after);
    assert_eq!(supervisor.pids_of(&meta.id), vec![after]);

    match in_flight.await.unwrap() {
        Err(QuarryError::Cancelled) => {}
        Ok(results) => assert_eq!(results[0].title, format!("pid {before}")),
        Err(e) => panic!("unexpected error: {e}"),
    }

    let results = plugin
        .query(&query("again"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(results[0].title, format!("pid {after}"));

    plugin.dispose().await.unwrap();
    assert_eq!(supervisor.live(), 0);
}

#[tokio::test]
async fn v2_stderr_during_initialization_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Arc::new(ProcessSupervisor::new());
    let plugin = v2(
        tmp.path(),
        "echo 'ImportError: no module named flox' >&2\nsleep 30\n",
        &supervisor,
    );
    let meta = metadata(tmp.path(), Runtime::PythonV2);

    let err = plugin
        .init(context(&meta, HostApiTable::new()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ImportError"), "{err}");
    assert!(plugin.current_pid().is_none());
    assert_eq!(supervisor.live(), 0);
}

#[tokio::test]
async fn v2_query_before_init_is_a_transport_error() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Arc::new(ProcessSupervisor::new());
    let plugin = v2(tmp.path(), NEWLINE_WORKER, &supervisor);

    let err = plugin
        .query(&query("x"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QuarryError::Transport { .. }));
}

/// Set when this test binary is re-run as a host that aborts mid-flight.
#[cfg(target_os = "linux")]
const ABORTING_HOST: &str = "QUARRY_TEST_ABORTING_HOST";

/// Running and not a zombie, per `/proc/<pid>/stat`.
#[cfg(target_os = "linux")]
fn process_running(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    let state = stat.rsplit(')').next().and_then(|rest| rest.trim_start().chars().next());
    !matches!(state, None | Some('Z') | Some('X'))
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn workers_die_with_an_aborted_host() {
    if std::env::var_os(ABORTING_HOST).is_some() {
        let supervisor = ProcessSupervisor::new();
        let mut command = tokio::process::Command::new("sleep");
        command
            .arg("30")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        let child = supervisor
            .spawn(&quarry_core::PluginId::new("orphan"), &mut command)
            .unwrap();
        println!("worker={}", child.id().unwrap());
        std::io::Write::flush(&mut std::io::stdout()).unwrap();
        std::process::abort();
    }

    let output = std::process::Command::new(std::env::current_exe().unwrap())
        .args(["workers_die_with_an_aborted_host", "--exact", "--nocapture", "--quiet", "--test-threads=1"])
        .env(ABORTING_HOST, "1")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let pid: u32 = stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("worker="))
        .and_then(|pid| pid.parse().ok())
        .unwrap_or_else(|| panic!("no worker pid in host output: {stdout}"));

    let deadline = Instant::now() + Duration::from_secs(5);
    while process_running(pid) {
        assert!(Instant::now() < deadline, "worker {pid} outlived its aborted host");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
