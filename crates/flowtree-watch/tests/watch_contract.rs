// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flowtree_model::{document_from_value, Document, Node};
use flowtree_plugin::builtin::{InfoPlugin, WrapFuncPlugin};
use flowtree_plugin::{FlowPlugin, PluginHost, PluginResult, PluginSpec, Stage};
use flowtree_remote::{FakeFlowTransport, FlowTransport, RemoteErrorCode};
use flowtree_watch::{spawn_watch, WatchCommand, WatchHandle, WatchOptions, WatchPaths};
use serde_json::{json, Value};

fn content_host() -> Arc<PluginHost> {
    Arc::new(PluginHost::new(vec![
        Arc::new(WrapFuncPlugin),
        Arc::new(InfoPlugin),
    ]))
}

fn server_document() -> Document {
    document_from_value(json!([
        {"id": "tab_main", "type": "tab", "label": "Main"},
        {
            "id": "n1", "type": "function", "z": "tab_main", "name": "double",
            "func": "msg.payload*=2;return msg;", "x": 10, "y": 20, "wires": [[]]
        }
    ]))
    .expect("document")
}

fn fast_options() -> WatchOptions {
    WatchOptions {
        poll_interval: Duration::from_millis(30),
        debounce: Duration::from_millis(60),
        ..WatchOptions::default()
    }
}

struct Rig {
    fake: Arc<FakeFlowTransport>,
    handle: WatchHandle,
    _dir: tempfile::TempDir,
    tree: std::path::PathBuf,
}

fn start(options: WatchOptions, host: Arc<PluginHost>) -> Rig {
    let dir = tempfile::tempdir().expect("tempdir");
    let tree = dir.path().join("src");
    let paths = WatchPaths {
        tree: tree.clone(),
        document: dir.path().join("flows.json"),
    };
    let fake = Arc::new(FakeFlowTransport::new(server_document()));
    let transport: Arc<dyn FlowTransport> = Arc::clone(&fake) as Arc<dyn FlowTransport>;
    let handle = spawn_watch(transport, host, paths, options).expect("spawn watch");
    Rig {
        fake,
        handle,
        _dir: dir,
        tree,
    }
}

fn wait_until(timeout: Duration, mut probe: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if probe() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(15));
    }
    false
}

fn wait_for_initial_explode(rig: &Rig) {
    assert!(
        wait_until(Duration::from_secs(5), || rig
            .tree
            .join("tab_main/n1.wrapped.js")
            .exists()),
        "initial download never exploded"
    );
    // Let the RemoteUpdate reaction finish reopening the watcher gate.
    std::thread::sleep(Duration::from_millis(120));
}

fn edit_wrapped_body(tree: &Path, body: &str) {
    let path = tree.join("tab_main/n1.wrapped.js");
    let wrapped = format!(
        "export default function double(msg, node, context, flow, global, env, RED) {{\n{body}\n}}\n"
    );
    std::fs::write(path, wrapped).expect("edit wrapped file");
}

#[test]
fn remote_update_explodes_without_self_triggering_a_push() {
    let rig = start(fast_options(), content_host());
    wait_for_initial_explode(&rig);

    // Conditional polls keep answering 304 after the first download.
    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(rig.fake.fetch_count(), 1);
    // Writing the tree from the RemoteUpdate reaction must not loop back
    // into a LocalEdit push.
    assert_eq!(rig.fake.push_count(), 0);

    let status = rig.handle.status().expect("status");
    assert!(!status.paused);
    assert_eq!(status.transport.revision.as_deref(), Some("R1"));
    assert_eq!(status.unstable, 0);

    rig.handle.shutdown().expect("shutdown");
}

#[test]
fn external_remote_edit_propagates_to_the_tree() {
    let rig = start(fast_options(), content_host());
    wait_for_initial_explode(&rig);

    let mut edited = server_document();
    edited.nodes_mut()[1].insert("name", json!("tripled"));
    rig.fake.external_edit(edited);

    assert!(
        wait_until(Duration::from_secs(5), || {
            std::fs::read_to_string(rig.tree.join("tab_main/n1.json"))
                .map(|raw| raw.contains("tripled"))
                .unwrap_or(false)
        }),
        "server-side edit never reached the tree"
    );
    assert_eq!(rig.fake.push_count(), 0);
    rig.handle.shutdown().expect("shutdown");
}

#[test]
fn local_edit_rebuilds_pushes_and_converges() {
    let rig = start(fast_options(), content_host());
    wait_for_initial_explode(&rig);

    edit_wrapped_body(&rig.tree, "msg.payload*=3;return msg;");

    assert!(
        wait_until(Duration::from_secs(5), || rig.fake.push_count() == 1),
        "debounced edit never pushed"
    );
    let pushed = rig.fake.server_document();
    let func = pushed
        .find("n1")
        .and_then(|n: &Node| n.get("func"))
        .and_then(Value::as_str)
        .expect("func on server");
    assert_eq!(func, "msg.payload*=3;return msg;");
    assert_eq!(rig.fake.pushed_revisions(), vec!["R2"]);

    // The push cleared the ETag; the follow-up unconditional fetch explodes
    // an identical tree and nothing further happens.
    assert!(
        wait_until(Duration::from_secs(5), || rig.fake.fetch_count() >= 2),
        "post-push fetch never happened"
    );
    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(rig.fake.push_count(), 1, "converged state must stop pushing");

    rig.handle.shutdown().expect("shutdown");
}

#[test]
fn push_conflict_pauses_until_operator_upload() {
    let rig = start(fast_options(), content_host());
    wait_for_initial_explode(&rig);

    rig.fake.fail_next_push(RemoteErrorCode::Conflict);
    edit_wrapped_body(&rig.tree, "msg.payload+=1;return msg;");

    assert!(
        wait_until(Duration::from_secs(5), || {
            rig.handle
                .status()
                .map(|s| s.paused && s.pause_reason == Some("remote_conflict"))
                .unwrap_or(false)
        }),
        "conflict never paused the loop"
    );

    // Paused: further local edits are ignored.
    edit_wrapped_body(&rig.tree, "msg.payload+=2;return msg;");
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(rig.fake.push_count(), 0);

    // Operator resolves out-of-band and forces an upload.
    rig.handle.command(WatchCommand::Upload).expect("upload");
    assert!(
        wait_until(Duration::from_secs(5), || rig.fake.push_count() == 1),
        "forced upload never pushed"
    );
    let status = rig.handle.status().expect("status");
    assert!(!status.paused);

    rig.handle.shutdown().expect("shutdown");
}

/// Rewrites a marker field on every pass, so no explode is ever a fixpoint.
struct RestlessPlugin;

impl FlowPlugin for RestlessPlugin {
    fn spec(&self) -> PluginSpec {
        PluginSpec::new("restless", Stage::PreExplode, 110)
    }

    fn pre_explode(&self, document: &mut Document) -> PluginResult<bool> {
        if let Some(node) = document.nodes_mut().first_mut() {
            let next = node.get("pass").and_then(Value::as_u64).unwrap_or(0) + 1;
            node.insert("pass", json!(next));
        }
        Ok(true)
    }
}

#[test]
fn oscillation_pauses_within_limit_plus_one_cycles() {
    let host = Arc::new(PluginHost::new(vec![
        Arc::new(RestlessPlugin),
        Arc::new(WrapFuncPlugin),
    ]));
    let options = WatchOptions {
        cycle_limit: 3,
        ..fast_options()
    };
    let rig = start(options, host);

    assert!(
        wait_until(Duration::from_secs(10), || {
            rig.handle
                .status()
                .map(|s| s.paused && s.pause_reason == Some("oscillation"))
                .unwrap_or(false)
        }),
        "oscillation never detected"
    );
    let pushes_at_pause = rig.fake.push_count();
    assert!(
        pushes_at_pause <= 4,
        "loop must pause within limit+1 cycles, saw {pushes_at_pause}"
    );

    // Paused means paused: no further pushes happen on their own.
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(rig.fake.push_count(), pushes_at_pause);

    // Revisions from the successful pushes are strictly monotonic.
    let revisions: Vec<u64> = rig
        .fake
        .pushed_revisions()
        .iter()
        .map(|r| r.trim_start_matches('R').parse().expect("revision number"))
        .collect();
    assert!(revisions.windows(2).all(|w| w[0] < w[1]), "{revisions:?}");

    // The warning names the plugin that kept modifying the document.
    let status = rig.handle.status().expect("status");
    assert!(
        status
            .recent_activity
            .iter()
            .any(|line| line.contains("oscillation") && line.contains("restless")),
        "activity: {:?}",
        status.recent_activity
    );

    rig.handle.shutdown().expect("shutdown");
}

#[test]
fn repeated_push_failures_hit_the_cap_and_pause() {
    let options = WatchOptions {
        failure_cap: 1,
        ..fast_options()
    };
    let rig = start(options, content_host());
    wait_for_initial_explode(&rig);

    rig.fake.fail_pushes(RemoteErrorCode::Transient, 10);
    edit_wrapped_body(&rig.tree, "return msg;");

    assert!(
        wait_until(Duration::from_secs(5), || {
            rig.handle
                .status()
                .map(|s| s.paused && s.pause_reason == Some("failure_cap"))
                .unwrap_or(false)
        }),
        "failure cap never paused the loop"
    );
    rig.handle.shutdown().expect("shutdown");
}

#[test]
fn operator_commands_pause_resume_and_check() {
    let rig = start(fast_options(), content_host());
    wait_for_initial_explode(&rig);

    rig.handle.command(WatchCommand::Pause).expect("pause");
    let status = rig.handle.status().expect("status");
    assert!(status.paused);
    assert_eq!(status.pause_reason, Some("paused"));

    // Local edits are inert while paused.
    edit_wrapped_body(&rig.tree, "return null;");
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(rig.fake.push_count(), 0);

    rig.handle.command(WatchCommand::Resume).expect("resume");
    let status = rig.handle.status().expect("status");
    assert!(!status.paused);

    rig.handle.command(WatchCommand::Check).expect("check");
    assert!(
        wait_until(Duration::from_secs(5), || {
            rig.handle
                .status()
                .map(|s| s.recent_activity.iter().any(|l| l.contains("check:")))
                .unwrap_or(false)
        }),
        "check never reported"
    );
    // Check alone never pushes.
    let uploads_before = rig.fake.push_count();
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(rig.fake.push_count(), uploads_before);

    rig.handle.shutdown().expect("shutdown");
}

#[test]
fn editor_added_node_reaches_the_server() {
    let rig = start(fast_options(), content_host());
    wait_for_initial_explode(&rig);

    std::fs::write(
        rig.tree.join("tab_main/added.json"),
        br#"{"name":"fresh"}"#,
    )
    .expect("definition");
    std::fs::write(
        rig.tree.join("tab_main/added.wrapped.js"),
        b"export default function fresh(msg, node, context, flow, global, env, RED) {\nreturn msg;\n}\n",
    )
    .expect("body");

    assert!(
        wait_until(Duration::from_secs(5), || rig.fake.push_count() >= 1),
        "new node never uploaded"
    );
    assert!(
        wait_until(Duration::from_secs(5), || rig
            .fake
            .server_document()
            .find("added")
            .is_some()),
        "server document missing the new node"
    );
    let server = rig.fake.server_document();
    let added = server.find("added").expect("added node");
    assert_eq!(added.node_type(), Some("function"));
    assert_eq!(added.z(), Some("tab_main"));

    rig.handle.shutdown().expect("shutdown");
}
