// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use flowtree_engine::{
    explode, rebuild, ExplodeOptions, NewFilePolicy, OrphanPolicy, RebuildOptions,
    EngineErrorCode, ORPHAN_DIR,
};
use flowtree_model::document_from_value;
use flowtree_plugin::builtin::{InfoPlugin, WrapFuncPlugin};
use flowtree_plugin::PluginHost;
use serde_json::json;

fn host() -> PluginHost {
    PluginHost::new(vec![Arc::new(WrapFuncPlugin), Arc::new(InfoPlugin)])
}

fn two_node_doc() -> flowtree_model::Document {
    document_from_value(json!([
        {"id": "tab_a", "type": "tab"},
        {"id": "keep", "type": "function", "z": "tab_a", "func": "return msg;", "wires": [[]]},
        {"id": "gone", "type": "function", "z": "tab_a", "func": "return null;", "wires": [[]]}
    ]))
    .expect("doc")
}

#[test]
fn removed_nodes_files_are_quarantined_on_next_explode() {
    let tree = tempfile::tempdir().expect("tempdir");
    let host = host();
    let mut doc = two_node_doc();
    explode(&mut doc, tree.path(), &host, &ExplodeOptions::default()).expect("explode 1");
    assert!(tree.path().join("tab_a/gone.wrapped.js").exists());

    let mut smaller = document_from_value(json!([
        {"id": "tab_a", "type": "tab"},
        {"id": "keep", "type": "function", "z": "tab_a", "func": "return msg;", "wires": [[]]}
    ]))
    .expect("doc");
    let report = explode(&mut smaller, tree.path(), &host, &ExplodeOptions::default())
        .expect("explode 2");

    assert!(!report.orphaned.is_empty());
    assert!(!tree.path().join("tab_a/gone.wrapped.js").exists());
    assert!(tree
        .path()
        .join(ORPHAN_DIR)
        .join("tab_a/gone.wrapped.js")
        .exists());
    // The survivor is untouched.
    assert!(tree.path().join("tab_a/keep.wrapped.js").exists());
}

#[test]
fn delete_policy_removes_orphans_outright() {
    let tree = tempfile::tempdir().expect("tempdir");
    let host = host();
    let mut doc = two_node_doc();
    explode(&mut doc, tree.path(), &host, &ExplodeOptions::default()).expect("explode 1");

    let mut smaller = document_from_value(json!([
        {"id": "tab_a", "type": "tab"},
        {"id": "keep", "type": "function", "z": "tab_a", "func": "return msg;", "wires": [[]]}
    ]))
    .expect("doc");
    let opts = ExplodeOptions {
        orphans: OrphanPolicy::Delete,
        ..ExplodeOptions::default()
    };
    explode(&mut smaller, tree.path(), &host, &opts).expect("explode 2");
    assert!(!tree.path().join("tab_a/gone.wrapped.js").exists());
    assert!(!tree.path().join(ORPHAN_DIR).exists());
}

#[test]
fn editor_added_node_is_incorporated_with_inferred_type() {
    let tree = tempfile::tempdir().expect("tempdir");
    let host = host();
    let mut doc = two_node_doc();
    explode(&mut doc, tree.path(), &host, &ExplodeOptions::default()).expect("explode");

    // Operator drops a new function node into the tab: definition + wrapped
    // body, the way the exploded layout looks for every other node.
    std::fs::write(
        tree.path().join("tab_a/added.json"),
        br#"{"name":"added by hand"}"#,
    )
    .expect("write definition");
    std::fs::write(
        tree.path().join("tab_a/added.wrapped.js"),
        b"export default function addedByHand(msg, node, context, flow, global, env, RED) {\nreturn msg;\n}\n",
    )
    .expect("write body");

    let outcome = rebuild(tree.path(), &host, &RebuildOptions::default()).expect("rebuild");
    assert_eq!(outcome.added, vec!["added"]);
    let added = outcome.document.find("added").expect("added node");
    assert_eq!(added.node_type(), Some("function"));
    assert_eq!(added.z(), Some("tab_a"));
    assert_eq!(added.get("func").and_then(serde_json::Value::as_str), Some("return msg;"));
    assert!(added.get("wires").is_some());
    // Appended after every skeleton node.
    assert_eq!(
        outcome.document.nodes().last().and_then(|n| n.id()),
        Some("added")
    );
}

#[test]
fn uninferrable_new_file_is_quarantined_with_warning() {
    let tree = tempfile::tempdir().expect("tempdir");
    let host = host();
    let mut doc = two_node_doc();
    explode(&mut doc, tree.path(), &host, &ExplodeOptions::default()).expect("explode");

    std::fs::write(tree.path().join("tab_a/mystery.json"), br#"{"name":"?"}"#)
        .expect("write");

    let outcome = rebuild(tree.path(), &host, &RebuildOptions::default()).expect("rebuild");
    assert!(outcome.added.is_empty());
    assert_eq!(outcome.quarantined.len(), 1);
    assert!(outcome.document.find("mystery").is_none());
    assert!(tree
        .path()
        .join(ORPHAN_DIR)
        .join("tab_a/mystery.json")
        .exists());
}

#[test]
fn new_file_delete_policy_removes_definition_and_siblings() {
    let tree = tempfile::tempdir().expect("tempdir");
    let host = host();
    let mut doc = two_node_doc();
    explode(&mut doc, tree.path(), &host, &ExplodeOptions::default()).expect("explode");

    std::fs::write(tree.path().join("tab_a/extra.json"), br"{}").expect("write");
    std::fs::write(tree.path().join("tab_a/extra.wrapped.js"), b"x").expect("write sibling");

    let opts = RebuildOptions {
        new_files: NewFilePolicy::Delete,
        ..RebuildOptions::default()
    };
    rebuild(tree.path(), &host, &opts).expect("rebuild");
    assert!(!tree.path().join("tab_a/extra.json").exists());
    assert!(!tree.path().join("tab_a/extra.wrapped.js").exists());
}

#[test]
fn rebuild_without_skeleton_is_fatal() {
    let tree = tempfile::tempdir().expect("tempdir");
    let err = rebuild(tree.path(), &host(), &RebuildOptions::default())
        .expect_err("must fail");
    assert_eq!(err.code, EngineErrorCode::SkeletonMissing);
    assert_eq!(err.code.as_str(), "skeleton_missing");
}

#[test]
fn vanished_node_files_are_fatal_unless_tolerant() {
    let tree = tempfile::tempdir().expect("tempdir");
    let host = host();
    let mut doc = two_node_doc();
    explode(&mut doc, tree.path(), &host, &ExplodeOptions::default()).expect("explode");

    // Simulate data loss: every file of "gone" disappears.
    std::fs::remove_file(tree.path().join("tab_a/gone.wrapped.js")).expect("remove");

    let err = rebuild(tree.path(), &host, &RebuildOptions::default())
        .expect_err("data loss must be fatal");
    assert_eq!(err.code, EngineErrorCode::NodeFilesMissing);

    let outcome = rebuild(
        tree.path(),
        &host,
        &RebuildOptions {
            tolerant: true,
            ..RebuildOptions::default()
        },
    )
    .expect("tolerant rebuild");
    assert_eq!(outcome.dropped, vec!["gone"]);
    assert!(outcome.document.find("gone").is_none());
    assert!(outcome.document.find("keep").is_some());
}

#[test]
fn quarantined_files_never_retrigger_reconciliation() {
    let tree = tempfile::tempdir().expect("tempdir");
    let host = host();
    let mut doc = two_node_doc();
    explode(&mut doc, tree.path(), &host, &ExplodeOptions::default()).expect("explode");

    std::fs::write(tree.path().join("tab_a/mystery.json"), br"{}").expect("write");
    let first = rebuild(tree.path(), &host, &RebuildOptions::default()).expect("rebuild 1");
    assert_eq!(first.quarantined.len(), 1);

    // Second rebuild must not see the quarantined file as new again.
    let second = rebuild(tree.path(), &host, &RebuildOptions::default()).expect("rebuild 2");
    assert!(second.quarantined.is_empty());
    assert!(second.added.is_empty());
}
