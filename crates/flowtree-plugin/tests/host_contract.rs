// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::sync::Arc;

use flowtree_plugin::{ClaimSet, FlowPlugin, PluginHost, PluginSelection, PluginSpec, Stage};

struct Named {
    name: &'static str,
    stage: Stage,
    priority: i32,
    infers: Option<&'static str>,
}

impl FlowPlugin for Named {
    fn spec(&self) -> PluginSpec {
        PluginSpec::new(self.name, self.stage, self.priority)
    }

    fn infer_node_type(&self, _dir: &std::path::Path, _id: &str) -> Option<String> {
        self.infers.map(ToString::to_string)
    }
}

fn plugin(name: &'static str, stage: Stage, priority: i32) -> Arc<dyn FlowPlugin> {
    Arc::new(Named {
        name,
        stage,
        priority,
        infers: None,
    })
}

#[test]
fn host_orders_by_priority_then_name() {
    let host = PluginHost::new(vec![
        plugin("zeta", Stage::Explode, 210),
        plugin("alpha", Stage::Explode, 210),
        plugin("late", Stage::Explode, 250),
        plugin("early", Stage::Explode, 200),
    ]);
    assert_eq!(host.names(), vec!["early", "alpha", "zeta", "late"]);
}

#[test]
fn stage_iteration_filters_by_declared_stage() {
    let host = PluginHost::new(vec![
        plugin("pre", Stage::PreExplode, 100),
        plugin("node", Stage::Explode, 200),
        plugin("post", Stage::PostRebuild, 500),
    ]);
    let explode: Vec<_> = host.explode_stage().map(|p| p.spec().name).collect();
    assert_eq!(explode, vec!["node"]);
    let pre: Vec<_> = host.stage(Stage::PreExplode).map(|p| p.spec().name).collect();
    assert_eq!(pre, vec!["pre"]);
}

#[test]
fn selection_algebra_applies_in_documented_order() {
    let all: BTreeSet<String> = ["a", "b", "c"].iter().map(ToString::to_string).collect();

    let defaults = PluginSelection::default();
    assert_eq!(defaults.resolve(&all), all);

    let cleared = PluginSelection {
        clear_all: true,
        enable: BTreeSet::from(["b".to_string()]),
        ..Default::default()
    };
    assert_eq!(cleared.resolve(&all), BTreeSet::from(["b".to_string()]));

    let disabled_then_enabled = PluginSelection {
        disable: BTreeSet::from(["a".to_string(), "c".to_string()]),
        enable: BTreeSet::from(["c".to_string()]),
        ..Default::default()
    };
    assert_eq!(
        disabled_then_enabled.resolve(&all),
        BTreeSet::from(["b".to_string(), "c".to_string()])
    );

    // Enabling a name that was never loaded cannot conjure a plugin.
    let phantom = PluginSelection {
        clear_all: true,
        enable: BTreeSet::from(["ghost".to_string()]),
        ..Default::default()
    };
    assert!(phantom.resolve(&all).is_empty());
}

#[test]
fn with_selection_filters_hosted_plugins() {
    let host = PluginHost::with_selection(
        vec![
            plugin("a", Stage::Explode, 200),
            plugin("b", Stage::Explode, 210),
        ],
        &PluginSelection {
            disable: BTreeSet::from(["a".to_string()]),
            ..Default::default()
        },
    );
    assert_eq!(host.names(), vec!["b"]);
}

#[test]
fn type_inference_takes_first_answer_in_priority_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = PluginHost::new(vec![
        Arc::new(Named {
            name: "late-guess",
            stage: Stage::Explode,
            priority: 240,
            infers: Some("late"),
        }),
        Arc::new(Named {
            name: "early-guess",
            stage: Stage::Explode,
            priority: 205,
            infers: Some("early"),
        }),
        Arc::new(Named {
            name: "declines",
            stage: Stage::Explode,
            priority: 200,
            infers: None,
        }),
    ]);
    assert_eq!(
        host.infer_node_type(dir.path(), "n1").as_deref(),
        Some("early")
    );
}

#[test]
fn builtin_host_carries_the_conventional_cascade() {
    let host = PluginHost::builtin();
    assert_eq!(
        host.names(),
        vec![
            "normalize-ids",
            "action",
            "global-function",
            "wrap-func",
            "func",
            "template",
            "info"
        ]
    );
}

#[test]
fn claim_fold_rejects_second_claimant_and_keeps_first() {
    // The engines fold a ClaimSet through explode plugins in host order;
    // model that fold directly.
    let mut claims = ClaimSet::new();
    claims
        .try_claim("wrap-func", &["func".to_string(), "initialize".to_string()])
        .expect("first");
    let conflict = claims
        .try_claim("func", &["func".to_string()])
        .expect_err("second claimant must lose");
    assert_eq!(conflict.holder, "wrap-func");
    assert_eq!(conflict.rejected, "func");
    assert_eq!(claims.holder("func"), Some("wrap-func"));
}
