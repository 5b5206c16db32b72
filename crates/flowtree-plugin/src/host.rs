// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::warn;

use crate::plugin::FlowPlugin;
use crate::stage::Stage;

/// Enable/disable computation over the loaded plugin set, processed as:
/// clear-all, then add-all, then per-name disable, then per-name enable.
#[derive(Debug, Default, Clone)]
pub struct PluginSelection {
    pub clear_all: bool,
    pub add_all: bool,
    pub disable: BTreeSet<String>,
    pub enable: BTreeSet<String>,
}

impl PluginSelection {
    /// Active plugin names out of `all`.
    #[must_use]
    pub fn resolve(&self, all: &BTreeSet<String>) -> BTreeSet<String> {
        let mut active = if self.clear_all {
            BTreeSet::new()
        } else {
            all.clone()
        };
        if self.add_all {
            active = all.clone();
        }
        for name in &self.disable {
            active.remove(name);
        }
        for name in &self.enable {
            if all.contains(name) {
                active.insert(name.clone());
            }
        }
        active
    }
}

/// Ordered, immutable collection of plugins. Construction sorts by
/// `(priority, name)` and warns about same-stage priority collisions; after
/// that the host is a plain value the engines iterate.
#[derive(Clone)]
pub struct PluginHost {
    plugins: Vec<Arc<dyn FlowPlugin>>,
}

impl PluginHost {
    #[must_use]
    pub fn new(mut plugins: Vec<Arc<dyn FlowPlugin>>) -> Self {
        plugins.sort_by(|a, b| {
            let (sa, sb) = (a.spec(), b.spec());
            sa.priority.cmp(&sb.priority).then(sa.name.cmp(sb.name))
        });
        let mut by_slot: BTreeMap<(Stage, i32), Vec<&'static str>> = BTreeMap::new();
        for plugin in &plugins {
            let spec = plugin.spec();
            by_slot
                .entry((spec.stage, spec.priority))
                .or_default()
                .push(spec.name);
        }
        for ((stage, priority), names) in by_slot {
            if names.len() > 1 {
                warn!(
                    stage = %stage,
                    priority,
                    "priority collision, running alphabetically: {}",
                    names.join(", ")
                );
            }
        }
        Self { plugins }
    }

    /// Filter a plugin list through a selection before hosting it.
    #[must_use]
    pub fn with_selection(
        plugins: Vec<Arc<dyn FlowPlugin>>,
        selection: &PluginSelection,
    ) -> Self {
        let all: BTreeSet<String> = plugins
            .iter()
            .map(|p| p.spec().name.to_string())
            .collect();
        let active = selection.resolve(&all);
        Self::new(
            plugins
                .into_iter()
                .filter(|p| active.contains(p.spec().name))
                .collect(),
        )
    }

    /// Host with every built-in plugin at its conventional priority.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(crate::builtin::all())
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn stage(&self, stage: Stage) -> impl Iterator<Item = &Arc<dyn FlowPlugin>> {
        self.plugins
            .iter()
            .filter(move |p| p.spec().stage == stage)
    }

    pub fn explode_stage(&self) -> impl Iterator<Item = &Arc<dyn FlowPlugin>> {
        self.stage(Stage::Explode)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.spec().name).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Type inference for a node directory the skeleton does not cover:
    /// explode-stage plugins are consulted in priority order, first answer
    /// wins.
    #[must_use]
    pub fn infer_node_type(&self, node_dir: &std::path::Path, id: &str) -> Option<String> {
        self.explode_stage()
            .find_map(|p| p.infer_node_type(node_dir, id))
    }

    /// True when any explode-stage plugin recognises `filename` as one of its
    /// sibling files.
    #[must_use]
    pub fn is_metadata_file(&self, filename: &str) -> bool {
        self.explode_stage().any(|p| p.is_metadata_file(filename))
    }
}

impl core::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PluginHost")
            .field("plugins", &self.names())
            .finish()
    }
}
