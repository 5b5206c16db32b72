// SPDX-License-Identifier: Apache-2.0

//! Built-in plugins at their conventional priorities.
//!
//! | Plugin | Stage | Priority |
//! |---|---|---|
//! | `normalize-ids` | pre-explode | 100 |
//! | `action` | explode | 200 |
//! | `global-function` | explode | 210 |
//! | `wrap-func` | explode | 220 |
//! | `func` | explode | 230 |
//! | `template` | explode | 240 |
//! | `info` | explode | 250 |
//! | `format-tree` | post-explode | 300 |
//! | `format-check` | pre-rebuild | 400 |
//! | `format-document` | post-rebuild | 500 |
//!
//! The code-extraction plugins cascade through the claim protocol: `action`
//! and `global-function` take specially-shaped function nodes first,
//! `wrap-func` takes the remaining function nodes, and `func` is the raw
//! fallback that only runs when `wrap-func` is disabled.

mod action;
mod format;
mod func;
mod global_function;
mod info;
mod normalize_ids;
mod template;
mod wrap_func;

use std::sync::Arc;

use crate::plugin::FlowPlugin;

pub use action::ActionPlugin;
pub use format::{FormatCommand, FormatCheckPlugin, FormatDocumentPlugin, FormatTreePlugin};
pub use func::FuncPlugin;
pub use global_function::GlobalFunctionPlugin;
pub use info::InfoPlugin;
pub use normalize_ids::NormalizeIdsPlugin;
pub use template::TemplatePlugin;
pub use wrap_func::WrapFuncPlugin;

/// Every built-in that needs no external tooling. The formatter plugins are
/// constructed explicitly with the command they should run.
#[must_use]
pub fn all() -> Vec<Arc<dyn FlowPlugin>> {
    vec![
        Arc::new(NormalizeIdsPlugin),
        Arc::new(ActionPlugin),
        Arc::new(GlobalFunctionPlugin),
        Arc::new(WrapFuncPlugin),
        Arc::new(FuncPlugin),
        Arc::new(TemplatePlugin),
        Arc::new(InfoPlugin),
    ]
}

pub(crate) fn non_empty_str<'a>(
    node: &'a flowtree_model::Node,
    field: &str,
) -> Option<&'a str> {
    node.get(field)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
}
