// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Staged transformation plugins.
//!
//! A plugin is a value describing itself through a [`PluginSpec`] (name,
//! stage, priority) plus a set of hooks; there is no registration
//! side-channel. The [`PluginHost`] owns the ordered collection and the
//! engines fold a per-node [`ClaimSet`] through the explode-stage plugins so
//! ownership of every extracted field is explicit and inspectable.

pub mod builtin;
mod claim;
mod error;
mod host;
mod jshape;
mod plugin;
mod stage;

pub use claim::{ClaimConflict, ClaimSet};
pub use error::{PluginError, PluginFailure};
pub use host::{PluginHost, PluginSelection};
pub use plugin::{FlowPlugin, PluginResult, PluginSpec};
pub use stage::Stage;

pub const CRATE_NAME: &str = "flowtree-plugin";
