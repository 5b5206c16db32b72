// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Explode/rebuild engines over flow trees.
//!
//! `explode` decomposes a document into per-node files plus a hidden
//! structural skeleton; `rebuild` is its inverse. Both fold the plugin host
//! through every node and guarantee: identical tree + identical plugins =
//! byte-identical output, and a skeleton-only rebuild reproduces structure
//! exactly.

mod error;
mod explode;
mod fsutil;
mod parallel;
mod rebuild;
mod skeleton;
mod treeops;
mod verify;

pub use error::{EngineError, EngineErrorCode};
pub use explode::{explode, ExplodeOptions, ExplodeReport};
pub use fsutil::{atomic_write, create_backup};
pub use parallel::{MAX_POOL, PARALLEL_THRESHOLD};
pub use rebuild::{rebuild, rebuild_node_from_files, RebuildOptions, RebuildOutcome};
pub use skeleton::{node_directory, Skeleton, SkeletonEntry, SKELETON_FILENAME};
pub use treeops::{NewFilePolicy, OrphanPolicy, ORPHAN_DIR};
pub use verify::{verify_round_trip, VerifyReport};

pub const CRATE_NAME: &str = "flowtree-engine";
