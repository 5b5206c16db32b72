// SPDX-License-Identifier: Apache-2.0

/// Pipeline stage a plugin participates in. Explode-stage plugins own both
/// directions of their file format: per-node explode, per-node rebuild, and
/// type inference for editor-added files.
///
/// Priorities conventionally live in per-stage blocks: 100s pre-explode,
/// 200s explode, 300s post-explode, 400s pre-rebuild, 500s post-rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum Stage {
    PreExplode,
    Explode,
    PostExplode,
    PreRebuild,
    PostRebuild,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreExplode => "pre-explode",
            Self::Explode => "explode",
            Self::PostExplode => "post-explode",
            Self::PreRebuild => "pre-rebuild",
            Self::PostRebuild => "post-rebuild",
        }
    }
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
