// SPDX-License-Identifier: Apache-2.0

/// An already-resolved credential. Resolution (files, environment, prompts)
/// happens outside this crate; the client only applies what it is handed.
#[derive(Clone, Default)]
pub enum Credential {
    #[default]
    None,
    Bearer(String),
    Basic {
        username: String,
        password: String,
    },
}

impl Credential {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bearer(_) => "bearer",
            Self::Basic { .. } => "basic",
        }
    }
}

impl core::fmt::Debug for Credential {
    // Secrets stay out of logs.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Credential({})", self.kind())
    }
}
