//! Patch sets compiled into the binary.
//!
//! These cover the OpenAI client fixes for the playground route handlers;
//! running the tool with no arguments applies [`DEFAULT_PRESET`].

use crate::config::loader::{load_from_str, ConfigError};
use crate::config::schema::PatchConfig;

pub const DEFAULT_PRESET: &str = "runtime-client";

#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub name: &'static str,
    pub summary: &'static str,
    source: &'static str,
}

impl Preset {
    pub fn load(&self) -> Result<PatchConfig, ConfigError> {
        load_from_str(self.source)
    }
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "runtime-client",
        summary: "Insert the OpenAI client after the OPENAI_API_KEY guard",
        source: include_str!("../../patches/runtime-client.toml"),
    },
    Preset {
        name: "runtime-client-fallback",
        summary: "Insert the OpenAI client after the guard holding each route's fallback",
        source: include_str!("../../patches/runtime-client-fallback.toml"),
    },
    Preset {
        name: "relocate-client",
        summary: "Move a module-level OpenAI client behind the OPENAI_API_KEY guard",
        source: include_str!("../../patches/relocate-client.toml"),
    },
];

pub fn find(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|preset| preset.name == name)
}

pub fn names() -> Vec<&'static str> {
    PRESETS.iter().map(|preset| preset.name).collect()
}
