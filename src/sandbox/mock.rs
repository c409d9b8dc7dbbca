// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Development builder that never runs a toolchain.

use async_trait::async_trait;

use super::HookBuilder;
use crate::config::BuilderKind;
use crate::error::CompileError;
use crate::workspace::{SourceUnit, Workspace};

/// Leading marker of every placeholder artifact.
pub const MOCK_MARKER: &str = "Mock WASM for ";

/// How much of the source is echoed into the placeholder.
const SOURCE_PREFIX_CHARS: usize = 100;

/// Produces a deterministic, clearly labelled placeholder instead of WASM.
///
/// The bytes are `"Mock WASM for <name>\n<first 100 chars of source>"`; they
/// are not a valid module and only exist so downstream code can run without
/// a container engine.
#[derive(Debug, Clone, Default)]
pub struct MockBuilder;

impl MockBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn placeholder(unit: &SourceUnit) -> Vec<u8> {
        let prefix: String = unit.code().chars().take(SOURCE_PREFIX_CHARS).collect();
        format!("{MOCK_MARKER}{}\n{prefix}", unit.name()).into_bytes()
    }
}

#[async_trait]
impl HookBuilder for MockBuilder {
    fn kind(&self) -> BuilderKind {
        BuilderKind::Mock
    }

    async fn build(
        &self,
        unit: &SourceUnit,
        _workspace: &Workspace,
    ) -> Result<Vec<u8>, CompileError> {
        let bytes = Self::placeholder(unit);
        tracing::warn!(
            unit = unit.name(),
            size = bytes.len(),
            "[MOCK] Produced placeholder artifact, not a real WASM module"
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::finalize;
    use tempfile::TempDir;

    #[test]
    fn placeholder_names_unit_and_echoes_prefix() {
        let code = format!("// header\n{}", "x".repeat(500));
        let unit = SourceUnit::new("loyalty_issuer", code.clone()).unwrap();

        let text = String::from_utf8(MockBuilder::placeholder(&unit)).unwrap();
        let expected_prefix: String = code.chars().take(100).collect();
        assert_eq!(text, format!("Mock WASM for loyalty_issuer\n{expected_prefix}"));
    }

    #[test]
    fn placeholder_prefix_respects_multibyte_chars() {
        let unit = SourceUnit::new("hook", "ü".repeat(150)).unwrap();
        let text = String::from_utf8(MockBuilder::placeholder(&unit)).unwrap();
        assert_eq!(text.lines().nth(1).unwrap().chars().count(), 100);
    }

    #[tokio::test]
    async fn mock_result_satisfies_artifact_contract() {
        let temp = TempDir::new().unwrap();
        let unit = SourceUnit::new("reward_validator", "int64_t hook(uint32_t r);").unwrap();
        let workspace = Workspace::stage(temp.path(), &unit).await.unwrap();

        let builder = MockBuilder::new();
        let first = finalize(builder.build(&unit, &workspace).await.unwrap());
        let second = finalize(builder.build(&unit, &workspace).await.unwrap());

        assert!(first.bytes().starts_with(MOCK_MARKER.as_bytes()));
        assert_eq!(first.size(), first.bytes().len());
        assert_eq!(first.hash().len(), 64);
        assert_eq!(first, second);
        assert_eq!(builder.kind(), BuilderKind::Mock);
    }
}
