// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::compiler::Compiler;
use crate::config::ServiceConfig;
use crate::sandbox::MockBuilder;

#[derive(Clone)]
pub struct AppState {
    pub compiler: Arc<Compiler>,
}

impl AppState {
    pub fn new(compiler: Compiler) -> Self {
        Self {
            compiler: Arc::new(compiler),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(Compiler::from_config(config))
    }
}

impl Default for AppState {
    /// Mock builder over the default workspace root.
    fn default() -> Self {
        let config = ServiceConfig::default();
        Self::new(Compiler::new(
            Arc::new(MockBuilder::new()),
            config.workspace_root,
            config.max_source_bytes,
        ))
    }
}
