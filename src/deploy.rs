// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hook definitions handed to the deployment side.
//!
//! A [`HookDefinition`] wraps a [`CompileResult`] in the shape the ledger's
//! `SetHook` transaction consumes: uppercase hex bytecode, the artifact hash,
//! and optional named parameters. Building, signing and submitting the
//! transaction happen elsewhere.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::artifact::CompileResult;

/// One named hook parameter.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct HookParameter {
    pub name: String,
    pub value: String,
}

/// A hook parameter as it appears on the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct EncodedHookParameter {
    /// Uppercase hex of the UTF-8 name.
    pub hook_parameter_name: String,
    /// Uppercase hex of the UTF-8 value.
    pub hook_parameter_value: String,
}

impl HookParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn encoded(&self) -> EncodedHookParameter {
        EncodedHookParameter {
            hook_parameter_name: hex::encode_upper(self.name.as_bytes()),
            hook_parameter_value: hex::encode_upper(self.value.as_bytes()),
        }
    }
}

/// Deployable hook built from a compilation result.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct HookDefinition {
    pub name: String,
    /// Uppercase hex of the WASM bytes.
    pub wasm: String,
    /// Hex SHA-256 of the WASM bytes.
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<HookParameter>>,
}

impl HookDefinition {
    pub fn from_compile_result(
        name: impl Into<String>,
        result: &CompileResult,
        parameters: Vec<HookParameter>,
    ) -> Self {
        Self {
            name: name.into(),
            wasm: hex::encode_upper(result.bytes()),
            hash: result.hash().to_string(),
            parameters: (!parameters.is_empty()).then_some(parameters),
        }
    }

    /// Uppercase hex of the hook name, used as its state namespace.
    pub fn namespace(&self) -> String {
        hex::encode_upper(self.name.as_bytes())
    }

    /// Ledger-encoded parameters, in declaration order.
    pub fn encoded_parameters(&self) -> Vec<EncodedHookParameter> {
        self.parameters
            .iter()
            .flatten()
            .map(HookParameter::encoded)
            .collect()
    }
}
