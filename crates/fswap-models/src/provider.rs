//! Inference execution providers and resource suggestions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Execution provider for the inference runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
    Rocm,
    Dml,
    Coreml,
    Tensorrt,
    Openvino,
}

impl ExecutionProvider {
    pub const ALL: &'static [ExecutionProvider] = &[
        ExecutionProvider::Cpu,
        ExecutionProvider::Cuda,
        ExecutionProvider::Rocm,
        ExecutionProvider::Dml,
        ExecutionProvider::Coreml,
        ExecutionProvider::Tensorrt,
        ExecutionProvider::Openvino,
    ];

    /// Short name as accepted on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionProvider::Cpu => "cpu",
            ExecutionProvider::Cuda => "cuda",
            ExecutionProvider::Rocm => "rocm",
            ExecutionProvider::Dml => "dml",
            ExecutionProvider::Coreml => "coreml",
            ExecutionProvider::Tensorrt => "tensorrt",
            ExecutionProvider::Openvino => "openvino",
        }
    }

    /// Runtime name (e.g. `CUDAExecutionProvider`).
    pub fn runtime_name(&self) -> &'static str {
        match self {
            ExecutionProvider::Cpu => "CPUExecutionProvider",
            ExecutionProvider::Cuda => "CUDAExecutionProvider",
            ExecutionProvider::Rocm => "ROCMExecutionProvider",
            ExecutionProvider::Dml => "DmlExecutionProvider",
            ExecutionProvider::Coreml => "CoreMLExecutionProvider",
            ExecutionProvider::Tensorrt => "TensorrtExecutionProvider",
            ExecutionProvider::Openvino => "OpenVINOExecutionProvider",
        }
    }

    /// Encode a runtime provider name to its short form.
    ///
    /// `CUDAExecutionProvider` -> `cuda`.
    pub fn encode(runtime_name: &str) -> String {
        runtime_name.replace("ExecutionProvider", "").to_lowercase()
    }

    /// Whether transient accelerator memory should be released between stages.
    pub fn needs_release(&self) -> bool {
        matches!(self, ExecutionProvider::Cuda)
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExecutionProvider {
    type Err = ProviderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = Self::encode(s.trim());
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == encoded)
            .ok_or_else(|| ProviderParseError(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown execution provider: {0}")]
pub struct ProviderParseError(pub String);

/// Select the available runtime providers matching the requested short names.
///
/// A provider is kept when its encoded name contains any requested name;
/// the result follows the order of `available`.
pub fn decode_execution_providers<R, A>(requested: &[R], available: &[A]) -> Vec<String>
where
    R: AsRef<str>,
    A: AsRef<str>,
{
    available
        .iter()
        .map(|p| p.as_ref())
        .filter(|provider| {
            let encoded = ExecutionProvider::encode(provider);
            requested
                .iter()
                .any(|r| encoded.contains(&r.as_ref().to_lowercase()))
        })
        .map(str::to_string)
        .collect()
}

/// Narrow `requested` to the providers the runtime reports as available.
pub fn select_available<A: AsRef<str>>(
    requested: &[ExecutionProvider],
    available: &[A],
) -> Vec<ExecutionProvider> {
    let names: Vec<&str> = requested.iter().map(|p| p.as_str()).collect();
    decode_execution_providers(&names, available)
        .iter()
        .filter_map(|runtime| runtime.parse().ok())
        .collect()
}

/// Suggested memory limit in GB.
pub fn suggest_max_memory() -> u32 {
    if cfg!(target_os = "macos") {
        4
    } else {
        16
    }
}

/// Suggested inference thread count for the given providers.
pub fn suggest_execution_threads(providers: &[ExecutionProvider]) -> u32 {
    if providers
        .iter()
        .any(|p| matches!(p, ExecutionProvider::Dml | ExecutionProvider::Rocm))
    {
        1
    } else {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(ExecutionProvider::encode("CUDAExecutionProvider"), "cuda");
        assert_eq!(ExecutionProvider::encode("CoreMLExecutionProvider"), "coreml");
    }

    #[test]
    fn test_parse_short_and_runtime_names() {
        assert_eq!("cuda".parse::<ExecutionProvider>().unwrap(), ExecutionProvider::Cuda);
        assert_eq!(
            "ROCMExecutionProvider".parse::<ExecutionProvider>().unwrap(),
            ExecutionProvider::Rocm
        );
        assert!("tpu".parse::<ExecutionProvider>().is_err());
    }

    #[test]
    fn test_decode_keeps_available_order() {
        let available = [
            "TensorrtExecutionProvider",
            "CUDAExecutionProvider",
            "CPUExecutionProvider",
        ];
        let selected = decode_execution_providers(&["cpu", "cuda"], &available);
        assert_eq!(selected, vec!["CUDAExecutionProvider", "CPUExecutionProvider"]);
    }

    #[test]
    fn test_decode_nothing_matches() {
        let selected = decode_execution_providers(&["rocm"], &["CPUExecutionProvider"]);
        assert!(selected.is_empty());
    }

    #[test]
    fn test_select_available_drops_missing_providers() {
        let selected = select_available(
            &[ExecutionProvider::Cuda, ExecutionProvider::Cpu],
            &["CPUExecutionProvider"],
        );
        assert_eq!(selected, vec![ExecutionProvider::Cpu]);
        assert!(select_available(&[ExecutionProvider::Rocm], &["CPUExecutionProvider"]).is_empty());
    }

    #[test]
    fn test_suggest_execution_threads() {
        assert_eq!(suggest_execution_threads(&[ExecutionProvider::Dml]), 1);
        assert_eq!(suggest_execution_threads(&[ExecutionProvider::Rocm]), 1);
        assert_eq!(suggest_execution_threads(&[ExecutionProvider::Cuda]), 8);
        assert_eq!(suggest_execution_threads(&[]), 8);
    }
}
