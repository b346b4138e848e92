use serde::{Deserialize, Serialize};

/// Context tag used when a log carries no explicit context-window suffix.
pub const DEFAULT_CTX: &str = "default";

/// One benchmark observation: a single model x environment x test row
/// parsed from a llama-bench log, or a bare error record when the log
/// produced no usable table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub model: String,
    pub model_clean: String,
    pub env: String,
    pub env_base: String,
    #[serde(default)]
    pub env_variant: Option<String>,
    pub fa: bool,
    pub context: String,
    #[serde(default)]
    pub context_tokens: Option<u32>,
    /// "pp512" or "tg128"; absent for pure error logs.
    #[serde(default)]
    pub test: Option<String>,
    #[serde(default)]
    pub tps_mean: Option<f64>,
    #[serde(default)]
    pub tps_std: Option<f64>,
    pub error: bool,
    #[serde(default)]
    pub error_type: Option<ErrorType>,
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub ngl: Option<u32>,
    #[serde(default)]
    pub mmap: Option<u32>,
    #[serde(default)]
    pub params_b: Option<f64>,
    #[serde(default)]
    pub file_size_gib: Option<f64>,
    #[serde(default)]
    pub name_params_b: Option<f64>,
    #[serde(default)]
    pub quant: Option<String>,
    pub log: String,
    pub rpc: bool,
    #[serde(default)]
    pub build: Option<Build>,
}

impl Run {
    /// Parameter count for display/filtering: table value if present,
    /// else the count parsed from the model name.
    pub fn size_b(&self) -> Option<f64> {
        self.params_b.or(self.name_params_b)
    }

    pub fn measurement(&self) -> Measurement {
        Measurement {
            mean: self.tps_mean,
            std: self.tps_std,
            failed: self.error,
            error_type: self.error_type,
        }
    }
}

/// Failure classification for an errored run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Load,
    Hang,
    Runtime,
}

impl ErrorType {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorType::Load => "Load Error",
            ErrorType::Hang => "GPU Hang",
            ErrorType::Runtime => "Runtime Error",
        }
    }
}

/// llama.cpp build identification from a "build: <hash> (<number>)" line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Build {
    pub hash: String,
    pub number: String,
}

/// One backend's cell in a model row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub std: Option<f64>,
    pub failed: bool,
    #[serde(default)]
    pub error_type: Option<ErrorType>,
}

impl Measurement {
    /// A cell is usable as a winner candidate only when the run succeeded
    /// and reported a throughput mean.
    pub fn is_usable(&self) -> bool {
        !self.failed && self.mean.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    pub generated_at: String,
    #[serde(default)]
    pub os_kernel: Option<String>,
    #[serde(default)]
    pub llamacpp_builds: Vec<Build>,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Top-level results.json document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultsDoc {
    pub meta: Meta,
    pub runs: Vec<Run>,
}

impl ResultsDoc {
    pub fn from_json(text: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_round_trips_results_json_schema() {
        let raw = r#"{
            "model": "Qwen3-30B-A3B-Q4_K_M-00001-of-00002",
            "model_clean": "Qwen3-30B-A3B-Q4_K_M",
            "env": "rocm6_4_4-rocwmma",
            "env_base": "rocm6_4_4",
            "env_variant": "rocwmma",
            "fa": true,
            "context": "default",
            "context_tokens": null,
            "test": "tg128",
            "tps_mean": 42.17,
            "tps_std": 0.31,
            "error": false,
            "error_type": null,
            "backend": "ROCm",
            "ngl": 99,
            "mmap": 0,
            "params_b": 30.53,
            "file_size_gib": 17.28,
            "name_params_b": 30.53,
            "quant": "Q4_K_M",
            "log": "results/Qwen3-30B-A3B-Q4_K_M__rocm6_4_4-rocwmma__fa1.log",
            "rpc": false,
            "build": { "hash": "cd6983d5", "number": "6119" }
        }"#;
        let run: Run = serde_json::from_str(raw).unwrap();
        assert_eq!(run.env_variant.as_deref(), Some("rocwmma"));
        assert_eq!(run.test.as_deref(), Some("tg128"));
        assert_eq!(run.size_b(), Some(30.53));
        assert!(run.measurement().is_usable());

        let back = serde_json::to_string(&run).unwrap();
        let again: Run = serde_json::from_str(&back).unwrap();
        assert_eq!(again.tps_mean, Some(42.17));
        assert_eq!(again.build.unwrap().hash, "cd6983d5");
    }

    #[test]
    fn error_run_with_no_test_deserializes() {
        let raw = r#"{
            "model": "glm-4.5-air",
            "model_clean": "glm-4.5-air",
            "env": "vulkan_radv",
            "env_base": "vulkan_radv",
            "fa": false,
            "context": "default",
            "error": true,
            "error_type": "load",
            "log": "results/glm-4.5-air__vulkan_radv.log",
            "rpc": false
        }"#;
        let run: Run = serde_json::from_str(raw).unwrap();
        assert!(run.test.is_none());
        assert_eq!(run.error_type, Some(ErrorType::Load));
        assert!(!run.measurement().is_usable());
        assert_eq!(run.error_type.unwrap().label(), "Load Error");
    }

    #[test]
    fn name_params_fallback_when_table_lacks_params() {
        let raw = r#"{
            "model": "m", "model_clean": "m", "env": "e", "env_base": "e",
            "fa": false, "context": "default", "error": false,
            "name_params_b": 8.0, "log": "l", "rpc": false
        }"#;
        let run: Run = serde_json::from_str(raw).unwrap();
        assert_eq!(run.size_b(), Some(8.0));
    }
}
