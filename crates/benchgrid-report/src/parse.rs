//! llama-bench log parsing.
//!
//! A log file is named `<model>__<env>[__fa1][__hblt0][__longctx<N>][__rpc].log`
//! and contains the markdown table llama-bench prints, plus whatever stderr
//! noise the run produced. Each table row becomes one [`Run`]; a log with no
//! usable rows becomes a single error record.

use indexmap::IndexMap;
use regex::Regex;

use benchgrid_core::{Build, ErrorType, Run, DEFAULT_CTX};

/// Raw env names that were renamed after the first batches of logs landed.
const ENV_CANON: &[(&str, &str)] = &[("rocm7_1", "rocm7.1"), ("rocm7_alpha", "rocm-7alpha")];

/// Flags decoded from a log file's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFlags {
    pub env: String,
    pub fa: bool,
    pub context: String,
    pub context_tokens: Option<u32>,
    pub rpc: bool,
}

/// Everything extracted from one log file.
#[derive(Debug, Clone)]
pub struct ParsedLog {
    pub runs: Vec<Run>,
    pub build: Option<Build>,
}

pub struct LogParser {
    header: Regex,
    separator: Regex,
    build: Regex,
    load_err: Regex,
    hang_err: Regex,
    generic_err: Regex,
    tps: Regex,
    quant: Regex,
    params_b: Regex,
    size_gib: Regex,
    name_b: Regex,
    shard: Regex,
    longctx: Regex,
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser {
    pub fn new() -> Self {
        let re = |pattern: &str| Regex::new(pattern).expect("invalid log parser regex");
        Self {
            // Table headers come with or without the optional "fa" column.
            header: re(r"(?i)^\|\s*model\s*\|"),
            separator: re(r"^\|\s*-+"),
            // e.g. "build: cd6983d5 (6119)"
            build: re(r"(?i)build:\s*([0-9a-f]{7,})\s*\((\d+)\)"),
            load_err: re(r"(?i)failed to load model|Device memory allocation.*failed|⚠️\s*Fail"),
            hang_err: re(r"(?i)GPU Hang|HW Exception"),
            generic_err: re(r"(?i)error:|exit \d+|runtime error|⚠️\s*Runtime Error"),
            tps: re(r"([\d.]+)\s*±\s*([\d.]+)"),
            quant: re(r"(?i)(Q\d+_[A-Z0-9_]+|BF16|F16|F32|mxfp\d+)"),
            params_b: re(r"(?i)([\d.,]+)\s*B"),
            size_gib: re(r"(?i)([\d.,]+)\s*GiB"),
            name_b: re(r"(\d+(?:\.\d+)?)B"),
            shard: re(r"(?i)-000\d+-of-000\d+"),
            longctx: re(r"(?i)longctx(\d+)"),
        }
    }

    /// Parses one log. `stem` is the file name without the `.log` suffix,
    /// `log_path` the path recorded on each run. Returns `None` when the
    /// file name does not follow the `<model>__<env>` contract.
    pub fn parse_log(
        &self,
        stem: &str,
        text: &str,
        log_path: &str,
        rpc_source: bool,
    ) -> Option<ParsedLog> {
        let (model_raw, _) = stem.split_once("__")?;
        let flags = self.parse_env_flags(stem)?;
        let env = canonicalize_env(&flags.env);
        let model_clean = self.clean_model_name(model_raw);
        let rpc = rpc_source || flags.rpc;

        let build = self.extract_build(text);
        let table_rows = self.parse_table(text);

        let has_perf = table_rows.iter().any(|r| {
            matches!(
                r.get("test").map(|t| t.to_lowercase()),
                Some(ref t) if t == "pp512" || t == "tg128"
            )
        });
        let error_type = if has_perf { None } else { self.detect_error(text) };

        // Explicit "fa" table column wins over the filename suffix.
        let fa = table_rows
            .iter()
            .find_map(|r| r.get("fa").and_then(|v| v.parse::<i64>().ok()))
            .map(|v| v == 1)
            .unwrap_or(flags.fa);

        let (env_base, env_variant) = env_base_and_variant(&env);
        let quant = self.extract_quant(&model_clean);
        let name_b = self.params_from_name(&model_clean);

        let template = Run {
            model: model_raw.to_string(),
            model_clean,
            env,
            env_base,
            env_variant,
            fa,
            context: flags.context.clone(),
            context_tokens: flags.context_tokens,
            test: None,
            tps_mean: None,
            tps_std: None,
            error: error_type.is_some(),
            error_type,
            backend: None,
            ngl: None,
            mmap: None,
            params_b: None,
            file_size_gib: None,
            name_params_b: name_b,
            quant,
            log: log_path.to_string(),
            rpc,
            build: build.clone(),
        };

        let runs = if table_rows.is_empty() {
            vec![template]
        } else {
            table_rows
                .iter()
                .map(|row| {
                    let mut run = template.clone();
                    run.test = row.get("test").map(|t| t.to_lowercase());
                    if let Some(ts) = row.get("t/s") {
                        if let Some(c) = self.tps.captures(ts) {
                            run.tps_mean = c[1].parse().ok();
                            run.tps_std = c[2].parse().ok();
                        }
                    }
                    if let Some(p) = row.get("params") {
                        run.params_b = self.capture_number(&self.params_b, p);
                    }
                    if let Some(s) = row.get("size") {
                        run.file_size_gib = self.capture_number(&self.size_gib, s);
                    }
                    run.name_params_b = run.params_b.or(name_b);
                    run.backend = row.get("backend").cloned();
                    run.ngl = parse_digits(row.get("ngl"));
                    run.mmap = parse_digits(row.get("mmap"));
                    run
                })
                .collect()
        };

        Some(ParsedLog { runs, build })
    }

    /// Decodes the `__`-separated flag suffixes of a file stem.
    pub fn parse_env_flags(&self, stem: &str) -> Option<EnvFlags> {
        let mut parts = stem.split("__");
        let _model = parts.next()?;
        let mut env = parts.next()?.to_string();

        let mut flags = EnvFlags {
            env: String::new(),
            fa: false,
            context: DEFAULT_CTX.to_string(),
            context_tokens: None,
            rpc: false,
        };
        for raw in parts {
            let suffix = raw.to_lowercase();
            if suffix == "fa1" {
                flags.fa = true;
            } else if suffix == "hblt0" {
                env = format!("{env}-hblt0");
            } else if suffix.starts_with("longctx") {
                flags.context_tokens = self
                    .longctx
                    .captures(&suffix)
                    .and_then(|c| c[1].parse().ok());
                flags.context = suffix;
            } else if suffix == "rpc" {
                flags.rpc = true;
            }
        }
        flags.env = env;
        Some(flags)
    }

    /// Strips shard suffixes like `-00001-of-00002` from a model name.
    pub fn clean_model_name(&self, raw: &str) -> String {
        self.shard.replace_all(raw, "").into_owned()
    }

    pub fn extract_quant(&self, model_name: &str) -> Option<String> {
        self.quant
            .captures(model_name)
            .map(|c| c[1].to_uppercase())
    }

    /// Parameter count from a `<N>B` token in the model name, e.g. "30B".
    pub fn params_from_name(&self, model_name: &str) -> Option<f64> {
        self.name_b
            .captures(model_name)
            .and_then(|c| c[1].parse().ok())
    }

    /// Last build line in the file wins; logs restarted after a crash
    /// append a second header.
    pub fn extract_build(&self, text: &str) -> Option<Build> {
        self.build
            .captures_iter(text)
            .last()
            .map(|c| Build {
                hash: c[1].to_string(),
                number: c[2].to_string(),
            })
    }

    /// Classifies a failure from log text; only consulted when no perf rows
    /// were parsed. Load failures outrank hangs outrank generic errors.
    pub fn detect_error(&self, text: &str) -> Option<ErrorType> {
        if self.load_err.is_match(text) {
            Some(ErrorType::Load)
        } else if self.hang_err.is_match(text) {
            Some(ErrorType::Hang)
        } else if self.generic_err.is_match(text) {
            Some(ErrorType::Runtime)
        } else {
            None
        }
    }

    /// Parses the markdown-style tables, normalizing cells by lowercased
    /// header name. Tolerates the optional `fa` column and skips separator,
    /// blank and short lines. A restarted log prints a second header and
    /// table; its rows accumulate after the first table's.
    pub fn parse_table(&self, text: &str) -> Vec<IndexMap<String, String>> {
        let mut rows = Vec::new();
        let mut header: Option<Vec<String>> = None;

        for line in text.lines() {
            if self.header.is_match(line) {
                header = Some(
                    line.trim()
                        .trim_matches('|')
                        .split('|')
                        .map(|c| c.trim().to_lowercase())
                        .collect(),
                );
                continue;
            }
            let Some(columns) = &header else {
                continue;
            };
            if line.trim().is_empty() || self.separator.is_match(line) {
                continue;
            }
            if !line.starts_with('|') {
                continue;
            }
            let parts: Vec<&str> = line
                .trim()
                .trim_matches('|')
                .split('|')
                .map(|c| c.trim())
                .collect();
            if parts.len() < columns.len() {
                continue;
            }
            let row = columns
                .iter()
                .cloned()
                .zip(parts.iter().map(|p| p.to_string()))
                .collect();
            rows.push(row);
        }
        rows
    }

    fn capture_number(&self, re: &Regex, value: &str) -> Option<f64> {
        re.captures(value)
            .and_then(|c| c[1].replace(',', "").parse().ok())
    }
}

/// Applies the historical env renames, preserving variant suffixes.
pub fn canonicalize_env(env: &str) -> String {
    for (raw, canon) in ENV_CANON {
        if env == *raw {
            return canon.to_string();
        }
        if let Some(rest) = env.strip_prefix(&format!("{raw}-")) {
            return format!("{canon}-{rest}");
        }
    }
    env.to_string()
}

/// Splits "rocm6_4_2-rocwmma" into ("rocm6_4_2", Some("rocwmma")).
pub fn env_base_and_variant(env: &str) -> (String, Option<String>) {
    match env.split_once('-') {
        Some((base, variant)) => (base.to_string(), Some(variant.to_string())),
        None => (env.to_string(), None),
    }
}

fn parse_digits(value: Option<&String>) -> Option<u32> {
    let v = value?;
    if !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()) {
        v.parse().ok()
    } else {
        None
    }
}
