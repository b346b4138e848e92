//! Grouping of raw runs into the hierarchy the results views render:
//! context window -> test -> model row -> per-backend measurement.
//!
//! Iteration order is load-bearing: model rows keep insertion order and
//! contexts/tests are sorted once at build time, so every render of the
//! same document sees the same sequence.

use indexmap::IndexMap;

use crate::model::{Measurement, Run, DEFAULT_CTX};
use crate::winner::Candidate;

/// One model's row within a test: quantization, parameter size and the
/// per-backend measurement cells.
#[derive(Debug, Clone)]
pub struct ModelRow {
    pub model: String,
    pub quant: String,
    pub size_b: Option<f64>,
    pub rpc: bool,
    pub search_blob: String,
    pub backends: IndexMap<String, Measurement>,
}

impl ModelRow {
    fn from_run(run: &Run) -> Self {
        let quant = run
            .quant
            .clone()
            .unwrap_or_else(|| "Unknown".to_string())
            .to_uppercase();
        let search_blob = [
            Some(run.model_clean.as_str()),
            run.quant.as_deref(),
            Some(run.env.as_str()),
            run.test.as_deref(),
        ]
        .iter()
        .flatten()
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

        Self {
            model: run.model_clean.clone(),
            quant,
            size_b: run.size_b(),
            // rpc and the blob's "rpc" marker are applied by absorb().
            rpc: false,
            search_blob,
            backends: IndexMap::new(),
        }
    }

    fn absorb(&mut self, run: &Run) {
        if self.size_b.is_none() {
            self.size_b = run.size_b();
        }
        if run.rpc && !self.rpc {
            self.rpc = true;
            if !self.search_blob.contains("rpc") {
                self.search_blob.push_str(" rpc");
            }
        }
        // Last observation for an environment wins, like a map overwrite.
        self.backends.insert(run.env.clone(), run.measurement());
    }

    /// Winner candidates for this row, restricted to `backends` and given
    /// in that same order. Failed or mean-less cells are excluded.
    pub fn candidates(&self, backends: &[String]) -> Vec<Candidate> {
        backends
            .iter()
            .filter_map(|env| {
                let cell = self.backends.get(env)?;
                if !cell.is_usable() {
                    return None;
                }
                Some(Candidate::new(
                    env.clone(),
                    cell.mean.unwrap_or(0.0),
                    cell.std.unwrap_or(0.0),
                ))
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct TestGroup {
    pub name: String,
    pub models: IndexMap<String, ModelRow>,
}

#[derive(Debug, Clone)]
pub struct ContextGroup {
    pub key: String,
    pub label: String,
    pub tokens: Option<u32>,
    pub tests: IndexMap<String, TestGroup>,
}

/// Fully grouped results document, plus the derived lists the filter
/// controls are populated from.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub contexts: Vec<ContextGroup>,
    pub environments: Vec<String>,
    pub quant_options: Vec<String>,
    pub size_min: Option<f64>,
    pub size_max: Option<f64>,
}

impl ResultSet {
    /// Groups runs by context, test and model. Runs without a test value
    /// (bare error records) or without an environment are skipped, matching
    /// the dashboard's ingestion.
    pub fn from_runs(runs: &[Run]) -> Self {
        let mut contexts: IndexMap<String, ContextGroup> = IndexMap::new();
        let mut environments: Vec<String> = Vec::new();
        let mut quants: Vec<String> = Vec::new();
        let mut size_min: Option<f64> = None;
        let mut size_max: Option<f64> = None;

        for run in runs {
            let Some(test_name) = run.test.as_deref() else {
                tracing::debug!(log = %run.log, "skipping run without a test result");
                continue;
            };
            if test_name.is_empty() || run.env.is_empty() {
                continue;
            }

            if !environments.contains(&run.env) {
                environments.push(run.env.clone());
            }
            if let Some(q) = &run.quant {
                let q = q.to_uppercase();
                if !quants.contains(&q) {
                    quants.push(q);
                }
            }

            let key = if run.context.is_empty() {
                DEFAULT_CTX.to_string()
            } else {
                run.context.clone()
            };
            let ctx = contexts.entry(key.clone()).or_insert_with(|| ContextGroup {
                label: context_label(&key, run.context_tokens),
                key,
                tokens: run.context_tokens,
                tests: IndexMap::new(),
            });
            if ctx.tokens.is_none() && run.context_tokens.is_some() {
                ctx.tokens = run.context_tokens;
                ctx.label = context_label(&ctx.key, ctx.tokens);
            }

            let test = ctx
                .tests
                .entry(test_name.to_string())
                .or_insert_with(|| TestGroup {
                    name: test_name.to_string(),
                    models: IndexMap::new(),
                });

            let row = test
                .models
                .entry(run.model_clean.clone())
                .or_insert_with(|| ModelRow::from_run(run));
            row.absorb(run);

            if let Some(size) = row.size_b {
                size_min = Some(size_min.map_or(size, |m: f64| m.min(size)));
                size_max = Some(size_max.map_or(size, |m: f64| m.max(size)));
            }
        }

        let mut contexts: Vec<ContextGroup> = contexts.into_values().collect();
        contexts.sort_by(|a, b| compare_contexts(a, b));
        for ctx in &mut contexts {
            ctx.tests.sort_keys();
        }
        environments.sort();
        quants.sort();

        Self {
            contexts,
            environments,
            quant_options: quants,
            size_min,
            size_max,
        }
    }

    pub fn context(&self, key: &str) -> Option<&ContextGroup> {
        self.contexts.iter().find(|c| c.key == key)
    }

    /// The context shown first: the default window when present, otherwise
    /// the smallest configured window.
    pub fn default_context(&self) -> Option<&ContextGroup> {
        self.contexts.first()
    }
}

/// Default window first, then known token counts ascending, then windows
/// with a known count before unknown ones, then key order.
fn compare_contexts(a: &ContextGroup, b: &ContextGroup) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    if a.key == DEFAULT_CTX {
        return Ordering::Less;
    }
    if b.key == DEFAULT_CTX {
        return Ordering::Greater;
    }
    match (a.tokens, b.tokens) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.key.cmp(&b.key),
    }
}

/// Human label for a context chip: "Default window", "ctx 32,768", or the
/// raw tag when the token count is unknown.
pub fn context_label(key: &str, tokens: Option<u32>) -> String {
    if key == DEFAULT_CTX {
        return "Default window".to_string();
    }
    match tokens {
        Some(n) => format!("ctx {}", group_thousands(n)),
        None => key.to_string(),
    }
}

fn group_thousands(n: u32) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
