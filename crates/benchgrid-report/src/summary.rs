//! Per-test rollup across all models: how often each environment ties for
//! the statistical win, and its average throughput.

use std::fmt::Write as _;

use indexmap::IndexMap;

use benchgrid_core::{select_winners, Candidate, Run};

pub const SUMMARY_TESTS: &[&str] = &["pp512", "tg128"];

#[derive(Debug, Clone, Default)]
pub struct TestSummary {
    pub total_models: usize,
    /// (env label, number of models where the env tied for the win),
    /// sorted by count descending.
    pub winners: Vec<(String, usize)>,
    /// (env label, mean tokens/second across models), sorted descending.
    pub avg_tps: Vec<(String, f64)>,
}

/// Environment label used in rollups; the flash-attention state is part of
/// the identity since it changes throughput materially.
fn env_label(run: &Run) -> String {
    format!("{} (FA {})", run.env, if run.fa { "on" } else { "off" })
}

/// Builds the per-test summary from raw runs. Failed runs and runs for
/// other tests are ignored. Winners are counted with the same pooled-sigma
/// statistic the dashboard's Winner column uses.
pub fn summarize(runs: &[Run]) -> IndexMap<String, TestSummary> {
    let mut out = IndexMap::new();

    for test in SUMMARY_TESTS {
        // model -> candidate list, both in first-encounter order.
        let mut models: IndexMap<&str, Vec<Candidate>> = IndexMap::new();
        let mut perf: IndexMap<String, Vec<f64>> = IndexMap::new();

        for run in runs {
            if run.error || run.test.as_deref() != Some(test) {
                continue;
            }
            let Some(mean) = run.tps_mean else {
                continue;
            };
            let label = env_label(run);
            models
                .entry(run.model_clean.as_str())
                .or_default()
                .push(Candidate::new(label.clone(), mean, run.tps_std.unwrap_or(0.0)));
            perf.entry(label).or_default().push(mean);
        }

        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for candidates in models.values() {
            for winner in select_winners(candidates) {
                *counts.entry(winner).or_default() += 1;
            }
        }

        let mut winners: Vec<(String, usize)> = counts
            .iter()
            .map(|(label, n)| (label.to_string(), *n))
            .collect();
        winners.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut avg_tps: Vec<(String, f64)> = perf
            .iter()
            .map(|(label, means)| {
                (label.clone(), means.iter().sum::<f64>() / means.len() as f64)
            })
            .collect();
        avg_tps.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        out.insert(
            test.to_string(),
            TestSummary {
                total_models: models.len(),
                winners,
                avg_tps,
            },
        );
    }
    out
}

/// Human-readable rendering, one block per test.
pub fn render_text(summaries: &IndexMap<String, TestSummary>) -> String {
    let mut out = String::new();
    for (test, summary) in summaries {
        let _ = writeln!(out, "=== {} ===", test.to_uppercase());
        let _ = writeln!(out, "Models tested: {}", summary.total_models);
        let _ = writeln!(out, "Winner counts (within tolerance):");
        for (label, count) in &summary.winners {
            let _ = writeln!(out, "  {label}: {count} models");
        }
        let _ = writeln!(out, "Average throughput (tokens/sec):");
        for (label, avg) in &summary.avg_tps {
            let _ = writeln!(out, "  {label}: {avg:.2}");
        }
        out.push('\n');
    }
    out
}
