//! Markdown rendering of the per-test comparison tables, with the same
//! tie-aware Winner column the dashboard shows, plus a failed-runs
//! appendix.

use std::fmt::Write as _;

use benchgrid_core::{
    select_winners, BenchGridError, ErrorType, Measurement, Result, ResultSet, ResultsDoc,
    RowFilter,
};

/// Renders the whole report. `context` picks a context window by tag
/// (e.g. "longctx32768"); `None` uses the first (default) window.
/// `backend_order` controls the column sequence (and the order winners are
/// listed in); `None` uses the sorted environment list.
pub fn render_markdown(
    doc: &ResultsDoc,
    context: Option<&str>,
    backend_order: Option<&[String]>,
) -> Result<String> {
    let set = ResultSet::from_runs(&doc.runs);
    let backends = backend_order.unwrap_or(&set.environments);
    let ctx = match context {
        Some(key) => set
            .context(key)
            .ok_or_else(|| BenchGridError::UnknownContext(key.to_string()))?,
        None => match set.default_context() {
            Some(ctx) => ctx,
            None => return Ok(empty_report(doc)),
        },
    };

    let mut out = String::new();
    let _ = writeln!(out, "# Benchmark Results — {}", ctx.label);
    let _ = writeln!(out);
    let _ = writeln!(out, "Generated: {}", doc.meta.generated_at);
    if !doc.meta.llamacpp_builds.is_empty() {
        let builds: Vec<String> = doc
            .meta
            .llamacpp_builds
            .iter()
            .map(|b| format!("{} ({})", b.hash, b.number))
            .collect();
        let _ = writeln!(out, "llama.cpp builds: {}", builds.join(", "));
    }
    let _ = writeln!(out);

    let filter = RowFilter::default();
    for test in ctx.tests.values() {
        let rows = filter.apply(test);
        if rows.is_empty() {
            continue;
        }

        let _ = writeln!(out, "### {} — tokens/second", test_title(&test.name));
        let _ = writeln!(out);

        let mut header: Vec<String> = vec!["Model".to_string()];
        header.extend(backends.iter().map(|e| display_env(e)));
        header.push("Winner".to_string());
        let _ = writeln!(out, "{}", md_row(&header));
        let _ = writeln!(out, "{}", md_row(&vec!["---".to_string(); header.len()]));

        for row in rows {
            let mut cells = vec![format!("**{}**", row.model)];
            for env in backends {
                cells.push(render_cell(row.backends.get(env)));
            }

            let candidates = row.candidates(backends);
            let winners = select_winners(&candidates);
            if winners.is_empty() {
                cells.push("—".to_string());
            } else {
                let names: Vec<String> =
                    winners.iter().map(|w| format!("**{w}**")).collect();
                cells.push(format!("🏆 {}", names.join(", ")));
            }
            let _ = writeln!(out, "{}", md_row(&cells));
        }
        let _ = writeln!(out);
    }

    render_failed_runs(doc, &mut out);
    Ok(out)
}

fn empty_report(doc: &ResultsDoc) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Benchmark Results");
    let _ = writeln!(out);
    let _ = writeln!(out, "No successful runs.");
    let _ = writeln!(out);
    render_failed_runs(doc, &mut out);
    out
}

fn render_failed_runs(doc: &ResultsDoc, out: &mut String) {
    let failed: Vec<_> = doc.runs.iter().filter(|r| r.error).collect();
    if failed.is_empty() {
        return;
    }
    let _ = writeln!(out, "## Failed Runs");
    let _ = writeln!(out);
    for run in failed {
        let desc = match run.error_type {
            Some(ErrorType::Load) => "failed to load",
            Some(ErrorType::Hang) => "GPU hang",
            Some(ErrorType::Runtime) => "runtime error",
            None => "error",
        };
        match run.test.as_deref() {
            Some(test) => {
                let _ = writeln!(
                    out,
                    "- **{}** [{}] on *{}*: {}",
                    run.model_clean, test, run.env, desc
                );
            }
            None => {
                let _ = writeln!(out, "- **{}** on *{}*: {}", run.model_clean, run.env, desc);
            }
        }
    }
}

fn render_cell(cell: Option<&Measurement>) -> String {
    match cell {
        None => "—".to_string(),
        Some(m) if m.failed || m.mean.is_none() => {
            let label = m.error_type.map(|e| e.label()).unwrap_or("error");
            format!("⚠️ {label}")
        }
        Some(m) => {
            let mean = m.mean.unwrap_or(0.0);
            match m.std {
                Some(std) => format!("{mean:.2} ± {std:.2}"),
                None => format!("{mean:.2} ± —"),
            }
        }
    }
}

fn md_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

fn test_title(name: &str) -> String {
    match name {
        "pp512" => "Prompt Processing (pp512)".to_string(),
        "tg128" => "Text Generation (tg128)".to_string(),
        other => other.to_uppercase(),
    }
}

/// "vulkan_radv" -> "Vulkan Radv", matching the historical table headers.
fn display_env(env: &str) -> String {
    env.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchgrid_core::{Build, Meta, Run, DEFAULT_CTX};

    fn run(model: &str, env: &str, test: &str, mean: f64, std: f64) -> Run {
        Run {
            model: model.to_string(),
            model_clean: model.to_string(),
            env: env.to_string(),
            env_base: env.to_string(),
            env_variant: None,
            fa: true,
            context: DEFAULT_CTX.to_string(),
            context_tokens: None,
            test: Some(test.to_string()),
            tps_mean: Some(mean),
            tps_std: Some(std),
            error: false,
            error_type: None,
            backend: None,
            ngl: None,
            mmap: None,
            params_b: None,
            file_size_gib: None,
            name_params_b: None,
            quant: Some("Q4_K_M".to_string()),
            log: String::new(),
            rpc: false,
            build: None,
        }
    }

    fn doc(runs: Vec<Run>) -> ResultsDoc {
        ResultsDoc {
            meta: Meta {
                generated_at: "2026-08-29T00:00:00Z".to_string(),
                os_kernel: None,
                llamacpp_builds: vec![Build {
                    hash: "cd6983d5".to_string(),
                    number: "6119".to_string(),
                }],
                environments: Vec::new(),
                notes: None,
            },
            runs,
        }
    }

    #[test]
    fn renders_tables_with_tied_winners() {
        let d = doc(vec![
            run("modelA", "vulkan_radv", "tg128", 50.0, 1.0),
            run("modelA", "rocm7_rc", "tg128", 49.5, 0.8),
            run("modelA", "vulkan_amdvlk", "tg128", 30.0, 0.5),
        ]);
        let md = render_markdown(&d, None, None).unwrap();
        assert!(md.contains("### Text Generation (tg128) — tokens/second"));
        assert!(md.contains("| Model | Rocm7 Rc | Vulkan Amdvlk | Vulkan Radv | Winner |"));
        assert!(md.contains("🏆 **rocm7_rc**, **vulkan_radv**"));
        assert!(md.contains("50.00 ± 1.00"));
        assert!(md.contains("llama.cpp builds: cd6983d5 (6119)"));
    }

    #[test]
    fn error_and_missing_cells_are_marked() {
        let mut bad = run("modelA", "rocm7_rc", "tg128", 0.0, 0.0);
        bad.error = true;
        bad.error_type = Some(benchgrid_core::ErrorType::Hang);
        bad.tps_mean = None;
        bad.tps_std = None;
        let d = doc(vec![run("modelA", "vulkan_radv", "tg128", 50.0, 1.0), bad]);
        let md = render_markdown(&d, None, None).unwrap();
        assert!(md.contains("⚠️ GPU Hang"));
        assert!(md.contains("## Failed Runs"));
        assert!(md.contains("- **modelA** [tg128] on *rocm7_rc*: GPU hang"));
    }

    #[test]
    fn caller_supplied_backend_order_drives_columns_and_winners() {
        let d = doc(vec![
            run("modelA", "vulkan_radv", "tg128", 50.0, 1.0),
            run("modelA", "rocm7_rc", "tg128", 49.5, 0.8),
            run("modelA", "vulkan_amdvlk", "tg128", 30.0, 0.5),
        ]);
        let order = vec![
            "vulkan_radv".to_string(),
            "vulkan_amdvlk".to_string(),
            "rocm7_rc".to_string(),
        ];
        let md = render_markdown(&d, None, Some(&order)).unwrap();
        assert!(md.contains("| Model | Vulkan Radv | Vulkan Amdvlk | Rocm7 Rc | Winner |"));
        // Winners are listed in the supplied order, not sorted.
        assert!(md.contains("🏆 **vulkan_radv**, **rocm7_rc**"));
    }

    #[test]
    fn unknown_context_is_an_error() {
        let d = doc(vec![run("m", "e", "tg128", 1.0, 0.0)]);
        let err = render_markdown(&d, Some("longctx99"), None).unwrap_err();
        assert!(matches!(err, BenchGridError::UnknownContext(_)));
    }

    #[test]
    fn empty_document_renders_placeholder() {
        let d = doc(Vec::new());
        let md = render_markdown(&d, None, None).unwrap();
        assert!(md.contains("No successful runs."));
    }

    #[test]
    fn rows_without_any_usable_cell_show_no_winner() {
        let mut bad = run("modelA", "rocm7_rc", "tg128", 0.0, 0.0);
        bad.error = true;
        bad.tps_mean = None;
        let d = doc(vec![bad]);
        let md = render_markdown(&d, None, None).unwrap();
        // The row still renders; the winner cell is empty.
        assert!(md.contains("| **modelA** | ⚠️ error | — |"));
    }
}
