//! Dataset-level analyses over the raw runs: margin-aware placement
//! counts, pairwise head-to-head wins, average ranks, and the measured
//! impact of Flash Attention and backend build variants (ROCWMMA,
//! hipBLASLt).

use std::fmt::Write as _;

use indexmap::IndexMap;

use benchgrid_core::Run;

/// Tests the analyses cover.
pub const ANALYSIS_TESTS: [&str; 2] = ["pp512", "tg128"];

/// How often a backend finished 1st/2nd/3rd across model+quant groups.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlacementCounts {
    pub first: u32,
    pub second: u32,
    pub third: u32,
}

impl PlacementCounts {
    fn record(&mut self, rank: u32) {
        match rank {
            1 => self.first += 1,
            2 => self.second += 1,
            3 => self.third += 1,
            _ => {}
        }
    }

    pub fn total(&self) -> u32 {
        self.first + self.second + self.third
    }

    /// Mean placement over all counted finishes, rounded to 2 decimals.
    /// Lower is better. `None` when the backend never placed.
    pub fn average_rank(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let weighted = self.first + 2 * self.second + 3 * self.third;
        Some(round_to(f64::from(weighted) / f64::from(total), 2))
    }
}

/// Head-to-head outcome between two backends over common model+quant keys.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WinCounts {
    pub wins_a: u32,
    pub wins_b: u32,
    pub ties: u32,
}

impl WinCounts {
    pub fn total(&self) -> u32 {
        self.wins_a + self.wins_b + self.ties
    }
}

/// Throughput change of Flash Attention ON vs OFF for one backend/test.
#[derive(Debug, Clone, PartialEq)]
pub struct FaEffect {
    pub env: String,
    pub test: String,
    pub pairs: usize,
    pub median_pct: f64,
    pub min_pct: f64,
    pub max_pct: f64,
}

/// An environment and its counterpart with one build variant toggled off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantPair {
    pub env_on: String,
    pub env_off: String,
}

/// Median throughput change of a build variant ON vs OFF for one test.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantEffect {
    pub env_on: String,
    pub env_off: String,
    pub test: String,
    pub pairs: usize,
    pub median_pct: f64,
}

/// Ranks backends per model+quant group and tallies 1st/2nd/3rd finishes.
///
/// Each group is summarized per environment as median(mean) ± median(std);
/// intervals that overlap the current leader's share its rank. Groups with
/// fewer than two environments are skipped. Returns the placement table
/// (keyed by env) and the number of comparisons counted.
pub fn margin_aware_placements(
    runs: &[Run],
    envs: &[String],
    test: &str,
    fa: Option<bool>,
) -> (IndexMap<String, PlacementCounts>, usize) {
    let mut grouped: IndexMap<(String, Option<String>), Vec<&Run>> = IndexMap::new();
    for r in runs {
        if r.error || r.test.as_deref() != Some(test) {
            continue;
        }
        if fa.map_or(false, |want| r.fa != want) {
            continue;
        }
        if !envs.contains(&r.env) {
            continue;
        }
        grouped
            .entry((r.model_clean.clone(), r.quant.clone()))
            .or_default()
            .push(r);
    }

    let mut placements: IndexMap<String, PlacementCounts> = IndexMap::new();
    let mut samples = 0usize;
    for entries in grouped.values() {
        let mut by_env: IndexMap<&str, Vec<&Run>> = IndexMap::new();
        for r in entries {
            by_env.entry(r.env.as_str()).or_default().push(r);
        }

        // (env, low, high, mid) with the requested env order preserved
        let mut summary: Vec<(&str, f64, f64, f64)> = Vec::new();
        for env in envs {
            let Some(rs) = by_env.get(env.as_str()) else {
                continue;
            };
            let mut means: Vec<f64> = rs.iter().filter_map(|r| r.tps_mean).collect();
            if means.is_empty() {
                continue;
            }
            let mut stds: Vec<f64> = rs.iter().map(|r| r.tps_std.unwrap_or(0.0)).collect();
            let m = median(&mut means);
            let e = median(&mut stds);
            summary.push((env.as_str(), m - e, m + e, m));
        }
        if summary.len() < 2 {
            continue;
        }
        samples += 1;

        summary.sort_by(|a, b| b.3.partial_cmp(&a.3).unwrap_or(std::cmp::Ordering::Equal));
        let mut remaining = summary;
        let mut rank = 1u32;
        while !remaining.is_empty() && rank <= 3 {
            let (_, low0, high0, _) = remaining[0];
            let (tied, rest): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|&(_, low, high, _)| !(low > high0 || high < low0));
            for (env, ..) in tied {
                placements.entry(env.to_string()).or_default().record(rank);
            }
            remaining = rest;
            rank += 1;
        }
    }
    (placements, samples)
}

/// Counts which of two backends was faster for every model+quant key
/// both of them completed. Equal means count as a tie.
pub fn pairwise_win_counts(
    runs: &[Run],
    env_a: &str,
    env_b: &str,
    test: &str,
    fa: Option<bool>,
) -> WinCounts {
    let mut a: IndexMap<(String, Option<String>), f64> = IndexMap::new();
    let mut b: IndexMap<(String, Option<String>), f64> = IndexMap::new();
    for r in runs {
        if r.error || r.test.as_deref() != Some(test) {
            continue;
        }
        if fa.map_or(false, |want| r.fa != want) {
            continue;
        }
        let Some(mean) = r.tps_mean else {
            continue;
        };
        let key = (r.model_clean.clone(), r.quant.clone());
        if r.env == env_a {
            a.insert(key, mean);
        } else if r.env == env_b {
            b.insert(key, mean);
        }
    }

    let mut counts = WinCounts::default();
    for (key, &mean_a) in &a {
        let Some(&mean_b) = b.get(key) else {
            continue;
        };
        if mean_a > mean_b {
            counts.wins_a += 1;
        } else if mean_b > mean_a {
            counts.wins_b += 1;
        } else {
            counts.ties += 1;
        }
    }
    counts
}

/// Percentage change of Flash Attention ON vs OFF, paired per model+quant.
/// One row per env/test that has at least one complete ON/OFF pair.
pub fn flash_attention_effect(runs: &[Run], envs: &[String], tests: &[&str]) -> Vec<FaEffect> {
    type PairKey = (String, Option<String>);
    let mut pairs: IndexMap<(String, String), IndexMap<PairKey, (Option<f64>, Option<f64>)>> =
        IndexMap::new();
    for r in runs {
        if r.error {
            continue;
        }
        let Some(mean) = r.tps_mean else {
            continue;
        };
        let Some(test) = r.test.as_deref() else {
            continue;
        };
        if !tests.contains(&test) || !envs.contains(&r.env) {
            continue;
        }
        let slot = pairs
            .entry((r.env.clone(), test.to_string()))
            .or_default()
            .entry((r.model_clean.clone(), r.quant.clone()))
            .or_insert((None, None));
        if r.fa {
            slot.0 = Some(mean);
        } else {
            slot.1 = Some(mean);
        }
    }

    let mut out = Vec::new();
    for env in envs {
        for test in tests {
            let Some(d) = pairs.get(&(env.clone(), (*test).to_string())) else {
                continue;
            };
            let mut deltas: Vec<f64> = d
                .values()
                .filter_map(|&(on, off)| match (on, off) {
                    (Some(on), Some(off)) if off > 0.0 => Some((on - off) / off * 100.0),
                    _ => None,
                })
                .collect();
            if deltas.is_empty() {
                continue;
            }
            let min = deltas.iter().copied().fold(f64::INFINITY, f64::min);
            let max = deltas.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            out.push(FaEffect {
                env: env.clone(),
                test: (*test).to_string(),
                pairs: deltas.len(),
                median_pct: round_to(median(&mut deltas), 1),
                min_pct: round_to(min, 1),
                max_pct: round_to(max, 1),
            });
        }
    }
    out
}

/// Median throughput ratio of `env_on` vs `env_off`, paired per model+quant.
/// Repeated runs for a key are collapsed to their median before comparing.
pub fn variant_effect(runs: &[Run], pairs: &[VariantPair], tests: &[&str]) -> Vec<VariantEffect> {
    let mut rows = Vec::new();
    for pair in pairs {
        for test in tests {
            let mut on: IndexMap<(String, Option<String>), Vec<f64>> = IndexMap::new();
            let mut off: IndexMap<(String, Option<String>), Vec<f64>> = IndexMap::new();
            for r in runs {
                if r.error || r.test.as_deref() != Some(*test) {
                    continue;
                }
                let Some(mean) = r.tps_mean else {
                    continue;
                };
                let key = (r.model_clean.clone(), r.quant.clone());
                if r.env == pair.env_on {
                    on.entry(key).or_default().push(mean);
                } else if r.env == pair.env_off {
                    off.entry(key).or_default().push(mean);
                }
            }

            let mut ratios = Vec::new();
            for (key, means_on) in &on {
                let Some(means_off) = off.get(key) else {
                    continue;
                };
                let aon = median(&mut means_on.clone());
                let aoff = median(&mut means_off.clone());
                if aoff > 0.0 {
                    ratios.push(aon / aoff - 1.0);
                }
            }
            if ratios.is_empty() {
                continue;
            }
            rows.push(VariantEffect {
                env_on: pair.env_on.clone(),
                env_off: pair.env_off.clone(),
                test: (*test).to_string(),
                pairs: ratios.len(),
                median_pct: round_to(100.0 * median(&mut ratios), 1),
            });
        }
    }
    rows
}

/// Pairs each `-rocwmma` environment with its non-ROCWMMA counterpart,
/// keeping the hipBLASLt state equal on both sides.
pub fn rocwmma_pairs(envs: &[String]) -> Vec<VariantPair> {
    toggle_pairs(envs, "-rocwmma")
}

/// Pairs each hipBLASLt-enabled environment with its `-hblt0` counterpart,
/// keeping the ROCWMMA state equal on both sides.
pub fn hipblaslt_pairs(envs: &[String]) -> Vec<VariantPair> {
    toggle_pairs(envs, "-hblt0")
        .into_iter()
        // for hblt0 the suffixed env is the OFF side
        .map(|p| VariantPair {
            env_on: p.env_off,
            env_off: p.env_on,
        })
        .collect()
}

fn toggle_pairs(envs: &[String], marker: &str) -> Vec<VariantPair> {
    let mut out = Vec::new();
    for env in envs {
        if !env.contains(marker) {
            continue;
        }
        let counterpart = env.replacen(marker, "", 1);
        if envs.contains(&counterpart) {
            out.push(VariantPair {
                env_on: env.clone(),
                env_off: counterpart,
            });
        }
    }
    out
}

/// Renders the full analysis as text. `envs` fixes the backend order.
pub fn render_analysis(runs: &[Run], envs: &[String], fa: Option<bool>) -> String {
    let mut out = String::new();
    let fa_label = match fa {
        Some(true) => "Flash Attention ON",
        Some(false) => "Flash Attention OFF",
        None => "any Flash Attention state",
    };
    let _ = writeln!(out, "Benchmark analysis ({fa_label})");

    for test in ANALYSIS_TESTS {
        let (placements, samples) = margin_aware_placements(runs, envs, test, fa);
        if placements.is_empty() {
            continue;
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Placements — {test} ({samples} comparisons)");
        let mut rows: Vec<(&String, &PlacementCounts)> = placements.iter().collect();
        rows.sort_by(|a, b| {
            b.1.first
                .cmp(&a.1.first)
                .then(b.1.second.cmp(&a.1.second))
                .then(a.0.cmp(b.0))
        });
        for (env, counts) in rows {
            let avg = counts
                .average_rank()
                .map(|v| format!("{v:.2}"))
                .unwrap_or_else(|| "—".to_string());
            let _ = writeln!(
                out,
                "  {:<28} 1st: {:>3}  2nd: {:>3}  3rd: {:>3}  avg rank: {}",
                env, counts.first, counts.second, counts.third, avg
            );
        }
    }

    let fa_rows = flash_attention_effect(runs, envs, &ANALYSIS_TESTS);
    if !fa_rows.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Flash Attention impact (ON vs OFF, % change)");
        for row in &fa_rows {
            let _ = writeln!(
                out,
                "  {:<28} {}  median {:+.1}%  range {:+.1}%..{:+.1}%  n={}",
                row.env, row.test, row.median_pct, row.min_pct, row.max_pct, row.pairs
            );
        }
    }

    for (title, pairs) in [
        ("ROCWMMA impact (ON vs OFF, % change)", rocwmma_pairs(envs)),
        ("hipBLASLt impact (ON vs OFF, % change)", hipblaslt_pairs(envs)),
    ] {
        let rows = variant_effect(runs, &pairs, &ANALYSIS_TESTS);
        if rows.is_empty() {
            continue;
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{title}");
        for row in &rows {
            let _ = writeln!(
                out,
                "  {} vs {}  {}  median {:+.1}%  n={}",
                row.env_on, row.env_off, row.test, row.median_pct, row.pairs
            );
        }
    }

    let amdvlk = "vulkan_amdvlk".to_string();
    let radv = "vulkan_radv".to_string();
    if envs.contains(&amdvlk) && envs.contains(&radv) {
        let _ = writeln!(out);
        let _ = writeln!(out, "Vulkan head-to-head (AMDVLK vs RADV)");
        for test in ANALYSIS_TESTS {
            let counts = pairwise_win_counts(runs, &amdvlk, &radv, test, fa);
            if counts.total() == 0 {
                continue;
            }
            let _ = writeln!(
                out,
                "  {}  AMDVLK wins: {}  RADV wins: {}  ties: {}  total: {}",
                test,
                counts.wins_a,
                counts.wins_b,
                counts.ties,
                counts.total()
            );
        }
    }

    out
}

/// Median with the usual convention of averaging the two middle values
/// for even-length input. Sorts in place; input must be non-empty.
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchgrid_core::DEFAULT_CTX;

    fn run(model: &str, env: &str, test: &str, fa: bool, mean: f64, std: f64) -> Run {
        Run {
            model: model.to_string(),
            model_clean: model.to_string(),
            env: env.to_string(),
            env_base: env.to_string(),
            env_variant: None,
            fa,
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

    fn envs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn median_averages_middle_pair_for_even_length() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn placements_rank_clear_ordering() {
        let e = envs(&["a", "b", "c"]);
        let runs = vec![
            run("m", "a", "tg128", true, 50.0, 0.1),
            run("m", "b", "tg128", true, 40.0, 0.1),
            run("m", "c", "tg128", true, 30.0, 0.1),
        ];
        let (placements, samples) = margin_aware_placements(&runs, &e, "tg128", Some(true));
        assert_eq!(samples, 1);
        assert_eq!(placements["a"].first, 1);
        assert_eq!(placements["b"].second, 1);
        assert_eq!(placements["c"].third, 1);
    }

    #[test]
    fn overlapping_intervals_share_first_place() {
        let e = envs(&["a", "b", "c"]);
        let runs = vec![
            run("m", "a", "tg128", true, 50.0, 1.0),
            run("m", "b", "tg128", true, 49.5, 1.0),
            run("m", "c", "tg128", true, 30.0, 0.1),
        ];
        let (placements, _) = margin_aware_placements(&runs, &e, "tg128", Some(true));
        assert_eq!(placements["a"].first, 1);
        assert_eq!(placements["b"].first, 1);
        // c takes the next rank after the tied pair
        assert_eq!(placements["c"].second, 1);
    }

    #[test]
    fn single_env_groups_are_skipped() {
        let e = envs(&["a", "b"]);
        let runs = vec![run("m", "a", "tg128", true, 50.0, 0.1)];
        let (placements, samples) = margin_aware_placements(&runs, &e, "tg128", Some(true));
        assert_eq!(samples, 0);
        assert!(placements.is_empty());
    }

    #[test]
    fn fa_filter_excludes_mismatched_runs() {
        let e = envs(&["a", "b"]);
        let runs = vec![
            run("m", "a", "tg128", true, 50.0, 0.1),
            run("m", "b", "tg128", false, 60.0, 0.1),
        ];
        let (_, samples) = margin_aware_placements(&runs, &e, "tg128", Some(true));
        assert_eq!(samples, 0);
    }

    #[test]
    fn average_rank_weights_placements() {
        let counts = PlacementCounts {
            first: 2,
            second: 1,
            third: 1,
        };
        assert_eq!(counts.average_rank(), Some(1.75));
        assert_eq!(PlacementCounts::default().average_rank(), None);
    }

    #[test]
    fn pairwise_wins_count_common_keys_only() {
        let runs = vec![
            run("m1", "a", "tg128", true, 50.0, 0.1),
            run("m1", "b", "tg128", true, 40.0, 0.1),
            run("m2", "a", "tg128", true, 30.0, 0.1),
            run("m2", "b", "tg128", true, 35.0, 0.1),
            // only present on one side, must not count
            run("m3", "a", "tg128", true, 99.0, 0.1),
        ];
        let counts = pairwise_win_counts(&runs, "a", "b", "tg128", Some(true));
        assert_eq!(counts.wins_a, 1);
        assert_eq!(counts.wins_b, 1);
        assert_eq!(counts.ties, 0);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn flash_attention_effect_pairs_on_and_off() {
        let e = envs(&["a"]);
        let runs = vec![
            run("m1", "a", "tg128", true, 55.0, 0.1),
            run("m1", "a", "tg128", false, 50.0, 0.1),
            run("m2", "a", "tg128", true, 40.0, 0.1),
            run("m2", "a", "tg128", false, 50.0, 0.1),
        ];
        let rows = flash_attention_effect(&runs, &e, &["tg128"]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.pairs, 2);
        // deltas are +10% and -20%
        assert_eq!(row.median_pct, -5.0);
        assert_eq!(row.min_pct, -20.0);
        assert_eq!(row.max_pct, 10.0);
    }

    #[test]
    fn variant_pairs_derived_from_env_names() {
        let e = envs(&[
            "rocm7_rc",
            "rocm7_rc-rocwmma",
            "rocm7_rc-hblt0",
            "rocm7_rc-rocwmma-hblt0",
            "vulkan_radv",
        ]);
        let wmma = rocwmma_pairs(&e);
        assert_eq!(wmma.len(), 2);
        assert_eq!(wmma[0].env_on, "rocm7_rc-rocwmma");
        assert_eq!(wmma[0].env_off, "rocm7_rc");
        let hblt = hipblaslt_pairs(&e);
        assert_eq!(hblt.len(), 2);
        assert_eq!(hblt[0].env_on, "rocm7_rc");
        assert_eq!(hblt[0].env_off, "rocm7_rc-hblt0");
    }

    #[test]
    fn variant_effect_uses_median_of_paired_ratios() {
        let pairs = vec![VariantPair {
            env_on: "on".to_string(),
            env_off: "off".to_string(),
        }];
        let runs = vec![
            run("m1", "on", "tg128", true, 55.0, 0.1),
            run("m1", "off", "tg128", true, 50.0, 0.1),
            run("m2", "on", "tg128", true, 60.0, 0.1),
            run("m2", "off", "tg128", true, 50.0, 0.1),
        ];
        let rows = variant_effect(&runs, &pairs, &["tg128"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pairs, 2);
        // ratios are +10% and +20%
        assert_eq!(rows[0].median_pct, 15.0);
    }

    #[test]
    fn render_includes_placements_and_vulkan_head_to_head() {
        let e = envs(&["vulkan_amdvlk", "vulkan_radv"]);
        let runs = vec![
            run("m1", "vulkan_amdvlk", "tg128", true, 50.0, 0.1),
            run("m1", "vulkan_radv", "tg128", true, 40.0, 0.1),
        ];
        let text = render_analysis(&runs, &e, Some(true));
        assert!(text.contains("Benchmark analysis (Flash Attention ON)"));
        assert!(text.contains("Placements — tg128 (1 comparisons)"));
        assert!(text.contains("Vulkan head-to-head (AMDVLK vs RADV)"));
        assert!(text.contains("AMDVLK wins: 1  RADV wins: 0"));
    }
}
