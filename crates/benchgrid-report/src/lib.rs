pub mod analysis;
pub mod markdown;
pub mod parse;
pub mod scan;
pub mod summary;

pub use analysis::{
    flash_attention_effect, hipblaslt_pairs, margin_aware_placements, pairwise_win_counts,
    render_analysis, rocwmma_pairs, variant_effect, FaEffect, PlacementCounts, VariantEffect,
    VariantPair, WinCounts, ANALYSIS_TESTS,
};
pub use markdown::render_markdown;
pub use parse::{canonicalize_env, env_base_and_variant, EnvFlags, LogParser, ParsedLog};
pub use scan::{scan_sources, LogSource};
pub use summary::{render_text, summarize, TestSummary, SUMMARY_TESTS};
