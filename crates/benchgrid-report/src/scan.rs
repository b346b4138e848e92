//! Directory scanning: turns trees of llama-bench logs into a
//! [`ResultsDoc`] ready to serve as `results.json`.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info, warn};

use benchgrid_core::{Meta, Result, ResultsDoc};

use crate::parse::LogParser;

pub const META_NOTES: &str =
    "pp512 = prompt processing; tg128 = text generation; t/s = tokens/second";

/// One directory of logs. `rpc` marks every run from the directory as a
/// distributed (multi-server) result, independent of filename flags.
#[derive(Debug, Clone)]
pub struct LogSource {
    pub dir: PathBuf,
    pub rpc: bool,
}

impl LogSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            rpc: false,
        }
    }

    pub fn rpc(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            rpc: true,
        }
    }
}

/// Scans every source in order and assembles the results document.
/// Files are visited in sorted name order so the output is reproducible;
/// logs that do not follow the naming contract are skipped with a warning.
pub fn scan_sources(sources: &[LogSource]) -> Result<ResultsDoc> {
    let parser = LogParser::new();
    let mut runs = Vec::new();
    let mut builds = BTreeSet::new();
    let mut environments = BTreeSet::new();

    for source in sources {
        let mut paths: Vec<PathBuf> = fs::read_dir(&source.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "log"))
            .collect();
        paths.sort();
        info!(dir = %source.dir.display(), files = paths.len(), rpc = source.rpc, "scanning logs");

        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Logs may contain invalid UTF-8 from crashed runs.
            let bytes = fs::read(&path)?;
            let text = String::from_utf8_lossy(&bytes);

            let log_path = path.display().to_string();
            match parser.parse_log(stem, &text, &log_path, source.rpc) {
                Some(parsed) => {
                    debug!(log = %log_path, rows = parsed.runs.len(), "parsed log");
                    if let Some(build) = parsed.build {
                        builds.insert(build);
                    }
                    for run in &parsed.runs {
                        environments.insert(run.env.clone());
                    }
                    runs.extend(parsed.runs);
                }
                None => {
                    warn!(log = %log_path, "file name does not match <model>__<env>, skipping");
                }
            }
        }
    }

    let meta = Meta {
        generated_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        os_kernel: None,
        llamacpp_builds: builds.into_iter().collect(),
        environments: environments.into_iter().collect(),
        notes: Some(META_NOTES.to_string()),
    };

    Ok(ResultsDoc { meta, runs })
}
