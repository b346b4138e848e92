//! Statistical winner selection for one model row.
//!
//! Two backends count as tied when the gap between their throughput means
//! is within one pooled standard deviation, with a small absolute floor so
//! near-zero reported variance does not make arbitrarily small gaps
//! significant.

/// Tolerance floor in tokens/second.
pub const MIN_TOL: f64 = 0.25;

/// Pooled-sigma multiplier.
pub const K_SIGMA: f64 = 1.0;

/// One backend's usable measurement, in the caller's display order.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub backend: String,
    pub mean: f64,
    pub std: f64,
}

impl Candidate {
    pub fn new(backend: impl Into<String>, mean: f64, std: f64) -> Self {
        Self {
            backend: backend.into(),
            mean,
            std,
        }
    }
}

/// Returns the backends statistically indistinguishable from the best mean,
/// preserving the relative order of `candidates`.
///
/// The best candidate is found by a strictly-greater linear scan, so on
/// exact ties the earliest candidate is `best`. Every candidate `v` wins
/// when `best.mean - v.mean <= max(MIN_TOL, K_SIGMA * sqrt(best.std^2 +
/// v.std^2))`; `best` itself always wins. Callers must exclude failed or
/// mean-less measurements beforehand.
pub fn select_winners(candidates: &[Candidate]) -> Vec<&str> {
    let Some(mut best) = candidates.first() else {
        return Vec::new();
    };
    for v in candidates {
        if v.mean > best.mean {
            best = v;
        }
    }

    let best_std = sanitize_std(best.std);
    let mut winners = Vec::new();
    for v in candidates {
        let pooled = (best_std.powi(2) + sanitize_std(v.std).powi(2)).sqrt();
        let tol = f64::max(MIN_TOL, K_SIGMA * pooled);
        if best.mean - v.mean <= tol {
            winners.push(v.backend.as_str());
        }
    }
    winners
}

fn sanitize_std(std: f64) -> f64 {
    if std.is_finite() && std > 0.0 {
        std
    } else {
        0.0
    }
}
