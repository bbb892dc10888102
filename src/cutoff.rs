//! Semantic score cutoff strategies.
//!
//! Vector recall returns thousands of candidates whose scores trail off into
//! noise. The cutoff removes that tail before the expensive stages run. Four
//! strategies are implemented; `hybrid` is the production one:
//!
//! ```text
//! std_mul = 1.0   if std < tight_threshold    (cluster — be stricter)
//! std_mul = 2.5   if std > wide_threshold     (spread — trust the ranking)
//! std_mul = 2.0   otherwise
//! threshold = max(min_absolute, center - std_mul * std)
//! ```
//!
//! The keyword-aware bypass that rescues literal matches below the threshold
//! lives in the engine; this module only decides the numbers.

use tracing::debug;

use crate::config::SemanticFilterConfig;

/// The computed cutoff plus the statistics that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutoffDecision {
    pub threshold: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

fn mean(scores: &[f64]) -> f64 {
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn median(scores: &[f64]) -> f64 {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample standard deviation; 0 for fewer than two scores.
fn std_dev(scores: &[f64], mean: f64) -> f64 {
    if scores.len() < 2 {
        return 0.0;
    }
    let variance = scores
        .iter()
        .map(|s| (s - mean).powi(2))
        .sum::<f64>()
        / (scores.len() - 1) as f64;
    variance.sqrt()
}

/// Compute the cutoff threshold for a score distribution.
///
/// Returns `None` when there are no scores to analyze.
pub fn compute_threshold(config: &SemanticFilterConfig, scores: &[f64]) -> Option<CutoffDecision> {
    if scores.is_empty() {
        return None;
    }

    let mean_score = mean(scores);
    let median_score = median(scores);
    let std = std_dev(scores, mean_score);

    let threshold = match config.strategy.as_str() {
        "hybrid" => {
            let std_multiplier = if config.distribution_adaptive {
                if std < config.tight_cluster_std_threshold {
                    debug!(std, "tight score cluster, stricter cutoff");
                    config.tight_cluster_multiplier
                } else if std > config.wide_spread_std_threshold {
                    debug!(std, "wide score spread, lenient cutoff");
                    config.wide_spread_multiplier
                } else {
                    config.std_multiplier
                }
            } else {
                config.std_multiplier
            };

            let center = if config.use_median {
                median_score
            } else {
                mean_score
            };
            let statistical = center - std_multiplier * std;
            statistical.max(config.min_absolute_threshold)
        }
        "statistical" => {
            let center = if config.use_median {
                median_score
            } else {
                mean_score
            };
            center - config.std_multiplier * std
        }
        "percentile" => {
            let mut sorted = scores.to_vec();
            sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
            let keep = (sorted.len() as f64 * (config.keep_top_percent / 100.0)) as usize;
            sorted[keep.min(sorted.len() - 1)]
        }
        // "fixed" and anything unknown (config validation precludes the
        // latter) fall back to the flat threshold.
        _ => config.fixed_min_score,
    };

    Some(CutoffDecision {
        threshold,
        mean: mean_score,
        median: median_score,
        std_dev: std,
    })
}
