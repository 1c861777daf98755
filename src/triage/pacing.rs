//! Human-like pacing between browser actions.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

/// Delay ranges, all in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingConfig {
    pub min_secs: f64,
    pub max_secs: f64,
    /// Chance of replacing the normal delay with a long pause.
    pub long_pause_probability: f64,
    pub long_pause_min_secs: f64,
    pub long_pause_max_secs: f64,
    /// Extra delay always added on top.
    pub jitter_min_secs: f64,
    pub jitter_max_secs: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_secs: 3.0,
            max_secs: 7.0,
            long_pause_probability: 0.1,
            long_pause_min_secs: 10.0,
            long_pause_max_secs: 20.0,
            jitter_min_secs: 0.2,
            jitter_max_secs: 0.8,
        }
    }
}

/// Draw one pause for the range `[min_secs, max_secs]`.
///
/// With `long_pause_probability` the base delay is drawn from the long-pause
/// range instead; the jitter is always added.
pub fn sample_delay<R: Rng + ?Sized>(
    rng: &mut R,
    config: &PacingConfig,
    min_secs: f64,
    max_secs: f64,
) -> Duration {
    let base = if rng.gen_bool(config.long_pause_probability.clamp(0.0, 1.0)) {
        uniform(rng, config.long_pause_min_secs, config.long_pause_max_secs)
    } else {
        uniform(rng, min_secs, max_secs)
    };
    let jitter = uniform(rng, config.jitter_min_secs, config.jitter_max_secs);
    Duration::from_secs_f64((base + jitter).max(0.0))
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    if high > low {
        rng.gen_range(low..=high)
    } else {
        low
    }
}

/// Suspends the caller between actions.
#[async_trait]
pub trait Pacer: Send + Sync {
    /// Pause for a randomized interval around `[min_secs, max_secs]`.
    async fn pause(&self, min_secs: f64, max_secs: f64);

    /// Pause using the configured default range.
    async fn pause_default(&self);
}

/// Real-time pacer backed by `tokio::time::sleep`.
pub struct HumanPacer {
    config: PacingConfig,
}

impl HumanPacer {
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Pacer for HumanPacer {
    async fn pause(&self, min_secs: f64, max_secs: f64) {
        let delay = sample_delay(&mut rand::thread_rng(), &self.config, min_secs, max_secs);
        debug!(secs = delay.as_secs_f64(), "Pacing pause");
        tokio::time::sleep(delay).await;
    }

    async fn pause_default(&self) {
        self.pause(self.config.min_secs, self.config.max_secs).await;
    }
}
