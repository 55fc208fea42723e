use tracing::warn;

/// Elementwise mean across runs. Runs are aligned by index and truncated to the shortest one.
pub fn average_runs(runs: &[Vec<f64>]) -> Vec<f64> {
  let Some(ticks) = runs.iter().map(|r| r.len()).min() else {
    return Vec::new();
  };
  (0..ticks)
    .map(|t| runs.iter().map(|r| r[t]).sum::<f64>() / runs.len() as f64)
    .collect()
}

/// Converts a cumulative counter into per-tick increments. The first increment covers everything before the first snapshot and is dropped.
///
/// Counters are expected to never decrease. If one does (e.g. the benchmark restarted its measurements), the increment is clamped to zero and a warning is logged.
pub fn per_tick_deltas(cumulative: &[f64]) -> Vec<f64> {
  cumulative
    .windows(2)
    .enumerate()
    .skip(1)
    .map(|(tick, w)| {
      let delta = w[1] - w[0];
      if delta < 0.0 {
        warn!(
          tick = tick + 1,
          previous = w[0],
          current = w[1],
          "cumulative counter decreased"
        );
        0.0
      } else {
        delta
      }
    })
    .collect()
}

/// `num / den` per tick, where a tick without any denominator is 0.
pub fn ratio(num: &[f64], den: &[f64]) -> Vec<f64> {
  num
    .iter()
    .zip(den)
    .map(|(n, d)| if *d > 0.0 { n / d } else { 0.0 })
    .collect()
}

/// Clips or zero-pads to exactly `len` samples.
pub fn fit(mut series: Vec<f64>, len: usize) -> Vec<f64> {
  series.resize(len, 0.0);
  series
}

pub fn zero_from(series: &mut [f64], tick: usize) {
  if tick < series.len() {
    series[tick..].fill(0.0);
  };
}

pub fn max(series: &[f64]) -> f64 {
  series.iter().copied().fold(0.0, f64::max)
}

/// Mean of the samples strictly between each pair of consecutive phases.
pub fn phase_means(series: &[f64], phases: &[u64]) -> Vec<f64> {
  phases
    .windows(2)
    .map(|w| {
      let start = (w[0] as usize + 1).min(series.len());
      let end = (w[1] as usize).max(start).min(series.len());
      let window = &series[start..end];
      if window.is_empty() {
        0.0
      } else {
        window.iter().sum::<f64>() / window.len() as f64
      }
    })
    .collect()
}
