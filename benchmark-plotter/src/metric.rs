#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LatencyStat {
  Min,
  Max,
  Avg,
  P90,
  P99,
  P999,
  P9999,
}

impl LatencyStat {
  pub const ALL: [LatencyStat; 7] = [
    LatencyStat::Min,
    LatencyStat::Max,
    LatencyStat::Avg,
    LatencyStat::P90,
    LatencyStat::P99,
    LatencyStat::P999,
    LatencyStat::P9999,
  ];

  /// Field name within a `[READ: ...]` status section.
  pub fn field(self) -> &'static str {
    match self {
      LatencyStat::Min => "Min",
      LatencyStat::Max => "Max",
      LatencyStat::Avg => "Avg",
      LatencyStat::P90 => "90",
      LatencyStat::P99 => "99",
      LatencyStat::P999 => "99.9",
      LatencyStat::P9999 => "99.99",
    }
  }

  fn id(self) -> &'static str {
    match self {
      LatencyStat::Min => "min",
      LatencyStat::Max => "max",
      LatencyStat::Avg => "avg",
      _ => self.field(),
    }
  }

  fn description(self) -> &'static str {
    match self {
      LatencyStat::Min => "minimum",
      LatencyStat::Max => "maximum",
      LatencyStat::Avg => "average",
      LatencyStat::P90 => "90th percentile",
      LatencyStat::P99 => "99th percentile",
      LatencyStat::P999 => "99.9th percentile",
      LatencyStat::P9999 => "99.99th percentile",
    }
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Metric {
  HitRatio,
  Throughput,
  Latency(LatencyStat),
  Cpu,
}

/// Rounds to `decimals` places and drops trailing zeros, so 0.50 prints as 0.5 and 1.00 as 1.
fn trimmed(value: f64, decimals: usize) -> String {
  let s = format!("{value:.decimals$}");
  if s.contains('.') {
    s.trim_end_matches('0').trim_end_matches('.').to_string()
  } else {
    s
  }
}

impl Metric {
  pub fn all() -> Vec<Metric> {
    let mut all = vec![Metric::HitRatio, Metric::Throughput];
    all.extend(LatencyStat::ALL.map(Metric::Latency));
    all.push(Metric::Cpu);
    all
  }

  pub fn id(self) -> String {
    match self {
      Metric::HitRatio => "hit-ratio".to_string(),
      Metric::Throughput => "throughput".to_string(),
      Metric::Latency(stat) => format!("latency-{}", stat.id()),
      Metric::Cpu => "cpu".to_string(),
    }
  }

  pub fn name(self) -> String {
    match self {
      Metric::HitRatio => "Hit ratio".to_string(),
      Metric::Throughput => "Throughput".to_string(),
      Metric::Latency(stat) => format!("Lookup latency ({})", stat.description()),
      Metric::Cpu => "CPU usage".to_string(),
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Metric::HitRatio => "Hit ratio",
      Metric::Throughput => "Throughput (Kops/s)",
      Metric::Latency(_) => "Latency (ms)",
      Metric::Cpu => "CPU (%)",
    }
  }

  /// Whether the metric is reported per worker in addition to overall.
  pub fn per_worker(self) -> bool {
    !matches!(self, Metric::Cpu)
  }

  pub fn format_tick(self, value: f64) -> String {
    match self {
      Metric::HitRatio => trimmed(value, 2),
      Metric::Throughput => trimmed(value / 1000.0, 1),
      Metric::Latency(_) => trimmed(value / 1000.0, 1),
      Metric::Cpu => format!("{value:.0}%"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::LatencyStat;
  use super::Metric;
  use ahash::HashSet;
  use ahash::HashSetExt;

  #[test]
  fn test_ids_are_unique() {
    let mut seen = HashSet::new();
    for metric in Metric::all() {
      assert!(seen.insert(metric.id()), "duplicate id {}", metric.id());
    }
    assert_eq!(seen.len(), 10);
    assert_eq!(Metric::Latency(LatencyStat::P999).id(), "latency-99.9");
    assert_eq!(Metric::Latency(LatencyStat::Avg).id(), "latency-avg");
  }

  #[test]
  fn test_format_tick() {
    assert_eq!(Metric::HitRatio.format_tick(0.5), "0.5");
    assert_eq!(Metric::HitRatio.format_tick(1.0), "1");
    assert_eq!(Metric::HitRatio.format_tick(0.876), "0.88");
    assert_eq!(Metric::Throughput.format_tick(12_340.0), "12.3");
    assert_eq!(Metric::Throughput.format_tick(20_000.0), "20");
    assert_eq!(Metric::Latency(LatencyStat::P99).format_tick(1_500.0), "1.5");
    assert_eq!(Metric::Cpu.format_tick(37.6), "38%");
    assert_eq!(Metric::Cpu.format_tick(100.0), "100%");
  }

  #[test]
  fn test_only_cpu_is_overall_only() {
    let overall_only: Vec<Metric> = Metric::all()
      .into_iter()
      .filter(|m| !m.per_worker())
      .collect();
    assert_eq!(overall_only, vec![Metric::Cpu]);
  }
}
