use crate::metric::Metric;
use crate::RenderError;
use charts_rs::svg_to_png;
use charts_rs::LegendCategory;
use charts_rs::LineChart;
use charts_rs::ScatterChart;
use charts_rs::Series;
use maud::html;
use maud::Markup;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;

const WIDTH: f32 = 1200.0;
const HEIGHT: f32 = 800.0;
const THEME: &str = "light";

#[derive(Clone, Debug, PartialEq)]
pub struct Line {
  pub name: String,
  pub values: Vec<f64>,
}

/// One metric over time, with one line per implementation.
#[derive(Clone, Debug, PartialEq)]
pub struct OverallChart {
  pub metric: Metric,
  pub phases: Vec<u64>,
  pub lines: Vec<Line>,
}

/// Hit ratio of one worker of one implementation on the secondary axis, against another metric on the primary axis.
#[derive(Clone, Debug, PartialEq)]
pub struct HitRatioWithChart {
  pub implementation: String,
  pub metric: Metric,
  pub worker: usize,
  /// e.g. `Zipf (0.9)`.
  pub distribution: String,
  pub phases: Vec<u64>,
  pub hit_ratio: Vec<f64>,
  pub other: Vec<f64>,
  /// Shared across implementations so charts of the same worker can be compared.
  pub hit_ratio_max: f64,
  pub other_max: f64,
  /// Mean of `other` within each phase.
  pub phase_means: Vec<f64>,
  /// Minimum hit ratio the worker is promised.
  pub qos: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScatterPoints {
  pub name: String,
  /// Sorted by x.
  pub points: Vec<(f64, f64)>,
}

/// `y` against `x` for every worker of one implementation.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricPerOtherChart {
  pub implementation: String,
  pub x: Metric,
  pub y: Metric,
  pub workers: Vec<ScatterPoints>,
}

impl MetricPerOtherChart {
  pub fn file_name(&self) -> String {
    format!("{}-per-{}", self.y.id(), self.x.id())
  }
}

impl HitRatioWithChart {
  pub fn file_name(&self) -> String {
    format!("hit-ratio-with-{}-worker-{}", self.metric.id(), self.worker)
  }
}

impl OverallChart {
  pub fn file_name(&self) -> String {
    format!("overall-{}", self.metric.id())
  }
}

/// Receives charts whose series are already aligned and scaled. Implementations decide how (and whether) to draw them.
pub trait ChartSink {
  fn overall(&mut self, dir: &Path, chart: &OverallChart) -> Result<(), RenderError>;
  fn hit_ratio_with(&mut self, dir: &Path, chart: &HitRatioWithChart) -> Result<(), RenderError>;
  fn metric_per_other(&mut self, dir: &Path, chart: &MetricPerOtherChart) -> Result<(), RenderError>;
}

/// Labels the ticks at phase boundaries and leaves the rest blank.
fn phase_axis(len: usize, phases: &[u64]) -> Vec<String> {
  (0..len)
    .map(|tick| {
      if phases.contains(&(tick as u64)) {
        tick.to_string()
      } else {
        String::new()
      }
    })
    .collect()
}

fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), RenderError> {
  fs::write(path, contents).map_err(|source| RenderError::Io {
    path: path.to_path_buf(),
    source,
  })
}

fn to_f32(values: &[f64]) -> Vec<f32> {
  values.iter().map(|v| *v as f32).collect()
}

/// Writes every chart as `<name>.svg` and `<name>.png` using charts-rs.
#[derive(Default)]
pub struct ChartsRsSink {
  written: Vec<PathBuf>,
}

impl ChartsRsSink {
  pub fn new() -> Self {
    Self::default()
  }

  /// PNG files written so far, in order.
  pub fn written(&self) -> &[PathBuf] {
    &self.written
  }

  fn write(&mut self, dir: &Path, name: &str, svg: String) -> Result<(), RenderError> {
    fs::create_dir_all(dir).map_err(|source| RenderError::Io {
      path: dir.to_path_buf(),
      source,
    })?;
    let svg_path = dir.join(format!("{name}.svg"));
    write_file(&svg_path, &svg)?;
    let png = svg_to_png(&svg).map_err(|e| RenderError::Chart(e.to_string()))?;
    let png_path = dir.join(format!("{name}.png"));
    write_file(&png_path, png)?;
    info!(path = %png_path.display(), "wrote chart");
    self.written.push(png_path);
    Ok(())
  }

  /// An HTML page embedding every written chart, with links relative to `root`.
  pub fn index(&self, root: &Path) -> Markup {
    html! {
      (maud::DOCTYPE)
      html lang="en" {
        head {
          meta charset="UTF-8" {}
          title { "Benchmark results" }
        }
        body {
          @for path in &self.written {
            @let rel = path.strip_prefix(root).unwrap_or(path).display().to_string();
            figure {
              img src=(rel) width="600";
              figcaption { (rel) }
            }
          }
        }
      }
    }
  }
}

fn chart_svg<E: std::fmt::Display>(svg: Result<String, E>) -> Result<String, RenderError> {
  svg.map_err(|e| RenderError::Chart(e.to_string()))
}

impl ChartSink for ChartsRsSink {
  fn overall(&mut self, dir: &Path, chart: &OverallChart) -> Result<(), RenderError> {
    let len = chart.lines.iter().map(|l| l.values.len()).max().unwrap_or(0);
    let series = chart
      .lines
      .iter()
      .map(|l| Series::new(l.name.clone(), to_f32(&l.values)))
      .collect();
    let mut c = LineChart::new_with_theme(series, phase_axis(len, &chart.phases), THEME);
    c.title_text = chart.metric.name();
    c.sub_title_text = chart.metric.label().to_string();
    c.width = WIDTH;
    c.height = HEIGHT;
    c.legend_category = LegendCategory::Normal;
    self.write(dir, &chart.file_name(), chart_svg(c.svg())?)
  }

  fn hit_ratio_with(&mut self, dir: &Path, chart: &HitRatioWithChart) -> Result<(), RenderError> {
    let len = chart.hit_ratio.len().max(chart.other.len());
    let mut series = vec![Series::new(chart.metric.name(), to_f32(&chart.other))];
    let mut hit_ratio = Series::new(Metric::HitRatio.name(), to_f32(&chart.hit_ratio));
    hit_ratio.y_axis_index = 1;
    series.push(hit_ratio);
    if let Some(qos) = chart.qos {
      let mut floor = Series::new("QoS".to_string(), vec![qos as f32; len]);
      floor.y_axis_index = 1;
      series.push(floor);
    };

    let mut c = LineChart::new_with_theme(series, phase_axis(len, &chart.phases), THEME);
    c.title_text = format!(
      "{}: worker {} ({})",
      chart.implementation, chart.worker, chart.distribution
    );
    c.sub_title_text = format!(
      "{} per phase: {}",
      chart.metric.label(),
      chart
        .phase_means
        .iter()
        .map(|m| chart.metric.format_tick(*m))
        .collect::<Vec<_>>()
        .join(", ")
    );
    c.width = WIDTH;
    c.height = HEIGHT;
    c.legend_category = LegendCategory::Normal;
    let mut hit_ratio_axis = c.y_axis_configs[0].clone();
    c.y_axis_configs[0].axis_min = Some(0.0);
    c.y_axis_configs[0].axis_max = Some(chart.other_max as f32);
    hit_ratio_axis.axis_min = Some(0.0);
    hit_ratio_axis.axis_max = Some(chart.hit_ratio_max as f32);
    c.y_axis_configs.push(hit_ratio_axis);
    self.write(dir, &chart.file_name(), chart_svg(c.svg())?)
  }

  fn metric_per_other(&mut self, dir: &Path, chart: &MetricPerOtherChart) -> Result<(), RenderError> {
    let series = chart
      .workers
      .iter()
      .map(|w| {
        let flat = w.points.iter().flat_map(|(x, y)| [*x as f32, *y as f32]).collect();
        Series::new(w.name.clone(), flat)
      })
      .collect();
    let mut c = ScatterChart::new_with_theme(series, THEME);
    c.title_text = format!(
      "{}: {} per {}",
      chart.implementation,
      chart.y.name(),
      chart.x.name()
    );
    c.sub_title_text = format!("{} against {}", chart.y.label(), chart.x.label());
    c.width = WIDTH;
    c.height = HEIGHT;
    self.write(dir, &chart.file_name(), chart_svg(c.svg())?)
  }
}

#[cfg(test)]
mod tests {
  use super::phase_axis;
  use super::HitRatioWithChart;
  use super::MetricPerOtherChart;
  use super::OverallChart;
  use crate::metric::LatencyStat;
  use crate::metric::Metric;

  #[test]
  fn test_phase_axis() {
    assert_eq!(phase_axis(5, &[0, 3, 10]), vec!["0", "", "", "3", ""]);
  }

  #[test]
  fn test_file_names() {
    let overall = OverallChart {
      metric: Metric::Latency(LatencyStat::P99),
      phases: vec![],
      lines: vec![],
    };
    assert_eq!(overall.file_name(), "overall-latency-99");

    let with = HitRatioWithChart {
      implementation: "CacheLib".to_string(),
      metric: Metric::Throughput,
      worker: 2,
      distribution: "Uniform".to_string(),
      phases: vec![],
      hit_ratio: vec![],
      other: vec![],
      hit_ratio_max: 1.0,
      other_max: 1.0,
      phase_means: vec![],
      qos: None,
    };
    assert_eq!(with.file_name(), "hit-ratio-with-throughput-worker-2");

    let scatter = MetricPerOtherChart {
      implementation: "CacheLib".to_string(),
      x: Metric::HitRatio,
      y: Metric::Throughput,
      workers: vec![],
    };
    assert_eq!(scatter.file_name(), "throughput-per-hit-ratio");
  }
}
