use ahash::HashMap;
use once_cell::sync::Lazy;
use regex::Regex;

/*

# Status log grammar

The benchmark prints one snapshot per status interval:

  <secs> sec: global { <n> operations; [READ: Count=10 Max=.. Min=.. Avg=.. 90=.. 99=.. 99.9=.. 99.99=..] [READ-PASSED: ..] } worker-0 { ... } worker-1 { ... }

Counters are cumulative since the start of the run, latency fields describe the current interval. Sections for operations that have not happened yet are omitted by the benchmark, so an absent section or field simply means nothing was recorded.

*/

static ELAPSED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+) sec:").unwrap());
static BLOCK_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(global|worker-(\d+)) \{([^{}]*)\}").unwrap());
static OPERATIONS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+) operations").unwrap());
static SECTION_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"\[([A-Z][A-Z-]*):([^\[\]]*)\]").unwrap());
static FIELD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Za-z0-9.]+)=([^\s\]]+)").unwrap());

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Scope {
  Global,
  Worker(usize),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Section {
  fields: HashMap<String, f64>,
}

impl Section {
  pub fn field(&self, name: &str) -> Option<f64> {
    self.fields.get(name).copied()
  }

  pub fn count(&self) -> Option<f64> {
    self.field("Count")
  }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
  pub operations: Option<u64>,
  pub sections: HashMap<String, Section>,
}

impl Block {
  pub fn section(&self, op: &str) -> Option<&Section> {
    self.sections.get(op)
  }

  pub fn count(&self, op: &str) -> Option<f64> {
    self.section(op)?.count()
  }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
  pub elapsed_secs: Option<u64>,
  pub global: Option<Block>,
  pub workers: HashMap<usize, Block>,
}

impl Snapshot {
  pub fn block(&self, scope: Scope) -> Option<&Block> {
    match scope {
      Scope::Global => self.global.as_ref(),
      Scope::Worker(i) => self.workers.get(&i),
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StatusLine {
  Snapshot(Snapshot),
  NoMatch,
}

fn parse_block(body: &str) -> Block {
  let operations = OPERATIONS_RE
    .captures(body)
    .and_then(|c| c[1].parse().ok());
  let sections = SECTION_RE
    .captures_iter(body)
    .map(|c| {
      let fields = FIELD_RE
        .captures_iter(&c[2])
        .filter_map(|f| Some((f[1].to_string(), f[2].parse().ok()?)))
        .collect();
      (c[1].to_string(), Section { fields })
    })
    .collect();
  Block {
    operations,
    sections,
  }
}

pub fn parse_line(line: &str) -> StatusLine {
  let mut snapshot = Snapshot {
    elapsed_secs: ELAPSED_RE
      .captures(line)
      .and_then(|c| c[1].parse().ok()),
    ..Default::default()
  };
  let mut matched = false;
  for c in BLOCK_RE.captures_iter(line) {
    matched = true;
    let block = parse_block(&c[3]);
    match c.get(2) {
      None => snapshot.global = Some(block),
      Some(worker) => {
        // A worker index that overflows usize cannot belong to this run.
        let Ok(worker) = worker.as_str().parse() else {
          continue;
        };
        snapshot.workers.insert(worker, block);
      }
    };
  }
  if matched {
    StatusLine::Snapshot(snapshot)
  } else {
    StatusLine::NoMatch
  }
}

/// Snapshots in the order they were printed. Lines that are not snapshots (banners, the final summary) are dropped.
pub fn parse_log(text: &str) -> Vec<Snapshot> {
  text
    .lines()
    .filter_map(|line| match parse_line(line) {
      StatusLine::Snapshot(s) => Some(s),
      StatusLine::NoMatch => None,
    })
    .collect()
}
