/*

# dstat output grammar

Captured with `dstat -rcdgmn`, which prints two header lines followed by one row per second:

  --io/total- ----total-usage---- -dsk/total- ---paging-- ------memory-usage----- -net/total-
   read  writ| usr sys idl wai stl| read  writ|  in   out | used  free  buff  cach| recv  send
  0.20  3.40 |  12   2  85   1   0| 402k  120k|   0     0 |1530M 5120M  210M 8800M|1234B 5678B

Column groups are separated by `|`, so after treating `|` as whitespace the user CPU percentage is the third column. dstat repeats the header every screenful; those rows fail to parse and are skipped.

*/

pub const HEADER_LINES: usize = 2;
const CPU_USR_COLUMN: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DstatLine {
  Sample { cpu_usr: f64 },
  NoMatch,
}

pub fn parse_line(line: &str) -> DstatLine {
  let cpu_usr = line
    .split(|c: char| c == '|' || c.is_whitespace())
    .filter(|col| !col.is_empty())
    .nth(CPU_USR_COLUMN)
    .and_then(|col| col.parse::<f64>().ok());
  match cpu_usr {
    Some(cpu_usr) => DstatLine::Sample { cpu_usr },
    None => DstatLine::NoMatch,
  }
}

/// User CPU percentage per sample.
pub fn parse_log(text: &str) -> Vec<f64> {
  text
    .lines()
    .skip(HEADER_LINES)
    .filter_map(|line| match parse_line(line) {
      DstatLine::Sample { cpu_usr } => Some(cpu_usr),
      DstatLine::NoMatch => None,
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::parse_line;
  use super::parse_log;
  use super::DstatLine;

  const HEADER: &str = "--io/total- ----total-usage---- -dsk/total- ---paging-- ------memory-usage----- -net/total-\n read  writ| usr sys idl wai stl| read  writ|  in   out | used  free  buff  cach| recv  send\n";

  #[test]
  fn test_parse_sample() {
    assert_eq!(
      parse_line("0.20  3.40 |  12   2  85   1   0| 402k  120k|   0     0 |1530M 5120M  210M 8800M|1234B 5678B"),
      DstatLine::Sample { cpu_usr: 12.0 }
    );
    // No space around the separator.
    assert_eq!(
      parse_line("   0     0|37.5 2.1 60 0 0|   0     0"),
      DstatLine::Sample { cpu_usr: 37.5 }
    );
  }

  #[test]
  fn test_headers_do_not_match() {
    for line in HEADER.lines() {
      assert_eq!(parse_line(line), DstatLine::NoMatch);
    }
    assert_eq!(parse_line(""), DstatLine::NoMatch);
  }

  #[test]
  fn test_parse_log() {
    let text = format!(
      "{HEADER}   0     0 |  10   2  88   0   0|   0     0\n   0     0 |  20   2  78   0   0|   0     0\n{HEADER}   0     0 |  30   2  68   0   0|   0     0\n"
    );
    assert_eq!(parse_log(&text), vec![10.0, 20.0, 30.0]);
  }
}
