//! The line protocol toolchain images use to report results.
//!
//! Recognised lines, matched at the start of the line:
//!
//! ```text
//! VALIDATION_RESULT: <text>
//! BENCHMARK_LATENCY: <float, ms>
//! BENCHMARK_THROUGHPUT: <float, ops/s>
//! ERROR: <text>
//! ```
//!
//! plus a standalone `SUCCESS` word anywhere in the stream.

use serde::Serialize;
use tracing::warn;

pub const VALIDATION_PREFIX: &str = "VALIDATION_RESULT:";
pub const LATENCY_PREFIX: &str = "BENCHMARK_LATENCY:";
pub const THROUGHPUT_PREFIX: &str = "BENCHMARK_THROUGHPUT:";
pub const ERROR_PREFIX: &str = "ERROR:";
pub const SUCCESS_TOKEN: &str = "SUCCESS";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BenchmarkResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput_ops_per_sec: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Markers {
    pub success: bool,
    pub validation_result: Option<String>,
    pub benchmark: Option<BenchmarkResults>,
    pub errors: Vec<String>,
}

/// Scan a container log for markers. Never fails: malformed values are
/// skipped with a warning and later markers override earlier ones.
pub fn parse_markers(log: &str) -> Markers {
    let mut markers = Markers::default();
    for line in log.lines() {
        let line = line.trim_end_matches('\r');
        if contains_token(line, SUCCESS_TOKEN) {
            markers.success = true;
        }

        if let Some(rest) = line.strip_prefix(VALIDATION_PREFIX) {
            markers.validation_result = Some(rest.trim().to_owned());
        } else if let Some(rest) = line.strip_prefix(LATENCY_PREFIX) {
            if let Some(v) = parse_metric(LATENCY_PREFIX, rest) {
                markers.benchmark.get_or_insert_with(Default::default).latency_ms = Some(v);
            }
        } else if let Some(rest) = line.strip_prefix(THROUGHPUT_PREFIX) {
            if let Some(v) = parse_metric(THROUGHPUT_PREFIX, rest) {
                markers
                    .benchmark
                    .get_or_insert_with(Default::default)
                    .throughput_ops_per_sec = Some(v);
            }
        } else if let Some(rest) = line.strip_prefix(ERROR_PREFIX) {
            let message = rest.trim();
            if !message.is_empty() {
                markers.errors.push(message.to_owned());
            }
        }
    }
    markers
}

fn parse_metric(prefix: &str, raw: &str) -> Option<f64> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            warn!("ignoring malformed {prefix} marker value '{}'", raw.trim());
            None
        }
    }
}

/// `token` appears in `line` not glued to other word characters.
fn contains_token(line: &str, token: &str) -> bool {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    line.match_indices(token).any(|(idx, _)| {
        let before = line[..idx].chars().next_back();
        let after = line[idx + token.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_log_is_parsed() {
        let log = "\
Compiling /input/model.mlir for cpu
VALIDATION_RESULT: PASSED
BENCHMARK_LATENCY: 12.5
BENCHMARK_THROUGHPUT: 80.0
SUCCESS: compilation finished
";
        let m = parse_markers(log);
        assert!(m.success);
        assert_eq!(m.validation_result.as_deref(), Some("PASSED"));
        let bench = m.benchmark.unwrap();
        assert_eq!(bench.latency_ms, Some(12.5));
        assert_eq!(bench.throughput_ops_per_sec, Some(80.0));
        assert!(m.errors.is_empty());
    }

    #[test]
    fn empty_log_has_nothing() {
        assert_eq!(parse_markers(""), Markers::default());
    }

    #[test]
    fn success_must_be_a_whole_word() {
        assert!(!parse_markers("UNSUCCESSFUL run").success);
        assert!(!parse_markers("SUCCESSOR").success);
        assert!(parse_markers("[SUCCESS]").success);
        assert!(parse_markers("status=SUCCESS").success);
        assert!(parse_markers("  build SUCCESS\r").success);
    }

    #[test]
    fn malformed_benchmark_values_are_skipped() {
        let m = parse_markers("BENCHMARK_LATENCY: fast\nBENCHMARK_THROUGHPUT: 10\n");
        let bench = m.benchmark.unwrap();
        assert_eq!(bench.latency_ms, None);
        assert_eq!(bench.throughput_ops_per_sec, Some(10.0));

        let m = parse_markers("BENCHMARK_LATENCY: NaN\nBENCHMARK_LATENCY: inf\n");
        assert!(m.benchmark.is_none());
    }

    #[test]
    fn markers_must_start_the_line() {
        let m = parse_markers("  VALIDATION_RESULT: PASSED\necho ERROR: nope\n");
        assert!(m.validation_result.is_none());
        assert!(m.errors.is_empty());
    }

    #[test]
    fn value_keeps_colons_after_the_prefix() {
        let m = parse_markers("VALIDATION_RESULT: max_diff: 0.001\n");
        assert_eq!(m.validation_result.as_deref(), Some("max_diff: 0.001"));
    }

    #[test]
    fn last_marker_wins_and_errors_accumulate() {
        let m = parse_markers(
            "VALIDATION_RESULT: PENDING\nERROR: first\nVALIDATION_RESULT: FAILED\nERROR: second\nERROR:   \n",
        );
        assert_eq!(m.validation_result.as_deref(), Some("FAILED"));
        assert_eq!(m.errors, ["first", "second"]);
        assert!(!m.success);
    }

    #[test]
    fn binary_noise_does_not_panic() {
        let noisy = String::from_utf8_lossy(&[0xff, b'\n', 0xfe, b'S', b'U']).into_owned();
        let m = parse_markers(&noisy);
        assert!(!m.success);
    }
}
