use crate::image::ResolvedImage;
use crate::markers::BenchmarkResults;
use ireedock_store::{format_size, OutputInfo};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Why a run did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ImageResolution,
    Execution,
    OutputVerification,
    Interrupted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ImageResolution => "image resolution",
            Self::Execution => "execution",
            Self::OutputVerification => "output verification",
            Self::Interrupted => "interrupted",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSummary {
    pub path: PathBuf,
    pub size: u64,
    pub size_formatted: String,
    pub blake3: String,
}

impl From<OutputInfo> for OutputSummary {
    fn from(info: OutputInfo) -> Self {
        Self {
            size_formatted: format_size(info.size),
            path: info.path,
            size: info.size,
            blake3: info.blake3,
        }
    }
}

/// Outcome of one container run.
///
/// `success` is only set when the container exited cleanly, reported
/// `SUCCESS` and its artifact passed verification, so `output` is always
/// present on success.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ResolvedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<BenchmarkResults>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub container_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_to: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub log: String,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl ExecutionResult {
    pub(crate) fn pending(elapsed: Duration, log: String) -> Self {
        Self {
            success: false,
            elapsed,
            error: None,
            failure: None,
            image: None,
            exit_code: None,
            output: None,
            validation_result: None,
            benchmark: None,
            container_errors: Vec::new(),
            delivered_to: None,
            warnings: Vec::new(),
            log,
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        let mut r = Self::pending(Duration::ZERO, String::new());
        r.fail(kind, message);
        r
    }

    pub fn interrupted() -> Self {
        Self::failed(FailureKind::Interrupted, "compilation interrupted before launch")
    }

    pub(crate) fn fail(&mut self, kind: FailureKind, message: impl Into<String>) {
        self.success = false;
        self.failure = Some(kind);
        self.error = Some(message.into());
    }

    pub(crate) fn with_image(mut self, image: ResolvedImage) -> Self {
        self.image = Some(image);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_carries_kind_and_message() {
        let r = ExecutionResult::failed(FailureKind::ImageResolution, "no image");
        assert!(!r.success);
        assert_eq!(r.failure, Some(FailureKind::ImageResolution));
        assert_eq!(r.error.as_deref(), Some("no image"));
        assert!(r.output.is_none());
    }

    #[test]
    fn interrupted_result() {
        let r = ExecutionResult::interrupted();
        assert_eq!(r.failure, Some(FailureKind::Interrupted));
        assert_eq!(FailureKind::Interrupted.to_string(), "interrupted");
    }

    #[test]
    fn serializes_elapsed_as_seconds_and_skips_empty() {
        let mut r = ExecutionResult::pending(Duration::from_millis(1500), "log".to_owned());
        r.benchmark = Some(BenchmarkResults {
            latency_ms: Some(2.5),
            throughput_ops_per_sec: None,
        });
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["elapsed_secs"], 1.5);
        assert_eq!(json["benchmark"]["latency_ms"], 2.5);
        assert!(json["benchmark"].get("throughput_ops_per_sec").is_none());
        assert!(json.get("error").is_none());
        assert!(json.get("warnings").is_none());
        assert_eq!(json["log"], "log");
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let r = ExecutionResult::failed(FailureKind::OutputVerification, "empty");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["failure"], "output_verification");
    }

    #[test]
    fn output_summary_formats_size() {
        let s = OutputSummary::from(OutputInfo {
            path: PathBuf::from("/o/m.vmfb"),
            size: 2048,
            blake3: "ab".to_owned(),
        });
        assert_eq!(s.size_formatted, "2.0 KB");
    }
}
