//! Human-readable status report

use super::probe::{ProbeError, ProbeResponse};
use super::stats::StatsSnapshot;
use super::Target;
use crate::StatusCode;
use chrono::{DateTime, Local};
use std::fmt::Write;

/// Outcome of one scheduled check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub target: Option<Target>,
    pub checked_at: DateTime<Local>,
    pub outcome: Result<ProbeResponse, ProbeError>,
}

impl CheckResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.outcome
            .as_ref()
            .ok()
            .map(|r| r.latency.as_millis() as u64)
    }
}

/// `1023 B`, `1.50 KB`, `2.00 MB`
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    }
}

/// Render a check and the aggregates after it was folded in
pub fn render(result: &CheckResult, stats: &StatsSnapshot) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "===== Web Server Status Report =====");
    let _ = writeln!(
        out,
        "Time:            {}",
        result.checked_at.format("%Y-%m-%d %H:%M:%S")
    );
    match &result.target {
        Some(t) if t.local => {
            let _ = writeln!(out, "Target:          {} (local server)", t.url);
        }
        Some(t) => {
            let _ = writeln!(out, "Target:          {}", t.url);
        }
        None => {
            let _ = writeln!(out, "Target:          (none)");
        }
    }

    match &result.outcome {
        Ok(response) => {
            let status = StatusCode(response.status);
            let _ = writeln!(out, "Status:          OK");
            let _ = writeln!(
                out,
                "Response code:   {} {}",
                status.as_u16(),
                status.reason_phrase()
            );
            let _ = writeln!(out, "Latency:         {} ms", response.latency.as_millis());
            let length = response
                .content_length
                .map(format_size)
                .unwrap_or_else(|| "unknown".to_string());
            let _ = writeln!(out, "Content length:  {length}");
            let _ = writeln!(
                out,
                "Content type:    {}",
                response.content_type.as_deref().unwrap_or("unknown")
            );
            if let Some(server) = &response.server {
                let _ = writeln!(out, "Server:          {server}");
            }
        }
        Err(e) => {
            let _ = writeln!(out, "Status:          failed ({e})");
            let _ = writeln!(out, "Consecutive failures: {}", stats.consecutive_failures);
        }
    }

    if let (Some(avg), Some(rate)) = (stats.average_latency_ms(), stats.success_rate()) {
        let _ = writeln!(out, "----- Statistics -----");
        let _ = writeln!(out, "Total checks:    {}", stats.total_checks);
        let _ = writeln!(out, "Average latency: {avg:.2} ms");
        let _ = writeln!(out, "Success rate:    {rate:.2}%");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).single().unwrap()
    }

    fn ok_result() -> CheckResult {
        CheckResult {
            target: Some(Target {
                url: "http://127.0.0.1:11000".to_string(),
                local: true,
            }),
            checked_at: at(),
            outcome: Ok(ProbeResponse {
                status: 200,
                latency: Duration::from_millis(42),
                content_length: Some(1536),
                content_type: Some("text/html".to_string()),
                server: None,
            }),
        }
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_render_success() {
        let stats = StatsSnapshot {
            total_checks: 3,
            total_latency_ms: 100,
            consecutive_failures: 0,
        };
        let report = render(&ok_result(), &stats);

        assert!(report.contains("2024-03-09 14:05:07"));
        assert!(report.contains("http://127.0.0.1:11000 (local server)"));
        assert!(report.contains("Response code:   200 OK"));
        assert!(report.contains("Latency:         42 ms"));
        assert!(report.contains("1.50 KB"));
        assert!(report.contains("Average latency: 33.33 ms"));
        assert!(report.contains("Success rate:    100.00%"));
        assert!(!report.contains("Server:"));
    }

    #[test]
    fn test_render_failure() {
        let result = CheckResult {
            target: Some(Target {
                url: "http://example.invalid".to_string(),
                local: false,
            }),
            checked_at: at(),
            outcome: Err(ProbeError::Connect("refused".to_string())),
        };
        let stats = StatsSnapshot {
            total_checks: 4,
            total_latency_ms: 30,
            consecutive_failures: 1,
        };
        let report = render(&result, &stats);

        assert!(report.contains("Status:          failed (connect failed: refused)"));
        assert!(report.contains("Consecutive failures: 1"));
        assert!(report.contains("Success rate:    75.00%"));
        assert!(!report.contains("(local server)"));
    }

    #[test]
    fn test_render_without_checks_has_no_aggregates() {
        let report = render(&ok_result(), &StatsSnapshot::default());
        assert!(!report.contains("Statistics"));
    }
}
