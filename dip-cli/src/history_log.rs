//! Communication history display for the dip CLI.
//!
//! Human-readable formatting around the core [`History`].

use anyhow::Result;
use chrono::SecondsFormat;
use dip_core::{CommunicationRecord, Direction, History};
use std::io::Write;

/// Format one history record for display.
pub fn format_entry(record: &CommunicationRecord) -> String {
    let date = record
        .timestamp
        .as_datetime()
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    match record.direction {
        Direction::Request => format!("[{}] -> {} {}", date, record.method, record.url),
        Direction::Response => {
            let status = match (record.code, &record.error) {
                (_, Some(error)) => format!("FAILED ({})", error),
                (Some(code), None) if record.is_success() => format!("{} OK", code),
                (Some(code), None) => format!("{} REJECTED", code),
                (None, None) => "NO RESPONSE".to_string(),
            };
            format!("[{}] <- {} {} | {}", date, record.method, record.url, status)
        }
    }
}

/// Print the history of one endpoint, or of every endpoint with history.
pub fn print_history(
    history: &History,
    endpoint_id: Option<&str>,
    show_bodies: bool,
    writer: &mut dyn Write,
) -> Result<()> {
    let endpoints = match endpoint_id {
        Some(id) => vec![id.to_string()],
        None => history.endpoints()?,
    };

    let mut total = 0;
    let mut successes = 0;
    let mut failures = 0;
    for id in &endpoints {
        let records = history.list(id)?;
        if records.is_empty() {
            continue;
        }
        writeln!(writer, "Endpoint {} ({} records):", id, records.len())?;
        writeln!(writer, "{}", "-".repeat(80))?;
        for record in &records {
            writeln!(writer, "  {}", format_entry(record))?;
            if show_bodies {
                if let Some(body) = history.read_body(id, record)? {
                    for line in body.lines() {
                        writeln!(writer, "      {}", line)?;
                    }
                }
            }
            if record.direction == Direction::Response {
                total += 1;
                if record.is_success() {
                    successes += 1;
                } else {
                    failures += 1;
                }
            }
        }
        writeln!(writer, "{}", "-".repeat(80))?;
    }

    if total == 0 {
        writeln!(writer, "No communication history found.")?;
        return Ok(());
    }
    writeln!(
        writer,
        "Summary: {} exchanges ({} successful, {} failed)",
        total, successes, failures
    )?;
    Ok(())
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dip_core::Timestamp;
    use tempfile::TempDir;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[test]
    fn test_format_entry() {
        let t = ts("2024-05-01T10:00:00.123456Z");
        let request = CommunicationRecord::request("POST", "http://col", t);
        assert_eq!(
            format_entry(&request),
            "[2024-05-01T10:00:00.123Z] -> POST http://col"
        );

        let mut response = CommunicationRecord::response("POST", "http://col", t);
        response.code = Some(201);
        assert!(format_entry(&response).ends_with("| 201 OK"));
        response.code = Some(415);
        assert!(format_entry(&response).ends_with("| 415 REJECTED"));
        response.code = None;
        response.error = Some("connection refused".into());
        assert!(format_entry(&response).ends_with("| FAILED (connection refused)"));
    }

    #[test]
    fn test_print_history() {
        let tmp = TempDir::new().unwrap();
        let history = History::new(tmp.path());
        let t = ts("2024-05-01T10:00:00.000000Z");
        history
            .save("e1", &mut CommunicationRecord::request("GET", "http://edit", t), None)
            .unwrap();
        let mut response = CommunicationRecord::response("GET", "http://edit", t);
        response.code = Some(200);
        history.save("e1", &mut response, Some("<entry/>")).unwrap();

        let mut out = Vec::new();
        print_history(&history, None, true, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Endpoint e1 (2 records):"));
        assert!(out.contains("      <entry/>"));
        assert!(out.contains("Summary: 1 exchanges (1 successful, 0 failed)"));
    }

    #[test]
    fn test_print_empty_history() {
        let tmp = TempDir::new().unwrap();
        let mut out = Vec::new();
        print_history(&History::new(tmp.path()), Some("e1"), false, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No communication history found.\n");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
