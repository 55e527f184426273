use anyhow::Result;
use std::io::Write;

use crate::config::OutputFormat;
use crate::dashboard::{Grade, MonitorPayload};

/// Exports a monitor payload in a machine-readable format.
///
/// - JSON: the full payload, columns and gaps included
/// - CSV: one row per measurement
pub fn export_payload(
    payload: &MonitorPayload,
    format: OutputFormat,
    pretty: bool,
    output: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Summary => {
            // Summary format is handled separately in cli.rs
            unreachable!("Summary format should be handled in CLI")
        }
        OutputFormat::Json => export_json(payload, pretty, output),
        OutputFormat::Csv => export_csv(payload, output),
    }
}

/// Writes any serializable value as JSON followed by a newline.
pub fn write_json<T: serde::Serialize>(value: &T, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}

fn export_json(payload: &MonitorPayload, pretty: bool, output: &mut dyn Write) -> Result<()> {
    write_json(payload, pretty, output)
}

fn csv_field(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

fn export_csv(payload: &MonitorPayload, output: &mut dyn Write) -> Result<()> {
    let history = &payload.history;

    writeln!(output, "CI Id,Date,Value,Grade,CI URL,Changed Packages,Commit URLs")?;

    for i in 0..history.len() {
        let grade = payload
            .specs
            .grade(history.values[i])
            .map_or("", Grade::as_str);

        writeln!(
            output,
            "{},{},{},{},{},{},{}",
            history.ci_ids[i],
            history.dates[i].to_rfc3339(),
            history.values[i],
            grade,
            csv_field(&history.ci_urls[i]),
            csv_field(&history.package_names[i].join(" ")),
            csv_field(&history.package_urls[i].join(" ")),
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::history::history_from_records;
    use crate::analysis::window::Window;
    use crate::dashboard::MetricSpecs;
    use crate::models::{Operator, PackageKey};
    use crate::providers::MeasurementRecord;
    use chrono::{TimeZone, Utc};

    fn create_test_payload() -> MonitorPayload {
        let date = Utc.with_ymd_and_hms(2017, 3, 1, 5, 22, 37).unwrap();
        let history = history_from_records(vec![MeasurementRecord {
            ci_id: "452".to_string(),
            ci_dataset: "cfht".to_string(),
            date,
            value: 7.5,
            ci_url: "https://ci.lsst.codes/job/validate_drp/452/".to_string(),
            changed_packages: vec![PackageKey::new(
                "afw",
                "abc123",
                "https://github.com/lsst/afw.git",
            )],
        }])
        .unwrap();

        MonitorPayload {
            dataset: "cfht".to_string(),
            metric: "AM1".to_string(),
            window: Window::Weeks,
            collected_at: date,
            specs: MetricSpecs {
                metric: "AM1".to_string(),
                unit: "marcsec".to_string(),
                description: String::new(),
                operator: Operator::Lt,
                minimum: Some(20.0),
                design: Some(10.0),
                stretch: Some(5.0),
            },
            history,
            gaps: Vec::new(),
        }
    }

    #[test]
    fn test_export_json() {
        let payload = create_test_payload();
        let mut output = Vec::new();
        export_json(&payload, false, &mut output).unwrap();
        let json_str = String::from_utf8(output).unwrap();
        assert!(json_str.contains("\"window\":\"weeks\""));
        assert!(json_str.contains("\"ci_ids\":[452]"));
        assert!(json_str.contains(r#"["afw","abc123","https://github.com/lsst/afw.git"]"#));

        let back: MonitorPayload = serde_json::from_str(&json_str).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_export_json_pretty() {
        let payload = create_test_payload();
        let mut output = Vec::new();
        export_json(&payload, true, &mut output).unwrap();
        let json_str = String::from_utf8(output).unwrap();
        assert!(json_str.contains('\n'));
        assert!(json_str.contains("  "));
    }

    #[test]
    fn test_export_csv() {
        let payload = create_test_payload();
        let mut output = Vec::new();
        export_csv(&payload, &mut output).unwrap();
        let csv = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("CI Id,Date,Value,Grade"));
        assert!(lines[1].starts_with("452,2017-03-01T05:22:37+00:00,7.5,design,"));
        assert!(lines[1].contains("\"https://github.com/lsst/afw/commit/abc123\""));
    }

    #[test]
    fn test_csv_field_escapes_quotes() {
        assert_eq!(csv_field(r#"a "b""#), r#""a ""b""""#);
    }
}
