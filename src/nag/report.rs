//! Nag Report Generation
//!
//! Every evaluated rule hit becomes a [`NagReportLine`]. A stack's lines are rendered
//! as CSV (the assembly artifact), JSON, or colored text for the terminal.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::NagMessageLevel;
use crate::error::Result;

/// Format for nag reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Plain text format
    Text,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl ReportFormat {
    /// File extension of the assembly artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportFormat::Text => "text",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        })
    }
}

/// Outcome of one rule on one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NagCompliance {
    Compliant,
    #[serde(rename = "Non-Compliant")]
    NonCompliant,
    Suppressed,
}

impl fmt::Display for NagCompliance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NagCompliance::Compliant => write!(f, "Compliant"),
            NagCompliance::NonCompliant => write!(f, "Non-Compliant"),
            NagCompliance::Suppressed => write!(f, "Suppressed"),
        }
    }
}

/// One row of the report
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NagReportLine {
    /// Rule id including the granular finding, e.g. `AwsSolutions-IAM5[Resource::*]`
    pub rule_id: String,
    /// Construct path of the resource
    pub resource_id: String,
    pub compliance: NagCompliance,
    /// Suppression reason, `N/A` when not suppressed
    pub exception_reason: String,
    pub rule_level: NagMessageLevel,
    pub rule_info: String,
}

/// Aggregate counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NagStats {
    pub compliant: u32,
    pub non_compliant: u32,
    pub suppressed: u32,
}

impl NagStats {
    /// Share of evaluated lines that are compliant or suppressed.
    pub fn compliance_percentage(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            100.0
        } else {
            ((self.compliant + self.suppressed) as f64 / total as f64) * 100.0
        }
    }

    pub fn total(&self) -> u32 {
        self.compliant + self.non_compliant + self.suppressed
    }

    /// Update stats from a line
    pub fn record_line(&mut self, line: &NagReportLine) {
        match line.compliance {
            NagCompliance::Compliant => self.compliant += 1,
            NagCompliance::NonCompliant => self.non_compliant += 1,
            NagCompliance::Suppressed => self.suppressed += 1,
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    lines: &'a [NagReportLine],
}

/// The report of one rule pack on one stack
#[derive(Debug, Clone, PartialEq)]
pub struct NagReport {
    /// Rule pack name
    pub pack: String,
    /// Stack name
    pub stack: String,
    /// Report generation timestamp
    pub timestamp: String,
    pub lines: Vec<NagReportLine>,
}

impl NagReport {
    pub fn new(pack: impl Into<String>, stack: impl Into<String>, lines: Vec<NagReportLine>) -> Self {
        Self {
            pack: pack.into(),
            stack: stack.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            lines,
        }
    }

    /// Assembly file name for a format, e.g. `AwsSolutions-MyStack-NagReport.csv`.
    pub fn file_name(&self, format: ReportFormat) -> String {
        format!("{}-{}-NagReport.{}", self.pack, self.stack, format.extension())
    }

    pub fn stats(&self) -> NagStats {
        let mut stats = NagStats::default();
        for line in &self.lines {
            stats.record_line(line);
        }
        stats
    }

    /// Lines that are non-compliant at error level.
    pub fn blocking_lines(&self) -> impl Iterator<Item = &NagReportLine> {
        self.lines.iter().filter(|l| {
            l.compliance == NagCompliance::NonCompliant && l.rule_level == NagMessageLevel::Error
        })
    }

    /// Render report to specified format
    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(self.render_text()),
            ReportFormat::Json => self.render_json(),
            ReportFormat::Csv => self.render_csv(),
        }
    }

    fn render_text(&self) -> String {
        let stats = self.stats();
        let mut output = String::new();
        output.push_str(&format!("=== {} report for {} ===\n", self.pack, self.stack));
        output.push_str(&format!("Generated: {}\n", self.timestamp));
        output.push_str(&format!(
            "\nCompliance: {:.1}%\nTotal: {} | Compliant: {} | Non-Compliant: {} | Suppressed: {}\n\n",
            stats.compliance_percentage(),
            stats.total(),
            stats.compliant,
            stats.non_compliant,
            stats.suppressed
        ));

        for line in &self.lines {
            let status = match line.compliance {
                NagCompliance::Compliant => line.compliance.to_string().green(),
                NagCompliance::NonCompliant => line.compliance.to_string().red(),
                NagCompliance::Suppressed => line.compliance.to_string().yellow(),
            };
            output.push_str(&format!("[{}] {} {}\n", status, line.rule_id, line.resource_id));
            if line.compliance == NagCompliance::Suppressed {
                output.push_str(&format!("  Reason: {}\n", line.exception_reason));
            }
        }

        output
    }

    fn render_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&JsonReport { lines: &self.lines })?)
    }

    fn render_csv(&self) -> Result<String> {
        let mut output =
            String::from("Rule ID,Resource ID,Compliance,Exception Reason,Rule Level,Rule Info\n");
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(Vec::new());
        for line in &self.lines {
            let compliance = line.compliance.to_string();
            let level = line.rule_level.to_string();
            writer.write_record([
                line.rule_id.as_str(),
                line.resource_id.as_str(),
                compliance.as_str(),
                line.exception_reason.as_str(),
                level.as_str(),
                line.rule_info.as_str(),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| crate::error::Error::Io(e.into_error()))?;
        output.push_str(&String::from_utf8_lossy(&bytes));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn report() -> NagReport {
        NagReport::new(
            "AwsSolutions",
            "MyStack",
            vec![
                NagReportLine {
                    rule_id: "AwsSolutions-EC23".into(),
                    resource_id: "MyStack/sg/Resource".into(),
                    compliance: NagCompliance::Suppressed,
                    exception_reason: "Open, for the workshop".into(),
                    rule_level: NagMessageLevel::Error,
                    rule_info: "The Security Group allows for 0.0.0.0/0 or ::/0 inbound access."
                        .into(),
                },
                NagReportLine {
                    rule_id: "AwsSolutions-EC27".into(),
                    resource_id: "MyStack/sg/Resource".into(),
                    compliance: NagCompliance::Compliant,
                    exception_reason: "N/A".into(),
                    rule_level: NagMessageLevel::Error,
                    rule_info: "The Security Group does not have a description.".into(),
                },
            ],
        )
    }

    #[test]
    fn test_csv_report() {
        let csv = report().render(ReportFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("Rule ID,Resource ID,Compliance,Exception Reason,Rule Level,Rule Info")
        );
        assert_eq!(
            lines.next(),
            Some(
                "\"AwsSolutions-EC23\",\"MyStack/sg/Resource\",\"Suppressed\",\"Open, for the workshop\",\"Error\",\"The Security Group allows for 0.0.0.0/0 or ::/0 inbound access.\""
            )
        );
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn test_json_report() {
        let json: serde_json::Value =
            serde_json::from_str(&report().render(ReportFormat::Json).unwrap()).unwrap();
        assert_eq!(json["lines"][0]["ruleId"], "AwsSolutions-EC23");
        assert_eq!(json["lines"][0]["compliance"], "Suppressed");
        assert_eq!(json["lines"][1]["exceptionReason"], "N/A");
        assert_eq!(json["lines"][1]["ruleLevel"], "Error");
    }

    #[test]
    fn test_stats_and_file_names() {
        let report = report();
        let stats = report.stats();
        assert_eq!(stats.total(), 2);
        assert_eq!(stats.compliance_percentage(), 100.0);
        assert_eq!(report.blocking_lines().count(), 0);
        assert_eq!(report.file_name(ReportFormat::Csv), "AwsSolutions-MyStack-NagReport.csv");
        assert!(report.render(ReportFormat::Text).unwrap().contains("Suppressed: 1"));
    }

    #[test]
    fn test_report_format_from_config_strings() {
        let formats: Vec<ReportFormat> = serde_json::from_str(r#"["csv","json","text"]"#).unwrap();
        assert_eq!(formats, vec![ReportFormat::Csv, ReportFormat::Json, ReportFormat::Text]);
    }
}
