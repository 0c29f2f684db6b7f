//! Batch report rendering as JSON or JSON Lines.

use serde::Serialize;
use std::io::{self, Write};

use crate::types::{BatchReport, ItemReport};

/// Report format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// The whole report as one JSON object
    #[default]
    Json,
    /// One item per line, each tagged with the session
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// One JSONL line.
#[derive(Serialize)]
struct ReportLine<'a> {
    session: &'a str,
    #[serde(flatten)]
    item: &'a ItemReport,
}

/// Serializes batch reports to a writer.
pub struct ReportWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
}

impl<W: Write> ReportWriter<W> {
    /// `pretty` only affects [`OutputFormat::Json`].
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
        }
    }

    pub fn write_report(&mut self, report: &BatchReport) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                if self.pretty {
                    serde_json::to_writer_pretty(&mut self.writer, report)
                        .map_err(io::Error::other)?;
                } else {
                    serde_json::to_writer(&mut self.writer, report).map_err(io::Error::other)?;
                }
                writeln!(self.writer)?;
            }
            OutputFormat::JsonLines => {
                for item in &report.items {
                    let line = ReportLine {
                        session: &report.session,
                        item,
                    };
                    serde_json::to_writer(&mut self.writer, &line).map_err(io::Error::other)?;
                    writeln!(self.writer)?;
                }
            }
        }
        Ok(())
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Consume the writer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::types::{ItemStatus, OutputRef};
    use std::path::PathBuf;

    fn report() -> BatchReport {
        BatchReport {
            session: "sess".into(),
            items: vec![
                ItemReport {
                    index: 0,
                    file_name: "a.png".into(),
                    status: ItemStatus::Processed {
                        output: OutputRef {
                            location: "sess/h/output/000001_0000abcd.jpg".into(),
                            path: PathBuf::from("/w/sess/h/output/000001_0000abcd.jpg"),
                        },
                        sequence: 1,
                    },
                },
                ItemReport {
                    index: 1,
                    file_name: "b.txt".into(),
                    status: ItemStatus::Failed {
                        kind: FailureKind::UnsupportedType,
                        message: "Unsupported file type for b.txt: txt".into(),
                    },
                },
            ],
        }
    }

    #[test]
    fn test_write_json() {
        let mut buffer = Vec::new();
        ReportWriter::new(&mut buffer, OutputFormat::Json, false)
            .write_report(&report())
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value["session"], "sess");
        assert_eq!(value["items"][0]["status"], "processed");
        assert_eq!(value["items"][0]["sequence"], 1);
        assert_eq!(
            value["items"][0]["output"]["location"],
            "sess/h/output/000001_0000abcd.jpg"
        );
        assert_eq!(value["items"][1]["kind"], "unsupported_type");
    }

    #[test]
    fn test_write_jsonl() {
        let mut buffer = Vec::new();
        ReportWriter::new(&mut buffer, OutputFormat::JsonLines, true)
            .write_report(&report())
            .unwrap();

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = output.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["session"], "sess");
        assert_eq!(second["index"], 1);
        assert_eq!(second["status"], "failed");
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("jsonl"), Some(OutputFormat::JsonLines));
        assert_eq!(OutputFormat::parse("NDJSON"), Some(OutputFormat::JsonLines));
        assert_eq!(OutputFormat::parse("invalid"), None);
    }
}
