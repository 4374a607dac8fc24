//! JSON-lines record of every processed frame.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use line_vision::FrameReport;
use serde::Serialize;

#[derive(Serialize)]
struct ReportLine<'a> {
    sequence: u64,
    timestamp_ms: i64,
    wall_time: String,
    #[serde(flatten)]
    report: &'a FrameReport,
}

pub(crate) struct ReportSink<W: Write = BufWriter<File>> {
    writer: W,
    lines: u64,
}

impl ReportSink {
    pub(crate) fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create report file {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> ReportSink<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    pub(crate) fn write(
        &mut self,
        sequence: u64,
        timestamp_ms: i64,
        report: &FrameReport,
    ) -> Result<()> {
        let line = ReportLine {
            sequence,
            timestamp_ms,
            wall_time: chrono::Utc::now().to_rfc3339(),
            report,
        };
        serde_json::to_writer(&mut self.writer, &line).context("failed to encode frame report")?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    pub(crate) fn lines(&self) -> u64 {
        self.lines
    }

    pub(crate) fn finish(mut self) -> Result<W> {
        self.writer.flush().context("failed to flush frame reports")?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use line_vision::IntersectionState;
    use serde_json::Value;

    use super::*;

    fn empty_report() -> FrameReport {
        FrameReport {
            line_found: false,
            chosen: None,
            steering: None,
            state: IntersectionState::TwoWayBranch,
            decision: None,
            marker_pixels: 12,
            cut_discarded: false,
            command_sent: false,
            motor: None,
        }
    }

    #[test]
    fn one_flat_json_object_per_line() {
        let mut sink = ReportSink::new(Vec::new());
        sink.write(3, 1_000, &empty_report()).unwrap();
        sink.write(4, 1_033, &empty_report()).unwrap();
        assert_eq!(sink.lines(), 2);

        let bytes = sink.finish().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["sequence"], 3);
        assert_eq!(first["timestamp_ms"], 1_000);
        assert_eq!(first["marker_pixels"], 12);
        assert_eq!(first["line_found"], false);
        assert!(first["wall_time"].is_string());
    }
}
