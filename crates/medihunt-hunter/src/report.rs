//! Report sinks for newly found slots.

use std::io::{self, Write};

use medihunt_core::{FormatOptions, OutputFormat, OutputFormatter, SlotRecord};

use crate::error::HunterResult;

/// Receives each non-empty batch of new slots.
pub trait ReportSink: Send {
    /// Reports a batch. Implementations must make it visible immediately.
    fn report(&mut self, slots: &[SlotRecord]) -> HunterResult<()>;
}

/// Writes rendered batches to any writer, flushing after each batch.
pub struct WriterSink<W> {
    writer: W,
    format: OutputFormat,
    formatter: OutputFormatter,
}

impl WriterSink<io::Stdout> {
    /// A sink writing to standard output.
    pub fn stdout(format: OutputFormat, options: FormatOptions) -> Self {
        Self::new(io::stdout(), format, options)
    }
}

impl<W: Write> WriterSink<W> {
    /// Creates a sink around `writer`.
    pub fn new(writer: W, format: OutputFormat, options: FormatOptions) -> Self {
        Self {
            writer,
            format,
            formatter: OutputFormatter::new(options),
        }
    }

    /// Output format used by this sink.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Returns the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Consumes the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ReportSink for WriterSink<W> {
    fn report(&mut self, slots: &[SlotRecord]) -> HunterResult<()> {
        if slots.is_empty() {
            return Ok(());
        }
        let rendered = self.formatter.render(self.format, slots)?;
        writeln!(self.writer, "{}", rendered)?;
        self.writer.flush()?;
        Ok(())
    }
}
