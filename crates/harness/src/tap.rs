use std::io::{self, Write};

use crate::{AssertionRecord, Harness};

/// TAP (Test Anything Protocol) v14 output.
///
/// Unlike a buffering reporter, lines are written as soon as the engine
/// produces them, so a plan announced upfront appears before the first
/// `ok` line and a deferred plan appears after the last one.
pub struct TapWriter<W: Write> {
    out: W,
    header_written: bool,
    pass: usize,
    fail: usize,
}

impl TapWriter<io::Stdout> {
    pub fn stdout() -> Self {
        TapWriter::new(io::stdout())
    }
}

impl<W: Write> TapWriter<W> {
    pub fn new(out: W) -> Self {
        TapWriter {
            out,
            header_written: false,
            pass: 0,
            fail: 0,
        }
    }

    fn header(&mut self) -> io::Result<()> {
        if !self.header_written {
            writeln!(self.out, "TAP version 14")?;
            self.header_written = true;
        }
        Ok(())
    }

    pub fn failure_count(&self) -> usize {
        self.fail
    }

    /// Write the closing tally and hand back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.header()?;
        writeln!(self.out, "# tests {}", self.pass + self.fail)?;
        writeln!(self.out, "# pass  {}", self.pass)?;
        writeln!(self.out, "# fail  {}", self.fail)?;
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> Harness for TapWriter<W> {
    fn plan(&mut self, count: usize) -> io::Result<()> {
        self.header()?;
        writeln!(self.out, "1..{}", count)
    }

    fn assertion(&mut self, record: &AssertionRecord) -> io::Result<()> {
        self.header()?;
        let status = if record.passed { "ok" } else { "not ok" };
        let mut line = format!("{} {}", status, record.sequence);
        if !record.description.is_empty() {
            line.push_str(" - ");
            line.push_str(&escape_description(&record.description));
        }
        if let Some(reason) = &record.skip {
            line.push_str(" # SKIP ");
            line.push_str(&continue_as_comment(reason));
        }
        writeln!(self.out, "{}", line)?;

        if record.passed {
            self.pass += 1;
        } else {
            self.fail += 1;
            if let Some(diag) = &record.diagnostic {
                for line in diag.lines() {
                    writeln!(self.out, "  # {}", line)?;
                }
            }
        }
        Ok(())
    }

    fn diag(&mut self, message: &str) -> io::Result<()> {
        self.header()?;
        for line in message.lines() {
            writeln!(self.out, "# {}", line)?;
        }
        Ok(())
    }

    fn summary(&mut self, count: usize) -> io::Result<()> {
        self.header()?;
        writeln!(self.out, "1..{}", count)
    }
}

/// `\` and `#` are escaped so neither can start a directive. Embedded
/// newlines continue as comment lines so they cannot forge a test line.
fn escape_description(description: &str) -> String {
    continue_as_comment(&description.replace('\\', "\\\\").replace('#', "\\#"))
}

fn continue_as_comment(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\n# ")
}
