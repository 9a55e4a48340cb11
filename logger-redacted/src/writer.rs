use std::io::{self, Write};
use std::sync::Arc;

use tracing_subscriber::fmt::MakeWriter;

use crate::redactor::PhiRedactor;

/// `MakeWriter` that redacts PHI from every formatted log line before it
/// reaches stdout.
#[derive(Clone)]
pub struct RedactingMakeWriter {
    redactor: Arc<PhiRedactor>,
}

impl RedactingMakeWriter {
    pub fn new(redactor: PhiRedactor) -> Self {
        Self {
            redactor: Arc::new(redactor),
        }
    }
}

impl<'a> MakeWriter<'a> for RedactingMakeWriter {
    type Writer = RedactingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            redactor: Arc::clone(&self.redactor),
            buf: Vec::new(),
        }
    }
}

/// Buffers one log event, redacts it as a whole on flush/drop.
pub struct RedactingWriter {
    redactor: Arc<PhiRedactor>,
    buf: Vec<u8>,
}

impl Write for RedactingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&self.buf);
        let redacted = self.redactor.redact(&line);
        self.buf.clear();

        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(redacted.as_bytes())?;
        handle.flush()
    }
}

impl Drop for RedactingWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redactor::RedactionConfig;

    #[test]
    fn writer_buffers_until_flush() {
        let make_writer = RedactingMakeWriter::new(PhiRedactor::new(RedactionConfig::default()));
        let mut writer = make_writer.make_writer();
        writer.write_all(b"posting payment for ").unwrap();
        writer.write_all(b"patient@example.com\n").unwrap();
        assert!(!writer.buf.is_empty());
        writer.flush().unwrap();
        assert!(writer.buf.is_empty());
    }
}
