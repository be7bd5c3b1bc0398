//! Streaming JSON writer.
//!
//! Writes tokens straight to the underlying `io::Write` without building a
//! document in memory. Separators and indentation are tracked with a small
//! frame stack, so callers only say what comes next.

use crate::error::{ODataError, Result, SerializationErrorKind};
use std::io::Write;

#[derive(Debug)]
struct Frame {
    has_items: bool,
}

/// Incremental JSON output, compact or pretty (two-space indent).
pub struct JsonWriter<W: Write> {
    writer: W,
    pretty: bool,
    frames: Vec<Frame>,
    after_key: bool,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(writer: W, pretty: bool) -> Self {
        Self {
            writer,
            pretty,
            frames: Vec::new(),
            after_key: false,
        }
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush().map_err(write_error)?;
        Ok(self.writer)
    }

    /// Nesting depth of open objects and arrays.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn begin_object(&mut self) -> Result<()> {
        self.before_value()?;
        self.raw("{")?;
        self.frames.push(Frame { has_items: false });
        Ok(())
    }

    pub fn end_object(&mut self) -> Result<()> {
        self.close("}")
    }

    pub fn begin_array(&mut self) -> Result<()> {
        self.before_value()?;
        self.raw("[")?;
        self.frames.push(Frame { has_items: false });
        Ok(())
    }

    pub fn end_array(&mut self) -> Result<()> {
        self.close("]")
    }

    /// Write an object member name; the next token is its value.
    pub fn key(&mut self, name: &str) -> Result<()> {
        self.separator()?;
        self.string_token(name)?;
        self.raw(if self.pretty { ": " } else { ":" })?;
        self.after_key = true;
        Ok(())
    }

    pub fn string(&mut self, value: &str) -> Result<()> {
        self.before_value()?;
        self.string_token(value)
    }

    pub fn null(&mut self) -> Result<()> {
        self.before_value()?;
        self.raw("null")
    }

    pub fn bool(&mut self, value: bool) -> Result<()> {
        self.before_value()?;
        self.raw(if value { "true" } else { "false" })
    }

    /// Write an already formatted JSON number token.
    pub fn number(&mut self, token: &str) -> Result<()> {
        self.before_value()?;
        self.raw(token)
    }

    /// `key` followed by a string value.
    pub fn string_member(&mut self, name: &str, value: &str) -> Result<()> {
        self.key(name)?;
        self.string(value)
    }

    fn close(&mut self, token: &str) -> Result<()> {
        let frame = self.frames.pop().ok_or_else(|| {
            ODataError::serialization(
                "closing a JSON container",
                SerializationErrorKind::InvalidLiteral("no open container".to_string()),
            )
        })?;
        if frame.has_items && self.pretty {
            self.newline_indent()?;
        }
        self.raw(token)
    }

    fn before_value(&mut self) -> Result<()> {
        if self.after_key {
            self.after_key = false;
            return Ok(());
        }
        self.separator()
    }

    fn separator(&mut self) -> Result<()> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        let needs_comma = frame.has_items;
        frame.has_items = true;
        if needs_comma {
            self.raw(",")?;
        }
        if self.pretty {
            self.newline_indent()?;
        }
        Ok(())
    }

    fn newline_indent(&mut self) -> Result<()> {
        let indent = "  ".repeat(self.frames.len());
        self.raw("\n")?;
        self.raw(&indent)
    }

    fn string_token(&mut self, value: &str) -> Result<()> {
        serde_json::to_writer(&mut self.writer, value).map_err(|e| {
            ODataError::serialization(
                "writing JSON string",
                SerializationErrorKind::Write(std::io::Error::other(e)),
            )
        })
    }

    fn raw(&mut self, token: &str) -> Result<()> {
        self.writer.write_all(token.as_bytes()).map_err(write_error)
    }
}

fn write_error(err: std::io::Error) -> ODataError {
    ODataError::serialization("writing JSON", SerializationErrorKind::Write(err))
}
