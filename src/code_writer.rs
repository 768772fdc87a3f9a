//! Indentation-tracking writer used by every target renderer.
//!
//! Indentation is RAII based: `indent()` hands out a guard and the level drops
//! back when the guard goes out of scope. The level lives in an `Rc<Cell<_>>`
//! so a live guard never holds a borrow of the writer.
//!
//! ```
//! use rpcgen::code_writer::CodeWriter;
//!
//! let mut output = String::new();
//! let mut w = CodeWriter::with_indent_spaces(&mut output, 4);
//! w.block("export interface User", |w| w.writeln("id: string;")).unwrap();
//! assert_eq!(output, "export interface User {\n    id: string;\n}\n");
//! ```

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

pub struct CodeWriter<W> {
    writer: W,
    indent_level: Rc<Cell<usize>>,
    indent_string: String,
    at_line_start: Cell<bool>,
}

impl<W: fmt::Write> CodeWriter<W> {
    pub fn new(writer: W, indent_string: String) -> Self {
        Self {
            writer,
            indent_level: Rc::new(Cell::new(0)),
            indent_string,
            at_line_start: Cell::new(true),
        }
    }

    pub fn with_indent_spaces(writer: W, spaces: usize) -> Self {
        Self::new(writer, " ".repeat(spaces))
    }

    /// Write text without a newline. Adds indentation if at line start.
    pub fn write(&mut self, text: &str) -> fmt::Result {
        if text.is_empty() {
            return Ok(());
        }
        if self.at_line_start.get() && !text.trim().is_empty() {
            for _ in 0..self.indent_level.get() {
                self.writer.write_str(&self.indent_string)?;
            }
            self.at_line_start.set(false);
        }
        self.writer.write_str(text)
    }

    pub fn writeln(&mut self, text: &str) -> fmt::Result {
        self.write(text)?;
        self.writer.write_char('\n')?;
        self.at_line_start.set(true);
        Ok(())
    }

    pub fn blank_line(&mut self) -> fmt::Result {
        self.writer.write_char('\n')?;
        self.at_line_start.set(true);
        Ok(())
    }

    /// Indentation increases while the guard is alive.
    pub fn indent(&mut self) -> IndentGuard {
        self.indent_level.set(self.indent_level.get() + 1);
        IndentGuard {
            indent_level: Rc::clone(&self.indent_level),
        }
    }

    /// Each line is prefixed with the comment marker.
    pub fn doc_comment(&mut self, comment_prefix: &str, text: &str) -> fmt::Result {
        for line in text.lines() {
            if line.trim().is_empty() {
                self.writeln(comment_prefix)?;
            } else {
                self.writeln(&format!("{comment_prefix} {line}"))?;
            }
        }
        Ok(())
    }

    /// Writes "header {", the body one level deeper, then "}".
    pub fn block<F>(&mut self, header: &str, body: F) -> fmt::Result
    where
        F: FnOnce(&mut Self) -> fmt::Result,
    {
        self.block_with_end(header, "}", body)
    }

    /// Like [`CodeWriter::block`] with a custom closing line (`};`, `},` ...).
    pub fn block_with_end<F>(&mut self, header: &str, end: &str, body: F) -> fmt::Result
    where
        F: FnOnce(&mut Self) -> fmt::Result,
    {
        self.writeln(&format!("{header} {{"))?;
        {
            let _indent = self.indent();
            body(self)?;
        }
        self.writeln(end)
    }

    /// Write a multi-line fragment at the current level.
    ///
    /// Fragments keep their own relative indentation; blank lines stay blank.
    pub fn write_fragment(&mut self, fragment: &str) -> fmt::Result {
        for line in fragment.lines() {
            if line.trim().is_empty() {
                self.blank_line()?;
            } else {
                self.writeln(line)?;
            }
        }
        Ok(())
    }

    pub fn indent_level(&self) -> usize {
        self.indent_level.get()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    #[doc(hidden)]
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        let formatted = format!("{args}");
        self.write(&formatted)
    }
}

#[must_use = "indentation is released as soon as the guard is dropped"]
pub struct IndentGuard {
    indent_level: Rc<Cell<usize>>,
}

impl Drop for IndentGuard {
    fn drop(&mut self) {
        self.indent_level.set(self.indent_level.get().saturating_sub(1));
    }
}

/// Indent every line after the first by `spaces`.
///
/// Used to splice a multi-line expression into a line that already sits at
/// some depth inside a fragment.
pub fn indent_tail(text: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    let mut out = String::with_capacity(text.len());
    for (index, line) in text.lines().enumerate() {
        if index > 0 {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&pad);
            }
        }
        out.push_str(line);
    }
    out
}

/// Indent every line by `spaces`.
pub fn indent_all(text: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    text.lines()
        .map(|line| if line.is_empty() { String::new() } else { format!("{pad}{line}") })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_blocks_indent_and_release() {
        let mut out = String::new();
        let mut w = CodeWriter::with_indent_spaces(&mut out, 2);
        w.block("a", |w| {
            w.writeln("b;")?;
            w.block("c", |w| w.writeln("d;"))
        })
        .unwrap();
        w.writeln("e;").unwrap();
        assert_eq!(out, "a {\n  b;\n  c {\n    d;\n  }\n}\ne;\n");
    }

    #[test]
    fn guard_drop_restores_level() {
        let mut out = String::new();
        let mut w = CodeWriter::with_indent_spaces(&mut out, 4);
        {
            let _indent = w.indent();
            assert_eq!(w.indent_level(), 1);
        }
        assert_eq!(w.indent_level(), 0);
    }

    #[test]
    fn fragments_keep_relative_indentation() {
        let mut out = String::new();
        let mut w = CodeWriter::with_indent_spaces(&mut out, 4);
        let _indent = w.indent();
        w.write_fragment("if x {\n    y();\n}\n\nz();").unwrap();
        assert_eq!(out, "    if x {\n        y();\n    }\n\n    z();\n");
    }

    #[test]
    fn doc_comment_keeps_blank_lines_bare() {
        let mut out = String::new();
        let mut w = CodeWriter::with_indent_spaces(&mut out, 4);
        w.doc_comment("///", "first\n\nsecond").unwrap();
        assert_eq!(out, "/// first\n///\n/// second\n");
    }

    #[test]
    fn indent_tail_skips_first_line() {
        assert_eq!(indent_tail("a\nb\n\nc", 2), "a\n  b\n\n  c");
        assert_eq!(indent_all("a\n\nb", 4), "    a\n\n    b");
    }
}
