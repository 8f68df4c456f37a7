//! Globals and string-literal emission
//!
//! String literals are interned into a label-per-spelling map during
//! function emission and written out once at the end of the translation
//! unit, after the `.comm` block for file-scope variables.

use super::platform::GLOBAL_PREFIX;
use super::{CodeGen, CodeGenError};
use crate::scope::SymbolId;
use std::fmt::Write as _;

/// Escape a decoded string for an `.asciz` directive.
fn escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'"' => result.push_str("\\\""),
            b'\\' => result.push_str("\\\\"),
            b'\n' => result.push_str("\\n"),
            b'\t' => result.push_str("\\t"),
            b'\r' => result.push_str("\\r"),
            0x20..=0x7e => result.push(byte as char),
            _ => {
                let _ = write!(result, "\\{:03o}", byte);
            }
        }
    }
    result
}

impl CodeGen<'_> {
    /// Label for a string literal, interning it on first sight.
    pub(super) fn string_label(&mut self, literal: &str) -> usize {
        if let Some(&label) = self.strings.get(literal) {
            return label;
        }
        let label = self.new_label();
        self.strings.insert(literal.to_string(), label);
        label
    }

    /// Emit `.comm` definitions for file-scope variables, then the string
    /// table.
    pub(super) fn generate_globals(&mut self, globals: &[SymbolId]) -> Result<(), CodeGenError> {
        for &id in globals {
            let symbol = &self.symbols[id];
            if symbol.ty.is_function() {
                continue;
            }
            writeln!(
                self.output,
                "\t.comm\t{}{}, {}",
                GLOBAL_PREFIX,
                symbol.name,
                symbol.ty.size()
            )?;
        }

        if !self.strings.is_empty() {
            writeln!(self.output, "\t.data")?;
            for (literal, label) in &self.strings {
                writeln!(self.output, ".L{}:\t.asciz\t\"{}\"", label, escape(literal))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_passthrough() {
        assert_eq!(escape("hello, world"), "hello, world");
    }

    #[test]
    fn test_escape_specials() {
        assert_eq!(escape("a\"b\\c"), "a\\\"b\\\\c");
        assert_eq!(escape("line\n\tend"), "line\\n\\tend");
    }

    #[test]
    fn test_escape_nonprintable_octal() {
        assert_eq!(escape("\x01"), "\\001");
        assert_eq!(escape("\x7f"), "\\177");
    }
}
