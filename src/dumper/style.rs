use super::foreign::{CodeFormatter, Reindent};
use std::fmt;
use std::sync::Arc;

/// Layout options for the dumper.
///
/// Every nesting level is rendered with [`Style::nested`], which shifts
/// `start_indent` by `indent`.
#[derive(Clone)]
pub struct Style {
    /// Emit children in stable name order instead of document order.
    pub sort_directives: bool,
    /// Put an empty line before every directive that has a block.
    pub space_before_blocks: bool,
    pub start_indent: usize,
    pub indent: usize,
    /// Prefix each directive with a `#name,has_block` line.
    pub debug: bool,
    /// Formatter for embedded script blocks such as `content_by_lua_block`.
    pub code_formatter: Arc<dyn CodeFormatter>,
}

impl Style {
    /// Four spaces per level, document order.
    pub fn indented() -> Self {
        Self {
            sort_directives: false,
            space_before_blocks: false,
            start_indent: 0,
            indent: 4,
            debug: false,
            code_formatter: Arc::new(Reindent),
        }
    }

    pub fn no_indent() -> Self {
        Self {
            indent: 0,
            ..Self::indented()
        }
    }

    pub fn no_indent_sorted() -> Self {
        Self {
            sort_directives: true,
            ..Self::no_indent()
        }
    }

    pub fn no_indent_sorted_space() -> Self {
        Self {
            space_before_blocks: true,
            ..Self::no_indent_sorted()
        }
    }

    pub fn with_code_formatter(mut self, formatter: impl CodeFormatter + 'static) -> Self {
        self.code_formatter = Arc::new(formatter);
        self
    }

    /// Style for the contents of a block.
    pub fn nested(&self) -> Self {
        Self {
            start_indent: self.start_indent + self.indent,
            ..self.clone()
        }
    }

    pub(crate) fn padding(&self) -> String {
        " ".repeat(self.start_indent)
    }
}

impl Default for Style {
    fn default() -> Self {
        Self::indented()
    }
}

impl fmt::Debug for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Style")
            .field("sort_directives", &self.sort_directives)
            .field("space_before_blocks", &self.space_before_blocks)
            .field("start_indent", &self.start_indent)
            .field("indent", &self.indent)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_shifts_start_indent() {
        let style = Style::indented();
        let nested = style.nested();
        assert_eq!(nested.start_indent, 4);
        assert_eq!(nested.indent, 4);
        assert_eq!(nested.nested().start_indent, 8);
        assert_eq!(nested.nested().padding(), "        ");
    }

    #[test]
    fn test_nested_keeps_flags() {
        let style = Style {
            debug: true,
            ..Style::no_indent_sorted_space()
        };
        let nested = style.nested();
        assert_eq!(nested.start_indent, 0);
        assert!(nested.sort_directives);
        assert!(nested.space_before_blocks);
        assert!(nested.debug);
    }

    #[test]
    fn test_predefined_styles() {
        assert_eq!(Style::default().indent, 4);
        assert_eq!(Style::no_indent().indent, 0);
        assert!(!Style::no_indent().sort_directives);
        assert!(Style::no_indent_sorted().sort_directives);
        assert!(!Style::no_indent_sorted().space_before_blocks);
        assert!(Style::no_indent_sorted_space().space_before_blocks);
    }
}
