//! Rendering of embedded script code (`*_by_lua_block` bodies).
//!
//! The body is handed to a [`CodeFormatter`] and the result is indented to
//! the depth of the enclosing block. nginx-style `#` comment lines may not be
//! valid in the embedded language, so before formatting they are rewritten
//! to start with the formatter's own comment marker and restored afterwards.

use super::Style;
use serde::Deserialize;
use std::io::Write;
use std::process::{Command, Stdio};

/// Formats the body of an embedded code block.
pub trait CodeFormatter: Send + Sync {
    /// Line comment marker of the embedded language.
    fn comment_marker(&self) -> &str {
        "#"
    }

    /// Returns `code` laid out without base indentation.
    fn format(&self, code: &str) -> Result<String, String>;
}

/// Keeps the code as written, only removing the indentation shared by all
/// of its lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reindent;

impl CodeFormatter for Reindent {
    fn format(&self, code: &str) -> Result<String, String> {
        Ok(dedent(code))
    }
}

/// Pipes the code through an external program such as `stylua -`.
///
/// The program reads the code on stdin and writes the formatted code to
/// stdout. A non-zero exit status is a formatting error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalFormatter {
    /// Program followed by its arguments.
    pub command: Vec<String>,
    #[serde(default = "default_comment_marker")]
    pub comment_marker: String,
}

fn default_comment_marker() -> String {
    "--".to_string()
}

impl ExternalFormatter {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            comment_marker: default_comment_marker(),
        }
    }

    /// StyLua reading from stdin.
    pub fn stylua() -> Self {
        Self::new(["stylua", "-"])
    }

    pub fn with_comment_marker(mut self, marker: impl Into<String>) -> Self {
        self.comment_marker = marker.into();
        self
    }
}

impl CodeFormatter for ExternalFormatter {
    fn comment_marker(&self) -> &str {
        &self.comment_marker
    }

    fn format(&self, code: &str) -> Result<String, String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or("empty formatter command")?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to run {}: {}", program, e))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(code.as_bytes())
                .map_err(|e| format!("failed to write to {}: {}", program, e))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| format!("failed to run {}: {}", program, e))?;
        if !output.status.success() {
            return Err(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        let formatted = String::from_utf8(output.stdout).map_err(|e| e.to_string())?;
        Ok(dedent(&formatted))
    }
}

pub(crate) fn dump_foreign_code(code: &str, style: &Style) -> String {
    let formatter = style.code_formatter.as_ref();
    let marker = formatter.comment_marker();

    let formatted = match formatter.format(&hide_comments(code, marker)) {
        Ok(formatted) => restore_comments(&formatted, marker),
        Err(e) => {
            log::warn!("failed to format embedded code, keeping it as written: {}", e);
            dedent(code)
        }
    };

    let padding = style.padding();
    formatted
        .trim_end_matches('\n')
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{}{}", padding, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn hide_comments(code: &str, marker: &str) -> String {
    if marker == "#" {
        return code.to_string();
    }
    map_lines(code, |line| {
        let body = line.trim_start();
        if body.starts_with('#') {
            let indent = &line[..line.len() - body.len()];
            format!("{}{}{}", indent, marker, body)
        } else {
            line.to_string()
        }
    })
}

fn restore_comments(code: &str, marker: &str) -> String {
    if marker == "#" {
        return code.to_string();
    }
    let hidden = format!("{}#", marker);
    map_lines(code, |line| {
        let body = line.trim_start();
        match body.strip_prefix(hidden.as_str()) {
            Some(rest) => format!("{}#{}", &line[..line.len() - body.len()], rest),
            None => line.to_string(),
        }
    })
}

fn map_lines(code: &str, f: impl Fn(&str) -> String) -> String {
    code.split('\n').map(f).collect::<Vec<_>>().join("\n")
}

/// Strips blank leading and trailing lines and the common indentation.
pub(crate) fn dedent(code: &str) -> String {
    let lines: Vec<&str> = code.lines().collect();
    let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return String::new();
    };
    let last = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(first);
    let lines = &lines[first..=last];

    let leading = |l: &str| l.chars().take_while(|c| c.is_whitespace()).count();
    let common = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| leading(l))
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|l| {
            if l.trim().is_empty() {
                String::new()
            } else {
                l.chars().skip(common).collect::<String>().trim_end().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LuaLike;

    impl CodeFormatter for LuaLike {
        fn comment_marker(&self) -> &str {
            "--"
        }

        fn format(&self, code: &str) -> Result<String, String> {
            assert!(!code.lines().any(|l| l.trim_start().starts_with('#')));
            Ok(dedent(code))
        }
    }

    struct Broken;

    impl CodeFormatter for Broken {
        fn format(&self, _code: &str) -> Result<String, String> {
            Err("syntax error".to_string())
        }
    }

    #[test]
    fn test_dedent() {
        let code = "\n        local a = 1\n          if a then\n        end\n    ";
        assert_eq!(dedent(code), "local a = 1\n  if a then\nend");
        assert_eq!(dedent("   \n  "), "");
    }

    #[test]
    fn test_dump_foreign_code_indents_lines() {
        let style = Style::indented().nested().nested();
        let code = "\n    ngx.say('a')\n\n    ngx.say('b')\n";
        assert_eq!(
            dump_foreign_code(code, &style),
            "        ngx.say('a')\n\n        ngx.say('b')"
        );
    }

    #[test]
    fn test_comments_are_tunneled_through_formatter() {
        let style = Style::no_indent().with_code_formatter(LuaLike);
        let code = "\n  # nginx comment\n  -- lua comment\n  ngx.exit(200)\n";
        assert_eq!(
            dump_foreign_code(code, &style),
            "# nginx comment\n-- lua comment\nngx.exit(200)"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_external_formatter_round_trips_comments() {
        // `cat` sees the hidden comment and hands it back unchanged.
        let style = Style::indented()
            .nested()
            .with_code_formatter(ExternalFormatter::new(["cat"]));
        let code = "\n  # nginx comment\n  ngx.say(1)\n";
        assert_eq!(
            dump_foreign_code(code, &style),
            "    # nginx comment\n    ngx.say(1)"
        );
        assert_eq!(hide_comments(code, "--"), "\n  --# nginx comment\n  ngx.say(1)\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_external_formatter_failure() {
        let formatter = ExternalFormatter::new(["false"]);
        assert!(formatter.format("return 1").is_err());

        let style = Style::no_indent().with_code_formatter(formatter);
        assert_eq!(dump_foreign_code("\n  return 1\n", &style), "return 1");
    }

    #[test]
    fn test_external_formatter_missing_program() {
        let formatter = ExternalFormatter::new(["nginx-conf-no-such-formatter"]);
        let err = formatter.format("return 1").unwrap_err();
        assert!(err.starts_with("failed to run nginx-conf-no-such-formatter"));
        assert!(ExternalFormatter::new(Vec::<String>::new()).format("").is_err());
        assert_eq!(ExternalFormatter::stylua().comment_marker(), "--");
    }

    #[test]
    fn test_formatter_error_keeps_code() {
        let style = Style::no_indent().with_code_formatter(Broken);
        assert_eq!(dump_foreign_code("\n  return 1\n", &style), "return 1");
    }
}
