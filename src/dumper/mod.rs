//! Rendering of a parsed [`Config`] back to nginx configuration text.
//!
//! Output keeps comments, directive order and the line layout of multi-line
//! parameter lists; whitespace elsewhere follows the [`Style`].
//!
//! ```
//! use nginx_conf::dumper::{Style, dump_config};
//! use nginx_conf::nginx_conf_parser::parse_string;
//!
//! let config = parse_string("http { server { listen 80; } }").unwrap();
//! assert_eq!(
//!     dump_config(&config, &Style::indented()),
//!     "http {\n    server {\n        listen 80;\n    }\n}"
//! );
//! ```

mod foreign;
mod style;

pub use foreign::{CodeFormatter, ExternalFormatter, Reindent};
pub use style::Style;

use crate::ast::{Block, Config, Include, InlineComment, NodeKind, NodeRef};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub fn dump_config(config: &Config, style: &Style) -> String {
    dump_block(config, &config.root, style)
}

/// Renders the directives of `block`, which must belong to `config`.
pub fn dump_block(config: &Config, block: &Block, style: &Style) -> String {
    if let Some(code) = &block.foreign_code {
        return foreign::dump_foreign_code(code, style);
    }

    let mut children: Vec<NodeRef> = block
        .directives
        .iter()
        .filter_map(|&id| config.get(id))
        .collect();
    if style.sort_directives {
        children.sort_by(|a, b| a.name().cmp(b.name()));
    }

    let padding = style.padding();
    let mut lines: Vec<String> = Vec::with_capacity(children.len() + block.trailing_comments.len());
    for child in children {
        let mut out = String::new();
        if style.debug {
            out.push_str(&format!("#{},{}\n", child.name(), child.has_block()));
        }
        out.push_str(&dump_directive(child, style));
        lines.push(out);
    }
    lines.extend(
        block
            .trailing_comments
            .iter()
            .map(|comment| format!("{}{}", padding, comment)),
    );

    lines.join("\n")
}

pub fn dump_directive(node: NodeRef<'_>, style: &Style) -> String {
    let mut out = String::new();
    let padding = style.padding();

    if style.space_before_blocks && node.has_block() {
        out.push('\n');
    }
    for comment in &node.directive.comment {
        out.push_str(&padding);
        out.push_str(comment);
        out.push('\n');
    }
    out.push_str(&padding);
    out.push_str(node.name());

    // Parameters go back to their relative lines. `line` counts the lines
    // written so far, newlines inside quoted values included.
    let continuation = format!("{}{}", padding, " ".repeat(style.indent));
    let mut comments = InlineComments::new(&node.directive.inline_comments);
    let mut line = 0;
    let mut line_started = true;
    for parameter in node.parameters().iter() {
        while line < parameter.relative_line_index {
            comments.write_line(line, line_started, &continuation, &mut out);
            out.push('\n');
            line += 1;
            line_started = false;
        }
        if line_started {
            out.push(' ');
        } else {
            out.push_str(&continuation);
            line_started = true;
        }
        out.push_str(&parameter.value);
        line += parameter.value.matches('\n').count();
    }

    let block = match &node.kind {
        NodeKind::ForeignCode(foreign) => Some(foreign::dump_foreign_code(&foreign.code, &style.nested())),
        _ => node
            .block()
            .map(|block| dump_block(node.config(), block, &style.nested())),
    };
    match block {
        Some(body) => {
            out.push_str(" {\n");
            out.push_str(&body);
            out.push('\n');
            out.push_str(&padding);
            out.push('}');
        }
        None if !node.name().is_empty() => out.push(';'),
        None => {}
    }
    comments.write_rest(&mut out);

    out
}

/// Renders every file resolved by `include`, keyed by file path.
pub fn dump_include(include: &Include, style: &Style) -> BTreeMap<PathBuf, String> {
    include
        .resolved_configs
        .iter()
        .map(|config| (config.file_path.clone(), dump_config(config, style)))
        .collect()
}

/// Renders all files reached through `include` directives of `config`,
/// including nested ones.
pub fn dump_includes(config: &Config, style: &Style) -> BTreeMap<PathBuf, String> {
    let mut files = BTreeMap::new();
    for node in config.all_directives() {
        if let Some(include) = node.as_include() {
            files.extend(dump_include(include, style));
        }
    }
    files
}

/// Inline comments of one directive, written in line order.
struct InlineComments<'a> {
    pending: Vec<&'a InlineComment>,
    next: usize,
}

impl<'a> InlineComments<'a> {
    fn new(comments: &'a [InlineComment]) -> Self {
        let mut pending: Vec<&InlineComment> = comments.iter().collect();
        pending.sort_by_key(|c| c.relative_line_index);
        Self { pending, next: 0 }
    }

    /// Writes the comments of `line` and of any line before it. A line with
    /// nothing on it yet starts with `indent`.
    fn write_line(&mut self, line: usize, line_started: bool, indent: &str, out: &mut String) {
        let mut line_started = line_started;
        while let Some(comment) = self.pending.get(self.next)
            && comment.relative_line_index <= line
        {
            if line_started {
                out.push(' ');
            } else {
                out.push_str(indent);
                line_started = true;
            }
            out.push_str(&comment.value);
            self.next += 1;
        }
    }

    fn write_rest(&mut self, out: &mut String) {
        self.write_line(usize::MAX, true, "", out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Directive, Node, Parameter, Upstream, UpstreamServer};

    fn dump(source: &str, style: &Style) -> String {
        let config = nginx_conf_parser::parse_string(source).unwrap();
        dump_config(&config, style)
    }

    #[test]
    fn test_dump_simple_directives() {
        let cases = [
            ("server_name example.dev example.local example.com;", "server_name example.dev example.local example.com;"),
            ("proxy_pass http://127.0.0.1/;", "proxy_pass http://127.0.0.1/;"),
            ("proxy_set_header Host $host;", "proxy_set_header Host $host;"),
            ("proxy_buffers 4 32k;", "proxy_buffers 4 32k;"),
            ("charset   koi8-r ;", "charset koi8-r;"),
        ];
        for (source, want) in cases {
            assert_eq!(dump(source, &Style::no_indent()), want, "source: {}", source);
        }
    }

    #[test]
    fn test_dump_empty_blocks() {
        assert_eq!(dump("http {}", &Style::no_indent()), "http {\n\n}");
        assert_eq!(dump("server {}", &Style::no_indent()), "server {\n\n}");
        assert_eq!(
            dump("location /admin {}", &Style::no_indent()),
            "location /admin {\n\n}"
        );
    }

    #[test]
    fn test_dump_indented_block() {
        let source = "http { access_log logs/access.log main; default_type application/octet-stream; }";
        assert_eq!(
            dump(source, &Style::indented()),
            "http {\n    access_log logs/access.log main;\n    default_type application/octet-stream;\n}"
        );
    }

    #[test]
    fn test_dump_sorted_and_spaced() {
        let source = "user nginx nginx;\nworker_processes 5;\ninclude /etc/nginx/conf/*.conf;\nserver {\nuser nginx nginx;\nworker_processes 5;\ninclude /etc/nginx/conf/*.conf;\n}";
        let options = nginx_conf_parser::ParseOptions::default().with_skip_validation();
        let config = nginx_conf_parser::parse_string_with(source, &options).unwrap();

        assert_eq!(dump_config(&config, &Style::no_indent()), source);
        assert_eq!(
            dump_config(&config, &Style::no_indent_sorted()),
            "include /etc/nginx/conf/*.conf;\nserver {\ninclude /etc/nginx/conf/*.conf;\nuser nginx nginx;\nworker_processes 5;\n}\nuser nginx nginx;\nworker_processes 5;"
        );
        assert_eq!(
            dump_config(&config, &Style::no_indent_sorted_space()),
            "include /etc/nginx/conf/*.conf;\n\nserver {\ninclude /etc/nginx/conf/*.conf;\nuser nginx nginx;\nworker_processes 5;\n}\nuser nginx nginx;\nworker_processes 5;"
        );
    }

    #[test]
    fn test_sorting_is_stable() {
        let source = "upstream b { server 2.2.2.2; }\nupstream a { server 1.1.1.1; }\nhttp { server { listen 2; } server { listen 1; } }";
        let output = dump(source, &Style::no_indent_sorted());
        assert_eq!(
            output,
            "http {\nserver {\nlisten 2;\n}\nserver {\nlisten 1;\n}\n}\nupstream b {\nserver 2.2.2.2;\n}\nupstream a {\nserver 1.1.1.1;\n}"
        );
    }

    #[test]
    fn test_dump_upstream() {
        let source = "upstream backend_upstream {\n    server 127.0.0.1:9005;\n    server 127.0.0.2:9005 weight=4 down;\n}";
        assert_eq!(
            dump(source, &Style::no_indent()),
            "upstream backend_upstream {\nserver 127.0.0.1:9005;\nserver 127.0.0.2:9005 weight=4 down;\n}"
        );
    }

    #[test]
    fn test_dump_location_with_modifier() {
        assert_eq!(
            dump("location ~* \\.php$ { fastcgi_pass unix:/run/php.sock; }", &Style::indented()),
            "location ~* \\.php$ {\n    fastcgi_pass unix:/run/php.sock;\n}"
        );
    }

    #[test]
    fn test_dump_comments() {
        let source = "# main\nworker_processes 4; # workers\nevents {\n    # tuning\n    worker_connections 512;\n    # use epoll;\n} # events\n# end\n";
        assert_eq!(
            dump(source, &Style::indented()),
            "# main\nworker_processes 4; # workers\nevents {\n    # tuning\n    worker_connections 512;\n    # use epoll;\n} # events\n# end"
        );
    }

    #[test]
    fn test_dump_multi_line_parameters() {
        let source = "log_format main '$remote_addr' # address\n    '$status'\n    '$body_bytes_sent';";
        assert_eq!(
            dump(source, &Style::indented()),
            "log_format main '$remote_addr' # address\n    '$status'\n    '$body_bytes_sent';"
        );

        let source = "http {\n    rewrite ^/old/(.*)$\n        /new/$1 permanent;\n}";
        assert_eq!(dump(source, &Style::indented()), source);
    }

    /// Parameter and inline comment line indexes of every directive.
    fn line_layout(config: &Config) -> Vec<(String, Vec<(String, usize)>, Vec<(String, usize)>)> {
        config
            .all_directives()
            .map(|node| {
                let parameters = node
                    .parameters()
                    .iter()
                    .map(|p| (p.value.clone(), p.relative_line_index))
                    .collect();
                let comments = node
                    .directive
                    .inline_comments
                    .iter()
                    .map(|c| (c.value.clone(), c.relative_line_index))
                    .collect();
                (node.name().to_string(), parameters, comments)
            })
            .collect()
    }

    #[test]
    fn test_line_layout_survives_dump() {
        let sources = [
            "log_format main 'a\nb' c;",
            "rewrite ^/a\n\n    /b;",
            "log_format main '$remote_addr' # address\n    '$status'\n\n    # gap\n    '$body_bytes_sent';",
            "http {\n    add_header X-A \"1\n2\n3\"\n        always;\n    listen 80; # port\n}",
        ];
        for source in sources {
            let first = nginx_conf_parser::parse_string(source).unwrap();
            let dumped = dump_config(&first, &Style::indented());
            let second = nginx_conf_parser::parse_string(&dumped).unwrap();
            assert_eq!(line_layout(&first), line_layout(&second), "dumped: {}", dumped);
        }
    }

    #[test]
    fn test_dump_keeps_blank_lines_in_parameters() {
        assert_eq!(
            dump("rewrite ^/a\n\n    /b;", &Style::indented()),
            "rewrite ^/a\n\n    /b;"
        );
        assert_eq!(
            dump("log_format main 'a\nb' c;", &Style::indented()),
            "log_format main 'a\nb' c;"
        );
    }

    #[test]
    fn test_dump_lua_block() {
        let source = "server {\n  location / {\n    content_by_lua_block {\n      local a = 1\n      # comment\n      ngx.say(a)\n    }\n  }\n}";
        assert_eq!(
            dump(source, &Style::indented()),
            "server {\n    location / {\n        content_by_lua_block {\n            local a = 1\n            # comment\n            ngx.say(a)\n        }\n    }\n}"
        );
    }

    #[test]
    fn test_dump_debug_annotations() {
        let style = Style {
            debug: true,
            ..Style::no_indent()
        };
        assert_eq!(
            dump("events { worker_connections 1; }", &style),
            "#events,true\nevents {\n#worker_connections,false\nworker_connections 1;\n}"
        );
    }

    #[test]
    fn test_dump_is_stable() {
        let source = "# top\nhttp {\n    include mime.types;\n    server {\n        listen 80; # plain\n        location = /x {\n            return 200\n                \"ok\";\n        }\n    }\n}";
        let once = dump(source, &Style::indented());
        assert_eq!(once, source);
        assert_eq!(dump(&once, &Style::indented()), once);
    }

    #[test]
    fn test_dump_built_document() {
        let mut config = Config::default();
        let http = config.add_node(None, Node::with_block("http", Vec::<String>::new())).unwrap();
        let upstream = Node::new(
            Directive::new("upstream"),
            NodeKind::Upstream(Upstream {
                name: "backend".to_string(),
                block: Block::new(),
            }),
        );
        let upstream = config.add_node(Some(http), upstream).unwrap();
        config
            .add_upstream_server(upstream, UpstreamServer::new("10.0.0.1:80").with_flag("backup"))
            .unwrap();
        let mut directive = Directive::new("keepalive");
        directive.parameters.push(Parameter::new("16"));
        config
            .add_node(Some(upstream), Node::new(directive, NodeKind::Directive(None)))
            .unwrap();

        assert_eq!(
            dump_config(&config, &Style::indented()),
            "http {\n    upstream backend {\n        server 10.0.0.1:80 backup;\n        keepalive 16;\n    }\n}"
        );
    }

    #[test]
    fn test_dump_include_without_resolution() {
        let config = nginx_conf_parser::parse_string("include /etc/nginx/conf.d/*.conf;").unwrap();
        assert_eq!(
            dump_config(&config, &Style::no_indent()),
            "include /etc/nginx/conf.d/*.conf;"
        );
        assert!(dump_includes(&config, &Style::no_indent()).is_empty());
    }
}
