//! Document model for nginx configuration files.
//!
//! A parsed file is a [`Config`]: an arena of [`Node`]s addressed by
//! [`NodeId`], plus the root [`Block`] listing the top-level nodes in source
//! order. Parent and child links are stored as ids, so the tree holds no
//! reference cycles and the arena owns every node.
//!
//! # Structure
//!
//! ```text
//! Config
//!  ├─ nodes: Vec<Node>                (arena, indexed by NodeId)
//!  └─ root: Block
//!       └─ directives: Vec<NodeId>    (source order)
//!
//! Node
//!  ├─ directive: Directive            (name, parameters, comments, parent, line)
//!  └─ kind: NodeKind
//!       ├─ Directive(Option<Block>)   generic `name args;` or `name args { … }`
//!       ├─ Http(Block)
//!       ├─ Server(Block)
//!       ├─ Location { modifier, pattern, block }
//!       ├─ Upstream { name, block }
//!       ├─ UpstreamServer { address, named_parameters, flags }
//!       ├─ Include { include_path, resolved_configs }
//!       └─ ForeignCode { code }       `content_by_lua_block { … }`
//! ```
//!
//! Typed variants own the values that used to be their parameters (a
//! [`Location`] keeps its modifier and pattern, an [`UpstreamServer`] its
//! address, flags and `key=value` pairs). [`Node::parameters`] renders them
//! back, so editing the typed fields is reflected when the tree is dumped.
//!
//! # Example
//!
//! ```
//! use nginx_conf_parser::parse_string;
//!
//! let config = parse_string("http { server { listen 80; } }").unwrap();
//! let listen = config.find_directives("listen").remove(0);
//!
//! assert_eq!(listen.parameter_values(), vec!["80"]);
//! assert_eq!(listen.parent().unwrap().name(), "server");
//! ```
//!
//! # Editing
//!
//! Nodes can be changed in place through [`Config::node_mut`] and new nodes
//! linked with [`Config::add_node`]. Edits are not re-validated: removing an
//! id from a block does not detach the node, and arity rules checked by the
//! parser are not enforced again. Dumping an edited tree is always allowed.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// A position (line, column, byte offset) in the source text.
///
/// Lines and columns are 1-based; `offset` is a 0-based byte offset suitable
/// for slicing the original source string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
    /// 0-based byte offset in the source string.
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

/// Index of a [`Node`] inside the [`Config`] that owns it.
///
/// Ids are only meaningful for the config that produced them; nodes of an
/// included file live in the included [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A single directive parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter text as written (quoted strings keep their quotes).
    pub value: String,
    /// Line offset from the directive's first line.
    pub relative_line_index: usize,
}

impl Parameter {
    /// Creates a parameter on the directive's first line.
    pub fn new(value: impl Into<String>) -> Self {
        Self::on_line(value, 0)
    }

    pub fn on_line(value: impl Into<String>, relative_line_index: usize) -> Self {
        Self {
            value: value.into(),
            relative_line_index,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<&str> for Parameter {
    fn from(value: &str) -> Self {
        Parameter::new(value)
    }
}

impl From<String> for Parameter {
    fn from(value: String) -> Self {
        Parameter::new(value)
    }
}

/// A comment sharing a line with part of a directive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InlineComment {
    /// Comment text including the leading `#`.
    pub value: String,
    /// Line offset from the directive's first line.
    pub relative_line_index: usize,
}

impl InlineComment {
    pub fn new(value: impl Into<String>, relative_line_index: usize) -> Self {
        Self {
            value: value.into(),
            relative_line_index,
        }
    }
}

/// Fields shared by every node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Directive {
    /// Directive name as written (`listen`, `server`, `'~*\.jpg$'` inside a map).
    pub name: String,
    /// Parameters of generic nodes. Typed variants keep theirs in the variant.
    pub parameters: Vec<Parameter>,
    /// Outline comments: whole-line comments directly above the directive.
    pub comment: Vec<String>,
    /// Comments sharing a line with the directive, ordered by position.
    pub inline_comments: Vec<InlineComment>,
    /// Enclosing block directive, `None` at the top level of a file.
    pub parent: Option<NodeId>,
    /// 1-based source line of the directive name, `0` for built nodes.
    pub line: usize,
}

impl Directive {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Appends parameters on the directive's first line.
    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters
            .extend(parameters.into_iter().map(Parameter::new));
        self
    }

    /// Check if directive has a specific name
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }
}

/// Body of a `{ … }` directive.
///
/// A block holds either child directives or, exclusively, a verbatim
/// foreign code payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    /// Child nodes in source order.
    pub directives: Vec<NodeId>,
    /// Verbatim code captured for embedded script blocks.
    pub foreign_code: Option<String>,
    /// Comments after the last child, before the closing brace.
    pub trailing_comments: Vec<String>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a block holding verbatim code instead of directives.
    pub fn foreign(code: impl Into<String>) -> Self {
        Self {
            foreign_code: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn is_foreign_code(&self) -> bool {
        self.foreign_code.is_some()
    }
}

/// `location [modifier] pattern { … }`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    /// `=`, `~`, `~*` or `^~` when present.
    pub modifier: Option<String>,
    pub pattern: String,
    pub block: Block,
}

impl Location {
    pub fn parameters(&self) -> Vec<Parameter> {
        self.modifier
            .iter()
            .chain(std::iter::once(&self.pattern))
            .map(|value| Parameter::new(value.as_str()))
            .collect()
    }
}

/// `upstream name { … }`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Upstream {
    pub name: String,
    pub block: Block,
}

/// A `server` entry inside an `upstream` block.
///
/// `server 127.0.0.1:9005 weight=5 down;` has the address `127.0.0.1:9005`,
/// the named parameter `weight=5` and the flag `down`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpstreamServer {
    pub address: String,
    /// `key=value` parameters, rendered sorted by key.
    pub named_parameters: BTreeMap<String, String>,
    /// Bare flags such as `backup` or `down`, rendered in insertion order.
    pub flags: Vec<String>,
}

impl UpstreamServer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Classifies raw parameter values: the first is the address, `k=v`
    /// values are named parameters and everything else is a flag.
    ///
    /// Returns `None` when there is no address.
    pub fn from_values<'a, I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut values = values.into_iter();
        let mut server = Self::new(values.next()?);
        for value in values {
            match value.split_once('=') {
                Some((key, val)) => server.set_parameter(key, val),
                None => server.add_flag(value),
            }
        }
        Some(server)
    }

    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.named_parameters.insert(key.into(), value.into());
    }

    pub fn add_flag(&mut self, flag: impl Into<String>) {
        self.flags.push(flag.into());
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_parameter(key, value);
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.add_flag(flag);
        self
    }

    /// Address, then named parameters sorted by key, then flags.
    pub fn parameters(&self) -> Vec<Parameter> {
        std::iter::once(Parameter::new(self.address.as_str()))
            .chain(
                self.named_parameters
                    .iter()
                    .map(|(key, value)| Parameter::new(format!("{key}={value}"))),
            )
            .chain(self.flags.iter().map(|flag| Parameter::new(flag.as_str())))
            .collect()
    }
}

/// `include pattern;`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Include {
    pub include_path: String,
    /// One config per matched file, filled when include parsing is enabled.
    pub resolved_configs: Vec<Config>,
}

/// A directive whose body is embedded script code (`*_by_lua_block`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ForeignCodeBlock {
    /// The body exactly as written between the braces.
    pub code: String,
}

/// What kind of node a [`Node`] is, with the data specific to that kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Any directive without a dedicated variant, with or without a block.
    Directive(Option<Block>),
    Http(Block),
    Server(Block),
    Location(Location),
    Upstream(Upstream),
    UpstreamServer(UpstreamServer),
    Include(Include),
    ForeignCode(ForeignCodeBlock),
}

/// One directive in the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub directive: Directive,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(directive: Directive, kind: NodeKind) -> Self {
        Self { directive, kind }
    }

    /// A generic `name params;` node.
    pub fn simple<I, S>(name: impl Into<String>, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            Directive::new(name).with_parameters(parameters),
            NodeKind::Directive(None),
        )
    }

    /// A generic `name params { }` node with an empty block.
    pub fn with_block<I, S>(name: impl Into<String>, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            Directive::new(name).with_parameters(parameters),
            NodeKind::Directive(Some(Block::new())),
        )
    }

    /// An upstream `server` entry.
    pub fn upstream_server(server: UpstreamServer) -> Self {
        Self::new(Directive::new("server"), NodeKind::UpstreamServer(server))
    }

    pub fn name(&self) -> &str {
        match self.kind {
            NodeKind::Server(_) => "server",
            _ => &self.directive.name,
        }
    }

    /// Parameters as they are rendered.
    ///
    /// Generic nodes borrow [`Directive::parameters`]; typed variants build
    /// the list from their own fields.
    pub fn parameters(&self) -> Cow<'_, [Parameter]> {
        match &self.kind {
            NodeKind::Location(location) => Cow::Owned(location.parameters()),
            NodeKind::Upstream(upstream) => {
                Cow::Owned(vec![Parameter::new(upstream.name.as_str())])
            }
            NodeKind::UpstreamServer(server) => Cow::Owned(server.parameters()),
            NodeKind::Include(include) => {
                Cow::Owned(vec![Parameter::new(include.include_path.as_str())])
            }
            NodeKind::Directive(_)
            | NodeKind::Http(_)
            | NodeKind::Server(_)
            | NodeKind::ForeignCode(_) => Cow::Borrowed(&self.directive.parameters),
        }
    }

    /// Parameter values as plain strings.
    pub fn parameter_values(&self) -> Vec<String> {
        self.parameters().iter().map(|p| p.value.clone()).collect()
    }

    /// Get the first parameter value
    pub fn first_parameter(&self) -> Option<String> {
        self.parameters().first().map(|p| p.value.clone())
    }

    pub fn block(&self) -> Option<&Block> {
        match &self.kind {
            NodeKind::Directive(block) => block.as_ref(),
            NodeKind::Http(block) | NodeKind::Server(block) => Some(block),
            NodeKind::Location(location) => Some(&location.block),
            NodeKind::Upstream(upstream) => Some(&upstream.block),
            NodeKind::UpstreamServer(_) | NodeKind::Include(_) | NodeKind::ForeignCode(_) => None,
        }
    }

    pub fn block_mut(&mut self) -> Option<&mut Block> {
        match &mut self.kind {
            NodeKind::Directive(block) => block.as_mut(),
            NodeKind::Http(block) | NodeKind::Server(block) => Some(block),
            NodeKind::Location(location) => Some(&mut location.block),
            NodeKind::Upstream(upstream) => Some(&mut upstream.block),
            NodeKind::UpstreamServer(_) | NodeKind::Include(_) | NodeKind::ForeignCode(_) => None,
        }
    }

    /// True for nodes written with braces, foreign code blocks included.
    pub fn has_block(&self) -> bool {
        self.block().is_some() || matches!(self.kind, NodeKind::ForeignCode(_))
    }

    /// Verbatim code of a foreign code node or block.
    pub fn foreign_code(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::ForeignCode(code) => Some(&code.code),
            _ => self.block().and_then(|b| b.foreign_code.as_deref()),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.directive.parent
    }

    pub fn as_location(&self) -> Option<&Location> {
        match &self.kind {
            NodeKind::Location(location) => Some(location),
            _ => None,
        }
    }

    pub fn as_upstream(&self) -> Option<&Upstream> {
        match &self.kind {
            NodeKind::Upstream(upstream) => Some(upstream),
            _ => None,
        }
    }

    pub fn as_upstream_server(&self) -> Option<&UpstreamServer> {
        match &self.kind {
            NodeKind::UpstreamServer(server) => Some(server),
            _ => None,
        }
    }

    pub fn as_upstream_server_mut(&mut self) -> Option<&mut UpstreamServer> {
        match &mut self.kind {
            NodeKind::UpstreamServer(server) => Some(server),
            _ => None,
        }
    }

    pub fn as_include(&self) -> Option<&Include> {
        match &self.kind {
            NodeKind::Include(include) => Some(include),
            _ => None,
        }
    }

    /// Whether children can be linked under this node.
    fn accepts_children(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Directive(_)
                | NodeKind::Http(_)
                | NodeKind::Server(_)
                | NodeKind::Location(_)
                | NodeKind::Upstream(_)
        )
    }
}

/// Root of a parsed nginx configuration file.
///
/// Use [`directives()`](Config::directives) for top-level directives only, or
/// [`all_directives()`](Config::all_directives) to recurse into blocks and
/// included files.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path the config was read from, empty for string input.
    pub file_path: PathBuf,
    nodes: Vec<Node>,
    /// Top-level directives.
    pub root: Block,
}

impl Config {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Number of nodes in the arena, including unlinked ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the node for an id produced by this config.
    ///
    /// # Panics
    ///
    /// Panics if `id` belongs to another config.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Mutable access for in-place edits.
    ///
    /// # Panics
    ///
    /// Panics if `id` belongs to another config.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.0 < self.nodes.len()).then_some(NodeRef { config: self, id })
    }

    /// Returns an iterator over top-level directives
    pub fn directives(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.root
            .directives
            .iter()
            .map(move |&id| NodeRef { config: self, id })
    }

    /// Depth-first, document-order walk over every directive, descending
    /// into blocks and into the files resolved by `include` directives.
    pub fn all_directives(&self) -> AllDirectives<'_> {
        let mut iter = AllDirectives { stack: Vec::new() };
        iter.push_block(self, &self.root);
        iter
    }

    /// Every directive named `name`, at any depth, in document order.
    pub fn find_directives(&self, name: &str) -> Vec<NodeRef<'_>> {
        self.all_directives().filter(|d| d.name() == name).collect()
    }

    /// Every `upstream` block, at any depth.
    pub fn find_upstreams(&self) -> Vec<NodeRef<'_>> {
        self.all_directives()
            .filter(|d| matches!(d.kind, NodeKind::Upstream(_)))
            .collect()
    }

    /// The directive enclosing `id`, `None` at the top level.
    pub fn get_parent(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.nodes
            .get(id.0)?
            .directive
            .parent
            .map(|parent| NodeRef { config: self, id: parent })
    }

    /// Children of `id`; empty for nodes without a block.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .block()
            .map_or(&[], |block| block.directives.as_slice())
    }

    /// Stores a node without linking it into any block.
    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Links `node` as the last child of `parent`, or at the top level.
    ///
    /// A generic directive without a block gains an empty one. Returns
    /// `None` (and stores nothing) when `parent` can not hold children.
    pub fn add_node(&mut self, parent: Option<NodeId>, mut node: Node) -> Option<NodeId> {
        if let Some(parent) = parent
            && !self.nodes.get(parent.0)?.accepts_children()
        {
            return None;
        }

        node.directive.parent = parent;
        let id = self.alloc(node);
        let block = match parent {
            None => &mut self.root,
            Some(parent) => {
                let owner = &mut self.nodes[parent.0];
                if let NodeKind::Directive(block @ None) = &mut owner.kind {
                    *block = Some(Block::new());
                }
                owner.block_mut()?
            }
        };
        block.directives.push(id);
        Some(id)
    }

    /// Appends a `server` entry to an `upstream` block.
    ///
    /// Returns `None` when `upstream` is not an upstream node.
    pub fn add_upstream_server(&mut self, upstream: NodeId, server: UpstreamServer) -> Option<NodeId> {
        self.nodes.get(upstream.0)?.as_upstream()?;
        self.add_node(Some(upstream), Node::upstream_server(server))
    }
}

/// A borrowed handle on a node together with the config that owns it.
///
/// Dereferences to [`Node`], and adds the queries that need the arena:
/// parents, children and subtree searches.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    config: &'a Config,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The config owning this node (for included files, the included config).
    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn node(&self) -> &'a Node {
        self.config.node(self.id)
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.config.get_parent(self.id)
    }

    /// Enclosing directives from the innermost outwards.
    pub fn ancestors(&self) -> impl Iterator<Item = NodeRef<'a>> {
        std::iter::successors(self.parent(), |node| node.parent())
    }

    /// Check if this directive is nested anywhere inside a `parent_name` block
    pub fn is_inside(&self, parent_name: &str) -> bool {
        self.ancestors().any(|a| a.name() == parent_name)
    }

    /// Nesting depth inside its file (0 = top level).
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let config = self.config;
        config
            .children(self.id)
            .iter()
            .map(move |&id| NodeRef { config, id })
    }

    /// Every descendant named `name`, in document order. Included files of
    /// `include` descendants are searched as well.
    pub fn find_directives(&self, name: &str) -> Vec<NodeRef<'a>> {
        let mut iter = AllDirectives { stack: Vec::new() };
        iter.push_children(self.config, self.node());
        iter.filter(|d| d.name() == name).collect()
    }

    /// `server` children of an `http` block.
    pub fn servers(&self) -> Vec<NodeRef<'a>> {
        self.children()
            .filter(|c| matches!(c.kind, NodeKind::Server(_)))
            .collect()
    }

    /// `server` entries of an `upstream` block.
    pub fn upstream_servers(&self) -> Vec<NodeRef<'a>> {
        self.children()
            .filter(|c| matches!(c.kind, NodeKind::UpstreamServer(_)))
            .collect()
    }

    /// Children that are not lifted out as servers: everything except
    /// `server` blocks for `http`, everything except server entries for
    /// `upstream`, and all children otherwise.
    pub fn other_directives(&self) -> Vec<NodeRef<'a>> {
        let kind = &self.node().kind;
        self.children()
            .filter(|c| match kind {
                NodeKind::Http(_) => !matches!(c.kind, NodeKind::Server(_)),
                NodeKind::Upstream(_) => !matches!(c.kind, NodeKind::UpstreamServer(_)),
                _ => true,
            })
            .collect()
    }
}

impl Deref for NodeRef<'_> {
    type Target = Node;

    fn deref(&self) -> &Node {
        self.node()
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("parameters", &self.parameter_values())
            .finish()
    }
}

/// Depth-first iterator over directives, see [`Config::all_directives`].
pub struct AllDirectives<'a> {
    stack: Vec<(&'a Config, std::slice::Iter<'a, NodeId>)>,
}

impl<'a> AllDirectives<'a> {
    fn push_block(&mut self, config: &'a Config, block: &'a Block) {
        if !block.directives.is_empty() {
            self.stack.push((config, block.directives.iter()));
        }
    }

    fn push_children(&mut self, config: &'a Config, node: &'a Node) {
        if let Some(block) = node.block() {
            self.push_block(config, block);
        }
        if let NodeKind::Include(include) = &node.kind {
            // Reversed so the first included file is walked first.
            for included in include.resolved_configs.iter().rev() {
                self.push_block(included, &included.root);
            }
        }
    }
}

impl<'a> Iterator for AllDirectives<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (config, iter) = self.stack.last_mut()?;
            let config: &'a Config = *config;
            match iter.next() {
                Some(&id) => {
                    self.push_children(config, config.node(id));
                    return Some(NodeRef { config, id });
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
