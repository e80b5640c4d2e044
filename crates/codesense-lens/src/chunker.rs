//! AST-aware code chunking using tree-sitter.
//!
//! Extractors only report *where* a chunk is and *what* it is. The builder
//! slices chunk text from the file lines itself, so text always matches the
//! reported line range.

use codesense_core::{Callable, ClassInfo, Entity};
use codesense_scan::Language;
use tree_sitter::{Node, Parser};

use crate::framework;

/// A file could not be chunked. Recorded as a warning, never fatal to a build.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ExtractError(pub String);

/// Location and metadata of one chunk, before it gets an id or text.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSpan {
    pub entity: Entity,
    /// 1-based, inclusive.
    pub start_line: u32,
    /// 1-based, inclusive.
    pub end_line: u32,
    pub framework_tag: Option<String>,
}

impl ChunkSpan {
    /// One span covering all of `content`, or `None` for a blank file.
    ///
    /// # Examples
    ///
    /// ```
    /// use codesense_lens::chunker::ChunkSpan;
    ///
    /// let span = ChunkSpan::whole_file("a = 1\nb = 2\n").unwrap();
    /// assert_eq!((span.start_line, span.end_line), (1, 2));
    /// assert!(ChunkSpan::whole_file("  \n\n").is_none());
    /// ```
    pub fn whole_file(content: &str) -> Option<Self> {
        if content.trim().is_empty() {
            return None;
        }
        Some(Self {
            entity: Entity::WholeFile,
            start_line: 1,
            end_line: line_count(content).max(1),
            framework_tag: None,
        })
    }
}

/// Number of lines as seen by [`str::lines`].
pub fn line_count(content: &str) -> u32 {
    content.lines().count() as u32
}

/// Turns file contents into an ordered list of chunk spans.
///
/// Implementations must be deterministic: the same input yields the same
/// spans in the same order, since chunk ids are derived from span position.
pub trait ChunkExtractor: Send + Sync {
    /// Extract spans from `content`. Zero spans is a valid answer.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] when the file cannot be interpreted, e.g. on
    /// a syntax error.
    fn extract(&self, file_path: &str, content: &str) -> Result<Vec<ChunkSpan>, ExtractError>;
}

/// One chunk per non-blank file.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeFileExtractor;

impl ChunkExtractor for WholeFileExtractor {
    fn extract(&self, _file_path: &str, content: &str) -> Result<Vec<ChunkSpan>, ExtractError> {
        Ok(ChunkSpan::whole_file(content).into_iter().collect())
    }
}

/// Functions, classes and methods via tree-sitter, for Python, Rust,
/// JavaScript, TypeScript, Go and Java.
///
/// Python chunks are also tagged with their web framework role.
///
/// # Examples
///
/// ```
/// use codesense_core::ChunkKind;
/// use codesense_lens::chunker::{ChunkExtractor, TreeSitterExtractor};
///
/// let spans = TreeSitterExtractor::new()
///     .extract("app.py", "def hello():\n    return 1\n")
///     .unwrap();
/// assert_eq!(spans.len(), 1);
/// assert_eq!(spans[0].entity.kind(), ChunkKind::Function);
/// assert_eq!(spans[0].entity.name(), Some("hello"));
/// ```
#[derive(Debug, Clone)]
pub struct TreeSitterExtractor {
    whole_file_fallback: bool,
}

impl TreeSitterExtractor {
    /// Extractor that falls back to a whole-file chunk when a file has no
    /// definitions or no grammar.
    pub fn new() -> Self {
        Self {
            whole_file_fallback: true,
        }
    }

    /// Files without definitions produce zero chunks.
    pub fn without_fallback(mut self) -> Self {
        self.whole_file_fallback = false;
        self
    }

    fn fallback(&self, content: &str) -> Vec<ChunkSpan> {
        if self.whole_file_fallback {
            ChunkSpan::whole_file(content).into_iter().collect()
        } else {
            Vec::new()
        }
    }
}

impl Default for TreeSitterExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkExtractor for TreeSitterExtractor {
    fn extract(&self, file_path: &str, content: &str) -> Result<Vec<ChunkSpan>, ExtractError> {
        let language = Language::from_path(file_path);
        let Some(grammar) = grammar(language) else {
            return Ok(self.fallback(content));
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut parser = Parser::new();
        parser.set_language(&grammar).map_err(|e| {
            ExtractError(format!("failed to load {} grammar: {e}", language.name()))
        })?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| ExtractError("parser returned no tree".into()))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(ExtractError(format!(
                "syntax error near line {}",
                first_error_line(root)
            )));
        }

        let source = content.as_bytes();
        let mut spans = Vec::new();
        match language {
            Language::Python => collect_python(root, source, None, &mut spans),
            Language::Rust => collect_rust(root, source, None, &mut spans),
            Language::TypeScript | Language::Tsx | Language::JavaScript => {
                collect_js_ts(root, source, None, &mut spans)
            }
            Language::Go => collect_go(root, source, &mut spans),
            Language::Java => collect_java(root, source, None, &mut spans),
            Language::Unknown => {}
        }

        if spans.is_empty() {
            return Ok(self.fallback(content));
        }
        Ok(spans)
    }
}

fn grammar(language: Language) -> Option<tree_sitter::Language> {
    match language {
        Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
        Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
        Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
        Language::Unknown => None,
    }
}

fn first_error_line(node: Node) -> usize {
    if node.is_error() || node.is_missing() {
        return node.start_position().row + 1;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            return first_error_line(child);
        }
    }
    node.start_position().row + 1
}

fn node_text(node: &Node, source: &[u8]) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    if start >= source.len() || end > source.len() {
        return String::new();
    }
    String::from_utf8_lossy(&source[start..end]).to_string()
}

fn field_text(node: &Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .map(|child| node_text(&child, source))
        .filter(|text| !text.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Declaration text up to the body, whitespace collapsed.
fn header(node: &Node, body: Option<Node>, source: &[u8]) -> String {
    let start = node.start_byte();
    let end = match body {
        Some(body) => body.start_byte(),
        None => {
            let text = &source[start..node.end_byte().min(source.len())];
            start + text.iter().position(|b| *b == b'\n').unwrap_or(text.len())
        }
    };
    if start >= end || end > source.len() {
        return String::new();
    }
    collapse_whitespace(&String::from_utf8_lossy(&source[start..end]))
}

fn make_span(node: &Node, entity: Entity, framework_tag: Option<String>) -> ChunkSpan {
    let start = node.start_position().row;
    let end_pos = node.end_position();
    // A node that ends right after a newline does not own the next line.
    let end = if end_pos.column == 0 && end_pos.row > start {
        end_pos.row - 1
    } else {
        end_pos.row
    };
    ChunkSpan {
        entity,
        start_line: start as u32 + 1,
        end_line: end as u32 + 1,
        framework_tag,
    }
}

fn non_empty(signature: String) -> Option<String> {
    if signature.is_empty() {
        None
    } else {
        Some(signature)
    }
}

fn callable_entity(parent: Option<&str>, callable: Callable) -> Entity {
    match parent {
        Some(parent) => Entity::Method {
            parent: parent.to_string(),
            callable,
        },
        None => Entity::Function(callable),
    }
}

fn clean_block_comment(text: &str) -> String {
    let inner = text
        .trim_start_matches("/**")
        .trim_start_matches("/*")
        .trim_end_matches("*/");
    inner
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `/** ... */` or a run of `//` comments directly above `node`.
fn leading_comment_doc(node: &Node, source: &[u8]) -> Option<String> {
    let anchor = match node.parent() {
        Some(parent) if parent.kind() == "export_statement" => parent,
        _ => *node,
    };

    let mut lines = Vec::new();
    let mut next_row = anchor.start_position().row;
    let mut current = anchor.prev_sibling();
    while let Some(sibling) = current {
        if !sibling.kind().contains("comment") || sibling.end_position().row + 1 < next_row {
            break;
        }
        let text = node_text(&sibling, source);
        if text.starts_with("/*") {
            if text.starts_with("/**") && lines.is_empty() {
                let doc = clean_block_comment(&text);
                return if doc.is_empty() { None } else { Some(doc) };
            }
            break;
        }
        lines.push(text.trim_start_matches('/').trim().to_string());
        next_row = sibling.start_position().row;
        current = sibling.prev_sibling();
    }

    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    Some(lines.join("\n"))
}

// Python

fn collect_python(
    node: Node,
    source: &[u8],
    class_name: Option<&str>,
    spans: &mut Vec<ChunkSpan>,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let (definition, decorators) = match child.kind() {
            "decorated_definition" => match child.child_by_field_name("definition") {
                Some(definition) => (definition, python_decorators(&child, source)),
                None => continue,
            },
            "function_definition" | "class_definition" => (child, Vec::new()),
            _ => continue,
        };
        let Some(name) = field_text(&definition, "name", source) else {
            continue;
        };
        let body = definition.child_by_field_name("body");
        let signature = non_empty(header(&definition, body, source));
        let docstring = body.and_then(|b| python_docstring(&b, source));

        match definition.kind() {
            "function_definition" => {
                let (tag, route) = match framework::classify_function(&decorators) {
                    Some((tag, route)) => (Some(tag.to_string()), route),
                    None => (None, None),
                };
                let callable = Callable {
                    name,
                    signature,
                    docstring,
                    decorators,
                    route,
                };
                spans.push(make_span(&child, callable_entity(class_name, callable), tag));
            }
            "class_definition" if class_name.is_none() => {
                let bases = definition
                    .child_by_field_name("superclasses")
                    .map(|args| python_bases(&args, source))
                    .unwrap_or_default();
                let tag = framework::classify_class(&bases).map(String::from);
                let class = ClassInfo {
                    name: name.clone(),
                    signature,
                    docstring,
                    bases,
                };
                spans.push(make_span(&child, Entity::Class(class), tag));
                if let Some(body) = body {
                    collect_python(body, source, Some(name.as_str()), spans);
                }
            }
            _ => {}
        }
    }
}

fn python_decorators(decorated: &Node, source: &[u8]) -> Vec<String> {
    let mut cursor = decorated.walk();
    decorated
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "decorator")
        .map(|child| {
            let text = node_text(&child, source);
            collapse_whitespace(text.trim().trim_start_matches('@'))
        })
        .collect()
}

fn python_bases(arguments: &Node, source: &[u8]) -> Vec<String> {
    let mut cursor = arguments.walk();
    arguments
        .named_children(&mut cursor)
        .filter(|arg| arg.kind() != "keyword_argument" && arg.kind() != "comment")
        .map(|arg| node_text(&arg, source))
        .filter(|text| !text.is_empty())
        .collect()
}

fn python_docstring(body: &Node, source: &[u8]) -> Option<String> {
    let mut cursor = body.walk();
    let first = body.named_children(&mut cursor).next()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let mut inner = first.walk();
    let string = first.named_children(&mut inner).next()?;
    if string.kind() != "string" {
        return None;
    }
    clean_python_string(&node_text(&string, source))
}

fn clean_python_string(literal: &str) -> Option<String> {
    let unprefixed = literal.trim_start_matches(|c: char| "rRbBuUfF".contains(c));
    let body = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|quote| {
            unprefixed
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        })
        .unwrap_or(unprefixed);
    let cleaned = body
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

// Rust

fn rust_doc(node: &Node, source: &[u8]) -> Option<String> {
    let mut lines = Vec::new();
    let mut current = node.prev_sibling();
    while let Some(sibling) = current {
        match sibling.kind() {
            "attribute_item" => {}
            "line_comment" => {
                let text = node_text(&sibling, source);
                let Some(doc) = text.strip_prefix("///") else {
                    break;
                };
                lines.push(doc.trim().to_string());
            }
            _ => break,
        }
        current = sibling.prev_sibling();
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    Some(lines.join("\n"))
}

fn rust_impl_type(node: &Node, source: &[u8]) -> Option<String> {
    let ty = node.child_by_field_name("type")?;
    let base = if ty.kind() == "generic_type" {
        ty.child_by_field_name("type").unwrap_or(ty)
    } else {
        ty
    };
    let text = node_text(&base, source);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn collect_rust(node: Node, source: &[u8], impl_name: Option<&str>, spans: &mut Vec<ChunkSpan>) {
    match node.kind() {
        "function_item" => {
            if let Some(name) = field_text(&node, "name", source) {
                let body = node.child_by_field_name("body");
                let callable = Callable {
                    name,
                    signature: non_empty(header(&node, body, source)),
                    docstring: rust_doc(&node, source),
                    ..Callable::default()
                };
                spans.push(make_span(&node, callable_entity(impl_name, callable), None));
            }
            return;
        }
        "struct_item" | "enum_item" | "union_item" | "trait_item" => {
            if let Some(name) = field_text(&node, "name", source) {
                let body = node.child_by_field_name("body");
                let class = ClassInfo {
                    name: name.clone(),
                    signature: non_empty(header(&node, body, source)),
                    docstring: rust_doc(&node, source),
                    bases: Vec::new(),
                };
                spans.push(make_span(&node, Entity::Class(class), None));
                if node.kind() == "trait_item" {
                    if let Some(body) = body {
                        let mut cursor = body.walk();
                        for child in body.children(&mut cursor) {
                            collect_rust(child, source, Some(name.as_str()), spans);
                        }
                    }
                }
            }
            return;
        }
        "impl_item" => {
            let type_name = rust_impl_type(&node, source);
            if let Some(body) = node.child_by_field_name("body") {
                let mut cursor = body.walk();
                for child in body.children(&mut cursor) {
                    collect_rust(child, source, type_name.as_deref(), spans);
                }
            }
            return;
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_rust(child, source, impl_name, spans);
    }
}

// JavaScript / TypeScript

fn js_heritage(node: &Node, source: &[u8]) -> Vec<String> {
    let mut cursor = node.walk();
    let mut bases = Vec::new();
    for child in node.children(&mut cursor) {
        if child.kind() == "class_heritage" || child.kind() == "extends_type_clause" {
            bases.extend(
                node_text(&child, source)
                    .split([',', ' ', '\n', '\t'])
                    .map(str::trim)
                    .filter(|t| !t.is_empty() && *t != "extends" && *t != "implements")
                    .map(String::from),
            );
        }
    }
    bases
}

fn collect_js_ts(
    node: Node,
    source: &[u8],
    class_name: Option<&str>,
    spans: &mut Vec<ChunkSpan>,
) {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                let body = node.child_by_field_name("body");
                let callable = Callable {
                    name,
                    signature: non_empty(header(&node, body, source)),
                    docstring: leading_comment_doc(&node, source),
                    ..Callable::default()
                };
                spans.push(make_span(&node, Entity::Function(callable), None));
            }
            return;
        }
        "class_declaration" | "abstract_class_declaration" | "interface_declaration"
        | "enum_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                let body = node.child_by_field_name("body");
                let class = ClassInfo {
                    name: name.clone(),
                    signature: non_empty(header(&node, body, source)),
                    docstring: leading_comment_doc(&node, source),
                    bases: js_heritage(&node, source),
                };
                spans.push(make_span(&node, Entity::Class(class), None));
                if let Some(body) = body {
                    let mut cursor = body.walk();
                    for child in body.children(&mut cursor) {
                        collect_js_ts(child, source, Some(name.as_str()), spans);
                    }
                }
            }
            return;
        }
        "method_definition" => {
            if let Some(name) = field_text(&node, "name", source) {
                let body = node.child_by_field_name("body");
                let callable = Callable {
                    name,
                    signature: non_empty(header(&node, body, source)),
                    docstring: leading_comment_doc(&node, source),
                    ..Callable::default()
                };
                spans.push(make_span(&node, callable_entity(class_name, callable), None));
            }
            return;
        }
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            for declarator in node.named_children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let Some(value) = declarator.child_by_field_name("value") else {
                    continue;
                };
                if !matches!(value.kind(), "arrow_function" | "function_expression" | "function") {
                    continue;
                }
                if let Some(name) = field_text(&declarator, "name", source) {
                    let body = value.child_by_field_name("body");
                    let callable = Callable {
                        name,
                        signature: non_empty(header(&node, body, source)),
                        docstring: leading_comment_doc(&node, source),
                        ..Callable::default()
                    };
                    spans.push(make_span(&node, Entity::Function(callable), None));
                }
            }
            return;
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_js_ts(child, source, class_name, spans);
    }
}

// Go

fn first_descendant_text(node: &Node, kind: &str, source: &[u8]) -> Option<String> {
    if node.kind() == kind {
        return Some(node_text(node, source));
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if let Some(text) = first_descendant_text(&child, kind, source) {
            return Some(text);
        }
    }
    None
}

fn collect_go(node: Node, source: &[u8], spans: &mut Vec<ChunkSpan>) {
    match node.kind() {
        "function_declaration" | "method_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                let parent = node
                    .child_by_field_name("receiver")
                    .and_then(|receiver| first_descendant_text(&receiver, "type_identifier", source));
                let body = node.child_by_field_name("body");
                let callable = Callable {
                    name,
                    signature: non_empty(header(&node, body, source)),
                    docstring: leading_comment_doc(&node, source),
                    ..Callable::default()
                };
                spans.push(make_span(&node, callable_entity(parent.as_deref(), callable), None));
            }
            return;
        }
        "type_declaration" => {
            let mut cursor = node.walk();
            for spec in node.named_children(&mut cursor) {
                if spec.kind() != "type_spec" {
                    continue;
                }
                let Some(ty) = spec.child_by_field_name("type") else {
                    continue;
                };
                if !matches!(ty.kind(), "struct_type" | "interface_type") {
                    continue;
                }
                if let Some(name) = field_text(&spec, "name", source) {
                    let class = ClassInfo {
                        name,
                        signature: non_empty(header(&spec, None, source)),
                        docstring: leading_comment_doc(&node, source),
                        bases: Vec::new(),
                    };
                    spans.push(make_span(&spec, Entity::Class(class), None));
                }
            }
            return;
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_go(child, source, spans);
    }
}

// Java

fn java_annotations(node: &Node, source: &[u8]) -> Vec<String> {
    let mut cursor = node.walk();
    let Some(modifiers) = node
        .children(&mut cursor)
        .find(|child| child.kind() == "modifiers")
    else {
        return Vec::new();
    };
    let mut inner = modifiers.walk();
    modifiers
        .named_children(&mut inner)
        .filter(|m| m.kind().contains("annotation"))
        .map(|m| collapse_whitespace(node_text(&m, source).trim_start_matches('@')))
        .collect()
}

fn java_bases(node: &Node, source: &[u8]) -> Vec<String> {
    ["superclass", "interfaces"]
        .iter()
        .filter_map(|field| node.child_by_field_name(field))
        .flat_map(|clause| {
            node_text(&clause, source)
                .split([',', ' ', '\n', '\t'])
                .map(str::trim)
                .filter(|t| !t.is_empty() && *t != "extends" && *t != "implements")
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn collect_java(
    node: Node,
    source: &[u8],
    class_name: Option<&str>,
    spans: &mut Vec<ChunkSpan>,
) {
    match node.kind() {
        "class_declaration" | "interface_declaration" | "enum_declaration"
        | "record_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                let body = node.child_by_field_name("body");
                let class = ClassInfo {
                    name: name.clone(),
                    signature: non_empty(header(&node, body, source)),
                    docstring: leading_comment_doc(&node, source),
                    bases: java_bases(&node, source),
                };
                spans.push(make_span(&node, Entity::Class(class), None));
                if let Some(body) = body {
                    let mut cursor = body.walk();
                    for child in body.children(&mut cursor) {
                        collect_java(child, source, Some(name.as_str()), spans);
                    }
                }
            }
            return;
        }
        "method_declaration" | "constructor_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                let body = node.child_by_field_name("body");
                let callable = Callable {
                    name,
                    signature: non_empty(header(&node, body, source)),
                    docstring: leading_comment_doc(&node, source),
                    decorators: java_annotations(&node, source),
                    route: None,
                };
                spans.push(make_span(&node, callable_entity(class_name, callable), None));
            }
            return;
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_java(child, source, class_name, spans);
    }
}
