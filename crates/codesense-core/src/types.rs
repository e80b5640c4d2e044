use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Build the id of the `ordinal`-th chunk of `file_path`.
///
/// Ids are stable within one build. They are not assumed to survive a
/// re-extraction of the file.
///
/// # Examples
///
/// ```
/// use codesense_core::chunk_id;
///
/// assert_eq!(chunk_id("src/app.py", 2), "src/app.py#2");
/// ```
pub fn chunk_id(file_path: &str, ordinal: usize) -> String {
    format!("{file_path}#{ordinal}")
}

/// An HTTP route attached to a handler function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRoute {
    /// Upper-case HTTP method, e.g. `GET`.
    pub method: String,
    /// Route path when it could be read from the decorator.
    pub path: Option<String>,
}

/// A function or method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callable {
    /// Function name.
    pub name: String,
    /// Declaration header, e.g. `def load(path: str) -> bytes:`.
    pub signature: Option<String>,
    /// Leading documentation.
    pub docstring: Option<String>,
    /// Decorator or attribute texts without the leading `@`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<String>,
    /// Route served by this handler, if any.
    pub route: Option<HttpRoute>,
}

/// A class, struct, interface or similar type definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    /// Type name.
    pub name: String,
    /// Declaration header, e.g. `class User(models.Model):`.
    pub signature: Option<String>,
    /// Leading documentation.
    pub docstring: Option<String>,
    /// Base classes as written in the source.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
}

/// What a chunk addresses. Each kind carries exactly the fields it can have.
///
/// # Examples
///
/// ```
/// use codesense_core::{Callable, ChunkKind, Entity};
///
/// let entity = Entity::Method {
///     parent: "UserService".into(),
///     callable: Callable { name: "create".into(), ..Callable::default() },
/// };
/// assert_eq!(entity.kind(), ChunkKind::Method);
/// assert_eq!(entity.name(), Some("create"));
/// assert_eq!(entity.parent(), Some("UserService"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    /// The whole file as one unit.
    WholeFile,
    /// A free function.
    Function(Callable),
    /// A type definition.
    Class(ClassInfo),
    /// A function defined inside a type.
    Method {
        /// Name of the enclosing type.
        parent: String,
        /// The method itself.
        callable: Callable,
    },
}

impl Entity {
    /// The kind tag of this entity.
    pub fn kind(&self) -> ChunkKind {
        match self {
            Entity::WholeFile => ChunkKind::WholeFile,
            Entity::Function(_) => ChunkKind::Function,
            Entity::Class(_) => ChunkKind::Class,
            Entity::Method { .. } => ChunkKind::Method,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Entity::WholeFile => None,
            Entity::Function(callable) | Entity::Method { callable, .. } => Some(&callable.name),
            Entity::Class(class) => Some(&class.name),
        }
    }

    pub fn signature(&self) -> Option<&str> {
        match self {
            Entity::WholeFile => None,
            Entity::Function(callable) | Entity::Method { callable, .. } => {
                callable.signature.as_deref()
            }
            Entity::Class(class) => class.signature.as_deref(),
        }
    }

    pub fn docstring(&self) -> Option<&str> {
        match self {
            Entity::WholeFile => None,
            Entity::Function(callable) | Entity::Method { callable, .. } => {
                callable.docstring.as_deref()
            }
            Entity::Class(class) => class.docstring.as_deref(),
        }
    }

    pub fn parent(&self) -> Option<&str> {
        match self {
            Entity::Method { parent, .. } => Some(parent),
            _ => None,
        }
    }

    pub fn route(&self) -> Option<&HttpRoute> {
        match self {
            Entity::Function(callable) | Entity::Method { callable, .. } => callable.route.as_ref(),
            _ => None,
        }
    }
}

/// Flat kind tag, used for storage and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    WholeFile,
    Function,
    Class,
    Method,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::WholeFile => "whole_file",
            ChunkKind::Function => "function",
            ChunkKind::Class => "class",
            ChunkKind::Method => "method",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whole_file" | "file" => Ok(ChunkKind::WholeFile),
            "function" => Ok(ChunkKind::Function),
            "class" => Ok(ChunkKind::Class),
            "method" => Ok(ChunkKind::Method),
            other => Err(format!("unknown chunk kind: {other}")),
        }
    }
}

/// An addressable unit of source code.
///
/// `text` is exactly lines `start_line..=end_line` of the file at the time
/// the chunk was last embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// `"<file_path>#<ordinal>"`.
    pub id: String,
    /// POSIX path relative to the index root.
    pub file_path: String,
    /// First line, 1-based.
    pub start_line: u32,
    /// Last line, 1-based and inclusive.
    pub end_line: u32,
    /// Framework classification such as `django_model` or `fastapi_route`.
    pub framework_tag: Option<String>,
    /// The embedded text.
    pub text: String,
    /// Kind-specific metadata.
    pub entity: Entity,
}

impl Chunk {
    pub fn kind(&self) -> ChunkKind {
        self.entity.kind()
    }

    pub fn name(&self) -> Option<&str> {
        self.entity.name()
    }
}

/// Per-file bookkeeping from the last successful (re)index of that file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// POSIX path relative to the index root.
    pub file_path: String,
    /// Lowercase hex SHA-256 of the raw bytes.
    pub content_hash: String,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime_ns: i64,
    /// Size in bytes.
    pub size: u64,
    /// Ids of the chunks produced from this file, in extraction order.
    pub chunk_ids: Vec<String>,
}

/// A file that could not be chunked. The file is still recorded, with zero chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionWarning {
    pub file_path: String,
    pub message: String,
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file_path, self.message)
    }
}

/// A ranked search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// 1-based position in the result list.
    pub rank: usize,
    pub file_path: String,
    /// Squared L2 distance to the query. Lower is more similar.
    pub score: f32,
    /// Content hash of the file the chunk came from.
    pub content_hash: String,
    pub chunk: Chunk,
}

/// Output format for CLI results.
///
/// # Examples
///
/// ```
/// use codesense_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
