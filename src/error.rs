use thiserror::Error;

/// Errors produced by graph mutations whose preconditions fail.
///
/// Lookups that can simply miss (unknown path name, occurrence past the
/// end of a path) return `Option` instead; an error here always means the
/// caller handed us something the graph cannot act on. No variant is ever
/// returned after a partial mutation: validation happens before the first
/// write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {0} does not exist")]
    UnknownNode(u64),

    #[error("node {0} already exists")]
    DuplicateNode(u64),

    #[error("node ids must be nonzero")]
    ZeroNodeId,

    #[error("node sequences must be nonempty")]
    EmptySequence,

    #[error("invalid base {0:#x} (expected A, C, G, T, or N)")]
    InvalidBase(u8),

    #[error("path {0} does not exist")]
    UnknownPath(u64),

    #[error("path name {0:?} already exists")]
    DuplicatePath(String),

    #[error("path name {0:?} is invalid (must be nonempty and free of '$')")]
    InvalidPathName(String),

    #[error("divide offset {offset} is outside the node (length {length})")]
    InvalidOffset { offset: usize, length: usize },
}

pub type GraphResult<T> = Result<T, GraphError>;
