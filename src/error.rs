use thiserror::Error;

/// The error type for dump decoding, DWARF indexing, and linking.
///
/// A heap dump is a single transactional artifact, so every malformed
/// record or unresolvable reference aborts the whole read. The conditions
/// that are tolerated instead (parentless frames, unresolvable edge
/// targets, unnamed globals) never surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// An input file could not be opened or mapped.
    #[error("failed to read input file")]
    Io(#[from] std::io::Error),
    /// The dump does not start with the `go1.3 heap dump` header line.
    #[error("not a go1.3 heap dump file")]
    BadHeader,
    /// The stream ended in the middle of a record, or before the EOF tag.
    #[error("unexpected end of dump stream")]
    UnexpectedEof,
    /// A varint ran past 10 bytes without terminating.
    #[error("varint does not fit in 64 bits")]
    VarintOverflow,
    /// The record tag is not part of the go1.3 format.
    #[error("unknown record tag {0}")]
    UnknownTag(u64),
    /// A field descriptor carries a kind outside the known set.
    #[error("unknown field kind {0}")]
    UnknownFieldKind(u64),
    /// An object record carries a kind outside {object, array, chan}.
    #[error("unknown object kind {0}")]
    UnknownObjectKind(u64),
    /// The dump params request a word size other than 4 or 8 bytes.
    #[error("unsupported pointer size {0}")]
    UnsupportedPtrSize(u64),
    /// A pointer word would be read past the end of a payload.
    #[error("pointer read needs {need} bytes, have {have}")]
    TruncatedPointer { need: u64, have: usize },
    /// An object names a type address with no type record.
    #[error("no type record at address {0:#x}")]
    UnknownType(u64),
    /// An eface type header points at an address with no type record.
    #[error("no type record at address {0:#x} for eface header")]
    UnknownEfaceType(u64),
    /// An iface slot points at an address with no itab record.
    #[error("no itab record at address {0:#x}")]
    UnknownItab(u64),
    /// A goroutine's top-of-stack address has no depth-0 frame.
    #[error("no frame at top of stack {0:#x}")]
    MissingTosFrame(u64),
    /// The executable parsed, but carries no `.debug_info` section.
    #[error("executable has no DWARF debug information")]
    MissingDebugInfo,
    /// The executable is not a readable ELF, Mach-O, or PE file.
    #[error("malformed executable")]
    Object(#[from] object::Error),
    /// The DWARF data in the executable could not be decoded.
    #[error("malformed DWARF data")]
    Dwarf(#[from] gimli::Error),
}
