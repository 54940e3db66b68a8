//! Reconstructs a navigable object graph from a go1.3 heap dump.
//!
//! A dump pairs with the executable that produced it: the dump supplies
//! object payloads and field shapes, the executable's DWARF supplies
//! names. [`read_dump`] runs the whole pipeline; the pieces are exposed
//! for callers that already hold the bytes:
//!
//! - [`Dump::parse`] decodes the raw tag stream into records.
//! - [`DwarfIndex::from_dwarf`] builds the name indexes from DWARF.
//! - [`apply_names`] and [`link`] join the two into the final graph.

mod addrmap;
mod error;
mod link;
mod read;

pub mod dwarf;
pub mod record;

use std::fs;
use std::path::Path;

pub use addrmap::AddrMap;
pub use dwarf::{with_loaded_dwarf, DwarfIndex};
pub use error::Error;
pub use link::{apply_names, link};
pub use record::{
    DataRoot, Dump, Edge, Field, FieldKind, Finalizer, GoRoutine, Itab, MemStats, Object,
    ObjectKind, OsThread, OtherRoot, Params, StackFrame, Type,
};

/// Reads a heap dump and its executable, returning the linked graph.
///
/// Both files are mapped for the duration of the call and released on
/// every exit path. All decoding and linking failures are fatal; see
/// [`Error`] for the conditions.
pub fn read_dump(dump_path: impl AsRef<Path>, exec_path: impl AsRef<Path>) -> Result<Dump, Error> {
    let dump_file = fs::File::open(dump_path.as_ref())?;
    let dump_map = unsafe { memmap::Mmap::map(&dump_file)? };
    let mut dump = Dump::parse(&dump_map)?;

    let exec_file = fs::File::open(exec_path.as_ref())?;
    let exec_map = unsafe { memmap::Mmap::map(&exec_file)? };
    let index = with_loaded_dwarf(&exec_map, |dwarf| {
        DwarfIndex::from_dwarf(dwarf, &dump.params)
    })?;

    apply_names(&mut dump, &index);
    link(&mut dump, &index)?;

    Ok(dump)
}
