//! The record types that make up a decoded heap dump.
//!
//! `Dump` owns every record in flat vectors; all cross-record references
//! are `u32` indexes into those vectors, filled in by the linker. Raw
//! addresses read from the stream are kept alongside the resolved indexes.

use gimli::{Endianity, RunTimeEndian};

use crate::error::Error;

/// What a field descriptor says lives at its offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A plain pointer word.
    Ptr,
    /// A string header; the first word is the data pointer.
    String,
    /// A slice header; the first word is the data pointer.
    Slice,
    /// An `(itab, data)` pair.
    Iface,
    /// A `(type, data)` pair.
    Eface,
}

impl FieldKind {
    pub(crate) fn from_tag(tag: u64) -> Option<FieldKind> {
        match tag {
            0 => Some(FieldKind::Ptr),
            1 => Some(FieldKind::String),
            2 => Some(FieldKind::Slice),
            3 => Some(FieldKind::Iface),
            4 => Some(FieldKind::Eface),
            _ => None,
        }
    }
}

/// The allocation flavor of an object record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Object,
    Array,
    Chan,
}

impl ObjectKind {
    pub(crate) fn from_tag(tag: u64) -> Option<ObjectKind> {
        match tag {
            0 => Some(ObjectKind::Object),
            1 => Some(ObjectKind::Array),
            2 => Some(ObjectKind::Chan),
            _ => None,
        }
    }
}

/// A location in an object or frame where there might be a pointer.
///
/// Names start out empty and are filled in from DWARF before linking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub kind: FieldKind,
    pub offset: u64,
    pub name: String,
}

/// A runtime type record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub addr: u64,
    pub name: String,
    pub size: u64,
    /// Whether an eface data slot holding this type is itself a pointer.
    pub eface_ptr: bool,
    pub fields: Vec<Field>,
}

/// A directed connection between two objects. The source is implicit;
/// the edge records where it leaves the source and where it lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Index of the destination object in [`Dump::objects`].
    pub to: u32,
    /// Offset in the source payload where the pointer was found.
    pub from_offset: u64,
    /// Offset in the destination payload where the pointer lands.
    pub to_offset: u64,
    /// Name of the source field, if DWARF supplied one.
    pub field_name: String,
    /// Offset within the named field. Currently always zero.
    pub field_offset: u64,
}

/// A heap object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub addr: u64,
    /// Type record address; zero means untyped.
    pub type_addr: u64,
    pub kind: ObjectKind,
    /// Payload bytes. May be longer than the type's size because
    /// allocations round up to a size class.
    pub data: Vec<u8>,
    /// Index into [`Dump::types`], resolved by the linker.
    pub typ: Option<u32>,
    pub edges: Vec<Edge>,
}

/// One frame of a goroutine stack.
///
/// A frame occupies `[addr, addr + data.len())`; its parent starts right
/// after it at depth + 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub addr: u64,
    /// Call depth. Zero is the currently executing frame.
    pub depth: u64,
    pub data: Vec<u8>,
    pub entry: u64,
    pub pc: u64,
    pub name: String,
    pub fields: Vec<Field>,
    /// Index of the calling frame in [`Dump::frames`]. The base of the
    /// stack has none.
    pub parent: Option<u32>,
    /// Index of the owning goroutine in [`Dump::goroutines`].
    pub goroutine: Option<u32>,
    pub edges: Vec<Edge>,
}

/// A goroutine record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoRoutine {
    pub addr: u64,
    pub tos_addr: u64,
    pub goid: u64,
    pub go_pc: u64,
    pub status: u64,
    pub is_system: bool,
    pub is_background: bool,
    pub wait_since: u64,
    pub wait_reason: String,
    pub ctxt_addr: u64,
    pub m_addr: u64,
    /// Index of the top-of-stack frame, resolved by the linker.
    pub tos: Option<u32>,
    /// Index of the context object, if it resolves to a heap object.
    pub ctxt: Option<u32>,
}

/// A pointer from static data into the heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRoot {
    pub from_addr: u64,
    pub to_addr: u64,
    /// Name of the global variable, or `"unknown global"`.
    pub name: String,
    pub edge: Option<Edge>,
}

/// A root the runtime reported outside of static data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherRoot {
    pub description: String,
    pub to_addr: u64,
    pub edge: Option<Edge>,
}

/// An object with a registered finalizer, plus the addresses the
/// finalizer retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finalizer {
    pub obj: u64,
    /// The FuncVal to run.
    pub func: u64,
    /// Code pointer inside the FuncVal.
    pub code: u64,
    /// Type of the function argument.
    pub fint: u64,
    /// Type of the object.
    pub ot: u64,
}

/// For the given itab address, is the interface data slot a pointer?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Itab {
    pub addr: u64,
    pub ptr: bool,
}

/// An OS thread record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsThread {
    pub addr: u64,
    pub id: u64,
    pub proc_id: u64,
}

/// The runtime allocator counters, in the fixed order the dump writes
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemStats {
    pub alloc: u64,
    pub total_alloc: u64,
    pub sys: u64,
    pub lookups: u64,
    pub mallocs: u64,
    pub frees: u64,
    pub heap_alloc: u64,
    pub heap_sys: u64,
    pub heap_idle: u64,
    pub heap_inuse: u64,
    pub heap_released: u64,
    pub heap_objects: u64,
    pub stack_inuse: u64,
    pub stack_sys: u64,
    pub mspan_inuse: u64,
    pub mspan_sys: u64,
    pub mcache_inuse: u64,
    pub mcache_sys: u64,
    pub buck_hash_sys: u64,
    pub gc_sys: u64,
    pub other_sys: u64,
    pub next_gc: u64,
    pub last_gc: u64,
    pub pause_total_ns: u64,
    /// Circular buffer of recent GC pause durations.
    pub pause_ns: [u64; 256],
    pub num_gc: u32,
}

/// The dump-wide parameters. These fix the decoding regime for every
/// pointer word read out of an object or frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    pub byte_order: RunTimeEndian,
    /// Pointer size in bytes. Only 4 and 8 are supported.
    pub ptr_size: u64,
    /// Size of a channel header in bytes.
    pub h_chan_size: u64,
    pub heap_start: u64,
    pub heap_end: u64,
    /// Architecture discriminator.
    pub the_char: u8,
    pub experiment: String,
    pub ncpu: u64,
}

impl Params {
    /// Decodes one pointer-sized word from the front of `data`.
    ///
    /// A 4-byte word zero-extends into 64 bits. Word sizes other than 4
    /// and 8 are fatal.
    pub fn read_ptr(&self, data: &[u8]) -> Result<u64, Error> {
        let size = match self.ptr_size {
            4 | 8 => self.ptr_size as usize,
            n => return Err(Error::UnsupportedPtrSize(n)),
        };
        if data.len() < size {
            return Err(Error::TruncatedPointer {
                need: self.ptr_size,
                have: data.len(),
            });
        }
        Ok(match size {
            4 => u64::from(self.byte_order.read_u32(&data[..4])),
            _ => self.byte_order.read_u64(&data[..8]),
        })
    }
}

impl Default for Params {
    fn default() -> Self {
        Params {
            byte_order: RunTimeEndian::Little,
            ptr_size: 0,
            h_chan_size: 0,
            heap_start: 0,
            heap_end: 0,
            the_char: 0,
            experiment: String::new(),
            ncpu: 0,
        }
    }
}

/// A fully decoded heap dump.
///
/// After linking, the record vectors are frozen; edges, parents, and
/// names have been filled in and the graph is shared read-only.
#[derive(Debug, Default)]
pub struct Dump {
    pub params: Params,
    pub types: Vec<Type>,
    pub objects: Vec<Object>,
    pub frames: Vec<StackFrame>,
    pub goroutines: Vec<GoRoutine>,
    pub dataroots: Vec<DataRoot>,
    pub otherroots: Vec<OtherRoot>,
    pub finalizers: Vec<Finalizer>,
    pub itabs: Vec<Itab>,
    pub osthreads: Vec<OsThread>,
    pub memstats: Option<MemStats>,
}

impl Dump {
    pub fn object(&self, idx: u32) -> &Object {
        &self.objects[idx as usize]
    }

    pub fn typ(&self, idx: u32) -> &Type {
        &self.types[idx as usize]
    }

    pub fn frame(&self, idx: u32) -> &StackFrame {
        &self.frames[idx as usize]
    }

    pub fn goroutine(&self, idx: u32) -> &GoRoutine {
        &self.goroutines[idx as usize]
    }
}
