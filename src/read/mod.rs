//! Decoding of the raw tag stream into a [`Dump`].

mod varint;

use gimli::RunTimeEndian;

use crate::error::Error;
use crate::record::{
    DataRoot, Dump, Field, FieldKind, Finalizer, GoRoutine, Itab, MemStats, Object, ObjectKind,
    OsThread, OtherRoot, Params, StackFrame, Type,
};

use varint::Cursor;

const HEADER: &[u8] = b"go1.3 heap dump\n";

const TAG_OBJECT: u64 = 1;
const TAG_EOF: u64 = 3;
const TAG_DATA_ROOT: u64 = 5;
const TAG_OTHER_ROOT: u64 = 6;
const TAG_TYPE: u64 = 7;
const TAG_GOROUTINE: u64 = 8;
const TAG_STACK_FRAME: u64 = 9;
const TAG_PARAMS: u64 = 10;
const TAG_FINALIZER: u64 = 11;
const TAG_ITAB: u64 = 12;
const TAG_OS_THREAD: u64 = 13;
const TAG_MEM_STATS: u64 = 14;

/// Field lists are terminated by this sentinel kind. It is consumed by
/// the reader and never stored.
const FIELD_EOL: u64 = 5;

impl Dump {
    /// Decodes a dump from raw bytes.
    ///
    /// The buffer must start with the literal `go1.3 heap dump\n` header
    /// and end with an EOF record. Every record is materialized; no
    /// cross-record resolution happens here.
    pub fn parse(data: &[u8]) -> Result<Dump, Error> {
        let body = data.strip_prefix(HEADER).ok_or(Error::BadHeader)?;
        let mut r = Cursor::new(body);
        let mut dump = Dump::default();

        loop {
            let tag = r.read_uvarint()?;
            match tag {
                TAG_OBJECT => {
                    let addr = r.read_uvarint()?;
                    let type_addr = r.read_uvarint()?;
                    let kind = r.read_uvarint()?;
                    let kind = ObjectKind::from_tag(kind).ok_or(Error::UnknownObjectKind(kind))?;
                    dump.objects.push(Object {
                        addr,
                        type_addr,
                        kind,
                        data: r.read_bytes()?,
                        typ: None,
                        edges: Vec::new(),
                    });
                }
                TAG_EOF => return Ok(dump),
                TAG_DATA_ROOT => {
                    dump.dataroots.push(DataRoot {
                        from_addr: r.read_uvarint()?,
                        to_addr: r.read_uvarint()?,
                        name: String::new(),
                        edge: None,
                    });
                }
                TAG_OTHER_ROOT => {
                    dump.otherroots.push(OtherRoot {
                        description: r.read_string()?,
                        to_addr: r.read_uvarint()?,
                        edge: None,
                    });
                }
                TAG_TYPE => {
                    dump.types.push(Type {
                        addr: r.read_uvarint()?,
                        size: r.read_uvarint()?,
                        name: r.read_string()?,
                        eface_ptr: r.read_bool()?,
                        fields: read_fields(&mut r)?,
                    });
                }
                TAG_GOROUTINE => {
                    dump.goroutines.push(GoRoutine {
                        addr: r.read_uvarint()?,
                        tos_addr: r.read_uvarint()?,
                        goid: r.read_uvarint()?,
                        go_pc: r.read_uvarint()?,
                        status: r.read_uvarint()?,
                        is_system: r.read_bool()?,
                        is_background: r.read_bool()?,
                        wait_since: r.read_uvarint()?,
                        wait_reason: r.read_string()?,
                        ctxt_addr: r.read_uvarint()?,
                        m_addr: r.read_uvarint()?,
                        tos: None,
                        ctxt: None,
                    });
                }
                TAG_STACK_FRAME => {
                    dump.frames.push(StackFrame {
                        addr: r.read_uvarint()?,
                        depth: r.read_uvarint()?,
                        data: r.read_bytes()?,
                        entry: r.read_uvarint()?,
                        pc: r.read_uvarint()?,
                        name: r.read_string()?,
                        fields: read_fields(&mut r)?,
                        parent: None,
                        goroutine: None,
                        edges: Vec::new(),
                    });
                }
                TAG_PARAMS => {
                    dump.params = Params {
                        byte_order: if r.read_uvarint()? == 0 {
                            RunTimeEndian::Little
                        } else {
                            RunTimeEndian::Big
                        },
                        ptr_size: r.read_uvarint()?,
                        h_chan_size: r.read_uvarint()?,
                        heap_start: r.read_uvarint()?,
                        heap_end: r.read_uvarint()?,
                        the_char: r.read_uvarint()? as u8,
                        experiment: r.read_string()?,
                        ncpu: r.read_uvarint()?,
                    };
                }
                TAG_FINALIZER => {
                    dump.finalizers.push(Finalizer {
                        obj: r.read_uvarint()?,
                        func: r.read_uvarint()?,
                        code: r.read_uvarint()?,
                        fint: r.read_uvarint()?,
                        ot: r.read_uvarint()?,
                    });
                }
                TAG_ITAB => {
                    dump.itabs.push(Itab {
                        addr: r.read_uvarint()?,
                        ptr: r.read_bool()?,
                    });
                }
                TAG_OS_THREAD => {
                    dump.osthreads.push(OsThread {
                        addr: r.read_uvarint()?,
                        id: r.read_uvarint()?,
                        proc_id: r.read_uvarint()?,
                    });
                }
                TAG_MEM_STATS => {
                    dump.memstats = Some(read_memstats(&mut r)?);
                }
                _ => return Err(Error::UnknownTag(tag)),
            }
        }
    }
}

/// Reads `(kind, offset)` pairs up to the Eol sentinel.
fn read_fields(r: &mut Cursor) -> Result<Vec<Field>, Error> {
    let mut fields = Vec::new();
    loop {
        let tag = r.read_uvarint()?;
        if tag == FIELD_EOL {
            return Ok(fields);
        }
        let kind = FieldKind::from_tag(tag).ok_or(Error::UnknownFieldKind(tag))?;
        fields.push(Field {
            kind,
            offset: r.read_uvarint()?,
            name: String::new(),
        });
    }
}

/// Reads the MemStats block. The counter order is a format contract and
/// must match the runtime's field order exactly.
fn read_memstats(r: &mut Cursor) -> Result<MemStats, Error> {
    let alloc = r.read_uvarint()?;
    let total_alloc = r.read_uvarint()?;
    let sys = r.read_uvarint()?;
    let lookups = r.read_uvarint()?;
    let mallocs = r.read_uvarint()?;
    let frees = r.read_uvarint()?;
    let heap_alloc = r.read_uvarint()?;
    let heap_sys = r.read_uvarint()?;
    let heap_idle = r.read_uvarint()?;
    let heap_inuse = r.read_uvarint()?;
    let heap_released = r.read_uvarint()?;
    let heap_objects = r.read_uvarint()?;
    let stack_inuse = r.read_uvarint()?;
    let stack_sys = r.read_uvarint()?;
    let mspan_inuse = r.read_uvarint()?;
    let mspan_sys = r.read_uvarint()?;
    let mcache_inuse = r.read_uvarint()?;
    let mcache_sys = r.read_uvarint()?;
    let buck_hash_sys = r.read_uvarint()?;
    let gc_sys = r.read_uvarint()?;
    let other_sys = r.read_uvarint()?;
    let next_gc = r.read_uvarint()?;
    let last_gc = r.read_uvarint()?;
    let pause_total_ns = r.read_uvarint()?;
    let mut pause_ns = [0u64; 256];
    for slot in pause_ns.iter_mut() {
        *slot = r.read_uvarint()?;
    }
    let num_gc = r.read_uvarint()? as u32;

    Ok(MemStats {
        alloc,
        total_alloc,
        sys,
        lookups,
        mallocs,
        frees,
        heap_alloc,
        heap_sys,
        heap_idle,
        heap_inuse,
        heap_released,
        heap_objects,
        stack_inuse,
        stack_sys,
        mspan_inuse,
        mspan_sys,
        mcache_inuse,
        mcache_sys,
        buck_hash_sys,
        gc_sys,
        other_sys,
        next_gc,
        last_gc,
        pause_total_ns,
        pause_ns,
        num_gc,
    })
}
