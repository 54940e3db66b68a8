//! The second pass: joining raw records into an object graph.
//!
//! Edge discovery walks each payload's field descriptors, reads pointer
//! words with the dump's decoding regime, and keeps the ones that land
//! inside a known object. Everything else here is reference resolution:
//! types, frames into stacks, goroutines, roots, finalizers.

mod naming;

pub use naming::apply_names;

use std::collections::HashMap;

use crate::addrmap::AddrMap;
use crate::dwarf::DwarfIndex;
use crate::error::Error;
use crate::record::{Dump, Edge, Field, FieldKind, ObjectKind};

/// Lookup tables built once over the raw records.
struct Tables {
    /// Type record index by address. Dumps may repeat type records; the
    /// last one wins.
    types: HashMap<u64, u32>,
    itabs: HashMap<u64, u32>,
    /// Frame index by (base address, depth). Zero-sized frames can share
    /// a base address, so depth is part of the key.
    frames: HashMap<(u64, u64), u32>,
    objects: AddrMap<u32>,
}

impl Tables {
    fn build(dump: &Dump) -> Tables {
        let mut types = HashMap::with_capacity(dump.types.len());
        for (i, typ) in dump.types.iter().enumerate() {
            types.insert(typ.addr, i as u32);
        }
        let mut itabs = HashMap::with_capacity(dump.itabs.len());
        for (i, itab) in dump.itabs.iter().enumerate() {
            itabs.insert(itab.addr, i as u32);
        }
        let mut frames = HashMap::with_capacity(dump.frames.len());
        for (i, frame) in dump.frames.iter().enumerate() {
            frames.insert((frame.addr, frame.depth), i as u32);
        }
        let mut objects = AddrMap::new();
        for (i, object) in dump.objects.iter().enumerate() {
            objects.insert(object.addr, i as u32);
        }
        Tables {
            types,
            itabs,
            frames,
            objects,
        }
    }

    /// Finds the object whose payload contains `addr`, if any.
    fn find_obj(&self, dump: &Dump, addr: u64) -> Option<u32> {
        let (_, &idx) = self.objects.lookup(addr)?;
        let object = dump.object(idx);
        if addr >= object.addr + object.data.len() as u64 {
            return None;
        }
        Some(idx)
    }

    /// Reads the pointer word at `off` in `data`.
    fn read_word(&self, dump: &Dump, data: &[u8], off: u64) -> Result<u64, Error> {
        let tail = data.get(off as usize..).unwrap_or(&[]);
        dump.params.read_ptr(tail)
    }

    /// Reads the pointer at `off` and appends an edge if it lands inside
    /// some object. Pointers into the void are silently dropped.
    fn append_edge(
        &self,
        dump: &Dump,
        edges: &mut Vec<Edge>,
        data: &[u8],
        off: u64,
        field: &Field,
    ) -> Result<(), Error> {
        let ptr = self.read_word(dump, data, off)?;
        if let Some(to) = self.find_obj(dump, ptr) {
            edges.push(Edge {
                to,
                from_offset: off,
                to_offset: ptr - dump.object(to).addr,
                field_name: field.name.clone(),
                field_offset: 0,
            });
        }
        Ok(())
    }

    /// Walks field descriptors over `data`, starting at `base`, and
    /// appends the edges they produce.
    fn append_fields(
        &self,
        dump: &Dump,
        edges: &mut Vec<Edge>,
        data: &[u8],
        fields: &[Field],
        base: u64,
    ) -> Result<(), Error> {
        let ptr_size = dump.params.ptr_size;
        for field in fields {
            let off = base + field.offset;
            match field.kind {
                FieldKind::Ptr | FieldKind::String | FieldKind::Slice => {
                    self.append_edge(dump, edges, data, off, field)?;
                }
                FieldKind::Eface => {
                    // The type header itself may live in the heap.
                    self.append_edge(dump, edges, data, off, field)?;
                    let type_addr = self.read_word(dump, data, off)?;
                    if type_addr != 0 {
                        let idx = self
                            .types
                            .get(&type_addr)
                            .ok_or(Error::UnknownEfaceType(type_addr))?;
                        if dump.typ(*idx).eface_ptr {
                            self.append_edge(dump, edges, data, off + ptr_size, field)?;
                        }
                    }
                }
                FieldKind::Iface => {
                    // Itabs live outside the heap, so the itab word never
                    // produces an edge.
                    let itab_addr = self.read_word(dump, data, off)?;
                    if itab_addr != 0 {
                        let idx = self
                            .itabs
                            .get(&itab_addr)
                            .ok_or(Error::UnknownItab(itab_addr))?;
                        if dump.itabs[*idx as usize].ptr {
                            self.append_edge(dump, edges, data, off + ptr_size, field)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Resolves every cross-record reference and computes all edges.
///
/// After this the graph is complete: objects know their types and
/// outgoing edges, frames are chained into stacks and stamped with their
/// goroutine, and roots point at the objects they retain.
pub fn link(dump: &mut Dump, index: &DwarfIndex) -> Result<(), Error> {
    let tables = Tables::build(dump);

    // Objects bind to their type records. Address zero means untyped,
    // and untyped objects have no pointers.
    for i in 0..dump.objects.len() {
        let type_addr = dump.objects[i].type_addr;
        if type_addr == 0 {
            continue;
        }
        let idx = *tables
            .types
            .get(&type_addr)
            .ok_or(Error::UnknownType(type_addr))?;
        dump.objects[i].typ = Some(idx);
    }

    // Frame payloads are scanned like object payloads.
    let mut frame_edges = Vec::with_capacity(dump.frames.len());
    for frame in &dump.frames {
        let mut edges = Vec::new();
        tables.append_fields(dump, &mut edges, &frame.data, &frame.fields, 0)?;
        frame_edges.push(edges);
    }
    for (frame, edges) in dump.frames.iter_mut().zip(frame_edges) {
        frame.edges = edges;
    }

    // A frame's parent starts where the frame ends, one level deeper.
    // The base of the stack finds nothing, which is expected.
    let parents: Vec<Option<u32>> = dump
        .frames
        .iter()
        .map(|frame| {
            tables
                .frames
                .get(&(frame.addr + frame.data.len() as u64, frame.depth + 1))
                .copied()
        })
        .collect();
    for (frame, parent) in dump.frames.iter_mut().zip(parents) {
        frame.parent = parent;
    }

    // Goroutines bind to their top frame, and every frame on the chain
    // points back at its goroutine.
    for g in 0..dump.goroutines.len() {
        let tos_addr = dump.goroutines[g].tos_addr;
        let tos = *tables
            .frames
            .get(&(tos_addr, 0))
            .ok_or(Error::MissingTosFrame(tos_addr))?;
        dump.goroutines[g].tos = Some(tos);
        let mut next = Some(tos);
        while let Some(f) = next {
            dump.frames[f as usize].goroutine = Some(g as u32);
            next = dump.frames[f as usize].parent;
        }
        let ctxt = tables.find_obj(dump, dump.goroutines[g].ctxt_addr);
        dump.goroutines[g].ctxt = ctxt;
    }

    // Data roots take their name and source offset from the globals map.
    for i in 0..dump.dataroots.len() {
        let (from_addr, to_addr) = {
            let root = &dump.dataroots[i];
            (root.from_addr, root.to_addr)
        };
        let (name, from_offset) = match index.globals.lookup(from_addr) {
            Some((base, name)) => (name.clone(), from_addr - base),
            None => ("unknown global".to_owned(), 0),
        };
        let edge = tables.find_obj(dump, to_addr).map(|to| Edge {
            to,
            from_offset,
            to_offset: to_addr - dump.object(to).addr,
            field_name: String::new(),
            field_offset: 0,
        });
        let root = &mut dump.dataroots[i];
        root.name = name;
        root.edge = edge;
    }

    for i in 0..dump.otherroots.len() {
        let to_addr = dump.otherroots[i].to_addr;
        let edge = tables.find_obj(dump, to_addr).map(|to| Edge {
            to,
            from_offset: 0,
            to_offset: to_addr - dump.object(to).addr,
            field_name: String::new(),
            field_offset: 0,
        });
        dump.otherroots[i].edge = edge;
    }

    // Object payloads, striding over array and channel elements.
    let mut object_edges = Vec::with_capacity(dump.objects.len());
    for object in &dump.objects {
        let mut edges = Vec::new();
        if let Some(t) = object.typ {
            let typ = dump.typ(t);
            match object.kind {
                ObjectKind::Object => {
                    tables.append_fields(dump, &mut edges, &object.data, &typ.fields, 0)?;
                }
                ObjectKind::Array => {
                    if typ.size > 0 {
                        let mut base = 0;
                        while base + typ.size <= object.data.len() as u64 {
                            tables.append_fields(dump, &mut edges, &object.data, &typ.fields, base)?;
                            base += typ.size;
                        }
                    }
                }
                ObjectKind::Chan => {
                    // Elements start after the channel header.
                    if typ.size > 0 {
                        let mut base = dump.params.h_chan_size;
                        while base + typ.size <= object.data.len() as u64 {
                            tables.append_fields(dump, &mut edges, &object.data, &typ.fields, base)?;
                            base += typ.size;
                        }
                    }
                }
            }
        }
        object_edges.push(edges);
    }
    for (object, edges) in dump.objects.iter_mut().zip(object_edges) {
        object.edges = edges;
    }

    // Finalizer retention edges hang off the finalized object.
    let mut finalizer_edges: Vec<(u32, Edge)> = Vec::new();
    for finalizer in &dump.finalizers {
        let from = match tables.find_obj(dump, finalizer.obj) {
            Some(from) => from,
            None => continue,
        };
        for addr in [finalizer.func, finalizer.fint, finalizer.ot] {
            if let Some(to) = tables.find_obj(dump, addr) {
                finalizer_edges.push((
                    from,
                    Edge {
                        to,
                        from_offset: 0,
                        to_offset: addr - dump.object(to).addr,
                        field_name: String::new(),
                        field_offset: 0,
                    },
                ));
            }
        }
    }
    for (from, edge) in finalizer_edges {
        dump.objects[from as usize].edges.push(edge);
    }

    Ok(())
}
