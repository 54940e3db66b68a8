//! DWARF-derived names for frame locals and struct fields.

use crate::dwarf::DwarfIndex;
use crate::record::Dump;

/// Fills in field names from the DWARF indexes.
///
/// Runs before edge discovery so that edges carry the resolved names. A
/// floor hit that is not exact means the pointer sits inside a named
/// variable or member; the name gets the distance appended, as in
/// `buf:8`.
pub fn apply_names(dump: &mut Dump, index: &DwarfIndex) {
    // Frame fields are measured from the frame base; the locals maps are
    // keyed by distance below the CFA at the other end of the frame.
    for frame in &mut dump.frames {
        let locals = match index.locals.get(&frame.name) {
            Some(locals) => locals,
            None => continue,
        };
        let frame_len = frame.data.len() as u64;
        for field in &mut frame.fields {
            let off = frame_len.wrapping_sub(field.offset);
            match locals.lookup(off) {
                Some((at, name)) if at == off => field.name = name.clone(),
                Some((at, name)) => field.name = format!("{}:{}", name, off - at),
                None => {}
            }
        }
    }

    for typ in &mut dump.types {
        let members = match index.structs.get(&typ.name) {
            Some(members) => members,
            None => continue,
        };
        for field in &mut typ.fields {
            match members.lookup(field.offset) {
                Some((at, name)) if at == field.offset => field.name = name.clone(),
                Some((at, name)) => field.name = format!("{}:{}", name, field.offset - at),
                None => field.name = format!("unk{}", field.offset),
            }
        }
    }
}
