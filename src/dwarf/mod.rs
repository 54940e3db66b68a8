//! DWARF indexing of the executable that produced the dump.
//!
//! The dump records only describe field shapes; names come from the
//! executable's debug info. Three indexes are built here: global
//! variables by address, frame locals by function, and struct members by
//! type name.

mod expr;

use std::borrow::Cow;

use gimli::{constants, AttributeValue, DebuggingInformationEntry, Unit};
use indexmap::IndexMap;
use object::{Object, ObjectSection};
use regex::Regex;

use crate::addrmap::AddrMap;
use crate::error::Error;
use crate::record::Params;

type Slice<'a> = gimli::EndianSlice<'a, gimli::RunTimeEndian>;

/// Parses an executable buffer, loads its DWARF sections, and hands a
/// borrowed [`gimli::Dwarf`] to `f`.
///
/// The `object` crate dispatches over ELF, Mach-O, and PE internally.
/// A file with no `.debug_info` section is rejected up front.
pub fn with_loaded_dwarf<T, F>(data: &[u8], f: F) -> Result<T, Error>
where
    F: FnOnce(&gimli::Dwarf<Slice<'_>>) -> Result<T, Error>,
{
    let object = object::File::parse(data)?;

    let endian = if object.is_little_endian() {
        gimli::RunTimeEndian::Little
    } else {
        gimli::RunTimeEndian::Big
    };

    if find_section(&object, gimli::SectionId::DebugInfo.name()).is_none() {
        return Err(Error::MissingDebugInfo);
    }

    // Load a section and return as `Cow<[u8]>`.
    let load_section = |id: gimli::SectionId| -> Result<Cow<[u8]>, gimli::Error> {
        Ok(find_section(&object, id.name()).unwrap_or(Cow::Borrowed(&[][..])))
    };

    // Load all of the sections.
    let dwarf_cow = gimli::Dwarf::load(&load_section)?;

    // Borrow each `Cow<[u8]>` as an `EndianSlice`.
    let borrow_section: &dyn for<'a> Fn(&'a Cow<[u8]>) -> Slice<'a> =
        &|section| gimli::EndianSlice::new(section, endian);

    let dwarf = dwarf_cow.borrow(&borrow_section);

    f(&dwarf)
}

fn find_section<'data>(object: &object::File<'data>, name: &str) -> Option<Cow<'data, [u8]>> {
    // Mach-O section names use a `__` prefix in place of the dot.
    let section = object
        .section_by_name(name)
        .or_else(|| object.section_by_name(&format!("__{}", &name[1..])))?;
    section.uncompressed_data().ok()
}

/// The three name indexes extracted from DWARF.
#[derive(Debug, Default)]
pub struct DwarfIndex {
    /// Global variable name by absolute address.
    pub globals: AddrMap<String>,
    /// Per function: local variable name by distance below the CFA.
    pub locals: IndexMap<String, AddrMap<String>>,
    /// Per struct type: member name by field offset.
    pub structs: IndexMap<String, AddrMap<String>>,
}

impl DwarfIndex {
    /// Builds all three indexes in one DFS pass over every unit's DIEs.
    ///
    /// Variables are attributed to the innermost subprogram seen so far,
    /// members to the most recent structure type, mirroring a flat walk
    /// of the DIE stream.
    pub fn from_dwarf<R: gimli::Reader>(
        dwarf: &gimli::Dwarf<R>,
        params: &Params,
    ) -> Result<DwarfIndex, Error> {
        let mut index = DwarfIndex::default();
        let rewriter = MapNameRewriter::new();
        let mut units = dwarf.units();
        while let Some(header) = units.next()? {
            let unit = dwarf.unit(header)?;
            index.scan_unit(dwarf, &unit, params, &rewriter)?;
        }
        Ok(index)
    }

    fn scan_unit<R: gimli::Reader>(
        &mut self,
        dwarf: &gimli::Dwarf<R>,
        unit: &Unit<R>,
        params: &Params,
        rewriter: &MapNameRewriter,
    ) -> Result<(), Error> {
        let mut func_name: Option<String> = None;
        let mut struct_name: Option<String> = None;

        let mut entries = unit.entries();
        while let Some((_, entry)) = entries.next_dfs()? {
            match entry.tag() {
                constants::DW_TAG_subprogram => {
                    func_name = die_name(dwarf, unit, entry)?;
                    if let Some(name) = &func_name {
                        self.locals.entry(name.clone()).or_insert_with(AddrMap::new);
                    }
                }
                constants::DW_TAG_variable => {
                    let name = match die_name(dwarf, unit, entry)? {
                        Some(name) => name,
                        None => continue,
                    };
                    let loc = match attr_block(entry, constants::DW_AT_location)? {
                        Some(loc) => loc,
                        None => continue,
                    };
                    if let Some(addr) = expr::global_addr(&loc, params) {
                        self.globals.insert(addr, name);
                    } else if let Some(offset) = expr::cfa_offset(&loc, params.byte_order) {
                        if let Some(func) = &func_name {
                            // Key by distance below the CFA, as an
                            // unsigned magnitude.
                            self.locals
                                .entry(func.clone())
                                .or_insert_with(AddrMap::new)
                                .insert(offset.wrapping_neg() as u64, name);
                        }
                    }
                }
                constants::DW_TAG_structure_type => {
                    struct_name =
                        die_name(dwarf, unit, entry)?.map(|name| rewriter.rewrite(&name));
                    if let Some(name) = &struct_name {
                        self.structs
                            .entry(name.clone())
                            .or_insert_with(AddrMap::new);
                    }
                }
                constants::DW_TAG_member => {
                    let owner = match &struct_name {
                        Some(owner) => owner.clone(),
                        None => continue,
                    };
                    let name = match die_name(dwarf, unit, entry)? {
                        Some(name) => name,
                        None => continue,
                    };
                    if let Some(offset) = member_location(entry, params)? {
                        self.structs
                            .entry(owner)
                            .or_insert_with(AddrMap::new)
                            .insert(offset as u64, name);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Rewrites the compiler's mangled map type names to the runtime names
/// the dump uses: `hash<K,V>` becomes `map.hdr[K]V` and `bucket<K,V>`
/// becomes `map.bucket[K]V`.
struct MapNameRewriter {
    hdr: Regex,
    bucket: Regex,
}

impl MapNameRewriter {
    fn new() -> Self {
        MapNameRewriter {
            hdr: Regex::new(r"hash<(.*),(.*)>").unwrap(),
            bucket: Regex::new(r"bucket<(.*),(.*)>").unwrap(),
        }
    }

    fn rewrite(&self, name: &str) -> String {
        if let Some(caps) = self.hdr.captures(name) {
            return format!("map.hdr[{}]{}", &caps[1], &caps[2]);
        }
        if let Some(caps) = self.bucket.captures(name) {
            return format!("map.bucket[{}]{}", &caps[1], &caps[2]);
        }
        name.to_owned()
    }
}

fn die_name<R: gimli::Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &Unit<R>,
    entry: &DebuggingInformationEntry<R>,
) -> Result<Option<String>, Error> {
    match entry.attr_value(constants::DW_AT_name)? {
        Some(value) => Ok(Some(
            dwarf.attr_string(unit, value)?.to_string()?.into_owned(),
        )),
        None => Ok(None),
    }
}

/// Returns an attribute's expression block as raw bytes, or `None` if
/// the attribute is absent or not a block.
fn attr_block<R: gimli::Reader>(
    entry: &DebuggingInformationEntry<R>,
    name: constants::DwAt,
) -> Result<Option<Vec<u8>>, Error> {
    match entry.attr_value(name)? {
        Some(AttributeValue::Exprloc(expression)) => {
            Ok(Some(expression.0.to_slice()?.into_owned()))
        }
        Some(AttributeValue::Block(block)) => Ok(Some(block.to_slice()?.into_owned())),
        _ => Ok(None),
    }
}

/// A member's location is either an expression block or, in newer
/// constant-class encodings, the offset itself.
fn member_location<R: gimli::Reader>(
    entry: &DebuggingInformationEntry<R>,
    params: &Params,
) -> Result<Option<i64>, Error> {
    match entry.attr_value(constants::DW_AT_data_member_location)? {
        Some(AttributeValue::Exprloc(expression)) => {
            let block = expression.0.to_slice()?;
            Ok(expr::member_offset(&block, params.byte_order))
        }
        Some(AttributeValue::Block(block)) => {
            let block = block.to_slice()?;
            Ok(expr::member_offset(&block, params.byte_order))
        }
        Some(AttributeValue::Udata(value)) => Ok(Some(value as i64)),
        Some(AttributeValue::Sdata(value)) => Ok(Some(value)),
        _ => Ok(None),
    }
}
