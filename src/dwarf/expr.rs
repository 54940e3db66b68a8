//! Recognition of the few DWARF location expressions the dump tooling
//! emits.
//!
//! Anything outside these exact shapes is an unrecognized location and is
//! skipped, not an error.

use gimli::{constants, EndianSlice, Reader, RunTimeEndian};

use crate::record::Params;

/// Extracts the absolute address of a global variable from a
/// `[DW_OP_addr, <address bytes>]` expression.
///
/// The address bytes are decoded with the dump's pointer regime, which
/// matches the executable that produced both.
pub(crate) fn global_addr(expr: &[u8], params: &Params) -> Option<u64> {
    let (&op, rest) = expr.split_first()?;
    if op != constants::DW_OP_addr.0 {
        return None;
    }
    params.read_ptr(rest).ok()
}

/// Extracts the CFA-relative offset of a local variable.
///
/// `[DW_OP_call_frame_cfa]` is offset zero;
/// `[DW_OP_call_frame_cfa, DW_OP_consts, <sleb128>, DW_OP_plus]` is the
/// signed constant.
pub(crate) fn cfa_offset(expr: &[u8], endian: RunTimeEndian) -> Option<i64> {
    let (&op, rest) = expr.split_first()?;
    if op != constants::DW_OP_call_frame_cfa.0 {
        return None;
    }
    if rest.is_empty() {
        return Some(0);
    }
    consts_plus(rest, endian)
}

/// Extracts a struct member's offset from its data-member-location
/// block. An empty block means offset zero.
pub(crate) fn member_offset(expr: &[u8], endian: RunTimeEndian) -> Option<i64> {
    if expr.is_empty() {
        return Some(0);
    }
    consts_plus(expr, endian)
}

/// Matches `[DW_OP_consts, <sleb128>, DW_OP_plus]` exactly; the LEB
/// payload must account for every byte in between.
fn consts_plus(expr: &[u8], endian: RunTimeEndian) -> Option<i64> {
    let (&first, rest) = expr.split_first()?;
    let (&last, middle) = rest.split_last()?;
    if first != constants::DW_OP_consts.0 || last != constants::DW_OP_plus.0 {
        return None;
    }
    let mut r = EndianSlice::new(middle, endian);
    let value = r.read_sleb128().ok()?;
    if r.is_empty() {
        Some(value)
    } else {
        None
    }
}
