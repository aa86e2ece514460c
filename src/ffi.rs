//! C-compatible projection of the graph facade.
//!
//! Handles cross the boundary as plain integers: a node handle is the
//! packed (id, orientation) `u64`, a path handle its slot index, and an
//! occurrence a (path, rank) pair of arguments. The facade owns no
//! state beyond the graph pointer it is given; the only failure modes
//! are a null graph and an unknown id, reported through the
//! [`SEQWEAVE_INVALID_HANDLE`] sentinel or a `false`/negative return.
//!
//! Iteration takes an `extern "C"` callback plus an opaque context
//! pointer; returning `false` from the callback stops iteration.

use std::ffi::{c_char, c_void, CStr};

use crate::graph::VariationGraph;
use crate::handle::{Edge, Handle, OccurrenceHandle, PathHandle};

/// Sentinel returned where no valid handle exists.
pub const SEQWEAVE_INVALID_HANDLE: u64 = u64::MAX;

/// An edge as a pair of packed node handles.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SeqweaveEdge {
    pub first: u64,
    pub second: u64,
}

pub type SeqweaveHandleCallback = unsafe extern "C" fn(handle: u64, ctx: *mut c_void) -> bool;
pub type SeqweaveEdgeCallback = unsafe extern "C" fn(edge: SeqweaveEdge, ctx: *mut c_void) -> bool;
pub type SeqweavePathCallback = unsafe extern "C" fn(path: u64, ctx: *mut c_void) -> bool;
pub type SeqweaveOccurrenceCallback =
    unsafe extern "C" fn(path: u64, rank: u64, ctx: *mut c_void) -> bool;

unsafe fn graph_ref<'a>(graph: *const VariationGraph) -> Option<&'a VariationGraph> {
    graph.as_ref()
}

unsafe fn graph_mut<'a>(graph: *mut VariationGraph) -> Option<&'a mut VariationGraph> {
    graph.as_mut()
}

/// Allocate an empty graph. Free it with [`seqweave_graph_free`].
#[no_mangle]
pub extern "C" fn seqweave_graph_new() -> *mut VariationGraph {
    Box::into_raw(Box::new(VariationGraph::new()))
}

/// # Safety
/// `graph` must have come from [`seqweave_graph_new`] and not already
/// be freed.
#[no_mangle]
pub unsafe extern "C" fn seqweave_graph_free(graph: *mut VariationGraph) {
    if !graph.is_null() {
        drop(Box::from_raw(graph));
    }
}

/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_graph_clear(graph: *mut VariationGraph) -> bool {
    match graph_mut(graph) {
        Some(g) => {
            g.clear();
            true
        }
        None => false,
    }
}

/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_node_count(graph: *const VariationGraph) -> u64 {
    graph_ref(graph).map_or(0, |g| g.node_size() as u64)
}

/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_min_node_id(graph: *const VariationGraph) -> u64 {
    graph_ref(graph).map_or(0, |g| g.min_node_id())
}

/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_max_node_id(graph: *const VariationGraph) -> u64 {
    graph_ref(graph).map_or(0, |g| g.max_node_id())
}

/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_has_node(graph: *const VariationGraph, id: u64) -> bool {
    graph_ref(graph).is_some_and(|g| g.has_node(id))
}

/// Pack (id, orientation) into a node handle. Pure.
#[no_mangle]
pub extern "C" fn seqweave_pack_handle(id: u64, is_reverse: bool) -> u64 {
    Handle::new(id, is_reverse).as_u64()
}

/// Node id of a packed handle. Pure.
#[no_mangle]
pub extern "C" fn seqweave_get_id(handle: u64) -> u64 {
    Handle::from_u64(handle).node_id()
}

/// Orientation of a packed handle. Pure.
#[no_mangle]
pub extern "C" fn seqweave_get_is_reverse(handle: u64) -> bool {
    Handle::from_u64(handle).is_reverse()
}

/// Flip a packed handle. Pure.
#[no_mangle]
pub extern "C" fn seqweave_flip(handle: u64) -> u64 {
    Handle::from_u64(handle).flip().as_u64()
}

/// # Safety
/// `graph` must be valid or null; `sequence` must be a NUL-terminated
/// string.
#[no_mangle]
pub unsafe extern "C" fn seqweave_create_handle(
    graph: *mut VariationGraph,
    sequence: *const c_char,
) -> u64 {
    let (g, seq) = match (graph_mut(graph), sequence.is_null()) {
        (Some(g), false) => (g, CStr::from_ptr(sequence).to_bytes()),
        _ => return SEQWEAVE_INVALID_HANDLE,
    };
    match g.create_handle(seq) {
        Ok(h) => h.as_u64(),
        Err(_) => SEQWEAVE_INVALID_HANDLE,
    }
}

/// # Safety
/// As [`seqweave_create_handle`].
#[no_mangle]
pub unsafe extern "C" fn seqweave_create_handle_with_id(
    graph: *mut VariationGraph,
    sequence: *const c_char,
    id: u64,
) -> u64 {
    let (g, seq) = match (graph_mut(graph), sequence.is_null()) {
        (Some(g), false) => (g, CStr::from_ptr(sequence).to_bytes()),
        _ => return SEQWEAVE_INVALID_HANDLE,
    };
    match g.create_handle_with_id(seq, id) {
        Ok(h) => h.as_u64(),
        Err(_) => SEQWEAVE_INVALID_HANDLE,
    }
}

/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_destroy_handle(graph: *mut VariationGraph, handle: u64) -> bool {
    graph_mut(graph)
        .map_or(false, |g| g.destroy_handle(Handle::from_u64(handle)).is_ok())
}

/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_create_edge(
    graph: *mut VariationGraph,
    left: u64,
    right: u64,
) -> bool {
    graph_mut(graph).map_or(false, |g| {
        g.create_edge(Handle::from_u64(left), Handle::from_u64(right)).is_ok()
    })
}

/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_destroy_edge(
    graph: *mut VariationGraph,
    left: u64,
    right: u64,
) -> bool {
    match graph_mut(graph) {
        Some(g) => {
            g.destroy_edge(Handle::from_u64(left), Handle::from_u64(right));
            true
        }
        None => false,
    }
}

/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_has_edge(
    graph: *const VariationGraph,
    left: u64,
    right: u64,
) -> bool {
    graph_ref(graph)
        .is_some_and(|g| g.has_edge(Handle::from_u64(left), Handle::from_u64(right)))
}

/// Sequence length of a node, or `SEQWEAVE_INVALID_HANDLE` when the
/// node is unknown.
///
/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_get_length(graph: *const VariationGraph, handle: u64) -> u64 {
    graph_ref(graph)
        .and_then(|g| g.get_length(Handle::from_u64(handle)))
        .map_or(SEQWEAVE_INVALID_HANDLE, |l| l as u64)
}

/// Copy a node's sequence (in the handle's orientation) into `buffer`,
/// NUL-terminated and truncated to `capacity`. Returns the full
/// sequence length, or -1 for a null graph/unknown node.
///
/// # Safety
/// `graph` must be valid or null; `buffer` must point to `capacity`
/// writable bytes (or be null to only query the length).
#[no_mangle]
pub unsafe extern "C" fn seqweave_get_sequence(
    graph: *const VariationGraph,
    handle: u64,
    buffer: *mut c_char,
    capacity: usize,
) -> i64 {
    let seq = match graph_ref(graph).and_then(|g| g.get_sequence(Handle::from_u64(handle))) {
        Some(seq) => seq,
        None => return -1,
    };
    if !buffer.is_null() && capacity > 0 {
        let n = seq.len().min(capacity - 1);
        std::ptr::copy_nonoverlapping(seq.as_ptr() as *const c_char, buffer, n);
        *buffer.add(n) = 0;
    }
    seq.len() as i64
}

/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_get_degree(
    graph: *const VariationGraph,
    handle: u64,
    go_left: bool,
) -> u64 {
    graph_ref(graph).map_or(0, |g| g.get_degree(Handle::from_u64(handle), go_left) as u64)
}

/// # Safety
/// `graph` must be valid or null; `callback` must be safe to call with
/// `ctx`.
#[no_mangle]
pub unsafe extern "C" fn seqweave_follow_edges(
    graph: *const VariationGraph,
    handle: u64,
    go_left: bool,
    callback: SeqweaveHandleCallback,
    ctx: *mut c_void,
) -> bool {
    graph_ref(graph).map_or(false, |g| {
        g.follow_edges(Handle::from_u64(handle), go_left, |h| unsafe {
            callback(h.as_u64(), ctx)
        })
    })
}

/// # Safety
/// As [`seqweave_follow_edges`].
#[no_mangle]
pub unsafe extern "C" fn seqweave_for_each_handle(
    graph: *const VariationGraph,
    callback: SeqweaveHandleCallback,
    ctx: *mut c_void,
) -> bool {
    graph_ref(graph).map_or(false, |g| {
        g.for_each_handle(|h| unsafe { callback(h.as_u64(), ctx) })
    })
}

/// # Safety
/// As [`seqweave_follow_edges`].
#[no_mangle]
pub unsafe extern "C" fn seqweave_for_each_edge(
    graph: *const VariationGraph,
    callback: SeqweaveEdgeCallback,
    ctx: *mut c_void,
) -> bool {
    graph_ref(graph).map_or(false, |g| {
        g.for_each_edge(|Edge(a, b)| unsafe {
            callback(SeqweaveEdge { first: a.as_u64(), second: b.as_u64() }, ctx)
        })
    })
}

/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_path_count(graph: *const VariationGraph) -> u64 {
    graph_ref(graph).map_or(0, |g| g.get_path_count() as u64)
}

/// # Safety
/// `graph` must be valid or null; `name` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn seqweave_has_path(
    graph: *const VariationGraph,
    name: *const c_char,
) -> bool {
    let (g, name) = match (graph_ref(graph), name.is_null()) {
        (Some(g), false) => (g, CStr::from_ptr(name).to_string_lossy()),
        _ => return false,
    };
    g.has_path(&name)
}

/// # Safety
/// As [`seqweave_has_path`].
#[no_mangle]
pub unsafe extern "C" fn seqweave_get_path_handle(
    graph: *const VariationGraph,
    name: *const c_char,
) -> u64 {
    let (g, name) = match (graph_ref(graph), name.is_null()) {
        (Some(g), false) => (g, CStr::from_ptr(name).to_string_lossy()),
        _ => return SEQWEAVE_INVALID_HANDLE,
    };
    g.get_path_handle(&name).map_or(SEQWEAVE_INVALID_HANDLE, |p| p.0)
}

/// Copy a path's name into `buffer`, NUL-terminated and truncated to
/// `capacity`. Returns the full name length, or -1 when unknown.
///
/// # Safety
/// As [`seqweave_get_sequence`].
#[no_mangle]
pub unsafe extern "C" fn seqweave_get_path_name(
    graph: *const VariationGraph,
    path: u64,
    buffer: *mut c_char,
    capacity: usize,
) -> i64 {
    let name = match graph_ref(graph).and_then(|g| g.get_path_name(PathHandle(path))) {
        Some(name) => name,
        None => return -1,
    };
    let bytes = name.as_bytes();
    if !buffer.is_null() && capacity > 0 {
        let n = bytes.len().min(capacity - 1);
        std::ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, buffer, n);
        *buffer.add(n) = 0;
    }
    bytes.len() as i64
}

/// # Safety
/// As [`seqweave_has_path`].
#[no_mangle]
pub unsafe extern "C" fn seqweave_create_path_handle(
    graph: *mut VariationGraph,
    name: *const c_char,
) -> u64 {
    let (g, name) = match (graph_mut(graph), name.is_null()) {
        (Some(g), false) => (g, CStr::from_ptr(name).to_string_lossy().into_owned()),
        _ => return SEQWEAVE_INVALID_HANDLE,
    };
    g.create_path_handle(&name).map_or(SEQWEAVE_INVALID_HANDLE, |p| p.0)
}

/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_destroy_path(graph: *mut VariationGraph, path: u64) -> bool {
    graph_mut(graph).map_or(false, |g| g.destroy_path(PathHandle(path)).is_ok())
}

/// Append a visit of `handle` to a path; returns the new occurrence's
/// rank, or `SEQWEAVE_INVALID_HANDLE` on failure.
///
/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_append_occurrence(
    graph: *mut VariationGraph,
    path: u64,
    handle: u64,
) -> u64 {
    graph_mut(graph).map_or(SEQWEAVE_INVALID_HANDLE, |g| {
        g.append_occurrence(PathHandle(path), Handle::from_u64(handle))
            .map_or(SEQWEAVE_INVALID_HANDLE, |occ| occ.rank as u64)
    })
}

/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_occurrence_count(graph: *const VariationGraph, path: u64) -> u64 {
    graph_ref(graph).map_or(0, |g| g.get_occurrence_count(PathHandle(path)) as u64)
}

/// Node handle visited by occurrence (`path`, `rank`), or the invalid
/// sentinel for dangling or out-of-range occurrences.
///
/// # Safety
/// `graph` must be a valid graph pointer or null.
#[no_mangle]
pub unsafe extern "C" fn seqweave_get_occurrence(
    graph: *const VariationGraph,
    path: u64,
    rank: u64,
) -> u64 {
    graph_ref(graph)
        .and_then(|g| g.get_occurrence(OccurrenceHandle::new(PathHandle(path), rank as usize)))
        .map_or(SEQWEAVE_INVALID_HANDLE, |h| h.as_u64())
}

/// # Safety
/// As [`seqweave_follow_edges`].
#[no_mangle]
pub unsafe extern "C" fn seqweave_for_each_path_handle(
    graph: *const VariationGraph,
    callback: SeqweavePathCallback,
    ctx: *mut c_void,
) -> bool {
    graph_ref(graph).map_or(false, |g| {
        g.for_each_path_handle(|p| unsafe { callback(p.0, ctx) })
    })
}

/// # Safety
/// As [`seqweave_follow_edges`].
#[no_mangle]
pub unsafe extern "C" fn seqweave_for_each_occurrence_in_path(
    graph: *const VariationGraph,
    path: u64,
    callback: SeqweaveOccurrenceCallback,
    ctx: *mut c_void,
) -> bool {
    graph_ref(graph).map_or(false, |g| {
        g.for_each_occurrence_in_path(PathHandle(path), |occ| unsafe {
            callback(occ.path.0, occ.rank as u64, ctx)
        })
    })
}
