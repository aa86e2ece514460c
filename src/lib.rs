/*!
A dynamic succinct variation graph: a bidirected sequence graph with
embedded paths whose topology and paths both live in compressed,
self-indexed rank/select structures, yet stay fully mutable.

# Overview

The graph stores node ids, edge lists, sequences, and per-base path
annotations in dynamic wavelet trees and bit vectors, so every
operation — neighbour iteration, path walking, node division — reduces
to rank/select arithmetic. Nodes can be created, destroyed, reoriented,
and split; edges added and removed; paths extended; all while queries
stay near-logarithmic.

```
use seqweave::VariationGraph;

let mut graph = VariationGraph::new();
let n1 = graph.create_handle(b"CAAATAAG").unwrap();
let n2 = graph.create_handle(b"A").unwrap();
graph.create_edge(n1, n2).unwrap();

let path = graph.create_path_handle("x").unwrap();
graph.append_occurrence(path, n1).unwrap();
graph.append_occurrence(path, n2).unwrap();
assert_eq!(graph.path_sequence(path).unwrap(), b"CAAATAAGA");

// Reverse strand views come for free
assert_eq!(graph.get_sequence(n2.flip()).unwrap(), b"T");
```

# Concurrency

One writer, many readers: mutations require exclusive access, while the
`*_parallel` iteration variants fan queries out with rayon. Handles are
plain values, safe to copy across threads while no mutation runs.

# Layout

* [`handle`] — packed node/path/occurrence references and edge
  canonicalisation
* [`bitvec`], [`wavelet`], [`rle`], [`fenwick`] — the dynamic succinct
  primitives
* [`names`] — FM-indexed path-name store
* [`graph`] — the succinct stores and the full graph facade
* [`ffi`] — C-compatible projection of the facade
*/

pub mod bitvec;
pub mod dna;
pub mod error;
pub mod fenwick;
pub mod ffi;
pub mod graph;
pub mod handle;
pub mod names;
pub mod path;
pub mod rle;
pub mod wavelet;

pub use error::{GraphError, GraphResult};
pub use graph::VariationGraph;
pub use handle::{edge_handle, traverse_edge_handle, Edge, Handle, OccurrenceHandle, PathHandle};
