use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seqweave::{Edge, Handle, VariationGraph};

const BASES: &[u8] = b"ACGTN";

fn random_sequence(rng: &mut StdRng) -> Vec<u8> {
    let len = rng.gen_range(1..=8);
    (0..len).map(|_| BASES[rng.gen_range(0..BASES.len())]).collect()
}

/// Build a random graph with embedded paths and hand back the ids of
/// nodes no path walks (safe to destroy or reorient in checks).
fn random_graph(rng: &mut StdRng, nodes: usize) -> (VariationGraph, Vec<u64>) {
    let mut g = VariationGraph::new();
    for _ in 0..nodes {
        g.create_handle(&random_sequence(rng)).unwrap();
    }
    for _ in 0..nodes * 2 {
        let a = Handle::new(rng.gen_range(1..=nodes as u64), rng.gen_bool(0.2));
        let b = Handle::new(rng.gen_range(1..=nodes as u64), rng.gen_bool(0.2));
        g.create_edge(a, b).unwrap();
    }
    let mut visited = vec![false; nodes + 1];
    for p in 0..3 {
        let path = g.create_path_handle(&format!("p{p}")).unwrap();
        for _ in 0..rng.gen_range(1..=6) {
            let id = rng.gen_range(1..=nodes as u64);
            visited[id as usize] = true;
            g.append_occurrence(path, Handle::new(id, rng.gen_bool(0.3))).unwrap();
        }
    }
    let free: Vec<u64> = (1..=nodes as u64).filter(|&id| !visited[id as usize]).collect();
    (g, free)
}

fn assert_graph_consistent(g: &VariationGraph) {
    // Counters agree with enumeration
    let mut nodes = 0;
    g.for_each_handle(|h| {
        assert!(g.has_node(h.node_id()));
        assert!(!h.is_reverse());
        nodes += 1;
        true
    });
    assert_eq!(nodes, g.node_size());

    let mut edges: Vec<Edge> = Vec::new();
    g.for_each_edge(|e| {
        edges.push(e);
        true
    });
    assert_eq!(edges.len(), g.edge_size());

    // Each edge appears once, canonically, and is reachable from both
    // of its ends with matching orientations
    for i in 0..edges.len() {
        for j in i + 1..edges.len() {
            assert_ne!(edges[i], edges[j], "edge emitted twice");
        }
    }
    for &Edge(a, b) in &edges {
        let mut seen = false;
        g.follow_edges(a, false, |h| {
            seen |= h == b;
            true
        });
        assert!(seen, "missing forward traversal of {a} -> {b}");
        let mut seen_back = false;
        g.follow_edges(b.flip(), false, |h| {
            seen_back |= h == a.flip();
            true
        });
        assert!(seen_back, "missing reverse traversal of {a} -> {b}");
    }

    // Degrees match enumeration on both strands and both sides
    g.for_each_handle(|h| {
        for handle in [h, h.flip()] {
            for go_left in [false, true] {
                let mut n = 0;
                g.follow_edges(handle, go_left, |_| {
                    n += 1;
                    true
                });
                assert_eq!(g.get_degree(handle, go_left), n);
            }
        }
        true
    });

    // Paths: counts match walks, ranks are ordinal
    g.for_each_path_handle(|p| {
        let count = g.get_occurrence_count(p);
        if let Some(mut occ) = g.get_first_occurrence(p) {
            let mut walked = 1;
            assert_eq!(g.get_ordinal_rank_of_occurrence(occ), 0);
            while g.has_next_occurrence(occ) {
                occ = g.get_next_occurrence(occ).unwrap();
                assert_eq!(g.get_ordinal_rank_of_occurrence(occ), walked);
                walked += 1;
            }
            assert_eq!(walked, count);
        } else {
            assert_eq!(count, 0);
        }
        true
    });
}

#[test]
fn test_random_graphs_are_consistent() {
    let mut rng = StdRng::seed_from_u64(1);
    for round in 0..10 {
        let (g, _) = random_graph(&mut rng, 6 + round);
        assert_graph_consistent(&g);
    }
}

#[test]
fn test_random_edge_churn() {
    let mut rng = StdRng::seed_from_u64(2);
    let (mut g, _) = random_graph(&mut rng, 8);
    for _ in 0..200 {
        let a = Handle::new(rng.gen_range(1..=8), rng.gen_bool(0.3));
        let b = Handle::new(rng.gen_range(1..=8), rng.gen_bool(0.3));
        if rng.gen_bool(0.5) {
            g.create_edge(a, b).unwrap();
        } else {
            g.destroy_edge(a, b);
        }
    }
    assert_graph_consistent(&g);
}

#[test]
fn test_random_destroys_keep_invariants() {
    let mut rng = StdRng::seed_from_u64(3);
    let (mut g, free) = random_graph(&mut rng, 12);
    for &id in free.iter().take(4) {
        g.destroy_handle(Handle::new(id, false)).unwrap();
        assert_graph_consistent(&g);
    }
}

#[test]
fn test_random_divides_preserve_path_sequences() {
    let mut rng = StdRng::seed_from_u64(4);
    let (mut g, _) = random_graph(&mut rng, 8);
    let mut expected: Vec<(seqweave::PathHandle, Vec<u8>)> = Vec::new();
    g.for_each_path_handle(|p| {
        expected.push((p, g.path_sequence(p).unwrap()));
        true
    });
    for _ in 0..6 {
        // Pick any live node long enough to split
        let mut candidates = Vec::new();
        g.for_each_handle(|h| {
            if g.get_length(h).unwrap() >= 2 {
                candidates.push(h);
            }
            true
        });
        if candidates.is_empty() {
            break;
        }
        let node = candidates[rng.gen_range(0..candidates.len())];
        let len = g.get_length(node).unwrap();
        let offset = rng.gen_range(1..len);
        let handle = if rng.gen_bool(0.5) { node } else { node.flip() };
        g.divide_handle(handle, &[offset]).unwrap();
        for (p, seq) in &expected {
            assert_eq!(&g.path_sequence(*p).unwrap(), seq, "path sequence changed by divide");
        }
        assert_graph_consistent(&g);
    }
}

#[test]
fn test_random_orientation_flips_are_involutive() {
    let mut rng = StdRng::seed_from_u64(5);
    let (mut g, free) = random_graph(&mut rng, 10);
    for &id in free.iter().take(4) {
        let before = g.get_sequence(Handle::new(id, false)).unwrap();
        let right_before = g.get_degree(Handle::new(id, false), false);
        let left_before = g.get_degree(Handle::new(id, false), true);
        g.apply_orientation(Handle::new(id, true)).unwrap();
        assert_graph_consistent(&g);
        // Flipping twice restores the original view
        g.apply_orientation(Handle::new(id, true)).unwrap();
        assert_eq!(g.get_sequence(Handle::new(id, false)).unwrap(), before);
        assert_eq!(g.get_degree(Handle::new(id, false), false), right_before);
        assert_eq!(g.get_degree(Handle::new(id, false), true), left_before);
        assert_graph_consistent(&g);
    }
}

#[test]
fn test_random_swaps_preserve_content() {
    let mut rng = StdRng::seed_from_u64(6);
    let (mut g, _) = random_graph(&mut rng, 8);
    let mut sequences: Vec<(u64, Vec<u8>)> = Vec::new();
    g.for_each_handle(|h| {
        sequences.push((h.node_id(), g.get_sequence(h).unwrap()));
        true
    });
    let mut path_seqs: Vec<(seqweave::PathHandle, Vec<u8>)> = Vec::new();
    g.for_each_path_handle(|p| {
        path_seqs.push((p, g.path_sequence(p).unwrap()));
        true
    });
    for _ in 0..10 {
        let a = rng.gen_range(1..=8);
        let b = rng.gen_range(1..=8);
        g.swap_handles(Handle::new(a, false), Handle::new(b, false)).unwrap();
        for (id, seq) in &sequences {
            assert_eq!(&g.get_sequence(Handle::new(*id, false)).unwrap(), seq);
        }
        for (p, seq) in &path_seqs {
            assert_eq!(&g.path_sequence(*p).unwrap(), seq);
        }
        assert_graph_consistent(&g);
    }
}
