//! Dynamic run-length-encoded byte string.
//!
//! Backs the dead-base stream, whose values come from a tiny alphabet
//! and change in long, contiguous sweeps. Runs sit in order in a vector;
//! a Fenwick tree over run lengths locates the run holding a position in
//! O(log runs). Structural changes (splits, coalesces) rebuild the
//! length index, which stays cheap because the run count is small
//! relative to the positions covered.

use crate::fenwick::Fenwick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    value: u8,
    len: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RleVec {
    runs: Vec<Run>,
    lens: Fenwick,
    len: usize,
}

impl RleVec {
    pub fn new() -> Self {
        RleVec::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        *self = RleVec::new();
    }

    fn rebuild_index(&mut self) {
        let lens: Vec<u64> = self.runs.iter().map(|r| r.len as u64).collect();
        self.lens = Fenwick::from_slice(&lens);
    }

    /// Run index and offset within the run for position `i`.
    fn locate(&self, i: usize) -> (usize, usize) {
        let r = self.lens.search(i as u64).expect("rle index out of range");
        (r, i - self.lens.prefix(r) as usize)
    }

    pub fn access(&self, i: usize) -> u8 {
        assert!(i < self.len, "rle index {} out of range (len {})", i, self.len);
        let (r, _) = self.locate(i);
        self.runs[r].value
    }

    /// Occurrences of `v` in `[0, i)`.
    pub fn rank(&self, v: u8, i: usize) -> usize {
        assert!(i <= self.len, "rank index {} out of range (len {})", i, self.len);
        if i == 0 {
            return 0;
        }
        let (r, off) = if i == self.len {
            (self.runs.len(), 0)
        } else {
            self.locate(i)
        };
        let mut count: usize = self.runs[..r]
            .iter()
            .filter(|run| run.value == v)
            .map(|run| run.len)
            .sum();
        if r < self.runs.len() && self.runs[r].value == v {
            count += off;
        }
        count
    }

    /// Total occurrences of `v`.
    pub fn count(&self, v: u8) -> usize {
        self.runs.iter().filter(|r| r.value == v).map(|r| r.len).sum()
    }

    /// Insert `n` copies of `v` before position `i`.
    pub fn insert_run(&mut self, i: usize, v: u8, n: usize) {
        assert!(i <= self.len, "rle index {} out of range (len {})", i, self.len);
        if n == 0 {
            return;
        }
        if i == self.len {
            if let Some(last) = self.runs.last_mut() {
                if last.value == v {
                    last.len += n;
                    self.len += n;
                    self.rebuild_index();
                    return;
                }
            }
            self.runs.push(Run { value: v, len: n });
        } else {
            let (r, off) = self.locate(i);
            if self.runs[r].value == v {
                self.runs[r].len += n;
            } else if off == 0 {
                if r > 0 && self.runs[r - 1].value == v {
                    self.runs[r - 1].len += n;
                } else {
                    self.runs.insert(r, Run { value: v, len: n });
                }
            } else {
                // Split the run around the insertion point
                let tail = self.runs[r].len - off;
                self.runs[r].len = off;
                self.runs.insert(r + 1, Run { value: v, len: n });
                self.runs.insert(r + 2, Run { value: self.runs[r].value, len: tail });
            }
        }
        self.len += n;
        self.rebuild_index();
    }

    /// Delete positions `[i, i + n)`.
    pub fn remove_range(&mut self, i: usize, n: usize) {
        assert!(i + n <= self.len, "rle range {}..{} out of range (len {})", i, i + n, self.len);
        if n == 0 {
            return;
        }
        let mut rewritten: Vec<Run> = Vec::with_capacity(self.runs.len());
        let mut pos = 0;
        for run in &self.runs {
            let run_start = pos;
            let run_end = pos + run.len;
            pos = run_end;
            if run_start < i {
                let keep = run.len.min(i - run_start);
                rewritten.push(Run { value: run.value, len: keep });
            }
            if run_end > i + n {
                let keep = run.len.min(run_end - (i + n));
                rewritten.push(Run { value: run.value, len: keep });
            }
        }
        let mut coalesced: Vec<Run> = Vec::with_capacity(rewritten.len());
        for run in rewritten {
            match coalesced.last_mut() {
                Some(last) if last.value == run.value => last.len += run.len,
                _ => coalesced.push(run),
            }
        }
        self.runs = coalesced;
        self.len -= n;
        self.rebuild_index();
    }

    /// Overwrite positions `[i, i + n)` with `v`.
    pub fn set_range(&mut self, i: usize, n: usize, v: u8) {
        assert!(i + n <= self.len, "rle range {}..{} out of range (len {})", i, i + n, self.len);
        if n == 0 {
            return;
        }
        // Rewrite the run list around the window, then coalesce.
        let mut rewritten: Vec<Run> = Vec::with_capacity(self.runs.len() + 2);
        let mut pos = 0;
        for run in &self.runs {
            let run_start = pos;
            let run_end = pos + run.len;
            pos = run_end;
            // Portion before the window
            if run_start < i {
                let keep = run.len.min(i - run_start);
                rewritten.push(Run { value: run.value, len: keep });
            }
            // Portion after the window
            if run_end > i + n {
                let keep = run.len.min(run_end - (i + n));
                // The window itself is emitted exactly once, when we pass it
                if run_start < i + n {
                    rewritten.push(Run { value: v, len: n });
                }
                rewritten.push(Run { value: run.value, len: keep });
            } else if run_end == i + n {
                rewritten.push(Run { value: v, len: n });
            }
        }
        // Coalesce adjacent equal-valued runs
        let mut coalesced: Vec<Run> = Vec::with_capacity(rewritten.len());
        for run in rewritten {
            match coalesced.last_mut() {
                Some(last) if last.value == run.value => last.len += run.len,
                _ => coalesced.push(run),
            }
        }
        self.runs = coalesced;
        self.rebuild_index();
    }
}
