// Multiset partitions with a bounded number of parts

/// Iterator over the partitions of a multiset into at most `max_parts`
/// non-empty parts.
///
/// The multiset is given as a multiplicity per distinct element. Each part
/// is a multiplicity vector; parts of one partition come in non-increasing
/// lexicographic order, so every partition is produced exactly once. The
/// first item is the whole multiset as a single part.
#[derive(Debug, Clone)]
pub struct MultisetPartitions {
    counts: Vec<u32>,
    max_parts: usize,
    parts: Vec<Vec<u32>>,
    // avail[i] is what was left before parts[i] was taken
    avail: Vec<Vec<u32>>,
    started: bool,
    done: bool,
}

impl MultisetPartitions {
    pub fn new(counts: Vec<u32>, max_parts: usize) -> Self {
        let done = max_parts == 0 || counts.iter().all(|&c| c == 0);
        Self {
            counts,
            max_parts,
            parts: Vec::new(),
            avail: Vec::new(),
            started: false,
            done,
        }
    }

    fn remainder(&self) -> Vec<u32> {
        match (self.parts.last(), self.avail.last()) {
            (Some(p), Some(a)) => a.iter().zip(p).map(|(a, p)| a - p).collect(),
            _ => self.counts.clone(),
        }
    }

    /// Push greedy largest parts until nothing remains
    fn complete(&mut self) -> bool {
        loop {
            let rest = self.remainder();
            if rest.iter().all(|&c| c == 0) {
                return true;
            }
            if self.parts.len() == self.max_parts {
                return false;
            }
            match largest_part(&rest, self.parts.last().map(|p| p.as_slice())) {
                Some(part) => {
                    self.parts.push(part);
                    self.avail.push(rest);
                }
                None => return false,
            }
        }
    }
}

/// Largest vector, lexicographically, bounded componentwise by `avail` and
/// lexicographically by `bound`
fn largest_part(avail: &[u32], bound: Option<&[u32]>) -> Option<Vec<u32>> {
    let part: Vec<u32> = match bound {
        None => avail.to_vec(),
        Some(bound) => {
            let mut tight = true;
            avail
                .iter()
                .zip(bound)
                .map(|(&a, &b)| {
                    if tight {
                        let v = a.min(b);
                        if v < b {
                            tight = false;
                        }
                        v
                    } else {
                        a
                    }
                })
                .collect()
        }
    };
    part.iter().any(|&c| c != 0).then_some(part)
}

/// Largest non-zero vector lexicographically below `part` and bounded by
/// `avail`
fn previous_part(part: &[u32], avail: &[u32]) -> Option<Vec<u32>> {
    let i = part.iter().rposition(|&c| c != 0)?;
    let mut prev = part.to_vec();
    prev[i] -= 1;
    prev[i + 1..].copy_from_slice(&avail[i + 1..]);
    prev.iter().any(|&c| c != 0).then_some(prev)
}

impl Iterator for MultisetPartitions {
    type Item = Vec<Vec<u32>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            if self.complete() {
                return Some(self.parts.clone());
            }
        }

        loop {
            let t = match self.parts.len().checked_sub(1) {
                Some(t) => t,
                None => {
                    self.done = true;
                    return None;
                }
            };

            match previous_part(&self.parts[t], &self.avail[t]) {
                Some(prev) => {
                    self.parts[t] = prev;
                    if self.complete() {
                        return Some(self.parts.clone());
                    }
                }
                None => {
                    self.parts.pop();
                    self.avail.pop();
                }
            }
        }
    }
}
