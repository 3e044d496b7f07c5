// Distinct orderings of a multiset

/// Rearrange into the next lexicographic permutation. Returns false, leaving
/// the slice sorted ascending, when it already was the last one.
pub fn next_permutation<T: Ord>(items: &mut [T]) -> bool {
    if items.len() < 2 {
        return false;
    }
    let mut i = items.len() - 1;
    while i > 0 && items[i - 1] >= items[i] {
        i -= 1;
    }
    if i == 0 {
        items.reverse();
        return false;
    }
    let mut j = items.len() - 1;
    while items[j] <= items[i - 1] {
        j -= 1;
    }
    items.swap(i - 1, j);
    items[i..].reverse();
    true
}

/// Every distinct ordering of a multiset in lexicographic order, starting
/// from the ascending one.
#[derive(Debug, Clone)]
pub struct Orderings<T> {
    items: Vec<T>,
    started: bool,
    done: bool,
}

impl<T: Ord + Clone> Orderings<T> {
    pub fn new(mut items: Vec<T>) -> Self {
        items.sort();
        Self {
            items,
            started: false,
            done: false,
        }
    }

    /// Skip the remaining orderings that start with the first `len` items
    /// of the one last returned.
    pub fn skip_prefix(&mut self, len: usize) {
        if len < self.items.len() {
            self.items[len..].sort_by(|a, b| b.cmp(a));
        }
    }

    pub fn current(&self) -> &[T] {
        &self.items
    }
}

impl<T: Ord + Clone> Iterator for Orderings<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.items.clone());
        }
        if next_permutation(&mut self.items) {
            Some(self.items.clone())
        } else {
            self.done = true;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn distinct_orderings_once() {
        let all: Vec<_> = Orderings::new(vec![2, 1, 1]).collect();
        assert_eq!(all, vec![vec![1, 1, 2], vec![1, 2, 1], vec![2, 1, 1]]);

        let all: Vec<_> = Orderings::new(vec!['c', 'a', 'b', 'a']).collect();
        let unique: HashSet<_> = all.iter().cloned().collect();
        // 4! / 2!
        assert_eq!(all.len(), 12);
        assert_eq!(unique.len(), 12);
    }

    #[test]
    fn skip_prefix_jumps_past_shared_prefix() {
        let mut it = Orderings::new(vec![1, 2, 3, 4]);
        assert_eq!(it.next(), Some(vec![1, 2, 3, 4]));
        it.skip_prefix(2);
        assert_eq!(it.next(), Some(vec![1, 3, 2, 4]));
        it.skip_prefix(1);
        assert_eq!(it.next(), Some(vec![2, 1, 3, 4]));
        it.skip_prefix(0);
        assert_eq!(it.next(), None);
    }

    #[test]
    fn single_item() {
        let all: Vec<_> = Orderings::new(vec![7]).collect();
        assert_eq!(all, vec![vec![7]]);
    }
}
