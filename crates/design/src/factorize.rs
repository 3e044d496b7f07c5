// Enumeration of multi-stage factorisations of a decimation ratio

use crate::partition::MultisetPartitions;
use crate::permute::Orderings;
use crate::rational::{prime_factors, Rational};

/// A prime of the numerator (`p/1`) or the denominator (`1/p`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Atom {
    factor: Rational,
    prime: u32,
    in_numerator: bool,
}

/// First stage whose output rate would fall below `den`, if any.
///
/// Running rate starts at `num`; stage `q` maps it to `rate / q.num * q.den`.
pub fn first_invalid(factors: &[Rational], num: u32, den: u32) -> Option<usize> {
    let mut rate = num as u64;
    for (i, q) in factors.iter().enumerate().take(factors.len().saturating_sub(1)) {
        rate = rate / q.num as u64 * q.den as u64;
        if rate < den as u64 {
            return Some(i);
        }
    }
    None
}

/// Iterator over every ordered factorisation of `num/den` (num > den) into
/// 2..=max_stages stage factors whose running rate never drops below `den`.
pub struct Factorizations {
    num: u32,
    den: u32,
    atoms: Vec<Atom>,
    partitions: MultisetPartitions,
    orderings: Option<Orderings<Rational>>,
    atom_count: usize,
}

impl Factorizations {
    pub fn new(num: u32, den: u32, max_stages: usize) -> Self {
        let mut atoms = Vec::new();
        let mut counts = Vec::new();
        for (p, k) in prime_factors(num) {
            atoms.push(Atom {
                factor: Rational::new(p, 1),
                prime: p,
                in_numerator: true,
            });
            counts.push(k);
        }
        for (p, k) in prime_factors(den) {
            atoms.push(Atom {
                factor: Rational::new(1, p),
                prime: p,
                in_numerator: false,
            });
            counts.push(k);
        }
        let atom_count = counts.iter().map(|&k| k as usize).sum();
        log::trace!(
            "Factorising {}/{}: atoms {:?}",
            num,
            den,
            atoms.iter().map(|a| a.factor).collect::<Vec<_>>()
        );

        Self {
            num,
            den,
            atoms,
            partitions: MultisetPartitions::new(counts, max_stages),
            orderings: None,
            atom_count,
        }
    }

    /// Prime factors of numerator and denominator, with multiplicity
    pub fn atom_count(&self) -> usize {
        self.atom_count
    }

    fn stage_factor(&self, part: &[u32]) -> Rational {
        let mut q = Rational::new(1, 1);
        for (atom, &k) in self.atoms.iter().zip(part) {
            let power = atom.prime.pow(k);
            if atom.in_numerator {
                q.num *= power;
            } else {
                q.den *= power;
            }
        }
        q
    }

    fn next_valid_ordering(&mut self) -> Option<Vec<Rational>> {
        let orderings = self.orderings.as_mut()?;
        while let Some(candidate) = orderings.next() {
            match first_invalid(&candidate, self.num, self.den) {
                None => return Some(candidate),
                Some(i) => orderings.skip_prefix(i + 1),
            }
        }
        None
    }
}

impl Iterator for Factorizations {
    type Item = Vec<Rational>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(found) = self.next_valid_ordering() {
                return Some(found);
            }
            let partition = self.partitions.next()?;
            if partition.len() < 2 {
                self.orderings = None;
                continue;
            }
            let factors = partition.iter().map(|p| self.stage_factor(p)).collect();
            self.orderings = Some(Orderings::new(factors));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(factors: &[Rational]) -> (u64, u64) {
        factors
            .iter()
            .fold((1, 1), |(n, d), q| (n * q.num as u64, d * q.den as u64))
    }

    #[test]
    fn four_to_one() {
        let all: Vec<_> = Factorizations::new(4, 1, 3).collect();
        assert_eq!(all, vec![vec![Rational::new(2, 1), Rational::new(2, 1)]]);
    }

    #[test]
    fn prefix_rule_rejects_early_overshoot() {
        // 3/2: only 1/2 then 3/1 keeps the rate at or above 2
        let all: Vec<_> = Factorizations::new(3, 2, 3).collect();
        assert_eq!(all, vec![vec![Rational::new(1, 2), Rational::new(3, 1)]]);
        assert_eq!(first_invalid(&[Rational::new(3, 1), Rational::new(1, 2)], 3, 2), Some(0));
    }

    #[test]
    fn every_factorisation_is_exact_and_valid() {
        let (num, den) = (160, 147);
        let mut seen = 0;
        for f in Factorizations::new(num, den, 3) {
            assert!(f.len() >= 2 && f.len() <= 3);
            assert_eq!(product(&f), (num as u64, den as u64));
            assert_eq!(first_invalid(&f, num, den), None);
            seen += 1;
        }
        assert!(seen > 0);
    }

    #[test]
    fn primes_have_no_multistage_form() {
        assert_eq!(Factorizations::new(7, 1, 3).count(), 0);
        assert_eq!(Factorizations::new(7, 1, 3).atom_count(), 1);
    }
}
