// Stage factors and prime factorisation

use std::cmp::Ordering;
use std::fmt;

/// One stage factor in decimation terms: divide the running rate by `num`,
/// then multiply by `den`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn value(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let l = self.num as u64 * other.den as u64;
        let r = other.num as u64 * self.den as u64;
        l.cmp(&r).then_with(|| self.num.cmp(&other.num))
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Prime factorisation as (prime, power) pairs in ascending prime order
pub fn prime_factors(mut n: u32) -> Vec<(u32, u32)> {
    let mut factors = Vec::new();
    let mut p = 2u32;
    while (p as u64) * (p as u64) <= n as u64 {
        if n % p == 0 {
            let mut k = 0;
            while n % p == 0 {
                n /= p;
                k += 1;
            }
            factors.push((p, k));
        }
        p += if p == 2 { 1 } else { 2 };
    }
    if n > 1 {
        factors.push((n, 1));
    }
    factors
}
