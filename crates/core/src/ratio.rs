// Resampling ratios and rational approximation

use crate::error::{ResampleError, Result};
use std::fmt;

/// Largest numerator or denominator produced by the approximations
pub const MAX_RATIO_TERM: u64 = u16::MAX as u64;

/// Output samples per input sample, `up / down`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ratio {
    pub up: u32,
    pub down: u32,
}

impl Ratio {
    /// Create a ratio; both terms must be positive
    pub fn new(up: u32, down: u32) -> Result<Self> {
        if up == 0 || down == 0 {
            return Err(ResampleError::invalid(format!(
                "ratio terms must be positive, got {}/{}",
                up, down
            )));
        }
        Ok(Self { up, down })
    }

    /// Ratio between two sample rates, approximated so that neither term
    /// exceeds [`MAX_RATIO_TERM`]
    pub fn from_rates(input_rate: u64, output_rate: u64) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(ResampleError::invalid("sample rates must be positive"));
        }

        let (hi, lo) = if output_rate > input_rate {
            (output_rate, input_rate)
        } else {
            (input_rate, output_rate)
        };
        let (q, r) = (hi / lo, hi % lo);
        if q > MAX_RATIO_TERM || (q == MAX_RATIO_TERM && r != 0) {
            return Err(ResampleError::invalid(format!(
                "rate ratio {}:{} is too extreme",
                output_rate, input_rate
            )));
        }

        let (up, down) = best_approximation(output_rate, input_rate, MAX_RATIO_TERM)?;
        Self::new(up as u32, down as u32)
    }

    /// Ratio approximating `x = output_rate / input_rate`
    pub fn from_real(x: f64) -> Result<Self> {
        if !(x > 0.0) || !x.is_finite() {
            return Err(ResampleError::invalid(format!("invalid real ratio {}", x)));
        }
        let (num, den) = exact_fraction(x)?;
        Self::from_rates(den, num)
    }

    /// The ratio divided through by the greatest common divisor
    pub fn reduced(&self) -> Self {
        let g = gcd(self.up as u64, self.down as u64) as u32;
        Self {
            up: self.up / g,
            down: self.down / g,
        }
    }

    /// True for 1/1 after reduction
    pub fn is_identity(&self) -> bool {
        self.up == self.down
    }

    /// Swap the terms
    pub fn inverse(&self) -> Self {
        Self {
            up: self.down,
            down: self.up,
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.up as f64 / self.down as f64
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.up, self.down)
    }
}

/// Greatest common divisor
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Best rational approximation of `num / den` whose larger term does not
/// exceed `bound`, using continued-fraction convergents.
pub fn best_approximation(num: u64, den: u64, bound: u64) -> Result<(u64, u64)> {
    if num == 0 || den == 0 || bound == 0 {
        return Err(ResampleError::invalid("cannot approximate a degenerate ratio"));
    }

    // Expand hi / lo >= 1; convergents h/k keep h as the larger term.
    let flipped = num < den;
    let (mut x, mut y) = if flipped { (den, num) } else { (num, den) };

    let (mut h1, mut h2) = (1u64, 0u64);
    let (mut k1, mut k2) = (0u64, 1u64);

    loop {
        let a = x / y;
        let rem = x % y;

        let h = a.checked_mul(h1).and_then(|v| v.checked_add(h2));
        let k = a.checked_mul(k1).and_then(|v| v.checked_add(k2));
        match (h, k) {
            (Some(h), Some(k)) if h <= bound => {
                h2 = h1;
                h1 = h;
                k2 = k1;
                k1 = k;
            }
            _ => break,
        }

        if rem == 0 {
            break;
        }
        x = y;
        y = rem;
    }

    if k1 == 0 {
        return Err(ResampleError::invalid(format!(
            "{}/{} has no approximation within {}",
            num, den, bound
        )));
    }

    Ok(if flipped { (k1, h1) } else { (h1, k1) })
}

/// Exact conversion of a positive double into `num / den`
fn exact_fraction(x: f64) -> Result<(u64, u64)> {
    let bits = x.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1u64 << 52) - 1);

    let (mut mantissa, mut exp) = if exponent == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), exponent - 1075)
    };

    while mantissa & 1 == 0 && exp < 0 {
        mantissa >>= 1;
        exp += 1;
    }

    if exp >= 0 {
        if exp >= 64 || mantissa.leading_zeros() < exp as u32 {
            return Err(ResampleError::invalid(format!("{} is out of range", x)));
        }
        Ok((mantissa << exp, 1))
    } else if -exp > 63 {
        Err(ResampleError::invalid(format!("{} is out of range", x)))
    } else {
        Ok((mantissa, 1u64 << (-exp)))
    }
}
