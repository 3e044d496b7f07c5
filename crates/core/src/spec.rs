// Converter configuration and quality presets

use crate::error::{ResampleError, Result};
use crate::ratio::Ratio;

/// Default per-call input and output capacity
pub const DEFAULT_BLOCK: usize = 4096;

/// ln(10) / 20
const LN10_20: f64 = 0.115_129_254_649_702_28;

/// Linear gain of `db` decibels
pub fn gain_db(db: f64) -> f64 {
    (db * LN10_20).exp()
}

/// Peak deviation equivalent to a peak-to-peak ripple of `db` decibels
pub fn ripple_db(db: f64) -> f64 {
    let g = gain_db(db.abs());
    (g - 1.0) / (g + 1.0)
}

/// Converter behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecFlags {
    /// Design minimum-phase filters (lower latency, nonlinear phase)
    pub minimum_phase: bool,
    /// Use overlap-save stages instead of polyphase ones
    pub frequency_domain: bool,
    /// Process in f64 instead of f32
    pub double_precision: bool,
}

impl Default for SpecFlags {
    fn default() -> Self {
        Self {
            minimum_phase: false,
            frequency_domain: true,
            double_precision: true,
        }
    }
}

/// Named quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Mq16,
    Hq16,
    Mq20,
    Hq20,
    Mq24,
    Hq24,
    PushingIt,
}

impl Quality {
    /// (passband ripple dB, stopband attenuation dB, passband width)
    fn parameters(&self) -> (f64, f64, f64) {
        match self {
            Quality::Mq16 => (0.005, -100.0, 0.90),
            Quality::Hq16 => (0.001, -100.0, 0.95),
            Quality::Mq20 => (0.001, -125.0, 0.90),
            Quality::Hq20 => (0.001, -125.0, 0.95),
            Quality::Mq24 => (0.001, -150.0, 0.90),
            Quality::Hq24 => (0.0005, -150.0, 0.95),
            Quality::PushingIt => (0.00001, -170.0, 0.98),
        }
    }
}

/// Full converter configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterSpec {
    pub ratio: Ratio,
    /// Largest input block accepted per `read`, per channel
    pub max_input: usize,
    /// Largest output block produced per `write`, per channel
    pub max_output: usize,
    /// Peak passband deviation, linear
    pub passband_ripple: f64,
    /// Peak stopband gain, linear
    pub stopband_ripple: f64,
    /// Fraction of the lower Nyquist frequency kept in the passband
    pub passband_width: f64,
    pub flags: SpecFlags,
}

impl ConverterSpec {
    pub fn from_preset(ratio: Ratio, quality: Quality) -> Self {
        let (dp, ds, bw) = quality.parameters();
        Self {
            ratio,
            max_input: DEFAULT_BLOCK,
            max_output: DEFAULT_BLOCK,
            passband_ripple: ripple_db(dp),
            stopband_ripple: gain_db(ds),
            passband_width: bw,
            flags: SpecFlags::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ratio.up == 0 || self.ratio.down == 0 {
            return Err(ResampleError::invalid(format!("invalid ratio {}", self.ratio)));
        }
        if self.max_input == 0 || self.max_output == 0 {
            return Err(ResampleError::invalid("block sizes must be positive"));
        }
        if !(self.passband_width > 0.0 && self.passband_width < 1.0) {
            return Err(ResampleError::invalid(format!(
                "passband width {} outside (0, 1)",
                self.passband_width
            )));
        }
        for (name, ripple) in [
            ("passband", self.passband_ripple),
            ("stopband", self.stopband_ripple),
        ] {
            if !(ripple > 0.0 && ripple < 1.0) {
                return Err(ResampleError::invalid(format!(
                    "{} ripple {} outside (0, 1)",
                    name, ripple
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn decibel_helpers() {
        assert!((gain_db(-20.0) - 0.1).abs() < 1e-12);
        assert!((gain_db(0.0) - 1.0).abs() < 1e-12);
        assert_eq!(ripple_db(0.1), ripple_db(-0.1));
        let r = ripple_db(0.001);
        assert!(r > 5.7e-5 && r < 5.8e-5, "{}", r);
    }

    #[rstest]
    #[case(Quality::Mq16)]
    #[case(Quality::Hq20)]
    #[case(Quality::PushingIt)]
    fn presets_validate(#[case] quality: Quality) {
        let spec = ConverterSpec::from_preset(Ratio { up: 160, down: 147 }, quality);
        spec.validate().unwrap();
    }

    #[test]
    fn stricter_presets_attenuate_more() {
        let r = Ratio { up: 2, down: 1 };
        let hq16 = ConverterSpec::from_preset(r, Quality::Hq16);
        let hq24 = ConverterSpec::from_preset(r, Quality::Hq24);
        assert!(hq24.stopband_ripple < hq16.stopband_ripple);
        assert!(hq24.passband_ripple < hq16.passband_ripple);
    }

    #[test]
    fn invalid_specs_rejected() {
        let base = ConverterSpec::from_preset(Ratio { up: 3, down: 2 }, Quality::Hq16);

        let mut s = base.clone();
        s.passband_width = 1.0;
        assert!(s.validate().is_err());

        let mut s = base.clone();
        s.stopband_ripple = 0.0;
        assert!(s.validate().is_err());

        let mut s = base.clone();
        s.max_output = 0;
        assert!(s.validate().is_err());

        let mut s = base;
        s.ratio = Ratio { up: 0, down: 1 };
        assert!(matches!(s.validate(), Err(ResampleError::InvalidArgument(_))));
    }
}
