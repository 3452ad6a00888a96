//! Fixed-point (Q15) real FFT.
//!
//! Mixed radix-4/radix-2 decimation in time with kissfft's 16-bit scaling:
//! every butterfly stage divides its inputs by the radix, so the transform
//! returns `X[k] / N` and never overflows. The real transform packs the even
//! and odd samples into one complex FFT of half length and untangles them
//! with a set of "super twiddles".

use std::f64::consts::PI;

use crate::error::FrontendError;

const FRAC_BITS: u32 = 15;
const SAMP_MAX: i32 = 32767;

/// Complex value with Q15 components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Complex16 {
    pub re: i16,
    pub im: i16,
}

impl Complex16 {
    pub const fn new(re: i16, im: i16) -> Self {
        Self { re, im }
    }

    fn add(self, other: Self) -> Self {
        Self::new(self.re.wrapping_add(other.re), self.im.wrapping_add(other.im))
    }

    fn sub(self, other: Self) -> Self {
        Self::new(self.re.wrapping_sub(other.re), self.im.wrapping_sub(other.im))
    }

    /// Rounded Q15 complex multiply.
    fn mul(self, other: Self) -> Self {
        let (ar, ai) = (self.re as i32, self.im as i32);
        let (br, bi) = (other.re as i32, other.im as i32);
        Self::new(
            round_q15((ar * br).wrapping_sub(ai * bi)),
            round_q15((ar * bi).wrapping_add(ai * br)),
        )
    }

    /// Divides both components by `div` in Q15.
    fn fix_div(self, div: i32) -> Self {
        let k = SAMP_MAX / div;
        Self::new(
            round_q15(self.re as i32 * k),
            round_q15(self.im as i32 * k),
        )
    }
}

#[inline]
fn round_q15(x: i32) -> i16 {
    (x.wrapping_add(1 << (FRAC_BITS - 1)) >> FRAC_BITS) as i16
}

/// Unit phasor quantized to Q15.
fn phasor(phase: f64) -> Complex16 {
    Complex16::new(
        (0.5 + SAMP_MAX as f64 * phase.cos()).floor() as i16,
        (0.5 + SAMP_MAX as f64 * phase.sin()).floor() as i16,
    )
}

/// Forward complex FFT plan for a power-of-two length.
struct ComplexFft {
    twiddles: Vec<Complex16>,
    /// `(radix, remaining length)` per stage.
    factors: Vec<(usize, usize)>,
}

impl ComplexFft {
    fn new(n: usize) -> Self {
        let twiddles = (0..n)
            .map(|i| phasor(-2.0 * PI * i as f64 / n as f64))
            .collect();

        let mut factors = Vec::new();
        let mut rest = n;
        while rest > 1 {
            let radix = if rest % 4 == 0 { 4 } else { 2 };
            rest /= radix;
            factors.push((radix, rest));
        }

        Self { twiddles, factors }
    }

    fn transform(&self, input: &[Complex16], output: &mut [Complex16]) {
        self.stage(output, input, 0, 1, 0);
    }

    fn stage(
        &self,
        out: &mut [Complex16],
        input: &[Complex16],
        offset: usize,
        fstride: usize,
        depth: usize,
    ) {
        let (radix, m) = self.factors[depth];
        if m == 1 {
            for (j, o) in out[..radix].iter_mut().enumerate() {
                *o = input[offset + j * fstride];
            }
        } else {
            for j in 0..radix {
                self.stage(
                    &mut out[j * m..(j + 1) * m],
                    input,
                    offset + j * fstride,
                    fstride * radix,
                    depth + 1,
                );
            }
        }

        match radix {
            2 => self.butterfly2(&mut out[..2 * m], fstride, m),
            _ => self.butterfly4(&mut out[..4 * m], fstride, m),
        }
    }

    fn butterfly2(&self, out: &mut [Complex16], fstride: usize, m: usize) {
        for k in 0..m {
            let a = out[k].fix_div(2);
            let b = out[k + m].fix_div(2);
            let t = b.mul(self.twiddles[k * fstride]);
            out[k + m] = a.sub(t);
            out[k] = a.add(t);
        }
    }

    fn butterfly4(&self, out: &mut [Complex16], fstride: usize, m: usize) {
        for k in 0..m {
            let f0 = out[k].fix_div(4);
            let f1 = out[k + m].fix_div(4);
            let f2 = out[k + 2 * m].fix_div(4);
            let f3 = out[k + 3 * m].fix_div(4);

            let s0 = f1.mul(self.twiddles[k * fstride]);
            let s1 = f2.mul(self.twiddles[2 * k * fstride]);
            let s2 = f3.mul(self.twiddles[3 * k * fstride]);

            let s5 = f0.sub(s1);
            let f0 = f0.add(s1);
            let s3 = s0.add(s2);
            let s4 = s0.sub(s2);

            out[k + 2 * m] = f0.sub(s3);
            out[k] = f0.add(s3);
            out[k + m] = Complex16::new(
                s5.re.wrapping_add(s4.im),
                s5.im.wrapping_sub(s4.re),
            );
            out[k + 3 * m] = Complex16::new(
                s5.re.wrapping_sub(s4.im),
                s5.im.wrapping_add(s4.re),
            );
        }
    }
}

/// Real-input FFT of `fft_size` samples producing `fft_size / 2 + 1` bins.
pub struct RealFft {
    fft_size: usize,
    half: ComplexFft,
    super_twiddles: Vec<Complex16>,
    packed: Vec<Complex16>,
    spectrum: Vec<Complex16>,
}

impl RealFft {
    pub fn new(fft_size: usize) -> Result<Self, FrontendError> {
        if fft_size < 4 || !fft_size.is_power_of_two() {
            return Err(FrontendError::InvalidConfig(format!(
                "fft size {fft_size} must be a power of two >= 4"
            )));
        }
        let ncfft = fft_size / 2;
        let super_twiddles = (0..ncfft / 2)
            .map(|i| phasor(-PI * ((i + 1) as f64 / ncfft as f64 + 0.5)))
            .collect();

        Ok(Self {
            fft_size,
            half: ComplexFft::new(ncfft),
            super_twiddles,
            packed: vec![Complex16::default(); ncfft],
            spectrum: vec![Complex16::default(); ncfft],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Transforms `input` (length `fft_size`) into `output`
    /// (length `fft_size / 2 + 1`).
    pub fn process(&mut self, input: &[i16], output: &mut [Complex16]) {
        let ncfft = self.fft_size / 2;
        for (p, pair) in self.packed.iter_mut().zip(input.chunks_exact(2)) {
            *p = Complex16::new(pair[0], pair[1]);
        }
        self.half.transform(&self.packed, &mut self.spectrum);

        let dc = self.spectrum[0].fix_div(2);
        output[0] = Complex16::new(dc.re.wrapping_add(dc.im), 0);
        output[ncfft] = Complex16::new(dc.re.wrapping_sub(dc.im), 0);

        for k in 1..=ncfft / 2 {
            let fpk = self.spectrum[k].fix_div(2);
            let mirror = self.spectrum[ncfft - k];
            let fpnk = Complex16::new(mirror.re, mirror.im.wrapping_neg()).fix_div(2);

            let f1k = fpk.add(fpnk);
            let f2k = fpk.sub(fpnk);
            let tw = f2k.mul(self.super_twiddles[k - 1]);

            output[k] = Complex16::new(
                ((f1k.re as i32 + tw.re as i32) >> 1) as i16,
                ((f1k.im as i32 + tw.im as i32) >> 1) as i16,
            );
            output[ncfft - k] = Complex16::new(
                ((f1k.re as i32 - tw.re as i32) >> 1) as i16,
                ((tw.im as i32 - f1k.im as i32) >> 1) as i16,
            );
        }
    }

    pub fn reset(&mut self) {
        self.packed.fill(Complex16::default());
        self.spectrum.fill(Complex16::default());
    }
}

/// Scales the windowed frame into the FFT input and runs the transform.
pub struct Fft {
    input_size: usize,
    input: Vec<i16>,
    output: Vec<Complex16>,
    real: RealFft,
}

impl Fft {
    /// Plans an FFT over the next power of two at or above `input_size`.
    pub fn new(input_size: usize) -> Result<Self, FrontendError> {
        let fft_size = input_size.next_power_of_two().max(4);
        Ok(Self {
            input_size,
            input: vec![0; fft_size],
            output: vec![Complex16::default(); fft_size / 2 + 1],
            real: RealFft::new(fft_size)?,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.real.fft_size()
    }

    /// Spectrum of the most recent [`Fft::compute`] call.
    pub fn output(&self) -> &[Complex16] {
        &self.output
    }

    /// Shifts `input` left by `input_scale_shift`, zero-pads, and transforms.
    pub fn compute(&mut self, input: &[i16], input_scale_shift: u32) {
        let n = self.input_size.min(input.len());
        for (dst, &x) in self.input.iter_mut().zip(&input[..n]) {
            *dst = ((x as u16) << input_scale_shift) as i16;
        }
        self.input[n..].fill(0);
        self.real.process(&self.input, &mut self.output);
    }

    pub fn reset(&mut self) {
        self.input.fill(0);
        self.output.fill(Complex16::default());
        self.real.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(input: &[i16]) -> Vec<Complex16> {
        let mut fft = RealFft::new(input.len()).unwrap();
        let mut out = vec![Complex16::default(); input.len() / 2 + 1];
        fft.process(input, &mut out);
        out
    }

    #[test]
    fn impulse_is_flat() {
        // X[k] / N for a unit impulse of height 8192 over 16 bins = 512.
        let mut input = vec![0i16; 16];
        input[0] = 8192;
        for bin in spectrum(&input) {
            assert!((bin.re as i32 - 512).abs() <= 1, "re = {}", bin.re);
            assert!(bin.im.abs() <= 1, "im = {}", bin.im);
        }
    }

    #[test]
    fn dc_lands_in_bin_zero() {
        let input = vec![4000i16; 64];
        let out = spectrum(&input);
        assert!((out[0].re as i32 - 4000).abs() <= 2, "dc = {}", out[0].re);
        for bin in &out[1..] {
            assert!(bin.re.abs() <= 2 && bin.im.abs() <= 2, "leak {:?}", bin);
        }
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let n = 512;
        let input: Vec<i16> = (0..n)
            .map(|i| (16000.0 * (2.0 * PI * 32.0 * i as f64 / n as f64).sin()) as i16)
            .collect();
        let out = spectrum(&input);

        // sin -> -j * A / 2 at the tone bin.
        assert!(out[32].re.abs() <= 2);
        assert!((out[32].im as i32 + 8000).abs() <= 3, "im = {}", out[32].im);
        for (k, bin) in out.iter().enumerate() {
            if k != 32 {
                assert!(bin.re.abs() <= 3 && bin.im.abs() <= 3, "bin {k}: {:?}", bin);
            }
        }
    }

    #[test]
    fn mixed_radix_sizes() {
        // 8 -> radix 4 then radix 2; 32 -> 4, 4, 2.
        for n in [8usize, 32, 128] {
            let mut input = vec![0i16; n];
            input[0] = 4096;
            let expected = 4096 / n as i32;
            for bin in spectrum(&input) {
                assert!((bin.re as i32 - expected).abs() <= 1, "n = {n}");
            }
        }
    }

    #[test]
    fn rejects_odd_sizes() {
        assert!(RealFft::new(6).is_err());
        assert!(RealFft::new(2).is_err());
    }

    #[test]
    fn windowed_alternating_input() {
        let windowed: [i16; 25] = [
            0, 1151, 0, -5944, 0, 13311, 0, -21448, 0, 28327, 0, -32256, 0, 32255, 0, -28328, 0,
            21447, 0, -13312, 0, 5943, 0, -1152, 0,
        ];
        let expected: [(i16, i16); 17] = [
            (0, 0),
            (-10, 9),
            (-20, 0),
            (-9, -10),
            (0, 25),
            (-119, 119),
            (-887, 0),
            (3000, 3000),
            (0, -6401),
            (-3000, 3000),
            (886, 0),
            (118, 119),
            (0, 25),
            (9, -10),
            (19, 0),
            (9, 9),
            (0, 0),
        ];

        let mut fft = Fft::new(25).unwrap();
        assert_eq!(fft.fft_size(), 32);
        fft.compute(&windowed, 0);
        let got: Vec<(i16, i16)> = fft.output().iter().map(|c| (c.re, c.im)).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn fft_pads_to_power_of_two() {
        let fft = Fft::new(480).unwrap();
        assert_eq!(fft.fft_size(), 512);
        assert_eq!(fft.output().len(), 257);
    }
}
