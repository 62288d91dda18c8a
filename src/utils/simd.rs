//! Lane-parallel reductions
//!
//! Accumulates count, sum, sum of squares, min and max over a slice in
//! `LANES` independent lanes, reduces the lanes horizontally and finishes
//! with a scalar loop over the remainder. The AVX path and the portable
//! path use the same association order, so they agree bit for bit.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// Number of `f64` lanes per vector (256-bit registers)
pub const LANES: usize = 4;

/// Running first and second moments of a stream of values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub count: usize,
    pub sum: f64,
    pub sum_sq: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for Moments {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Moments {
    /// Add one value
    #[inline]
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Arithmetic mean, 0 when empty
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    /// Population variance; exactly 0 when every value was identical
    ///
    /// NaN when the accumulated sums overflowed.
    pub fn variance(&self) -> f64 {
        if self.count < 2 || self.spread() == 0.0 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self.sum_sq / self.count as f64 - mean * mean;
        if !variance.is_finite() {
            return f64::NAN;
        }
        variance.max(0.0)
    }

    /// Population standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// `max - min`, 0 when empty
    pub fn spread(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.max - self.min
    }
}

/// Lane-parallel statistics over `f64` slices
pub struct SimdOps;

impl SimdOps {
    /// Moments of `data` accumulated in `LANES` lanes
    pub fn moments(data: &[f64]) -> Moments {
        let (sum, sum_sq) = Self::sum_and_sum_sq(data);
        let (min, max) = Self::min_max(data);
        Moments {
            count: data.len(),
            sum,
            sum_sq,
            min,
            max,
        }
    }

    /// Sum and sum of squares
    #[cfg(target_arch = "x86_64")]
    pub fn sum_and_sum_sq(data: &[f64]) -> (f64, f64) {
        if !is_x86_feature_detected!("avx2") || data.len() < LANES {
            return Self::sum_and_sum_sq_lanes(data);
        }

        unsafe { Self::sum_and_sum_sq_avx(data) }
    }

    #[cfg(not(target_arch = "x86_64"))]
    pub fn sum_and_sum_sq(data: &[f64]) -> (f64, f64) {
        Self::sum_and_sum_sq_lanes(data)
    }

    /// Portable lane accumulation, used when AVX is unavailable
    pub fn sum_and_sum_sq_lanes(data: &[f64]) -> (f64, f64) {
        let chunks = data.chunks_exact(LANES);
        let remainder = chunks.remainder();

        let mut sum = [0.0f64; LANES];
        let mut sum_sq = [0.0f64; LANES];

        for chunk in chunks {
            for lane in 0..LANES {
                sum[lane] += chunk[lane];
                sum_sq[lane] += chunk[lane] * chunk[lane];
            }
        }

        let mut total = Self::horizontal(sum);
        let mut total_sq = Self::horizontal(sum_sq);

        for &val in remainder {
            total += val;
            total_sq += val * val;
        }

        (total, total_sq)
    }

    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx2")]
    unsafe fn sum_and_sum_sq_avx(data: &[f64]) -> (f64, f64) {
        let chunks = data.chunks_exact(LANES);
        let remainder = chunks.remainder();

        let mut sum_vec = _mm256_setzero_pd();
        let mut sq_vec = _mm256_setzero_pd();

        for chunk in chunks {
            let vec = _mm256_loadu_pd(chunk.as_ptr());
            sum_vec = _mm256_add_pd(sum_vec, vec);
            sq_vec = _mm256_add_pd(sq_vec, _mm256_mul_pd(vec, vec));
        }

        let mut total = Self::horizontal_avx(sum_vec);
        let mut total_sq = Self::horizontal_avx(sq_vec);

        for &val in remainder {
            total += val;
            total_sq += val * val;
        }

        (total, total_sq)
    }

    // (l0 + l2) + (l1 + l3), matching `horizontal`
    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx2")]
    unsafe fn horizontal_avx(v: __m256d) -> f64 {
        let low = _mm256_castpd256_pd128(v);
        let high = _mm256_extractf128_pd(v, 1);
        let sum128 = _mm_add_pd(low, high);
        let high64 = _mm_unpackhi_pd(sum128, sum128);
        _mm_cvtsd_f64(_mm_add_sd(sum128, high64))
    }

    #[inline]
    fn horizontal(lanes: [f64; LANES]) -> f64 {
        (lanes[0] + lanes[2]) + (lanes[1] + lanes[3])
    }

    /// Minimum and maximum; `(inf, -inf)` when empty
    pub fn min_max(data: &[f64]) -> (f64, f64) {
        let chunks = data.chunks_exact(LANES);
        let remainder = chunks.remainder();

        let mut min = [f64::INFINITY; LANES];
        let mut max = [f64::NEG_INFINITY; LANES];

        for chunk in chunks {
            for lane in 0..LANES {
                min[lane] = min[lane].min(chunk[lane]);
                max[lane] = max[lane].max(chunk[lane]);
            }
        }

        let mut lo = min.iter().copied().fold(f64::INFINITY, f64::min);
        let mut hi = max.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        for &val in remainder {
            lo = lo.min(val);
            hi = hi.max(val);
        }
        (lo, hi)
    }

    /// Euclidean norm
    pub fn norm(data: &[f64]) -> f64 {
        Self::sum_and_sum_sq(data).1.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(data: &[f64]) -> Moments {
        let mut m = Moments::default();
        for &v in data {
            m.push(v);
        }
        m
    }

    #[test]
    fn test_lane_moments_match_scalar() {
        let data: Vec<f64> = (0..23).map(|i| (i as f64 * 0.37).sin()).collect();
        let lanes = SimdOps::moments(&data);
        let seq = scalar(&data);

        assert_eq!(lanes.count, seq.count);
        assert!((lanes.sum - seq.sum).abs() < 1e-12);
        assert!((lanes.sum_sq - seq.sum_sq).abs() < 1e-12);
        assert_eq!(lanes.min, seq.min);
        assert_eq!(lanes.max, seq.max);
    }

    #[test]
    fn test_avx_and_portable_agree() {
        let data: Vec<f64> = (0..101).map(|i| 1.0 / (i as f64 + 1.0)).collect();
        assert_eq!(
            SimdOps::sum_and_sum_sq(&data),
            SimdOps::sum_and_sum_sq_lanes(&data)
        );
    }

    #[test]
    fn test_remainder_only() {
        let data = [1.0, 2.0, 3.0];
        let m = SimdOps::moments(&data);
        assert_eq!(m.sum, 6.0);
        assert_eq!(m.sum_sq, 14.0);
        assert_eq!((m.min, m.max), (1.0, 3.0));
    }

    #[test]
    fn test_variance() {
        let m = scalar(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((m.mean() - 5.0).abs() < 1e-12);
        assert!((m.std_dev() - 2.0).abs() < 1e-12);

        let constant = scalar(&[0.1 + 0.2; 37]);
        assert_eq!(constant.variance(), 0.0);
        assert_eq!(constant.spread(), 0.0);

        assert_eq!(Moments::default().mean(), 0.0);
        assert_eq!(scalar(&[3.0]).variance(), 0.0);
    }

    #[test]
    fn test_overflowing_sums_give_nan_variance() {
        let m = scalar(&[1e160, 2e160]);
        assert!(m.sum_sq.is_infinite());
        assert!(m.variance().is_nan());
        assert!(m.std_dev().is_nan());
        assert!(m.mean().is_finite());
    }

    #[test]
    fn test_norm() {
        assert!((SimdOps::norm(&[3.0, 4.0]) - 5.0).abs() < 1e-12);
        assert_eq!(SimdOps::norm(&[]), 0.0);
    }
}
