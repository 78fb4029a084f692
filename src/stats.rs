//! Integer statistics over sample windows
//!
//! Average and RMS with truncating integer arithmetic. Sums are accumulated
//! wide enough that no `i32` input can overflow them.

use thiserror::Error;

/// Statistics errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("statistics window is empty")]
    EmptyWindow,

    #[error("result does not fit in 32 bits")]
    Overflow,
}

/// Integer mean with truncating division
pub fn average(samples: &[i32]) -> Result<i32, StatsError> {
    if samples.is_empty() {
        return Err(StatsError::EmptyWindow);
    }

    let sum: i64 = samples.iter().map(|&s| s as i64).sum();
    // Mean of i32 values always lies within i32
    Ok((sum / samples.len() as i64) as i32)
}

/// Root-mean-square deviation from the integer mean, floored
pub fn rms(samples: &[i32]) -> Result<i32, StatsError> {
    let avg = average(samples)? as i64;

    // A single squared deviation can reach 2^64
    let sum_sq: u128 = samples
        .iter()
        .map(|&s| {
            let diff = (s as i64 - avg).unsigned_abs() as u128;
            diff * diff
        })
        .sum();
    let mean_sq = sum_sq / samples.len() as u128;

    i32::try_from(isqrt(mean_sq)).map_err(|_| StatsError::Overflow)
}

/// The `len` most recent samples of `samples` (all of them if shorter)
pub fn window(samples: &[i32], len: usize) -> &[i32] {
    &samples[samples.len().saturating_sub(len)..]
}

/// Floor of the square root
fn isqrt(value: u128) -> u128 {
    let mut root = (value as f64).sqrt() as u128;
    // f64 can be off by one for large inputs
    while root * root > value {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= value {
        root += 1;
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_truncates() {
        assert_eq!(average(&[1, 2]), Ok(1));
        assert_eq!(average(&[10, 20, 30]), Ok(20));
        assert_eq!(average(&[1, 1, 2]), Ok(1));
        // Truncation toward zero, not floor
        assert_eq!(average(&[-1, -2]), Ok(-1));
    }

    #[test]
    fn test_average_matches_sum_over_len() {
        let samples: Vec<i32> = (0..60).map(|i| (i * 37 + 11) % 4096).collect();
        let expected = samples.iter().sum::<i32>() / samples.len() as i32;
        assert_eq!(average(&samples), Ok(expected));
    }

    #[test]
    fn test_empty_window_rejected() {
        assert_eq!(average(&[]), Err(StatsError::EmptyWindow));
        assert_eq!(rms(&[]), Err(StatsError::EmptyWindow));
    }

    #[test]
    fn test_rms_constant_is_zero() {
        for k in [0, 1, 2047, 4095] {
            assert_eq!(rms(&[k; 50]), Ok(0));
        }
    }

    #[test]
    fn test_rms_square_wave() {
        // +/-100 around 2048 → deviation exactly 100
        let samples: Vec<i32> = (0..50).map(|i| if i % 2 == 0 { 2148 } else { 1948 }).collect();
        assert_eq!(rms(&samples), Ok(100));
    }

    #[test]
    fn test_rms_floors() {
        // avg = 1, squared diffs = 1, 0, 1 → mean 0 (truncated) → 0
        assert_eq!(rms(&[0, 1, 2]), Ok(0));
        // avg = 5, squared diffs = 25, 25 → 25 → 5
        assert_eq!(rms(&[0, 10]), Ok(5));
        // avg = 2, squared diffs = 4, 1, 9 → 14/3 = 4 → 2
        assert_eq!(rms(&[0, 1, 5]), Ok(2));
    }

    #[test]
    fn test_window_takes_most_recent() {
        let samples = [1, 2, 3, 4, 5];
        assert_eq!(window(&samples, 2), &[4, 5]);
        assert_eq!(window(&samples, 10), &samples);
        assert!(window(&samples, 0).is_empty());
    }

    #[test]
    fn test_isqrt() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(15), 3);
        assert_eq!(isqrt(16), 4);
        assert_eq!(isqrt(u32::MAX as u128), 65535);
        assert_eq!(isqrt(u64::MAX as u128), u32::MAX as u128);
    }

    #[test]
    fn test_rms_extreme_values() {
        let samples = [i32::MIN, i32::MIN, i32::MAX];
        let avg = average(&samples).unwrap() as i128;
        let mean_sq = samples
            .iter()
            .map(|&s| (s as i128 - avg).pow(2))
            .sum::<i128>()
            / 3;

        let r = rms(&samples).unwrap() as i128;
        assert!(r * r <= mean_sq);
        assert!((r + 1) * (r + 1) > mean_sq);
    }

    #[test]
    fn test_rms_full_range_fits() {
        // Half-range deviation is the largest possible RMS
        assert_eq!(rms(&[i32::MIN, i32::MAX]), Ok(i32::MAX));
    }
}
