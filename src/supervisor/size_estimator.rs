/// 進度低於此值時不估算
pub const MIN_PROGRESS: f64 = 0.03;
const EPSILON: f64 = 1e-4;
const HISTORY_WEIGHT: f64 = 0.667;
const SAMPLE_WEIGHT: f64 = 0.333;

/// 由目前進度與輸出檔大小推估最終檔案大小，並以指數移動平均抑制跳動
#[derive(Debug, Clone, Default)]
pub struct SizeEstimator {
    estimate: Option<f64>,
}

impl SizeEstimator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `progress` 介於 0.0 ~ 1.0，`current_size` 為目前輸出檔位元組數
    pub fn update(&mut self, progress: f64, current_size: u64) -> Option<u64> {
        if progress < MIN_PROGRESS {
            return None;
        }

        let raw = current_size as f64 / progress.clamp(EPSILON, 1.0);
        let next = match self.estimate {
            Some(previous) => HISTORY_WEIGHT * previous + SAMPLE_WEIGHT * raw,
            None => raw,
        };
        self.estimate = Some(next);

        Some(next.round() as u64)
    }

    #[must_use]
    pub fn current(&self) -> Option<u64> {
        self.estimate.map(|e| e.round() as u64)
    }

    pub fn reset(&mut self) {
        self.estimate = None;
    }
}

/// 以 KiB / MiB / GiB 顯示檔案大小
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["bytes", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;

    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_estimate_below_threshold() {
        let mut estimator = SizeEstimator::new();
        assert_eq!(estimator.update(0.0, 0), None);
        assert_eq!(estimator.update(0.029, 1_000_000), None);
        assert_eq!(estimator.current(), None);
        assert!(estimator.update(0.03, 1_000_000).is_some());
    }

    #[test]
    fn test_first_estimate_is_unsmoothed() {
        let mut estimator = SizeEstimator::new();
        assert_eq!(estimator.update(0.5, 1_000), Some(2_000));
    }

    #[test]
    fn test_smoothed_step_never_exceeds_scaled_jump() {
        let mut estimator = SizeEstimator::new();
        let samples = [
            (0.05, 400_000_u64),
            (0.10, 1_200_000),
            (0.20, 1_500_000),
            (0.35, 4_900_000),
            (0.50, 5_000_000),
            (0.80, 12_000_000),
            (1.00, 13_000_000),
        ];

        let mut previous: Option<f64> = None;
        for (progress, size) in samples {
            let raw = size as f64 / progress;
            let estimate = estimator.update(progress, size).unwrap() as f64;
            if let Some(prev) = previous {
                let step = (estimate - prev).abs();
                let jump = (raw - prev).abs();
                assert!(step <= jump * SAMPLE_WEIGHT + 1.0, "step {step} jump {jump}");
            }
            previous = Some(estimate);
        }
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }
}
