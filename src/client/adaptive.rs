use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    /// Transfer time each chunk should take at the observed throughput
    pub target_duration: Duration,
    /// Rolling window length
    pub window: usize,
    /// Samples needed before the size moves away from the default
    pub min_samples: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 1024 * 1024,
            max_chunk_size: 10 * 1024 * 1024,
            target_duration: Duration::from_secs(2),
            window: 10,
            min_samples: 3,
        }
    }
}

/// Rolling throughput estimate driving the size of future chunks.
///
/// Only plans made after a sample is recorded see its effect; a plan that is
/// already in flight keeps its layout.
#[derive(Debug)]
pub struct AdaptiveSizer {
    config: AdaptiveConfig,
    default_size: usize,
    samples: Mutex<VecDeque<f64>>,
}

impl AdaptiveSizer {
    pub fn new(config: AdaptiveConfig, default_size: usize) -> Self {
        let window = config.window.max(1);
        Self {
            config,
            default_size,
            samples: Mutex::new(VecDeque::with_capacity(window)),
        }
    }

    /// Records one successful chunk transfer.
    pub fn record(&self, bytes: usize, elapsed: Duration) {
        if bytes == 0 {
            return;
        }
        // Sub-millisecond responses would otherwise report absurd rates.
        let secs = elapsed.as_secs_f64().max(0.001);
        let throughput = bytes as f64 / secs;

        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.len() >= self.config.window.max(1) {
            samples.pop_front();
        }
        samples.push_back(throughput);
    }

    /// Average bytes per second over the window, once enough samples exist.
    pub fn average_throughput(&self) -> Option<f64> {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.is_empty() || samples.len() < self.config.min_samples {
            return None;
        }
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }

    pub fn next_chunk_size(&self) -> usize {
        match self.average_throughput() {
            Some(avg) => {
                let target = avg * self.config.target_duration.as_secs_f64();
                (target as usize).clamp(self.config.min_chunk_size, self.config.max_chunk_size)
            }
            None => self.default_size,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = 1024 * 1024;

    fn sizer() -> AdaptiveSizer {
        AdaptiveSizer::new(AdaptiveConfig::default(), 5 * MB)
    }

    #[test]
    fn test_default_until_enough_samples() {
        let sizer = sizer();
        sizer.record(MB, Duration::from_secs(1));
        sizer.record(MB, Duration::from_secs(1));
        assert_eq!(sizer.next_chunk_size(), 5 * MB);

        sizer.record(MB, Duration::from_secs(1));
        // 1 MB/s * 2s target
        assert_eq!(sizer.next_chunk_size(), 2 * MB);
    }

    #[test]
    fn test_clamped_to_bounds() {
        let fast = sizer();
        for _ in 0..3 {
            fast.record(100 * MB, Duration::from_secs(1));
        }
        assert_eq!(fast.next_chunk_size(), 10 * MB);

        let slow = sizer();
        for _ in 0..3 {
            slow.record(10 * 1024, Duration::from_secs(1));
        }
        assert_eq!(slow.next_chunk_size(), MB);
    }

    #[test]
    fn test_window_drops_oldest() {
        let sizer = sizer();
        for _ in 0..10 {
            sizer.record(100 * MB, Duration::from_secs(1));
        }
        for _ in 0..10 {
            sizer.record(MB, Duration::from_secs(1));
        }
        assert_eq!(sizer.sample_count(), 10);
        assert_eq!(sizer.next_chunk_size(), 2 * MB);
    }
}
