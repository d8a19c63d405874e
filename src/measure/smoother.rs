use super::geometry::MeasurementSample;
use super::window::SlidingWindow;
use crate::config::SmoothingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Chest,
    Shoulder,
    UpperWaist,
}

/// 平滑化後の推定値
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SmoothedEstimate {
    pub chest_cm: Option<f32>,
    pub shoulder_cm: Option<f32>,
    pub upper_waist_cm: Option<f32>,
    /// 胸囲ウィンドウの max - min（サンプル不足なら None）
    pub chest_spread_cm: Option<f32>,
}

/// 指標ごとのスライディングウィンドウ中央値フィルタ
///
/// 1フレームの外れ値では中央値はほとんど動かないが、
/// 実際の変化にはウィンドウ長ぶん遅れる。
#[derive(Debug, Clone)]
pub struct MedianSmoother {
    chest: SlidingWindow<f32>,
    shoulder: SlidingWindow<f32>,
    upper_waist: SlidingWindow<f32>,
    min_spread_samples: usize,
}

impl MedianSmoother {
    pub fn new(capacity: usize, min_spread_samples: usize) -> Self {
        Self {
            chest: SlidingWindow::new(capacity),
            shoulder: SlidingWindow::new(capacity),
            upper_waist: SlidingWindow::new(capacity),
            min_spread_samples,
        }
    }

    pub fn from_config(config: &SmoothingConfig) -> Self {
        Self::new(config.window, config.min_spread_samples)
    }

    /// ウエストが無いフレームではウエストのウィンドウには触れない
    pub fn push(&mut self, sample: &MeasurementSample) -> SmoothedEstimate {
        self.chest.push(sample.chest_cm);
        self.shoulder.push(sample.shoulder_cm);
        if let Some(waist) = sample.upper_waist_cm {
            self.upper_waist.push(waist);
        }
        self.estimate()
    }

    pub fn estimate(&self) -> SmoothedEstimate {
        SmoothedEstimate {
            chest_cm: self.median(Metric::Chest),
            shoulder_cm: self.median(Metric::Shoulder),
            upper_waist_cm: self.median(Metric::UpperWaist),
            chest_spread_cm: self.spread(Metric::Chest),
        }
    }

    pub fn median(&self, metric: Metric) -> Option<f32> {
        self.window(metric).median()
    }

    /// サンプルが min_spread_samples 以上溜まってから max - min を返す
    pub fn spread(&self, metric: Metric) -> Option<f32> {
        let window = self.window(metric);
        if window.len() < self.min_spread_samples.max(1) {
            return None;
        }
        window.range()
    }

    pub fn len(&self, metric: Metric) -> usize {
        self.window(metric).len()
    }

    pub fn is_empty(&self) -> bool {
        self.chest.is_empty() && self.shoulder.is_empty() && self.upper_waist.is_empty()
    }

    pub fn reset(&mut self) {
        self.chest.clear();
        self.shoulder.clear();
        self.upper_waist.clear();
    }

    fn window(&self, metric: Metric) -> &SlidingWindow<f32> {
        match metric {
            Metric::Chest => &self.chest,
            Metric::Shoulder => &self.shoulder,
            Metric::UpperWaist => &self.upper_waist,
        }
    }
}

impl Default for MedianSmoother {
    fn default() -> Self {
        Self::from_config(&SmoothingConfig::default())
    }
}
