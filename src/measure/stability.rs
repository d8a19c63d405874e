use super::window::SlidingWindow;
use crate::config::StabilityConfig;

/// 1フレーム分の静止判定結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityReading {
    pub stable: bool,
    /// ウィンドウ内のサンプル数
    pub filled: usize,
    pub mean: f32,
    /// 平均からの最大絶対偏差
    pub max_deviation: f32,
}

/// 正規化肩幅のスライディングウィンドウで静止を判定する
///
/// cm ではなく正規化座標で見るのでキャリブレーションに依存しない。
/// ウィンドウが満杯かつ最大偏差 < epsilon のときだけ stable。
#[derive(Debug, Clone)]
pub struct StabilityDetector {
    window: SlidingWindow<f32>,
    epsilon: f32,
}

impl StabilityDetector {
    pub fn new(capacity: usize, epsilon: f32) -> Self {
        Self {
            window: SlidingWindow::new(capacity),
            epsilon,
        }
    }

    pub fn from_config(config: &StabilityConfig) -> Self {
        Self::new(config.window, config.epsilon)
    }

    pub fn push(&mut self, normalized_shoulder_width: f32) -> StabilityReading {
        self.window.push(normalized_shoulder_width);
        self.reading()
    }

    pub fn reading(&self) -> StabilityReading {
        let mean = self.window.mean().unwrap_or(0.0);
        let max_deviation = self
            .window
            .iter()
            .map(|v| (v - mean).abs())
            .fold(0.0f32, f32::max);
        StabilityReading {
            stable: self.window.is_full() && max_deviation < self.epsilon,
            filled: self.window.len(),
            mean,
            max_deviation,
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for StabilityDetector {
    fn default() -> Self {
        Self::from_config(&StabilityConfig::default())
    }
}
