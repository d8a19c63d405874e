use thiserror::Error;

use crate::config::CalibrationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CalibrationError {
    #[error("reference bar too narrow: {bar_px}px (minimum {min_px}px)")]
    BarTooNarrow { bar_px: f32, min_px: f32 },
    #[error("reference bar width is not a finite number")]
    NonFinite,
}

/// 確定したキャリブレーション。セッション中は不変
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationState {
    /// 利用者が合わせた基準バーのピクセル幅
    pub reference_pixel_width: f32,
    /// 基準物の物理幅（cm）
    pub reference_physical_width: f32,
    pub cm_per_pixel: f32,
}

impl CalibrationState {
    pub fn pixels_to_cm(&self, pixels: f32) -> f32 {
        pixels * self.cm_per_pixel
    }
}

/// 既知サイズの基準物（A4用紙など）から cm/px を求める
#[derive(Debug, Clone)]
pub struct ScaleCalibrator {
    reference_width_cm: f32,
    min_bar_px: f32,
}

impl ScaleCalibrator {
    pub fn new(reference_width_cm: f32, min_bar_px: f32) -> Self {
        Self {
            reference_width_cm,
            min_bar_px,
        }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(config.reference_width_cm, config.min_bar_px)
    }

    /// cm_per_pixel = 基準物理幅 / バーのピクセル幅
    pub fn calibrate(&self, bar_px: f32) -> Result<CalibrationState, CalibrationError> {
        if !bar_px.is_finite() {
            return Err(CalibrationError::NonFinite);
        }
        if bar_px < self.min_bar_px {
            return Err(CalibrationError::BarTooNarrow {
                bar_px,
                min_px: self.min_bar_px,
            });
        }
        Ok(CalibrationState {
            reference_pixel_width: bar_px,
            reference_physical_width: self.reference_width_cm,
            cm_per_pixel: self.reference_width_cm / bar_px,
        })
    }
}

impl Default for ScaleCalibrator {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}
