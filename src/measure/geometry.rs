use thiserror::Error;

use super::calibration::CalibrationState;
use super::gate::GatedPose;
use crate::config::EstimatorConfig;

/// 数値的に信用できないフレーム。平滑化バッファには入れない
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeometryError {
    #[error("frame has zero pixel width")]
    EmptyFrame,
    #[error("calibration scale {0} is not usable")]
    InvalidScale(f32),
    #[error("shoulder span {0:.2}px is too small")]
    DegenerateShoulders(f32),
    #[error("torso length {0:.4} is too small")]
    DegenerateTorso(f32),
    #[error("measurement is not finite")]
    NonFinite,
}

/// 1フレーム分の瞬時推定値（cm）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementSample {
    pub chest_cm: f32,
    pub shoulder_cm: f32,
    /// 両腰が見えていないフレームでは None
    pub upper_waist_cm: Option<f32>,
}

/// 水平方向のピクセル距離
pub fn horizontal_span_px(a_x: f32, b_x: f32, frame_width: u32) -> f32 {
    (a_x - b_x).abs() * frame_width as f32
}

/// ランドマーク + cm/px → 肩幅・胸囲・上部ウエスト。内部状態なし
#[derive(Debug, Clone)]
pub struct GeometryEstimator {
    chest_multiplier: f32,
    upper_waist_factor: f32,
    min_shoulder_px: f32,
    min_torso_length: f32,
}

impl GeometryEstimator {
    pub fn from_config(config: &EstimatorConfig) -> Self {
        Self {
            chest_multiplier: config.chest_multiplier,
            upper_waist_factor: config.upper_waist_factor,
            min_shoulder_px: config.min_shoulder_px,
            min_torso_length: config.min_torso_length,
        }
    }

    pub fn estimate(
        &self,
        pose: &GatedPose,
        calibration: &CalibrationState,
    ) -> Result<MeasurementSample, GeometryError> {
        if pose.width == 0 {
            return Err(GeometryError::EmptyFrame);
        }
        let cm_per_px = calibration.cm_per_pixel;
        if !cm_per_px.is_finite() || cm_per_px <= f32::EPSILON {
            return Err(GeometryError::InvalidScale(cm_per_px));
        }

        let shoulder_px = horizontal_span_px(pose.left_shoulder.x, pose.right_shoulder.x, pose.width);
        if !(shoulder_px >= self.min_shoulder_px) {
            return Err(GeometryError::DegenerateShoulders(shoulder_px));
        }

        // 肩中点→腰の長さが潰れているのは誤検出
        let (mid_x, mid_y) = pose.left_shoulder.midpoint(&pose.right_shoulder);
        let torso = (pose.hip.0 - mid_x).hypot(pose.hip.1 - mid_y);
        if !(torso >= self.min_torso_length) {
            return Err(GeometryError::DegenerateTorso(torso));
        }

        let shoulder_cm = shoulder_px * cm_per_px;
        let chest_cm = shoulder_cm * self.chest_multiplier;
        let upper_waist_cm = pose.both_hips().and_then(|(left, right)| {
            let hip_px = horizontal_span_px(left.x, right.x, pose.width);
            (hip_px >= self.min_shoulder_px).then(|| hip_px * cm_per_px * self.upper_waist_factor)
        });

        let all_finite = shoulder_cm.is_finite()
            && chest_cm.is_finite()
            && upper_waist_cm.map_or(true, f32::is_finite);
        if !all_finite {
            return Err(GeometryError::NonFinite);
        }

        Ok(MeasurementSample {
            chest_cm,
            shoulder_cm,
            upper_waist_cm,
        })
    }
}

impl Default for GeometryEstimator {
    fn default() -> Self {
        Self::from_config(&EstimatorConfig::default())
    }
}
