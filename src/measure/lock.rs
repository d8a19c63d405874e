use serde::{Deserialize, Serialize};

use super::smoother::SmoothedEstimate;
use super::stability::StabilityReading;
use crate::config::LockConfig;

/// ロック時点の品質指標
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LockQuality {
    /// 計測開始からゲートを通過したフレーム数
    pub frame_count: u32,
    /// ロック時の胸囲 spread（cm）
    pub spread_cm: f32,
}

/// セッション終端で確定した寸法。以後は変更しない
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LockedMeasurement {
    pub chest_cm: f32,
    pub shoulder_cm: f32,
    pub upper_waist_cm: Option<f32>,
    pub quality: LockQuality,
}

/// 静止判定と数値収束の両方を満たしたときだけロックする
#[derive(Debug, Clone)]
pub struct LockCriteria {
    max_spread_cm: f32,
}

impl LockCriteria {
    pub fn new(max_spread_cm: f32) -> Self {
        Self { max_spread_cm }
    }

    pub fn from_config(config: &LockConfig) -> Self {
        Self::new(config.max_spread_cm)
    }

    /// 条件を満たせば確定値を返す
    pub fn evaluate(
        &self,
        stability: &StabilityReading,
        smoothed: &SmoothedEstimate,
        frame_count: u32,
    ) -> Option<LockedMeasurement> {
        if !stability.stable {
            return None;
        }
        let spread_cm = smoothed.chest_spread_cm.filter(|s| *s < self.max_spread_cm)?;
        let chest_cm = smoothed.chest_cm?;
        let shoulder_cm = smoothed.shoulder_cm?;
        Some(LockedMeasurement {
            chest_cm,
            shoulder_cm,
            upper_waist_cm: smoothed.upper_waist_cm,
            quality: LockQuality {
                frame_count,
                spread_cm,
            },
        })
    }
}

impl Default for LockCriteria {
    fn default() -> Self {
        Self::from_config(&LockConfig::default())
    }
}
