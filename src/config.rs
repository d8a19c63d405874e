use anyhow::{bail, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::sizing::{ClassifierMode, Gender};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// ランドマーク検証の設定
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// これ未満の visibility は欠損扱い
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f32,
    /// ガイド枠の内側マージン（正規化座標、各辺）
    #[serde(default = "default_guide_margin")]
    pub guide_margin: f32,
    /// 1フレームに必要なランドマーク数
    #[serde(default = "default_min_landmarks")]
    pub min_landmarks: usize,
}

/// 基準物によるスケールキャリブレーション
#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationConfig {
    /// 基準物の物理幅（cm）。A4短辺 = 21.0
    #[serde(default = "default_reference_width_cm")]
    pub reference_width_cm: f32,
    /// 基準バーの最小ピクセル幅
    #[serde(default = "default_min_bar_px")]
    pub min_bar_px: f32,
}

/// 1フレーム分の寸法推定に使う経験的係数
#[derive(Debug, Clone, Deserialize)]
pub struct EstimatorConfig {
    /// 肩幅 → 胸囲
    #[serde(default = "default_chest_multiplier")]
    pub chest_multiplier: f32,
    /// 腰幅 → 上部ウエスト
    #[serde(default = "default_upper_waist_factor")]
    pub upper_waist_factor: f32,
    /// これ未満の肩幅（ピクセル）は縮退フレームとして捨てる
    #[serde(default = "default_min_shoulder_px")]
    pub min_shoulder_px: f32,
    /// 肩中点→腰の長さの下限（正規化座標）
    #[serde(default = "default_min_torso_length")]
    pub min_torso_length: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StabilityConfig {
    #[serde(default = "default_stability_window")]
    pub window: usize,
    /// 平均からの最大偏差の許容値（正規化座標）
    #[serde(default = "default_stability_epsilon")]
    pub epsilon: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmoothingConfig {
    #[serde(default = "default_smoothing_window")]
    pub window: usize,
    /// spread を報告するのに必要なサンプル数
    #[serde(default = "default_min_spread_samples")]
    pub min_spread_samples: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    /// 胸囲 spread の上限（cm）
    #[serde(default = "default_max_spread_cm")]
    pub max_spread_cm: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub mode: ClassifierMode,
}

/// 推薦サービスへ渡すクエリの既定値
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub gender: Gender,
    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: u32,
    #[serde(default = "default_include_images_only")]
    pub include_images_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_visibility_threshold() -> f32 { 0.45 }
fn default_guide_margin() -> f32 { 0.08 }
fn default_min_landmarks() -> usize { 33 }
fn default_reference_width_cm() -> f32 { 21.0 }
fn default_min_bar_px() -> f32 { 40.0 }
fn default_chest_multiplier() -> f32 { 1.75 }
fn default_upper_waist_factor() -> f32 { 0.90 }
fn default_min_shoulder_px() -> f32 { 1.0 }
fn default_min_torso_length() -> f32 { 0.01 }
fn default_stability_window() -> usize { 12 }
fn default_stability_epsilon() -> f32 { 0.015 }
fn default_smoothing_window() -> usize { 15 }
fn default_min_spread_samples() -> usize { 8 }
fn default_max_spread_cm() -> f32 { 1.8 }
fn default_max_recommendations() -> u32 { 10 }
fn default_include_images_only() -> bool { true }
fn default_listen_addr() -> String { "127.0.0.1:9500".to_string() }

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_visibility_threshold(),
            guide_margin: default_guide_margin(),
            min_landmarks: default_min_landmarks(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            reference_width_cm: default_reference_width_cm(),
            min_bar_px: default_min_bar_px(),
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            chest_multiplier: default_chest_multiplier(),
            upper_waist_factor: default_upper_waist_factor(),
            min_shoulder_px: default_min_shoulder_px(),
            min_torso_length: default_min_torso_length(),
        }
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            window: default_stability_window(),
            epsilon: default_stability_epsilon(),
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window: default_smoothing_window(),
            min_spread_samples: default_min_spread_samples(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_spread_cm: default_max_spread_cm(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            gender: Gender::default(),
            max_recommendations: default_max_recommendations(),
            include_images_only: default_include_images_only(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルが無い・読めない場合は既定値で起動する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("config {} not loaded ({e:#}), using defaults", path.display());
                Self::default()
            }
        }
    }

    /// 係数の妥当性チェック
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.gate.visibility_threshold) {
            bail!("gate.visibility_threshold must be within [0, 1]");
        }
        if !(0.0..0.5).contains(&self.gate.guide_margin) {
            bail!("gate.guide_margin must be within [0, 0.5)");
        }
        if self.calibration.reference_width_cm <= 0.0 || self.calibration.min_bar_px <= 0.0 {
            bail!("calibration constants must be positive");
        }
        if self.estimator.chest_multiplier <= 0.0 || self.estimator.upper_waist_factor <= 0.0 {
            bail!("estimator factors must be positive");
        }
        if self.stability.window == 0 || self.smoothing.window == 0 {
            bail!("window sizes must be non-zero");
        }
        if self.smoothing.min_spread_samples > self.smoothing.window {
            bail!(
                "smoothing.min_spread_samples ({}) exceeds smoothing.window ({})",
                self.smoothing.min_spread_samples,
                self.smoothing.window
            );
        }
        if self.stability.epsilon <= 0.0 || self.lock.max_spread_cm <= 0.0 {
            bail!("stability.epsilon and lock.max_spread_cm must be positive");
        }
        Ok(())
    }
}
