use serde::Deserialize;

use super::label::SizeLabel;
use crate::measure::LockedMeasurement;

/// 分類器の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierMode {
    /// L / XL の2サイズ展開
    #[default]
    Constrained,
    /// XXS〜4XL
    General,
}

/// 1区間: 上限（未満）と [L, XL] への加点
type Band = (f32, [u8; 2]);

const CONSTRAINED_SIZES: [SizeLabel; 2] = [SizeLabel::L, SizeLabel::Xl];

const CHEST_BANDS: [Band; 4] = [
    (96.0, [3, 0]),
    (100.0, [2, 1]),
    (104.0, [1, 2]),
    (f32::INFINITY, [0, 3]),
];

const SHOULDER_BANDS: [Band; 4] = [
    (44.0, [3, 0]),
    (46.0, [2, 1]),
    (48.0, [1, 2]),
    (f32::INFINITY, [0, 3]),
];

const UPPER_WAIST_BANDS: [Band; 4] = [
    (84.0, [3, 0]),
    (88.0, [2, 1]),
    (92.0, [1, 2]),
    (f32::INFINITY, [0, 3]),
];

/// 胸囲だけで決める一次サイズ（上限未満）。最後の区間より上は 4XL
const CHEST_CHART: [(f32, SizeLabel); 8] = [
    (78.0, SizeLabel::Xxs),
    (86.0, SizeLabel::Xs),
    (94.0, SizeLabel::S),
    (102.0, SizeLabel::M),
    (110.0, SizeLabel::L),
    (118.0, SizeLabel::Xl),
    (126.0, SizeLabel::Xxl),
    (134.0, SizeLabel::Xxxl),
];

/// 比率による ±1 補正の閾値 (下限, 上限)
const WAIST_TO_CHEST: (f32, f32) = (0.78, 0.92);
const SHOULDER_TO_CHEST: (f32, f32) = (0.54, 0.60);

/// 寸法 → サイズ。状態を持たず、同じ入力には常に同じ結果
#[derive(Debug, Clone)]
pub struct SizeClassifier {
    mode: ClassifierMode,
}

impl SizeClassifier {
    pub fn new(mode: ClassifierMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ClassifierMode {
        self.mode
    }

    pub fn supported_sizes(&self) -> &'static [SizeLabel] {
        match self.mode {
            ClassifierMode::Constrained => &CONSTRAINED_SIZES,
            ClassifierMode::General => &SizeLabel::ALL,
        }
    }

    /// 同点時・非対応サイズの置き換え先
    pub fn default_size(&self) -> SizeLabel {
        SizeLabel::L
    }

    /// 非対応サイズは既定サイズに寄せる
    pub fn normalize(&self, size: SizeLabel) -> SizeLabel {
        if self.supported_sizes().contains(&size) {
            size
        } else {
            self.default_size()
        }
    }

    /// どれかが欠損または 0 以下なら None
    pub fn classify(
        &self,
        chest_cm: Option<f32>,
        upper_waist_cm: Option<f32>,
        shoulder_cm: Option<f32>,
    ) -> Option<SizeLabel> {
        let chest = positive(chest_cm)?;
        let waist = positive(upper_waist_cm)?;
        let shoulder = positive(shoulder_cm)?;
        let size = match self.mode {
            ClassifierMode::Constrained => classify_constrained(chest, waist, shoulder),
            ClassifierMode::General => classify_general(chest, waist, shoulder),
        };
        Some(size)
    }

    pub fn classify_locked(&self, measurement: &LockedMeasurement) -> Option<SizeLabel> {
        self.classify(
            Some(measurement.chest_cm),
            measurement.upper_waist_cm,
            Some(measurement.shoulder_cm),
        )
    }
}

impl Default for SizeClassifier {
    fn default() -> Self {
        Self::new(ClassifierMode::default())
    }
}

fn positive(value: Option<f32>) -> Option<f32> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn band_points(bands: &[Band], value: f32) -> [u8; 2] {
    bands
        .iter()
        .find(|(upper, _)| value < *upper)
        .map_or([0, 0], |(_, points)| *points)
}

/// 指標ごとの加点を合計し最高得点のサイズ。同点は L
fn classify_constrained(chest: f32, waist: f32, shoulder: f32) -> SizeLabel {
    let mut scores = [0u32; 2];
    for points in [
        band_points(&CHEST_BANDS, chest),
        band_points(&SHOULDER_BANDS, shoulder),
        band_points(&UPPER_WAIST_BANDS, waist),
    ] {
        for (score, p) in scores.iter_mut().zip(points) {
            *score += p as u32;
        }
    }
    if scores[1] > scores[0] {
        SizeLabel::Xl
    } else {
        SizeLabel::L
    }
}

/// 胸囲で一次サイズ、ウエスト/胸囲・肩幅/胸囲の比で ±1 ずつ補正
fn classify_general(chest: f32, waist: f32, shoulder: f32) -> SizeLabel {
    let primary = CHEST_CHART
        .iter()
        .find(|(upper, _)| chest < *upper)
        .map_or(SizeLabel::Xxxxl, |(_, label)| *label);

    let adjustment = ratio_adjustment(waist / chest, WAIST_TO_CHEST)
        + ratio_adjustment(shoulder / chest, SHOULDER_TO_CHEST);

    let max_rank = SizeLabel::ALL.len() as i32 - 1;
    let rank = (primary.rank() as i32 + adjustment).clamp(0, max_rank);
    SizeLabel::from_rank(rank as usize).unwrap_or(primary)
}

fn ratio_adjustment(ratio: f32, (low, high): (f32, f32)) -> i32 {
    if ratio > high {
        1
    } else if ratio < low {
        -1
    } else {
        0
    }
}
