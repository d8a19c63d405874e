use crate::config::GateConfig;
use crate::pose::{Landmark, LandmarkFrame, LandmarkIndex};

/// ゲートで弾かれた理由。UI はそのまま利用者への指示として表示する
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    /// ポーズ未検出、または両肩が見えない
    NoBody,
    /// 腰が見えない
    MissingTorso,
    /// ガイド枠からはみ出している
    OffCenter,
}

impl GateRejection {
    pub fn message(&self) -> &'static str {
        match self {
            GateRejection::NoBody => "detecting body",
            GateRejection::MissingTorso => "show shoulders & torso",
            GateRejection::OffCenter => "step back/center",
        }
    }
}

/// フレーム内側のガイド枠（正規化座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuideRegion {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl GuideRegion {
    /// 各辺を margin だけ内側に寄せた矩形
    pub fn inset(margin: f32) -> Self {
        Self {
            min_x: margin,
            min_y: margin,
            max_x: 1.0 - margin,
            max_y: 1.0 - margin,
        }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// ゲートを通過したフレームの上半身ランドマーク
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatedPose {
    pub left_shoulder: Landmark,
    pub right_shoulder: Landmark,
    pub left_hip: Option<Landmark>,
    pub right_hip: Option<Landmark>,
    /// 両腰が見えていれば中点、片側だけならその点
    pub hip: (f32, f32),
    pub width: u32,
    pub height: u32,
}

impl GatedPose {
    /// 両腰とも見えている場合のみ
    pub fn both_hips(&self) -> Option<(Landmark, Landmark)> {
        Some((self.left_hip?, self.right_hip?))
    }

    /// 正規化座標での肩幅
    pub fn normalized_shoulder_width(&self) -> f32 {
        self.left_shoulder.distance(&self.right_shoulder)
    }
}

pub struct LandmarkGate {
    visibility_threshold: f32,
    min_landmarks: usize,
    guide: GuideRegion,
}

impl LandmarkGate {
    pub fn new(visibility_threshold: f32, guide_margin: f32) -> Self {
        Self {
            visibility_threshold,
            min_landmarks: LandmarkIndex::COUNT,
            guide: GuideRegion::inset(guide_margin),
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            visibility_threshold: config.visibility_threshold,
            min_landmarks: config.min_landmarks.max(LandmarkIndex::RightHip as usize + 1),
            guide: GuideRegion::inset(config.guide_margin),
        }
    }

    pub fn guide(&self) -> GuideRegion {
        self.guide
    }

    /// 順に (a) 両肩 (b) 少なくとも片方の腰 (c) ガイド枠内 を確認する
    pub fn evaluate(&self, frame: &LandmarkFrame) -> Result<GatedPose, GateRejection> {
        if frame.landmarks.len() < self.min_landmarks {
            return Err(GateRejection::NoBody);
        }
        let threshold = self.visibility_threshold;

        let (left_shoulder, right_shoulder) = match (
            frame.visible(LandmarkIndex::LeftShoulder, threshold),
            frame.visible(LandmarkIndex::RightShoulder, threshold),
        ) {
            (Some(l), Some(r)) => (*l, *r),
            _ => return Err(GateRejection::NoBody),
        };

        let left_hip = frame.visible(LandmarkIndex::LeftHip, threshold).copied();
        let right_hip = frame.visible(LandmarkIndex::RightHip, threshold).copied();
        let hip = match (&left_hip, &right_hip) {
            (Some(l), Some(r)) => l.midpoint(r),
            (Some(h), None) | (None, Some(h)) => (h.x, h.y),
            (None, None) => return Err(GateRejection::MissingTorso),
        };

        let in_guide = self.guide.contains(left_shoulder.x, left_shoulder.y)
            && self.guide.contains(right_shoulder.x, right_shoulder.y)
            && self.guide.contains(hip.0, hip.1);
        if !in_guide {
            return Err(GateRejection::OffCenter);
        }

        Ok(GatedPose {
            left_shoulder,
            right_shoulder,
            left_hip,
            right_hip,
            hip,
            width: frame.width,
            height: frame.height,
        })
    }
}

impl Default for LandmarkGate {
    fn default() -> Self {
        Self::from_config(&GateConfig::default())
    }
}
