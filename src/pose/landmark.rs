use serde::{Deserialize, Serialize};

/// 33点ポーズモデルのランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkIndex {
    pub const COUNT: usize = 33;

    const ALL: [LandmarkIndex; Self::COUNT] = {
        use LandmarkIndex::*;
        [
            Nose, LeftEyeInner, LeftEye, LeftEyeOuter, RightEyeInner, RightEye, RightEyeOuter,
            LeftEar, RightEar, MouthLeft, MouthRight, LeftShoulder, RightShoulder,
            LeftElbow, RightElbow, LeftWrist, RightWrist, LeftPinky, RightPinky,
            LeftIndex, RightIndex, LeftThumb, RightThumb, LeftHip, RightHip,
            LeftKnee, RightKnee, LeftAnkle, RightAnkle, LeftHeel, RightHeel,
            LeftFootIndex, RightFootIndex,
        ]
    };

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 可視度スコア (0.0〜1.0)
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }

    /// 可視度が閾値以上か（NaN は不可視）
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility >= threshold && self.x.is_finite() && self.y.is_finite()
    }

    /// 正規化座標での距離
    pub fn distance(&self, other: &Landmark) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn midpoint(&self, other: &Landmark) -> (f32, f32) {
        ((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// 外部ポーズ推定器から届く1フレーム分の結果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub landmarks: Vec<Landmark>,
    /// フレームのピクセル幅
    pub width: u32,
    /// フレームのピクセル高さ
    pub height: u32,
}

impl LandmarkFrame {
    pub fn new(landmarks: Vec<Landmark>, width: u32, height: u32) -> Self {
        Self { landmarks, width, height }
    }

    /// インデックスでランドマークを取得（配列が短ければ None）
    pub fn get(&self, index: LandmarkIndex) -> Option<&Landmark> {
        self.landmarks.get(index as usize)
    }

    /// 閾値以上の可視度を持つランドマークだけ返す
    pub fn visible(&self, index: LandmarkIndex, threshold: f32) -> Option<&Landmark> {
        self.get(index).filter(|lm| lm.is_visible(threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_index_count() {
        assert_eq!(LandmarkIndex::COUNT, 33);
        assert_eq!(LandmarkIndex::RightFootIndex as usize, 32);
    }

    #[test]
    fn test_landmark_index_from_index() {
        assert_eq!(LandmarkIndex::from_index(0), Some(LandmarkIndex::Nose));
        assert_eq!(LandmarkIndex::from_index(11), Some(LandmarkIndex::LeftShoulder));
        assert_eq!(LandmarkIndex::from_index(24), Some(LandmarkIndex::RightHip));
        assert_eq!(LandmarkIndex::from_index(33), None);
    }

    #[test]
    fn test_from_index_matches_discriminant() {
        for i in 0..LandmarkIndex::COUNT {
            assert_eq!(LandmarkIndex::from_index(i).unwrap() as usize, i);
        }
    }

    #[test]
    fn test_landmark_is_visible() {
        let lm = Landmark::new(0.5, 0.5, 0.7);
        assert!(lm.is_visible(0.45));
        assert!(!lm.is_visible(0.8));
        assert!(!Landmark::new(f32::NAN, 0.5, 0.9).is_visible(0.45));
    }

    #[test]
    fn test_landmark_distance() {
        let a = Landmark::new(0.0, 0.0, 1.0);
        let b = Landmark::new(0.3, 0.4, 1.0);
        assert!((a.distance(&b) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_frame_short_array() {
        let frame = LandmarkFrame::new(vec![Landmark::new(0.5, 0.5, 1.0); 5], 640, 480);
        assert!(frame.get(LandmarkIndex::Nose).is_some());
        assert!(frame.get(LandmarkIndex::LeftShoulder).is_none());
    }

    #[test]
    fn test_frame_visible_filters_low_confidence() {
        let mut landmarks = vec![Landmark::default(); LandmarkIndex::COUNT];
        landmarks[LandmarkIndex::LeftHip as usize] = Landmark::new(0.4, 0.6, 0.3);
        let frame = LandmarkFrame::new(landmarks, 640, 480);
        assert!(frame.visible(LandmarkIndex::LeftHip, 0.45).is_none());
        assert!(frame.visible(LandmarkIndex::LeftHip, 0.2).is_some());
    }
}
