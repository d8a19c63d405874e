use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::calibration::{CalibrationError, CalibrationState, ScaleCalibrator};
use super::gate::{GateRejection, LandmarkGate};
use super::geometry::{GeometryError, GeometryEstimator};
use super::lock::{LockCriteria, LockedMeasurement};
use super::smoother::{MedianSmoother, Metric};
use super::stability::StabilityDetector;
use crate::config::{Config, QueryConfig};
use crate::pose::LandmarkFrame;
use crate::sizing::{RecommendationQuery, SizeClassifier, SizeLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Calibrating,
    Measuring,
    Locked,
    Error,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Calibrating => "calibrating",
            SessionPhase::Measuring => "measuring",
            SessionPhase::Locked => "locked",
            SessionPhase::Error => "error",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 利用者に見せる現在の状態
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    AwaitingCalibration,
    Rejected(GateRejection),
    Degenerate(GeometryError),
    HoldStill {
        filled: usize,
        required: usize,
        spread_cm: Option<f32>,
    },
    Locked,
    Failed(String),
}

impl Status {
    pub fn message(&self) -> String {
        match self {
            Status::AwaitingCalibration => "match the bar to the reference sheet".to_string(),
            Status::Rejected(reason) => reason.message().to_string(),
            Status::Degenerate(_) => "face the camera squarely".to_string(),
            Status::HoldStill { filled, required, .. } => {
                format!("hold still ({}/{})", filled, required)
            }
            Status::Locked => "measurement locked".to_string(),
            Status::Failed(reason) => format!("camera error: {reason} (restart session)"),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// 1ステップの結果としてドライバ側（UI・カメラ）が実行すべきこと
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    Status(Status),
    PhaseChanged {
        from: SessionPhase,
        to: SessionPhase,
    },
    Locked {
        measurement: LockedMeasurement,
        size: Option<SizeLabel>,
        query: Option<RecommendationQuery>,
    },
    AcquireCamera,
    ReleaseCamera,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("cannot {action} while {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: SessionPhase,
    },
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// 1回の計測セッションの全状態
///
/// フェーズ・キャリブレーション・バッファをこの値ひとつにまとめ、
/// フレーム処理と操作はすべて `&mut self` 経由で直列に行う。
pub struct Session {
    gate: LandmarkGate,
    calibrator: ScaleCalibrator,
    estimator: GeometryEstimator,
    lock_criteria: LockCriteria,
    classifier: SizeClassifier,
    query_config: QueryConfig,
    stability: StabilityDetector,
    smoother: MedianSmoother,
    phase: SessionPhase,
    calibration: Option<CalibrationState>,
    locked: Option<LockedMeasurement>,
    accepted_frames: u32,
    camera_held: bool,
    status: Status,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self {
            gate: LandmarkGate::from_config(&config.gate),
            calibrator: ScaleCalibrator::from_config(&config.calibration),
            estimator: GeometryEstimator::from_config(&config.estimator),
            lock_criteria: LockCriteria::from_config(&config.lock),
            classifier: SizeClassifier::new(config.classifier.mode),
            query_config: config.query.clone(),
            stability: StabilityDetector::from_config(&config.stability),
            smoother: MedianSmoother::from_config(&config.smoothing),
            phase: SessionPhase::Calibrating,
            calibration: None,
            locked: None,
            accepted_frames: 0,
            camera_held: false,
            status: Status::AwaitingCalibration,
        }
    }

    /// カメラを確保してキャリブレーションを始める
    pub fn start(&mut self) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if matches!(self.phase, SessionPhase::Calibrating | SessionPhase::Measuring) {
            self.acquire_camera(&mut effects);
        }
        effects.push(SessionEffect::Status(self.status.clone()));
        effects
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn calibration(&self) -> Option<&CalibrationState> {
        self.calibration.as_ref()
    }

    pub fn locked(&self) -> Option<&LockedMeasurement> {
        self.locked.as_ref()
    }

    pub fn camera_held(&self) -> bool {
        self.camera_held
    }

    pub fn classifier(&self) -> &SizeClassifier {
        &self.classifier
    }

    /// 表示用の再分類。何度呼んでも同じ結果
    pub fn size(&self) -> Option<SizeLabel> {
        self.locked.as_ref().and_then(|m| self.classifier.classify_locked(m))
    }

    /// ロック済みでサイズが決まるときの推薦クエリ
    pub fn query(&self) -> Option<RecommendationQuery> {
        self.locked
            .as_ref()
            .and_then(|m| RecommendationQuery::from_locked(m, &self.classifier, &self.query_config))
    }

    /// 静止判定ウィンドウのサンプル数
    pub fn stability_len(&self) -> usize {
        self.stability.len()
    }

    /// 指標ごとの平滑化ウィンドウのサンプル数
    pub fn smoothing_len(&self, metric: Metric) -> usize {
        self.smoother.len(metric)
    }

    /// 全ウィンドウが空か
    pub fn buffers_empty(&self) -> bool {
        self.stability.is_empty() && self.smoother.is_empty()
    }

    /// フレーム1枚分のパイプライン: Gate → Estimator → Stability/Smoother → Lock
    pub fn process_frame(&mut self, frame: &LandmarkFrame) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        match self.phase {
            SessionPhase::Calibrating => {
                self.set_status(Status::AwaitingCalibration, &mut effects);
            }
            // ロック後・エラー後はバッファに触れない
            SessionPhase::Locked | SessionPhase::Error => {}
            SessionPhase::Measuring => self.measure(frame, &mut effects),
        }
        debug_assert!(self.check_invariants());
        effects
    }

    fn measure(&mut self, frame: &LandmarkFrame, effects: &mut Vec<SessionEffect>) {
        let pose = match self.gate.evaluate(frame) {
            Ok(pose) => pose,
            Err(reason) => {
                debug!("frame rejected: {}", reason.message());
                self.set_status(Status::Rejected(reason), effects);
                return;
            }
        };
        let Some(calibration) = self.calibration else {
            self.set_status(Status::AwaitingCalibration, effects);
            return;
        };
        let sample = match self.estimator.estimate(&pose, &calibration) {
            Ok(sample) => sample,
            Err(e) => {
                debug!("degenerate frame: {e}");
                self.set_status(Status::Degenerate(e), effects);
                return;
            }
        };

        self.accepted_frames = self.accepted_frames.saturating_add(1);
        let reading = self.stability.push(pose.normalized_shoulder_width());
        let smoothed = self.smoother.push(&sample);

        match self.lock_criteria.evaluate(&reading, &smoothed, self.accepted_frames) {
            Some(measurement) => {
                let size = self.classifier.classify_locked(&measurement);
                let query =
                    RecommendationQuery::from_locked(&measurement, &self.classifier, &self.query_config);
                info!(
                    "locked: chest={:.1}cm shoulder={:.1}cm upper_waist={:?} frames={} spread={:.2}cm size={:?}",
                    measurement.chest_cm,
                    measurement.shoulder_cm,
                    measurement.upper_waist_cm,
                    measurement.quality.frame_count,
                    measurement.quality.spread_cm,
                    size,
                );
                self.locked = Some(measurement);
                self.transition(SessionPhase::Locked, effects);
                self.release_camera(effects);
                self.set_status(Status::Locked, effects);
                effects.push(SessionEffect::Locked {
                    measurement,
                    size,
                    query,
                });
            }
            None => {
                let status = Status::HoldStill {
                    filled: reading.filled,
                    required: self.stability.capacity(),
                    spread_cm: smoothed.chest_spread_cm,
                };
                self.set_status(status, effects);
            }
        }
    }

    /// 基準バー幅を確定して計測フェーズへ
    pub fn set_calibration(&mut self, bar_px: f32) -> Result<Vec<SessionEffect>, SessionError> {
        self.require_phase("calibrate", &[SessionPhase::Calibrating])?;
        let calibration = self.calibrator.calibrate(bar_px)?;
        info!(
            "calibrated: bar={}px -> {:.4} cm/px",
            calibration.reference_pixel_width, calibration.cm_per_pixel
        );

        let mut effects = Vec::new();
        self.clear_buffers();
        self.calibration = Some(calibration);
        self.acquire_camera(&mut effects);
        self.transition(SessionPhase::Measuring, &mut effects);
        self.set_status(self.hold_still_status(), &mut effects);
        debug_assert!(self.check_invariants());
        Ok(effects)
    }

    /// 同じキャリブレーションで計測をやり直す
    pub fn retake(&mut self) -> Result<Vec<SessionEffect>, SessionError> {
        self.require_phase("retake", &[SessionPhase::Measuring, SessionPhase::Locked])?;
        let mut effects = Vec::new();
        self.release_camera(&mut effects);
        self.clear_buffers();
        self.locked = None;
        self.acquire_camera(&mut effects);
        self.transition(SessionPhase::Measuring, &mut effects);
        self.set_status(self.hold_still_status(), &mut effects);
        debug_assert!(self.check_invariants());
        Ok(effects)
    }

    /// キャリブレーションを破棄してやり直す
    pub fn recalibrate(&mut self) -> Result<Vec<SessionEffect>, SessionError> {
        self.require_phase("recalibrate", &[SessionPhase::Measuring, SessionPhase::Locked])?;
        let mut effects = Vec::new();
        self.release_camera(&mut effects);
        self.clear_buffers();
        self.locked = None;
        self.calibration = None;
        self.acquire_camera(&mut effects);
        self.transition(SessionPhase::Calibrating, &mut effects);
        self.set_status(Status::AwaitingCalibration, &mut effects);
        debug_assert!(self.check_invariants());
        Ok(effects)
    }

    /// 外部推定器の初期化・実行時エラー。restart 以外では抜けない
    pub fn fail(&mut self, reason: impl Into<String>) -> Vec<SessionEffect> {
        let reason = reason.into();
        let mut effects = Vec::new();
        if self.phase == SessionPhase::Error {
            return effects;
        }
        warn!("session failed in {}: {}", self.phase, reason);
        self.release_camera(&mut effects);
        self.clear_buffers();
        self.locked = None;
        self.calibration = None;
        self.transition(SessionPhase::Error, &mut effects);
        self.set_status(Status::Failed(reason), &mut effects);
        debug_assert!(self.check_invariants());
        effects
    }

    /// セッションを完全に初期化してキャリブレーションから
    pub fn restart(&mut self) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        self.release_camera(&mut effects);
        self.clear_buffers();
        self.locked = None;
        self.calibration = None;
        self.acquire_camera(&mut effects);
        self.transition(SessionPhase::Calibrating, &mut effects);
        self.set_status(Status::AwaitingCalibration, &mut effects);
        debug_assert!(self.check_invariants());
        effects
    }

    /// フェーズとデータの整合性
    pub fn check_invariants(&self) -> bool {
        let calibrated_phase = matches!(self.phase, SessionPhase::Measuring | SessionPhase::Locked);
        let calibration_ok = self.calibration.is_some() == calibrated_phase;
        let lock_ok = self.locked.is_some() == (self.phase == SessionPhase::Locked);
        let buffers_ok = match self.phase {
            SessionPhase::Calibrating | SessionPhase::Error => self.buffers_empty(),
            SessionPhase::Measuring | SessionPhase::Locked => true,
        };
        let camera_ok = !self.camera_held
            || matches!(self.phase, SessionPhase::Calibrating | SessionPhase::Measuring);
        calibration_ok && lock_ok && buffers_ok && camera_ok
    }

    fn require_phase(
        &self,
        action: &'static str,
        allowed: &[SessionPhase],
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(SessionError::InvalidPhase {
                action,
                phase: self.phase,
            })
        }
    }

    fn hold_still_status(&self) -> Status {
        Status::HoldStill {
            filled: self.stability.len(),
            required: self.stability.capacity(),
            spread_cm: None,
        }
    }

    fn clear_buffers(&mut self) {
        self.stability.reset();
        self.smoother.reset();
        self.accepted_frames = 0;
    }

    fn transition(&mut self, to: SessionPhase, effects: &mut Vec<SessionEffect>) {
        let from = self.phase;
        if from == to {
            return;
        }
        info!("phase: {} -> {}", from, to);
        self.phase = to;
        effects.push(SessionEffect::PhaseChanged { from, to });
    }

    fn set_status(&mut self, status: Status, effects: &mut Vec<SessionEffect>) {
        self.status = status.clone();
        effects.push(SessionEffect::Status(status));
    }

    fn acquire_camera(&mut self, effects: &mut Vec<SessionEffect>) {
        if !self.camera_held {
            self.camera_held = true;
            effects.push(SessionEffect::AcquireCamera);
        }
    }

    fn release_camera(&mut self, effects: &mut Vec<SessionEffect>) {
        if self.camera_held {
            self.camera_held = false;
            effects.push(SessionEffect::ReleaseCamera);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Landmark, LandmarkIndex};

    const FRAME_WIDTH: u32 = 3000;

    /// 肩 600px・腰 420px の正面立ち
    fn standing_frame(shoulder_half_width: f32) -> LandmarkFrame {
        let mut landmarks = vec![Landmark::new(0.5, 0.5, 0.9); LandmarkIndex::COUNT];
        landmarks[LandmarkIndex::LeftShoulder as usize] = Landmark::new(0.5 + shoulder_half_width, 0.3, 0.95);
        landmarks[LandmarkIndex::RightShoulder as usize] = Landmark::new(0.5 - shoulder_half_width, 0.3, 0.95);
        landmarks[LandmarkIndex::LeftHip as usize] = Landmark::new(0.57, 0.65, 0.9);
        landmarks[LandmarkIndex::RightHip as usize] = Landmark::new(0.43, 0.65, 0.9);
        LandmarkFrame::new(landmarks, FRAME_WIDTH, 1688)
    }

    fn no_hips_frame() -> LandmarkFrame {
        let mut frame = standing_frame(0.1);
        frame.landmarks[LandmarkIndex::LeftHip as usize].visibility = 0.1;
        frame.landmarks[LandmarkIndex::RightHip as usize].visibility = 0.1;
        frame
    }

    fn measuring_session() -> Session {
        let mut session = Session::new(&Config::default());
        session.start();
        session.set_calibration(300.0).unwrap();
        session
    }

    fn locked_effect(effects: &[SessionEffect]) -> Option<(LockedMeasurement, Option<SizeLabel>)> {
        effects.iter().find_map(|e| match e {
            SessionEffect::Locked { measurement, size, .. } => Some((*measurement, *size)),
            _ => None,
        })
    }

    #[test]
    fn test_new_session_is_calibrating() {
        let mut session = Session::new(&Config::default());
        assert_eq!(session.phase(), SessionPhase::Calibrating);
        let effects = session.start();
        assert_eq!(effects[0], SessionEffect::AcquireCamera);
        assert!(session.camera_held());
        assert!(session.check_invariants());
    }

    #[test]
    fn test_frames_ignored_while_calibrating() {
        let mut session = Session::new(&Config::default());
        let effects = session.process_frame(&standing_frame(0.1));
        assert_eq!(effects, vec![SessionEffect::Status(Status::AwaitingCalibration)]);
        assert!(session.buffers_empty());
    }

    #[test]
    fn test_narrow_bar_blocks_phase_advance() {
        let mut session = Session::new(&Config::default());
        let err = session.set_calibration(30.0).unwrap_err();
        assert!(matches!(err, SessionError::Calibration(CalibrationError::BarTooNarrow { .. })));
        assert_eq!(session.phase(), SessionPhase::Calibrating);
        assert!(session.calibration().is_none());
    }

    #[test]
    fn test_calibration_enters_measuring() {
        let mut session = Session::new(&Config::default());
        session.start();
        let effects = session.set_calibration(300.0).unwrap();
        assert!(effects.contains(&SessionEffect::PhaseChanged {
            from: SessionPhase::Calibrating,
            to: SessionPhase::Measuring,
        }));
        assert_eq!(session.phase(), SessionPhase::Measuring);
        assert!((session.calibration().unwrap().cm_per_pixel - 0.07).abs() < 1e-6);
    }

    #[test]
    fn test_calibrate_twice_is_invalid() {
        let mut session = measuring_session();
        assert!(matches!(
            session.set_calibration(300.0),
            Err(SessionError::InvalidPhase { action: "calibrate", .. })
        ));
    }

    #[test]
    fn test_rejected_frame_leaves_buffers_unchanged() {
        let mut session = measuring_session();
        let effects = session.process_frame(&no_hips_frame());
        assert_eq!(
            effects,
            vec![SessionEffect::Status(Status::Rejected(GateRejection::MissingTorso))]
        );
        assert!(session.buffers_empty());
        assert_eq!(session.status().message(), "show shoulders & torso");
    }

    #[test]
    fn test_degenerate_frame_leaves_buffers_unchanged() {
        let mut session = measuring_session();
        let effects = session.process_frame(&standing_frame(0.0));
        assert!(matches!(
            effects.as_slice(),
            [SessionEffect::Status(Status::Degenerate(GeometryError::DegenerateShoulders(_)))]
        ));
        assert!(session.buffers_empty());
    }

    #[test]
    fn test_locks_exactly_when_window_fills() {
        let mut session = measuring_session();
        for _ in 0..11 {
            let effects = session.process_frame(&standing_frame(0.1));
            assert!(locked_effect(&effects).is_none());
            assert_eq!(session.phase(), SessionPhase::Measuring);
        }
        let effects = session.process_frame(&standing_frame(0.1));
        let (measurement, _) = locked_effect(&effects).unwrap();
        assert_eq!(session.phase(), SessionPhase::Locked);
        assert!(effects.contains(&SessionEffect::ReleaseCamera));
        assert!(!session.camera_held());

        // 600px * 0.07 = 42cm
        assert!((measurement.shoulder_cm - 42.0).abs() < 1e-2);
        assert!((measurement.chest_cm - 73.5).abs() < 1e-2);
        // 420px * 0.07 * 0.9 = 26.46cm
        assert!((measurement.upper_waist_cm.unwrap() - 26.46).abs() < 1e-2);
        assert_eq!(measurement.quality.frame_count, 12);
        assert_eq!(measurement.quality.spread_cm, 0.0);
        assert_eq!(session.locked(), Some(&measurement));
    }

    #[test]
    fn test_moving_subject_never_locks() {
        let mut session = measuring_session();
        for i in 0..40 {
            let half = if i % 2 == 0 { 0.10 } else { 0.14 };
            let effects = session.process_frame(&standing_frame(half));
            assert!(locked_effect(&effects).is_none());
        }
        assert_eq!(session.phase(), SessionPhase::Measuring);
        assert!(matches!(session.status(), Status::HoldStill { filled: 12, .. }));
    }

    #[test]
    fn test_frames_after_lock_are_ignored() {
        let mut session = measuring_session();
        for _ in 0..12 {
            session.process_frame(&standing_frame(0.1));
        }
        let locked = *session.locked().unwrap();
        let stability_len = session.stability_len();
        let effects = session.process_frame(&standing_frame(0.2));
        assert!(effects.is_empty());
        assert_eq!(session.stability_len(), stability_len);
        assert_eq!(session.locked(), Some(&locked));
    }

    #[test]
    fn test_retake_clears_buffers_and_keeps_calibration() {
        let mut session = measuring_session();
        for _ in 0..12 {
            session.process_frame(&standing_frame(0.1));
        }
        assert_eq!(session.phase(), SessionPhase::Locked);

        let effects = session.retake().unwrap();
        assert!(effects.contains(&SessionEffect::AcquireCamera));
        assert_eq!(session.phase(), SessionPhase::Measuring);
        assert_eq!(session.stability_len(), 0);
        assert_eq!(session.smoothing_len(Metric::Chest), 0);
        assert_eq!(session.smoothing_len(Metric::Shoulder), 0);
        assert_eq!(session.smoothing_len(Metric::UpperWaist), 0);
        assert!(session.locked().is_none());
        assert!(session.calibration().is_some());
    }

    #[test]
    fn test_retake_mid_measurement_releases_then_acquires() {
        let mut session = measuring_session();
        for _ in 0..5 {
            session.process_frame(&standing_frame(0.1));
        }
        let effects = session.retake().unwrap();
        assert_eq!(effects[0], SessionEffect::ReleaseCamera);
        assert_eq!(effects[1], SessionEffect::AcquireCamera);
        assert!(session.buffers_empty());
    }

    #[test]
    fn test_recalibrate_clears_everything() {
        let mut session = measuring_session();
        for _ in 0..5 {
            session.process_frame(&standing_frame(0.1));
        }
        session.recalibrate().unwrap();
        assert_eq!(session.phase(), SessionPhase::Calibrating);
        assert!(session.buffers_empty());
        assert!(session.calibration().is_none());
        assert!(session.check_invariants());
    }

    #[test]
    fn test_retake_invalid_while_calibrating() {
        let mut session = Session::new(&Config::default());
        assert!(matches!(
            session.retake(),
            Err(SessionError::InvalidPhase { phase: SessionPhase::Calibrating, .. })
        ));
    }

    #[test]
    fn test_failure_requires_restart() {
        let mut session = measuring_session();
        session.process_frame(&standing_frame(0.1));
        let effects = session.fail("pose model failed to load");
        assert!(effects.contains(&SessionEffect::ReleaseCamera));
        assert_eq!(session.phase(), SessionPhase::Error);
        assert!(session.buffers_empty());
        assert!(session.process_frame(&standing_frame(0.1)).is_empty());
        assert!(session.retake().is_err());
        assert!(session.recalibrate().is_err());
        assert!(session.fail("again").is_empty());

        let effects = session.restart();
        assert!(effects.contains(&SessionEffect::AcquireCamera));
        assert_eq!(session.phase(), SessionPhase::Calibrating);
        assert!(session.check_invariants());
    }

    #[test]
    fn test_size_is_idempotent() {
        let mut session = measuring_session();
        for _ in 0..12 {
            session.process_frame(&standing_frame(0.1));
        }
        assert_eq!(session.size(), Some(SizeLabel::L));
        assert_eq!(session.size(), session.size());
        let query = session.query().unwrap();
        assert_eq!(query.size, SizeLabel::L);
        assert_eq!(query.measurements.chest_cm, session.locked().unwrap().chest_cm);
    }

    #[test]
    fn test_no_query_before_lock() {
        let session = measuring_session();
        assert!(session.query().is_none());
        assert!(session.size().is_none());
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(Status::Rejected(GateRejection::OffCenter).message(), "step back/center");
        assert_eq!(
            Status::HoldStill { filled: 3, required: 12, spread_cm: None }.message(),
            "hold still (3/12)"
        );
    }
}
