//! 記録済みのランドマーク列・操作列をセッションに流し直す
//!
//! 1行1イベントの JSON Lines。`type` タグで種類を判別する。
//!
//! ```text
//! {"type":"calibrate","bar_px":300.0}
//! {"type":"frame","landmarks":[{"x":0.5,"y":0.5,"visibility":0.9}, ...],"width":1280,"height":720}
//! {"type":"retake"}
//! ```

use std::io::BufRead;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::measure::{LockedMeasurement, Session, SessionEffect, SessionPhase};
use crate::pose::LandmarkFrame;
use crate::sizing::{RecommendationQuery, SizeLabel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    Frame(LandmarkFrame),
    Calibrate { bar_px: f32 },
    Retake,
    Recalibrate,
    Fail { reason: String },
    Restart,
}

/// リプレイ終了時の集計
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub events: usize,
    pub frames: usize,
    /// フェーズ違反などで拒否された操作
    pub refused_commands: usize,
    pub phase: SessionPhase,
    pub last_status: String,
    pub locked: Option<LockedMeasurement>,
    pub size: Option<SizeLabel>,
    pub query: Option<RecommendationQuery>,
}

pub fn parse_event(line: &str) -> Result<ReplayEvent> {
    serde_json::from_str(line).context("Failed to parse replay event")
}

/// イベントを順にセッションへ適用する
///
/// 操作がフェーズ的に不正な場合はログに残して続行する。
/// 読み込み・パースの失敗は行番号付きで中断。
pub fn run_replay<R: BufRead>(session: &mut Session, reader: R) -> Result<ReplaySummary> {
    let mut events = 0;
    let mut frames = 0;
    let mut refused_commands = 0;

    log_effects(&session.start());

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("Failed to read replay line {line_no}"))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event = parse_event(line).with_context(|| format!("line {line_no}"))?;
        events += 1;

        let effects = match event {
            ReplayEvent::Frame(frame) => {
                frames += 1;
                Ok(session.process_frame(&frame))
            }
            ReplayEvent::Calibrate { bar_px } => session.set_calibration(bar_px),
            ReplayEvent::Retake => session.retake(),
            ReplayEvent::Recalibrate => session.recalibrate(),
            ReplayEvent::Fail { reason } => Ok(session.fail(reason)),
            ReplayEvent::Restart => Ok(session.restart()),
        };
        match effects {
            Ok(effects) => log_effects(&effects),
            Err(e) => {
                warn!("line {}: {}", line_no, e);
                refused_commands += 1;
            }
        }
    }

    Ok(ReplaySummary {
        events,
        frames,
        refused_commands,
        phase: session.phase(),
        last_status: session.status().message(),
        locked: session.locked().copied(),
        size: session.size(),
        query: session.query(),
    })
}

fn log_effects(effects: &[SessionEffect]) {
    for effect in effects {
        match effect {
            SessionEffect::Status(status) => debug!("status: {}", status),
            SessionEffect::PhaseChanged { from, to } => debug!("phase {} -> {}", from, to),
            SessionEffect::Locked { size, .. } => info!("replay locked, size={:?}", size),
            SessionEffect::AcquireCamera => debug!("camera acquire"),
            SessionEffect::ReleaseCamera => debug!("camera release"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pose::{Landmark, LandmarkIndex};
    use std::io::Cursor;

    fn frame_line() -> String {
        let mut landmarks = vec![Landmark::new(0.5, 0.5, 0.9); LandmarkIndex::COUNT];
        landmarks[LandmarkIndex::LeftShoulder as usize] = Landmark::new(0.6, 0.3, 0.95);
        landmarks[LandmarkIndex::RightShoulder as usize] = Landmark::new(0.4, 0.3, 0.95);
        landmarks[LandmarkIndex::LeftHip as usize] = Landmark::new(0.57, 0.65, 0.9);
        landmarks[LandmarkIndex::RightHip as usize] = Landmark::new(0.43, 0.65, 0.9);
        let event = ReplayEvent::Frame(LandmarkFrame::new(landmarks, 3000, 1688));
        serde_json::to_string(&event).unwrap()
    }

    fn script(lines: &[String]) -> Cursor<String> {
        Cursor::new(lines.join("\n"))
    }

    #[test]
    fn test_event_tags() {
        assert_eq!(
            parse_event(r#"{"type":"calibrate","bar_px":300.0}"#).unwrap(),
            ReplayEvent::Calibrate { bar_px: 300.0 }
        );
        assert_eq!(parse_event(r#"{"type":"retake"}"#).unwrap(), ReplayEvent::Retake);
        assert_eq!(
            parse_event(r#"{"type":"fail","reason":"model"}"#).unwrap(),
            ReplayEvent::Fail { reason: "model".into() }
        );
        assert!(parse_event(r#"{"type":"jump"}"#).is_err());
    }

    #[test]
    fn test_frame_event_has_flat_shape() {
        let value: serde_json::Value = serde_json::from_str(&frame_line()).unwrap();
        assert_eq!(value["type"], "frame");
        assert_eq!(value["width"], 3000);
        assert_eq!(value["landmarks"].as_array().unwrap().len(), LandmarkIndex::COUNT);
    }

    #[test]
    fn test_replay_to_lock() {
        let mut lines = vec![r#"{"type":"calibrate","bar_px":300.0}"#.to_string()];
        lines.extend(std::iter::repeat(frame_line()).take(12));
        let mut session = Session::new(&Config::default());
        let summary = run_replay(&mut session, script(&lines)).unwrap();

        assert_eq!(summary.events, 13);
        assert_eq!(summary.frames, 12);
        assert_eq!(summary.phase, SessionPhase::Locked);
        assert_eq!(summary.last_status, "measurement locked");
        assert_eq!(summary.size, Some(SizeLabel::L));
        assert!(summary.locked.is_some());
        assert!(summary.query.is_some());
    }

    #[test]
    fn test_refused_commands_are_counted() {
        let lines = vec![
            r#"{"type":"retake"}"#.to_string(),
            String::new(),
            "# comment".to_string(),
            r#"{"type":"calibrate","bar_px":10.0}"#.to_string(),
        ];
        let mut session = Session::new(&Config::default());
        let summary = run_replay(&mut session, script(&lines)).unwrap();
        assert_eq!(summary.events, 2);
        assert_eq!(summary.refused_commands, 2);
        assert_eq!(summary.phase, SessionPhase::Calibrating);
        assert!(summary.locked.is_none());
    }

    #[test]
    fn test_failure_then_restart() {
        let lines = vec![
            r#"{"type":"calibrate","bar_px":300.0}"#.to_string(),
            r#"{"type":"fail","reason":"camera unplugged"}"#.to_string(),
            frame_line(),
        ];
        let mut session = Session::new(&Config::default());
        let summary = run_replay(&mut session, script(&lines)).unwrap();
        assert_eq!(summary.phase, SessionPhase::Error);
        assert!(summary.last_status.contains("camera unplugged"));
        assert!(!session.camera_held());

        let summary = run_replay(&mut session, script(&[r#"{"type":"restart"}"#.to_string()])).unwrap();
        assert_eq!(summary.phase, SessionPhase::Calibrating);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let lines = vec![r#"{"type":"retake"}"#.to_string(), "{not json".to_string()];
        let mut session = Session::new(&Config::default());
        let err = run_replay(&mut session, script(&lines)).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }
}
