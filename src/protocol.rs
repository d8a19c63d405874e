//! TCP protocol between a pose-estimator client and the measurement server.
//!
//! Each message is bincode-encoded and carried in one length-delimited frame.

use bytes::Bytes;
use futures::{Sink, SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::measure::{LockedMeasurement, Session, SessionEffect, SessionPhase};
use crate::pose::LandmarkFrame;
use crate::sizing::{RecommendationQuery, SizeLabel};

/// 33 landmarks per frame fit in well under a kilobyte
const MAX_FRAME_LENGTH: usize = 1024 * 1024;

// --- Message types ---

/// Estimator → server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Frame { frame: LandmarkFrame },
    SetCalibration { bar_px: f32 },
    Retake,
    Recalibrate,
    EstimatorFailed { reason: String },
    Restart,
}

/// Server → estimator
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Status { message: String },
    PhaseChanged { from: SessionPhase, to: SessionPhase },
    /// true: start capturing, false: stop and release the device
    Camera { acquire: bool },
    Locked {
        measurement: LockedMeasurement,
        size: Option<SizeLabel>,
        query: Option<RecommendationQuery>,
    },
    /// The command was refused; session state is unchanged
    Rejected { error: String },
}

impl From<SessionEffect> for ServerMessage {
    fn from(effect: SessionEffect) -> Self {
        match effect {
            SessionEffect::Status(status) => ServerMessage::Status {
                message: status.message(),
            },
            SessionEffect::PhaseChanged { from, to } => ServerMessage::PhaseChanged { from, to },
            SessionEffect::Locked {
                measurement,
                size,
                query,
            } => ServerMessage::Locked {
                measurement,
                size,
                query,
            },
            SessionEffect::AcquireCamera => ServerMessage::Camera { acquire: true },
            SessionEffect::ReleaseCamera => ServerMessage::Camera { acquire: false },
        }
    }
}

/// Apply one client message to the session and collect the replies.
pub fn handle_client_message(session: &mut Session, msg: ClientMessage) -> Vec<ServerMessage> {
    let result = match msg {
        ClientMessage::Frame { frame } => Ok(session.process_frame(&frame)),
        ClientMessage::SetCalibration { bar_px } => session.set_calibration(bar_px),
        ClientMessage::Retake => session.retake(),
        ClientMessage::Recalibrate => session.recalibrate(),
        ClientMessage::EstimatorFailed { reason } => Ok(session.fail(reason)),
        ClientMessage::Restart => Ok(session.restart()),
    };
    match result {
        Ok(effects) => effects.into_iter().map(ServerMessage::from).collect(),
        Err(e) => vec![ServerMessage::Rejected {
            error: e.to_string(),
        }],
    }
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    Framed::new(stream, codec)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T: Serialize>(
    stream: &mut MessageStream,
    msg: &T,
) -> anyhow::Result<()> {
    send_to_sink(stream, msg).await
}

/// Same as [`send_message`] for the write half of a split stream.
pub async fn send_to_sink<S, T>(sink: &mut S, msg: &T) -> anyhow::Result<()>
where
    S: Sink<Bytes, Error = std::io::Error> + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(msg)?;
    sink.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<T> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(bincode::deserialize(&bytes)?),
        Some(Err(e)) => Err(e.into()),
        None => Err(anyhow::anyhow!("connection closed")),
    }
}
