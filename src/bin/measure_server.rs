//! 計測サーバ
//!
//! ポーズ推定クライアントから LandmarkFrame と操作を受け取り、
//! 接続ごとに新しい Session を回して状態・ロック結果を返す。
//! 同時に扱うクライアントは1つ。

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use upper_body_sizer::config::Config;
use upper_body_sizer::measure::Session;
use upper_body_sizer::protocol::{self, ClientMessage, ServerMessage};

#[derive(Parser)]
#[command(name = "measure_server")]
#[command(version = env!("GIT_VERSION"))]
struct Args {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// server.listen_addr を上書き
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(&args.config);

    info!("Measure Server ({})", env!("GIT_VERSION"));
    info!("Classifier: {:?}", config.classifier.mode);

    let listen = args.listen.as_deref().unwrap_or(&config.server.listen_addr);
    let bind_addr: SocketAddr = listen.parse().context("invalid listen_addr")?;
    let listener = TcpListener::bind(bind_addr).await?;
    info!("Listening on {}", bind_addr);

    loop {
        let (tcp_stream, addr) = listener.accept().await?;
        tcp_stream.set_nodelay(true)?;
        info!("Client connected: {}", addr);

        let mut session = Session::new(&config);
        if let Err(e) = serve_client(tcp_stream, &mut session).await {
            warn!("client {}: {:#}", addr, e);
        }

        // 切断は推定器の異常扱い。カメラを握ったままにしない
        let effects = session.fail("estimator disconnected");
        debug!("disconnect effects: {:?}", effects);
        info!("Client disconnected, waiting for next connection...");
    }
}

/// 1接続ぶんの受信ループ。フレームは受信順にそのまま処理する
async fn serve_client(stream: TcpStream, session: &mut Session) -> Result<()> {
    let framed = protocol::message_stream(stream);
    let (mut sink, mut reader) = framed.split();

    for effect in session.start() {
        protocol::send_to_sink(&mut sink, &ServerMessage::from(effect)).await?;
    }

    loop {
        let bytes = match reader.next().await {
            Some(Ok(b)) => b,
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        };
        let msg: ClientMessage = bincode::deserialize(&bytes)?;
        if !matches!(msg, ClientMessage::Frame { .. }) {
            info!("command: {:?}", msg);
        }
        for reply in protocol::handle_client_message(session, msg) {
            if let ServerMessage::Rejected { error } = &reply {
                warn!("refused: {}", error);
            }
            protocol::send_to_sink(&mut sink, &reply).await?;
        }
    }
}
