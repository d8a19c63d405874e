use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use upper_body_sizer::config::Config;
use upper_body_sizer::measure::Session;
use upper_body_sizer::replay::run_replay;
use upper_body_sizer::sizing::{ClassifierMode, SizeClassifier};

const CONFIG_PATH: &str = "config.toml";

#[derive(Parser)]
#[command(name = "upper-body-sizer")]
#[command(about = "Upper-body measurement and size recommendation from pose landmarks")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// 設定ファイル（省略時は config.toml、無ければ既定値）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 記録済みイベント列（JSON Lines）をセッションに流す
    Replay {
        /// 入力ファイル。"-" で標準入力
        input: PathBuf,

        /// 集計を JSON で出力
        #[arg(long)]
        json: bool,
    },
    /// 寸法を直接サイズに分類する
    Classify {
        #[arg(long)]
        chest: f32,
        #[arg(long)]
        shoulder: f32,
        #[arg(long)]
        upper_waist: f32,
        /// 設定の classifier.mode を上書き
        #[arg(long)]
        general: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("upper-body-sizer ({})", env!("GIT_VERSION"));

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load_or_default(CONFIG_PATH),
    };

    match cli.command {
        Commands::Replay { input, json } => replay(&config, &input, json),
        Commands::Classify {
            chest,
            shoulder,
            upper_waist,
            general,
        } => {
            let mode = if general {
                ClassifierMode::General
            } else {
                config.classifier.mode
            };
            let classifier = SizeClassifier::new(mode);
            match classifier.classify(Some(chest), Some(upper_waist), Some(shoulder)) {
                Some(size) => println!("{}", size),
                None => println!("no size (measurements must be positive)"),
            }
            Ok(())
        }
    }
}

fn replay(config: &Config, input: &Path, json: bool) -> Result<()> {
    let mut session = Session::new(config);
    let summary = if input.as_os_str() == "-" {
        run_replay(&mut session, io::stdin().lock())?
    } else {
        let file = File::open(input)
            .with_context(|| format!("failed to open {}", input.display()))?;
        run_replay(&mut session, BufReader::new(file))?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("events: {} (frames {}, refused {})", summary.events, summary.frames, summary.refused_commands);
    println!("phase:  {}", summary.phase);
    println!("status: {}", summary.last_status);
    if let Some(m) = &summary.locked {
        println!(
            "locked: chest {:.1}cm / shoulder {:.1}cm / upper waist {} ({} frames, spread {:.2}cm)",
            m.chest_cm,
            m.shoulder_cm,
            m.upper_waist_cm
                .map(|w| format!("{:.1}cm", w))
                .unwrap_or_else(|| "-".to_string()),
            m.quality.frame_count,
            m.quality.spread_cm,
        );
    }
    match summary.size {
        Some(size) => println!("size:   {}", size),
        None => println!("size:   -"),
    }
    if let Some(query) = &summary.query {
        println!("query:  {}", query.to_json()?);
    }
    Ok(())
}
