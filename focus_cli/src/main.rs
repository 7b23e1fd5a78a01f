use clap::Parser;
use focus_client::{
    ClientConfig, ConnectionManager, ConnectionState, LocalFiles, Notice, Status,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "focus_cli")]
struct Args {
    /// EEG recording (CSV) to upload.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,

    /// Metrics server address; overrides FOCUS_WS_URL.
    #[arg(long)]
    ws_url: Option<String>,

    /// Print every state update as one JSON line instead of a summary.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut config = ClientConfig::from_env();
    if let Some(url) = args.ws_url.as_deref() {
        config.endpoint = url.trim().to_string();
    }
    tracing::debug!(endpoint = %config.endpoint, file = %args.file.display(), "starting upload");

    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<Notice>();
    let mut manager =
        ConnectionManager::with_parts(config, Arc::new(LocalFiles), Arc::new(notice_tx));
    let mut rx = manager.subscribe();

    if let Err(e) = manager.connect_and_send_file(&args.file).await {
        while let Ok(notice) = notice_rx.try_recv() {
            eprintln!("{notice}");
        }
        manager.disconnect();
        return Err(e.into());
    }
    eprintln!(
        "uploaded {}; waiting for scores from {}",
        args.file.display(),
        manager.endpoint()
    );

    let mut failed = false;
    let mut started = false;
    let mut last_position = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("interrupted");
                manager.disconnect();
                break;
            }
            Some(notice) = notice_rx.recv() => {
                failed |= !matches!(notice, Notice::Server(_));
                eprintln!("{notice}");
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();

                if args.json {
                    println!("{}", serde_json::to_string(&state)?);
                } else if state.stream_position != last_position {
                    println!("{}", render_line(&state));
                }

                // The mobile UI switched to its results view at this point.
                if !started && state.stream_position > 0 {
                    started = true;
                    eprintln!("stream started");
                }
                last_position = state.stream_position;

                if state.status == Status::Disconnected {
                    break;
                }
            }
        }
    }

    while let Ok(notice) = notice_rx.try_recv() {
        failed |= !matches!(notice, Notice::Server(_));
        eprintln!("{notice}");
    }

    if failed {
        anyhow::bail!("session ended with a connection error");
    }
    Ok(())
}

fn render_line(state: &ConnectionState) -> String {
    let mut line = format!(
        "[{}] second {:>4}  focus {}  theta {}  beta {}",
        state.status.as_str(),
        state.stream_position,
        fmt_opt(state.focus_score),
        fmt_opt(state.band_powers.theta),
        fmt_opt(state.band_powers.beta),
    );
    if let Some(spectrum) = &state.spectrum {
        line.push_str(&format!("  spectrum {} bins", spectrum.frequencies.len()));
    }
    line
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}
