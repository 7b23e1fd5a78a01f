use crossbeam_channel::{bounded, RecvTimeoutError};
use focus_mock_server::{window_script, MockServer, Responder, ScriptStep, ServerEvent};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_SAMPLE_RATE: u32 = 500;

fn parse_arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn load_script(path: &PathBuf) -> Result<Vec<ScriptStep>, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read script {}: {e}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| ScriptStep::Send(line.to_string()))
        .collect())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let addr = parse_arg_value(&args, "--addr")
        .or_else(|| std::env::var("FOCUS_MOCK_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let addr_file = parse_arg_value(&args, "--addr-file").map(PathBuf::from);
    let script_file = parse_arg_value(&args, "--script").map(PathBuf::from);
    let sample_rate = parse_arg_value(&args, "--sample-rate")
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(DEFAULT_SAMPLE_RATE);
    let interval = parse_arg_value(&args, "--interval-ms")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::ZERO);
    let run_for_ms = parse_arg_value(&args, "--run-for-ms")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis);
    let close_after = args.iter().any(|a| a == "--close-after");

    let scripted = match script_file.as_ref().map(load_script).transpose() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let responder: Responder = Arc::new(move |upload: &str| {
        let mut steps = match &scripted {
            Some(steps) => steps.clone(),
            None => window_script(upload, sample_rate, interval),
        };
        if close_after {
            steps.push(ScriptStep::Close);
        }
        steps
    });

    let (events_tx, events_rx) = bounded(focus_mock_server::EVENTS_CAP);
    let server = match MockServer::spawn_with_addr(&addr, responder, events_tx) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if let Some(path) = &addr_file {
        let _ = fs::write(path, server.listen_addr().to_string());
    }

    println!("mock_metrics_server listening on {}", server.url());

    let start = Instant::now();
    loop {
        match events_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(ServerEvent::ClientConnected { socket_addr }) => {
                println!("client connected: {socket_addr}");
            }
            Ok(ServerEvent::UploadReceived {
                socket_addr,
                payload,
            }) => {
                println!("upload from {socket_addr}: {} base64 chars", payload.len());
            }
            Ok(ServerEvent::ClientDisconnected { socket_addr }) => {
                println!("client disconnected: {socket_addr}");
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if let Some(max) = run_for_ms {
            if start.elapsed() >= max {
                break;
            }
        }
    }

    server.shutdown();
}
