use crossbeam_channel::unbounded;
use focus_mock_server::{window_script, MockServer, ScriptStep, ServerEvent};
use focus_protocol::{encode_upload, InboundMessage};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tungstenite::Message;

fn connect(server: &MockServer) -> tungstenite::WebSocket<TcpStream> {
    let stream = TcpStream::connect(server.listen_addr()).expect("tcp connect");
    let (ws, _) = tungstenite::client(server.url(), stream).expect("ws connect");
    let _ = ws.get_ref().set_read_timeout(Some(Duration::from_millis(50)));
    ws
}

fn read_text(ws: &mut tungstenite::WebSocket<TcpStream>, timeout: Duration) -> Option<String> {
    let deadline = Instant::now() + timeout;
    loop {
        match ws.read() {
            Ok(Message::Text(s)) => return Some(s.as_str().to_owned()),
            Ok(_) => continue,
            Err(tungstenite::Error::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                if Instant::now() >= deadline {
                    panic!("timeout waiting for server message");
                }
            }
            Err(_) => return None,
        }
    }
}

#[test]
fn upload_then_scripted_frames_then_close() {
    let (events_tx, events_rx) = unbounded();
    let server = MockServer::scripted(
        vec![
            ScriptStep::Send(r#"{"focus_score": 0.5}"#.to_string()),
            ScriptStep::Pause(Duration::from_millis(20)),
            ScriptStep::Send(r#"{"start_second": 0, "end_second": 1}"#.to_string()),
            ScriptStep::Close,
        ],
        events_tx,
    )
    .expect("spawn server");

    let mut ws = connect(&server);
    let payload = encode_upload(b"a,b\n1,2\n");
    ws.send(Message::Text(payload.clone().into())).expect("send upload");

    let first = read_text(&mut ws, Duration::from_secs(2)).expect("first frame");
    assert_eq!(
        InboundMessage::decode(&first).expect("valid json").focus_score,
        Some(0.5)
    );
    let second = read_text(&mut ws, Duration::from_secs(2)).expect("second frame");
    assert_eq!(
        InboundMessage::decode(&second).expect("valid json").window(),
        Some((0.0, 1.0))
    );
    assert_eq!(read_text(&mut ws, Duration::from_secs(2)), None);

    let socket_addr = match events_rx.recv_timeout(Duration::from_secs(2)) {
        Ok(ServerEvent::ClientConnected { socket_addr }) => socket_addr,
        other => panic!("expected connect event, got: {other:?}"),
    };
    assert_eq!(
        events_rx.recv_timeout(Duration::from_secs(2)),
        Ok(ServerEvent::UploadReceived {
            socket_addr,
            payload
        })
    );
    assert_eq!(
        events_rx.recv_timeout(Duration::from_secs(2)),
        Ok(ServerEvent::ClientDisconnected { socket_addr })
    );
    assert_eq!(server.stats().live(), 0);
    assert_eq!(server.stats().accepted(), 1);

    server.shutdown();
}

#[test]
fn window_responder_counts_full_seconds() {
    let (events_tx, _events_rx) = unbounded();
    let server = MockServer::spawn_with_addr(
        "127.0.0.1:0",
        Arc::new(|upload: &str| window_script(upload, 2, Duration::ZERO)),
        events_tx,
    )
    .expect("spawn server");

    let mut ws = connect(&server);
    // 5 rows at 2 Hz is two full seconds
    ws.send(Message::Text(encode_upload(b"1\n2\n3\n4\n5\n").into()))
        .expect("send upload");

    for expected in [(0.0, 1.0), (1.0, 2.0)] {
        let text = read_text(&mut ws, Duration::from_secs(2)).expect("window frame");
        let msg = InboundMessage::decode(&text).expect("valid json");
        assert_eq!(msg.window(), Some(expected));
        assert_eq!(msg.focus_score, None);
    }

    server.shutdown();
}

#[test]
fn window_script_reports_bad_upload() {
    let steps = window_script("not base64!", 500, Duration::ZERO);
    assert_eq!(steps.len(), 1);
    let ScriptStep::Send(text) = &steps[0] else {
        panic!("expected a send step, got: {steps:?}");
    };
    let msg = InboundMessage::decode(text).expect("valid json");
    assert_eq!(msg.error.as_deref(), Some("upload is not valid base64"));
}

#[test]
fn window_script_paces_frames() {
    let steps = window_script(&encode_upload(b"1\n2\n"), 1, Duration::from_millis(5));
    assert_eq!(
        steps.iter().filter(|s| matches!(s, ScriptStep::Pause(_))).count(),
        2
    );
}
