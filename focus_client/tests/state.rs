use focus_client::{BandPowers, ConnectionState, InboundMessage, Spectrum, Status};

fn msg(text: &str) -> InboundMessage {
    InboundMessage::decode(text).expect("valid frame")
}

fn populated() -> ConnectionState {
    let mut state = ConnectionState::new("ws://example.test/ws");
    state.status = Status::Connected;
    state.upload_in_flight = true;
    state.apply(&msg(
        r#"{
            "focus_score": 0.8,
            "theta_power": 3.0,
            "beta_power": 1.5,
            "spectrum": {"frequencies": [1, 2], "power_density": [0.1, 0.2]},
            "start_second": 0,
            "end_second": 3
        }"#,
    ));
    state
}

#[test]
fn initial_state() {
    let state = ConnectionState::new("ws://example.test/ws");
    assert_eq!(state.status, Status::Disconnected);
    assert_eq!(state.endpoint, "ws://example.test/ws");
    assert_eq!(state.focus_score, None);
    assert!(state.band_powers.is_empty());
    assert_eq!(state.spectrum, None);
    assert_eq!(state.stream_position, 0);
    assert!(!state.upload_in_flight);
}

#[test]
fn apply_sets_every_recognised_field() {
    let state = populated();
    assert_eq!(state.focus_score, Some(0.8));
    assert_eq!(
        state.band_powers,
        BandPowers {
            theta: Some(3.0),
            beta: Some(1.5)
        }
    );
    assert_eq!(
        state.spectrum,
        Some(Spectrum {
            frequencies: vec![1.0, 2.0],
            power_density: vec![0.1, 0.2],
        })
    );
    assert_eq!(state.stream_position, 3);
}

#[test]
fn focus_score_alone_leaves_other_slots() {
    let mut state = populated();
    let before = state.clone();

    state.apply(&msg(r#"{"focus_score": 0.42}"#));

    assert_eq!(state.focus_score, Some(0.42));
    assert_eq!(state.band_powers, before.band_powers);
    assert_eq!(state.spectrum, before.spectrum);
    assert_eq!(state.stream_position, before.stream_position);
    assert_eq!(state.status, before.status);
}

#[test]
fn one_band_updates_independently() {
    let mut state = populated();
    state.apply(&msg(r#"{"beta_power": 9.0}"#));
    assert_eq!(state.band_powers.theta, Some(3.0));
    assert_eq!(state.band_powers.beta, Some(9.0));
}

#[test]
fn spectrum_is_replaced_as_a_unit() {
    let mut state = populated();
    state.apply(&msg(
        r#"{"spectrum": {"frequencies": [5, 6, 7], "power_density": [1, 1, 1]}}"#,
    ));
    let spectrum = state.spectrum.expect("spectrum present");
    assert_eq!(spectrum.frequencies, vec![5.0, 6.0, 7.0]);
    assert_eq!(spectrum.power_density, vec![1.0, 1.0, 1.0]);
}

#[test]
fn stream_position_is_taken_verbatim() {
    let mut state = ConnectionState::default();

    state.apply(&msg(r#"{"start_second": 0, "end_second": 3}"#));
    state.apply(&msg(r#"{"start_second": 3, "end_second": 7}"#));
    assert_eq!(state.stream_position, 7);

    // going backwards is accepted
    state.apply(&msg(r#"{"start_second": 1, "end_second": 2}"#));
    assert_eq!(state.stream_position, 2);
}

#[test]
fn stream_position_needs_a_full_valid_window() {
    let mut state = ConnectionState::default();
    state.apply(&msg(r#"{"start_second": 0, "end_second": 4}"#));

    state.apply(&msg(r#"{"end_second": 9}"#));
    assert_eq!(state.stream_position, 4);

    state.apply(&msg(r#"{"start_second": 0, "end_second": -1}"#));
    assert_eq!(state.stream_position, 4);

    state.apply(&msg(r#"{"start_second": 5, "end_second": 6.75}"#));
    assert_eq!(state.stream_position, 6);
}

#[test]
fn reset_clears_everything_but_the_endpoint() {
    let mut state = populated();
    state.status = Status::Error;
    state.reset();
    assert_eq!(state, ConnectionState::new("ws://example.test/ws"));

    let once = state.clone();
    state.reset();
    assert_eq!(state, once);
}

#[test]
fn state_serialises_for_consumers() {
    let value = serde_json::to_value(populated()).expect("serialise");
    assert_eq!(value["status"], "connected");
    assert_eq!(value["band_powers"]["theta"], 3.0);
    assert_eq!(value["stream_position"], 3);
    assert_eq!(value["upload_in_flight"], true);
    assert_eq!(Status::Error.as_str(), "error");
}
