// Client behavior against canned byte streams, no hardware involved.

use seamodem::{
    CONFIGURE_TIMEOUT, Diagnostic, Error, MockIoDev, Modem, ModemBuilder, ModemLink, Role,
};
use std::time::Duration;

fn make_modem(input: &[u8]) -> Modem<MockIoDev> {
    Modem::new(MockIoDev::new(input))
}

/// Canned responses for a successful connect handshake.
const CONNECT_OK: &[u8] = b"wrv,1,0,1\nwrn,8\n";

#[test]
fn connect_without_response_fails() {
    let mut modem = make_modem(b"");
    assert!(!modem.connect().unwrap());
    assert_eq!(modem.payload_size(), None);
}

#[test]
fn connect_with_response_succeeds() {
    let mut modem = make_modem(CONNECT_OK);
    assert!(modem.connect().unwrap());
    assert_eq!(modem.payload_size(), Some(8));
}

#[test]
fn connect_writes_exact_handshake_bytes() {
    let mut modem = make_modem(CONNECT_OK);
    assert!(modem.connect().unwrap());
    assert_eq!(modem.device().written(), b"\nwcv\nwcn\n");
}

#[test]
fn connect_rejects_unsupported_major_version() {
    let mut modem = make_modem(b"wrv,2,0,0\n");
    assert!(!modem.connect().unwrap());
    assert_eq!(modem.payload_size(), None);
}

#[test]
fn configure_ack_is_success() {
    let mut modem = make_modem(b"wrs,a\n");
    assert!(modem.cmd_configure(Role::A, 4, CONFIGURE_TIMEOUT).unwrap());
}

#[test]
fn configure_garbage_response_times_out() {
    let mut modem = make_modem(b"wr?\n");
    let ok = modem
        .cmd_configure(Role::A, 4, Duration::from_millis(10))
        .unwrap();
    assert!(!ok);
}

#[test]
fn configure_rejects_invalid_channel() {
    let mut modem = make_modem(b"");
    let err = modem.cmd_configure(Role::A, 9, CONFIGURE_TIMEOUT);
    assert!(matches!(err, Err(Error::InvalidParams(_))));
}

#[test]
fn queue_length_is_parsed() {
    let mut modem = make_modem(b"wrl,8\n");
    assert_eq!(modem.cmd_get_queue_length().unwrap(), Some(8));
}

#[test]
fn flush_ack_and_nack() {
    let mut modem = make_modem(b"wrf,a\n");
    assert!(modem.cmd_flush_queue().unwrap());

    let mut modem = make_modem(b"wrf,n\n");
    assert!(!modem.cmd_flush_queue().unwrap());
}

#[test]
fn diagnostic_is_parsed() {
    let mut modem = make_modem(b"wrd,n,1,2,3.0\n");
    let diag = modem.cmd_get_diagnostic().unwrap().unwrap();
    let expect = Diagnostic {
        link_up: false,
        pkt_cnt: 1,
        pkt_loss_cnt: 2,
        bit_error_rate: 3.0,
    };
    assert_eq!(diag, expect);
}

#[test]
fn version_is_parsed() {
    let mut modem = make_modem(b"wrv,1,2,3\n");
    let ver = modem.cmd_get_version(Duration::from_millis(500)).unwrap();
    assert_eq!(ver, Some([1, 2, 3]));
}

#[test]
fn queue_packet_round_trip() {
    let mut modem = make_modem(b"wrv,1,0,1\nwrn,8\nwrq,a\n");
    assert!(modem.connect().unwrap());
    assert!(modem.cmd_queue_packet(b"12345678").unwrap());
    assert!(
        modem
            .device()
            .written()
            .ends_with(b"wcq,8,12345678\n")
    );
}

#[test]
fn queue_packet_rejects_wrong_size() {
    let mut modem = make_modem(CONNECT_OK);
    assert!(modem.connect().unwrap());
    assert!(matches!(
        modem.cmd_queue_packet(b"1234567"),
        Err(Error::InvalidParams(_))
    ));
}

#[test]
fn queue_packet_requires_connect() {
    let mut modem = make_modem(b"");
    assert!(matches!(
        modem.cmd_queue_packet(b"12345678"),
        Err(Error::NotConnected)
    ));
}

#[test]
fn data_packet_is_returned() {
    let mut modem = make_modem(b"wrp,8,12345678\n");
    let data = modem.get_data_packet(Duration::from_millis(10)).unwrap();
    assert_eq!(data.as_deref(), Some(b"12345678".as_ref()));
}

#[test]
fn data_packet_survives_interleaved_command() {
    let mut modem = make_modem(b"wrp,8,12345678\nwrl,8\n");
    assert_eq!(modem.cmd_get_queue_length().unwrap(), Some(8));
    let data = modem.get_data_packet(Duration::ZERO).unwrap();
    assert_eq!(data.as_deref(), Some(b"12345678".as_ref()));
}

#[test]
fn non_blocking_poll_without_data() {
    let mut modem = make_modem(b"");
    assert_eq!(modem.get_data_packet(Duration::ZERO).unwrap(), None);
}

#[test]
fn non_blocking_poll_with_data() {
    let mut modem = make_modem(b"wrp,8,12345678\n");
    let data = modem.get_data_packet(Duration::ZERO).unwrap();
    assert_eq!(data.as_deref(), Some(b"12345678".as_ref()));
}

#[test]
fn partial_sentence_completes_after_feed() {
    let mut modem = make_modem(b"wrp,8,Hello");
    assert_eq!(modem.get_packet().unwrap(), None);

    modem.device_mut().feed(b"Sea\n");
    let pkt = modem.get_packet().unwrap().unwrap();
    assert_eq!(pkt.options[1].as_ref(), b"HelloSea");
}

#[test]
fn builder_constructs_mock_backed_client() {
    let mut modem = ModemBuilder::new().with_mock(CONNECT_OK).build();
    assert!(modem.connect().unwrap());
    assert_eq!(modem.payload_size(), Some(8));
}
