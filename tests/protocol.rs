//! Wire-format edge cases that sit above the per-function unit tests in
//! `src/protocol/`: a parameterized arity table across every verb, and
//! confirmation that bulk-string framing is byte-exact for values that
//! aren't valid UTF-8 or that embed the line terminator itself.

use bitlogd::protocol::{self, Command, ProtocolError};

use test_case::test_case;

#[test_case("PING a b" => matches ProtocolError::WrongArgs("PING"); "ping rejects extra args")]
#[test_case("GET" => matches ProtocolError::WrongArgs("GET"); "get requires a key")]
#[test_case("GET a b" => matches ProtocolError::WrongArgs("GET"); "get rejects extra args")]
#[test_case("SET k" => matches ProtocolError::WrongArgs("SET"); "set requires a value")]
#[test_case("SET k v extra junk" => matches ProtocolError::WrongArgs("SET"); "set rejects extra args")]
#[test_case("DEL" => matches ProtocolError::WrongArgs("DEL"); "del requires a key")]
#[test_case("DEL a b" => matches ProtocolError::WrongArgs("DEL"); "del rejects extra args")]
#[test_case("KEYS" => matches ProtocolError::WrongArgs("KEYS"); "keys requires a pattern")]
#[test_case("KEYS a b" => matches ProtocolError::WrongArgs("KEYS"); "keys rejects extra args")]
#[test_case("FROB a" => matches ProtocolError::UnknownCommand(_); "unknown verb")]
fn arity_and_unknown_verb_errors(line: &str) -> ProtocolError {
    protocol::parse(line).unwrap_err()
}

#[test_case("PING" => Command::Ping; "ping")]
#[test_case("GET k" => Command::Get(b"k".to_vec()); "get")]
#[test_case("DEL k" => Command::Del(b"k".to_vec()); "del")]
#[test_case("KEYS *" => Command::Keys("*".to_string()); "keys wildcard")]
fn valid_commands_parse(line: &str) -> Command {
    protocol::parse(line).unwrap()
}

#[test]
fn bulk_string_framing_is_byte_exact_for_non_utf8_values() {
    let value: Vec<u8> = vec![0xff, 0x00, 0x10, b'\r', b'\n', 0xfe];
    let mut buf = Vec::new();
    protocol::write_bulk_string(&mut buf, &value).unwrap();

    let mut expected = format!("${}\r\n", value.len()).into_bytes();
    expected.extend_from_slice(&value);
    expected.extend_from_slice(b"\r\n");

    assert_eq!(buf, expected, "framed bytes: {}", hex::encode(&buf));
}

#[test]
fn bulk_string_length_prefix_counts_raw_bytes_not_chars() {
    // A multi-byte UTF-8 value's length prefix must be the byte count, not
    // the character count.
    let value = "héllo".as_bytes();
    let mut buf = Vec::new();
    protocol::write_bulk_string(&mut buf, value).unwrap();

    let header_end = buf.iter().position(|&b| b == b'\r').unwrap();
    let declared: usize = std::str::from_utf8(&buf[1..header_end]).unwrap().parse().unwrap();
    assert_eq!(declared, value.len());
    assert_eq!(declared, 6); // 'h' + 2-byte 'é' + "llo"
}

#[test]
fn array_of_binary_keys_frames_each_independently() {
    let keys = vec![b"a".to_vec(), vec![0x00, 0xff], b"ccc".to_vec()];
    let mut buf = Vec::new();
    protocol::write_array(&mut buf, &keys).unwrap();

    let mut expected = format!("*{}\r\n", keys.len()).into_bytes();
    for key in &keys {
        expected.extend_from_slice(format!("${}\r\n", key.len()).as_bytes());
        expected.extend_from_slice(key);
        expected.extend_from_slice(b"\r\n");
    }
    assert_eq!(buf, expected);
}
