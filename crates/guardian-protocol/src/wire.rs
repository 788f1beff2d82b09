//! Wire format: Engine.IO v4 text packets carrying Socket.IO v5 packets.
//!
//! Each WebSocket text frame is one Engine.IO packet:
//!   `<engine type digit><payload>`
//! Engine.IO `message` packets (type `4`) wrap a Socket.IO packet:
//!   `<socket type digit>[<namespace>,][<ack id>][<json>]`
//!
//! Binary attachments are not used by the control server and are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// The default Socket.IO namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Session parameters sent by the server in the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// An Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// A Socket.IO packet, carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        payload: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
}

impl SocketPacket {
    /// Connect to the default namespace without auth payload (`40`).
    pub fn connect() -> Self {
        Self::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            payload: None,
        }
    }

    /// An event on the default namespace with no acknowledgement.
    pub fn event(name: &str, args: Vec<Value>) -> Self {
        Self::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            name: name.to_string(),
            args,
        }
    }

    pub fn disconnect() -> Self {
        Self::Disconnect {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// Encode a packet to the text of one WebSocket frame.
pub fn encode_packet(packet: &Packet) -> Result<String, ProtocolError> {
    let text = match packet {
        Packet::Open(handshake) => format!("0{}", serde_json::to_string(handshake)?),
        Packet::Close => "1".to_string(),
        Packet::Ping(data) => format!("2{data}"),
        Packet::Pong(data) => format!("3{data}"),
        Packet::Message(inner) => format!("4{}", encode_socket_packet(inner)?),
        Packet::Upgrade => "5".to_string(),
        Packet::Noop => "6".to_string(),
    };
    Ok(text)
}

fn encode_socket_packet(packet: &SocketPacket) -> Result<String, ProtocolError> {
    let mut out = String::new();
    match packet {
        SocketPacket::Connect { namespace, payload } => {
            out.push('0');
            push_namespace(&mut out, namespace);
            if let Some(payload) = payload {
                out.push_str(&serde_json::to_string(payload)?);
            }
        }
        SocketPacket::Disconnect { namespace } => {
            out.push('1');
            push_namespace(&mut out, namespace);
        }
        SocketPacket::Event {
            namespace,
            ack_id,
            name,
            args,
        } => {
            out.push('2');
            push_namespace(&mut out, namespace);
            if let Some(id) = ack_id {
                out.push_str(&id.to_string());
            }
            let mut array = Vec::with_capacity(args.len() + 1);
            array.push(Value::String(name.clone()));
            array.extend(args.iter().cloned());
            out.push_str(&serde_json::to_string(&array)?);
        }
        SocketPacket::Ack {
            namespace,
            ack_id,
            args,
        } => {
            out.push('3');
            push_namespace(&mut out, namespace);
            out.push_str(&ack_id.to_string());
            out.push_str(&serde_json::to_string(args)?);
        }
        SocketPacket::ConnectError { namespace, message } => {
            out.push('4');
            push_namespace(&mut out, namespace);
            out.push_str(&serde_json::to_string(&serde_json::json!({ "message": message }))?);
        }
    }
    Ok(out)
}

fn push_namespace(out: &mut String, namespace: &str) {
    if namespace != DEFAULT_NAMESPACE {
        out.push_str(namespace);
        out.push(',');
    }
}

/// Decode the text of one WebSocket frame.
pub fn decode_packet(text: &str) -> Result<Packet, ProtocolError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ProtocolError::Malformed("empty packet".to_string()))?;
    let rest = chars.as_str();

    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping(rest.to_string())),
        '3' => Ok(Packet::Pong(rest.to_string())),
        '4' => Ok(Packet::Message(decode_socket_packet(rest)?)),
        '5' => Ok(Packet::Upgrade),
        '6' => Ok(Packet::Noop),
        other => Err(ProtocolError::Malformed(format!(
            "unknown engine.io packet type {other:?}"
        ))),
    }
}

fn decode_socket_packet(text: &str) -> Result<SocketPacket, ProtocolError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ProtocolError::Malformed("empty socket.io packet".to_string()))?;
    let rest = chars.as_str();

    if matches!(kind, '5' | '6') {
        return Err(ProtocolError::Malformed(
            "binary socket.io packets are not supported".to_string(),
        ));
    }

    let (namespace, rest) = split_namespace(rest);
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    let (id_text, data) = rest.split_at(digits);
    let ack_id = if id_text.is_empty() {
        None
    } else {
        Some(
            id_text
                .parse::<u64>()
                .map_err(|e| ProtocolError::Malformed(format!("bad ack id: {e}")))?,
        )
    };

    match kind {
        '0' => Ok(SocketPacket::Connect {
            namespace,
            payload: parse_optional_json(data)?,
        }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let mut array = parse_array(data)?;
            if array.is_empty() {
                return Err(ProtocolError::Malformed("event without a name".to_string()));
            }
            let name = match array.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(ProtocolError::Malformed(format!(
                        "event name must be a string, got {other}"
                    )))
                }
            };
            Ok(SocketPacket::Event {
                namespace,
                ack_id,
                name,
                args: array,
            })
        }
        '3' => Ok(SocketPacket::Ack {
            namespace,
            ack_id: ack_id
                .ok_or_else(|| ProtocolError::Malformed("ack without id".to_string()))?,
            args: parse_array(data)?,
        }),
        '4' => {
            let message = match parse_optional_json(data)? {
                Some(Value::Object(map)) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => String::new(),
            };
            Ok(SocketPacket::ConnectError { namespace, message })
        }
        other => Err(ProtocolError::Malformed(format!(
            "unknown socket.io packet type {other:?}"
        ))),
    }
}

fn split_namespace(text: &str) -> (String, &str) {
    if text.starts_with('/') {
        match text.find(',') {
            Some(idx) => (text[..idx].to_string(), &text[idx + 1..]),
            None => (text.to_string(), ""),
        }
    } else {
        (DEFAULT_NAMESPACE.to_string(), text)
    }
}

fn parse_optional_json(data: &str) -> Result<Option<Value>, ProtocolError> {
    if data.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::from_str(data)?))
    }
}

fn parse_array(data: &str) -> Result<Vec<Value>, ProtocolError> {
    match parse_optional_json(data)? {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(ProtocolError::Malformed(format!(
            "expected a JSON array, got {other}"
        ))),
        None => Ok(Vec::new()),
    }
}

/// Extract an integer number of seconds from an event argument.
///
/// Accepts JSON integers and strings holding an integer.
pub fn integer_arg(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_open_handshake() {
        let packet = decode_packet(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        match packet {
            Packet::Open(handshake) => {
                assert_eq!(handshake.sid, "lv_VI97HAXpY6yYWAAAC");
                assert_eq!(handshake.ping_interval, 25000);
                assert_eq!(handshake.ping_timeout, 20000);
                assert_eq!(handshake.max_payload, Some(1_000_000));
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn decode_duration_event() {
        let packet = decode_packet(r#"42["time-received",90]"#).unwrap();
        let Packet::Message(SocketPacket::Event {
            namespace,
            ack_id,
            name,
            args,
        }) = packet
        else {
            panic!("expected event");
        };
        assert_eq!(namespace, "/");
        assert_eq!(ack_id, None);
        assert_eq!(name, "time-received");
        assert_eq!(args, vec![json!(90)]);
    }

    #[test]
    fn decode_event_with_namespace_and_ack() {
        let packet = decode_packet(r#"42/admin,17["ping",{"a":1}]"#).unwrap();
        let Packet::Message(SocketPacket::Event {
            namespace,
            ack_id,
            name,
            args,
        }) = packet
        else {
            panic!("expected event");
        };
        assert_eq!(namespace, "/admin");
        assert_eq!(ack_id, Some(17));
        assert_eq!(name, "ping");
        assert_eq!(args, vec![json!({"a": 1})]);
    }

    #[test]
    fn decode_connect_ack_and_error() {
        assert_eq!(
            decode_packet(r#"40{"sid":"abc"}"#).unwrap(),
            Packet::Message(SocketPacket::Connect {
                namespace: "/".to_string(),
                payload: Some(json!({"sid": "abc"})),
            })
        );
        assert_eq!(
            decode_packet(r#"44{"message":"Not authorized"}"#).unwrap(),
            Packet::Message(SocketPacket::ConnectError {
                namespace: "/".to_string(),
                message: "Not authorized".to_string(),
            })
        );
    }

    #[test]
    fn encode_client_packets() {
        assert_eq!(
            encode_packet(&Packet::Message(SocketPacket::connect())).unwrap(),
            "40"
        );
        assert_eq!(
            encode_packet(&Packet::Message(SocketPacket::event("timer-finished", vec![])))
                .unwrap(),
            r#"42["timer-finished"]"#
        );
        assert_eq!(encode_packet(&Packet::Pong(String::new())).unwrap(), "3");
        assert_eq!(
            encode_packet(&Packet::Message(SocketPacket::disconnect())).unwrap(),
            "41"
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(decode_packet("").is_err());
        assert!(decode_packet("9").is_err());
        assert!(decode_packet("42").is_err());
        assert!(decode_packet("42[5]").is_err());
        assert!(decode_packet(r#"451-["blob",{"_placeholder":true,"num":0}]"#).is_err());
    }

    #[test]
    fn integer_arg_accepts_numbers_and_numeric_strings() {
        assert_eq!(integer_arg(&json!(30)), Some(30));
        assert_eq!(integer_arg(&json!(-5)), Some(-5));
        assert_eq!(integer_arg(&json!(" 45 ")), Some(45));
        assert_eq!(integer_arg(&json!(1.5)), None);
        assert_eq!(integer_arg(&json!("soon")), None);
        assert_eq!(integer_arg(&json!(null)), None);
    }
}
