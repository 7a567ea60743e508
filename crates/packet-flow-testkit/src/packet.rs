//! MQTT-style packet double.
//!
//! Stands in for a real wire-format packet library. Packets render as
//! `<TYPE Field=value ...>`, and that rendering is what flows match on.

use std::fmt;

use packet_flow::Packet;

/// Packet type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Connect,
    Connack,
    Publish,
    Puback,
    Subscribe,
    Suback,
    Pingreq,
    Pingresp,
    Disconnect,
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "CONNECT"),
            Self::Connack => write!(f, "CONNACK"),
            Self::Publish => write!(f, "PUBLISH"),
            Self::Puback => write!(f, "PUBACK"),
            Self::Subscribe => write!(f, "SUBSCRIBE"),
            Self::Suback => write!(f, "SUBACK"),
            Self::Pingreq => write!(f, "PINGREQ"),
            Self::Pingresp => write!(f, "PINGRESP"),
            Self::Disconnect => write!(f, "DISCONNECT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestPacket {
    Connect {
        client_id: String,
        keep_alive: u16,
        clean_session: bool,
    },
    Connack {
        session_present: bool,
        return_code: u8,
    },
    Publish {
        packet_id: u16,
        topic: String,
        payload: String,
    },
    Puback {
        packet_id: u16,
    },
    Subscribe {
        packet_id: u16,
        topic: String,
    },
    Suback {
        packet_id: u16,
        granted_qos: u8,
    },
    Pingreq,
    Pingresp,
    Disconnect,
}

impl TestPacket {
    pub fn connect(client_id: impl Into<String>) -> Self {
        Self::Connect {
            client_id: client_id.into(),
            keep_alive: 30,
            clean_session: true,
        }
    }

    /// Accepted connection, no session present.
    pub fn connack() -> Self {
        Self::Connack {
            session_present: false,
            return_code: 0,
        }
    }

    pub fn publish(packet_id: u16, topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::Publish {
            packet_id,
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

impl fmt::Display for TestPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            Self::Connect {
                client_id,
                keep_alive,
                clean_session,
            } => write!(
                f,
                "<{kind} ClientID={client_id:?} KeepAlive={keep_alive} CleanSession={clean_session}>"
            ),
            Self::Connack {
                session_present,
                return_code,
            } => write!(
                f,
                "<{kind} SessionPresent={session_present} ReturnCode={return_code}>"
            ),
            Self::Publish {
                packet_id,
                topic,
                payload,
            } => write!(
                f,
                "<{kind} PacketID={packet_id} Topic={topic:?} Payload={payload:?}>"
            ),
            Self::Puback { packet_id } => write!(f, "<{kind} PacketID={packet_id}>"),
            Self::Subscribe { packet_id, topic } => {
                write!(f, "<{kind} PacketID={packet_id} Topic={topic:?}>")
            }
            Self::Suback {
                packet_id,
                granted_qos,
            } => write!(f, "<{kind} PacketID={packet_id} GrantedQOS={granted_qos}>"),
            Self::Pingreq | Self::Pingresp | Self::Disconnect => write!(f, "<{kind}>"),
        }
    }
}

impl Packet for TestPacket {
    type Kind = PacketType;

    fn kind(&self) -> PacketType {
        match self {
            Self::Connect { .. } => PacketType::Connect,
            Self::Connack { .. } => PacketType::Connack,
            Self::Publish { .. } => PacketType::Publish,
            Self::Puback { .. } => PacketType::Puback,
            Self::Subscribe { .. } => PacketType::Subscribe,
            Self::Suback { .. } => PacketType::Suback,
            Self::Pingreq => PacketType::Pingreq,
            Self::Pingresp => PacketType::Pingresp,
            Self::Disconnect => PacketType::Disconnect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendering_names_the_packet_type() {
        assert_eq!(
            TestPacket::connack().to_string(),
            "<CONNACK SessionPresent=false ReturnCode=0>"
        );
        assert_eq!(
            TestPacket::connect("c1").render(),
            r#"<CONNECT ClientID="c1" KeepAlive=30 CleanSession=true>"#
        );
        assert_eq!(TestPacket::Pingreq.to_string(), "<PINGREQ>");
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(TestPacket::connect("c1").kind(), PacketType::Connect);
        assert_eq!(
            TestPacket::publish(1, "a/b", "hi").kind(),
            PacketType::Publish
        );
        assert_eq!(TestPacket::Disconnect.kind(), PacketType::Disconnect);
    }

    #[test]
    fn renderings_differ_on_fields() {
        assert_ne!(
            TestPacket::publish(1, "a", "x").render(),
            TestPacket::publish(2, "a", "x").render()
        );
    }
}
