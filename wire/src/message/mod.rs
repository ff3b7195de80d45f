mod funding;
pub use self::funding::*;

mod operation;
pub use self::operation::*;

mod close;
pub use self::close::*;

mod watch;
pub use self::watch::*;

use serde::Serialize;
use serde::Serializer;
use serde::Deserialize;
use serde::Deserializer;
use serde::ser;
use serde::de;

use std::fmt;

macro_rules! message {
    (pub enum $name:ident { $($variant:ident($opcode:tt, $unwrap_method:ident)),* }) => {
        /// Tagged union, the variant name equals the type name which the
        /// variant contains. The tag is the one byte opcode.
        #[derive(Eq, PartialEq, Clone)]
        pub enum $name {
            $($variant($variant),)*
        }

        impl $name {
            fn read_from<'de, A>(payload: A) -> Result<Self, A::Error> where
                A: de::SeqAccess<'de>
            {
                let mut payload = payload;

                let noopcode_err = {
                    let temp = "cannot read the opcode byte of the message";
                    <A::Error as de::Error>::custom(temp)
                };

                let novalue_err = |s| {
                    let temp = format!("cannot interpret the value as an instance of: `{}`", s);
                    <A::Error as de::Error>::custom(temp)
                };

                let unknown_err = |t| {
                    let temp = format!("opcode: `{:#x}` is unknown", t);
                    <A::Error as de::Error>::custom(temp)
                };

                let opcode: u8 = payload.next_element()?.ok_or(noopcode_err)?;

                use self::$name::*;
                match opcode {
                    $(
                        $opcode => {
                            let error = novalue_err(stringify!($variant));
                            payload.next_element()
                                .and_then(|i| {
                                    i.ok_or(error).map(|x| $variant(x))
                                })
                        },
                    )*
                    t => Err(unknown_err(t)),
                }
            }

            fn write_into<A>(&self, consumer: &mut A) -> Result<(), A::Error> where
                A: ser::SerializeStruct
            {
                use self::$name::*;
                match self {
                    $(
                        &$variant(ref payload) => {
                            consumer.serialize_field("opcode", &($opcode as u8))?;
                            consumer.serialize_field("payload", payload)
                        },
                    )*
                }
            }

            $(
                pub fn $unwrap_method(self) -> Option<$variant> {
                    use self::$name::*;
                    match self {
                        $variant(t) => Some(t),
                        _ => None,
                    }
                }
            )*
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                use self::$name::*;
                match self {
                    $(
                        &$variant(ref payload) => {
                            write!(f, "{:?}", payload)
                        },
                    )*
                }
            }
        }
    }
}

/// The enumeration of every message the node sends or receives: the
/// funding handshake, the update exchange, cooperative close, and the
/// two watchtower feeds.
message! {
    pub enum Message {
        PointReq(0x30u8, as_point_req),
        PointResp(0x31u8, as_point_resp),
        ChanDesc(0x32u8, as_chan_desc),
        ChanAck(0x33u8, as_chan_ack),
        DeltaSig(0x38u8, as_delta_sig),
        SigRev(0x39u8, as_sig_rev),
        Rev(0x3au8, as_rev),
        CloseReq(0x40u8, as_close_req),
        CloseResp(0x41u8, as_close_resp),
        WatchDesc(0xa0u8, as_watch_desc),
        WatchState(0xa1u8, as_watch_state)
    }
}

impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        use self::ser::SerializeStruct;

        // The names are for documentation only, the serializer drops them
        let mut s_struct = serializer.serialize_struct("Message", 2)?;
        self.write_into(&mut s_struct)?;
        s_struct.end()
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error> where D: Deserializer<'de> {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = Message;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(
                    "pair: the one byte opcode, \
                    the binary representation of the message"
                )
            }

            fn visit_seq<A>(self, seq: A) -> Result<Self::Value, A::Error> where
                A: de::SeqAccess<'de>,
            {
                Message::read_from(seq)
            }
        }

        deserializer.deserialize_tuple(2, Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Hash256, RawPublicKey, RawSignature, WireOutPoint};
    use binformat::BinarySD;
    use pretty_assertions::assert_eq;

    fn round_trip(msg: Message, expected_len: usize) {
        let mut v = Vec::new();
        BinarySD::serialize(&mut v, &msg).unwrap();
        assert_eq!(v.len(), expected_len, "wire length of {:?}", msg);
        let restored: Message = BinarySD::deserialize(&v[..]).unwrap();
        assert_eq!(restored, msg);
    }

    fn some_outpoint() -> WireOutPoint {
        WireOutPoint { txid: Hash256([0x1d; 32]), index: 1 }
    }

    #[test]
    fn point_req_is_a_bare_opcode() {
        let mut v = Vec::new();
        BinarySD::serialize(&mut v, &Message::PointReq(PointReq)).unwrap();
        assert_eq!(v, vec![0x30]);
    }

    #[test]
    fn funding_messages() {
        let keys = ChannelKeys {
            funding_pk: RawPublicKey([2; 33]),
            refund_pk: RawPublicKey([3; 33]),
            delay_pk: RawPublicKey([2; 33]),
            revocation_base_pk: RawPublicKey([3; 33]),
            elk0_point: RawPublicKey([2; 33]),
            elk1_point: RawPublicKey([3; 33]),
        };
        round_trip(Message::PointResp(PointResp { keys }), 1 + 198);
        round_trip(
            Message::ChanDesc(ChanDesc {
                outpoint: some_outpoint(),
                capacity: 1_000_000,
                init_send: 0,
                csv_delay: 5,
                keys,
                sig: RawSignature([9; 64]),
            }),
            1 + 36 + 8 + 8 + 2 + 198 + 64,
        );
        round_trip(
            Message::ChanAck(ChanAck { outpoint: some_outpoint(), sig: RawSignature([9; 64]) }),
            1 + 36 + 64,
        );
    }

    #[test]
    fn update_messages() {
        round_trip(
            Message::DeltaSig(DeltaSig {
                outpoint: some_outpoint(),
                delta: 100,
                sig: RawSignature([7; 64]),
                next_elk_point: RawPublicKey([2; 33]),
            }),
            1 + 36 + 4 + 64 + 33,
        );
        round_trip(
            Message::SigRev(SigRev {
                outpoint: some_outpoint(),
                sig: RawSignature([7; 64]),
                elk: Hash256([5; 32]),
                next_elk_point: RawPublicKey([2; 33]),
            }),
            1 + 36 + 64 + 32 + 33,
        );
        round_trip(
            Message::Rev(Rev { outpoint: some_outpoint(), elk: Hash256([5; 32]) }),
            1 + 36 + 32,
        );
    }

    #[test]
    fn close_request_layout() {
        // opcode | outpoint (36) | sig (64)
        let msg = Message::CloseReq(CloseReq {
            outpoint: some_outpoint(),
            sig: RawSignature([0x44; 64]),
        });
        let mut v = Vec::new();
        BinarySD::serialize(&mut v, &msg).unwrap();
        assert_eq!(v.len(), 101);
        assert_eq!(v[0], 0x40);
        assert_eq!(&v[1..33], &[0x1d; 32][..]);
        assert_eq!(&v[33..37], &[0, 0, 0, 1][..]);
        assert_eq!(&v[37..], &[0x44; 64][..]);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let v = vec![0xffu8, 0, 0];
        let restored: Result<Message, _> = BinarySD::deserialize(&v[..]);
        assert!(restored.is_err());
    }
}
