//! Fixed-layout wire frames exchanged between a rendezvous coordinator and
//! its peers.
//!
//! [RFC8489]: https://tools.ietf.org/html/rfc8489
//!
//! The coordinator speaks a tiny STUN-adjacent protocol of its own: a
//! `Request` frame (ASK or POST) sent by either a server or a client, and an
//! `Endpoint` frame sent back by the coordinator. Both are carried as-is
//! over UDP datagrams and over a length-implicit single read on a TCP
//! stream; there is no framing beyond "exactly N bytes".

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut};

/// Size in bytes of an [`Endpoint`] frame on the wire.
pub const ENDPOINT_SIZE: usize = 8;

/// Size in bytes of a [`Request`] frame on the wire.
pub const REQUEST_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The buffer was not exactly the expected frame size.
    WrongLength { expected: usize, actual: usize },
    /// The `type` tag in a [`Request`] frame did not match a known kind.
    UnknownRequestKind(u32),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongLength { expected, actual } => {
                write!(f, "wrong frame length: expected {expected}, got {actual}")
            }
            Self::UnknownRequestKind(tag) => write!(f, "unknown request type tag: {tag}"),
        }
    }
}

/// `(ip, private_port, public_port)` triple, 8 bytes on the wire.
///
/// `ip` is carried as the raw 32-bit value the OS address API produces.
/// `private_port` and `public_port` are big-endian on the wire, matching
/// network byte order for port fields.
///
/// # Test
///
/// ```
/// use rendezvous_codec::Endpoint;
///
/// let endpoint = Endpoint {
///     ip: 0x0a000001,
///     private_port: 40000,
///     public_port: 40000,
/// };
///
/// let mut buf = [0u8; Endpoint::SIZE];
/// endpoint.encode(&mut buf);
///
/// assert_eq!(Endpoint::decode(&buf).unwrap(), endpoint);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Endpoint {
    pub ip: u32,
    pub private_port: u16,
    pub public_port: u16,
}

impl Endpoint {
    pub const SIZE: usize = ENDPOINT_SIZE;

    pub fn new(ip: Ipv4Addr, private_port: u16, public_port: u16) -> Self {
        Self {
            ip: u32::from_be_bytes(ip.octets()),
            private_port,
            public_port,
        }
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip.to_be_bytes())
    }

    /// Sentinel endpoint returned on an ASK miss: the original request's
    /// endpoint with `private_port` overwritten to 0.
    pub fn not_found(ip: u32, public_port: u16) -> Self {
        Self {
            ip,
            private_port: 0,
            public_port,
        }
    }

    pub fn encode(&self, buf: &mut [u8; Self::SIZE]) {
        let mut cursor = &mut buf[..];
        cursor.put_u32(self.ip);
        cursor.put_u16(self.private_port);
        cursor.put_u16(self.public_port);
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        self.encode(&mut buf);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::SIZE {
            return Err(Error::WrongLength {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        let mut cursor = bytes;
        Ok(Self {
            ip: cursor.get_u32(),
            private_port: cursor.get_u16(),
            public_port: cursor.get_u16(),
        })
    }
}

/// The `type` tag of a [`Request`] frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// A client asking for a server's private-side mapping.
    AskInfo,
    /// A server posting its public-side advertised port.
    PostInfo,
}

impl RequestKind {
    const ASK_INFO: u32 = 0;
    const POST_INFO: u32 = 1;

    fn from_tag(tag: u32) -> Result<Self, Error> {
        match tag {
            Self::ASK_INFO => Ok(Self::AskInfo),
            Self::POST_INFO => Ok(Self::PostInfo),
            other => Err(Error::UnknownRequestKind(other)),
        }
    }

    fn tag(self) -> u32 {
        match self {
            Self::AskInfo => Self::ASK_INFO,
            Self::PostInfo => Self::POST_INFO,
        }
    }
}

/// A 12-byte request frame: a 4-byte type tag followed by an [`Endpoint`].
///
/// The tag is carried as a 32-bit-aligned field to match the platform
/// struct layout the coordinator's wire peers expect; any other frame
/// length is rejected rather than guessed at.
///
/// # Test
///
/// ```
/// use rendezvous_codec::{Endpoint, Request, RequestKind};
///
/// let request = Request {
///     kind: RequestKind::PostInfo,
///     entry: Endpoint { ip: 0, private_port: 0, public_port: 40000 },
/// };
///
/// let mut buf = [0u8; Request::SIZE];
/// request.encode(&mut buf);
///
/// assert_eq!(Request::decode(&buf).unwrap(), request);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub kind: RequestKind,
    pub entry: Endpoint,
}

impl Request {
    pub const SIZE: usize = REQUEST_SIZE;

    pub fn encode(&self, buf: &mut [u8; Self::SIZE]) {
        let mut cursor = &mut buf[..];
        cursor.put_u32(self.kind.tag());

        let mut entry_buf = [0u8; Endpoint::SIZE];
        self.entry.encode(&mut entry_buf);
        cursor.put_slice(&entry_buf);
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        self.encode(&mut buf);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::SIZE {
            return Err(Error::WrongLength {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        let mut cursor = bytes;
        let tag = cursor.get_u32();

        Ok(Self {
            kind: RequestKind::from_tag(tag)?,
            entry: Endpoint::decode(cursor)?,
        })
    }
}
