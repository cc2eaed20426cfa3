//! Result delivery: print the transform or send it as one UDP datagram.
//!
//! The payload is the 3x3 matrix as a JSON array of rows, for example
//! `[[0.1,0.0,0.0],[0.0,0.1,0.0],[0.0,0.0,1.0]]`.

use std::{
    fmt,
    io::{self, Write},
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
};

use mapcal_core::AffineTransform;

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("cannot serialize transform: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cannot resolve {host}:{port}")]
    Resolve { host: String, port: u16 },
    #[error("datagram truncated: sent {sent} of {len} bytes")]
    Truncated { sent: usize, len: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Serialize a transform the way every channel transmits it.
pub fn serialize_transform(transform: &AffineTransform) -> Result<String, DeliveryError> {
    Ok(serde_json::to_string(transform)?)
}

/// Where the finished transform goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultChannel {
    Stdout,
    Udp(SocketAddr),
}

impl ResultChannel {
    /// Resolve `host:port` into a UDP channel, preferring IPv4.
    pub fn udp(host: &str, port: u16) -> Result<Self, DeliveryError> {
        let resolve_err = || DeliveryError::Resolve {
            host: host.to_string(),
            port,
        };
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|_| resolve_err())?
            .collect();
        let target = addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(resolve_err)?;
        Ok(Self::Udp(target))
    }

    /// Deliver `transform`. `out` receives the text for [`ResultChannel::Stdout`].
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(transform, out))
    )]
    pub fn deliver<W: Write>(
        &self,
        transform: &AffineTransform,
        out: &mut W,
    ) -> Result<(), DeliveryError> {
        let payload = serialize_transform(transform)?;
        match self {
            Self::Stdout => {
                writeln!(out, "{payload}")?;
                out.flush()?;
            }
            Self::Udp(target) => {
                let bind: SocketAddr = if target.is_ipv4() {
                    ([0, 0, 0, 0], 0).into()
                } else {
                    (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
                };
                let socket = UdpSocket::bind(bind)?;
                let sent = socket.send_to(payload.as_bytes(), target)?;
                if sent != payload.len() {
                    return Err(DeliveryError::Truncated {
                        sent,
                        len: payload.len(),
                    });
                }
            }
        }
        log::info!("transform delivered to {self}");
        Ok(())
    }
}

impl fmt::Display for ResultChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Udp(addr) => write!(f, "udp://{addr}"),
        }
    }
}
