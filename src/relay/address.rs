//! Target address record carried as the first tunnel payload
//!
//! ```text
//! +------+----------------------+----------+
//! | ATYP | Address              | Port (BE)|
//! +------+----------------------+----------+
//! | 0x01 | 4 bytes              | 2 bytes  |
//! | 0x03 | len (1B) + domain    | 2 bytes  |
//! | 0x04 | 16 bytes             | 2 bytes  |
//! +------+----------------------+----------+
//! ```

use super::RelayError;
use crate::protocol::{ATYP_DOMAIN, ATYP_IPV4, ATYP_IPV6};
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Relay target address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// IPv4 address and port
    Ipv4(Ipv4Addr, u16),
    /// IPv6 address and port
    Ipv6(Ipv6Addr, u16),
    /// Domain name and port
    Domain(String, u16),
}

impl Address {
    /// Domain-type address; always what the client side sends
    pub fn domain(host: &str, port: u16) -> Result<Self, RelayError> {
        if host.is_empty() || host.len() > u8::MAX as usize {
            return Err(RelayError::InvalidAddress(format!(
                "domain length {} out of range",
                host.len()
            )));
        }
        Ok(Address::Domain(host.to_string(), port))
    }

    /// Get the port
    pub fn port(&self) -> u16 {
        match self {
            Address::Ipv4(_, port) | Address::Ipv6(_, port) | Address::Domain(_, port) => *port,
        }
    }

    /// Host part, suitable for dialing
    pub fn host(&self) -> String {
        match self {
            Address::Ipv4(ip, _) => ip.to_string(),
            Address::Ipv6(ip, _) => ip.to_string(),
            Address::Domain(domain, _) => domain.clone(),
        }
    }

    /// Encoded length in bytes
    pub fn encoded_len(&self) -> usize {
        match self {
            Address::Ipv4(..) => 1 + 4 + 2,
            Address::Ipv6(..) => 1 + 16 + 2,
            Address::Domain(domain, _) => 1 + 1 + domain.len() + 2,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        match self {
            Address::Ipv4(ip, port) => {
                buf.put_u8(ATYP_IPV4);
                buf.put_slice(&ip.octets());
                buf.put_u16(*port);
            }
            Address::Ipv6(ip, port) => {
                buf.put_u8(ATYP_IPV6);
                buf.put_slice(&ip.octets());
                buf.put_u16(*port);
            }
            Address::Domain(domain, port) => {
                buf.put_u8(ATYP_DOMAIN);
                buf.put_u8(domain.len() as u8);
                buf.put_slice(domain.as_bytes());
                buf.put_u16(*port);
            }
        }
    }

    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf
    }

    /// Decode from the front of `buf`.
    ///
    /// Returns `Ok(None)` if more bytes are needed, otherwise the address
    /// and the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, RelayError> {
        let Some(&atyp) = buf.first() else {
            return Ok(None);
        };

        let (needed, header) = match atyp {
            ATYP_IPV4 => (1 + 4 + 2, 1),
            ATYP_IPV6 => (1 + 16 + 2, 1),
            ATYP_DOMAIN => match buf.get(1) {
                Some(&len) if len > 0 => (1 + 1 + len as usize + 2, 2),
                Some(_) => return Err(RelayError::InvalidAddress("empty domain".to_string())),
                None => return Ok(None),
            },
            other => return Err(RelayError::UnsupportedAddressType(other)),
        };

        if buf.len() < needed {
            return Ok(None);
        }

        let body = &buf[header..needed - 2];
        let port = u16::from_be_bytes([buf[needed - 2], buf[needed - 1]]);

        let address = match atyp {
            ATYP_IPV4 => {
                let octets: [u8; 4] = body.try_into().map_err(|_| {
                    RelayError::InvalidAddress("bad IPv4 length".to_string())
                })?;
                Address::Ipv4(Ipv4Addr::from(octets), port)
            }
            ATYP_IPV6 => {
                let octets: [u8; 16] = body.try_into().map_err(|_| {
                    RelayError::InvalidAddress("bad IPv6 length".to_string())
                })?;
                Address::Ipv6(Ipv6Addr::from(octets), port)
            }
            _ => {
                let domain = std::str::from_utf8(body)
                    .map_err(|_| RelayError::InvalidAddress("domain is not UTF-8".to_string()))?;
                Address::Domain(domain.to_string(), port)
            }
        };

        Ok(Some((address, needed)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ipv4(ip, port) => write!(f, "{}:{}", ip, port),
            Address::Ipv6(ip, port) => write!(f, "[{}]:{}", ip, port),
            Address::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}
