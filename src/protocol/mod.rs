//! Protocol definitions and constants

use std::time::Duration;

/// Largest payload carried by one frame pair (14-bit length field)
pub const MAX_PAYLOAD_SIZE: usize = 0x3FFF;

/// Size of the plaintext length field
pub const LENGTH_FIELD_SIZE: usize = 2;

/// Default relay port when a relay URL omits it
pub const DEFAULT_RELAY_PORT: u16 = 8388;

/// Connect timeout for relay and destination sockets
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a CONNECT request head (request line + headers)
pub const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Read buffer size used by the bridge pumps
pub const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Address record types
pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;
