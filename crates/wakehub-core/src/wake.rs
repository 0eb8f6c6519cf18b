//! Magic wake packet codec
//!
//! A magic packet is 6 bytes of `0xFF` followed by the target hardware address
//! repeated 16 times, 102 bytes in total.

use thiserror::Error;

/// Size of a magic packet in bytes
pub const MAGIC_PACKET_LEN: usize = 102;

/// Failure to build or send a wake packet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WakeError {
    /// MAC string is not 12 hex digits after removing separators
    #[error("invalid MAC address: {0:?}")]
    InvalidMac(String),

    /// The broadcast socket could not be opened
    #[error("failed to open wake socket: {0}")]
    SocketFailed(String),

    /// The packet could not be sent
    #[error("failed to send wake packet: {0}")]
    SendFailed(String),
}

impl WakeError {
    /// Stable machine code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMac(_) => "invalid_mac",
            Self::SocketFailed(_) => "wol_socket_failed",
            Self::SendFailed(_) => "wol_send_failed",
        }
    }
}

/// Parse a MAC address
///
/// Accepts colon, dash or space separated hex as well as bare hex, in any
/// case. Anything else, or a digit count other than 12, is rejected.
pub fn parse_mac(mac: &str) -> Result<[u8; 6], WakeError> {
    let hex: String = mac
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | ' '))
        .collect();

    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WakeError::InvalidMac(mac.to_string()));
    }

    let mut out = [0u8; 6];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| WakeError::InvalidMac(mac.to_string()))?;
    }
    Ok(out)
}

/// Build the 102-byte magic packet for `mac`
pub fn magic_packet(mac: [u8; 6]) -> [u8; MAGIC_PACKET_LEN] {
    let mut pkt = [0xFFu8; MAGIC_PACKET_LEN];
    for chunk in pkt[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&mac);
    }
    pkt
}

/// Format a MAC as upper-case colon-separated hex
pub fn format_mac(mac: [u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: [u8; 6] = [0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03];

    #[test]
    fn accepts_all_separator_styles() {
        for input in [
            "AA:BB:CC:01:02:03",
            "aa-bb-cc-01-02-03",
            "AA BB CC 01 02 03",
            "aabbcc010203",
            "Aa:bB-cC 01:02:03",
        ] {
            assert_eq!(parse_mac(input), Ok(MAC), "{input}");
        }
    }

    #[test]
    fn rejects_bad_length_or_non_hex() {
        for input in [
            "",
            "AA:BB:CC:01:02",
            "AA:BB:CC:01:02:03:04",
            "GG:BB:CC:01:02:03",
            "AA.BB.CC.01.02.03",
            "+aabbcc01020",
        ] {
            let err = parse_mac(input).unwrap_err();
            assert_eq!(err.code(), "invalid_mac", "{input}");
        }
    }

    #[test]
    fn packet_layout() {
        let pkt = magic_packet(MAC);
        assert_eq!(pkt.len(), 102);
        assert!(pkt[..6].iter().all(|b| *b == 0xFF));
        for rep in 0..16 {
            let base = 6 + rep * 6;
            assert_eq!(&pkt[base..base + 6], &MAC);
        }
    }

    #[test]
    fn format_round_trips_through_parse() {
        assert_eq!(format_mac(MAC), "AA:BB:CC:01:02:03");
        assert_eq!(parse_mac(&format_mac(MAC)), Ok(MAC));
    }
}
