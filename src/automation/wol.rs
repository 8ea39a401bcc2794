//! Wake-on-LAN magic packet construction.

/// Build the 102-byte magic packet for a MAC address in colon-hex notation:
/// six `0xFF` bytes followed by sixteen repetitions of the six MAC octets.
pub fn build_magic_packet(mac: &str) -> Result<Vec<u8>, String> {
    let octets = parse_mac(mac)?;

    let mut packet = Vec::with_capacity(102);
    packet.extend_from_slice(&[0xFF; 6]);
    for _ in 0..16 {
        packet.extend_from_slice(&octets);
    }
    Ok(packet)
}

fn parse_mac(mac: &str) -> Result<[u8; 6], String> {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return Err(format!(
            "invalid MAC address '{mac}': expected 6 colon-separated octets, got {}",
            parts.len()
        ));
    }

    let mut octets = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        octets[i] = u8::from_str_radix(part, 16)
            .map_err(|_| format!("invalid MAC address '{mac}': bad octet '{part}'"))?;
    }
    Ok(octets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_packet_layout() {
        let packet = build_magic_packet("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(packet.len(), 102);
        assert_eq!(&packet[..6], &[0xFF; 6]);

        let mac = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
        for repetition in 0..16 {
            let start = 6 + repetition * 6;
            assert_eq!(&packet[start..start + 6], &mac);
        }
    }

    #[test]
    fn test_lowercase_mac_accepted() {
        assert!(build_magic_packet("a4:83:e7:12:00:9b").is_ok());
    }

    #[test]
    fn test_malformed_macs_rejected() {
        assert!(build_magic_packet("").is_err());
        assert!(build_magic_packet("AA:BB:CC:DD:EE").is_err());
        assert!(build_magic_packet("AA:BB:CC:DD:EE:FF:00").is_err());
        assert!(build_magic_packet("AA:BB:CC:DD:EE:GG").is_err());
        assert!(build_magic_packet("AABBCCDDEEFF").is_err());
    }
}
