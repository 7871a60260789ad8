//! Random MAC addresses for virtual NICs.

use rand::Rng;

/// Generate a MAC in the `00:aa` prefix used for virtual NICs
pub fn random_mac() -> String {
    let mut rng = rand::thread_rng();
    let tail: [u8; 4] = rng.gen();
    format!(
        "00:aa:{:02x}:{:02x}:{:02x}:{:02x}",
        tail[0], tail[1], tail[2], tail[3]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_mac_format() {
        let mac = random_mac();
        assert_eq!(mac.len(), 17);
        assert!(mac.starts_with("00:aa:"));
        assert_eq!(mac.split(':').count(), 6);
    }
}
