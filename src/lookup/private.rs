use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

/// Reserved blocks that never identify a transit carrier
const RESERVED_BLOCKS: &[&str] = &[
    "127.0.0.0/8",    // loopback
    "10.0.0.0/8",     // RFC1918
    "172.16.0.0/12",  // RFC1918
    "192.168.0.0/16", // RFC1918
    "169.254.0.0/16", // link-local
    "198.18.0.0/15",  // benchmarking
];

static RESERVED: LazyLock<Vec<Ipv4Network>> = LazyLock::new(|| {
    RESERVED_BLOCKS
        .iter()
        .filter_map(|block| block.parse().ok())
        .collect()
});

/// Is the address inside one of the reserved blocks?
pub fn is_private(ip: Ipv4Addr) -> bool {
    RESERVED.iter().any(|net| net.contains(ip))
}

/// String form of [`is_private`]. Unparsable input is treated as not private.
pub fn is_private_str(ip: &str) -> bool {
    ip.trim().parse::<Ipv4Addr>().is_ok_and(is_private)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reserved_samples() {
        for ip in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "169.254.10.10",
            "198.18.0.1",
            "198.19.255.254",
        ] {
            assert!(is_private_str(ip), "{} should be private", ip);
        }
    }

    #[test]
    fn test_public_samples() {
        for ip in [
            "8.8.8.8",
            "1.1.1.1",
            "172.32.0.1",
            "198.20.0.1",
            "59.43.80.1",
            "202.97.1.1",
            "219.141.140.10",
        ] {
            assert!(!is_private_str(ip), "{} should be public", ip);
        }
    }

    #[test]
    fn test_unparsable_is_not_private() {
        assert!(!is_private_str("invalid.ip"));
        assert!(!is_private_str("999.999.999.999"));
        assert!(!is_private_str(""));
    }

    proptest! {
        #[test]
        fn prop_ten_slash_eight_is_private(b in any::<u8>(), c in any::<u8>(), d in any::<u8>()) {
            prop_assert!(is_private(Ipv4Addr::new(10, b, c, d)));
        }

        #[test]
        fn prop_rfc1918_172_range(b in 16u8..32, c in any::<u8>(), d in any::<u8>()) {
            prop_assert!(is_private(Ipv4Addr::new(172, b, c, d)));
        }

        #[test]
        fn prop_benchmark_range(b in 18u8..20, c in any::<u8>(), d in any::<u8>()) {
            prop_assert!(is_private(Ipv4Addr::new(198, b, c, d)));
        }
    }
}
