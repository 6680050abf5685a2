use std::time::Duration;

use tokio::time::sleep;

use super::*;

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_fill_addresses_port_fills_every_endpoint() {
    let filled = fill_addresses_port(&owned(&["node1", "node2:2380", "10.0.0.3"]));
    assert_eq!(filled, owned(&["node1:2379", "node2:2380", "10.0.0.3:2379"]));
}

#[test]
fn test_fill_addresses_port_handles_ipv6_and_schemes() {
    let filled = fill_addresses_port(&owned(&[
        "[::1]",
        "[::1]:2400",
        "fe80::1",
        "http://etcd-0",
        "https://etcd-1:443",
    ]));
    assert_eq!(
        filled,
        owned(&[
            "[::1]:2379",
            "[::1]:2400",
            "[fe80::1]:2379",
            "http://etcd-0:2379",
            "https://etcd-1:443",
        ])
    );
}

#[test]
fn test_fill_addresses_port_skips_blank_entries() {
    assert!(fill_addresses_port(&owned(&["", "  "])).is_empty());
}

#[test]
fn test_checksum_is_stable_hex_sha256() {
    assert_eq!(
        checksum(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(checksum(b"{\"a\":1}"), checksum(b"{\"a\":1}"));
    assert_ne!(checksum(b"{\"a\":1}"), checksum(b"{\"a\":2}"));
}

#[tokio::test(start_paused = true)]
async fn test_with_timeout_maps_elapsed_deadline() {
    let result: Result<()> = with_timeout(Duration::from_millis(50), async {
        sleep(Duration::from_secs(1)).await;
        Ok(())
    })
    .await;
    assert!(matches!(result, Err(Error::Timeout(d)) if d == Duration::from_millis(50)));

    let ok = with_timeout(Duration::from_millis(50), async { Ok(7) }).await;
    assert_eq!(ok.unwrap(), 7);
}
