use chrono::{Duration, TimeZone, Utc};
use pingstep_model::{ProbeConfig, RttStats};
use pingstep_probe::{parse_ping_output, AccumulatorState, ProbeError, ResponseAccumulator};

fn feed_all(config: &ProbeConfig, text: &str) -> AccumulatorState {
    let start = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
    let mut acc = ResponseAccumulator::new(config, start, start + Duration::milliseconds(17));
    for line in text.lines() {
        if acc.feed(line) {
            break;
        }
    }
    acc.finish()
}

#[test]
fn success_with_summary_takes_latency_from_summary() {
    let config = ProbeConfig::new("example.com", 56).unwrap();
    let text = include_str!("fixtures/ping_success_hostname.txt");

    let result = parse_ping_output(text.as_bytes(), &config, Utc::now()).unwrap();

    assert_eq!(result.hostname.as_deref(), Some("example.com"));
    assert_eq!(result.address.as_deref(), Some("93.184.216.34"));
    assert_eq!(result.ttl_at_response, 56);
    assert_eq!(result.latency_ms, 11);
    assert_eq!(result.config, config);
    assert_eq!(
        result.rtt,
        Some(RttStats {
            min: 11.1,
            avg: 11.2,
            max: 11.3,
            mdev: 0.114,
        })
    );
}

#[test]
fn literal_two_line_transcript() {
    let config = ProbeConfig::new("example.com", 56).unwrap();
    let text = "64 bytes from example.com (93.184.216.34): icmp_seq=1 ttl=56 time=11.2 ms\n\
                rtt min/avg/max/mdev = 11.100/11.200/11.300/0.114 ms";

    let AccumulatorState::Completed(result) = feed_all(&config, text) else {
        panic!("expected completed state");
    };
    assert_eq!(result.hostname.as_deref(), Some("example.com"));
    assert_eq!(result.address.as_deref(), Some("93.184.216.34"));
    let rtt = result.rtt.unwrap();
    assert!((rtt.min - 11.1).abs() < 1e-9);
    assert!((rtt.avg - 11.2).abs() < 1e-9);
    assert!((rtt.max - 11.3).abs() < 1e-9);
    assert!((rtt.mdev - 0.114).abs() < 1e-9);
}

#[test]
fn summary_latency_wins_over_reply_line() {
    let config = ProbeConfig::new("example.com", 56).unwrap();
    let text = "64 bytes from example.com (93.184.216.34): icmp_seq=1 ttl=56 time=3.9 ms\n\
                rtt min/avg/max/mdev = 20.000/25.700/30.000/1.000 ms";

    let AccumulatorState::Completed(result) = feed_all(&config, text) else {
        panic!("expected completed state");
    };
    assert_eq!(result.latency_ms, 25);
}

#[test]
fn ttl_exceeded_uses_configured_ttl_and_elapsed_time() {
    let config = ProbeConfig::new("example.com", 3).unwrap();
    let text = include_str!("fixtures/ping_ttl_exceeded.txt");

    let AccumulatorState::Completed(result) = feed_all(&config, text) else {
        panic!("expected completed state");
    };
    assert_eq!(result.hostname.as_deref(), Some("_gateway"));
    assert_eq!(result.address.as_deref(), Some("192.168.1.1"));
    assert_eq!(result.ttl_at_response, 3);
    assert_eq!(result.latency_ms, 17);
    assert!(result.rtt.is_none());
}

#[test]
fn ttl_exceeded_without_hostname() {
    let config = ProbeConfig::new("198.51.100.10", 4).unwrap();
    let text = include_str!("fixtures/ping_ttl_exceeded_numeric.txt");
    let started_at = Utc::now() - Duration::milliseconds(30);

    let result = parse_ping_output(text.as_bytes(), &config, started_at).unwrap();

    assert_eq!(result.hostname, None);
    assert_eq!(result.address.as_deref(), Some("10.20.0.1"));
    assert_eq!(result.ttl_at_response, 4);
    assert!(result.latency_ms >= 30);
    assert!(result.start_time <= result.end_time);
}

#[test]
fn total_loss_is_packet_loss() {
    let config = ProbeConfig::new("203.0.113.1", 8).unwrap();
    let text = include_str!("fixtures/ping_lost.txt");

    let err = parse_ping_output(text.as_bytes(), &config, Utc::now()).unwrap_err();
    assert!(matches!(err, ProbeError::PacketLoss));
}

#[test]
fn reply_without_summary_is_unparsable() {
    let config = ProbeConfig::new("1.1.1.1", 64).unwrap();
    let text = include_str!("fixtures/ping_success_no_summary.txt");

    let err = parse_ping_output(text.as_bytes(), &config, Utc::now()).unwrap_err();
    assert!(matches!(err, ProbeError::UnparsableResponse));
}

#[test]
fn empty_output_is_unparsable() {
    let config = ProbeConfig::new("1.1.1.1", 64).unwrap();
    assert_eq!(feed_all(&config, ""), AccumulatorState::Unparsable);

    let err = parse_ping_output(&b""[..], &config, Utc::now()).unwrap_err();
    assert!(matches!(err, ProbeError::UnparsableResponse));
}

#[test]
fn summary_without_reply_is_partial_result() {
    let config = ProbeConfig::new("example.com", 9).unwrap();
    let AccumulatorState::Completed(result) =
        feed_all(&config, "rtt min/avg/max/mdev = 0.045/0.045/0.045/0.000 ms")
    else {
        panic!("expected completed state");
    };
    assert_eq!(result.hostname, None);
    assert_eq!(result.address, None);
    assert_eq!(result.latency_ms, 0);
    assert_eq!(result.ttl_at_response, 9);
    assert!(result.rtt.is_some());
}
