//! Recognizes the line shapes iputils `ping` prints for a single probe.

use pingstep_model::RttStats;
use regex::{Captures, Regex};
use std::sync::OnceLock;

const HOSTNAME: &str = r"(?P<hostname>[\w.-]+)";
const ADDRESS: &str = r"(?P<address>[0-9]{1,3}(?:\.[0-9]{1,3}){3})";
const DECIMAL: &str = r"[0-9]+(?:\.[0-9]+)?";

/// What a single output line says about the probe.
#[derive(Debug, Clone, PartialEq)]
pub enum LineClass {
    TtlExceeded {
        hostname: Option<String>,
        address: String,
    },
    Success {
        hostname: Option<String>,
        address: String,
        latency_ms: f64,
    },
    RttSummary(RttStats),
    Timeout,
    NoMatch,
}

impl LineClass {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LineClass::TtlExceeded { .. } | LineClass::RttSummary(_) | LineClass::Timeout
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    TtlExceededWithHostname,
    TtlExceededNoHostname,
    SuccessWithHostname,
    SuccessNoHostname,
    RttSummary,
    Timeout,
}

#[derive(Debug)]
struct LinePattern {
    kind: PatternKind,
    regex: Regex,
}

/// Ordered, full-line patterns. Immutable once built, so one table is shared
/// by every probe in the process.
#[derive(Debug)]
pub struct PatternTable {
    patterns: Vec<LinePattern>,
}

impl PatternTable {
    pub fn new() -> Result<Self, regex::Error> {
        let ttl_exceeded = r"icmp_seq=[0-9]+ Time to live exceeded";
        let success = format!(r"icmp_seq=[0-9]+ ttl=[0-9]+ time=(?P<time>{DECIMAL}) ms");

        // Reverse DNS may or may not have resolved, so each reply shape comes
        // in a with-hostname and an address-only form.
        let sources = [
            (
                PatternKind::TtlExceededWithHostname,
                format!(r"From {HOSTNAME} \({ADDRESS}\):? {ttl_exceeded}"),
            ),
            (
                PatternKind::TtlExceededNoHostname,
                format!(r"From {ADDRESS}:? {ttl_exceeded}"),
            ),
            (
                PatternKind::SuccessWithHostname,
                format!(r"[0-9]+ bytes from {HOSTNAME} \({ADDRESS}\): {success}"),
            ),
            (
                PatternKind::SuccessNoHostname,
                format!(r"[0-9]+ bytes from {ADDRESS}: {success}"),
            ),
            (
                PatternKind::RttSummary,
                format!(
                    r"rtt min/avg/max/mdev = (?P<min>{DECIMAL})/(?P<avg>{DECIMAL})/(?P<max>{DECIMAL})/(?P<mdev>{DECIMAL}) ms"
                ),
            ),
            (
                PatternKind::Timeout,
                r"[0-9]+ packets transmitted, 0 received, 100% packet loss, time [0-9]+ms"
                    .to_string(),
            ),
        ];

        let patterns = sources
            .into_iter()
            .map(|(kind, source)| {
                Regex::new(&format!("^(?:{source})$")).map(|regex| LinePattern { kind, regex })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// The process-wide table, compiled on first use.
    pub fn global() -> &'static PatternTable {
        static TABLE: OnceLock<PatternTable> = OnceLock::new();
        TABLE.get_or_init(|| PatternTable::new().expect("built-in ping patterns must compile"))
    }

    pub fn kinds(&self) -> impl Iterator<Item = PatternKind> + '_ {
        self.patterns.iter().map(|pattern| pattern.kind)
    }

    /// Tries each pattern in order against the whole line; the first one that
    /// matches and yields well-formed fields decides the class.
    pub fn classify(&self, line: &str) -> LineClass {
        let line = line.trim_end();
        for pattern in &self.patterns {
            if let Some(caps) = pattern.regex.captures(line) {
                if let Some(class) = extract(pattern.kind, &caps) {
                    return class;
                }
            }
        }
        LineClass::NoMatch
    }
}

pub fn classify_line(line: &str) -> LineClass {
    PatternTable::global().classify(line)
}

fn extract(kind: PatternKind, caps: &Captures<'_>) -> Option<LineClass> {
    let text = |name: &str| caps.name(name).map(|m| m.as_str().to_string());
    let number = |name: &str| caps.name(name)?.as_str().parse::<f64>().ok();

    let class = match kind {
        PatternKind::TtlExceededWithHostname | PatternKind::TtlExceededNoHostname => {
            LineClass::TtlExceeded {
                hostname: text("hostname"),
                address: text("address")?,
            }
        }
        PatternKind::SuccessWithHostname | PatternKind::SuccessNoHostname => LineClass::Success {
            hostname: text("hostname"),
            address: text("address")?,
            latency_ms: number("time")?,
        },
        PatternKind::RttSummary => LineClass::RttSummary(RttStats {
            min: number("min")?,
            avg: number("avg")?,
            max: number("max")?,
            mdev: number("mdev")?,
        }),
        PatternKind::Timeout => LineClass::Timeout,
    };

    Some(class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_keeps_declared_order() {
        let kinds: Vec<PatternKind> = PatternTable::global().kinds().collect();
        assert_eq!(
            kinds,
            vec![
                PatternKind::TtlExceededWithHostname,
                PatternKind::TtlExceededNoHostname,
                PatternKind::SuccessWithHostname,
                PatternKind::SuccessNoHostname,
                PatternKind::RttSummary,
                PatternKind::Timeout,
            ]
        );
    }

    #[test]
    fn ttl_exceeded_with_hostname() {
        let class =
            classify_line("From _gateway-1.lan (192.168.1.1): icmp_seq=1 Time to live exceeded");
        assert_eq!(
            class,
            LineClass::TtlExceeded {
                hostname: Some("_gateway-1.lan".to_string()),
                address: "192.168.1.1".to_string(),
            }
        );
        assert!(class.is_terminal());
    }

    #[test]
    fn ttl_exceeded_without_hostname_or_colon() {
        let expected = LineClass::TtlExceeded {
            hostname: None,
            address: "10.0.0.1".to_string(),
        };
        assert_eq!(
            classify_line("From 10.0.0.1: icmp_seq=1 Time to live exceeded"),
            expected
        );
        assert_eq!(
            classify_line("From 10.0.0.1 icmp_seq=1 Time to live exceeded"),
            expected
        );
    }

    #[test]
    fn success_lines_carry_latency() {
        assert_eq!(
            classify_line("64 bytes from example.com (93.184.216.34): icmp_seq=1 ttl=56 time=11.2 ms"),
            LineClass::Success {
                hostname: Some("example.com".to_string()),
                address: "93.184.216.34".to_string(),
                latency_ms: 11.2,
            }
        );
        assert_eq!(
            classify_line("64 bytes from 1.1.1.1: icmp_seq=1 ttl=58 time=123 ms"),
            LineClass::Success {
                hostname: None,
                address: "1.1.1.1".to_string(),
                latency_ms: 123.0,
            }
        );
    }

    #[test]
    fn rtt_summary_parses_all_four_values() {
        let class = classify_line("rtt min/avg/max/mdev = 11.100/11.200/11.300/0.114 ms");
        assert_eq!(
            class,
            LineClass::RttSummary(RttStats {
                min: 11.1,
                avg: 11.2,
                max: 11.3,
                mdev: 0.114,
            })
        );
    }

    #[test]
    fn timeout_line_is_recognized() {
        assert_eq!(
            classify_line("1 packets transmitted, 0 received, 100% packet loss, time 23ms"),
            LineClass::Timeout
        );
        assert_eq!(
            classify_line("1 packets transmitted, 1 received, 0% packet loss, time 0ms"),
            LineClass::NoMatch
        );
    }

    #[test]
    fn matching_is_anchored_to_the_whole_line() {
        assert_eq!(
            classify_line("warning: From 10.0.0.1: icmp_seq=1 Time to live exceeded"),
            LineClass::NoMatch
        );
        assert_eq!(
            classify_line("rtt min/avg/max/mdev = 1.0/2.0/3.0/0.5 ms extra"),
            LineClass::NoMatch
        );
        assert_eq!(
            classify_line("PING example.com (93.184.216.34) 56(84) bytes of data."),
            LineClass::NoMatch
        );
        assert_eq!(classify_line(""), LineClass::NoMatch);
    }

    #[test]
    fn trailing_carriage_return_is_ignored() {
        assert_eq!(
            classify_line("1 packets transmitted, 0 received, 100% packet loss, time 0ms\r"),
            LineClass::Timeout
        );
    }
}
