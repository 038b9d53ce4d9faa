use std::{
    error::Error as StdError,
    io::{self, Write},
    net::IpAddr,
    time::Duration,
};

use chrono::{DateTime, Local};

use crate::constants::TIMESTAMP_FORMAT;
use crate::echo::{EchoReply, EchoStatus};
use crate::error::Error;
use crate::results::{ProbeResult, Snapshot};

const SEPARATOR: &str = "------------------------------";

/// Summary figures for one destination.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Statistics {
    pub sent: u64,
    pub received: u64,
    pub lost: u64,
    /// `lost / sent * 100`, rounded to two decimals; zero when nothing was sent.
    pub loss_percent: f64,
    pub min: Option<u64>,
    pub max: Option<u64>,
    /// Rounded to two decimals, `NaN` without samples.
    pub mean: f64,
}

impl Statistics {
    pub fn from_result(result: &ProbeResult) -> Self {
        let counters = result.counters;
        let loss_percent = if counters.sent == 0 {
            0.0
        } else {
            round2(counters.lost as f64 / counters.sent as f64 * 100.0)
        };
        let mean = if result.samples.is_empty() {
            f64::NAN
        } else {
            let sum: u64 = result.samples.iter().sum();
            round2(sum as f64 / result.samples.len() as f64)
        };
        Self {
            sent: counters.sent,
            received: counters.received,
            lost: counters.lost,
            loss_percent,
            min: result.samples.iter().min().copied(),
            max: result.samples.iter().max().copied(),
            mean,
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Shortest rendering of an already rounded figure: `2`, `33.33`, `NaN`.
pub fn format_figure(value: f64) -> String {
    format!("{}", value)
}

fn format_optional(value: Option<u64>) -> String {
    value.map_or_else(|| format_figure(f64::NAN), |value| value.to_string())
}

/// `TimedOut` -> `Timed Out`.
pub fn split_camel_case(input: &str) -> String {
    let mut words = String::with_capacity(input.len() + 4);
    for c in input.chars() {
        if c.is_uppercase() && !words.is_empty() {
            words.push(' ');
        }
        words.push(c);
    }
    words
}

/// Messages of `err` and all of its sources, innermost first, joined by spaces.
pub fn cause_chain(err: &(dyn StdError + 'static)) -> String {
    let mut messages = Vec::new();
    let mut current = Some(err);
    while let Some(err) = current {
        messages.push(err.to_string());
        current = err.source();
    }
    messages.reverse();
    messages.join(" ")
}

pub fn timestamp(now: &DateTime<Local>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Console and log renderings of one probe attempt.
///
/// Only the console line pads the address, to `address_width`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeLine {
    pub console: String,
    pub log: String,
}

impl ProbeLine {
    pub fn new(
        now: &DateTime<Local>,
        address: IpAddr,
        outcome: &Result<EchoReply, Error>,
        response_timeout: Duration,
        address_width: usize,
    ) -> Self {
        let ts = timestamp(now);
        let padded = format!("{:<width$}", address.to_string(), width = address_width);
        match outcome {
            Ok(reply) if reply.status == EchoStatus::Success => {
                let rtt = reply.rtt_millis();
                let mut console = format!(
                    "{} Reply from {}: bytes={} time={}ms",
                    ts, padded, reply.bytes, rtt
                );
                let mut log = format!(
                    "{};Reply from {} received;{};{}",
                    ts, address, reply.bytes, rtt
                );
                if let Some(ttl) = reply.ttl {
                    console.push_str(&format!(" TTL={}", ttl));
                    log.push_str(&format!(";{}", ttl));
                }
                Self { console, log }
            }
            Ok(reply) => {
                let mut console = format!("{} Reply from {}: {}", ts, padded, reply.status);
                let mut log = format!("{};{}", ts, reply.status);
                if reply.status == EchoStatus::TimedOut {
                    let timeout = response_timeout.as_millis();
                    console.push_str(&format!(" time={}ms", timeout));
                    log.push_str(&format!(";;{}", timeout));
                }
                Self { console, log }
            }
            Err(err) => {
                let chain = cause_chain(err);
                Self {
                    console: format!("{} {}", ts, chain),
                    log: format!("{};{}", ts, chain),
                }
            }
        }
    }
}

/// Writes the summary block of one destination; nothing when it never sent a probe.
pub fn write_result<W: Write>(out: &mut W, result: &ProbeResult) -> io::Result<()> {
    let stats = Statistics::from_result(result);
    if stats.sent == 0 {
        return Ok(());
    }
    writeln!(out, "{}", SEPARATOR)?;
    writeln!(out, "\tPackets to {}:", result.address)?;
    writeln!(
        out,
        "\t\tSent = {}, Received = {}, Lost = {}, ({}% loss)",
        stats.sent,
        stats.received,
        stats.lost,
        format_figure(stats.loss_percent)
    )?;
    if !result.samples.is_empty() {
        writeln!(out, "\tRound trip times to {}:", result.address)?;
        writeln!(
            out,
            "\t\tMinimum = {}ms, Maximum = {}ms, Average = {}ms",
            format_optional(stats.min),
            format_optional(stats.max),
            format_figure(stats.mean)
        )?;
    }
    Ok(())
}

pub fn write_summary<W: Write>(out: &mut W, snapshot: &Snapshot) -> io::Result<()> {
    for (_, result) in snapshot {
        write_result(out, result)?;
    }
    Ok(())
}

/// Prints the summary of `snapshot` on stdout.
pub fn print_summary(snapshot: &Snapshot) {
    let mut stdout = io::stdout().lock();
    if let Err(err) = write_summary(&mut stdout, snapshot).and_then(|_| stdout.flush()) {
        log::warn!("failed to print summary: {}", err);
    }
}

/// Prints one console line; output errors are ignored.
pub fn print_line(line: &str) {
    let mut stdout = io::stdout().lock();
    if let Err(err) = writeln!(stdout, "{}", line) {
        log::debug!("failed to print line: {}", err);
    }
}

/// Trailer rows appended to a destination log once probing stops.
pub fn trailer_rows(result: &ProbeResult) -> Vec<String> {
    let stats = Statistics::from_result(result);
    vec![
        format!("Sent;{}", stats.sent),
        format!("Received;{}", stats.received),
        format!("Lost;{}", stats.lost),
        format!("% Loss;{}", format_figure(stats.loss_percent)),
        format!("Minimum Time;{}", format_optional(stats.min)),
        format!("Maximum Time;{}", format_optional(stats.max)),
        format!("Average Time;{}", format_figure(stats.mean)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{Counters, TaskId};
    use chrono::TimeZone;
    use std::net::Ipv4Addr;

    const ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn result(sent: u64, received: u64, lost: u64, samples: Vec<u64>) -> ProbeResult {
        ProbeResult {
            address: ADDRESS,
            counters: Counters {
                sent,
                received,
                lost,
            },
            samples,
        }
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_statistics_all_received() {
        let stats = Statistics::from_result(&result(3, 3, 0, vec![1, 2, 3]));
        assert_eq!(stats.loss_percent, 0.0);
        assert_eq!(stats.min, Some(1));
        assert_eq!(stats.max, Some(3));
        assert_eq!(stats.mean, 2.0);
    }

    #[test]
    fn test_statistics_rounding() {
        let stats = Statistics::from_result(&result(3, 2, 1, vec![1, 2]));
        assert_eq!(stats.loss_percent, 33.33);
        assert_eq!(stats.mean, 1.5);

        let stats = Statistics::from_result(&result(3, 3, 0, vec![1, 1, 2]));
        assert_eq!(stats.mean, 1.33);
    }

    #[test]
    fn test_statistics_without_samples() {
        let stats = Statistics::from_result(&result(2, 0, 2, vec![]));
        assert_eq!(stats.loss_percent, 100.0);
        assert!(stats.mean.is_nan());
        assert_eq!(stats.min, None);
    }

    #[test]
    fn test_format_figure() {
        assert_eq!(format_figure(2.0), "2");
        assert_eq!(format_figure(33.33), "33.33");
        assert_eq!(format_figure(f64::NAN), "NaN");
    }

    #[test]
    fn test_split_camel_case() {
        assert_eq!(split_camel_case("TimedOut"), "Timed Out");
        assert_eq!(split_camel_case("Success"), "Success");
        assert_eq!(split_camel_case(""), "");
    }

    #[test]
    fn test_cause_chain_is_innermost_first() {
        let err = Error::transport(
            "failed to open raw ICMP channel",
            io::Error::new(io::ErrorKind::PermissionDenied, "Operation not permitted"),
        );
        assert_eq!(
            cause_chain(&err),
            "Operation not permitted failed to open raw ICMP channel"
        );
    }

    #[test]
    fn test_reply_line_with_ttl() {
        let reply = EchoReply {
            status: EchoStatus::Success,
            rtt: Duration::from_millis(12),
            bytes: 32,
            ttl: Some(57),
        };
        let line = ProbeLine::new(&now(), ADDRESS, &Ok(reply), Duration::from_secs(4), 0);
        assert_eq!(
            line.console,
            "2024-03-09 14:05:07 Reply from 127.0.0.1: bytes=32 time=12ms TTL=57"
        );
        assert_eq!(line.log, "2024-03-09 14:05:07;Reply from 127.0.0.1 received;32;12;57");
    }

    #[test]
    fn test_reply_line_without_ttl() {
        let reply = EchoReply {
            status: EchoStatus::Success,
            rtt: Duration::from_millis(1),
            bytes: 32,
            ttl: None,
        };
        let line = ProbeLine::new(&now(), ADDRESS, &Ok(reply), Duration::from_secs(4), 0);
        assert!(line.console.ends_with("bytes=32 time=1ms"));
        assert!(line.log.ends_with(";32;1"));
    }

    #[test]
    fn test_timeout_line_carries_configured_timeout() {
        let reply = EchoReply::timed_out(Duration::from_millis(4000));
        let line = ProbeLine::new(&now(), ADDRESS, &Ok(reply), Duration::from_millis(4000), 0);
        assert_eq!(
            line.console,
            "2024-03-09 14:05:07 Reply from 127.0.0.1: Timed Out time=4000ms"
        );
        assert_eq!(line.log, "2024-03-09 14:05:07;Timed Out;;4000");
    }

    #[test]
    fn test_unreachable_line() {
        let reply = EchoReply {
            status: EchoStatus::DestinationHostUnreachable,
            rtt: Duration::from_millis(3),
            bytes: 0,
            ttl: None,
        };
        let line = ProbeLine::new(&now(), ADDRESS, &Ok(reply), Duration::from_secs(4), 0);
        assert!(line.console.ends_with(": Destination Host Unreachable"));
        assert_eq!(line.log, "2024-03-09 14:05:07;Destination Host Unreachable");
    }

    #[test]
    fn test_console_line_pads_address_but_log_does_not() {
        let reply = EchoReply {
            status: EchoStatus::Success,
            rtt: Duration::from_millis(5),
            bytes: 32,
            ttl: Some(64),
        };
        let line = ProbeLine::new(&now(), ADDRESS, &Ok(reply), Duration::from_secs(4), 15);
        assert_eq!(
            line.console,
            "2024-03-09 14:05:07 Reply from 127.0.0.1      : bytes=32 time=5ms TTL=64"
        );
        assert_eq!(line.log, "2024-03-09 14:05:07;Reply from 127.0.0.1 received;32;5;64");

        let timed_out = Ok(EchoReply::timed_out(Duration::from_secs(4)));
        let line = ProbeLine::new(&now(), ADDRESS, &timed_out, Duration::from_secs(4), 11);
        assert!(line.console.contains("Reply from 127.0.0.1  : Timed Out"));
        assert_eq!(line.log, "2024-03-09 14:05:07;Timed Out;;4000");
    }

    #[test]
    fn test_transport_error_line() {
        let outcome = Err(Error::transport("failed to send echo request", "no route"));
        let line = ProbeLine::new(&now(), ADDRESS, &outcome, Duration::from_secs(4), 0);
        assert_eq!(
            line.console,
            "2024-03-09 14:05:07 no route failed to send echo request"
        );
    }

    #[test]
    fn test_summary_block() {
        let snapshot = vec![
            (TaskId::new(0), result(3, 3, 0, vec![1, 2, 3])),
            (TaskId::new(1), result(0, 0, 0, vec![])),
        ];
        let mut out = Vec::new();
        write_summary(&mut out, &snapshot).unwrap();
        let expected = "------------------------------\n\
                        \tPackets to 127.0.0.1:\n\
                        \t\tSent = 3, Received = 3, Lost = 0, (0% loss)\n\
                        \tRound trip times to 127.0.0.1:\n\
                        \t\tMinimum = 1ms, Maximum = 3ms, Average = 2ms\n";
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_summary_without_samples_omits_times() {
        let mut out = Vec::new();
        write_result(&mut out, &result(2, 0, 2, vec![])).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("(100% loss)"));
        assert!(!out.contains("Round trip"));
    }

    #[test]
    fn test_trailer_rows() {
        let rows = trailer_rows(&result(2, 0, 2, vec![]));
        assert_eq!(
            rows,
            vec![
                "Sent;2",
                "Received;0",
                "Lost;2",
                "% Loss;100",
                "Minimum Time;NaN",
                "Maximum Time;NaN",
                "Average Time;NaN",
            ]
        );
    }
}
