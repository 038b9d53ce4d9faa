use std::{fmt, future::Future, net::IpAddr, time::Duration};

use crate::error::Result;
use crate::report::split_camel_case;

/// One echo request as handed to an [`EchoPinger`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct EchoRequest {
    pub address: IpAddr,
    pub identifier: u16,
    pub sequence: u16,
    pub payload_size: usize,
    pub ttl: u8,
    pub dont_fragment: bool,
    pub timeout: Duration,
}

/// Outcome reported by the platform for a single echo request.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum EchoStatus {
    Success,
    TimedOut,
    DestinationUnreachable,
    DestinationNetworkUnreachable,
    DestinationHostUnreachable,
    DestinationProtocolUnreachable,
    DestinationPortUnreachable,
    PacketTooBig,
    TtlExpired,
    TtlReassemblyTimeExceeded,
    ParameterProblem,
    Unknown,
}

impl fmt::Display for EchoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&split_camel_case(&format!("{:?}", self)))
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct EchoReply {
    pub status: EchoStatus,
    pub rtt: Duration,
    /// Echoed payload length, zero unless `status` is [`EchoStatus::Success`].
    pub bytes: usize,
    /// Only known for IPv4 replies.
    pub ttl: Option<u8>,
}

impl EchoReply {
    pub fn timed_out(timeout: Duration) -> Self {
        Self {
            status: EchoStatus::TimedOut,
            rtt: timeout,
            bytes: 0,
            ttl: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EchoStatus::Success
    }

    pub fn rtt_millis(&self) -> u64 {
        u64::try_from(self.rtt.as_millis()).unwrap_or(u64::MAX)
    }
}

/// The echo primitive the probe tasks are driven by.
///
/// A non-success [`EchoStatus`] is a normal reply; `Err` is reserved for failures of the
/// attempt itself (socket creation, permissions, oversized packets).
pub trait EchoPinger: Send + Sync + 'static {
    fn echo(&self, request: EchoRequest) -> impl Future<Output = Result<EchoReply>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_is_split_into_words() {
        assert_eq!(EchoStatus::TimedOut.to_string(), "Timed Out");
        assert_eq!(
            EchoStatus::DestinationHostUnreachable.to_string(),
            "Destination Host Unreachable"
        );
        assert_eq!(EchoStatus::Success.to_string(), "Success");
    }

    #[test]
    fn test_rtt_millis_truncates() {
        let reply = EchoReply {
            status: EchoStatus::Success,
            rtt: Duration::from_micros(2_900),
            bytes: 32,
            ttl: Some(64),
        };
        assert_eq!(reply.rtt_millis(), 2);
        assert!(reply.is_success());
        assert!(!EchoReply::timed_out(Duration::from_secs(1)).is_success());
    }
}
