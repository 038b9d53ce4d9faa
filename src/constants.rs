use std::time::Duration;

pub(crate) const DEFAULT_PAYLOAD_SIZE: usize = 32;
pub(crate) const MAX_PAYLOAD_SIZE: usize = 65527;
pub(crate) const DEFAULT_COUNT: u64 = 4;
pub(crate) const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);
pub(crate) const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(4000);
pub(crate) const DEFAULT_TTL: u8 = 128;

pub(crate) const IPV4_HEADER_LEN: usize = 20;
pub(crate) const IPV6_HEADER_LEN: usize = 40;
pub(crate) const ICMP_HEADER_LEN: usize = 8;
// unused word between an ICMP error header and the datagram it quotes
pub(crate) const ICMP_ERROR_PREFIX_LEN: usize = 4;
pub(crate) const RECV_BUFFER_LEN: usize = 1 << 17;

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub(crate) const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H.%M.%S";
