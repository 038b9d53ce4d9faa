use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    time::{Duration, Instant},
};

use pnet::packet::icmp::{
    self,
    echo_reply::EchoReplyPacket,
    echo_request::{EchoRequestPacket, MutableEchoRequestPacket},
    IcmpCode, IcmpPacket, IcmpTypes,
};
use pnet::packet::icmpv6::{Icmpv6Code, Icmpv6Packet, Icmpv6Types, MutableIcmpv6Packet};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Flags, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::Packet;
use pnet::transport::{
    icmpv6_packet_iter, ipv4_packet_iter, transport_channel, TransportChannelType,
    TransportProtocol,
};

use crate::constants::{
    ICMP_ERROR_PREFIX_LEN, ICMP_HEADER_LEN, IPV4_HEADER_LEN, IPV6_HEADER_LEN, RECV_BUFFER_LEN,
};
use crate::echo::{EchoPinger, EchoReply, EchoRequest, EchoStatus};
use crate::error::{Error, Result};

/// [`EchoPinger`] backed by raw ICMP sockets.
///
/// Every attempt opens its own channel on the blocking pool, so concurrent probe tasks
/// never share a socket; replies are told apart by identifier and sequence number.
/// Raw sockets need elevated privileges (root or `CAP_NET_RAW`), a missing privilege
/// surfaces as a transport error on each attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcmpPinger;

impl IcmpPinger {
    pub fn new() -> Self {
        Self
    }
}

impl EchoPinger for IcmpPinger {
    async fn echo(&self, request: EchoRequest) -> Result<EchoReply> {
        tokio::task::spawn_blocking(move || exchange(&request))
            .await
            .map_err(|err| Error::transport("echo worker stopped", err))?
    }
}

fn exchange(request: &EchoRequest) -> Result<EchoReply> {
    match request.address {
        IpAddr::V4(destination) => exchange_v4(request, destination),
        IpAddr::V6(destination) => exchange_v6(request, destination),
    }
}

fn exchange_v4(request: &EchoRequest, destination: Ipv4Addr) -> Result<EchoReply> {
    let buf = build_ipv4_request(request, destination)?;
    // layer 3 so that TTL and DF are taken from our own header
    let (mut tx, mut rx) = transport_channel(
        RECV_BUFFER_LEN,
        TransportChannelType::Layer3(IpNextHeaderProtocols::Icmp),
    )
    .map_err(|err| Error::transport("failed to open raw ICMP channel", err))?;

    let datagram = Ipv4Packet::new(&buf).ok_or_else(malformed_request)?;
    let started = Instant::now();
    tx.send_to(datagram, request.address)
        .map_err(|err| Error::transport("failed to send echo request", err))?;

    let deadline = started + request.timeout;
    let mut datagrams = ipv4_packet_iter(&mut rx);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(EchoReply::timed_out(request.timeout));
        }
        match datagrams
            .next_with_timeout(remaining)
            .map_err(|err| Error::transport("failed to receive echo reply", err))?
        {
            Some((datagram, source)) => {
                if let Some(reply) = match_ipv4(&datagram, source, request, started.elapsed()) {
                    return Ok(reply);
                }
            }
            None => return Ok(EchoReply::timed_out(request.timeout)),
        }
    }
}

fn exchange_v6(request: &EchoRequest, destination: Ipv6Addr) -> Result<EchoReply> {
    let buf = build_ipv6_request(request)?;
    let (mut tx, mut rx) = transport_channel(
        RECV_BUFFER_LEN,
        TransportChannelType::Layer4(TransportProtocol::Ipv6(IpNextHeaderProtocols::Icmpv6)),
    )
    .map_err(|err| Error::transport("failed to open raw ICMPv6 channel", err))?;
    if let Err(err) = tx.set_ttl(request.ttl) {
        log::debug!("hop limit not applied for {}: {}", destination, err);
    }

    let message = Icmpv6Packet::new(&buf).ok_or_else(malformed_request)?;
    let started = Instant::now();
    tx.send_to(message, request.address)
        .map_err(|err| Error::transport("failed to send echo request", err))?;

    let deadline = started + request.timeout;
    let mut messages = icmpv6_packet_iter(&mut rx);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(EchoReply::timed_out(request.timeout));
        }
        match messages
            .next_with_timeout(remaining)
            .map_err(|err| Error::transport("failed to receive echo reply", err))?
        {
            Some((message, source)) => {
                if let Some(reply) = match_ipv6(&message, source, request, started.elapsed()) {
                    return Ok(reply);
                }
            }
            None => return Ok(EchoReply::timed_out(request.timeout)),
        }
    }
}

fn malformed_request() -> Error {
    Error::transport("failed to build echo request", "buffer too small")
}

fn fill_echo_payload(payload: &mut [u8]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte = b'a' + (i % 23) as u8;
    }
}

pub(crate) fn build_ipv4_request(request: &EchoRequest, destination: Ipv4Addr) -> Result<Vec<u8>> {
    let icmp_len = ICMP_HEADER_LEN + request.payload_size;
    let total_len = IPV4_HEADER_LEN + icmp_len;
    let total_len_field = u16::try_from(total_len).map_err(|_| {
        Error::transport(
            format!("echo request of {} bytes", total_len),
            "datagram exceeds the IPv4 size limit",
        )
    })?;

    let mut icmp_buf = vec![0; icmp_len];
    fill_echo_payload(&mut icmp_buf[ICMP_HEADER_LEN..]);
    {
        let mut echo = MutableEchoRequestPacket::new(&mut icmp_buf).ok_or_else(malformed_request)?;
        echo.set_icmp_type(IcmpTypes::EchoRequest);
        echo.set_icmp_code(IcmpCode::new(0));
        echo.set_identifier(request.identifier);
        echo.set_sequence_number(request.sequence);
        let checksum = IcmpPacket::new(echo.packet())
            .map(|packet| icmp::checksum(&packet))
            .ok_or_else(malformed_request)?;
        echo.set_checksum(checksum);
    }

    let mut ip_buf = vec![0; total_len];
    {
        let mut ip = MutableIpv4Packet::new(&mut ip_buf).ok_or_else(malformed_request)?;
        ip.set_version(4);
        ip.set_header_length((IPV4_HEADER_LEN / 4) as u8);
        ip.set_total_length(total_len_field);
        ip.set_identification(request.sequence);
        if request.dont_fragment {
            ip.set_flags(Ipv4Flags::DontFragment);
        }
        ip.set_ttl(request.ttl);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
        ip.set_destination(destination);
        ip.set_payload(&icmp_buf);
        let checksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);
    }
    Ok(ip_buf)
}

pub(crate) fn build_ipv6_request(request: &EchoRequest) -> Result<Vec<u8>> {
    let mut buf = vec![0; ICMP_HEADER_LEN + request.payload_size];
    {
        // the kernel fills in the ICMPv6 checksum on raw sockets
        let mut message = MutableIcmpv6Packet::new(&mut buf).ok_or_else(malformed_request)?;
        message.set_icmpv6_type(Icmpv6Types::EchoRequest);
        message.set_icmpv6_code(Icmpv6Code::new(0));
    }
    buf[4..6].copy_from_slice(&request.identifier.to_be_bytes());
    buf[6..8].copy_from_slice(&request.sequence.to_be_bytes());
    fill_echo_payload(&mut buf[ICMP_HEADER_LEN..]);
    Ok(buf)
}

pub(crate) fn match_ipv4(
    datagram: &Ipv4Packet,
    source: IpAddr,
    request: &EchoRequest,
    rtt: Duration,
) -> Option<EchoReply> {
    let message = IcmpPacket::new(datagram.payload())?;
    let code = message.get_icmp_code().0;
    let status = match message.get_icmp_type() {
        IcmpTypes::EchoReply => {
            let reply = EchoReplyPacket::new(datagram.payload())?;
            if source != request.address
                || reply.get_identifier() != request.identifier
                || reply.get_sequence_number() != request.sequence
            {
                return None;
            }
            return Some(EchoReply {
                status: EchoStatus::Success,
                rtt,
                bytes: reply.payload().len(),
                ttl: Some(datagram.get_ttl()),
            });
        }
        IcmpTypes::DestinationUnreachable => match code {
            0 => EchoStatus::DestinationNetworkUnreachable,
            1 => EchoStatus::DestinationHostUnreachable,
            2 => EchoStatus::DestinationProtocolUnreachable,
            3 => EchoStatus::DestinationPortUnreachable,
            4 => EchoStatus::PacketTooBig,
            _ => EchoStatus::DestinationUnreachable,
        },
        IcmpTypes::TimeExceeded if code == 1 => EchoStatus::TtlReassemblyTimeExceeded,
        IcmpTypes::TimeExceeded => EchoStatus::TtlExpired,
        IcmpTypes::ParameterProblem => EchoStatus::ParameterProblem,
        _ => return None,
    };
    quotes_ipv4_request(message.payload(), request).then_some(EchoReply {
        status,
        rtt,
        bytes: 0,
        ttl: None,
    })
}

fn quotes_ipv4_request(icmp_payload: &[u8], request: &EchoRequest) -> bool {
    icmp_payload
        .get(ICMP_ERROR_PREFIX_LEN..)
        .and_then(Ipv4Packet::new)
        .filter(|original| IpAddr::V4(original.get_destination()) == request.address)
        .and_then(|original| {
            EchoRequestPacket::new(original.payload())
                .map(|echo| (echo.get_identifier(), echo.get_sequence_number()))
        })
        .is_some_and(|ids| ids == (request.identifier, request.sequence))
}

pub(crate) fn match_ipv6(
    message: &Icmpv6Packet,
    source: IpAddr,
    request: &EchoRequest,
    rtt: Duration,
) -> Option<EchoReply> {
    let code = message.get_icmpv6_code().0;
    let status = match message.get_icmpv6_type() {
        Icmpv6Types::EchoReply => {
            let body = message.payload();
            if source != request.address || !echo_body_matches(body, request) {
                return None;
            }
            return Some(EchoReply {
                status: EchoStatus::Success,
                rtt,
                bytes: body.len().saturating_sub(4),
                ttl: None,
            });
        }
        Icmpv6Types::DestinationUnreachable => match code {
            0 => EchoStatus::DestinationNetworkUnreachable,
            3 => EchoStatus::DestinationHostUnreachable,
            4 => EchoStatus::DestinationPortUnreachable,
            _ => EchoStatus::DestinationUnreachable,
        },
        Icmpv6Types::PacketTooBig => EchoStatus::PacketTooBig,
        Icmpv6Types::TimeExceeded if code == 1 => EchoStatus::TtlReassemblyTimeExceeded,
        Icmpv6Types::TimeExceeded => EchoStatus::TtlExpired,
        Icmpv6Types::ParameterProblem => EchoStatus::ParameterProblem,
        _ => return None,
    };
    let quoted = message
        .payload()
        .get(ICMP_ERROR_PREFIX_LEN + IPV6_HEADER_LEN..)?;
    let original = Icmpv6Packet::new(quoted)?;
    (original.get_icmpv6_type() == Icmpv6Types::EchoRequest
        && echo_body_matches(original.payload(), request))
    .then_some(EchoReply {
        status,
        rtt,
        bytes: 0,
        ttl: None,
    })
}

// identifier and sequence lead the body of ICMPv6 echo messages
fn echo_body_matches(body: &[u8], request: &EchoRequest) -> bool {
    body.len() >= 4
        && body[0..2] == request.identifier.to_be_bytes()
        && body[2..4] == request.sequence.to_be_bytes()
}
