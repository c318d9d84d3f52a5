//! SSDP (Simple Service Discovery Protocol) codec and sockets
//!
//! This module builds M-SEARCH requests, parses search responses and NOTIFY
//! announcements, and opens the interface-bound multicast sockets the engine
//! receives on. It is not part of the public API.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, trace, warn};

pub(crate) const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub(crate) const SSDP_PORT: u16 = 1900;

/// Lifetime assumed when an announcement carries no usable `max-age`.
pub(crate) const DEFAULT_MAX_AGE: u32 = 1800;

/// Search target matching every device and service.
pub const SEARCH_ALL: &str = "ssdp:all";

/// SSDP messages a control point cares about
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SsdpMessage {
    /// `NOTIFY` with `NTS: ssdp:alive`
    Alive {
        usn: String,
        nt: String,
        location: String,
        server: Option<String>,
        max_age: u32,
    },
    /// `NOTIFY` with `NTS: ssdp:byebye`
    ByeBye { usn: String, nt: String },
    /// `HTTP/1.1 200 OK` answer to an M-SEARCH
    SearchResponse {
        usn: String,
        st: String,
        location: String,
        server: Option<String>,
        max_age: u32,
    },
}

impl SsdpMessage {
    pub fn usn(&self) -> &str {
        match self {
            SsdpMessage::Alive { usn, .. }
            | SsdpMessage::ByeBye { usn, .. }
            | SsdpMessage::SearchResponse { usn, .. } => usn,
        }
    }

    /// Device UDN carried by the USN (`uuid:...` before any `::` suffix)
    pub fn udn(&self) -> &str {
        udn_from_usn(self.usn())
    }
}

/// Build an M-SEARCH request for the given search target
pub(crate) fn build_msearch(search_target: &str, mx: u32, user_agent: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         USER-AGENT: {}\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR,
        SSDP_PORT,
        mx.max(1),
        search_target,
        user_agent
    )
}

/// Parse one SSDP datagram
///
/// Returns `None` for M-SEARCH requests from other control points, unknown
/// message types and messages missing a required header.
pub(crate) fn parse_message(text: &str) -> Option<SsdpMessage> {
    let mut lines = text.lines();
    let start_line = lines.next()?.trim().to_ascii_uppercase();
    let headers = parse_headers(lines);

    if start_line.starts_with("NOTIFY ") {
        let nts = headers.get("NTS")?.to_ascii_lowercase();
        let nt = headers.get("NT")?.clone();
        let usn = headers.get("USN")?.clone();

        match nts.as_str() {
            "ssdp:alive" => Some(SsdpMessage::Alive {
                usn,
                nt,
                location: headers.get("LOCATION")?.clone(),
                server: headers.get("SERVER").cloned(),
                max_age: parse_max_age(headers.get("CACHE-CONTROL").map(String::as_str)),
            }),
            "ssdp:byebye" => Some(SsdpMessage::ByeBye { usn, nt }),
            other => {
                trace!("Ignoring NOTIFY with NTS {}", other);
                None
            }
        }
    } else if start_line.starts_with("HTTP/") && start_line.contains(" 200") {
        Some(SsdpMessage::SearchResponse {
            usn: headers.get("USN")?.clone(),
            st: headers.get("ST")?.clone(),
            location: headers.get("LOCATION")?.clone(),
            server: headers.get("SERVER").cloned(),
            max_age: parse_max_age(headers.get("CACHE-CONTROL").map(String::as_str)),
        })
    } else {
        None
    }
}

/// Collect `NAME: value` headers, upper-casing names
///
/// Values may contain `:` so only the first colon splits. Empty values are
/// dropped.
fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_uppercase();
            let value = value.trim();
            if !name.is_empty() && !value.is_empty() {
                headers.insert(name, value.to_string());
            }
        }
    }
    headers
}

/// Extract `max-age` from a `CACHE-CONTROL` value like `max-age = 1800`
pub(crate) fn parse_max_age(value: Option<&str>) -> u32 {
    let Some(value) = value else {
        return DEFAULT_MAX_AGE;
    };

    let lower = value.to_ascii_lowercase();
    lower
        .find("max-age")
        .map(|idx| &lower[idx + "max-age".len()..])
        .map(|rest| rest.trim_start().trim_start_matches('=').trim_start())
        .and_then(|rest| {
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().ok()
        })
        .unwrap_or(DEFAULT_MAX_AGE)
}

/// `uuid:abc::urn:...:MediaServer:1` -> `uuid:abc`
pub(crate) fn udn_from_usn(usn: &str) -> &str {
    usn.split("::").next().unwrap_or(usn).trim()
}

/// Open a socket bound to one interface address for sending M-SEARCH and
/// receiving the unicast answers.
///
/// Binds an ephemeral port: a control point must not share port 1900 with
/// a device stack, the kernel would split unicast answers between sockets.
pub(crate) fn search_socket(interface: Ipv4Addr, receive_timeout: Duration) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddr::V4(SocketAddrV4::new(interface, 0)).into())?;
    socket.set_multicast_if_v4(&interface)?;
    socket.set_multicast_loop_v4(true)?;
    socket.set_multicast_ttl_v4(4)?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(receive_timeout))?;
    debug!("SSDP search socket bound on {}", socket.local_addr()?);
    Ok(socket)
}

/// Open the shared NOTIFY listener on port 1900, joined on every interface
///
/// Joining is per interface; an interface that refuses the membership is
/// logged and skipped.
pub(crate) fn notify_socket(interfaces: &[Ipv4Addr], receive_timeout: Duration) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SSDP_PORT)).into())?;

    for interface in interfaces {
        if let Err(e) = socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, interface) {
            warn!("Failed to join {} on {}: {}", SSDP_MULTICAST_ADDR, interface, e);
        }
    }

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(receive_timeout))?;
    Ok(socket)
}

/// Send an M-SEARCH to the SSDP multicast group
pub(crate) fn send_msearch(socket: &UdpSocket, request: &str) -> io::Result<()> {
    socket.send_to(
        request.as_bytes(),
        SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT),
    )?;
    Ok(())
}
