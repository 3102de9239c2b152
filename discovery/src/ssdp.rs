//! SSDP message construction and parsing.
//!
//! Handles the two message shapes a control point sees on the wire:
//! HTTP-style search responses (`HTTP/1.1 200 OK`) and unsolicited
//! `NOTIFY * HTTP/1.1` announcements carrying `ssdp:alive` or
//! `ssdp:byebye`. Header matching is case-insensitive throughout.

use std::time::Duration;

/// Multicast group address used by SSDP.
pub(crate) const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// Max-age applied when an advertisement carries no usable CACHE-CONTROL.
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(1800);

/// A device advertisement extracted from a search response or alive notify.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    /// Unique Device Name, e.g. "uuid:abc"
    pub udn: String,
    /// Search target (ST) or notification type (NT) the advertisement answers
    pub notification_type: String,
    /// URL of the device description document
    pub location: String,
    /// Advertised validity window from CACHE-CONTROL max-age
    pub max_age: Duration,
    /// SERVER header, when present
    pub server: Option<String>,
}

/// A parsed SSDP message relevant to a control point.
#[derive(Debug, Clone, PartialEq)]
pub enum SsdpMessage {
    /// Search response or `ssdp:alive` notification
    Alive(Advertisement),
    /// `ssdp:byebye` notification
    ByeBye {
        /// UDN of the departing device
        udn: String,
        /// Notification type named in the byebye
        notification_type: String,
    },
}

/// Build an M-SEARCH request for the given target.
pub(crate) fn build_search(target: &str, mx: u32) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: 239.255.255.250:1900\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {mx}\r\n\
         ST: {target}\r\n\
         USER-AGENT: upnp-point/1.0 UPnP/1.0\r\n\
         \r\n"
    )
}

/// Parse an SSDP datagram into a message, if it is one we care about.
///
/// Returns `None` for malformed datagrams, M-SEARCH requests from other
/// control points, and notifications missing required headers.
pub fn parse_message(text: &str) -> Option<SsdpMessage> {
    let first_line = text.lines().next()?.trim();

    if first_line.starts_with("HTTP/1.1 200") {
        return parse_alive(text, "ST:").map(SsdpMessage::Alive);
    }

    if first_line.starts_with("NOTIFY") {
        let nts = find_header(text, "NTS:")?;
        return match nts.as_str() {
            "ssdp:alive" => parse_alive(text, "NT:").map(SsdpMessage::Alive),
            "ssdp:byebye" => {
                let usn = find_header(text, "USN:")?;
                Some(SsdpMessage::ByeBye {
                    udn: udn_from_usn(&usn),
                    notification_type: find_header(text, "NT:")?,
                })
            }
            _ => None,
        };
    }

    None
}

fn parse_alive(text: &str, type_header: &str) -> Option<Advertisement> {
    let location = find_header(text, "LOCATION:")?;
    let notification_type = find_header(text, type_header)?;
    let usn = find_header(text, "USN:")?;

    Some(Advertisement {
        udn: udn_from_usn(&usn),
        notification_type,
        location,
        max_age: find_header(text, "CACHE-CONTROL:")
            .and_then(|v| parse_max_age(&v))
            .unwrap_or(DEFAULT_MAX_AGE),
        server: find_header(text, "SERVER:"),
    })
}

/// Extract the UDN prefix from a USN like "uuid:abc::urn:...:service:...".
fn udn_from_usn(usn: &str) -> String {
    match usn.split_once("::") {
        Some((udn, _)) => udn.to_string(),
        None => usn.to_string(),
    }
}

/// Parse "max-age=1800" out of a CACHE-CONTROL value.
fn parse_max_age(value: &str) -> Option<Duration> {
    for directive in value.split(',') {
        let directive = directive.trim();
        if let Some(seconds) = directive
            .strip_prefix("max-age")
            .and_then(|rest| rest.trim_start().strip_prefix('='))
        {
            return seconds.trim().parse::<u64>().ok().map(Duration::from_secs);
        }
    }
    None
}

fn find_header(text: &str, header: &str) -> Option<String> {
    text.lines()
        .filter_map(|line| extract_header_value(line.trim(), header))
        .next()
}

/// Extract header value from a line like "HEADER: value".
fn extract_header_value(line: &str, header: &str) -> Option<String> {
    if line.len() > header.len() && line[..header.len()].eq_ignore_ascii_case(header) {
        Some(line[header.len()..].trim().to_string())
    } else {
        None
    }
}
