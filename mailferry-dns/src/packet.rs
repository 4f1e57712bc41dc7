//! RFC 1035 wire format: query encoding and answer-section parsing.

use thiserror::Error;

use crate::MxRecord;

/// Resource record type MX.
const TYPE_MX: u16 = 15;
/// Record class IN.
const CLASS_IN: u16 = 1;
/// Fixed size of the DNS message header.
const HEADER_LEN: usize = 12;
/// Labels are limited to 63 octets; anything longer is a pointer or invalid.
const MAX_LABEL_LEN: usize = 63;
/// Both high bits set marks a compression pointer.
const POINTER_MASK: u8 = 0xC0;
/// Upper bound on pointer chain length. Any legitimate name fits in far
/// fewer jumps; this stops malformed packets from looping the cursor.
const MAX_POINTER_JUMPS: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet ends before the field being read")]
    Truncated,

    #[error("transaction id mismatch (expected {expected:#06x}, found {found:#06x})")]
    IdMismatch { expected: u16, found: u16 },

    #[error("packet is a query, not a response")]
    NotAResponse,

    #[error("upstream answered with rcode {0}")]
    ServerFailure(u16),

    #[error("invalid label '{0}' in domain name")]
    BadLabel(String),

    #[error("compression pointer chain is too long or loops")]
    PointerLoop,
}

/// Encodes a standard MX/IN query for `domain` with the given transaction id.
///
/// Layout: 12-byte header (id, RD flag, QDCOUNT=1), then the domain as
/// length-prefixed labels terminated by a zero byte, then QTYPE and QCLASS.
///
/// # Errors
///
/// Fails when a label is empty or longer than 63 octets.
pub fn encode_query(id: u16, domain: &str) -> Result<Vec<u8>, PacketError> {
    let mut packet = Vec::with_capacity(HEADER_LEN + domain.len() + 6);

    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&0x0100_u16.to_be_bytes()); // standard query, recursion desired
    packet.extend_from_slice(&1_u16.to_be_bytes()); // QDCOUNT
    packet.extend_from_slice(&[0; 6]); // ANCOUNT, NSCOUNT, ARCOUNT

    for label in domain.trim_end_matches('.').split('.') {
        let len =
            u8::try_from(label.len()).map_err(|_| PacketError::BadLabel(label.to_string()))?;
        if len == 0 || usize::from(len) > MAX_LABEL_LEN {
            return Err(PacketError::BadLabel(label.to_string()));
        }
        packet.push(len);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);

    packet.extend_from_slice(&TYPE_MX.to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());

    Ok(packet)
}

/// Parses the answer section of a response to a previously sent MX query.
///
/// Returns the MX answers in packet order; callers sort by preference.
/// Answer records of other types in the same response are skipped by their
/// RDLENGTH rather than assumed absent.
///
/// # Errors
///
/// Fails on truncation, a transaction id mismatch, a non-zero rcode, or a
/// malformed compression pointer chain.
pub fn parse_mx_response(packet: &[u8], expected_id: u16) -> Result<Vec<MxRecord>, PacketError> {
    if packet.len() < HEADER_LEN {
        return Err(PacketError::Truncated);
    }

    let id = read_u16(packet, 0)?;
    if id != expected_id {
        return Err(PacketError::IdMismatch {
            expected: expected_id,
            found: id,
        });
    }

    let flags = read_u16(packet, 2)?;
    if flags & 0x8000 == 0 {
        return Err(PacketError::NotAResponse);
    }
    let rcode = flags & 0x000F;
    if rcode != 0 {
        return Err(PacketError::ServerFailure(rcode));
    }

    let qdcount = read_u16(packet, 4)?;
    let ancount = read_u16(packet, 6)?;

    let mut cursor = HEADER_LEN;

    // Question section: name + QTYPE + QCLASS per entry.
    for _ in 0..qdcount {
        let (_, after_name) = read_name(packet, cursor)?;
        cursor = after_name + 4;
    }

    let mut records = Vec::new();

    for _ in 0..ancount {
        let (_, after_name) = read_name(packet, cursor)?;
        cursor = after_name;

        let rtype = read_u16(packet, cursor)?;
        let class = read_u16(packet, cursor + 2)?;
        let rdlength = usize::from(read_u16(packet, cursor + 8)?);
        cursor += 10; // TYPE + CLASS + TTL + RDLENGTH

        if packet.len() < cursor + rdlength {
            return Err(PacketError::Truncated);
        }

        if rtype == TYPE_MX && class == CLASS_IN {
            if rdlength < 3 {
                return Err(PacketError::Truncated);
            }
            let preference = read_u16(packet, cursor)?;
            let (exchange, _) = read_name(packet, cursor + 2)?;
            records.push(MxRecord::new(exchange, preference));
        }

        cursor += rdlength;
    }

    Ok(records)
}

fn read_u16(packet: &[u8], at: usize) -> Result<u16, PacketError> {
    let bytes = packet.get(at..at + 2).ok_or(PacketError::Truncated)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a (possibly compressed) domain name starting at `start`.
///
/// Returns the decoded name and the offset just past the name in the
/// original byte stream; pointer targets never advance that offset.
fn read_name(packet: &[u8], start: usize) -> Result<(String, usize), PacketError> {
    let mut name = String::new();
    let mut cursor = start;
    let mut jumps = 0_usize;
    let mut end = None;

    loop {
        let byte = *packet.get(cursor).ok_or(PacketError::Truncated)?;

        if byte & POINTER_MASK == POINTER_MASK {
            let low = *packet.get(cursor + 1).ok_or(PacketError::Truncated)?;
            if end.is_none() {
                end = Some(cursor + 2);
            }
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return Err(PacketError::PointerLoop);
            }
            cursor = usize::from(u16::from_be_bytes([byte & 0x3F, low]));
        } else if byte & POINTER_MASK != 0 {
            // 0x40/0x80 prefixes are reserved and never valid label lengths.
            return Err(PacketError::BadLabel(format!("{byte:#04x}")));
        } else if byte == 0 {
            return Ok((name, end.unwrap_or(cursor + 1)));
        } else {
            let len = usize::from(byte);
            let label = packet
                .get(cursor + 1..cursor + 1 + len)
                .ok_or(PacketError::Truncated)?;
            if !name.is_empty() {
                name.push('.');
            }
            name.push_str(&String::from_utf8_lossy(label));
            cursor += 1 + len;
        }
    }
}
