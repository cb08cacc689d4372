//! DNS wire-format decoder for sniffed UDP payloads.
//!
//! Only the parts of a response needed to spot blackholed hosts are decoded:
//! the question names and the A-record addresses of the answer section.
//!
//! # Limitations
//!
//! - Question names must be uncompressed. A compression pointer in a question
//!   is read as an ordinary label length and the rest of the message is
//!   misread (or rejected as truncated).
//! - Answer names are assumed to be a two-byte compression pointer.
//!
//! Every read is bounds-checked; malformed input yields [`DecodeError`] and
//! never panics.

use std::net::Ipv4Addr;

use crate::error::DecodeError;

/// Record type of an IPv4 address (A) record.
pub const TYPE_A: u16 = 1;

/// A question of the question section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: u16,
}

/// A record of the answer section.
///
/// `address` is only set for A records carrying exactly four bytes of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsAnswer {
    pub rtype: u16,
    pub address: Option<Ipv4Addr>,
}

/// Questions and answers decoded from one datagram.
///
/// Questions that are not A queries are kept as `None` so positions match
/// the declared question count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SniffedPacket {
    pub questions: Vec<Option<DnsQuestion>>,
    pub answers: Vec<DnsAnswer>,
}

impl SniffedPacket {
    /// A packet without questions or without answers carries no resolution.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty() || self.answers.is_empty()
    }
}

/// Bounds-checked big-endian cursor over a payload.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.buf.len() - self.pos;
        if len > available {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: len,
                available,
            });
        }

        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take(len).map(|_| ())
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a sequence of length-prefixed labels up to the zero-length label.
    fn read_name(&mut self) -> Result<String, DecodeError> {
        let mut name = String::new();

        loop {
            let len = self.read_u8()?;
            if len == 0 {
                break;
            }

            let label = self.take(usize::from(len))?;
            if !name.is_empty() {
                name.push('.');
            }
            name.push_str(&String::from_utf8_lossy(label));
        }

        Ok(name)
    }
}

/// Decode the question and answer sections of a DNS payload.
///
/// The returned packet is empty (see [`SniffedPacket::is_empty`]) when the
/// header declares no questions or no answers.
pub fn decode(payload: &[u8]) -> Result<SniffedPacket, DecodeError> {
    let mut reader = Reader::new(payload);

    // transaction id, flags
    reader.skip(4)?;
    let question_count = reader.read_u16()?;
    let answer_count = reader.read_u16()?;
    // authority and additional counts
    reader.skip(4)?;

    let mut questions = Vec::new();
    for _ in 0..question_count {
        let name = reader.read_name()?;
        let qtype = reader.read_u16()?;
        // qclass
        reader.skip(2)?;

        questions.push((qtype == TYPE_A).then_some(DnsQuestion { name, qtype }));
    }

    let mut answers = Vec::new();
    for _ in 0..answer_count {
        // name, always a pointer in the responses we care about
        reader.skip(2)?;
        let rtype = reader.read_u16()?;
        // class + ttl
        reader.skip(6)?;
        let data_len = usize::from(reader.read_u16()?);
        let data = reader.take(data_len)?;

        let address = match (rtype, data) {
            (TYPE_A, &[a, b, c, d]) => Some(Ipv4Addr::new(a, b, c, d)),
            _ => None,
        };
        answers.push(DnsAnswer { rtype, address });
    }

    Ok(SniffedPacket { questions, answers })
}
