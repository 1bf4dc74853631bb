use std::fmt;

use hickory_proto::rr::Record;

use super::RecordKind;

/// A single discovered DNS answer.
///
/// The TTL is never taken from the wire and is always zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Answer {
    name: String,
    record_type: u16,
    ttl: u32,
    data: String,
}

impl Answer {
    pub fn new(name: impl Into<String>, kind: RecordKind, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            record_type: kind.code(),
            ttl: 0,
            data: data.into(),
        }
    }

    /// Build an answer from a live query response.
    ///
    /// The owner is the name that was queried, and only records of the
    /// requested kind are accepted. NS values are rendered as
    /// `zone,nameserver`.
    pub(crate) fn from_response(query_name: &str, requested: RecordKind, record: &Record) -> Option<Self> {
        match RecordKind::extract(record)? {
            (RecordKind::NS, value) if requested == RecordKind::NS => {
                let zone = record.name().to_string();
                let data = format!("{},{}", trim_root(&zone), trim_root(value.trim()));
                Some(Answer::new(query_name, RecordKind::NS, data))
            }
            (kind, value) if kind == requested => {
                Some(Answer::new(query_name, kind, value.trim()))
            }
            _ => None,
        }
    }

    /// Build an answer from a zone transfer record, with root dots removed.
    pub(crate) fn from_transfer(record: &Record) -> Option<Self> {
        let (kind, value) = RecordKind::extract(record)?;
        let owner = record.name().to_string();
        Some(Answer::new(
            trim_root(&owner),
            kind,
            trim_root(value.trim()),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The numeric record type code.
    pub fn record_type(&self) -> u16 {
        self.record_type
    }

    pub fn kind(&self) -> Option<RecordKind> {
        RecordKind::from_code(self.record_type)
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn data(&self) -> &str {
        &self.data
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{} {} {}", self.name, kind, self.data),
            None => write!(f, "{} TYPE{} {}", self.name, self.record_type, self.data),
        }
    }
}

/// Strip a single trailing root dot from a domain name.
pub fn trim_root(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}
