use std::fmt;
use std::str::FromStr;

use hickory_proto::rr::{RData, Record, RecordType};
use hickory_proto::serialize::binary::BinEncodable as _;

use crate::error::ResolveError;

/// The record types this crate knows how to query and render.
///
/// Everything else is rejected before a query is sent, and skipped when it
/// shows up in a zone transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    A,
    AAAA,
    CNAME,
    PTR,
    NS,
    MX,
    TXT,
    SOA,
    SPF,
    SRV,
}

impl RecordKind {
    /// SPF (RFC 4408) has no dedicated variant in the wire library.
    pub const SPF_CODE: u16 = 99;

    pub const ALL: [RecordKind; 10] = [
        RecordKind::A,
        RecordKind::AAAA,
        RecordKind::CNAME,
        RecordKind::PTR,
        RecordKind::NS,
        RecordKind::MX,
        RecordKind::TXT,
        RecordKind::SOA,
        RecordKind::SPF,
        RecordKind::SRV,
    ];

    pub fn record_type(self) -> RecordType {
        match self {
            RecordKind::A => RecordType::A,
            RecordKind::AAAA => RecordType::AAAA,
            RecordKind::CNAME => RecordType::CNAME,
            RecordKind::PTR => RecordType::PTR,
            RecordKind::NS => RecordType::NS,
            RecordKind::MX => RecordType::MX,
            RecordKind::TXT => RecordType::TXT,
            RecordKind::SOA => RecordType::SOA,
            RecordKind::SPF => RecordType::from(Self::SPF_CODE),
            RecordKind::SRV => RecordType::SRV,
        }
    }

    /// The numeric record type code.
    pub fn code(self) -> u16 {
        u16::from(self.record_type())
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            RecordKind::A => "A",
            RecordKind::AAAA => "AAAA",
            RecordKind::CNAME => "CNAME",
            RecordKind::PTR => "PTR",
            RecordKind::NS => "NS",
            RecordKind::MX => "MX",
            RecordKind::TXT => "TXT",
            RecordKind::SOA => "SOA",
            RecordKind::SPF => "SPF",
            RecordKind::SRV => "SRV",
        }
    }

    /// Identify a record and render its value as a string.
    ///
    /// Names keep their trailing root dot; callers decide whether to strip it.
    pub fn extract(record: &Record) -> Option<(RecordKind, String)> {
        let kind = Self::from_code(u16::from(record.record_type()))?;
        let value = match (kind, record.data()) {
            (RecordKind::A, RData::A(a)) => a.to_string(),
            (RecordKind::AAAA, RData::AAAA(aaaa)) => aaaa.to_string(),
            (RecordKind::CNAME, RData::CNAME(cname)) => cname.0.to_string(),
            (RecordKind::PTR, RData::PTR(ptr)) => ptr.0.to_string(),
            (RecordKind::NS, RData::NS(ns)) => ns.0.to_string(),
            (RecordKind::MX, RData::MX(mx)) => mx.exchange().to_string(),
            (RecordKind::TXT, RData::TXT(txt)) => txt
                .txt_data()
                .iter()
                .map(|piece| String::from_utf8_lossy(piece))
                .collect::<Vec<_>>()
                .join(" "),
            (RecordKind::SOA, RData::SOA(soa)) => format!("{} {}", soa.mname(), soa.rname()),
            (RecordKind::SPF, rdata @ RData::Unknown { .. }) => {
                character_strings(&rdata.to_bytes().ok()?).join(" ")
            }
            (RecordKind::SRV, RData::SRV(srv)) => srv.target().to_string(),
            _ => return None,
        };
        Some((kind, value))
    }
}

/// Splits RFC 1035 `<character-string>`s, as used by TXT and SPF rdata.
fn character_strings(mut data: &[u8]) -> Vec<String> {
    let mut pieces = Vec::new();
    while let Some((&length, rest)) = data.split_first() {
        let length = usize::from(length).min(rest.len());
        pieces.push(String::from_utf8_lossy(&rest[..length]).into_owned());
        data = &rest[length..];
    }
    pieces
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for RecordKind {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.mnemonic() == s)
            .ok_or_else(|| ResolveError::UnsupportedType(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::str::FromStr as _;

    use hickory_proto::rr::rdata::{self, A, AAAA, CNAME, MX, NULL, SOA, SRV, TXT};
    use hickory_proto::rr::{Name, RData, Record};

    use super::*;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn record(rdata: RData) -> Record {
        Record::from_rdata(name("example.com."), 300, rdata)
    }

    #[test]
    fn mnemonics_parse() {
        assert_eq!("A".parse::<RecordKind>().unwrap(), RecordKind::A);
        assert_eq!("AAAA".parse::<RecordKind>().unwrap(), RecordKind::AAAA);
        // mnemonics are case sensitive
        assert!(matches!(
            "aaaa".parse::<RecordKind>(),
            Err(ResolveError::UnsupportedType(_))
        ));
        assert!("a".parse::<RecordKind>().is_err());
        assert_eq!("SPF".parse::<RecordKind>().unwrap().code(), 99);
        assert_eq!("SRV".parse::<RecordKind>().unwrap().code(), 33);

        let error = "HINFO".parse::<RecordKind>().unwrap_err();
        assert!(matches!(error, ResolveError::UnsupportedType(ref t) if t == "HINFO"));
    }

    #[test]
    fn codes_round_trip() {
        for kind in RecordKind::ALL {
            assert_eq!(RecordKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(RecordKind::from_code(13), None);
    }

    #[test]
    fn extract_addresses() {
        let a = record(RData::A(A(Ipv4Addr::new(192, 0, 2, 1))));
        assert_eq!(
            RecordKind::extract(&a),
            Some((RecordKind::A, "192.0.2.1".to_owned()))
        );

        let aaaa = record(RData::AAAA(AAAA(Ipv6Addr::LOCALHOST)));
        assert_eq!(
            RecordKind::extract(&aaaa),
            Some((RecordKind::AAAA, "::1".to_owned()))
        );
    }

    #[test]
    fn extract_names_keep_root_dot() {
        let cname = record(RData::CNAME(CNAME(name("www.example.net."))));
        assert_eq!(
            RecordKind::extract(&cname),
            Some((RecordKind::CNAME, "www.example.net.".to_owned()))
        );

        let mx = record(RData::MX(MX::new(10, name("mail.example.com."))));
        assert_eq!(
            RecordKind::extract(&mx),
            Some((RecordKind::MX, "mail.example.com.".to_owned()))
        );

        let srv = record(RData::SRV(SRV::new(1, 2, 5060, name("sip.example.com."))));
        assert_eq!(
            RecordKind::extract(&srv),
            Some((RecordKind::SRV, "sip.example.com.".to_owned()))
        );
    }

    #[test]
    fn extract_txt_joins_pieces() {
        let txt = record(RData::TXT(TXT::new(vec![
            "v=spf1".to_owned(),
            "-all".to_owned(),
        ])));
        assert_eq!(
            RecordKind::extract(&txt),
            Some((RecordKind::TXT, "v=spf1 -all".to_owned()))
        );
    }

    #[test]
    fn extract_soa() {
        let soa = record(RData::SOA(SOA::new(
            name("ns1.example.com."),
            name("hostmaster.example.com."),
            1,
            3600,
            600,
            86400,
            60,
        )));
        assert_eq!(
            RecordKind::extract(&soa),
            Some((
                RecordKind::SOA,
                "ns1.example.com. hostmaster.example.com.".to_owned()
            ))
        );
    }

    #[test]
    fn extract_spf_from_unknown_rdata() {
        let mut raw = vec![6u8];
        raw.extend_from_slice(b"v=spf1");
        raw.push(4);
        raw.extend_from_slice(b"-all");
        let spf = record(RData::Unknown {
            code: RecordType::from(RecordKind::SPF_CODE),
            rdata: NULL::with(raw),
        });
        assert_eq!(
            RecordKind::extract(&spf),
            Some((RecordKind::SPF, "v=spf1 -all".to_owned()))
        );
    }

    #[test]
    fn unsupported_records_are_skipped() {
        let hinfo = record(RData::HINFO(rdata::HINFO::new(
            "cpu".to_owned(),
            "os".to_owned(),
        )));
        assert_eq!(RecordKind::extract(&hinfo), None);
    }

    #[test]
    fn character_strings_tolerate_truncation() {
        assert_eq!(
            character_strings(&[3, b'a', b'b']),
            vec!["ab".to_owned()]
        );
        assert!(character_strings(&[]).is_empty());
    }
}
