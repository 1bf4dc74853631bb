use std::collections::HashMap;
use std::fmt;

use super::Answer;

/// How a discovery was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Found by a full zone transfer.
    Axfr,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Axfr => f.write_str("axfr"),
        }
    }
}

/// A name discovered during enumeration together with its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub name: String,
    pub domain: String,
    pub records: Vec<Answer>,
    pub tag: Tag,
    pub source: String,
}

impl Discovery {
    /// Group answers by owner name, preserving first-seen order of both the
    /// names and the answers under each name.
    pub fn group<I>(answers: I, domain: &str, tag: Tag, source: &str) -> Vec<Discovery>
    where
        I: IntoIterator<Item = Answer>,
    {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut discoveries: Vec<Discovery> = Vec::new();

        for answer in answers {
            match index.get(answer.name()) {
                Some(&position) => discoveries[position].records.push(answer),
                None => {
                    index.insert(answer.name().to_owned(), discoveries.len());
                    discoveries.push(Discovery {
                        name: answer.name().to_owned(),
                        domain: domain.to_owned(),
                        records: vec![answer],
                        tag,
                        source: source.to_owned(),
                    });
                }
            }
        }

        discoveries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rr::RecordKind;

    #[test]
    fn groups_by_owner_in_order() {
        let answers = vec![
            Answer::new("www.example.com", RecordKind::A, "192.0.2.1"),
            Answer::new("mail.example.com", RecordKind::MX, "mx.example.com"),
            Answer::new("www.example.com", RecordKind::TXT, "hello"),
        ];

        let discoveries = Discovery::group(answers, "example.com", Tag::Axfr, "DNS Zone XFR");
        assert_eq!(discoveries.len(), 2);

        let www = &discoveries[0];
        assert_eq!(www.name, "www.example.com");
        assert_eq!(www.domain, "example.com");
        assert_eq!(www.tag, Tag::Axfr);
        assert_eq!(www.source, "DNS Zone XFR");
        assert_eq!(
            www.records
                .iter()
                .map(|answer| answer.record_type())
                .collect::<Vec<_>>(),
            vec![1, 16]
        );

        assert_eq!(discoveries[1].name, "mail.example.com");
    }

    #[test]
    fn empty_input() {
        assert!(Discovery::group(Vec::new(), "example.com", Tag::Axfr, "x").is_empty());
    }

    #[test]
    fn tag_display() {
        assert_eq!(Tag::Axfr.to_string(), "axfr");
    }
}
