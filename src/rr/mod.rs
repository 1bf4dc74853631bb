//! Answer and discovery types produced by lookups

mod answer;
mod discovery;
mod kind;

pub use self::answer::{Answer, trim_root};
pub use self::discovery::{Discovery, Tag};
pub use self::kind::RecordKind;

pub use hickory_proto::rr::Name;
