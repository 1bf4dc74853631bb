use std::fmt::Write as _;
use std::net::IpAddr;

use tokio_util::sync::CancellationToken;

use crate::error::ResolveError;
use crate::rr::{RecordKind, trim_root};

use super::Client;

/// The result of a reverse lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseLookup {
    /// The PTR query name, e.g. `8.8.8.8.in-addr.arpa`.
    pub ptr: String,
    pub hostname: String,
}

/// The PTR query name for an IP address.
pub fn ptr_name(address: &str) -> Result<String, ResolveError> {
    let ip: IpAddr = address
        .trim()
        .parse()
        .map_err(|_| ResolveError::InvalidAddress(address.to_owned()))?;

    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            Ok(format!("{d}.{c}.{b}.{a}.in-addr.arpa"))
        }
        IpAddr::V6(v6) => {
            let mut name = String::with_capacity(72);
            for byte in v6.octets().iter().rev() {
                let _ = write!(name, "{:x}.{:x}.", byte & 0x0f, byte >> 4);
            }
            name.push_str("ip6.arpa");
            Ok(name)
        }
    }
}

fn is_reverse_zone(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.ends_with(".in-addr.arpa") || name.ends_with(".ip6.arpa")
}

impl Client {
    /// Find the hostname an IP address points back to.
    pub async fn reverse(&self, address: &str) -> Result<ReverseLookup, ResolveError> {
        self.reverse_until(address, &CancellationToken::new()).await
    }

    #[tracing::instrument(skip_all, fields(dns.name = %address, dns.type = "PTR"), level = "debug")]
    pub async fn reverse_until(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<ReverseLookup, ResolveError> {
        let ptr = ptr_name(address)?;
        let answers = self
            .resolve_until(&ptr, RecordKind::PTR.mnemonic(), cancel)
            .await?;

        let hostname = answers
            .iter()
            .find(|answer| answer.record_type() == RecordKind::PTR.code())
            .map(|answer| trim_root(answer.data()).to_owned())
            .unwrap_or_default();

        if hostname.is_empty() {
            return Err(ResolveError::PtrNotFound(address.to_owned()));
        }
        if is_reverse_zone(&hostname) {
            return Err(ResolveError::InvalidPtrTarget(hostname));
        }

        Ok(ReverseLookup { ptr, hostname })
    }
}
