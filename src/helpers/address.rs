use mailparse::{addrparse, MailAddr};
use tracing::debug;

use crate::types::Address;

/// Parse a raw address header (`To:`, `Cc:` ...) into mailboxes.
///
/// Group syntax is flattened. Unparseable input yields an empty list rather
/// than an error, since a broken header must not block ingest.
pub fn parse_address_header(raw: &str) -> Vec<Address> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    match addrparse(raw) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                MailAddr::Single(info) => vec![to_address(info)],
                MailAddr::Group(group) => group.addrs.iter().map(to_address).collect(),
            })
            .collect(),
        Err(e) => {
            debug!("Could not parse address header {:?}: {}", raw, e);
            Vec::new()
        }
    }
}

fn to_address(info: &mailparse::SingleInfo) -> Address {
    Address {
        name: info
            .display_name
            .as_ref()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        email: info.addr.trim().to_string(),
    }
}
