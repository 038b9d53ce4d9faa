use std::net::IpAddr;

use crate::config::ProtocolPreference;
use crate::error::{Error, Result};

/// A destination bound to the single address it will be probed at.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Resolved {
    pub destination: String,
    pub address: IpAddr,
    /// Set when the address came from a name lookup rather than a literal.
    pub by_name: bool,
}

impl Resolved {
    /// Label used for console output: `host [address]` for names, the address otherwise.
    pub fn label(&self) -> String {
        if self.by_name {
            format!("{} [{}]", self.destination, self.address)
        } else {
            self.address.to_string()
        }
    }
}

/// Resolves a destination to one address.
///
/// Literal addresses are taken as they are, whatever the family preference. Host names
/// go through the system resolver and the first address of the preferred family wins.
///
/// # Errors
/// [`Error::Resolution`] when the lookup fails, [`Error::NoAddressForFamily`] when the
/// lookup succeeds but yields nothing usable.
pub async fn resolve(destination: &str, preference: ProtocolPreference) -> Result<Resolved> {
    if let Ok(address) = destination.parse::<IpAddr>() {
        return Ok(Resolved {
            destination: destination.to_owned(),
            address,
            by_name: false,
        });
    }

    let candidates = tokio::net::lookup_host((destination, 0))
        .await
        .map_err(|source| Error::Resolution {
            destination: destination.to_owned(),
            source,
        })?;
    select_address(destination, candidates.map(|addr| addr.ip()), preference)
}

fn select_address(
    destination: &str,
    candidates: impl IntoIterator<Item = IpAddr>,
    preference: ProtocolPreference,
) -> Result<Resolved> {
    candidates
        .into_iter()
        .find(|address| preference.matches(address))
        .map(|address| Resolved {
            destination: destination.to_owned(),
            address,
            by_name: true,
        })
        .ok_or_else(|| Error::NoAddressForFamily {
            destination: destination.to_owned(),
            family: preference,
        })
}
