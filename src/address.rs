//! Selection of the address used to reach a machine over SSH.

use thiserror::Error;

use crate::machine::AddressPolicy;
use crate::model::NetworkInterface;

/// Errors raised while deriving or selecting an address.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AddressError {
    /// The instance reports no network interfaces at all.
    #[error("instance has no network interfaces")]
    NoNetworkInterfaces,
    /// No interface carries an internal IPv4 address. Every attached
    /// interface must have one, so this indicates a provider inconsistency.
    #[error("no interface reports an internal IPv4 address; the instance description is inconsistent")]
    MissingInternalAddress,
    /// IPv6 was requested but none is assigned.
    #[error("instance has no IPv6 address")]
    NoIPv6Address,
    /// The internal address was requested but none is assigned.
    #[error("instance has no internal IPv4 address")]
    NoInternalAddress,
    /// The external address was requested but no NAT address is assigned.
    #[error("instance has no external IPv4 address; enable NAT or use the internal address")]
    NoExternalAddress,
}

/// Addresses reported for an instance, derived on demand.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceAddresses {
    /// First internal IPv4 address.
    pub internal_v4: Option<String>,
    /// One-to-one NAT IPv4 address of the first interface carrying one.
    pub external_v4: Option<String>,
    /// First primary IPv6 address.
    pub ipv6: Option<String>,
}

impl InstanceAddresses {
    /// Scans the interfaces in order, stopping once all three addresses are
    /// known.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::NoNetworkInterfaces`] for an empty list and
    /// [`AddressError::MissingInternalAddress`] when no interface carries an
    /// internal IPv4 address.
    pub fn from_interfaces(interfaces: &[NetworkInterface]) -> Result<Self, AddressError> {
        if interfaces.is_empty() {
            return Err(AddressError::NoNetworkInterfaces);
        }

        let mut found = Self::default();
        for interface in interfaces {
            if let Some(v4) = interface.primary_v4_address.as_ref() {
                if found.internal_v4.is_none() && !v4.address.is_empty() {
                    found.internal_v4 = Some(v4.address.clone());
                }
                if found.external_v4.is_none()
                    && let Some(nat) = v4.one_to_one_nat.as_ref()
                    && !nat.address.is_empty()
                {
                    found.external_v4 = Some(nat.address.clone());
                }
            }
            if found.ipv6.is_none()
                && let Some(v6) = interface.primary_v6_address.as_ref()
                && !v6.address.is_empty()
            {
                found.ipv6 = Some(v6.address.clone());
            }
            if found.is_complete() {
                break;
            }
        }

        if found.internal_v4.is_none() {
            return Err(AddressError::MissingInternalAddress);
        }
        Ok(found)
    }

    const fn is_complete(&self) -> bool {
        self.internal_v4.is_some() && self.external_v4.is_some() && self.ipv6.is_some()
    }

    /// Returns the address dictated by `policy`; IPv6 addresses are wrapped
    /// in brackets so they can be joined with a port.
    ///
    /// # Errors
    ///
    /// Returns the policy specific "no address" error when the requested
    /// address is absent.
    pub fn select(&self, policy: AddressPolicy) -> Result<String, AddressError> {
        match policy {
            AddressPolicy::Ipv6 => self
                .ipv6
                .as_ref()
                .map(|address| format!("[{address}]"))
                .ok_or(AddressError::NoIPv6Address),
            AddressPolicy::Internal => self
                .internal_v4
                .clone()
                .ok_or(AddressError::NoInternalAddress),
            AddressPolicy::External => self
                .external_v4
                .clone()
                .ok_or(AddressError::NoExternalAddress),
        }
    }
}

/// Derives the addresses of `interfaces` and selects one by `policy`.
///
/// # Errors
///
/// Returns [`AddressError`] when derivation or selection fails.
pub fn resolve_address(
    policy: AddressPolicy,
    interfaces: &[NetworkInterface],
) -> Result<String, AddressError> {
    InstanceAddresses::from_interfaces(interfaces)?.select(policy)
}
