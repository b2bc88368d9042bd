//! Address families and CIDR prefixes.
//!
//! Prefix bits are kept left-aligned in a `u128` for both families, so bit
//! `i` of any prefix (counting from the most significant bit) is found in the
//! same place whether the prefix is IPv4 or IPv6.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// The address family of a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Number of bits in an address of this family.
    #[inline]
    pub const fn max_bits(self) -> u8 {
        match self {
            AddressFamily::V4 => 32,
            AddressFamily::V6 => 128,
        }
    }

    /// Prefix length of the unit addresses are counted in.
    ///
    /// IPv6 is counted in /64s.
    #[inline]
    pub const fn weight_bits(self) -> u8 {
        match self {
            AddressFamily::V4 => 32,
            AddressFamily::V6 => 64,
        }
    }

    /// Deepest prefix length the range lookup splits a query down to.
    #[inline]
    pub const fn descend_limit(self) -> u8 {
        match self {
            AddressFamily::V4 => 32,
            AddressFamily::V6 => 72,
        }
    }

    /// Number of bytes in an address of this family.
    #[inline]
    pub const fn addr_len(self) -> usize {
        match self {
            AddressFamily::V4 => 4,
            AddressFamily::V6 => 16,
        }
    }

    /// Address count of a span of `len` bits, in this family's counting unit.
    ///
    /// Spans longer than the counting unit weigh nothing, and a full IPv6
    /// span saturates at `u64::MAX`.
    #[inline]
    pub fn span_weight(self, len: u8) -> u64 {
        let unit = self.weight_bits();
        if len > unit {
            0
        } else {
            1u64.checked_shl(u32::from(unit - len)).unwrap_or(u64::MAX)
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// A CIDR prefix: family, base address and mask length.
///
/// Host bits beyond `len` are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix {
    family: AddressFamily,
    bits: u128,
    len: u8,
}

/// Keep the first `len` bits of a left-aligned key.
#[inline]
pub(crate) fn mask_bits(bits: u128, len: u8) -> u128 {
    if len == 0 {
        0
    } else {
        bits & (u128::MAX << (128 - u32::from(len)))
    }
}

/// Bit `i` of a left-aligned key, counting from the most significant bit.
#[inline]
pub(crate) fn bit_at(bits: u128, i: u8) -> usize {
    ((bits >> (127 - u32::from(i))) & 1) as usize
}

impl Prefix {
    /// Build a prefix from raw network-order address bytes.
    pub fn new(family: AddressFamily, addr: &[u8], len: u8) -> Result<Prefix> {
        match family {
            AddressFamily::V4 => {
                let octets: [u8; 4] = addr.try_into().map_err(|_| {
                    Error::invalid_prefix(format!("IPv4 address needs 4 bytes, got {}", addr.len()))
                })?;
                Prefix::from_v4(Ipv4Addr::from(octets), len)
            }
            AddressFamily::V6 => {
                let octets: [u8; 16] = addr.try_into().map_err(|_| {
                    Error::invalid_prefix(format!(
                        "IPv6 address needs 16 bytes, got {}",
                        addr.len()
                    ))
                })?;
                Prefix::from_v6(Ipv6Addr::from(octets), len)
            }
        }
    }

    /// Build a prefix from an IP address and a mask length.
    pub fn from_ip(addr: IpAddr, len: u8) -> Result<Prefix> {
        match addr {
            IpAddr::V4(v4) => Prefix::from_v4(v4, len),
            IpAddr::V6(v6) => Prefix::from_v6(v6, len),
        }
    }

    pub fn from_v4(addr: Ipv4Addr, len: u8) -> Result<Prefix> {
        Prefix::from_bits(AddressFamily::V4, u128::from(u32::from(addr)) << 96, len)
    }

    pub fn from_v6(addr: Ipv6Addr, len: u8) -> Result<Prefix> {
        Prefix::from_bits(AddressFamily::V6, u128::from(addr), len)
    }

    /// The full-length prefix covering a single address.
    pub fn host(addr: IpAddr) -> Prefix {
        let (family, bits) = match addr {
            IpAddr::V4(v4) => (AddressFamily::V4, u128::from(u32::from(v4)) << 96),
            IpAddr::V6(v6) => (AddressFamily::V6, u128::from(v6)),
        };
        Prefix {
            family,
            bits,
            len: family.max_bits(),
        }
    }

    fn from_bits(family: AddressFamily, bits: u128, len: u8) -> Result<Prefix> {
        if len > family.max_bits() {
            return Err(Error::invalid_prefix(format!(
                "{} mask length {} exceeds {}",
                family,
                len,
                family.max_bits()
            )));
        }
        Ok(Prefix {
            family,
            bits: mask_bits(bits, len),
            len,
        })
    }

    #[inline]
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Mask length.
    #[inline]
    pub fn len(&self) -> u8 {
        self.len
    }

    /// Left-aligned key bits.
    #[inline]
    pub fn bits(&self) -> u128 {
        self.bits
    }

    /// The base address of the prefix.
    pub fn addr(&self) -> IpAddr {
        match self.family {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::from((self.bits >> 96) as u32)),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::from(self.bits)),
        }
    }

    /// First and last IPv4 address of the prefix as integers.
    ///
    /// Returns `None` for IPv6 prefixes.
    pub fn v4_range(&self) -> Option<(u32, u32)> {
        match self.family {
            AddressFamily::V4 => {
                let start = (self.bits >> 96) as u32;
                let host_bits = 32 - u32::from(self.len);
                let end = if host_bits == 32 {
                    u32::MAX
                } else {
                    start | ((1u32 << host_bits) - 1)
                };
                Some((start, end))
            }
            AddressFamily::V6 => None,
        }
    }

    /// Number of addresses the prefix covers, saturating at `u64::MAX`.
    pub fn host_count(&self) -> u64 {
        let host_bits = u32::from(self.family.max_bits() - self.len);
        if host_bits >= 64 {
            u64::MAX
        } else {
            1u64 << host_bits
        }
    }

    /// One of the two prefixes one bit longer than this one.
    ///
    /// `half` selects the value of the new bit. Returns `None` at full length.
    pub fn child(&self, half: usize) -> Option<Prefix> {
        if self.len >= self.family.max_bits() {
            return None;
        }
        let bit = (half as u128 & 1) << (127 - u32::from(self.len));
        Some(Prefix {
            family: self.family,
            bits: self.bits | bit,
            len: self.len + 1,
        })
    }

    /// True if `other` lies entirely inside this prefix.
    pub fn contains(&self, other: &Prefix) -> bool {
        self.family == other.family
            && self.len <= other.len
            && mask_bits(other.bits, self.len) == self.bits
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr(), self.len)
    }
}

impl FromStr for Prefix {
    type Err = Error;

    /// Parse `addr` or `addr/len`. A bare address is a full-length prefix.
    fn from_str(s: &str) -> Result<Prefix> {
        let s = s.trim();
        let (addr, len) = match s.split_once('/') {
            Some((addr, len)) => (addr, Some(len)),
            None => (s, None),
        };
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| Error::invalid_prefix(format!("bad address in {s:?}")))?;
        match len {
            Some(len) => {
                let len: u8 = len
                    .parse()
                    .map_err(|_| Error::invalid_prefix(format!("bad mask length in {s:?}")))?;
                Prefix::from_ip(addr, len)
            }
            None => Ok(Prefix::host(addr)),
        }
    }
}
