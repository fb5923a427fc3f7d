//! Bluetooth device address of a Radiation Alert counter.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A 6-byte Bluetooth device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BluetoothAddress(pub [u8; 6]);

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseAddressError {
    #[error("invalid device address '{0}': expected six hex octets")]
    Malformed(String),
    #[error("invalid device address: '{0}' is not a hex octet")]
    InvalidOctet(String),
}

impl FromStr for BluetoothAddress {
    type Err = ParseAddressError;

    /// Accepts `AA:BB:CC:DD:EE:FF` or `AA-BB-CC-DD-EE-FF`, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let octets: Vec<&str> = s.split([':', '-']).collect();
        if octets.len() != 6 {
            return Err(ParseAddressError::Malformed(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (byte, octet) in bytes.iter_mut().zip(&octets) {
            if octet.len() != 2 {
                return Err(ParseAddressError::InvalidOctet(octet.to_string()));
            }
            *byte = u8::from_str_radix(octet, 16)
                .map_err(|_| ParseAddressError::InvalidOctet(octet.to_string()))?;
        }

        Ok(BluetoothAddress(bytes))
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for BluetoothAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(feature = "bluer")]
impl From<BluetoothAddress> for bluer::Address {
    fn from(addr: BluetoothAddress) -> Self {
        bluer::Address(addr.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let addr: BluetoothAddress = "d4:9c:dd:01:02:a3".parse().unwrap();
        assert_eq!(addr.0, [0xD4, 0x9C, 0xDD, 0x01, 0x02, 0xA3]);
        assert_eq!(addr.to_string(), "D4:9C:DD:01:02:A3");
    }

    #[test]
    fn test_parse_dash_separated() {
        let addr: BluetoothAddress = "00-1E-C0-4A-2B-11".parse().unwrap();
        assert_eq!(addr.to_string(), "00:1E:C0:4A:2B:11");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(
            "00:11:22".parse::<BluetoothAddress>(),
            Err(ParseAddressError::Malformed("00:11:22".into()))
        );
        assert_eq!(
            "00:11:22:33:44:5".parse::<BluetoothAddress>(),
            Err(ParseAddressError::InvalidOctet("5".into()))
        );
        assert_eq!(
            "00:11:22:33:44:ZZ".parse::<BluetoothAddress>(),
            Err(ParseAddressError::InvalidOctet("ZZ".into()))
        );
    }

    #[cfg(feature = "bluer")]
    #[test]
    fn test_bluer_round_trip() {
        let addr = BluetoothAddress([1, 2, 3, 4, 5, 6]);
        let bluer_addr: bluer::Address = addr.into();
        assert_eq!(BluetoothAddress::from(bluer_addr), addr);
    }
}
