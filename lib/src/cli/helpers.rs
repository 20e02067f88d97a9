// Copyright (c) 2022-2023 The MobileCoin Foundation

use fpsensor::engine::Purpose;

/// Fixed length hex-encoded argument
#[derive(Clone, PartialEq, Debug)]
pub struct HexData<const N: usize = 16>(pub [u8; N]);

impl<const N: usize> std::str::FromStr for HexData<N> {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut b = [0u8; N];

        hex::decode_to_slice(s, &mut b)?;

        Ok(HexData(b))
    }
}

impl<const N: usize> AsRef<[u8; N]> for HexData<N> {
    fn as_ref(&self) -> &[u8; N] {
        &self.0
    }
}

/// Variable length hex-encoded argument
#[derive(Clone, PartialEq, Debug, Default)]
pub struct HexBytes(pub Vec<u8>);

impl std::str::FromStr for HexBytes {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s).map(HexBytes)
    }
}

/// Recognition purpose argument
#[derive(Copy, Clone, PartialEq, Debug, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum PurposeKind {
    /// Device unlock
    Unlock,
    /// Confirm enabling fingerprint signing for a wallet
    EnableSign,
    /// Transaction signing
    Sign,
}

impl PurposeKind {
    /// Build a [Purpose] for the provided wallet
    pub fn purpose(&self, wallet: u8) -> Purpose {
        match self {
            PurposeKind::Unlock => Purpose::Unlock,
            PurposeKind::EnableSign => Purpose::EnableSign { wallet },
            PurposeKind::Sign => Purpose::Sign { wallet },
        }
    }
}

/// Format a firmware version for display
pub fn version_string(v: &[u8; 4]) -> String {
    format!("{}.{}.{}.{}", v[0], v[1], v[2], v[3])
}
