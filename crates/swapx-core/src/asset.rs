use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SwapxError;
use crate::types::ChainId;

/// Asset identifier in canonical string form `<chain>:<subtype>[:<addr>]`.
///
/// Three shapes:
///   `ETH:NATIVE`          — the chain's native coin
///   `ETH:TOKEN:0xabc…`    — a known fungible token (operator-vetted policy)
///   `ETH:ERC20:0xabc…`    — an unknown token identified only by contract
///
/// The shape governs commission policy: known assets pay basis points of the
/// principal in kind; unknown tokens pay a fixed USD equivalent in the
/// chain's native coin.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    Native { chain: ChainId },
    Token { chain: ChainId, address: String },
    UnknownToken { chain: ChainId, address: String },
}

/// How commission is computed for one side of a deal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommissionPolicy {
    /// Basis points of the principal, paid in the traded asset.
    PrincipalBps,
    /// Fixed USD equivalent, paid in the chain's native coin.
    FixedUsdNative,
}

impl Asset {
    pub fn chain(&self) -> &ChainId {
        match self {
            Asset::Native { chain } => chain,
            Asset::Token { chain, .. } => chain,
            Asset::UnknownToken { chain, .. } => chain,
        }
    }

    /// Token contract address, if this is a token-shaped asset.
    pub fn token_address(&self) -> Option<&str> {
        match self {
            Asset::Native { .. } => None,
            Asset::Token { address, .. } => Some(address),
            Asset::UnknownToken { address, .. } => Some(address),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native { .. })
    }

    pub fn commission_policy(&self) -> CommissionPolicy {
        match self {
            Asset::Native { .. } | Asset::Token { .. } => CommissionPolicy::PrincipalBps,
            Asset::UnknownToken { .. } => CommissionPolicy::FixedUsdNative,
        }
    }

    /// The native coin of the same chain. Commission for unknown tokens is
    /// collected in this asset.
    pub fn native_of_same_chain(&self) -> Asset {
        Asset::Native { chain: self.chain().clone() }
    }

    /// Canonical string form.
    pub fn canonical(&self) -> String {
        match self {
            Asset::Native { chain } => format!("{chain}:NATIVE"),
            Asset::Token { chain, address } => format!("{chain}:TOKEN:{address}"),
            Asset::UnknownToken { chain, address } => format!("{chain}:ERC20:{address}"),
        }
    }

    /// Parse the canonical form. The chain tag is taken verbatim; token
    /// addresses are kept as written (shape validation is per-chain and
    /// happens in the plugin layer).
    pub fn parse(s: &str) -> Result<Self, SwapxError> {
        let mut parts = s.splitn(3, ':');
        let chain = parts
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SwapxError::MalformedAsset(s.to_string()))?;
        let subtype = parts
            .next()
            .ok_or_else(|| SwapxError::MalformedAsset(s.to_string()))?;
        let chain = ChainId::new(chain);

        match (subtype, parts.next()) {
            ("NATIVE", None) => Ok(Asset::Native { chain }),
            ("TOKEN", Some(addr)) if !addr.is_empty() => Ok(Asset::Token {
                chain,
                address: addr.to_string(),
            }),
            ("ERC20", Some(addr)) if !addr.is_empty() => Ok(Asset::UnknownToken {
                chain,
                address: addr.to_string(),
            }),
            _ => Err(SwapxError::MalformedAsset(s.to_string())),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Asset({})", self.canonical())
    }
}
