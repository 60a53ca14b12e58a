//! Core identity types for equity reference data.
//!
//! This module defines the fundamental identity structures:
//!
//! - [`Symbol`] - Trading symbol with security type and market
//! - [`SecurityId`] - Stable permanent identifier, independent of the ticker
//! - [`SecurityType`] - Asset class of a symbol
//! - [`Market`] - Market a symbol trades on
//! - [`Exchange`] - Primary exchange with its short code

use serde::{Deserialize, Serialize};
use std::fmt;

/// Asset class of a security.
///
/// Only [`SecurityType::Equity`] is serviced by the reference-data engines;
/// other types yield no artifact (not an error).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityType {
    /// Common stock.
    #[default]
    Equity,
    /// Listed option.
    Option,
    /// Futures contract.
    Future,
    /// Crypto pair.
    Crypto,
}

/// Market a security trades on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    /// United States equity market.
    #[default]
    Usa,
    /// Any other market.
    Other,
}

impl Market {
    /// Returns the primary exchange assumed for symbols on this market.
    #[must_use]
    pub const fn primary_exchange(&self) -> Exchange {
        match self {
            Self::Usa => Exchange::Nasdaq,
            Self::Other => Exchange::Unknown,
        }
    }
}

/// Primary exchange of a security.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    /// NASDAQ stock market.
    Nasdaq,
    /// Exchange is not known.
    #[default]
    Unknown,
}

impl Exchange {
    /// Returns the short code used in on-disk map files.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Nasdaq => "Q",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parses an exchange from its short code. Unknown codes map to
    /// [`Exchange::Unknown`].
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "Q" => Self::Nasdaq,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A stable permanent identifier for a security.
///
/// Opaque to this library: engines only compare and sort its string form.
/// Remains constant through ticker renames.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecurityId(String);

impl SecurityId {
    /// Creates a new identifier from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecurityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SecurityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A trading symbol: ticker plus security type and market.
///
/// Tickers are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    ticker: String,
    security_type: SecurityType,
    market: Market,
}

impl Symbol {
    /// Creates a new symbol, converting the ticker to uppercase.
    #[must_use]
    pub fn new(ticker: impl Into<String>, security_type: SecurityType, market: Market) -> Self {
        Self {
            ticker: ticker.into().to_uppercase(),
            security_type,
            market,
        }
    }

    /// Creates a US equity symbol.
    #[must_use]
    pub fn equity(ticker: impl Into<String>) -> Self {
        Self::new(ticker, SecurityType::Equity, Market::Usa)
    }

    /// Returns the uppercase ticker.
    #[must_use]
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Returns the security type.
    #[must_use]
    pub const fn security_type(&self) -> SecurityType {
        self.security_type
    }

    /// Returns the market.
    #[must_use]
    pub const fn market(&self) -> Market {
        self.market
    }

    /// Returns true for equity symbols, the only type the engines service.
    #[must_use]
    pub fn is_equity(&self) -> bool {
        self.security_type == SecurityType::Equity
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ticker)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::equity(s)
    }
}
