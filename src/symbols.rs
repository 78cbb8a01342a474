//! Trading symbol construction for NSE/BSE index options
//!
//! Option symbols follow the Groww charting convention:
//! `{INDEX}{YY}{M}{DD}{STRIKE}{CE|PE}` (weekly, month unpadded, day
//! zero-padded). When not hard-fetching, expiries outside the current
//! month fall back to the monthly form `{INDEX}{YY}{MON}{STRIKE}{CE|PE}`.
//! All parameter validation errors here are configuration errors: raised
//! synchronously, never retried.

use std::str::FromStr;

use chrono::{Datelike, Utc};
use chrono_tz::Asia::Kolkata;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("unsupported index: {0}")]
    UnsupportedIndex(String),
    #[error("unsupported index for CASH segment: {0}")]
    UnsupportedCashIndex(String),
    #[error("invalid month short form: {0}")]
    InvalidMonth(String),
    #[error("invalid option type: {0}")]
    InvalidOptionType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    Nse,
    Bse,
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exchange::Nse => write!(f, "NSE"),
            Exchange::Bse => write!(f, "BSE"),
        }
    }
}

/// Supported underlying indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexName {
    Nifty,
    BankNifty,
    FinNifty,
    Sensex,
}

impl IndexName {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexName::Nifty => "NIFTY",
            IndexName::BankNifty => "BANKNIFTY",
            IndexName::FinNifty => "FINNIFTY",
            IndexName::Sensex => "SENSEX",
        }
    }

    pub fn exchange(&self) -> Exchange {
        match self {
            IndexName::Sensex => Exchange::Bse,
            _ => Exchange::Nse,
        }
    }

    /// Cash-segment instrument for the index itself. Groww quotes SENSEX
    /// under security id "1"; FINNIFTY has no cash-segment feed.
    pub fn cash_instrument(&self) -> Result<(String, Exchange), SymbolError> {
        match self {
            IndexName::Nifty => Ok(("NIFTY".to_string(), Exchange::Nse)),
            IndexName::BankNifty => Ok(("BANKNIFTY".to_string(), Exchange::Nse)),
            IndexName::Sensex => Ok(("1".to_string(), Exchange::Bse)),
            IndexName::FinNifty => Err(SymbolError::UnsupportedCashIndex(
                self.as_str().to_string(),
            )),
        }
    }
}

impl FromStr for IndexName {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NIFTY" => Ok(IndexName::Nifty),
            "BANKNIFTY" => Ok(IndexName::BankNifty),
            "FINNIFTY" => Ok(IndexName::FinNifty),
            "SENSEX" => Ok(IndexName::Sensex),
            other => Err(SymbolError::UnsupportedIndex(other.to_string())),
        }
    }
}

impl std::fmt::Display for IndexName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Ce,
    Pe,
}

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Ce => "CE",
            OptionType::Pe => "PE",
        }
    }
}

impl FromStr for OptionType {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CE" => Ok(OptionType::Ce),
            "PE" => Ok(OptionType::Pe),
            other => Err(SymbolError::InvalidOptionType(other.to_string())),
        }
    }
}

/// Parse a month short form ("JAN".."DEC", case-insensitive) to 1..=12.
pub fn month_number(month_short: &str) -> Result<u32, SymbolError> {
    const MONTHS: [&str; 12] = [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];
    let upper = month_short.trim().to_uppercase();
    MONTHS
        .iter()
        .position(|m| *m == upper)
        .map(|i| i as u32 + 1)
        .ok_or_else(|| SymbolError::InvalidMonth(month_short.to_string()))
}

/// Build an option trading symbol and its exchange.
///
/// `hard_fetch` always uses the weekly numeric form; otherwise expiries
/// outside the current IST month use the monthly short-name form.
pub fn build_option_symbol(
    index: IndexName,
    year: &str,
    month: &str,
    expiry_day: &str,
    strike: &str,
    option_type: OptionType,
    hard_fetch: bool,
) -> Result<(String, Exchange), SymbolError> {
    let now = Utc::now().with_timezone(&Kolkata);
    build_option_symbol_at(
        index,
        year,
        month,
        expiry_day,
        strike,
        option_type,
        hard_fetch,
        now.year() as u32 % 100,
        now.month(),
    )
}

#[allow(clippy::too_many_arguments)]
fn build_option_symbol_at(
    index: IndexName,
    year: &str,
    month: &str,
    expiry_day: &str,
    strike: &str,
    option_type: OptionType,
    hard_fetch: bool,
    current_year_short: u32,
    current_month: u32,
) -> Result<(String, Exchange), SymbolError> {
    let month_upper = month.trim().to_uppercase();
    let month_num = month_number(&month_upper)?;

    let year = year.trim();
    let year_short = if year.len() > 2 { &year[year.len() - 2..] } else { year };
    let day = format!("{:0>2}", expiry_day.trim());
    let strike = strike.trim();

    let is_current = year_short.parse::<u32>() == Ok(current_year_short)
        && month_num == current_month;

    let symbol = if hard_fetch || is_current {
        format!(
            "{}{}{}{}{}{}",
            index.as_str(),
            year_short,
            month_num,
            day,
            strike,
            option_type.as_str()
        )
    } else {
        format!(
            "{}{}{}{}{}",
            index.as_str(),
            year_short,
            month_upper,
            strike,
            option_type.as_str()
        )
    };

    Ok((symbol, index.exchange()))
}
