//! Binarization of syntax-element values into bin strings.
//!
//! All schemes are stateless and prefix-free given their parameters, so the
//! decoder can rebuild a value bin by bin with [`read_value`] without knowing
//! its length in advance.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{CabacError, Result};

/// Longest unary run any scheme will produce or accept.
pub const MAX_PREFIX_BINS: u64 = 1 << 16;

/// Largest supported Exp-Golomb order.
pub const MAX_EXP_GOLOMB_ORDER: u32 = 32;

/// Largest supported fixed-length width.
pub const MAX_FIXED_LENGTH: u32 = 64;

/// Binarization scheme with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scheme {
    /// `n` ones followed by a zero.
    Unary,
    /// `min(n, cutoff)` ones, zero-terminated only below the cutoff.
    TruncatedUnary {
        /// Largest codable value.
        cutoff: u32,
    },
    /// Unary prefix of `(n >> order) + 1` ones, a zero, then the low
    /// `order` bits of `n`.
    ExpGolomb {
        /// Suffix width `k`.
        order: u32,
        /// Fold signed values onto the non-negative integers first.
        #[serde(default)]
        signed: bool,
    },
    /// Exactly `length` bits, most significant first.
    FixedLength {
        /// Number of bins.
        length: u32,
    },
}

impl Scheme {
    /// Short name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unary => "unary",
            Self::TruncatedUnary { .. } => "truncated_unary",
            Self::ExpGolomb { signed: false, .. } => "exp_golomb",
            Self::ExpGolomb { signed: true, .. } => "signed_exp_golomb",
            Self::FixedLength { .. } => "fixed_length",
        }
    }

    /// Whether the scheme accepts negative values.
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::ExpGolomb { signed: true, .. })
    }

    /// Check the scheme parameters.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::TruncatedUnary { cutoff } if cutoff as u64 > MAX_PREFIX_BINS => {
                Err(CabacError::InvalidScheme(format!(
                    "truncated unary cutoff {cutoff} exceeds {MAX_PREFIX_BINS}"
                )))
            }
            Self::ExpGolomb { order, .. } if order > MAX_EXP_GOLOMB_ORDER => {
                Err(CabacError::InvalidScheme(format!(
                    "exp-golomb order {order} exceeds {MAX_EXP_GOLOMB_ORDER}"
                )))
            }
            Self::FixedLength { length } if length > MAX_FIXED_LENGTH => {
                Err(CabacError::InvalidScheme(format!(
                    "fixed length {length} exceeds {MAX_FIXED_LENGTH}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Validate a raw bin value.
pub fn parse_bin(value: u8) -> Result<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CabacError::InvalidBin(other)),
    }
}

/// Map a signed value onto the non-negative integers: `2|n| - (n < 0)`.
pub fn fold_signed(value: i64) -> Result<u64> {
    value
        .unsigned_abs()
        .checked_mul(2)
        .map(|u| if value < 0 { u - 1 } else { u })
        .ok_or_else(|| CabacError::ValueOutOfRange {
            value,
            scheme: "signed_exp_golomb",
            reason: "magnitude too large to fold".into(),
        })
}

/// Inverse of [`fold_signed`].
pub fn unfold_signed(folded: u64) -> i64 {
    let half = (folded / 2) as i64;
    if folded & 1 == 1 {
        -half - 1
    } else {
        half
    }
}

fn non_negative(value: i64, scheme: &Scheme) -> Result<u64> {
    if value < 0 {
        return Err(CabacError::NegativeValue {
            value,
            scheme: scheme.name(),
        });
    }
    Ok(value as u64)
}

/// Turn a value into its bin string.
pub fn binarize(value: i64, scheme: &Scheme) -> Result<Vec<bool>> {
    scheme.validate()?;

    match *scheme {
        Scheme::Unary => {
            let n = non_negative(value, scheme)?;
            if n > MAX_PREFIX_BINS {
                return Err(CabacError::ValueOutOfRange {
                    value,
                    scheme: scheme.name(),
                    reason: format!("unary length exceeds {MAX_PREFIX_BINS} bins"),
                });
            }
            let mut bins = vec![true; n as usize];
            bins.push(false);
            Ok(bins)
        }
        Scheme::TruncatedUnary { cutoff } => {
            let n = non_negative(value, scheme)?;
            if n > cutoff as u64 {
                return Err(CabacError::ValueOutOfRange {
                    value,
                    scheme: scheme.name(),
                    reason: format!("exceeds cutoff {cutoff}"),
                });
            }
            let mut bins = vec![true; n as usize];
            if n < cutoff as u64 {
                bins.push(false);
            }
            Ok(bins)
        }
        Scheme::ExpGolomb { order, signed } => {
            let n = if signed {
                fold_signed(value)?
            } else {
                non_negative(value, scheme)?
            };
            let prefix_len = (n >> order) + 1;
            if prefix_len > MAX_PREFIX_BINS {
                return Err(CabacError::ValueOutOfRange {
                    value,
                    scheme: scheme.name(),
                    reason: format!("prefix exceeds {MAX_PREFIX_BINS} bins"),
                });
            }
            let mut bins = Vec::with_capacity(prefix_len as usize + 1 + order as usize);
            bins.resize(prefix_len as usize, true);
            bins.push(false);
            bins.extend((0..order).rev().map(|i| (n >> i) & 1 != 0));
            Ok(bins)
        }
        Scheme::FixedLength { length } => {
            let n = non_negative(value, scheme)?;
            if length < 64 && n >> length != 0 {
                return Err(CabacError::ValueOutOfRange {
                    value,
                    scheme: scheme.name(),
                    reason: format!("does not fit in {length} bits"),
                });
            }
            Ok((0..length).rev().map(|i| (n >> i) & 1 != 0).collect())
        }
    }
}

/// Rebuild a value by pulling bins one at a time.
///
/// `next` receives the index of the requested bin within the value's bin
/// string; reading stops exactly at the end of the scheme's codeword.
pub fn read_value<F>(scheme: &Scheme, mut next: F) -> Result<i64>
where
    F: FnMut(usize) -> Result<bool>,
{
    scheme.validate()?;
    let malformed = |reason: &str| CabacError::MalformedBins {
        scheme: scheme.name(),
        reason: reason.to_string(),
    };

    match *scheme {
        Scheme::Unary => {
            let mut n = 0u64;
            while next(n as usize)? {
                n += 1;
                if n > MAX_PREFIX_BINS {
                    return Err(malformed("unary run too long"));
                }
            }
            Ok(n as i64)
        }
        Scheme::TruncatedUnary { cutoff } => {
            let mut n = 0u32;
            while n < cutoff && next(n as usize)? {
                n += 1;
            }
            Ok(n as i64)
        }
        Scheme::ExpGolomb { order, signed } => {
            let mut ones = 0u64;
            while next(ones as usize)? {
                ones += 1;
                if ones > MAX_PREFIX_BINS {
                    return Err(malformed("prefix too long"));
                }
            }
            if ones == 0 {
                return Err(malformed("prefix must contain at least one 1"));
            }
            let base = ones as usize + 1;
            let mut suffix = 0u64;
            for i in 0..order as usize {
                suffix = (suffix << 1) | next(base + i)? as u64;
            }
            let n = ((ones - 1) << order) | suffix;
            if signed {
                Ok(unfold_signed(n))
            } else {
                i64::try_from(n).map_err(|_| malformed("value exceeds i64"))
            }
        }
        Scheme::FixedLength { length } => {
            let mut n = 0u64;
            for i in 0..length as usize {
                n = (n << 1) | next(i)? as u64;
            }
            i64::try_from(n).map_err(|_| malformed("value exceeds i64"))
        }
    }
}

/// Inverse of [`binarize`]; the bins must form exactly one codeword.
pub fn debinarize(bins: &[bool], scheme: &Scheme) -> Result<i64> {
    let mut consumed = 0;
    let value = read_value(scheme, |i| {
        consumed = consumed.max(i + 1);
        bins.get(i).copied().ok_or_else(|| CabacError::MalformedBins {
            scheme: scheme.name(),
            reason: format!("truncated after {} bins", bins.len()),
        })
    })?;

    if consumed != bins.len() {
        return Err(CabacError::MalformedBins {
            scheme: scheme.name(),
            reason: format!("{} trailing bins", bins.len() - consumed),
        });
    }
    Ok(value)
}

/// Render bins as a `0`/`1` string.
pub fn bins_to_string(bins: &[bool]) -> String {
    let mut out = String::with_capacity(bins.len());
    for &b in bins {
        let _ = write!(out, "{}", b as u8);
    }
    out
}

/// Parse a `0`/`1` string, ignoring whitespace.
pub fn bins_from_str(text: &str) -> Result<Vec<bool>> {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '0' => Ok(false),
            '1' => Ok(true),
            other => Err(CabacError::InvalidBin(u8::try_from(other).unwrap_or(u8::MAX))),
        })
        .collect()
}
