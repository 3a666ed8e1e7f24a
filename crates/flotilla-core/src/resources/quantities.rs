use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Errors raised while parsing resource quantities
#[derive(Debug, thiserror::Error)]
pub enum QuantityError {
    #[error("Invalid quantity format: {0}")]
    InvalidFormat(String),

    #[error("Quantity overflows the representable range: {0}")]
    Overflow(String),

    #[error("Quantity must not be negative: {0}")]
    Negative(String),
}

/// A rational resource amount following Kubernetes quantity conventions.
///
/// Stored as integer milli-units so that scheduling accounting stays exact:
/// `100m` CPU is 100, `2` CPU is 2000, `1Gi` memory is 2^30 * 1000.
/// Converted to `f64` only for scheduling arithmetic.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity {
    millis: i64,
}

impl Quantity {
    /// Zero of any resource
    pub const ZERO: Quantity = Quantity { millis: 0 };

    /// Create a quantity from raw milli-units
    pub fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    /// Create a quantity from whole units (e.g. cores, bytes)
    pub fn from_units(units: i64) -> Self {
        Self {
            millis: units * 1000,
        }
    }

    /// Parse a Kubernetes quantity string.
    ///
    /// Accepts the milli suffix (`100m`), plain integers and decimals
    /// (`2`, `0.5`), and binary suffixes (`1Ki`, `128Mi`, `1Gi`, `2Ti`).
    pub fn parse(s: &str) -> Result<Self, QuantityError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(QuantityError::InvalidFormat(s.to_string()));
        }

        if let Some(m) = s.strip_suffix('m') {
            let millis = m
                .parse::<i64>()
                .map_err(|_| QuantityError::InvalidFormat(s.to_string()))?;
            if millis < 0 {
                return Err(QuantityError::Negative(s.to_string()));
            }
            return Ok(Self { millis });
        }

        for (suffix, scale) in [
            ("Ki", 1i128 << 10),
            ("Mi", 1i128 << 20),
            ("Gi", 1i128 << 30),
            ("Ti", 1i128 << 40),
        ] {
            if let Some(num) = s.strip_suffix(suffix) {
                let units = num
                    .parse::<i64>()
                    .map_err(|_| QuantityError::InvalidFormat(s.to_string()))?;
                if units < 0 {
                    return Err(QuantityError::Negative(s.to_string()));
                }
                let millis = i128::from(units) * scale * 1000;
                return i64::try_from(millis)
                    .map(|millis| Self { millis })
                    .map_err(|_| QuantityError::Overflow(s.to_string()));
            }
        }

        // Plain cores / bytes, possibly fractional
        let units = s
            .parse::<f64>()
            .map_err(|_| QuantityError::InvalidFormat(s.to_string()))?;
        if !units.is_finite() {
            return Err(QuantityError::InvalidFormat(s.to_string()));
        }
        if units < 0.0 {
            return Err(QuantityError::Negative(s.to_string()));
        }
        let millis = units * 1000.0;
        if millis > i64::MAX as f64 {
            return Err(QuantityError::Overflow(s.to_string()));
        }
        Ok(Self {
            millis: millis.round() as i64,
        })
    }

    /// Raw milli-units
    pub fn millis(&self) -> i64 {
        self.millis
    }

    /// Floating-point form for scheduling arithmetic
    pub fn as_f64(&self) -> f64 {
        self.millis as f64 / 1000.0
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }

    /// Subtraction floored at zero
    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        Quantity {
            millis: (self.millis - other.millis).max(0),
        }
    }

    pub fn max(self, other: Quantity) -> Quantity {
        Quantity {
            millis: self.millis.max(other.millis),
        }
    }

    pub fn min(self, other: Quantity) -> Quantity {
        Quantity {
            millis: self.millis.min(other.millis),
        }
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, other: Quantity) -> Quantity {
        Quantity {
            millis: self.millis.saturating_add(other.millis),
        }
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, other: Quantity) {
        self.millis = self.millis.saturating_add(other.millis);
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis % 1000 == 0 {
            write!(f, "{}", self.millis / 1000)
        } else {
            write!(f, "{}m", self.millis)
        }
    }
}

impl TryFrom<String> for Quantity {
    type Error = QuantityError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Quantity::parse(&s)
    }
}

impl From<Quantity> for String {
    fn from(q: Quantity) -> String {
        q.to_string()
    }
}
