//! Human-readable document numbers: `<PREFIX>-<YEAR>-<MONTH>-<sequence>`.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Default zero-padding of the sequence part (`QUO-2025-03-0007`).
pub const DEFAULT_SEQUENCE_WIDTH: u8 = 4;

/// Kind of numbered document; determines the prefix.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Quotation,
    Sale,
    Transfer,
    Receiving,
    PurchaseOrder,
}

impl DocumentKind {
    pub fn prefix(self) -> &'static str {
        match self {
            DocumentKind::Quotation => "QUO",
            DocumentKind::Sale => "SAL",
            DocumentKind::Transfer => "TRF",
            DocumentKind::Receiving => "RCV",
            DocumentKind::PurchaseOrder => "PO",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "QUO" => Some(DocumentKind::Quotation),
            "SAL" => Some(DocumentKind::Sale),
            "TRF" => Some(DocumentKind::Transfer),
            "RCV" => Some(DocumentKind::Receiving),
            "PO" => Some(DocumentKind::PurchaseOrder),
            _ => None,
        }
    }
}

/// Numbering period: sequences restart every year+month.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, DomainError> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation(format!("month out of range: {month}")));
        }
        Ok(Self { year, month })
    }

    pub fn of(at: chrono::DateTime<chrono::Utc>) -> Self {
        use chrono::Datelike;
        Self {
            year: at.year(),
            month: at.month(),
        }
    }
}

/// A rendered document number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentNumber {
    kind: DocumentKind,
    period: Period,
    sequence: u32,
    width: u8,
}

impl DocumentNumber {
    pub fn new(kind: DocumentKind, period: Period, sequence: u32, width: u8) -> Self {
        Self {
            kind,
            period,
            sequence,
            width,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}-{:04}-{:02}-{:0width$}",
            self.kind.prefix(),
            self.period.year,
            self.period.month,
            self.sequence,
            width = self.width as usize
        )
    }
}

impl FromStr for DocumentNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || DomainError::invalid_id(format!("DocumentNumber: '{s}'"));

        let mut parts = s.split('-');
        let (Some(prefix), Some(year), Some(month), Some(seq), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(bad());
        };

        let kind = DocumentKind::from_prefix(prefix).ok_or_else(bad)?;
        let year: i32 = year.parse().map_err(|_| bad())?;
        let month: u32 = month.parse().map_err(|_| bad())?;
        let sequence: u32 = seq.parse().map_err(|_| bad())?;
        let width = u8::try_from(seq.len()).map_err(|_| bad())?;
        let period = Period::new(year, month).map_err(|_| bad())?;

        Ok(Self::new(kind, period, sequence, width))
    }
}

impl TryFrom<String> for DocumentNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocumentNumber> for String {
    fn from(value: DocumentNumber) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_prefix_period_and_padded_sequence() {
        let n = DocumentNumber::new(
            DocumentKind::Quotation,
            Period::new(2025, 3).unwrap(),
            7,
            DEFAULT_SEQUENCE_WIDTH,
        );
        assert_eq!(n.to_string(), "QUO-2025-03-0007");
    }

    #[test]
    fn parses_what_it_renders() {
        let n: DocumentNumber = "TRF-2024-11-0123".parse().unwrap();
        assert_eq!(n.kind(), DocumentKind::Transfer);
        assert_eq!(n.period(), Period::new(2024, 11).unwrap());
        assert_eq!(n.sequence(), 123);
        assert_eq!(n.to_string(), "TRF-2024-11-0123");
    }

    #[test]
    fn rejects_unknown_prefix_and_bad_month() {
        assert!("XYZ-2024-11-0001".parse::<DocumentNumber>().is_err());
        assert!("QUO-2024-13-0001".parse::<DocumentNumber>().is_err());
        assert!("QUO-2024-11".parse::<DocumentNumber>().is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let n: DocumentNumber = "SAL-2025-01-0042".parse().unwrap();
        let json = serde_json::to_string(&n).unwrap();
        assert_eq!(json, "\"SAL-2025-01-0042\"");
    }
}
