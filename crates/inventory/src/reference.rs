//! Human-readable document reference codes (`ISS-000001`).

use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult};

/// Documents that get a reference code from a per-prefix sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Purchase,
    Issue,
    Consumption,
    Disposal,
    Adjustment,
    Reconciliation,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 6] = [
        DocumentKind::Purchase,
        DocumentKind::Issue,
        DocumentKind::Consumption,
        DocumentKind::Disposal,
        DocumentKind::Adjustment,
        DocumentKind::Reconciliation,
    ];

    pub fn default_prefix(self) -> &'static str {
        match self {
            DocumentKind::Purchase => "PR",
            DocumentKind::Issue => "ISS",
            DocumentKind::Consumption => "CON",
            DocumentKind::Disposal => "WST",
            DocumentKind::Adjustment => "ADJ",
            DocumentKind::Reconciliation => "REC",
        }
    }
}

/// `{prefix}-{sequence}` with the sequence zero-padded to `width`.
pub fn format_reference(prefix: &str, sequence: u64, width: usize) -> String {
    format!("{prefix}-{sequence:0width$}")
}

/// Split a reference code back into prefix and sequence.
pub fn parse_reference(code: &str) -> DomainResult<(&str, u64)> {
    let (prefix, digits) = code
        .rsplit_once('-')
        .ok_or_else(|| DomainError::validation(format!("malformed reference code: {code}")))?;
    if prefix.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DomainError::validation(format!(
            "malformed reference code: {code}"
        )));
    }
    let sequence = digits
        .parse::<u64>()
        .map_err(|e| DomainError::validation(format!("reference sequence: {e}")))?;
    Ok((prefix, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_zero_padding() {
        assert_eq!(format_reference("ISS", 1, 6), "ISS-000001");
        assert_eq!(format_reference("WST", 1234567, 6), "WST-1234567");
    }

    #[test]
    fn parses_prefix_and_sequence() {
        assert_eq!(parse_reference("PR-000042").unwrap(), ("PR", 42));
        assert!(parse_reference("PR000042").is_err());
        assert!(parse_reference("PR-00x1").is_err());
        assert!(parse_reference("-0001").is_err());
    }

    #[test]
    fn default_prefixes_are_distinct() {
        let mut prefixes: Vec<_> = DocumentKind::ALL.iter().map(|k| k.default_prefix()).collect();
        prefixes.sort();
        prefixes.dedup();
        assert_eq!(prefixes.len(), DocumentKind::ALL.len());
    }
}
