//! SPDX license expression contract.
//!
//! The SPDX parser itself is an out-of-scope external collaborator (§1); this
//! module only wraps the real `spdx` crate so the manifest layer can accept
//! and round-trip a license expression string.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid SPDX license expression '{expression}': {reason}")]
pub struct LicenseExprError {
    pub expression: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseExpr(String);

impl LicenseExpr {
    pub fn parse(s: &str) -> Result<LicenseExpr, LicenseExprError> {
        spdx::Expression::parse(s)
            .map(|_| LicenseExpr(s.to_string()))
            .map_err(|e| LicenseExprError { expression: s.to_string(), reason: e.to_string() })
    }
}

impl fmt::Display for LicenseExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_expression_round_trips() {
        let e = LicenseExpr::parse("BSL-1.0 AND MPL-1.0").unwrap();
        assert_eq!(e.to_string(), "BSL-1.0 AND MPL-1.0");
    }

    #[test]
    fn unknown_id_is_categorized_error() {
        let err = LicenseExpr::parse("NotAReal-License-Id").unwrap_err();
        assert_eq!(err.expression, "NotAReal-License-Id");
    }
}
