// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

use std::str::FromStr;

use crate::error::BackupError;

/// Postgres `sslmode` values. The authoritative set per the operator's
/// configuration surface; `verify-peer` (seen in older deployments) is not
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Allow,
    Disable,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(SslMode::Allow),
            "disable" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(BackupError::ConfigInvalid(format!("unsupported db.sslmode: {other:?}"))),
        }
    }
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Allow => "allow",
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    /// Whether this mode requires a client cert/key pair to be configured.
    pub fn requires_client_cert(&self) -> bool {
        matches!(self, SslMode::VerifyFull)
    }

    /// Whether this mode appends cert material (`sslrootcert`, `sslcert`,
    /// `sslkey`) to the connection URI at all.
    pub fn augments_with_certs(&self) -> bool {
        matches!(self, SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull)
    }

    fn all() -> [SslMode; 6] {
        [SslMode::Allow, SslMode::Disable, SslMode::Prefer, SslMode::Require, SslMode::VerifyCa, SslMode::VerifyFull]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_peer_is_rejected() {
        assert!("verify-peer".parse::<SslMode>().is_err());
    }

    #[test]
    fn unknown_value_is_rejected() {
        assert!("".parse::<SslMode>().is_err());
    }

    #[test]
    fn every_variant_round_trips_through_as_str() {
        for mode in SslMode::all() {
            assert_eq!(mode.as_str().parse::<SslMode>().unwrap(), mode);
        }
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn as_str_output_always_parses_back_to_the_same_variant(idx in 0usize..6) {
            let mode = SslMode::all()[idx];
            prop_assert_eq!(mode.as_str().parse::<SslMode>().unwrap(), mode);
        }
    }
}
