//! Issued access credential.

use crate::client::TokenResponse;
use crate::error::{AuthError, AuthResult};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// `expires_dt` layout (`yyyyMMddHHmmss`).
pub const EXPIRES_DT_FORMAT: &str = "%Y%m%d%H%M%S";

/// Zone the upstream expresses `expires_dt` in.
pub const UPSTREAM_TZ: Tz = chrono_tz::Asia::Seoul;

/// Access token plus its absolute expiry. Replaced wholesale on refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Build a credential from a token endpoint response.
    ///
    /// Fails if the token or a parseable expiry is missing.
    pub fn from_response(response: &TokenResponse) -> AuthResult<Self> {
        let token = response
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::MissingToken {
                code: response.return_code,
                msg: response.return_msg.clone(),
            })?;

        let expires_dt = response
            .expires_dt
            .as_deref()
            .ok_or_else(|| AuthError::InvalidExpiry("expires_dt missing".to_string()))?;

        Ok(Self::new(token, parse_expires_dt(expires_dt)?))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Expired from `now` on (inclusive).
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Parse an upstream `expires_dt` (`yyyyMMddHHmmss`, Asia/Seoul) into UTC.
pub fn parse_expires_dt(expires_dt: &str) -> AuthResult<DateTime<Utc>> {
    let trimmed = expires_dt.trim();
    if trimmed.len() != 14 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AuthError::InvalidExpiry(format!(
            "expected 14 digits, got {expires_dt:?}"
        )));
    }

    let naive = NaiveDateTime::parse_from_str(trimmed, EXPIRES_DT_FORMAT)
        .map_err(|e| AuthError::InvalidExpiry(format!("{expires_dt:?}: {e}")))?;

    UPSTREAM_TZ
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| AuthError::InvalidExpiry(format!("{expires_dt:?} does not exist in KST")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn response(token: Option<&str>, expires_dt: Option<&str>) -> TokenResponse {
        TokenResponse {
            return_code: Some(0),
            return_msg: Some("ok".to_string()),
            token: token.map(str::to_string),
            token_type: Some("bearer".to_string()),
            expires_dt: expires_dt.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_expires_dt_is_kst() {
        // 2025-01-02 09:30:00 KST == 2025-01-02 00:30:00 UTC
        let parsed = parse_expires_dt("20250102093000").unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 1, 2, 0, 30, 0).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_expires_dt_crosses_midnight() {
        // 2025-03-01 05:00:00 KST is the previous day in UTC
        let parsed = parse_expires_dt("20250301050000").unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 2, 28, 20, 0, 0).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_expires_dt_rejects_garbage() {
        for bad in ["", "2025", "2025-01-02 09:30", "20251340250000", "2025010209300x"] {
            assert!(
                matches!(parse_expires_dt(bad), Err(AuthError::InvalidExpiry(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_response_ok() {
        let cred = Credential::from_response(&response(Some("tok"), Some("20250102093000")))
            .unwrap();
        assert_eq!(cred.token(), "tok");
        assert_eq!(
            cred.expires_at(),
            Utc.with_ymd_and_hms(2025, 1, 2, 0, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_from_response_missing_token() {
        let err = Credential::from_response(&response(None, Some("20250102093000"))).unwrap_err();
        assert!(matches!(err, AuthError::MissingToken { code: Some(0), .. }));

        let err = Credential::from_response(&response(Some(""), Some("20250102093000")))
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingToken { .. }));
    }

    #[test]
    fn test_from_response_missing_expiry() {
        let err = Credential::from_response(&response(Some("tok"), None)).unwrap_err();
        assert!(matches!(err, AuthError::InvalidExpiry(_)));
    }

    #[test]
    fn test_expiry_boundary_inclusive() {
        let expires_at = Utc::now();
        let cred = Credential::new("tok", expires_at);
        assert!(!cred.is_expired_at(expires_at - Duration::seconds(1)));
        assert!(cred.is_expired_at(expires_at));
        assert!(cred.is_expired_at(expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let cred = Credential::new("very-secret-token", Utc::now());
        assert!(!format!("{cred:?}").contains("very-secret-token"));
    }
}
