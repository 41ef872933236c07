//! Signed bearer tokens: `base64url(claims_json) "." base64url(hmac)`.
//!
//! The MAC is HMAC-SHA256 over the encoded claims segment, checked in
//! constant time before the claims are even parsed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::types::{SecurityError, TokenClaims};

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &[u8], segment: &str) -> Result<HmacSha256, SecurityError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| SecurityError::InvalidInput("empty token secret".into()))?;
    mac.update(segment.as_bytes());
    Ok(mac)
}

pub fn sign(secret: &[u8], claims: &TokenClaims) -> Result<String, SecurityError> {
    let json = serde_json::to_vec(claims).map_err(|e| SecurityError::Decode(e.to_string()))?;
    let segment = URL_SAFE_NO_PAD.encode(json);
    let tag = mac_for(secret, &segment)?.finalize().into_bytes();
    Ok(format!("{segment}.{}", URL_SAFE_NO_PAD.encode(tag)))
}

/// Check the MAC and expiry against `now` (unix seconds).
pub fn verify(secret: &[u8], token: &str, now: i64) -> Result<TokenClaims, SecurityError> {
    let (segment, tag) = token
        .split_once('.')
        .ok_or_else(|| SecurityError::InvalidToken("malformed token".into()))?;
    let tag = URL_SAFE_NO_PAD
        .decode(tag)
        .map_err(|_| SecurityError::InvalidToken("malformed signature".into()))?;
    mac_for(secret, segment)?
        .verify_slice(&tag)
        .map_err(|_| SecurityError::InvalidToken("bad signature".into()))?;

    let json = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| SecurityError::InvalidToken("malformed claims".into()))?;
    let claims: TokenClaims = serde_json::from_slice(&json)
        .map_err(|_| SecurityError::InvalidToken("malformed claims".into()))?;
    if claims.exp <= now {
        return Err(SecurityError::TokenExpired);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: i64) -> TokenClaims {
        TokenClaims {
            sub: "alice".into(),
            iat: 100,
            exp,
            jti: "t1".into(),
        }
    }

    #[test]
    fn round_trip_and_expiry() {
        let token = sign(b"secret", &claims(200)).unwrap();
        assert_eq!(verify(b"secret", &token, 150).unwrap().sub, "alice");
        assert_eq!(verify(b"secret", &token, 200), Err(SecurityError::TokenExpired));
    }

    #[test]
    fn tampering_detected() {
        let token = sign(b"secret", &claims(200)).unwrap();
        assert!(matches!(
            verify(b"other", &token, 150),
            Err(SecurityError::InvalidToken(_))
        ));

        let forged_claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims(9_999)).unwrap());
        let (_, tag) = token.split_once('.').unwrap();
        let forged = format!("{forged_claims}.{tag}");
        assert!(matches!(
            verify(b"secret", &forged, 150),
            Err(SecurityError::InvalidToken(_))
        ));
        assert!(matches!(
            verify(b"secret", "no-dot-here", 150),
            Err(SecurityError::InvalidToken(_))
        ));
    }
}
