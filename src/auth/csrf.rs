use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Name of the hidden form field carrying the token.
pub const CSRF_FIELD: &str = "csrf_token";

/// Stateless CSRF tokens: HMAC-SHA256 of the session id under a server secret.
/// Nothing is stored; a token is valid for exactly as long as its session.
#[derive(Clone)]
pub struct CsrfService {
    secret: Vec<u8>,
}

impl CsrfService {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    pub fn generate_token(&self, session_id: &str) -> String {
        hex::encode(self.mac(session_id))
    }

    pub fn validate_token(&self, session_id: &str, token: &str) -> bool {
        let Ok(given) = hex::decode(token) else {
            return false;
        };
        let expected = self.mac(session_id);
        given.len() == expected.len() && bool::from(given.ct_eq(&expected))
    }

    fn mac(&self, session_id: &str) -> Vec<u8> {
        // HMAC accepts keys of any length, so this cannot fail.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC key length is unrestricted"),
        };
        mac.update(b"lerhuset-csrf:");
        mac.update(session_id.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_validates_for_its_session_only() {
        let csrf = CsrfService::new("secret");
        let token = csrf.generate_token("session-a");
        assert_eq!(token.len(), 64);
        assert!(csrf.validate_token("session-a", &token));
        assert!(!csrf.validate_token("session-b", &token));
    }

    #[test]
    fn test_rejects_garbage_and_other_secrets() {
        let csrf = CsrfService::new("secret");
        let other = CsrfService::new("another");
        assert!(!csrf.validate_token("s", "not-hex"));
        assert!(!csrf.validate_token("s", ""));
        assert!(!csrf.validate_token("s", &other.generate_token("s")));
    }
}
