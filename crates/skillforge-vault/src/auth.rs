use async_trait::async_trait;
use skillforge_types::{Error, Result};

/// What a successful `verify(token)` call establishes about the caller.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject: String,
    pub scopes: Vec<String>,
}

/// The interface production deployments plug an external token verifier
/// into. The core only needs `verify(token) -> {subject, scopes} | error`;
/// everything else about how a token is issued and validated (OAuth, mTLS,
/// a vendor's IdP) is out of scope.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthContext>;
}

/// The reference implementation: a single static bearer token (from
/// `ADMIN_AUTH_TOKEN`) grants the `admin` scope. Comparison is constant-time
/// to avoid leaking the token's length/prefix through response timing.
pub struct StaticTokenVerifier {
    expected: String,
}

impl StaticTokenVerifier {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<AuthContext> {
        if constant_time_eq(token.as_bytes(), self.expected.as_bytes()) {
            Ok(AuthContext {
                subject: "admin".to_string(),
                scopes: vec!["admin".to_string()],
            })
        } else {
            Err(Error::PermissionDenied("invalid admin token".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_matching_token() {
        let verifier = StaticTokenVerifier::new("s3cr3t");
        let ctx = verifier.verify("s3cr3t").await.unwrap();
        assert_eq!(ctx.subject, "admin");
        assert!(ctx.scopes.contains(&"admin".to_string()));
    }

    #[tokio::test]
    async fn rejects_mismatched_token() {
        let verifier = StaticTokenVerifier::new("s3cr3t");
        assert!(verifier.verify("wrong").await.is_err());
    }

    #[tokio::test]
    async fn rejects_different_length_tokens() {
        let verifier = StaticTokenVerifier::new("short");
        assert!(verifier.verify("much-longer-token").await.is_err());
    }
}
