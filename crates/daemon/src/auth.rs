//! Access tokens for fleet-engine calls. Minting them is out of scope; the daemon only asks a
//! provider for the current token before every request.

use async_trait::async_trait;

use crate::fleet::FleetError;

/// Called before every fleet-engine request. `Ok(None)` sends the request unauthenticated.
#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    async fn token(&self) -> Result<Option<String>, FleetError>;
}

/// Anonymous requests, e.g. against a local fleet-engine emulator.
pub struct NoToken;

#[async_trait]
impl TokenProvider for NoToken {
    async fn token(&self) -> Result<Option<String>, FleetError> {
        Ok(None)
    }
}

/// Bearer token obtained out of band.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<Option<String>, FleetError> {
        if self.0.is_empty() {
            return Err(FleetError::Auth("static token is empty".into()));
        }
        Ok(Some(self.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_token_returns_none() {
        assert!(NoToken.token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn static_token_returns_value() {
        let ts = StaticToken::new("fleet-jwt");
        assert_eq!(ts.token().await.unwrap(), Some("fleet-jwt".to_string()));
        assert!(StaticToken::new("").token().await.is_err());
    }
}
