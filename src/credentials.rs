//! Cloud provider credentials
//!
//! Already-authenticated credential material injected into provider
//! construction. The engine never mutates ambient environment state to
//! escalate privileges; whoever builds the provider passes credentials in.

/// Cloud API credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Provider region
    pub region: String,
    /// Optional session token for temporary credentials
    pub session_token: Option<String>,
}

impl Credentials {
    /// Load credentials from environment variables
    pub fn from_env() -> Option<Self> {
        Some(Self {
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok()?,
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok()?,
            region: std::env::var("AWS_REGION")
                .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
                .ok()?,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_carry_optional_session_token() {
        let creds = Credentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "SECRET".to_string(),
            region: "us-east-1".to_string(),
            session_token: None,
        };
        assert!(creds.session_token.is_none());

        let temporary = Credentials {
            session_token: Some("TOKEN".to_string()),
            ..creds
        };
        assert_eq!(temporary.session_token.as_deref(), Some("TOKEN"));
    }
}
