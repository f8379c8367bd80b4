use argon2::{Argon2, PasswordHash, PasswordVerifier};

/// A named management credential. Only the argon2 hash is kept in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiToken {
    pub name: String,
    pub token_hash: String,
}

/// Management API credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminConfig {
    tokens: Vec<ApiToken>,
}

impl AdminConfig {
    pub fn new(tokens: Vec<ApiToken>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[ApiToken] {
        &self.tokens
    }

    /// Verify a presented token and return the name of the credential it
    /// matches.
    ///
    /// Hashes that fail to parse are skipped with a warning.
    pub fn authenticate(&self, presented: &str) -> Option<&str> {
        if presented.is_empty() {
            return None;
        }
        self.tokens.iter().find_map(|token| {
            let parsed = match PasswordHash::new(&token.token_hash) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(name = %token.name, error = %e, "Unparsable API token hash");
                    return None;
                }
            };
            Argon2::default()
                .verify_password(presented.as_bytes(), &parsed)
                .ok()
                .map(|()| token.name.as_str())
        })
    }
}
