//! Credentials for the face-comparison API.

/// Static signing credentials.
#[derive(Clone)]
pub struct CloudCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl CloudCredentials {
    /// Read credentials from `KITH_ACCESS_KEY_ID`,
    /// `KITH_SECRET_ACCESS_KEY` and `KITH_REGION`.
    ///
    /// Returns None unless all three are present and non-empty; a partial
    /// configuration is treated as no configuration, and the pipeline
    /// runs offline-only.
    pub fn from_env() -> Option<Self> {
        let access_key_id = non_empty(std::env::var("KITH_ACCESS_KEY_ID").ok()?)?;
        let secret_access_key = non_empty(std::env::var("KITH_SECRET_ACCESS_KEY").ok()?)?;
        let region = non_empty(std::env::var("KITH_REGION").ok()?)?;
        Some(Self {
            access_key_id,
            secret_access_key,
            region,
        })
    }
}

// The secret never reaches logs, even at trace level.
impl std::fmt::Debug for CloudCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
