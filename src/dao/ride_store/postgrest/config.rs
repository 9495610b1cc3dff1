use super::error::{PostgrestError, PostgrestResult};

/// Runtime configuration describing how to reach the hosted database.
#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub base_url: String,
    /// Public API key sent as `apikey` with every request.
    pub anon_key: String,
    /// Event-stream endpoint publishing table changes, if one is deployed.
    pub changes_url: Option<String>,
}

impl PostgrestConfig {
    /// Project URL and public anon key, with default timeouts.
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            changes_url: None,
        }
    }

    /// Attach the change-stream endpoint.
    pub fn with_changes_url(mut self, url: impl Into<String>) -> Self {
        self.changes_url = Some(url.into());
        self
    }

    /// Build a configuration by reading `SUPABASE_URL`, `SUPABASE_ANON_KEY`
    /// and the optional `SUPABASE_CHANGES_URL`.
    pub fn from_env() -> PostgrestResult<Self> {
        let base_url = std::env::var("SUPABASE_URL").map_err(|_| PostgrestError::MissingEnvVar {
            var: "SUPABASE_URL",
        })?;
        let anon_key =
            std::env::var("SUPABASE_ANON_KEY").map_err(|_| PostgrestError::MissingEnvVar {
                var: "SUPABASE_ANON_KEY",
            })?;

        let mut config = Self::new(base_url, anon_key);
        if let Some(url) = std::env::var("SUPABASE_CHANGES_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
        {
            config = config.with_changes_url(url);
        }
        Ok(config)
    }

    pub(super) fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.base_url)
    }

    pub(super) fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_ignore_trailing_slash() {
        let config = PostgrestConfig::new("https://db.example.org/", "key");
        assert_eq!(config.rest_url(), "https://db.example.org/rest/v1");
        assert_eq!(config.auth_url(), "https://db.example.org/auth/v1");
    }
}
