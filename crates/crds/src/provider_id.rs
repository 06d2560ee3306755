//! The `beskar7://<namespace>/<hostname>` provider identifier wire format.

use thiserror::Error;

const SCHEME: &str = "beskar7";

/// A parsed provider identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderId {
    /// Namespace component.
    pub namespace: String,
    /// Host name component.
    pub host_name: String,
}

/// Errors parsing a provider identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderIdError {
    /// Scheme was not `beskar7://`.
    #[error("unsupported provider ID scheme in '{0}'")]
    UnsupportedScheme(String),

    /// Namespace or host name component was empty.
    #[error("provider ID '{0}' is missing namespace or host name")]
    MissingComponent(String),

    /// More path segments than `<namespace>/<hostname>`.
    #[error("provider ID '{0}' has too many path segments")]
    TooManySegments(String),
}

impl ProviderId {
    /// Format as the canonical wire string.
    #[must_use]
    pub fn format(&self) -> String {
        format!("{SCHEME}://{}/{}", self.namespace, self.host_name)
    }

    /// Parse `beskar7://<namespace>/<hostname>`. Rejects any other scheme,
    /// missing components, or extra path segments.
    pub fn parse(raw: &str) -> Result<Self, ProviderIdError> {
        let rest = raw
            .strip_prefix(&format!("{SCHEME}://"))
            .ok_or_else(|| ProviderIdError::UnsupportedScheme(raw.to_string()))?;

        let mut segments = rest.split('/');
        let namespace = segments.next().unwrap_or("");
        let host_name = segments.next().unwrap_or("");
        if segments.next().is_some() {
            return Err(ProviderIdError::TooManySegments(raw.to_string()));
        }
        if namespace.is_empty() || host_name.is_empty() {
            return Err(ProviderIdError::MissingComponent(raw.to_string()));
        }

        Ok(Self {
            namespace: namespace.to_string(),
            host_name: host_name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_id() {
        let id = ProviderId::parse("beskar7://prod/host-7").unwrap();
        assert_eq!(id.namespace, "prod");
        assert_eq!(id.host_name, "host-7");
    }

    #[test]
    fn round_trips_through_format() {
        let id = ProviderId {
            namespace: "prod".to_string(),
            host_name: "host-7".to_string(),
        };
        assert_eq!(id.format(), "beskar7://prod/host-7");
        assert_eq!(ProviderId::parse(&id.format()).unwrap(), id);
    }

    #[test]
    fn rejects_missing_host_name() {
        assert_eq!(
            ProviderId::parse("beskar7://prod/"),
            Err(ProviderIdError::MissingComponent("beskar7://prod/".to_string()))
        );
    }

    #[test]
    fn rejects_foreign_scheme() {
        assert!(matches!(
            ProviderId::parse("s3://prod/host-7"),
            Err(ProviderIdError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn rejects_extra_segments() {
        assert!(matches!(
            ProviderId::parse("beskar7://prod/host-7/extra"),
            Err(ProviderIdError::TooManySegments(_))
        ));
    }
}
