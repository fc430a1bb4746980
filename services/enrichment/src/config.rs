use std::collections::HashMap;

use url::Url;

use crate::{api::ContainerLocation, combine_url, error::ConfigError};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7071";
pub const DEFAULT_SKILL_NAME: &str = "LabelCounter";
const DEFAULT_ENDPOINT_PROTOCOL: &str = "https";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
const DEVELOPMENT_STORAGE_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportRuntime {
    Std,
    Axum,
}

impl TransportRuntime {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Std => "std",
            Self::Axum => "axum",
        }
    }

    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("axum") => Self::Axum,
            _ => Self::Std,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub skill_name: String,
    pub container: ContainerLocation,
    pub http_workers: usize,
    pub transport_runtime: TransportRuntime,
    pub function_key: Option<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let skill_name = non_empty(lookup("SKILL_NAME"))
            .unwrap_or_else(|| DEFAULT_SKILL_NAME.to_string());
        if skill_name.contains(['/', '?', '#']) {
            return Err(ConfigError::InvalidValue {
                key: "SKILL_NAME",
                value: skill_name,
            });
        }
        Ok(Self {
            bind_addr: non_empty(lookup("SKILL_BIND"))
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            skill_name,
            container: resolve_container(&lookup)?,
            http_workers: lookup("SKILL_HTTP_WORKERS")
                .and_then(|value| value.trim().parse::<usize>().ok())
                .filter(|workers| *workers > 0)
                .unwrap_or_else(default_http_workers),
            transport_runtime: TransportRuntime::parse(
                lookup("SKILL_TRANSPORT_RUNTIME").as_deref(),
            ),
            function_key: non_empty(lookup("SKILL_FUNCTION_KEY")),
        })
    }
}

/// Container URI wins over the connection string when both are set. The
/// function host's `AZURE_STORAGE_CONNECTION_STRING` is honoured when the
/// skill-specific connection string is absent.
pub fn resolve_container<F>(lookup: &F) -> Result<ContainerLocation, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(uri) = non_empty(lookup("SKILL_CONTAINER_URI")) {
        return container_from_uri(&uri);
    }
    let connection_string = non_empty(lookup("SKILL_STORAGE_CONNECTION_STRING"))
        .or_else(|| non_empty(lookup("AZURE_STORAGE_CONNECTION_STRING")))
        .ok_or(ConfigError::MissingContainer)?;
    let container_name =
        non_empty(lookup("SKILL_CONTAINER_NAME")).ok_or(ConfigError::MissingContainerName)?;
    container_from_connection_string(&connection_string, &container_name)
}

pub fn container_from_uri(raw: &str) -> Result<ContainerLocation, ConfigError> {
    let raw = raw.trim();
    let parsed = Url::parse(raw).map_err(|err| ConfigError::InvalidContainerUri {
        uri: raw.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidContainerUri {
            uri: raw.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidContainerUri {
            uri: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(ConfigError::InvalidContainerUri {
            uri: raw.to_string(),
            reason: "query and fragment are not allowed".to_string(),
        });
    }
    Ok(ContainerLocation::new(raw.trim_end_matches('/')))
}

pub fn container_from_connection_string(
    connection_string: &str,
    container_name: &str,
) -> Result<ContainerLocation, ConfigError> {
    validate_container_name(container_name)?;
    let fields = parse_connection_string(connection_string)?;
    let endpoint = blob_endpoint(&fields)?;
    container_from_uri(&combine_url(&endpoint, container_name))
}

fn blob_endpoint(fields: &HashMap<String, String>) -> Result<String, ConfigError> {
    if let Some(endpoint) = fields.get("blobendpoint") {
        return Ok(endpoint.clone());
    }
    if fields
        .get("usedevelopmentstorage")
        .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    {
        return Ok(DEVELOPMENT_STORAGE_BLOB_ENDPOINT.to_string());
    }
    let account_name = fields
        .get("accountname")
        .ok_or(ConfigError::MissingConnectionField("AccountName"))?;
    let protocol = fields
        .get("defaultendpointsprotocol")
        .map(String::as_str)
        .unwrap_or(DEFAULT_ENDPOINT_PROTOCOL);
    let suffix = fields
        .get("endpointsuffix")
        .map(String::as_str)
        .unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
    Ok(format!("{protocol}://{account_name}.blob.{suffix}"))
}

/// Keys are case-insensitive; values keep everything after the first `=`
/// since account keys are base64 and may end in padding.
fn parse_connection_string(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut fields = HashMap::new();
    for segment in raw.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (key, value) = segment
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedConnectionSegment(redact_segment(segment)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::MalformedConnectionSegment(redact_segment(
                segment,
            )));
        }
        fields.insert(key.to_ascii_lowercase(), value.trim().to_string());
    }
    Ok(fields)
}

fn redact_segment(segment: &str) -> String {
    segment.chars().take(12).collect()
}

fn validate_container_name(name: &str) -> Result<(), ConfigError> {
    let valid_chars = name
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');
    let valid = (3..=63).contains(&name.len())
        && valid_chars
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--");
    if valid || name == "$root" {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: "SKILL_CONTAINER_NAME",
            value: name.to_string(),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn default_http_workers() -> usize {
    std::thread::available_parallelism()
        .map(|parallelism| parallelism.get().clamp(1, 32))
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn from_lookup_applies_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[(
            "SKILL_CONTAINER_URI",
            "https://acct.blob.core.windows.net/images/",
        )]))
        .unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.skill_name, DEFAULT_SKILL_NAME);
        assert_eq!(
            config.container.base_uri(),
            "https://acct.blob.core.windows.net/images"
        );
        assert_eq!(config.transport_runtime, TransportRuntime::Std);
        assert_eq!(config.function_key, None);
        assert!(config.http_workers >= 1);
    }

    #[test]
    fn from_lookup_reads_overrides() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("SKILL_CONTAINER_URI", "https://acct.blob.core.windows.net/images"),
            ("SKILL_BIND", "0.0.0.0:8080"),
            ("SKILL_NAME", "CountLabels"),
            ("SKILL_HTTP_WORKERS", "3"),
            ("SKILL_TRANSPORT_RUNTIME", "axum"),
            ("SKILL_FUNCTION_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.skill_name, "CountLabels");
        assert_eq!(config.http_workers, 3);
        assert_eq!(config.transport_runtime, TransportRuntime::Axum);
        assert_eq!(config.function_key.as_deref(), Some("secret"));
    }

    #[test]
    fn from_lookup_requires_a_container() {
        let err = ServiceConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingContainer);
    }

    #[test]
    fn from_lookup_rejects_skill_name_with_path_characters() {
        let err = ServiceConfig::from_lookup(lookup_from(&[
            ("SKILL_CONTAINER_URI", "https://acct.blob.core.windows.net/images"),
            ("SKILL_NAME", "a/b"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "SKILL_NAME", .. }));
    }

    #[test]
    fn container_from_uri_rejects_relative_and_non_http() {
        assert!(matches!(
            container_from_uri("container/images"),
            Err(ConfigError::InvalidContainerUri { .. })
        ));
        assert!(matches!(
            container_from_uri("ftp://acct/images"),
            Err(ConfigError::InvalidContainerUri { .. })
        ));
        assert!(matches!(
            container_from_uri("https://acct/images?sig=abc"),
            Err(ConfigError::InvalidContainerUri { .. })
        ));
    }

    #[test]
    fn connection_string_builds_account_endpoint() {
        let container = container_from_connection_string(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5==;EndpointSuffix=core.windows.net",
            "images",
        )
        .unwrap();
        assert_eq!(
            container.base_uri(),
            "https://acct.blob.core.windows.net/images"
        );
    }

    #[test]
    fn connection_string_prefers_explicit_blob_endpoint() {
        let container = container_from_connection_string(
            "BlobEndpoint=https://custom.example.net/;AccountName=acct",
            "images",
        )
        .unwrap();
        assert_eq!(container.base_uri(), "https://custom.example.net/images");
    }

    #[test]
    fn connection_string_supports_development_storage() {
        let container =
            container_from_connection_string("UseDevelopmentStorage=true", "images").unwrap();
        assert_eq!(
            container.base_uri(),
            "http://127.0.0.1:10000/devstoreaccount1/images"
        );
    }

    #[test]
    fn connection_string_requires_account_name() {
        let err = container_from_connection_string("AccountKey=abc", "images").unwrap_err();
        assert_eq!(err, ConfigError::MissingConnectionField("AccountName"));
    }

    #[test]
    fn connection_string_rejects_segment_without_separator() {
        let err = container_from_connection_string("AccountName", "images").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedConnectionSegment(_)));
    }

    #[test]
    fn resolve_container_requires_name_with_connection_string() {
        let lookup = lookup_from(&[("SKILL_STORAGE_CONNECTION_STRING", "AccountName=acct")]);
        assert_eq!(
            resolve_container(&lookup).unwrap_err(),
            ConfigError::MissingContainerName
        );
    }

    #[test]
    fn resolve_container_falls_back_to_host_connection_string() {
        let lookup = lookup_from(&[
            ("AZURE_STORAGE_CONNECTION_STRING", "AccountName=hostacct"),
            ("SKILL_CONTAINER_NAME", "images"),
        ]);
        assert_eq!(
            resolve_container(&lookup).unwrap().base_uri(),
            "https://hostacct.blob.core.windows.net/images"
        );

        let lookup = lookup_from(&[
            ("SKILL_STORAGE_CONNECTION_STRING", "AccountName=skillacct"),
            ("AZURE_STORAGE_CONNECTION_STRING", "AccountName=hostacct"),
            ("SKILL_CONTAINER_NAME", "images"),
        ]);
        assert_eq!(
            resolve_container(&lookup).unwrap().base_uri(),
            "https://skillacct.blob.core.windows.net/images"
        );
    }

    #[test]
    fn container_name_follows_blob_naming_rules() {
        assert!(validate_container_name("images-2024").is_ok());
        assert!(validate_container_name("Images").is_err());
        assert!(validate_container_name("ab").is_err());
        assert!(validate_container_name("a--b").is_err());
    }
}
