use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Cloud vendors a partition's storage accounts can live on.
///
/// Only Azure partitions can be served by the storage layer; Google is kept so
/// that configurations coming from other services deserialize and are rejected
/// with a clear error instead of a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudPlatform {
    Azure,
    Google,
}

impl FromStr for CloudPlatform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "azure" => Ok(CloudPlatform::Azure),
            "google" | "gcp" => Ok(CloudPlatform::Google),
            _ => Err(anyhow::anyhow!("Invalid cloud provider: {}", s)),
        }
    }
}

impl Display for CloudPlatform {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CloudPlatform::Azure => write!(f, "azure"),
            CloudPlatform::Google => write!(f, "google"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_vendors_case_insensitively() {
        assert_eq!("Azure".parse::<CloudPlatform>().unwrap(), CloudPlatform::Azure);
        assert_eq!(" google ".parse::<CloudPlatform>().unwrap(), CloudPlatform::Google);
        assert_eq!("gcp".parse::<CloudPlatform>().unwrap(), CloudPlatform::Google);
    }

    #[test]
    fn rejects_unknown_vendor() {
        assert!("aws".parse::<CloudPlatform>().is_err());
    }

    #[test]
    fn display_matches_serde_name() {
        let json = serde_json::to_string(&CloudPlatform::Azure).unwrap();
        assert_eq!(json, format!("\"{}\"", CloudPlatform::Azure));
    }
}
