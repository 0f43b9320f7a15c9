use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const PACKAGE_ID_SEPARATOR: char = ';';

/// One row of the `packages` table.
///
/// `(name, version, architecture, repository)` is the primary key.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: String,
    pub architecture: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub long_description: String,
    pub repository: String,
}

impl PackageRecord {
    pub fn id(&self) -> PackageId {
        PackageId::new(
            &self.name,
            &self.version,
            &self.architecture,
            &self.repository,
        )
    }
}

/// Externally visible package handle, rendered as `name;version;arch;repo`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub repository: String,
}

impl PackageId {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        architecture: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            architecture: architecture.into(),
            repository: repository.into(),
        }
    }
}

impl Display for PackageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.name,
            self.version,
            self.architecture,
            self.repository,
            sep = PACKAGE_ID_SEPARATOR
        )
    }
}

impl FromStr for PackageId {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split(PACKAGE_ID_SEPARATOR).collect();
        let [name, version, architecture, repository] = parts.as_slice() else {
            return Err(format!(
                "package id '{raw}' must have exactly four ';'-separated fields"
            ));
        };
        if name.is_empty() {
            return Err(format!("package id '{raw}' has an empty name"));
        }
        Ok(Self::new(*name, *version, *architecture, *repository))
    }
}

/// A search result as handed to a sink.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PackageHit {
    pub id: PackageId,
    pub installed: bool,
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_id_renders_semicolon_separated_fields() {
        let id = PackageId::new("vim", "9.0", "x86_64", "main");
        assert_eq!(id.to_string(), "vim;9.0;x86_64;main");
    }

    #[test]
    fn package_id_parses_rendered_form() {
        let parsed: PackageId = "vim;9.0;x86_64;main".parse().unwrap();
        assert_eq!(parsed, PackageId::new("vim", "9.0", "x86_64", "main"));
    }

    #[test]
    fn package_id_allows_empty_trailing_fields() {
        let parsed: PackageId = "vim;;;".parse().unwrap();
        assert_eq!(parsed.name, "vim");
        assert!(parsed.repository.is_empty());
    }

    #[test]
    fn package_id_rejects_wrong_field_count() {
        assert!("vim;9.0;x86_64".parse::<PackageId>().is_err());
        assert!(";9.0;x86_64;main".parse::<PackageId>().is_err());
    }

    #[test]
    fn manifest_records_default_optional_fields() {
        let record: PackageRecord = serde_json::from_str(
            r#"{"name":"vim","version":"9.0","architecture":"x86_64","repository":"main"}"#,
        )
        .unwrap();
        assert!(record.dependencies.is_empty());
        assert!(record.short_description.is_empty());
        assert_eq!(record.id().to_string(), "vim;9.0;x86_64;main");
    }
}
