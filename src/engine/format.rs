//! File formats the engine loads and saves.

use super::EngineError;

/// The wire formats for model content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    /// Canonical linear-notation string.
    Sfiles,
    /// Graph-dialect JSON (full typed round-trip).
    GraphJson,
    /// Proteus 4.2 XML.
    ProteusXml,
}

impl FileFormat {
    /// Parse a wire format token.
    pub fn parse(token: &str) -> Result<Self, EngineError> {
        Ok(match token {
            "sfiles" => Self::Sfiles,
            "graph_json" | "json" => Self::GraphJson,
            "proteus_xml" | "proteus" => Self::ProteusXml,
            other => {
                return Err(EngineError::UnsupportedFormat { format: other.to_string() });
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sfiles => "sfiles",
            Self::GraphJson => "graph_json",
            Self::ProteusXml => "proteus_xml",
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Sfiles => &["sfiles"],
            Self::GraphJson => &["json"],
            Self::ProteusXml => &["xml"],
        }
    }

    /// Detect a format from a file path's extension.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        [Self::Sfiles, Self::GraphJson, Self::ProteusXml]
            .into_iter()
            .find(|f| f.extensions().contains(&extension))
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_roundtrip() {
        for format in [FileFormat::Sfiles, FileFormat::GraphJson, FileFormat::ProteusXml] {
            assert_eq!(FileFormat::parse(format.name()).unwrap(), format);
        }
    }

    #[test]
    fn unknown_token_is_rejected() {
        assert!(FileFormat::parse("dwg").is_err());
    }

    #[test]
    fn detects_from_extension() {
        assert_eq!(
            FileFormat::from_path(std::path::Path::new("plant.xml")),
            Some(FileFormat::ProteusXml)
        );
        assert_eq!(FileFormat::from_path(std::path::Path::new("plant.tar")), None);
    }
}
