use std::path::Path;

use serde::de::DeserializeOwned;

use crate::app_def::AppDefinition;
use crate::error::LoadError;

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, LoadError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| {
        let path = err.path().to_string();
        LoadError::Json(format!("at JSON path {path} → {}", err.into_inner()))
    })
}

/// Read and validate an application definition file.
pub fn read_app_definition(path: &Path) -> Result<AppDefinition, LoadError> {
    let source = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), bytes = source.len(), "loaded application definition");
    AppDefinition::from_json_str(&source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Debug, serde::Deserialize)]
    #[allow(dead_code)]
    struct Outer {
        inner: Inner,
    }

    #[derive(Debug, serde::Deserialize)]
    #[allow(dead_code)]
    struct Inner {
        count: u32,
    }

    #[test]
    fn errors_carry_the_json_path() {
        let err = from_str_with_path::<Outer>(r#"{"inner":{"count":"three"}}"#).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("at JSON path inner.count"), "{message}");
    }

    #[test]
    fn reads_definition_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"schemaVersion":"0.0.7","procedures":{{}},"definitions":{{"Flag":{{"type":"boolean"}}}}}}"#
        )
        .unwrap();
        let app = read_app_definition(file.path()).unwrap();
        assert_eq!(app.schema_version, "0.0.7");
        assert_eq!(app.definitions.len(), 1);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_app_definition(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
    }
}
