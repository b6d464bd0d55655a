use std::path::PathBuf;

use async_trait::async_trait;

use super::EventSource;
use crate::error::{CalRulesError, CalRulesResult};
use crate::event::Event;

/// A JSON file holding an array of events.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileSource { path: path.into() }
    }
}

#[async_trait]
impl EventSource for JsonFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch_events(&self) -> CalRulesResult<Vec<Event>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CalRulesError::Source(format!("{}: {}", self.path.display(), e)))?;

        serde_json::from_str(&content)
            .map_err(|e| CalRulesError::Source(format!("{}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_event_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "1", "title": "Team Meeting", "start": "2025-01-15T09:00:00Z", "end": "2025-01-15T10:30:00Z"},
                {"id": "2", "title": "Offsite", "start": "2025-01-18", "end": "2025-01-19"}
            ]"#,
        )
        .unwrap();

        let events = JsonFileSource::new(&path).fetch_events().await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[1].is_all_day());
    }

    #[tokio::test]
    async fn test_missing_file_is_source_error() {
        let source = JsonFileSource::new("/definitely/not/here.json");
        assert!(matches!(source.fetch_events().await, Err(CalRulesError::Source(_))));
    }
}
