use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::SourceError;
use crate::ids::{BaniId, CompositionId, LineId};

/// One scripture line as returned by search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRecord {
    pub id: LineId,
    pub composition_id: CompositionId,
    /// Position of the line inside its composition.
    pub order_id: i64,
    pub gurmukhi: String,
    pub first_letters: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub english_translation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub punjabi_translation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transliteration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_page: Option<i64>,
}

/// A reading list: an ordered run of lines recited together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bani {
    pub id: BaniId,
    pub name: String,
    pub line_references: Vec<LineId>,
}

/// Read-only scripture collaborator: search and reading-list enumeration.
///
/// Implementations may block on I/O internally but must not hold the async
/// runtime while doing so.
#[async_trait]
pub trait ScriptureSource: Send + Sync {
    /// Lines matching `query`, in a stable order. An empty (after trimming)
    /// query matches nothing.
    async fn search_lines(&self, query: &str) -> Result<Vec<LineRecord>, SourceError>;

    /// Every reading list, in a stable order.
    async fn banis(&self) -> Result<Vec<Bani>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource;

    #[async_trait]
    impl ScriptureSource for FixedSource {
        async fn search_lines(&self, query: &str) -> Result<Vec<LineRecord>, SourceError> {
            if query.trim().is_empty() {
                return Ok(Vec::new());
            }
            Err(SourceError::Unavailable("offline".into()))
        }

        async fn banis(&self) -> Result<Vec<Bani>, SourceError> {
            Ok(vec![Bani {
                id: BaniId::from_raw("2"),
                name: "Japji Sahib".into(),
                line_references: vec![LineId::from_raw("L1"), LineId::from_raw("L2")],
            }])
        }
    }

    #[tokio::test]
    async fn trait_objects_are_usable() {
        let source: std::sync::Arc<dyn ScriptureSource> = std::sync::Arc::new(FixedSource);
        assert!(source.search_lines("  ").await.unwrap().is_empty());
        assert!(source.search_lines("ik").await.is_err());
        assert_eq!(source.banis().await.unwrap()[0].line_references.len(), 2);
    }

    #[test]
    fn line_record_wire_shape() {
        let record = LineRecord {
            id: LineId::from_raw("L7"),
            composition_id: CompositionId::from_raw("DMP"),
            order_id: 7,
            gurmukhi: "ਇਕ".into(),
            first_letters: "ik".into(),
            english_translation: Some("One".into()),
            punjabi_translation: None,
            transliteration: None,
            source_page: Some(1),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["compositionId"], "DMP");
        assert_eq!(json["orderId"], 7);
        assert_eq!(json["firstLetters"], "ik");
        assert_eq!(json["englishTranslation"], "One");
        assert!(json.get("punjabiTranslation").is_none());
        assert_eq!(json["sourcePage"], 1);
    }

    #[test]
    fn bani_wire_shape() {
        let bani = Bani {
            id: BaniId::from_raw("9"),
            name: "Rehras Sahib".into(),
            line_references: vec![LineId::from_raw("A"), LineId::from_raw("B")],
        };
        let json = serde_json::to_value(&bani).unwrap();
        assert_eq!(json["lineReferences"], serde_json::json!(["A", "B"]));
    }
}
