use serde::{Deserialize, Serialize};

/// A single piece of retrieved evidence, produced by `knowledge_retrieval`
/// and tracked across rounds until the final answer is assembled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub id: String,
    pub title: String,
    pub full_content: String,
}

/// Length, in characters, of the preview shown in progress events and in
/// the terminal citation list (the full text lives only in the citation
/// store, fetched on demand).
const PREVIEW_CHARS: usize = 30;

impl EvidenceRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>, full_content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            full_content: full_content.into(),
        }
    }

    /// First ~30 characters of `full_content`, for compact progress events.
    pub fn preview(&self) -> String {
        let mut chars = self.full_content.chars();
        let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
        if chars.next().is_some() {
            format!("{head}…")
        } else {
            head
        }
    }

    pub fn to_citation(&self) -> Citation {
        Citation {
            id: self.id.clone(),
            title: self.title.clone(),
            preview: self.preview(),
        }
    }
}

/// The `{id, title, preview}` shape carried in the terminal `final_answer`
/// event's citation list. Full content is deposited in the citation store
/// and fetched separately via `GET /citation/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    pub title: String,
    pub preview: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_content() {
        let rec = EvidenceRecord::new("1", "t", "a".repeat(50));
        let preview = rec.preview();
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 1);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn preview_leaves_short_content_untouched() {
        let rec = EvidenceRecord::new("1", "t", "short");
        assert_eq!(rec.preview(), "short");
    }

    #[test]
    fn to_citation_drops_full_content() {
        let rec = EvidenceRecord::new("7", "Title", "full body text");
        let citation = rec.to_citation();
        assert_eq!(citation.id, "7");
        assert_eq!(citation.title, "Title");
        assert_eq!(citation.preview, "full body text");
    }
}
