//! Records shared by ingestion, persistence, and the conversation layer.
//!
//! Field names follow the camelCase JSON layout already stored by the remote store, so the
//! same serialization is used on the wire, in the local store, and in the REST server.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Normalized category of a file's contents, derived from its name extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    /// Workbook formats (`xlsx`, `xls`).
    #[serde(rename = "xlsx")]
    TabularSpreadsheet,
    /// Delimiter-separated text (`csv`).
    #[serde(rename = "csv")]
    TabularText,
    /// Word-processor documents (`docx`).
    #[serde(rename = "docx")]
    RichDocument,
    /// Portable documents (`pdf`).
    #[serde(rename = "pdf")]
    PortableDocument,
    /// Plain text (`txt`).
    #[serde(rename = "txt")]
    PlainText,
    /// Structured text (`json`).
    #[serde(rename = "json")]
    StructuredText,
    /// Anything else.
    #[serde(rename = "unknown")]
    Unknown,
}

impl ContentKind {
    /// Short wire tag for the kind, as stored in the `type` field.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TabularSpreadsheet => "xlsx",
            Self::TabularText => "csv",
            Self::RichDocument => "docx",
            Self::PortableDocument => "pdf",
            Self::PlainText => "txt",
            Self::StructuredText => "json",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of municipal domains a file can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    /// Public finances.
    #[serde(rename = "Finanças")]
    Finance,
    /// Education.
    #[serde(rename = "Educação")]
    Education,
    /// Social development.
    #[serde(rename = "Desenvolvimento Social")]
    SocialDevelopment,
    /// Infrastructure.
    #[serde(rename = "Infraestrutura")]
    Infrastructure,
    /// Planning.
    #[serde(rename = "Planejamento")]
    Planning,
    /// Sports, culture, and leisure.
    #[serde(rename = "Esporte cultura e lazer")]
    SportsCultureLeisure,
    /// Health.
    #[serde(rename = "Saúde")]
    Health,
    /// Mayor's office.
    #[serde(rename = "Gabinete")]
    Cabinet,
    /// Uncategorized.
    #[default]
    #[serde(rename = "Geral")]
    General,
}

const CATEGORY_LABELS: [(Category, &str); 9] = [
    (Category::Finance, "Finanças"),
    (Category::Education, "Educação"),
    (Category::SocialDevelopment, "Desenvolvimento Social"),
    (Category::Infrastructure, "Infraestrutura"),
    (Category::Planning, "Planejamento"),
    (Category::SportsCultureLeisure, "Esporte cultura e lazer"),
    (Category::Health, "Saúde"),
    (Category::Cabinet, "Gabinete"),
    (Category::General, "Geral"),
];

impl Category {
    /// Every category, in display order.
    pub fn all() -> impl Iterator<Item = Category> {
        CATEGORY_LABELS.iter().map(|(category, _)| *category)
    }

    /// Human-facing label shown in listings and injected into the grounding context.
    pub fn label(self) -> &'static str {
        CATEGORY_LABELS
            .iter()
            .find(|(category, _)| *category == self)
            .map(|(_, label)| *label)
            .unwrap_or("Geral")
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    /// Accepts either the display label or the variant name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        CATEGORY_LABELS
            .iter()
            .find(|(category, label)| {
                label.to_lowercase() == wanted || format!("{category:?}").to_lowercase() == wanted
            })
            .map(|(category, _)| *category)
            .ok_or_else(|| {
                let known = Category::all().map(Category::label).collect::<Vec<_>>();
                format!("unknown category '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// Operator-supplied description of an uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Free-form description of the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Where the data came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Period covered by the data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    /// Name of the cases counted in the file (e.g. a disease or program).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_name: Option<String>,
    /// Domain the file belongs to.
    #[serde(default)]
    pub category: Category,
}

/// A document whose text has been extracted and is ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Opaque unique identifier.
    pub id: String,
    /// Display name, usually the original filename.
    pub name: String,
    /// Content kind detected from the filename.
    #[serde(rename = "type")]
    pub kind: ContentKind,
    /// Extracted text.
    pub content: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Operator metadata.
    #[serde(flatten)]
    pub metadata: FileMetadata,
}

impl UploadedFile {
    /// Build a new record with a fresh identifier and the current timestamp.
    pub fn new(
        name: impl Into<String>,
        kind: ContentKind,
        content: String,
        metadata: FileMetadata,
    ) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            kind,
            content,
            timestamp: now_millis(),
            metadata,
        }
    }
}

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The operator.
    User,
    /// The assistant; stored as `model` for compatibility with existing transcripts.
    #[serde(rename = "model", alias = "assistant")]
    Assistant,
}

/// Chart renderings the front end knows how to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// Vertical bars.
    Bar,
    /// Connected line.
    Line,
    /// Pie slices.
    Pie,
    /// Filled area under a line.
    Area,
}

/// Chart payload attached to an answer, kept exactly as the model produced it.
///
/// The usual shape is `{"type", "title", "description", "data": [{"label": .., <series>: ..}]}`,
/// but nothing is enforced: unknown keys, missing titles, unknown kinds and odd rows all
/// survive storage unchanged. The accessors read the common fields when they are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartData(Value);

impl ChartData {
    /// Wrap a payload as-is.
    pub fn new(payload: Value) -> Self {
        Self(payload)
    }

    /// Raw payload.
    pub fn payload(&self) -> &Value {
        &self.0
    }

    /// Rendering requested by the `type` field, when it names a known kind.
    pub fn kind(&self) -> Option<ChartKind> {
        self.0
            .get("type")
            .and_then(|kind| ChartKind::deserialize(kind).ok())
    }

    /// Chart title, when present.
    pub fn title(&self) -> Option<&str> {
        self.0.get("title").and_then(Value::as_str)
    }

    /// Row records under `data`; empty when absent or not an array.
    pub fn rows(&self) -> &[Value] {
        self.0
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Opaque unique identifier.
    pub id: String,
    /// Author.
    pub role: Role,
    /// Message body.
    pub text: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Set on the placeholder shown while a reply is being produced.
    #[serde(
        rename = "isLoading",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub pending: bool,
    /// Optional chart attached to an assistant reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_data: Option<ChartData>,
}

impl Message {
    /// New operator message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role: Role::User,
            text: text.into(),
            timestamp: now_millis(),
            pending: false,
            chart_data: None,
        }
    }

    /// Placeholder for an assistant reply that has not arrived yet.
    pub fn pending_reply() -> Self {
        Self {
            id: new_id(),
            role: Role::Assistant,
            text: String::new(),
            timestamp: now_millis(),
            pending: true,
            chart_data: None,
        }
    }

    /// Replace a pending placeholder with its final content, keeping the identifier.
    pub fn resolve(self, text: impl Into<String>, chart_data: Option<ChartData>) -> Self {
        Self {
            id: self.id,
            role: self.role,
            text: text.into(),
            timestamp: now_millis(),
            pending: false,
            chart_data,
        }
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uploaded_file_uses_flat_camel_case_layout() {
        let file = UploadedFile {
            id: "f1".into(),
            name: "dengue.csv".into(),
            kind: ContentKind::TabularText,
            content: "a,b".into(),
            timestamp: 10,
            metadata: FileMetadata {
                case_name: Some("Dengue".into()),
                category: Category::Health,
                ..FileMetadata::default()
            },
        };

        let value = serde_json::to_value(&file).expect("serialize");
        assert_eq!(
            value,
            json!({
                "id": "f1",
                "name": "dengue.csv",
                "type": "csv",
                "content": "a,b",
                "timestamp": 10,
                "caseName": "Dengue",
                "category": "Saúde"
            })
        );
        let back: UploadedFile = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, file);
    }

    #[test]
    fn missing_category_defaults_to_general() {
        let file: UploadedFile = serde_json::from_value(json!({
            "id": "x", "name": "n.txt", "type": "txt", "content": "", "timestamp": 1
        }))
        .expect("deserialize");
        assert_eq!(file.metadata.category, Category::General);
    }

    #[test]
    fn assistant_role_is_stored_as_model() {
        let message = Message::pending_reply().resolve("ok", None);
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["role"], "model");
        assert!(value.get("isLoading").is_none());

        let parsed: Role = serde_json::from_value(json!("assistant")).expect("alias");
        assert_eq!(parsed, Role::Assistant);
    }

    #[test]
    fn resolve_keeps_identifier_and_clears_pending() {
        let pending = Message::pending_reply();
        let id = pending.id.clone();
        assert!(pending.pending);

        let resolved = pending.resolve("done", None);
        assert_eq!(resolved.id, id);
        assert!(!resolved.pending);
        assert_eq!(resolved.text, "done");
    }

    #[test]
    fn messages_with_irregular_charts_still_decode() {
        let record = json!({
            "id": "m1",
            "role": "model",
            "text": "Veja",
            "timestamp": 5,
            "chartData": {"type": "radar", "data": [1, 2, 3], "colors": ["#f00"]}
        });
        let message: Message = serde_json::from_value(record.clone()).expect("decode");
        let chart = message.chart_data.as_ref().expect("chart");
        assert_eq!(chart.kind(), None);
        assert_eq!(chart.title(), None);
        assert_eq!(chart.rows().len(), 3);
        assert_eq!(serde_json::to_value(&message).expect("encode"), record);
    }

    #[test]
    fn chart_accessors_read_the_usual_fields() {
        let chart = ChartData::new(json!({
            "type": "line",
            "title": "Casos",
            "data": [{"label": "Jan", "value": 1}]
        }));
        assert_eq!(chart.kind(), Some(ChartKind::Line));
        assert_eq!(chart.title(), Some("Casos"));
        assert_eq!(chart.rows()[0]["label"], "Jan");
    }

    #[test]
    fn category_parses_labels_and_variant_names() {
        assert_eq!("saúde".parse::<Category>(), Ok(Category::Health));
        assert_eq!("Health".parse::<Category>(), Ok(Category::Health));
        assert_eq!(
            "Esporte cultura e lazer".parse::<Category>(),
            Ok(Category::SportsCultureLeisure)
        );
        let error = "weather".parse::<Category>().expect_err("unknown");
        assert!(error.contains("Saúde") && error.contains("Geral"));
        assert_eq!(Category::all().count(), 9);
        assert_eq!(Category::Cabinet.label(), "Gabinete");
    }
}
