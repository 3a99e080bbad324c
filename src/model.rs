//! Read-only domain entities returned by the API Client.
//!
//! These types mirror the public model-hosting API's JSON payloads closely
//! enough to deserialize them directly, while normalizing a few dynamically
//! typed fields (see [`JsonValue`]) and dropping the cyclic
//! `ModelVersion -> Model -> [ModelVersion]` reference in favor of storing
//! only the parent id on the child.

use serde::{Deserialize, Serialize};

/// A dynamically typed API field that may arrive as a JSON number, string, or
/// an arbitrary nested object (`nsfwLevel`, `meta`, and similar fields).
///
/// Decoders accept all three shapes; the `Other` variant preserves the raw
/// JSON verbatim rather than attempting to coerce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonValue {
    /// A JSON number, represented as a signed 64-bit integer.
    Number(i64),
    /// A JSON string.
    Text(String),
    /// Anything else: object, array, bool, or null, kept as-is.
    Other(serde_json::Value),
}

impl JsonValue {
    /// Returns the numeric value if this is a `Number`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.parse().ok(),
            Self::Other(_) => None,
        }
    }

    /// Returns the string value if this is `Text`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Number(_) | Self::Other(_) => None,
        }
    }
}

/// Model type taxonomy exposed by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    Checkpoint,
    #[serde(rename = "LORA")]
    Lora,
    #[serde(rename = "VAE")]
    Vae,
    Hypernetwork,
    TextualInversion,
    #[serde(other)]
    Other,
}

impl ModelType {
    /// Returns the canonical API-facing name, used for path templates and
    /// query-parameter encoding.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkpoint => "Checkpoint",
            Self::Lora => "LORA",
            Self::Vae => "VAE",
            Self::Hypernetwork => "Hypernetwork",
            Self::TextualInversion => "TextualInversion",
            Self::Other => "Other",
        }
    }
}

/// Creator handle and optional avatar, embedded on both `Model` and
/// `DatabaseEntry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    pub username: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// File integrity hashes reported by the API. All fields are optional and
/// compared case-insensitively where hex digests are involved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileHashes {
    #[serde(rename = "AutoV2", default)]
    pub auto_v2: Option<String>,
    #[serde(rename = "SHA256", default)]
    pub sha256: Option<String>,
    #[serde(rename = "CRC32", default)]
    pub crc32: Option<String>,
    #[serde(rename = "BLAKE3", default)]
    pub blake3: Option<String>,
}

/// Freeform metadata attached to a file (precision, pruning state, storage
/// format).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(default)]
    pub fp: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

/// A single downloadable artifact attached to a `ModelVersion`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub id: u64,
    pub name: String,
    #[serde(rename = "sizeKB", default)]
    pub size_kb: f64,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
    #[serde(default)]
    pub hashes: FileHashes,
    #[serde(default)]
    pub metadata: FileMetadata,
}

impl File {
    /// Whether `metadata.format` equals "SafeTensor", case-insensitively.
    #[must_use]
    pub fn is_safetensor(&self) -> bool {
        self.metadata
            .format
            .as_deref()
            .is_some_and(|format| format.eq_ignore_ascii_case("safetensor"))
    }
}

/// A preview image attached to a model or a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelImage {
    pub id: u64,
    pub url: String,
    #[serde(default)]
    pub blurhash: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(rename = "nsfwLevel", default)]
    pub nsfw_level: Option<JsonValue>,
}

/// Aggregate engagement counters for a version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionStats {
    #[serde(rename = "downloadCount", default)]
    pub download_count: i64,
    #[serde(rename = "ratingCount", default)]
    pub rating_count: i64,
    #[serde(default)]
    pub rating: f64,
}

/// One immutable release of a `Model`, uniquely keyed by `id`.
///
/// Stores only `model_id` rather than embedding the parent `Model`, avoiding
/// the cyclic `ModelVersion <-> Model` reference the source API exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: u64,
    #[serde(rename = "modelId")]
    pub model_id: u64,
    pub name: String,
    #[serde(rename = "baseModel")]
    pub base_model: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub files: Vec<File>,
    #[serde(default)]
    pub images: Vec<ModelImage>,
    #[serde(default)]
    pub stats: VersionStats,
}

impl ModelVersion {
    /// Returns the file marked `primary`, if any. At most one should exist.
    #[must_use]
    pub fn primary_file(&self) -> Option<&File> {
        self.files.iter().find(|file| file.primary)
    }
}

/// A model, as returned by `list_models`/`get_model`. Read-only after
/// decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    pub creator: Creator,
    #[serde(default)]
    #[serde(rename = "modelVersions")]
    pub versions: Vec<ModelVersion>,
}

/// One page of `list_models`/`list_images` results plus the opaque cursor
/// for the next page.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn json_value_accepts_number_string_and_object() {
        let number: JsonValue = serde_json::from_str("3").unwrap();
        let text: JsonValue = serde_json::from_str(r#""Mature""#).unwrap();
        let other: JsonValue = serde_json::from_str(r#"{"level": 3}"#).unwrap();

        assert_eq!(number.as_i64(), Some(3));
        assert_eq!(text.as_text(), Some("Mature"));
        assert!(matches!(other, JsonValue::Other(_)));
    }

    #[test]
    fn file_is_safetensor_is_case_insensitive() {
        let mut file = sample_file();
        file.metadata.format = Some("SafeTensor".to_string());
        assert!(file.is_safetensor());

        file.metadata.format = Some("safetensor".to_string());
        assert!(file.is_safetensor());

        file.metadata.format = Some("pickletensor".to_string());
        assert!(!file.is_safetensor());
    }

    #[test]
    fn version_primary_file_picks_marked_file() {
        let mut version = sample_version();
        version.files[0].primary = false;
        version.files.push(File {
            primary: true,
            ..sample_file()
        });

        assert_eq!(version.primary_file().unwrap().primary, true);
    }

    fn sample_file() -> File {
        File {
            id: 1,
            name: "model.safetensors".to_string(),
            size_kb: 1024.0,
            kind: Some("Model".to_string()),
            primary: true,
            download_url: "https://example.com/file".to_string(),
            hashes: FileHashes::default(),
            metadata: FileMetadata::default(),
        }
    }

    fn sample_version() -> ModelVersion {
        ModelVersion {
            id: 1,
            model_id: 1,
            name: "v1".to_string(),
            base_model: "SD 1.5".to_string(),
            created_at: None,
            files: vec![sample_file()],
            images: Vec::new(),
            stats: VersionStats::default(),
        }
    }
}
