//! Filter Stage: a pure predicate over a candidate file, its model context,
//! and the effective configuration. No side effects, no I/O.

use crate::model::{File, ModelType};

/// The subset of configuration the Filter Stage consults.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    pub primary_only: bool,
    pub pruned: bool,
    pub fp16: bool,
    pub ignore_file_name_strings: Vec<String>,
    pub ignore_base_models: Vec<String>,
}

/// Returns `true` iff `file` is admissible for download under `config`,
/// given the version's `model_type` and `base_model`.
///
/// Pure: calling this repeatedly with the same inputs always returns the
/// same result.
#[must_use]
pub fn is_admissible(
    file: &File,
    model_type: ModelType,
    base_model: &str,
    config: &FilterConfig,
) -> bool {
    let has_crc32 = file
        .hashes
        .crc32
        .as_deref()
        .is_some_and(|value| !value.is_empty());
    if !has_crc32 {
        return false;
    }

    if config.primary_only && !file.primary {
        return false;
    }

    if !file.is_safetensor() {
        return false;
    }

    if model_type == ModelType::Checkpoint {
        if config.pruned
            && !file
                .metadata
                .size
                .as_deref()
                .is_some_and(|size| size.eq_ignore_ascii_case("pruned"))
        {
            return false;
        }
        if config.fp16
            && !file
                .metadata
                .fp
                .as_deref()
                .is_some_and(|fp| fp.eq_ignore_ascii_case("fp16"))
        {
            return false;
        }
    }

    let name_lower = file.name.to_ascii_lowercase();
    for needle in &config.ignore_file_name_strings {
        if name_lower.contains(&needle.to_ascii_lowercase()) {
            return false;
        }
    }

    let base_model_lower = base_model.to_ascii_lowercase();
    for needle in &config.ignore_base_models {
        if base_model_lower.contains(&needle.to_ascii_lowercase()) {
            return false;
        }
    }

    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{FileHashes, FileMetadata};

    fn safetensor_file() -> File {
        File {
            id: 1,
            name: "model-pruned-fp16.safetensors".to_string(),
            size_kb: 1024.0,
            kind: Some("Model".to_string()),
            primary: true,
            download_url: "https://example.com/file".to_string(),
            hashes: FileHashes {
                crc32: Some("abcd1234".to_string()),
                ..FileHashes::default()
            },
            metadata: FileMetadata {
                format: Some("SafeTensor".to_string()),
                size: Some("full".to_string()),
                fp: Some("fp16".to_string()),
            },
        }
    }

    #[test]
    fn missing_crc32_is_never_admissible() {
        let mut file = safetensor_file();
        file.hashes.crc32 = None;
        assert!(!is_admissible(
            &file,
            ModelType::Checkpoint,
            "SD 1.5",
            &FilterConfig::default()
        ));
    }

    #[test]
    fn non_safetensor_format_is_rejected() {
        let mut file = safetensor_file();
        file.metadata.format = Some("PickleTensor".to_string());
        assert!(!is_admissible(
            &file,
            ModelType::Checkpoint,
            "SD 1.5",
            &FilterConfig::default()
        ));
    }

    #[test]
    fn checkpoint_pruned_mismatch_excludes_full_size() {
        let file = safetensor_file();
        let config = FilterConfig {
            pruned: true,
            fp16: true,
            ..FilterConfig::default()
        };
        assert!(!is_admissible(&file, ModelType::Checkpoint, "SD 1.5", &config));
    }

    #[test]
    fn checkpoint_pruned_match_is_admitted() {
        let mut file = safetensor_file();
        file.metadata.size = Some("pruned".to_string());
        let config = FilterConfig {
            pruned: true,
            fp16: true,
            ..FilterConfig::default()
        };
        assert!(is_admissible(&file, ModelType::Checkpoint, "SD 1.5", &config));
    }

    #[test]
    fn non_checkpoint_types_ignore_pruned_and_fp16_flags() {
        let file = safetensor_file();
        let config = FilterConfig {
            pruned: true,
            fp16: true,
            ..FilterConfig::default()
        };
        assert!(is_admissible(&file, ModelType::Lora, "SD 1.5", &config));
    }

    #[test]
    fn ignore_file_name_strings_is_case_insensitive_substring_match() {
        let file = safetensor_file();
        let config = FilterConfig {
            ignore_file_name_strings: vec!["PRUNED".to_string()],
            ..FilterConfig::default()
        };
        assert!(!is_admissible(&file, ModelType::Checkpoint, "SD 1.5", &config));
    }

    #[test]
    fn ignore_base_models_is_case_insensitive_substring_match() {
        let file = safetensor_file();
        let config = FilterConfig {
            ignore_base_models: vec!["sdxl".to_string()],
            ..FilterConfig::default()
        };
        assert!(is_admissible(&file, ModelType::Checkpoint, "SD 1.5", &config));
        assert!(!is_admissible(&file, ModelType::Checkpoint, "SDXL 1.0", &config));
    }

    #[test]
    fn primary_only_excludes_non_primary_files() {
        let mut file = safetensor_file();
        file.primary = false;
        let config = FilterConfig {
            primary_only: true,
            ..FilterConfig::default()
        };
        assert!(!is_admissible(&file, ModelType::Checkpoint, "SD 1.5", &config));
    }

    #[test]
    fn is_pure_across_repeated_calls() {
        let file = safetensor_file();
        let config = FilterConfig::default();
        let first = is_admissible(&file, ModelType::Checkpoint, "SD 1.5", &config);
        let second = is_admissible(&file, ModelType::Checkpoint, "SD 1.5", &config);
        assert_eq!(first, second);
    }
}
