//! Query-parameter encoding for `list_models`/`list_images`, bit-exact with
//! the server contract described in spec §4.2.

use tracing::warn;
use url::Url;

/// User-facing NSFW level strings accepted at the CLI/config layer.
/// Encoding differs between the models and images endpoints; see
/// [`QueryParameters::apply_to`] and [`ImageQueryParameters::apply_to`].
#[derive(Debug, Clone, Default)]
pub struct QueryParameters {
    pub sort: String,
    pub period: String,
    pub limit: u32,
    pub nsfw: String,
    pub types: Vec<String>,
    pub base_models: Vec<String>,
    pub usernames: Vec<String>,
    pub query: String,
    pub tag: String,
    pub primary_file_only: bool,
    pub cursor: Option<String>,
    pub page: u32,
}

/// Normalizes a CLI-level NSFW level string to the boolean the `models`
/// endpoint expects: "None" maps to `false`, anything else to `true`.
fn nsfw_level_to_bool(level: &str) -> &'static str {
    if level.eq_ignore_ascii_case("none") {
        "false"
    } else {
        "true"
    }
}

impl QueryParameters {
    /// Appends this parameter set's query string onto `url` per the
    /// `/models` endpoint encoding rules.
    pub fn apply_to(&self, url: &mut Url) {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("sort", &self.sort);
        pairs.append_pair("period", &self.period);
        pairs.append_pair("limit", &self.limit.to_string());
        pairs.append_pair("nsfw", nsfw_level_to_bool(&self.nsfw));

        for model_type in &self.types {
            pairs.append_pair("types", model_type);
        }
        for base_model in &self.base_models {
            pairs.append_pair("baseModels", base_model);
        }

        if let Some(username) = self.usernames.first() {
            pairs.append_pair("username", username);
        }
        if self.usernames.len() > 1 {
            warn!(
                count = self.usernames.len(),
                "multiple usernames configured; the API accepts one, only the first is sent"
            );
        }

        if !self.query.is_empty() {
            pairs.append_pair("query", &self.query);
        }
        if !self.tag.is_empty() {
            pairs.append_pair("tag", &self.tag);
        }
        if self.primary_file_only {
            pairs.append_pair("primaryFileOnly", "true");
        }
        if self.page >= 2 {
            if let Some(cursor) = self.cursor.as_deref() {
                pairs.append_pair("cursor", cursor);
            }
        }
    }

    /// A stable hash of the parameters that determine page identity, used
    /// as the pagination bookmark key (`current_page_<queryHash>`).
    /// Cursor and page number are deliberately excluded: the bookmark
    /// identifies a *query*, not a position within it.
    #[must_use]
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = seahash::SeaHasher::new();
        use std::hash::{Hash, Hasher};
        self.sort.hash(&mut hasher);
        self.period.hash(&mut hasher);
        self.limit.hash(&mut hasher);
        self.nsfw.hash(&mut hasher);
        self.types.hash(&mut hasher);
        self.base_models.hash(&mut hasher);
        self.usernames.first().hash(&mut hasher);
        self.query.hash(&mut hasher);
        self.tag.hash(&mut hasher);
        self.primary_file_only.hash(&mut hasher);
        hasher.finish()
    }
}

/// Parameters for `GET /images`. `nsfw` encoding differs from the models
/// endpoint: the literal string is forwarded unless it is "None" (mapped to
/// "false") or empty (omitted entirely).
#[derive(Debug, Clone, Default)]
pub struct ImageQueryParameters {
    pub limit: u32,
    pub post_id: Option<u64>,
    pub model_id: Option<u64>,
    pub model_version_id: Option<u64>,
    pub username: Option<String>,
    pub sort: String,
    pub period: String,
    pub nsfw: String,
}

impl ImageQueryParameters {
    pub fn apply_to(&self, url: &mut Url) {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("limit", &self.limit.to_string());
        if !self.sort.is_empty() {
            pairs.append_pair("sort", &self.sort);
        }
        if !self.period.is_empty() {
            pairs.append_pair("period", &self.period);
        }
        if let Some(post_id) = self.post_id {
            pairs.append_pair("postId", &post_id.to_string());
        }
        if let Some(model_id) = self.model_id {
            pairs.append_pair("modelId", &model_id.to_string());
        }
        if let Some(version_id) = self.model_version_id {
            pairs.append_pair("modelVersionId", &version_id.to_string());
        }
        if let Some(username) = self.username.as_deref().filter(|value| !value.is_empty()) {
            pairs.append_pair("username", username);
        }

        match self.nsfw.as_str() {
            "" => {}
            value if value.eq_ignore_ascii_case("none") => {
                pairs.append_pair("nsfw", "false");
            }
            value => {
                pairs.append_pair("nsfw", value);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://civitai.com/api/v1/models").unwrap()
    }

    #[test]
    fn encodes_required_fields_and_defaults_nsfw_false() {
        let params = QueryParameters {
            sort: "Highest Rated".to_string(),
            period: "Day".to_string(),
            limit: 66,
            nsfw: "None".to_string(),
            page: 1,
            ..Default::default()
        };
        let mut url = base_url();
        params.apply_to(&mut url);

        assert!(url.query().unwrap().contains("sort=Highest+Rated"));
        assert!(url.query().unwrap().contains("limit=66"));
        assert!(url.query().unwrap().contains("period=Day"));
        assert!(url.query().unwrap().contains("nsfw=false"));
        assert!(!url.query().unwrap().contains("baseModels"));
    }

    #[test]
    fn cursor_omitted_on_first_page() {
        let params = QueryParameters {
            page: 1,
            cursor: Some("abc".to_string()),
            ..Default::default()
        };
        let mut url = base_url();
        params.apply_to(&mut url);
        assert!(!url.query().unwrap().contains("cursor"));
    }

    #[test]
    fn cursor_present_on_later_pages() {
        let params = QueryParameters {
            page: 2,
            cursor: Some("abc".to_string()),
            ..Default::default()
        };
        let mut url = base_url();
        params.apply_to(&mut url);
        assert!(url.query().unwrap().contains("cursor=abc"));
    }

    #[test]
    fn only_first_username_is_forwarded() {
        let params = QueryParameters {
            usernames: vec!["alice".to_string(), "bob".to_string()],
            ..Default::default()
        };
        let mut url = base_url();
        params.apply_to(&mut url);
        assert!(url.query().unwrap().contains("username=alice"));
        assert!(!url.query().unwrap().contains("bob"));
    }

    #[test]
    fn stable_hash_ignores_cursor_and_page() {
        let mut a = QueryParameters {
            sort: "Newest".to_string(),
            page: 1,
            ..Default::default()
        };
        let mut b = a.clone();
        a.cursor = Some("x".to_string());
        b.cursor = Some("y".to_string());
        b.page = 5;
        assert_eq!(a.stable_hash(), b.stable_hash());
    }

    #[test]
    fn image_nsfw_none_maps_to_false_and_empty_is_omitted() {
        let mut params = ImageQueryParameters {
            nsfw: "None".to_string(),
            ..Default::default()
        };
        let mut url = Url::parse("https://civitai.com/api/v1/images").unwrap();
        params.apply_to(&mut url);
        assert!(url.query().unwrap().contains("nsfw=false"));

        params.nsfw = String::new();
        let mut url = Url::parse("https://civitai.com/api/v1/images").unwrap();
        params.apply_to(&mut url);
        assert!(!url.query().unwrap().contains("nsfw"));
    }

    #[test]
    fn image_nsfw_literal_is_forwarded_unchanged() {
        let params = ImageQueryParameters {
            nsfw: "Mature".to_string(),
            ..Default::default()
        };
        let mut url = Url::parse("https://civitai.com/api/v1/images").unwrap();
        params.apply_to(&mut url);
        assert!(url.query().unwrap().contains("nsfw=Mature"));
    }
}
