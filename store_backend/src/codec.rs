//! Bidirectional mapping between tuple keys and backend-native paths.
//!
//! Keys are rendered with `/` between segments (or through a positional
//! `filepath_template`), then wrapped in the optional `filepath_prefix` and
//! `filepath_suffix`. [`PathCodec::decode`] is the exact left inverse of
//! [`PathCodec::encode`] for every key the codec accepts.

use std::{collections::BTreeSet, path::MAIN_SEPARATOR};

use regex::Regex;

use crate::{StoreError, StoreKey, StoreResult, TupleStoreOptions, STORE_BACKEND_ID_KEY};

const SEPARATOR: char = '/';
const ALTERNATE_SEPARATOR: char = '\\';

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Literal(String),
    Placeholder(usize),
}

/// A parsed positional path template such as `{0}/{1}/foo-{1}.json`.
#[derive(Debug, Clone)]
pub struct FilepathTemplate {
    source: String,
    parts: Vec<TemplatePart>,
    key_length: usize,
    pattern: Regex,
}

impl FilepathTemplate {
    pub fn parse(source: &str, segment_pattern: &str) -> StoreResult<Self> {
        let placeholder = Regex::new(r"\{(\d+)\}").map_err(|e| StoreError::invalid_path(e.to_string()))?;

        let mut parts = Vec::new();
        let mut last = 0;
        for captures in placeholder.captures_iter(source) {
            let (Some(whole), Some(index)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if whole.start() > last {
                parts.push(TemplatePart::Literal(source[last..whole.start()].to_string()));
            }
            let index = index.as_str().parse::<usize>().map_err(|e| {
                StoreError::invalid_path(format!("invalid placeholder in {}: {}", source, e))
            })?;
            parts.push(TemplatePart::Placeholder(index));
            last = whole.end();
        }
        if last < source.len() {
            parts.push(TemplatePart::Literal(source[last..].to_string()));
        }

        let indices: BTreeSet<usize> = parts
            .iter()
            .filter_map(|part| match part {
                TemplatePart::Placeholder(i) => Some(*i),
                TemplatePart::Literal(_) => None,
            })
            .collect();
        let key_length = indices.len();
        if indices.iter().next_back().is_some_and(|max| *max >= key_length) {
            return Err(StoreError::invalid_path(format!(
                "filepath template {} must number its placeholders from {{0}} to {{{}}}",
                source,
                key_length.saturating_sub(1)
            )));
        }

        let mut pattern = String::from("^");
        for (group, part) in parts.iter().enumerate() {
            match part {
                TemplatePart::Literal(text) => pattern.push_str(&regex::escape(text)),
                TemplatePart::Placeholder(_) => {
                    pattern.push_str(&format!("(?P<p{}>{})", group, segment_pattern))
                }
            }
        }
        pattern.push('$');
        let pattern = Regex::new(&pattern).map_err(|e| StoreError::invalid_path(e.to_string()))?;

        Ok(Self {
            source: source.to_string(),
            parts,
            key_length,
            pattern,
        })
    }

    /// Number of distinct placeholders, which is the arity of accepted keys.
    pub fn key_length(&self) -> usize {
        self.key_length
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn render(&self, key: &StoreKey) -> StoreResult<String> {
        if key.len() != self.key_length {
            return Err(StoreError::invalid_path(format!(
                "key {} has {} elements but filepath template {} expects {}",
                key,
                key.len(),
                self.source,
                self.key_length
            )));
        }
        let segments = key.segments();
        let mut rendered = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Literal(text) => rendered.push_str(text),
                TemplatePart::Placeholder(i) => rendered.push_str(&segments[*i]),
            }
        }
        Ok(rendered)
    }

    fn extract(&self, path: &str) -> StoreResult<StoreKey> {
        let captures = self.pattern.captures(path).ok_or_else(|| {
            StoreError::invalid_path(format!(
                "path {} does not match filepath template {}",
                path, self.source
            ))
        })?;

        let mut segments: Vec<Option<String>> = vec![None; self.key_length];
        for (group, part) in self.parts.iter().enumerate() {
            let TemplatePart::Placeholder(index) = part else {
                continue;
            };
            let value = captures
                .name(&format!("p{}", group))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            match &segments[*index] {
                Some(existing) if *existing != value => {
                    return Err(StoreError::invalid_path(format!(
                        "path {} repeats placeholder {{{}}} with different values",
                        path, index
                    )))
                }
                _ => segments[*index] = Some(value),
            }
        }
        Ok(segments.into_iter().map(Option::unwrap_or_default).collect())
    }
}

/// Encoder/decoder between [`StoreKey`]s and native paths.
#[derive(Debug, Clone)]
pub struct PathCodec {
    backend: String,
    template: Option<FilepathTemplate>,
    prefix: Option<String>,
    suffix: Option<String>,
    forbidden_substrings: Vec<String>,
    native_separator: char,
}

impl PathCodec {
    /// Builds a codec and checks the options eagerly.
    ///
    /// With `platform_separator` set, native paths use the platform's main
    /// separator instead of `/`.
    pub fn new(backend: &str, options: &TupleStoreOptions, platform_separator: bool) -> StoreResult<Self> {
        if options.filepath_template.is_some() && options.filepath_suffix.is_some() {
            return Err(StoreError::invalid_path(
                "filepath_suffix may only be used when filepath_template is None",
            ));
        }
        if options.fixed_length_key && options.filepath_template.is_none() {
            return Err(StoreError::config(format!(
                "{} can only enforce fixed_length_key through a filepath_template",
                backend
            )));
        }

        // Both separators are always forbidden; configured substrings add to them.
        let mut forbidden_substrings = vec![SEPARATOR.to_string(), ALTERNATE_SEPARATOR.to_string()];
        for substring in &options.forbidden_substrings {
            if !substring.is_empty() && !forbidden_substrings.contains(substring) {
                forbidden_substrings.push(substring.clone());
            }
        }

        let prefix = options.filepath_prefix.clone().filter(|p| !p.is_empty());
        if let Some(prefix) = &prefix {
            if forbidden_substrings.iter().any(|s| prefix.ends_with(s.as_str())) {
                return Err(StoreError::store_backend(format!(
                    "Unable to initialize {}: filepath_prefix may not end with a forbidden substring. Current forbidden substrings are {:?}",
                    backend, forbidden_substrings
                )));
            }
        }

        let template = options
            .filepath_template
            .as_deref()
            .map(|t| FilepathTemplate::parse(t, "[^/]*"))
            .transpose()?;

        let native_separator = if platform_separator { MAIN_SEPARATOR } else { SEPARATOR };

        let codec = Self {
            backend: backend.to_string(),
            template,
            prefix,
            suffix: options.filepath_suffix.clone().filter(|s| !s.is_empty()),
            forbidden_substrings,
            native_separator,
        };
        codec.verify_reversible()?;
        Ok(codec)
    }

    /// Key arity imposed by the filepath template, if any.
    pub fn key_length(&self) -> Option<usize> {
        self.template.as_ref().map(FilepathTemplate::key_length)
    }

    pub fn filepath_prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn filepath_suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    pub fn native_separator(&self) -> char {
        self.native_separator
    }

    /// Rejects keys the codec cannot map losslessly.
    pub fn validate_key(&self, key: &StoreKey) -> StoreResult<()> {
        if key.is_empty() && self.template.is_none() {
            return Err(StoreError::invalid_path(format!(
                "{} cannot store the empty key without a filepath_template",
                self.backend
            )));
        }
        for segment in key.segments() {
            for forbidden in &self.forbidden_substrings {
                if segment.contains(forbidden.as_str()) {
                    return Err(StoreError::invalid_path(format!(
                        "Keys in {} must not contain substrings in {:?} : {}",
                        self.backend, self.forbidden_substrings, key
                    )));
                }
            }
        }
        if let Some(length) = self.key_length() {
            if key.len() != length && !key.is_store_backend_id() {
                return Err(StoreError::invalid_path(format!(
                    "Key {} has length {}, but {} requires keys of length {}",
                    key,
                    key.len(),
                    self.backend,
                    length
                )));
            }
        }
        Ok(())
    }

    /// Maps a key to its native path.
    ///
    /// The reserved backend-id key bypasses the template and suffix but
    /// still lives under the filepath prefix.
    pub fn encode(&self, key: &StoreKey) -> StoreResult<String> {
        self.validate_key(key)?;

        let mut path = if key.is_store_backend_id() {
            STORE_BACKEND_ID_KEY.to_string()
        } else {
            let mut body = match &self.template {
                Some(template) => template.render(key)?,
                None => key.segments().join("/"),
            };
            if let Some(suffix) = &self.suffix {
                body.push_str(suffix);
            }
            if body.is_empty() {
                return Err(StoreError::invalid_path(format!(
                    "Key {} maps to an empty path in {}",
                    key, self.backend
                )));
            }
            body
        };
        if let Some(prefix) = &self.prefix {
            path = format!("{}{}{}", prefix, SEPARATOR, path);
        }
        Ok(self.to_native(path))
    }

    /// Maps a native path back to its key.
    pub fn decode(&self, native_path: &str) -> StoreResult<StoreKey> {
        let path = self.from_native(native_path);
        if path == STORE_BACKEND_ID_KEY {
            return Ok(StoreKey::store_backend_id());
        }

        let mut rest = path.as_str();
        if let Some(prefix) = &self.prefix {
            rest = rest
                .strip_prefix(prefix.as_str())
                .and_then(|r| r.strip_prefix(SEPARATOR))
                .ok_or_else(|| {
                    StoreError::invalid_path(format!(
                        "filepath {} must start with the filepath_prefix {}",
                        native_path, prefix
                    ))
                })?;
        }
        if rest == STORE_BACKEND_ID_KEY {
            return Ok(StoreKey::store_backend_id());
        }
        if let Some(suffix) = &self.suffix {
            rest = rest.strip_suffix(suffix.as_str()).ok_or_else(|| {
                StoreError::invalid_path(format!(
                    "filepath {} must end with the filepath_suffix {}",
                    native_path, suffix
                ))
            })?;
        }

        match &self.template {
            Some(template) => template.extract(rest),
            None => Ok(rest.split(SEPARATOR).collect()),
        }
    }

    fn to_native(&self, path: String) -> String {
        if self.native_separator == SEPARATOR {
            path
        } else {
            path.replace(SEPARATOR, &self.native_separator.to_string())
        }
    }

    fn from_native(&self, path: &str) -> String {
        if self.native_separator == SEPARATOR {
            path.to_string()
        } else {
            path.replace(self.native_separator, &SEPARATOR.to_string())
        }
    }

    /// Round-trips a random key through the template at construction time.
    fn verify_reversible(&self) -> StoreResult<()> {
        let Some(template) = &self.template else {
            return Ok(());
        };
        let sample: StoreKey = (0..template.key_length())
            .map(|_| uuid::Uuid::new_v4().simple().to_string()[..4].to_uppercase())
            .collect();
        let reversible = self
            .encode(&sample)
            .and_then(|path| self.decode(&path))
            .is_ok_and(|decoded| decoded == sample);
        if !reversible {
            return Err(StoreError::invalid_path(format!(
                "filepath template {} for class {} is not reversible for a tuple of length {}. Have you included all elements in the key tuple?",
                template.as_str(),
                self.backend,
                template.key_length()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(options: TupleStoreOptions) -> PathCodec {
        PathCodec::new("TestBackend", &options, false).unwrap()
    }

    #[test]
    fn test_two_way_string_conversion() {
        let codec = codec(TupleStoreOptions {
            filepath_template: Some("{0}/{1}/{2}/foo-{2}-expectations.txt".to_string()),
            ..Default::default()
        });
        let key = StoreKey::from(["A__a", "B-b", "C"]);
        let path = codec.encode(&key).unwrap();
        assert_eq!(path, "A__a/B-b/C/foo-C-expectations.txt");
        assert_eq!(codec.decode("A__a/B-b/C/foo-C-expectations.txt").unwrap(), key);

        let err = codec.encode(&StoreKey::from(["A/a", "B-b", "C"])).unwrap_err();
        assert!(err.is_invalid_path());
    }

    #[test]
    fn test_repeated_placeholder_must_agree() {
        let codec = codec(TupleStoreOptions {
            filepath_template: Some("{0}/{1}/{2}/foo-{2}-expectations.txt".to_string()),
            ..Default::default()
        });
        assert!(codec
            .decode("A/B/C/foo-D-expectations.txt")
            .unwrap_err()
            .is_invalid_path());
    }

    #[test]
    fn test_prefix_and_suffix() {
        let codec = codec(TupleStoreOptions {
            filepath_prefix: Some("foo__".to_string()),
            filepath_suffix: Some("__bar.json".to_string()),
            ..Default::default()
        });
        let key = StoreKey::from(["my_suite"]);
        assert_eq!(codec.encode(&key).unwrap(), "foo__/my_suite__bar.json");
        assert_eq!(codec.decode("foo__/my_suite__bar.json").unwrap(), key);
        assert_eq!(
            codec.encode(&StoreKey::store_backend_id()).unwrap(),
            "foo__/.ge_store_backend_id"
        );
        assert_eq!(
            codec.decode("foo__/.ge_store_backend_id").unwrap(),
            StoreKey::store_backend_id()
        );
        assert!(codec.decode("other/my_suite__bar.json").is_err());
        assert!(codec.decode("foo__/my_suite.yml").is_err());
    }

    #[test]
    fn test_multi_segment_round_trip() {
        let codec = codec(TupleStoreOptions::default());
        for key in [
            StoreKey::from(["a"]),
            StoreKey::from(["a", "b", "c"]),
            StoreKey::from(["suite", "run", "20230315T205136.109084Z", "batch#1"]),
        ] {
            let path = codec.encode(&key).unwrap();
            assert_eq!(codec.decode(&path).unwrap(), key);
        }
    }

    #[test]
    fn test_filepath_prefix_may_not_end_with_separator() {
        for prefix in ["invalid_prefix_ends_with/", "invalid_prefix_ends_with\\"] {
            let err = PathCodec::new(
                "TupleFilesystemStoreBackend",
                &TupleStoreOptions {
                    filepath_prefix: Some(prefix.to_string()),
                    ..Default::default()
                },
                false,
            )
            .unwrap_err();
            assert!(err.is_store_backend_error());
            assert!(err.to_string().contains("filepath_prefix may not end with"));
        }
    }

    #[test]
    fn test_template_and_suffix_are_exclusive() {
        let err = PathCodec::new(
            "TestBackend",
            &TupleStoreOptions {
                filepath_template: Some("{0}.json".to_string()),
                filepath_suffix: Some(".json".to_string()),
                ..Default::default()
            },
            false,
        )
        .unwrap_err();
        assert!(err.is_invalid_path());
    }

    #[test]
    fn test_template_fixes_key_length() {
        let codec = codec(TupleStoreOptions {
            filepath_template: Some("my_file_{0}".to_string()),
            ..Default::default()
        });
        assert_eq!(codec.key_length(), Some(1));
        assert!(codec.encode(&StoreKey::from(["a", "b"])).is_err());
        assert_eq!(codec.encode(&StoreKey::store_backend_id()).unwrap(), ".ge_store_backend_id");
    }

    #[test]
    fn test_irreversible_template_is_rejected() {
        let err = PathCodec::new(
            "TestBackend",
            &TupleStoreOptions {
                filepath_template: Some("{0}{1}".to_string()),
                ..Default::default()
            },
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("is not reversible"));

        let err = PathCodec::new(
            "TestBackend",
            &TupleStoreOptions {
                filepath_template: Some("{0}/{2}".to_string()),
                ..Default::default()
            },
            false,
        )
        .unwrap_err();
        assert!(err.is_invalid_path());
    }

    #[test]
    fn test_separators_are_always_forbidden() {
        let codec = codec(TupleStoreOptions {
            forbidden_substrings: vec![],
            ..Default::default()
        });
        for segment in ["a/b", "a\\b"] {
            let err = codec.encode(&StoreKey::from([segment])).unwrap_err();
            assert!(err.is_invalid_path());
        }

        let codec = codec_with_forbidden(vec![":".to_string()]);
        assert!(codec.encode(&StoreKey::from(["a:b"])).unwrap_err().is_invalid_path());
        assert!(codec.encode(&StoreKey::from(["a/b"])).unwrap_err().is_invalid_path());
        assert_eq!(codec.encode(&StoreKey::from(["a.b"])).unwrap(), "a.b");
    }

    fn codec_with_forbidden(forbidden_substrings: Vec<String>) -> PathCodec {
        codec(TupleStoreOptions {
            forbidden_substrings,
            ..Default::default()
        })
    }

    #[test]
    fn test_empty_key_needs_a_template() {
        let empty = StoreKey::from(Vec::<String>::new());
        let plain = codec(TupleStoreOptions::default());
        assert!(plain.encode(&empty).unwrap_err().is_invalid_path());
        assert!(plain.encode(&StoreKey::from([""])).unwrap_err().is_invalid_path());

        let singleton = codec(TupleStoreOptions {
            filepath_template: Some("singleton.json".to_string()),
            ..Default::default()
        });
        assert_eq!(singleton.encode(&empty).unwrap(), "singleton.json");
        assert_eq!(singleton.decode("singleton.json").unwrap(), empty);
    }

    #[test]
    fn test_fixed_length_key_requires_a_template() {
        let err = PathCodec::new(
            "TestBackend",
            &TupleStoreOptions {
                fixed_length_key: true,
                ..Default::default()
            },
            false,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Config { .. }));
        assert!(err.to_string().contains("fixed_length_key"));

        let codec = codec(TupleStoreOptions {
            filepath_template: Some("{0}/{1}.json".to_string()),
            fixed_length_key: true,
            ..Default::default()
        });
        assert_eq!(codec.encode(&StoreKey::from(["a", "b"])).unwrap(), "a/b.json");
        assert!(codec.encode(&StoreKey::from(["a"])).unwrap_err().is_invalid_path());
    }
}
