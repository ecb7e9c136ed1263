//! Composite feature keys.
//!
//! A [`KeyTuple`] addresses one feature in one layer of one store. The wire
//! form base64-encodes each component independently and joins them with `.`,
//! so component text may itself contain dots without ambiguity.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use thiserror::Error;

/// Errors raised when decoding a composite key.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The composite string did not split into exactly three parts.
    #[error("composite key must have exactly 3 dot-separated parts, found {found}")]
    WrongArity {
        /// Number of parts produced by splitting on `.`.
        found: usize,
    },
    /// A part was not valid base64.
    #[error("key component {index} is not valid base64: {source}")]
    InvalidBase64 {
        /// Zero-based index of the offending component.
        index: usize,
        /// Decoder error returned by `base64`.
        #[source]
        source: base64::DecodeError,
    },
    /// A part decoded to bytes that are not UTF-8 text.
    #[error("key component {index} is not valid UTF-8")]
    InvalidUtf8 {
        /// Zero-based index of the offending component.
        index: usize,
    },
}

/// The (store, layer, feature) triple that globally addresses one feature.
///
/// # Examples
/// ```
/// use geofed_core::KeyTuple;
///
/// let key = KeyTuple::new("S1", "roads", "42");
/// let wire = key.encode();
/// assert_eq!(KeyTuple::decode(&wire).unwrap(), key);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyTuple {
    /// Identifier of the owning store.
    pub store_id: String,
    /// Identifier of the layer within the store.
    pub layer_id: String,
    /// Identifier of the feature within the layer.
    pub feature_id: String,
}

impl KeyTuple {
    /// Construct a key from plain, unencoded components.
    pub fn new(
        store_id: impl Into<String>,
        layer_id: impl Into<String>,
        feature_id: impl Into<String>,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            layer_id: layer_id.into(),
            feature_id: feature_id.into(),
        }
    }

    /// Encode the key into its `.`-separated wire form.
    ///
    /// Rust strings are UTF-8 by construction, so encoding cannot fail.
    pub fn encode(&self) -> String {
        [&self.store_id, &self.layer_id, &self.feature_id]
            .map(|part| BASE64.encode(part.as_bytes()))
            .join(".")
    }

    /// Decode a `.`-separated wire-form key.
    ///
    /// # Errors
    /// Returns [`KeyError`] when the input does not split into exactly three
    /// parts, a part is not valid base64, or a part decodes to non-UTF-8
    /// bytes.
    pub fn decode(composite: &str) -> Result<Self, KeyError> {
        let parts: Vec<&str> = composite.split('.').collect();
        if parts.len() != 3 {
            return Err(KeyError::WrongArity { found: parts.len() });
        }
        let decoded = parts
            .iter()
            .enumerate()
            .map(|(index, part)| {
                let bytes = BASE64
                    .decode(part)
                    .map_err(|source| KeyError::InvalidBase64 { index, source })?;
                String::from_utf8(bytes).map_err(|_| KeyError::InvalidUtf8 { index })
            })
            .collect::<Result<Vec<String>, KeyError>>()?;
        // Arity was checked above; the conversion cannot fail.
        let [store_id, layer_id, feature_id] = <[String; 3]>::try_from(decoded)
            .map_err(|parts| KeyError::WrongArity { found: parts.len() })?;
        Ok(Self {
            store_id,
            layer_id,
            feature_id,
        })
    }
}

impl std::fmt::Display for KeyTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.store_id, self.layer_id, self.feature_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("abc", "def", "123")]
    #[case("", "", "")]
    #[case("store.with.dots", "layer/slash", "id=padded+chars")]
    #[case("ünïcødé", "層", "🌍")]
    fn round_trips(#[case] store: &str, #[case] layer: &str, #[case] feature: &str) {
        let key = KeyTuple::new(store, layer, feature);
        let decoded = KeyTuple::decode(&key.encode()).unwrap();
        assert_eq!(decoded, key);
    }

    #[rstest]
    #[case("YQ==")]
    #[case("YQ==.YQ==")]
    #[case("YQ==.YQ==.YQ==.YQ==")]
    fn rejects_wrong_arity(#[case] composite: &str) {
        assert!(matches!(
            KeyTuple::decode(composite),
            Err(KeyError::WrongArity { .. })
        ));
    }

    #[rstest]
    fn rejects_invalid_base64() {
        let result = KeyTuple::decode("YQ==.!!!.YQ==");
        assert!(matches!(
            result,
            Err(KeyError::InvalidBase64 { index: 1, .. })
        ));
    }

    #[rstest]
    fn rejects_non_utf8_component() {
        // 0xFF is never valid UTF-8.
        let bad = BASE64.encode([0xFFu8]);
        let composite = format!("YQ==.YQ==.{bad}");
        assert!(matches!(
            KeyTuple::decode(&composite),
            Err(KeyError::InvalidUtf8 { index: 2 })
        ));
    }

    #[rstest]
    fn dot_in_component_does_not_confuse_the_separator() {
        let key = KeyTuple::new("a.b", "c", "d");
        let wire = key.encode();
        // Standard base64 never emits '.', so exactly two separators remain.
        assert_eq!(wire.matches('.').count(), 2);
        assert_eq!(KeyTuple::decode(&wire).unwrap(), key);
    }
}
