use llm_relay::domain::Provider;
use llm_relay::proxy::compute_cache_key;
use proptest::collection::btree_map;
use proptest::prelude::*;
use std::collections::BTreeMap;

pub mod generators {
    use super::*;
    use proptest::string::string_regex;

    pub fn provider() -> impl Strategy<Value = Provider> {
        prop_oneof![
            Just(Provider::OpenAI),
            Just(Provider::AzureOpenAI),
            Just(Provider::Anthropic),
            Just(Provider::CustomModel),
        ]
    }

    pub fn path() -> impl Strategy<Value = String> {
        string_regex("/v1/[a-z]{1,12}(/[a-z]{1,8})?").unwrap()
    }

    /// Flat JSON objects with distinct keys
    pub fn fields() -> impl Strategy<Value = BTreeMap<String, i64>> {
        btree_map(string_regex("[a-z_]{1,10}").unwrap(), any::<i64>(), 1..8)
    }
}

/// Render an object with its keys in the given order
fn render<'a>(fields: impl Iterator<Item = (&'a String, &'a i64)>) -> String {
    let body: Vec<String> = fields
        .map(|(key, value)| format!("{}:{value}", serde_json::Value::String(key.clone())))
        .collect();
    format!("{{{}}}", body.join(","))
}

proptest! {
    #[test]
    fn cache_key_is_deterministic(
        provider in generators::provider(),
        path in generators::path(),
        body in any::<Vec<u8>>(),
    ) {
        prop_assert_eq!(
            compute_cache_key(provider, &path, &body),
            compute_cache_key(provider, &path, &body)
        );
    }

    #[test]
    fn cache_key_ignores_json_key_order(
        provider in generators::provider(),
        path in generators::path(),
        fields in generators::fields(),
    ) {
        let forward = render(fields.iter());
        let reversed = render(fields.iter().rev());

        prop_assert_eq!(
            compute_cache_key(provider, &path, forward.as_bytes()),
            compute_cache_key(provider, &path, reversed.as_bytes())
        );
    }

    #[test]
    fn cache_key_ignores_json_whitespace(
        provider in generators::provider(),
        fields in generators::fields(),
    ) {
        let compact = render(fields.iter());
        let spaced = serde_json::to_string_pretty(&fields).unwrap();

        prop_assert_eq!(
            compute_cache_key(provider, "/v1/chat/completions", compact.as_bytes()),
            compute_cache_key(provider, "/v1/chat/completions", spaced.as_bytes())
        );
    }

    #[test]
    fn cache_key_depends_on_path(
        provider in generators::provider(),
        first in generators::path(),
        second in generators::path(),
        fields in generators::fields(),
    ) {
        prop_assume!(first != second);
        let body = render(fields.iter());

        prop_assert_ne!(
            compute_cache_key(provider, &first, body.as_bytes()),
            compute_cache_key(provider, &second, body.as_bytes())
        );
    }

    #[test]
    fn cache_key_is_lower_hex(
        provider in generators::provider(),
        path in generators::path(),
        body in any::<Vec<u8>>(),
    ) {
        let key = compute_cache_key(provider, &path, &body);
        let key: &str = key.as_ref();
        prop_assert_eq!(key.len(), 64);
        prop_assert!(key.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
    }
}
