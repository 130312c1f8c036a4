//! Tests for configuration defaults, validation and environment overlay.

use std::collections::HashMap;

use ragchat_core::{RagConfig, RagError};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> =
        vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_are_valid() {
    let config = RagConfig::default();
    assert_eq!(config.chunk_size, 1000);
    assert_eq!(config.chunk_overlap, 200);
    assert_eq!(config.context_window_size, 10);
    assert_eq!(config.top_k, 4);
    assert_eq!(config.effective_history_retention(), 20);
    assert!(config.validate().is_ok());
}

#[test]
fn builder_validates() {
    let config = RagConfig::builder().chunk_size(256).chunk_overlap(32).top_k(8).build().unwrap();
    assert_eq!((config.chunk_size, config.chunk_overlap, config.top_k), (256, 32, 8));

    let cases = [
        RagConfig::builder().chunk_size(0).chunk_overlap(0),
        RagConfig::builder().chunk_size(100).chunk_overlap(100),
        RagConfig::builder().top_k(0),
        RagConfig::builder().context_window_size(0),
        RagConfig::builder().max_context_chars(0),
        RagConfig::builder().context_window_size(10).history_retention(5),
        RagConfig::builder().similarity_threshold(f32::NAN),
    ];
    for builder in cases {
        assert!(matches!(builder.build(), Err(RagError::InvalidConfiguration(_))));
    }
}

#[test]
fn explicit_retention_overrides_default() {
    let config = RagConfig::builder().context_window_size(4).history_retention(50).build().unwrap();
    assert_eq!(config.effective_history_retention(), 50);
}

#[test]
fn environment_overlays_defaults() {
    let config = RagConfig::from_lookup(lookup(&[
        ("RAGCHAT_CHUNK_SIZE", "500"),
        ("RAGCHAT_CHUNK_OVERLAP", " 50 "),
        ("RAGCHAT_TOP_K", "6"),
        ("RAGCHAT_SIMILARITY_THRESHOLD", "0.25"),
        ("RAGCHAT_MAX_SESSIONS", "32"),
    ]))
    .unwrap();

    assert_eq!(config.chunk_size, 500);
    assert_eq!(config.chunk_overlap, 50);
    assert_eq!(config.top_k, 6);
    assert_eq!(config.similarity_threshold, 0.25);
    assert_eq!(config.max_sessions, Some(32));
    assert_eq!(config.max_chunks, None);
    assert_eq!(config.context_window_size, 10);
}

#[test]
fn environment_errors_name_the_variable() {
    let err = RagConfig::from_lookup(lookup(&[("RAGCHAT_TOP_K", "many")])).unwrap_err();
    assert!(err.to_string().contains("RAGCHAT_TOP_K"));

    let err = RagConfig::from_lookup(lookup(&[("RAGCHAT_CHUNK_OVERLAP", "5000")])).unwrap_err();
    assert!(matches!(err, RagError::InvalidConfiguration(_)));
}

#[test]
fn json_fills_missing_fields_with_defaults() {
    let config: RagConfig = serde_json::from_str(r#"{ "chunk_size": 400, "top_k": 2 }"#).unwrap();
    assert_eq!(config.chunk_size, 400);
    assert_eq!(config.top_k, 2);
    assert_eq!(config.chunk_overlap, 200);
    assert!(config.validate().is_ok());
}
