//! End-to-end tests for ingestion and chat turns through the pipeline.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FailingLlm, FlakyEmbedder, RecordingLlm, ShortBatchEmbedder, SlowLlm};
use ragchat_core::{
    ChatRequest, CompletionProvider, ConversationMessage, Document, EmbeddingProvider, HashEmbeddingProvider,
    InMemoryVectorIndex, RagConfig, RagError, RagPipeline, Role, SentenceChunker, VectorIndex,
};

const SKY: &str = "The sky is blue. Grass is green.";
const DIM: usize = 64;

fn small_config() -> RagConfig {
    RagConfig::builder()
        .chunk_size(20)
        .chunk_overlap(5)
        .similarity_threshold(-1.0)
        .build()
        .unwrap()
}

fn pipeline_with(config: RagConfig, llm: Arc<dyn CompletionProvider>) -> RagPipeline {
    RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(HashEmbeddingProvider::new(DIM)))
        .completion_provider(llm)
        .build()
        .unwrap()
}

#[tokio::test]
async fn ingest_then_retrieve_exact_chunk() {
    let pipeline = pipeline_with(small_config(), Arc::new(RecordingLlm::default()));

    assert_eq!(pipeline.ingest_document("sky", SKY).await.unwrap(), 2);

    let first = pipeline.vector_index().get("sky_0").await.unwrap();
    let results = pipeline.query(&first.text).await.unwrap();
    assert_eq!(results[0].chunk.id, "sky_0");
    assert!((results[0].score - 1.0).abs() < 1e-5);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn two_turns_record_four_messages_in_order() {
    let llm = Arc::new(RecordingLlm::default());
    let pipeline = pipeline_with(small_config(), llm.clone());
    pipeline.ingest_document("sky", SKY).await.unwrap();

    let first = pipeline.converse("s", "What colour is the sky?").await.unwrap();
    let second = pipeline.converse("s", "And the grass?").await.unwrap();
    assert_eq!(first, "reply 1 to: What colour is the sky?");
    assert_eq!(second, "reply 2 to: And the grass?");

    let history = pipeline.conversations().history("s").await;
    let turns: Vec<(Role, &str)> = history.iter().map(|m| (m.role, m.text.as_str())).collect();
    assert_eq!(
        turns,
        [
            (Role::User, "What colour is the sky?"),
            (Role::Assistant, first.as_str()),
            (Role::User, "And the grass?"),
            (Role::Assistant, second.as_str()),
        ]
    );

    let payloads = llm.payloads.lock().await;
    assert!(payloads[0].history.is_empty());
    assert_eq!(payloads[1].history.len(), 2);
    assert_eq!(payloads[1].query, "And the grass?");
    assert!(!payloads[1].retrieved.is_empty());
}

#[tokio::test]
async fn chat_reports_sources_and_generates_session() {
    let pipeline = pipeline_with(small_config(), Arc::new(RecordingLlm::default()));
    pipeline.ingest(&Document::new("sky", SKY).with_source_name("sky.txt")).await.unwrap();

    let response = pipeline.chat(ChatRequest::new("blue sky")).await.unwrap();
    assert_eq!(response.session_id.len(), 36);
    assert_eq!(response.sources.len(), 2);
    assert_eq!(response.sources[0].source_name.as_deref(), Some("sky.txt"));
    assert!(pipeline.conversations().session_exists(&response.session_id).await);
    assert_eq!(pipeline.conversations().message_count(&response.session_id).await, 2);
}

#[tokio::test]
async fn empty_document_is_rejected_without_changes() {
    let pipeline = pipeline_with(small_config(), Arc::new(RecordingLlm::default()));
    pipeline.ingest_document("sky", SKY).await.unwrap();

    let err = pipeline.ingest_document("blank", "   \n\t ").await.unwrap_err();
    assert!(matches!(err, RagError::EmptyDocument { ref document_id } if document_id == "blank"));
    assert_eq!(pipeline.stats().await.total_chunks, 2);

    let err = pipeline.ingest_document("empty", "").await.unwrap_err();
    assert!(matches!(err, RagError::EmptyDocument { .. }));
}

#[tokio::test]
async fn reingest_replaces_previous_chunks() {
    let pipeline = pipeline_with(small_config(), Arc::new(RecordingLlm::default()));
    pipeline.ingest_document("notes", &"word ".repeat(20)).await.unwrap();
    let before = pipeline.stats().await.total_chunks;

    pipeline.ingest_document("notes", SKY).await.unwrap();
    let stats = pipeline.stats().await;
    assert!(before > 2);
    assert_eq!(stats.total_chunks, 2);
    assert_eq!(stats.total_documents, 1);

    assert_eq!(pipeline.remove_document("notes").await, 2);
    assert_eq!(pipeline.stats().await.total_chunks, 0);
}

#[tokio::test]
async fn embedding_failure_leaves_index_and_history_unchanged() {
    let embedder = Arc::new(FlakyEmbedder::new(Arc::new(HashEmbeddingProvider::new(DIM))));
    let pipeline = RagPipeline::builder()
        .config(small_config())
        .embedding_provider(embedder.clone())
        .completion_provider(Arc::new(RecordingLlm::default()))
        .build()
        .unwrap();
    pipeline.ingest_document("sky", SKY).await.unwrap();

    embedder.set_failing(true);
    let err = pipeline.ingest_document("sky", &"other text ".repeat(10)).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingUnavailable { .. }));
    assert!(pipeline.vector_index().get("sky_0").await.is_some());
    assert_eq!(pipeline.stats().await.total_chunks, 2);

    let err = pipeline.converse("s", "blue?").await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingUnavailable { .. }));
    assert_eq!(pipeline.conversations().message_count("s").await, 0);

    // Retrieval off does not touch the embedder.
    let response = pipeline.chat(ChatRequest::new("hi").with_session("s").with_rag(false)).await;
    let response = response.unwrap();
    assert!(response.sources.is_empty());
    assert_eq!(pipeline.conversations().message_count("s").await, 2);
}

#[tokio::test]
async fn short_embedding_batch_is_rejected() {
    let pipeline = RagPipeline::builder()
        .config(small_config())
        .embedding_provider(Arc::new(ShortBatchEmbedder {
            inner: Arc::new(HashEmbeddingProvider::new(DIM)),
        }))
        .build()
        .unwrap();

    let err = pipeline.ingest_document("sky", SKY).await.unwrap_err();
    assert!(
        matches!(err, RagError::EmbeddingUnavailable { ref provider, .. } if provider == "pipeline")
    );
    assert!(pipeline.vector_index().is_empty().await);
}

#[tokio::test]
async fn llm_failure_leaves_history_unchanged() {
    let pipeline = pipeline_with(small_config(), Arc::new(FailingLlm));
    pipeline.ingest_document("sky", SKY).await.unwrap();

    let err = pipeline.converse("s", "What colour is the sky?").await.unwrap_err();
    assert!(matches!(err, RagError::LlmUnavailable { .. }));
    assert!(pipeline.conversations().history("s").await.is_empty());
}

#[tokio::test]
async fn missing_completion_provider_fails_turn() {
    let pipeline = RagPipeline::builder()
        .config(small_config())
        .embedding_provider(Arc::new(HashEmbeddingProvider::new(DIM)))
        .build()
        .unwrap();

    pipeline.ingest_document("sky", SKY).await.unwrap();
    assert!(!pipeline.query("sky").await.unwrap().is_empty());

    let err = pipeline.converse("s", "hello").await.unwrap_err();
    assert!(matches!(err, RagError::LlmUnavailable { ref provider, .. } if provider == "none"));
}

#[tokio::test]
async fn blank_messages_are_rejected() {
    let pipeline = pipeline_with(small_config(), Arc::new(RecordingLlm::default()));
    assert!(matches!(pipeline.converse("s", "  ").await, Err(RagError::EmptyQuery)));
    assert!(matches!(pipeline.query("").await, Err(RagError::EmptyQuery)));
    assert!(!pipeline.conversations().session_exists("s").await);
}

#[tokio::test]
async fn similarity_threshold_filters_results() {
    let config = RagConfig::builder().chunk_size(20).chunk_overlap(5).similarity_threshold(0.99);
    let pipeline = pipeline_with(config.build().unwrap(), Arc::new(RecordingLlm::default()));
    pipeline.ingest_document("sky", SKY).await.unwrap();

    assert!(pipeline.query("completely unrelated words").await.unwrap().is_empty());
}

#[tokio::test]
async fn history_is_trimmed_before_retrieved_chunks() {
    let config = RagConfig::builder()
        .chunk_size(20)
        .chunk_overlap(5)
        .similarity_threshold(-1.0)
        .max_context_chars(120)
        .build()
        .unwrap();
    let llm = Arc::new(RecordingLlm::default());
    let pipeline = pipeline_with(config, llm.clone());
    pipeline.ingest_document("sky", SKY).await.unwrap();

    for question in ["sky?", "grass?", "colour?"] {
        pipeline.converse("s", question).await.unwrap();
    }

    let payloads = llm.payloads.lock().await;
    let last = payloads.last().unwrap();
    assert_eq!(last.retrieved.len(), 2);
    assert!(last.history.is_empty());
    assert_eq!(last.trimmed_history, 4);
    assert_eq!(last.query, "colour?");
}

#[tokio::test]
async fn context_window_limits_history() {
    let config = RagConfig::builder()
        .chunk_size(20)
        .chunk_overlap(5)
        .context_window_size(2)
        .build()
        .unwrap();
    let llm = Arc::new(RecordingLlm::default());
    let pipeline = pipeline_with(config, llm.clone());

    for i in 0..4 {
        let request = ChatRequest::new(format!("message {i}")).with_session("s").with_rag(false);
        pipeline.chat(request).await.unwrap();
    }

    let payloads = llm.payloads.lock().await;
    let last = payloads.last().unwrap();
    assert_eq!(last.history.len(), 2);
    assert_eq!(last.history[0].text, "message 2");
    assert_eq!(last.history[1].role, Role::Assistant);
    assert_eq!(pipeline.conversations().message_count("s").await, 4);
}

#[tokio::test(start_paused = true)]
async fn cancelled_turn_commits_nothing() {
    let pipeline = pipeline_with(small_config(), Arc::new(SlowLlm::new(Duration::from_secs(10))));

    let outcome =
        tokio::time::timeout(Duration::from_secs(1), pipeline.converse("s", "hello")).await;
    assert!(outcome.is_err());
    assert_eq!(pipeline.conversations().message_count("s").await, 0);

    // The turn lock was released with the dropped future.
    pipeline.converse("s", "hello again").await.unwrap();
    assert_eq!(pipeline.conversations().message_count("s").await, 2);
}

#[tokio::test(start_paused = true)]
async fn turns_on_one_session_run_in_sequence() {
    let llm = Arc::new(SlowLlm::new(Duration::from_millis(100)));
    let pipeline = pipeline_with(small_config(), llm.clone());

    let started = tokio::time::Instant::now();
    let (a, b) = tokio::join!(pipeline.converse("s", "first"), pipeline.converse("s", "second"));
    a.unwrap();
    b.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(200));
    let mut lens = llm.history_lens.lock().await.clone();
    lens.sort();
    assert_eq!(lens, [0, 2]);
    assert_eq!(pipeline.conversations().message_count("s").await, 4);
}

#[tokio::test(start_paused = true)]
async fn turns_on_different_sessions_overlap() {
    let llm = Arc::new(SlowLlm::new(Duration::from_millis(100)));
    let pipeline = pipeline_with(small_config(), llm.clone());

    let started = tokio::time::Instant::now();
    let (a, b) = tokio::join!(pipeline.converse("s", "first"), pipeline.converse("t", "second"));
    a.unwrap();
    b.unwrap();

    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(*llm.history_lens.lock().await, [0, 0]);
}

#[tokio::test(start_paused = true)]
async fn session_limit_does_not_split_an_active_turn() {
    let config = RagConfig::builder().chunk_size(20).chunk_overlap(5).max_sessions(1).build().unwrap();
    let llm = Arc::new(SlowLlm::new(Duration::from_millis(100)));
    let pipeline = pipeline_with(config, llm.clone());

    let started = tokio::time::Instant::now();
    let (first, second) = tokio::join!(pipeline.converse("a", "first"), async {
        // A new session arrives while "a" is mid-turn and the store is full.
        tokio::time::sleep(Duration::from_millis(10)).await;
        pipeline.conversations().append("b", ConversationMessage::user("b", "hi")).await;
        pipeline.converse("a", "second").await
    });
    first.unwrap();
    second.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(200));
    let mut lens = llm.history_lens.lock().await.clone();
    lens.sort();
    assert_eq!(lens, [0, 2]);
    assert_eq!(pipeline.conversations().message_count("a").await, 4);
    assert_eq!(pipeline.conversations().session_ids().await, ["a"]);
}

#[tokio::test]
async fn failed_turn_neither_creates_nor_evicts_sessions() {
    let config = RagConfig::builder().chunk_size(20).chunk_overlap(5).max_sessions(1).build().unwrap();
    let pipeline = pipeline_with(config, Arc::new(FailingLlm));
    pipeline.conversations().append("a", ConversationMessage::user("a", "kept")).await;

    assert!(pipeline.converse("b", "hello").await.is_err());

    assert!(!pipeline.conversations().session_exists("b").await);
    assert_eq!(pipeline.conversations().message_count("a").await, 1);
}

#[tokio::test]
async fn custom_chunker_and_index_are_used() {
    let index = Arc::new(InMemoryVectorIndex::new(DIM));
    let pipeline = RagPipeline::builder()
        .config(small_config())
        .embedding_provider(Arc::new(HashEmbeddingProvider::new(DIM)))
        .vector_index(index.clone())
        .chunker(Arc::new(SentenceChunker::new(20, 0).unwrap()))
        .build()
        .unwrap();

    pipeline.ingest_document("sky", SKY).await.unwrap();
    let first = pipeline.vector_index().get("sky_0").await.unwrap();
    assert_eq!(first.text, "The sky is blue.");
    assert_eq!(index.len().await, 2);
}

#[test]
fn builder_rejects_inconsistent_parts() {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbeddingProvider::new(DIM));

    let missing_config = RagPipeline::builder().embedding_provider(embedder.clone()).build();
    assert!(matches!(missing_config, Err(RagError::InvalidConfiguration(_))));

    let missing_embedder = RagPipeline::builder().config(RagConfig::default()).build();
    assert!(matches!(missing_embedder, Err(RagError::InvalidConfiguration(_))));

    let wrong_dimension = RagPipeline::builder()
        .config(RagConfig { embedding_dimension: Some(DIM + 1), ..RagConfig::default() })
        .embedding_provider(embedder.clone())
        .build();
    assert!(matches!(wrong_dimension, Err(RagError::InvalidConfiguration(_))));

    let wrong_index = RagPipeline::builder()
        .config(RagConfig::default())
        .embedding_provider(embedder.clone())
        .vector_index(Arc::new(InMemoryVectorIndex::new(DIM * 2)))
        .build();
    assert!(matches!(wrong_index, Err(RagError::InvalidConfiguration(_))));

    let bad_overlap = RagPipeline::builder()
        .config(RagConfig { chunk_overlap: 2000, ..RagConfig::default() })
        .embedding_provider(embedder)
        .build();
    assert!(matches!(bad_overlap, Err(RagError::InvalidConfiguration(_))));
}
