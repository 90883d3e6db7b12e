//! End-to-end pipeline tests against in-memory fakes
//!
//! External collaborators (dense indices, chat models, reranker) are
//! replaced with scripted fakes so retrieval semantics are exercised
//! deterministically.

use async_trait::async_trait;
use leaselaw_core::llm::prompts::NO_RESULT_ANSWER;
use leaselaw_core::search::keys;
use leaselaw_core::{
    AskOptions, ChatClient, ChatMessage, DenseIndex, Document, LeaselawError, Reranker,
    RetrievalConfig, RetrievalPipeline, Result, SourceIndex,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------- fakes

struct FakeIndex {
    docs: Vec<Document>,
}

impl FakeIndex {
    fn new(docs: Vec<Document>) -> Arc<Self> {
        Arc::new(Self { docs })
    }

    fn empty() -> Arc<Self> {
        Arc::new(Self { docs: Vec::new() })
    }
}

#[async_trait]
impl DenseIndex for FakeIndex {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<(Document, Option<f32>)>> {
        Ok(self
            .docs
            .iter()
            .take(k)
            .enumerate()
            .map(|(i, d)| (d.clone(), Some(0.9 - 0.01 * i as f32)))
            .collect())
    }

    async fn search_filtered(
        &self,
        _query: &str,
        k: usize,
        field: &str,
        value: &str,
    ) -> Result<Vec<(Document, Option<f32>)>> {
        Ok(self
            .docs
            .iter()
            .filter(|d| d.meta_str(field).as_deref() == Some(value))
            .take(k)
            .map(|d| (d.clone(), Some(0.5)))
            .collect())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FailingIndex;

#[async_trait]
impl DenseIndex for FailingIndex {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<(Document, Option<f32>)>> {
        Err(LeaselawError::Service("index unreachable".to_string()))
    }

    async fn search_filtered(
        &self,
        _query: &str,
        _k: usize,
        _field: &str,
        _value: &str,
    ) -> Result<Vec<(Document, Option<f32>)>> {
        Err(LeaselawError::Service("index unreachable".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Chat fake that either answers with a fixed reply or fails. Records
/// the last system prompt it saw.
struct FakeChat {
    reply: Option<String>,
    last_system: Mutex<Option<String>>,
}

impl FakeChat {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            last_system: Mutex::new(None),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            last_system: Mutex::new(None),
        })
    }

    fn seen_system(&self) -> Option<String> {
        self.last_system.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String> {
        if let Some(system) = messages.iter().find(|m| m.role == "system") {
            *self.last_system.lock().unwrap() = Some(system.content.clone());
        }
        self.reply
            .clone()
            .ok_or_else(|| LeaselawError::Service("chat model down".to_string()))
    }

    fn model_name(&self) -> &str {
        "fake-chat"
    }
}

/// Reranker fake scoring document i with `scores[i]` (0.5 when absent),
/// returning pairs ordered by score descending.
struct FakeReranker {
    scores: Option<Vec<f64>>,
}

impl FakeReranker {
    fn scoring(scores: Vec<f64>) -> Arc<Self> {
        Arc::new(Self {
            scores: Some(scores),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self { scores: None })
    }
}

#[async_trait]
impl Reranker for FakeReranker {
    async fn rerank(&self, _query: &str, documents: &[String]) -> Result<Vec<(usize, f64)>> {
        let scores = self
            .scores
            .as_ref()
            .ok_or_else(|| LeaselawError::Service("reranker down".to_string()))?;
        let mut pairs: Vec<(usize, f64)> = (0..documents.len())
            .map(|i| (i, scores.get(i).copied().unwrap_or(0.5)))
            .collect();
        pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
        Ok(pairs)
    }

    fn model_name(&self) -> &str {
        "fake-rerank"
    }
}

// -------------------------------------------------------------- helpers

fn law_doc(chunk_id: &str, article: &str, priority: i64, content: &str) -> Document {
    Document::with_metadata(
        content,
        [
            ("chunk_id".to_string(), json!(chunk_id)),
            ("src_title".to_string(), json!("주택임대차보호법")),
            ("title".to_string(), json!("주택임대차보호법")),
            ("article".to_string(), json!(article)),
            ("priority".to_string(), json!(priority)),
        ]
        .into_iter()
        .collect(),
    )
}

fn rule_doc(chunk_id: &str, article: &str, content: &str) -> Document {
    Document::with_metadata(
        content,
        [
            ("chunk_id".to_string(), json!(chunk_id)),
            ("src_title".to_string(), json!("주택임대차보호법 시행령")),
            ("title".to_string(), json!("주택임대차보호법 시행령")),
            ("article".to_string(), json!(article)),
            ("priority".to_string(), json!(3)),
        ]
        .into_iter()
        .collect(),
    )
}

fn case_chunk(chunk_id: &str, case_no: &str, content: &str) -> Document {
    Document::with_metadata(
        content,
        [
            ("chunk_id".to_string(), json!(chunk_id)),
            ("src_title".to_string(), json!("대법원 판례")),
            ("title".to_string(), json!(format!("대법원 {case_no}"))),
            ("case_no".to_string(), json!(case_no)),
        ]
        .into_iter()
        .collect(),
    )
}

fn chunk_ids(docs: &[Document]) -> Vec<String> {
    docs.iter()
        .map(|d| d.meta_str("chunk_id").unwrap_or_default())
        .collect()
}

fn basic_pipeline(
    law: Arc<dyn DenseIndex>,
    rule: Arc<dyn DenseIndex>,
    case: Arc<dyn DenseIndex>,
    generator: Arc<dyn ChatClient>,
) -> RetrievalPipeline {
    RetrievalPipeline::new(
        RetrievalConfig::default(),
        law,
        rule,
        case,
        Arc::new(leaselaw_core::RegexTokenizer::default()),
        generator,
    )
    .unwrap()
}

fn seeded_case_index() -> Arc<FakeIndex> {
    FakeIndex::new(vec![
        case_chunk("c", "2020다12345", "셋째 단락"),
        case_chunk("a", "2020다12345", "첫째 단락"),
        case_chunk("d", "2020다12345", "넷째 단락"),
        case_chunk("b", "2020다12345", "둘째 단락"),
    ])
}

// ------------------------------------------------------------ scenarios

/// S1: plain-law question without upload.
#[tokio::test]
async fn plain_law_question_yields_sections_and_normalized_query() {
    let law = FakeIndex::new(vec![
        law_doc("l1", "제3조", 1, "임차인이 주택의 인도와 주민등록을 마친 때에는 대항력이 생긴다"),
        law_doc("l2", "제8조", 1, "임차인은 보증금 중 일정액을 우선하여 변제받을 권리가 있다"),
    ]);
    let rule = FakeIndex::new(vec![rule_doc("r1", "제2조", "우선변제를 받을 임차인의 범위")]);
    let case = seeded_case_index();

    let generator = FakeChat::replying("임대인은 보증금을 반환하여야 합니다.");
    let normalizer = FakeChat::replying("집주인(임대인)이 보증금(임대차보증금)을 안 돌려줘요");
    let pipeline = basic_pipeline(law, rule, case, generator).with_normalizer(normalizer);

    let trace = pipeline
        .answer_with_trace("집주인이 보증금을 안 돌려줘요", &AskOptions::default())
        .await
        .unwrap();

    assert!(trace.normalized_query.contains("임대인"));
    assert!(trace.normalized_query.contains("보증금"));
    assert!(!trace.references.is_empty());

    let result = pipeline.retrieve_with_context(&trace.normalized_query).await.unwrap();
    assert!(result.context.contains("[SECTION 1"));
    assert!(result.context.contains("[SECTION 3"));
    assert!(result
        .docs
        .iter()
        .any(|d| d.meta_str("case_no").is_some()));
}

/// S2: all three sources empty.
#[tokio::test]
async fn empty_sources_return_fixed_no_result_answer() {
    let pipeline = basic_pipeline(
        FakeIndex::empty(),
        FakeIndex::empty(),
        FakeIndex::empty(),
        FakeChat::replying("unused"),
    );

    let trace = pipeline
        .answer_with_trace("보증금 반환", &AskOptions::default())
        .await
        .unwrap();
    assert_eq!(trace.answer, NO_RESULT_ANSWER);
    assert!(trace.references.is_empty());
    assert!(trace.docs.is_empty());
}

/// S3: reranker failure keeps the pre-rerank fused order.
#[tokio::test]
async fn reranker_failure_keeps_fused_order() {
    let law_docs = vec![
        law_doc("l1", "제3조", 1, "대항력과 주민등록"),
        law_doc("l2", "제4조", 1, "임대차 기간은 2년으로 본다"),
        law_doc("l3", "제7조", 1, "차임 증액 청구의 상한"),
    ];

    let plain = basic_pipeline(
        FakeIndex::new(law_docs.clone()),
        FakeIndex::empty(),
        FakeIndex::empty(),
        FakeChat::replying("answer"),
    );
    let broken = basic_pipeline(
        FakeIndex::new(law_docs),
        FakeIndex::empty(),
        FakeIndex::empty(),
        FakeChat::replying("answer"),
    )
    .with_reranker(FakeReranker::failing());

    let baseline = plain.retrieve("차임 증액").await.unwrap();
    let degraded = broken.retrieve("차임 증액").await.unwrap();
    assert_eq!(chunk_ids(&baseline), chunk_ids(&degraded));
}

/// S4: case expansion reassembles all chunks in chunk_id order.
#[tokio::test]
async fn case_expansion_joins_chunks_in_chunk_id_order() {
    let pipeline = basic_pipeline(
        FakeIndex::empty(),
        FakeIndex::empty(),
        seeded_case_index(),
        FakeChat::replying("answer"),
    );

    let docs = pipeline.retrieve("보증금 반환 판례").await.unwrap();
    let cases: Vec<&Document> = docs
        .iter()
        .filter(|d| d.meta_str("case_no").is_some())
        .collect();
    assert_eq!(cases.len(), 1);

    let case = cases[0];
    assert!(case.meta_flag(keys::EXPANDED));
    assert_eq!(
        case.content,
        "[판례 전문: 대법원 2020다12345]\n첫째 단락\n둘째 단락\n셋째 단락\n넷째 단락"
    );
}

/// S5: final ordering follows priority, ascending.
#[tokio::test]
async fn final_list_sorts_by_priority_ascending() {
    let law = FakeIndex::new(vec![
        law_doc("p9", "제1조", 9, "본문 9"),
        law_doc("p1", "제2조", 1, "본문 1"),
        law_doc("p5", "제3조", 5, "본문 5"),
        law_doc("p3", "제4조", 3, "본문 3"),
    ]);
    let pipeline = basic_pipeline(
        law,
        FakeIndex::empty(),
        FakeIndex::empty(),
        FakeChat::replying("answer"),
    );

    let docs = pipeline.retrieve("본문").await.unwrap();
    let priorities: Vec<i64> = docs.iter().map(Document::priority).collect();
    assert_eq!(priorities, vec![1, 3, 5, 9]);
}

/// S6: contract mode renders SECTION 0 ahead of the other sections.
#[tokio::test]
async fn contract_mode_prepends_section_zero() {
    let law = FakeIndex::new(vec![law_doc("l1", "제3조", 1, "대항력")]);
    let generator = FakeChat::replying("분석 결과");
    let pipeline = basic_pipeline(
        law,
        FakeIndex::empty(),
        FakeIndex::empty(),
        Arc::clone(&generator) as Arc<dyn ChatClient>,
    );

    let options = AskOptions {
        skip_normalization: true,
        extra_context: Some("계약서 본문: 특약사항 제1조".to_string()),
        use_contract_mode: true,
    };
    pipeline.answer_with_trace("계약서 검토", &options).await.unwrap();

    let system = generator.seen_system().expect("generator was invoked");
    let s0 = system
        .find("## [SECTION 0: 사용자 계약서 OCR (최우선 참고)]")
        .expect("SECTION 0 present");
    let s1 = system.find("## [SECTION 1").expect("SECTION 1 present");
    assert!(s0 < s1);
    assert!(system.contains("계약서 본문: 특약사항 제1조"));
    assert!(system.contains("계약서(OCR) 분석"));
}

// ----------------------------------------------------------- invariants

/// Reranker threshold filters, and its emptying triggers the fallback.
#[tokio::test]
async fn rerank_threshold_filters_and_falls_back() {
    let law_docs = vec![
        law_doc("l1", "제1조", 1, "본문 하나"),
        law_doc("l2", "제2조", 1, "본문 둘"),
        law_doc("l3", "제3조", 1, "본문 셋"),
    ];

    // Above-threshold docs survive; the 0.1-scored one is dropped.
    let pipeline = basic_pipeline(
        FakeIndex::new(law_docs.clone()),
        FakeIndex::empty(),
        FakeIndex::empty(),
        FakeChat::replying("answer"),
    )
    .with_reranker(FakeReranker::scoring(vec![0.9, 0.1, 0.8]));
    let docs = pipeline.retrieve("본문").await.unwrap();
    let ids = chunk_ids(&docs);
    assert!(ids.contains(&"l1".to_string()));
    assert!(ids.contains(&"l3".to_string()));
    assert!(!ids.contains(&"l2".to_string()));

    // All below threshold: fall back to reranker order, threshold ignored.
    let pipeline = basic_pipeline(
        FakeIndex::new(law_docs),
        FakeIndex::empty(),
        FakeIndex::empty(),
        FakeChat::replying("answer"),
    )
    .with_reranker(FakeReranker::scoring(vec![0.05, 0.19, 0.11]));
    let docs = pipeline.retrieve("본문").await.unwrap();
    assert_eq!(chunk_ids(&docs), vec!["l2", "l3", "l1"]);
}

/// Normalizer failure falls back to the original input.
#[tokio::test]
async fn normalizer_failure_uses_original_query() {
    let pipeline = basic_pipeline(
        FakeIndex::new(vec![law_doc("l1", "제3조", 1, "대항력")]),
        FakeIndex::empty(),
        FakeIndex::empty(),
        FakeChat::replying("answer"),
    )
    .with_normalizer(FakeChat::failing());

    let trace = pipeline
        .answer_with_trace("집주인이 보증금을 안 돌려줘요", &AskOptions::default())
        .await
        .unwrap();
    assert_eq!(trace.normalized_query, "집주인이 보증금을 안 돌려줘요");
}

/// Generator failure yields the fixed apology but keeps references.
#[tokio::test]
async fn generator_failure_returns_apology_with_references() {
    let pipeline = basic_pipeline(
        FakeIndex::new(vec![law_doc("l1", "제3조", 1, "대항력")]),
        FakeIndex::empty(),
        FakeIndex::empty(),
        FakeChat::failing(),
    );

    let trace = pipeline
        .answer_with_trace("대항력", &AskOptions::default())
        .await
        .unwrap();
    assert_eq!(trace.answer, "죄송합니다. 답변 생성 중 오류가 발생했습니다.");
    assert_eq!(trace.references, vec!["주택임대차보호법 제3조"]);
}

/// One failing source degrades to contributing nothing.
#[tokio::test]
async fn failing_source_degrades_gracefully() {
    let pipeline = basic_pipeline(
        Arc::new(FailingIndex),
        FakeIndex::new(vec![rule_doc("r1", "제2조", "우선변제 임차인의 범위")]),
        FakeIndex::empty(),
        FakeChat::replying("answer"),
    );

    let docs = pipeline.retrieve("우선변제").await.unwrap();
    assert_eq!(chunk_ids(&docs), vec!["r1"]);
}

/// Final size caps: per-source widths and the combined total hold.
#[tokio::test]
async fn final_list_respects_size_caps() {
    let law_docs: Vec<Document> = (0..40)
        .map(|i| law_doc(&format!("l{i}"), &format!("제{i}조"), 1, "법령 본문 대항력"))
        .collect();
    let rule_docs: Vec<Document> = (0..40)
        .map(|i| rule_doc(&format!("r{i}"), &format!("제{i}조"), "시행령 본문 대항력"))
        .collect();
    let case_docs: Vec<Document> = (0..10)
        .map(|i| case_chunk(&format!("c{i}"), &format!("202{i}다{i}"), "판례 본문 대항력"))
        .collect();

    let pipeline = basic_pipeline(
        FakeIndex::new(law_docs),
        FakeIndex::new(rule_docs),
        FakeIndex::new(case_docs),
        FakeChat::replying("answer"),
    );

    let docs = pipeline.retrieve("대항력").await.unwrap();
    let config = pipeline.config();
    assert!(docs.len() <= config.k_total());

    let count_for = |source: SourceIndex| {
        docs.iter()
            .filter(|d| d.source_index() == Some(source))
            .count()
    };
    assert!(count_for(SourceIndex::Law) <= config.k_law);
    assert!(count_for(SourceIndex::Rule) <= config.k_rule);
    assert!(count_for(SourceIndex::Case) <= config.k_case);
}

/// No two final documents share a chunk_id.
#[tokio::test]
async fn final_list_is_deduplicated() {
    let duplicated = vec![
        law_doc("l1", "제3조", 1, "대항력"),
        law_doc("l1", "제3조", 1, "대항력"),
        law_doc("l2", "제4조", 1, "기간"),
    ];
    let pipeline = basic_pipeline(
        FakeIndex::new(duplicated),
        FakeIndex::empty(),
        FakeIndex::empty(),
        FakeChat::replying("answer"),
    );

    let docs = pipeline.retrieve("대항력").await.unwrap();
    let mut ids = chunk_ids(&docs);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), docs.len());
}

/// Re-running retrieval over already-expanded case documents leaves
/// them untouched (expansion is a no-op on expanded input).
#[tokio::test]
async fn case_expansion_is_idempotent() {
    let mut expanded = case_chunk("a", "2020다12345", "");
    expanded.content = "[판례 전문: 대법원 2020다12345]\n첫째 단락\n둘째 단락".to_string();
    expanded.annotate(keys::EXPANDED, true);
    let content_before = expanded.content.clone();

    let pipeline = basic_pipeline(
        FakeIndex::empty(),
        FakeIndex::empty(),
        FakeIndex::new(vec![expanded]),
        FakeChat::replying("answer"),
    );

    let docs = pipeline.retrieve("판례").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].content, content_before);
}

/// Global sparse path: a corpus snapshot surfaces lexical matches the
/// dense fetch missed.
#[tokio::test]
async fn global_sparse_index_contributes_candidates() {
    let dense_only = law_doc("l1", "제3조", 1, "대항력과 주민등록");
    let sparse_only = law_doc("l2", "제8조", 1, "소액보증금 최우선변제");

    let mut pipeline = basic_pipeline(
        FakeIndex::new(vec![dense_only.clone()]),
        FakeIndex::empty(),
        FakeIndex::empty(),
        FakeChat::replying("answer"),
    );
    pipeline.build_sparse_index(SourceIndex::Law, vec![dense_only, sparse_only]);

    let docs = pipeline.retrieve("소액보증금 최우선변제").await.unwrap();
    let ids = chunk_ids(&docs);
    assert!(ids.contains(&"l2".to_string()), "sparse hit missing: {ids:?}");
}
