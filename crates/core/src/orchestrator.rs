use crate::embeddings::Embedder;
use crate::models::{AnswerLanguage, AnswerSource, RagAnswer, RetrievalResult};
use crate::traits::{LanguageModel, VectorIndex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

const SNIPPET_CHARS: usize = 200;
const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Received,
    Retrieving,
    EmptyResult,
    ContextBuilt,
    Answering,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct RagOptions {
    pub top_k: usize,
    pub max_tokens: u32,
    pub llm_timeout: Duration,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            max_tokens: 1_024,
            llm_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuestionRequest {
    pub question: String,
    pub document_id: String,
    pub top_k: Option<usize>,
    pub language: AnswerLanguage,
    pub temperature: f32,
}

/// Drives one question through retrieve -> ground -> answer. Failures along
/// the way degrade to a structured "could not answer" response; nothing
/// escapes past this boundary.
pub struct RagOrchestrator<V, E, L>
where
    V: VectorIndex,
    E: Embedder,
    L: LanguageModel,
{
    index: V,
    embedder: E,
    llm: L,
    options: RagOptions,
}

impl<V, E, L> RagOrchestrator<V, E, L>
where
    V: VectorIndex + Send + Sync,
    E: Embedder,
    L: LanguageModel + Send + Sync,
{
    pub fn new(index: V, embedder: E, llm: L) -> Self {
        Self {
            index,
            embedder,
            llm,
            options: RagOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RagOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn answer_question(&self, request: QuestionRequest) -> RagAnswer {
        let started = Instant::now();
        let trace = Uuid::new_v4();
        let mut state = QueryState::Received;
        let language = request.language;

        if request.question.trim().is_empty() {
            advance(&trace, &mut state, QueryState::EmptyResult);
            return self.finish(&request, not_found_text(language), Vec::new(), started, trace, state);
        }

        advance(&trace, &mut state, QueryState::Retrieving);
        debug!(%trace, document_id = %request.document_id, "retrieving context");

        let query_vector = match self.embedder.embed(&request.question).await {
            Ok(vector) => vector,
            Err(error) => {
                warn!(%trace, %error, "query embedding failed, degrading");
                advance(&trace, &mut state, QueryState::Failed);
                return self.finish(&request, failure_text(language), Vec::new(), started, trace, state);
            }
        };

        let top_k = request.top_k.unwrap_or(self.options.top_k).max(1);
        let results = match self
            .index
            .query(&query_vector, top_k, Some(&request.document_id))
            .await
        {
            Ok(results) => results,
            Err(error) => {
                warn!(%trace, %error, "vector search failed, degrading");
                advance(&trace, &mut state, QueryState::Failed);
                return self.finish(&request, failure_text(language), Vec::new(), started, trace, state);
            }
        };

        if results.is_empty() {
            // deliberate short-circuit: no grounding means no LLM call
            advance(&trace, &mut state, QueryState::EmptyResult);
            return self.finish(&request, not_found_text(language), Vec::new(), started, trace, state);
        }

        let context = results
            .iter()
            .map(|result| result.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_DELIMITER);
        let prompt = build_prompt(language, &context, &request.question);
        let sources = build_sources(&results);
        advance(&trace, &mut state, QueryState::ContextBuilt);
        debug!(%trace, chunks = results.len(), "context assembled");

        advance(&trace, &mut state, QueryState::Answering);
        let generated = tokio::time::timeout(
            self.options.llm_timeout,
            self.llm
                .generate(&prompt, request.temperature, self.options.max_tokens),
        )
        .await;

        match generated {
            Ok(Ok(answer_text)) => {
                advance(&trace, &mut state, QueryState::Done);
                self.finish(&request, &answer_text, sources, started, trace, state)
            }
            Ok(Err(error)) => {
                warn!(%trace, %error, "llm call failed, degrading");
                advance(&trace, &mut state, QueryState::Failed);
                self.finish(&request, failure_text(language), sources, started, trace, state)
            }
            Err(_) => {
                warn!(%trace, timeout = ?self.options.llm_timeout, "llm call timed out, degrading");
                advance(&trace, &mut state, QueryState::Failed);
                self.finish(&request, failure_text(language), sources, started, trace, state)
            }
        }
    }

    fn finish(
        &self,
        request: &QuestionRequest,
        answer_text: &str,
        sources: Vec<AnswerSource>,
        started: Instant,
        trace: Uuid,
        state: QueryState,
    ) -> RagAnswer {
        let processing_time = started.elapsed();
        debug!(
            %trace,
            final_state = ?state,
            elapsed_ms = processing_time.as_millis() as u64,
            "query finished"
        );
        RagAnswer {
            answer_text: answer_text.to_string(),
            sources,
            question: request.question.clone(),
            processing_time,
        }
    }
}

fn advance(trace: &Uuid, state: &mut QueryState, next: QueryState) {
    debug!(%trace, from = ?*state, to = ?next, "query state");
    *state = next;
}

fn build_prompt(language: AnswerLanguage, context: &str, question: &str) -> String {
    match language {
        AnswerLanguage::English => format!(
            "You are a technical documentation assistant. Answer the question using only the context below.\n\
             If the context does not contain the answer, say that the document does not cover it.\n\n\
             Context:\n{context}\n\nQuestion: {question}\n\nAnswer:"
        ),
        AnswerLanguage::Chinese => format!(
            "你是一名技术文档助手。请仅根据以下内容回答问题。\n\
             如果内容中没有答案，请直接说明文档中未包含相关信息。\n\n\
             内容：\n{context}\n\n问题：{question}\n\n回答："
        ),
    }
}

fn not_found_text(language: AnswerLanguage) -> &'static str {
    match language {
        AnswerLanguage::English => {
            "No relevant content was found in the document for this question."
        }
        AnswerLanguage::Chinese => "未能在文档中找到与该问题相关的内容。",
    }
}

fn failure_text(language: AnswerLanguage) -> &'static str {
    match language {
        AnswerLanguage::English => {
            "The question could not be answered right now. Please try again later."
        }
        AnswerLanguage::Chinese => "当前无法回答该问题，请稍后再试。",
    }
}

fn build_sources(results: &[RetrievalResult]) -> Vec<AnswerSource> {
    results
        .iter()
        .map(|result| AnswerSource {
            chunk_id: result.chunk_id.clone(),
            content_snippet: snippet(&result.text),
            page: source_page(result),
            similarity: Some(result.score),
        })
        .collect()
}

fn snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_CHARS {
        return text.to_string();
    }
    text.chars().take(SNIPPET_CHARS).collect()
}

/// Page preference chain: explicit start_page, then a plain page field, then
/// the first entry of a page-number list, parsed from strings as needed.
fn source_page(result: &RetrievalResult) -> Option<u32> {
    if let Some(page) = result
        .metadata
        .get("start_page")
        .and_then(|value| value.trim().parse().ok())
    {
        return Some(page);
    }
    if let Some(page) = result
        .metadata
        .get("page")
        .and_then(|value| value.trim().parse().ok())
    {
        return Some(page);
    }
    result
        .metadata
        .get("page_numbers")
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AIServiceError, VectorSearchError};
    use crate::models::EmbeddedChunk;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FakeIndex {
        results: Vec<RetrievalResult>,
        fail: bool,
    }

    #[async_trait]
    impl VectorIndex for FakeIndex {
        async fn upsert_chunks(
            &self,
            _document_id: &str,
            _chunks: &[EmbeddedChunk],
        ) -> Result<(), VectorSearchError> {
            Ok(())
        }

        async fn query(
            &self,
            _vector: &[f32],
            _top_k: usize,
            _document_id: Option<&str>,
        ) -> Result<Vec<RetrievalResult>, VectorSearchError> {
            if self.fail {
                return Err(VectorSearchError::NotReady("index offline".to_string()));
            }
            Ok(self.results.clone())
        }

        async fn delete_document(&self, _document_id: &str) -> Result<(), VectorSearchError> {
            Ok(())
        }

        async fn count(&self) -> Result<u64, VectorSearchError> {
            Ok(self.results.len() as u64)
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn model_id(&self) -> &str {
            "fake-embedder"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, AIServiceError> {
            Ok(vec![0.5, 0.5, 0.5, 0.5])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AIServiceError> {
            Ok(texts.iter().map(|_| vec![0.5, 0.5, 0.5, 0.5]).collect())
        }
    }

    struct FakeLlm {
        reply: String,
        fail: bool,
        called: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LanguageModel for FakeLlm {
        async fn generate(
            &self,
            _prompt: &str,
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<String, AIServiceError> {
            self.called.store(true, Ordering::SeqCst);
            if self.fail {
                return Err(AIServiceError::Llm("boom".to_string()));
            }
            Ok(self.reply.clone())
        }
    }

    fn retrieval_result(chunk_id: &str, text: &str, score: f32) -> RetrievalResult {
        let mut metadata = BTreeMap::new();
        metadata.insert("start_page".to_string(), "3".to_string());
        RetrievalResult {
            chunk_id: chunk_id.to_string(),
            text: text.to_string(),
            metadata,
            score,
        }
    }

    fn request(question: &str) -> QuestionRequest {
        QuestionRequest {
            question: question.to_string(),
            document_id: "doc-1".to_string(),
            top_k: None,
            language: AnswerLanguage::English,
            temperature: 0.2,
        }
    }

    #[tokio::test]
    async fn empty_retrieval_skips_the_llm() {
        let called = Arc::new(AtomicBool::new(false));
        let orchestrator = RagOrchestrator::new(
            FakeIndex {
                results: Vec::new(),
                fail: false,
            },
            FakeEmbedder,
            FakeLlm {
                reply: "unused".to_string(),
                fail: false,
                called: called.clone(),
            },
        );

        let answer = orchestrator.answer_question(request("what is this?")).await;

        assert_eq!(
            answer.answer_text,
            not_found_text(AnswerLanguage::English)
        );
        assert!(answer.sources.is_empty());
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn grounded_answer_carries_attributed_sources() {
        let called = Arc::new(AtomicBool::new(false));
        let orchestrator = RagOrchestrator::new(
            FakeIndex {
                results: vec![retrieval_result("chunk-1", "torque the bolts to 12 Nm", 0.91)],
                fail: false,
            },
            FakeEmbedder,
            FakeLlm {
                reply: "Tighten to 12 Nm.".to_string(),
                fail: false,
                called: called.clone(),
            },
        );

        let answer = orchestrator
            .answer_question(request("what torque should I use?"))
            .await;

        assert_eq!(answer.answer_text, "Tighten to 12 Nm.");
        assert!(called.load(Ordering::SeqCst));
        assert_eq!(answer.sources.len(), 1);
        let source = &answer.sources[0];
        assert_eq!(source.chunk_id, "chunk-1");
        assert_eq!(source.page, Some(3));
        assert_eq!(source.similarity, Some(0.91));
        assert!(answer.processing_time.as_nanos() > 0);
    }

    #[tokio::test]
    async fn llm_failure_degrades_but_keeps_sources() {
        let orchestrator = RagOrchestrator::new(
            FakeIndex {
                results: vec![retrieval_result("chunk-1", "some context", 0.5)],
                fail: false,
            },
            FakeEmbedder,
            FakeLlm {
                reply: String::new(),
                fail: true,
                called: Arc::new(AtomicBool::new(false)),
            },
        );

        let answer = orchestrator.answer_question(request("anything?")).await;

        assert_eq!(answer.answer_text, failure_text(AnswerLanguage::English));
        assert_eq!(answer.sources.len(), 1);
    }

    #[tokio::test]
    async fn index_failure_degrades_without_calling_the_llm() {
        let called = Arc::new(AtomicBool::new(false));
        let orchestrator = RagOrchestrator::new(
            FakeIndex {
                results: Vec::new(),
                fail: true,
            },
            FakeEmbedder,
            FakeLlm {
                reply: "unused".to_string(),
                fail: false,
                called: called.clone(),
            },
        );

        let answer = orchestrator.answer_question(request("anything?")).await;

        assert_eq!(answer.answer_text, failure_text(AnswerLanguage::English));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn chinese_requests_get_chinese_canned_answers() {
        let orchestrator = RagOrchestrator::new(
            FakeIndex {
                results: Vec::new(),
                fail: false,
            },
            FakeEmbedder,
            FakeLlm {
                reply: "unused".to_string(),
                fail: false,
                called: Arc::new(AtomicBool::new(false)),
            },
        );

        let mut question = request("这个文档讲了什么？");
        question.language = AnswerLanguage::Chinese;
        let answer = orchestrator.answer_question(question).await;

        assert_eq!(answer.answer_text, not_found_text(AnswerLanguage::Chinese));
    }

    #[test]
    fn snippets_are_truncated_on_char_boundaries() {
        let long = "漢".repeat(300);
        let cut = snippet(&long);
        assert_eq!(cut.chars().count(), SNIPPET_CHARS);

        let short = "short text";
        assert_eq!(snippet(short), short);
    }

    #[test]
    fn page_preference_falls_back_through_the_chain() {
        let mut result = retrieval_result("c", "t", 0.1);
        assert_eq!(source_page(&result), Some(3));

        result.metadata.remove("start_page");
        result
            .metadata
            .insert("page".to_string(), "7".to_string());
        assert_eq!(source_page(&result), Some(7));

        result.metadata.remove("page");
        result
            .metadata
            .insert("page_numbers".to_string(), "9,10,11".to_string());
        assert_eq!(source_page(&result), Some(9));

        result.metadata.clear();
        assert_eq!(source_page(&result), None);
    }

    #[test]
    fn prompts_embed_context_and_question() {
        let prompt = build_prompt(AnswerLanguage::English, "CTX", "QST");
        assert!(prompt.contains("CTX"));
        assert!(prompt.contains("QST"));
        assert!(prompt.contains("only the context"));

        let prompt = build_prompt(AnswerLanguage::Chinese, "内容体", "问题体");
        assert!(prompt.contains("内容体"));
        assert!(prompt.contains("问题体"));
    }
}
