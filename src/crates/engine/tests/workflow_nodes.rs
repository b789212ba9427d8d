//! Full-stack run of every built-in node type through real services:
//! the model gateway, knowledge pipeline, and memory store are wired up
//! with stubbed external capabilities and driven by one workflow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use engine::{EngineSettings, ExecutionEngine, HandlerRegistry};
use knowledge::{
    CreateKnowledgeBase, EmbeddingProvider, FileStore, KnowledgeConfig, KnowledgeService,
};
use memory::{MemoryService, MemoryType};
use llm::ModelGateway;
use platform::cache::InMemoryCache;
use platform::llm::{
    ChatRequest, ChatResponse, ChatStream, LanguageModel, StreamChunk, TokenUsage,
};
use platform::{PlatformError, RateLimiter, Result};
use storage::models::{AiModel, Workflow};
use storage::repositories::{AiModelRepository, UsageLogRepository, WorkflowRepository};
use storage::{DatabaseConnection, DatabasePool};

/// Echoes the last user message back, with a switch to simulate an outage.
#[derive(Clone)]
struct EchoModel {
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl LanguageModel for EchoModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlatformError::external("openai", "provider offline"));
        }
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ChatResponse {
            content: format!("echo:{prompt}"),
            usage: TokenUsage::new(10, 5),
        })
    }

    async fn stream(&self, _request: ChatRequest) -> Result<ChatStream> {
        let empty: Vec<Result<StreamChunk>> = Vec::new();
        Ok(Box::pin(futures::stream::iter(empty)))
    }

    fn clone_box(&self) -> Box<dyn LanguageModel> {
        Box::new(self.clone())
    }
}

/// Projects text onto fixed axes so similarity scores are deterministic.
#[derive(Clone)]
struct KeywordProvider;

fn keyword_vector(text: &str) -> Vec<f32> {
    if text.contains("alpha") {
        vec![1.0, 0.0]
    } else {
        vec![0.0, 1.0]
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    async fn embed(&self, text: &str, _model: &str) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }

    async fn embed_batch(&self, texts: &[String], _model: &str) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    fn clone_box(&self) -> Box<dyn EmbeddingProvider> {
        Box::new(self.clone())
    }
}

struct Stack {
    engine: ExecutionEngine,
    memory: MemoryService,
    pool: DatabasePool,
    knowledge_base_id: String,
    fail_model: Arc<AtomicBool>,
    _dir: tempfile::TempDir,
}

async fn stack() -> Stack {
    let conn = DatabaseConnection::in_memory().await.unwrap();
    conn.run_migrations().await.unwrap();
    let pool = conn.pool().clone();

    let dir = tempfile::tempdir().unwrap();
    let knowledge = Arc::new(KnowledgeService::new(
        pool.clone(),
        Box::new(KeywordProvider),
        Arc::new(InMemoryCache::new()),
        FileStore::new(dir.path()),
        KnowledgeConfig::default(),
    ));

    let kb = knowledge
        .create_knowledge_base(
            "user-1",
            CreateKnowledgeBase {
                name: "Docs".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    knowledge
        .ingest(&kb.id, "user-1", "alpha.txt", b"the alpha deployment guide")
        .await
        .unwrap();

    let model = EchoModel {
        fail: Arc::new(AtomicBool::new(false)),
    };
    let fail_model = model.fail.clone();
    AiModelRepository::create(
        &pool,
        AiModel::new(
            "model-1".to_string(),
            "openai".to_string(),
            "gpt-4".to_string(),
            "GPT-4".to_string(),
        )
        .with_pricing(0.001, 0.002)
        .as_default(),
    )
    .await
    .unwrap();
    let gateway = Arc::new(
        ModelGateway::new(pool.clone(), RateLimiter::new(Arc::new(InMemoryCache::new())))
            .with_provider("openai", model.clone_box()),
    );

    let memory = MemoryService::new(pool.clone());
    let registry = HandlerRegistry::standard(gateway, knowledge, memory.clone());
    let engine = ExecutionEngine::new(pool.clone(), Arc::new(registry)).with_defaults(
        EngineSettings {
            retry_delay_secs: 0,
            ..EngineSettings::default()
        },
    );

    Stack {
        engine,
        memory,
        pool,
        knowledge_base_id: kb.id,
        fail_model,
        _dir: dir,
    }
}

async fn seed_workflow(stack: &Stack, definition: serde_json::Value) -> Workflow {
    let workflow = Workflow::new(
        "wf-1".to_string(),
        "user-1".to_string(),
        "All nodes".to_string(),
        definition.to_string(),
    )
    .with_status("active")
    .with_variables(json!({ "topic": "alpha" }).to_string());
    WorkflowRepository::create(&stack.pool, workflow).await.unwrap()
}

fn all_nodes_definition(kb_id: &str) -> serde_json::Value {
    json!({
        "nodes": [
            { "id": "ask", "type": "ai_call",
              "config": { "prompt": "summarize {topic}" } },
            { "id": "find", "type": "knowledge_search",
              "config": { "knowledge_base_id": kb_id, "query": "alpha", "threshold": 0.5 } },
            { "id": "save", "type": "memory_store",
              "config": { "key": "summary", "value": "{ask.response}" } },
            { "id": "load", "type": "memory_retrieve",
              "config": { "key": "summary" } },
            { "id": "gate", "type": "condition",
              "config": { "condition": "find.count >= 1 AND load.found" } },
            { "id": "shape", "type": "data_transform",
              "config": { "input_data": "{find.count}", "transform_type": "json_parse" } }
        ],
        "edges": [
            { "source": "ask", "target": "save" },
            { "source": "save", "target": "load" },
            { "source": "load", "target": "gate" },
            { "source": "find", "target": "gate" },
            { "source": "gate", "target": "shape" }
        ]
    })
}

#[tokio::test]
async fn test_every_node_type_runs_against_real_services() {
    let stack = stack().await;
    let workflow = seed_workflow(&stack, all_nodes_definition(&stack.knowledge_base_id)).await;

    let execution = stack
        .engine
        .execute(&workflow.id, "user-1", json!({}), json!({}))
        .await
        .unwrap();

    assert_eq!(execution.status, "completed");
    assert_eq!(execution.total_nodes, 6);
    assert_eq!(execution.completed_nodes, 6);
    assert_eq!(execution.failed_nodes, 0);

    let outputs: serde_json::Value =
        serde_json::from_str(execution.output_data.as_deref().unwrap()).unwrap();

    // ai_call resolved {topic} from workflow variables before prompting
    assert_eq!(outputs["ask"]["response"], "echo:summarize alpha");
    assert_eq!(outputs["ask"]["tokens_used"], 15);

    // knowledge_search found the ingested document
    assert_eq!(outputs["find"]["count"], 1);
    assert_eq!(outputs["find"]["sources"].as_array().unwrap().len(), 1);

    // memory_store / memory_retrieve round-tripped the model answer
    assert_eq!(outputs["save"]["success"], true);
    assert_eq!(outputs["load"]["found"], true);
    assert_eq!(outputs["load"]["value"], "echo:summarize alpha");

    // condition saw both upstream outputs; data_transform parsed the count
    assert_eq!(outputs["gate"]["result"], true);
    assert_eq!(outputs["shape"]["output_data"], 1);

    // pricing (0.001, 0.002) per 1K over (10, 5) tokens
    assert!((execution.total_cost - 0.00002).abs() < 1e-9);

    // the gateway accounted the call under the workflow operation
    let usage = UsageLogRepository::list_for_user(&stack.pool, "user-1", 10)
        .await
        .unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].operation, "workflow");
    assert_eq!(usage[0].model_id, "model-1");
    assert!(usage[0].success);

    // the stored memory is scoped to this workflow's context
    let scoped_context = format!("workflow_{}", workflow.id);
    let stored = stack
        .memory
        .retrieve("user-1", MemoryType::Working, "summary", Some(&scoped_context))
        .await
        .unwrap();
    assert_eq!(
        stored.unwrap().decoded_value(),
        json!("echo:summarize alpha")
    );
    let unscoped = stack
        .memory
        .retrieve("user-1", MemoryType::Working, "summary", None)
        .await
        .unwrap();
    assert!(unscoped.is_none());
}

#[tokio::test]
async fn test_provider_outage_fails_the_run_and_records_usage() {
    let stack = stack().await;
    let definition = json!({
        "nodes": [
            { "id": "ask", "type": "ai_call", "config": { "prompt": "summarize {topic}" } }
        ],
        "edges": []
    });
    let workflow = seed_workflow(&stack, definition).await;
    stack.fail_model.store(true, Ordering::SeqCst);

    let execution = stack
        .engine
        .execute(&workflow.id, "user-1", json!({}), json!({}))
        .await
        .unwrap();

    assert_eq!(execution.status, "failed");
    assert!(execution
        .error_message
        .as_deref()
        .unwrap()
        .contains("provider offline"));

    // the failed attempt still left an accounting row
    let usage = UsageLogRepository::list_for_user(&stack.pool, "user-1", 10)
        .await
        .unwrap();
    assert_eq!(usage.len(), 1);
    assert!(!usage[0].success);
    assert_eq!(usage[0].cost, 0.0);
}
