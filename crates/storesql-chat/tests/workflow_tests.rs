//! End-to-end tests for the conversation workflow.
//!
//! Each test builds an in-memory SQLite fixture (24 March rows for store 1,
//! April rows only for store 2) and drives both strategies with a scripted
//! model standing in for the hosted LLM.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use storesql_chat::{ChatError, ConversationWorkflow, MemoryCheckpointer, Node, SqlTool};
use storesql_core::config::ChatConfig;
use storesql_core::error::StoreSqlError;
use storesql_core::types::{GeneratedQuery, Role, StoreScope, Strategy};
use storesql_llm::generator::QueryGenerator;
use storesql_llm::mock::ScriptedModel;
use storesql_llm::types::{ContentBlock, MessageContent};
use storesql_storage::{
    load_csv_reader, Database, DatabaseAccessor, QueryGuard, QueryOutput, SchemaSnapshot,
    SqliteAccessor,
};

// =============================================================================
// Helpers
// =============================================================================

const SENTINEL: &str = "NO Data Available";
const INSTRUCTION: &str = "Write SQLite for store 1.";
const MARCH_SQL: &str = "SELECT SUM(orders) AS total_orders FROM summary_data \
                         WHERE store_id = 1 AND strftime('%m', activity_date) = '03'";

/// Accessor wrapper counting executed statements.
struct CountingAccessor {
    inner: SqliteAccessor,
    runs: AtomicUsize,
}

impl DatabaseAccessor for CountingAccessor {
    fn dialect(&self) -> &str {
        self.inner.dialect()
    }

    fn schema(&self) -> &SchemaSnapshot {
        self.inner.schema()
    }

    fn run(&self, sql: &str) -> Result<QueryOutput, StoreSqlError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.inner.run(sql)
    }
}

fn fixture_csv() -> String {
    let mut csv = String::from("store_id,activity_date,orders\n");
    for day in 1..=24 {
        csv.push_str(&format!("1,2020-03-{:02},1\n", day));
    }
    for day in 1..=10 {
        csv.push_str(&format!("2,2020-04-{:02},5\n", day));
    }
    csv
}

struct Harness {
    model: Arc<ScriptedModel>,
    accessor: Arc<CountingAccessor>,
    workflow: ConversationWorkflow,
}

impl Harness {
    fn runs(&self) -> usize {
        self.accessor.runs.load(Ordering::SeqCst)
    }
}

fn harness_with(strategy: Strategy, config: ChatConfig) -> Harness {
    let db = Arc::new(Database::in_memory().unwrap());
    load_csv_reader(&db, fixture_csv().as_bytes(), "summary_data").unwrap();
    let guard = QueryGuard::new(["summary_data"], StoreScope::new("store_id", 1), 100);
    let accessor = Arc::new(CountingAccessor {
        inner: SqliteAccessor::new(db, guard, 3).unwrap(),
        runs: AtomicUsize::new(0),
    });

    let model = Arc::new(ScriptedModel::new());
    let generator = QueryGenerator::new(model.clone(), INSTRUCTION, SENTINEL);
    let tool = Arc::new(SqlTool::new(Arc::new(generator), accessor.clone()));
    let workflow = ConversationWorkflow::with_checkpointer(
        strategy,
        &config,
        model.clone(),
        tool,
        Arc::new(MemoryCheckpointer::new()),
    );
    Harness {
        model,
        accessor,
        workflow,
    }
}

fn harness(strategy: Strategy) -> Harness {
    harness_with(strategy, ChatConfig::default())
}

fn text_of(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => text.clone(),
                ContentBlock::ToolResult { content, .. } => content.clone(),
                ContentBlock::ToolUse { .. } => String::new(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

// =============================================================================
// Pipeline strategy
// =============================================================================

#[tokio::test]
async fn test_pipeline_march_orders() {
    let h = harness(Strategy::Pipeline);
    h.model.push_text(MARCH_SQL);

    let (result, sid) = h
        .workflow
        .handle_message("total orders in March", None)
        .await
        .unwrap();

    assert_eq!(result.query, Some(GeneratedQuery::Sql(MARCH_SQL.to_string())));
    assert_eq!(result.raw_result.as_deref(), Some("total_orders\n24"));
    assert!(result.display.contains("strftime('%m', activity_date) = '03'"));
    assert!(result.display.contains("**Result:**\n```\ntotal_orders\n24\n```"));

    let history = h.workflow.get_history(sid).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content(), result.display);

    let checkpoints = h.workflow.checkpoints(sid).unwrap();
    assert_eq!(checkpoints.len(), 3);
    assert_eq!(checkpoints[2].node, Some(Node::ExecuteQuery));
    assert_eq!(checkpoints[2].next, None);
}

#[tokio::test]
async fn test_pipeline_first_context_is_question_only() {
    let h = harness(Strategy::Pipeline);
    h.model.push_text(MARCH_SQL);
    h.workflow
        .handle_message("total orders in March", None)
        .await
        .unwrap();

    let requests = h.model.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].system, INSTRUCTION);
    assert_eq!(
        text_of(&requests[0].messages[0].content),
        "total orders in March"
    );
}

#[tokio::test]
async fn test_pipeline_context_includes_recent_history() {
    let h = harness(Strategy::Pipeline);
    h.model.push_text(MARCH_SQL);
    h.model.push_text(SENTINEL);

    let (first, sid) = h
        .workflow
        .handle_message("total orders in March", None)
        .await
        .unwrap();
    h.workflow
        .handle_message("and in 2019?", Some(sid))
        .await
        .unwrap();

    let requests = h.model.requests();
    let expected = format!(
        "user: total orders in March\nassistant: {}\nuser: and in 2019?",
        first.display
    );
    assert_eq!(text_of(&requests[1].messages[0].content), expected);
}

#[tokio::test]
async fn test_pipeline_no_data_is_never_executed() {
    let h = harness(Strategy::Pipeline);
    h.model.push_text(SENTINEL);

    let (result, _) = h
        .workflow
        .handle_message("total orders in 2019", None)
        .await
        .unwrap();

    assert_eq!(result.display, SENTINEL);
    assert_eq!(result.query, Some(GeneratedQuery::NoData));
    assert!(result.raw_result.is_none());
    assert_eq!(h.runs(), 0);
}

#[tokio::test]
async fn test_pipeline_database_error_then_recovers() {
    let h = harness(Strategy::Pipeline);
    h.model
        .push_text("SELECT SUM(revenue) FROM summary_data WHERE store_id = 1");
    h.model.push_text(MARCH_SQL);

    let (bad, sid) = h.workflow.handle_message("total revenue", None).await.unwrap();
    assert!(bad.display.starts_with("**Error during execution:**"));
    assert!(bad.display.contains("revenue"));
    assert!(bad.raw_result.is_none());

    let (good, sid2) = h
        .workflow
        .handle_message("total orders in March", Some(sid))
        .await
        .unwrap();
    assert_eq!(sid, sid2);
    assert_eq!(good.raw_result.as_deref(), Some("total_orders\n24"));
    assert_eq!(h.workflow.get_history(sid).unwrap().len(), 4);
}

#[tokio::test]
async fn test_pipeline_generation_failure_leaves_history_unchanged() {
    let h = harness(Strategy::Pipeline);
    h.model.push_text(SENTINEL);
    h.model.push_error("service unavailable");

    let (_, sid) = h.workflow.handle_message("orders in 2019", None).await.unwrap();
    let err = h
        .workflow
        .handle_message("orders in March", Some(sid))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Generation(_)));
    assert_eq!(h.workflow.get_history(sid).unwrap().len(), 2);
}

#[tokio::test]
async fn test_pipeline_thread_matches_history_after_failed_turn() {
    let h = harness(Strategy::Pipeline);
    h.model.push_text(SENTINEL);
    h.model.push_error("service unavailable");
    h.model.push_text(MARCH_SQL);

    let (_, sid) = h.workflow.handle_message("orders in 2019", None).await.unwrap();
    assert!(h
        .workflow
        .handle_message("orders in March", Some(sid))
        .await
        .is_err());
    h.workflow
        .handle_message("total orders in March", Some(sid))
        .await
        .unwrap();

    let history = h.workflow.get_history(sid).unwrap();
    let checkpoints = h.workflow.checkpoints(sid).unwrap();
    let thread = &checkpoints.last().unwrap().state.messages;
    assert_eq!(thread.len(), history.len());
    for (graph_message, message) in thread.iter().zip(&history) {
        assert_eq!(graph_message.role, message.role());
    }
    assert_eq!(thread[0].content, "orders in 2019");
    assert!(thread[2].content.ends_with("total orders in March"));

    let steps: Vec<usize> = checkpoints.iter().map(|c| c.step).collect();
    assert_eq!(steps, (0..checkpoints.len()).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_pipeline_rejects_write_statement() {
    let h = harness(Strategy::Pipeline);
    h.model
        .push_text("DELETE FROM summary_data WHERE store_id = 1");
    h.model.push_text(MARCH_SQL);

    let (result, sid) = h.workflow.handle_message("clear my data", None).await.unwrap();
    assert!(result.display.starts_with("**Error during execution:**"));

    // rows are still there
    let (after, _) = h
        .workflow
        .handle_message("total orders in March", Some(sid))
        .await
        .unwrap();
    assert_eq!(after.raw_result.as_deref(), Some("total_orders\n24"));
}

#[tokio::test]
async fn test_pipeline_other_store_data_not_counted() {
    let h = harness(Strategy::Pipeline);
    h.model.push_text(
        "SELECT COUNT(*) AS april_rows FROM summary_data \
         WHERE store_id = 1 AND strftime('%m', activity_date) = '04'",
    );
    let (result, _) = h.workflow.handle_message("orders in April", None).await.unwrap();
    assert_eq!(result.raw_result.as_deref(), Some("april_rows\n0"));
}

#[tokio::test]
async fn test_pipeline_query_for_other_store_sees_only_own_rows() {
    let h = harness(Strategy::Pipeline);
    h.model.push_text(
        "SELECT COUNT(*) AS n FROM summary_data WHERE store_id = 2 OR store_id IS NOT NULL",
    );
    let (result, _) = h.workflow.handle_message("all orders", None).await.unwrap();
    assert_eq!(result.raw_result.as_deref(), Some("n\n24"));
}

#[tokio::test]
async fn test_same_select_twice_is_identical() {
    let h = harness(Strategy::Pipeline);
    h.model.push_text(MARCH_SQL);
    h.model.push_text(MARCH_SQL);

    let (first, sid) = h
        .workflow
        .handle_message("total orders in March", None)
        .await
        .unwrap();
    let (second, _) = h
        .workflow
        .handle_message("total orders in March", Some(sid))
        .await
        .unwrap();
    assert_eq!(first.raw_result, second.raw_result);
    assert_eq!(h.runs(), 2);
}

// =============================================================================
// Reactive strategy
// =============================================================================

#[tokio::test]
async fn test_reactive_tool_round_trip() {
    let h = harness(Strategy::Reactive);
    h.model.push_tool_use(
        "toolu_1",
        "handle_sql_query",
        json!({"question": "total orders in March"}),
    );
    h.model.push_text(MARCH_SQL);
    h.model
        .push_text("There were 24 total orders in March 2020.");

    let (result, sid) = h
        .workflow
        .handle_message("total orders in March", None)
        .await
        .unwrap();

    assert_eq!(result.display, "There were 24 total orders in March 2020.");
    assert_eq!(result.query, Some(GeneratedQuery::Sql(MARCH_SQL.to_string())));
    assert_eq!(result.raw_result.as_deref(), Some("total_orders\n24"));

    let requests = h.model.requests();
    assert_eq!(requests.len(), 3);

    // controller call: agent prompt, one tool, question-only context
    assert_eq!(requests[0].system, ChatConfig::default().agent_prompt);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "handle_sql_query");
    assert_eq!(
        text_of(&requests[0].messages[0].content),
        "total orders in March"
    );

    // generator call
    assert_eq!(requests[1].system, INSTRUCTION);
    assert!(requests[1].tools.is_empty());

    // controller sees the formatted tool result
    let last = &requests[2].messages;
    assert_eq!(last.len(), 3);
    assert_eq!(last[1].role, Role::Assistant);
    let tool_result = text_of(&last[2].content);
    assert!(tool_result.contains("**Generated SQL:**"));
    assert!(tool_result.contains("total_orders\n24"));

    assert_eq!(h.workflow.get_history(sid).unwrap().len(), 2);
}

#[tokio::test]
async fn test_reactive_direct_reply_skips_tool() {
    let h = harness(Strategy::Reactive);
    h.model.push_text("Hi! Ask me about your store's orders.");

    let (result, _) = h.workflow.handle_message("hello", None).await.unwrap();
    assert_eq!(result.display, "Hi! Ask me about your store's orders.");
    assert!(result.query.is_none());
    assert_eq!(h.runs(), 0);
}

#[tokio::test]
async fn test_reactive_no_data_is_never_executed() {
    let h = harness(Strategy::Reactive);
    h.model.push_tool_use(
        "toolu_1",
        "handle_sql_query",
        json!({"question": "orders in 2019"}),
    );
    h.model.push_text(SENTINEL);
    h.model.push_text(SENTINEL);

    let (result, _) = h.workflow.handle_message("orders in 2019", None).await.unwrap();
    assert_eq!(result.display, SENTINEL);
    assert_eq!(result.query, Some(GeneratedQuery::NoData));
    assert_eq!(h.runs(), 0);
}

#[tokio::test]
async fn test_reactive_tool_error_is_reported_to_controller() {
    let h = harness(Strategy::Reactive);
    h.model
        .push_tool_use("toolu_1", "handle_sql_query", json!({"question": "revenue"}));
    h.model
        .push_text("SELECT revenue FROM summary_data WHERE store_id = 1");
    h.model.push_text("That column does not exist.");

    let (result, sid) = h.workflow.handle_message("revenue", None).await.unwrap();
    assert_eq!(result.display, "That column does not exist.");

    let requests = h.model.requests();
    match &requests[2].messages[2].content {
        MessageContent::Blocks(blocks) => match &blocks[0] {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(*is_error);
                assert!(content.starts_with("**Error during execution:**"));
            }
            other => panic!("expected tool result, got {:?}", other),
        },
        other => panic!("expected blocks, got {:?}", other),
    }

    // conversation stays usable
    h.model.push_text("Anything else?");
    let (_, sid2) = h.workflow.handle_message("thanks", Some(sid)).await.unwrap();
    assert_eq!(sid, sid2);
    assert_eq!(h.workflow.get_history(sid).unwrap().len(), 4);
}

#[tokio::test]
async fn test_reactive_generation_error_is_caught_by_tool() {
    let h = harness(Strategy::Reactive);
    h.model
        .push_tool_use("toolu_1", "handle_sql_query", json!({"question": "q"}));
    h.model.push_error("overloaded");
    h.model.push_text("Sorry, I could not answer that.");

    let (result, _) = h.workflow.handle_message("q", None).await.unwrap();
    assert_eq!(result.display, "Sorry, I could not answer that.");
    assert!(result.query.is_none());
}

#[tokio::test]
async fn test_reactive_controller_error_fails_turn() {
    let h = harness(Strategy::Reactive);
    h.model.push_error("invalid request");

    let err = h.workflow.handle_message("q", None).await.unwrap_err();
    assert!(matches!(err, ChatError::Generation(_)));
    assert!(h.workflow.list_sessions().is_empty());
}

#[tokio::test]
async fn test_reactive_tool_round_limit() {
    let config = ChatConfig {
        max_tool_rounds: 1,
        ..ChatConfig::default()
    };
    let h = harness_with(Strategy::Reactive, config);
    h.model
        .push_tool_use("toolu_1", "handle_sql_query", json!({"question": "q"}));
    h.model.push_text(MARCH_SQL);
    h.model
        .push_tool_use("toolu_2", "handle_sql_query", json!({"question": "q"}));

    let err = h.workflow.handle_message("q", None).await.unwrap_err();
    assert!(matches!(err, ChatError::ToolRoundLimit(1)));
}

#[tokio::test]
async fn test_reactive_unknown_tool_is_error_result() {
    let h = harness(Strategy::Reactive);
    h.model
        .push_tool_use("toolu_1", "drop_everything", json!({}));
    h.model.push_text("I can only run queries.");

    let (result, _) = h.workflow.handle_message("q", None).await.unwrap();
    assert_eq!(result.display, "I can only run queries.");
    assert_eq!(h.runs(), 0);
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_history_order_after_n_turns() {
    let h = harness(Strategy::Pipeline);
    let questions = ["q0", "q1", "q2", "q3"];
    for _ in questions {
        h.model.push_text(SENTINEL);
    }

    let mut sid = None;
    for q in questions {
        let (_, id) = h.workflow.handle_message(q, sid).await.unwrap();
        sid = Some(id);
    }
    let history = h.workflow.get_history(sid.unwrap()).unwrap();

    assert_eq!(history.len(), 8);
    for (i, message) in history.iter().enumerate() {
        assert_eq!(message.position(), i);
        if i % 2 == 0 {
            assert_eq!(message.role(), Role::User);
            assert_eq!(message.content(), questions[i / 2]);
        } else {
            assert_eq!(message.role(), Role::Assistant);
            assert_eq!(message.content(), SENTINEL);
        }
    }
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let h = harness(Strategy::Pipeline);
    h.model.push_text(SENTINEL);
    h.model.push_text(MARCH_SQL);

    let (_, a) = h.workflow.handle_message("first", None).await.unwrap();
    h.workflow.handle_message("total orders in March", None).await.unwrap();

    let requests = h.model.requests();
    assert_eq!(text_of(&requests[1].messages[0].content), "total orders in March");
    assert_eq!(h.workflow.get_history(a).unwrap().len(), 2);
    assert_eq!(h.workflow.list_sessions().len(), 2);
}
