//! End-to-end pipeline coverage: wrappers and manual spans through a real
//! sink stack, asserting the structure of the exported records.

use genai_telemetry::export::{AttributeValue, InMemorySink, MultiSink, Sink};
use genai_telemetry::trace::wrappers::{self, LlmParams, RetrievalParams};
use genai_telemetry::{SendSpanOptions, SpanStatus, SpanType, Telemetry};
use serde_json::json;

fn telemetry_with_sink() -> (Telemetry, InMemorySink) {
    let sink = InMemorySink::new();
    let telemetry = Telemetry::builder("rag-app")
        .with_service_name("rag-service")
        .with_sink(Box::new(sink.clone()))
        .build()
        .unwrap();
    (telemetry, sink)
}

#[tokio::test]
async fn rag_pipeline_emits_one_trace_with_expected_spans() {
    let (telemetry, sink) = telemetry_with_sink();

    wrappers::trace_chain(&telemetry, "answer_pipeline", || async {
        let docs = wrappers::trace_retrieval(
            &telemetry,
            "fetch_context",
            &RetrievalParams::new("chroma"),
            || async { Ok::<_, std::io::Error>(vec!["doc-a", "doc-b"]) },
        )
        .await?;
        assert_eq!(docs.len(), 2);

        wrappers::trace_llm(
            &telemetry,
            "generate_answer",
            &LlmParams::new("gpt-4o").with_temperature(0.0),
            || async {
                Ok::<_, std::io::Error>(json!({
                    "choices": [{"message": {"content": "the answer"}}],
                    "usage": {"prompt_tokens": 120, "completion_tokens": 30},
                }))
            },
        )
        .await?;
        Ok::<_, std::io::Error>(())
    })
    .await
    .unwrap();

    let records = sink.finished_records();
    assert_eq!(records.len(), 3);

    // Completion order: retrieval, llm, then the enclosing chain.
    assert_eq!(records[0].span_type, SpanType::Retriever);
    assert_eq!(records[1].span_type, SpanType::Llm);
    assert_eq!(records[2].span_type, SpanType::Chain);

    let trace_id = &records[2].trace_id;
    assert_eq!(trace_id.len(), 32);
    assert!(records.iter().all(|r| &r.trace_id == trace_id));
    assert!(records.iter().all(|r| r.status == SpanStatus::Ok));
    assert!(records.iter().all(|r| r.workflow_name.as_deref() == Some("rag-app")));

    assert_eq!(records[0].documents_retrieved, Some(2));
    assert_eq!(records[1].input_tokens, Some(120));
    assert_eq!(records[1].output_tokens, Some(30));
    assert_eq!(records[1].total_tokens, Some(150));
}

#[tokio::test]
async fn each_chain_run_gets_its_own_trace() {
    let (telemetry, sink) = telemetry_with_sink();

    for _ in 0..2 {
        wrappers::trace_chain(&telemetry, "pipeline", || async {
            Ok::<_, std::io::Error>(())
        })
        .await
        .unwrap();
    }

    let records = sink.finished_records();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].trace_id, records[1].trace_id);
}

#[tokio::test]
async fn manual_spans_nest_and_serialize_with_custom_attributes() {
    let (telemetry, sink) = telemetry_with_sink();

    let outer = telemetry.start_span("handle_request", SpanType::Agent, Default::default());
    telemetry.set_span_attribute("tenant", "acme");
    telemetry.set_span_attribute("attempt", 2i64);

    let inner = telemetry.start_span("lookup", SpanType::Tool, Default::default());
    assert_eq!(inner.parent_span_id.as_deref(), Some(outer.span_id.as_str()));
    telemetry.end_span(None).await;
    telemetry.end_span(None).await;

    let records = sink.finished_records();
    assert_eq!(records.len(), 2);
    let request = &records[1];
    assert_eq!(request.name, "handle_request");
    assert_eq!(request.attributes.get("tenant"), Some(&AttributeValue::from("acme")));

    let wire = serde_json::to_value(request).unwrap();
    assert_eq!(wire["tenant"], json!("acme"));
    assert_eq!(wire["attempt"], json!(2));
    assert_eq!(wire["span_type"], json!("AGENT"));
    assert_eq!(wire["is_error"], json!(0));
    // Unset optional fields are omitted from the wire form.
    assert!(wire.get("model_name").is_none());
    assert!(wire.get("error_message").is_none());
}

#[tokio::test]
async fn a_failing_step_marks_its_span_but_not_its_siblings() {
    let (telemetry, sink) = telemetry_with_sink();

    let result = wrappers::trace_chain(&telemetry, "pipeline", || async {
        wrappers::trace_tool(&telemetry, "flaky_tool", || async {
            Err::<(), _>(std::io::Error::other("upstream timeout"))
        })
        .await
    })
    .await;
    assert!(result.is_err());

    let records = sink.finished_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].span_type, SpanType::Tool);
    assert_eq!(records[0].status, SpanStatus::Error);
    assert_eq!(records[0].error_message.as_deref(), Some("upstream timeout"));
    // The chain re-raised, so its own span is an error too.
    assert_eq!(records[1].span_type, SpanType::Chain);
    assert_eq!(records[1].status, SpanStatus::Error);
}

#[tokio::test]
async fn fan_out_keeps_exporting_past_an_unhealthy_sink() {
    let healthy = InMemorySink::new();
    let failing = InMemorySink::failing();
    let telemetry = Telemetry::builder("rag-app")
        .with_sink(Box::new(MultiSink::new(vec![
            Box::new(failing.clone()) as Box<dyn Sink>,
            Box::new(healthy.clone()),
        ])))
        .build()
        .unwrap();

    let ok = telemetry
        .send_span(SpanType::Tool, "step", SendSpanOptions::default())
        .await;
    // One sink accepted the record, so the export counts as a success.
    assert!(ok);
    assert_eq!(healthy.finished_records().len(), 1);
    assert_eq!(failing.finished_records().len(), 1);

    assert!(telemetry.health_check().await);
    telemetry.shutdown().await;
}
