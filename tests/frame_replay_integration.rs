//! End-to-end tests for multi-frame extraction and entry replay.
//!
//! Pages are opened in-process through `TabHost`; every frame runs its own
//! agent task and talks to the coordinator over channels, the same way the
//! HTTP surface drives them.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use extractor_sidecar::agent::{
    AgentContext, FrameEndpoint, FrameError, FrameRequest, FrameResponse, StatusEvent,
};
use extractor_sidecar::api::handlers::{pages, tabs};
use extractor_sidecar::api::state::{AppState, WsEvent};
use extractor_sidecar::coordinator::aggregate::merge_extractions;
use extractor_sidecar::coordinator::{CoordinatorError, FrameCoordinator};
use extractor_sidecar::dom::EventKind;
use extractor_sidecar::error::AppError;
use extractor_sidecar::extract::SelectorSynthesizer;
use extractor_sidecar::frame::{decode, encode, FrameId, TOP_FRAME_MARKER};
use extractor_sidecar::host::{build_page, PageSpec, TabHost};
use extractor_sidecar::models::ExtractRequest;
use extractor_sidecar::replay::{
    AccessorRegistry, Action, ActionType, DataGroup, ReplayEngine, ReplayResult,
};
use extractor_sidecar::store::{ElementOverride, MemoryStore, SessionStore};

fn host_with(store: Arc<MemoryStore>, coordinator: FrameCoordinator) -> TabHost {
    let (status, _) = broadcast::channel::<StatusEvent>(64);
    TabHost::new(
        Arc::new(coordinator),
        AgentContext {
            synthesizer: SelectorSynthesizer::default(),
            accessors: AccessorRegistry::new(),
            store,
            status,
        },
    )
}

fn host() -> (TabHost, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let host = host_with(store.clone(), FrameCoordinator::new(store.clone()));
    (host, store)
}

fn page(value: serde_json::Value) -> PageSpec {
    serde_json::from_value(value).expect("valid page spec")
}

fn input_action(target: &str, context: &str, value: Option<&str>) -> Action {
    Action {
        target_element: target.to_string(),
        context_document: context.to_string(),
        action_type: ActionType::Input,
        input_value: value.map(str::to_string),
    }
}

fn value_of(host: &TabHost, tab_id: u32, frame_id: FrameId, selector: &str) -> String {
    let doc = host.document(tab_id, frame_id).expect("frame document");
    let doc = doc.read();
    let node = doc
        .query_selector(selector)
        .expect("valid selector")
        .expect("element present");
    doc.value(node)
}

/// Frame that never answers.
struct StalledFrame(FrameId);

#[async_trait]
impl FrameEndpoint for StalledFrame {
    fn frame_id(&self) -> FrameId {
        self.0
    }

    async fn request(&self, _request: FrameRequest) -> Result<FrameResponse, FrameError> {
        std::future::pending().await
    }
}

// ============================================================================
// Test 1: Top-Level Ids Become Bare Selectors
// ============================================================================

#[tokio::test]
async fn test_top_frame_ids_become_selectors() {
    let (host, _) = host();
    let tab = host
        .open(&page(serde_json::json!({
            "url": "https://shop.example.com/signup",
            "html": r#"<form><input id="email" type="email"><input id="phone" type="tel"></form>"#
        })))
        .unwrap();

    host.coordinator()
        .broadcast(tab.tab_id, FrameRequest::AutoSelect)
        .await;
    let elements = host.coordinator().collect_extraction(tab.tab_id).await.unwrap();

    let selectors: Vec<&str> = elements.iter().map(|e| e.selector.as_str()).collect();
    assert_eq!(selectors, vec!["#email", "#phone"]);
    assert!(elements.iter().all(|e| e.context_document == TOP_FRAME_MARKER));
    assert!(elements.iter().all(|e| !e.frame.in_frame));
}

// ============================================================================
// Test 2: Named Iframe Is Addressed And Routed By Name
// ============================================================================

#[tokio::test]
async fn test_named_iframe_routing() {
    let (host, _) = host();
    let tab = host
        .open(&page(serde_json::json!({
            "url": "https://shop.example.com/checkout",
            "html": r#"<input id="search"><iframe name="billing"></iframe><iframe name="promo"></iframe>"#,
            "frames": [
                {
                    "iframe": "iframe[name=\"billing\"]",
                    "url": "https://shop.example.com/billing",
                    "html": r#"<input name="card-number" placeholder="Card number">"#
                },
                {
                    "iframe": "iframe[name=\"promo\"]",
                    "url": "https://shop.example.com/promo",
                    "html": r#"<input name="code" placeholder="Promo code">"#
                }
            ]
        })))
        .unwrap();

    host.coordinator()
        .broadcast(tab.tab_id, FrameRequest::AutoSelect)
        .await;
    let elements = host.coordinator().collect_extraction(tab.tab_id).await.unwrap();
    assert_eq!(elements.len(), 3);

    let card = elements
        .iter()
        .find(|e| e.frame.url.ends_with("/billing"))
        .expect("billing descriptor");
    let locator = r#"iframe[name="billing"]"#;
    assert_eq!(card.context_document, encode(locator));
    assert_eq!(decode(&card.context_document).as_deref(), Some(locator));
    assert_eq!(card.scoped_selector(), format!("{locator} >>> {}", card.selector));

    let result = host
        .coordinator()
        .run_entry_all(
            tab.tab_id,
            vec![DataGroup {
                group_name: "Billing".into(),
                actions: vec![input_action(
                    &card.selector,
                    &card.context_document,
                    Some("4242 4242 4242 4242"),
                )],
            }],
        )
        .await;

    // Handled only inside the billing frame; top and promo skip it.
    assert_eq!(
        result,
        ReplayResult {
            total_actions: 1,
            applied_actions: 1,
            missing_elements: 0,
            blocked_contexts: 0,
            skipped_frame: 2,
        }
    );
    assert_eq!(
        value_of(&host, tab.tab_id, 1, "input[name=\"card-number\"]"),
        "4242 4242 4242 4242"
    );
    assert_eq!(value_of(&host, tab.tab_id, 2, "input[name=\"code\"]"), "");
}

// ============================================================================
// Test 3: Unreadable Cross-Origin Context Counts As Blocked
// ============================================================================

#[tokio::test]
async fn test_cross_origin_context_is_blocked() {
    let windows = build_page(&page(serde_json::json!({
        "url": "https://shop.example.com/checkout",
        "html": r#"<input id="email"><input id="phone"><iframe id="pay"></iframe>"#,
        "frames": [
            {
                "iframe": "#pay",
                "url": "https://pay.vendor.io/card",
                "html": r#"<input id="card">"#,
                "crossOrigin": true
            }
        ]
    })))
    .unwrap();

    let accessors = AccessorRegistry::new();
    let engine = ReplayEngine::new(&windows[0], &accessors);
    let result = engine.replay(&[
        input_action("#email", TOP_FRAME_MARKER, Some("a@b.co")),
        input_action("#phone", TOP_FRAME_MARKER, Some("555-0100")),
        input_action("#card", &encode("iframe#pay"), Some("4242")),
    ]);

    assert_eq!(
        result,
        ReplayResult {
            total_actions: 3,
            applied_actions: 2,
            missing_elements: 0,
            blocked_contexts: 1,
            skipped_frame: 0,
        }
    );
    assert!(result.is_conserved());
}

// ============================================================================
// Test 4: Same Selector In Two Frames Stays Two Elements
// ============================================================================

#[tokio::test]
async fn test_same_selector_in_two_frames_is_kept() {
    let (host, _) = host();
    let tab = host
        .open(&page(serde_json::json!({
            "url": "https://shop.example.com/address",
            "html": r#"<iframe name="shipping"></iframe><iframe name="billing"></iframe>"#,
            "frames": [
                {
                    "iframe": "iframe[name=\"shipping\"]",
                    "url": "https://shop.example.com/shipping",
                    "html": r#"<input id="zip" placeholder="Zip">"#
                },
                {
                    "iframe": "iframe[name=\"billing\"]",
                    "url": "https://shop.example.com/billing",
                    "html": r#"<input id="zip" placeholder="Zip">"#
                }
            ]
        })))
        .unwrap();

    host.coordinator()
        .broadcast(tab.tab_id, FrameRequest::AutoSelect)
        .await;
    let summary = host.coordinator().summary(tab.tab_id).await;
    assert_eq!(summary.selected_count, 2);

    let elements = host.coordinator().collect_extraction(tab.tab_id).await.unwrap();
    assert_eq!(elements.len(), 2);
    let mut contexts: Vec<&str> = elements.iter().map(|e| e.context_document.as_str()).collect();
    contexts.sort();
    let billing = encode(r#"iframe[name="billing"]"#);
    let shipping = encode(r#"iframe[name="shipping"]"#);
    assert_eq!(contexts, vec![billing.as_str(), shipping.as_str()]);
    assert!(elements.iter().all(|e| e.selector == "#zip" && e.label == "Zip"));

    // The same element reported twice is still one element.
    let doubled = merge_extractions([elements.clone(), elements.clone()], &Default::default());
    assert_eq!(doubled, elements);

    let saved = host.coordinator().extract_all(tab.tab_id, None).await.unwrap();
    assert_eq!(saved.count, 2);
    assert_eq!(saved.page.extractions[0].elements.len(), 2);

    let result = host
        .coordinator()
        .run_entry_all(
            tab.tab_id,
            vec![DataGroup {
                group_name: "Address".into(),
                actions: vec![
                    input_action("#zip", &shipping, Some("10001")),
                    input_action("#zip", &billing, Some("94105")),
                ],
            }],
        )
        .await;
    assert_eq!(result.total_actions, 2);
    assert_eq!(result.applied_actions, 2);
    assert_eq!(result.skipped_frame, 4);
    assert_eq!(value_of(&host, tab.tab_id, 1, "#zip"), "10001");
    assert_eq!(value_of(&host, tab.tab_id, 2, "#zip"), "94105");
}

// ============================================================================
// Test 5: Null Inputs Are Excluded From Every Counter
// ============================================================================

#[tokio::test]
async fn test_null_inputs_do_not_count() {
    let (host, _) = host();
    let tab = host
        .open(&page(serde_json::json!({
            "url": "https://shop.example.com/",
            "html": r#"<input id="email"><input id="name"><iframe name="chat"></iframe>"#,
            "frames": [
                { "iframe": "iframe", "url": "https://shop.example.com/chat", "html": "<textarea></textarea>" }
            ]
        })))
        .unwrap();

    let groups: Vec<DataGroup> = serde_json::from_value(serde_json::json!([
        {
            "GroupName": "Contact",
            "Actions": [
                { "TargetElement": "#email", "ContextDocument": "document", "ActionType": "Input", "InputValue": "a@b.co" },
                { "TargetElement": "#name", "ContextDocument": "document", "ActionType": "Input", "InputValue": null }
            ]
        }
    ]))
    .unwrap();

    let result = host.coordinator().run_entry_all(tab.tab_id, groups).await;
    assert_eq!(
        result,
        ReplayResult {
            total_actions: 1,
            applied_actions: 1,
            missing_elements: 0,
            blocked_contexts: 0,
            skipped_frame: 1,
        }
    );
    assert_eq!(value_of(&host, tab.tab_id, 0, "#name"), "");
}

// ============================================================================
// Test 6: Saved Extraction Replays As An Entry Plan
// ============================================================================

#[tokio::test]
async fn test_saved_extraction_replays() {
    let (host, store) = host();
    let tab = host
        .open(&page(serde_json::json!({
            "url": "https://shop.example.com/signup",
            "html": r#"<title>Sign up</title><input id="email"><button id="go">Go</button>"#
        })))
        .unwrap();

    host.coordinator()
        .broadcast(tab.tab_id, FrameRequest::AutoSelect)
        .await;
    let saved = host
        .coordinator()
        .extract_all(tab.tab_id, Some("Signup".into()))
        .await
        .unwrap();
    assert_eq!(saved.count, 2);
    assert_eq!(saved.page.page_name, "Signup");
    assert_eq!(saved.page.extractions[0].group_id, 1);

    // Saving clears the selection; a second pass becomes group 2.
    let stats = host.coordinator().stats(tab.tab_id).await;
    assert_eq!(stats[0].selected_count, 0);
    host.coordinator()
        .broadcast(tab.tab_id, FrameRequest::AutoSelect)
        .await;
    let again = host.coordinator().extract_all(tab.tab_id, None).await.unwrap();
    assert_eq!(again.page.extractions.len(), 2);
    assert_eq!(again.page.extractions[1].group_id, 2);

    store
        .upsert_override(
            "document >>> #email",
            ElementOverride {
                sample: Some("a@b.co".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let applied = store.apply_changes(&saved.page.page_id).unwrap().unwrap();
    assert_eq!(applied.applied, 2);
    assert!(store.overrides().unwrap().is_empty());

    // One email action per group; the button carries no sample.
    let result = host
        .coordinator()
        .run_saved_entry(tab.tab_id, None)
        .await
        .unwrap();
    assert_eq!(result.total_actions, 2);
    assert_eq!(result.applied_actions, 2);
    assert_eq!(value_of(&host, tab.tab_id, 0, "#email"), "a@b.co");
}

// ============================================================================
// Test 7: A Stalled Frame Does Not Hold Up The Others
// ============================================================================

#[tokio::test]
async fn test_stalled_frame_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    let host = host_with(
        store.clone(),
        FrameCoordinator::new(store).with_timeouts(Duration::from_millis(50), Duration::from_secs(2)),
    );
    let tab = host
        .open(&page(serde_json::json!({
            "url": "https://shop.example.com/",
            "html": r#"<input id="email"><input class="qty"><input class="qty">"#
        })))
        .unwrap();
    host.coordinator()
        .register_frame(tab.tab_id, Arc::new(StalledFrame(7)));

    let replies = host.coordinator().broadcast(tab.tab_id, FrameRequest::Ping).await;
    assert_eq!(replies.len(), 2);
    assert!(replies.iter().any(|r| r.frame_id == 7 && r.response.is_none()));

    let counts = host
        .coordinator()
        .validate_all(
            tab.tab_id,
            vec!["#email".into(), ".qty".into(), "[[bad".into()],
        )
        .await;
    assert_eq!(counts["#email"], 1);
    assert_eq!(counts[".qty"], 2);
    assert_eq!(counts["[[bad"], 0);
}

// ============================================================================
// Test 8: Extraction Past The Operation Deadline Saves Nothing
// ============================================================================

#[tokio::test]
async fn test_extraction_timeout_saves_nothing() {
    let store = Arc::new(MemoryStore::new());
    let host = host_with(
        store.clone(),
        FrameCoordinator::new(store.clone())
            .with_timeouts(Duration::from_secs(2), Duration::from_millis(100)),
    );
    let tab = host
        .open(&page(serde_json::json!({
            "url": "https://shop.example.com/",
            "html": r#"<input id="email">"#
        })))
        .unwrap();
    host.coordinator()
        .register_frame(tab.tab_id, Arc::new(StalledFrame(3)));
    host.coordinator()
        .broadcast(tab.tab_id, FrameRequest::AutoSelect)
        .await;

    let err = host
        .coordinator()
        .extract_all(tab.tab_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::AggregationTimeout { .. }));
    assert!(store.list_pages().unwrap().is_empty());
}

// ============================================================================
// Test 9: HTTP Handlers Drive A Tab Through Its Lifecycle
// ============================================================================

#[tokio::test]
async fn test_handler_lifecycle() {
    use axum::extract::{Path, State};
    use axum::Json;

    let state = Arc::new(AppState::default());
    let mut events = state.subscribe();

    let Json(tab) = tabs::open_tab(
        State(state.clone()),
        Json(page(serde_json::json!({
            "url": "https://shop.example.com/register",
            "html": r#"<input id="user"><input id="pass" type="password">"#
        }))),
    )
    .await
    .unwrap();

    let Json(summary) = tabs::auto_select(State(state.clone()), Path(tab.tab_id))
        .await
        .unwrap();
    assert_eq!(summary.selected_count, 2);

    let Json(extracted) = tabs::extract(
        State(state.clone()),
        Path(tab.tab_id),
        Some(Json(ExtractRequest {
            page_name: Some("Register".into()),
        })),
    )
    .await
    .unwrap();
    assert_eq!(extracted.count, 2);

    match events.try_recv().unwrap() {
        WsEvent::ExtractionSaved { page_id, count, .. } => {
            assert_eq!(page_id, extracted.page_id);
            assert_eq!(count, 2);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let Json(stored) = pages::get_page(State(state.clone()), Path(extracted.page_id.clone()))
        .await
        .unwrap();
    assert_eq!(stored.page_name, "Register");

    tabs::close_tab(State(state.clone()), Path(tab.tab_id))
        .await
        .unwrap();
    let missing = tabs::get_frames(State(state.clone()), Path(tab.tab_id)).await;
    assert!(matches!(missing, Err(AppError::TabNotFound(id)) if id == tab.tab_id));
}

// ============================================================================
// Test 10: A Nested Iframe Instruction Is Applied By One Frame Only
// ============================================================================

#[tokio::test]
async fn test_nested_iframe_button_clicks_once() {
    let (host, _) = host();
    let tab = host
        .open(&page(serde_json::json!({
            "url": "https://shop.example.com/checkout",
            "html": r#"<iframe name="billing"></iframe>"#,
            "frames": [
                {
                    "iframe": "iframe[name=\"billing\"]",
                    "url": "https://shop.example.com/billing",
                    "html": r#"<iframe class="inner"></iframe>"#,
                    "frames": [
                        {
                            "iframe": "iframe.inner",
                            "url": "https://shop.example.com/inner",
                            "html": r#"<button id="pay">Pay</button>"#
                        }
                    ]
                }
            ]
        })))
        .unwrap();

    let result = host
        .coordinator()
        .run_entry_all(
            tab.tab_id,
            vec![DataGroup {
                group_name: "Pay".into(),
                actions: vec![Action {
                    target_element: "#pay".into(),
                    context_document: encode("iframe.inner"),
                    action_type: ActionType::Button,
                    input_value: Some("click".into()),
                }],
            }],
        )
        .await;

    assert_eq!(
        result,
        ReplayResult {
            total_actions: 1,
            applied_actions: 1,
            missing_elements: 0,
            blocked_contexts: 0,
            skipped_frame: 2,
        }
    );
    let doc = host.document(tab.tab_id, 2).expect("inner frame document");
    let clicks = doc
        .read()
        .events()
        .iter()
        .filter(|e| e.kind == EventKind::Click)
        .count();
    assert_eq!(clicks, 1);
}
