use serde_json::{Value, json};
use sfcc_ocapi_tools::authorization::{
    AuthorizationFlow, CredentialSubmission, TokenExchangeRequest,
};
use sfcc_ocapi_tools::catalog::{EndpointCatalog, EndpointDescriptor, HttpMethod, ParamSpec};
use sfcc_ocapi_tools::config::{Credentials, SfccConfig};
use sfcc_ocapi_tools::dispatch::RequestDispatcher;
use sfcc_ocapi_tools::error::OcapiToolsError;
use sfcc_ocapi_tools::handlers::{HandlerRegistry, PreparedCall};
use sfcc_ocapi_tools::session::SessionStore;
use sfcc_ocapi_tools::token::{DEFAULT_TOKEN_KEY, TokenCache};
use sfcc_ocapi_tools::tools::OcapiToolSource;
use sfcc_test_support::{MOCK_CLIENT_ID, MOCK_CLIENT_SECRET, MockUpstream};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    upstream: MockUpstream,
    sessions: Arc<SessionStore>,
    tokens: Arc<TokenCache>,
    dispatcher: RequestDispatcher,
}

fn harness(upstream: MockUpstream, secret: &str) -> Harness {
    let client = reqwest::Client::new();
    let config = Arc::new(
        SfccConfig::new(Credentials::new(
            MOCK_CLIENT_ID,
            secret,
            upstream.base_url.clone(),
        ))
        .with_auth_url(upstream.auth_url()),
    );
    let sessions = Arc::new(SessionStore::in_memory());
    let tokens = Arc::new(TokenCache::new(client.clone(), upstream.auth_url()));
    let dispatcher = RequestDispatcher::new(
        client,
        config,
        Arc::clone(&sessions),
        Arc::clone(&tokens),
    );
    Harness {
        upstream,
        sessions,
        tokens,
        dispatcher,
    }
}

fn endpoint(path: &str, method: HttpMethod) -> EndpointDescriptor {
    EndpointDescriptor {
        path: path.to_string(),
        description: String::new(),
        method,
        params: Vec::new(),
        default_body: None,
        tool_name: None,
    }
}

fn call(args: Value) -> PreparedCall {
    PreparedCall {
        arguments: args.as_object().cloned().unwrap_or_default(),
        body: None,
    }
}

fn first_text(result: &rmcp::model::CallToolResult) -> String {
    serde_json::to_value(&result.content[0]).expect("content json")["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn token_is_fetched_once_and_reused() {
    let h = harness(MockUpstream::start().await.expect("mock"), MOCK_CLIENT_SECRET);
    let ep = endpoint("/catalogs", HttpMethod::Get);

    let first = h
        .dispatcher
        .dispatch(&ep, call(json!({})), None)
        .await
        .expect("first call");
    h.dispatcher
        .dispatch(&ep, call(json!({})), None)
        .await
        .expect("second call");

    assert_eq!(h.upstream.token_requests(), 1);
    assert_eq!(h.upstream.data_requests(), 2);
    assert!(h.tokens.has_valid_token(DEFAULT_TOKEN_KEY));

    assert_eq!(first["method"], "GET");
    assert_eq!(first["version"], "v24_5");
    assert_eq!(first["path"], "catalogs");
    assert_eq!(first["client_id"], MOCK_CLIENT_ID);
    assert_eq!(first["user_agent"], "sfcc-mcp-server/1.0");
    assert_eq!(first["authorization"], "Bearer mock-token-1");
}

#[tokio::test]
async fn short_lived_tokens_are_refetched() {
    let upstream = MockUpstream::start_with_token_ttl(300).await.expect("mock");
    let h = harness(upstream, MOCK_CLIENT_SECRET);
    let ep = endpoint("/catalogs", HttpMethod::Get);

    for _ in 0..2 {
        h.dispatcher
            .dispatch(&ep, call(json!({})), None)
            .await
            .expect("call");
    }
    assert_eq!(h.upstream.token_requests(), 2);
}

#[tokio::test]
async fn rejected_credentials_are_not_cached() {
    let h = harness(MockUpstream::start().await.expect("mock"), "wrong");
    let ep = endpoint("/catalogs", HttpMethod::Get);

    for _ in 0..2 {
        let err = h
            .dispatcher
            .dispatch(&ep, call(json!({})), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OcapiToolsError::Authentication {
                status: Some(401),
                ..
            }
        ));
        assert!(err.to_string().contains("invalid_client"));
    }
    assert_eq!(h.upstream.token_requests(), 2);
    assert_eq!(h.upstream.data_requests(), 0);
    assert!(!h.tokens.has_valid_token(DEFAULT_TOKEN_KEY));
}

#[tokio::test]
async fn get_arguments_fill_path_and_query() {
    let h = harness(MockUpstream::start().await.expect("mock"), MOCK_CLIENT_SECRET);
    let ep = endpoint("/sites/{site_id}/campaigns", HttpMethod::Get);

    let out = h
        .dispatcher
        .dispatch(
            &ep,
            call(json!({ "site_id": "Ref Arch", "count": 5, "requestBody": { "x": 1 } })),
            None,
        )
        .await
        .expect("call");
    assert_eq!(out["raw_path"], "/s/-/dw/data/v24_5/sites/Ref%20Arch/campaigns");
    assert_eq!(out["query"], "count=5");
    assert_eq!(out["body"], Value::Null);
}

#[tokio::test]
async fn session_credentials_select_key_and_version() {
    let h = harness(MockUpstream::start().await.expect("mock"), MOCK_CLIENT_SECRET);
    h.sessions.set_session_credentials(
        "s1",
        Credentials::new(MOCK_CLIENT_ID, MOCK_CLIENT_SECRET, h.upstream.base_url.clone())
            .with_api_version(Some("v23_2".to_string())),
    );

    let out = h
        .dispatcher
        .dispatch(&endpoint("/catalogs", HttpMethod::Get), call(json!({})), Some("s1"))
        .await
        .expect("call");
    assert_eq!(out["version"], "v23_2");
    assert!(h.tokens.has_valid_token("s1"));
    assert!(!h.tokens.has_valid_token(DEFAULT_TOKEN_KEY));

    // Unknown sessions use the process defaults.
    let out = h
        .dispatcher
        .dispatch(&endpoint("/catalogs", HttpMethod::Get), call(json!({})), Some("nobody"))
        .await
        .expect("call");
    assert_eq!(out["version"], "v24_5");
    assert!(h.tokens.has_valid_token(DEFAULT_TOKEN_KEY));
}

#[tokio::test]
async fn non_json_success_is_returned_as_string() {
    let h = harness(MockUpstream::start().await.expect("mock"), MOCK_CLIENT_SECRET);
    let out = h
        .dispatcher
        .dispatch(&endpoint("/plain", HttpMethod::Get), call(json!({})), None)
        .await
        .expect("call");
    assert_eq!(out, json!("pong"));
}

#[tokio::test]
async fn search_tool_posts_built_query() {
    let h = harness(MockUpstream::start().await.expect("mock"), MOCK_CLIENT_SECRET);
    let mut search = endpoint("/catalog_search", HttpMethod::Post);
    search.tool_name = Some("catalog_search".to_string());
    search.params = vec![ParamSpec {
        name: "catalog_name".to_string(),
        description: "Catalog name".to_string(),
        kind: Default::default(),
        required: false,
    }];
    let source = OcapiToolSource::build(
        &EndpointCatalog::new(vec![search]),
        &HandlerRegistry::with_search_handlers(),
        h.dispatcher.clone(),
    );

    let args = json!({ "catalog_name": "Electronics", "online_flag": true, "count": "5", "start": "" });
    let result = source
        .call_tool("catalog_search", args.as_object().cloned(), None)
        .await
        .expect("call");
    assert_ne!(result.is_error, Some(true), "{}", first_text(&result));

    let echoed: Value = serde_json::from_str(&first_text(&result)).expect("json text");
    assert_eq!(echoed["method"], "POST");
    assert_eq!(echoed["query"], "");
    assert_eq!(
        echoed["body"],
        json!({
            "query": { "bool_query": { "must": [
                { "text_query": { "fields": ["name"], "search_phrase": "Electronics" } },
                { "term_query": { "fields": ["online_flag"], "operator": "is", "values": ["true"] } }
            ] } },
            "count": 5,
            "select": "(**)"
        })
    );
}

#[tokio::test]
async fn upstream_errors_surface_in_tool_result() {
    let h = harness(MockUpstream::start().await.expect("mock"), MOCK_CLIENT_SECRET);
    let source = OcapiToolSource::build(
        &EndpointCatalog::new(vec![endpoint("/missing/{id}", HttpMethod::Get)]),
        &HandlerRegistry::with_search_handlers(),
        h.dispatcher.clone(),
    );

    let result = source
        .call_tool("missing_by_id", json!({ "id": "x" }).as_object().cloned(), None)
        .await
        .expect("call");
    assert_eq!(result.is_error, Some(true));
    let text = first_text(&result);
    assert!(
        text.starts_with("Error retrieving data. SFCC API request failed: 404 Not Found"),
        "{text}"
    );
    assert!(text.contains("missing resource"));
    assert!(text.contains("NotFoundException"));

    let result = source
        .call_tool("missing_by_id", None, None)
        .await
        .expect("call");
    assert!(first_text(&result).contains("missing required path parameter 'id'"));
}

#[tokio::test]
async fn handshake_mints_usable_session() {
    let h = harness(MockUpstream::start().await.expect("mock"), MOCK_CLIENT_SECRET);
    let flow = AuthorizationFlow::new(Arc::clone(&h.sessions), Arc::clone(&h.tokens));

    let code = flow
        .validate_credentials(CredentialSubmission {
            client_id: MOCK_CLIENT_ID.to_string(),
            client_secret: MOCK_CLIENT_SECRET.to_string(),
            api_base: format!("{}/", h.upstream.base_url),
            api_version: None,
        })
        .await
        .expect("valid credentials");
    assert!(code.starts_with("auth_"));
    assert_eq!(code.split('_').count(), 3);
    // Trial requests never populate the cache.
    assert!(!h.tokens.has_valid_token(DEFAULT_TOKEN_KEY));

    let grant = flow
        .exchange_code(&TokenExchangeRequest {
            grant_type: "authorization_code".to_string(),
            code: Some(code.clone()),
            code_verifier: Some("ignored".to_string()),
            ..TokenExchangeRequest::default()
        })
        .expect("grant");
    let user = flow
        .resolve_access_token(&grant.access_token)
        .expect("resolve");
    assert_eq!(user.credentials.api_base, h.upstream.base_url);
    assert!(grant.access_token.starts_with(&format!("sfcc_{}_", user.session_id)));
}

#[tokio::test]
async fn handshake_rejects_bad_credentials_without_state() {
    let h = harness(MockUpstream::start().await.expect("mock"), MOCK_CLIENT_SECRET);
    let flow = AuthorizationFlow::new(Arc::clone(&h.sessions), Arc::clone(&h.tokens));

    let err = flow
        .validate_credentials(CredentialSubmission {
            client_id: MOCK_CLIENT_ID.to_string(),
            client_secret: "nope".to_string(),
            api_base: h.upstream.base_url.clone(),
            api_version: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OcapiToolsError::Validation(_)));
    assert!(err.to_string().contains("Invalid SFCC credentials"));
    assert_eq!(h.sessions.counts(), (0, 0, 0));
}

#[tokio::test]
async fn unredeemed_code_is_dropped_after_ttl() {
    let upstream = MockUpstream::start().await.expect("mock");
    let sessions =
        Arc::new(SessionStore::in_memory().with_auth_code_ttl(Duration::from_millis(50)));
    let tokens = Arc::new(TokenCache::new(reqwest::Client::new(), upstream.auth_url()));
    let flow = AuthorizationFlow::new(Arc::clone(&sessions), tokens);

    let code = flow
        .validate_credentials(CredentialSubmission {
            client_id: MOCK_CLIENT_ID.to_string(),
            client_secret: MOCK_CLIENT_SECRET.to_string(),
            api_base: upstream.base_url.clone(),
            api_version: None,
        })
        .await
        .expect("valid credentials");
    assert!(sessions.has_auth_code(&code));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while sessions.has_auth_code(&code) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "code still stored after its ttl"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // The user session outlives its code.
    assert_eq!(sessions.counts(), (0, 1, 0));
}
