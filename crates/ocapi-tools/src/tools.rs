//! The MCP tool surface: one tool per catalog endpoint.

use crate::catalog::{EndpointCatalog, EndpointDescriptor, HttpMethod};
use crate::dispatch::RequestDispatcher;
use crate::error::{OcapiToolsError, Result};
use crate::handlers::{Arguments, HandlerRegistry, ToolHandler};
use crate::naming::ToolNameGenerator;
use crate::schema::build_input_schema;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool, ToolAnnotations};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Prefix of the text returned for failed tool calls.
pub const TOOL_ERROR_PREFIX: &str = "Error retrieving data.";

#[derive(Debug, Clone)]
struct RegisteredTool {
    name: String,
    endpoint: EndpointDescriptor,
    handler: ToolHandler,
    input_schema: Arc<JsonObject>,
}

/// Tools generated from an [`EndpointCatalog`], bound to their handlers and a dispatcher.
#[derive(Debug, Clone)]
pub struct OcapiToolSource {
    tools: Arc<Vec<RegisteredTool>>,
    by_name: Arc<HashMap<String, usize>>,
    dispatcher: RequestDispatcher,
}

impl OcapiToolSource {
    /// Register every catalog endpoint. Names and handlers are fixed from here on.
    #[must_use]
    pub fn build(
        catalog: &EndpointCatalog,
        registry: &HandlerRegistry,
        dispatcher: RequestDispatcher,
    ) -> Self {
        let mut names = ToolNameGenerator::new();
        let mut tools = Vec::with_capacity(catalog.len());
        let mut by_name = HashMap::with_capacity(catalog.len());

        for endpoint in catalog.endpoints() {
            let name = names.create_tool_name(&endpoint.path, endpoint.tool_name.as_deref());
            let handler = registry.resolve(&name);
            tracing::debug!(
                tool = %name,
                path = %endpoint.path,
                search = handler.is_search(),
                "registered tool"
            );
            by_name.insert(name.clone(), tools.len());
            tools.push(RegisteredTool {
                input_schema: Arc::new(build_input_schema(&endpoint.params)),
                name,
                endpoint: endpoint.clone(),
                handler,
            });
        }

        tracing::info!(tools = tools.len(), "tool surface built");
        Self {
            tools: Arc::new(tools),
            by_name: Arc::new(by_name),
            dispatcher,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// List the MCP `Tool`s exposed by this source.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|t| {
                let description = if t.endpoint.description.is_empty() {
                    format!("{:?} {}", t.endpoint.method, t.endpoint.path)
                } else {
                    t.endpoint.description.clone()
                };
                let mut tool = Tool::new(t.name.clone(), description, Arc::clone(&t.input_schema));
                tool.annotations = Some(annotations_for(t.endpoint.method, &t.handler));
                tool
            })
            .collect()
    }

    /// Execute a tool call on behalf of `session_id`.
    ///
    /// Failures inside the call are reported in the result (`is_error: true`) as
    /// `Error retrieving data. {message}`.
    ///
    /// # Errors
    ///
    /// Returns [`OcapiToolsError::UnknownTool`] if no tool is named `name`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        session_id: Option<&str>,
    ) -> Result<CallToolResult> {
        let tool = self
            .by_name
            .get(name)
            .and_then(|&i| self.tools.get(i))
            .ok_or_else(|| OcapiToolsError::UnknownTool(name.to_string()))?;

        let mut arguments: Arguments = arguments.unwrap_or_default();
        arguments.retain(|_, v| !(v.is_null() || v.as_str() == Some("")));

        tracing::info!(tool = %name, session_id = session_id.unwrap_or("-"), "tool call");
        match self.execute(tool, arguments, session_id).await {
            Ok(body) => {
                let text = serde_json::to_string(&body).unwrap_or_else(|_| body.to_string());
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool call failed");
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "{TOOL_ERROR_PREFIX} {e}"
                ))]))
            }
        }
    }

    async fn execute(
        &self,
        tool: &RegisteredTool,
        arguments: Arguments,
        session_id: Option<&str>,
    ) -> Result<Value> {
        let prepared = tool.handler.prepare(arguments)?;
        self.dispatcher
            .dispatch(&tool.endpoint, prepared, session_id)
            .await
    }
}

/// MCP hints from the HTTP method. Search tools POST a query but never change state.
fn annotations_for(method: HttpMethod, handler: &ToolHandler) -> ToolAnnotations {
    let (read_only, destructive, idempotent) = match method {
        _ if handler.is_search() => (true, false, Some(true)),
        HttpMethod::Get => (true, false, Some(true)),
        HttpMethod::Post => (false, false, Some(false)),
        HttpMethod::Put | HttpMethod::Delete => (false, true, Some(true)),
        // PATCH may or may not be idempotent.
        HttpMethod::Patch => (false, true, None),
    };
    ToolAnnotations {
        title: None,
        read_only_hint: Some(read_only),
        destructive_hint: Some(destructive),
        idempotent_hint: idempotent,
        open_world_hint: Some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ParamSpec;
    use crate::config::{Credentials, SfccConfig};
    use crate::session::SessionStore;
    use crate::token::TokenCache;

    fn endpoint(path: &str, method: HttpMethod, tool_name: Option<&str>) -> EndpointDescriptor {
        EndpointDescriptor {
            path: path.to_string(),
            description: format!("{path} description"),
            method,
            params: vec![ParamSpec {
                name: "site_id".to_string(),
                description: "Site".to_string(),
                kind: crate::catalog::ParamKind::String,
                required: true,
            }],
            default_body: None,
            tool_name: tool_name.map(str::to_string),
        }
    }

    fn source(endpoints: Vec<EndpointDescriptor>) -> OcapiToolSource {
        let config = Arc::new(SfccConfig::new(Credentials::new(
            "client",
            "secret",
            "http://127.0.0.1:9",
        )));
        let client = reqwest::Client::new();
        let tokens = Arc::new(TokenCache::new(client.clone(), "http://127.0.0.1:9/token"));
        let dispatcher = RequestDispatcher::new(
            client,
            config,
            Arc::new(SessionStore::in_memory()),
            tokens,
        );
        OcapiToolSource::build(
            &EndpointCatalog::new(endpoints),
            &HandlerRegistry::with_search_handlers(),
            dispatcher,
        )
    }

    #[test]
    fn builds_unique_names_and_binds_handlers() {
        let src = source(vec![
            endpoint("/sites/{site_id}/campaign_search", HttpMethod::Post, Some("campaign_search")),
            endpoint("/catalogs", HttpMethod::Get, None),
            endpoint("/catalogs", HttpMethod::Get, None),
        ]);
        assert_eq!(
            src.tool_names(),
            vec!["campaign_search", "catalogs", "catalogs_1"]
        );

        let tools = src.list_tools();
        let search = &tools[0];
        let hints = search.annotations.as_ref().expect("annotations");
        assert_eq!(hints.read_only_hint, Some(true));
        assert_eq!(
            search.input_schema.get("required"),
            Some(&serde_json::json!(["site_id"]))
        );
        assert_eq!(
            tools[1].description.as_deref(),
            Some("/catalogs description")
        );
    }

    #[test]
    fn write_methods_are_not_read_only() {
        let hints = annotations_for(HttpMethod::Delete, &ToolHandler::Generic);
        assert_eq!(hints.read_only_hint, Some(false));
        assert_eq!(hints.destructive_hint, Some(true));
        let hints = annotations_for(HttpMethod::Patch, &ToolHandler::Generic);
        assert_eq!(hints.idempotent_hint, None);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let src = source(vec![endpoint("/catalogs", HttpMethod::Get, None)]);
        let err = src.call_tool("nope", None, None).await.unwrap_err();
        assert!(matches!(err, OcapiToolsError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn domain_failures_become_error_results() {
        let src = source(vec![endpoint("/catalogs", HttpMethod::Get, None)]);
        let result = src
            .call_tool("catalogs", None, None)
            .await
            .expect("call result");
        assert_eq!(result.is_error, Some(true));
        let text = serde_json::to_value(&result.content[0]).expect("json")["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        assert!(text.starts_with("Error retrieving data. Authentication error"), "{text}");
    }
}
