//! MCP server handler exposing the OCAPI tool surface.

use axum::http::request::Parts;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Implementation, ListToolsResult,
    PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler};
use sfcc_ocapi_tools::error::OcapiToolsError;
use sfcc_ocapi_tools::tools::OcapiToolSource;

pub const SERVER_NAME: &str = "sfcc-services-remote";
pub const SERVER_INSTRUCTIONS: &str =
    "SFCC MCP Server providing Commerce Cloud services via remote transport";

/// Auth session resolved by the bearer middleware, carried in the HTTP request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSession(pub String);

#[derive(Clone)]
pub struct SfccMcpServer {
    tools: OcapiToolSource,
}

impl SfccMcpServer {
    #[must_use]
    pub fn new(tools: OcapiToolSource) -> Self {
        Self { tools }
    }

    #[must_use]
    pub fn tools(&self) -> &OcapiToolSource {
        &self.tools
    }
}

/// Auth session for a request that arrived over streamable HTTP. Stdio requests have none.
fn session_of(context: &RequestContext<RoleServer>) -> Option<String> {
    context
        .extensions
        .get::<Parts>()
        .and_then(|parts| parts.extensions.get::<AuthenticatedSession>())
        .map(|session| session.0.clone())
}

impl ServerHandler for SfccMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tools.list_tools(),
            ..Default::default()
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        let session_id = session_of(&context);
        async move {
            self.tools
                .call_tool(&request.name, request.arguments, session_id.as_deref())
                .await
                .map_err(|e| match e {
                    OcapiToolsError::UnknownTool(_) => ErrorData::invalid_params(e.to_string(), None),
                    other => ErrorData::internal_error(other.to_string(), None),
                })
        }
    }
}
