//! Stdio serve loop: one JSON object per line in, one per line out.

use provider_protocol::{CallToolParams, ListToolsResult, ProviderRequest, ProviderResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::groups::ToolGroup;

/// Serves `group` until stdin closes. Every parseable request gets exactly
/// one response line; unparseable lines are logged and skipped (there is no
/// id to answer with).
pub async fn serve_stdio(group: Box<dyn ToolGroup>) -> std::io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: ProviderRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("unparseable request line: {e}");
                continue;
            }
        };
        let response = handle(group.as_ref(), request).await;
        let mut out = serde_json::to_string(&response).unwrap_or_else(|e| {
            serde_json::to_string(&ProviderResponse::err(response.id, e.to_string()))
                .expect("error response serializes")
        });
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn handle(group: &dyn ToolGroup, request: ProviderRequest) -> ProviderResponse {
    match request.method.as_str() {
        "list_tools" => {
            let tools = group.tools();
            match serde_json::to_value(ListToolsResult { tools }) {
                Ok(v) => ProviderResponse::ok(request.id, v),
                Err(e) => ProviderResponse::err(request.id, e.to_string()),
            }
        }
        "call_tool" => {
            let params: CallToolParams = match serde_json::from_value(request.params) {
                Ok(p) => p,
                Err(e) => {
                    return ProviderResponse::err(request.id, format!("bad call_tool params: {e}"))
                }
            };
            if !group.tools().iter().any(|t| t.name == params.name) {
                return ProviderResponse::err(
                    request.id,
                    format!("no such tool in this group: {}", params.name),
                );
            }
            let content = group.call(&params.name, &params.args).await;
            ProviderResponse::ok(request.id, serde_json::json!({ "content": content }))
        }
        other => ProviderResponse::err(request.id, format!("unknown method: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use provider_protocol::ToolDescriptor;
    use serde_json::Value;

    struct PingGroup;

    #[async_trait]
    impl ToolGroup for PingGroup {
        fn tools(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor {
                name: "ping".into(),
                description: "replies pong".into(),
                parameters_schema: serde_json::json!({"type": "object", "properties": {}}),
            }]
        }
        async fn call(&self, _name: &str, _args: &Value) -> String {
            "pong".to_string()
        }
    }

    #[tokio::test]
    async fn list_tools_and_call() {
        let group = PingGroup;
        let resp = handle(&group, ProviderRequest::list_tools(1)).await;
        let tools = resp.result.unwrap();
        assert_eq!(tools["tools"][0]["name"], "ping");

        let resp = handle(
            &group,
            ProviderRequest::call_tool(2, "ping", serde_json::json!({})),
        )
        .await;
        assert_eq!(resp.result.unwrap()["content"], "pong");
    }

    #[tokio::test]
    async fn unknown_tool_and_method_are_errors() {
        let group = PingGroup;
        let resp = handle(
            &group,
            ProviderRequest::call_tool(3, "missing", serde_json::json!({})),
        )
        .await;
        assert!(resp.error.unwrap().message.contains("no such tool"));

        let resp = handle(
            &group,
            ProviderRequest {
                id: 4,
                method: "shutdown".into(),
                params: Value::Null,
            },
        )
        .await;
        assert!(resp.error.unwrap().message.contains("unknown method"));
    }
}
