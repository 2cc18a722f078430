//! Web search via a configured backend. The backend itself (SearXNG or
//! similar) is an external collaborator; this group only shapes the call and
//! the reply.

use async_trait::async_trait;
use provider_protocol::ToolDescriptor;
use serde_json::Value;

use super::{object_schema, required_str, ToolGroup};

pub struct SearchGroup {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl SearchGroup {
    pub fn from_env() -> Self {
        let base = std::env::var("SEARCH_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());
        Self {
            client: reqwest::Client::new(),
            base_url: base,
        }
    }

    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl ToolGroup for SearchGroup {
    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "web_search".into(),
            description: "Search the web and return the top results with snippets.".into(),
            parameters_schema: object_schema(
                &[("query", "string", "search query")],
                &[],
            ),
        }]
    }

    async fn call(&self, name: &str, args: &Value) -> String {
        if name != "web_search" {
            return format!("unhandled tool: {name}");
        }
        let query = match required_str(args, "query") {
            Ok(q) => q,
            Err(e) => return format!("search failed: {e}"),
        };
        let Some(base) = &self.base_url else {
            return "web search is not configured on this deployment (set SEARCH_BASE_URL)"
                .to_string();
        };

        let url = format!("{}/search", base.trim_end_matches('/'));
        let resp = self
            .client
            .get(url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await;
        match resp {
            Ok(r) if r.status().is_success() => match r.json::<Value>().await {
                Ok(body) => {
                    let results = body["results"].as_array().cloned().unwrap_or_default();
                    if results.is_empty() {
                        return format!("no results for: {query}");
                    }
                    let lines: Vec<String> = results
                        .iter()
                        .take(5)
                        .map(|r| {
                            format!(
                                "- {} ({})\n  {}",
                                r["title"].as_str().unwrap_or("untitled"),
                                r["url"].as_str().unwrap_or(""),
                                r["content"].as_str().unwrap_or(""),
                            )
                        })
                        .collect();
                    format!("results for \"{query}\":\n{}", lines.join("\n"))
                }
                Err(e) => format!("search reply unreadable: {e}"),
            },
            Ok(r) => format!("search backend error: {}", r.status()),
            Err(e) => format!("cannot reach the search backend: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_backend_explains_itself() {
        let group = SearchGroup::new(None);
        let out = group
            .call("web_search", &serde_json::json!({"query": "rust"}))
            .await;
        assert!(out.contains("not configured"));
    }
}
