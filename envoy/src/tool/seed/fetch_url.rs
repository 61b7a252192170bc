//! `FetchUrl` seed tool (§4.3, network tier). HTML responses are converted
//! to markdown (stripping `<script>`/`<style>`) via `html2md`.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::permission::Permission;
use crate::tool::{Tool, ToolResult};

const DEFAULT_MAX_RESPONSE_LENGTH: usize = 20_000;
const TRUNCATION_MARKER: &str = "\n\n[...truncated...]";

pub struct FetchUrl {
    client: reqwest::Client,
    max_response_length: usize,
}

impl FetchUrl {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_response_length: DEFAULT_MAX_RESPONSE_LENGTH,
        }
    }

    pub fn with_max_response_length(mut self, max: usize) -> Self {
        self.max_response_length = max;
        self
    }

    fn is_html_content_type(content_type: &str) -> bool {
        let base = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        base == "text/html" || base == "application/xhtml+xml"
    }

    fn strip_script_and_style(html: &str) -> String {
        let mut out = String::with_capacity(html.len());
        let lower = html.to_ascii_lowercase();
        let mut idx = 0;
        while idx < html.len() {
            if let Some(tag_start) = lower[idx..].find("<script").or_else(|| lower[idx..].find("<style")) {
                out.push_str(&html[idx..idx + tag_start]);
                let tag_name = if lower[idx + tag_start..].starts_with("<script") {
                    "script"
                } else {
                    "style"
                };
                let close_tag = format!("</{tag_name}>");
                if let Some(close_rel) = lower[idx + tag_start..].find(&close_tag) {
                    idx = idx + tag_start + close_rel + close_tag.len();
                } else {
                    idx = html.len();
                }
            } else {
                out.push_str(&html[idx..]);
                break;
            }
        }
        out
    }

    fn truncate(&self, text: String) -> String {
        if text.len() <= self.max_response_length {
            text
        } else {
            let mut truncated = text;
            truncated.truncate(self.max_response_length);
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
    }
}

#[async_trait]
impl Tool for FetchUrl {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetches a URL via HTTP GET; HTML responses are converted to markdown."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"url": {"type": "string"}},
            "required": ["url"]
        })
    }

    fn permission(&self) -> Permission {
        Permission::Network
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let Some(url) = input.get("url").and_then(Value::as_str) else {
            return ToolResult::err("missing required field: url");
        };

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("request failed: {e}")),
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let reason = status.canonical_reason().unwrap_or("unknown");
            return ToolResult::err(format!("{} {}", status.as_u16(), reason));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return ToolResult::err(format!("reading body failed: {e}")),
        };

        let text = if Self::is_html_content_type(&content_type) {
            let stripped = Self::strip_script_and_style(&body);
            html2md::parse_html(&stripped)
        } else {
            body
        };

        ToolResult::ok(self.truncate(text))
    }
}
