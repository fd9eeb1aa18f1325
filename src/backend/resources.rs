//! Typed wrappers for the backend's workflow and execution endpoints.

use super::client::{BackendClient, BackendResponse};
use crate::context::Context;
use crate::error::{BridgeError, BridgeResult};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowQuery {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    pub active: Option<bool>,
    pub tags: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionQuery {
    pub workflow_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    pub include_data: Option<bool>,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPage {
    pub data: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub retries: u32,
}

impl WorkflowPage {
    fn from_response(response: BackendResponse) -> Self {
        let next_cursor = response
            .body
            .get("nextCursor")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let data = match response.body {
            Value::Object(mut object) => match object.remove("data") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        Self {
            data,
            next_cursor,
            retries: response.retries,
        }
    }
}

fn encode_id(id: &str) -> BridgeResult<String> {
    if id.trim().is_empty() {
        return Err(BridgeError::validation("id must not be empty"));
    }
    Ok(urlencoding::encode(id).into_owned())
}

fn query_string(pairs: &[(&str, Option<String>)]) -> String {
    let encoded: Vec<String> = pairs
        .iter()
        .filter_map(|(key, value)| {
            value
                .as_ref()
                .map(|v| format!("{}={}", key, urlencoding::encode(v)))
        })
        .collect();
    if encoded.is_empty() {
        String::new()
    } else {
        format!("?{}", encoded.join("&"))
    }
}

impl BackendClient {
    fn api_path(&self, suffix: &str) -> String {
        format!(
            "{}/{}",
            self.settings().api_prefix.trim_end_matches('/'),
            suffix.trim_start_matches('/')
        )
    }

    pub async fn health_check(&self, context: &Context) -> BridgeResult<BackendResponse> {
        let path = self.settings().health_path.clone();
        self.call(context, Method::GET, &path, None).await
    }

    pub async fn list_workflows(
        &self,
        context: &Context,
        query: &WorkflowQuery,
    ) -> BridgeResult<WorkflowPage> {
        let qs = query_string(&[
            ("limit", query.limit.map(|l| l.to_string())),
            ("cursor", query.cursor.clone()),
            ("active", query.active.map(|a| a.to_string())),
            ("tags", query.tags.clone()),
            ("name", query.name.clone()),
        ]);
        let path = format!("{}{}", self.api_path("workflows"), qs);
        let response = self.call(context, Method::GET, &path, None).await?;
        Ok(WorkflowPage::from_response(response))
    }

    pub async fn get_workflow(&self, context: &Context, id: &str) -> BridgeResult<BackendResponse> {
        let path = self.api_path(&format!("workflows/{}", encode_id(id)?));
        self.call(context, Method::GET, &path, None).await
    }

    pub async fn create_workflow(
        &self,
        context: &Context,
        workflow: Value,
    ) -> BridgeResult<BackendResponse> {
        if !workflow.is_object() {
            return Err(BridgeError::validation("workflow must be a JSON object"));
        }
        let path = self.api_path("workflows");
        self.call(context, Method::POST, &path, Some(workflow)).await
    }

    pub async fn update_workflow(
        &self,
        context: &Context,
        id: &str,
        workflow: Value,
    ) -> BridgeResult<BackendResponse> {
        if !workflow.is_object() {
            return Err(BridgeError::validation("workflow must be a JSON object"));
        }
        let path = self.api_path(&format!("workflows/{}", encode_id(id)?));
        self.call(context, Method::PUT, &path, Some(workflow)).await
    }

    pub async fn delete_workflow(
        &self,
        context: &Context,
        id: &str,
    ) -> BridgeResult<BackendResponse> {
        let path = self.api_path(&format!("workflows/{}", encode_id(id)?));
        self.call(context, Method::DELETE, &path, None).await
    }

    pub async fn set_workflow_active(
        &self,
        context: &Context,
        id: &str,
        active: bool,
    ) -> BridgeResult<BackendResponse> {
        let action = if active { "activate" } else { "deactivate" };
        let path = self.api_path(&format!("workflows/{}/{}", encode_id(id)?, action));
        self.call(context, Method::POST, &path, Some(json!({}))).await
    }

    pub async fn list_executions(
        &self,
        context: &Context,
        query: &ExecutionQuery,
    ) -> BridgeResult<WorkflowPage> {
        let qs = query_string(&[
            ("workflowId", query.workflow_id.clone()),
            ("status", query.status.clone()),
            ("limit", query.limit.map(|l| l.to_string())),
            ("cursor", query.cursor.clone()),
            ("includeData", query.include_data.map(|d| d.to_string())),
        ]);
        let path = format!("{}{}", self.api_path("executions"), qs);
        let response = self.call(context, Method::GET, &path, None).await?;
        Ok(WorkflowPage::from_response(response))
    }

    pub async fn get_execution(
        &self,
        context: &Context,
        id: &str,
        include_data: bool,
    ) -> BridgeResult<BackendResponse> {
        let path = format!(
            "{}?includeData={}",
            self.api_path(&format!("executions/{}", encode_id(id)?)),
            include_data
        );
        self.call(context, Method::GET, &path, None).await
    }

    pub async fn delete_execution(
        &self,
        context: &Context,
        id: &str,
    ) -> BridgeResult<BackendResponse> {
        let path = self.api_path(&format!("executions/{}", encode_id(id)?));
        self.call(context, Method::DELETE, &path, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_skips_missing_and_encodes() {
        assert_eq!(query_string(&[("a", None)]), "");
        assert_eq!(
            query_string(&[
                ("limit", Some("5".to_string())),
                ("cursor", None),
                ("name", Some("my flow&co".to_string())),
            ]),
            "?limit=5&name=my%20flow%26co"
        );
    }

    #[test]
    fn test_encode_id() {
        assert_eq!(encode_id("abc/1").unwrap(), "abc%2F1");
        assert!(encode_id(" ").is_err());
    }

    #[test]
    fn test_page_from_response() {
        let page = WorkflowPage::from_response(BackendResponse {
            status: 200,
            body: json!({"data": [{"id": "1"}, {"id": "2"}], "nextCursor": "abc"}),
            retries: 1,
            version: None,
        });
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
        assert_eq!(page.retries, 1);

        let last = WorkflowPage::from_response(BackendResponse {
            status: 200,
            body: json!({"data": [], "nextCursor": null}),
            retries: 0,
            version: None,
        });
        assert!(last.next_cursor.is_none());
    }
}
