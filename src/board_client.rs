// src/board_client.rs

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

/// The board API is a generic tabular store: a query operation filtered on
/// (column id, equality value) pairs, a create-item operation, and an
/// update operation applied as a partial merge. The engine consumes it
/// through this trait; `BoardClient` is the HTTP implementation.
#[derive(Error, Debug)]
pub enum BoardError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error")]
    UrlParse(#[from] url::ParseError),

    #[error("Board API error: {message}")]
    Api { message: String },

    #[error("Malformed board API response: {0}")]
    MalformedResponse(String),
}

/// Equality filter on one column, applied remotely. The remote match may be
/// loose (text search), which is why the lookup layer re-matches exactly.
#[derive(Debug, Clone)]
pub struct ColumnFilter {
    pub column_id: String,
    pub value: String,
}

impl ColumnFilter {
    pub fn new<C: Into<String>, V: Into<String>>(column_id: C, value: V) -> Self {
        Self {
            column_id: column_id.into(),
            value: value.into(),
        }
    }
}

/// A column value as returned by a query: column id plus its text
/// rendering. `text` is null for unset columns; use `text_or_empty`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnValue {
    pub id: String,
    pub text: Option<String>,
}

impl ColumnValue {
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub column_values: Vec<ColumnValue>,
}

impl BoardItem {
    /// Text of one column, empty string when the column is absent or unset.
    pub fn column_text(&self, column_id: &str) -> &str {
        self.column_values
            .iter()
            .find(|cv| cv.id == column_id)
            .map(|cv| cv.text_or_empty())
            .unwrap_or("")
    }
}

/// One pending column write: an explicit (column id, value) pair. Mutations
/// carry a sparse list of these; columns with no new value are simply not
/// present, and the store leaves them untouched on update.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnWrite {
    pub column_id: String,
    pub value: Value,
}

impl ColumnWrite {
    pub fn text<C: Into<String>, V: Into<String>>(column_id: C, value: V) -> Self {
        Self {
            column_id: column_id.into(),
            value: Value::String(value.into()),
        }
    }

    pub fn json<C: Into<String>>(column_id: C, value: Value) -> Self {
        Self {
            column_id: column_id.into(),
            value,
        }
    }
}

/// Collapses a write list into the single JSON-object blob the wire format
/// wants, keyed by column id.
pub fn column_values_blob(writes: &[ColumnWrite]) -> Value {
    let mut map = serde_json::Map::with_capacity(writes.len());
    for write in writes {
        map.insert(write.column_id.clone(), write.value.clone());
    }
    Value::Object(map)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub type_: String,
}

#[async_trait]
pub trait BoardApi: Send + Sync {
    /// Items of `board_id` matching every filter, up to `limit`, each
    /// carrying the texts of `column_ids`.
    async fn query_items(
        &self,
        board_id: &str,
        filters: &[ColumnFilter],
        column_ids: &[String],
        limit: usize,
    ) -> Result<Vec<BoardItem>, BoardError>;

    /// Narrow read: only the listed column values of one known item.
    async fn fetch_columns(
        &self,
        item_id: &str,
        column_ids: &[String],
    ) -> Result<Vec<ColumnValue>, BoardError>;

    /// Creates an item and returns the store-assigned id.
    async fn create_item(
        &self,
        board_id: &str,
        item_name: &str,
        writes: &[ColumnWrite],
    ) -> Result<String, BoardError>;

    /// Partial-merge update of one item; returns the item id on success.
    /// Unmentioned columns are left unchanged by the store.
    async fn update_item(
        &self,
        item_id: &str,
        board_id: &str,
        writes: &[ColumnWrite],
    ) -> Result<String, BoardError>;

    /// Boards visible to the session, for the mapping editor.
    async fn list_boards(&self, limit: usize) -> Result<Vec<BoardSummary>, BoardError>;

    /// Columns of one board, for the mapping editor.
    async fn list_columns(&self, board_id: &str) -> Result<Vec<ColumnInfo>, BoardError>;
}

// --- GraphQL wire envelope ---

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope {
    data: Option<Value>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

fn unpack(envelope: GraphQlEnvelope) -> Result<Value, BoardError> {
    if let Some(errors) = envelope.errors {
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(BoardError::Api { message });
        }
    }
    envelope
        .data
        .ok_or_else(|| BoardError::MalformedResponse("response carried neither data nor errors".to_string()))
}

const QUERY_ITEMS: &str = "\
query ($boardId: ID!, $columns: [ItemsPageByColumnValuesQuery!]!, $limit: Int!, $columnIds: [String!]!) {
  items_page_by_column_values(board_id: $boardId, columns: $columns, limit: $limit) {
    items {
      id
      name
      column_values(ids: $columnIds) { id text }
    }
  }
}";

const FETCH_COLUMNS: &str = "\
query ($itemIds: [ID!]!, $columnIds: [String!]!) {
  items(ids: $itemIds) {
    id
    column_values(ids: $columnIds) { id text }
  }
}";

const CREATE_ITEM: &str = "\
mutation ($boardId: ID!, $itemName: String!, $columnVals: JSON!) {
  create_item(board_id: $boardId, item_name: $itemName, column_values: $columnVals) { id }
}";

const UPDATE_ITEM: &str = "\
mutation ($itemId: ID!, $boardId: ID!, $columnVals: JSON!) {
  change_multiple_column_values(item_id: $itemId, board_id: $boardId, column_values: $columnVals) { id }
}";

const LIST_BOARDS: &str = "\
query ($limit: Int!) {
  boards(limit: $limit) { id name }
}";

const LIST_COLUMNS: &str = "\
query ($boardIds: [ID!]) {
  boards(ids: $boardIds) {
    columns { id title type }
  }
}";

/// HTTP implementation of `BoardApi`: GraphQL over a single endpoint with
/// bearer-token auth.
#[derive(Clone)]
pub struct BoardClient {
    http_client: Client,
    endpoint: Url,
    token: String,
}

impl BoardClient {
    pub fn new(endpoint: &str, token: String) -> Result<Self, BoardError> {
        let endpoint = Url::parse(endpoint)?;
        let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http_client,
            endpoint,
            token,
        })
    }

    async fn gql(&self, query: &str, variables: Value) -> Result<Value, BoardError> {
        let body = json!({ "query": query, "variables": variables });
        debug!("Board API request to {}: {}", self.endpoint, variables);

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("failed to read error body: {}", e));
            error!("Board API HTTP error: status={}, body='{}'", status, error_body);
            return Err(BoardError::Api {
                message: format!("HTTP {}: {}", status, error_body),
            });
        }

        let envelope = response.json::<GraphQlEnvelope>().await?;
        unpack(envelope)
    }
}

#[async_trait]
impl BoardApi for BoardClient {
    async fn query_items(
        &self,
        board_id: &str,
        filters: &[ColumnFilter],
        column_ids: &[String],
        limit: usize,
    ) -> Result<Vec<BoardItem>, BoardError> {
        #[derive(Deserialize)]
        struct ItemsPage {
            items: Vec<BoardItem>,
        }
        #[derive(Deserialize)]
        struct Data {
            items_page_by_column_values: ItemsPage,
        }

        let columns: Vec<Value> = filters
            .iter()
            .map(|f| json!({ "column_id": f.column_id, "column_values": [f.value] }))
            .collect();

        let data = self
            .gql(
                QUERY_ITEMS,
                json!({
                    "boardId": board_id,
                    "columns": columns,
                    "limit": limit,
                    "columnIds": column_ids,
                }),
            )
            .await?;

        let parsed: Data = serde_json::from_value(data)?;
        Ok(parsed.items_page_by_column_values.items)
    }

    async fn fetch_columns(
        &self,
        item_id: &str,
        column_ids: &[String],
    ) -> Result<Vec<ColumnValue>, BoardError> {
        #[derive(Deserialize)]
        struct Data {
            items: Vec<BoardItem>,
        }

        let data = self
            .gql(
                FETCH_COLUMNS,
                json!({ "itemIds": [item_id], "columnIds": column_ids }),
            )
            .await?;

        let parsed: Data = serde_json::from_value(data)?;
        let item = parsed
            .items
            .into_iter()
            .next()
            .ok_or_else(|| BoardError::MalformedResponse(format!("item {} not returned", item_id)))?;
        Ok(item.column_values)
    }

    async fn create_item(
        &self,
        board_id: &str,
        item_name: &str,
        writes: &[ColumnWrite],
    ) -> Result<String, BoardError> {
        #[derive(Deserialize)]
        struct Created {
            id: String,
        }
        #[derive(Deserialize)]
        struct Data {
            create_item: Created,
        }

        // The JSON scalar wants the blob pre-serialized to a string.
        let blob = serde_json::to_string(&column_values_blob(writes))?;

        let data = self
            .gql(
                CREATE_ITEM,
                json!({
                    "boardId": board_id,
                    "itemName": item_name,
                    "columnVals": blob,
                }),
            )
            .await?;

        let parsed: Data = serde_json::from_value(data)?;
        Ok(parsed.create_item.id)
    }

    async fn update_item(
        &self,
        item_id: &str,
        board_id: &str,
        writes: &[ColumnWrite],
    ) -> Result<String, BoardError> {
        #[derive(Deserialize)]
        struct Updated {
            id: String,
        }
        #[derive(Deserialize)]
        struct Data {
            change_multiple_column_values: Updated,
        }

        let blob = serde_json::to_string(&column_values_blob(writes))?;

        let data = self
            .gql(
                UPDATE_ITEM,
                json!({
                    "itemId": item_id,
                    "boardId": board_id,
                    "columnVals": blob,
                }),
            )
            .await?;

        let parsed: Data = serde_json::from_value(data)?;
        Ok(parsed.change_multiple_column_values.id)
    }

    async fn list_boards(&self, limit: usize) -> Result<Vec<BoardSummary>, BoardError> {
        #[derive(Deserialize)]
        struct Data {
            boards: Vec<BoardSummary>,
        }

        let data = self.gql(LIST_BOARDS, json!({ "limit": limit })).await?;
        let parsed: Data = serde_json::from_value(data)?;
        Ok(parsed.boards)
    }

    async fn list_columns(&self, board_id: &str) -> Result<Vec<ColumnInfo>, BoardError> {
        #[derive(Deserialize)]
        struct Board {
            #[serde(default)]
            columns: Vec<ColumnInfo>,
        }
        #[derive(Deserialize)]
        struct Data {
            boards: Vec<Board>,
        }

        let data = self
            .gql(LIST_COLUMNS, json!({ "boardIds": [board_id] }))
            .await?;
        let parsed: Data = serde_json::from_value(data)?;
        let board = parsed
            .boards
            .into_iter()
            .next()
            .ok_or_else(|| BoardError::MalformedResponse(format!("board {} not returned", board_id)))?;
        Ok(board.columns)
    }
}
