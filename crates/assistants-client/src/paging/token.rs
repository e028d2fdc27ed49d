//! Continuation tokens for list endpoints.
//!
//! A [`PageToken`] names one page of one collection: the collection's
//! scoping ids (its [`PageScope`]) plus the `limit`/`order`/`after`/`before`
//! cursor parameters. Tokens are immutable; moving to the next page builds a
//! new one.
//!
//! The encoded form is a flat JSON object tagged with a format version and
//! the collection kind, e.g.
//! `{"v":1,"kind":"messages","threadId":"thread_1","limit":20}`.
//! Decoding is strict: absent optional fields are fine, unrecognized fields
//! are a [`Error::Format`].

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::transport::ApiRequest;
use crate::types::FileStatusFilter;

/// Version written into every encoded token.
pub const TOKEN_VERSION: u64 = 1;

/// Sort order of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListOrder {
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl ListOrder {
    /// Wire name of the order.
    pub fn as_str(self) -> &'static str {
        match self {
            ListOrder::Ascending => "asc",
            ListOrder::Descending => "desc",
        }
    }
}

impl fmt::Display for ListOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing options for starting a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Items per page.
    pub page_size: Option<u32>,
    /// Sort order.
    pub order: Option<ListOrder>,
    /// Start after this item id.
    pub after_id: Option<String>,
    /// End before this item id.
    pub before_id: Option<String>,
}

impl ListOptions {
    /// Set the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Set the sort order.
    pub fn with_order(mut self, order: ListOrder) -> Self {
        self.order = Some(order);
        self
    }

    /// Start after the given item.
    pub fn with_after(mut self, after_id: impl Into<String>) -> Self {
        self.after_id = Some(after_id.into());
        self
    }

    /// End before the given item.
    pub fn with_before(mut self, before_id: impl Into<String>) -> Self {
        self.before_id = Some(before_id.into());
        self
    }
}

/// The scoping part of a page token: which collection, under which parents.
///
/// Implementors serialize as a JSON object whose keys must not collide with
/// `v`, `kind`, `limit`, `order`, `after` or `before`, and must reject
/// unknown fields (`#[serde(deny_unknown_fields)]`).
pub trait PageScope:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// Collection tag written into encoded tokens.
    const KIND: &'static str;

    /// Collection path relative to the API root.
    fn path(&self) -> String;

    /// Scope-specific query parameters.
    fn query(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// All assistants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssistantsScope {}

impl PageScope for AssistantsScope {
    const KIND: &'static str = "assistants";

    fn path(&self) -> String {
        "assistants".to_string()
    }
}

/// Messages of one thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MessagesScope {
    pub thread_id: String,
}

impl PageScope for MessagesScope {
    const KIND: &'static str = "messages";

    fn path(&self) -> String {
        format!("threads/{}/messages", self.thread_id)
    }
}

/// Runs of one thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RunsScope {
    pub thread_id: String,
}

impl PageScope for RunsScope {
    const KIND: &'static str = "runs";

    fn path(&self) -> String {
        format!("threads/{}/runs", self.thread_id)
    }
}

/// Steps of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RunStepsScope {
    pub thread_id: String,
    pub run_id: String,
}

impl PageScope for RunStepsScope {
    const KIND: &'static str = "run_steps";

    fn path(&self) -> String {
        format!("threads/{}/runs/{}/steps", self.thread_id, self.run_id)
    }
}

/// Files of one vector store file batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct BatchFilesScope {
    pub vector_store_id: String,
    pub batch_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FileStatusFilter>,
}

impl PageScope for BatchFilesScope {
    const KIND: &'static str = "batch_files";

    fn path(&self) -> String {
        format!(
            "vector_stores/{}/file_batches/{}/files",
            self.vector_store_id, self.batch_id
        )
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        self.filter
            .map(|filter| vec![("filter", filter.as_str().to_string())])
            .unwrap_or_default()
    }
}

/// Cursor for one page of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PageToken<S> {
    scope: S,
    limit: Option<u32>,
    order: Option<ListOrder>,
    after: Option<String>,
    before: Option<String>,
}

impl<S: PageScope> PageToken<S> {
    /// Token for the first page of `scope` with server defaults.
    pub fn new(scope: S) -> Self {
        Self {
            scope,
            limit: None,
            order: None,
            after: None,
            before: None,
        }
    }

    /// Token for the first page of `scope` with caller options.
    ///
    /// A page size of zero means "server default".
    pub fn from_options(scope: S, options: &ListOptions) -> Self {
        Self {
            scope,
            limit: options.page_size.filter(|size| *size > 0),
            order: options.order,
            after: options.after_id.clone(),
            before: options.before_id.clone(),
        }
    }

    /// Copy of this token with a page size.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit).filter(|limit| *limit > 0);
        self
    }

    /// Copy of this token with a sort order.
    pub fn with_order(mut self, order: ListOrder) -> Self {
        self.order = Some(order);
        self
    }

    /// Copy of this token with an `after` cursor.
    pub fn with_after(mut self, after: impl Into<String>) -> Self {
        self.after = Some(after.into());
        self
    }

    /// Copy of this token with a `before` cursor.
    pub fn with_before(mut self, before: impl Into<String>) -> Self {
        self.before = Some(before.into());
        self
    }

    pub fn scope(&self) -> &S {
        &self.scope
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn order(&self) -> Option<ListOrder> {
        self.order
    }

    pub fn after(&self) -> Option<&str> {
        self.after.as_deref()
    }

    pub fn before(&self) -> Option<&str> {
        self.before.as_deref()
    }

    /// Token for the page following the one this token fetched.
    ///
    /// `None` when the server reported no more data or gave no cursor.
    pub fn next(&self, has_more: bool, last_id: Option<&str>) -> Option<Self> {
        if !has_more {
            return None;
        }
        let last_id = last_id?;
        Some(Self {
            after: Some(last_id.to_string()),
            ..self.clone()
        })
    }

    /// Serialize to the compact JSON form. Absent fields are omitted.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut object = match serde_json::to_value(&self.scope)? {
            Value::Object(object) => object,
            other => {
                return Err(Error::Format(format!(
                    "page scope must encode as an object, got {other}"
                )));
            }
        };
        object.insert("v".to_string(), TOKEN_VERSION.into());
        object.insert("kind".to_string(), S::KIND.into());
        if let Some(limit) = self.limit {
            object.insert("limit".to_string(), limit.into());
        }
        if let Some(order) = self.order {
            object.insert("order".to_string(), order.as_str().into());
        }
        if let Some(after) = &self.after {
            object.insert("after".to_string(), after.clone().into());
        }
        if let Some(before) = &self.before {
            object.insert("before".to_string(), before.clone().into());
        }
        Ok(serde_json::to_vec(&Value::Object(object))?)
    }

    /// Parse the compact JSON form.
    ///
    /// An empty buffer yields the root token of the collection, which only
    /// succeeds for scopes without required ids.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Self::from_fields(Map::new());
        }

        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::Format(format!("page token is not valid JSON: {e}")))?;
        let Value::Object(mut object) = value else {
            return Err(Error::Format("page token must be a JSON object".to_string()));
        };

        let version: u64 = take_field(&mut object, "v")?
            .ok_or_else(|| Error::Format("page token has no version".to_string()))?;
        if version != TOKEN_VERSION {
            return Err(Error::Format(format!(
                "unsupported page token version {version}"
            )));
        }

        let kind: String = take_field(&mut object, "kind")?
            .ok_or_else(|| Error::Format("page token has no kind".to_string()))?;
        if kind != S::KIND {
            return Err(Error::Format(format!(
                "page token is for `{kind}`, expected `{}`",
                S::KIND
            )));
        }

        Self::from_fields(object)
    }

    fn from_fields(mut object: Map<String, Value>) -> Result<Self> {
        let limit: Option<u32> = take_field(&mut object, "limit")?;
        if limit == Some(0) {
            return Err(Error::Format(
                "page token limit must be positive".to_string(),
            ));
        }
        let order = take_field(&mut object, "order")?;
        let after = take_field(&mut object, "after")?;
        let before = take_field(&mut object, "before")?;

        for (field, value) in &object {
            if let Value::String(id) = value {
                check_id("page token", field, id)?;
            }
        }

        // Whatever is left must be exactly the scope's own fields.
        let scope = serde_json::from_value(Value::Object(object))
            .map_err(|e| Error::Format(format!("invalid page token: {e}")))?;

        Ok(Self {
            scope,
            limit,
            order,
            after,
            before,
        })
    }

    /// The GET request that fetches the page this token names.
    pub(crate) fn request(&self) -> ApiRequest {
        let mut request = ApiRequest::get(self.scope.path())
            .query_opt("limit", self.limit)
            .query_opt("order", self.order)
            .query_opt("after", self.after.as_deref())
            .query_opt("before", self.before.as_deref());
        for (key, value) in self.scope.query() {
            request = request.query(key, value);
        }
        request
    }
}

/// Reject ids that would break the request path they are placed in.
pub(crate) fn check_id(what: &str, field: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::Format(format!("{what} has an empty `{field}`")));
    }
    if id
        .chars()
        .any(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
    {
        return Err(Error::Format(format!(
            "{what} has an invalid `{field}`: {id:?}"
        )));
    }
    Ok(())
}

fn take_field<T: DeserializeOwned>(object: &mut Map<String, Value>, key: &str) -> Result<Option<T>> {
    object
        .remove(key)
        .map(|value| {
            serde_json::from_value(value)
                .map_err(|e| Error::Format(format!("invalid `{key}` in page token: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(thread_id: &str) -> MessagesScope {
        MessagesScope {
            thread_id: thread_id.to_string(),
        }
    }

    #[test]
    fn test_round_trip_unscoped() {
        // limit 20, ascending, no cursors
        let token = PageToken::new(AssistantsScope::default())
            .with_limit(20)
            .with_order(ListOrder::Ascending);

        let bytes = token.encode().unwrap();
        let decoded = PageToken::<AssistantsScope>::decode(&bytes).unwrap();
        assert_eq!(decoded, token);
        assert_eq!(decoded.after(), None);
        assert_eq!(decoded.before(), None);
    }

    #[test]
    fn test_round_trip_all_fields() {
        let token = PageToken::new(BatchFilesScope {
            vector_store_id: "vs_1".to_string(),
            batch_id: "vsfb_1".to_string(),
            filter: Some(FileStatusFilter::Failed),
        })
        .with_limit(5)
        .with_order(ListOrder::Descending)
        .with_after("file_9")
        .with_before("file_2");

        let decoded = PageToken::decode(&token.encode().unwrap()).unwrap();
        assert_eq!(token, decoded);
    }

    #[test]
    fn test_round_trip_scope_only() {
        let token = PageToken::new(RunStepsScope {
            thread_id: "thread_1".to_string(),
            run_id: "run_1".to_string(),
        });
        let decoded = PageToken::decode(&token.encode().unwrap()).unwrap();
        assert_eq!(token, decoded);
    }

    #[test]
    fn test_encode_omits_absent_fields() {
        let token = PageToken::new(messages("thread_1")).with_limit(10);
        let value: Value = serde_json::from_slice(&token.encode().unwrap()).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.get("threadId").and_then(Value::as_str), Some("thread_1"));
        assert_eq!(object.get("limit").and_then(Value::as_u64), Some(10));
        assert_eq!(object.get("kind").and_then(Value::as_str), Some("messages"));
        assert!(!object.contains_key("order"));
        assert!(!object.contains_key("after"));
        assert!(!object.contains_key("before"));
    }

    #[test]
    fn test_decode_rejects_empty_and_unsafe_ids() {
        let err = PageToken::<MessagesScope>::decode(br#"{"v":1,"kind":"messages","threadId":""}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Format(ref m) if m.contains("threadId")));

        let err = PageToken::<RunStepsScope>::decode(
            br#"{"v":1,"kind":"run_steps","threadId":"thread_1","runId":"../x"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Format(ref m) if m.contains("runId")));

        let err = PageToken::<MessagesScope>::decode(
            br#"{"v":1,"kind":"messages","threadId":"thread_1?limit=1"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_decode_rejects_unknown_field() {
        let bytes = br#"{"v":1,"kind":"messages","threadId":"t","cursor":"x"}"#;
        let err = PageToken::<MessagesScope>::decode(bytes).unwrap_err();
        assert!(matches!(err, Error::Format(ref m) if m.contains("cursor")));
    }

    #[test]
    fn test_decode_rejects_missing_scope() {
        let bytes = br#"{"v":1,"kind":"messages","limit":3}"#;
        let err = PageToken::<MessagesScope>::decode(bytes).unwrap_err();
        assert!(matches!(err, Error::Format(ref m) if m.contains("threadId")));
    }

    #[test]
    fn test_decode_rejects_other_collection() {
        let token = PageToken::new(messages("thread_1"));
        let err = PageToken::<RunsScope>::decode(&token.encode().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_decode_rejects_bad_version_and_values() {
        let err = PageToken::<AssistantsScope>::decode(br#"{"v":2,"kind":"assistants"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Format(ref m) if m.contains("version")));

        let err = PageToken::<AssistantsScope>::decode(br#"{"kind":"assistants"}"#).unwrap_err();
        assert!(matches!(err, Error::Format(_)));

        let err = PageToken::<AssistantsScope>::decode(br#"{"v":1,"kind":"assistants","limit":0}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Format(_)));

        let err =
            PageToken::<AssistantsScope>::decode(br#"{"v":1,"kind":"assistants","order":"up"}"#)
                .unwrap_err();
        assert!(matches!(err, Error::Format(_)));

        let err = PageToken::<AssistantsScope>::decode(b"[1,2]").unwrap_err();
        assert!(matches!(err, Error::Format(_)));

        let err = PageToken::<AssistantsScope>::decode(b"not json").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_empty_buffer_is_root_token() {
        let token = PageToken::<AssistantsScope>::decode(b"").unwrap();
        assert_eq!(token, PageToken::new(AssistantsScope::default()));

        let err = PageToken::<MessagesScope>::decode(b"").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_next_requires_more_and_cursor() {
        let token = PageToken::new(messages("thread_1"))
            .with_limit(20)
            .with_before("msg_99");

        assert!(token.next(false, Some("msg_20")).is_none());
        assert!(token.next(false, None).is_none());
        assert!(token.next(true, None).is_none());

        let next = token.next(true, Some("msg_20")).unwrap();
        assert_eq!(next.after(), Some("msg_20"));
        assert_eq!(next.limit(), Some(20));
        assert_eq!(next.before(), Some("msg_99"));
        assert_eq!(next.scope(), token.scope());
        // the source token is untouched
        assert_eq!(token.after(), None);
    }

    #[test]
    fn test_from_options() {
        let options = ListOptions::default()
            .with_page_size(0)
            .with_order(ListOrder::Descending)
            .with_after("asst_3");
        let token = PageToken::from_options(AssistantsScope::default(), &options);

        assert_eq!(token.limit(), None);
        assert_eq!(token.order(), Some(ListOrder::Descending));
        assert_eq!(token.after(), Some("asst_3"));
    }

    #[test]
    fn test_request_includes_cursor_and_filter() {
        let token = PageToken::new(BatchFilesScope {
            vector_store_id: "vs_1".to_string(),
            batch_id: "vsfb_1".to_string(),
            filter: Some(FileStatusFilter::Completed),
        })
        .with_limit(2)
        .with_order(ListOrder::Ascending)
        .with_after("file_2");

        let request = token.request();
        assert_eq!(request.path, "vector_stores/vs_1/file_batches/vsfb_1/files");
        assert_eq!(request.query_value("limit"), Some("2"));
        assert_eq!(request.query_value("order"), Some("asc"));
        assert_eq!(request.query_value("after"), Some("file_2"));
        assert_eq!(request.query_value("before"), None);
        assert_eq!(request.query_value("filter"), Some("completed"));
    }
}
