//! Tokens that let an operation be resumed from another process.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paging::token::check_id;

/// Serializable identity of a long-running operation.
///
/// The encoded form is a small JSON object. Decoding rejects unknown fields
/// and ids that are empty or cannot sit in a request path.
pub trait RehydrationToken: Serialize + DeserializeOwned {
    /// Human-readable name used in error messages.
    const NAME: &'static str;

    /// The ids that make up the token, by field name.
    fn ids(&self) -> [(&'static str, &str); 2];

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let token: Self = serde_json::from_slice(bytes)
            .map_err(|e| Error::Format(format!("invalid {}: {e}", Self::NAME)))?;
        for (field, id) in token.ids() {
            check_id(Self::NAME, field, id)?;
        }
        Ok(token)
    }
}

/// Identity of a thread run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RunRehydrationToken {
    pub thread_id: String,
    pub run_id: String,
}

impl RunRehydrationToken {
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
        }
    }
}

impl RehydrationToken for RunRehydrationToken {
    const NAME: &'static str = "run rehydration token";

    fn ids(&self) -> [(&'static str, &str); 2] {
        [("threadId", self.thread_id.as_str()), ("runId", self.run_id.as_str())]
    }
}

/// Identity of a vector store file batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct BatchRehydrationToken {
    pub vector_store_id: String,
    pub batch_id: String,
}

impl BatchRehydrationToken {
    pub fn new(vector_store_id: impl Into<String>, batch_id: impl Into<String>) -> Self {
        Self {
            vector_store_id: vector_store_id.into(),
            batch_id: batch_id.into(),
        }
    }
}

impl RehydrationToken for BatchRehydrationToken {
    const NAME: &'static str = "batch rehydration token";

    fn ids(&self) -> [(&'static str, &str); 2] {
        [
            ("vectorStoreId", self.vector_store_id.as_str()),
            ("batchId", self.batch_id.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_token_wire_form() {
        let token = RunRehydrationToken::new("thread_1", "run_1");
        let bytes = token.to_bytes().unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"threadId":"thread_1","runId":"run_1"}"#
        );
        assert_eq!(RunRehydrationToken::from_bytes(&bytes).unwrap(), token);
    }

    #[test]
    fn test_batch_token_decodes() {
        let token =
            BatchRehydrationToken::from_bytes(br#"{"vectorStoreId":"vs_1","batchId":"vsfb_1"}"#)
                .unwrap();
        assert_eq!(token, BatchRehydrationToken::new("vs_1", "vsfb_1"));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = RunRehydrationToken::from_bytes(
            br#"{"threadId":"thread_1","runId":"run_1","extra":true}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_rejects_missing_and_empty_ids() {
        let err = RunRehydrationToken::from_bytes(br#"{"threadId":"thread_1"}"#).unwrap_err();
        assert!(matches!(err, Error::Format(_)));

        let err =
            BatchRehydrationToken::from_bytes(br#"{"vectorStoreId":"","batchId":"b"}"#).unwrap_err();
        assert!(matches!(err, Error::Format(ref m) if m.contains("vectorStoreId")));
    }

    #[test]
    fn test_rejects_ids_that_break_paths() {
        let err = RunRehydrationToken::from_bytes(br#"{"threadId":"thread_1","runId":"run_1/cancel"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Format(ref m) if m.contains("runId")));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            RunRehydrationToken::from_bytes(b"not json"),
            Err(Error::Format(_))
        ));
    }
}
