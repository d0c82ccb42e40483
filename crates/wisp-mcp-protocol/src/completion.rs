//! `completion/complete`: argument-value suggestions for prompts and
//! resource templates. Values are clipped to [`crate::PAGE_LIMIT`] with
//! `hasMore` set accordingly.

use serde::{Deserialize, Serialize};

/// What the completion is for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionRef {
    #[serde(rename = "ref/prompt")]
    Prompt { name: String },
    #[serde(rename = "ref/resource")]
    Resource { uri: String },
}

/// The argument under completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionArgument {
    pub name: String,
    pub value: String,
}

/// `completion/complete` params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteParams {
    #[serde(rename = "ref")]
    pub reference: CompletionRef,
    pub argument: CompletionArgument,
}

/// The `completion` member of the result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionValues {
    pub values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

/// `completion/complete` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResult {
    pub completion: CompletionValues,
}

impl CompleteResult {
    /// Clip to the page limit, recording the pre-clip total.
    pub fn clipped(values: Vec<String>) -> Self {
        let total = values.len() as u64;
        let has_more = values.len() > crate::PAGE_LIMIT;
        let values: Vec<String> = values.into_iter().take(crate::PAGE_LIMIT).collect();
        Self {
            completion: CompletionValues {
                values,
                total: Some(total),
                has_more: Some(has_more),
            },
        }
    }
}
