//! Web API request/response models
//!
//! JSON shapes of the file manager's `/api/handler` contract.

use serde::{Deserialize, Serialize};

use crate::explorer::DirectoryEntry;

/// Message for actions this backend does not implement
pub const UNSUPPORTED_MESSAGE: &str = "Not Supported by current backend.";

/// Body of a POST to the API handler. Missing fields default to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiRequest {
    pub action: String,
    /// list: only return directories
    pub only_folders: bool,
    pub path: String,
    /// copy / move / remove / changePermissions
    pub items: Vec<String>,
    /// rename source
    pub item: String,
    /// move / copy destination, createFolder target
    pub new_path: String,
    /// rename target
    pub new_item_path: String,
    /// edit (unsupported)
    pub content: String,
    /// copy with a single item
    pub single_filename: String,
    pub perms: String,
    pub perms_code: String,
    pub recursive: bool,
    /// compress / extract (unsupported)
    pub destination: String,
    pub source_file: String,
    pub preview: bool,
}

/// Actions understood by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAction {
    List,
    Rename,
    Move,
    Copy,
    Remove,
    CreateFolder,
    ChangePermissions,
    /// compress, extract, edit, savefile, getContent or anything unknown
    Unsupported(String),
}

impl ApiAction {
    pub fn from_name(name: &str) -> Self {
        match name {
            "list" => ApiAction::List,
            "rename" => ApiAction::Rename,
            "move" => ApiAction::Move,
            "copy" => ApiAction::Copy,
            "remove" => ApiAction::Remove,
            "createFolder" => ApiAction::CreateFolder,
            "changePermissions" => ApiAction::ChangePermissions,
            other => ApiAction::Unsupported(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericBody {
    pub success: bool,
    pub error: String,
}

/// `{"result": [...]}` or `{"result": {"success", "error"}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiResponse {
    List { result: Vec<DirectoryEntry> },
    Generic { result: GenericBody },
}

/// A response body plus the HTTP status it is sent with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiReply {
    pub status: u16,
    pub body: ApiResponse,
}

impl ApiReply {
    pub fn list(entries: Vec<DirectoryEntry>) -> Self {
        Self {
            status: 200,
            body: ApiResponse::List { result: entries },
        }
    }

    pub fn success() -> Self {
        Self {
            status: 200,
            body: ApiResponse::Generic {
                result: GenericBody {
                    success: true,
                    error: String::new(),
                },
            },
        }
    }

    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiResponse::Generic {
                result: GenericBody {
                    success: false,
                    error: error.into(),
                },
            },
        }
    }

    pub fn unsupported() -> Self {
        Self::failure(200, UNSUPPORTED_MESSAGE)
    }

    pub fn is_success(&self) -> bool {
        match &self.body {
            ApiResponse::List { .. } => true,
            ApiResponse::Generic { result } => result.success,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.body)
    }
}
