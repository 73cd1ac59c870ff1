//! Action dispatcher
//!
//! Turns one API request into one explorer call and the reply the web layer
//! sends back. Operation errors become 400 replies carrying the error text.

use tracing::{debug, warn};

use super::types::{ApiAction, ApiReply, ApiRequest};
use crate::explorer::{ExplorerError, RemoteFileExplorer};

pub async fn dispatch(explorer: &RemoteFileExplorer, request: &ApiRequest) -> ApiReply {
    let action = ApiAction::from_name(&request.action);
    debug!("API action {:?}", action);

    let outcome = match action {
        ApiAction::List => {
            return match explorer.list(&request.path).await {
                Ok(entries) if request.only_folders => {
                    ApiReply::list(entries.into_iter().filter(|e| e.kind.is_dir()).collect())
                }
                Ok(entries) => ApiReply::list(entries),
                Err(e) => error_reply(&request.action, e),
            };
        }
        ApiAction::Rename => explorer.rename(&request.item, &request.new_item_path).await,
        ApiAction::Move => explorer.move_items(&request.items, &request.new_path).await,
        ApiAction::Copy => {
            explorer
                .copy(&request.items, &request.new_path, &request.single_filename)
                .await
        }
        ApiAction::Remove => explorer.delete(&request.items).await,
        ApiAction::CreateFolder => explorer.mkdir(&request.new_path).await,
        ApiAction::ChangePermissions => {
            explorer
                .chmod(&request.items, &request.perms_code, request.recursive)
                .await
        }
        ApiAction::Unsupported(name) => {
            debug!("Unsupported API action {:?}", name);
            return ApiReply::unsupported();
        }
    };

    match outcome {
        Ok(()) => ApiReply::success(),
        Err(e) => error_reply(&request.action, e),
    }
}

fn error_reply(action: &str, error: ExplorerError) -> ApiReply {
    warn!("API action {} failed: {}", action, error);
    ApiReply::failure(400, error.to_string())
}

/// Reply for the upload endpoint: always 200, success flag carries the outcome.
pub fn upload_reply(result: &Result<u64, ExplorerError>) -> ApiReply {
    match result {
        Ok(_) => ApiReply::success(),
        Err(e) => ApiReply::failure(200, e.to_string()),
    }
}

/// Attachment name for a download (`Content-Disposition`)
pub fn download_filename(path: &str) -> String {
    crate::explorer::normalize(path).file_name().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::ApiResponse;
    use crate::explorer::fake::FakeShell;
    use crate::explorer::BatchPolicy;
    use std::sync::Arc;

    fn request(json: &str) -> ApiRequest {
        serde_json::from_str(json).unwrap()
    }

    fn explorer(shell: &Arc<FakeShell>) -> RemoteFileExplorer {
        RemoteFileExplorer::new(shell.clone(), BatchPolicy::default())
    }

    #[tokio::test]
    async fn test_list_and_only_folders() {
        let shell = FakeShell::new();
        let listing = "drwxr-xr-x|2|u|g|4096|2024-01-01|00:00|dir\n\
                       -rw-r--r--|1|u|g|3|2024-01-01|00:00|file\n";
        shell.respond(0, listing);
        shell.respond(0, listing);
        let fe = explorer(&shell);

        let all = dispatch(&fe, &request(r#"{"action":"list","path":"/"}"#)).await;
        assert_eq!(all.status, 200);
        match all.body {
            ApiResponse::List { result } => assert_eq!(result.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }

        let folders = dispatch(&fe, &request(r#"{"action":"list","path":"/","onlyFolders":true}"#)).await;
        match folders.body {
            ApiResponse::List { result } => {
                assert_eq!(result.len(), 1);
                assert_eq!(result[0].name, "dir");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_actions_issue_commands() {
        let shell = FakeShell::new();
        let fe = explorer(&shell);

        let replies = vec![
            dispatch(&fe, &request(r#"{"action":"rename","item":"/a","newItemPath":"/b"}"#)).await,
            dispatch(&fe, &request(r#"{"action":"move","items":["/a"],"newPath":"/d"}"#)).await,
            dispatch(&fe, &request(r#"{"action":"copy","items":["/a"],"newPath":"/d","singleFilename":"c"}"#)).await,
            dispatch(&fe, &request(r#"{"action":"remove","items":["/a"]}"#)).await,
            dispatch(&fe, &request(r#"{"action":"createFolder","newPath":"/n"}"#)).await,
            dispatch(
                &fe,
                &request(r#"{"action":"changePermissions","items":["/a"],"permsCode":"750","recursive":true}"#),
            )
            .await,
        ];
        assert!(replies.iter().all(|r| r.status == 200 && r.is_success()));

        assert_eq!(
            shell.commands(),
            vec![
                "mv -- '/a' '/b'",
                "mv -- '/a' '/d/'",
                "cp -r -- '/a' '/d/c'",
                "rm --interactive=never -r -- '/a'",
                "mkdir -p -- '/n'",
                "chmod -R -- '750' '/a'",
            ]
        );
    }

    #[tokio::test]
    async fn test_operation_error_is_400() {
        let shell = FakeShell::new();
        shell.respond(1, "mkdir: Permission denied");
        let reply = dispatch(&explorer(&shell), &request(r#"{"action":"createFolder","newPath":"/x"}"#)).await;
        assert_eq!(reply.status, 400);
        assert!(!reply.is_success());
        assert!(reply.to_json().unwrap().contains("Permission denied"));
    }

    #[tokio::test]
    async fn test_unsupported_actions() {
        let shell = FakeShell::new();
        let fe = explorer(&shell);
        for action in ["compress", "extract", "edit", "savefile", "getContent", "bogus"] {
            let reply = dispatch(&fe, &request(&format!(r#"{{"action":"{}"}}"#, action))).await;
            assert_eq!(reply, ApiReply::unsupported());
        }
        assert!(shell.commands().is_empty());
    }

    #[test]
    fn test_upload_reply() {
        assert!(upload_reply(&Ok(10)).is_success());
        let failed = upload_reply(&Err(ExplorerError::ConnectionClosed));
        assert_eq!(failed.status, 200);
        assert!(!failed.is_success());
    }

    #[test]
    fn test_download_filename() {
        assert_eq!(download_filename("/home/u/report.pdf"), "report.pdf");
        assert_eq!(download_filename("notes.txt"), "notes.txt");
        assert_eq!(download_filename("/srv/dir/"), "dir");
    }
}
