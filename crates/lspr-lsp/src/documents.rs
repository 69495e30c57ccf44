//! Text document synchronization for a session

use crate::error::LspResult;
use crate::session::LspSession;
use dashmap::DashMap;
use serde_json::json;
use tracing::debug;

/// Documents opened on a session, with their last sent version
#[derive(Debug, Default)]
pub(crate) struct OpenDocuments {
    versions: DashMap<String, i32>,
}

impl OpenDocuments {
    /// Bump the version for `uri`. Returns `true` when the document was not open.
    fn advance(&self, uri: &str) -> (bool, i32) {
        let mut opened_now = false;
        let mut entry = self.versions.entry(uri.to_string()).or_insert_with(|| {
            opened_now = true;
            0
        });
        *entry += 1;
        (opened_now, *entry)
    }

    fn forget(&self, uri: &str) -> bool {
        self.versions.remove(uri).is_some()
    }

    fn contains(&self, uri: &str) -> bool {
        self.versions.contains_key(uri)
    }

    fn version(&self, uri: &str) -> Option<i32> {
        self.versions.get(uri).map(|entry| *entry)
    }
}

impl LspSession {
    /// Make the server see `text` as the current content of `uri`.
    ///
    /// The first call sends `didOpen`; later calls send a full-text
    /// `didChange` with the next version.
    pub async fn sync_document(&self, uri: &str, language_id: &str, text: &str) -> LspResult<()> {
        let (opened_now, version) = self.documents.advance(uri);

        if opened_now {
            debug!(uri = %uri, "Opening document");
            let result = self
                .notify(
                    "textDocument/didOpen",
                    json!({
                        "textDocument": {
                            "uri": uri,
                            "languageId": language_id,
                            "version": version,
                            "text": text
                        }
                    }),
                )
                .await;
            if result.is_err() {
                self.documents.forget(uri);
            }
            result
        } else {
            debug!(uri = %uri, version, "Updating document");
            self.notify(
                "textDocument/didChange",
                json!({
                    "textDocument": { "uri": uri, "version": version },
                    "contentChanges": [{ "text": text }]
                }),
            )
            .await
        }
    }

    /// Send `didClose` for an open document. Unknown documents are ignored.
    pub async fn close_document(&self, uri: &str) -> LspResult<()> {
        if !self.documents.forget(uri) {
            return Ok(());
        }
        self.notify(
            "textDocument/didClose",
            json!({ "textDocument": { "uri": uri } }),
        )
        .await
    }

    pub fn is_document_open(&self, uri: &str) -> bool {
        self.documents.contains(uri)
    }

    /// Version last sent for `uri`
    pub fn document_version(&self, uri: &str) -> Option<i32> {
        self.documents.version(uri)
    }
}
