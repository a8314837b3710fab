use indexmap::IndexMap;
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::storage::UploadSource;

/// An inbound request, as handed over by the (external) HTTP routing
/// layer: route params, parsed query string, JSON payload, and the
/// authentication context constraints may resolve against.
#[derive(Debug, Default)]
pub struct Request {
    pub params: Params,
    pub query: IndexMap<String, Value>,
    pub payload: Option<Value>,
    pub auth: Option<Value>,

    /// An uploaded file, for the UPLOAD handler.
    pub upload: Option<FileUpload>,
}

#[derive(Debug, Default)]
pub struct Params {
    pub id: Option<Value>,
}

impl Request {
    pub fn new() -> Request {
        Request::default()
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Request {
        self.params.id = Some(id.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Request {
        self.payload = Some(payload);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Request {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_auth(mut self, auth: Value) -> Request {
        self.auth = Some(auth);
        self
    }

    pub fn with_upload(mut self, upload: FileUpload) -> Request {
        self.upload = Some(upload);
        self
    }

    /// The JSON projection of this request that constraint paths
    /// resolve against (`payload.user`, `auth.session.role`,
    /// `url.query.page`, ...).
    pub fn constraint_source(&self) -> Value {
        let query: serde_json::Map<String, Value> = self
            .query
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        json!({
            "params": { "id": self.params.id.clone().unwrap_or(Value::Null) },
            "url": { "query": query },
            "payload": self.payload.clone().unwrap_or(Value::Null),
            "auth": self.auth.clone().unwrap_or(Value::Null),
        })
    }
}

/// A file bound for the UPLOAD handler: the client-supplied name (used
/// only for its extension) and the byte source.
#[derive(Debug)]
pub struct FileUpload {
    pub filename: String,
    pub source: UploadSource,
}

impl FileUpload {
    pub fn from_path(filename: impl Into<String>, path: impl Into<PathBuf>) -> FileUpload {
        FileUpload {
            filename: filename.into(),
            source: UploadSource::Path(path.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_source_shape() {
        let request = Request::new()
            .with_id(7)
            .with_query("page", "2")
            .with_payload(json!({"user": "dave"}))
            .with_auth(json!({"session": {"role": "admin"}}));

        let source = request.constraint_source();

        assert_eq!(source["params"]["id"], json!(7));
        assert_eq!(source["url"]["query"]["page"], json!("2"));
        assert_eq!(source["payload"]["user"], json!("dave"));
        assert_eq!(source["auth"]["session"]["role"], json!("admin"));
    }
}
