//! response：不执行任何操作，只把文本带回结果

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actions::{Action, ActionHandler, ActionKind};

pub struct ResponseHandler;

#[async_trait]
impl ActionHandler for ResponseHandler {
    fn kinds(&self) -> &[ActionKind] {
        &[ActionKind::Response]
    }

    fn description(&self) -> &str {
        "Reply with text"
    }

    async fn execute(&self, action: &Action) -> Result<Value, String> {
        match action {
            Action::Response(params) => Ok(json!({"text": params.text})),
            other => Err(format!("response handler cannot run `{}`", other.kind())),
        }
    }
}
