//! The `aps.alert` sub-object: plain text or a localization descriptor.

use serde_json::{Map, Value};

use crate::error::{ApnsError, ApnsResult};

/// Alert text or localization descriptor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alert {
    body: Option<Value>,
    body_loc_key: Option<String>,
    body_loc_args: Vec<Value>,
    action_loc_key: Option<String>,
    launch_image: Option<String>,
}

impl Alert {
    /// Create an alert from its raw parts
    ///
    /// `body` and every entry of `body_loc_args` must be JSON scalars
    /// (string, number or bool); anything else is an `InvalidArgument`.
    pub fn new(
        body: Option<Value>,
        body_loc_key: Option<String>,
        body_loc_args: Vec<Value>,
        action_loc_key: Option<String>,
        launch_image: Option<String>,
    ) -> ApnsResult<Self> {
        if let Some(value) = &body {
            if !is_scalar(value) {
                return Err(ApnsError::InvalidArgument(
                    "alert body must be a string, number or bool".to_string(),
                ));
            }
        }
        validate_loc_args(&body_loc_args)?;

        Ok(Self {
            body,
            body_loc_key,
            body_loc_args,
            action_loc_key,
            launch_image,
        })
    }

    /// Alert carrying only body text
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: Some(Value::String(body.into())),
            ..Default::default()
        }
    }

    /// Alert resolved on the device from a localization key
    pub fn localized(body_loc_key: impl Into<String>) -> Self {
        Self {
            body_loc_key: Some(body_loc_key.into()),
            ..Default::default()
        }
    }

    pub fn with_body_loc_args(mut self, args: Vec<Value>) -> ApnsResult<Self> {
        validate_loc_args(&args)?;
        self.body_loc_args = args;
        Ok(self)
    }

    pub fn with_action_loc_key(mut self, key: impl Into<String>) -> Self {
        self.action_loc_key = Some(key.into());
        self
    }

    pub fn with_launch_image(mut self, image: impl Into<String>) -> Self {
        self.launch_image = Some(image.into());
        self
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn body_loc_key(&self) -> Option<&str> {
        self.body_loc_key.as_deref()
    }

    pub fn body_loc_args(&self) -> &[Value] {
        &self.body_loc_args
    }

    pub fn action_loc_key(&self) -> Option<&str> {
        self.action_loc_key.as_deref()
    }

    pub fn launch_image(&self) -> Option<&str> {
        self.launch_image.as_deref()
    }

    /// Render the alert as it appears under `aps.alert`
    ///
    /// `action_loc_key` and `body_loc_key` share the `loc_key` field; the body
    /// key wins when both are set, and plain body text is dropped whenever a
    /// body key is present. A structure holding only `body` collapses to the
    /// bare value. String bodies are trimmed; numbers and bools pass through.
    pub fn render(&self) -> Value {
        let mut payload = Map::new();

        if let Some(key) = &self.action_loc_key {
            payload.insert("loc_key".to_string(), Value::String(key.clone()));
        }

        if let Some(key) = &self.body_loc_key {
            payload.insert("loc_key".to_string(), Value::String(key.clone()));
        } else if let Some(body) = &self.body {
            let body = match body {
                Value::String(text) => Value::String(text.trim().to_string()),
                other => other.clone(),
            };
            payload.insert("body".to_string(), body);
        }

        if let Some(image) = &self.launch_image {
            payload.insert("launch_image".to_string(), Value::String(image.clone()));
        }

        if !self.body_loc_args.is_empty() {
            payload.insert(
                "loc_args".to_string(),
                Value::Array(self.body_loc_args.clone()),
            );
        }

        if payload.len() == 1 {
            if let Some(body) = payload.remove("body") {
                return body;
            }
        }

        Value::Object(payload)
    }
}

fn validate_loc_args(args: &[Value]) -> ApnsResult<()> {
    for (index, arg) in args.iter().enumerate() {
        if !is_scalar(arg) {
            return Err(ApnsError::InvalidArgument(format!(
                "localization argument #{index} must be a string, number or bool"
            )));
        }
    }
    Ok(())
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}
