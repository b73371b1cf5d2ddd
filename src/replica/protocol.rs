//! Wire format of the replication endpoints

use serde::{Deserialize, Serialize};

/// Body of `GET /next`. An empty key means the queue is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl NextEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

/// Query of the retire endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetireParams {
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names() {
        let json = serde_json::to_string(&NextEntry::new("k1", "v1")).unwrap();
        assert_eq!(json, r#"{"Key":"k1","Value":"v1"}"#);

        let empty: NextEntry = serde_json::from_str(r#"{"Key":"","Value":""}"#).unwrap();
        assert!(empty.is_empty());
    }
}
