use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire keys of [`NodeInfo`] that cannot appear among its extra fields.
pub const RESERVED_FIELDS: [&str; 2] = ["name", "localIp"];

/// Identity record a node sends every time it registers.
///
/// `name` and `localIp` are the only fields the registry interprets; anything
/// else the node supplies is kept verbatim and echoed back in listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub name: String,
    /// Address used to reach the node's status endpoint. Empty means the node
    /// is listed but never polled.
    #[serde(default)]
    pub local_ip: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, local_ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local_ip: local_ip.into(),
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Last payload reported by a node's `/status` endpoint.
///
/// The registry never looks inside; it only requires a JSON object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct NodeStatus(Map<String, Value>);

impl NodeStatus {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// One entry of the registry.
///
/// Serializes as `{"info": …, "status": …}`; the failure counter is internal
/// bookkeeping and is never part of the wire shape.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RegisteredNode {
    pub(crate) info: NodeInfo,
    pub(crate) status: NodeStatus,
    #[serde(skip)]
    pub(crate) consecutive_failures: u32,
}

impl RegisteredNode {
    pub(crate) fn new(info: NodeInfo) -> Self {
        Self {
            info,
            status: NodeStatus::default(),
            consecutive_failures: 0,
        }
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn status(&self) -> &NodeStatus {
        &self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Listing entry as seen by HTTP clients of `GET /nodes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeView {
    pub info: NodeInfo,
    pub status: NodeStatus,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn node_info_keeps_unknown_fields() {
        let info: NodeInfo = serde_json::from_value(json!({
            "name": "sensor-1",
            "localIp": "10.0.0.7",
            "role": "camera",
            "tags": ["lab"],
        }))
        .expect("decode node info");

        assert_eq!(info.name, "sensor-1");
        assert_eq!(info.local_ip, "10.0.0.7");
        assert_eq!(info.extra.get("role"), Some(&json!("camera")));

        let encoded = serde_json::to_value(&info).expect("encode node info");
        assert_eq!(encoded["tags"], json!(["lab"]));
        assert_eq!(encoded["localIp"], json!("10.0.0.7"));
    }

    #[test]
    fn node_info_without_address_defaults_to_empty() {
        let info: NodeInfo =
            serde_json::from_value(json!({ "name": "headless" })).expect("decode node info");
        assert!(info.local_ip.is_empty());
    }

    #[test]
    fn node_info_requires_a_name() {
        let result = serde_json::from_value::<NodeInfo>(json!({ "localIp": "10.0.0.1" }));
        assert!(result.is_err());
    }

    #[test]
    fn registered_node_hides_failure_counter() {
        let mut node = RegisteredNode::new(NodeInfo::new("a", "10.0.0.1"));
        node.consecutive_failures = 2;

        let encoded = serde_json::to_value(&node).expect("encode node");
        assert_eq!(
            encoded,
            json!({
                "info": { "name": "a", "localIp": "10.0.0.1" },
                "status": {},
            })
        );
    }

    #[test]
    fn status_must_be_an_object() {
        assert!(serde_json::from_value::<NodeStatus>(json!({ "ok": true })).is_ok());
        assert!(serde_json::from_value::<NodeStatus>(json!([1, 2, 3])).is_err());
    }
}
