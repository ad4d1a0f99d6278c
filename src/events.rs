//! Subscription events returned by mutations in their `meta` column.

use crate::gson::int64_from_pair;
use serde::{Deserialize, Deserializer, Serialize};

type PropertyMap = serde_json::Map<String, serde_json::Value>;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SubscriptionEvent {
    Create(NodeEvent),
    Update(NodeEvent),
    Delete(NodeEvent),
    CreateRelationship(RelationshipEvent),
    DeleteRelationship(RelationshipEvent),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NodeProperties {
    pub old: Option<PropertyMap>,
    pub new: Option<PropertyMap>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeEvent {
    #[serde(deserialize_with = "integer")]
    pub id: i64,
    pub typename: String,
    #[serde(deserialize_with = "integer")]
    pub timestamp: i64,
    pub properties: NodeProperties,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RelationshipProperties {
    pub from: PropertyMap,
    pub to: PropertyMap,
    pub relationship: PropertyMap,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipEvent {
    #[serde(deserialize_with = "integer")]
    pub id: i64,
    #[serde(rename = "id_from", deserialize_with = "integer")]
    pub id_from: i64,
    #[serde(rename = "id_to", deserialize_with = "integer")]
    pub id_to: i64,
    /// Relationship type as stored in the database
    pub relationship_name: String,
    pub from_typename: String,
    pub to_typename: String,
    #[serde(deserialize_with = "integer")]
    pub timestamp: i64,
    pub properties: RelationshipProperties,
}

impl SubscriptionEvent {
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Create(x) | Self::Update(x) | Self::Delete(x) => x.timestamp,
            Self::CreateRelationship(x) | Self::DeleteRelationship(x) => x.timestamp,
        }
    }
}

/// Drivers hand back 64-bit integers either as plain numbers or as `{low, high}` pairs
fn integer<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Integer {
        Plain(i64),
        Pair { low: i32, high: i32 },
    }

    Ok(match Integer::deserialize(deserializer)? {
        Integer::Plain(x) => x,
        Integer::Pair { low, high } => int64_from_pair(low, high),
    })
}

/// Receives events after the statement that produced them committed
pub trait EventSink {
    fn publish(&self, event: &SubscriptionEvent);
}

/// Reads the `meta` column of a mutation. Events are ordered by timestamp,
/// keeping statement order for events sharing one.
pub fn events_from_meta(meta: &serde_json::Value) -> Result<Vec<SubscriptionEvent>, String> {
    let items = match meta {
        serde_json::Value::Null => return Ok(vec![]),
        serde_json::Value::Array(items) => items,
        _ => return Err("event metadata must be a list".to_string()),
    };
    let mut events = vec![];
    for item in items {
        let event: SubscriptionEvent =
            serde_json::from_value(item.clone()).map_err(|e| format!("invalid event metadata: {}", e))?;
        events.push(event);
    }
    events.sort_by_key(|x| x.timestamp());
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_events_accept_integer_pairs() {
        let events = events_from_meta(&json!([{
            "event": "update",
            "id": {"low": 7, "high": 0},
            "typename": "Movie",
            "timestamp": 1700000000000i64,
            "properties": {"old": {"title": "A"}, "new": {"title": "B"}}
        }]))
        .unwrap();
        match &events[0] {
            SubscriptionEvent::Update(x) => {
                assert_eq!(x.id, 7);
                assert_eq!(x.typename, "Movie");
                assert_eq!(x.properties.new.as_ref().unwrap()["title"], json!("B"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn relationship_events_keep_their_endpoints() {
        let events = events_from_meta(&json!([{
            "event": "create_relationship",
            "id": 3,
            "id_from": 1,
            "id_to": 2,
            "relationshipName": "ACTED_IN",
            "fromTypename": "Actor",
            "toTypename": "Movie",
            "timestamp": 5,
            "properties": {"from": {"name": "Keanu"}, "to": {"title": "Matrix"}, "relationship": {"role": "Neo"}}
        }]))
        .unwrap();
        let serialized = serde_json::to_value(&events[0]).unwrap();
        assert_eq!(serialized["event"], json!("create_relationship"));
        assert_eq!(serialized["relationshipName"], json!("ACTED_IN"));
        assert_eq!(serialized["id_from"], json!(1));
    }

    #[test]
    fn events_are_ordered_by_timestamp() {
        let event = |id: i64, timestamp: i64| {
            json!({"event": "delete", "id": id, "typename": "Movie", "timestamp": timestamp, "properties": {"old": {}, "new": null}})
        };
        let events = events_from_meta(&json!([event(1, 20), event(2, 10), event(3, 20)])).unwrap();
        let ids: Vec<i64> = events
            .iter()
            .map(|x| match x {
                SubscriptionEvent::Delete(x) => x.id,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn malformed_metadata_is_rejected() {
        assert!(events_from_meta(&json!({"event": "create"})).is_err());
        assert!(events_from_meta(&json!([{"event": "rename"}])).is_err());
        assert!(events_from_meta(&json!(null)).unwrap().is_empty());
    }
}
