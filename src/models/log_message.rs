use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, doc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::collection_ops::CollectionOps;
use crate::errors::Error;

pub const DEFAULT_COLLECTION: &str = "logmessages";

/// A webhook event as recorded by the hook receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LogMessage {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[validate(length(min = 1))]
    pub org: String,
    #[serde(rename = "pushername")]
    #[validate(length(min = 1))]
    pub pusher_name: String,
    #[serde(rename = "pusherlink")]
    #[validate(url)]
    pub pusher_link: String,
    #[serde(rename = "actionhook")]
    #[validate(length(min = 1))]
    pub action_hook: String,
    #[validate(length(min = 1))]
    pub repos: String,
    #[serde(
        rename = "dateevt",
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime"
    )]
    pub date_evt: DateTime<Utc>,
}

impl LogMessage {
    pub fn new(
        org: impl Into<String>,
        pusher_name: impl Into<String>,
        pusher_link: impl Into<String>,
        action_hook: impl Into<String>,
        repos: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            org: org.into(),
            pusher_name: pusher_name.into(),
            pusher_link: pusher_link.into(),
            action_hook: action_hook.into(),
            repos: repos.into(),
            date_evt: Utc::now(),
        }
    }

    /// Validates and inserts the event, returning its generated id.
    pub async fn record(
        ops: &CollectionOps,
        collection: &str,
        message: &LogMessage,
    ) -> Result<ObjectId, Error> {
        message
            .validate()
            .map_err(|e| Error::bad_request(&format!("Validation db error: {e:?}")))?;

        match ops.insert(collection, message).await? {
            Bson::ObjectId(id) => Ok(id),
            other => Err(Error::internal_err(&format!(
                "Expected an ObjectId for the new log message, got {other}"
            ))),
        }
    }

    pub async fn list_for_org(
        ops: &CollectionOps,
        collection: &str,
        org: &str,
    ) -> Result<Vec<LogMessage>, Error> {
        ops.find_filtered_as(collection, doc! { "org": org }).await
    }

    pub async fn list_for_repos(
        ops: &CollectionOps,
        collection: &str,
        repos: &str,
    ) -> Result<Vec<LogMessage>, Error> {
        ops.find_filtered_as(collection, doc! { "repos": repos })
            .await
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::{from_document, to_document};

    use super::*;

    fn push_event() -> LogMessage {
        LogMessage::new(
            "acme",
            "octocat",
            "https://github.com/octocat",
            "push",
            "acme/widgets",
        )
    }

    #[test]
    fn stored_with_the_receiver_field_names() {
        let document = to_document(&push_event()).unwrap();

        assert!(!document.contains_key("_id"));
        assert_eq!(document.get_str("pushername").unwrap(), "octocat");
        assert_eq!(document.get_str("pusherlink").unwrap(), "https://github.com/octocat");
        assert_eq!(document.get_str("actionhook").unwrap(), "push");
        assert!(document.get_datetime("dateevt").is_ok());
    }

    #[test]
    fn reads_back_from_bson() {
        let id = ObjectId::new();
        let document = doc! {
            "_id": id,
            "org": "acme",
            "pushername": "octocat",
            "pusherlink": "https://github.com/octocat",
            "actionhook": "release",
            "repos": "acme/widgets",
            "dateevt": bson::DateTime::from_millis(1_700_000_000_000),
        };

        let message: LogMessage = from_document(document).unwrap();
        assert_eq!(message.id, Some(id));
        assert_eq!(message.action_hook, "release");
        assert_eq!(message.date_evt.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn rejects_blank_org_and_bad_link() {
        let mut message = push_event();
        assert!(message.validate().is_ok());

        message.org.clear();
        message.pusher_link = "not a url".to_string();
        let errors = message.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("org"));
        assert!(fields.contains_key("pusherlink") || fields.contains_key("pusher_link"));
    }
}
