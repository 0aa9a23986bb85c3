use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Document, doc};

use crate::errors::Error;

pub const NAME_FIELD: &str = "name";

/// Anchored, case-insensitive prefix match on `name`. The search text is
/// matched literally.
pub fn name_prefix_filter(search: &str) -> Document {
    let pattern = format!("^{}.*", regex::escape(search));
    let mut filter = Document::new();
    filter.insert(NAME_FIELD, doc! { "$regex": pattern, "$options": "i" });
    filter
}

pub fn parse_object_id(id: &str) -> Result<ObjectId, Error> {
    ObjectId::parse_str(id).map_err(|_| Error::ParseObjectID(id.to_string()))
}

pub fn id_filter(id: &str) -> Result<Document, Error> {
    let id = parse_object_id(id)?;
    Ok(doc! { "_id": id })
}

/// Parses MongoDB Extended JSON (e.g. `{"_id": {"$oid": "..."}}`) into a
/// document. Anything but a JSON object is rejected.
pub fn document_from_json(json: &str) -> Result<Document, Error> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| Error::bad_request(&format!("Invalid JSON document: {e}")))?;

    match value {
        serde_json::Value::Object(map) => Document::try_from(map)
            .map_err(|e| Error::bad_request(&format!("Invalid extended JSON: {e}"))),
        other => Err(Error::bad_request(&format!(
            "Expected a JSON object, got {other}"
        ))),
    }
}
