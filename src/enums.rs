use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, VariantNames};

/// Label for each collection operation, used in logs and errors.
#[derive(
    Debug,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    EnumString,
    VariantNames,
    Display,
    PartialEq,
    Eq,
    Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Ping,
    ListAll,
    ListFiltered,
    Count,
    SearchByNamePrefix,
    Insert,
    DeleteOne,
    DeleteAll,
    DeleteMany,
    UpdateOne,
}

impl Operation {
    /// Deletes and updates leave the collection in an unknown state when they
    /// fail; reads and inserts report back to the caller.
    pub fn escalates_on_failure(&self) -> bool {
        matches!(
            self,
            Operation::DeleteOne
                | Operation::DeleteAll
                | Operation::DeleteMany
                | Operation::UpdateOne
        )
    }
}
