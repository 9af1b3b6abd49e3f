use serde::{Deserialize, Serialize};

use crate::domain::grant::PersonId;

/// Directory entry for a person. Either channel field may be absent; a
/// person with neither email nor chat id simply receives nothing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCard {
    pub person_id: PersonId,
    pub name: String,
    pub email: Option<String>,
    pub chat_id: Option<String>,
    pub avatar_url: Option<String>,
}
