use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String, // canonical event url, also used as ticket_url
    pub title: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub images: Vec<String>,
    pub ticket_url: String,
    pub description: String,
}
