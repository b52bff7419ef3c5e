use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq, Eq)]
pub struct Hero {
    pub id: i64,
    pub name: String,
}

/// Shape of a hero entry from the remote roster source.
#[derive(Debug, Deserialize)]
pub struct RemoteHero {
    pub id: i64,
    pub localized_name: String,
}

impl From<RemoteHero> for Hero {
    fn from(remote: RemoteHero) -> Self {
        Hero {
            id: remote.id,
            name: remote.localized_name,
        }
    }
}
