//! Party management calls.

use crate::{Ledger, LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use tracing::debug;

/// A party as known to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyInfo {
    pub identifier: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub is_local: bool,
}

fn parse_parties(result: Json) -> LedgerResult<Vec<PartyInfo>> {
    serde_json::from_value(result)
        .map_err(|e| LedgerError::UnexpectedResponse(format!("malformed party list: {}", e)))
}

impl Ledger {
    /// Look up parties by id. The result is positional; unknown ids give `None`.
    pub async fn get_parties(&self, ids: &[String]) -> LedgerResult<Vec<Option<PartyInfo>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let result = self.http.post_json("v1/parties", ids).await?;
        let known: HashMap<String, PartyInfo> = parse_parties(result)?
            .into_iter()
            .map(|p| (p.identifier.clone(), p))
            .collect();
        // The server answers only known parties, in any order.
        Ok(ids.iter().map(|id| known.get(id).cloned()).collect())
    }

    /// Every party the participant knows about.
    pub async fn list_known_parties(&self) -> LedgerResult<Vec<PartyInfo>> {
        let result = self.http.get_json("v1/parties").await?;
        parse_parties(result)
    }

    /// Allocate a new party. The server picks the identifier when `hint` is `None`.
    pub async fn allocate_party(
        &self,
        hint: Option<&str>,
        display_name: Option<&str>,
    ) -> LedgerResult<PartyInfo> {
        let mut body = Map::new();
        if let Some(hint) = hint {
            body.insert("identifierHint".into(), Json::from(hint));
        }
        if let Some(name) = display_name {
            body.insert("displayName".into(), Json::from(name));
        }
        debug!(?hint, ?display_name, "allocate party");
        let result = self.http.post_json("v1/parties/allocate", &body).await?;
        serde_json::from_value(result)
            .map_err(|e| LedgerError::UnexpectedResponse(format!("malformed party: {}", e)))
    }
}
