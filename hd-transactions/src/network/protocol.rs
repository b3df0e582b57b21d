//! Protocol Messages
//!
//! Wire format of the pending transaction endpoints. Server responses carry a
//! `"response"` string which itself holds a JSON document of the form
//! `{ "txs": [ <transaction>, ... ] }`.
//!
//! Transaction documents are untrusted: they are converted once into
//! [`TransactionDoc`], a struct of optional fields, and validated from there.

use std::collections::BTreeMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::currency::LEGACY_CURRENCY_KEYS;
use crate::network::client::ServerError;

/// Read a string that the server may have sent as a number.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Read an item list, keeping the well-formed entries of a malformed one.
fn lenient_items<'de, D>(deserializer: D) -> Result<Option<Vec<ItemDoc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(entries)) => Some(
            entries
                .iter()
                .filter_map(|entry| ItemDoc::deserialize(entry).ok())
                .collect(),
        ),
        _ => None,
    })
}

// =============================================================================
// TRANSACTION DOCUMENT
// =============================================================================

/// A transaction as sent by the server or persisted by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionDoc {
    /// Server-assigned identifier.
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    /// Identifier under its older name. `order_id` wins when both are sent.
    #[serde(rename = "id", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub legacy_id: Option<String>,

    /// Origin tag (`shop`, `crm`, ...).
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Token required when confirming with the server.
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Present on purchases resumed from an interrupted session.
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    /// Placeholder currency key. Never supported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub none: Option<Value>,

    /// Soft currency amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sc: Option<Value>,

    /// Hard currency amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hc: Option<Value>,

    /// Golden fragments amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gf: Option<Value>,

    /// Discrete items. Anything but an array is ignored, as are entries
    /// that aren't objects.
    #[serde(default, deserialize_with = "lenient_items", skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ItemDoc>>,

    /// Any other top-level field.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TransactionDoc {
    /// Typed view of an untrusted JSON value.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Raw value of a currency field by server key.
    pub fn currency_field(&self, key: &str) -> Option<&Value> {
        match key {
            "none" => self.none.as_ref(),
            "sc" => self.sc.as_ref(),
            "hc" => self.hc.as_ref(),
            "gf" => self.gf.as_ref(),
            _ => self.extra.get(key),
        }
    }

    /// Mutable slot of a currency field by server key.
    pub fn currency_slot(&mut self, key: &str) -> Option<&mut Option<Value>> {
        match key {
            "sc" => Some(&mut self.sc),
            "hc" => Some(&mut self.hc),
            "gf" => Some(&mut self.gf),
            _ => None,
        }
    }

    /// Transaction id, under either name.
    pub fn id(&self) -> Option<&str> {
        self.order_id.as_deref().or(self.legacy_id.as_deref())
    }

    /// Retired currency keys present in the document, e.g. `pc`. Other
    /// unknown fields are server metadata and don't matter here.
    pub fn unrecognized_currency_keys(&self) -> impl Iterator<Item = &str> {
        LEGACY_CURRENCY_KEYS
            .into_iter()
            .filter(|key| self.extra.contains_key(*key))
    }

    /// Whether this document is a purchase resumed from a previous session.
    pub fn is_resumed_purchase(&self) -> bool {
        self.product_id.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// An item line of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDoc {
    /// Item definition sku.
    #[serde(default, deserialize_with = "lenient_string")]
    pub sku: Option<String>,

    /// Item type code.
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub item_type: Option<String>,

    /// Units granted (int-string).
    #[serde(default)]
    pub amount: Option<Value>,
}

// =============================================================================
// ENVELOPES
// =============================================================================

/// Raw RPC response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerResponse {
    /// JSON document as a string.
    #[serde(default)]
    pub response: Option<String>,
}

impl ServerResponse {
    /// Wrap a document.
    pub fn new(document: &impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(Self {
            response: Some(serde_json::to_string(document)?),
        })
    }
}

/// `{ "txs": [...] }` document, used both for responses and for confirmation
/// requests. Entries stay raw so one bad entry can't poison the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxsEnvelope {
    /// Transactions.
    #[serde(default)]
    pub txs: Vec<Value>,
}

impl TxsEnvelope {
    /// Build an envelope.
    pub fn new(txs: Vec<Value>) -> Self {
        Self { txs }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Ids of the entries, in order. Entries without an id are skipped.
    pub fn ids(&self) -> Vec<String> {
        self.txs
            .iter()
            .filter_map(|tx| TransactionDoc::from_value(tx).ok())
            .filter_map(|doc| doc.id().map(str::to_owned))
            .collect()
    }
}

/// Problems reading a response.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// The call failed.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// No `"response"` field, or an empty one.
    #[error("response has no payload")]
    MissingResponse,

    /// Payload isn't a `{ "txs": [...] }` document.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Extract the transaction entries of a server reply.
pub fn parse_txs(reply: Result<ServerResponse, ServerError>) -> Result<Vec<Value>, ResponseError> {
    let response = reply?;
    let payload = response
        .response
        .filter(|s| !s.is_empty())
        .ok_or(ResponseError::MissingResponse)?;
    let envelope: TxsEnvelope = serde_json::from_str(&payload)?;
    Ok(envelope.txs)
}
