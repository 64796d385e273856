use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::beverage::BeverageKind;
use crate::error_handling::types::TransportError;

/// Opaque identifier of one running instance, generated once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message on the broadcast bus.
///
/// Wire form: `{"type":"HEARTBEAT","payload":{"id":"..."}}` or
/// `{"type":"CUP_FINISHED","payload":{"coffeeType":"ICED_COFFEE"}}`.
/// `coffee_type` stays a string on the wire so a peer running a newer catalog
/// cannot make the whole message undecodable; receivers resolve it with
/// [`BusMessage::finished_kind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BusMessage {
    #[serde(rename = "HEARTBEAT")]
    Heartbeat { id: PeerId },
    #[serde(rename = "CUP_FINISHED")]
    CupFinished {
        #[serde(rename = "coffeeType")]
        coffee_type: String,
    },
}

impl BusMessage {
    pub fn heartbeat(id: &PeerId) -> Self {
        BusMessage::Heartbeat { id: id.clone() }
    }

    pub fn cup_finished(kind: BeverageKind) -> Self {
        BusMessage::CupFinished {
            coffee_type: kind.as_str().to_string(),
        }
    }

    /// The beverage of a completion notification, if it names a known kind.
    pub fn finished_kind(&self) -> Option<BeverageKind> {
        match self {
            BusMessage::CupFinished { coffee_type } => coffee_type.parse().ok(),
            BusMessage::Heartbeat { .. } => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(|e| TransportError::Decode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// A bus message tagged with the instance that published it, so receivers
/// can drop their own echoes.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: PeerId,
    pub message: BusMessage,
}
