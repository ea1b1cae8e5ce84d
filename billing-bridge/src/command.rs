//! Inbound commands from the host script.
//!
//! Commands arrive as `{"method": "...", "params": {...}}`. Methods that take
//! no arguments may omit `params` or send `null` or `{}`.

use crate::{BillingError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BillingCommand {
    IsConnected,
    Purchase { sku: String },
    Consume { token: String },
    GetPurchases { continuation_token: Option<String> },
    LocalizePurchases { items: Vec<String> },
    RestoreCompleted,
}

#[derive(Debug, Serialize, Deserialize)]
struct CommandEnvelope {
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Deserialize)]
struct SkuParams {
    sku: String,
}

#[derive(Deserialize)]
struct TokenParams {
    token: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchasesParams {
    #[serde(default)]
    continuation_token: Option<String>,
}

#[derive(Deserialize)]
struct ItemsParams {
    items: Vec<String>,
}

impl BillingCommand {
    pub fn method(&self) -> &'static str {
        match self {
            Self::IsConnected => "isConnected",
            Self::Purchase { .. } => "purchase",
            Self::Consume { .. } => "consume",
            Self::GetPurchases { .. } => "getPurchases",
            Self::LocalizePurchases { .. } => "localizePurchases",
            Self::RestoreCompleted => "restoreCompleted",
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let envelope: CommandEnvelope = serde_json::from_str(json)?;
        Self::from_parts(&envelope.method, envelope.params)
    }

    /// Build a command from a method name and its parameters.
    pub fn from_parts(method: &str, params: Value) -> Result<Self> {
        match method {
            "isConnected" => Ok(Self::IsConnected),
            "purchase" => {
                let p: SkuParams = required(params)?;
                Ok(Self::Purchase { sku: p.sku })
            }
            "consume" => {
                let p: TokenParams = required(params)?;
                Ok(Self::Consume { token: p.token })
            }
            "getPurchases" => {
                let p: PurchasesParams = optional(params)?;
                Ok(Self::GetPurchases {
                    continuation_token: p.continuation_token,
                })
            }
            "localizePurchases" => {
                let p: ItemsParams = required(params)?;
                Ok(Self::LocalizePurchases { items: p.items })
            }
            "restoreCompleted" => Ok(Self::RestoreCompleted),
            other => Err(BillingError::UnknownCommand(other.to_string())),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let params = match self {
            Self::IsConnected | Self::RestoreCompleted => Value::Null,
            Self::Purchase { sku } => json!({ "sku": sku }),
            Self::Consume { token } => json!({ "token": token }),
            Self::GetPurchases { continuation_token } => match continuation_token {
                Some(token) => json!({ "continuationToken": token }),
                None => json!({}),
            },
            Self::LocalizePurchases { items } => json!({ "items": items }),
        };
        let envelope = CommandEnvelope {
            method: self.method().to_string(),
            params,
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

fn required<T: DeserializeOwned>(params: Value) -> Result<T> {
    Ok(serde_json::from_value(params)?)
}

fn optional<T: DeserializeOwned + Default>(params: Value) -> Result<T> {
    if params.is_null() {
        return Ok(T::default());
    }
    required(params)
}
