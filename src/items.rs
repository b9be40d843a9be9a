//! Sealing and importing new items
//!
//! Item data is encrypted to the server's public key with an anonymous
//! sealed box before it is sent, so only the server can read it. Bulk
//! imports map arbitrary JSON records onto item fields.

use base64::{engine::general_purpose, Engine as _};
use crypto_box::{aead::OsRng, PublicKey};
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// The server's public key, as published by `/public-key`
#[derive(Clone, Debug)]
pub struct SealingKey(PublicKey);

impl SealingKey {
    /// Parse a base58-encoded 32-byte key
    pub fn from_b58(key_b58: &str) -> ApiResult<Self> {
        let bytes = bs58::decode(key_b58.trim())
            .into_vec()
            .map_err(|e| ApiError::Encryption(format!("public key is not base58: {}", e)))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            ApiError::Encryption(format!("public key is {} bytes, expected 32", bytes.len()))
        })?;
        Ok(Self(PublicKey::from(bytes)))
    }

    /// Seal `plaintext` and return the ciphertext as standard base64
    pub fn seal(&self, plaintext: &[u8]) -> ApiResult<String> {
        let ciphertext = self
            .0
            .seal(&mut OsRng, plaintext)
            .map_err(|e| ApiError::Encryption(e.to_string()))?;
        Ok(general_purpose::STANDARD.encode(ciphertext))
    }
}

/// Body of `POST /items`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewItem {
    pub target_type: String,
    pub target_id: String,
    pub category: Option<String>,
    pub data_encrypted_b64: String,
    pub template: Option<String>,
}

/// An item whose content is still plaintext
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub target_type: String,
    pub target_id: String,
    pub category: Option<String>,
    pub template: Option<String>,
    pub content: String,
}

impl ItemDraft {
    pub fn seal(&self, key: &SealingKey) -> ApiResult<NewItem> {
        Ok(NewItem {
            target_type: self.target_type.clone(),
            target_id: self.target_id.clone(),
            category: self.category.clone(),
            data_encrypted_b64: key.seal(self.content.as_bytes())?,
            template: self.template.clone(),
        })
    }
}

/// Which record fields hold each item attribute
#[derive(Debug, Clone)]
pub struct ImportFields {
    pub target_type: String,
    pub target_id: String,
    pub category: String,
    pub template: String,
    pub content: String,
}

impl Default for ImportFields {
    fn default() -> Self {
        Self {
            target_type: "target_type".to_string(),
            target_id: "target_id".to_string(),
            category: "category".to_string(),
            template: "template".to_string(),
            content: "content".to_string(),
        }
    }
}

/// Values applied to every imported item, taking precedence over record fields
#[derive(Debug, Clone, Default)]
pub struct ImportOverrides {
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub category: Option<String>,
    pub template: Option<String>,
}

/// Turn JSON records into drafts. Target and content are required per record.
pub fn drafts_from_json(
    records: &[Value],
    fields: &ImportFields,
    overrides: &ImportOverrides,
) -> ApiResult<Vec<ItemDraft>> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let required = |field: &str| {
                field_text(record, field)
                    .ok_or_else(|| ApiError::InvalidItem(format!("#{}: missing `{}`", i, field)))
            };

            let target_type = match &overrides.target_type {
                Some(value) => value.clone(),
                None => required(&fields.target_type)?,
            };
            let target_id = match &overrides.target_id {
                Some(value) => value.clone(),
                None => required(&fields.target_id)?,
            };

            Ok(ItemDraft {
                target_type,
                target_id,
                category: overrides
                    .category
                    .clone()
                    .or_else(|| field_text(record, &fields.category)),
                template: overrides
                    .template
                    .clone()
                    .or_else(|| field_text(record, &fields.template)),
                content: required(&fields.content)?,
            })
        })
        .collect()
}

/// Field value as text: strings as-is, other values as compact JSON
fn field_text(record: &Value, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
