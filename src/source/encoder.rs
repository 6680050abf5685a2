use bytes::Bytes;

use super::Document;
use crate::Error;
use crate::Result;

/// Converts configuration documents to and from one wire format.
pub trait Encoder: Send + Sync + 'static {
    fn encode(
        &self,
        document: &Document,
    ) -> Result<Bytes>;

    fn decode(
        &self,
        data: &[u8],
    ) -> Result<Document>;

    /// Format name recorded on change-sets
    fn format(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn encode(
        &self,
        document: &Document,
    ) -> Result<Bytes> {
        serde_json::to_vec(document)
            .map(Bytes::from)
            .map_err(|e| Error::Encode(e.to_string()))
    }

    fn decode(
        &self,
        data: &[u8],
    ) -> Result<Document> {
        Ok(serde_json::from_slice(data)?)
    }

    fn format(&self) -> &'static str {
        "json"
    }
}
