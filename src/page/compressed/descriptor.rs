//! The compressed page descriptor: for every attribute, the pair
//! `(attribute_size_bytes, dictionary_size_bytes)` that tells a reader how
//! to interpret that attribute's coded column.

use crate::error::{Result, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub attribute_size_bytes: i32,
    pub dictionary_size_bytes: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor {
    pub attributes: Vec<AttributeDescriptor>,
}

impl PageDescriptor {
    pub fn new(attributes: Vec<AttributeDescriptor>) -> Self {
        Self { attributes }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.attributes.len() * 8);
        for attr in &self.attributes {
            out.extend_from_slice(&attr.attribute_size_bytes.to_le_bytes());
            out.extend_from_slice(&attr.dictionary_size_bytes.to_le_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 8 != 0 {
            return Err(StorageError::malformed_block(
                "compressed page descriptor length is not a multiple of 8",
            ));
        }
        let mut attributes = Vec::with_capacity(bytes.len() / 8);
        let mut cursor = 0;
        while cursor < bytes.len() {
            let attribute_size_bytes =
                i32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap());
            let dictionary_size_bytes =
                i32::from_le_bytes(bytes[cursor + 4..cursor + 8].try_into().unwrap());
            attributes.push(AttributeDescriptor {
                attribute_size_bytes,
                dictionary_size_bytes,
            });
            cursor += 8;
        }
        Ok(Self { attributes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let descriptor = PageDescriptor::new(vec![
            AttributeDescriptor {
                attribute_size_bytes: 4,
                dictionary_size_bytes: 0,
            },
            AttributeDescriptor {
                attribute_size_bytes: 1,
                dictionary_size_bytes: 1016,
            },
        ]);
        let bytes = descriptor.encode();
        assert_eq!(PageDescriptor::decode(&bytes).unwrap(), descriptor);
    }
}
