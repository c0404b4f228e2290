use serde::Deserialize;
use serde_json::Value;

use crate::error::TypeError;

/// A creator entry from an item's metadata.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ManifestCreator {
    pub address: String,
    pub share: u8,
}

/// Parsed item metadata JSON.
///
/// Kept as a JSON value so fields this tool does not understand survive a
/// rewrite untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct Manifest(Value);

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, TypeError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| TypeError::InvalidMetadata(e.to_string()))?;
        if !value.is_object() {
            return Err(TypeError::InvalidMetadata("metadata must be a JSON object".into()));
        }
        Ok(Self(value))
    }

    pub fn name(&self) -> Result<&str, TypeError> {
        self.0
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| TypeError::InvalidMetadata("missing string field `name`".into()))
    }

    pub fn symbol(&self) -> &str {
        self.0.get("symbol").and_then(Value::as_str).unwrap_or("")
    }

    pub fn seller_fee_basis_points(&self) -> Result<u16, TypeError> {
        match self.0.get("seller_fee_basis_points") {
            None => Ok(0),
            Some(v) => v
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .filter(|n| *n <= 10_000)
                .ok_or_else(|| {
                    TypeError::InvalidMetadata(format!("seller_fee_basis_points out of range: {v}"))
                }),
        }
    }

    pub fn creators(&self) -> Result<Vec<ManifestCreator>, TypeError> {
        match self.0.pointer("/properties/creators") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| TypeError::InvalidMetadata(format!("properties.creators: {e}"))),
        }
    }

    /// Point `image` and every `properties.files[].uri` at `image_uri`.
    pub fn with_image(mut self, image_uri: &str) -> Self {
        if let Some(obj) = self.0.as_object_mut() {
            obj.insert("image".into(), Value::String(image_uri.to_string()));
        }
        if let Some(files) = self
            .0
            .pointer_mut("/properties/files")
            .and_then(Value::as_array_mut)
        {
            for file in files.iter_mut().filter_map(Value::as_object_mut) {
                file.insert("uri".into(), Value::String(image_uri.to_string()));
            }
        }
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Serializing a `Value` cannot fail.
        serde_json::to_vec(&self.0).unwrap_or_default()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "Thing #0",
        "symbol": "THG",
        "seller_fee_basis_points": 500,
        "image": "0.png",
        "attributes": [{"trait_type": "hat", "value": "red"}],
        "properties": {
            "files": [{"uri": "0.png", "type": "image/png"}],
            "creators": [{"address": "Creator1111", "share": 100}]
        }
    }"#;

    #[test]
    fn reads_fields() {
        let m = Manifest::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(m.name().unwrap(), "Thing #0");
        assert_eq!(m.symbol(), "THG");
        assert_eq!(m.seller_fee_basis_points().unwrap(), 500);
        assert_eq!(
            m.creators().unwrap(),
            vec![ManifestCreator { address: "Creator1111".into(), share: 100 }]
        );
    }

    #[test]
    fn rewrite_keeps_unknown_fields() {
        let m = Manifest::parse(SAMPLE.as_bytes()).unwrap().with_image("https://x/img");
        let v = m.as_value();
        assert_eq!(v["image"], "https://x/img");
        assert_eq!(v["properties"]["files"][0]["uri"], "https://x/img");
        assert_eq!(v["properties"]["files"][0]["type"], "image/png");
        assert_eq!(v["attributes"][0]["value"], "red");
        let reparsed = Manifest::parse(&m.to_bytes()).unwrap();
        assert_eq!(reparsed, m);
    }

    #[test]
    fn missing_optional_fields_default() {
        let m = Manifest::parse(br#"{"name": "n"}"#).unwrap();
        assert_eq!(m.symbol(), "");
        assert_eq!(m.seller_fee_basis_points().unwrap(), 0);
        assert!(m.creators().unwrap().is_empty());
        let m = m.with_image("u");
        assert_eq!(m.as_value()["image"], "u");
    }

    #[test]
    fn rejects_bad_metadata() {
        assert!(Manifest::parse(b"[1,2]").is_err());
        assert!(Manifest::parse(b"nope").is_err());
        let m = Manifest::parse(br#"{"seller_fee_basis_points": 20000}"#).unwrap();
        assert!(m.name().is_err());
        assert!(m.seller_fee_basis_points().is_err());
    }
}
