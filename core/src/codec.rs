//! Serde adapters for values that must cross bincode boundaries as JSON
//!
//! Condition values are untagged JSON shapes, which bincode cannot decode
//! directly. They are carried as their canonical JSON string instead.

/// Optional [`ConditionSet`](cbd_conditions::ConditionSet) as its JSON string
pub(crate) mod conditions_json {
    use cbd_conditions::ConditionSet;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        conditions: &Option<ConditionSet>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let json = conditions
            .as_ref()
            .map(ConditionSet::to_json)
            .transpose()
            .map_err(serde::ser::Error::custom)?;
        json.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<ConditionSet>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|json| ConditionSet::from_json(&json))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

/// Any optional JSON value as a string
pub(crate) mod json_option {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: Serialize, S: Serializer>(
        value: &Option<T>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let json = value
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(serde::ser::Error::custom)?;
        json.serialize(serializer)
    }

    pub fn deserialize<'de, T: DeserializeOwned, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<T>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

/// Hex-wrapped bincode, as carried in Porter JSON bodies
pub(crate) fn to_hex<T: serde::Serialize>(value: &T) -> Result<String, bincode::Error> {
    Ok(hex::encode(bincode::serialize(value)?))
}

pub(crate) fn from_hex<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, String> {
    let bytes = hex::decode(s).map_err(|e| e.to_string())?;
    bincode::deserialize(&bytes).map_err(|e| e.to_string())
}
