use std::fmt::Formatter;

use ::serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
    de::{
        Error,
        Visitor,
    },
};

use crate::{
    Channel,
    Sample,
    Source,
};

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(KeyVisitor {
            expecting: "a channel key",
            from_key: Channel::from_key,
        })
    }
}

impl Serialize for Source {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(KeyVisitor {
            expecting: "a source key",
            from_key: Source::from_key,
        })
    }
}

struct KeyVisitor<T> {
    expecting: &'static str,
    from_key: fn(&str) -> Option<T>,
}

impl<'de, T> Visitor<'de> for KeyVisitor<T> {
    type Value = T;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str(self.expecting)
    }

    fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
        (self.from_key)(v).ok_or_else(|| E::custom(format!("unknown key: {v}")))
    }
}

/// Samples are stored as `[time_ms, value]` pairs.
///
/// JSON has no representation for non-finite numbers, so those are written as
/// the strings `"NaN"`, `"Infinity"` and `"-Infinity"`.
impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.time_ms, SampleValue(self.value)).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Sample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (time_ms, SampleValue(value)) = <(u64, SampleValue)>::deserialize(deserializer)?;
        Ok(Self { time_ms, value })
    }
}

const NAN: &str = "NaN";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

struct SampleValue(f64);

impl Serialize for SampleValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.0;
        if value.is_nan() {
            serializer.serialize_str(NAN)
        }
        else if value == f64::INFINITY {
            serializer.serialize_str(INFINITY)
        }
        else if value == f64::NEG_INFINITY {
            serializer.serialize_str(NEG_INFINITY)
        }
        else {
            serializer.serialize_f64(value)
        }
    }
}

impl<'de> Deserialize<'de> for SampleValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SampleValueVisitor).map(SampleValue)
    }
}

struct SampleValueVisitor;

impl<'de> Visitor<'de> for SampleValueVisitor {
    type Value = f64;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a number, \"NaN\", \"Infinity\" or \"-Infinity\"")
    }

    fn visit_f64<E: Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(v as f64)
    }

    fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(v as f64)
    }

    fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
        match v {
            NAN => Ok(f64::NAN),
            INFINITY => Ok(f64::INFINITY),
            NEG_INFINITY => Ok(f64::NEG_INFINITY),
            _ => Err(E::custom(format!("invalid sample value: {v}"))),
        }
    }
}
