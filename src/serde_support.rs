//! Serialization of spaces, domains and fields.
//!
//! Deserialized values go through the ordinary constructors, so the
//! structural invariants (positive distances, unique keys, value count)
//! are checked again and domains are re-interned.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::{Domain, Space, SpaceKind};
use crate::field::Field;
use crate::float::Float;

impl Serialize for Space {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Space", 3)?;
        s.serialize_field("kind", &self.kind())?;
        s.serialize_field("shape", self.shape())?;
        s.serialize_field("distances", &self.distances())?;
        s.end()
    }
}

impl<'de> Deserialize<'de> for Space {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct SpaceData {
            kind: SpaceKind,
            shape: Vec<usize>,
            #[serde(default)]
            distances: Vec<f64>,
        }

        let data = SpaceData::deserialize(deserializer)?;
        match data.kind {
            SpaceKind::Unstructured => Ok(Space::unstructured(data.shape)),
            SpaceKind::Regular => {
                Space::regular(data.shape, &data.distances).map_err(serde::de::Error::custom)
            }
            SpaceKind::Harmonic => {
                Space::harmonic(data.shape, &data.distances).map_err(serde::de::Error::custom)
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
enum DomainData {
    Tuple(Vec<Space>),
    Multi(Vec<(String, Domain)>),
}

impl Serialize for Domain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let data = if self.is_multi() {
            DomainData::Multi(self.components().to_vec())
        } else {
            DomainData::Tuple(self.spaces().to_vec())
        };
        data.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Domain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match DomainData::deserialize(deserializer)? {
            DomainData::Tuple(spaces) => Ok(Domain::new(spaces)),
            DomainData::Multi(components) => {
                Domain::multi(components).map_err(serde::de::Error::custom)
            }
        }
    }
}

impl<F: Float + Serialize> Serialize for Field<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Field", 2)?;
        s.serialize_field("domain", self.domain())?;
        s.serialize_field("values", self.values())?;
        s.end()
    }
}

impl<'de, F: Float + Deserialize<'de>> Deserialize<'de> for Field<F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct FieldData<F> {
            domain: Domain,
            values: Vec<F>,
        }

        let data = FieldData::<F>::deserialize(deserializer)?;
        Field::new(data.domain, data.values).map_err(serde::de::Error::custom)
    }
}
