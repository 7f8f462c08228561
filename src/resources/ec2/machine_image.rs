//! Machine image selection.

use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::construct::{Construct, Stack};
use crate::error::{Error, Result};
use crate::template::intrinsics::{find_in_map, pseudo, Pseudo};

/// An AMI chosen per region from a fixed map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericLinuxImage {
    ami_map: IndexMap<String, String>,
}

impl GenericLinuxImage {
    pub fn new<I, K, V>(ami_map: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            ami_map: ami_map
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn ami_map(&self) -> &IndexMap<String, String> {
        &self.ami_map
    }

    /// Resolve the image id for a stack.
    ///
    /// A stack with a concrete region gets the AMI inlined. A region-agnostic stack
    /// gets an `AmiMap` mapping under `scope` and a `Fn::FindInMap` on `AWS::Region`.
    pub fn image_id(&self, stack: &mut Stack, scope: impl Construct) -> Result<Value> {
        if let Some(region) = stack.region() {
            return self
                .ami_map
                .get(region)
                .map(|ami| json!(ami))
                .ok_or_else(|| {
                    Error::MachineImage(format!(
                        "no AMI for region '{region}' (known: {})",
                        self.ami_map.keys().cloned().collect::<Vec<_>>().join(", ")
                    ))
                });
        }

        if self.ami_map.is_empty() {
            return Err(Error::MachineImage("empty AMI map".to_string()));
        }
        let mapping: serde_json::Map<String, Value> = self
            .ami_map
            .iter()
            .map(|(region, ami)| (region.clone(), json!({ "ami": ami })))
            .collect();
        let map_id = stack.add_mapping(scope, "AmiMap", Value::Object(mapping))?;
        Ok(find_in_map(&map_id, pseudo(Pseudo::Region), "ami"))
    }
}
