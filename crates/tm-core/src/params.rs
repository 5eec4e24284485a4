use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TmError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

/// Parameters a test method declares, and the values the test program
/// actually passed to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    #[serde(default)]
    pub declared: Vec<ParameterDef>,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl ParameterSet {
    pub fn declare(&mut self, name: &str, required: bool) -> &mut Self {
        self.declared.push(ParameterDef {
            name: name.to_string(),
            required,
        });
        self
    }

    pub fn supply(&mut self, name: &str, value: &str) -> &mut Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Every required parameter without a value, then every supplied value
    /// that no declared parameter claims.
    pub fn problems(&self) -> Vec<TmError> {
        let missing = self
            .declared
            .iter()
            .filter(|def| def.required && !self.values.contains_key(&def.name))
            .map(|def| TmError::MissingParameter {
                name: def.name.clone(),
            });
        let unknown = self
            .values
            .keys()
            .filter(|name| !self.declared.iter().any(|def| &def.name == *name))
            .map(|name| TmError::UnknownParameter { name: name.clone() });
        missing.chain(unknown).collect()
    }

    /// Fails with the first of [`problems`](Self::problems).
    pub fn check(&self) -> Result<()> {
        match self.problems().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
