use super::dsl;
use super::{ParameterError, ParameterName};

/// `custom.<domain>/<name>` annotation carrying a static value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomParameter {
    name: ParameterName,
    storage_key: Option<String>,
    fixed_value: Option<String>,
}

impl CustomParameter {
    pub(crate) fn parse(name: ParameterName, value: &str) -> Result<Self, ParameterError> {
        let pairs = dsl::parse(name.annotation(), value)?;
        Ok(Self {
            storage_key: pairs.get_owned("storageKey"),
            fixed_value: pairs.get_owned("fixedValue"),
            name,
        })
    }

    #[must_use]
    pub fn name(&self) -> &ParameterName {
        &self.name
    }

    #[must_use]
    pub fn fixed_value(&self) -> Option<&str> {
        self.fixed_value.as_deref()
    }

    #[must_use]
    pub fn storage_suffix(&self) -> String {
        self.storage_key
            .clone()
            .unwrap_or_else(|| self.name.bare().to_string())
    }

    #[must_use]
    pub fn with_field(&self, field: &str) -> Self {
        Self {
            name: self.name.sibling(field),
            ..self.clone()
        }
    }
}
