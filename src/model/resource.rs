use super::dsl;
use super::{ParameterError, ParameterName};

/// `resource.<domain>/<name>` annotation. Looked up, never generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceParameter {
    name: ParameterName,
    storage_key: Option<String>,
    local_value: Option<String>,
}

impl ResourceParameter {
    pub(crate) fn parse(name: ParameterName, value: &str) -> Result<Self, ParameterError> {
        let pairs = dsl::parse(name.annotation(), value)?;
        Ok(Self {
            storage_key: pairs.get_owned("storageKey"),
            local_value: pairs.get_owned("localModeValue"),
            name,
        })
    }

    #[must_use]
    pub fn name(&self) -> &ParameterName {
        &self.name
    }

    #[must_use]
    pub fn storage_key(&self) -> Option<&str> {
        self.storage_key.as_deref()
    }

    #[must_use]
    pub fn local_value(&self) -> Option<&str> {
        self.local_value.as_deref()
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
