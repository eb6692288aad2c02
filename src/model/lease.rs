use super::dsl;
use super::{normalize_prefix, ParameterError, ParameterName};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseKind {
    Index,
}

impl FromStr for LeaseKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INDEX" => Ok(Self::Index),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LeaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("INDEX")
    }
}

/// `lease.<domain>/<name>` annotation: a claim on one slot of an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseParameter {
    name: ParameterName,
    kind: LeaseKind,
    storage_key_prefix: Option<String>,
    range_start: u32,
    range_end: u32,
}

impl LeaseParameter {
    pub(crate) fn parse(name: ParameterName, value: &str) -> Result<Self, ParameterError> {
        let pairs = dsl::parse(name.annotation(), value)?;
        let kind: LeaseKind = pairs.parse_required("kind")?;
        let range_start: u32 = pairs.parse_required("rangeStart")?;
        let range_end: u32 = pairs.parse_required("rangeEnd")?;
        if range_end < range_start {
            return Err(pairs.invalid("rangeEnd", &range_end.to_string()));
        }
        Ok(Self {
            kind,
            storage_key_prefix: pairs.get_owned("storageKeyPrefix"),
            range_start,
            range_end,
            name,
        })
    }

    #[must_use]
    pub fn name(&self) -> &ParameterName {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> LeaseKind {
        self.kind
    }

    #[must_use]
    pub fn storage_key_prefix(&self) -> Option<&str> {
        self.storage_key_prefix.as_deref()
    }

    #[must_use]
    pub fn range(&self) -> RangeInclusive<u32> {
        self.range_start..=self.range_end
    }

    #[must_use]
    pub fn storage_suffix(&self) -> String {
        let key = self
            .storage_key_prefix
            .as_deref()
            .unwrap_or_else(|| self.name.bare());
        format!("leases/{key}")
    }

    #[must_use]
    pub fn storage_full_path(&self, prefix: &str) -> String {
        format!("{}/{}", normalize_prefix(prefix), self.storage_suffix())
    }

    /// Bind this lease to a concrete slot.
    #[must_use]
    pub fn resolve(&self, value: impl Into<String>) -> ResolvedLeaseParameter {
        ResolvedLeaseParameter {
            lease: self.clone(),
            value: value.into(),
        }
    }

    /// Slot value encoded in a full lease key, if the key belongs to this lease.
    #[must_use]
    pub fn slot_from_key<'k>(&self, prefix: &str, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(&self.storage_full_path(prefix))?
            .strip_prefix('.')
    }

    #[must_use]
    pub fn with_field(&self, field: &str) -> Self {
        Self {
            name: self.name.sibling(field),
            ..self.clone()
        }
    }
}

/// A lease bound to the slot `value`; stored at `.../leases/<prefix>.<value>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLeaseParameter {
    lease: LeaseParameter,
    value: String,
}

impl ResolvedLeaseParameter {
    #[must_use]
    pub fn lease(&self) -> &LeaseParameter {
        &self.lease
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn storage_suffix(&self) -> String {
        format!("{}.{}", self.lease.storage_suffix(), self.value)
    }

    #[must_use]
    pub fn with_field(&self, field: &str) -> Self {
        Self {
            lease: self.lease.with_field(field),
            value: self.value.clone(),
        }
    }
}
