//! Attribute schemas for RHSM resource kinds and data sources.
//!
//! There is exactly one schema per kind. Schemas are built by plain functions
//! that receive a [`SchemaOptions`] value; the options control how attribute
//! descriptions are rendered (plain text or markdown, with or without
//! validator hints).

use regex::Regex;
use serde_json::Value;

use crate::rhsm_error::RhsmError;
use crate::rhsm_state::ResourceState;

/// Rendering options for schema descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Append a sentence describing each attribute's validators.
    pub describe_validators: bool,
    /// Render identifiers and allowed values as markdown code spans.
    pub markdown: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            describe_validators: true,
            markdown: true,
        }
    }
}

impl SchemaOptions {
    fn code(self, s: &str) -> String {
        if self.markdown {
            format!("`{s}`")
        } else {
            format!("\"{s}\"")
        }
    }
}

/// Value type of an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    /// UTF-8 string.
    String,
    /// Integer (stored as i64; RHSM quantities fit in i32).
    Int,
    /// Boolean.
    Bool,
    /// Ordered list of strings.
    StringList,
    /// Unordered, de-duplicated set of strings.
    StringSet,
    /// Ordered list of nested objects.
    ObjectList(Vec<Attribute>),
    /// Set of nested objects.
    ObjectSet(Vec<Attribute>),
}

impl AttributeType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::StringList | Self::StringSet => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::ObjectList(_) | Self::ObjectSet(_) => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_object)),
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Int => "an integer",
            Self::Bool => "a boolean",
            Self::StringList | Self::StringSet => "a list of strings",
            Self::ObjectList(_) | Self::ObjectSet(_) => "a list of objects",
        }
    }
}

/// Who supplies an attribute's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Must be set in configuration.
    Required,
    /// May be set in configuration.
    Optional,
    /// Set by the provider only.
    Computed,
    /// May be set; the provider fills it in otherwise.
    OptionalComputed,
}

/// Validation rule applied to a configured value.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    /// Hyphenated UUID.
    IsUuid,
    /// Non-empty string.
    NotEmpty,
    /// String matching a regular expression.
    Matches {
        /// Anchored regular expression.
        pattern: &'static str,
        /// Human readable rule.
        message: &'static str,
    },
    /// One of a fixed set of strings (case sensitive).
    OneOf(&'static [&'static str]),
    /// Integer greater than or equal to the bound.
    IntAtLeast(i64),
}

impl Validator {
    /// Check a configured value.
    ///
    /// # Errors
    ///
    /// Returns [`RhsmError::Validation`] naming the attribute when the value is rejected.
    pub fn check(&self, attribute: &str, value: &Value) -> Result<(), RhsmError> {
        match self {
            Self::IsUuid => {
                let s = value.as_str().unwrap_or_default();
                if !is_uuid(s) {
                    return Err(RhsmError::validation(
                        attribute,
                        format!("expected a UUID, got {s:?}"),
                    ));
                }
            }
            Self::NotEmpty => {
                if value.as_str().is_none_or(str::is_empty) {
                    return Err(RhsmError::validation(attribute, "must not be empty"));
                }
            }
            Self::Matches { pattern, message } => {
                let re = Regex::new(pattern)
                    .map_err(|e| RhsmError::validation(attribute, e.to_string()))?;
                if !value.as_str().is_some_and(|s| re.is_match(s)) {
                    return Err(RhsmError::validation(attribute, *message));
                }
            }
            Self::OneOf(allowed) => {
                let s = value.as_str().unwrap_or_default();
                if !allowed.contains(&s) {
                    return Err(RhsmError::validation(
                        attribute,
                        format!("expected one of {allowed:?}, got {s:?}"),
                    ));
                }
            }
            Self::IntAtLeast(min) => {
                if !value.as_i64().is_some_and(|v| v >= *min) {
                    return Err(RhsmError::validation(
                        attribute,
                        format!("must be at least {min}"),
                    ));
                }
            }
        }
        Ok(())
    }

    fn hint(&self, opts: SchemaOptions) -> String {
        match self {
            Self::IsUuid => "Must be a valid UUID.".to_string(),
            Self::NotEmpty => "Must not be empty.".to_string(),
            Self::Matches { message, .. } => format!("{}.", capitalize(message)),
            Self::OneOf(allowed) => {
                let quoted: Vec<String> = allowed.iter().map(|a| opts.code(a)).collect();
                format!("Must be one of {}.", quoted.join(", "))
            }
            Self::IntAtLeast(min) => format!("Must be at least {min}."),
        }
    }
}

/// Whether `s` is a hyphenated UUID.
#[must_use]
pub fn is_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::try_parse(s).is_ok()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// One attribute of a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Attribute name.
    pub name: &'static str,
    /// Value type.
    pub kind: AttributeType,
    /// Who supplies the value.
    pub presence: Presence,
    /// Changing the value forces replacement of the resource.
    pub force_new: bool,
    /// Value must not be displayed.
    pub sensitive: bool,
    /// Rendered description.
    pub description: String,
    /// Validators applied to configured values.
    pub validators: Vec<Validator>,
}

impl Attribute {
    fn new(name: &'static str, kind: AttributeType, presence: Presence) -> Self {
        Self {
            name,
            kind,
            presence,
            force_new: false,
            sensitive: false,
            description: String::new(),
            validators: Vec::new(),
        }
    }

    /// Attribute that must be configured.
    #[must_use]
    pub fn required(name: &'static str, kind: AttributeType) -> Self {
        Self::new(name, kind, Presence::Required)
    }

    /// Attribute that may be configured.
    #[must_use]
    pub fn optional(name: &'static str, kind: AttributeType) -> Self {
        Self::new(name, kind, Presence::Optional)
    }

    /// Attribute set by the provider.
    #[must_use]
    pub fn computed(name: &'static str, kind: AttributeType) -> Self {
        Self::new(name, kind, Presence::Computed)
    }

    /// Attribute that may be configured and is otherwise computed.
    #[must_use]
    pub fn optional_computed(name: &'static str, kind: AttributeType) -> Self {
        Self::new(name, kind, Presence::OptionalComputed)
    }

    /// Mark as forcing replacement on change.
    #[must_use]
    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Mark as sensitive.
    #[must_use]
    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Set the base description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a validator.
    #[must_use]
    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Whether the value can come from configuration.
    #[must_use]
    pub const fn is_configurable(&self) -> bool {
        !matches!(self.presence, Presence::Computed)
    }

    fn render(&mut self, opts: SchemaOptions) {
        if opts.describe_validators && !self.validators.is_empty() {
            let hints: Vec<String> = self.validators.iter().map(|v| v.hint(opts)).collect();
            let sep = if self.description.is_empty() { "" } else { " " };
            self.description = format!("{}{sep}{}", self.description, hints.join(" "));
        }
        match &mut self.kind {
            AttributeType::ObjectList(nested) | AttributeType::ObjectSet(nested) => {
                for a in nested {
                    a.render(opts);
                }
            }
            _ => {}
        }
    }
}

/// Schema of a resource kind or data source.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Description of the kind.
    pub description: String,
    /// Attributes, in declaration order.
    pub attributes: Vec<Attribute>,
}

impl Schema {
    /// Build a schema, rendering descriptions according to `opts`.
    #[must_use]
    pub fn new(
        opts: &SchemaOptions,
        description: impl Into<String>,
        attributes: Vec<Attribute>,
    ) -> Self {
        let attributes = attributes
            .into_iter()
            .map(|mut a| {
                a.render(*opts);
                a
            })
            .collect();
        Self {
            description: description.into(),
            attributes,
        }
    }

    /// Look up an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Validate configured values before any remote call.
    ///
    /// Checks that required attributes are present, that every set value has
    /// the declared type, that computed-only attributes are not configured and
    /// that validators accept the value.
    ///
    /// # Errors
    ///
    /// Returns the first [`RhsmError::Validation`] found.
    pub fn validate_config(&self, config: &ResourceState) -> Result<(), RhsmError> {
        for (name, value) in config.attributes() {
            let Some(attr) = self.attribute(name) else {
                return Err(RhsmError::validation(name.as_str(), "unknown attribute"));
            };
            if !value.is_null() && !attr.is_configurable() {
                return Err(RhsmError::validation(name.as_str(), "attribute is computed"));
            }
        }

        for attr in &self.attributes {
            let value = config.get(attr.name).filter(|v| !v.is_null());
            match value {
                None if attr.presence == Presence::Required => {
                    return Err(RhsmError::validation(attr.name, "attribute is required"));
                }
                None => {}
                Some(v) => {
                    if !attr.kind.matches(v) {
                        return Err(RhsmError::validation(
                            attr.name,
                            format!("expected {}", attr.kind.label()),
                        ));
                    }
                    for validator in &attr.validators {
                        validator.check(attr.name, v)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Names of force-new attributes whose value differs between two states.
    #[must_use]
    pub fn replacement_triggers(&self, prior: &ResourceState, planned: &ResourceState) -> Vec<&'static str> {
        self.attributes
            .iter()
            .filter(|a| a.force_new && prior.get(a.name) != planned.get(a.name))
            .map(|a| a.name)
            .collect()
    }

    /// Copy of `state` with sensitive values masked, for display.
    #[must_use]
    pub fn redact(&self, state: &ResourceState) -> ResourceState {
        let mut out = state.clone();
        for attr in self.attributes.iter().filter(|a| a.sensitive) {
            if out.get(attr.name).is_some() {
                out.set(attr.name, "(sensitive)");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME_RULE: Validator = Validator::Matches {
        pattern: r"^[a-zA-Z0-9_\-.]{1,100}$",
        message: "name must be at most 100 letters, numbers, underscores, hyphens or periods",
    };

    fn sample(opts: &SchemaOptions) -> Schema {
        Schema::new(
            opts,
            "sample",
            vec![
                Attribute::required("allocation_uuid", AttributeType::String)
                    .force_new()
                    .describe("Allocation to use.")
                    .validate(Validator::IsUuid),
                Attribute::required("quantity", AttributeType::Int)
                    .validate(Validator::IntAtLeast(1)),
                Attribute::optional("name", AttributeType::String).validate(NAME_RULE),
                Attribute::optional("provider_short_name", AttributeType::String)
                    .validate(Validator::OneOf(&["AWS", "GCE", "MSAZ"])),
                Attribute::computed("sku", AttributeType::String),
            ],
        )
    }

    fn config(pairs: &[(&str, Value)]) -> ResourceState {
        let mut s = ResourceState::new();
        for (k, v) in pairs {
            s.set(k, v.clone());
        }
        s
    }

    #[test]
    fn descriptions_follow_options() {
        let md = sample(&SchemaOptions::default());
        let attr = md.attribute("allocation_uuid").unwrap();
        assert_eq!(attr.description, "Allocation to use. Must be a valid UUID.");
        let short = md.attribute("provider_short_name").unwrap();
        assert_eq!(short.description, "Must be one of `AWS`, `GCE`, `MSAZ`.");

        let plain = sample(&SchemaOptions {
            describe_validators: false,
            markdown: false,
        });
        assert_eq!(
            plain.attribute("allocation_uuid").unwrap().description,
            "Allocation to use."
        );
    }

    #[test]
    fn accepts_valid_config() {
        let schema = sample(&SchemaOptions::default());
        let cfg = config(&[
            ("allocation_uuid", Value::from("11111111-1111-1111-1111-111111111111")),
            ("quantity", Value::from(5)),
            ("name", Value::from("my-sat_1.0")),
            ("provider_short_name", Value::from("AWS")),
        ]);
        schema.validate_config(&cfg).unwrap();
    }

    #[test]
    fn rejects_bad_values() {
        let schema = sample(&SchemaOptions::default());
        let uuid = Value::from("11111111-1111-1111-1111-111111111111");

        let missing = config(&[("quantity", Value::from(1))]);
        assert!(matches!(
            schema.validate_config(&missing),
            Err(RhsmError::Validation { attribute, .. }) if attribute == "allocation_uuid"
        ));

        let not_uuid = config(&[("allocation_uuid", Value::from("abc")), ("quantity", Value::from(1))]);
        assert!(schema.validate_config(&not_uuid).is_err());

        let zero = config(&[("allocation_uuid", uuid.clone()), ("quantity", Value::from(0))]);
        assert!(schema.validate_config(&zero).is_err());

        let bad_name = config(&[
            ("allocation_uuid", uuid.clone()),
            ("quantity", Value::from(1)),
            ("name", Value::from("has space")),
        ]);
        assert!(schema.validate_config(&bad_name).is_err());

        let lower = config(&[
            ("allocation_uuid", uuid.clone()),
            ("quantity", Value::from(1)),
            ("provider_short_name", Value::from("aws")),
        ]);
        assert!(schema.validate_config(&lower).is_err());

        let computed = config(&[
            ("allocation_uuid", uuid),
            ("quantity", Value::from(1)),
            ("sku", Value::from("RH1")),
        ]);
        assert!(schema.validate_config(&computed).is_err());
    }

    #[test]
    fn force_new_changes_are_reported() {
        let schema = sample(&SchemaOptions::default());
        let prior = config(&[
            ("allocation_uuid", Value::from("a")),
            ("quantity", Value::from(1)),
        ]);
        let planned = config(&[
            ("allocation_uuid", Value::from("b")),
            ("quantity", Value::from(2)),
        ]);
        assert_eq!(schema.replacement_triggers(&prior, &planned), vec!["allocation_uuid"]);
    }

    #[test]
    fn uuid_must_be_hyphenated() {
        assert!(is_uuid("11111111-1111-1111-1111-111111111111"));
        assert!(!is_uuid("11111111111111111111111111111111"));
        assert!(!is_uuid("pool-A"));
    }
}
