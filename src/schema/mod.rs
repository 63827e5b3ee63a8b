//! Vault schema: declared object types, their fields, and trait definitions.
//!
//! The schema lives in `schema.yaml` at the vault root:
//!
//! ```yaml
//! types:
//!   person:
//!     default_path: people/
//!     fields:
//!       name: { type: string, required: true }
//!       team: { type: ref, target: team }
//!     traits: [due]
//! traits:
//!   due: { type: date }
//!   priority: { type: enum, values: [low, medium, high], default: medium }
//!   todo: {}
//! ```
//!
//! The built-in types `page`, `section` and `date` always exist.

mod validate;
mod value;

pub use validate::{
    normalize_date_fields, validate_fields, validate_trait_value, FieldError, FieldErrorKind,
    RefTypes, ValidateOptions,
};
pub use value::FieldValue;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::SchemaError;

pub const SCHEMA_FILE: &str = "schema.yaml";

/// Field names with a fixed meaning on every object.
pub const RESERVED_FIELDS: &[&str] = &["id", "type", "tags", "alias"];

pub const STARTER_SCHEMA: &str = r#"types:
  person:
    default_path: people/
    name_field: name
    fields:
      name: { type: string, required: true }
      email: { type: string }
  project:
    default_path: projects/
    fields:
      status: { type: enum, values: [active, paused, done], default: active }
      owner: { type: ref, target: person }
traits:
  due: { type: date }
  priority: { type: enum, values: [low, medium, high], default: medium }
  todo: {}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "string[]")]
    StringArray,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "number[]")]
    NumberArray,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "date[]")]
    DateArray,
    #[serde(rename = "datetime")]
    Datetime,
    #[serde(rename = "enum")]
    Enum,
    #[serde(rename = "bool", alias = "boolean")]
    Bool,
    #[serde(rename = "ref")]
    Ref,
    #[serde(rename = "ref[]")]
    RefArray,
}

impl FieldType {
    pub fn is_ref(self) -> bool {
        matches!(self, FieldType::Ref | FieldType::RefArray)
    }

    pub fn is_date(self) -> bool {
        matches!(self, FieldType::Date | FieldType::DateArray)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl FieldDefinition {
    fn of(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
            values: Vec::new(),
            target: None,
            min: None,
            max: None,
        }
    }

    pub fn default_value(&self) -> Option<FieldValue> {
        self.default.as_ref().map(FieldValue::from_yaml)
    }
}

/// Per-type trait settings; accepts either `[a, b]` or `{a: {required: true}}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawTypeTraits")]
pub struct TypeTraits {
    pub configs: BTreeMap<String, TypeTraitConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypeTraitConfig {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTypeTraits {
    List(Vec<String>),
    Map(BTreeMap<String, Option<TypeTraitConfig>>),
}

impl From<RawTypeTraits> for TypeTraits {
    fn from(raw: RawTypeTraits) -> Self {
        let configs = match raw {
            RawTypeTraits::List(names) => names
                .into_iter()
                .map(|name| (name, TypeTraitConfig::default()))
                .collect(),
            RawTypeTraits::Map(map) => map
                .into_iter()
                .map(|(name, cfg)| (name, cfg.unwrap_or_default()))
                .collect(),
        };
        Self { configs }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypeDefinition {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDefinition>,
    #[serde(default)]
    pub default_path: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub traits: TypeTraits,
    /// String field whose value also names the object in references.
    #[serde(default)]
    pub name_field: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraitDefinition {
    #[serde(rename = "type", default)]
    pub value_type: Option<FieldType>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
}

impl TraitDefinition {
    /// Traits without a declared type are markers like `@todo`.
    pub fn is_boolean(&self) -> bool {
        matches!(self.value_type, None | Some(FieldType::Bool))
    }

    /// Value stored for an occurrence: the written value, else the declared
    /// default, else `"true"` for boolean traits.
    pub fn effective_value(&self, written: Option<&str>) -> Option<String> {
        if let Some(v) = written.map(str::trim).filter(|v| !v.is_empty()) {
            return Some(v.to_string());
        }
        if let Some(default) = self.default.as_ref().map(FieldValue::from_yaml) {
            if !default.is_null() {
                return Some(default.to_string());
            }
        }
        self.is_boolean().then(|| "true".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RawSchema {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    types: BTreeMap<String, Option<TypeDefinition>>,
    #[serde(default)]
    traits: BTreeMap<String, Option<TraitDefinition>>,
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub version: Option<u32>,
    pub types: BTreeMap<String, TypeDefinition>,
    pub traits: BTreeMap<String, TraitDefinition>,
}

impl Default for Schema {
    fn default() -> Self {
        let mut section = TypeDefinition::default();
        section
            .fields
            .insert("title".to_string(), FieldDefinition::of(FieldType::String));
        let mut level = FieldDefinition::of(FieldType::Number);
        level.min = Some(1.0);
        level.max = Some(6.0);
        section.fields.insert("level".to_string(), level);

        let mut types = BTreeMap::new();
        types.insert("page".to_string(), TypeDefinition::default());
        types.insert("section".to_string(), section);
        types.insert("date".to_string(), TypeDefinition::default());

        Self {
            version: None,
            types,
            traits: BTreeMap::new(),
        }
    }
}

impl Schema {
    /// Loads `<vault>/schema.yaml`.
    pub fn load(vault_root: &Path) -> Result<Schema, SchemaError> {
        let path = vault_root.join(SCHEMA_FILE);
        if !path.exists() {
            return Err(SchemaError::NotFound { path });
        }
        let content = std::fs::read_to_string(&path).map_err(|source| SchemaError::Read {
            path: path.clone(),
            source,
        })?;
        Schema::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Schema, SchemaError> {
        let raw: RawSchema = if content.trim().is_empty() {
            RawSchema {
                version: None,
                types: BTreeMap::new(),
                traits: BTreeMap::new(),
            }
        } else {
            serde_yaml::from_str(content).map_err(|e| SchemaError::Invalid(e.to_string()))?
        };

        let mut schema = Schema::default();
        schema.version = raw.version;
        for (name, def) in raw.types {
            schema.types.insert(name, def.unwrap_or_default());
        }
        for (name, def) in raw.traits {
            schema.traits.insert(name, def.unwrap_or_default());
        }
        schema.check()?;
        Ok(schema)
    }

    fn check(&self) -> Result<(), SchemaError> {
        for (type_name, def) in &self.types {
            if type_name.trim().is_empty() || type_name.contains('/') {
                return Err(SchemaError::Invalid(format!(
                    "type name '{type_name}' must be non-empty and contain no '/'"
                )));
            }
            for (field_name, field) in &def.fields {
                let at = format!("{type_name}.{field_name}");
                if field.field_type == FieldType::Enum && field.values.is_empty() {
                    return Err(SchemaError::Invalid(format!("{at}: enum field has no values")));
                }
                if let Some(target) = &field.target {
                    if !field.field_type.is_ref() {
                        return Err(SchemaError::Invalid(format!(
                            "{at}: 'target' is only valid on ref fields"
                        )));
                    }
                    if !self.types.contains_key(target) {
                        return Err(SchemaError::Invalid(format!(
                            "{at}: target type '{target}' is not defined"
                        )));
                    }
                }
                if let (Some(min), Some(max)) = (field.min, field.max) {
                    if min > max {
                        return Err(SchemaError::Invalid(format!("{at}: min {min} > max {max}")));
                    }
                }
            }
            if let Some(name_field) = &def.name_field {
                let at = format!("{type_name}.name_field");
                match def.fields.get(name_field) {
                    Some(field) if field.field_type == FieldType::String => {}
                    Some(_) => {
                        return Err(SchemaError::Invalid(format!(
                            "{at}: '{name_field}' is not a string field"
                        )));
                    }
                    None => {
                        return Err(SchemaError::Invalid(format!(
                            "{at}: '{name_field}' is not a field of the type"
                        )));
                    }
                }
            }
            for trait_name in def.traits.configs.keys() {
                if !self.traits.contains_key(trait_name) {
                    return Err(SchemaError::Invalid(format!(
                        "type '{type_name}' lists undefined trait '{trait_name}'"
                    )));
                }
            }
        }
        for (name, def) in &self.traits {
            if def.value_type == Some(FieldType::Enum) && def.values.is_empty() {
                return Err(SchemaError::Invalid(format!(
                    "trait '{name}': enum trait has no values"
                )));
            }
        }
        Ok(())
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    pub fn trait_def(&self, name: &str) -> Option<&TraitDefinition> {
        self.traits.get(name)
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Names of ref-typed fields for a type.
    pub fn ref_fields(&self, type_name: &str) -> Vec<&str> {
        self.type_def(type_name)
            .map(|def| {
                def.fields
                    .iter()
                    .filter(|(_, f)| f.field_type.is_ref())
                    .map(|(name, _)| name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Type → `name_field` for every type that declares one.
    pub fn name_fields(&self) -> BTreeMap<&str, &str> {
        self.types
            .iter()
            .filter_map(|(t, def)| Some((t.as_str(), def.name_field.as_deref()?)))
            .collect()
    }

    /// Rejects removing a required field that `live_count` objects still carry.
    pub fn check_field_removal(
        &self,
        type_name: &str,
        field: &str,
        live_count: i64,
    ) -> Result<(), SchemaError> {
        let def = self
            .type_def(type_name)
            .ok_or_else(|| SchemaError::UnknownType(type_name.to_string()))?;
        let field_def = def
            .fields
            .get(field)
            .ok_or_else(|| SchemaError::UnknownField {
                type_name: type_name.to_string(),
                field: field.to_string(),
            })?;
        if field_def.required && live_count > 0 {
            return Err(SchemaError::DataIntegrityBlock {
                type_name: type_name.to_string(),
                field: field.to_string(),
                count: live_count,
            });
        }
        Ok(())
    }

    /// Removes a field definition after [`Schema::check_field_removal`] passes.
    pub fn remove_field(
        &mut self,
        type_name: &str,
        field: &str,
        live_count: i64,
    ) -> Result<FieldDefinition, SchemaError> {
        self.check_field_removal(type_name, field, live_count)?;
        self.types
            .get_mut(type_name)
            .and_then(|def| {
                if def.name_field.as_deref() == Some(field) {
                    def.name_field = None;
                }
                def.fields.remove(field)
            })
            .ok_or_else(|| SchemaError::UnknownField {
                type_name: type_name.to_string(),
                field: field.to_string(),
            })
    }
}
