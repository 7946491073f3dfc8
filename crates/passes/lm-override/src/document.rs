//! Override metadata documents
//!
//! A document maps namespace → class → member to renames, code templates
//! and flags for members of libraries that are not compiled from source.
//! Documents are written in TOML (or the equivalent JSON):
//!
//! ```toml
//! [[assembly.namespace]]
//! name = "System"
//!
//! [[assembly.namespace.class]]
//! name = "Math"
//!
//! [[assembly.namespace.class.method]]
//! name = "Max"
//! arg-count = 2
//! template = "math.max({0}, {1})"
//!
//! [export]
//! attributes = ["Game.SerializableAttribute"]
//! ```

use serde::{Deserialize, Serialize};

/// Root of one metadata document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaDocument {
    /// Namespaces and their classes
    #[serde(default)]
    pub assembly: AssemblyMeta,

    /// Attributes whose uses are exported into the output
    #[serde(default)]
    pub export: ExportMeta,
}

/// Collection of namespaces
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssemblyMeta {
    /// Namespaces
    #[serde(default, rename = "namespace")]
    pub namespaces: Vec<NamespaceMeta>,
}

/// Exported attribute list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportMeta {
    /// Fully qualified attribute type names
    #[serde(default)]
    pub attributes: Vec<String>,
}

/// Rules for one namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct NamespaceMeta {
    /// Source namespace name
    #[serde(default)]
    pub name: String,

    /// Output namespace name
    #[serde(default)]
    pub rename: Option<String>,

    /// Classes
    #[serde(default, rename = "class")]
    pub classes: Vec<ClassMeta>,
}

/// Rules for one class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ClassMeta {
    /// Source class name; generic classes carry `^N`
    #[serde(default)]
    pub name: String,

    /// Output class name
    #[serde(default)]
    pub rename: Option<String>,

    /// Field rules
    #[serde(default, rename = "field")]
    pub fields: Vec<FieldMeta>,

    /// Property rules
    #[serde(default, rename = "property")]
    pub properties: Vec<PropertyMeta>,

    /// Method rules
    #[serde(default, rename = "method")]
    pub methods: Vec<MethodMeta>,
}

/// Rule for a field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FieldMeta {
    /// Field name
    #[serde(default)]
    pub name: String,

    /// Replacement code
    #[serde(default)]
    pub template: Option<String>,
}

/// Accessor template holder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessorMeta {
    /// Replacement code
    pub template: String,
}

/// Rule for a property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PropertyMeta {
    /// Property name
    #[serde(default)]
    pub name: String,

    /// Output name
    #[serde(default)]
    pub rename: Option<String>,

    /// Getter replacement
    #[serde(default)]
    pub get: Option<AccessorMeta>,

    /// Setter replacement
    #[serde(default)]
    pub set: Option<AccessorMeta>,

    /// Force field (`true`) or accessor (`false`) lowering
    #[serde(default)]
    pub is_field: Option<bool>,
}

/// Rule for a method, optionally discriminated by signature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MethodMeta {
    /// Method name
    #[serde(default)]
    pub name: String,

    /// Output name
    #[serde(default)]
    pub rename: Option<String>,

    /// Replacement code
    #[serde(default)]
    pub template: Option<String>,

    /// Required parameter count
    #[serde(default)]
    pub arg_count: Option<usize>,

    /// Required parameter types, `ns.Name` or `ns.Name^N`
    #[serde(default)]
    pub args: Option<Vec<String>>,

    /// Required return type
    #[serde(default)]
    pub ret_type: Option<String>,

    /// Required generic parameter count
    #[serde(default)]
    pub generic_arg_count: Option<usize>,

    /// Drop trailing generic arguments at call sites
    #[serde(default)]
    pub ignore_generic: bool,
}

impl MethodMeta {
    /// Whether the rule has no signature discriminator
    pub fn is_unconditional(&self) -> bool {
        self.arg_count.is_none() && self.args.is_none() && self.ret_type.is_none() && self.generic_arg_count.is_none()
    }

    /// The discriminating part of the rule, for duplicate detection
    pub fn discriminators(&self) -> (Option<usize>, Option<&[String]>, Option<&str>, Option<usize>) {
        (
            self.arg_count,
            self.args.as_deref(),
            self.ret_type.as_deref(),
            self.generic_arg_count,
        )
    }
}
