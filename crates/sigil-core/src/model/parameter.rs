//! Command parameters.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::{Arc, Weak};

use super::command::Command;
use super::precondition::ParameterPrecondition;
use crate::foundation::value::AnyValue;

/// One declared parameter of a [`Command`].
///
/// For variadic parameters the declared type is the element type; the parsed
/// value is a `Vec` of it.
pub struct Parameter {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    position: usize,
    optional: bool,
    default: Option<AnyValue>,
    variadic: bool,
    preconditions: Vec<Arc<dyn ParameterPrecondition>>,
    command: Weak<Command>,
    summary: Option<String>,
}

impl Parameter {
    /// Starts a parameter of declared type `T`.
    pub fn builder<T: Any + Send + Sync>(name: impl Into<String>) -> ParameterBuilder {
        ParameterBuilder {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            vec_type_id: TypeId::of::<Vec<T>>(),
            type_name: type_name::<T>(),
            optional: false,
            default: None,
            variadic: false,
            preconditions: Vec::new(),
            summary: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared type (element type for variadic parameters).
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Zero-based position in the command's parameter list.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns `true` if the parameter may be omitted. Variadic parameters
    /// are always optional.
    pub fn is_optional(&self) -> bool {
        self.optional || self.variadic
    }

    pub fn default_value(&self) -> Option<&AnyValue> {
        self.default.as_ref()
    }

    /// Returns `true` if the parameter collects every remaining token.
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    pub fn preconditions(&self) -> &[Arc<dyn ParameterPrecondition>] {
        &self.preconditions
    }

    /// The owning command.
    pub fn command(&self) -> Option<Arc<Command>> {
        self.command.upgrade()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .field("position", &self.position)
            .field("optional", &self.optional)
            .field("variadic", &self.variadic)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Parameter`].
pub struct ParameterBuilder {
    name: String,
    type_id: TypeId,
    vec_type_id: TypeId,
    type_name: &'static str,
    optional: bool,
    default: Option<AnyValue>,
    variadic: bool,
    preconditions: Vec<Arc<dyn ParameterPrecondition>>,
    summary: Option<String>,
}

impl ParameterBuilder {
    /// Marks the parameter as optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Sets the value used when the parameter is omitted. Implies
    /// [`optional`](Self::optional).
    pub fn default_value<T>(mut self, value: T) -> Self
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        self.optional = true;
        self.default = Some(AnyValue::new(value));
        self
    }

    /// Makes the parameter collect every remaining token into a `Vec`.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Adds a precondition checked against the parsed value.
    pub fn precondition(mut self, precondition: impl ParameterPrecondition + 'static) -> Self {
        self.preconditions.push(Arc::new(precondition));
        self
    }

    /// Sets the help text.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_optional(&self) -> bool {
        self.optional || self.variadic
    }

    pub(crate) fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// Checks the default value against the declared type.
    pub(crate) fn default_matches_type(&self) -> bool {
        match &self.default {
            Some(value) if self.variadic => value.value_type_id() == self.vec_type_id,
            Some(value) => value.value_type_id() == self.type_id,
            None => true,
        }
    }

    pub(crate) fn finish(self, position: usize, command: Weak<Command>) -> Parameter {
        Parameter {
            name: self.name,
            type_id: self.type_id,
            type_name: self.type_name,
            position,
            optional: self.optional,
            default: self.default,
            variadic: self.variadic,
            preconditions: self.preconditions,
            command,
            summary: self.summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let param = Parameter::builder::<i64>("count").finish(0, Weak::new());
        assert_eq!(param.name(), "count");
        assert_eq!(param.type_id(), TypeId::of::<i64>());
        assert!(!param.is_optional());
        assert!(!param.is_variadic());
        assert!(param.command().is_none());
    }

    #[test]
    fn test_default_implies_optional() {
        let builder = Parameter::builder::<i64>("count").default_value(3_i64);
        assert!(builder.is_optional());
        assert!(builder.default_matches_type());

        let param = builder.finish(1, Weak::new());
        assert_eq!(
            param.default_value().unwrap().downcast_ref::<i64>(),
            Some(&3)
        );
        assert_eq!(param.position(), 1);
    }

    #[test]
    fn test_default_type_mismatch_detected() {
        let builder = Parameter::builder::<i64>("count").default_value("three");
        assert!(!builder.default_matches_type());
    }

    #[test]
    fn test_variadic_default_is_a_vec() {
        let builder = Parameter::builder::<String>("words")
            .variadic()
            .default_value(vec!["hi".to_string()]);
        assert!(builder.default_matches_type());
    }

    #[test]
    fn test_variadic_is_optional() {
        let builder = Parameter::builder::<String>("words").variadic();
        assert!(builder.is_optional());
        assert!(builder.finish(0, Weak::new()).is_variadic());
    }
}
