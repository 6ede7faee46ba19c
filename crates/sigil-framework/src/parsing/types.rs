//! Per-type token converters.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use sigil_core::AnyValue;

use crate::error::{ParseError, ParseResult};

/// Converts string tokens into values of one type.
pub trait TypeParser: Send + Sync {
    /// Name of the produced type, used in error messages.
    fn type_name(&self) -> &'static str;

    /// Converts one token into a `T`.
    fn parse(&self, token: &str) -> ParseResult<AnyValue>;

    /// Converts every token into a `Vec<T>`.
    fn parse_many(&self, tokens: &[String]) -> ParseResult<AnyValue>;
}

/// [`TypeParser`] backed by [`FromStr`].
pub struct FromStrParser<T>(PhantomData<fn() -> T>);

impl<T> Default for FromStrParser<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> TypeParser for FromStrParser<T>
where
    T: FromStr + Any + Send + Sync + fmt::Debug,
    T::Err: fmt::Display,
{
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn parse(&self, token: &str) -> ParseResult<AnyValue> {
        parse_from_str::<T>(token).map(AnyValue::new)
    }

    fn parse_many(&self, tokens: &[String]) -> ParseResult<AnyValue> {
        tokens
            .iter()
            .map(|t| parse_from_str::<T>(t))
            .collect::<ParseResult<Vec<T>>>()
            .map(AnyValue::new)
    }
}

fn parse_from_str<T>(token: &str) -> ParseResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    token.parse::<T>().map_err(|e| ParseError::Invalid {
        token: token.to_string(),
        expected: type_name::<T>(),
        message: e.to_string(),
    })
}

/// [`TypeParser`] backed by a closure.
pub struct FnParser<T, F> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> TypeParser for FnParser<T, F>
where
    T: Any + Send + Sync + fmt::Debug,
    F: Fn(&str) -> Result<T, String> + Send + Sync,
{
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn parse(&self, token: &str) -> ParseResult<AnyValue> {
        self.convert(token).map(AnyValue::new)
    }

    fn parse_many(&self, tokens: &[String]) -> ParseResult<AnyValue> {
        tokens
            .iter()
            .map(|t| self.convert(t))
            .collect::<ParseResult<Vec<T>>>()
            .map(AnyValue::new)
    }
}

impl<T, F> FnParser<T, F>
where
    F: Fn(&str) -> Result<T, String>,
{
    fn convert(&self, token: &str) -> ParseResult<T> {
        (self.f)(token).map_err(|message| ParseError::Invalid {
            token: token.to_string(),
            expected: type_name::<T>(),
            message,
        })
    }
}

fn parse_bool(token: &str) -> Result<bool, String> {
    match token.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "no" | "n" | "off" | "0" => Ok(false),
        _ => Err("expected true/false, yes/no, on/off or 1/0".to_string()),
    }
}

/// Registry of [`TypeParser`]s keyed by the produced type.
///
/// # Example
///
/// ```rust,ignore
/// let parsers = TypeParserRegistry::default()
///     .with_from_str::<Uuid>()
///     .with_fn::<Color>(|s| Color::from_name(s).ok_or_else(|| "unknown color".into()));
/// ```
#[derive(Clone)]
pub struct TypeParserRegistry {
    parsers: HashMap<TypeId, Arc<dyn TypeParser>>,
}

impl TypeParserRegistry {
    /// Creates a registry without any parsers.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Creates a registry with parsers for integers, floats, `bool`, `char`
    /// and `String`.
    pub fn with_defaults() -> Self {
        Self::empty()
            .with_from_str::<i8>()
            .with_from_str::<i16>()
            .with_from_str::<i32>()
            .with_from_str::<i64>()
            .with_from_str::<i128>()
            .with_from_str::<isize>()
            .with_from_str::<u8>()
            .with_from_str::<u16>()
            .with_from_str::<u32>()
            .with_from_str::<u64>()
            .with_from_str::<u128>()
            .with_from_str::<usize>()
            .with_from_str::<f32>()
            .with_from_str::<f64>()
            .with_from_str::<char>()
            .with_from_str::<String>()
            .with_fn::<bool, _>(parse_bool)
    }

    /// Registers a [`FromStr`]-based parser for `T`.
    pub fn with_from_str<T>(mut self) -> Self
    where
        T: FromStr + Any + Send + Sync + fmt::Debug,
        T::Err: fmt::Display,
    {
        self.insert::<T>(Arc::new(FromStrParser::<T>::default()));
        self
    }

    /// Registers a closure-based parser for `T`.
    pub fn with_fn<T, F>(mut self, f: F) -> Self
    where
        T: Any + Send + Sync + fmt::Debug,
        F: Fn(&str) -> Result<T, String> + Send + Sync + 'static,
    {
        self.insert::<T>(Arc::new(FnParser {
            f,
            _marker: PhantomData,
        }));
        self
    }

    /// Registers `parser` as the converter for `T`, replacing any previous
    /// one.
    pub fn insert<T: Any>(&mut self, parser: Arc<dyn TypeParser>) {
        self.parsers.insert(TypeId::of::<T>(), parser);
    }

    /// The parser for `type_id`.
    pub fn get(&self, type_id: TypeId) -> Option<&Arc<dyn TypeParser>> {
        self.parsers.get(&type_id)
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.parsers.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl Default for TypeParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for TypeParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.parsers.values().map(|p| p.type_name()).collect();
        names.sort_unstable();
        f.debug_struct("TypeParserRegistry")
            .field("types", &names)
            .finish()
    }
}
