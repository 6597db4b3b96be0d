// JValue: Rc-wrapped document model for O(1) cloning
// Sequences, callables and compiled regexes live beside the JSON types

use std::fmt;
use std::io;
use std::ops::BitOr;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter};

use crate::ast::{LambdaDef, TransformDef};
use crate::environment::FrameId;
use crate::functions::BuiltinFn;
use crate::utils::format_number;

/// Free stack below which recursion continues on a freshly allocated segment.
pub(crate) const STACK_RED_ZONE: usize = 256 * 1024;

/// Size of each stack segment allocated when the red zone is reached.
pub(crate) const STACK_SEGMENT: usize = 4 * 1024 * 1024;

/// Tag word carried by every array value.
///
/// A plain JSON array has no flags set. Path navigation produces
/// *sequences*, which flatten into their parent and collapse to a single
/// value (or Undefined) once evaluation of a node finishes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ArrayFlags(u8);

impl ArrayFlags {
    pub const NONE: ArrayFlags = ArrayFlags(0);
    /// Implicit result of path navigation.
    pub const SEQUENCE: ArrayFlags = ArrayFlags(1);
    /// Set by the `[]` suffix: a singleton sequence stays an array.
    pub const KEEP_SINGLETON: ArrayFlags = ArrayFlags(1 << 1);
    /// Array constructor at the head or tail of a path; never flattened by a step.
    pub const CONS: ArrayFlags = ArrayFlags(1 << 2);
    /// Wraps a top-level array input so `$` still sees the whole array.
    pub const OUTER_WRAPPER: ArrayFlags = ArrayFlags(1 << 3);

    #[inline]
    pub const fn contains(self, other: ArrayFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: ArrayFlags) -> ArrayFlags {
        ArrayFlags(self.0 | other.0)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ArrayFlags {
    type Output = ArrayFlags;

    fn bitor(self, rhs: ArrayFlags) -> ArrayFlags {
        self.union(rhs)
    }
}

/// A function value created while evaluating an expression.
///
/// Frame ids refer to the environment arena of the evaluation that created
/// the closure; they are meaningless outside it.
#[derive(Debug)]
pub enum Closure {
    /// `function($x, $y) { ... }` with its defining frame and context.
    Lambda {
        def: Arc<LambdaDef>,
        frame: FrameId,
        input: JValue,
    },
    /// `$f(?, 2)`: bound arguments, `None` where a placeholder stands.
    Partial {
        target: JValue,
        args: Vec<Option<JValue>>,
    },
    /// `| pattern | update, delete |`, applied to one document argument.
    Transform {
        def: Arc<TransformDef>,
        frame: FrameId,
    },
    /// `$f ~> $g`: applies `first` then feeds its result to `then`.
    Chain { first: JValue, then: JValue },
}

/// A JSON-like value with O(1) clone semantics via Rc-wrapping.
///
/// Standard JSON types (Array, Object, String) are wrapped in Rc for cheap cloning.
/// Internal types (Undefined, Lambda, Builtin, Regex) are first-class variants.
#[derive(Clone, Debug)]
pub enum JValue {
    // Standard JSON types
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<JValue>>, ArrayFlags),
    Object(Rc<IndexMap<String, JValue>>),

    // Evaluation-only types
    Undefined,
    Lambda(Rc<Closure>),
    Builtin(BuiltinFn),
    Regex(Rc<regex::Regex>),
}

// ── Type checks ──────────────────────────────────────────────────────────────

impl JValue {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, JValue::Null)
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, JValue::Undefined)
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, JValue::Bool(_))
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, JValue::Number(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, JValue::String(_))
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, JValue::Array(..))
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, JValue::Object(_))
    }

    /// Lambdas, built-ins and regexes are all invocable.
    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(
            self,
            JValue::Lambda(_) | JValue::Builtin(_) | JValue::Regex(_)
        )
    }

    #[inline]
    pub fn is_sequence(&self) -> bool {
        self.has_flag(ArrayFlags::SEQUENCE)
    }

    #[inline]
    pub fn has_flag(&self, flag: ArrayFlags) -> bool {
        match self {
            JValue::Array(_, flags) => flags.contains(flag),
            _ => false,
        }
    }

    pub fn is_array_of_strings(&self) -> bool {
        match self {
            JValue::Array(items, _) => items.iter().all(JValue::is_string),
            _ => false,
        }
    }

    pub fn is_array_of_numbers(&self) -> bool {
        match self {
            JValue::Array(items, _) => items.iter().all(JValue::is_number),
            _ => false,
        }
    }

    /// True when any function value is reachable from this value.
    pub fn contains_function(&self) -> bool {
        match self {
            JValue::Lambda(_) | JValue::Builtin(_) | JValue::Regex(_) => true,
            JValue::Array(items, _) => items.iter().any(JValue::contains_function),
            JValue::Object(map) => map.values().any(JValue::contains_function),
            _ => false,
        }
    }

    /// Name reported by `$type()`; Undefined has none.
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            JValue::Undefined => None,
            JValue::Null => Some("null"),
            JValue::Bool(_) => Some("boolean"),
            JValue::Number(_) => Some("number"),
            JValue::String(_) => Some("string"),
            JValue::Array(..) => Some("array"),
            JValue::Object(_) => Some("object"),
            JValue::Lambda(_) | JValue::Builtin(_) | JValue::Regex(_) => Some("function"),
        }
    }

    /// JSONata truthiness.
    ///
    /// Arrays are true when any member is; empty strings, zero, null, empty
    /// objects and functions are false.
    pub fn to_boolean(&self) -> bool {
        match self {
            JValue::Undefined | JValue::Null => false,
            JValue::Bool(b) => *b,
            JValue::Number(n) => *n != 0.0,
            JValue::String(s) => !s.is_empty(),
            JValue::Array(items, _) => match items.len() {
                0 => false,
                1 => items[0].to_boolean(),
                _ => items.iter().any(JValue::to_boolean),
            },
            JValue::Object(map) => !map.is_empty(),
            JValue::Lambda(_) | JValue::Builtin(_) | JValue::Regex(_) => false,
        }
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

impl JValue {
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integral numbers only.
    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            JValue::Number(n) => {
                let f = *n;
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Some(f as i64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            JValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_array(&self) -> Option<&[JValue]> {
        match self {
            JValue::Array(items, _) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<&IndexMap<String, JValue>> {
        match self {
            JValue::Object(map) => Some(map),
            _ => None,
        }
    }

    #[inline]
    pub fn flags(&self) -> ArrayFlags {
        match self {
            JValue::Array(_, flags) => *flags,
            _ => ArrayFlags::NONE,
        }
    }

    /// Members of an array, or the value itself as a one-element list.
    /// Undefined yields nothing.
    pub fn to_members(&self) -> Vec<JValue> {
        match self {
            JValue::Undefined => Vec::new(),
            JValue::Array(items, _) => items.as_ref().clone(),
            other => vec![other.clone()],
        }
    }
}

// ── Constructors ─────────────────────────────────────────────────────────────

impl JValue {
    #[inline]
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        JValue::String(s.into())
    }

    #[inline]
    pub fn array(v: Vec<JValue>) -> Self {
        JValue::Array(Rc::new(v), ArrayFlags::NONE)
    }

    #[inline]
    pub fn sequence(v: Vec<JValue>) -> Self {
        JValue::Array(Rc::new(v), ArrayFlags::SEQUENCE)
    }

    #[inline]
    pub fn object(m: IndexMap<String, JValue>) -> Self {
        JValue::Object(Rc::new(m))
    }

    #[inline]
    pub fn closure(c: Closure) -> Self {
        JValue::Lambda(Rc::new(c))
    }

    /// Same members, different tag word.
    pub fn with_flags(self, flags: ArrayFlags) -> Self {
        match self {
            JValue::Array(items, _) => JValue::Array(items, flags),
            other => other,
        }
    }

    /// Adds `flag` to an array value; other values pass through.
    pub fn flagged(self, flag: ArrayFlags) -> Self {
        match self {
            JValue::Array(items, flags) => JValue::Array(items, flags | flag),
            other => other,
        }
    }

    /// Collapses a finished sequence: empty becomes Undefined, a singleton
    /// becomes its member unless the keep-singleton flag is set.
    pub fn collapse(self) -> Self {
        match self {
            JValue::Array(items, flags) if flags.contains(ArrayFlags::SEQUENCE) => {
                match items.len() {
                    0 => JValue::Undefined,
                    1 if !flags.contains(ArrayFlags::KEEP_SINGLETON) => items[0].clone(),
                    _ => JValue::Array(items, flags),
                }
            }
            other => other,
        }
    }
}

// ── From impls ───────────────────────────────────────────────────────────────

impl From<bool> for JValue {
    #[inline]
    fn from(b: bool) -> Self {
        JValue::Bool(b)
    }
}

impl From<i64> for JValue {
    #[inline]
    fn from(n: i64) -> Self {
        JValue::Number(n as f64)
    }
}

impl From<i32> for JValue {
    #[inline]
    fn from(n: i32) -> Self {
        JValue::Number(n as f64)
    }
}

impl From<usize> for JValue {
    #[inline]
    fn from(n: usize) -> Self {
        JValue::Number(n as f64)
    }
}

impl From<f64> for JValue {
    #[inline]
    fn from(n: f64) -> Self {
        JValue::Number(n)
    }
}

impl From<&str> for JValue {
    #[inline]
    fn from(s: &str) -> Self {
        JValue::String(Rc::from(s))
    }
}

impl From<String> for JValue {
    #[inline]
    fn from(s: String) -> Self {
        JValue::String(Rc::from(s))
    }
}

impl From<Vec<JValue>> for JValue {
    #[inline]
    fn from(v: Vec<JValue>) -> Self {
        JValue::array(v)
    }
}

impl From<IndexMap<String, JValue>> for JValue {
    #[inline]
    fn from(m: IndexMap<String, JValue>) -> Self {
        JValue::object(m)
    }
}

// ── PartialEq ────────────────────────────────────────────────────────────────

/// Deep equality as used by `=`, `in` and `$distinct`: array tags are
/// ignored, object key order is ignored, functions compare by identity.
impl PartialEq for JValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JValue::Null, JValue::Null) => true,
            (JValue::Undefined, JValue::Undefined) => true,
            (JValue::Bool(a), JValue::Bool(b)) => a == b,
            (JValue::Number(a), JValue::Number(b)) => a == b,
            (JValue::String(a), JValue::String(b)) => a == b,
            (JValue::Array(a, _), JValue::Array(b, _)) => Rc::ptr_eq(a, b) || a == b,
            (JValue::Object(a), JValue::Object(b)) => Rc::ptr_eq(a, b) || a == b,
            (JValue::Lambda(a), JValue::Lambda(b)) => Rc::ptr_eq(a, b),
            (JValue::Builtin(a), JValue::Builtin(b)) => a == b,
            (JValue::Regex(a), JValue::Regex(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ── JSON text output ─────────────────────────────────────────────────────────

/// Output style for [`JValue::to_json`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JsonFormat {
    /// Spaces per nesting level; `None` writes compact JSON.
    pub indent: Option<usize>,
    /// `$string()` flavour: numbers rounded to 15 significant digits and
    /// functions written as empty strings.
    pub stringify: bool,
}

impl JsonFormat {
    pub const COMPACT: JsonFormat = JsonFormat {
        indent: None,
        stringify: false,
    };

    pub const PRETTY: JsonFormat = JsonFormat {
        indent: Some(2),
        stringify: false,
    };
}

impl JValue {
    /// Serialize the way `JSON.stringify` does.
    ///
    /// Returns `None` for values JSON cannot represent at the top level
    /// (Undefined, and functions outside `$string()` mode). Undefined members
    /// are elided; functions inside arrays become `null` and are dropped from
    /// objects.
    pub fn to_json(&self, format: JsonFormat) -> Option<String> {
        if self.is_undefined() || (self.is_function() && !format.stringify) {
            return None;
        }
        let view = JsonView {
            value: self,
            stringify: format.stringify,
        };
        let mut out = Vec::with_capacity(128);
        let written = match format.indent {
            Some(width) => {
                let indent = vec![b' '; width];
                let formatter = NumberFormatter(PrettyFormatter::with_indent(&indent));
                view.serialize(&mut serde_json::Serializer::with_formatter(&mut out, formatter))
            }
            None => {
                let formatter = NumberFormatter(CompactFormatter);
                view.serialize(&mut serde_json::Serializer::with_formatter(&mut out, formatter))
            }
        };
        // Writes into a Vec cannot fail and serde_json only emits UTF-8
        written.ok()?;
        String::from_utf8(out).ok()
    }

    /// Compact JSON, or `"undefined"` when there is nothing to write.
    pub fn to_json_string(&self) -> String {
        self.to_json(JsonFormat::COMPACT)
            .unwrap_or_else(|| crate::UNDEFINED.to_string())
    }
}

impl Serialize for JValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        JsonView {
            value: self,
            stringify: false,
        }
        .serialize(serializer)
    }
}

/// A value as `JSON.stringify` sees it, in plain or `$string()` mode.
struct JsonView<'a> {
    value: &'a JValue,
    stringify: bool,
}

impl JsonView<'_> {
    fn child<'b>(&self, value: &'b JValue) -> JsonView<'b> {
        JsonView {
            value,
            stringify: self.stringify,
        }
    }

    /// Object members that are written at all.
    fn keeps_member(&self, value: &JValue) -> bool {
        !value.is_undefined() && (self.stringify || !value.is_function())
    }

    fn write<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            JValue::Null | JValue::Undefined => serializer.serialize_unit(),
            JValue::Bool(b) => serializer.serialize_bool(*b),
            JValue::Number(n) if !n.is_finite() => serializer.serialize_unit(),
            JValue::Number(n) if self.stringify => {
                serializer.serialize_f64(crate::utils::to_precision_15(*n))
            }
            JValue::Number(n) => serializer.serialize_f64(*n),
            JValue::String(s) => serializer.serialize_str(s),
            JValue::Lambda(_) | JValue::Builtin(_) | JValue::Regex(_) => {
                if self.stringify {
                    serializer.serialize_str("")
                } else {
                    serializer.serialize_unit()
                }
            }
            JValue::Array(items, _) => {
                let len = items.iter().filter(|v| !v.is_undefined()).count();
                let mut seq = serializer.serialize_seq(Some(len))?;
                for item in items.iter().filter(|v| !v.is_undefined()) {
                    seq.serialize_element(&self.child(item))?;
                }
                seq.end()
            }
            JValue::Object(map) => {
                let len = map.values().filter(|v| self.keeps_member(v)).count();
                let mut out = serializer.serialize_map(Some(len))?;
                for (key, value) in map.iter().filter(|(_, v)| self.keeps_member(v)) {
                    out.serialize_entry(key, &self.child(value))?;
                }
                out.end()
            }
        }
    }
}

impl Serialize for JsonView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.write(serializer))
    }
}

/// Layout from the wrapped formatter; numbers in JavaScript's shortest form.
struct NumberFormatter<F>(F);

impl<F: Formatter> Formatter for NumberFormatter<F> {
    fn write_f64<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        writer.write_all(format_number(value).as_bytes())
    }

    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_object_key(writer, first)
    }

    fn end_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_key(writer)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_value(writer)
    }
}

impl fmt::Display for JValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_string())
    }
}

// ── Deserialization (single-pass JSON→JValue) ────────────────────────────────

impl<'de> serde::Deserialize<'de> for JValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(JValueVisitor)
    }
}

struct JValueVisitor;

impl<'de> Visitor<'de> for JValueVisitor {
    type Value = JValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "any valid JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<JValue, E> {
        Ok(JValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<JValue, E> {
        Ok(JValue::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<JValue, E> {
        Ok(JValue::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<JValue, E> {
        Ok(JValue::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<JValue, E> {
        Ok(JValue::string(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<JValue, E> {
        Ok(JValue::String(v.into()))
    }

    fn visit_none<E: de::Error>(self) -> Result<JValue, E> {
        Ok(JValue::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<JValue, E> {
        Ok(JValue::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<JValue, A::Error> {
        let mut vec = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(elem) = seq.next_element()? {
            vec.push(elem);
        }
        Ok(JValue::array(vec))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<JValue, A::Error> {
        let mut m = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((k, v)) = map.next_entry()? {
            m.insert(k, v);
        }
        Ok(JValue::object(m))
    }
}

impl JValue {
    /// Parse JSON text, keeping object keys in document order.
    ///
    /// Nesting depth is unbounded; the stack grows on demand instead.
    pub fn from_json_str(s: &str) -> Result<JValue, serde_json::Error> {
        let mut deserializer = serde_json::Deserializer::from_str(s);
        deserializer.disable_recursion_limit();
        let value = JValue::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
        deserializer.end()?;
        Ok(value)
    }
}

// ── Conversion from serde_json::Value ────────────────────────────────────────

impl From<serde_json::Value> for JValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => JValue::Null,
            serde_json::Value::Bool(b) => JValue::Bool(b),
            serde_json::Value::Number(n) => JValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => JValue::String(s.into()),
            serde_json::Value::Array(arr) => {
                JValue::array(arr.into_iter().map(JValue::from).collect())
            }
            serde_json::Value::Object(map) => {
                JValue::object(map.into_iter().map(|(k, v)| (k, JValue::from(v))).collect())
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clone_is_cheap() {
        let arr = JValue::array(vec![JValue::from(1i64), JValue::from(2i64)]);
        let cloned = arr.clone();
        match (&arr, &cloned) {
            (JValue::Array(a, _), JValue::Array(b, _)) => assert!(Rc::ptr_eq(a, b)),
            _ => panic!("expected arrays"),
        }
    }

    #[test]
    fn test_from_json_str_preserves_key_order() {
        let v = JValue::from_json_str(r#"{"z":1,"a":2,"m":{"y":true,"b":null}}"#).unwrap();
        assert_eq!(
            v.to_json_string(),
            r#"{"z":1,"a":2,"m":{"y":true,"b":null}}"#
        );
    }

    #[test]
    fn test_equality_ignores_tags_and_key_order() {
        let plain = JValue::array(vec![JValue::from(1i64)]);
        let seq = JValue::sequence(vec![JValue::from(1i64)]);
        assert_eq!(plain, seq);

        let a: JValue = json!({"x": 1, "y": 2}).into();
        let b: JValue = json!({"y": 2, "x": 1}).into();
        assert_eq!(a, b);
        assert_ne!(JValue::Null, JValue::Undefined);
    }

    #[test]
    fn test_collapse() {
        assert!(JValue::sequence(vec![]).collapse().is_undefined());
        assert_eq!(
            JValue::sequence(vec![JValue::from("a")]).collapse(),
            JValue::from("a")
        );
        let kept = JValue::Array(
            Rc::new(vec![JValue::from("a")]),
            ArrayFlags::SEQUENCE | ArrayFlags::KEEP_SINGLETON,
        )
        .collapse();
        assert!(kept.is_array());
        // Plain arrays are never collapsed
        assert!(JValue::array(vec![JValue::from(1i64)]).collapse().is_array());
    }

    #[test]
    fn test_undefined_members_are_elided() {
        let mut m = IndexMap::new();
        m.insert("a".to_string(), JValue::Undefined);
        m.insert("b".to_string(), JValue::from(1i64));
        let obj = JValue::object(m);
        assert_eq!(obj.to_json_string(), r#"{"b":1}"#);

        let arr = JValue::array(vec![JValue::Undefined, JValue::Null]);
        assert_eq!(arr.to_json_string(), "[null]");
        assert_eq!(JValue::Undefined.to_json_string(), "undefined");
    }

    #[test]
    fn test_pretty_output_matches_stringify_layout() {
        let v: JValue = json!({"a": [1, 2], "b": {}, "c": []}).into();
        let text = v.to_json(JsonFormat::PRETTY).unwrap();
        assert_eq!(
            text,
            "{\n  \"a\": [\n    1,\n    2\n  ],\n  \"b\": {},\n  \"c\": []\n}"
        );
    }

    #[test]
    fn test_string_escapes() {
        let v = JValue::from("q\"\\\u{1}\n\u{8}");
        assert_eq!(v.to_json_string(), r#""q\"\\\u0001\n\b""#);
    }

    #[test]
    fn test_serialize_through_serde_json() {
        let v = JValue::array(vec![
            JValue::from(1e21),
            JValue::from(0.1 + 0.2),
            JValue::from(-0.0),
            JValue::from(f64::NAN),
            JValue::Builtin(BuiltinFn::Sum),
        ]);
        assert_eq!(v.to_json_string(), "[1e+21,0.30000000000000004,0,null,null]");

        // The plain serde impl elides the same members; layout and number
        // text are left to the caller's formatter
        let plain = JValue::array(vec![
            JValue::from(1.5),
            JValue::from("a"),
            JValue::Undefined,
            JValue::Builtin(BuiltinFn::Sum),
        ]);
        assert_eq!(serde_json::to_string(&plain).unwrap(), r#"[1.5,"a",null]"#);

        let stringified = v
            .to_json(JsonFormat {
                indent: None,
                stringify: true,
            })
            .unwrap();
        assert_eq!(stringified, r#"[1e+21,0.3,0,null,""]"#);
    }

    #[test]
    fn test_functions_dropped_from_objects() {
        let mut m = IndexMap::new();
        m.insert("f".to_string(), JValue::Builtin(BuiltinFn::Sum));
        m.insert("n".to_string(), JValue::from(2i64));
        let obj = JValue::object(m);
        assert_eq!(obj.to_json_string(), r#"{"n":2}"#);
        let stringified = obj.to_json(JsonFormat {
            indent: None,
            stringify: true,
        });
        assert_eq!(stringified.as_deref(), Some(r#"{"f":"","n":2}"#));
    }

    #[test]
    fn test_deeply_nested_json_round_trips() {
        for depth in [200, 1000] {
            let text = format!("{}{}", "[".repeat(depth), "]".repeat(depth));
            let v = JValue::from_json_str(&text).unwrap();
            assert_eq!(v.to_json_string(), text);
        }
        assert!(JValue::from_json_str("[1] x").is_err());
    }

    #[test]
    fn test_truthiness() {
        let cases: Vec<(JValue, bool)> = vec![
            (JValue::Undefined, false),
            (JValue::from(""), false),
            (JValue::from("0"), true),
            (JValue::from(0i64), false),
            (json!([0, 0]).into(), false),
            (json!([0, 1]).into(), true),
            (json!([[]]).into(), false),
            (json!({}).into(), false),
            (json!({"a": 0}).into(), true),
            (JValue::Builtin(BuiltinFn::Sum), false),
        ];
        for (value, expected) in cases {
            assert_eq!(value.to_boolean(), expected, "{:?}", value);
        }
    }
}
