// Built-in function implementations
// A closed registry: every built-in is a BuiltinFn variant with a signature
// parsed once and checked before the function body runs

pub mod array;
pub mod higher_order;
pub mod numeric;
pub mod object;
pub mod string;

use std::sync::OnceLock;

use crate::datetime;
use crate::environment::FrameId;
use crate::evaluator::{Evaluator, EvaluatorError};
use crate::signature::Signature;
use crate::value::JValue;

macro_rules! builtins {
    ($($variant:ident => $name:literal, $signature:literal;)*) => {
        /// A built-in function, resolved by name when no variable shadows it.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum BuiltinFn {
            $($variant,)*
        }

        impl BuiltinFn {
            /// Every built-in, in registry order.
            pub const ALL: &'static [BuiltinFn] = &[$(BuiltinFn::$variant,)*];

            /// Name without the leading `$`.
            pub fn name(self) -> &'static str {
                match self {
                    $(BuiltinFn::$variant => $name,)*
                }
            }

            fn signature_source(self) -> &'static str {
                match self {
                    $(BuiltinFn::$variant => $signature,)*
                }
            }
        }
    };
}

builtins! {
    // Aggregation
    Sum => "sum", "<a<n>:n>";
    Count => "count", "<a:n>";
    Max => "max", "<a<n>:n>";
    Min => "min", "<a<n>:n>";
    Average => "average", "<a<n>:n>";

    // String
    String => "string", "<x-b?:s>";
    Substring => "substring", "<s-nn?:s>";
    SubstringBefore => "substringBefore", "<s-s:s>";
    SubstringAfter => "substringAfter", "<s-s:s>";
    Lowercase => "lowercase", "<s-:s>";
    Uppercase => "uppercase", "<s-:s>";
    Length => "length", "<s-:n>";
    Trim => "trim", "<s-:s>";
    Pad => "pad", "<s-ns?:s>";
    Match => "match", "<s-f<s:o>n?:a<o>>";
    Contains => "contains", "<s-(sf):b>";
    Replace => "replace", "<s-(sf)(sf)n?:s>";
    Split => "split", "<s-(sf)n?:a<s>>";
    Join => "join", "<a<s>s?:s>";
    Base64Encode => "base64encode", "<s-:s>";
    Base64Decode => "base64decode", "<s-:s>";
    EncodeUrlComponent => "encodeUrlComponent", "<s-:s>";
    EncodeUrl => "encodeUrl", "<s-:s>";
    DecodeUrlComponent => "decodeUrlComponent", "<s-:s>";
    DecodeUrl => "decodeUrl", "<s-:s>";

    // Numeric
    Number => "number", "<(nsb)-:n>";
    Abs => "abs", "<n-:n>";
    Floor => "floor", "<n-:n>";
    Ceil => "ceil", "<n-:n>";
    Round => "round", "<n-n?:n>";
    Power => "power", "<n-n:n>";
    Sqrt => "sqrt", "<n-:n>";
    Random => "random", "<:n>";
    FormatBase => "formatBase", "<n-n?:s>";

    // Boolean and type
    Boolean => "boolean", "<x-:b>";
    Not => "not", "<x-:b>";
    Exists => "exists", "<x:b>";
    Type => "type", "<x:s>";

    // Array
    Append => "append", "<xx:a>";
    Reverse => "reverse", "<a:a>";
    Shuffle => "shuffle", "<a:a>";
    Distinct => "distinct", "<x:x>";
    Sort => "sort", "<af?:a>";
    Zip => "zip", "<a+>";

    // Object
    Keys => "keys", "<x-:a<s>>";
    Lookup => "lookup", "<x-s:x>";
    Spread => "spread", "<x-:a<o>>";
    Merge => "merge", "<a<o>:o>";
    Each => "each", "<o-f:a>";
    Sift => "sift", "<o-f?:o>";
    Error => "error", "<s?:x>";
    Assert => "assert", "<bs?:x>";
    Clone => "clone", "<(oa)-:o>";

    // Higher order
    Map => "map", "<af>";
    Filter => "filter", "<af>";
    Single => "single", "<af?>";
    Reduce => "reduce", "<afj?:j>";
    Eval => "eval", "<sx?:x>";

    // Date and time
    Now => "now", "<:s>";
    Millis => "millis", "<:n>";
    FromMillis => "fromMillis", "<n-:s>";
    ToMillis => "toMillis", "<s-:n>";
}

impl BuiltinFn {
    /// Look up a built-in by its name without the `$`.
    pub fn from_name(name: &str) -> Option<BuiltinFn> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// The parsed signature, shared by all evaluations.
    pub fn signature(self) -> Option<&'static Signature> {
        static SIGNATURES: OnceLock<Vec<Option<Signature>>> = OnceLock::new();
        SIGNATURES
            .get_or_init(|| {
                Self::ALL
                    .iter()
                    .map(|f| Signature::parse(f.signature_source()).ok())
                    .collect()
            })
            .get(self as usize)
            .and_then(Option::as_ref)
    }

    /// Run the function on already-validated arguments.
    pub fn invoke(
        self,
        ev: &mut Evaluator,
        mut args: Vec<JValue>,
        context: &JValue,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        // Optional arguments read as Undefined
        let supplied = args.len();
        if args.len() < 4 {
            args.resize(4, JValue::Undefined);
        }
        let a = &args;

        match self {
            BuiltinFn::Sum => numeric::sum(&a[0]),
            BuiltinFn::Count => Ok(array::count(&a[0])),
            BuiltinFn::Max => numeric::max(&a[0]),
            BuiltinFn::Min => numeric::min(&a[0]),
            BuiltinFn::Average => numeric::average(&a[0]),

            BuiltinFn::String => string::string(&a[0], &a[1]),
            BuiltinFn::Substring => Ok(string::substring(&a[0], &a[1], &a[2])),
            BuiltinFn::SubstringBefore => Ok(string::substring_before(&a[0], &a[1])),
            BuiltinFn::SubstringAfter => Ok(string::substring_after(&a[0], &a[1])),
            BuiltinFn::Lowercase => Ok(string::map_str(&a[0], |s| s.to_lowercase())),
            BuiltinFn::Uppercase => Ok(string::map_str(&a[0], |s| s.to_uppercase())),
            BuiltinFn::Length => Ok(string::length(&a[0])),
            BuiltinFn::Trim => Ok(string::map_str(&a[0], string::trim)),
            BuiltinFn::Pad => Ok(string::pad(&a[0], &a[1], &a[2])),
            BuiltinFn::Match => string::match_regex(&a[0], &a[1], &a[2]),
            BuiltinFn::Contains => Ok(string::contains(&a[0], &a[1])),
            BuiltinFn::Replace => string::replace(ev, &a[0], &a[1], &a[2], &a[3], context, frame),
            BuiltinFn::Split => string::split(&a[0], &a[1], &a[2]),
            BuiltinFn::Join => Ok(string::join(&a[0], &a[1])),
            BuiltinFn::Base64Encode => Ok(string::base64_encode(&a[0])),
            BuiltinFn::Base64Decode => string::base64_decode(&a[0]),
            BuiltinFn::EncodeUrlComponent => Ok(string::encode_url(&a[0], false)),
            BuiltinFn::EncodeUrl => Ok(string::encode_url(&a[0], true)),
            BuiltinFn::DecodeUrlComponent => string::decode_url(&a[0], false),
            BuiltinFn::DecodeUrl => string::decode_url(&a[0], true),

            BuiltinFn::Number => numeric::number(&a[0]),
            BuiltinFn::Abs => Ok(numeric::map_number(&a[0], f64::abs)),
            BuiltinFn::Floor => Ok(numeric::map_number(&a[0], f64::floor)),
            BuiltinFn::Ceil => Ok(numeric::map_number(&a[0], f64::ceil)),
            BuiltinFn::Round => Ok(numeric::round(&a[0], &a[1])),
            BuiltinFn::Power => numeric::power(&a[0], &a[1]),
            BuiltinFn::Sqrt => numeric::sqrt(&a[0]),
            BuiltinFn::Random => Ok(JValue::Number(rand::random::<f64>())),
            BuiltinFn::FormatBase => numeric::format_base(&a[0], &a[1]),

            BuiltinFn::Boolean => Ok(object::boolean(&a[0])),
            BuiltinFn::Not => Ok(match object::boolean(&a[0]) {
                JValue::Bool(b) => JValue::Bool(!b),
                other => other,
            }),
            BuiltinFn::Exists => Ok(JValue::Bool(!a[0].is_undefined())),
            BuiltinFn::Type => Ok(a[0]
                .type_name()
                .map(JValue::from)
                .unwrap_or(JValue::Undefined)),

            BuiltinFn::Append => Ok(array::append(a[0].clone(), a[1].clone())),
            BuiltinFn::Reverse => Ok(array::reverse(&a[0])),
            BuiltinFn::Shuffle => Ok(array::shuffle(&a[0])),
            BuiltinFn::Distinct => Ok(array::distinct(&a[0])),
            BuiltinFn::Sort => array::sort(ev, &a[0], &a[1], context, frame),
            BuiltinFn::Zip => Ok(array::zip(&a[..supplied])),

            BuiltinFn::Keys => Ok(object::keys(&a[0])),
            BuiltinFn::Lookup => Ok(object::lookup(&a[0], &a[1])),
            BuiltinFn::Spread => Ok(object::spread(&a[0])),
            BuiltinFn::Merge => Ok(object::merge(&a[0])),
            BuiltinFn::Each => higher_order::each(ev, &a[0], &a[1], context, frame),
            BuiltinFn::Sift => higher_order::sift(ev, &a[0], &a[1], context, frame),
            BuiltinFn::Error => Err(object::error(&a[0])),
            BuiltinFn::Assert => object::assert(&a[0], &a[1]),
            BuiltinFn::Clone => Ok(object::deep_clone(&a[0])),

            BuiltinFn::Map => higher_order::map(ev, &a[0], &a[1], context, frame),
            BuiltinFn::Filter => higher_order::filter(ev, &a[0], &a[1], context, frame),
            BuiltinFn::Single => higher_order::single(ev, &a[0], &a[1], context, frame),
            BuiltinFn::Reduce => higher_order::reduce(ev, &a[0], &a[1], &a[2], context, frame),
            BuiltinFn::Eval => higher_order::eval(ev, &a[0], &a[1], context, frame),

            BuiltinFn::Now => Ok(JValue::from(datetime::format_iso8601(&ev.timestamp()))),
            BuiltinFn::Millis => Ok(JValue::from(ev.timestamp().timestamp_millis())),
            BuiltinFn::FromMillis => datetime::from_millis(&a[0]),
            BuiltinFn::ToMillis => datetime::to_millis(&a[0]),
        }
    }
}
