//! Templates for `format`. `{}` takes the next argument and `{2}` a given
//! one. Text after a `:` is a spec:
//!
//! ```text
//! [[fill]align][sign][#][0][width][.precision][type]
//! ```
//!
//! `align` is `<`, `>` or `^`. `sign` is `+`, `-` or a space. `type` is one of
//! `? s d b o x X c e E f F g`.

use crate::{
    diagnostics::{Diagnostic, ErrorKind},
    value::Value,
};

use super::Eval;

/// Widest padding a spec may ask for.
const MAX_WIDTH: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    Negative,
    Always,
    Space,
}

#[derive(Debug, Clone, PartialEq)]
struct FormatSpec {
    fill: char,
    align: Option<Align>,
    sign: Sign,
    alternate: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    kind: Option<char>,
}

fn malformed(spec: &str, reason: &str) -> Diagnostic {
    Diagnostic::value_error(format!("malformed format spec `{spec}`: {reason}"))
}

fn align_of(ch: char) -> Option<Align> {
    match ch {
        '<' => Some(Align::Left),
        '>' => Some(Align::Right),
        '^' => Some(Align::Center),
        _ => None,
    }
}

impl FormatSpec {
    fn parse(spec: &str) -> Eval<Self> {
        let chars: Vec<char> = spec.chars().collect();
        let mut parsed = FormatSpec {
            fill: ' ',
            align: None,
            sign: Sign::Negative,
            alternate: false,
            zero: false,
            width: 0,
            precision: None,
            kind: None,
        };
        let mut pos = 0;
        if let Some(align) = chars.get(1).copied().and_then(align_of) {
            parsed.fill = chars[0];
            parsed.align = Some(align);
            pos = 2;
        } else if let Some(align) = chars.first().copied().and_then(align_of) {
            parsed.align = Some(align);
            pos = 1;
        }
        let sign = match chars.get(pos) {
            Some('+') => Some(Sign::Always),
            Some(' ') => Some(Sign::Space),
            Some('-') => Some(Sign::Negative),
            _ => None,
        };
        if let Some(sign) = sign {
            parsed.sign = sign;
            pos += 1;
        }
        if chars.get(pos) == Some(&'#') {
            parsed.alternate = true;
            pos += 1;
        }
        if chars.get(pos) == Some(&'0') {
            parsed.zero = true;
            pos += 1;
        }
        let (width, next) = number(spec, &chars, pos)?;
        parsed.width = width.unwrap_or(0);
        pos = next;
        if chars.get(pos) == Some(&'.') {
            let (precision, next) = number(spec, &chars, pos + 1)?;
            parsed.precision = Some(precision.ok_or_else(|| malformed(spec, "missing precision"))?);
            pos = next;
        }
        if let Some(&kind) = chars.get(pos) {
            if !"?sdboxXceEfFg".contains(kind) {
                return Err(malformed(spec, &format!("unknown type `{kind}`")));
            }
            parsed.kind = Some(kind);
            pos += 1;
        }
        if pos < chars.len() {
            return Err(malformed(spec, "unexpected trailing characters"));
        }
        Ok(parsed)
    }
}

/// Digits starting at `start`, and the position after them.
fn number(spec: &str, chars: &[char], start: usize) -> Eval<(Option<usize>, usize)> {
    let digits: String = chars
        .iter()
        .skip(start)
        .take_while(|ch| ch.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return Ok((None, start));
    }
    match digits.parse::<usize>() {
        Ok(value) if value <= MAX_WIDTH => Ok((Some(value), start + digits.len())),
        _ => Err(malformed(spec, &format!("`{digits}` is larger than {MAX_WIDTH}"))),
    }
}

fn pad(text: String, spec: &FormatSpec, default: Align) -> String {
    let len = text.chars().count();
    if len >= spec.width {
        return text;
    }
    let gap = spec.width - len;
    let fill = |count: usize| spec.fill.to_string().repeat(count);
    match spec.align.unwrap_or(default) {
        Align::Left => text + &fill(gap),
        Align::Right => fill(gap) + &text,
        Align::Center => fill(gap / 2) + &text + &fill(gap - gap / 2),
    }
}

fn unsupported(kind: char, value: &Value) -> Diagnostic {
    Diagnostic::type_error(format!(
        "format type `{kind}` does not apply to a value of type `{}`",
        value.type_name()
    ))
}

/// C-style exponent: at least two digits and an explicit sign.
fn exponent(magnitude: f64, precision: usize, upper: bool) -> String {
    let text = format!("{magnitude:.precision$e}");
    let text = match text.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => text,
    };
    if upper {
        text.to_uppercase()
    } else {
        text
    }
}

fn double_digits(magnitude: f64, spec: &FormatSpec, value: &Value) -> Eval<String> {
    Ok(match spec.kind {
        None | Some('s' | '?' | 'g') => match spec.precision {
            Some(precision) => format!("{magnitude:.precision$}"),
            None => Value::Double(magnitude).display(),
        },
        Some('f') => format!("{magnitude:.*}", spec.precision.unwrap_or(6)),
        Some('F') => format!("{magnitude:.*}", spec.precision.unwrap_or(6)).to_uppercase(),
        Some('e') => exponent(magnitude, spec.precision.unwrap_or(6), false),
        Some('E') => exponent(magnitude, spec.precision.unwrap_or(6), true),
        Some(kind) => return Err(unsupported(kind, value)),
    })
}

/// Splits a number into its prefix (`0x` and friends) and digits.
fn integer_digits(magnitude: u64, spec: &FormatSpec, value: &Value) -> Eval<(&'static str, String)> {
    let prefix = |text: &'static str| if spec.alternate { text } else { "" };
    Ok(match spec.kind {
        None | Some('d' | 's' | '?') => ("", magnitude.to_string()),
        Some('b') => (prefix("0b"), format!("{magnitude:b}")),
        Some('o') => (prefix("0o"), format!("{magnitude:o}")),
        Some('x') => (prefix("0x"), format!("{magnitude:x}")),
        Some('X') => (prefix("0X"), format!("{magnitude:X}")),
        Some('e' | 'E' | 'f' | 'F' | 'g') => ("", double_digits(magnitude as f64, spec, value)?),
        Some(kind) => return Err(unsupported(kind, value)),
    })
}

fn render(value: &Value, spec: &FormatSpec) -> Eval<String> {
    let (negative, prefix, digits) = match value {
        Value::Int(n) if spec.kind == Some('c') => {
            let ch = u32::try_from(*n)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| Diagnostic::value_error(format!("{n} is not a character code")))?;
            return Ok(pad(ch.to_string(), spec, Align::Left));
        }
        Value::Int(n) => {
            let (prefix, digits) = integer_digits(n.unsigned_abs(), spec, value)?;
            (*n < 0, prefix, digits)
        }
        Value::Double(n) => (
            n.is_sign_negative() && !n.is_nan(),
            "",
            double_digits(n.abs(), spec, value)?,
        ),
        other => {
            let text = match spec.kind {
                None | Some('s') => other.display(),
                Some('?') => other.repr(),
                Some(kind) => return Err(unsupported(kind, other)),
            };
            let text = match spec.precision {
                Some(precision) => text.chars().take(precision).collect(),
                None => text,
            };
            return Ok(pad(text, spec, Align::Left));
        }
    };
    let sign = match (negative, spec.sign) {
        (true, _) => "-",
        (false, Sign::Always) => "+",
        (false, Sign::Space) => " ",
        (false, Sign::Negative) => "",
    };
    if spec.zero && spec.align.is_none() {
        let used = sign.len() + prefix.len() + digits.chars().count();
        let zeros = "0".repeat(spec.width.saturating_sub(used));
        return Ok(format!("{sign}{prefix}{zeros}{digits}"));
    }
    Ok(pad(format!("{sign}{prefix}{digits}"), spec, Align::Right))
}

/// Fills the placeholders of `template`. `{{` and `}}` are literal braces.
/// Every placeholder advances the implicit argument counter, numbered or
/// not, and every argument must be used.
pub(crate) fn format_text(template: &str, args: &[Value]) -> Eval<String> {
    let mut out = String::with_capacity(template.len());
    let mut used = vec![false; args.len()];
    let mut next = 0;
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => return Err(Diagnostic::value_error("unclosed `{` in format template")),
                    }
                }
                let (reference, spec) = match field.split_once(':') {
                    Some((reference, spec)) => (reference, Some(spec)),
                    None => (field.as_str(), None),
                };
                let index = if reference.is_empty() {
                    if next >= args.len() {
                        return Err(Diagnostic::value_error(
                            "`format` has more placeholders than arguments",
                        ));
                    }
                    next
                } else {
                    let index = reference.trim().parse::<usize>().map_err(|_| {
                        Diagnostic::value_error(format!(
                            "format field `{reference}` is not an argument index"
                        ))
                    })?;
                    if index >= args.len() {
                        return Err(Diagnostic::new(
                            ErrorKind::Index,
                            format!(
                                "format field {index} out of range for {} argument(s)",
                                args.len()
                            ),
                        ));
                    }
                    index
                };
                next += 1;
                used[index] = true;
                let value = &args[index];
                match spec {
                    Some(spec) => out.push_str(&render(value, &FormatSpec::parse(spec)?)?),
                    None => out.push_str(&value.display()),
                }
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            other => out.push(other),
        }
    }
    if used.contains(&false) {
        return Err(Diagnostic::value_error(
            "`format` has more arguments than placeholders",
        ));
    }
    Ok(out)
}
