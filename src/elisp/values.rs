//! Typed extraction from parsed Elisp forms.

use std::path::PathBuf;

use super::{ElispError, Expr, parse_one};

fn type_error(expected: &'static str, found: &Expr) -> ElispError {
    ElispError::Type {
        expected,
        found: found.kind().to_string(),
    }
}

fn unquote(expr: &Expr) -> &Expr {
    match expr {
        Expr::Quoted(inner) => unquote(inner),
        other => other,
    }
}

pub fn expect_string(expr: &Expr) -> Result<String, ElispError> {
    match unquote(expr) {
        Expr::Str(s) => Ok(s.clone()),
        other => Err(type_error("string", other)),
    }
}

pub fn expect_int(expr: &Expr) -> Result<i64, ElispError> {
    match unquote(expr) {
        Expr::Int(n) => Ok(*n),
        other => Err(type_error("integer", other)),
    }
}

pub fn expect_path(expr: &Expr) -> Result<PathBuf, ElispError> {
    expect_string(expr).map(PathBuf::from)
}

/// Returns the elements of a proper list; `nil` is the empty list.
pub fn expect_list(expr: &Expr) -> Result<&[Expr], ElispError> {
    match unquote(expr) {
        Expr::List(items) => Ok(items),
        e if e.is_nil() => Ok(&[]),
        other => Err(type_error("list", other)),
    }
}

pub fn expect_string_list(expr: &Expr) -> Result<Vec<String>, ElispError> {
    expect_list(expr)?.iter().map(expect_string).collect()
}

/// Renders a value the way a user would read it: strings without quotes,
/// everything else in printed form.
pub fn render_plain(expr: &Expr) -> String {
    match unquote(expr) {
        Expr::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Converts an association list `((k . v) ...)` into ordered pairs.
///
/// Entries written as `(k v ...)` are accepted too; their value is the
/// remaining list.
pub fn alist_entries(expr: &Expr) -> Result<Vec<(String, Expr)>, ElispError> {
    expect_list(expr)?
        .iter()
        .map(|entry| match entry {
            Expr::Cons(key, value) => Ok((render_plain(key), (**value).clone())),
            Expr::List(items) if !items.is_empty() => {
                Ok((render_plain(&items[0]), Expr::List(items[1..].to_vec())))
            }
            other => Err(type_error("dotted pair", other)),
        })
        .collect()
}

/// Converts a property list `(:k1 v1 :k2 v2)` into ordered pairs with the
/// leading colon stripped from keys.
pub fn plist_entries(expr: &Expr) -> Result<Vec<(String, Expr)>, ElispError> {
    let items = expect_list(expr)?;
    if items.len() % 2 != 0 {
        return Err(ElispError::Type {
            expected: "property list with an even number of elements",
            found: format!("{} elements", items.len()),
        });
    }
    Ok(items
        .chunks(2)
        .map(|pair| {
            let key = render_plain(&pair[0]);
            let key = key.strip_prefix(':').map(str::to_string).unwrap_or(key);
            (key, pair[1].clone())
        })
        .collect())
}

/// Converts an Emacs time value to unix seconds.
///
/// Accepts the list form `(HIGH LOW [USEC [PSEC]])` as well as a plain
/// number of seconds.
pub fn time_to_unix(expr: &Expr) -> Result<i64, ElispError> {
    match unquote(expr) {
        Expr::Int(n) => Ok(*n),
        Expr::Float(n) => Ok(*n as i64),
        Expr::Cons(high, low) => Ok(expect_int(high)? * 65536 + expect_int(low)?),
        Expr::List(items) if !items.is_empty() => {
            let high = number_as_i64(&items[0])?;
            let low = items.get(1).map(number_as_i64).transpose()?.unwrap_or(0);
            Ok(high * 65536 + low)
        }
        other => Err(type_error("time value", other)),
    }
}

fn number_as_i64(expr: &Expr) -> Result<i64, ElispError> {
    match unquote(expr) {
        Expr::Int(n) => Ok(*n),
        Expr::Float(n) => Ok(*n as i64),
        other => Err(type_error("number", other)),
    }
}

/// Decodes a column that should hold a printed string.
///
/// Values written by older tooling are sometimes stored unquoted; anything
/// that does not read as a single string is taken verbatim.
pub fn decode_string_lenient(raw: &str) -> String {
    parse_one(raw)
        .and_then(|expr| expect_string(&expr))
        .unwrap_or_else(|_| raw.trim().to_string())
}
