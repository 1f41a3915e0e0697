//! Elixir Term Conversion Utilities
//!
//! Converts recorded callbacks and parse errors to Elixir terms.

use rustler::{Encoder, Env, NewBinary, Term};

use crate::sax::{Callback, ElementName, SaxError, UnknownAttribute};

// Pre-defined atoms for efficiency - created once at compile time
rustler::atoms! {
    ok,
    error,
    start_document,
    start_element,
    characters,
    end_element,
    end_document,
}

/// Convert recorded callbacks to a list of event tuples
///
/// - `:start_document`
/// - `{:start_element, name, [{token, value}], [{namespace, name, value}]}`
/// - `{:characters, text}`
/// - `{:end_element, name}`
/// - `:end_document`
///
/// `name` is the element token, or `{namespace, local_name}` when the
/// element has none.
pub fn callbacks_to_term<'a>(env: Env<'a>, callbacks: Vec<Callback>) -> Term<'a> {
    let mut list = Term::list_new_empty(env);
    for callback in callbacks.into_iter().rev() {
        list = list.list_prepend(callback_to_term(env, callback));
    }
    list
}

fn callback_to_term<'a>(env: Env<'a>, callback: Callback) -> Term<'a> {
    match callback {
        Callback::StartDocument => start_document().encode(env),
        Callback::Start {
            element,
            attributes,
            unknown,
        } => {
            let mut known = Term::list_new_empty(env);
            for (token, value) in attributes.into_iter().rev() {
                known = known.list_prepend((token, str_to_binary(env, &value)).encode(env));
            }
            let mut rest = Term::list_new_empty(env);
            for attr in unknown.iter().rev() {
                rest = rest.list_prepend(unknown_to_term(env, attr));
            }
            (start_element(), name_to_term(env, &element), known, rest).encode(env)
        }
        Callback::Characters(text) => (characters(), str_to_binary(env, &text)).encode(env),
        Callback::End(element) => (end_element(), name_to_term(env, &element)).encode(env),
        Callback::EndDocument => end_document().encode(env),
    }
}

fn name_to_term<'a>(env: Env<'a>, name: &ElementName) -> Term<'a> {
    match name {
        ElementName::Token(token) => token.encode(env),
        ElementName::Unknown {
            namespace,
            local_name,
        } => (str_to_binary(env, namespace), str_to_binary(env, local_name)).encode(env),
    }
}

fn unknown_to_term<'a>(env: Env<'a>, attr: &UnknownAttribute) -> Term<'a> {
    (
        str_to_binary(env, &attr.namespace),
        str_to_binary(env, &attr.name),
        str_to_binary(env, &attr.value),
    )
        .encode(env)
}

/// `{:ok, events}`
pub fn ok_events<'a>(env: Env<'a>, callbacks: Vec<Callback>) -> Term<'a> {
    (ok(), callbacks_to_term(env, callbacks)).encode(env)
}

/// `{:error, {message, line, column}}`; errors without a location report
/// line and column 0
pub fn error_to_term<'a>(env: Env<'a>, err: &SaxError) -> Term<'a> {
    let detail = match err.as_parse_error() {
        Some(parse) => (str_to_binary(env, &parse.to_string()), parse.line(), parse.column()),
        None => (str_to_binary(env, &err.to_string()), 0, 0),
    };
    (error(), detail).encode(env)
}

/// Convert a string to a binary term (more efficient than .encode())
#[inline]
fn str_to_binary<'a>(env: Env<'a>, s: &str) -> Term<'a> {
    let bytes = s.as_bytes();
    let mut binary = NewBinary::new(env, bytes.len());
    binary.as_mut_slice().copy_from_slice(bytes);
    binary.into()
}
