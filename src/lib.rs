//! fastsax - Streaming SAX parsing with threaded dispatch
//!
//! Scanning and dispatch are decoupled: the scanner turns the input into
//! tokenized event records, the dispatcher replays them as callbacks on
//! contextual element handlers. Large inputs are scanned on a worker thread
//! while the calling thread dispatches.
//!
//! Layers:
//! - `core`: incremental lexer, entities, encodings, positions
//! - `reader`: input sources and chunked UTF-8 conversion
//! - `sax`: tokens, namespaces, records, channel, scan/dispatch engines
//! - NIFs: `parse_events`, `parser_new`, `parser_parse`

use rustler::{Binary, Env, NifResult, Term};

pub mod core;
pub mod reader;
mod resource;
pub mod sax;
mod term;

use reader::InputSource;
use resource::{ParserRef, ParserResource};
use sax::{FastParser, RecordingHandler, SaxError, Token, TokenTable};
use term::{error_to_term, ok_events};

// ============================================================================
// Allocator Configuration
// ============================================================================

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// ============================================================================
// One-shot Parsing
// ============================================================================

fn token_table(tokens: Vec<(String, Token)>) -> TokenTable {
    tokens.into_iter().collect()
}

fn run<'a>(env: Env<'a>, mut parser: FastParser, input: Binary<'a>) -> Term<'a> {
    let mut handler = RecordingHandler::new();
    let source = InputSource::from_bytes(input.as_slice());
    match parser.parse_with_handler(source, &mut handler) {
        Ok(()) => ok_events(env, handler.take()),
        Err(err) => error_to_term(env, &err),
    }
}

fn raise(err: SaxError) -> rustler::Error {
    rustler::Error::Term(Box::new(err.to_string()))
}

/// Parse XML and return the list of callbacks
///
/// `tokens` maps element and attribute names to tokens, `namespaces` maps
/// namespace URIs to namespace tokens.
#[rustler::nif(schedule = "DirtyCpu")]
fn parse_events<'a>(
    env: Env<'a>,
    input: Binary<'a>,
    tokens: Vec<(String, Token)>,
    namespaces: Vec<(String, Token)>,
) -> NifResult<Term<'a>> {
    let mut parser = FastParser::new();
    parser.set_token_resolver(token_table(tokens));
    for (uri, token) in namespaces {
        parser.register_namespace(uri, token).map_err(raise)?;
    }
    Ok(run(env, parser, input))
}

// ============================================================================
// Reusable Parser
// ============================================================================

#[rustler::nif]
fn parser_new(tokens: Vec<(String, Token)>, namespaces: Vec<(String, Token)>) -> NifResult<ParserRef> {
    let resource = ParserResource::new(token_table(tokens), namespaces).map_err(raise)?;
    Ok(ParserRef::new(resource))
}

#[rustler::nif(schedule = "DirtyCpu")]
fn parser_parse<'a>(env: Env<'a>, parser: ParserRef, input: Binary<'a>) -> Term<'a> {
    run(env, parser.parser(), input)
}

// ============================================================================
// NIF Initialization
// ============================================================================

// `ParserResource` is registered by `#[rustler::resource_impl]`
rustler::init!("Elixir.FastSax.Native");
