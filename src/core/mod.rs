//! Core XML lexing primitives
//!
//! This module contains the building blocks the SAX pipeline sits on:
//! - Scanner: SIMD-accelerated delimiter detection using memchr
//! - Lexer: incremental push lexer reporting through the ScanHandler trait
//! - Entities: predefined/character/internal entity expansion with Cow
//! - DTD: entity declarations from the DOCTYPE internal subset
//! - Encoding: input encoding detection and streaming conversion to UTF-8
//! - Position: byte offset to line/column mapping

pub mod dtd;
pub mod encoding;
pub mod entities;
pub mod lexer;
pub mod position;
pub mod scanner;
