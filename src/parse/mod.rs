//! Rule-file front end: lexer and parser.

pub mod lexer;
pub mod parser;

pub use parser::{ParseOptions, parse};
