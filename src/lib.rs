pub mod analyzer;
pub mod expr;
pub mod interpreter;
pub mod parser;
pub mod scanner;
pub mod scope;
pub mod statement;
pub mod token;
pub mod types;
pub mod value;
