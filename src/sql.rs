pub mod eval;
pub mod func;
pub mod node;
pub mod stmt;
pub mod token;
