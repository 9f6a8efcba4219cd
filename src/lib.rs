//! Back half of a small retargetable C compiler: reads the front end's
//! record stream, rebuilds one expression tree per statement, lowers it
//! through the backend hook ladder and writes assembly text.

pub mod codegen;
pub mod diagnostic;
pub mod driver;
pub mod error;
pub mod expr;
pub mod node;
pub mod record;
pub mod span;
pub mod symtab;
pub mod target;
pub mod types;

pub use driver::Driver;
pub use error::{CodegenError, CodegenResult};
